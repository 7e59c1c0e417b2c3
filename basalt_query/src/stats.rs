//! Per-table statistics: equi-width integer histograms per column, plus the
//! scan-cost and cardinality estimates the join orderer works from.

use std::path::Path;

use basalt::Result;

use crate::scan::{PredicateType, SeqScan};

/// Number of histogram buckets per column.
pub const NUM_HIST_BINS: usize = 100;

/// An equi-width histogram over `[min_v, max_v]`. Space and insertion time
/// are constant in the number of values seen.
#[derive(Debug, Clone)]
pub struct IntHistogram {
    span: f64,
    min_v: i64,
    max_v: i64,
    num_tuples: u64,
    buckets: Vec<u64>,
}

impl IntHistogram {
    pub fn new(num_buckets: usize, min_v: i64, max_v: i64) -> Self {
        let span = ((1 + max_v - min_v) as f64 / num_buckets as f64).max(1.0);
        IntHistogram {
            span,
            min_v,
            max_v,
            num_tuples: 0,
            buckets: vec![0; num_buckets],
        }
    }

    fn bucket_index(&self, v: i64) -> usize {
        (((v - self.min_v) as f64 / self.span) as usize).min(self.buckets.len() - 1)
    }

    /// Counts a value; anything outside `[min_v, max_v]` is ignored.
    pub fn add_value(&mut self, v: i64) {
        if v < self.min_v || v > self.max_v {
            return;
        }
        let idx = self.bucket_index(v);
        self.buckets[idx] += 1;
        self.num_tuples += 1;
    }

    /// Estimated fraction of values satisfying `value <op> v`.
    pub fn estimate_selectivity(&self, op: PredicateType, v: i64) -> f64 {
        if self.num_tuples == 0 {
            return 0.0;
        }
        let total = self.num_tuples as f64;

        match op {
            PredicateType::Eq => {
                if v < self.min_v || v > self.max_v {
                    return 0.0;
                }
                let height = self.buckets[self.bucket_index(v)] as f64;
                (height / self.span) / total
            }
            PredicateType::Ne => 1.0 - self.estimate_selectivity(PredicateType::Eq, v),
            PredicateType::Gt => {
                if v <= self.min_v {
                    return 1.0;
                }
                if v >= self.max_v {
                    return 0.0;
                }
                let bucket = self.bucket_index(v);
                let height = self.buckets[bucket] as f64;
                // Fraction of the containing bucket above v; a value on the
                // upper boundary would otherwise contribute negatively.
                let upper_bound = self.min_v as f64 + (bucket + 1) as f64 * self.span;
                let fraction = ((upper_bound - v as f64) / self.span).clamp(0.0, 1.0);

                let tail: u64 = self.buckets[bucket + 1..].iter().sum();
                (height / total) * fraction + tail as f64 / total
            }
            PredicateType::Ge => {
                if v < self.min_v {
                    return 1.0;
                }
                if v > self.max_v {
                    return 0.0;
                }
                self.estimate_selectivity(PredicateType::Gt, v - 1)
            }
            PredicateType::Lt => {
                if v <= self.min_v {
                    return 0.0;
                }
                if v >= self.max_v {
                    return 1.0;
                }
                1.0 - self.estimate_selectivity(PredicateType::Ge, v)
            }
            PredicateType::Le => {
                if v < self.min_v {
                    return 0.0;
                }
                if v > self.max_v {
                    return 1.0;
                }
                1.0 - self.estimate_selectivity(PredicateType::Gt, v)
            }
        }
    }
}

/// Statistics over one table: a histogram per column and the inputs of the
/// scan cost model.
#[derive(Debug, Clone)]
pub struct TableStats {
    io_cost_per_page: u64,
    num_pages: u64,
    num_fields: usize,
    num_tuples: u64,
    min_values: Vec<i64>,
    max_values: Vec<i64>,
    histograms: Vec<IntHistogram>,
}

impl TableStats {
    /// Builds statistics by scanning the table twice: once for per-column
    /// minima and maxima, once to fill the histograms.
    pub fn build<P: AsRef<Path>>(
        table_id: u16,
        io_cost_per_page: u64,
        num_pages: u64,
        num_fields: usize,
        base_dir: P,
    ) -> Result<Self> {
        let mut scan = SeqScan::new(table_id, num_pages, num_fields, base_dir);

        let mut min_values = vec![i64::MAX; num_fields];
        let mut max_values = vec![i64::MIN; num_fields];
        let mut num_tuples = 0u64;
        while let Some(tuple) = scan.next()? {
            for (field, &value) in tuple.iter().enumerate() {
                let value = i64::from(value);
                min_values[field] = min_values[field].min(value);
                max_values[field] = max_values[field].max(value);
            }
            num_tuples += 1;
        }

        let mut histograms: Vec<IntHistogram> = (0..num_fields)
            .map(|field| IntHistogram::new(NUM_HIST_BINS, min_values[field], max_values[field]))
            .collect();

        scan.rewind();
        while let Some(tuple) = scan.next()? {
            for (field, &value) in tuple.iter().enumerate() {
                histograms[field].add_value(i64::from(value));
            }
        }

        Ok(TableStats {
            io_cost_per_page,
            num_pages,
            num_fields,
            num_tuples,
            min_values,
            max_values,
            histograms,
        })
    }

    /// Statistics seeded from already-known counts, for tests that need no
    /// histogram content.
    #[cfg(test)]
    pub(crate) fn with_precomputed(
        io_cost_per_page: u64,
        num_pages: u64,
        num_fields: usize,
        num_tuples: u64,
    ) -> Self {
        TableStats {
            io_cost_per_page,
            num_pages,
            num_fields,
            num_tuples,
            min_values: vec![0; num_fields],
            max_values: vec![0; num_fields],
            histograms: (0..num_fields)
                .map(|_| IntHistogram::new(NUM_HIST_BINS, 0, 0))
                .collect(),
        }
    }

    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    /// Estimated cost of one full sequential scan of the table.
    pub fn estimate_scan_cost(&self) -> f64 {
        2.0 * (self.io_cost_per_page * self.num_pages) as f64
    }

    /// Estimated tuple count once a predicate of the given selectivity is
    /// applied.
    pub fn estimate_table_cardinality(&self, selectivity: f64) -> u64 {
        (selectivity * self.num_tuples as f64) as u64
    }

    /// Selectivity of `column <op> constant` on this table.
    pub fn estimate_selectivity(&self, field: usize, op: PredicateType, constant: i64) -> f64 {
        self.histograms[field].estimate_selectivity(op, constant)
    }
}
