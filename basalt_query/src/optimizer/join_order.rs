//! Bottom-up dynamic programming over join subsets, Selinger style: for
//! every subset size, find the cheapest way to append one join to the best
//! plan of the remaining subset.

use std::collections::HashMap;

use super::{CostCard, LogicalJoinNode, PlanCache, estimate_join_cardinality, estimate_join_cost};
use crate::stats::TableStats;

pub(super) fn order_joins(
    joins: &[LogicalJoinNode],
    stats: &HashMap<String, TableStats>,
    filter_selectivities: &HashMap<String, f64>,
) -> Vec<LogicalJoinNode> {
    let num_joins = joins.len();
    if num_joins == 0 {
        return Vec::new();
    }

    let mut cache = PlanCache::default();
    for subset_size in 1..=num_joins {
        for subset_mask in subsets_of_size(num_joins, subset_size) {
            let mut best: Option<CostCard> = None;
            for join_idx in 0..num_joins {
                if subset_mask & (1 << join_idx) == 0 {
                    continue;
                }
                let best_cost_so_far = best.as_ref().map_or(f64::MAX, |cc| cc.cost);
                if let Some(candidate) = cost_and_card_of_subplan(
                    joins,
                    stats,
                    filter_selectivities,
                    join_idx,
                    subset_mask,
                    best_cost_so_far,
                    &cache,
                ) {
                    best = Some(candidate);
                }
            }
            if let Some(best) = best {
                cache.add_plan(subset_mask, best);
            }
        }
    }

    let full_mask = (1u64 << num_joins) - 1;
    cache
        .get(full_mask)
        .map(|cost_card| cost_card.plan.clone())
        .unwrap_or_default()
}

/// Every bitmask over `n` elements with exactly `k` bits set, in increasing
/// (lexicographic) order. Deterministic and duplicate-free.
fn subsets_of_size(n: usize, k: usize) -> impl Iterator<Item = u64> {
    debug_assert!(n < 64);
    (1u64..(1u64 << n)).filter(move |mask| mask.count_ones() as usize == k)
}

/// Cost and cardinality of executing `joins[join_idx]` last among
/// `subset_mask`, with the rest of the subset taken from the plan cache as
/// the left subplan. `None` when the subset needs a cross product, when
/// statistics are missing, or when the candidate cannot beat
/// `best_cost_so_far`.
#[allow(clippy::too_many_arguments)]
fn cost_and_card_of_subplan(
    joins: &[LogicalJoinNode],
    stats: &HashMap<String, TableStats>,
    filter_selectivities: &HashMap<String, f64>,
    join_idx: usize,
    subset_mask: u64,
    best_cost_so_far: f64,
    cache: &PlanCache,
) -> Option<CostCard> {
    let mut join = joins[join_idx].clone();
    let remainder_mask = subset_mask & !(1u64 << join_idx);

    let prev_plan: Vec<LogicalJoinNode>;
    let left: (f64, u64, bool);
    let right: (f64, u64, bool);

    if remainder_mask == 0 {
        // Base case: both sides are base tables.
        prev_plan = Vec::new();
        left = base_table_inputs(&join.left_table, join.left_field, stats, filter_selectivities)?;
        right = base_table_inputs(
            &join.right_table,
            join.right_field,
            stats,
            filter_selectivities,
        )?;
    } else {
        // The remaining joins must already have a cached plan; a miss means
        // this decomposition includes a cross product.
        let prev = cache.get(remainder_mask)?;

        if does_join(&prev.plan, &join.left_table) {
            left = (prev.cost, prev.card, has_pkey(&prev.plan));
            right = base_table_inputs(
                &join.right_table,
                join.right_field,
                stats,
                filter_selectivities,
            )?;
        } else if does_join(&prev.plan, &join.right_table) {
            right = (prev.cost, prev.card, has_pkey(&prev.plan));
            left =
                base_table_inputs(&join.left_table, join.left_field, stats, filter_selectivities)?;
        } else {
            // Neither side touches the subplan: cross product, skip.
            return None;
        }
        prev_plan = prev.plan.clone();
    }

    let (left_cost, left_card, mut left_pkey) = left;
    let (right_cost, right_card, mut right_pkey) = right;

    let mut cost = estimate_join_cost(left_card, right_card, left_cost, right_cost);
    let swapped_cost = estimate_join_cost(right_card, left_card, right_cost, left_cost);
    if swapped_cost < cost {
        join = join.swap_inner_outer();
        cost = swapped_cost;
        std::mem::swap(&mut left_pkey, &mut right_pkey);
    }
    if cost >= best_cost_so_far {
        return None;
    }

    let card = estimate_join_cardinality(&join, left_card, right_card, left_pkey, right_pkey);
    let mut plan = prev_plan;
    plan.push(join);
    Some(CostCard { cost, card, plan })
}

/// Scan cost, filtered cardinality, and pkey flag of a base table side.
fn base_table_inputs(
    table: &str,
    field: u64,
    stats: &HashMap<String, TableStats>,
    filter_selectivities: &HashMap<String, f64>,
) -> Option<(f64, u64, bool)> {
    let table_stats = stats.get(table)?;
    let selectivity = filter_selectivities.get(table).copied().unwrap_or(1.0);
    Some((
        table_stats.estimate_scan_cost(),
        table_stats.estimate_table_cardinality(selectivity),
        field == 0,
    ))
}

/// Whether any join in the plan touches `table`.
fn does_join(plan: &[LogicalJoinNode], table: &str) -> bool {
    plan.iter()
        .any(|join| join.left_table == table || join.right_table == table)
}

/// Whether any join in the plan goes through a primary-key column.
fn has_pkey(plan: &[LogicalJoinNode]) -> bool {
    plan.iter()
        .any(|join| join.left_field == 0 || join.right_field == 0)
}
