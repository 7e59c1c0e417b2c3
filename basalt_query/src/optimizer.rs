//! The cost-based join orderer.
//!
//! Given a set of two-table join predicates plus per-table statistics, it
//! searches bottom-up over join subsets for the cheapest left-deep order.

use std::collections::HashMap;

use crate::scan::PredicateType;
use crate::stats::TableStats;

mod join_order;

/// One join between two base tables: table names, the joined column index
/// on each side, and the comparison operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalJoinNode {
    pub left_table: String,
    pub right_table: String,
    pub left_field: u64,
    pub right_field: u64,
    pub op: PredicateType,
}

impl LogicalJoinNode {
    pub fn new(
        left_table: impl Into<String>,
        right_table: impl Into<String>,
        left_field: u64,
        right_field: u64,
        op: PredicateType,
    ) -> Self {
        LogicalJoinNode {
            left_table: left_table.into(),
            right_table: right_table.into(),
            left_field,
            right_field,
            op,
        }
    }

    /// The same join with its operands flipped.
    pub fn swap_inner_outer(&self) -> Self {
        LogicalJoinNode {
            left_table: self.right_table.clone(),
            right_table: self.left_table.clone(),
            left_field: self.right_field,
            right_field: self.left_field,
            op: self.op,
        }
    }
}

/// Cost, cardinality, and join order of the best plan found for one subset
/// of the joins.
#[derive(Debug, Clone, Default)]
pub struct CostCard {
    pub cost: f64,
    pub card: u64,
    pub plan: Vec<LogicalJoinNode>,
}

/// Best subplans keyed by the bitmask of the join subset they cover.
/// Writes replace unconditionally; the caller filters by cost.
#[derive(Debug, Default)]
pub(crate) struct PlanCache {
    plans: HashMap<u64, CostCard>,
}

impl PlanCache {
    pub(crate) fn add_plan(&mut self, subset_mask: u64, cost_card: CostCard) {
        self.plans.insert(subset_mask, cost_card);
    }

    pub(crate) fn get(&self, subset_mask: u64) -> Option<&CostCard> {
        self.plans.get(&subset_mask)
    }
}

/// Nested-loop join cost: scan the outer once, the inner once per outer
/// tuple, and pay one predicate application per tuple pair. Strictly
/// greater than the two scan costs for any non-empty outer.
pub(crate) fn estimate_join_cost(card1: u64, card2: u64, cost1: f64, cost2: f64) -> f64 {
    cost1 + card1 as f64 * cost2 + (card1 as f64) * (card2 as f64)
}

/// Join output cardinality. An equi-join on a primary key cannot produce
/// more rows than the other side; other operators keep an assumed 30% of
/// the cross product. Column 0 is the primary key by convention.
pub(crate) fn estimate_join_cardinality(
    join: &LogicalJoinNode,
    card1: u64,
    card2: u64,
    left_pkey: bool,
    right_pkey: bool,
) -> u64 {
    if join.op == PredicateType::Eq {
        if left_pkey {
            card2
        } else if right_pkey {
            card1
        } else {
            card1.max(card2)
        }
    } else {
        (0.3 * card1 as f64 * card2 as f64) as u64
    }
}

/// Orders a fixed set of joins using table statistics and per-table filter
/// selectivities.
pub struct JoinOptimizer {
    joins: Vec<LogicalJoinNode>,
}

impl JoinOptimizer {
    pub fn new(joins: Vec<LogicalJoinNode>) -> Self {
        JoinOptimizer { joins }
    }

    /// The cheapest left-deep execution order for the whole join set, as a
    /// vector of joins in execution order. Empty when the joins cannot be
    /// connected without a cross product or statistics are missing.
    pub fn order_joins(
        &self,
        stats: &HashMap<String, TableStats>,
        filter_selectivities: &HashMap<String, f64>,
    ) -> Vec<LogicalJoinNode> {
        join_order::order_joins(&self.joins, stats, filter_selectivities)
    }

    /// Cost of executing one join given the cardinalities and scan costs of
    /// its two inputs.
    pub fn estimate_join_cost(&self, card1: u64, card2: u64, cost1: f64, cost2: f64) -> f64 {
        estimate_join_cost(card1, card2, cost1, cost2)
    }

    /// Output cardinality of one join.
    pub fn estimate_join_cardinality(
        &self,
        join: &LogicalJoinNode,
        card1: u64,
        card2: u64,
        left_pkey: bool,
        right_pkey: bool,
    ) -> u64 {
        estimate_join_cardinality(join, card1, card2, left_pkey, right_pkey)
    }
}
