//! # Join Order Strategies
//!
//! A strategy drives a [`JoinOrder`]: it decides which components to combine and in
//! which order, honouring the core's contract (check legality, combine, mark used).
//!
//! [`QueryOrder`] is the baseline strategy. It keeps the order in which inputs appear in
//! the query: starting from the empty placeholder, it repeatedly joins the running
//! result with the first remaining component it may legally combine with. Exploded
//! LOJs therefore come back together as soon as their left input has been joined.

use crate::join_order::{Component, JoinOrder};
use tracing::{debug, warn};

/// Builds a single component spanning every input of a [`JoinOrder`].
pub trait JoinOrderStrategy {
    fn name(&self) -> &str;

    /// Returns the final component, or `None` if there are no inputs or the inputs
    /// cannot all be combined.
    fn order(&mut self, join_order: &mut JoinOrder) -> Option<Component>;
}

/// Combine components in query order.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryOrder;

impl JoinOrderStrategy for QueryOrder {
    fn name(&self) -> &str {
        "query-order"
    }

    fn order(&mut self, join_order: &mut JoinOrder) -> Option<Component> {
        let mut pending: Vec<Component> = join_order.components().to_vec();
        if pending.is_empty() {
            return None;
        }

        let mut result = Component::empty();
        while !pending.is_empty() {
            let Some(pos) = pending
                .iter()
                .position(|c| join_order.is_valid_combination(&result, c))
            else {
                warn!(
                    covered = %result.id_set(),
                    remaining = pending.len(),
                    "no legal combination left"
                );
                return None;
            };
            let next = pending.remove(pos);
            let combined = join_order.combine(&result, &next);
            join_order.mark_used(&combined);
            result = combined;
        }

        debug!(
            strategy = self.name(),
            covered = %result.id_set(),
            all_edges_used = join_order.all_edges_used(),
            "join order complete"
        );
        Some(result)
    }
}
