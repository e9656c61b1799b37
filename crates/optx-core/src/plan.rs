//! # Logical Plan Payloads
//!
//! A [`PlanNode`] is an immutable logical subtree. Nodes are shared through
//! [`PlanRef`] (`Arc<PlanNode>`): combining two join components builds a new node whose
//! children are clones of the input handles, so retiring a component never invalidates
//! a subtree that another component or the final plan still references.
//!
//! ## Operators
//!
//! Only the operators the join order core produces or consumes are modelled:
//!
//! - `Scan`: a base relation with its output columns. Always a leaf.
//! - `Filter`: a predicate over a single child.
//! - `Join`: an inner or left outer join of two children on a condition.
//!
//! ## Statistics
//!
//! Each node carries a write-once statistics slot. [`crate::stats::ensure_stats`] fills it
//! bottom-up the first time statistics are requested and leaves it alone afterwards.

use crate::expr::{ColumnRef, ColumnSet, Expr, JoinType, TableRef};
use crate::stats::Statistics;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Shared handle to a logical subtree.
pub type PlanRef = Arc<PlanNode>;

/// Logical operators that can appear in a join order payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    /// Table scan producing `columns`, qualified by `alias`.
    Scan {
        table: TableRef,
        alias: String,
        columns: Vec<ColumnRef>,
    },
    /// Filter: applies a predicate to its single child.
    Filter { predicate: Expr },
    /// Join of two children on `condition`.
    Join { join_type: JoinType, condition: Expr },
}

#[derive(Debug)]
pub struct PlanNode {
    pub op: LogicalOp,
    pub children: Vec<PlanRef>,
    stats: OnceLock<Statistics>,
}

impl PlanNode {
    fn new_ref(op: LogicalOp, children: Vec<PlanRef>) -> PlanRef {
        Arc::new(PlanNode {
            op,
            children,
            stats: OnceLock::new(),
        })
    }

    /// Scan of `table` under `alias`; each column name becomes `alias.name`.
    pub fn scan<I, S>(table: TableRef, alias: impl Into<String>, columns: I) -> PlanRef
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let alias = alias.into();
        let columns = columns
            .into_iter()
            .map(|c| ColumnRef::new(alias.clone(), c))
            .collect();
        Self::new_ref(
            LogicalOp::Scan {
                table,
                alias,
                columns,
            },
            vec![],
        )
    }

    /// Wrap `child` in a filter on `predicate`.
    ///
    /// A constant-true predicate returns `child` itself. A filter over a filter is
    /// collapsed into a single filter on the conjunction of both predicates.
    pub fn filter(child: PlanRef, predicate: Expr) -> PlanRef {
        if predicate.is_true() {
            return child;
        }
        if let LogicalOp::Filter { predicate: inner } = &child.op {
            let merged = Expr::conjunction(vec![inner.clone(), predicate]);
            return Self::new_ref(
                LogicalOp::Filter { predicate: merged },
                vec![child.children[0].clone()],
            );
        }
        Self::new_ref(LogicalOp::Filter { predicate }, vec![child])
    }

    pub fn inner_join(left: PlanRef, right: PlanRef, condition: Expr) -> PlanRef {
        Self::join(JoinType::Inner, left, right, condition)
    }

    /// Left outer join; `left` is the row-preserving side.
    pub fn left_outer_join(left: PlanRef, right: PlanRef, condition: Expr) -> PlanRef {
        Self::join(JoinType::Left, left, right, condition)
    }

    fn join(join_type: JoinType, left: PlanRef, right: PlanRef, condition: Expr) -> PlanRef {
        Self::new_ref(
            LogicalOp::Join {
                join_type,
                condition,
            },
            vec![left, right],
        )
    }

    /// Columns produced by this subtree.
    pub fn output_columns(&self) -> ColumnSet {
        match &self.op {
            LogicalOp::Scan { columns, .. } => columns.iter().cloned().collect(),
            LogicalOp::Filter { .. } | LogicalOp::Join { .. } => self
                .children
                .iter()
                .flat_map(|c| c.output_columns())
                .collect(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether this node carries a scalar predicate (filter, inner join or outer join).
    pub fn has_predicate(&self) -> bool {
        matches!(self.op, LogicalOp::Filter { .. } | LogicalOp::Join { .. })
    }

    pub fn join_type(&self) -> Option<JoinType> {
        match &self.op {
            LogicalOp::Join { join_type, .. } => Some(*join_type),
            _ => None,
        }
    }

    /// The filter predicate or join condition of this node, if any.
    pub fn predicate(&self) -> Option<&Expr> {
        match &self.op {
            LogicalOp::Filter { predicate } => Some(predicate),
            LogicalOp::Join { condition, .. } => Some(condition),
            LogicalOp::Scan { .. } => None,
        }
    }

    /// Aliases of all scans below this node, left to right.
    pub fn relations(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_relations(&mut out);
        out
    }

    fn collect_relations<'a>(&'a self, out: &mut Vec<&'a str>) {
        match &self.op {
            LogicalOp::Scan { alias, .. } => out.push(alias),
            _ => {
                for c in &self.children {
                    c.collect_relations(out);
                }
            }
        }
    }

    /// Cached statistics, if they have been derived.
    pub fn stats(&self) -> Option<&Statistics> {
        self.stats.get()
    }

    pub(crate) fn stats_slot(&self) -> &OnceLock<Statistics> {
        &self.stats
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match &self.op {
            LogicalOp::Scan { table, alias, .. } => {
                writeln!(f, "{}Scan {} AS {}", pad, table, alias)?
            }
            LogicalOp::Filter { predicate } => writeln!(f, "{}Filter [{}]", pad, predicate)?,
            LogicalOp::Join {
                join_type,
                condition,
            } => writeln!(f, "{}{} Join [{}]", pad, join_type, condition)?,
        }
        for c in &self.children {
            c.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
