//! # Statistics for Join Ordering
//!
//! This module defines the statistics structures and derivation formulas that search
//! strategies use to score candidate join combinations. The join order core itself
//! never looks at the numbers: it only guarantees that a subtree's statistics have been
//! derived (and cached on the subtree) when a caller asks for them.
//!
//! ## Statistics Hierarchy
//!
//! - **Relation-level**: row count and total size in bytes.
//! - **Column-level**: number of distinct values (NDV), null fraction, min/max values,
//!   average row size, and optional histograms.
//!
//! Column statistics are keyed by the qualified column name (`alias.column`) once they
//! leave a scan, so that same-named columns of different relations do not collide.
//!
//! ## Derivation Formulas
//!
//! - **Filter**: output_rows = input_rows * selectivity. Column NDVs are scaled
//!   proportionally to the row reduction ratio.
//! - **Inner join**: output_rows = |left| * |right| / max(NDV_left_key, NDV_right_key).
//! - **Left outer join**: the inner join estimate, but never fewer rows than the left
//!   input, since every left row is preserved.
//!
//! ## Selectivity Estimation
//!
//! - **Equality**: 1 / NDV (uniform distribution assumption).
//! - **Range**: fixed 1/3 heuristic.
//! - **Default**: 0.1 (10%) when no better estimate is available.

use crate::catalog::Catalog;
use crate::expr::{BinaryOp, Expr, JoinType, ScalarValue};
use crate::plan::{LogicalOp, PlanNode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Statistics for a relation or intermediate result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: f64,
    pub total_size_bytes: f64,
    pub column_stats: HashMap<String, ColumnStatistics>,
}

impl Statistics {
    pub fn new(row_count: f64, total_size_bytes: f64) -> Self {
        Self {
            row_count,
            total_size_bytes,
            column_stats: HashMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(name.into(), stats);
        self
    }
}

/// Per-column statistics used for selectivity estimation.
///
/// These statistics are typically gathered by ANALYZE TABLE and stored in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Number of distinct values (NDV). Used for equality selectivity: sel = 1/NDV.
    pub distinct_count: f64,
    /// Fraction of rows that are NULL [0.0, 1.0].
    pub null_fraction: f64,
    /// Minimum value in the column (if known).
    pub min_value: Option<ScalarValue>,
    /// Maximum value in the column (if known).
    pub max_value: Option<ScalarValue>,
    /// Average size of a single value in bytes.
    pub avg_row_size: f64,
    /// Optional equi-depth histogram.
    pub histogram: Option<Histogram>,
}

impl ColumnStatistics {
    pub fn new(distinct_count: f64, null_fraction: f64) -> Self {
        Self {
            distinct_count,
            null_fraction,
            min_value: None,
            max_value: None,
            avg_row_size: 8.0,
            histogram: None,
        }
    }
}

/// Equi-depth histogram. Each bucket holds approximately the same number of rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Histogram {
    pub buckets: Vec<HistogramBucket>,
}

/// A single bucket in an equi-depth histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Lower bound of the bucket range (inclusive).
    pub lower: f64,
    /// Upper bound of the bucket range (inclusive).
    pub upper: f64,
    /// Estimated number of rows in this bucket.
    pub count: f64,
    /// Estimated number of distinct values in this bucket.
    pub distinct: f64,
}

/// Rows assumed for a relation the catalog knows nothing about.
pub const DEFAULT_ROW_COUNT: f64 = 1000.0;

/// Default filter selectivity when we can't determine it.
pub const DEFAULT_FILTER_SELECTIVITY: f64 = 0.1;

/// Selectivity of a range comparison.
pub const RANGE_SELECTIVITY: f64 = 0.33;

/// Derive statistics for inner join output.
///
/// ```text
/// |A JOIN B| = |A| * |B| / max(NDV(A.key), NDV(B.key))
/// ```
///
/// For multi-column joins, selectivities are multiplied (independence assumption).
/// When NDV information is unavailable for a column, the relation's row count is used.
pub fn derive_join_stats(
    left: &Statistics,
    right: &Statistics,
    join_columns: &[(String, String)],
) -> Statistics {
    let mut selectivity = 1.0_f64;

    for (left_col, right_col) in join_columns {
        let left_ndv = left
            .column_stats
            .get(left_col)
            .map(|s| s.distinct_count)
            .unwrap_or(left.row_count);
        let right_ndv = right
            .column_stats
            .get(right_col)
            .map(|s| s.distinct_count)
            .unwrap_or(right.row_count);
        let max_ndv = left_ndv.max(right_ndv).max(1.0);
        selectivity /= max_ndv;
    }

    let row_count = (left.row_count * right.row_count * selectivity).max(1.0);

    let avg_row_size_left = if left.row_count > 0.0 {
        left.total_size_bytes / left.row_count
    } else {
        100.0
    };
    let avg_row_size_right = if right.row_count > 0.0 {
        right.total_size_bytes / right.row_count
    } else {
        100.0
    };
    let total_size_bytes = row_count * (avg_row_size_left + avg_row_size_right);

    // NDV is capped by the output row count.
    let mut column_stats = HashMap::new();
    for (name, stats) in left.column_stats.iter().chain(&right.column_stats) {
        let mut cs = stats.clone();
        cs.distinct_count = cs.distinct_count.min(row_count);
        column_stats.insert(name.clone(), cs);
    }

    Statistics {
        row_count,
        total_size_bytes,
        column_stats,
    }
}

/// Derive statistics for left outer join output.
///
/// Every left row survives, so the inner join estimate is raised to at least the
/// left input's row count. Size is rescaled to the adjusted row count.
pub fn derive_left_outer_join_stats(
    left: &Statistics,
    right: &Statistics,
    join_columns: &[(String, String)],
) -> Statistics {
    let mut stats = derive_join_stats(left, right, join_columns);
    let row_count = stats.row_count.max(left.row_count).max(1.0);
    if row_count > stats.row_count {
        let width = stats.total_size_bytes / stats.row_count;
        stats.total_size_bytes = row_count * width;
        stats.row_count = row_count;
    }
    stats
}

/// Derive statistics for filter output.
///
/// Output rows = input rows * selectivity (floored at 1); size and column NDVs are
/// scaled by the same ratio.
pub fn derive_filter_stats(input: &Statistics, selectivity: f64) -> Statistics {
    let row_count = (input.row_count * selectivity).max(1.0);
    let ratio = if input.row_count > 0.0 {
        row_count / input.row_count
    } else {
        1.0
    };

    let mut column_stats = HashMap::new();
    for (name, stats) in &input.column_stats {
        let mut cs = stats.clone();
        cs.distinct_count = (cs.distinct_count * ratio).max(1.0).min(row_count);
        column_stats.insert(name.clone(), cs);
    }

    Statistics {
        row_count,
        total_size_bytes: input.total_size_bytes * ratio,
        column_stats,
    }
}

/// Estimate selectivity for an equality predicate: `sel = 1 / NDV`.
///
/// Falls back to [`DEFAULT_FILTER_SELECTIVITY`] when the column has no statistics.
pub fn equality_selectivity(stats: &Statistics, col_name: &str) -> f64 {
    stats
        .column_stats
        .get(col_name)
        .map(|cs| 1.0 / cs.distinct_count.max(1.0))
        .unwrap_or(DEFAULT_FILTER_SELECTIVITY)
}

/// Estimate the fraction of input rows that pass `expr`.
///
/// - `col = literal`: 1 / NDV(col).
/// - `col = col`: 1 / max(NDV) of the two columns.
/// - range comparisons: [`RANGE_SELECTIVITY`].
/// - AND multiplies (independence); OR uses inclusion-exclusion.
pub fn estimate_selectivity(expr: &Expr, stats: &Statistics) -> f64 {
    match expr {
        Expr::Literal(ScalarValue::Bool(true)) => 1.0,
        Expr::BinaryOp {
            op: BinaryOp::Eq,
            left,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (Expr::Column(l), Expr::Column(r)) => {
                let l_sel = equality_selectivity(stats, &l.to_string());
                let r_sel = equality_selectivity(stats, &r.to_string());
                l_sel.min(r_sel)
            }
            (Expr::Column(c), _) | (_, Expr::Column(c)) => {
                equality_selectivity(stats, &c.to_string())
            }
            _ => DEFAULT_FILTER_SELECTIVITY,
        },
        Expr::BinaryOp {
            op: BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq,
            ..
        } => RANGE_SELECTIVITY,
        Expr::And(conjuncts) => conjuncts
            .iter()
            .map(|c| estimate_selectivity(c, stats))
            .product(),
        Expr::Or(disjuncts) => {
            let product: f64 = disjuncts
                .iter()
                .map(|d| 1.0 - estimate_selectivity(d, stats))
                .product();
            1.0 - product
        }
        _ => DEFAULT_FILTER_SELECTIVITY,
    }
}

/// Extract equi-join column pairs (qualified names) from a join condition.
///
/// Given `A.x = B.y AND A.z = B.w`, returns `[("A.x", "B.y"), ("A.z", "B.w")]`.
pub fn equi_join_columns(condition: &Expr) -> Vec<(String, String)> {
    condition
        .conjuncts()
        .into_iter()
        .filter_map(|c| match c {
            Expr::BinaryOp {
                op: BinaryOp::Eq,
                left,
                right,
            } => match (left.as_ref(), right.as_ref()) {
                (Expr::Column(l), Expr::Column(r)) => Some((l.to_string(), r.to_string())),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// Derives statistics for one plan node from the statistics of its children.
///
/// Implementations are stateless with respect to the plan; caching is handled by
/// [`ensure_stats`].
pub trait StatsEstimator: Send + Sync {
    fn derive(&self, node: &PlanNode, child_stats: &[&Statistics]) -> Statistics;
}

/// Estimator backed by catalog statistics for scans and the formulas above for
/// everything else.
pub struct CatalogStatsEstimator {
    catalog: Arc<dyn Catalog>,
}

impl CatalogStatsEstimator {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }
}

impl StatsEstimator for CatalogStatsEstimator {
    fn derive(&self, node: &PlanNode, child_stats: &[&Statistics]) -> Statistics {
        match &node.op {
            LogicalOp::Scan { table, alias, .. } => match self.catalog.get_table_stats(table) {
                Some(base) => {
                    // Requalify column stats with the scan alias.
                    let column_stats = base
                        .column_stats
                        .into_iter()
                        .map(|(name, cs)| (format!("{}.{}", alias, name), cs))
                        .collect();
                    Statistics {
                        row_count: base.row_count,
                        total_size_bytes: base.total_size_bytes,
                        column_stats,
                    }
                }
                None => Statistics::new(DEFAULT_ROW_COUNT, DEFAULT_ROW_COUNT * 100.0),
            },
            LogicalOp::Filter { predicate } => {
                let input = child_stats[0];
                derive_filter_stats(input, estimate_selectivity(predicate, input))
            }
            LogicalOp::Join {
                join_type,
                condition,
            } => {
                let join_cols = oriented_join_columns(condition, child_stats[0]);
                match join_type {
                    JoinType::Inner => {
                        derive_join_stats(child_stats[0], child_stats[1], &join_cols)
                    }
                    JoinType::Left => {
                        derive_left_outer_join_stats(child_stats[0], child_stats[1], &join_cols)
                    }
                }
            }
        }
    }
}

/// Orient each equi-join pair so that the first column belongs to the left input.
fn oriented_join_columns(condition: &Expr, left: &Statistics) -> Vec<(String, String)> {
    equi_join_columns(condition)
        .into_iter()
        .map(|(a, b)| {
            if left.column_stats.contains_key(&b) && !left.column_stats.contains_key(&a) {
                (b, a)
            } else {
                (a, b)
            }
        })
        .collect()
}

/// Make sure `node` and every node below it have statistics, deriving missing ones
/// bottom-up with `estimator`. Nodes that already carry statistics are left untouched.
pub fn ensure_stats<'a>(node: &'a PlanNode, estimator: &dyn StatsEstimator) -> &'a Statistics {
    if let Some(stats) = node.stats() {
        return stats;
    }
    let child_stats: Vec<&Statistics> = node
        .children
        .iter()
        .map(|c| ensure_stats(c, estimator))
        .collect();
    let derived = estimator.derive(node, &child_stats);
    trace!(rows = derived.row_count, relations = ?node.relations(), "derived statistics");
    node.stats_slot().get_or_init(|| derived)
}
