//! # Join-Order Endpoint
//!
//! This module implements a compact JSON protocol for handing a flattened n-ary join to
//! the join order core. It carries just what the core needs:
//!
//! - **Tables**: schema/name, row count, size, and per-column statistics
//! - **Children**: the n-ary join's inputs in query order; each is a table or a left
//!   outer join of two tables with its own conditions
//! - **Predicates**: equi-join conditions of the n-ary join itself
//!
//! Each table id doubles as the scan alias, so columns are addressed as `id.column`
//! throughout the plan and in the response's condition text.
//!
//! ## Wire Protocol
//!
//! - Request: `POST /optimize/join-order` with JSON body (`JoinOrderRequest`)
//! - Response: JSON body (`JoinOrderResponse`) with the join tree
//!
//! ```json
//! {
//!   "tables": [{"id": "c", "schema": "tpch", "name": "customer", "rowCount": 150000,
//!               "sizeBytes": 1.5e7, "columns": [{"name": "c_custkey", "ndv": 150000}]}, ...],
//!   "children": [{"table": "n"},
//!                {"leftOuterJoin": {"left": "c", "right": "o", "conditions": [...]}}],
//!   "predicates": [{"leftTable": "c", "leftColumn": "c_nationkey",
//!                   "rightTable": "n", "rightColumn": "n_nationkey"}]
//! }
//! ```

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use optx_core::catalog::InMemoryCatalog;
use optx_core::expr::*;
use optx_core::join_order::{JoinOrder, JoinOrderConfig};
use optx_core::plan::{LogicalOp, PlanNode, PlanRef};
use optx_core::stats::{CatalogStatsEstimator, ColumnStatistics, Statistics};
use optx_core::strategy::{JoinOrderStrategy, QueryOrder};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// JSON wire-protocol types
// ---------------------------------------------------------------------------

/// Request body for `POST /optimize/join-order`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOrderRequest {
    /// Tables referenced by the children. Each table has an ID, schema/name,
    /// row count, size, and per-column statistics.
    pub tables: Vec<TableInfo>,
    /// Inputs of the n-ary join, in query order.
    pub children: Vec<ChildSpec>,
    /// Conjunctive equi-join predicates of the n-ary join.
    #[serde(default)]
    pub predicates: Vec<EquiCondition>,
}

/// A table with its statistics.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    /// Unique identifier for this table within the request (e.g., "t0", "t1").
    pub id: String,
    /// Schema name (e.g., "tpch").
    pub schema: String,
    /// Table name (e.g., "customer").
    pub name: String,
    /// Estimated row count from table statistics.
    pub row_count: f64,
    /// Estimated total size in bytes.
    pub size_bytes: f64,
    /// Output columns with their statistics.
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

/// Per-column statistics.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Number of distinct values (NDV).
    pub ndv: f64,
    /// Fraction of values that are NULL (0.0 to 1.0).
    #[serde(default)]
    pub null_fraction: f64,
    /// Average size of a single value in bytes.
    #[serde(default = "default_avg_size")]
    pub avg_size: f64,
}

fn default_avg_size() -> f64 {
    8.0
}

/// One input of the n-ary join.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChildSpec {
    /// A base table, by ID.
    Table(String),
    /// `left LEFT OUTER JOIN right ON conditions`.
    LeftOuterJoin(OuterJoinSpec),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OuterJoinSpec {
    pub left: String,
    pub right: String,
    #[serde(default)]
    pub conditions: Vec<EquiCondition>,
}

/// `leftTable.leftColumn = rightTable.rightColumn`, with tables given by ID.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquiCondition {
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
}

/// Response body from the join-order endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOrderResponse {
    /// The join tree covering every input.
    pub tree: JoinTreeNode,
    /// Estimated output rows of the tree.
    pub estimated_rows: f64,
    /// Number of left outer joins that were split and reassembled.
    pub outer_joins: usize,
}

/// A node in the returned join tree.
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JoinTreeNode {
    /// A leaf node referencing a table by its ID.
    Leaf {
        #[serde(rename = "tableId")]
        table_id: String,
    },
    /// Predicates applied to a single subtree.
    Filter { filter: String, input: Box<JoinTreeNode> },
    /// A join node combining two subtrees.
    Join {
        #[serde(rename = "joinType")]
        join_type: String,
        condition: String,
        left: Box<JoinTreeNode>,
        right: Box<JoinTreeNode>,
    },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum JoinGraphError {
    #[error("Request must contain at least one child")]
    NoChildren,
    #[error("Unknown table ID: {0}")]
    UnknownTable(String),
    #[error("Unknown column {column} for table {table}")]
    UnknownColumn { table: String, column: String },
    #[error("Table {0} appears more than once among the join inputs")]
    DuplicateTable(String),
    #[error("Condition references table {0}, which is not an input of its join")]
    TableNotInJoin(String),
    #[error("Join ordering failed: no plan covers all inputs")]
    NoPlan,
}

impl JoinGraphError {
    pub fn status(&self) -> StatusCode {
        match self {
            JoinGraphError::NoPlan => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<JoinGraphError> for (StatusCode, String) {
    fn from(err: JoinGraphError) -> Self {
        (err.status(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// POST /optimize/join-order: build a join tree for a flattened n-ary join.
pub async fn optimize_join_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JoinOrderRequest>,
) -> Result<Json<JoinOrderResponse>, (StatusCode, String)> {
    let response = run_join_order(&req, &state.config.join_order_config())?;
    Ok(Json(response))
}

/// Build the n-ary join described by `req`, order it in query order, and derive
/// statistics for the result.
fn run_join_order(
    req: &JoinOrderRequest,
    config: &JoinOrderConfig,
) -> Result<JoinOrderResponse, JoinGraphError> {
    if req.children.is_empty() {
        return Err(JoinGraphError::NoChildren);
    }

    let inputs = input_tables(&req.children)?;
    let scans = build_scans(req);
    let children = req
        .children
        .iter()
        .map(|child| build_child(child, &scans))
        .collect::<Result<Vec<_>, _>>()?;
    let predicates = req
        .predicates
        .iter()
        .map(|p| condition_expr(p, &scans, &inputs))
        .collect::<Result<Vec<_>, _>>()?;

    let estimator = Arc::new(CatalogStatsEstimator::new(Arc::new(build_catalog(req))));
    let mut join_order =
        JoinOrder::new(children, predicates, config).with_stats_estimator(estimator);

    let mut strategy = QueryOrder;
    let result = strategy.order(&mut join_order).ok_or(JoinGraphError::NoPlan)?;
    let plan = result.plan().ok_or(JoinGraphError::NoPlan)?;

    let estimated_rows = join_order.ensure_stats(plan).row_count;
    debug!(
        strategy = strategy.name(),
        relations = ?plan.relations(),
        estimated_rows,
        "join order built"
    );

    Ok(JoinOrderResponse {
        tree: plan_to_tree(plan),
        estimated_rows,
        outer_joins: join_order.num_outer_joins(),
    })
}

// ---------------------------------------------------------------------------
// N-ary join construction
// ---------------------------------------------------------------------------

/// Build an InMemoryCatalog populated with table statistics from the request.
fn build_catalog(req: &JoinOrderRequest) -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();

    for table_info in &req.tables {
        let table_ref = TableRef {
            schema: table_info.schema.clone(),
            name: table_info.name.clone(),
        };

        let mut stats = Statistics::new(table_info.row_count, table_info.size_bytes);
        for col in &table_info.columns {
            let col_stats = ColumnStatistics {
                distinct_count: col.ndv,
                null_fraction: col.null_fraction,
                min_value: None,
                max_value: None,
                avg_row_size: col.avg_size,
                histogram: None,
            };
            stats = stats.with_column(&col.name, col_stats);
        }

        let columns = table_info.columns.iter().map(|c| c.name.clone()).collect();
        catalog.add_table(&table_ref, columns, stats);
    }

    catalog
}

/// One scan per table, aliased by the table ID.
fn build_scans(req: &JoinOrderRequest) -> HashMap<&str, PlanRef> {
    req.tables
        .iter()
        .map(|t| {
            let table_ref = TableRef {
                schema: t.schema.clone(),
                name: t.name.clone(),
            };
            let columns = t.columns.iter().map(|c| c.name.as_str());
            let scan = PlanNode::scan(table_ref, t.id.as_str(), columns);
            (t.id.as_str(), scan)
        })
        .collect()
}

fn lookup_scan(scans: &HashMap<&str, PlanRef>, id: &str) -> Result<PlanRef, JoinGraphError> {
    scans
        .get(id)
        .cloned()
        .ok_or_else(|| JoinGraphError::UnknownTable(id.to_string()))
}

/// Table IDs used by the children, counting both inputs of each outer join. Every scan
/// is aliased by its table ID, so an ID may appear only once.
fn input_tables(children: &[ChildSpec]) -> Result<HashSet<&str>, JoinGraphError> {
    let mut inputs = HashSet::new();
    let ids = children.iter().flat_map(|child| match child {
        ChildSpec::Table(id) => vec![id.as_str()],
        ChildSpec::LeftOuterJoin(spec) => vec![spec.left.as_str(), spec.right.as_str()],
    });
    for id in ids {
        if !inputs.insert(id) {
            return Err(JoinGraphError::DuplicateTable(id.to_string()));
        }
    }
    Ok(inputs)
}

fn build_child(
    child: &ChildSpec,
    scans: &HashMap<&str, PlanRef>,
) -> Result<PlanRef, JoinGraphError> {
    match child {
        ChildSpec::Table(id) => lookup_scan(scans, id),
        ChildSpec::LeftOuterJoin(spec) => {
            let left = lookup_scan(scans, &spec.left)?;
            let right = lookup_scan(scans, &spec.right)?;
            let sides = HashSet::from([spec.left.as_str(), spec.right.as_str()]);
            let conditions = spec
                .conditions
                .iter()
                .map(|c| condition_expr(c, scans, &sides))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(PlanNode::left_outer_join(left, right, Expr::conjunction(conditions)))
        }
    }
}

/// Resolve `table.column` against the scans. The table must be one of `inputs`, and the
/// column must be produced by its scan.
fn column(
    scans: &HashMap<&str, PlanRef>,
    inputs: &HashSet<&str>,
    table: &str,
    name: &str,
) -> Result<ColumnRef, JoinGraphError> {
    let scan = lookup_scan(scans, table)?;
    if !inputs.contains(table) {
        return Err(JoinGraphError::TableNotInJoin(table.to_string()));
    }
    let col = ColumnRef::new(table, name);
    if !scan.output_columns().contains(&col) {
        return Err(JoinGraphError::UnknownColumn {
            table: table.to_string(),
            column: name.to_string(),
        });
    }
    Ok(col)
}

fn condition_expr(
    cond: &EquiCondition,
    scans: &HashMap<&str, PlanRef>,
    inputs: &HashSet<&str>,
) -> Result<Expr, JoinGraphError> {
    let left = column(scans, inputs, &cond.left_table, &cond.left_column)?;
    let right = column(scans, inputs, &cond.right_table, &cond.right_column)?;
    Ok(Expr::column_eq(left, right))
}

// ---------------------------------------------------------------------------
// Plan → response conversion
// ---------------------------------------------------------------------------

/// Convert the final plan into the JSON response tree. Scan aliases are the
/// request's table IDs.
fn plan_to_tree(plan: &PlanNode) -> JoinTreeNode {
    match &plan.op {
        LogicalOp::Scan { alias, .. } => JoinTreeNode::Leaf {
            table_id: alias.clone(),
        },
        LogicalOp::Filter { predicate } => JoinTreeNode::Filter {
            filter: predicate.to_string(),
            input: Box::new(plan_to_tree(&plan.children[0])),
        },
        LogicalOp::Join {
            join_type,
            condition,
        } => JoinTreeNode::Join {
            join_type: join_type.to_string(),
            condition: condition.to_string(),
            left: Box::new(plan_to_tree(&plan.children[0])),
            right: Box::new(plan_to_tree(&plan.children[1])),
        },
    }
}
