//! End-to-end join order tests over flattened n-ary joins.
//!
//! These tests build n-ary joins the way a planner hands them over (ordered children plus
//! a conjunct list), drive the join order core either by hand or through the query-order
//! strategy, and check the resulting join trees.
//!
//! ## Scenarios
//! - Two plain inputs next to one embedded LOJ: `t1, t2, LOJ(t3, t4 ON p34)` with `p12`
//! - Two embedded LOJs that must not be interleaved
//! - TPC-H flavoured: `customer LEFT JOIN orders` next to `nation`, with catalog statistics
//!
//! ## What These Tests Verify
//! - Component count is inputs plus exploded LOJs, each covering its own index
//! - Edge/component incidence is symmetric
//! - Sibling combination rebuilds the LOJ with the preserved side on the left
//! - Predicates are never applied twice once marked used
//! - Statistics are derived once and cached on the final tree

use optx_core::bitset::BitSet;
use optx_core::catalog::InMemoryCatalog;
use optx_core::expr::*;
use optx_core::join_order::{Component, JoinOrder, JoinOrderConfig, Side};
use optx_core::plan::{LogicalOp, PlanNode, PlanRef};
use optx_core::stats::{CatalogStatsEstimator, ColumnStatistics, Statistics};
use optx_core::strategy::{JoinOrderStrategy, QueryOrder};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn col(table: &str, name: &str) -> ColumnRef {
    ColumnRef::new(table, name)
}

fn eq(lt: &str, lc: &str, rt: &str, rc: &str) -> Expr {
    Expr::column_eq(col(lt, lc), col(rt, rc))
}

fn scan(schema: &str, name: &str, cols: &[&str]) -> PlanRef {
    let table = TableRef {
        schema: schema.into(),
        name: name.into(),
    };
    PlanNode::scan(table, name, cols.iter().copied())
}

fn t(name: &str) -> PlanRef {
    scan("s", name, &["a", "b"])
}

/// Collect every predicate conjunct applied anywhere in `plan`.
fn applied_conjuncts(plan: &PlanNode, out: &mut Vec<Expr>) {
    if let Some(p) = plan.predicate() {
        out.extend(p.conjuncts().into_iter().filter(|c| !c.is_true()).cloned());
    }
    for c in &plan.children {
        applied_conjuncts(c, out);
    }
}

/// `t1, t2, LOJ(t3, t4 ON t3.a = t4.b)` with `t1.a = t2.b`.
fn one_loj() -> JoinOrder {
    let loj = PlanNode::left_outer_join(t("t3"), t("t4"), eq("t3", "a", "t4", "b"));
    JoinOrder::new(
        vec![t("t1"), t("t2"), loj],
        vec![eq("t1", "a", "t2", "b")],
        &JoinOrderConfig::default(),
    )
}

// ===========================================================================
// One embedded LOJ
// ===========================================================================

#[test]
fn test_one_loj_construction() {
    let jo = one_loj();

    assert_eq!(jo.components().len(), 4);
    assert_eq!(jo.num_outer_joins(), 1);
    for (i, c) in jo.components().iter().enumerate() {
        assert_eq!(c.id_set(), &BitSet::singleton(i));
    }

    let tags: Vec<Option<(u32, Side)>> = jo
        .components()
        .iter()
        .map(|c| c.outer_join().map(|o| (o.loj_id.get(), o.side)))
        .collect();
    assert_eq!(tags, vec![None, None, Some((1, Side::Left)), Some((1, Side::Right))]);

    assert_eq!(jo.edges().len(), 2);
    assert_eq!(jo.edge(0).incident_components().to_string(), "{0, 1}");
    assert_eq!(jo.edge(1).incident_components().to_string(), "{2, 3}");
}

#[test]
fn test_one_loj_legality() {
    let jo = one_loj();
    let c = |i| jo.component(i);

    assert!(jo.is_valid_combination(c(0), c(1)));
    assert!(jo.is_valid_combination(c(0), c(2)));
    assert!(jo.is_valid_combination(c(2), c(3)));
    assert!(!jo.is_valid_combination(c(0), c(3)));
    assert!(!jo.is_valid_combination(c(1), c(3)));

    for a in 0..4 {
        for b in 0..4 {
            assert_eq!(
                jo.is_valid_combination(c(a), c(b)),
                jo.is_valid_combination(c(b), c(a)),
                "legality of ({}, {}) must be symmetric",
                a,
                b
            );
        }
    }
}

#[test]
fn test_one_loj_sibling_combination_in_both_orders() {
    let jo = one_loj();
    let forward = jo.combine(jo.component(2), jo.component(3));
    let backward = jo.combine(jo.component(3), jo.component(2));

    for combined in [&forward, &backward] {
        let plan = combined.plan().expect("populated");
        assert_eq!(plan.join_type(), Some(JoinType::Left));
        assert_eq!(plan.relations(), vec!["t3", "t4"]);
        assert_eq!(plan.predicate(), Some(&eq("t3", "a", "t4", "b")));
        assert!(combined.outer_join().is_none());
        assert_eq!(combined.id_set().to_string(), "{2, 3}");
    }
}

#[test]
fn test_one_loj_full_tree_by_hand() {
    let mut jo = one_loj();

    let c12 = jo.combine(jo.component(0), jo.component(1));
    assert_eq!(c12.plan().and_then(|p| p.join_type()), Some(JoinType::Inner));
    jo.mark_used(&c12);

    let c34 = jo.combine(jo.component(2), jo.component(3));
    jo.mark_used(&c34);

    let all = jo.combine(&c12, &c34);
    let plan = all.plan().expect("populated");
    assert_eq!(plan.join_type(), Some(JoinType::Inner));
    // Both predicates were applied below; the top join has nothing left to apply.
    assert!(plan.predicate().is_some_and(Expr::is_true));
    assert_eq!(all.id_set().len(), 4);
    jo.mark_used(&all);
    assert!(jo.all_edges_used());
}

#[test]
fn test_one_loj_rebuilt_first_then_plain_inputs() {
    let mut jo = one_loj();
    let p12 = eq("t1", "a", "t2", "b");

    let c34 = jo.combine(jo.component(2), jo.component(3));
    assert_eq!(c34.plan().and_then(|p| p.join_type()), Some(JoinType::Left));
    assert!(c34.outer_join().is_none());
    jo.mark_used(&c34);

    // t1 reaches the rebuilt LOJ through no predicate, so this is a cross join.
    let mid = jo.combine(&c34, jo.component(0));
    let mid_plan = mid.plan().expect("populated");
    assert_eq!(mid_plan.join_type(), Some(JoinType::Inner));
    assert!(mid_plan.predicate().is_some_and(Expr::is_true));
    jo.mark_used(&mid);
    assert!(!jo.edge(0).is_used());

    let top = jo.combine(&mid, jo.component(1));
    let plan = top.plan().expect("populated");
    assert_eq!(plan.join_type(), Some(JoinType::Inner));
    assert_eq!(plan.predicate(), Some(&p12));
    assert_eq!(top.id_set().to_string(), "{0, 1, 2, 3}");
    jo.mark_used(&top);
    assert!(jo.all_edges_used());

    let mut applied = Vec::new();
    applied_conjuncts(plan, &mut applied);
    assert_eq!(applied.iter().filter(|c| **c == p12).count(), 1);
    assert_eq!(applied.len(), 2);
}

#[test]
#[should_panic(expected = "illegal join combination")]
fn test_one_loj_right_child_cannot_join_outside() {
    let jo = one_loj();
    jo.combine(jo.component(1), jo.component(3));
}

// ===========================================================================
// Two embedded LOJs
// ===========================================================================

fn two_lojs() -> JoinOrder {
    let loj1 = PlanNode::left_outer_join(t("t2"), t("t3"), eq("t2", "a", "t3", "b"));
    let loj2 = PlanNode::left_outer_join(t("t4"), t("t5"), eq("t4", "a", "t5", "b"));
    JoinOrder::new(
        vec![t("t1"), loj1, loj2],
        vec![eq("t1", "a", "t2", "b"), eq("t1", "b", "t4", "a")],
        &JoinOrderConfig::default(),
    )
}

#[test]
fn test_two_lojs_do_not_interleave() {
    let jo = two_lojs();
    assert_eq!(jo.components().len(), 3 + 2);
    assert_eq!(jo.num_outer_joins(), 2);

    let (t2, t3, t4, t5) = (jo.component(1), jo.component(2), jo.component(3), jo.component(4));
    assert!(!jo.is_valid_combination(t2, t4));
    assert!(!jo.is_valid_combination(t2, t5));
    assert!(!jo.is_valid_combination(t3, t4));
    assert!(!jo.is_sibling(t2, t5));
    assert!(jo.is_sibling(t4, t5));

    // Joining the left input of LOJ 1 carries its tag, which still excludes LOJ 2.
    let c12 = jo.combine(jo.component(0), t2);
    assert_eq!(c12.outer_join().map(|o| o.loj_id.get()), Some(1));
    assert!(!jo.is_valid_combination(&c12, t4));
    assert!(jo.is_valid_combination(&c12, t3));
}

#[test]
fn test_two_lojs_query_order() {
    let mut jo = two_lojs();
    let result = QueryOrder.order(&mut jo).expect("plan");
    let plan = result.plan().expect("populated");

    assert_eq!(plan.relations(), vec!["t1", "t2", "t3", "t4", "t5"]);
    assert_eq!(plan.join_type(), Some(JoinType::Left));
    assert_eq!(plan.children[0].join_type(), Some(JoinType::Inner));
    assert_eq!(plan.children[0].children[0].join_type(), Some(JoinType::Left));
    assert!(result.outer_join().is_none());
    assert!(jo.all_edges_used());

    // Every predicate appears exactly once in the final tree.
    let mut applied = Vec::new();
    applied_conjuncts(plan, &mut applied);
    assert_eq!(applied.len(), jo.edges().len());
    for edge in jo.edges() {
        assert_eq!(applied.iter().filter(|p| *p == edge.predicate()).count(), 1);
    }
}

#[test]
fn test_incidence_is_symmetric() {
    let jo = two_lojs();
    for (e, edge) in jo.edges().iter().enumerate() {
        for (c, comp) in jo.components().iter().enumerate() {
            assert_eq!(edge.incident_components().contains(c), comp.incident_edges().contains(e));
        }
    }
}

#[test]
fn test_combined_incidence_is_union() {
    let jo = two_lojs();
    let a = jo.component(0);
    let b = jo.component(1);
    let c = jo.combine(a, b);
    assert_eq!(c.id_set(), &a.id_set().union(b.id_set()));
    assert_eq!(c.incident_edges(), &a.incident_edges().union(b.incident_edges()));
}

// ===========================================================================
// TPC-H flavoured: customer LEFT JOIN orders, joined to nation
// ===========================================================================

/// Add a table to the catalog with the given row count and column NDVs.
fn add_table(catalog: &mut InMemoryCatalog, name: &str, rows: f64, cols: &[(&str, f64)]) {
    let table = TableRef {
        schema: "tpch".into(),
        name: name.into(),
    };
    let mut stats = Statistics::new(rows, rows * 100.0);
    for (col_name, ndv) in cols {
        stats = stats.with_column(*col_name, ColumnStatistics::new(*ndv, 0.0));
    }
    catalog.add_table(&table, cols.iter().map(|(n, _)| n.to_string()).collect(), stats);
}

fn tpch_catalog() -> InMemoryCatalog {
    let mut c = InMemoryCatalog::new();
    add_table(&mut c, "customer", 150_000.0, &[("c_custkey", 150_000.0), ("c_nationkey", 25.0)]);
    add_table(
        &mut c,
        "orders",
        1_500_000.0,
        &[("o_orderkey", 1_500_000.0), ("o_custkey", 100_000.0)],
    );
    add_table(&mut c, "nation", 25.0, &[("n_nationkey", 25.0), ("n_name", 25.0)]);
    c
}

#[test]
fn test_tpch_customer_orders_nation() {
    let customer = scan("tpch", "customer", &["c_custkey", "c_nationkey"]);
    let orders = scan("tpch", "orders", &["o_orderkey", "o_custkey"]);
    let nation = scan("tpch", "nation", &["n_nationkey", "n_name"]);
    let condition = eq("customer", "c_custkey", "orders", "o_custkey");
    let loj = PlanNode::left_outer_join(customer, orders, condition);

    let estimator = Arc::new(CatalogStatsEstimator::new(Arc::new(tpch_catalog())));
    let mut jo = JoinOrder::new(
        vec![nation, loj],
        vec![eq("customer", "c_nationkey", "nation", "n_nationkey")],
        &JoinOrderConfig::default(),
    )
    .with_stats_estimator(estimator);

    let result = QueryOrder.order(&mut jo).expect("plan");
    let plan = result.plan().expect("populated");

    // nation joins customer first, then the outer join picks up orders.
    assert_eq!(plan.join_type(), Some(JoinType::Left));
    assert_eq!(plan.relations(), vec!["nation", "customer", "orders"]);

    let stats = jo.ensure_stats(plan);
    // Every customer row survives the outer join.
    let inner_rows = plan.children[0].stats().map(|s| s.row_count).unwrap_or_default();
    assert!(stats.row_count >= inner_rows);
    assert_eq!(inner_rows, 150_000.0);
    let again = jo.ensure_stats(plan);
    assert_eq!(again.row_count, stats.row_count);
}

#[test]
fn test_loj_kept_whole_without_explosion() {
    let loj = PlanNode::left_outer_join(t("t3"), t("t4"), eq("t3", "a", "t4", "b"));
    let config = JoinOrderConfig {
        explode_outer_joins: false,
    };
    let mut jo = JoinOrder::new(vec![t("t1"), loj], vec![eq("t1", "a", "t3", "b")], &config);
    assert_eq!(jo.components().len(), 2);
    assert_eq!(jo.edges().len(), 1);

    let result = QueryOrder.order(&mut jo).expect("plan");
    let plan = result.plan().expect("populated");
    assert_eq!(plan.join_type(), Some(JoinType::Inner));
    assert!(matches!(
        plan.children[1].op,
        LogicalOp::Join {
            join_type: JoinType::Left,
            ..
        }
    ));
}

#[test]
fn test_empty_seed_collects_single_table_filters() {
    let local = Expr::BinaryOp {
        op: BinaryOp::Gt,
        left: Box::new(Expr::Column(col("t1", "a"))),
        right: Box::new(Expr::Literal(ScalarValue::Int64(10))),
    };
    let mut jo = JoinOrder::new(
        vec![t("t1"), t("t2")],
        vec![eq("t1", "a", "t2", "b"), local.clone()],
        &JoinOrderConfig::default(),
    );

    let seeded = jo.combine(&Component::empty(), jo.component(0));
    jo.mark_used(&seeded);
    assert!(jo.edge(1).is_used());
    assert!(!jo.edge(0).is_used());

    let joined = jo.combine(&seeded, jo.component(1));
    let plan = joined.plan().expect("populated");
    assert_eq!(plan.predicate(), Some(&eq("t1", "a", "t2", "b")));
    assert_eq!(plan.children[0].predicate(), Some(&local));
}
