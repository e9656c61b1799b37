//! # Join Order Core
//!
//! This module turns a flattened n-ary join (a list of joinable inputs plus a list of
//! conjunctive predicates) into a join hypergraph and provides the primitive that
//! search strategies use to build a binary join tree from it: combining two components
//! into one.
//!
//! ## Hypergraph Model
//!
//! - A **component** is a joinable sub-result. Its `id_set` names the original inputs it
//!   covers; freshly built components cover exactly their own array index.
//! - An **edge** is one conjunctive predicate. Its `incident_components` are all the
//!   components whose output columns the predicate reads, so a single edge can connect
//!   more than two components.
//!
//! Incidence is computed once at construction ([`JoinOrder::new`]) in both directions:
//! each edge records its components and each component records its edges.
//!
//! ## Embedded Left Outer Joins
//!
//! A left outer join (LOJ) that appears as a direct child of the n-ary join is
//! *exploded*: its left and right inputs become two separate components tagged with a
//! shared LOJ id and their side, and the LOJ's condition becomes an ordinary edge. The
//! tags constrain which combinations are legal:
//!
//! ```text
//! NAryJoin
//! |-- Scan t1                       -> component 0, untagged
//! |-- Scan t2                       -> component 1, untagged
//! |-- LeftOuterJoin [p34]
//! |   |-- Scan t3                   -> component 2, (LOJ 1, Left)
//! |   +-- Scan t4                   -> component 3, (LOJ 1, Right)
//! +-- [p12]                         -> edges: [p12, p34]
//! ```
//!
//! - t1 with t2, or t1 with t3: legal, inner join. Combining with t3 carries the
//!   (LOJ 1, Left) tag forward, since the LOJ is still waiting for its right side.
//! - t3 with t4 (either order): legal, produces `t3 LEFT JOIN t4` and clears the tag.
//! - t4 with anything other than its left sibling: illegal.
//! - children of two different LOJs: illegal.
//!
//! ## Caller Contract
//!
//! Search strategies own the order of combination. They must check
//! [`JoinOrder::is_valid_combination`] before [`JoinOrder::combine`], and call
//! [`JoinOrder::mark_used`] once they accept a combined component so that its predicates
//! are not applied again higher up in the tree. Violating the contract panics.

use crate::bitset::BitSet;
use crate::catalog::InMemoryCatalog;
use crate::expr::{ColumnSet, Expr, JoinType};
use crate::plan::{LogicalOp, PlanNode, PlanRef};
use crate::stats::{self, CatalogStatsEstimator, Statistics, StatsEstimator};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, trace};

/// Identifier of an exploded left outer join. Ids are assigned sequentially from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LojId(NonZeroU32);

impl LojId {
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(LojId)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for LojId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which input of its parent LOJ a component came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// LOJ provenance of a component: the parent LOJ and the side it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OuterJoinChild {
    pub loj_id: LojId,
    pub side: Side,
}

/// Payload state of a component.
///
/// `Empty` is the placeholder a strategy seeds its search with: it covers nothing and
/// has no subtree. Combining it with a populated component wraps that component's plan
/// in a filter made of the predicates the component alone already satisfies.
#[derive(Debug, Clone)]
pub enum ComponentState {
    Empty,
    Populated(PlanRef),
}

/// A joinable unit of the hypergraph.
#[derive(Debug, Clone)]
pub struct Component {
    id_set: BitSet,
    incident_edges: BitSet,
    state: ComponentState,
    outer_join: Option<OuterJoinChild>,
    /// Set on components built by [`JoinOrder::combine`].
    combined: bool,
}

impl Component {
    /// The placeholder component used to start a search.
    pub fn empty() -> Self {
        Self {
            id_set: BitSet::new(),
            incident_edges: BitSet::new(),
            state: ComponentState::Empty,
            outer_join: None,
            combined: false,
        }
    }

    fn base(plan: PlanRef, index: usize, outer_join: Option<OuterJoinChild>) -> Self {
        Self {
            id_set: BitSet::singleton(index),
            incident_edges: BitSet::new(),
            state: ComponentState::Populated(plan),
            outer_join,
            combined: false,
        }
    }

    /// Original inputs covered by this component.
    pub fn id_set(&self) -> &BitSet {
        &self.id_set
    }

    /// Edges that reference this component's output.
    pub fn incident_edges(&self) -> &BitSet {
        &self.incident_edges
    }

    pub fn state(&self) -> &ComponentState {
        &self.state
    }

    /// The component's subtree, or `None` for the empty placeholder.
    pub fn plan(&self) -> Option<&PlanRef> {
        match &self.state {
            ComponentState::Empty => None,
            ComponentState::Populated(plan) => Some(plan),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.state, ComponentState::Empty)
    }

    pub fn outer_join(&self) -> Option<OuterJoinChild> {
        self.outer_join
    }

    fn side(&self) -> Option<Side> {
        self.outer_join.map(|o| o.side)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Component: {}", self.id_set)?;
        match &self.state {
            ComponentState::Empty => writeln!(f, "<empty>")?,
            ComponentState::Populated(plan) => write!(f, "{}", plan)?,
        }
        if let Some(oj) = self.outer_join {
            writeln!(f, "Parent LOJ id: {}", oj.loj_id)?;
            writeln!(f, "Child Position: {:?}", oj.side)?;
        }
        Ok(())
    }
}

/// One conjunctive predicate of the n-ary join.
#[derive(Debug, Clone)]
pub struct Edge {
    predicate: Expr,
    used_columns: ColumnSet,
    incident_components: BitSet,
    used: bool,
}

impl Edge {
    fn new(predicate: Expr) -> Self {
        let used_columns = predicate.used_columns();
        Self {
            predicate,
            used_columns,
            incident_components: BitSet::new(),
            used: false,
        }
    }

    pub fn predicate(&self) -> &Expr {
        &self.predicate
    }

    /// Components whose output this predicate references.
    pub fn incident_components(&self) -> &BitSet {
        &self.incident_components
    }

    /// Whether an accepted combination has already applied this predicate.
    pub fn is_used(&self) -> bool {
        self.used
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Edge : {}", self.incident_components)?;
        writeln!(f, "{}", self.predicate)
    }
}

/// Construction options for [`JoinOrder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinOrderConfig {
    /// Split left outer joins found among the n-ary join's children into paired
    /// left/right components. When off, such a child stays a single component.
    pub explode_outer_joins: bool,
}

impl Default for JoinOrderConfig {
    fn default() -> Self {
        Self {
            explode_outer_joins: true,
        }
    }
}

/// The join hypergraph of one n-ary join.
///
/// Owns the base components and the edges for its lifetime. Components produced by
/// [`JoinOrder::combine`] are new values owned by the caller; the arrays here never
/// change length, so indices stored in bitsets stay valid.
pub struct JoinOrder {
    components: Vec<Component>,
    edges: Vec<Edge>,
    num_outer_joins: usize,
    estimator: Arc<dyn StatsEstimator>,
}

impl JoinOrder {
    /// Build the hypergraph for an n-ary join over `children` with the conjuncts
    /// `predicates`.
    ///
    /// With `explode_outer_joins`, each child that is a left outer join contributes two
    /// components (its left and right input) and appends its condition to the
    /// predicates. Every other child contributes one component.
    pub fn new(
        children: Vec<PlanRef>,
        mut predicates: Vec<Expr>,
        config: &JoinOrderConfig,
    ) -> Self {
        let num_children = children.len();
        let mut components = Vec::with_capacity(num_children);
        let mut num_outer_joins = 0u32;

        for child in children {
            let loj = match &child.op {
                LogicalOp::Join {
                    join_type: JoinType::Left,
                    condition,
                } if config.explode_outer_joins => Some(condition.clone()),
                _ => None,
            };

            match loj {
                Some(condition) => {
                    let loj_id = LojId(NonZeroU32::MIN.saturating_add(num_outer_joins));
                    num_outer_joins += 1;
                    let left_index = components.len();
                    components.push(Component::base(
                        child.children[0].clone(),
                        left_index,
                        Some(OuterJoinChild {
                            loj_id,
                            side: Side::Left,
                        }),
                    ));
                    components.push(Component::base(
                        child.children[1].clone(),
                        left_index + 1,
                        Some(OuterJoinChild {
                            loj_id,
                            side: Side::Right,
                        }),
                    ));
                    predicates.push(condition);
                }
                None => {
                    let index = components.len();
                    components.push(Component::base(child, index, None));
                }
            }
        }

        let edges = predicates.into_iter().map(Edge::new).collect();
        let estimator: Arc<dyn StatsEstimator> =
            Arc::new(CatalogStatsEstimator::new(Arc::new(InMemoryCatalog::new())));

        let mut join_order = Self {
            components,
            edges,
            num_outer_joins: num_outer_joins as usize,
            estimator,
        };
        join_order.compute_cover();

        debug!(
            children = num_children,
            components = join_order.components.len(),
            edges = join_order.edges.len(),
            outer_joins = join_order.num_outer_joins,
            "built join order hypergraph"
        );
        trace!("{}", join_order);
        join_order
    }

    /// Use `estimator` for [`JoinOrder::ensure_stats`] instead of the catalog-less default.
    pub fn with_stats_estimator(mut self, estimator: Arc<dyn StatsEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Fill in the edge/component incidence in both directions: an edge touches a
    /// component when the predicate's used columns intersect the component's output.
    fn compute_cover(&mut self) {
        let outputs: Vec<ColumnSet> = self
            .components
            .iter()
            .map(|c| c.plan().map(|p| p.output_columns()).unwrap_or_default())
            .collect();

        for (edge_index, edge) in self.edges.iter_mut().enumerate() {
            for (comp_index, output) in outputs.iter().enumerate() {
                if !edge.used_columns.is_disjoint(output) {
                    edge.incident_components.insert(comp_index);
                    self.components[comp_index].incident_edges.insert(edge_index);
                }
            }
        }

        debug_assert!(self.edges.iter().enumerate().all(|(e, edge)| {
            edge.incident_components
                .iter()
                .all(|c| self.components[c].incident_edges.contains(e))
        }));
    }

    /// Whether `c1` and `c2` may be joined without breaking an embedded LOJ.
    ///
    /// Symmetric in its arguments.
    pub fn is_valid_combination(&self, c1: &Component, c2: &Component) -> bool {
        match (c1.outer_join, c2.outer_join) {
            (None, None) => true,
            (Some(a), Some(b)) => a.loj_id == b.loj_id && a.side != b.side,
            // A lone LOJ child may only be joined while it is the preserved side.
            (Some(oj), None) | (None, Some(oj)) => oj.side == Side::Left,
        }
    }

    /// Whether `c1` and `c2` are the two inputs of the same LOJ.
    pub fn is_sibling(&self, c1: &Component, c2: &Component) -> bool {
        match (c1.outer_join, c2.outer_join) {
            (Some(a), Some(b)) => a.loj_id == b.loj_id && a.side != b.side,
            _ => false,
        }
    }

    /// Combine two components into a new one, folding in every unused predicate that
    /// the union of their coverage now fully resolves.
    ///
    /// - With an empty placeholder on either side, the other side's plan is wrapped in
    ///   a filter and keeps its LOJ provenance.
    /// - Siblings of one LOJ become a left outer join with the `Left`-tagged input on the
    ///   left, whatever the argument order; the result is untagged.
    /// - Anything else becomes an inner join. A pending `Left` tag is carried forward.
    ///
    /// Neither input is modified. Panics if the combination is not valid.
    pub fn combine(&self, c1: &Component, c2: &Component) -> Component {
        assert!(
            self.is_valid_combination(c1, c2),
            "illegal join combination of {} (loj {:?}) and {} (loj {:?})",
            c1.id_set,
            c1.outer_join,
            c2.id_set,
            c2.outer_join
        );

        let id_set = c1.id_set.union(&c2.id_set);
        let incident_edges = c1.incident_edges.union(&c2.incident_edges);

        let conjuncts: Vec<Expr> = self
            .edges
            .iter()
            .filter(|e| !e.used && id_set.contains_all(&e.incident_components))
            .map(|e| e.predicate.clone())
            .collect();
        let num_conjuncts = conjuncts.len();
        let condition = Expr::conjunction(conjuncts);

        let (state, outer_join) = match (&c1.state, &c2.state) {
            (ComponentState::Empty, ComponentState::Empty) => (ComponentState::Empty, None),
            (ComponentState::Empty, ComponentState::Populated(plan)) => (
                ComponentState::Populated(PlanNode::filter(plan.clone(), condition)),
                c2.outer_join,
            ),
            (ComponentState::Populated(plan), ComponentState::Empty) => (
                ComponentState::Populated(PlanNode::filter(plan.clone(), condition)),
                c1.outer_join,
            ),
            (ComponentState::Populated(p1), ComponentState::Populated(p2)) => {
                if self.is_sibling(c1, c2) {
                    let (left, right) = if c1.side() == Some(Side::Left) {
                        (p1.clone(), p2.clone())
                    } else {
                        (p2.clone(), p1.clone())
                    };
                    let join = PlanNode::left_outer_join(left, right, condition);
                    (ComponentState::Populated(join), None)
                } else {
                    debug_assert!(c1.outer_join.is_none() || c2.outer_join.is_none());
                    let outer_join = c1.outer_join.or(c2.outer_join);
                    if let Some(oj) = outer_join {
                        assert_eq!(
                            oj.side,
                            Side::Left,
                            "only the left input of LOJ {} may be joined before its sibling",
                            oj.loj_id
                        );
                    }
                    let join = PlanNode::inner_join(p1.clone(), p2.clone(), condition);
                    (ComponentState::Populated(join), outer_join)
                }
            }
        };

        trace!(
            left = %c1.id_set,
            right = %c2.id_set,
            result = %id_set,
            predicates = num_conjuncts,
            "combined components"
        );

        Component {
            id_set,
            incident_edges,
            state,
            outer_join,
            combined: true,
        }
    }

    /// Mark the predicates applied by an accepted component as used.
    ///
    /// Only components whose plan root carries a predicate (filter or join) can have
    /// applied anything; for a bare leaf or the empty placeholder this is a no-op.
    ///
    /// Marks every unused incident edge fully covered by the component. For a component
    /// built by [`JoinOrder::combine`], edges that reference no component at all are
    /// marked too: `combine` folds them into the first combination it builds. A base
    /// component (such as an LOJ kept whole) never had them applied, so they stay unused.
    pub fn mark_used(&mut self, component: &Component) {
        let Some(plan) = component.plan() else {
            return;
        };
        if !plan.has_predicate() {
            return;
        }

        for edge_index in component.incident_edges.iter() {
            let edge = &mut self.edges[edge_index];
            if !edge.used && component.id_set.contains_all(&edge.incident_components) {
                edge.used = true;
                trace!(edge = edge_index, predicate = %edge.predicate, "edge used");
            }
        }
        if component.combined {
            for edge in self.edges.iter_mut().filter(|e| e.incident_components.is_empty()) {
                edge.used = true;
            }
        }
    }

    /// Derive and cache statistics for `plan` if it has none yet.
    pub fn ensure_stats<'a>(&self, plan: &'a PlanRef) -> &'a Statistics {
        stats::ensure_stats(plan, self.estimator.as_ref())
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Panics if `index` is out of range.
    pub fn component(&self, index: usize) -> &Component {
        &self.components[index]
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Panics if `index` is out of range.
    pub fn edge(&self, index: usize) -> &Edge {
        &self.edges[index]
    }

    /// Number of left outer joins that were exploded into component pairs.
    pub fn num_outer_joins(&self) -> usize {
        self.num_outer_joins
    }

    pub fn all_edges_used(&self) -> bool {
        self.edges.iter().all(|e| e.used)
    }

    /// Edge indices ordered by how many components each edge touches, ties broken by
    /// the hash of the incident set. Single-relation predicates come first, so a
    /// strategy that applies edges in this order never places them above joins.
    pub fn edges_by_length(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.edges.len()).collect();
        order.sort_by_key(|&i| {
            let incident = &self.edges[i].incident_components;
            (incident.len(), incident.hash_value())
        });
        order
    }
}

impl fmt::Display for JoinOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Join Order: ")?;
        writeln!(f, "Edges: {}", self.edges.len())?;
        for edge in &self.edges {
            writeln!(f, "{}", edge)?;
        }
        writeln!(f, "Components: {}", self.components.len())?;
        for (i, component) in self.components.iter().enumerate() {
            writeln!(f, "{} - ", i)?;
            write!(f, "{}", component)?;
        }
        Ok(())
    }
}

impl fmt::Debug for JoinOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinOrder")
            .field("components", &self.components)
            .field("edges", &self.edges)
            .field("num_outer_joins", &self.num_outer_joins)
            .finish_non_exhaustive()
    }
}
