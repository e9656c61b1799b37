//! # optx-core: N-ary Join Ordering Core
//!
//! This crate turns a flattened n-ary join into a join hypergraph and provides the
//! primitives a search strategy needs to assemble a binary join tree from it, while
//! keeping any left outer joins embedded in the n-ary join semantically intact.
//!
//! ## Module Overview
//!
//! - **`join_order`**: The join order core: components, edges, LOJ explosion, incidence,
//!   combination legality and combination construction.
//! - **`strategy`**: The `JoinOrderStrategy` trait and the query-order baseline strategy.
//! - **`bitset`**: Growable index sets identifying components and edge incidence.
//! - **`expr`**: Scalar expression definitions (columns, literals, predicates).
//! - **`plan`**: Shared, immutable logical subtrees (scan, filter, join) that components carry.
//! - **`stats`**: Statistics structures and derivation formulas for cardinality estimation.
//! - **`catalog`**: Catalog trait for accessing table metadata and statistics.

pub mod bitset;
pub mod catalog;
pub mod expr;
pub mod join_order;
pub mod plan;
pub mod stats;
pub mod strategy;
