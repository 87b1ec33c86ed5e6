//! The estimate engine: pure computation over a project's estimate tree.
//!
//! The store keeps stages, tasks and resources as flat rows with parent-id
//! back-references. This module turns one project's rows into a forest
//! ([`tree`]), sums resource costs bottom-up through tasks and stages
//! ([`rollup`]), and applies the project-level markup list to the rolled-up
//! subtotal ([`pipeline`]). [`valuation`] holds the per-resource formulas.
//!
//! Everything here is side-effect free and recomputed in full on each call;
//! the db layer decides when to re-run it (after every mutation).

pub mod pipeline;
pub mod rollup;
pub mod tree;
pub mod valuation;

pub use pipeline::{apply_markups, EstimateSummary};
pub use rollup::{forest_totals, stage_totals, task_totals, Totals};
pub use tree::{build_forest, flatten};
pub use valuation::{derive_costs, DerivedCosts};
