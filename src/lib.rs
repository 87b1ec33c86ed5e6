//! Costplan: construction cost estimation with hierarchical estimate trees.
//!
//! A project's scope of work is decomposed into stages, tasks and priced
//! resources; [`estimate`] rolls the tree up into a bottom line subject to
//! project-level markups and tax. [`db`] is the SQLite-backed store and
//! mutation layer, [`api`] the HTTP surface, [`export`] the CSV output.

pub mod api;
pub mod db;
pub mod error;
pub mod estimate;
pub mod export;
pub mod models;
