//! Domain models for Costplan.
//!
//! # Core Concepts
//!
//! An estimate decomposes a project's scope of work into a tree:
//!
//! - [`Project`]: Top-level container, one estimate tree per project.
//! - [`Stage`]: A named grouping of work. Stages can nest under other stages.
//! - [`Task`]: A unit of work under a stage, with its own volume and unit of
//!   measure. Tasks can nest under other tasks within the same stage.
//! - [`Resource`]: A leaf cost line (labor/material/equipment/overhead)
//!   attached to a task. Resources carry the only stored money figures;
//!   everything above them is derived by rollup.
//! - [`Markup`]: A project-level percentage or fixed adjustment, applied in
//!   sort order to the rolled-up subtotal. Tax markups are reported
//!   separately from the rest.
//! - [`UnitMeasure`]: Dictionary entry referenced by tasks and resources.

mod markup;
mod project;
mod resource;
mod stage;
mod task;
mod unit;

pub use markup::*;
pub use project::*;
pub use resource::*;
pub use stage::*;
pub use task::*;
pub use unit::*;
