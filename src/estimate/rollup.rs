//! Bottom-up cost aggregation over the estimate forest.

use serde::{Deserialize, Serialize};

use crate::models::{StageTreeNode, TaskTreeNode};

/// A node's rolled-up cost, tracked in plain and with-markup variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub cost: f64,
    pub cost_with_markup: f64,
}

impl Totals {
    fn add(&mut self, other: Totals) {
        self.cost += other.cost;
        self.cost_with_markup += other.cost_with_markup;
    }
}

/// Sum of a task's direct resources plus all of its child tasks.
pub fn task_totals(node: &TaskTreeNode) -> Totals {
    let mut totals = Totals::default();
    for resource in &node.resources {
        totals.cost += resource.cost;
        totals.cost_with_markup += resource.cost_with_markup;
    }
    for child in &node.children {
        totals.add(task_totals(child));
    }
    totals
}

/// Sum of a stage's root tasks plus all of its child stages.
pub fn stage_totals(node: &StageTreeNode) -> Totals {
    let mut totals = Totals::default();
    for task in &node.tasks {
        totals.add(task_totals(task));
    }
    for child in &node.children {
        totals.add(stage_totals(child));
    }
    totals
}

/// Project subtotal: sum over all root stages.
///
/// Pure summation, so the result does not depend on sibling order. The
/// engine is stateless; the store re-runs it after every mutation rather
/// than patching cached figures.
pub fn forest_totals(forest: &[StageTreeNode]) -> Totals {
    let mut totals = Totals::default();
    for stage in forest {
        totals.add(stage_totals(stage));
    }
    totals
}
