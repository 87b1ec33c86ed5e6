//! Flat rows → estimate forest.
//!
//! Stages, tasks and resources arrive as unordered flat lists carrying
//! parent-id back-references. Nodes are grouped into id-keyed maps in one
//! pass and threaded into a forest by lookup, so no node is ever borrowed
//! from two places at once.
//!
//! A parent id that does not resolve within the same load (dangling
//! reference, or a parent filtered out by project scoping) demotes the node
//! to a root. That is a defined fallback, not an error. A parent chain that
//! loops is an error: rollup would never terminate on it, so the build
//! rejects it up front.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::{EstimateError, Result};
use crate::models::{Resource, Stage, StageTreeNode, Task, TaskTreeNode};

/// Assemble one project's flat rows into a forest of stage nodes.
///
/// Row order is preserved: siblings appear in the order their rows were
/// given (the db layer orders by `sort_order`).
pub fn build_forest(
    stages: Vec<Stage>,
    tasks: Vec<Task>,
    resources: Vec<Resource>,
) -> Result<Vec<StageTreeNode>> {
    check_acyclic("stage", stages.iter().map(|s| (s.id, s.parent_id)))?;
    check_acyclic("task", tasks.iter().map(|t| (t.id, t.parent_id)))?;

    let stage_ids: HashSet<Uuid> = stages.iter().map(|s| s.id).collect();
    let task_ids: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();

    // Resources attach directly to their owning task; a resource whose task
    // is not part of this load has nowhere to hang and is dropped.
    let mut resources_by_task: HashMap<Uuid, Vec<Resource>> = HashMap::new();
    for resource in resources {
        if task_ids.contains(&resource.task_id) {
            resources_by_task
                .entry(resource.task_id)
                .or_default()
                .push(resource);
        }
    }

    // Thread tasks under their parent task when the parent is in this load,
    // otherwise treat them as stage-root tasks.
    let mut child_tasks: HashMap<Uuid, Vec<Task>> = HashMap::new();
    let mut stage_root_tasks: HashMap<Uuid, Vec<Task>> = HashMap::new();
    for task in tasks {
        match task.parent_id.filter(|p| task_ids.contains(p)) {
            Some(parent) => child_tasks.entry(parent).or_default().push(task),
            None => stage_root_tasks
                .entry(task.stage_id)
                .or_default()
                .push(task),
        }
    }

    // Same threading for stages; a stage without a resolvable parent is a
    // tree root.
    let mut child_stages: HashMap<Uuid, Vec<Stage>> = HashMap::new();
    let mut root_stages: Vec<Stage> = Vec::new();
    for stage in stages {
        match stage.parent_id.filter(|p| stage_ids.contains(p)) {
            Some(parent) => child_stages.entry(parent).or_default().push(stage),
            None => root_stages.push(stage),
        }
    }

    let mut ctx = BuildContext {
        child_stages,
        child_tasks,
        stage_root_tasks,
        resources_by_task,
    };

    Ok(root_stages
        .into_iter()
        .map(|stage| ctx.build_stage(stage))
        .collect())
}

struct BuildContext {
    child_stages: HashMap<Uuid, Vec<Stage>>,
    child_tasks: HashMap<Uuid, Vec<Task>>,
    stage_root_tasks: HashMap<Uuid, Vec<Task>>,
    resources_by_task: HashMap<Uuid, Vec<Resource>>,
}

impl BuildContext {
    fn build_stage(&mut self, stage: Stage) -> StageTreeNode {
        let tasks = self
            .stage_root_tasks
            .remove(&stage.id)
            .unwrap_or_default()
            .into_iter()
            .map(|t| self.build_task(t))
            .collect();
        let children = self
            .child_stages
            .remove(&stage.id)
            .unwrap_or_default()
            .into_iter()
            .map(|s| self.build_stage(s))
            .collect();
        StageTreeNode {
            stage,
            children,
            tasks,
        }
    }

    fn build_task(&mut self, task: Task) -> TaskTreeNode {
        let children = self
            .child_tasks
            .remove(&task.id)
            .unwrap_or_default()
            .into_iter()
            .map(|t| self.build_task(t))
            .collect();
        let resources = self.resources_by_task.remove(&task.id).unwrap_or_default();
        TaskTreeNode {
            task,
            children,
            resources,
        }
    }
}

/// Reject parent chains that loop among the loaded rows.
///
/// Each chain is walked at most once: nodes proven to reach a root are
/// remembered and terminate later walks early.
fn check_acyclic(
    entity: &'static str,
    links: impl Iterator<Item = (Uuid, Option<Uuid>)>,
) -> Result<()> {
    let links: HashMap<Uuid, Option<Uuid>> = links.collect();
    let mut cleared: HashSet<Uuid> = HashSet::new();

    for &start in links.keys() {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut current = start;
        loop {
            if cleared.contains(&current) {
                break;
            }
            if !seen.insert(current) {
                return Err(EstimateError::validation(format!(
                    "{entity} {current} is part of a parent-chain cycle"
                )));
            }
            match links.get(&current).copied().flatten() {
                // A parent outside the load is the dangling-reference
                // fallback; the chain terminates there.
                Some(parent) if links.contains_key(&parent) => current = parent,
                _ => break,
            }
        }
        cleared.extend(seen);
    }

    Ok(())
}

/// Invert [`build_forest`]: collect a forest back into the three flat lists.
///
/// Used to verify the build is lossless; rows come back in tree order.
pub fn flatten(forest: &[StageTreeNode]) -> (Vec<Stage>, Vec<Task>, Vec<Resource>) {
    let mut stages = Vec::new();
    let mut tasks = Vec::new();
    let mut resources = Vec::new();
    for node in forest {
        flatten_stage(node, &mut stages, &mut tasks, &mut resources);
    }
    (stages, tasks, resources)
}

fn flatten_stage(
    node: &StageTreeNode,
    stages: &mut Vec<Stage>,
    tasks: &mut Vec<Task>,
    resources: &mut Vec<Resource>,
) {
    stages.push(node.stage.clone());
    for task in &node.tasks {
        flatten_task(task, tasks, resources);
    }
    for child in &node.children {
        flatten_stage(child, stages, tasks, resources);
    }
}

fn flatten_task(node: &TaskTreeNode, tasks: &mut Vec<Task>, resources: &mut Vec<Resource>) {
    tasks.push(node.task.clone());
    resources.extend(node.resources.iter().cloned());
    for child in &node.children {
        flatten_task(child, tasks, resources);
    }
}
