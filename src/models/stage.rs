use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskTreeNode;

/// A named grouping of work within a project's estimate.
///
/// Stages form a forest via `parent_id`: a stage with no parent is a tree
/// root, a stage whose parent is another stage of the same project nests
/// under it. Stages carry no money figures of their own; their totals are
/// rolled up from the resources reachable underneath them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Parent stage for nesting. `None` means tree root.
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub code: Option<String>,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStageInput {
    /// Parent stage ID for nesting. `None` creates a root stage.
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub code: Option<String>,
}

/// Input for updating an existing stage. All fields are optional for partial updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStageInput {
    pub parent_id: Option<Uuid>,
    pub name: Option<String>,
    pub code: Option<String>,
}

/// A stage with its nested children and root tasks, used for tree responses.
///
/// The `stage` fields are flattened into the JSON response, with additional
/// `children` (nested stages) and `tasks` (tasks of this stage that have no
/// parent task) arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTreeNode {
    #[serde(flatten)]
    pub stage: Stage,
    pub children: Vec<StageTreeNode>,
    pub tasks: Vec<TaskTreeNode>,
}
