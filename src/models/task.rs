use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::resource::Resource;

/// A unit of work belonging to exactly one stage.
///
/// Tasks can nest under other tasks of the same stage via `parent_id`.
/// Volume and unit describe the task's own scope of work; cost is never
/// stored on the task, only derived from its resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub stage_id: Uuid,
    /// Parent task for nesting. `None` means the task hangs directly off its stage.
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub code: Option<String>,
    /// Quantity of work, in `unit_id` units. Never negative.
    pub volume: f64,
    pub unit_id: Option<Uuid>,
    /// Grouping-only tasks hold child tasks rather than their own scope.
    pub is_group: bool,
    pub calc_mode: CalcMode,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How a task's cost is computed.
///
/// Only `ByResources` (sum of attached resource lines) is implemented;
/// the enum leaves room for normative/per-unit pricing modes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CalcMode {
    ByResources,
}

impl CalcMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ByResources => "by_resources",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "by_resources" => Some(Self::ByResources),
            _ => None,
        }
    }
}

/// Input for creating a new task under a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskInput {
    /// Parent task for nesting. `None` attaches the task directly to the stage.
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub code: Option<String>,
    /// Quantity of work. Defaults to 1 if not specified.
    pub volume: Option<f64>,
    pub unit_id: Option<Uuid>,
    #[serde(default)]
    pub is_group: bool,
}

/// Input for updating an existing task. All fields are optional for partial updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTaskInput {
    pub parent_id: Option<Uuid>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub volume: Option<f64>,
    pub unit_id: Option<Uuid>,
    pub is_group: Option<bool>,
}

/// A task with its nested child tasks and directly attached resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTreeNode {
    #[serde(flatten)]
    pub task: Task,
    pub children: Vec<TaskTreeNode>,
    pub resources: Vec<Resource>,
}
