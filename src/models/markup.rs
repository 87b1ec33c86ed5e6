use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A project-level adjustment applied once to the whole estimate subtotal.
///
/// Markups are applied strictly in `sort_order`. Percent markups compound
/// on the running total at the moment they are processed, so order matters
/// and is persisted explicitly rather than relying on load order. Markups
/// flagged `is_tax` accumulate into a separate tax figure so the summary
/// can report net adjustments and tax as distinct lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Markup {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub value: f64,
    pub kind: MarkupKind,
    pub is_tax: bool,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

/// Whether a markup is a percentage of the running total or a fixed amount.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarkupKind {
    Percent,
    Fixed,
}

impl MarkupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percent => "percent",
            Self::Fixed => "fixed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "percent" => Some(Self::Percent),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }
}

/// Input for creating a new project-level markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMarkupInput {
    pub name: String,
    pub value: f64,
    pub kind: MarkupKind,
    #[serde(default)]
    pub is_tax: bool,
}
