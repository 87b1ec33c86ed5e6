use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A leaf cost line attached to exactly one task.
///
/// Resources are the only place money enters the estimate. The three
/// derived fields are recomputed from the base fields on every write:
///
/// ```text
/// cost              = volume * price
/// price_with_markup = price * (1 + markup / 100)
/// cost_with_markup  = volume * price_with_markup
/// ```
///
/// A stored derived value that disagrees with the formulas is a
/// correctness bug, not a display concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub project_id: Uuid,
    pub task_id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub resource_type: ResourceType,
    pub unit_id: Option<Uuid>,
    /// Quantity, never negative.
    pub volume: f64,
    /// Unit price before markup, never negative.
    pub price: f64,
    /// Markup percent. Negative values are discounts.
    pub markup: f64,
    pub cost: f64,
    pub price_with_markup: f64,
    pub cost_with_markup: f64,
    /// Optional reference (supplier page, price-list entry).
    pub url: Option<String>,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The kind of cost a resource line represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Labor,
    Material,
    Equipment,
    Overhead,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Labor => "labor",
            Self::Material => "material",
            Self::Equipment => "equipment",
            Self::Overhead => "overhead",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "labor" => Some(Self::Labor),
            "material" => Some(Self::Material),
            "equipment" => Some(Self::Equipment),
            "overhead" => Some(Self::Overhead),
            _ => None,
        }
    }
}

/// Input for creating a new resource under a task.
///
/// Derived fields are not accepted as input; they are computed before the
/// insert and on every subsequent base-field update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResourceInput {
    pub name: String,
    pub code: Option<String>,
    pub resource_type: ResourceType,
    pub unit_id: Option<Uuid>,
    /// Quantity. Defaults to 1 if not specified.
    pub volume: Option<f64>,
    /// Unit price before markup. Defaults to 0.
    #[serde(default)]
    pub price: f64,
    /// Markup percent. Defaults to 0.
    #[serde(default)]
    pub markup: f64,
    pub url: Option<String>,
}

/// Input for updating a resource's base fields. All fields are optional for
/// partial updates; the derived fields are recomputed from the merged state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResourceInput {
    pub name: Option<String>,
    pub code: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub unit_id: Option<Uuid>,
    pub volume: Option<f64>,
    pub price: Option<f64>,
    pub markup: Option<f64>,
    pub url: Option<String>,
}
