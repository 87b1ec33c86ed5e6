use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit-of-measure dictionary entry (m2, mb, szt, kpl, ...).
///
/// Referenced by tasks and resources. The dictionary is company-wide,
/// not scoped to a project; a default set is seeded by migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitMeasure {
    pub id: Uuid,
    /// Short code shown in tables and CSV exports, e.g. "m2".
    pub code: String,
    pub name: String,
}

/// Input for adding a unit to the dictionary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUnitInput {
    pub code: String,
    pub name: String,
}
