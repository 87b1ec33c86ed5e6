use uuid::Uuid;

/// Errors surfaced by the estimate store and engine.
///
/// Every failed mutation leaves the store exactly as it was; callers can
/// keep displaying the previously loaded tree and totals.
#[derive(Debug, thiserror::Error)]
pub enum EstimateError {
    /// A caller-supplied field is missing or out of domain (blank name,
    /// negative volume or price, cyclic parent chain). Raised before any
    /// write or valuation happens.
    #[error("{0}")]
    Validation(String),

    /// Update or delete referenced an id that does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// A cascading delete could not be completed in full. The transaction
    /// was rolled back and nothing was removed.
    #[error("cascade delete failed: {0}")]
    Cascade(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

impl EstimateError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

pub type Result<T, E = EstimateError> = std::result::Result<T, E>;
