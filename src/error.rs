use crate::model::BlockId;
use crate::store::StoreError;

/// Failures surfaced to booking flows.
///
/// `Conflict` and `Validation` carry the user-facing message verbatim; callers
/// show it as-is.
#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    /// The window was taken, possibly by a request racing this one. Re-run the
    /// search and offer alternatives.
    #[error("{0}")]
    Conflict(String),
    #[error("availability block not found: {0}")]
    NotFound(BlockId),
    #[error("{0}")]
    Validation(String),
    /// Infrastructure failure, passed through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AvailabilityError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, AvailabilityError::Conflict(_))
    }
}
