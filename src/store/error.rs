use chrono::NaiveDate;

use crate::model::{BlockId, VehicleId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write would overlap an existing block on the same vehicle and date.
    /// This is the only expected failure of an insert.
    #[error("time range overlaps an existing block on vehicle {vehicle_id} for {date}")]
    Exclusion {
        vehicle_id: VehicleId,
        date: NaiveDate,
        conflicting: Option<BlockId>,
    },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    Wal(String),
    #[error("corrupt block row: {0}")]
    Corrupt(String),
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn is_exclusion(&self) -> bool {
        matches!(self, StoreError::Exclusion { .. })
    }
}
