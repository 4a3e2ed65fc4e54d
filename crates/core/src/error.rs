use crate::types::DbId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid income value: {value:?}")]
    InvalidIncome { value: String },

    #[error("Malformed coordinates on recipient {record_id}: {reason}")]
    MalformedCoordinate { record_id: DbId, reason: String },
}
