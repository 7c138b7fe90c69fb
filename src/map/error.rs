use crate::filter::FilterError;
use crate::storage::StorageError;
use crate::trace::TransactionId;

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MapError {
    pub fn invalid(message: impl Into<String>) -> Self {
        MapError::InvalidArgument(message.into())
    }
}

impl From<FilterError> for MapError {
    fn from(err: FilterError) -> Self {
        MapError::InvalidArgument(err.to_string())
    }
}
