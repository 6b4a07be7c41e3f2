use shared::{CommandError, CommandErrorCode, TableNumber};
use thiserror::Error;

/// Registry / validator errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Table {0} already has an open order")]
    AlreadyOpen(TableNumber),

    #[error("Table {0} has no open order")]
    NotFound(TableNumber),

    #[error("Target table {0} is already occupied")]
    TargetOccupied(TableNumber),

    #[error("Stale sequence for table {table}: client saw {expected}, current is {current}")]
    StaleSequence {
        table: TableNumber,
        expected: u64,
        current: u64,
    },

    #[error("Malformed payload: {0}")]
    Malformed(String),
}

impl OrderError {
    pub fn malformed(message: impl Into<String>) -> Self {
        OrderError::Malformed(message.into())
    }

    pub fn code(&self) -> CommandErrorCode {
        match self {
            OrderError::AlreadyOpen(_) => CommandErrorCode::AlreadyOpen,
            OrderError::NotFound(_) => CommandErrorCode::NotFound,
            OrderError::TargetOccupied(_) => CommandErrorCode::TargetOccupied,
            OrderError::StaleSequence { .. } => CommandErrorCode::StaleSequence,
            OrderError::Malformed(_) => CommandErrorCode::MalformedPayload,
        }
    }
}

impl From<OrderError> for CommandError {
    fn from(err: OrderError) -> Self {
        CommandError::new(err.code(), err.to_string())
    }
}

pub type OrderResult<T> = Result<T, OrderError>;
