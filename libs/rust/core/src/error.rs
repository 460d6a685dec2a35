//! Error taxonomy shared by every coordinator component.

use thiserror::Error;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid owner: {0}")]
    InvalidOwner(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("client {client} is already assigned to running iteration '{iteration}'")]
    AlreadyActive { client: u64, iteration: String },
    #[error("duplicate: {0}")]
    Duplicate(String),
    #[error("iteration '{0}' is finalized and re-opening is disabled")]
    IterationFinalized(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl CoordinatorError {
    pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }
    pub fn not_found(what: impl Into<String>) -> Self { Self::NotFound(what.into()) }

    /// HTTP-style status code for the transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::InvalidOwner(_) | Self::Forbidden(_) => 403,
            Self::AlreadyActive { .. } | Self::Duplicate(_) | Self::IterationFinalized(_) => 409,
            Self::Storage(_) => 500,
        }
    }

    pub fn is_conflict(&self) -> bool { self.status_code() == 409 }
}

impl From<sled::Error> for CoordinatorError {
    fn from(e: sled::Error) -> Self { Self::Storage(e.to_string()) }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(e: serde_json::Error) -> Self { Self::Storage(format!("codec: {e}")) }
}

impl From<tokio::task::JoinError> for CoordinatorError {
    fn from(e: tokio::task::JoinError) -> Self { Self::Storage(format!("storage task: {e}")) }
}

impl From<std::io::Error> for CoordinatorError {
    fn from(e: std::io::Error) -> Self { Self::Storage(format!("io: {e}")) }
}
