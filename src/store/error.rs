//! Appointment store error types
//!
//! Defines the errors of the persistence collaborator and the store wrapping it.

use thiserror::Error;

use crate::schedule::ScheduleError;

/// Errors raised by a [`Repository`](super::Repository)
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend cannot be reached, or every backend of a fallback chain failed
    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

/// Errors raised by the [`AppointmentStore`](super::AppointmentStore)
#[derive(Error, Debug)]
pub enum StoreError {
    /// Scheduling rule rejected the operation
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// Snapshot could not be loaded or saved
    #[error("Persistence error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;
