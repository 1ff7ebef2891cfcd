//! Application error types.

use thiserror::Error;

use crate::auth::AuthError;
use crate::card::CardError;
use crate::storage::StorageError;
use crate::transport::TransportError;

/// Convenience alias for component operations.
pub type AppResult<T> = Result<T, AppError>;

/// Where the caller should navigate after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    Home,
}

/// Application-level errors surfaced by the page components.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("You must be logged in to do that")]
    NotAuthenticated,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing identifier: {0}")]
    MissingIdentifier(&'static str),

    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Card(#[from] CardError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(String),
}

impl AppError {
    /// Fatal page-level conditions send the user back to the home view.
    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            AppError::NotFound(_) | AppError::MissingIdentifier(_) => Some(Redirect::Home),
            _ => None,
        }
    }
}
