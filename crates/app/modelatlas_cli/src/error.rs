use modelatlas_core::error::AppError;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    #[error(transparent)]
    App(#[from] AppError),

    #[error("IO::{:?}: {}", .0, .0)]
    Io(#[from] std::io::Error),

    #[error("Json: {}", .0)]
    Json(#[from] serde_json::Error),

    #[error("Handoff URL: {}", .0)]
    Url(#[from] url::ParseError),

    #[error("Logging: {}", .0)]
    Logging(String),
}
