//! Store error types

use std::io;
use thiserror::Error;

use crate::engine::lock::LockError;
use crate::engine::xml::ParseError;

use super::schema::Diagnostic;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse database: {0}")]
    Xml(#[from] ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to persist database: {0}")]
    Persistence(String),

    #[error("schema validation failed:\n{}", format_diagnostics(.0))]
    Validation(Vec<Diagnostic>),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),
}

fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, StoreError>;
