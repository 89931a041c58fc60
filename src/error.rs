//! Crate-wide error kind, shared by every fallible public operation.
//!
//! `spec.md` describes failures as a closed set of *kinds* surfaced via a
//! bool-plus-out-parameter in the source language; the idiomatic Rust
//! expression of that contract is `Result<T, EngineError>`.

use thiserror::Error;

/// One of the error kinds named in `spec.md` §7, plus `Cycle` for render
/// graph compile failures (§4.6.6 requires the offending passes be named).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("backend error: {0}")]
    BackendError(String),

    #[error("not initialized")]
    NotInitialized,

    #[error("render graph contains a cycle involving passes: {passes:?}")]
    Cycle { passes: Vec<String> },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EngineError>;
