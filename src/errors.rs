// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Structural errors (`Validation`, `Conflict`, `Cycle`, `NotFound`) are
//! returned synchronously from control-plane calls. Runtime failures of a
//! supervised process (crash, timeout) never surface here; they are observed
//! through polled service state instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcdagError {
    /// One or more fields of a definition are invalid. Carries every
    /// violated field so the caller can surface all of them at once.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The requested transition is illegal in the current state
    /// (e.g. start while running, delete while running).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The task graph contains a cycle. `path` lists the participating
    /// node ids in traversal order so a UI can highlight them.
    #[error("cycle detected in task graph: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("not found: {0}")]
    NotFound(String),

    /// OS-level failure to start a process. Recorded on the service's
    /// runtime state; only surfaced directly when launch is synchronous
    /// (pre-exec of a graph node, for example).
    #[error("launch failed: {0}")]
    Launch(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProcdagError {
    /// Convenience for single-field validation failures.
    pub fn invalid(field: impl Into<String>) -> Self {
        ProcdagError::Validation(vec![field.into()])
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ProcdagError>;
