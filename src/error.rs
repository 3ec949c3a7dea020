// src/error.rs

//! Error types for the build engine

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while resolving, preparing and running builds
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (config file, registry, manifest)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A file could not be parsed
    #[error("Failed to parse {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    /// Unknown project, version or file
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Dependency graph could not be resolved
    #[error("Resolution error: {0}")]
    ResolutionError(String),

    /// Two paths through the graph require different versions of a project
    #[error(
        "Version conflict for {project}: {first} (via {first_via}) and {second} (via {second_via})"
    )]
    VersionConflict {
        project: String,
        first: String,
        first_via: String,
        second: String,
        second_via: String,
    },

    /// A `${KEY}` placeholder referenced an undefined variable
    #[error("Template variable {0} not found")]
    TemplateError(String),

    /// Neither a usable tag nor branch could be selected
    #[error("Tag selection failed: {0}")]
    TagError(String),

    /// A git command failed
    #[error("Git error: {0}")]
    VcsError(String),

    /// A subprocess exited unsuccessfully
    #[error("Command `{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// An image build failed
    #[error("Error building image {image} for {project}: {reason}")]
    BuildFailed {
        project: String,
        image: String,
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Build a parse error for a file
    pub fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ParseError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias for the build engine
pub type Result<T> = std::result::Result<T, Error>;
