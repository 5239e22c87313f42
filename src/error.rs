//! Error types for the bundless pipeline

use std::path::PathBuf;

use thiserror::Error;

use crate::schema::FieldViolation;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, BuildError>;

/// Errors raised while assembling the registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate transformer id: {id}")]
    DuplicateTransformerId { id: String },

    #[error("Unknown transformer id: {id}{}", did_you_mean(.suggestion))]
    UnknownTransformerId {
        id: String,
        suggestion: Option<String>,
    },
}

/// Failure signalled by a transformer's factory or `process`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised by the output writer
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Output collision in target {target}: {} already written by {}", .path.display(), .claimed_by.display())]
    Collision {
        target: String,
        path: PathBuf,
        claimed_by: PathBuf,
    },

    #[error("IO error writing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level build errors
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid options for transformer {transformer}: {}", format_violations(.violations))]
    SchemaValidation {
        transformer: String,
        violations: Vec<FieldViolation>,
    },

    #[error("Transformer {transformer} failed: {source}")]
    ContentTransform {
        transformer: String,
        #[source]
        source: TransformError,
    },

    #[error("Output collision: {} is produced by {}", .path.display(), format_paths(.sources))]
    OutputCollision { path: PathBuf, sources: Vec<PathBuf> },

    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BuildError {
    /// Whether this error is a configuration mistake that must be reported exhaustively
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BuildError::Registry(RegistryError::UnknownTransformerId { .. })
                | BuildError::SchemaValidation { .. }
                | BuildError::OutputCollision { .. }
        )
    }

    /// Stable short name of the error class
    pub fn kind(&self) -> &'static str {
        match self {
            BuildError::Registry(RegistryError::DuplicateTransformerId { .. }) => {
                "duplicate_transformer_id"
            }
            BuildError::Registry(RegistryError::UnknownTransformerId { .. }) => {
                "unknown_transformer_id"
            }
            BuildError::SchemaValidation { .. } => "schema_validation",
            BuildError::ContentTransform { .. } => "content_transform",
            BuildError::OutputCollision { .. } => "output_collision",
            BuildError::Io { .. } => "io",
            BuildError::Config(_) => "config",
        }
    }

    /// Transformer id involved in this error, if any
    pub fn transformer(&self) -> Option<&str> {
        match self {
            BuildError::Registry(RegistryError::DuplicateTransformerId { id })
            | BuildError::Registry(RegistryError::UnknownTransformerId { id, .. }) => Some(id),
            BuildError::SchemaValidation { transformer, .. }
            | BuildError::ContentTransform { transformer, .. } => Some(transformer),
            _ => None,
        }
    }
}

impl From<config_crate::ConfigError> for BuildError {
    fn from(err: config_crate::ConfigError) -> Self {
        BuildError::Config(err.to_string())
    }
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    suggestion
        .as_deref()
        .map(|s| format!(" (did you mean '{s}'?)"))
        .unwrap_or_default()
}
