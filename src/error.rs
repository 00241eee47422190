use crate::types::HttpMethod;
use std::path::PathBuf;
use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
///
/// Only compilation and artifact loading can fail. Lookups never return an
/// error: a missing row resolves to the policy of the calling component.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading or writing a file failed.
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// YAML document could not be parsed.
    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// JSON document could not be parsed.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// Document is well-formed but structurally unusable.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    /// Invalid role identifier.
    #[error("invalid role: {0}")]
    InvalidRole(String),
    /// Unsupported HTTP method.
    #[error("invalid http method: {0}")]
    InvalidMethod(String),
    /// The same path and method were declared twice.
    #[error("duplicate route {method} {path}")]
    DuplicateRoute { path: String, method: HttpMethod },
    /// The same operation id was declared by two operations.
    #[error("duplicate operation id {operation_id}")]
    DuplicateOperationId { operation_id: String },
    /// Artifact text could not be formatted.
    #[error("failed to render artifact: {0}")]
    Render(#[from] std::fmt::Error),
    /// Two roles map to the same generated Rust identifier.
    #[error("roles {first} and {second} both generate the identifier {ident}")]
    RoleIdentCollision {
        first: String,
        second: String,
        ident: String,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
