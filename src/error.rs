use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy of the migration engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("container not found: {account}/{container}")]
    ContainerNotFound { account: String, container: String },

    #[error("migration error: {0}")]
    Migration(String),

    #[error("unexpected response: status={status} body={body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Generic(String),
}

impl Error {
    pub fn connection(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Connection(Box::new(err))
    }

    /// True for errors that should be treated as "the object/container is absent"
    /// rather than a hard failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
            || matches!(self, Error::UnexpectedResponse { status: 404, .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
            || matches!(self, Error::UnexpectedResponse { status: 409, .. })
    }
}

/// A single failed work item, recorded on the controller's error channel rather
/// than propagated as a task failure. Mirrors `(container, key, error)` tuples
/// that the original migrator logged per-object without aborting the pass.
#[derive(Debug)]
pub struct WorkError {
    pub container: String,
    pub key: String,
    pub error: Error,
}

impl fmt::Display for WorkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.container, self.key, self.error)
    }
}
