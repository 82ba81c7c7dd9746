//! Error envelope shared by every repository operation.
//!
//! A [`RepoError`] always carries the [`ErrorKind`] callers match on, the
//! namespace active when the call was made, and (optionally) the cause that
//! produced it. Backends report failures as [`BackendError`]; the repository
//! wraps them into the kind that matches the operation.

use thiserror::Error;

use crate::field::FieldError;

/// Taxonomy of repository failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    #[error("could not dial database")]
    DialFailure,
    #[error("no database connection")]
    NoBackendConnection,
    #[error("model not set")]
    ModelNotSet,
    #[error("missing entity ID")]
    MissingEntityID,
    #[error("could not find entity")]
    EntityNotFound,
    #[error("could not save entity")]
    CouldNotSaveEntity,
    #[error("could not remove entity")]
    CouldNotRemoveEntity,
    #[error("could not clear database")]
    CouldNotClearDB,
}

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("backend connection is closed")]
    NotConnected,
    #[error("driver error: {0}")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("decode error: {0}")]
    Decode(String),
    /// A value the backend cannot store so that it reads back unchanged.
    #[error("encode error: {0}")]
    Encode(String),
}

impl BackendError {
    /// Box any driver error into [`BackendError::Driver`].
    pub fn driver<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Driver(Box::new(err))
    }
}

/// The underlying reason wrapped by a [`RepoError`].
#[derive(Debug, Error)]
pub enum Cause {
    /// A nested kind, e.g. `MissingEntityID` under `CouldNotSaveEntity`.
    #[error(transparent)]
    Kind(ErrorKind),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("expected exactly one row affected, got {0}")]
    RowsAffected(u64),
}

/// Uniform error returned by all repository operations.
#[derive(Debug, Error)]
#[error("{kind}{}{}", cause_suffix(.cause.as_ref()), ns_suffix(.namespace))]
pub struct RepoError {
    kind: ErrorKind,
    #[source]
    cause: Option<Cause>,
    namespace: String,
}

fn cause_suffix(cause: Option<&Cause>) -> String {
    cause.map(|c| format!(": {c}")).unwrap_or_default()
}

fn ns_suffix(ns: &str) -> String {
    if ns.is_empty() {
        String::new()
    } else {
        format!(" (namespace: {ns})")
    }
}

impl RepoError {
    pub fn new(kind: ErrorKind, namespace: impl Into<String>) -> Self {
        Self {
            kind,
            cause: None,
            namespace: namespace.into(),
        }
    }

    /// Attach the underlying cause.
    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The nested kind carried as cause, if any.
    pub fn base_kind(&self) -> Option<ErrorKind> {
        match self.cause {
            Some(Cause::Kind(kind)) => Some(kind),
            _ => None,
        }
    }

    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl From<ErrorKind> for Cause {
    fn from(kind: ErrorKind) -> Self {
        Cause::Kind(kind)
    }
}
