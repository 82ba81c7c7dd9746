//! Domain library for the generic entity repository.
//!
//! Holds the entity contract, the field descriptors used to map entities to
//! table rows, the storage [`Backend`] port, the [`Repo`] facade written once
//! against that port, and the acceptance suite every backend must pass.
//! Concrete drivers live in separate adapter crates.

use uuid::Uuid;

/// A uniquely identified record that can be persisted.
///
/// A nil id means "unassigned"; such entities are rejected on save.
pub trait Entity {
    fn entity_id(&self) -> Uuid;
}

/// Per-call context. Carries the namespace used to attribute errors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Context {
    namespace: String,
}

impl Context {
    /// Context with the default (empty) namespace.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_namespace<S: Into<String>>(namespace: S) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Return a short about/version line for binaries to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{}", pkg, ver)
}

pub mod acceptance;
pub mod adapters;
pub mod backend;
pub mod error;
pub mod field;
pub mod mocks;
pub mod repo;
pub mod sql;
pub mod table;

pub use backend::Backend;
pub use error::{BackendError, Cause, ErrorKind, RepoError};
pub use field::{field_map, hydrate, ColumnType, Field, FieldError, FieldMap, FieldValue, Persisted, Row};
pub use repo::{repository, IndexInput, ReadRepo, ReadWriteRepo, Repo, WriteRepo};
pub use table::{TableName, TableNameError};
