//! Storage driver port.
//!
//! The repository is written once against [`Backend`]; each driver is an
//! adapter behind it. Implementations report raw row counts and errors; the
//! repository decides which [`ErrorKind`](crate::ErrorKind) they become.

use uuid::Uuid;

use crate::error::BackendError;
use crate::field::{FieldMap, Row};
use crate::TableName;

pub trait Backend: Send + Sync {
    /// Connection settings accepted by [`Backend::connect`].
    type Config;

    fn connect(config: &Self::Config) -> Result<Self, BackendError>
    where
        Self: Sized;

    /// The row whose id column equals `id`, if any.
    fn select_by_id(&self, table: &TableName, id: Uuid) -> Result<Option<Row>, BackendError>;

    fn scan_all(&self, table: &TableName) -> Result<Vec<Row>, BackendError>;

    /// Insert or fully replace the row keyed by the map's id. Returns rows affected.
    fn upsert(&self, table: &TableName, fields: &FieldMap) -> Result<u64, BackendError>;

    /// Returns rows affected.
    fn delete_by_id(&self, table: &TableName, id: Uuid) -> Result<u64, BackendError>;

    /// Delete every row inside one transaction.
    fn delete_all(&self, table: &TableName) -> Result<(), BackendError>;

    /// Release the connection. Later calls report [`BackendError::NotConnected`].
    fn close(&self) -> Result<(), BackendError>;
}
