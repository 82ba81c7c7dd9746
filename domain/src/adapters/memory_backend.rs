use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;
use uuid::Uuid;

use crate::backend::Backend;
use crate::error::BackendError;
use crate::field::{FieldMap, Row, ID_COLUMN};
use crate::TableName;

type Tables = BTreeMap<String, Vec<(Uuid, Row)>>;

/// In-memory backend. Rows keep insertion order; the internal mutex makes
/// each call atomic.
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    connected: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            connected: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, BackendError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(BackendError::NotConnected);
        }
        self.tables
            .lock()
            .map_err(|_| BackendError::Driver("mutex poisoned".into()))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    type Config = ();

    fn connect(_: &()) -> Result<Self, BackendError> {
        Ok(Self::new())
    }

    fn select_by_id(&self, table: &TableName, id: Uuid) -> Result<Option<Row>, BackendError> {
        let tables = self.lock()?;
        Ok(tables
            .get(table.as_str())
            .and_then(|rows| rows.iter().find(|(k, _)| *k == id))
            .map(|(_, row)| row.clone()))
    }

    fn scan_all(&self, table: &TableName) -> Result<Vec<Row>, BackendError> {
        let tables = self.lock()?;
        Ok(tables
            .get(table.as_str())
            .map(|rows| rows.iter().map(|(_, row)| row.clone()).collect())
            .unwrap_or_default())
    }

    fn upsert(&self, table: &TableName, fields: &FieldMap) -> Result<u64, BackendError> {
        let id = fields
            .get(ID_COLUMN)
            .cloned()
            .ok_or_else(|| BackendError::Decode(format!("no {ID_COLUMN} column")))
            .and_then(|v| Uuid::try_from(v).map_err(|e| BackendError::Decode(e.to_string())))?;
        let mut tables = self.lock()?;
        let rows = tables.entry(table.as_str().to_string()).or_default();
        let row = Row::from(fields);
        match rows.iter_mut().find(|(k, _)| *k == id) {
            Some(slot) => slot.1 = row,
            None => rows.push((id, row)),
        }
        debug!(table = %table, %id, "memory upsert");
        Ok(1)
    }

    fn delete_by_id(&self, table: &TableName, id: Uuid) -> Result<u64, BackendError> {
        let mut tables = self.lock()?;
        let Some(rows) = tables.get_mut(table.as_str()) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|(k, _)| *k != id);
        Ok((before - rows.len()) as u64)
    }

    fn delete_all(&self, table: &TableName) -> Result<(), BackendError> {
        let mut tables = self.lock()?;
        tables.remove(table.as_str());
        Ok(())
    }

    fn close(&self) -> Result<(), BackendError> {
        if self.connected.swap(false, Ordering::AcqRel) {
            Ok(())
        } else {
            Err(BackendError::NotConnected)
        }
    }
}
