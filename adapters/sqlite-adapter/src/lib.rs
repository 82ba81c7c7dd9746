//! SQLite implementation of the `Backend` port.
//!
//! Purpose
//! - Provide a file-based (or in-memory) relational store for the generic
//!   repository in `repo-domain`.
//! - Execute the statements built by `repo_domain::sql` with bound
//!   parameters; only quoted table and column names reach statement text.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - UUIDs are stored as hyphenated TEXT, timestamps as RFC 3339 TEXT with
//!   nanosecond precision, booleans as INTEGER.
//! - Values that would not read back unchanged (NaN, timestamps outside
//!   years 0000-9999) are rejected on write with `BackendError::Encode`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{Datelike, SecondsFormat};
use repo_domain::{sql, Backend, BackendError, FieldMap, FieldValue, Persisted, Row, TableName};
use rusqlite::types::{ToSql, Value};
use rusqlite::{named_params, params_from_iter, Connection};
use tracing::{debug, info, warn};
use uuid::Uuid;

const MEMORY_PATH: &str = ":memory:";

/// Connection settings for [`SqliteBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqliteConfig {
    pub path: PathBuf,
    pub busy_timeout: Duration,
}

impl SqliteConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// A private, non-persistent database.
    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }
}

/// SQLite-backed storage driver.
pub struct SqliteBackend {
    conn: Mutex<Option<Connection>>,
}

impl SqliteBackend {
    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, BackendError> {
        self.conn
            .lock()
            .map_err(|_| BackendError::Driver("mutex poisoned".into()))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or(BackendError::NotConnected)?;
        f(conn)
    }

    /// Create the table for `E` from its field descriptors if it is missing.
    pub fn ensure_table<E: Persisted>(&self, table: &TableName) -> Result<(), BackendError> {
        let stmt = sql::create_table(table, E::fields());
        debug!(%table, statement = %stmt, "ensuring table");
        self.with_conn(|conn| conn.execute_batch(&stmt).map_err(BackendError::driver))
    }
}

/// Latest year whose RFC 3339 text parses back.
const MAX_TEXT_YEAR: i32 = 9999;

fn to_sql_value(column: &str, value: &FieldValue) -> Result<Value, BackendError> {
    Ok(match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(b) => Value::Integer(i64::from(*b)),
        FieldValue::Int(i) => Value::Integer(*i),
        // SQLite stores NaN as NULL.
        FieldValue::Float(f) if f.is_nan() => {
            return Err(BackendError::Encode(format!("column {column}: NaN is not storable")))
        }
        FieldValue::Float(f) => Value::Real(*f),
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Uuid(u) => Value::Text(u.to_string()),
        FieldValue::Timestamp(t) if !(0..=MAX_TEXT_YEAR).contains(&t.year()) => {
            return Err(BackendError::Encode(format!(
                "column {column}: timestamp {t} is outside years 0000-{MAX_TEXT_YEAR}"
            )))
        }
        FieldValue::Timestamp(t) => Value::Text(t.to_rfc3339_opts(SecondsFormat::Nanos, true)),
    })
}

fn from_sql_value(value: Value) -> Result<FieldValue, BackendError> {
    Ok(match value {
        Value::Null => FieldValue::Null,
        Value::Integer(i) => FieldValue::Int(i),
        Value::Real(f) => FieldValue::Float(f),
        Value::Text(s) => FieldValue::Text(s),
        Value::Blob(b) => Uuid::from_slice(&b)
            .map(FieldValue::Uuid)
            .map_err(|e| BackendError::Decode(format!("unsupported blob: {e}")))?,
    })
}

fn read_row(row: &rusqlite::Row<'_>, columns: &[String]) -> Result<Row, BackendError> {
    let mut out = Row::new();
    for (i, name) in columns.iter().enumerate() {
        let value: Value = row.get(i).map_err(BackendError::driver)?;
        out.insert(name.clone(), from_sql_value(value)?);
    }
    Ok(out)
}

fn query_rows(
    conn: &Connection,
    stmt_text: &str,
    params: &[(&str, &dyn ToSql)],
) -> Result<Vec<Row>, BackendError> {
    let mut stmt = conn.prepare(stmt_text).map_err(BackendError::driver)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params).map_err(BackendError::driver)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(BackendError::driver)? {
        out.push(read_row(row, &columns)?);
    }
    Ok(out)
}

impl Backend for SqliteBackend {
    type Config = SqliteConfig;

    fn connect(config: &SqliteConfig) -> Result<Self, BackendError> {
        if !config.is_in_memory() {
            // Ensure directory exists
            if let Some(dir) = config.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|e| {
                    warn!(dir = %dir.display(), error = %e, "could not create database directory");
                    BackendError::Dial(format!(
                        "could not create directory {}: {e}",
                        dir.display()
                    ))
                })?;
            }
        }
        let conn = Connection::open(&config.path).map_err(|e| {
            warn!(path = %config.path.display(), error = %e, "sqlite open failed");
            BackendError::Dial(e.to_string())
        })?;
        conn.busy_timeout(config.busy_timeout)
            .map_err(|e| BackendError::Dial(e.to_string()))?;
        info!(path = %config.path.display(), "sqlite database opened");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn select_by_id(&self, table: &TableName, id: Uuid) -> Result<Option<Row>, BackendError> {
        let stmt = sql::select_by_id(table);
        self.with_conn(|conn| {
            let rows = query_rows(conn, &stmt, named_params! { ":id": id.to_string() })?;
            Ok(rows.into_iter().next())
        })
    }

    fn scan_all(&self, table: &TableName) -> Result<Vec<Row>, BackendError> {
        let stmt = sql::select_all(table);
        self.with_conn(|conn| query_rows(conn, &stmt, &[]))
    }

    fn upsert(&self, table: &TableName, fields: &FieldMap) -> Result<u64, BackendError> {
        let stmt = sql::upsert(table, fields);
        debug!(statement = %stmt, "sqlite upsert");
        let values = fields
            .iter()
            .map(|(column, value)| to_sql_value(column, value))
            .collect::<Result<Vec<_>, _>>()?;
        self.with_conn(|conn| {
            let affected = conn
                .execute(&stmt, params_from_iter(values.iter()))
                .map_err(BackendError::driver)?;
            Ok(affected as u64)
        })
    }

    fn delete_by_id(&self, table: &TableName, id: Uuid) -> Result<u64, BackendError> {
        let stmt = sql::delete_by_id(table);
        self.with_conn(|conn| {
            let affected = conn
                .execute(&stmt, named_params! { ":id": id.to_string() })
                .map_err(BackendError::driver)?;
            Ok(affected as u64)
        })
    }

    fn delete_all(&self, table: &TableName) -> Result<(), BackendError> {
        let stmt = sql::delete_all(table);
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(BackendError::driver)?;
            tx.execute(&stmt, []).map_err(BackendError::driver)?;
            tx.commit().map_err(BackendError::driver)
        })
    }

    fn close(&self) -> Result<(), BackendError> {
        let mut guard = self.lock()?;
        let conn = guard.take().ok_or(BackendError::NotConnected)?;
        if let Err((conn, e)) = conn.close() {
            // Keep the handle so the caller can retry.
            *guard = Some(conn);
            return Err(BackendError::driver(e));
        }
        info!("sqlite database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use repo_domain::acceptance::acceptance_test;
    use repo_domain::mocks::Model;
    use repo_domain::{
        Cause, ColumnType, Context, Entity, ErrorKind, Field, ReadRepo, Repo, WriteRepo,
    };
    use std::sync::Arc;
    use std::thread;

    fn tmp_repo() -> (Repo<Model, SqliteBackend>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteConfig::new(dir.path().join("t.db"));
        let table = TableName::new("models").unwrap();
        let repo = Repo::<Model, SqliteBackend>::connect(table.clone(), &config)
            .unwrap()
            .with_default_factory();
        repo.backend().ensure_table::<Model>(&table).unwrap();
        (repo, dir)
    }

    #[test]
    fn read_repo_integration() {
        let (repo, _dir) = tmp_repo();
        let ctx = Context::background();
        assert!(repo.parent().is_none());
        acceptance_test(&ctx, &repo);
        repo.clear(&ctx).unwrap();
        assert!(repo.find_all(&ctx).unwrap().is_empty());
        repo.close(&ctx).unwrap();
    }

    #[test]
    fn read_repo_integration_with_namespace() {
        let table = TableName::new("models").unwrap();
        let repo = Repo::<Model, SqliteBackend>::connect(table.clone(), &SqliteConfig::in_memory())
            .unwrap()
            .with_default_factory();
        repo.backend().ensure_table::<Model>(&table).unwrap();
        acceptance_test(&Context::with_namespace("ns"), &repo);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteConfig::new(dir.path().join("nested").join("t.db"));
        let table = TableName::new("models").unwrap();
        let ctx = Context::background();
        let saved = Model {
            id: Uuid::new_v4(),
            version: 7,
            content: "kept".into(),
            created_at: Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap()
                + chrono::Duration::nanoseconds(123_456_789),
        };
        {
            let repo = Repo::<Model, SqliteBackend>::connect(table.clone(), &config).unwrap();
            repo.backend().ensure_table::<Model>(&table).unwrap();
            repo.save(&ctx, &saved).unwrap();
            repo.close(&ctx).unwrap();
        }
        let repo = Repo::<Model, SqliteBackend>::connect(table, &config)
            .unwrap()
            .with_default_factory();
        assert_eq!(repo.find(&ctx, saved.id).unwrap(), saved);
    }

    #[test]
    fn values_are_bound_not_interpolated() {
        let (repo, _dir) = tmp_repo();
        let ctx = Context::background();
        let hostile = Model {
            id: Uuid::new_v4(),
            content: "x'); DROP TABLE models; --".into(),
            ..Model::default()
        };
        repo.save(&ctx, &hostile).unwrap();
        assert_eq!(repo.find(&ctx, hostile.id).unwrap().content, hostile.content);
        assert_eq!(repo.find_all(&ctx).unwrap().len(), 1);
    }

    #[test]
    fn stored_encoding_is_text() {
        let (repo, _dir) = tmp_repo();
        let m = Model {
            id: Uuid::new_v4(),
            created_at: Utc.with_ymd_and_hms(2009, 11, 10, 23, 0, 0).unwrap(),
            ..Model::default()
        };
        repo.save(&Context::background(), &m).unwrap();
        let row = repo
            .backend()
            .select_by_id(repo.table(), m.id)
            .unwrap()
            .unwrap();
        assert_eq!(row.get("id"), Some(&FieldValue::Text(m.id.to_string())));
        assert_eq!(
            row.get("created_at"),
            Some(&FieldValue::Text("2009-11-10T23:00:00.000000000Z".into()))
        );
    }

    #[test]
    fn missing_table_surfaces_as_operation_errors() {
        let table = TableName::new("absent").unwrap();
        let repo = Repo::<Model, SqliteBackend>::connect(table, &SqliteConfig::in_memory())
            .unwrap()
            .with_default_factory();
        let ctx = Context::background();
        let m = Model {
            id: Uuid::new_v4(),
            ..Model::default()
        };
        assert_eq!(repo.save(&ctx, &m).unwrap_err().kind(), ErrorKind::CouldNotSaveEntity);
        assert_eq!(repo.find(&ctx, m.id).unwrap_err().kind(), ErrorKind::EntityNotFound);
        assert_eq!(repo.find_all(&ctx).unwrap_err().kind(), ErrorKind::EntityNotFound);
        assert_eq!(
            repo.remove(&ctx, m.id).unwrap_err().kind(),
            ErrorKind::CouldNotRemoveEntity
        );
        assert_eq!(repo.clear(&ctx).unwrap_err().kind(), ErrorKind::CouldNotClearDB);
    }

    #[test]
    fn closed_connection_is_reported() {
        let (repo, _dir) = tmp_repo();
        let ctx = Context::with_namespace("ns");
        repo.close(&ctx).unwrap();
        let err = repo.find_all(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoBackendConnection);
        assert_eq!(err.namespace(), "ns");
        assert_eq!(repo.close(&ctx).unwrap_err().kind(), ErrorKind::NoBackendConnection);
    }

    #[test]
    fn unreachable_path_is_a_dial_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let config = SqliteConfig::new(blocker.join("sub").join("t.db"));
        let table = TableName::new("models").unwrap();
        let err = Repo::<Model, SqliteBackend>::connect(table, &config)
            .err()
            .expect("dial should fail");
        assert_eq!(err.kind(), ErrorKind::DialFailure);
        match err.cause() {
            Some(Cause::Backend(BackendError::Dial(msg))) => {
                assert!(msg.starts_with("could not create directory"), "{msg}");
            }
            other => panic!("unexpected cause: {other:?}"),
        }
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Setting {
        id: Uuid,
        enabled: bool,
        ratio: f64,
        note: Option<String>,
        updated_at: Option<DateTime<Utc>>,
    }

    impl Entity for Setting {
        fn entity_id(&self) -> Uuid {
            self.id
        }
    }

    impl Persisted for Setting {
        fn fields() -> &'static [Field<Self>] {
            static FIELDS: [Field<Setting>; 5] = [
                Field::<Setting>::new("id", ColumnType::Uuid, |s| s.id.into(), |s, v| {
                    s.id = v.try_into()?;
                    Ok(())
                }),
                Field::<Setting>::new("enabled", ColumnType::Boolean, |s| s.enabled.into(), |s, v| {
                    s.enabled = v.try_into()?;
                    Ok(())
                }),
                Field::<Setting>::new("ratio", ColumnType::Real, |s| s.ratio.into(), |s, v| {
                    s.ratio = v.try_into()?;
                    Ok(())
                }),
                Field::<Setting>::new("note", ColumnType::Text, |s| s.note.clone().into(), |s, v| {
                    s.note = v.into_option()?;
                    Ok(())
                }),
                Field::<Setting>::new(
                    "updated_at",
                    ColumnType::Timestamp,
                    |s| s.updated_at.into(),
                    |s, v| {
                        s.updated_at = v.into_option()?;
                        Ok(())
                    },
                ),
            ];
            &FIELDS
        }
    }

    #[test]
    fn other_column_types_round_trip() {
        let table = TableName::new("settings").unwrap();
        let repo = Repo::<Setting, SqliteBackend>::connect(table.clone(), &SqliteConfig::in_memory())
            .unwrap()
            .with_default_factory();
        repo.backend().ensure_table::<Setting>(&table).unwrap();
        let ctx = Context::background();

        let full = Setting {
            id: Uuid::new_v4(),
            enabled: true,
            ratio: 0.25,
            note: Some("on".into()),
            updated_at: Some(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()),
        };
        let empty = Setting {
            id: Uuid::new_v4(),
            ..Setting::default()
        };
        repo.save(&ctx, &full).unwrap();
        repo.save(&ctx, &empty).unwrap();
        assert_eq!(repo.find(&ctx, full.id).unwrap(), full);
        assert_eq!(repo.find(&ctx, empty.id).unwrap(), empty);

        // Overwrite drops the optional values again.
        let cleared = Setting {
            id: full.id,
            ..Setting::default()
        };
        repo.save(&ctx, &cleared).unwrap();
        assert_eq!(repo.find(&ctx, full.id).unwrap(), cleared);
    }

    fn is_encode_failure(err: &repo_domain::RepoError) -> bool {
        err.kind() == ErrorKind::CouldNotSaveEntity
            && matches!(err.cause(), Some(Cause::Backend(BackendError::Encode(_))))
    }

    #[test]
    fn timestamps_beyond_year_9999_are_rejected() {
        let (repo, _dir) = tmp_repo();
        let ctx = Context::background();
        let kept = Model {
            id: Uuid::new_v4(),
            created_at: Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap(),
            ..Model::default()
        };
        repo.save(&ctx, &kept).unwrap();
        assert_eq!(repo.find(&ctx, kept.id).unwrap(), kept);

        let far = Model {
            id: Uuid::new_v4(),
            created_at: Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap(),
            ..Model::default()
        };
        let err = repo.save(&ctx, &far).unwrap_err();
        assert!(is_encode_failure(&err), "{err}");
        assert_eq!(repo.find(&ctx, far.id).unwrap_err().kind(), ErrorKind::EntityNotFound);
        assert_eq!(repo.find_all(&ctx).unwrap(), vec![kept]);
    }

    #[test]
    fn nan_is_rejected_and_table_stays_readable() {
        let table = TableName::new("settings").unwrap();
        let repo = Repo::<Setting, SqliteBackend>::connect(table.clone(), &SqliteConfig::in_memory())
            .unwrap()
            .with_default_factory();
        repo.backend().ensure_table::<Setting>(&table).unwrap();
        let ctx = Context::background();

        let good = Setting {
            id: Uuid::new_v4(),
            ratio: 1.5,
            ..Setting::default()
        };
        repo.save(&ctx, &good).unwrap();
        let bad = Setting {
            id: Uuid::new_v4(),
            ratio: f64::NAN,
            ..Setting::default()
        };
        let err = repo.save(&ctx, &bad).unwrap_err();
        assert!(is_encode_failure(&err), "{err}");

        // Infinity has a REAL encoding and reads back.
        let inf = Setting {
            id: Uuid::new_v4(),
            ratio: f64::INFINITY,
            ..Setting::default()
        };
        repo.save(&ctx, &inf).unwrap();
        assert_eq!(repo.find(&ctx, inf.id).unwrap(), inf);
        assert_eq!(repo.find_all(&ctx).unwrap().len(), 2);
    }

    #[test]
    fn concurrent_saves_of_one_id_leave_one_row() {
        let (repo, _dir) = tmp_repo();
        let repo = Arc::new(repo);
        let id = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = Arc::clone(&repo);
                thread::spawn(move || {
                    let m = Model {
                        id,
                        version: i,
                        content: format!("writer-{i}"),
                        ..Model::default()
                    };
                    repo.save(&Context::background(), &m).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let ctx = Context::background();
        assert_eq!(repo.find_all(&ctx).unwrap().len(), 1);
        let found = repo.find(&ctx, id).unwrap();
        assert_eq!(found.content, format!("writer-{}", found.version));
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Ledger {
        id: Uuid,
        order: i64,
        label: String,
    }

    impl Entity for Ledger {
        fn entity_id(&self) -> Uuid {
            self.id
        }
    }

    impl Persisted for Ledger {
        fn fields() -> &'static [Field<Self>] {
            static FIELDS: [Field<Ledger>; 3] = [
                Field::<Ledger>::new("id", ColumnType::Uuid, |l| l.id.into(), |l, v| {
                    l.id = v.try_into()?;
                    Ok(())
                }),
                Field::<Ledger>::new("order", ColumnType::Integer, |l| l.order.into(), |l, v| {
                    l.order = v.try_into()?;
                    Ok(())
                }),
                Field::<Ledger>::new("a b", ColumnType::Text, |l| l.label.clone().into(), |l, v| {
                    l.label = v.try_into()?;
                    Ok(())
                }),
            ];
            &FIELDS
        }
    }

    #[test]
    fn reserved_and_spaced_column_names_work() {
        let table = TableName::new("group").unwrap();
        let repo = Repo::<Ledger, SqliteBackend>::connect(table.clone(), &SqliteConfig::in_memory())
            .unwrap()
            .with_default_factory();
        repo.backend().ensure_table::<Ledger>(&table).unwrap();
        let ctx = Context::background();

        let entry = Ledger {
            id: Uuid::new_v4(),
            order: 3,
            label: "first entry".into(),
        };
        repo.save(&ctx, &entry).unwrap();
        let updated = Ledger {
            order: 4,
            ..entry.clone()
        };
        repo.save(&ctx, &updated).unwrap();
        assert_eq!(repo.find(&ctx, entry.id).unwrap(), updated);
        assert_eq!(repo.find_all(&ctx).unwrap(), vec![updated]);
        repo.remove(&ctx, entry.id).unwrap();
        repo.clear(&ctx).unwrap();
    }
}
