//! Field descriptors and the mapping between entities and stored rows.
//!
//! Each persisted entity type registers a static list of [`Field`]s (column
//! name, column type, getter, setter). Writes read values through the getters
//! into a [`FieldMap`]; reads start from a factory-built entity and push every
//! stored column through the matching setter.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::Entity;

/// Name of the primary-key column every persisted entity must declare.
pub const ID_COLUMN: &str = "id";

/// A single persisted value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Convert a nullable value; `Null` becomes `None`.
    pub fn into_option<T>(self) -> Result<Option<T>, FieldError>
    where
        T: TryFrom<FieldValue, Error = FieldError>,
    {
        match self {
            FieldValue::Null => Ok(None),
            other => other.try_into().map(Some),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::Uuid(_) => "uuid",
            FieldValue::Timestamp(_) => "timestamp",
        }
    }
}

/// Storage type of a column, used when a backend bootstraps a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    Integer,
    Real,
    Text,
    Boolean,
    Timestamp,
}

impl ColumnType {
    /// SQL type name understood by SQLite and Postgres alike.
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Uuid => "uuid",
            ColumnType::Integer => "integer",
            ColumnType::Real => "real",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
        }
    }
}

/// Failure converting between a stored value and an entity field.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid {expected} value {value:?}")]
    Invalid { expected: &'static str, value: String },
    #[error("column {column}: {source}")]
    Column {
        column: &'static str,
        #[source]
        source: Box<FieldError>,
    },
    #[error("column {0} missing from row")]
    MissingColumn(&'static str),
}

fn mismatch(expected: &'static str, found: &FieldValue) -> FieldError {
    FieldError::TypeMismatch {
        expected,
        found: found.type_name(),
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<Uuid> for FieldValue {
    fn from(v: Uuid) -> Self {
        FieldValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

impl TryFrom<FieldValue> for bool {
    type Error = FieldError;

    fn try_from(v: FieldValue) -> Result<Self, Self::Error> {
        match v {
            FieldValue::Bool(b) => Ok(b),
            FieldValue::Int(i) => Ok(i != 0),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl TryFrom<FieldValue> for i64 {
    type Error = FieldError;

    fn try_from(v: FieldValue) -> Result<Self, Self::Error> {
        match v {
            FieldValue::Int(i) => Ok(i),
            other => Err(mismatch("int", &other)),
        }
    }
}

impl TryFrom<FieldValue> for f64 {
    type Error = FieldError;

    fn try_from(v: FieldValue) -> Result<Self, Self::Error> {
        match v {
            FieldValue::Float(f) => Ok(f),
            FieldValue::Int(i) => Ok(i as f64),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl TryFrom<FieldValue> for String {
    type Error = FieldError;

    fn try_from(v: FieldValue) -> Result<Self, Self::Error> {
        match v {
            FieldValue::Text(s) => Ok(s),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl TryFrom<FieldValue> for Uuid {
    type Error = FieldError;

    fn try_from(v: FieldValue) -> Result<Self, Self::Error> {
        match v {
            FieldValue::Uuid(u) => Ok(u),
            FieldValue::Text(s) => Uuid::parse_str(&s).map_err(|_| FieldError::Invalid {
                expected: "uuid",
                value: s,
            }),
            other => Err(mismatch("uuid", &other)),
        }
    }
}

impl TryFrom<FieldValue> for DateTime<Utc> {
    type Error = FieldError;

    fn try_from(v: FieldValue) -> Result<Self, Self::Error> {
        match v {
            FieldValue::Timestamp(t) => Ok(t),
            FieldValue::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| FieldError::Invalid {
                    expected: "timestamp",
                    value: s,
                }),
            other => Err(mismatch("timestamp", &other)),
        }
    }
}

/// Descriptor of one persisted field of `E`.
pub struct Field<E> {
    pub column: &'static str,
    pub column_type: ColumnType,
    pub get: fn(&E) -> FieldValue,
    pub set: fn(&mut E, FieldValue) -> Result<(), FieldError>,
}

impl<E> Field<E> {
    pub const fn new(
        column: &'static str,
        column_type: ColumnType,
        get: fn(&E) -> FieldValue,
        set: fn(&mut E, FieldValue) -> Result<(), FieldError>,
    ) -> Self {
        Self {
            column,
            column_type,
            get,
            set,
        }
    }
}

/// An entity type that can be written to and read from a table.
///
/// `fields()` must include a descriptor for [`ID_COLUMN`].
pub trait Persisted: Entity + Sized + Send + Sync + 'static {
    fn fields() -> &'static [Field<Self>];
}

/// Ordered column names plus the value bound to each.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldMap {
    columns: Vec<&'static str>,
    values: BTreeMap<&'static str, FieldValue>,
}

impl FieldMap {
    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.values.get(column)
    }

    /// Column/value pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> + '_ {
        self.columns
            .iter()
            .filter_map(|c| self.values.get(c).map(|v| (*c, v)))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Read every persisted field of `entity`.
pub fn field_map<E: Persisted>(entity: &E) -> FieldMap {
    let fields = E::fields();
    let mut columns = Vec::with_capacity(fields.len());
    let mut values = BTreeMap::new();
    for f in fields {
        columns.push(f.column);
        values.insert(f.column, (f.get)(entity));
    }
    FieldMap { columns, values }
}

/// A stored row as returned by a backend: column name to raw value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, FieldValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: FieldValue) {
        self.values.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.values.get(column)
    }

    fn take(&mut self, column: &str) -> Option<FieldValue> {
        self.values.remove(column)
    }
}

impl From<&FieldMap> for Row {
    fn from(map: &FieldMap) -> Self {
        let mut row = Row::new();
        for (column, value) in map.iter() {
            row.insert(column, value.clone());
        }
        row
    }
}

/// Populate `entity` from `row`. Columns the entity does not declare are
/// ignored; declared columns missing from the row are an error.
pub fn hydrate<E: Persisted>(mut entity: E, mut row: Row) -> Result<E, FieldError> {
    for f in E::fields() {
        let value = row
            .take(f.column)
            .ok_or(FieldError::MissingColumn(f.column))?;
        (f.set)(&mut entity, value).map_err(|e| FieldError::Column {
            column: f.column,
            source: Box::new(e),
        })?;
    }
    Ok(entity)
}
