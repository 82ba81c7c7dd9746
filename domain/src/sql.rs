//! Statement text shared by SQL backends.
//!
//! Identifiers are double-quoted so reserved words and unusual descriptor
//! names stay valid. Values are never interpolated: `upsert` binds them as
//! numbered parameters (`?1`, `?2`, ...) in `FieldMap` column order, the id
//! statements bind `:id`.

use crate::field::{Field, FieldMap, ID_COLUMN};
use crate::TableName;

/// Quote an identifier, doubling any embedded `"`.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Insert every mapped column; on id conflict overwrite all of them.
///
/// Parameter `?n` is the n-th entry of `fields.iter()`.
pub fn upsert(table: &TableName, fields: &FieldMap) -> String {
    let columns: Vec<String> = fields.columns().iter().map(|c| quote_ident(c)).collect();
    let binds: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = columns
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
        quote_ident(table.as_str()),
        columns.join(", "),
        binds.join(", "),
        quote_ident(ID_COLUMN),
        updates.join(", ")
    )
}

pub fn select_by_id(table: &TableName) -> String {
    format!(
        "SELECT * FROM {} WHERE {} = :{ID_COLUMN}",
        quote_ident(table.as_str()),
        quote_ident(ID_COLUMN)
    )
}

pub fn select_all(table: &TableName) -> String {
    format!("SELECT * FROM {}", quote_ident(table.as_str()))
}

pub fn delete_by_id(table: &TableName) -> String {
    format!(
        "DELETE FROM {} WHERE {} = :{ID_COLUMN}",
        quote_ident(table.as_str()),
        quote_ident(ID_COLUMN)
    )
}

pub fn delete_all(table: &TableName) -> String {
    format!("DELETE FROM {}", quote_ident(table.as_str()))
}

/// `CREATE TABLE IF NOT EXISTS` derived from an entity's descriptors, with the
/// id column as primary key.
pub fn create_table<E>(table: &TableName, fields: &[Field<E>]) -> String {
    let columns: Vec<String> = fields
        .iter()
        .map(|f| {
            let name = quote_ident(f.column);
            if f.column == ID_COLUMN {
                format!("{name} {} PRIMARY KEY", f.column_type.sql_name())
            } else {
                format!("{name} {}", f.column_type.sql_name())
            }
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table.as_str()),
        columns.join(", ")
    )
}
