//! Table identity for a repository.
//!
//! Table names end up interpolated into statement text, so they are validated
//! once at construction instead of being escaped per query.

use std::fmt::{Display, Formatter};

use thiserror::Error;

const MAX_LEN: usize = 63;

/// A validated SQL table identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableName(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableNameError {
    #[error("table name is empty")]
    Empty,
    #[error("table name longer than 63 bytes")]
    TooLong,
    #[error("table name must start with a letter or underscore")]
    BadStart,
    #[error("table name may only contain ascii letters, digits and underscores")]
    InvalidCharacters,
}

impl TableName {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, TableNameError> {
        let val = s.into();
        let Some(first) = val.chars().next() else {
            return Err(TableNameError::Empty);
        };
        if val.len() > MAX_LEN {
            return Err(TableNameError::TooLong);
        }
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(TableNameError::BadStart);
        }
        if !val.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(TableNameError::InvalidCharacters);
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TableName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for TableName {
    type Error = TableNameError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert_eq!(TableName::new("models").unwrap().as_str(), "models");
        assert!(TableName::new("_read_model_2").is_ok());
    }

    #[test]
    fn rejects_injection_attempts() {
        assert_eq!(
            TableName::new("models; drop table x"),
            Err(TableNameError::InvalidCharacters)
        );
        assert_eq!(TableName::new("a\"b"), Err(TableNameError::InvalidCharacters));
        assert_eq!(TableName::new("1models"), Err(TableNameError::BadStart));
        assert_eq!(TableName::new(""), Err(TableNameError::Empty));
        assert_eq!(TableName::new("x".repeat(64)), Err(TableNameError::TooLong));
    }
}
