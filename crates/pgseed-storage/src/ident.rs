//! Validated SQL identifiers and literals for configurable table names.

use std::fmt;

use thiserror::Error;

/// PostgreSQL truncates identifiers beyond this many bytes.
const MAX_IDENT_BYTES: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentError {
    #[error("invalid SQL identifier {0:?} (expected letters, digits, `_` or `$`, not starting with a digit)")]
    Identifier(String),
    #[error("invalid SQL literal {0:?} (expected letters, digits or `_`)")]
    Literal(String),
}

/// A schema, table or column name, rendered double-quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlIdent(String);

impl SqlIdent {
    pub fn parse(raw: &str) -> Result<Self, IdentError> {
        let raw = raw.trim();
        let mut chars = raw.chars();
        let valid_head = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if valid_head && valid_tail && raw.len() <= MAX_IDENT_BYTES {
            Ok(Self(raw.to_string()))
        } else {
            Err(IdentError::Identifier(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// `"schema"."table"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedTable {
    pub schema: SqlIdent,
    pub table: SqlIdent,
}

impl QualifiedTable {
    pub fn parse(schema: &str, table: &str) -> Result<Self, IdentError> {
        Ok(Self {
            schema: SqlIdent::parse(schema)?,
            table: SqlIdent::parse(table)?,
        })
    }
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// A constant column value (e.g. an enum label) inlined as a quoted string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlLiteral(String);

impl SqlLiteral {
    pub fn parse(raw: &str) -> Result<Self, IdentError> {
        let raw = raw.trim();
        if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            Ok(Self(raw.to_string()))
        } else {
            Err(IdentError::Literal(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.0)
    }
}
