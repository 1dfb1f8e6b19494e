//! Typed store values shared by filters, statements and row snapshots.
//!
//! # Responsibility
//! - Carry one column value between caller code and SQLite.
//! - Provide a stable identity-map key for identity values.
//!
//! # Invariants
//! - `bool` is stored as integer `0`/`1`, matching SQLite affinity rules.
//! - `Uuid` is stored as its hyphenated text form.

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::Utf8Error;
use uuid::Uuid;

/// One column value as understood by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrows this value in the shape `rusqlite` conversions expect.
    pub fn as_value_ref(&self) -> ValueRef<'_> {
        match self {
            Self::Null => ValueRef::Null,
            Self::Integer(value) => ValueRef::Integer(*value),
            Self::Real(value) => ValueRef::Real(*value),
            Self::Text(value) => ValueRef::Text(value.as_bytes()),
            Self::Blob(value) => ValueRef::Blob(value.as_slice()),
        }
    }

    /// Copies a borrowed column value out of a result row.
    ///
    /// # Errors
    /// - Returns the UTF-8 error when a text column holds invalid bytes.
    pub fn from_value_ref(value: ValueRef<'_>) -> Result<Self, Utf8Error> {
        Ok(match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(value) => Self::Integer(value),
            ValueRef::Real(value) => Self::Real(value),
            ValueRef::Text(bytes) => Self::Text(std::str::from_utf8(bytes)?.to_string()),
            ValueRef::Blob(bytes) => Self::Blob(bytes.to_vec()),
        })
    }

    /// Returns a hashable key that keeps values of different types apart.
    ///
    /// `Integer(1)` and `Text("1")` never collide.
    pub fn identity_key(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Integer(value) => format!("i:{value}"),
            Self::Real(value) => format!("r:{value}"),
            Self::Text(value) => format!("t:{value}"),
            Self::Blob(bytes) => {
                let hex = bytes.iter().map(|byte| format!("{byte:02x}")).collect::<String>();
                format!("b:{hex}")
            }
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
            Self::Blob(bytes) => write!(f, "<blob {} bytes>", bytes.len()),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(self.as_value_ref()))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        Self::Text(value.to_string())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::FieldValue;
    use rusqlite::types::{FromSql, ValueRef};

    #[test]
    fn identity_key_separates_types() {
        assert_ne!(
            FieldValue::Integer(1).identity_key(),
            FieldValue::Text("1".to_string()).identity_key()
        );
        assert_eq!(FieldValue::Blob(vec![0x0a, 0xff]).identity_key(), "b:0aff");
    }

    #[test]
    fn option_and_bool_conversions_follow_sqlite_affinity() {
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
        assert_eq!(FieldValue::from(Some("x")), FieldValue::Text("x".to_string()));
        assert_eq!(FieldValue::from(true), FieldValue::Integer(1));
    }

    #[test]
    fn value_ref_roundtrip_feeds_rusqlite_conversions() {
        let value = FieldValue::from("widget");
        let copied = FieldValue::from_value_ref(value.as_value_ref()).unwrap();
        assert_eq!(copied, value);

        let parsed = String::column_result(value.as_value_ref()).unwrap();
        assert_eq!(parsed, "widget");
    }

    #[test]
    fn invalid_utf8_text_is_rejected() {
        let bytes = [0xff, 0xfe];
        assert!(FieldValue::from_value_ref(ValueRef::Text(&bytes)).is_err());
    }
}
