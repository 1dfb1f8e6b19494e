//! Entity capability contract.
//!
//! # Responsibility
//! - Let a caller-defined type describe its storage shape explicitly.
//! - Move column values between entities and the store without reflection.
//!
//! # Invariants
//! - Descriptor identifiers are plain SQL identifiers; they are the only
//!   names ever interpolated into statements.
//! - `Entity::values()` yields exactly one value per `descriptor().columns`.
//! - The repository never inspects entity content beyond this contract.

use crate::model::value::FieldValue;
use crate::repo::error::{RepoError, RepoResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::FromSql;
use std::collections::BTreeSet;
use std::fmt::Debug;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Who produces the identity value of a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// SQLite assigns the rowid on insert.
    Generated,
    /// The caller sets the identity before saving.
    Assigned,
}

/// Static storage shape of one entity type.
#[derive(Debug)]
pub struct EntityDescriptor {
    /// Display name used in errors and logs.
    pub name: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    /// Persisted non-identity, non-version columns.
    pub columns: &'static [&'static str],
    pub version_column: Option<&'static str>,
    pub id_strategy: IdStrategy,
}

impl EntityDescriptor {
    /// Resolves a caller-supplied property name to the descriptor's own name.
    pub fn property(&self, name: &str) -> Option<&'static str> {
        self.select_columns()
            .into_iter()
            .find(|column| *column == name)
    }

    /// All loaded columns: identity, declared columns, then version.
    pub fn select_columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::with_capacity(self.columns.len() + 2);
        columns.push(self.id_column);
        columns.extend_from_slice(self.columns);
        if let Some(version) = self.version_column {
            columns.push(version);
        }
        columns
    }

    /// Checks identifier syntax and uniqueness.
    pub fn validate(&self) -> RepoResult<()> {
        if !IDENTIFIER_RE.is_match(self.table) {
            return Err(RepoError::InvalidDescriptor(format!(
                "{}: table name `{}` is not a plain identifier",
                self.name, self.table
            )));
        }

        let mut seen = BTreeSet::new();
        for column in self.select_columns() {
            if !IDENTIFIER_RE.is_match(column) {
                return Err(RepoError::InvalidDescriptor(format!(
                    "{}: column name `{column}` is not a plain identifier",
                    self.name
                )));
            }
            if !seen.insert(column) {
                return Err(RepoError::InvalidDescriptor(format!(
                    "{}: column `{column}` is declared twice",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Identity-map key: table plus a type-tagged identity value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    table: &'static str,
    id: String,
}

impl EntityKey {
    pub fn new(descriptor: &EntityDescriptor, id: &FieldValue) -> Self {
        Self {
            table: descriptor.table,
            id: id.identity_key(),
        }
    }

    pub fn of<T: Entity>(id: &T::Id) -> Self {
        let value: FieldValue = id.clone().into();
        Self::new(T::descriptor(), &value)
    }

    pub fn table(&self) -> &'static str {
        self.table
    }
}

/// Column values of one loaded or tracked row.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    entity: &'static str,
    values: Vec<(&'static str, FieldValue)>,
}

impl EntityRow {
    pub fn new(entity: &'static str, values: Vec<(&'static str, FieldValue)>) -> Self {
        Self { entity, values }
    }

    /// Captures the current state of `entity` as the session would see it
    /// after writing it.
    pub fn snapshot<T: Entity>(entity: &T) -> RepoResult<Self> {
        let descriptor = T::descriptor();
        let id = entity.id().ok_or(RepoError::TransientEntity {
            entity: descriptor.name,
        })?;

        let mut values = Vec::with_capacity(descriptor.columns.len() + 2);
        values.push((descriptor.id_column, id.into()));
        values.extend(
            descriptor
                .columns
                .iter()
                .copied()
                .zip(checked_values(entity)?),
        );
        if let Some(version_column) = descriptor.version_column {
            values.push((version_column, entity.version().into()));
        }
        Ok(Self::new(descriptor.name, values))
    }

    pub fn value(&self, column: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    /// Reads one column through `rusqlite`'s conversion rules.
    pub fn get<V: FromSql>(&self, column: &str) -> RepoResult<V> {
        let value = self.value(column).ok_or_else(|| {
            RepoError::InvalidData(format!("column `{column}` missing from {} row", self.entity))
        })?;
        V::column_result(value.as_value_ref()).map_err(|err| {
            RepoError::InvalidData(format!("invalid value in {}.{column}: {err}", self.entity))
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.values.iter().map(|(name, value)| (*name, value))
    }
}

/// Storage capability implemented by every persisted type.
///
/// # Example
/// ```
/// use repokit_core::{Entity, EntityDescriptor, EntityRow, FieldValue, IdStrategy, RepoResult};
///
/// struct Widget {
///     id: Option<i64>,
///     name: String,
/// }
///
/// static WIDGET: EntityDescriptor = EntityDescriptor {
///     name: "Widget",
///     table: "widgets",
///     id_column: "id",
///     columns: &["name"],
///     version_column: None,
///     id_strategy: IdStrategy::Generated,
/// };
///
/// impl Entity for Widget {
///     type Id = i64;
///
///     fn descriptor() -> &'static EntityDescriptor {
///         &WIDGET
///     }
///     fn id(&self) -> Option<i64> {
///         self.id
///     }
///     fn set_id(&mut self, id: i64) {
///         self.id = Some(id);
///     }
///     fn values(&self) -> Vec<FieldValue> {
///         vec![self.name.as_str().into()]
///     }
///     fn from_row(row: &EntityRow) -> RepoResult<Self> {
///         Ok(Self {
///             id: Some(row.get("id")?),
///             name: row.get("name")?,
///         })
///     }
/// }
/// ```
pub trait Entity: Sized {
    type Id: Clone + Debug + Into<FieldValue> + FromSql;

    fn descriptor() -> &'static EntityDescriptor;

    /// `None` while the entity has never been saved.
    fn id(&self) -> Option<Self::Id>;

    fn set_id(&mut self, id: Self::Id);

    /// Values for `descriptor().columns`, in declaration order.
    fn values(&self) -> Vec<FieldValue>;

    fn from_row(row: &EntityRow) -> RepoResult<Self>;

    /// Optimistic-lock version; only read when the descriptor declares one.
    fn version(&self) -> Option<i64> {
        None
    }

    fn set_version(&mut self, _version: i64) {}
}

/// Returns `entity.values()` after checking it matches the descriptor arity.
pub(crate) fn checked_values<T: Entity>(entity: &T) -> RepoResult<Vec<FieldValue>> {
    let descriptor = T::descriptor();
    let values = entity.values();
    if values.len() != descriptor.columns.len() {
        return Err(RepoError::InvalidData(format!(
            "{} produced {} values for {} columns",
            descriptor.name,
            values.len(),
            descriptor.columns.len()
        )));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::{EntityDescriptor, EntityKey, EntityRow, IdStrategy};
    use crate::model::value::FieldValue;
    use crate::repo::error::RepoError;

    static NOTE: EntityDescriptor = EntityDescriptor {
        name: "Note",
        table: "notes",
        id_column: "id",
        columns: &["title", "body"],
        version_column: Some("version"),
        id_strategy: IdStrategy::Generated,
    };

    #[test]
    fn select_columns_orders_identity_columns_version() {
        assert_eq!(NOTE.select_columns(), vec!["id", "title", "body", "version"]);
        assert_eq!(NOTE.property("version"), Some("version"));
        assert_eq!(NOTE.property("author"), None);
    }

    #[test]
    fn validate_rejects_injection_shaped_names() {
        let bad = EntityDescriptor {
            name: "Bad",
            table: "notes; DROP TABLE notes",
            id_column: "id",
            columns: &[],
            version_column: None,
            id_strategy: IdStrategy::Generated,
        };
        assert!(matches!(bad.validate(), Err(RepoError::InvalidDescriptor(_))));
        assert!(NOTE.validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_columns() {
        let duplicated = EntityDescriptor {
            name: "Dup",
            table: "dups",
            id_column: "id",
            columns: &["id"],
            version_column: None,
            id_strategy: IdStrategy::Assigned,
        };
        let err = duplicated.validate().unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn row_get_reports_missing_and_mistyped_columns() {
        let row = EntityRow::new(
            "Note",
            vec![
                ("id", FieldValue::Integer(1)),
                ("title", FieldValue::Text("hi".to_string())),
            ],
        );
        assert_eq!(row.get::<i64>("id").unwrap(), 1);
        assert!(matches!(row.get::<i64>("body"), Err(RepoError::InvalidData(_))));
        assert!(matches!(row.get::<i64>("title"), Err(RepoError::InvalidData(_))));
    }

    #[test]
    fn keys_are_scoped_by_table() {
        let id = FieldValue::Integer(1);
        let other = EntityDescriptor {
            name: "Other",
            table: "others",
            id_column: "id",
            columns: &[],
            version_column: None,
            id_strategy: IdStrategy::Generated,
        };
        assert_ne!(EntityKey::new(&NOTE, &id), EntityKey::new(&other, &id));
        assert_eq!(EntityKey::new(&NOTE, &id).table(), "notes");
    }
}
