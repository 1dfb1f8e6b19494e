//! Criteria builder and statement rendering.
//!
//! # Responsibility
//! - Translate filter sets and order specs into SQL for one entity type.
//! - Render the write statements the session executes or queues.
//!
//! # Invariants
//! - Only descriptor identifiers reach SQL text; caller values are always
//!   bound parameters.
//! - Unknown filter/order properties fail eagerly with
//!   `InvalidFilterProperty`, before any statement runs.
//! - Selects always end with the identity column as a tie-breaker, so
//!   windowed reads partition the full listing.

use crate::model::entity::EntityDescriptor;
use crate::model::value::FieldValue;
use crate::query::filter::{FilterSet, OrderDirection, OrderSpec};
use crate::repo::error::{RepoError, RepoResult};

/// SQL text plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<FieldValue>,
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Eq(&'static str, FieldValue),
    IsNull(&'static str),
}

/// Validated, not-yet-executed query over one entity type.
#[derive(Debug, Clone)]
pub struct Criteria {
    descriptor: &'static EntityDescriptor,
    predicates: Vec<Predicate>,
    order: Option<(&'static str, OrderDirection)>,
}

impl Criteria {
    /// Unfiltered, unordered query over every row of the entity's table.
    pub fn for_entity(descriptor: &'static EntityDescriptor) -> Self {
        Self {
            descriptor,
            predicates: Vec::new(),
            order: None,
        }
    }

    /// Builds criteria from optional caller input.
    pub fn build(
        descriptor: &'static EntityDescriptor,
        filters: Option<&FilterSet>,
        order: Option<&OrderSpec>,
    ) -> RepoResult<Self> {
        let mut criteria = Self::for_entity(descriptor);
        if let Some(filters) = filters {
            criteria = criteria.filter(filters)?;
        }
        if let Some(order) = order {
            criteria = criteria.order(order)?;
        }
        Ok(criteria)
    }

    /// Adds one equality predicate per entry; null values match `IS NULL`.
    pub fn filter(mut self, filters: &FilterSet) -> RepoResult<Self> {
        for (property, value) in filters.iter() {
            let column = self.resolve(property)?;
            let predicate = if value.is_null() {
                Predicate::IsNull(column)
            } else {
                Predicate::Eq(column, value.clone())
            };
            self.predicates.push(predicate);
        }
        Ok(self)
    }

    pub fn order(mut self, order: &OrderSpec) -> RepoResult<Self> {
        let column = self.resolve(order.property())?;
        self.order = Some((column, order.direction()));
        Ok(self)
    }

    /// Full select with ordering.
    pub fn select(&self) -> Statement {
        let mut statement = self.select_unordered();
        self.push_order(&mut statement.sql);
        statement
    }

    /// Select restricted to `limit` rows after skipping `offset` rows.
    pub fn select_window(&self, offset: u64, limit: u64) -> Statement {
        let mut statement = self.select();
        statement.sql.push_str(" LIMIT ? OFFSET ?");
        statement.params.push(FieldValue::Integer(clamp_i64(limit)));
        statement.params.push(FieldValue::Integer(clamp_i64(offset)));
        statement
    }

    /// Distinct identity count over the same filter, ignoring order.
    pub fn count(&self) -> Statement {
        let mut sql = format!(
            "SELECT COUNT(DISTINCT {}) FROM {}",
            quote(self.descriptor.id_column),
            quote(self.descriptor.table)
        );
        let params = self.push_where(&mut sql);
        Statement { sql, params }
    }

    fn select_unordered(&self) -> Statement {
        let columns = self
            .descriptor
            .select_columns()
            .into_iter()
            .map(quote)
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {columns} FROM {}", quote(self.descriptor.table));
        let params = self.push_where(&mut sql);
        Statement { sql, params }
    }

    fn push_where(&self, sql: &mut String) -> Vec<FieldValue> {
        let mut params = Vec::new();
        for (index, predicate) in self.predicates.iter().enumerate() {
            sql.push_str(if index == 0 { " WHERE " } else { " AND " });
            match predicate {
                Predicate::Eq(column, value) => {
                    sql.push_str(&format!("{} = ?", quote(column)));
                    params.push(value.clone());
                }
                Predicate::IsNull(column) => {
                    sql.push_str(&format!("{} IS NULL", quote(column)));
                }
            }
        }
        params
    }

    fn push_order(&self, sql: &mut String) {
        let id = quote(self.descriptor.id_column);
        match self.order {
            Some((column, direction)) if column != self.descriptor.id_column => {
                sql.push_str(&format!(
                    " ORDER BY {} {}, {id} ASC",
                    quote(column),
                    direction.as_sql()
                ));
            }
            Some((_, direction)) => {
                sql.push_str(&format!(" ORDER BY {id} {}", direction.as_sql()));
            }
            None => sql.push_str(&format!(" ORDER BY {id} ASC")),
        }
    }

    fn resolve(&self, property: &str) -> RepoResult<&'static str> {
        self.descriptor
            .property(property)
            .ok_or_else(|| RepoError::InvalidFilterProperty {
                entity: self.descriptor.name,
                property: property.to_string(),
            })
    }
}

/// `INSERT` of the given columns; `DEFAULT VALUES` when there are none.
pub fn insert_statement(
    descriptor: &EntityDescriptor,
    columns: &[&'static str],
    params: Vec<FieldValue>,
) -> Statement {
    let table = quote(descriptor.table);
    if columns.is_empty() {
        return Statement {
            sql: format!("INSERT INTO {table} DEFAULT VALUES"),
            params,
        };
    }
    let names = columns.iter().copied().map(quote).collect::<Vec<_>>();
    let placeholders = vec!["?"; columns.len()].join(", ");
    Statement {
        sql: format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            names.join(", ")
        ),
        params,
    }
}

/// Full-row `UPDATE`; with `version = Some((stored, next))` the write only
/// applies while the row still carries `stored`.
pub fn update_statement(
    descriptor: &EntityDescriptor,
    values: Vec<FieldValue>,
    id: FieldValue,
    version: Option<(i64, i64)>,
) -> Statement {
    let mut assignments = descriptor
        .columns
        .iter()
        .map(|column| format!("{} = ?", quote(column)))
        .collect::<Vec<_>>();
    let mut params = values;

    let id_column = quote(descriptor.id_column);
    match (descriptor.version_column, version) {
        (Some(version_column), Some((stored, next))) => {
            assignments.push(format!("{} = ?", quote(version_column)));
            params.push(FieldValue::Integer(next));
            params.push(id);
            params.push(FieldValue::Integer(stored));
            Statement {
                sql: format!(
                    "UPDATE {} SET {} WHERE {id_column} = ? AND {} = ?",
                    quote(descriptor.table),
                    assignments.join(", "),
                    quote(version_column)
                ),
                params,
            }
        }
        _ => {
            if assignments.is_empty() {
                assignments.push(format!("{id_column} = {id_column}"));
            }
            params.push(id);
            Statement {
                sql: format!(
                    "UPDATE {} SET {} WHERE {id_column} = ?",
                    quote(descriptor.table),
                    assignments.join(", ")
                ),
                params,
            }
        }
    }
}

pub fn delete_statement(
    descriptor: &EntityDescriptor,
    id: FieldValue,
    version: Option<i64>,
) -> Statement {
    let mut sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        quote(descriptor.table),
        quote(descriptor.id_column)
    );
    let mut params = vec![id];
    if let (Some(version_column), Some(stored)) = (descriptor.version_column, version) {
        sql.push_str(&format!(" AND {} = ?", quote(version_column)));
        params.push(FieldValue::Integer(stored));
    }
    Statement { sql, params }
}

/// No-op write on one row. Executing it inside a transaction takes SQLite's
/// write lock until the transaction ends.
pub fn lock_statement(descriptor: &EntityDescriptor, id: FieldValue) -> Statement {
    let id_column = quote(descriptor.id_column);
    Statement {
        sql: format!(
            "UPDATE {} SET {id_column} = {id_column} WHERE {id_column} = ?",
            quote(descriptor.table)
        ),
        params: vec![id],
    }
}

/// Existence probe returning the stored version (or `NULL`) for one row.
pub fn probe_statement(descriptor: &EntityDescriptor, id: FieldValue) -> Statement {
    let selected = descriptor.version_column.map_or("NULL".to_string(), quote);
    Statement {
        sql: format!(
            "SELECT {selected} FROM {} WHERE {} = ?",
            quote(descriptor.table),
            quote(descriptor.id_column)
        ),
        params: vec![id],
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
