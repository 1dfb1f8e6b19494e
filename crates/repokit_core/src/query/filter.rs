//! Filter sets and order specifications.
//!
//! # Invariants
//! - Filter entries are conjunctive; one entry per property.
//! - An order on a blank property name does not exist (`None`).

use crate::model::value::FieldValue;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Conjunctive equality predicates over named entity properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    entries: BTreeMap<String, FieldValue>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `property = value`; replaces an earlier entry for `property`.
    #[must_use]
    pub fn with(mut self, property: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(property, value);
        self
    }

    pub fn insert(
        &mut self,
        property: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.entries.insert(property.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries
            .iter()
            .map(|(property, value)| (property.as_str(), value))
    }
}

impl<K, V> FromIterator<(K, V)> for FilterSet
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut filters = Self::new();
        for (property, value) in iter {
            filters.insert(property, value);
        }
        filters
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

impl OrderDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

impl Display for OrderDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Single-property sort directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    property: String,
    direction: OrderDirection,
}

impl OrderSpec {
    /// Returns `None` when `property` is empty or whitespace.
    pub fn new(property: impl Into<String>, direction: OrderDirection) -> Option<Self> {
        let property = property.into();
        let trimmed = property.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            property: trimmed.to_string(),
            direction,
        })
    }

    pub fn asc(property: impl Into<String>) -> Option<Self> {
        Self::new(property, OrderDirection::Ascending)
    }

    pub fn desc(property: impl Into<String>) -> Option<Self> {
        Self::new(property, OrderDirection::Descending)
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterSet, OrderDirection, OrderSpec};
    use crate::model::value::FieldValue;

    #[test]
    fn later_entry_replaces_earlier_one() {
        let filters = FilterSet::new().with("weight", 10).with("weight", 5);
        assert_eq!(filters.len(), 1);
        assert_eq!(
            filters.iter().next(),
            Some(("weight", &FieldValue::Integer(5)))
        );
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let forward = FilterSet::new().with("a", 1).with("b", "x");
        let backward: FilterSet = vec![
            ("b", FieldValue::from("x")),
            ("a", FieldValue::from(1)),
        ]
        .into_iter()
        .collect();
        assert_eq!(forward, backward);
    }

    #[test]
    fn blank_order_property_means_no_ordering() {
        assert!(OrderSpec::asc("").is_none());
        assert!(OrderSpec::desc("   ").is_none());

        let order = OrderSpec::desc(" name ").unwrap();
        assert_eq!(order.property(), "name");
        assert_eq!(order.direction(), OrderDirection::Descending);
        assert_eq!(order.direction().as_sql(), "DESC");
    }
}
