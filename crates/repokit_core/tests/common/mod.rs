#![allow(dead_code)]

use repokit_core::{
    Entity, EntityDescriptor, EntityRow, FieldValue, IdStrategy, Migration, OperationContext,
    RepoResult, Repository, SessionProvider, StoreConfig,
};
use std::path::Path;
use std::time::Duration;

pub const MIGRATIONS: &[Migration] = &[
    Migration::new(
        1,
        "CREATE TABLE widgets (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            weight INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX idx_widgets_name ON widgets(name);",
    ),
    Migration::new(
        2,
        "CREATE TABLE gadgets (
            code TEXT PRIMARY KEY,
            label TEXT,
            version INTEGER NOT NULL
        );",
    ),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub id: Option<i64>,
    pub name: String,
    pub weight: i64,
}

impl Widget {
    pub fn new(name: &str, weight: i64) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            weight,
        }
    }
}

pub static WIDGET: EntityDescriptor = EntityDescriptor {
    name: "Widget",
    table: "widgets",
    id_column: "id",
    columns: &["name", "weight"],
    version_column: None,
    id_strategy: IdStrategy::Generated,
};

impl Entity for Widget {
    type Id = i64;

    fn descriptor() -> &'static EntityDescriptor {
        &WIDGET
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![self.name.as_str().into(), self.weight.into()]
    }

    fn from_row(row: &EntityRow) -> RepoResult<Self> {
        Ok(Self {
            id: Some(row.get("id")?),
            name: row.get("name")?,
            weight: row.get("weight")?,
        })
    }
}

/// Assigned-id entity with an optimistic-lock version.
#[derive(Debug, Clone, PartialEq)]
pub struct Gadget {
    pub code: Option<String>,
    pub label: Option<String>,
    pub version: Option<i64>,
}

impl Gadget {
    pub fn new(code: &str, label: Option<&str>) -> Self {
        Self {
            code: Some(code.to_string()),
            label: label.map(str::to_string),
            version: None,
        }
    }
}

pub static GADGET: EntityDescriptor = EntityDescriptor {
    name: "Gadget",
    table: "gadgets",
    id_column: "code",
    columns: &["label"],
    version_column: Some("version"),
    id_strategy: IdStrategy::Assigned,
};

impl Entity for Gadget {
    type Id = String;

    fn descriptor() -> &'static EntityDescriptor {
        &GADGET
    }

    fn id(&self) -> Option<String> {
        self.code.clone()
    }

    fn set_id(&mut self, id: String) {
        self.code = Some(id);
    }

    fn values(&self) -> Vec<FieldValue> {
        vec![self.label.clone().into()]
    }

    fn from_row(row: &EntityRow) -> RepoResult<Self> {
        Ok(Self {
            code: Some(row.get("code")?),
            label: row.get("label")?,
            version: Some(row.get("version")?),
        })
    }

    fn version(&self) -> Option<i64> {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = Some(version);
    }
}

pub fn memory_context() -> OperationContext {
    OperationContext::open(&StoreConfig::in_memory(), MIGRATIONS).unwrap()
}

pub fn file_context(path: &Path) -> OperationContext {
    let config = StoreConfig::file(path).with_busy_timeout(Duration::from_millis(50));
    OperationContext::open(&config, MIGRATIONS).unwrap()
}

/// Seeds Widget(1,"a",10), Widget(2,"b",10), Widget(3,"c",5).
pub fn seed_widgets(repo: &impl Repository<Widget>) -> Vec<Widget> {
    [("a", 10), ("b", 10), ("c", 5)]
        .into_iter()
        .map(|(name, weight)| {
            let mut widget = Widget::new(name, weight);
            repo.save(&mut widget).unwrap();
            widget
        })
        .collect()
}

/// Reads a widget's weight straight from the connection, bypassing tracking.
pub fn stored_weight(context: &OperationContext, id: i64) -> Option<i64> {
    let session = context.session().unwrap();
    let weight = session
        .connection()
        .query_row("SELECT weight FROM widgets WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .ok();
    weight
}

/// Reads a gadget's label and version straight from the connection.
pub fn stored_gadget(context: &OperationContext, code: &str) -> Option<(Option<String>, i64)> {
    let session = context.session().unwrap();
    let stored = session
        .connection()
        .query_row(
            "SELECT label, version FROM gadgets WHERE code = ?1",
            [code],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .ok();
    stored
}

pub fn names(widgets: &[Widget]) -> Vec<&str> {
    widgets.iter().map(|widget| widget.name.as_str()).collect()
}
