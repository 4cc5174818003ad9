use anyhow::Context;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{LineageError, Result};

/// A warehouse table and its table-level edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntity {
    pub fqdn: String,
    /// Upstream tables this table reads from.
    pub dependencies: BTreeSet<String>,
    /// Downstream tables reading from this table.
    pub successors: BTreeSet<String>,
    /// Field ids in declaration order.
    pub fields: Vec<String>,
}

impl TableEntity {
    fn new(fqdn: String) -> Self {
        Self {
            fqdn,
            dependencies: BTreeSet::new(),
            successors: BTreeSet::new(),
            fields: Vec::new(),
        }
    }
}

/// A column of a table with its own, finer dependency edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEntity {
    pub id: String,
    pub name: String,
    /// fqdn of the owning table
    pub table: String,
    pub dependencies: BTreeSet<String>,
    pub successors: BTreeSet<String>,
}

/// Immutable snapshot of the catalog used for one or more lineage requests.
///
/// Both sides of every edge are kept in sync: registering `a` as a
/// dependency of `b` also registers `b` as a successor of `a`.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<String, TableEntity>,
    fields: BTreeMap<String, FieldEntity>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table. Returns false if it was already present.
    pub fn add_table(&mut self, fqdn: impl Into<String>) -> bool {
        let fqdn = fqdn.into();
        if self.tables.contains_key(&fqdn) {
            return false;
        }
        self.tables.insert(fqdn.clone(), TableEntity::new(fqdn));
        true
    }

    /// Records that `consumer` reads from `producer`.
    pub fn add_dependency(&mut self, consumer: &str, producer: &str) -> Result<()> {
        self.require_table(producer)?;
        self.table_mut(consumer)?
            .dependencies
            .insert(producer.to_string());
        self.table_mut(producer)?
            .successors
            .insert(consumer.to_string());
        Ok(())
    }

    pub fn add_field(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        table: &str,
    ) -> Result<()> {
        let id = id.into();
        if self.fields.contains_key(&id) {
            return Err(LineageError::InvalidSnapshot(format!(
                "duplicate field id '{}'",
                id
            )));
        }
        self.table_mut(table)?.fields.push(id.clone());
        self.fields.insert(
            id.clone(),
            FieldEntity {
                id,
                name: name.into(),
                table: table.to_string(),
                dependencies: BTreeSet::new(),
                successors: BTreeSet::new(),
            },
        );
        Ok(())
    }

    /// Records that field `consumer` is computed from field `producer`.
    pub fn add_field_dependency(&mut self, consumer: &str, producer: &str) -> Result<()> {
        self.require_field(producer)?;
        self.field_mut(consumer)?
            .dependencies
            .insert(producer.to_string());
        self.field_mut(producer)?
            .successors
            .insert(consumer.to_string());
        Ok(())
    }

    pub fn require_table(&self, fqdn: &str) -> Result<&TableEntity> {
        self.tables
            .get(fqdn)
            .ok_or_else(|| LineageError::TableNotFound(fqdn.to_string()))
    }

    pub fn require_field(&self, id: &str) -> Result<&FieldEntity> {
        self.fields
            .get(id)
            .ok_or_else(|| LineageError::FieldNotFound(id.to_string()))
    }

    /// Fields of a table in declaration order.
    pub fn fields_of<'a>(
        &'a self,
        table: &'a TableEntity,
    ) -> impl Iterator<Item = Result<&'a FieldEntity>> + 'a {
        table.fields.iter().map(|id| self.require_field(id))
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn table_mut(&mut self, fqdn: &str) -> Result<&mut TableEntity> {
        self.tables
            .get_mut(fqdn)
            .ok_or_else(|| LineageError::TableNotFound(fqdn.to_string()))
    }

    fn field_mut(&mut self, id: &str) -> Result<&mut FieldEntity> {
        self.fields
            .get_mut(id)
            .ok_or_else(|| LineageError::FieldNotFound(id.to_string()))
    }

    /// Builds a catalog from a JSON snapshot document.
    ///
    /// Edges may be declared from either side; dangling references and
    /// duplicate identities are rejected as `InvalidSnapshot`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let snapshot: CatalogSnapshot = serde_json::from_str(json)
            .map_err(|e| LineageError::InvalidSnapshot(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read catalog snapshot: {:?}", path.as_ref()))?;
        let catalog = Self::from_json_str(&json)
            .with_context(|| format!("Failed to load catalog snapshot: {:?}", path.as_ref()))?;
        Ok(catalog)
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Result<Self> {
        let mut catalog = Catalog::new();

        for record in &snapshot.tables {
            if !catalog.add_table(record.fqdn.as_str()) {
                return Err(LineageError::InvalidSnapshot(format!(
                    "duplicate table '{}'",
                    record.fqdn
                )));
            }
        }
        for record in &snapshot.fields {
            catalog
                .add_field(record.id.as_str(), record.name.as_str(), &record.table)
                .map_err(dangling)?;
        }

        for record in &snapshot.tables {
            for producer in &record.dependencies {
                catalog
                    .add_dependency(&record.fqdn, producer)
                    .map_err(dangling)?;
            }
            for consumer in &record.successors {
                catalog
                    .add_dependency(consumer, &record.fqdn)
                    .map_err(dangling)?;
            }
        }
        for record in &snapshot.fields {
            for producer in &record.dependencies {
                catalog
                    .add_field_dependency(&record.id, producer)
                    .map_err(dangling)?;
            }
            for consumer in &record.successors {
                catalog
                    .add_field_dependency(consumer, &record.id)
                    .map_err(dangling)?;
            }
        }

        Ok(catalog)
    }
}

fn dangling(err: LineageError) -> LineageError {
    match err {
        LineageError::TableNotFound(fqdn) => {
            LineageError::InvalidSnapshot(format!("unknown table '{}'", fqdn))
        }
        LineageError::FieldNotFound(id) => {
            LineageError::InvalidSnapshot(format!("unknown field '{}'", id))
        }
        other => other,
    }
}

/// Serialized form of a catalog as exported by the metadata store.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub tables: Vec<TableRecord>,
    #[serde(default)]
    pub fields: Vec<FieldRecord>,
}

#[derive(Debug, Deserialize)]
pub struct TableRecord {
    pub fqdn: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub successors: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FieldRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub table: String,
    #[serde(default, deserialize_with = "strings_or_numbers")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "strings_or_numbers")]
    pub successors: Vec<String>,
}

// Field ids are opaque; the store exports them either as strings or integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldId {
    Text(String),
    Number(i64),
}

impl From<FieldId> for String {
    fn from(id: FieldId) -> Self {
        match id {
            FieldId::Text(s) => s,
            FieldId::Number(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    FieldId::deserialize(deserializer).map(String::from)
}

fn strings_or_numbers<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let ids = Vec::<FieldId>::deserialize(deserializer)?;
    Ok(ids.into_iter().map(String::from).collect())
}
