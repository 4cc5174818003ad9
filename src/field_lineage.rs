use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

use crate::config::LineageConfig;
use crate::error::{LineageError, Result};
use crate::models::{Catalog, FieldEntity};

/// Endpoint of a schema lineage edge, denormalized for the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaLineageNode {
    /// Field id
    pub id: String,
    /// Field name
    pub label: String,
    /// fqdn of the owning table
    pub parent: String,
}

impl From<&FieldEntity> for SchemaLineageNode {
    fn from(field: &FieldEntity) -> Self {
        Self {
            id: field.id.clone(),
            label: field.name.clone(),
            parent: field.table.clone(),
        }
    }
}

/// `from` is always the field being expanded; `to` is its successor in the
/// forward list and its dependency in the backward list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaLineageEdge {
    pub from: SchemaLineageNode,
    pub to: SchemaLineageNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Along successor edges.
    Forward,
    /// Along dependency edges.
    Backward,
}

impl Direction {
    fn neighbors(self, field: &FieldEntity) -> &BTreeSet<String> {
        match self {
            Direction::Forward => &field.successors,
            Direction::Backward => &field.dependencies,
        }
    }
}

/// Forward and backward schema lineage of all fields of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldLineage {
    pub forward_edges: Vec<SchemaLineageEdge>,
    pub backward_edges: Vec<SchemaLineageEdge>,
}

impl FieldLineage {
    pub fn build(catalog: &Catalog, fqdn: &str, config: &LineageConfig) -> Result<Self> {
        let table = catalog.require_table(fqdn)?;
        let fields = catalog.fields_of(table).collect::<Result<Vec<_>>>()?;

        let forward_edges = walk(catalog, &fields, Direction::Forward, config.max_field_depth)?;
        let backward_edges = walk(catalog, &fields, Direction::Backward, config.max_field_depth)?;

        tracing::debug!(
            "Field lineage for {}: {} forward edges, {} backward edges",
            fqdn,
            forward_edges.len(),
            backward_edges.len()
        );
        Ok(FieldLineage {
            forward_edges,
            backward_edges,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

struct Frame<'a> {
    field: &'a FieldEntity,
    depth: usize,
    pending: Vec<&'a FieldEntity>,
}

/// Depth-first walk from every root, emitting one edge per hop.
///
/// Each field is expanded at most once per call, so cycles terminate. Paths
/// longer than `max_depth` hops fail with `GraphTooDeep`.
pub fn walk<'a>(
    catalog: &'a Catalog,
    roots: &[&'a FieldEntity],
    direction: Direction,
    max_depth: usize,
) -> Result<Vec<SchemaLineageEdge>> {
    let mut edges = Vec::new();
    let mut expanded: HashSet<&'a str> = HashSet::new();

    for &root in roots {
        if !expanded.insert(root.id.as_str()) {
            continue;
        }
        let mut stack = vec![open_frame(catalog, root, 0, direction)?];

        while let Some(top) = stack.last_mut() {
            let Some(neighbor) = top.pending.pop() else {
                stack.pop();
                continue;
            };
            let (field, depth) = (top.field, top.depth + 1);
            if depth > max_depth {
                return Err(LineageError::GraphTooDeep {
                    field: root.id.clone(),
                    limit: max_depth,
                });
            }

            edges.push(SchemaLineageEdge {
                from: field.into(),
                to: neighbor.into(),
            });
            if expanded.insert(neighbor.id.as_str()) {
                stack.push(open_frame(catalog, neighbor, depth, direction)?);
            }
        }
    }

    Ok(edges)
}

fn open_frame<'a>(
    catalog: &'a Catalog,
    field: &'a FieldEntity,
    depth: usize,
    direction: Direction,
) -> Result<Frame<'a>> {
    // Reversed so that popping yields neighbors in ascending id order.
    let pending = direction
        .neighbors(field)
        .iter()
        .rev()
        .map(|id| catalog.require_field(id))
        .collect::<Result<Vec<_>>>()?;
    Ok(Frame {
        field,
        depth,
        pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pairs(edges: &[SchemaLineageEdge]) -> Vec<(&str, &str)> {
        edges
            .iter()
            .map(|e| (e.from.id.as_str(), e.to.id.as_str()))
            .collect()
    }

    /// raw.orders(1: id, 2: amount) -> stage.orders(3: id, 4: amount_eur)
    /// -> mart.revenue(5: total)
    fn sample_catalog() -> Catalog {
        let mut catalog = Catalog::new();
        for table in ["raw.orders", "stage.orders", "mart.revenue"] {
            catalog.add_table(table);
        }
        catalog.add_field("1", "id", "raw.orders").unwrap();
        catalog.add_field("2", "amount", "raw.orders").unwrap();
        catalog.add_field("3", "id", "stage.orders").unwrap();
        catalog.add_field("4", "amount_eur", "stage.orders").unwrap();
        catalog.add_field("5", "total", "mart.revenue").unwrap();
        catalog.add_field_dependency("3", "1").unwrap();
        catalog.add_field_dependency("4", "2").unwrap();
        catalog.add_field_dependency("5", "4").unwrap();
        catalog
    }

    #[test]
    fn test_forward_and_backward() -> anyhow::Result<()> {
        let catalog = sample_catalog();

        let lineage = FieldLineage::build(&catalog, "stage.orders", &LineageConfig::default())?;
        assert_eq!(pairs(&lineage.forward_edges), vec![("4", "5")]);
        assert_eq!(pairs(&lineage.backward_edges), vec![("3", "1"), ("4", "2")]);

        let lineage = FieldLineage::build(&catalog, "raw.orders", &LineageConfig::default())?;
        assert_eq!(
            pairs(&lineage.forward_edges),
            vec![("1", "3"), ("2", "4"), ("4", "5")]
        );
        assert!(lineage.backward_edges.is_empty());
        Ok(())
    }

    #[test]
    fn test_edges_are_denormalized() -> anyhow::Result<()> {
        let catalog = sample_catalog();
        let lineage = FieldLineage::build(&catalog, "mart.revenue", &LineageConfig::default())?;

        assert_eq!(
            lineage.backward_edges[0],
            SchemaLineageEdge {
                from: SchemaLineageNode {
                    id: "5".into(),
                    label: "total".into(),
                    parent: "mart.revenue".into(),
                },
                to: SchemaLineageNode {
                    id: "4".into(),
                    label: "amount_eur".into(),
                    parent: "stage.orders".into(),
                },
            }
        );
        assert_eq!(pairs(&lineage.backward_edges), vec![("5", "4"), ("4", "2")]);
        Ok(())
    }

    #[test]
    fn test_json_document() -> anyhow::Result<()> {
        let catalog = sample_catalog();
        let lineage = FieldLineage::build(&catalog, "mart.revenue", &LineageConfig::default())?;
        let value: serde_json::Value = serde_json::from_str(&lineage.to_json()?)?;

        assert_eq!(value["forwardEdges"], json!([]));
        assert_eq!(
            value["backwardEdges"][1],
            json!({
                "from": {"id": "4", "label": "amount_eur", "parent": "stage.orders"},
                "to": {"id": "2", "label": "amount", "parent": "raw.orders"}
            })
        );
        Ok(())
    }

    #[test]
    fn test_cycle_yields_two_edges() -> anyhow::Result<()> {
        let mut catalog = Catalog::new();
        catalog.add_table("db.t");
        catalog.add_field("f1", "a", "db.t")?;
        catalog.add_field("f2", "b", "db.t")?;
        catalog.add_field_dependency("f2", "f1")?;
        catalog.add_field_dependency("f1", "f2")?;

        let lineage = FieldLineage::build(&catalog, "db.t", &LineageConfig::default())?;
        assert_eq!(pairs(&lineage.forward_edges), vec![("f1", "f2"), ("f2", "f1")]);
        assert_eq!(pairs(&lineage.backward_edges), vec![("f1", "f2"), ("f2", "f1")]);
        Ok(())
    }

    #[test]
    fn test_self_dependency_terminates() -> anyhow::Result<()> {
        let mut catalog = Catalog::new();
        catalog.add_table("db.t");
        catalog.add_field("f", "counter", "db.t")?;
        catalog.add_field_dependency("f", "f")?;

        let lineage = FieldLineage::build(&catalog, "db.t", &LineageConfig::default())?;
        assert_eq!(pairs(&lineage.forward_edges), vec![("f", "f")]);
        assert_eq!(pairs(&lineage.backward_edges), vec![("f", "f")]);
        Ok(())
    }

    #[test]
    fn test_shared_downstream_listed_once() -> anyhow::Result<()> {
        let mut catalog = Catalog::new();
        catalog.add_table("src");
        catalog.add_table("dst");
        catalog.add_field("a", "a", "src")?;
        catalog.add_field("b", "b", "src")?;
        catalog.add_field("c", "c", "dst")?;
        catalog.add_field("d", "d", "dst")?;
        catalog.add_field_dependency("c", "a")?;
        catalog.add_field_dependency("c", "b")?;
        catalog.add_field_dependency("d", "c")?;

        let lineage = FieldLineage::build(&catalog, "src", &LineageConfig::default())?;
        assert_eq!(
            pairs(&lineage.forward_edges),
            vec![("a", "c"), ("c", "d"), ("b", "c")]
        );
        Ok(())
    }

    #[test]
    fn test_depth_bound() -> anyhow::Result<()> {
        let mut catalog = Catalog::new();
        catalog.add_table("db.t");
        for i in 0..5 {
            catalog.add_field(i.to_string(), format!("c{}", i), "db.t")?;
        }
        for i in 1..5 {
            catalog.add_field_dependency(&i.to_string(), &(i - 1).to_string())?;
        }
        let shallow = LineageConfig {
            max_field_depth: 3,
            ..LineageConfig::default()
        };

        let err = FieldLineage::build(&catalog, "db.t", &shallow).unwrap_err();
        assert!(matches!(
            err,
            LineageError::GraphTooDeep { ref field, limit: 3 } if field == "0"
        ));

        let exact = LineageConfig {
            max_field_depth: 4,
            ..LineageConfig::default()
        };
        let lineage = FieldLineage::build(&catalog, "db.t", &exact)?;
        assert_eq!(lineage.forward_edges.len(), 4);
        Ok(())
    }

    #[test]
    fn test_table_without_fields() -> anyhow::Result<()> {
        let mut catalog = Catalog::new();
        catalog.add_table("db.empty");
        let lineage = FieldLineage::build(&catalog, "db.empty", &LineageConfig::default())?;
        assert_eq!(lineage.to_json()?, r#"{"forwardEdges":[],"backwardEdges":[]}"#);
        Ok(())
    }

    #[test]
    fn test_missing_table() {
        let catalog = sample_catalog();
        let err = FieldLineage::build(&catalog, "nope.nope", &LineageConfig::default()).unwrap_err();
        assert!(err.is_not_found());
    }
}
