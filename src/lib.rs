pub mod config;
pub mod error;
pub mod field_lineage;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod render;
pub mod server;
pub mod table_lineage;

pub use config::LineageConfig;
pub use error::{LineageError, Result};
pub use field_lineage::{FieldLineage, SchemaLineageEdge, SchemaLineageNode};
pub use models::{Catalog, FieldEntity, TableEntity};
pub use render::{VisEdge, VisNetwork, VisNode};
pub use table_lineage::{DistanceRange, TableLineage, VisitationNode};

/// Table-level lineage of `fqdn` as a network document.
pub fn table_lineage_network(
    catalog: &Catalog,
    fqdn: &str,
    config: &LineageConfig,
) -> Result<VisNetwork> {
    let (lineage, range) = TableLineage::compute(catalog, fqdn, config)?;
    tracing::debug!(
        "Rendering {} tables of {} over distances {}..={}",
        lineage.len(),
        lineage.target(),
        range.min,
        range.max
    );
    Ok(VisNetwork::render(&lineage))
}

/// Table-level lineage of `fqdn`, encoded as JSON.
pub fn table_lineage_json(catalog: &Catalog, fqdn: &str, config: &LineageConfig) -> Result<String> {
    table_lineage_network(catalog, fqdn, config)?.to_json()
}

/// Field-level lineage of the fields of `fqdn`, encoded as JSON.
pub fn field_lineage_json(catalog: &Catalog, fqdn: &str, config: &LineageConfig) -> Result<String> {
    FieldLineage::build(catalog, fqdn, config)?.to_json()
}
