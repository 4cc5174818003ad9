use itertools::Itertools;
use serde::Serialize;

use crate::error::Result;
use crate::table_lineage::TableLineage;

pub const TABLE_GROUP: &str = "tables";
pub const ARROWS_FROM: &str = "from";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisNode {
    pub id: usize,
    /// fqdn split on `.` into one line per segment
    pub label: String,
    pub group: &'static str,
    pub level: i64,
    pub fqdn: String,
}

/// `from` is the downstream table and `to` the upstream one; with
/// `arrows: "from"` the arrowhead sits on the downstream end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisEdge {
    pub from: usize,
    pub to: usize,
    pub arrows: &'static str,
}

/// The nodes/edges document drawn by the catalog's network widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisNetwork {
    pub nodes: Vec<VisNode>,
    pub edges: Vec<VisEdge>,
}

impl VisNetwork {
    /// Renders a graph whose levels and ids have already been assigned.
    ///
    /// Nodes are listed by id. Every successor link of a node yields one
    /// edge, nodes in id order and successors in id order.
    pub fn render(lineage: &TableLineage) -> Self {
        let ordered = lineage.nodes().iter().sorted_by_key(|n| n.id).collect_vec();

        let nodes = ordered
            .iter()
            .map(|node| VisNode {
                id: node.id,
                label: node.fqdn.replace('.', "\n"),
                group: TABLE_GROUP,
                // Odd levels are left free for intermediate layers.
                level: node.level * 2,
                fqdn: node.fqdn.clone(),
            })
            .collect();

        let edges = ordered
            .iter()
            .flat_map(|node| {
                node.next
                    .iter()
                    .map(|&succ| lineage.node(succ).id)
                    .sorted()
                    .map(move |from| VisEdge {
                        from,
                        to: node.id,
                        arrows: ARROWS_FROM,
                    })
            })
            .collect();

        VisNetwork { nodes, edges }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
