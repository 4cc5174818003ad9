use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::config::LineageConfig;
use crate::error::{LineageError, Result};
use crate::models::{Catalog, TableEntity};

/// Position of a node in [`TableLineage`]'s arena.
pub type NodeIndex = usize;

/// One table discovered during a lineage computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitationNode {
    pub fqdn: String,
    /// Signed offset relative to the other nodes; grows downstream.
    pub distance: i64,
    /// Successor nodes.
    pub next: BTreeSet<NodeIndex>,
    /// Dependency nodes.
    pub previous: BTreeSet<NodeIndex>,
    /// Zero-based layout level, set by [`TableLineage::normalize`].
    pub level: i64,
    /// Dense identifier, set by [`TableLineage::assign_ids`].
    pub id: usize,
}

impl VisitationNode {
    fn new(fqdn: &str, distance: i64) -> Self {
        Self {
            fqdn: fqdn.to_string(),
            distance,
            next: BTreeSet::new(),
            previous: BTreeSet::new(),
            level: 0,
            id: 0,
        }
    }
}

/// Smallest and largest distance present in a lineage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DistanceRange {
    pub min: i64,
    pub max: i64,
}

/// The visitation nodes of one lineage request, keyed by table identity.
///
/// Built in two passes: successor edges are followed down to the terminal
/// consumers, keeping the longest distance to each, and those terminals then
/// seed an upstream walk over dependency edges. Both walks keep explicit
/// frame stacks instead of recursing.
#[derive(Debug, Clone)]
pub struct TableLineage {
    target: String,
    nodes: Vec<VisitationNode>,
    index: BTreeMap<String, NodeIndex>,
}

impl TableLineage {
    /// Discovers every table related to `fqdn` and links them into a graph.
    ///
    /// Fails with `TableNotFound` before any traversal if the table is not in
    /// the catalog, and with `GraphTooLarge` if `config.max_nodes` is set and
    /// exceeded.
    pub fn build(catalog: &Catalog, fqdn: &str, config: &LineageConfig) -> Result<Self> {
        let target = catalog.require_table(fqdn)?;

        let top_level = TopLevelDiscovery::run(catalog, target)?;
        tracing::debug!(
            "Found {} top-level tables below {}",
            top_level.len(),
            target.fqdn
        );

        let mut lineage = TableLineage {
            target: target.fqdn.clone(),
            nodes: Vec::new(),
            index: BTreeMap::new(),
        };
        let mut walk = DependencyWalk {
            catalog,
            lineage: &mut lineage,
            max_nodes: config.max_nodes,
            stack: Vec::new(),
        };
        // BTreeMap iteration fixes the seed order to ascending fqdn.
        for (seed, distance) in top_level {
            walk.expand_seed(catalog.require_table(seed)?, distance)?;
        }

        tracing::debug!(
            "Table lineage for {} has {} nodes",
            lineage.target,
            lineage.nodes.len()
        );
        Ok(lineage)
    }

    /// Builds, normalizes and numbers the graph in one go.
    pub fn compute(
        catalog: &Catalog,
        fqdn: &str,
        config: &LineageConfig,
    ) -> Result<(Self, DistanceRange)> {
        let mut lineage = Self::build(catalog, fqdn, config)?;
        let range = lineage.normalize();
        lineage.assign_ids();
        Ok((lineage, range))
    }

    /// Sets `level = distance - min` on every node and returns the range.
    ///
    /// Gaps between distances are kept as gaps between levels.
    pub fn normalize(&mut self) -> DistanceRange {
        let range = match self.nodes.iter().map(|n| n.distance).minmax().into_option() {
            Some((min, max)) => DistanceRange { min, max },
            None => DistanceRange::default(),
        };
        for node in &mut self.nodes {
            node.level = node.distance - range.min;
        }
        range
    }

    /// Numbers the nodes `0..len` ordered by level, then by fqdn.
    pub fn assign_ids(&mut self) {
        let order = (0..self.nodes.len())
            .sorted_by(|&a, &b| {
                let (a, b) = (&self.nodes[a], &self.nodes[b]);
                (a.level, &a.fqdn).cmp(&(b.level, &b.fqdn))
            })
            .collect_vec();
        for (id, idx) in order.into_iter().enumerate() {
            self.nodes[idx].id = id;
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn get(&self, fqdn: &str) -> Option<&VisitationNode> {
        self.index.get(fqdn).map(|&idx| &self.nodes[idx])
    }

    pub fn node(&self, idx: NodeIndex) -> &VisitationNode {
        &self.nodes[idx]
    }

    /// Nodes in discovery order.
    pub fn nodes(&self) -> &[VisitationNode] {
        &self.nodes
    }

    /// Table identities with their nodes, ordered by fqdn.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VisitationNode)> {
        self.index
            .iter()
            .map(|(fqdn, &idx)| (fqdn.as_str(), &self.nodes[idx]))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of successor links, i.e. the edge count of the rendered graph.
    pub fn link_count(&self) -> usize {
        self.nodes.iter().map(|n| n.next.len()).sum()
    }
}

struct DiscoveryFrame<'a> {
    table: &'a TableEntity,
    distance: i64,
    pending: Vec<&'a TableEntity>,
}

/// Downstream walk collecting the terminal consumers of a table.
struct TopLevelDiscovery<'a> {
    catalog: &'a Catalog,
    top_level: BTreeMap<&'a str, i64>,
    // Largest distance at which each table has been entered.
    reached: HashMap<&'a str, i64>,
    on_path: HashSet<&'a str>,
    stack: Vec<DiscoveryFrame<'a>>,
}

impl<'a> TopLevelDiscovery<'a> {
    fn run(catalog: &'a Catalog, target: &'a TableEntity) -> Result<BTreeMap<&'a str, i64>> {
        let mut discovery = TopLevelDiscovery {
            catalog,
            top_level: BTreeMap::new(),
            reached: HashMap::new(),
            on_path: HashSet::new(),
            stack: Vec::new(),
        };
        discovery.enter(target, 0)?;

        loop {
            let Some(frame) = discovery.stack.last_mut() else {
                break;
            };
            let distance = frame.distance + 1;
            let Some(successor) = frame.pending.pop() else {
                let table = frame.table;
                discovery.stack.pop();
                discovery.on_path.remove(table.fqdn.as_str());
                continue;
            };
            // Entering again at the same or a shorter distance cannot raise
            // any terminal's distance.
            if discovery
                .reached
                .get(successor.fqdn.as_str())
                .is_some_and(|&seen| seen >= distance)
            {
                continue;
            }
            discovery.enter(successor, distance)?;
        }

        Ok(discovery.top_level)
    }

    fn enter(&mut self, table: &'a TableEntity, distance: i64) -> Result<()> {
        self.reached.insert(table.fqdn.as_str(), distance);

        let mut pending = Vec::with_capacity(table.successors.len());
        for successor in &table.successors {
            if *successor == table.fqdn || self.on_path.contains(successor.as_str()) {
                continue;
            }
            pending.push(self.catalog.require_table(successor)?);
        }

        if pending.is_empty() {
            self.top_level
                .entry(table.fqdn.as_str())
                .and_modify(|d| *d = (*d).max(distance))
                .or_insert(distance);
            return Ok(());
        }

        // Popped from the back, so successors are visited in ascending order.
        pending.reverse();
        self.on_path.insert(table.fqdn.as_str());
        self.stack.push(DiscoveryFrame {
            table,
            distance,
            pending,
        });
        Ok(())
    }
}

struct WalkFrame<'a> {
    node: NodeIndex,
    pending: Vec<&'a TableEntity>,
}

/// Upstream walk creating the visitation nodes.
struct DependencyWalk<'a, 'l> {
    catalog: &'a Catalog,
    lineage: &'l mut TableLineage,
    max_nodes: Option<usize>,
    stack: Vec<WalkFrame<'a>>,
}

impl<'a> DependencyWalk<'a, '_> {
    fn expand_seed(&mut self, seed: &'a TableEntity, distance: i64) -> Result<()> {
        // A seed may already have been reached through a cycle.
        if self.lineage.index.contains_key(&seed.fqdn) {
            return Ok(());
        }
        self.visit(seed, distance)?;

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(());
            };
            let parent = frame.node;
            let Some(dependency) = frame.pending.pop() else {
                self.stack.pop();
                continue;
            };

            let existing = self.lineage.index.get(&dependency.fqdn).copied();
            let child = match existing {
                Some(existing) => existing,
                None => {
                    let distance = self.lineage.nodes[parent].distance - 1;
                    self.visit(dependency, distance)?
                }
            };
            self.lineage.nodes[child].next.insert(parent);
            self.lineage.nodes[parent].previous.insert(child);
        }
    }

    /// Registers a node for `table` and schedules its dependencies.
    fn visit(&mut self, table: &'a TableEntity, distance: i64) -> Result<NodeIndex> {
        if let Some(limit) = self.max_nodes {
            if self.lineage.nodes.len() >= limit {
                return Err(LineageError::GraphTooLarge { limit });
            }
        }

        let idx = self.lineage.nodes.len();
        self.lineage
            .nodes
            .push(VisitationNode::new(&table.fqdn, distance));
        self.lineage.index.insert(table.fqdn.clone(), idx);

        let mut pending = Vec::with_capacity(table.dependencies.len());
        for dependency in table.dependencies.iter().rev() {
            if *dependency != table.fqdn {
                pending.push(self.catalog.require_table(dependency)?);
            }
        }
        self.stack.push(WalkFrame { node: idx, pending });
        Ok(idx)
    }
}
