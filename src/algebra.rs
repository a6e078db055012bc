use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::OrganismCode;
use crate::error::KiraError;
use crate::graph::{Edge, EdgeAttributes, Graph, Node};

/// Union of organism graphs with per-node and per-edge provenance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FusedRepr", into = "FusedRepr")]
pub struct FusedGraph {
    graph: Graph,
    organisms: BTreeSet<OrganismCode>,
    node_provenance: BTreeMap<Node, BTreeSet<OrganismCode>>,
    edge_provenance: BTreeMap<Edge, BTreeSet<OrganismCode>>,
}

impl FusedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one organism graph into the accumulator.
    ///
    /// Reactions become reversible if any contributor marks them so, and edge
    /// payloads merge by pathway union and maximum weight.
    pub fn absorb(&mut self, organism: &OrganismCode, graph: &Graph) {
        self.organisms.insert(organism.clone());
        for node in graph.nodes() {
            self.graph.add_node(node.clone());
            self.node_provenance
                .entry(node.clone())
                .or_default()
                .insert(organism.clone());
        }
        for (edge, attributes) in graph.edges_with_attributes() {
            self.graph.add_edge_with(edge.clone(), attributes.clone());
            self.edge_provenance
                .entry(edge.clone())
                .or_default()
                .insert(organism.clone());
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn organisms(&self) -> &BTreeSet<OrganismCode> {
        &self.organisms
    }

    pub fn node_provenance(&self, node: &Node) -> Option<&BTreeSet<OrganismCode>> {
        self.node_provenance.get(node)
    }

    pub fn edge_provenance(&self, edge: &Edge) -> Option<&BTreeSet<OrganismCode>> {
        self.edge_provenance.get(edge)
    }

    fn share(&self, provenance: Option<&BTreeSet<OrganismCode>>) -> f64 {
        let total = self.organisms.len();
        if total == 0 {
            return 0.0;
        }
        provenance.map_or(0, BTreeSet::len) as f64 / total as f64
    }
}

pub fn fuse<'a, I>(members: I) -> FusedGraph
where
    I: IntoIterator<Item = (&'a OrganismCode, &'a Graph)>,
{
    let mut fused = FusedGraph::new();
    for (organism, graph) in members {
        fused.absorb(organism, graph);
    }
    debug!(
        organisms = fused.organisms.len(),
        nodes = fused.graph.node_count(),
        edges = fused.graph.edge_count(),
        "graphs fused"
    );
    fused
}

/// Nodes and edges present in at least `threshold` of the fused organisms.
///
/// Shares equal to the threshold are kept, so `1.0` is the intersection of
/// all members and `0.0` is their union.
pub fn core(fused: &FusedGraph, threshold: f64) -> Result<FusedGraph, KiraError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(KiraError::InvalidThreshold(threshold));
    }
    let mut result = FusedGraph {
        organisms: fused.organisms.clone(),
        ..FusedGraph::default()
    };
    for node in fused.graph.nodes() {
        let provenance = fused.node_provenance(node);
        if fused.share(provenance) >= threshold {
            result.graph.add_node(node.clone());
            result
                .node_provenance
                .insert(node.clone(), provenance.cloned().unwrap_or_default());
        }
    }
    for (edge, attributes) in fused.graph.edges_with_attributes() {
        let provenance = fused.edge_provenance(edge);
        if fused.share(provenance) >= threshold {
            result.graph.add_edge_with(edge.clone(), attributes.clone());
            result
                .edge_provenance
                .insert(edge.clone(), provenance.cloned().unwrap_or_default());
        }
    }
    Ok(result)
}

pub fn union(a: &Graph, b: &Graph) -> Graph {
    let mut graph = a.clone();
    for node in b.nodes() {
        graph.add_node(node.clone());
    }
    for (edge, attributes) in b.edges_with_attributes() {
        graph.add_edge_with(edge.clone(), attributes.clone());
    }
    graph
}

/// Nodes and edges present in both graphs.
pub fn intersection(a: &Graph, b: &Graph) -> Graph {
    let mut graph = Graph::new();
    for node in a.nodes().filter(|node| b.contains_node(node)) {
        graph.add_node(node.clone());
        if let Some(other) = b.node(node) {
            graph.add_node(other.clone());
        }
    }
    for (edge, attributes) in a.edges_with_attributes() {
        if let Some(other) = b.edge_attributes(edge) {
            let mut merged = attributes.clone();
            merged.merge(other);
            graph.add_edge_with(edge.clone(), merged);
        }
    }
    graph
}

/// Edges of `a` missing from `b`, plus nodes of `a` missing from `b`.
///
/// Endpoints of the remaining edges are kept even when `b` has them.
pub fn difference(a: &Graph, b: &Graph) -> Graph {
    let mut graph = Graph::new();
    for node in a.nodes().filter(|node| !b.contains_node(node)) {
        graph.add_node(node.clone());
    }
    for (edge, attributes) in a.edges_with_attributes() {
        if !b.contains_edge(edge) {
            graph.add_edge_with(a.canonical_edge(edge), attributes.clone());
        }
    }
    graph
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Overlap {
    pub shared_nodes: usize,
    pub shared_edges: usize,
    pub node_jaccard: f64,
    pub edge_jaccard: f64,
}

/// Symmetric overlap of two graphs. Two empty sets count as identical.
pub fn overlap(a: &Graph, b: &Graph) -> Overlap {
    let shared_nodes = a.nodes().filter(|node| b.contains_node(node)).count();
    let shared_edges = a.edges().filter(|edge| b.contains_edge(edge)).count();
    let jaccard = |shared: usize, left: usize, right: usize| {
        let total = left + right - shared;
        if total == 0 {
            1.0
        } else {
            shared as f64 / total as f64
        }
    };
    Overlap {
        shared_nodes,
        shared_edges,
        node_jaccard: jaccard(shared_nodes, a.node_count(), b.node_count()),
        edge_jaccard: jaccard(shared_edges, a.edge_count(), b.edge_count()),
    }
}

/// Metabolism of a child clade set against its parent clade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CladeComparison {
    pub conserved: Graph,
    pub added: Graph,
    pub lost: Graph,
    pub diverged: Graph,
    pub unified: Graph,
    pub overlap: Overlap,
}

impl CladeComparison {
    pub fn new(parent: &Graph, child: &Graph) -> Self {
        let added = difference(child, parent);
        let lost = difference(parent, child);
        Self {
            conserved: intersection(parent, child),
            diverged: union(&added, &lost),
            unified: union(parent, child),
            overlap: overlap(parent, child),
            added,
            lost,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct FusedNode {
    node: Node,
    organisms: BTreeSet<OrganismCode>,
}

#[derive(Serialize, Deserialize)]
struct FusedEdge {
    edge: Edge,
    #[serde(default)]
    attributes: EdgeAttributes,
    organisms: BTreeSet<OrganismCode>,
}

#[derive(Serialize, Deserialize)]
struct FusedRepr {
    organisms: BTreeSet<OrganismCode>,
    nodes: Vec<FusedNode>,
    edges: Vec<FusedEdge>,
}

impl From<FusedGraph> for FusedRepr {
    fn from(fused: FusedGraph) -> Self {
        let nodes = fused
            .graph
            .nodes()
            .map(|node| FusedNode {
                node: node.clone(),
                organisms: fused.node_provenance.get(node).cloned().unwrap_or_default(),
            })
            .collect();
        let edges = fused
            .graph
            .edges_with_attributes()
            .map(|(edge, attributes)| FusedEdge {
                edge: fused.graph.canonical_edge(edge),
                attributes: attributes.clone(),
                organisms: fused.edge_provenance.get(edge).cloned().unwrap_or_default(),
            })
            .collect();
        Self {
            organisms: fused.organisms,
            nodes,
            edges,
        }
    }
}

impl TryFrom<FusedRepr> for FusedGraph {
    type Error = KiraError;

    fn try_from(repr: FusedRepr) -> Result<Self, Self::Error> {
        let mut fused = FusedGraph {
            organisms: repr.organisms,
            ..FusedGraph::default()
        };
        for entry in repr.nodes {
            if let Some(unknown) = entry.organisms.difference(&fused.organisms).next() {
                return Err(KiraError::malformed(
                    entry.node.to_string(),
                    format!("provenance names {unknown}, which is not a member"),
                ));
            }
            fused.graph.add_node(entry.node.clone());
            fused.node_provenance.insert(entry.node, entry.organisms);
        }
        for entry in repr.edges {
            fused
                .graph
                .add_edge_with(entry.edge.clone(), entry.attributes);
            fused.edge_provenance.insert(entry.edge, entry.organisms);
        }
        Ok(fused)
    }
}
