use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::domain::{CompoundId, EcSet, GeneId, PathwayId, ReactionId};
use crate::error::KiraError;

/// A reaction node. Identity is the reaction id alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionNode {
    pub id: ReactionId,
    pub reversible: bool,
}

impl PartialEq for ReactionNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ReactionNode {}

impl Hash for ReactionNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Ord for ReactionNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl PartialOrd for ReactionNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Node {
    Compound(CompoundId),
    Reaction(ReactionNode),
    Gene(GeneId),
    EnzymeGroup(EcSet),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Compound,
    Reaction,
    Gene,
    EnzymeGroup,
}

impl Node {
    pub fn reaction(id: ReactionId, reversible: bool) -> Self {
        Node::Reaction(ReactionNode { id, reversible })
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Compound(_) => NodeKind::Compound,
            Node::Reaction(_) => NodeKind::Reaction,
            Node::Gene(_) => NodeKind::Gene,
            Node::EnzymeGroup(_) => NodeKind::EnzymeGroup,
        }
    }

    pub fn is_reversible(&self) -> bool {
        matches!(self, Node::Reaction(reaction) if reaction.reversible)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Compound(id) => write!(f, "{id}"),
            Node::Reaction(reaction) => write!(f, "{}", reaction.id),
            Node::Gene(id) => write!(f, "{id}"),
            Node::EnzymeGroup(ecs) => write!(f, "[{ecs}]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// compound to reaction
    Substrate,
    /// reaction to compound
    Product,
    /// enzyme group to reaction
    Catalyzes,
    /// gene to enzyme group
    Encodes,
}

impl RelationKind {
    pub fn endpoints(self) -> (NodeKind, NodeKind) {
        match self {
            RelationKind::Substrate => (NodeKind::Compound, NodeKind::Reaction),
            RelationKind::Product => (NodeKind::Reaction, NodeKind::Compound),
            RelationKind::Catalyzes => (NodeKind::EnzymeGroup, NodeKind::Reaction),
            RelationKind::Encodes => (NodeKind::Gene, NodeKind::EnzymeGroup),
        }
    }
}

/// A typed, directed relation. Endpoint variants always match the kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "EdgeParts")]
pub struct Edge {
    source: Node,
    target: Node,
    kind: RelationKind,
}

impl Edge {
    pub fn new(source: Node, target: Node, kind: RelationKind) -> Result<Self, KiraError> {
        if (source.kind(), target.kind()) != kind.endpoints() {
            return Err(KiraError::malformed(
                format!("{source} -> {target}"),
                format!("endpoints do not fit a {kind:?} edge"),
            ));
        }
        Ok(Self {
            source,
            target,
            kind,
        })
    }

    pub fn substrate(compound: CompoundId, reaction: ReactionNode) -> Self {
        Self {
            source: Node::Compound(compound),
            target: Node::Reaction(reaction),
            kind: RelationKind::Substrate,
        }
    }

    pub fn product(reaction: ReactionNode, compound: CompoundId) -> Self {
        Self {
            source: Node::Reaction(reaction),
            target: Node::Compound(compound),
            kind: RelationKind::Product,
        }
    }

    pub fn catalyzes(group: EcSet, reaction: ReactionNode) -> Self {
        Self {
            source: Node::EnzymeGroup(group),
            target: Node::Reaction(reaction),
            kind: RelationKind::Catalyzes,
        }
    }

    pub fn encodes(gene: GeneId, group: EcSet) -> Self {
        Self {
            source: Node::Gene(gene),
            target: Node::EnzymeGroup(group),
            kind: RelationKind::Encodes,
        }
    }

    pub fn source(&self) -> &Node {
        &self.source
    }

    pub fn target(&self) -> &Node {
        &self.target
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }
}

#[derive(Deserialize)]
struct EdgeParts {
    source: Node,
    target: Node,
    kind: RelationKind,
}

impl TryFrom<EdgeParts> for Edge {
    type Error = KiraError;

    fn try_from(parts: EdgeParts) -> Result<Self, Self::Error> {
        Edge::new(parts.source, parts.target, parts.kind)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -{:?}-> {}", self.source, self.kind, self.target)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub pathways: BTreeSet<PathwayId>,
}

impl EdgeAttributes {
    pub fn seen_in(pathway: PathwayId) -> Self {
        Self {
            weight: None,
            pathways: BTreeSet::from([pathway]),
        }
    }

    /// Unions the pathways and keeps the larger weight.
    pub fn merge(&mut self, other: &EdgeAttributes) {
        self.pathways.extend(other.pathways.iter().cloned());
        self.weight = match (self.weight, other.weight) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Directed multigraph of metabolic entities.
///
/// Construction is append-only. Nodes and edges iterate in sorted order, and
/// every edge endpoint is always part of the node set. Equality compares the
/// node and edge sets only, ignoring payloads and reversibility flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "GraphRepr", into = "GraphRepr")]
pub struct Graph {
    nodes: BTreeSet<Node>,
    edges: BTreeMap<Edge, EdgeAttributes>,
    outgoing: BTreeMap<Node, BTreeSet<Edge>>,
    incoming: BTreeMap<Node, BTreeSet<Edge>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node. A reaction already present becomes reversible if `node` is.
    pub fn add_node(&mut self, node: Node) -> bool {
        if let Node::Reaction(incoming) = &node
            && incoming.reversible
            && self.nodes.get(&node).is_some_and(|existing| !existing.is_reversible())
        {
            self.nodes.replace(node);
            return false;
        }
        self.nodes.insert(node)
    }

    /// Inserts an edge and any missing endpoint. Returns whether the edge is new.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        self.add_edge_with(edge, EdgeAttributes::default())
    }

    /// Like [`Graph::add_edge`], merging `attributes` into an existing payload.
    pub fn add_edge_with(&mut self, edge: Edge, attributes: EdgeAttributes) -> bool {
        self.add_node(edge.source.clone());
        self.add_node(edge.target.clone());
        if let Some(existing) = self.edges.get_mut(&edge) {
            existing.merge(&attributes);
            return false;
        }
        self.outgoing
            .entry(edge.source.clone())
            .or_default()
            .insert(edge.clone());
        self.incoming
            .entry(edge.target.clone())
            .or_default()
            .insert(edge.clone());
        self.edges.insert(edge, attributes);
        true
    }

    pub fn contains_node(&self, node: &Node) -> bool {
        self.nodes.contains(node)
    }

    pub fn contains_edge(&self, edge: &Edge) -> bool {
        self.edges.contains_key(edge)
    }

    /// The stored instance of `node`, carrying the merged reversibility flag.
    pub fn node(&self, node: &Node) -> Option<&Node> {
        self.nodes.get(node)
    }

    pub fn edge_attributes(&self, edge: &Edge) -> Option<&EdgeAttributes> {
        self.edges.get(edge)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.keys()
    }

    pub fn edges_with_attributes(&self) -> impl Iterator<Item = (&Edge, &EdgeAttributes)> {
        self.edges.iter()
    }

    pub fn outgoing_edges(&self, node: &Node) -> impl Iterator<Item = &Edge> {
        self.outgoing.get(node).into_iter().flatten()
    }

    pub fn incoming_edges(&self, node: &Node) -> impl Iterator<Item = &Edge> {
        self.incoming.get(node).into_iter().flatten()
    }

    /// Targets of outgoing edges, optionally restricted to one relation kind.
    pub fn neighbors(&self, node: &Node, kind: Option<RelationKind>) -> BTreeSet<Node> {
        self.outgoing_edges(node)
            .filter(|edge| kind.is_none_or(|kind| edge.kind == kind))
            .map(|edge| self.canonical(&edge.target))
            .collect()
    }

    /// Sources of incoming edges, optionally restricted to one relation kind.
    pub fn predecessors(&self, node: &Node, kind: Option<RelationKind>) -> BTreeSet<Node> {
        self.incoming_edges(node)
            .filter(|edge| kind.is_none_or(|kind| edge.kind == kind))
            .map(|edge| self.canonical(&edge.source))
            .collect()
    }

    /// Induced subgraph over the nodes matching `keep`.
    pub fn subgraph<P>(&self, keep: P) -> Graph
    where
        P: Fn(&Node) -> bool,
    {
        let mut graph = Graph::new();
        for node in self.nodes.iter().filter(|node| keep(node)) {
            graph.add_node(node.clone());
        }
        for (edge, attributes) in &self.edges {
            if graph.contains_node(&edge.source) && graph.contains_node(&edge.target) {
                graph.add_edge_with(self.canonical_edge(edge), attributes.clone());
            }
        }
        graph
    }

    pub fn nodes_of_type(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |node| node.kind() == kind)
    }

    /// Nodes reachable over at least one edge. `start` is included only when it lies on a cycle.
    pub fn reachable_from(&self, start: &Node) -> BTreeSet<Node> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start.clone()]);
        while let Some(current) = queue.pop_front() {
            for edge in self.outgoing_edges(&current) {
                if seen.insert(self.canonical(&edge.target)) {
                    queue.push_back(edge.target.clone());
                }
            }
        }
        seen
    }

    pub(crate) fn canonical(&self, node: &Node) -> Node {
        self.nodes.get(node).cloned().unwrap_or_else(|| node.clone())
    }

    pub(crate) fn canonical_edge(&self, edge: &Edge) -> Edge {
        Edge {
            source: self.canonical(&edge.source),
            target: self.canonical(&edge.target),
            kind: edge.kind,
        }
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edges.keys().eq(other.edges.keys())
    }
}

impl Eq for Graph {}

#[derive(Serialize, Deserialize)]
struct EdgeRepr {
    source: Node,
    target: Node,
    kind: RelationKind,
    #[serde(flatten)]
    attributes: EdgeAttributes,
}

#[derive(Serialize, Deserialize)]
struct GraphRepr {
    nodes: Vec<Node>,
    edges: Vec<EdgeRepr>,
}

impl From<Graph> for GraphRepr {
    fn from(graph: Graph) -> Self {
        let edges = graph
            .edges
            .iter()
            .map(|(edge, attributes)| {
                let edge = graph.canonical_edge(edge);
                EdgeRepr {
                    source: edge.source,
                    target: edge.target,
                    kind: edge.kind,
                    attributes: attributes.clone(),
                }
            })
            .collect();
        Self {
            nodes: graph.nodes.into_iter().collect(),
            edges,
        }
    }
}

impl TryFrom<GraphRepr> for Graph {
    type Error = KiraError;

    fn try_from(repr: GraphRepr) -> Result<Self, Self::Error> {
        let mut graph = Graph::new();
        for node in repr.nodes {
            graph.add_node(node);
        }
        for edge in repr.edges {
            let attributes = edge.attributes;
            graph.add_edge_with(Edge::new(edge.source, edge.target, edge.kind)?, attributes);
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compound(id: &str) -> CompoundId {
        id.parse().unwrap()
    }

    fn reaction(id: &str, reversible: bool) -> ReactionNode {
        ReactionNode {
            id: id.parse().unwrap(),
            reversible,
        }
    }

    #[test]
    fn edges_insert_their_endpoints() {
        let mut graph = Graph::new();
        graph.add_edge(Edge::substrate(compound("C00001"), reaction("R00001", false)));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn reaction_identity_ignores_reversibility() {
        let mut graph = Graph::new();
        graph.add_node(Node::Reaction(reaction("R00001", false)));
        graph.add_node(Node::Reaction(reaction("R00001", true)));
        assert_eq!(graph.node_count(), 1);
        let stored = graph.node(&Node::Reaction(reaction("R00001", false))).unwrap();
        assert!(stored.is_reversible());
    }

    #[test]
    fn equality_ignores_insertion_order_and_payload() {
        let first = Edge::substrate(compound("C00001"), reaction("R00001", false));
        let second = Edge::product(reaction("R00001", false), compound("C00002"));

        let mut a = Graph::new();
        a.add_edge(first.clone());
        a.add_edge(second.clone());

        let mut b = Graph::new();
        b.add_edge_with(second, EdgeAttributes::seen_in("00260".parse().unwrap()));
        b.add_edge(first);

        assert_eq!(a, b);
    }

    #[test]
    fn queries() {
        let r1 = reaction("R00001", false);
        let mut graph = Graph::new();
        graph.add_edge(Edge::substrate(compound("C00001"), r1.clone()));
        graph.add_edge(Edge::product(r1.clone(), compound("C00002")));
        graph.add_edge(Edge::product(r1.clone(), compound("C00003")));

        let start = Node::Compound(compound("C00001"));
        let reaction_node = Node::Reaction(r1);
        assert_eq!(
            graph.neighbors(&reaction_node, Some(RelationKind::Product)).len(),
            2
        );
        assert!(graph.neighbors(&reaction_node, Some(RelationKind::Substrate)).is_empty());
        assert_eq!(graph.predecessors(&reaction_node, None).len(), 1);
        assert_eq!(graph.reachable_from(&start).len(), 3);
        assert!(!graph.reachable_from(&start).contains(&start));
        assert_eq!(graph.nodes_of_type(NodeKind::Compound).count(), 3);

        let compounds_only = graph.subgraph(|node| node.kind() == NodeKind::Compound);
        assert_eq!(compounds_only.node_count(), 3);
        assert_eq!(compounds_only.edge_count(), 0);
    }

    #[test]
    fn mismatched_endpoints_are_rejected() {
        let result = Edge::new(
            Node::Compound(compound("C00001")),
            Node::Compound(compound("C00002")),
            RelationKind::Substrate,
        );
        assert!(result.is_err());
    }

    #[test]
    fn serializes_through_json() {
        let mut graph = Graph::new();
        graph.add_edge_with(
            Edge::substrate(compound("C00001"), reaction("R00001", true)),
            EdgeAttributes {
                weight: Some(0.5),
                pathways: BTreeSet::from(["00260".parse().unwrap()]),
            },
        );
        let json = serde_json::to_string(&graph).unwrap();
        let restored: Graph = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, graph);
        let edge = restored.edges().next().unwrap();
        assert_eq!(restored.edge_attributes(edge).unwrap().weight, Some(0.5));
    }
}
