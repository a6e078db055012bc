//! Topological redundancy of metabolic graphs.
//!
//! A graph is projected onto compound to compound edges, each keyed by the
//! enzyme group catalysing the underlying reaction. Removing every edge of a
//! key simulates losing that enzyme group; the remaining graph decides whether
//! the removed conversions survive.
//!
//! - *Robustness*: a directed path from the source to the target of the removed
//!   edge remains.
//! - *Target flexibility*: the target is still produced by some other edge.
//! - *Source flexibility*: the source is still consumed by some other edge.
//! - *Flexibility*: both of the above.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{CompoundId, EcSet};
use crate::error::KiraError;
use crate::graph::{Graph, Node, NodeKind, RelationKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyedEdge {
    pub source: CompoundId,
    pub target: CompoundId,
    pub key: EcSet,
}

/// Compound to compound conversions of `graph`, keyed by catalysing enzyme group.
///
/// Reactions without a catalysing group and self-conversions are left out.
pub fn project(graph: &Graph) -> BTreeSet<KeyedEdge> {
    let mut edges = BTreeSet::new();
    for reaction in graph.nodes_of_type(NodeKind::Reaction) {
        let keys = graph
            .predecessors(reaction, Some(RelationKind::Catalyzes))
            .into_iter()
            .filter_map(|node| match node {
                Node::EnzymeGroup(group) => Some(group),
                _ => None,
            })
            .collect::<Vec<_>>();
        if keys.is_empty() {
            continue;
        }
        let substrates = compounds(graph.predecessors(reaction, Some(RelationKind::Substrate)));
        let products = compounds(graph.neighbors(reaction, Some(RelationKind::Product)));
        for source in &substrates {
            for target in products.iter().filter(|target| *target != source) {
                for key in &keys {
                    edges.insert(KeyedEdge {
                        source: source.clone(),
                        target: target.clone(),
                        key: key.clone(),
                    });
                }
            }
        }
    }
    edges
}

fn compounds(nodes: BTreeSet<Node>) -> Vec<CompoundId> {
    nodes
        .into_iter()
        .filter_map(|node| match node {
            Node::Compound(compound) => Some(compound),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    Robustness,
    Flexibility,
    TargetFlexibility,
    SourceFlexibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// every edge of the key is redundant
    Full,
    /// some but not all edges of the key are redundant
    Partial,
    /// full or partial
    Both,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum RedundancyType {
    #[default]
    Robustness,
    RobustnessPartial,
    RobustnessBoth,
    Flexibility,
    FlexibilityPartial,
    FlexibilityBoth,
    TargetFlexibility,
    TargetFlexibilityPartial,
    TargetFlexibilityBoth,
    SourceFlexibility,
    SourceFlexibilityPartial,
    SourceFlexibilityBoth,
}

impl RedundancyType {
    pub const ALL: [RedundancyType; 12] = [
        RedundancyType::Robustness,
        RedundancyType::RobustnessPartial,
        RedundancyType::RobustnessBoth,
        RedundancyType::Flexibility,
        RedundancyType::FlexibilityPartial,
        RedundancyType::FlexibilityBoth,
        RedundancyType::TargetFlexibility,
        RedundancyType::TargetFlexibilityPartial,
        RedundancyType::TargetFlexibilityBoth,
        RedundancyType::SourceFlexibility,
        RedundancyType::SourceFlexibilityPartial,
        RedundancyType::SourceFlexibilityBoth,
    ];

    pub fn measure(self) -> Measure {
        match self {
            RedundancyType::Robustness
            | RedundancyType::RobustnessPartial
            | RedundancyType::RobustnessBoth => Measure::Robustness,
            RedundancyType::Flexibility
            | RedundancyType::FlexibilityPartial
            | RedundancyType::FlexibilityBoth => Measure::Flexibility,
            RedundancyType::TargetFlexibility
            | RedundancyType::TargetFlexibilityPartial
            | RedundancyType::TargetFlexibilityBoth => Measure::TargetFlexibility,
            RedundancyType::SourceFlexibility
            | RedundancyType::SourceFlexibilityPartial
            | RedundancyType::SourceFlexibilityBoth => Measure::SourceFlexibility,
        }
    }

    pub fn scope(self) -> Scope {
        match self {
            RedundancyType::Robustness
            | RedundancyType::Flexibility
            | RedundancyType::TargetFlexibility
            | RedundancyType::SourceFlexibility => Scope::Full,
            RedundancyType::RobustnessPartial
            | RedundancyType::FlexibilityPartial
            | RedundancyType::TargetFlexibilityPartial
            | RedundancyType::SourceFlexibilityPartial => Scope::Partial,
            RedundancyType::RobustnessBoth
            | RedundancyType::FlexibilityBoth
            | RedundancyType::TargetFlexibilityBoth
            | RedundancyType::SourceFlexibilityBoth => Scope::Both,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RedundancyType::Robustness => "robustness",
            RedundancyType::RobustnessPartial => "robustness-partial",
            RedundancyType::RobustnessBoth => "robustness-both",
            RedundancyType::Flexibility => "flexibility",
            RedundancyType::FlexibilityPartial => "flexibility-partial",
            RedundancyType::FlexibilityBoth => "flexibility-both",
            RedundancyType::TargetFlexibility => "target-flexibility",
            RedundancyType::TargetFlexibilityPartial => "target-flexibility-partial",
            RedundancyType::TargetFlexibilityBoth => "target-flexibility-both",
            RedundancyType::SourceFlexibility => "source-flexibility",
            RedundancyType::SourceFlexibilityPartial => "source-flexibility-partial",
            RedundancyType::SourceFlexibilityBoth => "source-flexibility-both",
        }
    }
}

impl fmt::Display for RedundancyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RedundancyType {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        RedundancyType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| KiraError::malformed("redundancy type", value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
struct KeyTally {
    edges: usize,
    robust: usize,
    flexible: usize,
    target_flexible: usize,
    source_flexible: usize,
}

impl KeyTally {
    fn redundant(&self, measure: Measure) -> usize {
        match measure {
            Measure::Robustness => self.robust,
            Measure::Flexibility => self.flexible,
            Measure::TargetFlexibility => self.target_flexible,
            Measure::SourceFlexibility => self.source_flexible,
        }
    }

    fn matches(&self, kind: RedundancyType) -> bool {
        let redundant = self.redundant(kind.measure());
        match kind.scope() {
            Scope::Full => redundant == self.edges,
            Scope::Partial => redundant > 0 && redundant < self.edges,
            Scope::Both => redundant > 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RedundancyScore {
    pub kind: RedundancyType,
    pub ratio: f64,
    pub keys: usize,
}

/// Redundancy verdicts for every key of a graph.
#[derive(Debug, Clone)]
pub struct Redundancy {
    tallies: BTreeMap<EcSet, KeyTally>,
    edge_count: usize,
}

impl Redundancy {
    pub fn new(graph: &Graph) -> Self {
        Self::from_edges(&project(graph))
    }

    pub fn from_edges(edges: &BTreeSet<KeyedEdge>) -> Self {
        let mut outgoing: BTreeMap<&CompoundId, Vec<&KeyedEdge>> = BTreeMap::new();
        let mut incoming: BTreeMap<&CompoundId, Vec<&KeyedEdge>> = BTreeMap::new();
        let mut by_key: BTreeMap<&EcSet, Vec<&KeyedEdge>> = BTreeMap::new();
        for edge in edges {
            outgoing.entry(&edge.source).or_default().push(edge);
            incoming.entry(&edge.target).or_default().push(edge);
            by_key.entry(&edge.key).or_default().push(edge);
        }

        let mut tallies = BTreeMap::new();
        for (key, key_edges) in by_key {
            let mut tally = KeyTally {
                edges: key_edges.len(),
                ..KeyTally::default()
            };
            let mut reachable_cache: BTreeMap<&CompoundId, BTreeSet<&CompoundId>> = BTreeMap::new();
            for edge in key_edges {
                let survives = |index: &BTreeMap<&CompoundId, Vec<&KeyedEdge>>,
                                compound: &CompoundId| {
                    index
                        .get(compound)
                        .is_some_and(|edges| edges.iter().any(|other| &other.key != key))
                };
                let source_flexible = survives(&outgoing, &edge.source);
                let target_flexible = survives(&incoming, &edge.target);
                let reachable = reachable_cache
                    .entry(&edge.source)
                    .or_insert_with(|| reachable_without(&outgoing, &edge.source, key));
                if reachable.contains(&edge.target) {
                    tally.robust += 1;
                }
                if source_flexible {
                    tally.source_flexible += 1;
                }
                if target_flexible {
                    tally.target_flexible += 1;
                }
                if source_flexible && target_flexible {
                    tally.flexible += 1;
                }
            }
            tallies.insert(key.clone(), tally);
        }
        debug!(keys = tallies.len(), edges = edges.len(), "redundancy computed");
        Self {
            tallies,
            edge_count: edges.len(),
        }
    }

    pub fn key_count(&self) -> usize {
        self.tallies.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn keys(&self) -> impl Iterator<Item = &EcSet> {
        self.tallies.keys()
    }

    pub fn redundant_keys(&self, kind: RedundancyType) -> BTreeSet<EcSet> {
        self.tallies
            .iter()
            .filter(|(_, tally)| tally.matches(kind))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Share of keys with redundancy of `kind`. A graph without keys scores 0.
    pub fn ratio(&self, kind: RedundancyType) -> f64 {
        if self.tallies.is_empty() {
            return 0.0;
        }
        let matching = self.tallies.values().filter(|tally| tally.matches(kind)).count();
        matching as f64 / self.tallies.len() as f64
    }

    pub fn scores(&self) -> Vec<RedundancyScore> {
        RedundancyType::ALL
            .into_iter()
            .map(|kind| RedundancyScore {
                kind,
                ratio: self.ratio(kind),
                keys: self.redundant_keys(kind).len(),
            })
            .collect()
    }
}

fn reachable_without<'a>(
    outgoing: &BTreeMap<&'a CompoundId, Vec<&'a KeyedEdge>>,
    start: &'a CompoundId,
    removed: &EcSet,
) -> BTreeSet<&'a CompoundId> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        for edge in outgoing.get(current).into_iter().flatten() {
            if &edge.key != removed && seen.insert(&edge.target) {
                queue.push_back(&edge.target);
            }
        }
    }
    seen
}

/// Redundancy change from graph A to graph B, over the keys both graphs share.
#[derive(Debug, Clone, Serialize)]
pub struct RedundancyComparison {
    pub kind: RedundancyType,
    pub shared_keys: usize,
    pub lost: BTreeSet<EcSet>,
    pub conserved: BTreeSet<EcSet>,
    pub added: BTreeSet<EcSet>,
}

impl RedundancyComparison {
    pub fn new(a: &Redundancy, b: &Redundancy, kind: RedundancyType) -> Self {
        let shared = a
            .keys()
            .filter(|key| b.tallies.contains_key(*key))
            .collect::<BTreeSet<_>>();
        let redundant_a = a.redundant_keys(kind);
        let redundant_b = b.redundant_keys(kind);
        let pick = |keep: &dyn Fn(bool, bool) -> bool| {
            shared
                .iter()
                .filter(|key| keep(redundant_a.contains(**key), redundant_b.contains(**key)))
                .map(|key| (*key).clone())
                .collect::<BTreeSet<_>>()
        };
        Self {
            kind,
            shared_keys: shared.len(),
            lost: pick(&|in_a, in_b| in_a && !in_b),
            conserved: pick(&|in_a, in_b| in_a && in_b),
            added: pick(&|in_a, in_b| !in_a && in_b),
        }
    }

    fn share(&self, keys: &BTreeSet<EcSet>) -> f64 {
        if self.shared_keys == 0 {
            0.0
        } else {
            keys.len() as f64 / self.shared_keys as f64
        }
    }

    pub fn lost_ratio(&self) -> f64 {
        self.share(&self.lost)
    }

    pub fn conserved_ratio(&self) -> f64 {
        self.share(&self.conserved)
    }

    pub fn added_ratio(&self) -> f64 {
        self.share(&self.added)
    }
}
