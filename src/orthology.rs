use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{EcNumber, EcSet, GeneId, OrganismCode};
use crate::error::KiraError;
use crate::graph::{Graph, Node, NodeKind, RelationKind};
use crate::similarity::SimilarPair;

/// Genes connected through similarity pairs, with the enzyme groups they encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneCluster {
    pub members: Vec<GeneId>,
    pub organisms: BTreeSet<OrganismCode>,
    pub groups: BTreeMap<GeneId, EcSet>,
}

impl GeneCluster {
    /// Some organism contributes more than one member.
    pub fn is_paralogous(&self) -> bool {
        self.members.len() > self.organisms.len()
    }

    pub fn is_orthologous(&self) -> bool {
        self.organisms.len() > 1
    }

    /// Members encode more than one distinct enzyme group.
    pub fn is_neofunctionalization_candidate(&self) -> bool {
        self.groups.values().collect::<BTreeSet<_>>().len() > 1
    }
}

/// Enzyme group encoded by each gene of `graph`. Genes without one are absent.
pub fn gene_groups(graph: &Graph) -> BTreeMap<GeneId, EcSet> {
    graph
        .nodes_of_type(NodeKind::Gene)
        .filter_map(|node| {
            let Node::Gene(gene) = node else {
                return None;
            };
            let group = graph
                .neighbors(node, Some(RelationKind::Encodes))
                .into_iter()
                .find_map(|target| match target {
                    Node::EnzymeGroup(group) => Some(group),
                    _ => None,
                })?;
            Some((gene.clone(), group))
        })
        .collect()
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut item: usize) -> usize {
        while self.parent[item] != item {
            self.parent[item] = self.parent[self.parent[item]];
            item = self.parent[item];
        }
        item
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        match self.rank[a].cmp(&self.rank[b]) {
            std::cmp::Ordering::Less => self.parent[a] = b,
            std::cmp::Ordering::Greater => self.parent[b] = a,
            std::cmp::Ordering::Equal => {
                self.parent[b] = a;
                self.rank[a] += 1;
            }
        }
    }
}

/// Similarity scores are alignment scores, so any finite non-negative cutoff is valid.
pub fn check_cutoff(cutoff: f64) -> Result<f64, KiraError> {
    if cutoff.is_finite() && cutoff >= 0.0 {
        Ok(cutoff)
    } else {
        Err(KiraError::InvalidCutoff(cutoff))
    }
}

/// Clusters the genes of `graph` that encode an enzyme group.
///
/// Pairs with `score >= cutoff` link their genes; pairs naming a gene
/// without an enzyme group are ignored. Unlinked genes form singleton
/// clusters. Clusters come sorted by their smallest member.
pub fn cluster_genes(graph: &Graph, pairs: &[SimilarPair], cutoff: f64) -> Vec<GeneCluster> {
    let groups = gene_groups(graph);
    let genes = groups.keys().cloned().collect::<Vec<_>>();
    let index = genes
        .iter()
        .enumerate()
        .map(|(position, gene)| (gene, position))
        .collect::<BTreeMap<_, _>>();

    let mut sets = DisjointSet::new(genes.len());
    for pair in pairs.iter().filter(|pair| pair.score >= cutoff) {
        if let (Some(&a), Some(&b)) = (index.get(&pair.a), index.get(&pair.b)) {
            sets.union(a, b);
        }
    }

    let mut by_root: BTreeMap<usize, Vec<GeneId>> = BTreeMap::new();
    for (position, gene) in genes.iter().enumerate() {
        by_root
            .entry(sets.find(position))
            .or_default()
            .push(gene.clone());
    }

    let mut clusters = by_root
        .into_values()
        .map(|mut members| {
            members.sort();
            GeneCluster {
                organisms: members.iter().map(|gene| gene.organism().clone()).collect(),
                groups: members
                    .iter()
                    .filter_map(|gene| groups.get(gene).map(|group| (gene.clone(), group.clone())))
                    .collect(),
                members,
            }
        })
        .collect::<Vec<_>>();
    clusters.sort_by(|a, b| a.members.cmp(&b.members));
    debug!(genes = genes.len(), clusters = clusters.len(), "genes clustered");
    clusters
}

pub fn neofunctionalization_candidates(clusters: &[GeneCluster]) -> Vec<&GeneCluster> {
    clusters
        .iter()
        .filter(|cluster| cluster.is_neofunctionalization_candidate())
        .collect()
}

/// Which similar genes count as evidence of a duplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "model", content = "organisms")]
pub enum DuplicationModel {
    /// A similar gene of the same organism.
    Simple,
    /// A similar gene of any other organism of the cluster.
    SameGroup,
    /// A paralog, plus a similar gene in one of the given organisms.
    Chevron(BTreeSet<OrganismCode>),
}

/// A gene with the similar genes that make it a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeneDuplication {
    pub gene: GeneId,
    pub ecs: EcSet,
    pub paralogs: Vec<GeneId>,
    /// members of the reference organisms; only filled for [`DuplicationModel::Chevron`]
    pub orthologs: Vec<GeneId>,
}

/// Duplicated genes of `clusters` under `model`, sorted by gene.
///
/// Homology is read off the clusters, so a gene's paralogs are the cluster
/// members of its own organism.
pub fn gene_duplications(clusters: &[GeneCluster], model: &DuplicationModel) -> Vec<GeneDuplication> {
    let mut duplications = Vec::new();
    for cluster in clusters.iter().filter(|cluster| cluster.members.len() > 1) {
        for (gene, ecs) in &cluster.groups {
            let others = cluster.members.iter().filter(|member| *member != gene);
            let paralogs = others
                .clone()
                .filter(|member| member.organism() == gene.organism())
                .cloned()
                .collect::<Vec<_>>();
            let orthologs = match model {
                DuplicationModel::Chevron(reference) => others
                    .clone()
                    .filter(|member| {
                        member.organism() != gene.organism() && reference.contains(member.organism())
                    })
                    .cloned()
                    .collect::<Vec<_>>(),
                _ => Vec::new(),
            };
            let duplicated = match model {
                DuplicationModel::Simple => !paralogs.is_empty(),
                DuplicationModel::SameGroup => others.clone().next().is_some(),
                DuplicationModel::Chevron(_) => !paralogs.is_empty() && !orthologs.is_empty(),
            };
            if duplicated {
                duplications.push(GeneDuplication {
                    gene: gene.clone(),
                    ecs: ecs.clone(),
                    paralogs,
                    orthologs,
                });
            }
        }
    }
    duplications.sort();
    duplications
}

/// Enzyme groups encoded by at least one duplicated gene.
pub fn duplicated_groups(duplications: &[GeneDuplication]) -> BTreeSet<EcSet> {
    duplications.iter().map(|dup| dup.ecs.clone()).collect()
}

/// Two similar genes whose enzyme groups differ. The smaller group comes first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Neofunctionalization {
    pub gene_a: GeneId,
    pub ecs_a: EcSet,
    pub gene_b: GeneId,
    pub ecs_b: EcSet,
}

impl Neofunctionalization {
    /// `None` when both genes encode the same group.
    pub fn new(gene_a: GeneId, ecs_a: EcSet, gene_b: GeneId, ecs_b: EcSet) -> Option<Self> {
        if ecs_a == ecs_b {
            return None;
        }
        let (first, second) = if (&ecs_a, &gene_a) <= (&ecs_b, &gene_b) {
            ((gene_a, ecs_a), (gene_b, ecs_b))
        } else {
            ((gene_b, ecs_b), (gene_a, ecs_a))
        };
        Some(Self {
            gene_a: first.0,
            ecs_a: first.1,
            gene_b: second.0,
            ecs_b: second.1,
        })
    }

    /// Largest number of trailing EC levels that differ between any two numbers
    /// of the pair. Wildcards do not match numbers.
    pub fn differing_ec_levels(&self) -> usize {
        self.ecs_a
            .iter()
            .flat_map(|a| self.ecs_b.iter().map(move |b| 4 - a.matching_levels(b, false)))
            .max()
            .unwrap_or(0)
    }

    /// The groups differ on the substrate level at most.
    pub fn is_same_ec_reaction(&self) -> bool {
        self.differing_ec_levels() <= 1
    }

    pub fn organisms(&self) -> BTreeSet<&OrganismCode> {
        BTreeSet::from([self.gene_a.organism(), self.gene_b.organism()])
    }

    fn sort_key(&self) -> (&EcSet, &EcSet, &OrganismCode, &OrganismCode, &GeneId, &GeneId) {
        (
            &self.ecs_a,
            &self.ecs_b,
            self.gene_a.organism(),
            self.gene_b.organism(),
            &self.gene_a,
            &self.gene_b,
        )
    }
}

impl Ord for Neofunctionalization {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Neofunctionalization {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Neofunctionalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({} [{}], {} [{}])",
            self.gene_a, self.ecs_a, self.gene_b, self.ecs_b
        )
    }
}

/// Restricts reported neofunctionalizations.
///
/// `min_ec_difference` drops events whose EC numbers differ in fewer trailing
/// levels; `1.2.3.4/1.2.3.5` differ in one, `1.2.3.4/1.2.5.6` in two.
/// `min_organisms` drops EC changes (or EC numbers) whose events involve
/// fewer distinct organisms. Zero disables either filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeofunctionalizationFilter {
    #[serde(default)]
    pub min_ec_difference: usize,
    #[serde(default)]
    pub min_organisms: usize,
}

impl NeofunctionalizationFilter {
    pub fn keeps(&self, event: &Neofunctionalization) -> bool {
        event.differing_ec_levels() >= self.min_ec_difference
    }

    fn enough_organisms<'a>(&self, events: impl IntoIterator<Item = &'a Neofunctionalization>) -> bool {
        let organisms = events
            .into_iter()
            .flat_map(Neofunctionalization::organisms)
            .collect::<BTreeSet<_>>();
        organisms.len() >= self.min_organisms
    }
}

/// Every differing member pair of every candidate cluster that passes the EC
/// difference filter, sorted by EC numbers, then organism, then gene.
pub fn neofunctionalizations(
    clusters: &[GeneCluster],
    filter: &NeofunctionalizationFilter,
) -> Vec<Neofunctionalization> {
    let mut events = BTreeSet::new();
    for cluster in neofunctionalization_candidates(clusters) {
        let members = cluster.groups.iter().collect::<Vec<_>>();
        for (offset, (gene_a, ecs_a)) in members.iter().enumerate() {
            for (gene_b, ecs_b) in &members[offset + 1..] {
                if let Some(event) = Neofunctionalization::new(
                    (*gene_a).clone(),
                    (*ecs_a).clone(),
                    (*gene_b).clone(),
                    (*ecs_b).clone(),
                ) && filter.keeps(&event)
                {
                    events.insert(event);
                }
            }
        }
    }
    events.into_iter().collect()
}

/// A pair of single EC numbers changed by at least one neofunctionalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EcChange {
    pub a: EcNumber,
    pub b: EcNumber,
}

impl EcChange {
    pub fn differing_ec_levels(&self) -> usize {
        4 - self.a.matching_levels(&self.b, false)
    }

    /// Every pair of differing numbers across the two groups of `event`.
    pub fn of(event: &Neofunctionalization) -> BTreeSet<EcChange> {
        event
            .ecs_a
            .iter()
            .flat_map(|a| {
                event
                    .ecs_b
                    .iter()
                    .filter(move |b| *b != a)
                    .map(move |b| EcChange {
                        a: (*a).min(*b),
                        b: (*a).max(*b),
                    })
            })
            .collect()
    }
}

/// Events behind each EC change, in natural EC order.
pub fn function_changes(
    events: &[Neofunctionalization],
    filter: &NeofunctionalizationFilter,
) -> BTreeMap<EcChange, Vec<Neofunctionalization>> {
    let mut grouped: BTreeMap<EcChange, BTreeSet<&Neofunctionalization>> = BTreeMap::new();
    for event in events.iter().filter(|event| filter.keeps(event)) {
        for change in EcChange::of(event) {
            grouped.entry(change).or_default().insert(event);
        }
    }
    grouped
        .into_iter()
        .filter(|(_, events)| filter.enough_organisms(events.iter().copied()))
        .map(|(change, events)| (change, events.into_iter().cloned().collect()))
        .collect()
}

/// The EC number pairs behind `events`, in natural EC order.
pub fn ec_changes(
    events: &[Neofunctionalization],
    filter: &NeofunctionalizationFilter,
) -> BTreeSet<EcChange> {
    function_changes(events, filter).into_keys().collect()
}

/// Events grouped by every EC number of their EC changes, in natural EC order.
pub fn neofunctionalized_ecs(
    events: &[Neofunctionalization],
    filter: &NeofunctionalizationFilter,
) -> BTreeMap<EcNumber, Vec<Neofunctionalization>> {
    let mut grouped: BTreeMap<EcNumber, BTreeSet<&Neofunctionalization>> = BTreeMap::new();
    for event in events.iter().filter(|event| filter.keeps(event)) {
        for change in EcChange::of(event) {
            for ec in [change.a, change.b] {
                grouped.entry(ec).or_default().insert(event);
            }
        }
    }
    grouped
        .into_iter()
        .filter(|(_, events)| filter.enough_organisms(events.iter().copied()))
        .map(|(ec, events)| (ec, events.into_iter().cloned().collect()))
        .collect()
}
