use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{CompoundId, EcSet, GeneId, OrganismCode, PathwayId, ReactionId};
use crate::error::KiraError;
use crate::fetch::{KnowledgeFetcher, Resource};
use crate::graph::{Edge, EdgeAttributes, Graph, Node, ReactionNode};
use crate::memo::Memoizer;
use crate::records::{self, PathwayListing, PathwayRecord};
use crate::store::CacheKey;

/// Options that change the shape of an organism graph. They are part of its cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildOptions {
    #[serde(default)]
    pub pathways: Option<BTreeSet<PathwayId>>,
    #[serde(default)]
    pub include_overview_maps: bool,
    #[serde(default)]
    pub exclude_multifunctional: bool,
}

impl BuildOptions {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    fn selects(&self, listing: &PathwayListing) -> bool {
        match &self.pathways {
            Some(wanted) => wanted.contains(&listing.id),
            None => self.include_overview_maps || !listing.is_overview(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildWarning {
    pub record: String,
    pub message: String,
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.record, self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub organism: OrganismCode,
    pub pathways: Vec<PathwayId>,
    pub graph: Graph,
    pub warnings: Vec<BuildWarning>,
}

/// Translates pathway and gene records of one organism into a [`Graph`].
pub struct GraphBuilder<'a, F: KnowledgeFetcher> {
    memo: &'a Memoizer,
    fetcher: &'a F,
}

#[derive(Default)]
struct Assembly {
    graph: Graph,
    warnings: Vec<BuildWarning>,
    /// gene to the reactions it catalyses, with the pathways listing that link
    catalysis: BTreeMap<GeneId, BTreeMap<ReactionId, BTreeSet<PathwayId>>>,
}

impl Assembly {
    fn warn(&mut self, record: impl Into<String>, message: impl Into<String>) {
        let warning = BuildWarning {
            record: record.into(),
            message: message.into(),
        };
        warn!(record = %warning.record, "{}", warning.message);
        self.warnings.push(warning);
    }
}

impl<'a, F: KnowledgeFetcher> GraphBuilder<'a, F> {
    pub fn new(memo: &'a Memoizer, fetcher: &'a F) -> Self {
        Self { memo, fetcher }
    }

    /// Raw download, memoized under the namespace of the resource.
    pub fn fetch_raw(&self, resource: &Resource) -> Result<Vec<u8>, KiraError> {
        let key = CacheKey::new(resource.namespace(), resource.identifier())?;
        self.memo
            .get_or_fetch_raw(&key, || self.fetcher.fetch(resource))
    }

    pub fn pathway_list(&self, organism: &OrganismCode) -> Result<Vec<PathwayListing>, KiraError> {
        let resource = Resource::PathwayList(organism.clone());
        let raw = self.fetch_raw(&resource)?;
        records::parse_pathway_list(&raw)
    }

    pub fn build(
        &self,
        organism: &OrganismCode,
        options: &BuildOptions,
    ) -> Result<BuildOutcome, KiraError> {
        info!(%organism, "building organism graph");
        let listings = self.pathway_list(organism).map_err(|err| {
            KiraError::build_failed(
                organism.as_str(),
                Resource::PathwayList(organism.clone()).to_string(),
                err,
            )
        })?;

        let mut assembly = Assembly::default();
        let mut pathways = Vec::new();
        for listing in listings.iter().filter(|listing| options.selects(listing)) {
            let resource = Resource::Pathway(organism.clone(), listing.id.clone());
            let raw = match self.fetch_raw(&resource) {
                Ok(raw) => raw,
                Err(KiraError::FetchStatus { status: 404, .. }) => {
                    assembly.warn(resource.to_string(), "no pathway map available");
                    continue;
                }
                Err(err) => {
                    return Err(KiraError::build_failed(
                        organism.as_str(),
                        resource.to_string(),
                        err,
                    ));
                }
            };
            match records::parse_kgml(&raw) {
                Ok(record) => {
                    add_pathway(&mut assembly, organism, &listing.id, &record);
                    pathways.push(listing.id.clone());
                }
                Err(err) => assembly.warn(resource.to_string(), err.to_string()),
            }
        }

        let catalysis = std::mem::take(&mut assembly.catalysis);
        for (gene, reactions) in catalysis {
            let resource = Resource::Gene(gene.clone());
            let raw = self.fetch_raw(&resource).map_err(|err| {
                KiraError::build_failed(organism.as_str(), resource.to_string(), err)
            })?;
            match records::parse_gene(&gene.to_string(), &raw) {
                Ok(record) => {
                    let (ecs, invalid) = record.ec_numbers();
                    for raw_ec in invalid {
                        assembly.warn(resource.to_string(), format!("ignoring EC number {raw_ec}"));
                    }
                    add_gene(&mut assembly, gene, EcSet::new(ecs), reactions, options);
                }
                Err(err) => assembly.warn(resource.to_string(), err.to_string()),
            }
        }

        debug!(
            %organism,
            nodes = assembly.graph.node_count(),
            edges = assembly.graph.edge_count(),
            warnings = assembly.warnings.len(),
            "organism graph built"
        );
        Ok(BuildOutcome {
            organism: organism.clone(),
            pathways,
            graph: assembly.graph,
            warnings: assembly.warnings,
        })
    }
}

fn add_pathway(
    assembly: &mut Assembly,
    organism: &OrganismCode,
    pathway: &PathwayId,
    record: &PathwayRecord,
) {
    let origin = format!("pathway {organism}{pathway}");
    for reaction in &record.reactions {
        if reaction.ids.is_empty() {
            assembly.warn(origin.as_str(), "reaction without a reaction id");
            continue;
        }
        let substrates = compounds(assembly, &origin, &reaction.substrates);
        let products = compounds(assembly, &origin, &reaction.products);
        for raw_id in &reaction.ids {
            let id = match raw_id.parse::<ReactionId>() {
                Ok(id) => id,
                Err(err) => {
                    assembly.warn(origin.as_str(), err.to_string());
                    continue;
                }
            };
            let node = ReactionNode {
                id,
                reversible: reaction.reversible,
            };
            link_reaction(&mut assembly.graph, &node, &substrates, &products, pathway);
            if reaction.reversible {
                link_reaction(&mut assembly.graph, &node, &products, &substrates, pathway);
            }
        }
    }

    for entry in record.genes.iter().filter(|entry| entry.genes.is_empty()) {
        assembly.warn(
            origin.as_str(),
            format!("gene entry without a gene id (reactions {})", entry.reactions.join(" ")),
        );
    }

    for (raw_gene, raw_reactions) in record.gene_reactions() {
        let gene = match raw_gene.parse::<GeneId>() {
            Ok(gene) => gene,
            Err(err) => {
                assembly.warn(origin.as_str(), err.to_string());
                continue;
            }
        };
        let mut reactions = Vec::new();
        for raw_reaction in raw_reactions {
            match raw_reaction.parse::<ReactionId>() {
                Ok(reaction) => reactions.push(reaction),
                Err(err) => assembly.warn(origin.as_str(), format!("gene {gene}: {err}")),
            }
        }
        let entry = assembly.catalysis.entry(gene).or_default();
        for reaction in reactions {
            entry.entry(reaction).or_default().insert(pathway.clone());
        }
    }
}

fn compounds(assembly: &mut Assembly, origin: &str, names: &[String]) -> Vec<CompoundId> {
    let mut parsed = Vec::new();
    for name in names {
        match name.parse::<CompoundId>() {
            Ok(compound) => parsed.push(compound),
            Err(KiraError::DrugId(_)) => {}
            Err(err) => assembly.warn(origin, err.to_string()),
        }
    }
    parsed
}

fn link_reaction(
    graph: &mut Graph,
    reaction: &ReactionNode,
    inputs: &[CompoundId],
    outputs: &[CompoundId],
    pathway: &PathwayId,
) {
    graph.add_node(Node::Reaction(reaction.clone()));
    for compound in inputs {
        graph.add_edge_with(
            Edge::substrate(compound.clone(), reaction.clone()),
            EdgeAttributes::seen_in(pathway.clone()),
        );
    }
    for compound in outputs {
        graph.add_edge_with(
            Edge::product(reaction.clone(), compound.clone()),
            EdgeAttributes::seen_in(pathway.clone()),
        );
    }
}

fn add_gene(
    assembly: &mut Assembly,
    gene: GeneId,
    group: Option<EcSet>,
    reactions: BTreeMap<ReactionId, BTreeSet<PathwayId>>,
    options: &BuildOptions,
) {
    let graph = &mut assembly.graph;
    graph.add_node(Node::Gene(gene.clone()));
    let Some(group) = group else {
        return;
    };
    graph.add_edge(Edge::encodes(gene, group.clone()));
    if options.exclude_multifunctional && group.is_multifunctional() {
        return;
    }
    for (reaction, pathways) in reactions {
        let lookup = Node::reaction(reaction, false);
        let Some(Node::Reaction(node)) = graph.node(&lookup).cloned() else {
            continue;
        };
        graph.add_edge_with(
            Edge::catalyzes(group.clone(), node),
            EdgeAttributes {
                weight: None,
                pathways,
            },
        );
    }
}
