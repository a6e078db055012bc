use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::algebra::{self, CladeComparison, FusedGraph, Overlap};
use crate::builder::{BuildOutcome, BuildWarning, GraphBuilder};
use crate::config::AnalysisOptions;
use crate::domain::{EcNumber, OrganismCode, OrganismGroup};
use crate::error::KiraError;
use crate::fetch::{KnowledgeFetcher, Resource};
use crate::graph::{Graph, NodeKind};
use crate::memo::Memoizer;
use crate::orthology::{
    self, DuplicationModel, EcChange, GeneCluster, GeneDuplication, Neofunctionalization,
    NeofunctionalizationFilter,
};
use crate::records::{self, OrganismListing};
use crate::redundancy::{Redundancy, RedundancyScore};
use crate::similarity::SimilaritySource;
use crate::store::{CacheKey, EntryFormat};
use crate::taxonomy::{ChainedTaxonomy, LineageTaxonomy, StaticTaxonomy, TaxonomySource};

pub const ORGANISM_GRAPH_NAMESPACE: &str = "organism-graph";
pub const FUSED_GRAPH_NAMESPACE: &str = "fused-graph";

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
    pub compounds: usize,
    pub reactions: usize,
    pub genes: usize,
    pub enzyme_groups: usize,
}

impl GraphSummary {
    pub fn of(graph: &Graph) -> Self {
        Self {
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            compounds: graph.nodes_of_type(NodeKind::Compound).count(),
            reactions: graph.nodes_of_type(NodeKind::Reaction).count(),
            genes: graph.nodes_of_type(NodeKind::Gene).count(),
            enzyme_groups: graph.nodes_of_type(NodeKind::EnzymeGroup).count(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub organism: OrganismCode,
    pub pathways: usize,
    pub graph: GraphSummary,
    pub warnings: Vec<BuildWarning>,
}

impl From<&BuildOutcome> for BuildSummary {
    fn from(outcome: &BuildOutcome) -> Self {
        Self {
            organism: outcome.organism.clone(),
            pathways: outcome.pathways.len(),
            graph: GraphSummary::of(&outcome.graph),
            warnings: outcome.warnings.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FusionSummary {
    pub group: String,
    pub organisms: Vec<OrganismCode>,
    pub graph: GraphSummary,
    /// nodes contributed by every member
    pub ubiquitous_nodes: usize,
    pub ubiquitous_edges: usize,
}

impl FusionSummary {
    pub fn new(group: &str, fused: &FusedGraph) -> Result<Self, KiraError> {
        let ubiquitous = algebra::core(fused, 1.0)?;
        Ok(Self {
            group: group.to_string(),
            organisms: fused.organisms().iter().cloned().collect(),
            graph: GraphSummary::of(fused.graph()),
            ubiquitous_nodes: ubiquitous.graph().node_count(),
            ubiquitous_edges: ubiquitous.graph().edge_count(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoreSummary {
    pub group: String,
    pub threshold: f64,
    pub organisms: Vec<OrganismCode>,
    pub graph: GraphSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct CladeSummary {
    pub parent: String,
    pub child: String,
    pub conserved: GraphSummary,
    pub added: GraphSummary,
    pub lost: GraphSummary,
    pub diverged: GraphSummary,
    pub unified: GraphSummary,
    pub overlap: Overlap,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedundancyReport {
    pub group: String,
    pub keys: usize,
    pub edges: usize,
    pub scores: Vec<RedundancyScore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeofunctionalizationReport {
    pub group: String,
    pub cutoff: f64,
    pub filter: NeofunctionalizationFilter,
    pub clusters: usize,
    pub candidate_clusters: usize,
    pub events: Vec<Neofunctionalization>,
    pub ec_changes: Vec<EcChange>,
    pub neofunctionalized_ecs: Vec<EcNumber>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneDuplicationReport {
    pub group: String,
    pub cutoff: f64,
    pub model: DuplicationModel,
    /// distinct enzyme groups with a duplicated gene
    pub duplicated_groups: usize,
    pub duplications: Vec<GeneDuplication>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheListEntry {
    pub file_name: String,
    pub identifier: Option<String>,
    pub format: Option<EntryFormat>,
    pub created_at: Option<String>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheListResult {
    pub namespace: String,
    pub entries: Vec<CacheListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheDeleteResult {
    pub key: String,
    pub deleted: bool,
}

/// Memoized graph derivation for organisms and organism groups.
pub struct App<F: KnowledgeFetcher> {
    memo: Memoizer,
    fetcher: F,
    analysis: AnalysisOptions,
}

impl<F: KnowledgeFetcher> App<F> {
    pub fn new(memo: Memoizer, fetcher: F, analysis: AnalysisOptions) -> Self {
        Self {
            memo,
            fetcher,
            analysis,
        }
    }

    pub fn memo(&self) -> &Memoizer {
        &self.memo
    }

    pub fn analysis(&self) -> &AnalysisOptions {
        &self.analysis
    }

    fn builder(&self) -> GraphBuilder<'_, F> {
        GraphBuilder::new(&self.memo, &self.fetcher)
    }

    pub fn organism_list(&self) -> Result<Vec<OrganismListing>, KiraError> {
        let raw = self.builder().fetch_raw(&Resource::OrganismList)?;
        Ok(records::parse_organism_list(&raw))
    }

    /// Looks `name` up in the configured groups, then in the KEGG lineage table.
    pub fn resolve_group(
        &self,
        name: &str,
        configured: &StaticTaxonomy,
    ) -> Result<OrganismGroup, KiraError> {
        let lineage = KeggLineage { app: self };
        let sources: Vec<&dyn TaxonomySource> = vec![configured, &lineage];
        ChainedTaxonomy::new(sources).group(name)
    }

    pub fn organism_graph_key(&self, organism: &OrganismCode) -> Result<CacheKey, KiraError> {
        let options = &self.analysis.build;
        if options.is_default() {
            CacheKey::new(ORGANISM_GRAPH_NAMESPACE, organism.as_str())
        } else {
            CacheKey::for_args(ORGANISM_GRAPH_NAMESPACE, organism.as_str(), options)
        }
    }

    pub fn organism_graph(
        &self,
        organism: &OrganismCode,
        sink: &dyn ProgressSink,
    ) -> Result<BuildOutcome, KiraError> {
        let key = self.organism_graph_key(organism)?;
        let start = Instant::now();
        let outcome = self.memo.get_or_compute(&key, || {
            sink.event(ProgressEvent {
                message: format!("phase=Build; organism {organism}"),
                elapsed: None,
            });
            self.builder().build(organism, &self.analysis.build)
        })?;
        sink.event(ProgressEvent {
            message: format!("phase=Ready; organism {organism}"),
            elapsed: Some(start.elapsed()),
        });
        Ok(outcome)
    }

    pub fn group_graphs(
        &self,
        group: &OrganismGroup,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<BuildOutcome>, KiraError> {
        group
            .organisms()
            .iter()
            .map(|organism| self.organism_graph(organism, sink))
            .collect()
    }

    pub fn fused_graph_key(&self, group: &OrganismGroup) -> Result<CacheKey, KiraError> {
        CacheKey::for_args(
            FUSED_GRAPH_NAMESPACE,
            &group.name,
            &(group.organisms(), &self.analysis.build),
        )
    }

    /// Union of the member graphs. Members are absorbed one at a time, so at
    /// most one organism graph is held besides the accumulator.
    pub fn fuse_group(
        &self,
        group: &OrganismGroup,
        sink: &dyn ProgressSink,
    ) -> Result<FusedGraph, KiraError> {
        let key = self.fused_graph_key(group)?;
        self.memo.get_or_compute(&key, || {
            info!(group = %group.name, organisms = group.len(), "fusing group");
            let mut fused = FusedGraph::new();
            for organism in group.organisms() {
                let outcome = self
                    .organism_graph(organism, sink)
                    .map_err(|err| KiraError::fusion_failed(organism.as_str(), err))?;
                fused.absorb(organism, &outcome.graph);
            }
            sink.event(ProgressEvent {
                message: format!("phase=Fuse; group {}", group.name),
                elapsed: None,
            });
            Ok(fused)
        })
    }

    /// `threshold` falls back to the configured core threshold.
    pub fn core_metabolism(
        &self,
        group: &OrganismGroup,
        threshold: Option<f64>,
        sink: &dyn ProgressSink,
    ) -> Result<FusedGraph, KiraError> {
        let threshold = threshold.unwrap_or(self.analysis.core_threshold);
        let fused = self.fuse_group(group, sink)?;
        algebra::core(&fused, threshold)
    }

    pub fn core_summary(
        &self,
        group: &OrganismGroup,
        threshold: Option<f64>,
        sink: &dyn ProgressSink,
    ) -> Result<CoreSummary, KiraError> {
        let core = self.core_metabolism(group, threshold, sink)?;
        Ok(CoreSummary {
            group: group.name.clone(),
            threshold: threshold.unwrap_or(self.analysis.core_threshold),
            organisms: core.organisms().iter().cloned().collect(),
            graph: GraphSummary::of(core.graph()),
        })
    }

    /// Compares the core metabolism of two groups.
    pub fn compare_clades(
        &self,
        parent: &OrganismGroup,
        child: &OrganismGroup,
        sink: &dyn ProgressSink,
    ) -> Result<CladeComparison, KiraError> {
        let parent_core = self.core_metabolism(parent, None, sink)?;
        let child_core = self.core_metabolism(child, None, sink)?;
        Ok(CladeComparison::new(
            parent_core.graph(),
            child_core.graph(),
        ))
    }

    pub fn clade_summary(
        &self,
        parent: &OrganismGroup,
        child: &OrganismGroup,
        sink: &dyn ProgressSink,
    ) -> Result<CladeSummary, KiraError> {
        let comparison = self.compare_clades(parent, child, sink)?;
        Ok(CladeSummary {
            parent: parent.name.clone(),
            child: child.name.clone(),
            conserved: GraphSummary::of(&comparison.conserved),
            added: GraphSummary::of(&comparison.added),
            lost: GraphSummary::of(&comparison.lost),
            diverged: GraphSummary::of(&comparison.diverged),
            unified: GraphSummary::of(&comparison.unified),
            overlap: comparison.overlap,
        })
    }

    /// Redundancy of the group's core metabolism.
    pub fn redundancy(
        &self,
        group: &OrganismGroup,
        sink: &dyn ProgressSink,
    ) -> Result<RedundancyReport, KiraError> {
        let core = self.core_metabolism(group, None, sink)?;
        let redundancy = Redundancy::new(core.graph());
        Ok(RedundancyReport {
            group: group.name.clone(),
            keys: redundancy.key_count(),
            edges: redundancy.edge_count(),
            scores: redundancy.scores(),
        })
    }

    /// Similarity clusters over the genes of the fused graph of `group`.
    fn gene_clusters(
        &self,
        group: &OrganismGroup,
        similarity: &dyn SimilaritySource,
        cutoff: f64,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<GeneCluster>, KiraError> {
        let fused = self.fuse_group(group, sink)?;
        let pairs = similarity.similar_pairs(group.organisms())?;
        Ok(orthology::cluster_genes(fused.graph(), &pairs, cutoff))
    }

    /// Gene pairs of the group whose similarity links genes of different enzyme groups.
    ///
    /// Genes are organism specific, so clustering runs on the fused graph rather than its core.
    pub fn neofunctionalizations(
        &self,
        group: &OrganismGroup,
        similarity: &dyn SimilaritySource,
        cutoff: Option<f64>,
        filter: &NeofunctionalizationFilter,
        sink: &dyn ProgressSink,
    ) -> Result<NeofunctionalizationReport, KiraError> {
        let cutoff = orthology::check_cutoff(cutoff.unwrap_or(self.analysis.similarity_cutoff))?;
        let clusters = self.gene_clusters(group, similarity, cutoff, sink)?;
        let events = orthology::neofunctionalizations(&clusters, filter);
        Ok(NeofunctionalizationReport {
            group: group.name.clone(),
            cutoff,
            filter: *filter,
            clusters: clusters.len(),
            candidate_clusters: orthology::neofunctionalization_candidates(&clusters).len(),
            ec_changes: orthology::ec_changes(&events, filter).into_iter().collect(),
            neofunctionalized_ecs: orthology::neofunctionalized_ecs(&events, filter)
                .into_keys()
                .collect(),
            events,
        })
    }

    /// Duplicated genes of `group`. The chevron model also loads its reference
    /// organisms, but only reports genes of `group`.
    pub fn gene_duplications(
        &self,
        group: &OrganismGroup,
        similarity: &dyn SimilaritySource,
        cutoff: Option<f64>,
        model: &DuplicationModel,
        sink: &dyn ProgressSink,
    ) -> Result<GeneDuplicationReport, KiraError> {
        let cutoff = orthology::check_cutoff(cutoff.unwrap_or(self.analysis.similarity_cutoff))?;
        let scope = match model {
            DuplicationModel::Chevron(reference) => OrganismGroup::new(
                format!("{}+reference", group.name),
                group.organisms().iter().chain(reference).cloned(),
            ),
            _ => group.clone(),
        };
        let clusters = self.gene_clusters(&scope, similarity, cutoff, sink)?;
        let duplications = orthology::gene_duplications(&clusters, model)
            .into_iter()
            .filter(|dup| group.organisms().contains(dup.gene.organism()))
            .collect::<Vec<_>>();
        info!(
            group = %group.name,
            duplicated = duplications.len(),
            "gene duplications detected"
        );
        Ok(GeneDuplicationReport {
            group: group.name.clone(),
            cutoff,
            model: model.clone(),
            duplicated_groups: orthology::duplicated_groups(&duplications).len(),
            duplications,
        })
    }

    pub fn cache_list(&self, namespace: &str) -> Result<CacheListResult, KiraError> {
        let entries = self
            .memo
            .store()
            .list(namespace)?
            .into_iter()
            .map(|entry| CacheListEntry {
                identifier: entry.header.as_ref().map(|header| header.identifier.clone()),
                format: entry.header.as_ref().map(|header| header.format),
                created_at: entry
                    .header
                    .as_ref()
                    .map(|header| header.created_at.to_rfc3339()),
                file_name: entry.file_name,
                size_bytes: entry.size_bytes,
            })
            .collect();
        Ok(CacheListResult {
            namespace: namespace.to_string(),
            entries,
        })
    }

    /// Operator deletion. Allowed whatever the invalidation policy.
    pub fn cache_delete(
        &self,
        namespace: &str,
        identifier: &str,
    ) -> Result<CacheDeleteResult, KiraError> {
        let key = CacheKey::new(namespace, identifier)?;
        let deleted = self.memo.store().delete(&key)?;
        info!(key = %key, deleted, "cache entry deleted by operator");
        Ok(CacheDeleteResult {
            key: key.to_string(),
            deleted,
        })
    }
}

/// Lineage lookup that downloads the organism list only when asked.
struct KeggLineage<'a, F: KnowledgeFetcher> {
    app: &'a App<F>,
}

impl<F: KnowledgeFetcher> TaxonomySource for KeggLineage<'_, F> {
    fn members_of(&self, group: &str) -> Result<Vec<OrganismCode>, KiraError> {
        LineageTaxonomy::new(self.app.organism_list()?).members_of(group)
    }
}
