mod support;

use std::collections::BTreeSet;

use assert_matches::assert_matches;

use kira_metabolic_networks::builder::{BuildOptions, GraphBuilder};
use kira_metabolic_networks::domain::{CompoundId, EcNumber, EcSet, ReactionId};
use kira_metabolic_networks::error::KiraError;
use kira_metabolic_networks::fetch::Resource;
use kira_metabolic_networks::graph::{Edge, Node, NodeKind, ReactionNode, RelationKind};

use support::{gene, organism, pathway, temp_memo, two_strains};

fn compound(id: &str) -> CompoundId {
    id.parse().unwrap()
}

fn reaction(id: &str) -> ReactionNode {
    ReactionNode {
        id: id.parse::<ReactionId>().unwrap(),
        reversible: false,
    }
}

fn group(ecs: &[&str]) -> EcSet {
    EcSet::new(ecs.iter().map(|ec| ec.parse::<EcNumber>().unwrap())).unwrap()
}

#[test]
fn builds_organism_graph_from_pathways_and_genes() {
    let (_temp, memo) = temp_memo();
    let kegg = two_strains();
    let outcome = GraphBuilder::new(&memo, &kegg)
        .build(&organism("eco"), &BuildOptions::default())
        .unwrap();
    let graph = &outcome.graph;

    assert_eq!(outcome.pathways, vec![pathway("00260")]);
    assert_eq!(graph.nodes_of_type(NodeKind::Compound).count(), 3);
    assert_eq!(graph.nodes_of_type(NodeKind::Reaction).count(), 2);
    assert_eq!(graph.nodes_of_type(NodeKind::Gene).count(), 3);
    assert_eq!(graph.nodes_of_type(NodeKind::EnzymeGroup).count(), 3);
    assert_eq!(graph.edge_count(), 12);

    assert!(graph.contains_edge(&Edge::substrate(compound("C00001"), reaction("R00001"))));
    assert!(graph.contains_edge(&Edge::product(reaction("R00001"), compound("C00002"))));
    assert!(!graph.contains_edge(&Edge::substrate(compound("C00002"), reaction("R00001"))));
    assert!(graph.contains_edge(&Edge::catalyzes(group(&["1.1.1.1"]), reaction("R00001"))));
    assert!(graph.contains_edge(&Edge::encodes(gene("eco:b0002"), group(&["2.2.2.2"]))));

    let attributes = graph
        .edge_attributes(&Edge::substrate(compound("C00001"), reaction("R00001")))
        .unwrap();
    assert_eq!(attributes.pathways, BTreeSet::from([pathway("00260")]));
}

#[test]
fn reversible_reactions_link_both_directions() {
    let (_temp, memo) = temp_memo();
    let kegg = two_strains();
    let graph = GraphBuilder::new(&memo, &kegg)
        .build(&organism("eco"), &BuildOptions::default())
        .unwrap()
        .graph;

    let r2 = Node::Reaction(reaction("R00002"));
    assert!(graph.node(&r2).unwrap().is_reversible());
    let substrates = graph.predecessors(&r2, Some(RelationKind::Substrate));
    let products = graph.neighbors(&r2, Some(RelationKind::Product));
    let expected = BTreeSet::from([
        Node::Compound(compound("C00002")),
        Node::Compound(compound("C00003")),
    ]);
    assert_eq!(substrates, expected);
    assert_eq!(products, expected);
}

#[test]
fn missing_pathway_map_is_a_warning_and_overviews_are_skipped() {
    let (_temp, memo) = temp_memo();
    let kegg = two_strains();
    let outcome = GraphBuilder::new(&memo, &kegg)
        .build(&organism("eco"), &BuildOptions::default())
        .unwrap();

    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].record.contains("eco00300"));
    assert!(
        !kegg
            .calls()
            .contains(&Resource::Pathway(organism("eco"), pathway("01100")))
    );
}

#[test]
fn raw_downloads_are_memoized_across_builds() {
    let (_temp, memo) = temp_memo();
    let kegg = two_strains();
    let builder = GraphBuilder::new(&memo, &kegg);
    let first = builder
        .build(&organism("eco"), &BuildOptions::default())
        .unwrap();
    let calls = kegg.calls().len();

    let second = builder
        .build(&organism("eco"), &BuildOptions::default())
        .unwrap();
    assert_eq!(first.graph, second.graph);
    // only the failed download is retried
    assert_eq!(
        kegg.calls()[calls..].to_vec(),
        vec![Resource::Pathway(organism("eco"), pathway("00300"))]
    );
}

#[test]
fn malformed_gene_record_is_skipped_with_warning() {
    let (_temp, memo) = temp_memo();
    let kegg = two_strains().with(Resource::Gene(gene("eco:b0002")), "garbage\n");
    let outcome = GraphBuilder::new(&memo, &kegg)
        .build(&organism("eco"), &BuildOptions::default())
        .unwrap();

    assert!(!outcome.graph.contains_node(&Node::Gene(gene("eco:b0002"))));
    assert!(
        outcome
            .graph
            .predecessors(
                &Node::Reaction(reaction("R00002")),
                Some(RelationKind::Catalyzes)
            )
            .is_empty()
    );
    assert!(
        outcome
            .warnings
            .iter()
            .any(|warning| warning.record.contains("eco:b0002"))
    );
}

#[test]
fn gene_without_ec_number_has_no_enzyme_group() {
    let (_temp, memo) = temp_memo();
    let unannotated = "\
ENTRY       b0002             CDS       T00007
ORTHOLOGY   K00002  hypothetical protein
ORGANISM    eco  Escherichia coli K-12 MG1655
///
";
    let kegg = two_strains().with(Resource::Gene(gene("eco:b0002")), unannotated);
    let graph = GraphBuilder::new(&memo, &kegg)
        .build(&organism("eco"), &BuildOptions::default())
        .unwrap()
        .graph;

    let node = Node::Gene(gene("eco:b0002"));
    assert!(graph.contains_node(&node));
    assert!(graph.neighbors(&node, None).is_empty());
}

#[test]
fn multifunctional_genes_can_be_excluded_from_catalysis() {
    let (_temp, memo) = temp_memo();
    let kegg = two_strains();
    let options = BuildOptions {
        exclude_multifunctional: true,
        ..BuildOptions::default()
    };
    let graph = GraphBuilder::new(&memo, &kegg)
        .build(&organism("eco"), &options)
        .unwrap()
        .graph;

    let bifunctional = group(&["1.1.1.1", "3.3.3.3"]);
    assert!(graph.contains_edge(&Edge::encodes(gene("eco:b0003"), bifunctional.clone())));
    assert!(!graph.contains_edge(&Edge::catalyzes(bifunctional, reaction("R00001"))));
    assert_eq!(graph.edge_count(), 11);
}

#[test]
fn pathway_filter_restricts_the_graph() {
    let (_temp, memo) = temp_memo();
    let kegg = two_strains();
    let options = BuildOptions {
        pathways: Some(BTreeSet::from([pathway("00300")])),
        ..BuildOptions::default()
    };
    let outcome = GraphBuilder::new(&memo, &kegg)
        .build(&organism("eco"), &options)
        .unwrap();
    assert!(outcome.pathways.is_empty());
    assert!(outcome.graph.is_empty());
}

#[test]
fn remote_failure_of_pathway_list_fails_the_build() {
    let (_temp, memo) = temp_memo();
    let kegg = two_strains().failing(Resource::PathwayList(organism("eco")), 503);
    let err = GraphBuilder::new(&memo, &kegg)
        .build(&organism("eco"), &BuildOptions::default())
        .unwrap_err();
    assert!(err.is_remote());
    assert_matches!(err, KiraError::BuildFailed { organism, .. } if organism == "eco");
}

const ECO_00260_MISSING_IDS: &str = r#"<?xml version="1.0"?>
<pathway name="path:eco00260" org="eco" number="00260" title="Glycine, serine and threonine metabolism">
    <entry id="1" name="eco:b0001" type="gene" reaction="rn:R00001 rn:bogus"/>
    <entry id="2" type="gene" reaction="rn:R00002"/>
    <reaction id="1" name="rn:R00001" type="irreversible">
        <substrate id="3" name="cpd:C00001"/>
        <product id="4" name="cpd:C00002"/>
    </reaction>
    <reaction id="2" type="reversible">
        <substrate id="4" name="cpd:C00002"/>
        <product id="5" name="cpd:C00003"/>
    </reaction>
</pathway>"#;

#[test]
fn records_without_identifiers_are_skipped_with_warnings() {
    let (_temp, memo) = temp_memo();
    let kegg = two_strains().with(
        Resource::Pathway(organism("eco"), pathway("00260")),
        ECO_00260_MISSING_IDS,
    );
    let outcome = GraphBuilder::new(&memo, &kegg)
        .build(&organism("eco"), &BuildOptions::default())
        .unwrap();
    let graph = &outcome.graph;

    assert_eq!(graph.nodes_of_type(NodeKind::Reaction).count(), 1);
    assert_eq!(graph.nodes_of_type(NodeKind::Gene).count(), 1);
    assert!(graph.contains_edge(&Edge::catalyzes(group(&["1.1.1.1"]), reaction("R00001"))));

    let messages: Vec<String> = outcome
        .warnings
        .iter()
        .filter(|warning| warning.record == "pathway eco00260")
        .map(|warning| warning.message.clone())
        .collect();
    assert_eq!(messages.len(), 3, "{messages:?}");
    assert!(messages.iter().any(|message| message.contains("reaction without")));
    assert!(messages.iter().any(|message| message.contains("gene entry without")));
    assert!(messages.iter().any(|message| message.contains("rn:bogus")));
}
