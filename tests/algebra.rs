use proptest::prelude::*;

use kira_metabolic_networks::algebra::{self, CladeComparison, FusedGraph};
use kira_metabolic_networks::domain::{CompoundId, OrganismCode, ReactionId};
use kira_metabolic_networks::graph::{Edge, Graph, ReactionNode};

fn organism(code: &str) -> OrganismCode {
    code.parse().unwrap()
}

fn compound(index: usize) -> CompoundId {
    format!("C{:05}", index + 1).parse().unwrap()
}

fn reaction(index: usize, reversible: bool) -> ReactionNode {
    ReactionNode {
        id: format!("R{:05}", index + 1).parse::<ReactionId>().unwrap(),
        reversible,
    }
}

fn graph_strategy() -> impl Strategy<Value = Graph> {
    prop::collection::vec((any::<bool>(), 0usize..5, 0usize..4, any::<bool>()), 0..12).prop_map(
        |links| {
            let mut graph = Graph::new();
            for (is_substrate, c, r, reversible) in links {
                let edge = if is_substrate {
                    Edge::substrate(compound(c), reaction(r, reversible))
                } else {
                    Edge::product(reaction(r, reversible), compound(c))
                };
                graph.add_edge(edge);
            }
            graph
        },
    )
}

fn same_reversibility(a: &Graph, b: &Graph) -> bool {
    a.nodes().all(|node| {
        b.node(node)
            .is_some_and(|other| other.is_reversible() == node.is_reversible())
    })
}

fn fused(members: &[(&str, &Graph)]) -> FusedGraph {
    let codes = members
        .iter()
        .map(|(code, _)| organism(code))
        .collect::<Vec<_>>();
    algebra::fuse(codes.iter().zip(members.iter().map(|(_, graph)| *graph)))
}

proptest! {
    #[test]
    fn fusion_is_commutative(a in graph_strategy(), b in graph_strategy()) {
        let ab = fused(&[("eco", &a), ("ecj", &b)]);
        let ba = fused(&[("ecj", &b), ("eco", &a)]);
        prop_assert_eq!(ab.graph(), ba.graph());
        prop_assert!(same_reversibility(ab.graph(), ba.graph()));
        for node in ab.graph().nodes() {
            prop_assert_eq!(ab.node_provenance(node), ba.node_provenance(node));
        }
    }

    #[test]
    fn fusion_is_associative(a in graph_strategy(), b in graph_strategy(), c in graph_strategy()) {
        let left = algebra::union(&algebra::union(&a, &b), &c);
        let right = algebra::union(&a, &algebra::union(&b, &c));
        prop_assert_eq!(&left, &right);
        prop_assert!(same_reversibility(&left, &right));
        let all = fused(&[("eco", &a), ("ecj", &b), ("ecd", &c)]);
        prop_assert_eq!(all.graph(), &left);
    }

    #[test]
    fn core_extremes_are_intersection_and_union(
        a in graph_strategy(),
        b in graph_strategy(),
        c in graph_strategy(),
    ) {
        let all = fused(&[("eco", &a), ("ecj", &b), ("ecd", &c)]);
        let strict = algebra::core(&all, 1.0).unwrap();
        let expected = algebra::intersection(&algebra::intersection(&a, &b), &c);
        prop_assert_eq!(strict.graph(), &expected);

        let loose = algebra::core(&all, 0.0).unwrap();
        prop_assert_eq!(loose.graph(), all.graph());
    }

    #[test]
    fn clade_comparison_partitions_the_union(a in graph_strategy(), b in graph_strategy()) {
        let comparison = CladeComparison::new(&a, &b);
        for edge in comparison.unified.edges() {
            let conserved = comparison.conserved.contains_edge(edge);
            let diverged = comparison.diverged.contains_edge(edge);
            prop_assert!(conserved != diverged);
        }
        prop_assert!(comparison.overlap.edge_jaccard >= 0.0);
        prop_assert!(comparison.overlap.edge_jaccard <= 1.0);
    }
}

#[test]
fn core_at_half_keeps_majority_elements() {
    let mut a = Graph::new();
    a.add_edge(Edge::substrate(compound(0), reaction(0, false)));
    let mut b = a.clone();
    b.add_edge(Edge::product(reaction(0, false), compound(1)));
    let mut c = Graph::new();
    c.add_edge(Edge::product(reaction(0, false), compound(1)));

    let all = fused(&[("eco", &a), ("ecj", &b), ("ecd", &c)]);
    let majority = algebra::core(&all, 0.5).unwrap();
    assert_eq!(majority.graph().edge_count(), 2);
    let strict = algebra::core(&all, 1.0).unwrap();
    assert_eq!(strict.graph().edge_count(), 0);
    assert_eq!(strict.graph().node_count(), 1);
}

#[test]
fn empty_graphs_overlap_fully() {
    let overlap = algebra::overlap(&Graph::new(), &Graph::new());
    assert_eq!(overlap.node_jaccard, 1.0);
    assert_eq!(overlap.edge_jaccard, 1.0);
}
