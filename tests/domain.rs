use assert_matches::assert_matches;
use proptest::prelude::*;

use kira_metabolic_networks::domain::{
    CompoundId, EcNumber, EcSet, GeneId, OrganismCode, PathwayId, ReactionId, sort_ec_numbers,
};
use kira_metabolic_networks::error::KiraError;

#[test]
fn parse_organism_code() {
    let code: OrganismCode = "eco".parse().unwrap();
    assert_eq!(code.as_str(), "eco");
    assert_matches!("ECO".parse::<OrganismCode>(), Err(KiraError::InvalidOrganismCode(_)));
    assert_matches!("ec".parse::<OrganismCode>(), Err(KiraError::InvalidOrganismCode(_)));
}

#[test]
fn parse_gene_id() {
    let gene: GeneId = "eco:b0001".parse().unwrap();
    assert_eq!(gene.organism().as_str(), "eco");
    assert_eq!(gene.name(), "b0001");
    assert_eq!(gene.to_string(), "eco:b0001");
    assert_matches!("b0001".parse::<GeneId>(), Err(KiraError::InvalidGeneId(_)));
}

#[test]
fn parse_compound_ids() {
    assert_eq!("cpd:C00022".parse::<CompoundId>().unwrap().as_str(), "C00022");
    assert_eq!("gl:G00001".parse::<CompoundId>().unwrap().as_str(), "G00001");
    assert_matches!("dr:D00001".parse::<CompoundId>(), Err(KiraError::DrugId(_)));
    assert_matches!("X00001".parse::<CompoundId>(), Err(KiraError::InvalidCompoundId(_)));
}

#[test]
fn parse_reaction_and_pathway_ids() {
    assert_eq!("rn:R01773".parse::<ReactionId>().unwrap().as_str(), "R01773");
    assert_matches!("R1773".parse::<ReactionId>(), Err(KiraError::InvalidReactionId(_)));
    assert_eq!("path:map00260".parse::<PathwayId>().unwrap().as_str(), "00260");
    assert_matches!("0026".parse::<PathwayId>(), Err(KiraError::InvalidPathwayId(_)));
}

#[test]
fn ec_numbers_in_natural_order() {
    let sorted = sort_ec_numbers(&["1.2.3.10", "1.2.3.4", "1.2.-.-", "1.10.1.1"]).unwrap();
    let rendered = sorted.iter().map(ToString::to_string).collect::<Vec<_>>();
    assert_eq!(rendered, vec!["1.2.-.-", "1.2.3.4", "1.2.3.10", "1.10.1.1"]);
}

#[test]
fn ec_wildcards_contain_numbers() {
    let broad: EcNumber = "2.7.-.-".parse().unwrap();
    let narrow: EcNumber = "2.7.2.4".parse().unwrap();
    assert!(broad.has_wildcard());
    assert!(broad.contains(&narrow));
    assert!(!narrow.contains(&broad));
    assert_eq!(broad.matching_levels(&narrow, true), 4);
    assert_eq!(broad.matching_levels(&narrow, false), 2);
}

#[test]
fn invalid_ec_numbers() {
    for value in ["8.1.1.1", "1.1.1", "-.1.1.1", "1.-.1.1", "1.01.1.1", "1.1.1.1000"] {
        assert_matches!(value.parse::<EcNumber>(), Err(KiraError::InvalidEcNumber(_)));
    }
}

#[test]
fn ec_set_is_never_empty() {
    assert!(EcSet::new(Vec::new()).is_none());
    let set = EcSet::new(["1.1.1.1".parse().unwrap(), "1.1.1.1".parse().unwrap()]).unwrap();
    assert_eq!(set.len(), 1);
    assert!(!set.is_multifunctional());
    let decoded = serde_json::from_str::<EcSet>("[]");
    assert!(decoded.is_err());
}

fn ec_levels() -> impl Strategy<Value = [Option<u16>; 4]> {
    (1u16..=7, 1u16..=99, 1u16..=99, 1u16..=999, 1usize..=4).prop_map(
        |(class, subclass, subsubclass, serial, known)| {
            let values = [class, subclass, subsubclass, serial];
            let mut levels = [None; 4];
            for (index, value) in values.into_iter().enumerate().take(known) {
                levels[index] = Some(value);
            }
            levels
        },
    )
}

fn render(levels: [Option<u16>; 4]) -> String {
    levels
        .iter()
        .map(|level| level.map_or_else(|| "-".to_string(), |value| value.to_string()))
        .collect::<Vec<_>>()
        .join(".")
}

proptest! {
    #[test]
    fn ec_display_parses_back(levels in ec_levels()) {
        let text = render(levels);
        let parsed: EcNumber = text.parse().unwrap();
        prop_assert_eq!(parsed.levels(), levels);
        prop_assert_eq!(parsed.to_string(), text);
    }

    #[test]
    fn ec_order_is_numeric_per_level(a in ec_levels(), b in ec_levels()) {
        let left: EcNumber = render(a).parse().unwrap();
        let right: EcNumber = render(b).parse().unwrap();
        prop_assert_eq!(left.cmp(&right), a.cmp(&b));
    }

    #[test]
    fn wildcard_numbers_contain_their_refinements(levels in ec_levels()) {
        let number: EcNumber = render(levels).parse().unwrap();
        let mut broader = levels;
        broader[3] = None;
        let broad: EcNumber = render(broader).parse().unwrap();
        prop_assert!(broad.contains(&number));
    }
}
