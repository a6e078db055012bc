use std::collections::BTreeMap;

use crate::domain::{OrganismCode, OrganismGroup};
use crate::error::KiraError;
use crate::records::OrganismListing;

pub trait TaxonomySource: Send + Sync {
    fn members_of(&self, group: &str) -> Result<Vec<OrganismCode>, KiraError>;

    fn group(&self, name: &str) -> Result<OrganismGroup, KiraError> {
        Ok(OrganismGroup::new(name, self.members_of(name)?))
    }
}

/// Groups declared up front, e.g. the `groups` table of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct StaticTaxonomy {
    groups: BTreeMap<String, Vec<OrganismCode>>,
}

impl StaticTaxonomy {
    pub fn new(groups: BTreeMap<String, Vec<OrganismCode>>) -> Self {
        Self { groups }
    }
}

impl TaxonomySource for StaticTaxonomy {
    fn members_of(&self, group: &str) -> Result<Vec<OrganismCode>, KiraError> {
        self.groups
            .get(group)
            .cloned()
            .ok_or_else(|| KiraError::Taxonomy(format!("unknown group {group}")))
    }
}

/// Resolves a group by matching the KEGG organism list.
///
/// An organism belongs to the group when one of its lineage ranks equals the
/// group name, or when its description contains the name.
#[derive(Debug, Clone)]
pub struct LineageTaxonomy {
    organisms: Vec<OrganismListing>,
}

impl LineageTaxonomy {
    pub fn new(organisms: Vec<OrganismListing>) -> Self {
        Self { organisms }
    }
}

impl TaxonomySource for LineageTaxonomy {
    fn members_of(&self, group: &str) -> Result<Vec<OrganismCode>, KiraError> {
        let needle = group.trim();
        if needle.is_empty() {
            return Err(KiraError::Taxonomy("empty group name".to_string()));
        }
        let members = self
            .organisms
            .iter()
            .filter(|listing| {
                listing.lineage.iter().any(|rank| rank == needle) || listing.name.contains(needle)
            })
            .map(|listing| listing.code.clone())
            .collect::<Vec<_>>();
        if members.is_empty() {
            return Err(KiraError::Taxonomy(format!("no organisms in group {group}")));
        }
        Ok(members)
    }
}

/// Tries each source in turn; the first that knows the group wins.
pub struct ChainedTaxonomy<'a> {
    sources: Vec<&'a dyn TaxonomySource>,
}

impl<'a> ChainedTaxonomy<'a> {
    pub fn new(sources: Vec<&'a dyn TaxonomySource>) -> Self {
        Self { sources }
    }
}

impl TaxonomySource for ChainedTaxonomy<'_> {
    fn members_of(&self, group: &str) -> Result<Vec<OrganismCode>, KiraError> {
        let mut last_error = None;
        for source in &self.sources {
            match source.members_of(group) {
                Ok(members) => return Ok(members),
                Err(KiraError::Taxonomy(message)) => last_error = Some(message),
                Err(err) => return Err(err),
            }
        }
        Err(KiraError::Taxonomy(
            last_error.unwrap_or_else(|| format!("unknown group {group}")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn code(value: &str) -> OrganismCode {
        value.parse().unwrap()
    }

    fn listing(code_value: &str, name: &str, lineage: &[&str]) -> OrganismListing {
        OrganismListing {
            t_number: "T00000".to_string(),
            code: code(code_value),
            name: name.to_string(),
            lineage: lineage.iter().map(|rank| rank.to_string()).collect(),
        }
    }

    #[test]
    fn static_groups() {
        let taxonomy = StaticTaxonomy::new(BTreeMap::from([(
            "enterobacteria".to_string(),
            vec![code("eco"), code("ecj"), code("eco")],
        )]));
        let group = taxonomy.group("enterobacteria").unwrap();
        assert_eq!(group.len(), 2);
        assert_matches!(taxonomy.members_of("archaea"), Err(KiraError::Taxonomy(_)));
    }

    #[test]
    fn lineage_matches_rank_or_name() {
        let taxonomy = LineageTaxonomy::new(vec![
            listing("eco", "Escherichia coli K-12 MG1655", &["Bacteria", "Escherichia"]),
            listing("sty", "Salmonella enterica Typhi", &["Bacteria", "Salmonella"]),
            listing("hsa", "Homo sapiens (human)", &["Eukaryotes", "Animals"]),
        ]);
        assert_eq!(taxonomy.members_of("Bacteria").unwrap().len(), 2);
        assert_eq!(taxonomy.members_of("Escherichia coli").unwrap(), vec![code("eco")]);
    }

    #[test]
    fn chain_falls_through_unknown_groups() {
        let configured = StaticTaxonomy::new(BTreeMap::from([(
            "Bacteria".to_string(),
            vec![code("ecj")],
        )]));
        let lineage = LineageTaxonomy::new(vec![
            listing("eco", "Escherichia coli", &["Bacteria", "Escherichia"]),
        ]);
        let sources: Vec<&dyn TaxonomySource> = vec![&configured, &lineage];
        let chained = ChainedTaxonomy::new(sources);
        assert_eq!(chained.members_of("Bacteria").unwrap(), vec![code("ecj")]);
        assert_eq!(chained.members_of("Escherichia").unwrap(), vec![code("eco")]);
        assert_matches!(chained.members_of("Archaea"), Err(KiraError::Taxonomy(_)));
    }
}
