#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use tempfile::TempDir;

use kira_metabolic_networks::domain::{GeneId, OrganismCode, PathwayId};
use kira_metabolic_networks::error::KiraError;
use kira_metabolic_networks::fetch::{KnowledgeFetcher, Resource};
use kira_metabolic_networks::memo::Memoizer;
use kira_metabolic_networks::store::{CacheConfig, ContentStore};

/// In-memory KEGG. Unknown resources answer 404.
#[derive(Default)]
pub struct DummyKegg {
    records: HashMap<Resource, Vec<u8>>,
    failures: HashMap<Resource, u16>,
    calls: Mutex<Vec<Resource>>,
}

impl DummyKegg {
    pub fn with(mut self, resource: Resource, content: &str) -> Self {
        self.records.insert(resource, content.as_bytes().to_vec());
        self
    }

    pub fn failing(mut self, resource: Resource, status: u16) -> Self {
        self.failures.insert(resource, status);
        self
    }

    pub fn calls(&self) -> Vec<Resource> {
        self.calls.lock().unwrap().clone()
    }
}

impl KnowledgeFetcher for DummyKegg {
    fn fetch(&self, resource: &Resource) -> Result<Vec<u8>, KiraError> {
        self.calls.lock().unwrap().push(resource.clone());
        if let Some(status) = self.failures.get(resource) {
            return Err(KiraError::FetchStatus {
                resource: resource.to_string(),
                status: *status,
                message: "dummy failure".to_string(),
            });
        }
        self.records
            .get(resource)
            .cloned()
            .ok_or_else(|| KiraError::FetchStatus {
                resource: resource.to_string(),
                status: 404,
                message: "not found".to_string(),
            })
    }
}

pub fn organism(code: &str) -> OrganismCode {
    code.parse().unwrap()
}

pub fn pathway(number: &str) -> PathwayId {
    number.parse().unwrap()
}

pub fn gene(id: &str) -> GeneId {
    id.parse().unwrap()
}

pub fn temp_memo() -> (TempDir, Memoizer) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
    (temp, Memoizer::new(ContentStore::new(CacheConfig::new(root))))
}

pub const ECO_PATHWAYS: &str = "\
path:eco00260\tGlycine, serine and threonine metabolism
path:eco00300\tLysine biosynthesis
path:eco01100\tMetabolic pathways
";

/// R00001: C00001 -> C00002 (plus a drug substrate), catalysed by b0001 and b0003.
/// R00002: C00002 <=> C00003, catalysed by b0002.
pub const ECO_00260: &str = r#"<?xml version="1.0"?>
<pathway name="path:eco00260" org="eco" number="00260" title="Glycine, serine and threonine metabolism">
    <entry id="1" name="eco:b0001 eco:b0003" type="gene" reaction="rn:R00001">
        <graphics name="thrL" type="rectangle"/>
    </entry>
    <entry id="2" name="eco:b0002" type="gene" reaction="rn:R00002">
        <graphics name="thrA" type="rectangle"/>
    </entry>
    <entry id="3" name="cpd:C00001" type="compound"/>
    <reaction id="1" name="rn:R00001" type="irreversible">
        <substrate id="3" name="cpd:C00001"/>
        <substrate id="9" name="dr:D00001"/>
        <product id="4" name="cpd:C00002"/>
    </reaction>
    <reaction id="2" name="rn:R00002" type="reversible">
        <substrate id="4" name="cpd:C00002"/>
        <product id="5" name="cpd:C00003"/>
    </reaction>
</pathway>"#;

pub const ECO_B0001: &str = "\
ENTRY       b0001             CDS       T00007
SYMBOL      thrL
ORTHOLOGY   K00001  alcohol dehydrogenase [EC:1.1.1.1]
ORGANISM    eco  Escherichia coli K-12 MG1655
///
";

pub const ECO_B0002: &str = "\
ENTRY       b0002             CDS       T00007
SYMBOL      thrA
ORTHOLOGY   K00002  kinase [EC:2.2.2.2]
ORGANISM    eco  Escherichia coli K-12 MG1655
///
";

/// Annotated with two EC numbers, so it is multifunctional.
pub const ECO_B0003: &str = "\
ENTRY       b0003             CDS       T00007
SYMBOL      thrB
ORTHOLOGY   K00003  bifunctional enzyme [EC:1.1.1.1 3.3.3.3]
ORGANISM    eco  Escherichia coli K-12 MG1655
///
";

pub const ECJ_PATHWAYS: &str = "path:ecj00260\tGlycine, serine and threonine metabolism\n";

pub const ECJ_00260: &str = r#"<?xml version="1.0"?>
<pathway name="path:ecj00260" org="ecj" number="00260" title="Glycine, serine and threonine metabolism">
    <entry id="1" name="ecj:JW0001" type="gene" reaction="rn:R00001"/>
    <reaction id="1" name="rn:R00001" type="irreversible">
        <substrate id="3" name="cpd:C00001"/>
        <product id="4" name="cpd:C00002"/>
    </reaction>
</pathway>"#;

pub const ECJ_JW0001: &str = "\
ENTRY       JW0001            CDS       T00068
ORTHOLOGY   K00001  alcohol dehydrogenase [EC:1.1.1.1]
ORGANISM    ecj  Escherichia coli K-12 W3110
///
";

pub const ORGANISMS: &str = "\
T00007\teco\tEscherichia coli K-12 MG1655\tProkaryotes;Bacteria;Gammaproteobacteria - Enterobacteria;Escherichia
T00068\tecj\tEscherichia coli K-12 W3110\tProkaryotes;Bacteria;Gammaproteobacteria - Enterobacteria;Escherichia
";

/// Two E. coli strains; eco00300 has no map and answers 404.
pub fn two_strains() -> DummyKegg {
    DummyKegg::default()
        .with(Resource::OrganismList, ORGANISMS)
        .with(Resource::PathwayList(organism("eco")), ECO_PATHWAYS)
        .with(Resource::Pathway(organism("eco"), pathway("00260")), ECO_00260)
        .with(Resource::Gene(gene("eco:b0001")), ECO_B0001)
        .with(Resource::Gene(gene("eco:b0002")), ECO_B0002)
        .with(Resource::Gene(gene("eco:b0003")), ECO_B0003)
        .with(Resource::PathwayList(organism("ecj")), ECJ_PATHWAYS)
        .with(Resource::Pathway(organism("ecj"), pathway("00260")), ECJ_00260)
        .with(Resource::Gene(gene("ecj:JW0001")), ECJ_JW0001)
}
