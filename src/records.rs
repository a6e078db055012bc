use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{EcNumber, OrganismCode, PathwayId};
use crate::error::KiraError;

static ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Za-z_:]+)="([^"]*)""#).expect("attribute pattern"));
static PATHWAY_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<pathway\s([^>]*)>").expect("pathway tag pattern"));
static ENTRY_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<entry\s([^>]*?)/?>").expect("entry tag pattern"));
static REACTION_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<reaction\s([^>]*)>(.*?)</reaction>").expect("reaction block pattern")
});
static SUBSTRATE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<substrate\s([^>]*?)/?>").expect("substrate tag pattern"));
static PRODUCT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<product\s([^>]*?)/?>").expect("product tag pattern"));

/// One line of the KEGG organism list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganismListing {
    pub t_number: String,
    pub code: OrganismCode,
    pub name: String,
    pub lineage: Vec<String>,
}

/// Lines with an unusable organism code are skipped.
pub fn parse_organism_list(content: &[u8]) -> Vec<OrganismListing> {
    let text = String::from_utf8_lossy(content);
    text.lines()
        .filter_map(|line| {
            let mut columns = line.split('\t');
            let t_number = columns.next()?.trim().to_string();
            let code = columns.next()?.parse::<OrganismCode>().ok()?;
            let name = columns.next().unwrap_or_default().trim().to_string();
            let lineage = columns
                .next()
                .map(|value| {
                    value
                        .split(';')
                        .map(|rank| rank.trim().to_string())
                        .filter(|rank| !rank.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            Some(OrganismListing {
                t_number,
                code,
                name,
                lineage,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathwayListing {
    pub id: PathwayId,
    pub name: String,
}

impl PathwayListing {
    /// Global and overview maps (`011xx`, `012xx`) span many pathways at once.
    pub fn is_overview(&self) -> bool {
        let id = self.id.as_str();
        id.starts_with("011") || id.starts_with("012")
    }
}

/// Parses `path:eco00260<TAB>name` lines. The `path:` prefix is optional.
pub fn parse_pathway_list(content: &[u8]) -> Result<Vec<PathwayListing>, KiraError> {
    let text = String::from_utf8_lossy(content);
    let mut listings = Vec::new();
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        let (id, name) = line.split_once('\t').unwrap_or((line, ""));
        let id = id
            .parse::<PathwayId>()
            .map_err(|err| KiraError::malformed("pathway list", err.to_string()))?;
        listings.push(PathwayListing {
            id,
            name: name.trim().to_string(),
        });
    }
    Ok(listings)
}

/// A reaction of a pathway map, with KEGG-prefixed ids as found in the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub ids: Vec<String>,
    pub reversible: bool,
    pub substrates: Vec<String>,
    pub products: Vec<String>,
}

/// Gene entry of a pathway map: the genes behind one box and the reactions it catalyses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneEntry {
    pub genes: Vec<String>,
    pub reactions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathwayRecord {
    pub id: PathwayId,
    pub organism: Option<OrganismCode>,
    pub title: Option<String>,
    pub reactions: Vec<ReactionRecord>,
    pub genes: Vec<GeneEntry>,
}

impl PathwayRecord {
    /// Gene id to the reaction ids it is listed for, merged across entries.
    pub fn gene_reactions(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut mapping: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entry in &self.genes {
            for gene in &entry.genes {
                mapping
                    .entry(gene.clone())
                    .or_default()
                    .extend(entry.reactions.iter().cloned());
            }
        }
        mapping
    }
}

fn attributes(tag: &str) -> BTreeMap<String, String> {
    ATTR_RE
        .captures_iter(tag)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

fn split_names(value: Option<&String>) -> Vec<String> {
    value
        .map(|names| names.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Decodes a KGML pathway document.
pub fn parse_kgml(content: &[u8]) -> Result<PathwayRecord, KiraError> {
    let text = std::str::from_utf8(content)
        .map_err(|err| KiraError::malformed("pathway", format!("not UTF-8: {err}")))?;
    let pathway_attrs = PATHWAY_TAG_RE
        .captures(text)
        .map(|caps| attributes(&caps[1]))
        .ok_or_else(|| KiraError::malformed("pathway", "missing pathway element"))?;
    let name = pathway_attrs
        .get("name")
        .ok_or_else(|| KiraError::malformed("pathway", "pathway element has no name"))?;
    let id = name
        .parse::<PathwayId>()
        .map_err(|err| KiraError::malformed(name.clone(), err.to_string()))?;
    let organism = pathway_attrs
        .get("org")
        .and_then(|value| value.parse::<OrganismCode>().ok());

    let genes = ENTRY_TAG_RE
        .captures_iter(text)
        .map(|caps| attributes(&caps[1]))
        .filter(|attrs| attrs.get("type").map(String::as_str) == Some("gene"))
        .map(|attrs| GeneEntry {
            genes: split_names(attrs.get("name")),
            reactions: split_names(attrs.get("reaction")),
        })
        .collect();

    let reactions = REACTION_BLOCK_RE
        .captures_iter(text)
        .map(|caps| {
            let attrs = attributes(&caps[1]);
            let body = &caps[2];
            let names_of = |re: &Regex| {
                re.captures_iter(body)
                    .filter_map(|inner| attributes(&inner[1]).remove("name"))
                    .collect::<Vec<_>>()
            };
            ReactionRecord {
                ids: split_names(attrs.get("name")),
                reversible: attrs.get("type").map(String::as_str) == Some("reversible"),
                substrates: names_of(&*SUBSTRATE_TAG_RE),
                products: names_of(&*PRODUCT_TAG_RE),
            }
        })
        .collect();

    Ok(PathwayRecord {
        id,
        organism,
        title: pathway_attrs.get("title").cloned(),
        reactions,
        genes,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orthology {
    pub id: String,
    pub name: Option<String>,
    pub ec_numbers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenePosition {
    pub from: Option<u64>,
    pub to: Option<u64>,
    pub complement: bool,
}

/// A KEGG GENES flat-file entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneRecord {
    pub number: String,
    pub is_protein: bool,
    pub organism_t_number: Option<String>,
    pub organism: OrganismCode,
    pub organism_name: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub orthologies: Vec<Orthology>,
    pub pathways: Vec<(String, String)>,
    pub position: Option<GenePosition>,
    pub aaseq_length: Option<usize>,
}

impl GeneRecord {
    /// Valid EC numbers across all orthologies, plus the strings that did not parse.
    pub fn ec_numbers(&self) -> (BTreeSet<EcNumber>, Vec<String>) {
        let mut valid = BTreeSet::new();
        let mut invalid = Vec::new();
        for raw in self.orthologies.iter().flat_map(|ko| ko.ec_numbers.iter()) {
            match raw.parse::<EcNumber>() {
                Ok(number) => {
                    valid.insert(number);
                }
                Err(_) => invalid.push(raw.clone()),
            }
        }
        (valid, invalid)
    }
}

pub fn parse_gene(record: &str, content: &[u8]) -> Result<GeneRecord, KiraError> {
    let text = String::from_utf8_lossy(content);
    let mut sections: Vec<(String, Vec<String>)> = Vec::new();
    for line in text.lines() {
        if line.is_empty() || line.starts_with(' ') {
            if let Some((_, lines)) = sections.last_mut() {
                lines.push(line.trim_start().to_string());
            }
            continue;
        }
        if line.starts_with("///") {
            break;
        }
        let (keyword, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim_start();
        let lines = if rest.is_empty() {
            Vec::new()
        } else {
            vec![rest.to_string()]
        };
        sections.push((keyword.to_string(), lines));
    }

    let section = |name: &str| {
        sections
            .iter()
            .find(|(keyword, _)| keyword == name)
            .map(|(_, lines)| lines.as_slice())
    };
    let first_line = |name: &str| section(name).and_then(|lines| lines.first()).cloned();

    let entry = first_line("ENTRY").ok_or_else(|| KiraError::malformed(record, "missing ENTRY"))?;
    let mut entry_words = entry.split_whitespace();
    let number = entry_words
        .next()
        .ok_or_else(|| KiraError::malformed(record, "empty ENTRY"))?
        .to_string();
    let is_protein = entry_words.next() == Some("CDS");
    let organism_t_number = entry_words.next().map(str::to_string);

    let organism_line =
        first_line("ORGANISM").ok_or_else(|| KiraError::malformed(record, "missing ORGANISM"))?;
    let (code, organism_name) = organism_line
        .split_once("  ")
        .map(|(code, name)| (code, Some(name.trim().to_string())))
        .unwrap_or((organism_line.as_str(), None));
    let organism = code
        .trim()
        .parse::<OrganismCode>()
        .map_err(|err| KiraError::malformed(record, err.to_string()))?;

    let orthologies = section("ORTHOLOGY")
        .unwrap_or_default()
        .iter()
        .map(|line| parse_orthology(line))
        .collect();

    let pathways = section("PATHWAY")
        .unwrap_or_default()
        .iter()
        .filter_map(|line| {
            line.split_once("  ")
                .map(|(id, name)| (id.trim().to_string(), name.trim().to_string()))
        })
        .collect();

    let position = first_line("POSITION").map(|line| parse_position(&line));
    let aaseq_length = first_line("AASEQ").and_then(|line| line.trim().parse::<usize>().ok());

    Ok(GeneRecord {
        number,
        is_protein,
        organism_t_number,
        organism,
        organism_name,
        name: first_line("NAME"),
        symbol: first_line("SYMBOL"),
        orthologies,
        pathways,
        position,
        aaseq_length,
    })
}

fn parse_orthology(line: &str) -> Orthology {
    let (id, rest) = line.split_once("  ").unwrap_or((line, ""));
    let (name, ec_numbers) = match rest.split_once(" [EC:") {
        Some((name, ecs)) => (
            name,
            ecs.trim_end_matches(']')
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        ),
        None => (rest, Vec::new()),
    };
    let name = name.trim();
    Orthology {
        id: id.trim().to_string(),
        name: (!name.is_empty()).then(|| name.to_string()),
        ec_numbers,
    }
}

fn parse_position(line: &str) -> GenePosition {
    let complement = line.contains("complement");
    let location = line.rsplit_once(':').map(|(_, rest)| rest).unwrap_or(line);
    let digits = |value: &str| {
        value
            .chars()
            .filter(char::is_ascii_digit)
            .collect::<String>()
            .parse::<u64>()
            .ok()
    };
    let (from, to) = match location.split_once("..") {
        Some((from, to)) => (digits(from), digits(to)),
        None => (digits(location), None),
    };
    GenePosition {
        from,
        to,
        complement,
    }
}
