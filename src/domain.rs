use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

static ORGANISM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{3,4}$").expect("organism code pattern"));
static GENE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("gene name pattern"));
static COMPOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[CG][0-9]{5}$").expect("compound id pattern"));
static REACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^R[0-9]{5}$").expect("reaction id pattern"));
static PATHWAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{5}$").expect("pathway id pattern"));

/// KEGG organism abbreviation, e.g. `eco`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrganismCode(String);

impl OrganismCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganismCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrganismCode {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !ORGANISM_RE.is_match(normalized) {
            return Err(KiraError::InvalidOrganismCode(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for OrganismCode {
    type Error = KiraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrganismCode> for String {
    fn from(value: OrganismCode) -> Self {
        value.0
    }
}

/// Organism-qualified gene identifier, e.g. `eco:b0004`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GeneId {
    organism: OrganismCode,
    name: String,
}

impl GeneId {
    pub fn new(organism: OrganismCode, name: &str) -> Result<Self, KiraError> {
        if !GENE_NAME_RE.is_match(name) {
            return Err(KiraError::InvalidGeneId(format!("{organism}:{name}")));
        }
        Ok(Self {
            organism,
            name: name.to_string(),
        })
    }

    pub fn organism(&self) -> &OrganismCode {
        &self.organism
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for GeneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.organism, self.name)
    }
}

impl FromStr for GeneId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (organism, name) = trimmed
            .split_once(':')
            .ok_or_else(|| KiraError::InvalidGeneId(value.to_string()))?;
        let organism = organism
            .parse::<OrganismCode>()
            .map_err(|_| KiraError::InvalidGeneId(value.to_string()))?;
        Self::new(organism, name)
    }
}

impl TryFrom<String> for GeneId {
    type Error = KiraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GeneId> for String {
    fn from(value: GeneId) -> Self {
        value.to_string()
    }
}

/// Compound or glycan identifier. Drug ids are rejected with [`KiraError::DrugId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompoundId(String);

impl CompoundId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CompoundId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let normalized = normalized
            .strip_prefix("cpd:")
            .or_else(|| normalized.strip_prefix("gl:"))
            .or_else(|| normalized.strip_prefix("dr:"))
            .unwrap_or(normalized);
        if normalized.starts_with('D') {
            return Err(KiraError::DrugId(value.to_string()));
        }
        if !COMPOUND_RE.is_match(normalized) {
            return Err(KiraError::InvalidCompoundId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for CompoundId {
    type Error = KiraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CompoundId> for String {
    fn from(value: CompoundId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReactionId(String);

impl ReactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReactionId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let normalized = normalized.strip_prefix("rn:").unwrap_or(normalized);
        if !REACTION_RE.is_match(normalized) {
            return Err(KiraError::InvalidReactionId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for ReactionId {
    type Error = KiraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReactionId> for String {
    fn from(value: ReactionId) -> Self {
        value.0
    }
}

/// Organism-independent pathway number, e.g. `00260`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathwayId(String);

impl PathwayId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathwayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PathwayId {
    type Err = KiraError;

    /// Accepts `00260`, `eco00260` and `path:eco00260`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let normalized = normalized.strip_prefix("path:").unwrap_or(normalized);
        let digits = normalized.trim_start_matches(|ch: char| ch.is_ascii_lowercase());
        if !PATHWAY_RE.is_match(digits) {
            return Err(KiraError::InvalidPathwayId(value.to_string()));
        }
        Ok(Self(digits.to_string()))
    }
}

impl TryFrom<String> for PathwayId {
    type Error = KiraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PathwayId> for String {
    fn from(value: PathwayId) -> Self {
        value.0
    }
}

/// Enzyme Commission number. `None` levels are wildcards (`-`).
///
/// Ordering is hierarchical and numeric per level, so `1.2.3.4 < 1.2.3.10`.
/// A wildcard sorts before every number on the same level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EcNumber {
    levels: [Option<u16>; 4],
}

impl EcNumber {
    pub const WILDCARD: &'static str = "-";

    pub fn levels(&self) -> [Option<u16>; 4] {
        self.levels
    }

    pub fn has_wildcard(&self) -> bool {
        self.levels.iter().any(Option::is_none)
    }

    /// Whether `other` is inside the set this number spans through its wildcards.
    pub fn contains(&self, other: &EcNumber) -> bool {
        self.levels
            .iter()
            .zip(other.levels.iter())
            .all(|(mine, theirs)| mine.is_none() || mine == theirs)
    }

    /// Consecutive matching levels, starting with the first.
    pub fn matching_levels(&self, other: &EcNumber, wildcard_matches_number: bool) -> usize {
        self.levels
            .iter()
            .zip(other.levels.iter())
            .take_while(|(mine, theirs)| {
                if wildcard_matches_number {
                    mine.is_none() || theirs.is_none() || mine == theirs
                } else {
                    mine == theirs
                }
            })
            .count()
    }
}

impl Ord for EcNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.levels.cmp(&other.levels)
    }
}

impl PartialOrd for EcNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EcNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .levels
            .iter()
            .map(|level| match level {
                Some(value) => value.to_string(),
                None => Self::WILDCARD.to_string(),
            })
            .collect::<Vec<_>>();
        write!(f, "{}", parts.join("."))
    }
}

impl FromStr for EcNumber {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || KiraError::InvalidEcNumber(value.to_string());
        let normalized = value.trim();
        let normalized = normalized.strip_prefix("ec:").unwrap_or(normalized);
        let parts = normalized.split('.').collect::<Vec<_>>();
        if parts.len() != 4 {
            return Err(invalid());
        }

        // digits allowed per level: class 1-7, then 2, 2 and 3 digits
        const MAX_DIGITS: [usize; 4] = [1, 2, 2, 3];
        let mut levels = [None; 4];
        let mut seen_wildcard = false;
        for (index, part) in parts.iter().enumerate() {
            if *part == Self::WILDCARD {
                if index == 0 {
                    return Err(invalid());
                }
                seen_wildcard = true;
                continue;
            }
            if seen_wildcard
                || part.is_empty()
                || part.len() > MAX_DIGITS[index]
                || part.starts_with('0')
                || !part.chars().all(|ch| ch.is_ascii_digit())
            {
                return Err(invalid());
            }
            let number = part.parse::<u16>().map_err(|_| invalid())?;
            if index == 0 && !(1..=7).contains(&number) {
                return Err(invalid());
            }
            levels[index] = Some(number);
        }
        Ok(Self { levels })
    }
}

impl TryFrom<String> for EcNumber {
    type Error = KiraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EcNumber> for String {
    fn from(value: EcNumber) -> Self {
        value.to_string()
    }
}

/// Sorts EC number strings in natural order. Invalid entries are rejected.
pub fn sort_ec_numbers<S: AsRef<str>>(values: &[S]) -> Result<Vec<EcNumber>, KiraError> {
    let mut parsed = values
        .iter()
        .map(|value| value.as_ref().parse::<EcNumber>())
        .collect::<Result<Vec<_>, _>>()?;
    parsed.sort();
    Ok(parsed)
}

/// Non-empty set of EC numbers identifying an enzyme group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<EcNumber>", into = "Vec<EcNumber>")]
pub struct EcSet(BTreeSet<EcNumber>);

impl EcSet {
    pub fn new(numbers: impl IntoIterator<Item = EcNumber>) -> Option<Self> {
        let set = numbers.into_iter().collect::<BTreeSet<_>>();
        (!set.is_empty()).then_some(Self(set))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EcNumber> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&EcNumber> {
        self.0.first()
    }

    pub fn contains(&self, number: &EcNumber) -> bool {
        self.0.contains(number)
    }

    pub fn is_multifunctional(&self) -> bool {
        self.0.len() > 1
    }
}

impl fmt::Display for EcSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self.0.iter().map(ToString::to_string).collect::<Vec<_>>();
        write!(f, "{}", parts.join(", "))
    }
}

impl TryFrom<Vec<EcNumber>> for EcSet {
    type Error = KiraError;

    fn try_from(value: Vec<EcNumber>) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| KiraError::InvalidEcNumber("empty EC set".to_string()))
    }
}

impl From<EcSet> for Vec<EcNumber> {
    fn from(value: EcSet) -> Self {
        value.0.into_iter().collect()
    }
}

/// Named collection of organisms, e.g. a clade resolved through taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganismGroup {
    pub name: String,
    organisms: Vec<OrganismCode>,
}

impl OrganismGroup {
    /// Keeps first-seen order and drops duplicates.
    pub fn new(name: impl Into<String>, organisms: impl IntoIterator<Item = OrganismCode>) -> Self {
        let mut seen = BTreeSet::new();
        let organisms = organisms
            .into_iter()
            .filter(|code| seen.insert(code.clone()))
            .collect();
        Self {
            name: name.into(),
            organisms,
        }
    }

    pub fn organisms(&self) -> &[OrganismCode] {
        &self.organisms
    }

    pub fn len(&self) -> usize {
        self.organisms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.organisms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn ec_numbers_sort_naturally() {
        let sorted = sort_ec_numbers(&["2.1.1.1", "1.2.3.4", "1.2.3.10"]).unwrap();
        let rendered = sorted.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(rendered, vec!["1.2.3.4", "1.2.3.10", "2.1.1.1"]);
    }

    #[test]
    fn ec_wildcard_rules() {
        let partial: EcNumber = "1.2.3.-".parse().unwrap();
        assert!(partial.has_wildcard());
        assert!(partial.contains(&"1.2.3.99".parse().unwrap()));
        assert!(!partial.contains(&"1.2.4.1".parse().unwrap()));

        assert_matches!("1.-.3.4".parse::<EcNumber>(), Err(KiraError::InvalidEcNumber(_)));
        assert_matches!("8.1.1.1".parse::<EcNumber>(), Err(KiraError::InvalidEcNumber(_)));
        assert_matches!("1.1.1.n2".parse::<EcNumber>(), Err(KiraError::InvalidEcNumber(_)));
    }

    #[test]
    fn wildcard_sorts_first_on_its_level() {
        let wildcard: EcNumber = "1.2.3.-".parse().unwrap();
        let number: EcNumber = "1.2.3.1".parse().unwrap();
        assert!(wildcard < number);
    }

    #[test]
    fn matching_levels() {
        let a: EcNumber = "1.2.3.4".parse().unwrap();
        let b: EcNumber = "1.2.6.7".parse().unwrap();
        let w: EcNumber = "1.2.3.-".parse().unwrap();
        assert_eq!(a.matching_levels(&b, true), 2);
        assert_eq!(a.matching_levels(&w, true), 4);
        assert_eq!(a.matching_levels(&w, false), 3);
    }

    #[test]
    fn compound_rejects_drugs() {
        assert_matches!("D08603".parse::<CompoundId>(), Err(KiraError::DrugId(_)));
        let compound: CompoundId = "cpd:C00022".parse().unwrap();
        assert_eq!(compound.as_str(), "C00022");
    }

    #[test]
    fn gene_id_roundtrip() {
        let gene: GeneId = "eco:b0004".parse().unwrap();
        assert_eq!(gene.organism().as_str(), "eco");
        assert_eq!(gene.name(), "b0004");
        assert_eq!(gene.to_string(), "eco:b0004");
        assert_matches!("ECO:b0004".parse::<GeneId>(), Err(KiraError::InvalidGeneId(_)));
    }

    #[test]
    fn pathway_id_accepts_prefixes() {
        let plain: PathwayId = "00260".parse().unwrap();
        let prefixed: PathwayId = "path:eco00260".parse().unwrap();
        assert_eq!(plain, prefixed);
    }

    #[test]
    fn group_deduplicates_in_order() {
        let codes = ["eco", "ecj", "eco"]
            .iter()
            .map(|code| code.parse::<OrganismCode>().unwrap());
        let group = OrganismGroup::new("Escherichia", codes);
        let names = group
            .organisms()
            .iter()
            .map(OrganismCode::as_str)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["eco", "ecj"]);
    }
}
