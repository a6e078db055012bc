use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::{GeneId, OrganismCode};
use crate::error::KiraError;

/// Two genes with a sequence-similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPair {
    pub a: GeneId,
    pub b: GeneId,
    pub score: f64,
}

pub trait SimilaritySource: Send + Sync {
    /// Pairs among genes of `organisms`, in both paralogous and orthologous combinations.
    fn similar_pairs(&self, organisms: &[OrganismCode]) -> Result<Vec<SimilarPair>, KiraError>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticSimilarity {
    pairs: Vec<SimilarPair>,
}

impl StaticSimilarity {
    pub fn new(pairs: Vec<SimilarPair>) -> Self {
        Self { pairs }
    }

    /// Reads `gene_a<TAB>gene_b<TAB>score` lines. Blank lines and `#` comments are skipped.
    pub fn from_tsv(path: &Utf8Path) -> Result<Self, KiraError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| KiraError::Similarity(format!("{path}: {err}")))?;
        Self::parse_tsv(&content)
    }

    pub fn parse_tsv(content: &str) -> Result<Self, KiraError> {
        let mut pairs = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let invalid =
                |message: String| KiraError::Similarity(format!("line {}: {message}", index + 1));
            let columns = line.split('\t').collect::<Vec<_>>();
            let [a, b, score] = columns.as_slice() else {
                return Err(invalid(format!("expected 3 columns, found {}", columns.len())));
            };
            let a = a.parse::<GeneId>().map_err(|err| invalid(err.to_string()))?;
            let b = b.parse::<GeneId>().map_err(|err| invalid(err.to_string()))?;
            let score = score
                .trim()
                .parse::<f64>()
                .map_err(|err| invalid(err.to_string()))?;
            pairs.push(SimilarPair { a, b, score });
        }
        Ok(Self { pairs })
    }
}

impl SimilaritySource for StaticSimilarity {
    fn similar_pairs(&self, organisms: &[OrganismCode]) -> Result<Vec<SimilarPair>, KiraError> {
        Ok(self
            .pairs
            .iter()
            .filter(|pair| {
                organisms.contains(pair.a.organism()) && organisms.contains(pair.b.organism())
            })
            .cloned()
            .collect())
    }
}
