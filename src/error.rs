use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid organism code: {0}")]
    InvalidOrganismCode(String),

    #[error("invalid gene id: {0}")]
    InvalidGeneId(String),

    #[error("invalid compound id: {0}")]
    InvalidCompoundId(String),

    #[error("drug ids are not metabolic compounds: {0}")]
    DrugId(String),

    #[error("invalid reaction id: {0}")]
    InvalidReactionId(String),

    #[error("invalid pathway id: {0}")]
    InvalidPathwayId(String),

    #[error("invalid EC number: {0}")]
    InvalidEcNumber(String),

    #[error("invalid cache namespace: {0}")]
    InvalidNamespace(String),

    #[error("core threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("similarity cutoff must be a finite score >= 0, got {0}")]
    InvalidCutoff(f64),

    #[error("missing config file kira-mn.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("knowledge base request for {resource} failed: {message}")]
    Fetch { resource: String, message: String },

    #[error("knowledge base returned status {status} for {resource}: {message}")]
    FetchStatus {
        resource: String,
        status: u16,
        message: String,
    },

    #[error("cache entry {0} not found")]
    NotFound(String),

    #[error("cache entry {key} is corrupt: {message}")]
    #[diagnostic(help("delete the entry with `kira-mn cache delete` and re-run"))]
    CacheCorruption { key: String, message: String },

    #[error("{0}")]
    PolicyViolation(String),

    #[error("malformed record {record}: {message}")]
    MalformedRecord { record: String, message: String },

    #[error("failed to build graph for organism {organism} at {record}")]
    BuildFailed {
        organism: String,
        record: String,
        #[source]
        source: Box<KiraError>,
    },

    #[error("failed to fuse graphs: graph of organism {organism} could not be obtained")]
    FusionFailed {
        organism: String,
        #[source]
        source: Box<KiraError>,
    },

    #[error("taxonomy lookup failed: {0}")]
    Taxonomy(String),

    #[error("similarity lookup failed: {0}")]
    Similarity(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl KiraError {
    pub fn build_failed(organism: impl Into<String>, record: impl Into<String>, source: Self) -> Self {
        KiraError::BuildFailed {
            organism: organism.into(),
            record: record.into(),
            source: Box::new(source),
        }
    }

    pub fn fusion_failed(organism: impl Into<String>, source: Self) -> Self {
        KiraError::FusionFailed {
            organism: organism.into(),
            source: Box::new(source),
        }
    }

    pub fn malformed(record: impl Into<String>, message: impl Into<String>) -> Self {
        KiraError::MalformedRecord {
            record: record.into(),
            message: message.into(),
        }
    }

    /// Failures of the remote knowledge base, regardless of where they surfaced.
    pub fn is_remote(&self) -> bool {
        match self {
            KiraError::Fetch { .. } | KiraError::FetchStatus { .. } => true,
            KiraError::BuildFailed { source, .. } | KiraError::FusionFailed { source, .. } => {
                source.is_remote()
            }
            _ => false,
        }
    }

    pub fn is_corruption(&self) -> bool {
        match self {
            KiraError::CacheCorruption { .. } => true,
            KiraError::BuildFailed { source, .. } | KiraError::FusionFailed { source, .. } => {
                source.is_corruption()
            }
            _ => false,
        }
    }
}
