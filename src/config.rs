use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::builder::BuildOptions;
use crate::domain::{OrganismCode, PathwayId};
use crate::error::KiraError;
use crate::orthology;
use crate::store::CacheConfig;
use crate::taxonomy::StaticTaxonomy;

pub const CONFIG_FILE: &str = "kira-mn.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CacheSection {
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub allow_manual_delete_only: Option<bool>,
    #[serde(default)]
    pub compress: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AnalysisSection {
    #[serde(default)]
    pub core_threshold: Option<f64>,
    #[serde(default)]
    pub similarity_cutoff: Option<f64>,
    #[serde(default)]
    pub pathways: Option<Vec<String>>,
    #[serde(default)]
    pub include_overview_maps: Option<bool>,
    #[serde(default)]
    pub exclude_multifunctional: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    pub core_threshold: f64,
    pub similarity_cutoff: f64,
    pub build: BuildOptions,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            core_threshold: 1.0,
            similarity_cutoff: 0.0,
            build: BuildOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub cache: CacheConfig,
    pub analysis: AnalysisOptions,
    pub groups: BTreeMap<String, Vec<OrganismCode>>,
}

impl ResolvedConfig {
    /// Configuration used when no `kira-mn.json` exists.
    pub fn defaults() -> Result<Self, KiraError> {
        ConfigLoader::resolve_config(Config::default())
    }

    pub fn taxonomy(&self) -> StaticTaxonomy {
        StaticTaxonomy::new(self.groups.clone())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(KiraError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let cache_root = match config.cache.root {
            Some(root) => Utf8PathBuf::from(root),
            None => CacheConfig::default_root()?,
        };
        let mut cache = CacheConfig::new(cache_root);
        if let Some(manual_only) = config.cache.allow_manual_delete_only {
            cache.allow_manual_delete_only = manual_only;
        }
        if let Some(compress) = config.cache.compress {
            cache.compress = compress;
        }

        let defaults = AnalysisOptions::default();
        let core_threshold = config
            .analysis
            .core_threshold
            .unwrap_or(defaults.core_threshold);
        if !(0.0..=1.0).contains(&core_threshold) {
            return Err(KiraError::InvalidThreshold(core_threshold));
        }
        let pathways = config
            .analysis
            .pathways
            .map(|values| {
                values
                    .iter()
                    .map(|value| value.parse::<PathwayId>())
                    .collect::<Result<BTreeSet<_>, KiraError>>()
            })
            .transpose()?;
        let similarity_cutoff = orthology::check_cutoff(
            config
                .analysis
                .similarity_cutoff
                .unwrap_or(defaults.similarity_cutoff),
        )?;
        let analysis = AnalysisOptions {
            core_threshold,
            similarity_cutoff,
            build: BuildOptions {
                pathways,
                include_overview_maps: config.analysis.include_overview_maps.unwrap_or(false),
                exclude_multifunctional: config.analysis.exclude_multifunctional.unwrap_or(false),
            },
        };

        let groups = config
            .groups
            .into_iter()
            .map(|(name, members)| {
                let members = members
                    .iter()
                    .map(|code| code.parse::<OrganismCode>())
                    .collect::<Result<Vec<_>, KiraError>>()?;
                Ok((name, members))
            })
            .collect::<Result<BTreeMap<_, _>, KiraError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            cache,
            analysis,
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config {
            cache: CacheSection {
                root: Some("/tmp/kira-mn-test".to_string()),
                ..CacheSection::default()
            },
            ..Config::default()
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert!(resolved.cache.allow_manual_delete_only);
        assert!(resolved.cache.compress);
        assert_eq!(resolved.analysis, AnalysisOptions::default());
        assert!(resolved.groups.is_empty());
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let config = Config {
            cache: CacheSection {
                root: Some("/tmp/kira-mn-test".to_string()),
                ..CacheSection::default()
            },
            analysis: AnalysisSection {
                core_threshold: Some(1.5),
                ..AnalysisSection::default()
            },
            ..Config::default()
        };
        assert!(matches!(
            ConfigLoader::resolve_config(config),
            Err(KiraError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn negative_similarity_cutoff_is_rejected() {
        let config = Config {
            cache: CacheSection {
                root: Some("/tmp/kira-mn-test".to_string()),
                ..CacheSection::default()
            },
            analysis: AnalysisSection {
                similarity_cutoff: Some(-1.0),
                ..AnalysisSection::default()
            },
            ..Config::default()
        };
        assert!(matches!(
            ConfigLoader::resolve_config(config),
            Err(KiraError::InvalidCutoff(_))
        ));
    }
}
