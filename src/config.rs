use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compare::{DEFAULT_SUFFIX, MatchPolicy, TypeAliases};
use crate::error::StandoffError;
use crate::resolver::DEFAULT_TAXNAMES_PATH;

pub const DEFAULT_CONFIG_FILE: &str = "tagger-standoff.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub taxnames_path: Option<PathBuf>,
    /// Added to (or replacing entries of) the built-in alias table.
    #[serde(default)]
    pub type_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub shard_prefix_len: Option<usize>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub match_policy: Option<MatchPolicy>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub taxnames_path: PathBuf,
    pub type_aliases: TypeAliases,
    pub shard_prefix_len: Option<usize>,
    pub suffix: String,
    pub match_policy: MatchPolicy,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            taxnames_path: PathBuf::from(DEFAULT_TAXNAMES_PATH),
            type_aliases: TypeAliases::default(),
            shard_prefix_len: None,
            suffix: DEFAULT_SUFFIX.to_string(),
            match_policy: MatchPolicy::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or the default config file if present. A missing default
    /// file yields the built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, StandoffError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            tracing::debug!("no {DEFAULT_CONFIG_FILE}, using defaults");
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| StandoffError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| StandoffError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, StandoffError> {
        let defaults = ResolvedConfig::default();

        let suffix = config.suffix.unwrap_or(defaults.suffix);
        validate_suffix(&suffix)?;
        if config.shard_prefix_len == Some(0) {
            return Err(StandoffError::ConfigParse(
                "shard_prefix_len must be positive".to_string(),
            ));
        }

        let type_aliases = if config.type_aliases.is_empty() {
            defaults.type_aliases
        } else {
            defaults.type_aliases.extended(config.type_aliases)
        };

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(defaults.schema_version),
            taxnames_path: config.taxnames_path.unwrap_or(defaults.taxnames_path),
            type_aliases,
            shard_prefix_len: config.shard_prefix_len,
            suffix,
            match_policy: config.match_policy.unwrap_or(defaults.match_policy),
        })
    }
}

/// File suffixes are compared literally, so they must include the dot.
pub fn validate_suffix(suffix: &str) -> Result<(), StandoffError> {
    if !suffix.starts_with('.') || suffix.len() < 2 {
        return Err(StandoffError::ConfigParse(format!(
            "suffix must look like \".ann\", got {suffix:?}"
        )));
    }
    Ok(())
}
