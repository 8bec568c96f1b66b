//! Configuration for structure detection and energy handling.
//!
//! Loaded from JSON, with every section falling back to the built-in defaults.

use crate::{
    cell::Tier,
    template::{Template, TemplateError},
};

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use bevy::{prelude::*, utils::HashMap};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The configuration shipped with the crate
pub const BUILTIN_CONFIG: &str = include_str!("data/multiblock.json");

/// Root configuration
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiblockConfig {
    /// The aggregated transfer limit is the total capacity divided by this. 0 disables the limit
    pub transfer_rate_divisor: u64,
    /// Require tier caps to be the exact kind a template names instead of any tier cap
    pub strict_caps: bool,
    /// How upgrades change the energy used per cycle
    pub upkeep: UpkeepConfig,
    /// Templates that replace the built-in template of a tier, as layers of rows
    pub templates: HashMap<Tier, Vec<Vec<String>>>,
}

impl Default for MultiblockConfig {
    fn default() -> Self {
        Self {
            transfer_rate_divisor: 10,
            strict_caps: false,
            upkeep: UpkeepConfig::default(),
            templates: HashMap::default(),
        }
    }
}

/// How upgrade totems change a structure's energy use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpkeepConfig {
    /// Extra cost per speed level, in percent of the base cost
    pub speed_cost_percent: u32,
    /// Saving per efficiency level, in percent of the cost
    pub efficiency_saving_percent: u32,
}

impl Default for UpkeepConfig {
    fn default() -> Self {
        Self {
            speed_cost_percent: 50,
            efficiency_saving_percent: 20,
        }
    }
}

impl MultiblockConfig {
    /// The built-in configuration
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_CONFIG).unwrap_or_else(|err| {
            warn!("Built-in multiblock config is invalid, using defaults: {}", err);
            Self::default()
        })
    }

    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&contents)?;
        info!("Loaded multiblock config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (tier, layers) in self.templates.iter() {
            Template::parse(layers.as_slice())
                .map_err(|source| ConfigError::Template { tier: *tier, source })?;
        }
        Ok(())
    }
}

/// An error while loading a [MultiblockConfig]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The JSON could not be parsed
    #[error("failed to parse multiblock config: {0}")]
    Parse(#[from] serde_json::Error),
    /// The file could not be read
    #[error("failed to read multiblock config from {path:?}: {source}")]
    Read {
        /// The file that was read
        path: PathBuf,
        /// The underlying error
        #[source]
        source: io::Error,
    },
    /// A template override is invalid
    #[error("invalid template override for tier {tier:?}: {source}")]
    Template {
        /// The tier the override is for
        tier: Tier,
        /// The underlying error
        #[source]
        source: TemplateError,
    },
}

#[test]
fn test_builtin_config_parses() {
    let config = MultiblockConfig::from_json_str(BUILTIN_CONFIG).unwrap();
    assert_eq!(MultiblockConfig::default(), config);
    assert_eq!(config, MultiblockConfig::builtin());
}

#[test]
fn test_missing_sections_use_defaults() {
    let config = MultiblockConfig::from_json_str(r#"{"upkeep": {"speed_cost_percent": 10}}"#)
        .unwrap();
    assert_eq!(10, config.upkeep.speed_cost_percent);
    assert_eq!(20, config.upkeep.efficiency_saving_percent);
    assert_eq!(10, config.transfer_rate_divisor);
    assert!(config.templates.is_empty());
}

#[test]
fn test_template_overrides() {
    let config = MultiblockConfig::from_json_str(
        r#"{"strict_caps": true, "templates": {"II": [["C@C"], ["121"]]}}"#,
    )
    .unwrap();
    assert!(config.strict_caps);
    assert_eq!(vec!["121".to_string()], config.templates[&Tier::II][1]);

    let err = MultiblockConfig::from_json_str(r#"{"templates": {"I": [["CCC"]]}}"#).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Template {
            tier: Tier::I,
            source: TemplateError::MissingOrigin { found: 0 }
        }
    ));

    assert!(matches!(
        MultiblockConfig::from_json_str("{"),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_missing_file() {
    let err = MultiblockConfig::from_file(Path::new("/nonexistent/multiblock.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
