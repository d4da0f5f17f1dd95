use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::selection::SelectionConfig;
use crate::services::image::ImageConfig;
use crate::services::llm::LlmConfig;
use crate::services::workflow::PipelineConfig;

pub const CONFIG_PATH_ENV: &str = "STORYSMOOSH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Take the selection from `story` instead of prompting for it.
    #[serde(default)]
    pub unattended: bool,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub story: Option<SelectionConfig>,
}

impl Config {
    pub fn path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    /// Reads the config at `path`; a missing file means all defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("{} not found, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }
}
