//! Configuration file support for costdrill
//!
//! Loads report defaults from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.costdrillrc.json` next to the cost records
//! 3. `costdrill.config.json` next to the cost records
//!
//! All fields are optional. CLI flags take precedence over config file values.

use crate::explorer::{ViewSettings, DEFAULT_TOP_N};
use crate::record::{CurrencyMode, Dimension};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest accepted `top` value
const MAX_TOP_N: usize = 100;

/// costdrill configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostdrillConfig {
    /// Number of ranked series before folding into "Other" (default: 15)
    #[serde(default)]
    pub top: Option<usize>,

    /// Dimension the chart is stacked by (default: category)
    #[serde(default)]
    pub stack_by: Option<Dimension>,

    /// Cost column to report (default: local)
    #[serde(default)]
    pub currency: Option<CurrencyMode>,
}

/// Configuration with defaults filled in
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub top_n: usize,
    pub stack_by: Dimension,
    pub currency: CurrencyMode,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

impl CostdrillConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(top) = self.top {
            if top == 0 {
                anyhow::bail!("top must be at least 1 (got {})", top);
            }
            if top > MAX_TOP_N {
                anyhow::bail!("top must be at most {} (got {})", MAX_TOP_N, top);
            }
        }
        Ok(())
    }

    /// Resolve config into the values the explorer runs with
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let defaults = ViewSettings::default();
        Ok(ResolvedConfig {
            top_n: self.top.unwrap_or(DEFAULT_TOP_N),
            stack_by: self.stack_by.unwrap_or(defaults.stack_by),
            currency: self.currency.unwrap_or(defaults.currency),
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        CostdrillConfig::default().resolve()
    }

    /// Layer CLI flags over the resolved values
    ///
    /// The flags go through the same validation as a config file.
    pub fn with_overrides(self, overrides: &CostdrillConfig) -> Result<ResolvedConfig> {
        overrides
            .validate()
            .context("Invalid command-line option")?;
        Ok(ResolvedConfig {
            top_n: overrides.top.unwrap_or(self.top_n),
            stack_by: overrides.stack_by.unwrap_or(self.stack_by),
            currency: overrides.currency.unwrap_or(self.currency),
            config_path: self.config_path,
        })
    }

    /// View settings for the explorer
    pub fn view_settings(&self) -> ViewSettings {
        ViewSettings {
            stack_by: self.stack_by,
            top_n: self.top_n,
            currency: self.currency,
        }
    }
}

/// Discover and load a config file from the data directory
///
/// Search order:
/// 1. `.costdrillrc.json`
/// 2. `costdrill.config.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(data_dir: &Path) -> Result<Option<(CostdrillConfig, PathBuf)>> {
    for name in [".costdrillrc.json", "costdrill.config.json"] {
        let path = data_dir.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<CostdrillConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: CostdrillConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config for a dataset
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config in `data_dir`.
/// Returns default config if nothing is found.
pub fn load_and_resolve(data_dir: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(data_dir)? {
            Some((config, path)) => (config, Some(path)),
            None => (CostdrillConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}
