// Copyright (c) 2024 Botho Foundation

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::hashing::HASH_HEX_LEN;
use crate::miner::DEFAULT_DIFFICULTY;

/// Main configuration for an embedded ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Leading zero hex characters every block hash must have.
    /// Tests use 0 or 1 for speed.
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
}

fn default_difficulty() -> usize {
    DEFAULT_DIFFICULTY
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
        }
    }
}

impl LedgerConfig {
    pub fn with_difficulty(difficulty: usize) -> Self {
        Self { difficulty }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Distinct admin approvals needed to finalize a request, unless the
    /// request sets its own
    #[serde(default = "default_required_approvals")]
    pub required_approvals: u32,
}

fn default_required_approvals() -> u32 {
    2
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            required_approvals: default_required_approvals(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. "info" or "landchain=debug"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Include event targets in log lines
    #[serde(default)]
    pub with_target: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: false,
        }
    }
}

impl Config {
    /// Load config from a file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    /// Reject values the ledger cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.ledger.difficulty > HASH_HEX_LEN {
            bail!(
                "ledger.difficulty {} exceeds hash length {}",
                self.ledger.difficulty,
                HASH_HEX_LEN
            );
        }
        if self.approval.required_approvals == 0 {
            bail!("approval.required_approvals must be at least 1");
        }
        Ok(())
    }
}
