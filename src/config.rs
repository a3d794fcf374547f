//! Configuration management for noobcash

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Difficulty counts leading zero bits of a 256-bit block hash.
pub const MAX_DIFFICULTY: u32 = 255;

#[derive(Debug, Default, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub chain: ChainConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct MinerConfig {
    /// Leading zero bits required of a block hash
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    #[serde(default = "default_mining_enabled")]
    pub enabled: bool,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            enabled: default_mining_enabled(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Pending transactions per block; the pool is "full" at this size
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_difficulty() -> u32 {
    16
}

fn default_mining_enabled() -> bool {
    true
}

fn default_capacity() -> usize {
    5
}

impl Config {
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.miner.difficulty > MAX_DIFFICULTY {
            return Err(ChainError::ConfigError(format!(
                "miner.difficulty must be at most {}, got {}",
                MAX_DIFFICULTY, self.miner.difficulty
            )));
        }
        if self.chain.capacity == 0 {
            return Err(ChainError::ConfigError(
                "chain.capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    let config: Config = if path.exists() {
        toml::from_str(&fs::read_to_string(path)?)?
    } else {
        Config::default()
    };

    config.validate()?;
    Ok(config)
}
