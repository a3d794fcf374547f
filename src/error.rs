//! Error types for noobcash

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Invalid signature for transaction {0}")]
    InvalidSignature(String),

    #[error("Transaction id mismatch: stored {stored}, recomputed {computed}")]
    TxidMismatch { stored: String, computed: String },

    #[error("Input references unknown or spent output {0}")]
    UnknownInput(String),

    #[error("Output {0} is spent more than once by the same transaction")]
    DuplicateInput(String),

    #[error("Input {output} is owned by {owner}, not by the sender")]
    ForeignInput { output: String, owner: String },

    #[error("Output {output} records parent {parent}, expected {txid}")]
    OutputParentMismatch {
        output: String,
        parent: String,
        txid: String,
    },

    #[error("Value mismatch: inputs={inputs}, outputs={outputs}")]
    ValueMismatch { inputs: u64, outputs: u64 },

    #[error("Arithmetic overflow while summing transaction values")]
    ValueOverflow,

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },

    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Miner error: {0}")]
    MinerError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
