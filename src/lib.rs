//! noobcash - transaction validation and mining core of a minimal UTXO node
//!
//! # Architecture
//!
//! ## Ledger
//! - [`transaction`] - Transaction construction, signing, verification and application
//! - [`blockchain`] - UTXO set, exclusive-access ledger, blocks and the pending pool
//!
//! ## Mining
//! - [`miner`] - Cancellable proof-of-work worker and its owner-side handle
//!
//! ## Cryptography
//! - [`crypto`] - SHA-256 and secp256k1 signatures
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Ledger
// ============================================================================
pub mod blockchain;
pub mod transaction;

// ============================================================================
// Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
