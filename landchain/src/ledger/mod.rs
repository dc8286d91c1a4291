// Copyright (c) 2024 Botho Foundation

//! The ledger service: owns the chain and is the only place it changes.

mod log;
mod snapshot;
mod store;

pub use log::{PersistedSignature, PersistedTransaction};
pub use snapshot::{export_chain, parse_chain};
pub use store::Ledger;

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::validation::ValidationResult;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Admin {admin_id} has already signed block {block_hash}")]
    DuplicateSigner { admin_id: String, block_hash: String },

    #[error("Chain corruption: {0}")]
    ChainCorruption(ValidationResult),

    #[error("Mining cancelled at block {index} after {attempts} attempts")]
    MiningCancelled { index: u64, attempts: u64 },

    #[error("Difficulty {0} exceeds the hash length")]
    InvalidDifficulty(usize),
}

/// Summary of the current chain
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    /// Number of blocks, genesis included
    pub total_blocks: usize,

    /// Leading zero hex characters required of every hash
    pub difficulty: usize,

    /// Sum of all block nonces
    pub total_nonce: u64,

    pub average_nonce: f64,

    /// Whether the chain passes full validation
    pub all_valid: bool,

    pub genesis_hash: String,
    pub latest_hash: String,

    /// Signatures across all blocks
    pub total_signatures: usize,
}

/// Outcome of a successful rebuild from the transaction log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    /// Blocks in the rebuilt chain, genesis included
    pub blocks: usize,

    /// Log entries whose recorded hash differs from the rebuilt one
    pub drifted: usize,

    pub elapsed: Duration,
}
