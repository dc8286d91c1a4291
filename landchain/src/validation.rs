// Copyright (c) 2024 Botho Foundation

//! Whole-chain re-verification.
//!
//! Checks run category by category:
//! - Structure: non-empty, well-formed genesis, contiguous indices
//! - Collisions: no two blocks share a hash
//! - Hashes: every stored hash matches a recomputation from the block's fields
//! - Links: every block points at its predecessor's hash
//! - Proof of work: every hash (genesis included) meets the difficulty
//!
//! Validation stops at the first category with a violation. Within that
//! category every violation is reported.

use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use crate::block::{Block, GENESIS_PREVIOUS_HASH};
use crate::hashing::meets_difficulty;

/// Validation check groups, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    Structure,
    Collision,
    Hash,
    Link,
    ProofOfWork,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Collision => "collision",
            Self::Hash => "hash",
            Self::Link => "link",
            Self::ProofOfWork => "proof_of_work",
        }
    }
}

/// A single chain violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    EmptyChain,
    BadGenesis { index: u64, previous_hash: String },
    IndexGap { position: usize, expected: u64, actual: u64 },
    HashCollision { hash: String, first_index: u64, second_index: u64 },
    HashMismatch { index: u64, stored: String, computed: String },
    Unhashable { index: u64, reason: String },
    BrokenLink { index: u64, expected: String, actual: String },
    InsufficientWork { index: u64, hash: String },
}

impl ValidationFailure {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::EmptyChain | Self::BadGenesis { .. } | Self::IndexGap { .. } => {
                FailureCategory::Structure
            }
            Self::HashCollision { .. } => FailureCategory::Collision,
            Self::HashMismatch { .. } | Self::Unhashable { .. } => FailureCategory::Hash,
            Self::BrokenLink { .. } => FailureCategory::Link,
            Self::InsufficientWork { .. } => FailureCategory::ProofOfWork,
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyChain => write!(f, "Chain is empty"),
            Self::BadGenesis {
                index,
                previous_hash,
            } => write!(
                f,
                "Bad genesis block: index {}, previous hash {:?}",
                index, previous_hash
            ),
            Self::IndexGap {
                position,
                expected,
                actual,
            } => write!(
                f,
                "Block at position {} has index {}, expected {}",
                position, actual, expected
            ),
            Self::HashCollision {
                hash,
                first_index,
                second_index,
            } => write!(
                f,
                "Blocks {} and {} share hash {}",
                first_index, second_index, hash
            ),
            Self::HashMismatch {
                index,
                stored,
                computed,
            } => write!(
                f,
                "Block {} hash mismatch: stored {}, computed {}",
                index, stored, computed
            ),
            Self::Unhashable { index, reason } => {
                write!(f, "Block {} payload cannot be hashed: {}", index, reason)
            }
            Self::BrokenLink {
                index,
                expected,
                actual,
            } => write!(
                f,
                "Block {} previous hash {} does not match {}",
                index, actual, expected
            ),
            Self::InsufficientWork { index, hash } => {
                write!(f, "Block {} not properly mined: {}", index, hash)
            }
        }
    }
}

/// Outcome of [`validate`]. An empty failure list means the chain is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub failures: Vec<ValidationFailure>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// The category that failed, if any.
    pub fn category(&self) -> Option<FailureCategory> {
        self.failures.first().map(ValidationFailure::category)
    }

    pub fn has_collision(&self) -> bool {
        self.category() == Some(FailureCategory::Collision)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.category(), self.failures.first()) {
            (Some(category), Some(first)) => write!(
                f,
                "{} {} failure(s), first: {}",
                self.failures.len(),
                category.as_str(),
                first
            ),
            _ => write!(f, "chain is valid"),
        }
    }
}

/// Validate `chain` against `difficulty`, collecting diagnostics.
pub fn validate(chain: &[Block], difficulty: usize) -> ValidationResult {
    let checks: [fn(&[Block], usize) -> Vec<ValidationFailure>; 5] = [
        check_structure,
        check_collisions,
        check_hashes,
        check_links,
        check_work,
    ];

    for check in checks {
        let failures = check(chain, difficulty);
        if !failures.is_empty() {
            for failure in &failures {
                warn!(category = failure.category().as_str(), "{}", failure);
            }
            return ValidationResult { failures };
        }
    }

    ValidationResult::default()
}

/// True iff `chain` passes every check at `difficulty`.
pub fn is_valid(chain: &[Block], difficulty: usize) -> bool {
    validate(chain, difficulty).is_ok()
}

/// Every pair of distinct blocks sharing a hash.
pub fn find_collisions(chain: &[Block]) -> Vec<ValidationFailure> {
    let mut seen: HashMap<&str, u64> = HashMap::new();
    let mut failures = Vec::new();
    for block in chain {
        match seen.get(block.hash.as_str()) {
            Some(&first_index) => failures.push(ValidationFailure::HashCollision {
                hash: block.hash.clone(),
                first_index,
                second_index: block.index,
            }),
            None => {
                seen.insert(block.hash.as_str(), block.index);
            }
        }
    }
    failures
}

fn check_collisions(chain: &[Block], _difficulty: usize) -> Vec<ValidationFailure> {
    find_collisions(chain)
}

fn check_structure(chain: &[Block], _difficulty: usize) -> Vec<ValidationFailure> {
    let Some(genesis) = chain.first() else {
        return vec![ValidationFailure::EmptyChain];
    };

    let mut failures = Vec::new();
    if genesis.index != 0 || genesis.previous_hash != GENESIS_PREVIOUS_HASH {
        failures.push(ValidationFailure::BadGenesis {
            index: genesis.index,
            previous_hash: genesis.previous_hash.clone(),
        });
    }
    for (position, block) in chain.iter().enumerate().skip(1) {
        let expected = position as u64;
        if block.index != expected {
            failures.push(ValidationFailure::IndexGap {
                position,
                expected,
                actual: block.index,
            });
        }
    }
    failures
}

fn check_hashes(chain: &[Block], _difficulty: usize) -> Vec<ValidationFailure> {
    chain
        .iter()
        .filter_map(|block| match block.compute_hash() {
            Ok(computed) if computed == block.hash => None,
            Ok(computed) => Some(ValidationFailure::HashMismatch {
                index: block.index,
                stored: block.hash.clone(),
                computed,
            }),
            Err(e) => Some(ValidationFailure::Unhashable {
                index: block.index,
                reason: e.to_string(),
            }),
        })
        .collect()
}

fn check_links(chain: &[Block], _difficulty: usize) -> Vec<ValidationFailure> {
    chain
        .windows(2)
        .filter(|pair| pair[1].previous_hash != pair[0].hash)
        .map(|pair| ValidationFailure::BrokenLink {
            index: pair[1].index,
            expected: pair[0].hash.clone(),
            actual: pair[1].previous_hash.clone(),
        })
        .collect()
}

fn check_work(chain: &[Block], difficulty: usize) -> Vec<ValidationFailure> {
    chain
        .iter()
        .filter(|block| !meets_difficulty(&block.hash, difficulty))
        .map(|block| ValidationFailure::InsufficientWork {
            index: block.index,
            hash: block.hash.clone(),
        })
        .collect()
}
