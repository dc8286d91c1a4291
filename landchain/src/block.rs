// Copyright (c) 2024 Botho Foundation

//! Block, signature and transaction types for the land-record chain.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::hashing::{canonical_json, hash_block, now_timestamp, signature_hash};
use crate::ledger::LedgerError;
use crate::miner;

/// Fixed genesis timestamp. The unmined genesis hash must not depend on
/// the wall clock.
pub const GENESIS_TIMESTAMP: &str = "2025-01-01T00:00:00.000Z";

/// Genesis payload message.
pub const GENESIS_MESSAGE: &str = "Land Records Blockchain Genesis Block";

/// Genesis payload system tag.
pub const GENESIS_SYSTEM: &str = "Land Management System v1.0";

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// A snapshot of a land record as handed over by the record store.
pub type RecordSnapshot = Map<String, Value>;

/// Lifecycle action carried by a transaction or a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Approve,
    Reject,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The change a transaction applies, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RecordChange {
    #[serde(rename_all = "camelCase")]
    Create { new_data: RecordSnapshot },

    #[serde(rename_all = "camelCase")]
    Update {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_data: Option<RecordSnapshot>,
        new_data: RecordSnapshot,
    },

    #[serde(rename_all = "camelCase")]
    Approve { new_data: RecordSnapshot },

    #[serde(rename_all = "camelCase")]
    Reject { new_data: RecordSnapshot },
}

impl RecordChange {
    pub fn action(&self) -> Action {
        match self {
            Self::Create { .. } => Action::Create,
            Self::Update { .. } => Action::Update,
            Self::Approve { .. } => Action::Approve,
            Self::Reject { .. } => Action::Reject,
        }
    }

    pub fn new_data(&self) -> &RecordSnapshot {
        match self {
            Self::Create { new_data }
            | Self::Update { new_data, .. }
            | Self::Approve { new_data }
            | Self::Reject { new_data } => new_data,
        }
    }
}

/// A land-record lifecycle event: the payload of a non-genesis block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandRecordTransaction {
    /// Identifier of the affected land record
    pub record_id: String,

    #[serde(flatten)]
    pub change: RecordChange,

    /// Initiating administrator
    pub admin_id: String,
    pub admin_name: String,

    /// ISO-8601 instant the transaction was built
    pub timestamp: String,
}

impl LandRecordTransaction {
    /// Build a transaction stamped with the current time.
    pub fn new(
        record_id: impl Into<String>,
        change: RecordChange,
        admin_id: impl Into<String>,
        admin_name: impl Into<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            change,
            admin_id: admin_id.into(),
            admin_name: admin_name.into(),
            timestamp: now_timestamp(),
        }
    }

    /// Transaction registering a new record.
    ///
    /// The record id is read from the snapshot's `id` field, falling back
    /// to `land_id`. Returns `None` when neither is a string.
    pub fn create(
        new_data: RecordSnapshot,
        admin_id: impl Into<String>,
        admin_name: impl Into<String>,
    ) -> Option<Self> {
        let record_id = record_id_of(&new_data)?;
        Some(Self::new(
            record_id,
            RecordChange::Create { new_data },
            admin_id,
            admin_name,
        ))
    }

    pub fn update(
        record_id: impl Into<String>,
        previous_data: RecordSnapshot,
        new_data: RecordSnapshot,
        admin_id: impl Into<String>,
        admin_name: impl Into<String>,
    ) -> Self {
        Self::new(
            record_id,
            RecordChange::Update {
                previous_data: Some(previous_data),
                new_data,
            },
            admin_id,
            admin_name,
        )
    }

    pub fn approve(
        record_id: impl Into<String>,
        new_data: RecordSnapshot,
        admin_id: impl Into<String>,
        admin_name: impl Into<String>,
    ) -> Self {
        Self::new(record_id, RecordChange::Approve { new_data }, admin_id, admin_name)
    }

    pub fn reject(
        record_id: impl Into<String>,
        new_data: RecordSnapshot,
        admin_id: impl Into<String>,
        admin_name: impl Into<String>,
    ) -> Self {
        Self::new(record_id, RecordChange::Reject { new_data }, admin_id, admin_name)
    }

    /// Replace the timestamp, e.g. with the instant recorded by the store.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn action(&self) -> Action {
        self.change.action()
    }
}

/// Record id of a snapshot: its `id`, or else its `land_id`.
pub fn record_id_of(snapshot: &RecordSnapshot) -> Option<String> {
    ["id", "land_id"]
        .iter()
        .find_map(|key| snapshot.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
}

/// Fixed payload of the genesis block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisData {
    pub message: String,
    pub system: String,
    pub timestamp: String,
}

impl Default for GenesisData {
    fn default() -> Self {
        Self {
            message: GENESIS_MESSAGE.to_string(),
            system: GENESIS_SYSTEM.to_string(),
            timestamp: GENESIS_TIMESTAMP.to_string(),
        }
    }
}

/// Payload carried by a block.
///
/// Untagged, so a block's `data` serializes as the bare genesis or
/// transaction object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockData {
    Genesis(GenesisData),
    Transaction(LandRecordTransaction),
}

impl BlockData {
    pub fn transaction(&self) -> Option<&LandRecordTransaction> {
        match self {
            Self::Transaction(tx) => Some(tx),
            Self::Genesis(_) => None,
        }
    }
}

/// An administrator's signature over a block payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub admin_id: String,
    pub admin_name: String,
    pub action: Action,
    /// SHA-256 over (admin_id, admin_name, action, canonical payload)
    pub signature: String,
    /// ISO-8601 instant of signing
    pub timestamp: String,
}

impl Signature {
    /// Sign `payload` now.
    pub fn sign<T: Serialize + ?Sized>(
        admin_id: &str,
        admin_name: &str,
        action: Action,
        payload: &T,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            admin_id: admin_id.to_string(),
            admin_name: admin_name.to_string(),
            action,
            signature: signature_hash(admin_id, admin_name, action, payload)?,
            timestamp: now_timestamp(),
        })
    }

    /// Check that this signature was computed over `payload`.
    pub fn verify<T: Serialize + ?Sized>(&self, payload: &T) -> Result<bool, LedgerError> {
        let expected = signature_hash(&self.admin_id, &self.admin_name, self.action, payload)?;
        Ok(expected == self.signature)
    }
}

/// One entry of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Position in the chain, genesis = 0
    pub index: u64,

    /// ISO-8601 instant the payload was built
    pub timestamp: String,

    pub data: BlockData,

    /// Hash of the tip when this block was built ("0" for genesis)
    pub previous_hash: String,

    /// SHA-256 hex over (index, timestamp, data, previous_hash, nonce)
    pub hash: String,

    /// PoW nonce
    pub nonce: u64,

    /// Signatures in append order. Not covered by `hash`.
    #[serde(default)]
    pub admin_signatures: Vec<Signature>,
}

impl Block {
    /// Build a block at nonce 0 with its initial (unmined) hash.
    pub fn new(
        index: u64,
        timestamp: impl Into<String>,
        data: BlockData,
        previous_hash: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        let mut block = Self {
            index,
            timestamp: timestamp.into(),
            data,
            previous_hash: previous_hash.into(),
            hash: String::new(),
            nonce: 0,
            admin_signatures: Vec::new(),
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    /// The unmined genesis block. Identical on every run.
    pub fn genesis() -> Result<Self, LedgerError> {
        Self::new(
            0,
            GENESIS_TIMESTAMP,
            BlockData::Genesis(GenesisData::default()),
            GENESIS_PREVIOUS_HASH,
        )
    }

    /// Recompute the hash from the block's own fields.
    pub fn compute_hash(&self) -> Result<String, LedgerError> {
        hash_block(
            self.index,
            &self.timestamp,
            &self.data,
            &self.previous_hash,
            self.nonce,
        )
    }

    /// Canonical form of the payload, as hashed and signed.
    pub fn canonical_data(&self) -> Result<String, LedgerError> {
        canonical_json(&self.data)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    pub fn transaction(&self) -> Option<&LandRecordTransaction> {
        self.data.transaction()
    }

    pub fn record_id(&self) -> Option<&str> {
        self.transaction().map(|tx| tx.record_id.as_str())
    }

    pub fn has_signer(&self, admin_id: &str) -> bool {
        self.admin_signatures.iter().any(|s| s.admin_id == admin_id)
    }

    /// The first admin that signed this block more than once, if any.
    pub fn duplicate_signer(&self) -> Option<&str> {
        self.admin_signatures
            .iter()
            .enumerate()
            .find(|(i, s)| {
                self.admin_signatures[..*i]
                    .iter()
                    .any(|earlier| earlier.admin_id == s.admin_id)
            })
            .map(|(_, s)| s.admin_id.as_str())
    }

    /// Number of signatures with action `approve`.
    pub fn approval_count(&self) -> usize {
        self.admin_signatures
            .iter()
            .filter(|s| s.action == Action::Approve)
            .count()
    }

    /// Append a signature; one per admin per block.
    pub fn push_signature(&mut self, signature: Signature) -> Result<(), LedgerError> {
        if self.has_signer(&signature.admin_id) {
            return Err(LedgerError::DuplicateSigner {
                admin_id: signature.admin_id,
                block_hash: self.hash.clone(),
            });
        }
        self.admin_signatures.push(signature);
        Ok(())
    }

    /// Signatures whose hash does not match this block's payload.
    pub fn unverified_signatures(&self) -> Result<Vec<&Signature>, LedgerError> {
        let mut bad = Vec::new();
        for signature in &self.admin_signatures {
            if !signature.verify(&self.data)? {
                bad.push(signature);
            }
        }
        Ok(bad)
    }
}

/// Build the fixed genesis payload and mine it at `difficulty`.
pub fn create_genesis_block(difficulty: usize) -> Result<Block, LedgerError> {
    let mined = miner::mine(Block::genesis()?, difficulty)?;
    Ok(mined.block)
}
