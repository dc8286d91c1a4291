// Copyright (c) 2024 Botho Foundation

//! Persisted transaction log records.
//!
//! The embedding application stores one record per mined block in its
//! relational store and hands the full log back for
//! [`Ledger::rebuild_from_log`](super::Ledger::rebuild_from_log).

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::LedgerError;
use crate::block::{Action, Block, LandRecordTransaction, Signature};

/// One persisted block, as stored by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTransaction {
    pub block_index: u64,
    pub block_hash: String,
    pub previous_hash: String,
    pub transaction_data: LandRecordTransaction,
    /// Block timestamp (ISO-8601)
    pub timestamp: String,
    pub nonce: u64,
    pub difficulty: usize,
    #[serde(default)]
    pub signatures: Vec<PersistedSignature>,
}

impl PersistedTransaction {
    /// Record for a mined block. `None` for genesis, which is never persisted.
    pub fn from_block(block: &Block, difficulty: usize) -> Option<Self> {
        let transaction = block.transaction()?;
        Some(Self {
            block_index: block.index,
            block_hash: block.hash.clone(),
            previous_hash: block.previous_hash.clone(),
            transaction_data: transaction.clone(),
            timestamp: block.timestamp.clone(),
            nonce: block.nonce,
            difficulty,
            signatures: block
                .admin_signatures
                .iter()
                .map(PersistedSignature::from)
                .collect(),
        })
    }

    /// The block timestamp as an instant, for ordering.
    pub fn instant(&self) -> Result<DateTime<FixedOffset>, LedgerError> {
        DateTime::parse_from_rfc3339(&self.timestamp).map_err(|e| {
            LedgerError::Encoding(format!(
                "block {} timestamp {:?}: {}",
                self.block_index, self.timestamp, e
            ))
        })
    }
}

/// One persisted admin signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSignature {
    pub admin_id: String,
    pub admin_name: String,
    pub signature_hash: String,
    pub action_type: Action,
    pub signed_at: String,
}

impl From<&Signature> for PersistedSignature {
    fn from(signature: &Signature) -> Self {
        Self {
            admin_id: signature.admin_id.clone(),
            admin_name: signature.admin_name.clone(),
            signature_hash: signature.signature.clone(),
            action_type: signature.action,
            signed_at: signature.timestamp.clone(),
        }
    }
}

impl From<PersistedSignature> for Signature {
    fn from(persisted: PersistedSignature) -> Self {
        Self {
            admin_id: persisted.admin_id,
            admin_name: persisted.admin_name,
            action: persisted.action_type,
            signature: persisted.signature_hash,
            timestamp: persisted.signed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{create_genesis_block, BlockData, RecordSnapshot};

    #[test]
    fn test_from_block_skips_genesis() {
        let genesis = create_genesis_block(0).unwrap();
        assert!(PersistedTransaction::from_block(&genesis, 0).is_none());
    }

    #[test]
    fn test_from_block_copies_fields() {
        let tx = LandRecordTransaction::approve("LR-3", RecordSnapshot::new(), "a1", "Alice");
        let data = BlockData::Transaction(tx.clone());
        let mut block = Block::new(4, "2025-05-05T05:05:05.005Z", data, "00aa").unwrap();
        block
            .push_signature(Signature::sign("a1", "Alice", Action::Approve, &block.data).unwrap())
            .unwrap();

        let record = PersistedTransaction::from_block(&block, 2).unwrap();
        assert_eq!(record.block_index, 4);
        assert_eq!(record.block_hash, block.hash);
        assert_eq!(record.previous_hash, "00aa");
        assert_eq!(record.transaction_data, tx);
        assert_eq!(record.difficulty, 2);
        assert_eq!(record.signatures.len(), 1);
        assert_eq!(record.signatures[0].action_type, Action::Approve);

        let restored: Signature = record.signatures[0].clone().into();
        assert_eq!(restored, block.admin_signatures[0]);
    }

    #[test]
    fn test_persisted_layout_is_snake_case() {
        let tx = LandRecordTransaction::create(
            serde_json::json!({"land_id": "LR-1"}).as_object().unwrap().clone(),
            "a1",
            "Alice",
        )
        .unwrap();
        let data = BlockData::Transaction(tx);
        let block = Block::new(1, "2025-01-02T00:00:00.000Z", data, "00").unwrap();
        let persisted = PersistedTransaction::from_block(&block, 2).unwrap();
        let value = serde_json::to_value(persisted).unwrap();
        for key in [
            "block_index",
            "block_hash",
            "previous_hash",
            "transaction_data",
            "timestamp",
            "nonce",
            "difficulty",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_instant_rejects_garbage() {
        let tx = LandRecordTransaction::approve("LR-3", RecordSnapshot::new(), "a1", "Alice");
        let block = Block::new(1, "yesterday", BlockData::Transaction(tx), "00").unwrap();
        let record = PersistedTransaction::from_block(&block, 0).unwrap();
        assert!(matches!(record.instant(), Err(LedgerError::Encoding(_))));
    }
}
