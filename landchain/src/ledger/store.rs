// Copyright (c) 2024 Botho Foundation

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::log::PersistedTransaction;
use super::{snapshot, ChainStats, LedgerError, RebuildReport};
use crate::block::{Action, Block, BlockData, LandRecordTransaction, Signature};
use crate::config::LedgerConfig;
use crate::hashing::now_timestamp;
use crate::metrics::{LedgerObserver, NoopObserver};
use crate::miner::{self, MinedBlock, MiningStats};
use crate::validation::{self, ValidationFailure, ValidationResult};

/// In-memory land-record chain.
///
/// Writers (append, signature, rebuild, import, reset) are serialized on an
/// upgradable read guard and only take the exclusive lock to publish their
/// result, so readers keep seeing the previous chain while a block is mined.
pub struct Ledger {
    chain: RwLock<Vec<Block>>,
    config: LedgerConfig,
    observer: Arc<dyn LedgerObserver>,
}

impl Ledger {
    /// Create a ledger holding only the mined genesis block
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        Self::with_observer(config, Arc::new(NoopObserver))
    }

    /// Create a ledger that reports to `observer`
    pub fn with_observer(
        config: LedgerConfig,
        observer: Arc<dyn LedgerObserver>,
    ) -> Result<Self, LedgerError> {
        let genesis = mine_genesis(config.difficulty)?;
        info!(
            difficulty = config.difficulty,
            hash = %genesis.block.hash,
            "Initializing ledger with genesis block"
        );
        observer.block_mined(0, &genesis.stats);

        Ok(Self {
            chain: RwLock::new(vec![genesis.block]),
            config,
            observer,
        })
    }

    pub fn difficulty(&self) -> usize {
        self.config.difficulty
    }

    /// The chain tip
    pub fn latest_block(&self) -> Result<Block, LedgerError> {
        self.chain.read().last().cloned().ok_or_else(empty_chain)
    }

    pub fn len(&self) -> usize {
        self.chain.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.read().is_empty()
    }

    /// Point-in-time copy of the whole chain
    pub fn chain(&self) -> Vec<Block> {
        self.chain.read().clone()
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<Block> {
        self.chain.read().iter().find(|b| b.hash == hash).cloned()
    }

    /// Mine `transaction` onto the tip, signed by its initiating admin.
    pub fn append_transaction(
        &self,
        transaction: LandRecordTransaction,
    ) -> Result<Block, LedgerError> {
        self.mint(transaction, Vec::new(), None)
    }

    /// Like [`append_transaction`](Self::append_transaction), but gives up
    /// once `cancel` is set. The chain is unchanged on cancellation.
    pub fn append_transaction_cancellable(
        &self,
        transaction: LandRecordTransaction,
        cancel: &AtomicBool,
    ) -> Result<Block, LedgerError> {
        self.mint(transaction, Vec::new(), Some(cancel))
    }

    /// Mine `transaction` carrying the initiator signature followed by
    /// `signatures`. Used to mint the finalizing block of an approval.
    ///
    /// The initiator signature is left out when the initiating admin is
    /// already among `signatures`.
    pub fn append_with_signatures(
        &self,
        transaction: LandRecordTransaction,
        signatures: Vec<Signature>,
    ) -> Result<Block, LedgerError> {
        self.mint(transaction, signatures, None)
    }

    fn mint(
        &self,
        transaction: LandRecordTransaction,
        signatures: Vec<Signature>,
        cancel: Option<&AtomicBool>,
    ) -> Result<Block, LedgerError> {
        let guard = self.chain.upgradable_read();
        let (index, previous_hash) = tip_of(&guard)?;

        let record_id = transaction.record_id.clone();
        let action = transaction.action();
        // Block data is untagged, so signing the bare transaction is
        // equivalent to signing the block payload
        let initiator = if signatures.iter().any(|s| s.admin_id == transaction.admin_id) {
            None
        } else {
            Some(Signature::sign(
                &transaction.admin_id,
                &transaction.admin_name,
                action,
                &transaction,
            )?)
        };

        let block = Block::new(
            index,
            now_timestamp(),
            BlockData::Transaction(transaction),
            previous_hash,
        )?;
        let MinedBlock { mut block, stats } = match cancel {
            Some(flag) => miner::mine_cancellable(block, self.config.difficulty, flag)?,
            None => miner::mine(block, self.config.difficulty)?,
        };

        for signature in initiator.into_iter().chain(signatures) {
            block.push_signature(signature)?;
        }

        let mut chain = RwLockUpgradableReadGuard::upgrade(guard);
        chain.push(block.clone());
        drop(chain);

        info!(
            index = block.index,
            hash = %block.hash,
            record_id = %record_id,
            action = %action,
            nonce = block.nonce,
            signatures = block.admin_signatures.len(),
            "Block appended"
        );
        self.observer.block_mined(block.index, &stats);
        for _ in &block.admin_signatures {
            self.observer.signature_added(block.index);
        }

        Ok(block)
    }

    /// Attach a signature to an existing block. The block is not re-mined.
    pub fn add_signature_to_block(
        &self,
        block_hash: &str,
        admin_id: &str,
        admin_name: &str,
        action: Action,
    ) -> Result<Signature, LedgerError> {
        let mut chain = self.chain.write();
        let block = chain
            .iter_mut()
            .find(|b| b.hash == block_hash)
            .ok_or_else(|| LedgerError::BlockNotFound(block_hash.to_string()))?;

        if block.has_signer(admin_id) {
            return Err(LedgerError::DuplicateSigner {
                admin_id: admin_id.to_string(),
                block_hash: block_hash.to_string(),
            });
        }

        let signature = Signature::sign(admin_id, admin_name, action, &block.data)?;
        block.push_signature(signature.clone())?;
        let index = block.index;
        drop(chain);

        debug!(index, admin_id, action = %action, "Signature added");
        self.observer.signature_added(index);
        Ok(signature)
    }

    /// Validate the current chain, reporting failures to the observer
    pub fn validate(&self) -> ValidationResult {
        let result = validation::validate(&self.chain.read(), self.config.difficulty);
        self.report(&result);
        result
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    fn report(&self, result: &ValidationResult) {
        for failure in &result.failures {
            self.observer.validation_failed(failure);
        }
    }

    /// Replace the chain with a replay of `log`.
    ///
    /// Entries are replayed in ascending timestamp order (ties broken by
    /// their recorded block index) onto a fresh genesis block. The rebuilt
    /// chain is published only once it has been mined and validated.
    pub fn rebuild_from_log(
        &self,
        log: &[PersistedTransaction],
    ) -> Result<RebuildReport, LedgerError> {
        let start = Instant::now();
        let difficulty = self.config.difficulty;

        let mut ordered = log
            .iter()
            .map(|record| record.instant().map(|instant| (instant, record)))
            .collect::<Result<Vec<_>, LedgerError>>()?;
        ordered.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.block_index.cmp(&b.1.block_index)));

        let guard = self.chain.upgradable_read();

        let genesis = mine_genesis(difficulty)?;
        // (index, mining stats, signatures attached)
        let mut mined: Vec<(u64, MiningStats, usize)> = vec![(0, genesis.stats, 0)];
        let mut tip_hash = genesis.block.hash.clone();
        let mut scratch = Vec::with_capacity(ordered.len() + 1);
        scratch.push(genesis.block);
        let mut drifted = 0;

        for (index, (_, record)) in (1u64..).zip(ordered) {
            let block = Block::new(
                index,
                record.timestamp.clone(),
                BlockData::Transaction(record.transaction_data.clone()),
                tip_hash,
            )?;
            let MinedBlock { mut block, stats } = miner::mine(block, difficulty)?;
            for signature in &record.signatures {
                block.push_signature(signature.clone().into())?;
            }

            if block.hash != record.block_hash {
                drifted += 1;
                warn!(
                    index,
                    recorded_index = record.block_index,
                    recorded = %record.block_hash,
                    rebuilt = %block.hash,
                    "Rebuilt block hash differs from the log"
                );
            }

            tip_hash = block.hash.clone();
            mined.push((index, stats, block.admin_signatures.len()));
            scratch.push(block);
        }

        let result = validation::validate(&scratch, difficulty);
        if !result.is_ok() {
            self.report(&result);
            return Err(LedgerError::ChainCorruption(result));
        }

        let blocks = scratch.len();
        *RwLockUpgradableReadGuard::upgrade(guard) = scratch;

        let report = RebuildReport {
            blocks,
            drifted,
            elapsed: start.elapsed(),
        };
        for (index, stats, signatures) in &mined {
            self.observer.block_mined(*index, stats);
            for _ in 0..*signatures {
                self.observer.signature_added(*index);
            }
        }
        self.observer.chain_rebuilt(blocks, report.elapsed);
        info!(
            blocks,
            drifted,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Chain rebuilt from transaction log"
        );

        Ok(report)
    }

    /// Drop every block but a fresh genesis
    pub fn reset(&self) -> Result<(), LedgerError> {
        let guard = self.chain.upgradable_read();
        let genesis = mine_genesis(self.config.difficulty)?;
        *RwLockUpgradableReadGuard::upgrade(guard) = vec![genesis.block];

        info!("Ledger reset to genesis");
        self.observer.chain_height(0);
        Ok(())
    }

    /// The chain as pretty JSON
    pub fn export_chain(&self) -> Result<String, LedgerError> {
        snapshot::export_chain(&self.chain.read())
    }

    /// Replace the chain with one parsed from `json`, if it validates and
    /// no block carries two signatures from the same admin.
    ///
    /// On any error the current chain is kept.
    pub fn import_chain(&self, json: &str) -> Result<(), LedgerError> {
        let imported = snapshot::parse_chain(json)?;

        if let Some((block, admin_id)) = imported
            .iter()
            .find_map(|b| b.duplicate_signer().map(|admin_id| (b, admin_id)))
        {
            warn!(index = block.index, admin_id, "Imported block has a repeated signer");
            return Err(LedgerError::DuplicateSigner {
                admin_id: admin_id.to_string(),
                block_hash: block.hash.clone(),
            });
        }

        let guard = self.chain.upgradable_read();
        let result = validation::validate(&imported, self.config.difficulty);
        if !result.is_ok() {
            self.report(&result);
            return Err(LedgerError::ChainCorruption(result));
        }

        let height = imported.len().saturating_sub(1) as u64;
        *RwLockUpgradableReadGuard::upgrade(guard) = imported;

        info!(blocks = height + 1, "Chain imported");
        self.observer.chain_height(height);
        Ok(())
    }

    /// Blocks whose transaction concerns `record_id`, in chain order
    pub fn record_history(&self, record_id: &str) -> Vec<Block> {
        self.chain
            .read()
            .iter()
            .filter(|b| b.record_id() == Some(record_id))
            .cloned()
            .collect()
    }

    /// Blocks signed by `admin_id`, in chain order
    pub fn blocks_by_signer(&self, admin_id: &str) -> Vec<Block> {
        self.chain
            .read()
            .iter()
            .filter(|b| b.has_signer(admin_id))
            .cloned()
            .collect()
    }

    /// Whether the block carries at least `required` approve signatures.
    /// False for an unknown block.
    pub fn has_required_approvals(&self, block_hash: &str, required: usize) -> bool {
        self.chain
            .read()
            .iter()
            .find(|b| b.hash == block_hash)
            .is_some_and(|b| b.approval_count() >= required)
    }

    pub fn stats(&self) -> ChainStats {
        let chain = self.chain.read();
        let difficulty = self.config.difficulty;

        let total_blocks = chain.len();
        let total_nonce: u64 = chain.iter().map(|b| b.nonce).sum();
        let average_nonce = if total_blocks > 0 {
            total_nonce as f64 / total_blocks as f64
        } else {
            0.0
        };

        ChainStats {
            total_blocks,
            difficulty,
            total_nonce,
            average_nonce,
            all_valid: validation::is_valid(&chain, difficulty),
            genesis_hash: chain.first().map(|b| b.hash.clone()).unwrap_or_default(),
            latest_hash: chain.last().map(|b| b.hash.clone()).unwrap_or_default(),
            total_signatures: chain.iter().map(|b| b.admin_signatures.len()).sum(),
        }
    }

    /// Persistable records for every non-genesis block
    pub fn persisted_log(&self) -> Vec<PersistedTransaction> {
        let difficulty = self.config.difficulty;
        self.chain
            .read()
            .iter()
            .filter_map(|b| PersistedTransaction::from_block(b, difficulty))
            .collect()
    }
}

fn mine_genesis(difficulty: usize) -> Result<MinedBlock, LedgerError> {
    miner::mine(Block::genesis()?, difficulty)
}

fn empty_chain() -> LedgerError {
    LedgerError::ChainCorruption(ValidationResult {
        failures: vec![ValidationFailure::EmptyChain],
    })
}

/// Index and previous hash for the next block
fn tip_of(chain: &[Block]) -> Result<(u64, String), LedgerError> {
    chain
        .last()
        .map(|tip| (tip.index + 1, tip.hash.clone()))
        .ok_or_else(empty_chain)
}
