// Copyright (c) 2024 Botho Foundation

//! Landchain - an append-only signed ledger for land-record lifecycle events.
//!
//! Land-record changes (create, update, approve, reject) are recorded as a
//! hash-linked chain of blocks. Each block is mined to a leading-zero
//! proof-of-work target and may carry any number of administrator
//! signatures. The chain has a single writer and lives in one process. It
//! can be rebuilt deterministically from a persisted transaction log.
//!
//! The crate is a library. Storage, identity and UI belong to the
//! embedding application, which reaches the core through [`ledger::Ledger`]
//! and [`approval::ApprovalCoordinator`].

#![deny(clippy::print_stdout)]

pub mod approval;
pub mod block;
pub mod config;
pub mod hashing;
pub mod ledger;
pub mod metrics;
pub mod miner;
pub mod telemetry;
pub mod validation;

pub use approval::{
    ApprovalCoordinator, ApprovalError, ApprovalRequest, ApprovalStats, ApprovalStatus,
    NewApprovalRequest, SubmitOutcome,
};
pub use block::{Action, Block, BlockData, LandRecordTransaction, RecordChange, Signature};
pub use ledger::{ChainStats, Ledger, LedgerError, PersistedTransaction};
pub use validation::{ValidationFailure, ValidationResult};
