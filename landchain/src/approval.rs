// Copyright (c) 2024 Botho Foundation

//! Multi-admin approval of proposed land-record transactions.
//!
//! A request moves from `pending` to `approved` once enough distinct
//! admins approve it, or to `rejected` on the first rejection. Both are
//! terminal. Reaching `approved` mints the finalizing block on the ledger,
//! carrying the requester's signature followed by every approval. A
//! requester who also approves signs the block once.
//!
//! The coordinator only reports the outcome. What an approved or rejected
//! request means for the land record is up to the embedding application.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::block::{Action, Block, LandRecordTransaction, Signature};
use crate::config::ApprovalConfig;
use crate::hashing::now_timestamp;
use crate::ledger::{Ledger, LedgerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    #[error("Approval request not found: {0}")]
    RequestNotFound(String),

    #[error("Approval request already exists: {0}")]
    RequestExists(String),

    #[error("Admin {admin_id} has already signed request {request_id}")]
    DuplicateSigner { admin_id: String, request_id: String },

    #[error("Request {request_id} is already {status}")]
    RequestAlreadyFinalized {
        request_id: String,
        status: ApprovalStatus,
    },

    #[error("Action {0} is not an approval decision")]
    InvalidAction(Action),

    #[error("Required approvals must be at least 1, got {0}")]
    InvalidQuorum(u32),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Input to [`ApprovalCoordinator::create_request`]
#[derive(Debug, Clone)]
pub struct NewApprovalRequest {
    pub request_id: String,

    /// The change to record once approved. Its payload is fixed here and
    /// becomes the finalizing block's data unchanged.
    pub transaction: LandRecordTransaction,

    /// Overrides the configured quorum
    pub required_approvals: Option<u32>,
}

impl NewApprovalRequest {
    pub fn new(request_id: impl Into<String>, transaction: LandRecordTransaction) -> Self {
        Self {
            request_id: request_id.into(),
            transaction,
            required_approvals: None,
        }
    }

    pub fn with_required_approvals(mut self, required: u32) -> Self {
        self.required_approvals = Some(required);
        self
    }
}

/// A decision recorded on a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSignature {
    pub signature: Signature,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub transaction: LandRecordTransaction,

    /// Admin who initiated the transaction
    pub requested_by: String,

    pub required_approvals: u32,
    pub current_approvals: u32,
    pub status: ApprovalStatus,

    /// Decisions in submission order
    pub signatures: Vec<RequestSignature>,

    pub rejection_reason: Option<String>,

    /// Hash of the block minted on approval
    pub block_hash: Option<String>,

    pub created_at: String,

    #[serde(skip)]
    sequence: u64,
}

impl ApprovalRequest {
    pub fn has_signer(&self, admin_id: &str) -> bool {
        self.signatures
            .iter()
            .any(|s| s.signature.admin_id == admin_id)
    }
}

/// Request counts by status, from [`ApprovalCoordinator::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStats {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

impl ApprovalStats {
    pub fn total(&self) -> usize {
        self.pending + self.approved + self.rejected
    }
}

/// Result of a successful [`ApprovalCoordinator::submit_signature`]
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub status: ApprovalStatus,

    /// True once the request reached a terminal state
    pub finalized: bool,

    /// The finalizing block, set when this signature completed the quorum
    pub block: Option<Block>,
}

/// Tracks approval requests and mints their finalizing blocks.
pub struct ApprovalCoordinator {
    ledger: Arc<Ledger>,
    requests: Mutex<HashMap<String, ApprovalRequest>>,
    default_required: u32,
    next_sequence: AtomicU64,
}

impl ApprovalCoordinator {
    pub fn new(ledger: Arc<Ledger>, config: &ApprovalConfig) -> Self {
        Self {
            ledger,
            requests: Mutex::new(HashMap::new()),
            default_required: config.required_approvals,
            next_sequence: AtomicU64::new(0),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Open a pending request for `new.transaction`
    pub fn create_request(
        &self,
        new: NewApprovalRequest,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let required = new.required_approvals.unwrap_or(self.default_required);
        if required == 0 {
            return Err(ApprovalError::InvalidQuorum(required));
        }

        let mut requests = self.requests.lock();
        if requests.contains_key(&new.request_id) {
            return Err(ApprovalError::RequestExists(new.request_id));
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let request = ApprovalRequest {
            request_id: new.request_id.clone(),
            requested_by: new.transaction.admin_id.clone(),
            transaction: new.transaction,
            required_approvals: required,
            current_approvals: 0,
            status: ApprovalStatus::Pending,
            signatures: Vec::new(),
            rejection_reason: None,
            block_hash: None,
            created_at: now_timestamp(),
            sequence,
        };

        info!(
            request_id = %request.request_id,
            record_id = %request.transaction.record_id,
            action = %request.transaction.action(),
            required,
            "Approval request created"
        );
        requests.insert(new.request_id, request.clone());
        Ok(request)
    }

    /// Record an admin's decision on a request.
    ///
    /// Any failure leaves the request as it was, including a failure to mint
    /// the finalizing block.
    pub fn submit_signature(
        &self,
        request_id: &str,
        admin_id: &str,
        admin_name: &str,
        action: Action,
        comments: Option<&str>,
    ) -> Result<SubmitOutcome, ApprovalError> {
        let mut requests = self.requests.lock();
        let request = requests
            .get_mut(request_id)
            .ok_or_else(|| ApprovalError::RequestNotFound(request_id.to_string()))?;

        if request.has_signer(admin_id) {
            return Err(ApprovalError::DuplicateSigner {
                admin_id: admin_id.to_string(),
                request_id: request_id.to_string(),
            });
        }
        if request.status.is_terminal() {
            return Err(ApprovalError::RequestAlreadyFinalized {
                request_id: request_id.to_string(),
                status: request.status,
            });
        }
        if !matches!(action, Action::Approve | Action::Reject) {
            return Err(ApprovalError::InvalidAction(action));
        }

        let signature = RequestSignature {
            signature: Signature::sign(admin_id, admin_name, action, &request.transaction)?,
            comments: comments.map(str::to_owned),
        };

        if action == Action::Reject {
            request.signatures.push(signature);
            request.status = ApprovalStatus::Rejected;
            request.rejection_reason = comments.map(str::to_owned);

            info!(request_id, admin_id, "Approval request rejected");
            return Ok(SubmitOutcome {
                status: ApprovalStatus::Rejected,
                finalized: true,
                block: None,
            });
        }

        let approvals = request.current_approvals + 1;
        if approvals < request.required_approvals {
            request.signatures.push(signature);
            request.current_approvals = approvals;

            debug!(
                request_id,
                admin_id,
                approvals,
                required = request.required_approvals,
                "Approval recorded"
            );
            return Ok(SubmitOutcome {
                status: ApprovalStatus::Pending,
                finalized: false,
                block: None,
            });
        }

        let block_signatures = request
            .signatures
            .iter()
            .map(|s| s.signature.clone())
            .chain(std::iter::once(signature.signature.clone()))
            .collect();
        let block = self
            .ledger
            .append_with_signatures(request.transaction.clone(), block_signatures)?;

        request.signatures.push(signature);
        request.current_approvals = approvals;
        request.status = ApprovalStatus::Approved;
        request.block_hash = Some(block.hash.clone());

        info!(
            request_id,
            approvals,
            index = block.index,
            hash = %block.hash,
            "Approval request finalized"
        );
        Ok(SubmitOutcome {
            status: ApprovalStatus::Approved,
            finalized: true,
            block: Some(block),
        })
    }

    pub fn request(&self, request_id: &str) -> Option<ApprovalRequest> {
        self.requests.lock().get(request_id).cloned()
    }

    /// Pending requests, oldest first
    pub fn pending_requests(&self) -> Vec<ApprovalRequest> {
        let mut pending: Vec<_> = self
            .requests
            .lock()
            .values()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.sequence);
        pending
    }

    /// Pending requests `admin_id` has not signed yet, oldest first
    pub fn pending_for(&self, admin_id: &str) -> Vec<ApprovalRequest> {
        let mut pending: Vec<_> = self
            .requests
            .lock()
            .values()
            .filter(|r| r.status == ApprovalStatus::Pending && !r.has_signer(admin_id))
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.sequence);
        pending
    }

    /// Whether `admin_id` may still sign `request_id`
    pub fn can_sign(&self, request_id: &str, admin_id: &str) -> bool {
        self.requests
            .lock()
            .get(request_id)
            .is_some_and(|r| r.status == ApprovalStatus::Pending && !r.has_signer(admin_id))
    }

    pub fn stats(&self) -> ApprovalStats {
        self.requests
            .lock()
            .values()
            .fold(ApprovalStats::default(), |mut stats, r| {
                match r.status {
                    ApprovalStatus::Pending => stats.pending += 1,
                    ApprovalStatus::Approved => stats.approved += 1,
                    ApprovalStatus::Rejected => stats.rejected += 1,
                }
                stats
            })
    }
}
