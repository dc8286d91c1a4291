// Copyright (c) 2024 Botho Foundation
//
//! Approval workflow integration tests: quorum finalization, rejection
//! short-circuit, duplicate signers, and replay of approved blocks.

mod common;

use std::sync::Arc;
use std::thread;

use common::*;
use landchain::approval::{NewApprovalRequest, SubmitOutcome};
use landchain::config::ApprovalConfig;
use landchain::{Action, ApprovalCoordinator, ApprovalError, ApprovalStatus};

fn coordinator() -> ApprovalCoordinator {
    ApprovalCoordinator::new(test_ledger(), &ApprovalConfig::default())
}

fn open_request(coordinator: &ApprovalCoordinator, request_id: &str, land_id: &str) {
    coordinator
        .create_request(NewApprovalRequest::new(
            request_id,
            update_tx(land_id, "Buyer", "clerk"),
        ))
        .unwrap();
}

#[test]
fn test_two_approvals_finalize() {
    let coordinator = coordinator();
    open_request(&coordinator, "req-1", "LR-100");

    let outcome = coordinator
        .submit_signature("req-1", "admin-1", "Alice", Action::Approve, Some("checked deed"))
        .unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome {
            status: ApprovalStatus::Pending,
            finalized: false,
            block: None,
        }
    );

    let outcome = coordinator
        .submit_signature("req-1", "admin-2", "Bob", Action::Approve, None)
        .unwrap();
    assert_eq!(outcome.status, ApprovalStatus::Approved);
    assert!(outcome.finalized);

    let block = outcome.block.unwrap();
    let ledger = coordinator.ledger();
    assert_eq!(ledger.len(), 2);
    assert!(block.has_signer("admin-1"));
    assert!(block.has_signer("admin-2"));
    assert!(ledger.has_required_approvals(&block.hash, 2));
    assert_eq!(block.record_id(), Some("LR-100"));
    assert!(ledger.is_valid());

    let request = coordinator.request("req-1").unwrap();
    assert_eq!(request.signatures[0].comments.as_deref(), Some("checked deed"));

    // Finalized requests take no more decisions
    let err = coordinator
        .submit_signature("req-1", "admin-3", "Carol", Action::Approve, None)
        .unwrap_err();
    assert!(matches!(err, ApprovalError::RequestAlreadyFinalized { .. }));
    assert_eq!(ledger.len(), 2);
}

#[test]
fn test_rejection_short_circuits() {
    let coordinator = coordinator();
    open_request(&coordinator, "req-1", "LR-200");

    let outcome = coordinator
        .submit_signature("req-1", "admin-1", "Alice", Action::Reject, Some("boundary dispute"))
        .unwrap();
    assert_eq!(outcome.status, ApprovalStatus::Rejected);
    assert!(outcome.finalized);
    assert!(outcome.block.is_none());

    for (admin_id, name) in [("admin-2", "Bob"), ("admin-3", "Carol")] {
        let err = coordinator
            .submit_signature("req-1", admin_id, name, Action::Approve, None)
            .unwrap_err();
        assert!(matches!(
            err,
            ApprovalError::RequestAlreadyFinalized {
                status: ApprovalStatus::Rejected,
                ..
            }
        ));
    }
    assert_eq!(coordinator.ledger().len(), 1);
}

#[test]
fn test_duplicate_signer_rejected() {
    let coordinator = coordinator();
    open_request(&coordinator, "req-1", "LR-300");

    coordinator
        .submit_signature("req-1", "admin-1", "Alice", Action::Approve, None)
        .unwrap();
    let before = coordinator.request("req-1").unwrap();

    let err = coordinator
        .submit_signature("req-1", "admin-1", "Alice", Action::Approve, None)
        .unwrap_err();
    assert_eq!(
        err,
        ApprovalError::DuplicateSigner {
            admin_id: "admin-1".to_string(),
            request_id: "req-1".to_string(),
        }
    );
    assert_eq!(coordinator.request("req-1").unwrap(), before);
    assert_eq!(before.current_approvals, 1);
}

#[test]
fn test_approved_blocks_survive_rebuild() {
    let coordinator = coordinator();
    for (i, land_id) in ["LR-1", "LR-2", "LR-3"].iter().enumerate() {
        let request_id = format!("req-{i}");
        open_request(&coordinator, &request_id, land_id);
        for (admin_id, name) in [("admin-1", "Alice"), ("admin-2", "Bob")] {
            coordinator
                .submit_signature(&request_id, admin_id, name, Action::Approve, None)
                .unwrap();
        }
    }

    let source = coordinator.ledger();
    let log = source.persisted_log();
    assert!(log.iter().all(|record| record.signatures.len() == 3));

    let replica = test_ledger();
    replica.rebuild_from_log(&log).unwrap();
    assert_eq!(replica.export_chain().unwrap(), source.export_chain().unwrap());
    assert_eq!(replica.stats().total_signatures, 9);
}

#[test]
fn test_concurrent_approvals_mint_once() {
    let coordinator = Arc::new(ApprovalCoordinator::new(
        test_ledger(),
        &ApprovalConfig {
            required_approvals: 3,
        },
    ));
    open_request(&coordinator, "req-1", "LR-400");

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                coordinator.submit_signature(
                    "req-1",
                    &format!("admin-{i}"),
                    "Admin",
                    Action::Approve,
                    None,
                )
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let minted = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(SubmitOutcome { block: Some(_), .. })))
        .count();
    let late = outcomes
        .iter()
        .filter(|o| matches!(o, Err(ApprovalError::RequestAlreadyFinalized { .. })))
        .count();

    assert_eq!(minted, 1);
    assert_eq!(late, 3);
    assert_eq!(coordinator.ledger().len(), 2);
    assert_eq!(coordinator.request("req-1").unwrap().current_approvals, 3);
}
