// Copyright (c) 2024 Botho Foundation
//
//! Shared helpers for the landchain integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use landchain::block::RecordSnapshot;
use landchain::config::LedgerConfig;
use landchain::{Ledger, LandRecordTransaction};
use serde_json::{json, Value};

/// Low difficulty keeps mining fast
pub const TEST_DIFFICULTY: usize = 1;

pub fn test_ledger() -> Arc<Ledger> {
    Arc::new(Ledger::new(LedgerConfig::with_difficulty(TEST_DIFFICULTY)).expect("ledger"))
}

pub fn snapshot(value: Value) -> RecordSnapshot {
    match value {
        Value::Object(map) => map,
        other => panic!("snapshot must be an object, got {other}"),
    }
}

pub fn land_record(land_id: &str, owner: &str) -> RecordSnapshot {
    snapshot(json!({
        "land_id": land_id,
        "owner_name": owner,
        "area_sqm": 1250,
        "location": {"district": "North", "parcel": land_id},
    }))
}

pub fn create_tx(land_id: &str, admin_id: &str) -> LandRecordTransaction {
    LandRecordTransaction::create(land_record(land_id, "First Owner"), admin_id, "Admin")
        .expect("record has land_id")
}

pub fn update_tx(land_id: &str, new_owner: &str, admin_id: &str) -> LandRecordTransaction {
    LandRecordTransaction::update(
        land_id,
        land_record(land_id, "First Owner"),
        land_record(land_id, new_owner),
        admin_id,
        "Admin",
    )
}

/// Append a mix of create and update transactions
pub fn populate(ledger: &Ledger, records: usize) {
    for i in 0..records {
        let land_id = format!("LR-{i:03}");
        ledger.append_transaction(create_tx(&land_id, "admin-1")).expect("append create");
        ledger
            .append_transaction(update_tx(&land_id, "New Owner", "admin-2"))
            .expect("append update");
    }
}
