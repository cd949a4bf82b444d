use std::sync::Arc;

use super::*;
use crate::clock::ManualClock;
use crate::hash_chain::ChainHash;
use crate::store::{MemoryStore, WriteSet};
use crate::types::{limits, CREATION_EVENT};

fn id(s: &str) -> Identity {
    Identity::from(s)
}

fn ledger() -> Ledger<MemoryStore> {
    Ledger::new(MemoryStore::new(id("admin")))
        .with_clock(ManualClock::new(1_000))
        .with_transfer_agent(id("transfer-module"))
}

fn ledger_with_batch() -> (Ledger<MemoryStore>, BatchId) {
    let mut l = ledger();
    let b = l
        .create_batch(&id("farmer"), "Coffee Beans", "Ethiopia Farm", "Initial batch details")
        .unwrap();
    (l, b)
}

#[test]
fn coffee_scenario() {
    let mut l = ledger();
    let farmer = id("farmer");

    let b = l
        .create_batch(&farmer, "Coffee Beans", "Ethiopia Farm", "Initial batch details")
        .unwrap();
    assert_eq!(b, 1);
    assert_eq!(l.get_total_events().unwrap(), 1);
    assert_eq!(l.get_log(1, 1).unwrap().unwrap().event_type, CREATION_EVENT);

    let log = l
        .append_log(&farmer, 1, "processing", "Factory A", &farmer, "Processed beans")
        .unwrap();
    assert_eq!(log, 2);
    assert_eq!(l.get_total_events().unwrap(), 2);
    assert!(l.verify(1, 2).unwrap());

    let err = l
        .transfer_ownership(&id("stranger"), 1, id("stranger"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { action: Action::TransferOwnership, .. }));
    assert_eq!(l.get_owner(1).unwrap(), Some(farmer));
}

#[test]
fn create_batch_writes_record_owner_and_creation_entry() {
    let (l, b) = ledger_with_batch();
    let batch = l.get_batch(b).unwrap().unwrap();
    assert_eq!(batch.status, "active");
    assert_eq!(batch.creator, id("farmer"));
    assert_eq!(batch.created_at, 1_000);
    assert_eq!(batch.log_count, 1);
    assert_eq!(l.get_log_count(b).unwrap(), 1);
    assert_eq!(l.get_owner(b).unwrap(), Some(id("farmer")));
    assert_eq!(l.get_total_batches().unwrap(), 1);

    let entry = l.get_log(b, 1).unwrap().unwrap();
    assert_eq!(entry.event_type, "creation");
    assert_eq!(entry.location, "Ethiopia Farm");
    assert_eq!(entry.actor, id("farmer"));
    assert_eq!(entry.metadata, "Initial batch details");
    assert_eq!(entry.prev_hash, ChainHash::GENESIS);
}

#[test]
fn batch_ids_are_sequential() {
    let mut l = ledger();
    let a = l.create_batch(&id("a"), "Tea", "Assam", "").unwrap();
    let b = l.create_batch(&id("b"), "Tea", "Darjeeling", "").unwrap();
    assert_eq!((a, b), (1, 2));
    assert_eq!(l.get_owner(2).unwrap(), Some(id("b")));
    assert_eq!(l.get_total_events().unwrap(), 2);
}

#[test]
fn genesis_sentinel_for_every_batch() {
    let mut l = ledger();
    for i in 0..3 {
        let b = l.create_batch(&id("farmer"), "Rice", &format!("Field {i}"), "").unwrap();
        assert!(l.get_log(b, 1).unwrap().unwrap().prev_hash.is_genesis());
    }
}

#[test]
fn create_batch_field_bounds() {
    let mut l = ledger();
    let f = id("farmer");
    let long = |n: usize| "x".repeat(n);

    assert!(l.create_batch(&f, &long(limits::PRODUCT_TYPE), &long(limits::ORIGIN), &long(limits::METADATA)).is_ok());

    for (pt, origin, meta, field) in [
        (long(51), long(1), long(1), "product_type"),
        (long(1), long(101), long(1), "origin"),
        (long(1), long(1), long(501), "metadata"),
    ] {
        let before = l.store().clone();
        let err = l.create_batch(&f, &pt, &origin, &meta).unwrap_err();
        assert!(
            matches!(err, LedgerError::InvalidField { field: got, .. } if got == field),
            "{err}"
        );
        assert_eq!(l.store(), &before);
    }
}

#[test]
fn create_batch_rejects_occupied_id() {
    let mut store = MemoryStore::new(id("admin"));
    store
        .commit(WriteSet {
            batches: vec![BatchRecord {
                batch_id: 1,
                product_type: "stray".into(),
                origin: "nowhere".into(),
                creator: id("x"),
                created_at: 0,
                status: "active".into(),
                log_count: 0,
            }],
            ..WriteSet::default()
        })
        .unwrap();
    let mut l = Ledger::new(store);
    let before = l.store().clone();
    let err = l.create_batch(&id("farmer"), "Tea", "Assam", "").unwrap_err();
    assert!(matches!(err, LedgerError::BatchExists(1)));
    assert_eq!(l.store(), &before);
}

#[test]
fn failed_creation_entry_commits_nothing() {
    let mut l = ledger().with_max_logs_per_batch(0);
    let before = l.store().clone();
    let err = l.create_batch(&id("farmer"), "Tea", "Assam", "").unwrap_err();
    assert!(matches!(err, LedgerError::LogLimitReached { batch_id: 1, limit: 0 }));
    assert_eq!(l.store(), &before);
    assert_eq!(l.get_total_batches().unwrap(), 0);
    assert!(l.get_batch(1).unwrap().is_none());
    assert!(l.get_owner(1).unwrap().is_none());
}

#[test]
fn append_assigns_dense_ids_and_timestamps() {
    let clock = Arc::new(ManualClock::new(5));
    let mut l = Ledger::new(MemoryStore::new(id("admin"))).with_clock(Arc::clone(&clock));
    let f = id("farmer");
    let b = l.create_batch(&f, "Coffee Beans", "Ethiopia Farm", "").unwrap();

    clock.set(9);
    let courier = id("courier");
    assert_eq!(l.append_log(&f, b, "shipping", "Port", &courier, "").unwrap(), 2);
    clock.advance(1);
    assert_eq!(l.append_log(&f, b, "arrival", "Warehouse", &courier, "").unwrap(), 3);

    let history = l.batch_history(b).unwrap();
    let ids: Vec<LogId> = history.iter().map(|e| e.log_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    let ts: Vec<u64> = history.iter().map(|e| e.timestamp).collect();
    assert_eq!(ts, vec![5, 9, 10]);
    assert_eq!(history[1].actor, courier);
    assert_eq!(l.get_log_count(b).unwrap(), 3);
    assert_eq!(l.store().entry_count(b), 3);
}

#[test]
fn every_entry_verifies_and_keeps_verifying() {
    let (mut l, b) = ledger_with_batch();
    let f = id("farmer");
    for i in 0..10 {
        let log_id = l.append_log(&f, b, "scan", &format!("Gate {i}"), &f, "").unwrap();
        assert!(l.verify(b, log_id).unwrap());
    }
    let other = l.create_batch(&f, "Cocoa", "Ghana", "").unwrap();
    l.append_log(&f, other, "scan", "Gate", &f, "").unwrap();
    l.update_status(&f, b, "completed").unwrap();

    for log_id in 1..=11 {
        assert!(l.verify(b, log_id).unwrap());
    }
    assert!(l.audit_batch(b).unwrap().is_intact());
}

#[test]
fn verify_missing_entry() {
    let (l, b) = ledger_with_batch();
    let err = l.verify(b, 2).unwrap_err();
    assert!(matches!(err, LedgerError::EntryNotFound { batch_id: 1, log_id: 2 }));
}

#[test]
fn append_by_non_owner_is_unauthorized() {
    let (mut l, b) = ledger_with_batch();
    let before = l.store().clone();
    // The admin has no owner rights, and naming the owner as actor does not help.
    for caller in [id("admin"), id("intruder")] {
        let err = l
            .append_log(&caller, b, "processing", "Factory A", &id("farmer"), "")
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { action: Action::AppendLog, .. }));
    }
    assert_eq!(l.store(), &before);
    assert_eq!(l.get_log_count(b).unwrap(), 1);
}

#[test]
fn append_to_missing_batch() {
    let mut l = ledger();
    let f = id("farmer");
    let err = l.append_log(&f, 7, "processing", "A", &f, "").unwrap_err();
    assert!(matches!(err, LedgerError::BatchNotFound(7)));
}

#[test]
fn append_field_bounds() {
    let (mut l, b) = ledger_with_batch();
    let f = id("farmer");
    let before = l.store().clone();
    let cases = [
        ("x".repeat(51), "loc".to_string(), String::new(), "event_type"),
        ("evt".to_string(), "x".repeat(101), String::new(), "location"),
        ("evt".to_string(), "loc".to_string(), "x".repeat(501), "metadata"),
    ];
    for (event_type, location, metadata, field) in cases {
        let err = l
            .append_log(&f, b, &event_type, &location, &f, &metadata)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidField { field: got, .. } if got == field));
    }
    assert_eq!(l.store(), &before);
}

#[test]
fn unauthorized_checked_before_field_bounds() {
    let (mut l, b) = ledger_with_batch();
    let err = l
        .append_log(&id("intruder"), b, &"x".repeat(60), "loc", &id("intruder"), "")
        .unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { .. }));
}

#[test]
fn log_limit_is_permanent() {
    let (mut l, b) = ledger_with_batch();
    let f = id("farmer");
    // The creation entry is log 1.
    for _ in 1..1000 {
        l.append_log(&f, b, "scan", "Gate", &f, "").unwrap();
    }
    assert_eq!(l.get_log_count(b).unwrap(), 1000);
    assert!(l.verify(b, 1000).unwrap());

    let total = l.get_total_events().unwrap();
    let err = l.append_log(&f, b, "scan", "Gate", &f, "").unwrap_err();
    assert!(matches!(err, LedgerError::LogLimitReached { batch_id: 1, limit: 1000 }));
    assert!(l.get_log(b, 1001).unwrap().is_none());
    assert_eq!(l.get_total_events().unwrap(), total);

    // Other batches are unaffected.
    let other = l.create_batch(&f, "Tea", "Assam", "").unwrap();
    assert_eq!(l.append_log(&f, other, "scan", "Gate", &f, "").unwrap(), 2);
}

#[test]
fn configurable_log_ceiling() {
    let mut l = ledger().with_max_logs_per_batch(3);
    let f = id("farmer");
    let b = l.create_batch(&f, "Tea", "Assam", "").unwrap();
    l.append_log(&f, b, "a", "x", &f, "").unwrap();
    l.append_log(&f, b, "b", "x", &f, "").unwrap();
    let err = l.append_log(&f, b, "c", "x", &f, "").unwrap_err();
    assert!(matches!(err, LedgerError::LogLimitReached { limit: 3, .. }));
}

#[test]
fn update_status_only_touches_status() {
    let (mut l, b) = ledger_with_batch();
    let f = id("farmer");
    let before = l.get_batch(b).unwrap().unwrap();
    let entry_before = l.get_log(b, 1).unwrap();

    l.update_status(&f, b, "disputed").unwrap();

    let after = l.get_batch(b).unwrap().unwrap();
    assert_eq!(after.status, "disputed");
    assert_eq!(BatchRecord { status: before.status.clone(), ..after }, before);
    assert_eq!(l.get_log(b, 1).unwrap(), entry_before);
    assert_eq!(l.get_total_events().unwrap(), 1);
}

#[test]
fn update_status_rejections() {
    let (mut l, b) = ledger_with_batch();
    let f = id("farmer");

    let err = l.update_status(&f, 99, "completed").unwrap_err();
    assert!(matches!(err, LedgerError::BatchNotFound(99)));

    let err = l.update_status(&id("admin"), b, "completed").unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { action: Action::UpdateStatus, .. }));

    assert!(l.update_status(&f, b, &"s".repeat(20)).is_ok());
    let err = l.update_status(&f, b, &"s".repeat(21)).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidField { field: "status", max: 20, len: 21 }));
}

#[test]
fn transfer_moves_owner_rights() {
    let (mut l, b) = ledger_with_batch();
    let agent = id("transfer-module");
    let farmer = id("farmer");
    let roaster = id("roaster");

    // The current owner cannot transfer on its own.
    let err = l.transfer_ownership(&farmer, b, roaster.clone()).unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { .. }));

    l.transfer_ownership(&agent, b, roaster.clone()).unwrap();
    assert_eq!(l.get_owner(b).unwrap(), Some(roaster.clone()));
    // Creator is unchanged; rights follow the owner map.
    assert_eq!(l.get_batch(b).unwrap().unwrap().creator, farmer);

    let err = l.append_log(&farmer, b, "processing", "A", &farmer, "").unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { .. }));
    assert_eq!(l.append_log(&roaster, b, "roasting", "Roastery", &roaster, "").unwrap(), 2);
    l.update_status(&roaster, b, "completed").unwrap();
}

#[test]
fn transfer_to_missing_batch() {
    let mut l = ledger();
    let err = l
        .transfer_ownership(&id("transfer-module"), 4, id("x"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::BatchNotFound(4)));
}

#[test]
fn transfer_disabled_without_agent() {
    let mut l = Ledger::new(MemoryStore::new(id("admin")));
    let f = id("farmer");
    let b = l.create_batch(&f, "Tea", "Assam", "").unwrap();
    for caller in [id("admin"), f.clone()] {
        let err = l.transfer_ownership(&caller, b, id("x")).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
    }
}

#[test]
fn pause_blocks_every_mutation_without_side_effects() {
    let (mut l, b) = ledger_with_batch();
    let admin = id("admin");
    let f = id("farmer");
    l.pause(&admin).unwrap();
    assert!(l.is_paused().unwrap());
    let before = l.store().clone();

    assert!(matches!(l.create_batch(&f, "Tea", "Assam", ""), Err(LedgerError::Paused)));
    assert!(matches!(l.append_log(&f, b, "scan", "Gate", &f, ""), Err(LedgerError::Paused)));
    assert!(matches!(l.update_status(&f, b, "completed"), Err(LedgerError::Paused)));
    assert!(matches!(
        l.transfer_ownership(&id("transfer-module"), b, id("x")),
        Err(LedgerError::Paused)
    ));
    // Paused is reported even for callers that would also be unauthorized.
    assert!(matches!(l.append_log(&id("intruder"), 99, "", "", &f, ""), Err(LedgerError::Paused)));
    assert_eq!(l.store(), &before);

    l.unpause(&admin).unwrap();
    assert!(!l.is_paused().unwrap());
    assert_eq!(l.append_log(&f, b, "scan", "Gate", &f, "").unwrap(), 2);
}

#[test]
fn admin_controls_require_admin() {
    let mut l = ledger();
    let admin = id("admin");
    let eve = id("eve");

    assert!(matches!(l.pause(&eve), Err(LedgerError::Unauthorized { action: Action::Pause, .. })));
    assert!(matches!(l.unpause(&eve), Err(LedgerError::Unauthorized { .. })));
    assert!(matches!(l.set_admin(&eve, eve.clone()), Err(LedgerError::Unauthorized { .. })));
    assert_eq!(l.get_admin().unwrap(), admin);

    l.set_admin(&admin, id("ops")).unwrap();
    assert_eq!(l.get_admin().unwrap(), id("ops"));
    assert!(matches!(l.pause(&admin), Err(LedgerError::Unauthorized { .. })));
    l.pause(&id("ops")).unwrap();
    // Admin rotation is still possible while paused.
    l.set_admin(&id("ops"), admin.clone()).unwrap();
    l.unpause(&admin).unwrap();
}

#[test]
fn pause_and_unpause_are_unconditional() {
    let mut l = ledger();
    let admin = id("admin");
    l.unpause(&admin).unwrap();
    l.pause(&admin).unwrap();
    l.pause(&admin).unwrap();
    assert!(l.is_paused().unwrap());
}

#[test]
fn reads_are_idempotent_and_absent_is_not_an_error() {
    let (l, b) = ledger_with_batch();
    assert_eq!(l.get_batch(b).unwrap(), l.get_batch(b).unwrap());
    assert_eq!(l.get_log(b, 1).unwrap(), l.get_log(b, 1).unwrap());
    assert_eq!(l.verify(b, 1).unwrap(), l.verify(b, 1).unwrap());
    assert!(l.get_batch(42).unwrap().is_none());
    assert!(l.get_log(b, 42).unwrap().is_none());
    assert!(l.get_owner(42).unwrap().is_none());
    assert!(matches!(l.get_log_count(42), Err(LedgerError::BatchNotFound(42))));
}

#[test]
fn independent_ledgers_do_not_share_state() {
    let (mut a, _) = ledger_with_batch();
    let b = ledger();
    a.create_batch(&id("farmer"), "Tea", "Assam", "").unwrap();
    assert_eq!(a.get_total_batches().unwrap(), 2);
    assert_eq!(b.get_total_batches().unwrap(), 0);
}

#[test]
fn audit_reports_store_corruption() {
    let (mut l, b) = ledger_with_batch();
    let f = id("farmer");
    l.append_log(&f, b, "scan", "Gate", &f, "").unwrap();
    l.append_log(&f, b, "scan", "Gate", &f, "").unwrap();

    // Rebuild the store with entry 2 carrying a foreign prev_hash.
    let mut store = MemoryStore::new(id("admin"));
    let mut writes = WriteSet {
        globals: Some(l.store().globals().unwrap()),
        batches: vec![l.get_batch(b).unwrap().unwrap()],
        ..WriteSet::default()
    };
    for mut entry in l.batch_history(b).unwrap() {
        if entry.log_id == 2 {
            entry.prev_hash = ChainHash::new([9u8; 32]);
        }
        writes.entries.push(entry);
    }
    store.commit(writes).unwrap();
    let tampered = Ledger::new(store);

    assert!(!tampered.verify(b, 2).unwrap());
    // Entry 3 now links to the foreign hash, so it fails too.
    assert!(!tampered.verify(b, 3).unwrap());
    let report = tampered.audit_batch(b).unwrap();
    assert_eq!(report.broken, vec![2, 3]);
    assert!(report.missing.is_empty());
    assert!(!report.is_intact());
}
