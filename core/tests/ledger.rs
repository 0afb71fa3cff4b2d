//! Run ledger: run rows, event log ordering, and summaries.

use referral_core::{
    classifier::{ClassificationSummary, InvalidReason},
    event::{EventLogEntry, PipelineEvent},
    store::{RunStatus, RunStore},
};

fn store() -> RunStore {
    let store = RunStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn entry(run_id: &str, event: &PipelineEvent) -> EventLogEntry {
    EventLogEntry {
        id:         None,
        run_id:     run_id.to_string(),
        stage:      "test".to_string(),
        event_type: event.type_name().to_string(),
        payload:    serde_json::to_string(event).unwrap(),
    }
}

#[test]
fn migration_is_idempotent() {
    let store = store();
    store.migrate().unwrap();
}

#[test]
fn run_status_moves_from_running_to_finished() {
    let store = store();
    store.insert_run("run-a", "0.1.0", "2024-05-01T00:00:00Z").unwrap();
    assert_eq!(store.run_status("run-a").unwrap().as_deref(), Some("running"));

    store
        .finish_run("run-a", RunStatus::Completed, "2024-05-01T00:01:00Z")
        .unwrap();
    assert_eq!(store.run_status("run-a").unwrap().as_deref(), Some("completed"));
    assert_eq!(store.run_status("run-missing").unwrap(), None);
}

#[test]
fn duplicate_run_id_is_rejected() {
    let store = store();
    store.insert_run("run-a", "0.1.0", "t0").unwrap();
    assert!(store.insert_run("run-a", "0.1.0", "t1").is_err());
}

/// Events come back in insertion order and decode to what was written.
#[test]
fn events_round_trip_per_run() {
    let store = store();
    store.insert_run("run-a", "0.1.0", "t0").unwrap();
    store.insert_run("run-b", "0.1.0", "t0").unwrap();

    let written = vec![
        PipelineEvent::RunStarted { run_id: "run-a".into() },
        PipelineEvent::SourceLoaded { table: "user_referrals".into(), rows: 12 },
        PipelineEvent::RunFailed { error: "boom".into() },
    ];
    for event in &written {
        store.append_event(&entry("run-a", event), "t1").unwrap();
    }
    store
        .append_event(&entry("run-b", &PipelineEvent::RunStarted { run_id: "run-b".into() }), "t1")
        .unwrap();

    let read = store.events_for_run("run-a").unwrap();
    assert_eq!(read.len(), 3);
    assert!(read.iter().all(|e| e.id.is_some()));
    let decoded: Vec<PipelineEvent> = read.iter().map(|e| e.decode().unwrap()).collect();
    assert_eq!(decoded, written);
    assert_eq!(read[1].event_type, "source_loaded");
}

#[test]
fn summary_round_trips_and_replaces() {
    let store = store();
    store.insert_run("run-a", "0.1.0", "t0").unwrap();
    assert_eq!(store.summary_for_run("run-a").unwrap(), None);

    let mut summary = ClassificationSummary {
        total: 10,
        valid: 6,
        reward_eligible: 4,
        ..ClassificationSummary::default()
    };
    summary.invalid_by_reason.insert(InvalidReason::NoTransaction, 3);
    summary.invalid_by_reason.insert(InvalidReason::TransactionBeforeReferral, 1);
    store.save_summary("run-a", &summary).unwrap();
    assert_eq!(store.summary_for_run("run-a").unwrap(), Some(summary.clone()));

    summary.valid = 7;
    store.save_summary("run-a", &summary).unwrap();
    assert_eq!(store.summary_for_run("run-a").unwrap().unwrap().valid, 7);
}
