//! Replay Integration Tests
//!
//! Tests for streaming a recorded session file through the harness,
//! including audit JSONL output.

use std::sync::Arc;

use tempfile::TempDir;

use cohort_harness::audit::{AuditCode, AuditRecord, JsonlAuditSink, NullAuditSink};
use cohort_harness::cli::{replay_session, RecordedEntry, ReplayError};
use cohort_harness::config::HarnessConfig;
use cohort_harness::core::CohortHarness;
use cohort_harness::domain::{
    CohortEvent, EventOrigin, TypeDef, TypeDefCategory, TypeDefPayload,
};

fn type_def_entry(server: &str, collection: &str, name: &str) -> RecordedEntry {
    RecordedEntry::Event(CohortEvent::type_def(
        EventOrigin::new(server, collection),
        TypeDefPayload::TypeDef(TypeDef {
            guid: format!("guid-{}", name),
            name: name.to_string(),
            version: 1,
            category: TypeDefCategory::Entity,
        }),
    ))
}

async fn write_session(temp: &TempDir, entries: &[RecordedEntry]) -> std::path::PathBuf {
    let path = temp.path().join("session.jsonl");
    let mut content = String::new();
    for entry in entries {
        content.push_str(&serde_json::to_string(entry).unwrap());
        content.push('\n');
    }
    tokio::fs::write(&path, content).await.unwrap();
    path
}

#[tokio::test]
async fn test_replay_drives_the_full_lifecycle() {
    let temp = TempDir::new().unwrap();
    let path = write_session(
        &temp,
        &[
            type_def_entry("other", "collX", "First"),
            type_def_entry("other", "collX", "Second"),
            RecordedEntry::AddRemote {
                metadata_collection_id: "collA".to_string(),
                server_name: "tutServer".to_string(),
            },
            type_def_entry("tutServer", "collA", "Third"),
            RecordedEntry::RemoveRemote {
                metadata_collection_id: "collA".to_string(),
            },
            type_def_entry("tutServer", "collA", "Fourth"),
        ],
    )
    .await;

    let harness = CohortHarness::new(
        HarnessConfig::new("tutServer"),
        Arc::new(NullAuditSink::new()),
    );

    let stats = replay_session(&harness, &path).await.unwrap();
    assert_eq!(stats.events, 4);
    assert_eq!(stats.membership_actions, 2);

    // Fourth arrived after the TUT departed, so it sits in the buffer
    assert_eq!(harness.typedef_sequencer().events_dispatched().await, 3);
    assert_eq!(harness.typedef_sequencer().buffered_len().await, 1);

    let summary = harness.report().summary();
    assert!(summary.all_passed());
    assert!(summary.total() > 0);
}

#[tokio::test]
async fn test_replay_writes_audit_records() {
    let temp = TempDir::new().unwrap();
    let session = write_session(
        &temp,
        &[
            type_def_entry("other", "collX", "First"),
            RecordedEntry::AddRemote {
                metadata_collection_id: "collA".to_string(),
                server_name: "tutServer".to_string(),
            },
        ],
    )
    .await;

    let audit_path = temp.path().join("audit.jsonl");
    let harness = CohortHarness::new(
        HarnessConfig::new("tutServer"),
        Arc::new(JsonlAuditSink::new(&audit_path)),
    );

    replay_session(&harness, &session).await.unwrap();

    let content = tokio::fs::read_to_string(&audit_path).await.unwrap();
    let records: Vec<AuditRecord> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert!(records
        .iter()
        .any(|r| r.code == AuditCode::TutConnectorRegistered));
    assert!(records
        .iter()
        .any(|r| r.code == AuditCode::EventBufferFlushed));
}

#[tokio::test]
async fn test_replay_reports_malformed_lines() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("session.jsonl");
    tokio::fs::write(&path, "{\"entry\": \"event\"\n").await.unwrap();

    let harness = CohortHarness::new(
        HarnessConfig::new("tutServer"),
        Arc::new(NullAuditSink::new()),
    );

    let result = replay_session(&harness, &path).await;
    assert!(matches!(result, Err(ReplayError::Parse { line: 1, .. })));
}

#[tokio::test]
async fn test_replay_skips_blank_lines() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("session.jsonl");
    let entry = serde_json::to_string(&type_def_entry("other", "collX", "First")).unwrap();
    tokio::fs::write(&path, format!("\n{}\n\n", entry)).await.unwrap();

    let harness = CohortHarness::new(
        HarnessConfig::new("tutServer"),
        Arc::new(NullAuditSink::new()),
    );

    let stats = replay_session(&harness, &path).await.unwrap();
    assert_eq!(stats.events, 1);
}
