//! Structured audit records for registry and sequencer transitions.
//!
//! Every membership transition emits an [`AuditRecord`] to a pluggable
//! [`AuditSink`]. Sinks are observability only: a sink that fails must not
//! disturb the inbound processing path, so `record` does not return a
//! `Result` and the JSONL sink downgrades its own IO failures to warnings.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

/// Errors internal to audit sinks
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Severity attached to every audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
}

/// Catalog of auditable transitions.
///
/// Each code carries a stable message id, a fixed severity, and the
/// standard system/user action texts for that transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCode {
    /// The local repository registered its own connector
    LocalConnectorRegistered,

    /// The technology under test joined the cohort
    TutConnectorRegistered,

    /// Another cohort member joined
    RemoteConnectorRegistered,

    /// The technology under test left the cohort
    TutConnectorDeparted,

    /// Another cohort member left
    RemoteConnectorDeparted,

    /// A connector refused to disconnect during teardown
    CohortDisconnectFailed,

    /// Buffered events were replayed after TUT registration
    EventBufferFlushed,

    /// A probe exceeded the configured execution budget
    ProbeTimedOut,
}

impl AuditCode {
    /// Stable message id recorded with every occurrence of this code
    pub fn message_id(&self) -> &'static str {
        match self {
            Self::LocalConnectorRegistered => "COHORT-HARNESS-0001",
            Self::TutConnectorRegistered => "COHORT-HARNESS-0002",
            Self::RemoteConnectorRegistered => "COHORT-HARNESS-0003",
            Self::TutConnectorDeparted => "COHORT-HARNESS-0004",
            Self::RemoteConnectorDeparted => "COHORT-HARNESS-0005",
            Self::CohortDisconnectFailed => "COHORT-HARNESS-0006",
            Self::EventBufferFlushed => "COHORT-HARNESS-0007",
            Self::ProbeTimedOut => "COHORT-HARNESS-0008",
        }
    }

    pub fn severity(&self) -> AuditSeverity {
        match self {
            Self::LocalConnectorRegistered
            | Self::TutConnectorRegistered
            | Self::RemoteConnectorRegistered
            | Self::RemoteConnectorDeparted
            | Self::EventBufferFlushed => AuditSeverity::Info,
            Self::TutConnectorDeparted | Self::ProbeTimedOut => AuditSeverity::Warning,
            Self::CohortDisconnectFailed => AuditSeverity::Error,
        }
    }

    pub fn system_action(&self) -> &'static str {
        match self {
            Self::LocalConnectorRegistered => {
                "The harness recorded the local repository's collection id."
            }
            Self::TutConnectorRegistered => {
                "Buffered events will be replayed and validation begins."
            }
            Self::RemoteConnectorRegistered => {
                "The member's events will receive structural screening only."
            }
            Self::TutConnectorDeparted => {
                "Validation is suspended and subsequent events are buffered."
            }
            Self::RemoteConnectorDeparted => "The member's registration was removed.",
            Self::CohortDisconnectFailed => {
                "The connector was removed from the registry anyway."
            }
            Self::EventBufferFlushed => {
                "All buffered events were validated in arrival order."
            }
            Self::ProbeTimedOut => "The probe was abandoned and dispatch continued.",
        }
    }

    pub fn user_action(&self) -> &'static str {
        match self {
            Self::LocalConnectorRegistered
            | Self::TutConnectorRegistered
            | Self::RemoteConnectorRegistered
            | Self::RemoteConnectorDeparted
            | Self::EventBufferFlushed => "No action required.",
            Self::TutConnectorDeparted => {
                "Verify the technology under test did not crash."
            }
            Self::CohortDisconnectFailed => {
                "Check the member's connectivity before the next run."
            }
            Self::ProbeTimedOut => {
                "Raise probe_timeout_secs or investigate the hung probe."
            }
        }
    }
}

/// One structured audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Which transition occurred
    pub code: AuditCode,

    /// Stable message id for the code
    pub message_id: String,

    /// Severity for the code
    pub severity: AuditSeverity,

    /// Formatted, occurrence-specific text
    pub message: String,

    /// What the harness did in response
    pub system_action: String,

    /// What the operator should do, if anything
    pub user_action: String,

    /// When the record was created
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Create a record for a code with occurrence-specific message text
    pub fn new(code: AuditCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message_id: code.message_id().to_string(),
            severity: code.severity(),
            message: message.into(),
            system_action: code.system_action().to_string(),
            user_action: code.user_action().to_string(),
            recorded_at: Utc::now(),
        }
    }
}

/// Destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one transition. Must not fail the caller.
    async fn record(&self, record: AuditRecord);
}

/// Sink that maps audit severities onto `tracing` levels
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        match record.severity {
            AuditSeverity::Info => {
                info!(message_id = record.message_id, "{}", record.message)
            }
            AuditSeverity::Warning => {
                warn!(message_id = record.message_id, "{}", record.message)
            }
            AuditSeverity::Error => {
                error!(message_id = record.message_id, "{}", record.message)
            }
        }
    }
}

/// Sink that appends records to a JSONL file, one record per line
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let json = serde_json::to_string(record)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, record: AuditRecord) {
        if let Err(e) = self.append(&record).await {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to append audit record"
            );
        }
    }
}

/// Sink that discards every record
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl NullAuditSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, _record: AuditRecord) {}
}
