//! Conformance verdicts recorded by probes.
//!
//! Probes never raise; every observation lands here as a
//! [`ConformanceResult`] and the caller reads the collected results (or a
//! count summary) after the run.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single probe against a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The event conformed to expectations
    Passed,

    /// The event did not conform
    Failed,

    /// The probe could not judge this event (e.g. unrecognized payload)
    Skipped,
}

/// One recorded observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConformanceResult {
    /// Stable identifier of the probe that produced this result
    pub test_id: String,

    /// Correlation tag of the judged event, of the form `event-<n>`
    pub correlation: String,

    /// The verdict
    pub verdict: Verdict,

    /// Supporting detail for failed or noteworthy results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// When the result was recorded
    pub recorded_at: DateTime<Utc>,
}

impl ConformanceResult {
    pub fn passed(test_id: impl Into<String>, correlation: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            correlation: correlation.into(),
            verdict: Verdict::Passed,
            detail: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(
        test_id: impl Into<String>,
        correlation: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            test_id: test_id.into(),
            correlation: correlation.into(),
            verdict: Verdict::Failed,
            detail: Some(detail.into()),
            recorded_at: Utc::now(),
        }
    }

    pub fn skipped(test_id: impl Into<String>, correlation: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            correlation: correlation.into(),
            verdict: Verdict::Skipped,
            detail: None,
            recorded_at: Utc::now(),
        }
    }

    /// Attach supporting detail
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Shared collector that probes record into.
///
/// Results keep their recording order, which for a single category matches
/// event dispatch order.
#[derive(Debug, Default)]
pub struct ReportCollector {
    results: Mutex<Vec<ConformanceResult>>,
}

impl ReportCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation
    pub fn record(&self, result: ConformanceResult) {
        self.results
            .lock()
            .expect("report collector lock poisoned")
            .push(result);
    }

    /// Snapshot of all recorded results, in recording order
    pub fn results(&self) -> Vec<ConformanceResult> {
        self.results
            .lock()
            .expect("report collector lock poisoned")
            .clone()
    }

    /// Count summary across all recorded results
    pub fn summary(&self) -> ReportSummary {
        let results = self.results.lock().expect("report collector lock poisoned");

        let mut summary = ReportSummary::default();
        for result in results.iter() {
            match result.verdict {
                Verdict::Passed => summary.passed += 1,
                Verdict::Failed => summary.failed += 1,
                Verdict::Skipped => summary.skipped += 1,
            }
        }

        summary
    }
}

/// Count summary of a conformance run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ReportSummary {
    /// Total results recorded
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// Whether every judged event conformed
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}
