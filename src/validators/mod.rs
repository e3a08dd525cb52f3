//! Conformance probes invoked by the sequencer.
//!
//! A probe inspects one event and records a verdict into the shared
//! [`ReportCollector`]. Probes own their pass/fail outcome; they never
//! return errors to the sequencer. Probes that compare an event against
//! "previously seen" state rely on the sequencer's per-category ordering
//! guarantee: no two events of the same category are ever in flight at
//! once.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::CohortEvent;
use crate::report::{ConformanceResult, ReportCollector};

/// A single conformance probe
#[async_trait]
pub trait EventValidator: Send + Sync {
    /// Stable identifier recorded with every verdict
    fn test_id(&self) -> &'static str;

    /// Inspect one event and record a verdict
    async fn execute(&self, event: &CohortEvent, correlation: &str, recorder: &ReportCollector);
}

/// Universal structural probe for type-definition events.
///
/// Runs for every dispatched type-def event regardless of origin: the
/// envelope must carry a non-empty origin and a recognized payload.
#[derive(Debug, Default)]
pub struct TypeDefScreening;

impl TypeDefScreening {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventValidator for TypeDefScreening {
    fn test_id(&self) -> &'static str {
        "typedef-screening"
    }

    async fn execute(&self, event: &CohortEvent, correlation: &str, recorder: &ReportCollector) {
        let CohortEvent::TypeDef(event) = event else {
            recorder.record(ConformanceResult::skipped(self.test_id(), correlation));
            return;
        };

        if event.origin.server_name.is_empty() || event.origin.metadata_collection_id.is_empty() {
            recorder.record(ConformanceResult::failed(
                self.test_id(),
                correlation,
                "event origin is incomplete",
            ));
            return;
        }

        match event.payload.def_name() {
            Some(name) => recorder.record(
                ConformanceResult::passed(self.test_id(), correlation).with_detail(name),
            ),
            None => recorder.record(ConformanceResult::failed(
                self.test_id(),
                correlation,
                "unrecognized type-definition payload",
            )),
        }
    }
}

/// TUT probe: is this definition now supported by the technology under test?
///
/// Keeps the set of definition names the TUT has announced so far.
#[derive(Debug, Default)]
pub struct TypeDefSupported {
    seen: Mutex<HashSet<String>>,
}

impl TypeDefSupported {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventValidator for TypeDefSupported {
    fn test_id(&self) -> &'static str {
        "typedef-supported"
    }

    async fn execute(&self, event: &CohortEvent, correlation: &str, recorder: &ReportCollector) {
        let CohortEvent::TypeDef(event) = event else {
            recorder.record(ConformanceResult::skipped(self.test_id(), correlation));
            return;
        };

        let Some(name) = event.payload.def_name() else {
            recorder.record(ConformanceResult::skipped(self.test_id(), correlation));
            return;
        };

        let newly_announced = self.seen.lock().await.insert(name.to_string());
        let detail = if newly_announced {
            format!("definition '{}' now supported", name)
        } else {
            format!("definition '{}' re-announced", name)
        };
        recorder.record(
            ConformanceResult::passed(self.test_id(), correlation).with_detail(detail),
        );
    }
}

#[derive(Debug, Clone)]
struct SeenDef {
    guid: String,
    version: u64,
}

/// TUT probe: is this definition consistent with what was seen before?
///
/// A re-announced definition name must keep its guid and must not regress
/// its version.
#[derive(Debug, Default)]
pub struct TypeDefConsistency {
    seen: Mutex<HashMap<String, SeenDef>>,
}

impl TypeDefConsistency {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventValidator for TypeDefConsistency {
    fn test_id(&self) -> &'static str {
        "typedef-consistency"
    }

    async fn execute(&self, event: &CohortEvent, correlation: &str, recorder: &ReportCollector) {
        let CohortEvent::TypeDef(event) = event else {
            recorder.record(ConformanceResult::skipped(self.test_id(), correlation));
            return;
        };

        let (Some(name), Some(guid), Some(version)) = (
            event.payload.def_name(),
            event.payload.def_guid(),
            event.payload.def_version(),
        ) else {
            recorder.record(ConformanceResult::skipped(self.test_id(), correlation));
            return;
        };

        let mut seen = self.seen.lock().await;
        match seen.get(name) {
            None => {
                seen.insert(
                    name.to_string(),
                    SeenDef {
                        guid: guid.to_string(),
                        version,
                    },
                );
                recorder.record(ConformanceResult::passed(self.test_id(), correlation));
            }
            Some(previous) if previous.guid != guid => {
                recorder.record(ConformanceResult::failed(
                    self.test_id(),
                    correlation,
                    format!(
                        "definition '{}' changed guid from '{}' to '{}'",
                        name, previous.guid, guid
                    ),
                ));
            }
            Some(previous) if version < previous.version => {
                recorder.record(ConformanceResult::failed(
                    self.test_id(),
                    correlation,
                    format!(
                        "definition '{}' regressed from version {} to {}",
                        name, previous.version, version
                    ),
                ));
            }
            Some(_) => {
                seen.insert(
                    name.to_string(),
                    SeenDef {
                        guid: guid.to_string(),
                        version,
                    },
                );
                recorder.record(ConformanceResult::passed(self.test_id(), correlation));
            }
        }
    }
}

/// Universal structural probe for instance events
#[derive(Debug, Default)]
pub struct InstanceScreening;

impl InstanceScreening {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventValidator for InstanceScreening {
    fn test_id(&self) -> &'static str {
        "instance-screening"
    }

    async fn execute(&self, event: &CohortEvent, correlation: &str, recorder: &ReportCollector) {
        let CohortEvent::Instance(event) = event else {
            recorder.record(ConformanceResult::skipped(self.test_id(), correlation));
            return;
        };

        if event.origin.server_name.is_empty() || event.origin.metadata_collection_id.is_empty() {
            recorder.record(ConformanceResult::failed(
                self.test_id(),
                correlation,
                "event origin is incomplete",
            ));
            return;
        }

        if event.payload.is_recognized() {
            recorder.record(ConformanceResult::passed(self.test_id(), correlation));
        } else {
            recorder.record(ConformanceResult::failed(
                self.test_id(),
                correlation,
                "unrecognized instance payload",
            ));
        }
    }
}

/// Placeholder TUT hook for instance events.
///
/// Instance validation is not implemented yet; the hook records a pass so
/// the dispatch plumbing stays exercised end to end.
#[derive(Debug, Default)]
pub struct InstancePassthrough;

impl InstancePassthrough {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventValidator for InstancePassthrough {
    fn test_id(&self) -> &'static str {
        "instance-passthrough"
    }

    async fn execute(&self, _event: &CohortEvent, correlation: &str, recorder: &ReportCollector) {
        recorder.record(
            ConformanceResult::passed(self.test_id(), correlation)
                .with_detail("instance event accepted by placeholder hook"),
        );
    }
}
