//! Buffer-then-dispatch event sequencing.
//!
//! One sequencer instance serves one event category. Until the technology
//! under test registers, inbound events accumulate in a FIFO buffer; on
//! activation the buffer is replayed in arrival order, and from then on
//! events are dispatched as they arrive. Each dispatched event passes the
//! universal screening probes, and events originating from the TUT
//! additionally pass the category's conformance probes.
//!
//! The mode flag, the buffer and the event counter share a single lock:
//! the activation drain holds it end to end, so an event arriving mid-drain
//! waits and is then dispatched after the replayed backlog, never stranded
//! in a cleared buffer. Holding the lock across dispatch also gives the
//! per-category ordering guarantee the stateful probes rely on.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::audit::{AuditCode, AuditRecord, AuditSink};
use crate::domain::{CohortEvent, EventCategory};
use crate::report::ReportCollector;
use crate::validators::EventValidator;

use super::registry::ConnectorRegistry;

/// Dispatch state of one sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerMode {
    /// TUT not registered; events accumulate in the buffer
    Buffering,

    /// TUT registered; events dispatch immediately
    Dispatching,
}

struct SequencerState {
    mode: SequencerMode,
    buffer: VecDeque<CohortEvent>,
    event_counter: u64,
    dispatched: u64,
}

/// Orders and validates one category of cohort events
pub struct EventSequencer {
    category: EventCategory,
    registry: Arc<ConnectorRegistry>,
    screeners: Vec<Arc<dyn EventValidator>>,
    tut_probes: Vec<Arc<dyn EventValidator>>,
    recorder: Arc<ReportCollector>,
    audit: Arc<dyn AuditSink>,
    probe_timeout: Option<Duration>,
    state: Mutex<SequencerState>,
}

impl EventSequencer {
    /// Create a sequencer for one category, initially buffering
    pub fn new(
        category: EventCategory,
        registry: Arc<ConnectorRegistry>,
        recorder: Arc<ReportCollector>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            category,
            registry,
            screeners: Vec::new(),
            tut_probes: Vec::new(),
            recorder,
            audit,
            probe_timeout: None,
            state: Mutex::new(SequencerState {
                mode: SequencerMode::Buffering,
                buffer: VecDeque::new(),
                event_counter: 0,
                dispatched: 0,
            }),
        }
    }

    /// Add a probe that runs for every dispatched event
    pub fn with_screener(mut self, probe: Arc<dyn EventValidator>) -> Self {
        self.screeners.push(probe);
        self
    }

    /// Add a probe that runs only for events originating from the TUT
    pub fn with_tut_probe(mut self, probe: Arc<dyn EventValidator>) -> Self {
        self.tut_probes.push(probe);
        self
    }

    /// Bound each probe's execution time; unset means unbounded
    pub fn with_probe_timeout(mut self, limit: Option<Duration>) -> Self {
        self.probe_timeout = limit;
        self
    }

    /// Category this sequencer serves
    pub fn category(&self) -> EventCategory {
        self.category
    }

    /// Receive one event from the cohort bus.
    ///
    /// Registry gossip and events of another category are skipped. While
    /// buffering, the event is appended and no probes run; while
    /// dispatching, the event is validated before this call returns.
    pub async fn on_event(&self, event: CohortEvent) {
        match event.category() {
            Some(category) if category == self.category => {}
            _ => {
                debug!(
                    category = self.category.as_str(),
                    "Skipping event outside this sequencer's category"
                );
                return;
            }
        }

        let mut state = self.state.lock().await;
        match state.mode {
            SequencerMode::Buffering => {
                state.buffer.push_back(event);
                debug!(
                    category = self.category.as_str(),
                    buffered = state.buffer.len(),
                    "Buffered event while TUT is unregistered"
                );
            }
            SequencerMode::Dispatching => {
                self.dispatch(&mut state, &event).await;
            }
        }
    }

    /// Switch to dispatching and replay the buffered backlog.
    ///
    /// Called when the TUT registers. The flag flip and the drain happen
    /// under the state lock; each replayed event gets its own counter
    /// value, in original arrival order.
    pub async fn activate(&self) {
        let mut state = self.state.lock().await;
        if state.mode == SequencerMode::Dispatching {
            return;
        }
        state.mode = SequencerMode::Dispatching;

        let backlog: Vec<CohortEvent> = state.buffer.drain(..).collect();
        for event in &backlog {
            self.dispatch(&mut state, event).await;
        }

        info!(
            category = self.category.as_str(),
            replayed = backlog.len(),
            "Sequencer activated"
        );
        if !backlog.is_empty() {
            self.audit
                .record(AuditRecord::new(
                    AuditCode::EventBufferFlushed,
                    format!(
                        "Replayed {} buffered {} event(s) in arrival order",
                        backlog.len(),
                        self.category.as_str()
                    ),
                ))
                .await;
        }
    }

    /// Fall back to buffering.
    ///
    /// Called when the TUT departs. There is nothing to replay on this
    /// transition; subsequent events accumulate until the next activation.
    pub async fn deactivate(&self) {
        let mut state = self.state.lock().await;
        if state.mode == SequencerMode::Buffering {
            return;
        }
        state.mode = SequencerMode::Buffering;
        debug!(category = self.category.as_str(), "Sequencer deactivated");
    }

    /// Current dispatch mode
    pub async fn mode(&self) -> SequencerMode {
        self.state.lock().await.mode
    }

    /// Number of events waiting in the buffer
    pub async fn buffered_len(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    /// Number of events dispatched so far
    pub async fn events_dispatched(&self) -> u64 {
        self.state.lock().await.dispatched
    }

    /// Validate one event: screening always, TUT probes on an exact origin
    /// match against the registry's current TUT identity.
    async fn dispatch(&self, state: &mut SequencerState, event: &CohortEvent) {
        state.event_counter += 1;
        let correlation = format!("event-{}", state.event_counter);

        for probe in &self.screeners {
            self.run_probe(probe.as_ref(), event, &correlation).await;
        }

        if let Some(tut) = self.registry.tut_identity().await {
            if tut.matches(event.origin()) {
                for probe in &self.tut_probes {
                    self.run_probe(probe.as_ref(), event, &correlation).await;
                }
            }
        }

        state.dispatched += 1;
    }

    async fn run_probe(&self, probe: &dyn EventValidator, event: &CohortEvent, correlation: &str) {
        match self.probe_timeout {
            None => probe.execute(event, correlation, &self.recorder).await,
            Some(limit) => {
                let execution = probe.execute(event, correlation, &self.recorder);
                if timeout(limit, execution).await.is_err() {
                    warn!(
                        test_id = probe.test_id(),
                        correlation,
                        "Probe exceeded its execution budget"
                    );
                    self.audit
                        .record(AuditRecord::new(
                            AuditCode::ProbeTimedOut,
                            format!(
                                "Probe '{}' exceeded {:?} on {}",
                                probe.test_id(),
                                limit,
                                correlation
                            ),
                        ))
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NullAuditSink;
    use crate::connectors::{InMemoryConnector, RepositoryConnector};
    use crate::domain::{EventOrigin, InstancePayload, TypeDef, TypeDefCategory, TypeDefPayload};

    fn connector(server: &str) -> Arc<dyn RepositoryConnector> {
        Arc::new(InMemoryConnector::new(server))
    }

    fn type_def_event(server: &str, collection: &str, name: &str) -> CohortEvent {
        CohortEvent::type_def(
            EventOrigin::new(server, collection),
            TypeDefPayload::TypeDef(TypeDef {
                guid: format!("guid-{}", name),
                name: name.to_string(),
                version: 1,
                category: TypeDefCategory::Entity,
            }),
        )
    }

    fn sequencer(registry: Arc<ConnectorRegistry>) -> EventSequencer {
        EventSequencer::new(
            EventCategory::TypeDef,
            registry,
            Arc::new(ReportCollector::new()),
            Arc::new(NullAuditSink::new()),
        )
    }

    #[tokio::test]
    async fn test_initial_mode_is_buffering() {
        let registry = Arc::new(ConnectorRegistry::new(
            "tutServer",
            Arc::new(NullAuditSink::new()),
        ));
        let sequencer = sequencer(registry);

        assert_eq!(sequencer.mode().await, SequencerMode::Buffering);

        sequencer
            .on_event(type_def_event("other", "collX", "Asset"))
            .await;
        assert_eq!(sequencer.buffered_len().await, 1);
        assert_eq!(sequencer.events_dispatched().await, 0);
    }

    #[tokio::test]
    async fn test_wrong_category_is_skipped() {
        let registry = Arc::new(ConnectorRegistry::new(
            "tutServer",
            Arc::new(NullAuditSink::new()),
        ));
        let sequencer = sequencer(registry);

        sequencer
            .on_event(CohortEvent::instance(
                EventOrigin::new("other", "collX"),
                InstancePayload::Unrecognized,
            ))
            .await;

        assert_eq!(sequencer.buffered_len().await, 0);
    }

    #[tokio::test]
    async fn test_activate_drains_and_counts() {
        let registry = Arc::new(ConnectorRegistry::new(
            "tutServer",
            Arc::new(NullAuditSink::new()),
        ));
        let sequencer = sequencer(Arc::clone(&registry));

        sequencer
            .on_event(type_def_event("other", "collX", "Asset"))
            .await;
        sequencer
            .on_event(type_def_event("other", "collX", "Process"))
            .await;

        registry.add_remote("collA", Some(connector("tutServer"))).await;
        sequencer.activate().await;

        assert_eq!(sequencer.mode().await, SequencerMode::Dispatching);
        assert_eq!(sequencer.buffered_len().await, 0);
        assert_eq!(sequencer.events_dispatched().await, 2);

        // Counter keeps climbing across the transition
        sequencer
            .on_event(type_def_event("other", "collX", "Glossary"))
            .await;
        assert_eq!(sequencer.events_dispatched().await, 3);
    }

    #[tokio::test]
    async fn test_activate_twice_is_idempotent() {
        let registry = Arc::new(ConnectorRegistry::new(
            "tutServer",
            Arc::new(NullAuditSink::new()),
        ));
        let sequencer = sequencer(registry);

        sequencer.activate().await;
        sequencer.activate().await;

        assert_eq!(sequencer.mode().await, SequencerMode::Dispatching);
    }

    #[tokio::test]
    async fn test_deactivate_resumes_buffering() {
        let registry = Arc::new(ConnectorRegistry::new(
            "tutServer",
            Arc::new(NullAuditSink::new()),
        ));
        let sequencer = sequencer(registry);

        sequencer.activate().await;
        sequencer.deactivate().await;

        sequencer
            .on_event(type_def_event("other", "collX", "Asset"))
            .await;
        assert_eq!(sequencer.buffered_len().await, 1);
        assert_eq!(sequencer.events_dispatched().await, 0);
    }
}
