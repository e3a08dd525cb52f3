//! Harness context for one conformance run.
//!
//! [`CohortHarness`] is the explicitly constructed object that owns the
//! registry, one sequencer per event category, the report collector and
//! the audit sink. The enterprise connector manager drives the lifecycle
//! entry points; the cohort bus (or the pump worker) drives
//! `process_event`. Nothing here reaches into ambient state.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::audit::AuditSink;
use crate::config::HarnessConfig;
use crate::connectors::RepositoryConnector;
use crate::domain::{CohortEvent, EventCategory};
use crate::report::ReportCollector;
use crate::validators::{
    InstancePassthrough, InstanceScreening, TypeDefConsistency, TypeDefScreening,
    TypeDefSupported,
};

use super::registry::{ConnectorRegistry, DisconnectFailure, RemoteRegistration, RemoteRemoval};
use super::sequencer::EventSequencer;

/// Owns the registry and sequencers for one conformance run
pub struct CohortHarness {
    config: HarnessConfig,
    registry: Arc<ConnectorRegistry>,
    typedef_sequencer: EventSequencer,
    instance_sequencer: EventSequencer,
    report: Arc<ReportCollector>,
}

impl CohortHarness {
    /// Build a harness with the standard probe sets for both categories
    pub fn new(config: HarnessConfig, audit: Arc<dyn AuditSink>) -> Self {
        let registry = Arc::new(ConnectorRegistry::new(
            config.tut_server_name.clone(),
            Arc::clone(&audit),
        ));
        let report = Arc::new(ReportCollector::new());

        let typedef_sequencer = EventSequencer::new(
            EventCategory::TypeDef,
            Arc::clone(&registry),
            Arc::clone(&report),
            Arc::clone(&audit),
        )
        .with_screener(Arc::new(TypeDefScreening::new()))
        .with_tut_probe(Arc::new(TypeDefSupported::new()))
        .with_tut_probe(Arc::new(TypeDefConsistency::new()))
        .with_probe_timeout(config.probe_timeout);

        let instance_sequencer = EventSequencer::new(
            EventCategory::Instance,
            Arc::clone(&registry),
            Arc::clone(&report),
            Arc::clone(&audit),
        )
        .with_screener(Arc::new(InstanceScreening::new()))
        .with_tut_probe(Arc::new(InstancePassthrough::new()))
        .with_probe_timeout(config.probe_timeout);

        Self {
            config,
            registry,
            typedef_sequencer,
            instance_sequencer,
            report,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectorRegistry> {
        &self.registry
    }

    pub fn report(&self) -> &Arc<ReportCollector> {
        &self.report
    }

    pub fn typedef_sequencer(&self) -> &EventSequencer {
        &self.typedef_sequencer
    }

    pub fn instance_sequencer(&self) -> &EventSequencer {
        &self.instance_sequencer
    }

    /// Record the local repository's own connector
    #[instrument(skip(self, connector), fields(collection = metadata_collection_id))]
    pub async fn set_local_connector(
        &self,
        metadata_collection_id: &str,
        connector: Arc<dyn RepositoryConnector>,
    ) {
        self.registry
            .register_local(metadata_collection_id, connector)
            .await;
    }

    /// A remote cohort member announced itself.
    ///
    /// If the member is the technology under test, both sequencers are
    /// activated and their buffered backlogs replay before this call
    /// returns.
    #[instrument(skip(self, connector), fields(collection = metadata_collection_id))]
    pub async fn add_remote_connector(
        &self,
        metadata_collection_id: &str,
        connector: Option<Arc<dyn RepositoryConnector>>,
    ) -> RemoteRegistration {
        let outcome = self
            .registry
            .add_remote(metadata_collection_id, connector)
            .await;

        if outcome == RemoteRegistration::TutRegistered {
            self.typedef_sequencer.activate().await;
            self.instance_sequencer.activate().await;
        }

        outcome
    }

    /// A remote cohort member left.
    ///
    /// If the departing member held the TUT linkage, both sequencers fall
    /// back to buffering.
    #[instrument(skip(self), fields(collection = metadata_collection_id))]
    pub async fn remove_remote_connector(&self, metadata_collection_id: &str) -> RemoteRemoval {
        let outcome = self.registry.remove_remote(metadata_collection_id).await;

        if outcome == RemoteRemoval::TutDeparted {
            self.typedef_sequencer.deactivate().await;
            self.instance_sequencer.deactivate().await;
        }

        outcome
    }

    /// Route one inbound event to its category's sequencer
    pub async fn process_event(&self, event: CohortEvent) {
        match event.category() {
            Some(EventCategory::TypeDef) => self.typedef_sequencer.on_event(event).await,
            Some(EventCategory::Instance) => self.instance_sequencer.on_event(event).await,
            None => {
                debug!(
                    server = event.origin().server_name,
                    "Ignoring registry gossip event"
                );
            }
        }
    }

    /// Tear down the cohort registration and suspend both sequencers.
    ///
    /// Returns the disconnect failures that were suppressed so the caller
    /// can report them; teardown itself always completes.
    #[instrument(skip(self))]
    pub async fn disconnect_all(&self) -> Vec<DisconnectFailure> {
        let failures = self.registry.disconnect_all().await;
        self.typedef_sequencer.deactivate().await;
        self.instance_sequencer.deactivate().await;
        failures
    }

    /// Spawn the inbound pump: a dedicated worker that consumes events from
    /// a bounded channel and feeds them through `process_event` one at a
    /// time, freeing the event-delivery thread from probe execution while
    /// the single consumer preserves arrival order.
    pub fn spawn_pump(self: &Arc<Self>) -> (mpsc::Sender<CohortEvent>, PumpHandle) {
        let (event_tx, mut event_rx) = mpsc::channel::<CohortEvent>(self.config.pump_capacity);
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        let harness = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        // Drain whatever is already queued, then exit
                        while let Ok(event) = event_rx.try_recv() {
                            harness.process_event(event).await;
                        }
                        info!("Inbound pump stopping");
                        break;
                    }
                    maybe_event = event_rx.recv() => match maybe_event {
                        Some(event) => harness.process_event(event).await,
                        None => break,
                    }
                }
            }
        });

        (event_tx, PumpHandle { stop_tx, task })
    }
}

/// Handle to control the inbound pump
pub struct PumpHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl PumpHandle {
    /// Stop the pump after draining already-queued events
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NullAuditSink;
    use crate::connectors::InMemoryConnector;
    use crate::domain::{EventOrigin, RegistryEventKind, TypeDef, TypeDefCategory, TypeDefPayload};

    fn harness() -> Arc<CohortHarness> {
        Arc::new(CohortHarness::new(
            HarnessConfig::new("tutServer"),
            Arc::new(NullAuditSink::new()),
        ))
    }

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

    #[tokio::test]
    async fn test_registry_gossip_is_ignored() {
        let harness = harness();

        harness
            .process_event(CohortEvent::registry(
                EventOrigin::new("other", "collX"),
                RegistryEventKind::Registration,
            ))
            .await;

        assert_eq!(harness.typedef_sequencer().buffered_len().await, 0);
        assert_eq!(harness.instance_sequencer().buffered_len().await, 0);
    }

    #[tokio::test]
    async fn test_tut_registration_activates_both_sequencers() {
        let harness = harness();
        harness
            .process_event(type_def_event("other", "collX", "Asset"))
            .await;

        let outcome = harness
            .add_remote_connector("collA", Some(connector("tutServer")))
            .await;

        assert_eq!(outcome, RemoteRegistration::TutRegistered);
        assert_eq!(harness.typedef_sequencer().buffered_len().await, 0);
        assert_eq!(harness.typedef_sequencer().events_dispatched().await, 1);
        assert_eq!(
            harness.instance_sequencer().mode().await,
            crate::core::SequencerMode::Dispatching
        );
    }

    #[tokio::test]
    async fn test_pump_preserves_arrival_order() {
        let harness = harness();
        harness
            .add_remote_connector("collA", Some(connector("tutServer")))
            .await;

        let (tx, pump) = harness.spawn_pump();
        for name in ["First", "Second", "Third"] {
            tx.send(type_def_event("other", "collX", name)).await.unwrap();
        }
        drop(tx);
        pump.stop().await.unwrap();

        let screened: Vec<String> = harness
            .report()
            .results()
            .into_iter()
            .filter(|r| r.test_id == "typedef-screening")
            .filter_map(|r| r.detail)
            .collect();
        assert_eq!(screened, vec!["First", "Second", "Third"]);
    }
}
