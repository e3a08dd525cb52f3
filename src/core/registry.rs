//! Cohort connector registry.
//!
//! Single source of truth for which remote repository connectors are
//! currently reachable in the cohort and which one, if any, is the
//! technology under test (TUT). Membership callbacks and event dispatch run
//! concurrently, so all state lives behind one async mutex and TUT lookups
//! go through the same lock.
//!
//! Registration is a best-effort pub/sub contract: no operation here
//! returns an error to its caller. Malformed input is a silent no-op and
//! teardown failures are collected, not raised.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audit::{AuditCode, AuditRecord, AuditSink};
use crate::connectors::{ConnectorError, RepositoryConnector};
use crate::domain::EventOrigin;

/// A remote repository currently joined to the cohort
#[derive(Clone)]
pub struct RegisteredConnector {
    /// Primary key assigned by the remote repository
    pub metadata_collection_id: String,

    /// Server name announced by the connector
    pub server_name: String,

    /// The connector handle; released on removal
    pub connector: Arc<dyn RepositoryConnector>,
}

/// Identity of the technology under test, once registered
#[derive(Clone)]
pub struct TutIdentity {
    /// Server name the TUT was matched on
    pub server_name: String,

    /// Metadata collection id the TUT registered with
    pub metadata_collection_id: String,

    /// The TUT's connector handle
    pub connector: Arc<dyn RepositoryConnector>,
}

impl TutIdentity {
    /// Whether an event origin is exactly this TUT.
    ///
    /// Both the server name and the metadata collection id must match; a
    /// matching name with a different collection id is a different
    /// repository on the same server.
    pub fn matches(&self, origin: &EventOrigin) -> bool {
        origin.server_name == self.server_name
            && origin.metadata_collection_id == self.metadata_collection_id
    }
}

/// The local repository's own registration, tracked separately from remotes
#[derive(Clone)]
pub struct LocalRegistration {
    pub metadata_collection_id: String,
    pub connector: Arc<dyn RepositoryConnector>,
}

/// What `add_remote` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRegistration {
    /// The connector handle was absent; nothing was recorded
    Ignored,

    /// A cohort member other than the TUT registered
    Registered,

    /// The technology under test registered; sequencers should activate
    TutRegistered,
}

/// What `remove_remote` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRemoval {
    /// No entry with that collection id existed
    NotFound,

    /// A cohort member other than the TUT departed
    Removed,

    /// The technology under test departed; sequencers should deactivate
    TutDeparted,
}

/// A failure suppressed during `disconnect_all`
#[derive(Debug)]
pub struct DisconnectFailure {
    pub metadata_collection_id: String,
    pub server_name: String,
    pub error: ConnectorError,
}

#[derive(Default)]
struct RegistryState {
    connector_map: HashMap<String, RegisteredConnector>,
    local: Option<LocalRegistration>,
    tut: Option<TutIdentity>,
}

/// Tracks cohort membership and TUT linkage for one test run
pub struct ConnectorRegistry {
    tut_server_name: String,
    audit: Arc<dyn AuditSink>,
    state: Mutex<RegistryState>,
}

impl ConnectorRegistry {
    /// Create a registry that will match the TUT by server name
    pub fn new(tut_server_name: impl Into<String>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            tut_server_name: tut_server_name.into(),
            audit,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Server name that identifies the technology under test
    pub fn tut_server_name(&self) -> &str {
        &self.tut_server_name
    }

    /// Record the local repository's own collection id and connector.
    ///
    /// Always succeeds; local registration is tracked separately from the
    /// remote connector map and is not checked for uniqueness against it.
    pub async fn register_local(
        &self,
        metadata_collection_id: &str,
        connector: Arc<dyn RepositoryConnector>,
    ) {
        let server_name = connector.server_name().to_string();
        {
            let mut state = self.state.lock().await;
            state.local = Some(LocalRegistration {
                metadata_collection_id: metadata_collection_id.to_string(),
                connector,
            });
        }

        debug!(collection = metadata_collection_id, "Local connector registered");
        self.audit
            .record(AuditRecord::new(
                AuditCode::LocalConnectorRegistered,
                format!(
                    "Local repository '{}' registered collection '{}'",
                    server_name, metadata_collection_id
                ),
            ))
            .await;
    }

    /// Insert or overwrite a remote connector registration.
    ///
    /// An absent handle is a silent no-op: best-effort cohort notifications
    /// must never crash the inbound thread. When the connector's server
    /// name equals the configured TUT server name, TUT linkage is set; a
    /// second registration bearing that name overwrites the linkage,
    /// tolerating a TUT restart.
    pub async fn add_remote(
        &self,
        metadata_collection_id: &str,
        connector: Option<Arc<dyn RepositoryConnector>>,
    ) -> RemoteRegistration {
        let Some(connector) = connector else {
            debug!(
                collection = metadata_collection_id,
                "Ignoring remote registration without a connector"
            );
            return RemoteRegistration::Ignored;
        };

        let server_name = connector.server_name().to_string();
        let is_tut = server_name == self.tut_server_name;

        {
            let mut state = self.state.lock().await;
            state.connector_map.insert(
                metadata_collection_id.to_string(),
                RegisteredConnector {
                    metadata_collection_id: metadata_collection_id.to_string(),
                    server_name: server_name.clone(),
                    connector: Arc::clone(&connector),
                },
            );

            if is_tut {
                if let Some(previous) = &state.tut {
                    warn!(
                        previous = previous.metadata_collection_id,
                        replacement = metadata_collection_id,
                        "Replacing existing TUT linkage"
                    );
                }
                state.tut = Some(TutIdentity {
                    server_name: server_name.clone(),
                    metadata_collection_id: metadata_collection_id.to_string(),
                    connector,
                });
            }
        }

        if is_tut {
            info!(
                server = server_name,
                collection = metadata_collection_id,
                "Technology under test registered"
            );
            self.audit
                .record(AuditRecord::new(
                    AuditCode::TutConnectorRegistered,
                    format!(
                        "Technology under test '{}' registered collection '{}'",
                        server_name, metadata_collection_id
                    ),
                ))
                .await;
            RemoteRegistration::TutRegistered
        } else {
            self.audit
                .record(AuditRecord::new(
                    AuditCode::RemoteConnectorRegistered,
                    format!(
                        "Cohort member '{}' registered collection '{}'",
                        server_name, metadata_collection_id
                    ),
                ))
                .await;
            RemoteRegistration::Registered
        }
    }

    /// Remove a remote connector registration.
    ///
    /// Idempotent: removing an unknown collection id is a no-op. If the
    /// departing entry held the TUT linkage, the linkage is cleared and the
    /// caller is told, so the sequencers can fall back to buffering.
    pub async fn remove_remote(&self, metadata_collection_id: &str) -> RemoteRemoval {
        let (removed, was_tut) = {
            let mut state = self.state.lock().await;
            let removed = state.connector_map.remove(metadata_collection_id);

            let was_tut = state
                .tut
                .as_ref()
                .is_some_and(|tut| tut.metadata_collection_id == metadata_collection_id);
            if was_tut {
                state.tut = None;
            }

            (removed, was_tut)
        };

        let Some(removed) = removed else {
            debug!(
                collection = metadata_collection_id,
                "Ignoring removal of unknown collection"
            );
            return RemoteRemoval::NotFound;
        };

        if was_tut {
            warn!(
                server = removed.server_name,
                collection = metadata_collection_id,
                "Technology under test departed"
            );
            self.audit
                .record(AuditRecord::new(
                    AuditCode::TutConnectorDeparted,
                    format!(
                        "Technology under test '{}' left the cohort",
                        removed.server_name
                    ),
                ))
                .await;
            RemoteRemoval::TutDeparted
        } else {
            self.audit
                .record(AuditRecord::new(
                    AuditCode::RemoteConnectorDeparted,
                    format!("Cohort member '{}' left the cohort", removed.server_name),
                ))
                .await;
            RemoteRemoval::Removed
        }
    }

    /// Disconnect every registered connector and empty the registry.
    ///
    /// Shutdown is unconditional: a connector that refuses to disconnect is
    /// reported in the returned list but never blocks the teardown of the
    /// others. Afterwards the connector map is empty and TUT linkage is
    /// cleared regardless of individual failures.
    pub async fn disconnect_all(&self) -> Vec<DisconnectFailure> {
        let snapshot: Vec<RegisteredConnector> = {
            let state = self.state.lock().await;
            state.connector_map.values().cloned().collect()
        };

        let mut failures = Vec::new();

        for entry in snapshot {
            if let Err(error) = entry.connector.disconnect().await {
                warn!(
                    server = entry.server_name,
                    error = %error,
                    "Connector failed to disconnect during teardown"
                );
                self.audit
                    .record(AuditRecord::new(
                        AuditCode::CohortDisconnectFailed,
                        format!(
                            "Connector to '{}' failed to disconnect: {}",
                            entry.server_name, error
                        ),
                    ))
                    .await;
                failures.push(DisconnectFailure {
                    metadata_collection_id: entry.metadata_collection_id.clone(),
                    server_name: entry.server_name.clone(),
                    error,
                });
            }

            self.remove_remote(&entry.metadata_collection_id).await;
        }

        // Entries registered while the teardown loop ran are dropped
        // without a disconnect attempt; the map must end empty.
        {
            let mut state = self.state.lock().await;
            state.connector_map.clear();
            state.tut = None;
            state.local = None;
        }

        info!(failures = failures.len(), "Cohort registry torn down");
        failures
    }

    /// Current TUT identity, cloned out of the lock.
    ///
    /// The sequencer queries this at dispatch time rather than caching it,
    /// so a departure between two events is observed immediately.
    pub async fn tut_identity(&self) -> Option<TutIdentity> {
        self.state.lock().await.tut.clone()
    }

    /// Whether the TUT connector is currently registered
    pub async fn is_tut_registered(&self) -> bool {
        self.state.lock().await.tut.is_some()
    }

    /// Number of remote connectors currently registered
    pub async fn registered_count(&self) -> usize {
        self.state.lock().await.connector_map.len()
    }

    /// The local repository's registration, if recorded
    pub async fn local_registration(&self) -> Option<LocalRegistration> {
        self.state.lock().await.local.clone()
    }
}
