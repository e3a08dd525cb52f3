//! Repository connector handles.
//!
//! The harness never talks to a remote repository directly; it holds the
//! opaque connector handles that the enterprise connector manager registers
//! as members join the cohort. The only operation the harness ever invokes
//! on a handle is `disconnect`, during teardown.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a connector handle
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Connector to '{server_name}' refused to disconnect: {reason}")]
    DisconnectRefused { server_name: String, reason: String },

    #[error("Connector to '{server_name}' is already disconnected")]
    AlreadyDisconnected { server_name: String },
}

/// Handle to a remote repository connector
#[async_trait]
pub trait RepositoryConnector: Send + Sync {
    /// Name of the server this connector reaches
    fn server_name(&self) -> &str;

    /// Human-readable connector name, used in audit records
    fn display_name(&self) -> &str;

    /// Release the connection to the remote repository
    async fn disconnect(&self) -> Result<(), ConnectorError>;
}

/// In-process connector used by the replay CLI and by tests.
pub struct InMemoryConnector {
    server_name: String,
    display_name: String,
    fail_disconnect: bool,
    disconnected: AtomicBool,
}

impl InMemoryConnector {
    /// Create a connector reaching the named server
    pub fn new(server_name: impl Into<String>) -> Self {
        let server_name = server_name.into();
        let display_name = format!("in-memory connector to {}", server_name);
        Self {
            server_name,
            display_name,
            fail_disconnect: false,
            disconnected: AtomicBool::new(false),
        }
    }

    /// Override the display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Make `disconnect` fail, simulating a misbehaving cohort member
    pub fn fail_disconnect(mut self, fail: bool) -> Self {
        self.fail_disconnect = fail;
        self
    }

    /// Whether `disconnect` has been called successfully
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryConnector for InMemoryConnector {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        if self.fail_disconnect {
            return Err(ConnectorError::DisconnectRefused {
                server_name: self.server_name.clone(),
                reason: "simulated failure".to_string(),
            });
        }

        if self.disconnected.swap(true, Ordering::SeqCst) {
            return Err(ConnectorError::AlreadyDisconnected {
                server_name: self.server_name.clone(),
            });
        }

        Ok(())
    }
}
