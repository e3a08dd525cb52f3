//! Core sequencing and registration logic.
//!
//! This module contains:
//! - ConnectorRegistry: cohort membership and TUT linkage
//! - EventSequencer: buffer-then-dispatch ordering per event category
//! - CohortHarness: the context object owning both, plus the inbound pump

pub mod harness;
pub mod registry;
pub mod sequencer;

// Re-export commonly used types
pub use harness::{CohortHarness, PumpHandle};
pub use registry::{
    ConnectorRegistry, DisconnectFailure, LocalRegistration, RegisteredConnector,
    RemoteRegistration, RemoteRemoval, TutIdentity,
};
pub use sequencer::{EventSequencer, SequencerMode};
