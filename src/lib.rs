//! cohort-harness - Conformance harness for metadata cohort members
//!
//! A harness that validates one member of a distributed metadata cohort
//! (the "technology under test", TUT) by observing the events it publishes
//! to the cohort bus.
//!
//! # Architecture
//!
//! The system is built around buffer-then-replay sequencing:
//! - Events arriving before the TUT registers are buffered in arrival order
//! - On registration the backlog replays, then events dispatch immediately
//! - Each dispatched event runs through pluggable conformance probes
//!
//! # Modules
//!
//! - `core`: Registry, sequencer and harness context
//! - `domain`: Event envelope types
//! - `connectors`: Repository connector handles
//! - `validators`: Conformance probes
//! - `report`: Recorded verdicts
//! - `audit`: Structured audit records
//! - `cli`: Recorded-session replay command
//!
//! # Usage
//!
//! ```bash
//! # Replay a recorded cohort session and report conformance
//! cohort-harness replay --events session.jsonl --tut-server tutServer
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod connectors;
pub mod core;
pub mod domain;
pub mod report;
pub mod validators;

// Re-export main types at crate root for convenience
pub use config::HarnessConfig;
pub use core::{CohortHarness, ConnectorRegistry, EventSequencer, SequencerMode};
pub use domain::{CohortEvent, EventCategory, EventOrigin};
pub use report::{ConformanceResult, ReportCollector, ReportSummary, Verdict};
