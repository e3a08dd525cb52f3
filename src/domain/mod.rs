//! Domain types for the cohort harness.
//!
//! This module contains the event envelope: the tagged union of cohort
//! notifications plus the payload shapes each category carries.

pub mod events;

// Re-export commonly used types
pub use events::{
    AttributeTypeDef, AttributeTypeDefCategory, CohortEvent, EntityDetail, EventCategory,
    EventOrigin, InstanceEvent, InstancePayload, RegistryEvent, RegistryEventKind,
    RelationshipDetail, TypeDef, TypeDefCategory, TypeDefEvent, TypeDefPayload,
};
