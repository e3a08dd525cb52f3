//! Cohort event envelope types.
//!
//! Notifications arriving from the cohort event bus are decoded into a
//! tagged envelope before they reach the sequencer. Unknown payload shapes
//! land in an explicit `Unrecognized` arm and are skipped rather than
//! rejected: cohort members may run ahead of (or behind) the local
//! type-definition knowledge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an event came from.
///
/// The pair of server name and metadata collection id identifies the
/// publishing repository. Both must match the registered technology under
/// test before TUT-specific probes run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOrigin {
    /// Name of the server that published the event
    pub server_name: String,

    /// Metadata collection id of the publishing repository
    pub metadata_collection_id: String,
}

impl EventOrigin {
    pub fn new(
        server_name: impl Into<String>,
        metadata_collection_id: impl Into<String>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            metadata_collection_id: metadata_collection_id.into(),
        }
    }
}

/// Event categories sequenced independently of each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Schema-level change announcements
    TypeDef,

    /// Entity/relationship instance announcements
    Instance,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeDef => "typedef",
            Self::Instance => "instance",
        }
    }
}

/// A single notification received from the cohort event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_kind", rename_all = "snake_case")]
pub enum CohortEvent {
    /// Cohort membership gossip; carried on the same bus but not sequenced
    Registry(RegistryEvent),

    /// A type-definition announcement
    TypeDef(TypeDefEvent),

    /// An instance announcement
    Instance(InstanceEvent),
}

impl CohortEvent {
    /// Create a type-definition event with the current timestamp
    pub fn type_def(origin: EventOrigin, payload: TypeDefPayload) -> Self {
        Self::TypeDef(TypeDefEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            origin,
            payload,
        })
    }

    /// Create an instance event with the current timestamp
    pub fn instance(origin: EventOrigin, payload: InstancePayload) -> Self {
        Self::Instance(InstanceEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            origin,
            payload,
        })
    }

    /// Create a registry gossip event with the current timestamp
    pub fn registry(origin: EventOrigin, kind: RegistryEventKind) -> Self {
        Self::Registry(RegistryEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            origin,
            kind,
        })
    }

    /// Origin of the event, regardless of kind
    pub fn origin(&self) -> &EventOrigin {
        match self {
            Self::Registry(e) => &e.origin,
            Self::TypeDef(e) => &e.origin,
            Self::Instance(e) => &e.origin,
        }
    }

    /// Sequencing category; `None` for registry gossip
    pub fn category(&self) -> Option<EventCategory> {
        match self {
            Self::Registry(_) => None,
            Self::TypeDef(_) => Some(EventCategory::TypeDef),
            Self::Instance(_) => Some(EventCategory::Instance),
        }
    }
}

/// Cohort membership gossip (registration, refresh, deregistration)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When the event was published
    pub timestamp: DateTime<Utc>,

    /// Publishing repository
    pub origin: EventOrigin,

    /// What kind of membership notice this is
    pub kind: RegistryEventKind,
}

/// Kinds of membership gossip carried on the cohort bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryEventKind {
    /// A member announced itself to the cohort
    Registration,

    /// A member asked the cohort to re-send registrations
    RefreshRequest,

    /// A member left the cohort
    Deregistration,
}

/// A schema-level change announcement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When the event was published
    pub timestamp: DateTime<Utc>,

    /// Publishing repository
    pub origin: EventOrigin,

    /// The announced definition
    pub payload: TypeDefPayload,
}

/// Payload carried by a type-definition event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "def_kind", rename_all = "snake_case")]
pub enum TypeDefPayload {
    /// A full type definition
    TypeDef(TypeDef),

    /// An attribute type definition
    AttributeTypeDef(AttributeTypeDef),

    /// A payload shape this harness does not know; skipped, never an error
    #[serde(other)]
    Unrecognized,
}

impl TypeDefPayload {
    /// Name of the announced definition, if the payload is recognized
    pub fn def_name(&self) -> Option<&str> {
        match self {
            Self::TypeDef(def) => Some(&def.name),
            Self::AttributeTypeDef(def) => Some(&def.name),
            Self::Unrecognized => None,
        }
    }

    /// Stable guid of the announced definition
    pub fn def_guid(&self) -> Option<&str> {
        match self {
            Self::TypeDef(def) => Some(&def.guid),
            Self::AttributeTypeDef(def) => Some(&def.guid),
            Self::Unrecognized => None,
        }
    }

    /// Version of the announced definition
    pub fn def_version(&self) -> Option<u64> {
        match self {
            Self::TypeDef(def) => Some(def.version),
            Self::AttributeTypeDef(def) => Some(def.version),
            Self::Unrecognized => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }
}

/// A full type definition announced by a cohort member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Stable identifier assigned when the def was first created
    pub guid: String,

    /// Unique name of the definition
    pub name: String,

    /// Monotonic version of the definition
    pub version: u64,

    /// What the definition describes
    pub category: TypeDefCategory,
}

/// Categories of full type definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDefCategory {
    Entity,
    Relationship,
    Classification,
}

/// An attribute type definition announced by a cohort member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeTypeDef {
    /// Stable identifier assigned when the def was first created
    pub guid: String,

    /// Unique name of the definition
    pub name: String,

    /// Monotonic version of the definition
    pub version: u64,

    /// What the definition describes
    pub category: AttributeTypeDefCategory,
}

/// Categories of attribute type definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeTypeDefCategory {
    Primitive,
    Collection,
    EnumDef,
}

/// A data-level change announcement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When the event was published
    pub timestamp: DateTime<Utc>,

    /// Publishing repository
    pub origin: EventOrigin,

    /// The announced instance
    pub payload: InstancePayload,
}

/// Payload carried by an instance event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "instance_kind", rename_all = "snake_case")]
pub enum InstancePayload {
    /// An entity instance
    Entity(EntityDetail),

    /// A relationship instance between two entities
    Relationship(RelationshipDetail),

    /// A payload shape this harness does not know; skipped, never an error
    #[serde(other)]
    Unrecognized,
}

impl InstancePayload {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }
}

/// An entity instance announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDetail {
    /// Instance guid
    pub guid: String,

    /// Name of the entity's type definition
    pub type_name: String,
}

/// A relationship instance announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDetail {
    /// Instance guid
    pub guid: String,

    /// Name of the relationship's type definition
    pub type_name: String,

    /// Entity guid at end one
    pub end_one_guid: String,

    /// Entity guid at end two
    pub end_two_guid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typedef_event_round_trip() {
        let event = CohortEvent::type_def(
            EventOrigin::new("serverA", "coll-1"),
            TypeDefPayload::TypeDef(TypeDef {
                guid: "guid-1".to_string(),
                name: "Asset".to_string(),
                version: 1,
                category: TypeDefCategory::Entity,
            }),
        );

        let json = serde_json::to_string(&event).unwrap();
        let parsed: CohortEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.category(), Some(EventCategory::TypeDef));
        assert_eq!(parsed.origin().server_name, "serverA");
        assert_eq!(parsed.origin().metadata_collection_id, "coll-1");
    }

    #[test]
    fn test_unknown_payload_deserializes_as_unrecognized() {
        let json = r#"{
            "event_kind": "type_def",
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "timestamp": "2026-01-01T00:00:00Z",
            "origin": {"server_name": "s", "metadata_collection_id": "c"},
            "payload": {"def_kind": "relationship_def_patch"}
        }"#;

        let parsed: CohortEvent = serde_json::from_str(json).unwrap();
        match parsed {
            CohortEvent::TypeDef(e) => assert!(!e.payload.is_recognized()),
            other => panic!("unexpected event kind: {:?}", other),
        }
    }

    #[test]
    fn test_registry_event_has_no_category() {
        let event = CohortEvent::registry(
            EventOrigin::new("serverB", "coll-2"),
            RegistryEventKind::Registration,
        );

        assert_eq!(event.category(), None);
    }

    #[test]
    fn test_instance_event_round_trip() {
        let event = CohortEvent::instance(
            EventOrigin::new("serverA", "coll-1"),
            InstancePayload::Relationship(RelationshipDetail {
                guid: "rel-1".to_string(),
                type_name: "SemanticAssignment".to_string(),
                end_one_guid: "e1".to_string(),
                end_two_guid: "e2".to_string(),
            }),
        );

        let json = serde_json::to_string(&event).unwrap();
        let parsed: CohortEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.category(), Some(EventCategory::Instance));
    }
}
