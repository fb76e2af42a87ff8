use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in the journal timeline. Never mutated after creation
/// except for the UI-only `open` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEvent {
    pub id: String,
    pub owner_id: String,
    /// Canonical ISO-8601 UTC instant with millisecond precision;
    /// lexicographic order equals chronological order.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<EventKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
    pub display_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<JournalEvent>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_line: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub open: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl JournalEvent {
    pub fn new_local(
        owner_id: &str,
        timestamp: String,
        kind: Option<EventKind>,
        metadata: Option<EventMetadata>,
        display_text: String,
        source_line: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            timestamp,
            kind,
            metadata,
            display_text,
            children: Vec::new(),
            source_line: source_line.to_string(),
            open: false,
        }
    }

    pub fn death_metadata(&self) -> Option<&DeathMetadata> {
        match self.metadata.as_ref() {
            Some(EventMetadata::Death(metadata)) => Some(metadata),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ActorDeath,
    Destruction,
    VehicleControlFlow,
    KillingSpree,
}

/// Structured payload whose shape follows the event kind, so the wire
/// form stays untagged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventMetadata {
    Death(DeathMetadata),
    VehicleDestruction(DestructionMetadata),
    Spree(SpreeMetadata),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeathMetadata {
    pub victim_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub victim_id: Option<String>,
    pub killer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub killer_id: Option<String>,
    pub zone: String,
    pub weapon: String,
    pub weapon_class: String,
    pub damage_type: String,
    pub direction: ImpactDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImpactDirection {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestructionMetadata {
    pub vehicle_name: String,
    pub ship_type: String,
    pub destroyer_name: String,
    pub destroy_level_from: u32,
    pub destroy_level_to: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreeMetadata {
    pub killer_name: String,
    pub kill_count: usize,
}
