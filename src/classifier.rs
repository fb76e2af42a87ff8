use regex::Regex;

use crate::event::{
    DeathMetadata, DestructionMetadata, EventKind, EventMetadata, ImpactDirection, JournalEvent,
};
use crate::timestamp::normalize_timestamp;

const NPC_MARKER: &str = "npc";
const UNKNOWN_MARKER: &str = "unknown";
const ANONYMIZED_NPC_NAME: &str = "an NPC";
const UNKNOWN_ENTITY_NAME: &str = "an unknown entity";

pub const VEHICLE_DESTRUCTION_DAMAGE_TYPE: &str = "VehicleDestruction";

// Matched case-insensitively by substring; the raw name passes through
// when nothing matches.
const SHIP_TYPES: &[(&str, &str)] = &[
    ("aegs_avenger", "Aegis Avenger"),
    ("aegs_gladius", "Aegis Gladius"),
    ("aegs_sabre", "Aegis Sabre"),
    ("anvl_hornet", "Anvil Hornet"),
    ("anvl_arrow", "Anvil Arrow"),
    ("drak_cutlass", "Drake Cutlass"),
    ("drak_buccaneer", "Drake Buccaneer"),
    ("misc_freelancer", "MISC Freelancer"),
    ("orig_m50", "Origin M50"),
    ("orig_300", "Origin 300 Series"),
    ("rsi_constellation", "RSI Constellation"),
    ("cnou_mustang", "C.O. Mustang"),
    ("banu_defender", "Banu Defender"),
    ("vncl_scythe", "Vanduul Scythe"),
];

lazy_static::lazy_static! {
    static ref LINE_TIMESTAMP: Regex =
        Regex::new(r"^<([^>]+)>").expect("line timestamp pattern is valid");
    static ref LOGIN: Regex = Regex::new(
        r"<AccountLoginCharacterStatus_Character>.*?name ([A-Za-z0-9_-]+)"
    )
    .expect("login pattern is valid");
    static ref LOGIN_ENTITY_ID: Regex =
        Regex::new(r"geid (\d+)").expect("login entity id pattern is valid");
    static ref INVENTORY_REQUEST: Regex = Regex::new(
        r"<RequestLocationInventory>.*?Player\[([A-Za-z0-9_-]+)\]"
    )
    .expect("inventory request pattern is valid");
    static ref ACTOR_DEATH: Regex = Regex::new(
        r"CActor::Kill: '([^']+)' \[(\d+)\] in zone '([^']+)' killed by '([^']+)' \[(\d+)\] using '([^']+)' \[Class ([^\]]+)\] with damage type '([^']+)' from direction x: ([-0-9.]+), y: ([-0-9.]+), z: ([-0-9.]+)"
    )
    .expect("actor death pattern is valid");
    static ref VEHICLE_DESTRUCTION: Regex = Regex::new(
        r"CVehicle::OnAdvanceDestroyLevel: Vehicle '([^']+)'.*? advanced from destroy level (\d+) to (\d+) caused by '([^']+)'"
    )
    .expect("vehicle destruction pattern is valid");
    static ref SHIP_DESTRUCTION: Regex = Regex::new(
        r"CPlayerShipRespawnManager::OnVehicleDestroyed: '([^']+)'"
    )
    .expect("ship destruction pattern is valid");
    static ref SYSTEM_QUIT: Regex =
        Regex::new(r"<SystemQuit>").expect("system quit pattern is valid");
    static ref VEHICLE_BOARDING: Regex = Regex::new(
        r"<Vehicle Control Flow>.*?'([^']+)'(?:\s*\[(\d+)\])?"
    )
    .expect("vehicle boarding pattern is valid");
}

/// Parse context threaded through every classify call; tracks who the
/// journal currently belongs to.
#[derive(Debug, Clone, Default)]
pub struct ClassifierSession {
    pub current_player_name: Option<String>,
    pub current_player_id: Option<String>,
}

/// Emitted when a login line changes the session player. Routed to the
/// sync handler, never stored on an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityUpdate {
    pub player_name: String,
    pub player_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct LineOutcome {
    pub event: Option<JournalEvent>,
    pub identity_update: Option<IdentityUpdate>,
}

impl LineOutcome {
    fn none() -> Self {
        Self::default()
    }

    fn event(event: JournalEvent) -> Self {
        Self {
            event: Some(event),
            identity_update: None,
        }
    }
}

/// Match one raw journal line against the fixed pattern set, in priority
/// order; the first match wins. A pattern that matches but is missing
/// required captures counts as no match.
pub fn classify_line(line: &str, session: &mut ClassifierSession, owner_id: &str) -> LineOutcome {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        return LineOutcome::none();
    }

    let timestamp = extract_line_timestamp(trimmed);

    if let Some(outcome) = classify_login(trimmed, &timestamp, session, owner_id) {
        return outcome;
    }
    if let Some(event) = classify_inventory_request(trimmed, &timestamp, session, owner_id) {
        return LineOutcome::event(event);
    }
    if let Some(event) = classify_actor_death(trimmed, &timestamp, session, owner_id) {
        return LineOutcome::event(event);
    }
    if let Some(event) = classify_vehicle_destruction(trimmed, &timestamp, owner_id) {
        return LineOutcome::event(event);
    }
    if let Some(event) = classify_ship_destruction(trimmed, &timestamp, owner_id) {
        return LineOutcome::event(event);
    }
    if let Some(event) = classify_system_quit(trimmed, &timestamp, owner_id) {
        return LineOutcome::event(event);
    }
    if let Some(event) = classify_vehicle_boarding(trimmed, &timestamp, owner_id) {
        return LineOutcome::event(event);
    }

    LineOutcome::none()
}

fn extract_line_timestamp(line: &str) -> String {
    let raw = LINE_TIMESTAMP
        .captures(line)
        .map(|captures| captures[1].to_string())
        .unwrap_or_default();
    normalize_timestamp(&raw)
}

fn classify_login(
    line: &str,
    timestamp: &str,
    session: &mut ClassifierSession,
    owner_id: &str,
) -> Option<LineOutcome> {
    let captures = LOGIN.captures(line)?;
    let player_name = captures[1].to_string();
    let player_id = LOGIN_ENTITY_ID
        .captures(line)
        .map(|id_captures| id_captures[1].to_string());

    let name_changed = session.current_player_name.as_deref() != Some(player_name.as_str());
    session.current_player_name = Some(player_name.clone());
    if player_id.is_some() {
        session.current_player_id = player_id.clone();
    }

    let event = JournalEvent::new_local(
        owner_id,
        timestamp.to_string(),
        None,
        None,
        format!("\u{1F6DC} Logged in as {player_name}"),
        line,
    );

    Some(LineOutcome {
        event: Some(event),
        identity_update: name_changed.then_some(IdentityUpdate {
            player_name,
            player_id,
        }),
    })
}

fn classify_inventory_request(
    line: &str,
    timestamp: &str,
    session: &ClassifierSession,
    owner_id: &str,
) -> Option<JournalEvent> {
    let captures = INVENTORY_REQUEST.captures(line)?;
    let requester = &captures[1];
    if session.current_player_name.as_deref() != Some(requester) {
        return None;
    }

    Some(JournalEvent::new_local(
        owner_id,
        timestamp.to_string(),
        None,
        None,
        format!("\u{1F392} {requester} requested an inventory refresh"),
        line,
    ))
}

fn classify_actor_death(
    line: &str,
    timestamp: &str,
    session: &ClassifierSession,
    owner_id: &str,
) -> Option<JournalEvent> {
    let captures = ACTOR_DEATH.captures(line)?;

    let direction = ImpactDirection {
        x: captures[9].parse().ok()?,
        y: captures[10].parse().ok()?,
        z: captures[11].parse().ok()?,
    };
    let victim_raw = captures[1].to_string();
    let killer_raw = captures[4].to_string();
    let is_self = session.current_player_name.as_deref() == Some(victim_raw.as_str());

    let (victim_name, killer_name) = if is_self {
        (victim_raw.clone(), killer_raw.clone())
    } else {
        (prettify_name(&victim_raw), prettify_name(&killer_raw))
    };

    let metadata = DeathMetadata {
        victim_name: victim_name.clone(),
        victim_id: Some(captures[2].to_string()),
        killer_name: killer_name.clone(),
        killer_id: Some(captures[5].to_string()),
        zone: captures[3].to_string(),
        weapon: captures[6].to_string(),
        weapon_class: captures[7].to_string(),
        damage_type: captures[8].to_string(),
        direction,
    };

    let display_text = if is_self {
        format!(
            "\u{1F480} You were killed by {} ({}) in {}",
            killer_name, metadata.damage_type, metadata.zone
        )
    } else {
        format!(
            "\u{1F480} {} killed {} with {} ({}) in {}",
            killer_name, victim_name, metadata.weapon_class, metadata.damage_type, metadata.zone
        )
    };

    Some(JournalEvent::new_local(
        owner_id,
        timestamp.to_string(),
        Some(EventKind::ActorDeath),
        Some(EventMetadata::Death(metadata)),
        display_text,
        line,
    ))
}

fn classify_vehicle_destruction(
    line: &str,
    timestamp: &str,
    owner_id: &str,
) -> Option<JournalEvent> {
    let captures = VEHICLE_DESTRUCTION.captures(line)?;

    let vehicle_name = captures[1].to_string();
    let ship_type = lookup_ship_type(&vehicle_name);
    let destroyer_name = prettify_name(&captures[4]);
    let metadata = DestructionMetadata {
        vehicle_name,
        ship_type: ship_type.clone(),
        destroyer_name: destroyer_name.clone(),
        destroy_level_from: captures[2].parse().ok()?,
        destroy_level_to: captures[3].parse().ok()?,
    };

    let display_text = format!(
        "\u{1F4A5} {} destroyed by {} (level {} \u{2192} {})",
        ship_type, destroyer_name, metadata.destroy_level_from, metadata.destroy_level_to
    );

    Some(JournalEvent::new_local(
        owner_id,
        timestamp.to_string(),
        Some(EventKind::Destruction),
        Some(EventMetadata::VehicleDestruction(metadata)),
        display_text,
        line,
    ))
}

fn classify_ship_destruction(line: &str, timestamp: &str, owner_id: &str) -> Option<JournalEvent> {
    let captures = SHIP_DESTRUCTION.captures(line)?;
    let ship_type = lookup_ship_type(&captures[1]);

    Some(JournalEvent::new_local(
        owner_id,
        timestamp.to_string(),
        Some(EventKind::Destruction),
        None,
        format!("\u{1F4A5} {ship_type} was destroyed"),
        line,
    ))
}

fn classify_system_quit(line: &str, timestamp: &str, owner_id: &str) -> Option<JournalEvent> {
    if !SYSTEM_QUIT.is_match(line) {
        return None;
    }

    Some(JournalEvent::new_local(
        owner_id,
        timestamp.to_string(),
        None,
        None,
        "\u{1F6AA} Game session ended".to_string(),
        line,
    ))
}

fn classify_vehicle_boarding(line: &str, timestamp: &str, owner_id: &str) -> Option<JournalEvent> {
    let captures = VEHICLE_BOARDING.captures(line)?;
    let ship_type = lookup_ship_type(&captures[1]);
    let display_text = match captures.get(2) {
        Some(vehicle_id) => format!(
            "\u{1F9CD} Boarded {} [{}]",
            ship_type,
            vehicle_id.as_str()
        ),
        None => format!("\u{1F9CD} Boarded {ship_type}"),
    };

    Some(JournalEvent::new_local(
        owner_id,
        timestamp.to_string(),
        Some(EventKind::VehicleControlFlow),
        None,
        display_text,
        line,
    ))
}

/// Anonymize NPC entity names and flag unresolved names; player names
/// pass through untouched.
pub fn prettify_name(raw_name: &str) -> String {
    let lowered = raw_name.to_ascii_lowercase();
    if lowered.contains(NPC_MARKER) || lowered.contains("pu_human") {
        return ANONYMIZED_NPC_NAME.to_string();
    }
    if lowered.contains(UNKNOWN_MARKER) {
        return UNKNOWN_ENTITY_NAME.to_string();
    }

    raw_name.to_string()
}

/// True for the placeholder identities the prettifier substitutes.
pub(crate) fn is_placeholder_name(name: &str) -> bool {
    name == ANONYMIZED_NPC_NAME || name == UNKNOWN_ENTITY_NAME
}

pub fn lookup_ship_type(vehicle_name: &str) -> String {
    let lowered = vehicle_name.to_ascii_lowercase();
    SHIP_TYPES
        .iter()
        .find(|(prefix, _)| lowered.contains(prefix))
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| vehicle_name.to_string())
}
