use std::collections::HashMap;

use chrono::Duration;

use crate::classifier::{is_placeholder_name, VEHICLE_DESTRUCTION_DAMAGE_TYPE};
use crate::event::{EventKind, EventMetadata, JournalEvent, SpreeMetadata};
use crate::timestamp::parse_canonical;

const SPREE_WINDOW_SECONDS: i64 = 120;
const SPREE_ID_SUFFIX: &str = "-spree";
const MIN_SPREE_KILLS: usize = 2;

/// Fold consecutive qualifying kills by the same actor into synthetic
/// `killing_spree` events. Pure projection over the flat list; never
/// persisted, and idempotent over its own output.
pub fn aggregate_sprees(events: &[JournalEvent]) -> Vec<JournalEvent> {
    // killer identity (entity id when present, name otherwise) -> indices
    // of their qualifying kills, in store order.
    let mut kills_by_killer: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, event) in events.iter().enumerate() {
        if let Some(killer_identity) = qualifying_killer(event) {
            kills_by_killer
                .entry(killer_identity)
                .or_default()
                .push(index);
        }
    }

    // index of a spree's first kill -> the folded aggregate;
    // every other folded index is dropped from the flat output.
    let mut aggregates: HashMap<usize, JournalEvent> = HashMap::new();
    let mut folded_indices: Vec<bool> = vec![false; events.len()];

    for kill_indices in kills_by_killer.values() {
        for run in split_into_spree_runs(events, kill_indices) {
            if run.len() < MIN_SPREE_KILLS {
                continue;
            }

            let children: Vec<JournalEvent> =
                run.iter().map(|&index| events[index].clone()).collect();
            for &index in &run {
                folded_indices[index] = true;
            }
            aggregates.insert(run[0], build_spree_event(children));
        }
    }

    let mut projected = Vec::with_capacity(events.len());
    for (index, event) in events.iter().enumerate() {
        if let Some(aggregate) = aggregates.remove(&index) {
            projected.push(aggregate);
        } else if !folded_indices[index] {
            projected.push(event.clone());
        }
    }

    projected
}

/// Returns the killer's grouping identity for a qualifying standalone
/// kill: the entity id when present, otherwise the name. Placeholder
/// names are shared across entities and never count as an identity.
fn qualifying_killer(event: &JournalEvent) -> Option<&str> {
    if event.kind != Some(EventKind::ActorDeath) || !event.children.is_empty() {
        return None;
    }

    let metadata = event.death_metadata()?;
    let killer_name = metadata.killer_name.trim();
    if killer_name.is_empty() || killer_name.eq_ignore_ascii_case("unknown") {
        return None;
    }
    if killer_name == metadata.victim_name {
        return None;
    }
    if let (Some(killer_id), Some(victim_id)) =
        (metadata.killer_id.as_deref(), metadata.victim_id.as_deref())
    {
        if killer_id == victim_id {
            return None;
        }
    }
    if metadata.damage_type == VEHICLE_DESTRUCTION_DAMAGE_TYPE {
        return None;
    }

    match metadata.killer_id.as_deref() {
        Some(killer_id) => Some(killer_id),
        None if is_placeholder_name(killer_name) => None,
        None => Some(metadata.killer_name.as_str()),
    }
}

// Greedy runs: each gap to the previous kill strictly under the window.
fn split_into_spree_runs(events: &[JournalEvent], kill_indices: &[usize]) -> Vec<Vec<usize>> {
    let window = Duration::seconds(SPREE_WINDOW_SECONDS);
    let mut runs: Vec<Vec<usize>> = Vec::new();
    let mut current_run: Vec<usize> = Vec::new();
    let mut previous_instant = None;

    for &index in kill_indices {
        let instant = parse_canonical(&events[index].timestamp);
        let within_window = match (previous_instant, instant) {
            (Some(previous), Some(current)) => current - previous < window,
            _ => false,
        };

        if current_run.is_empty() || within_window {
            current_run.push(index);
        } else {
            runs.push(std::mem::take(&mut current_run));
            current_run.push(index);
        }
        previous_instant = instant;
    }

    if !current_run.is_empty() {
        runs.push(current_run);
    }

    runs
}

fn build_spree_event(children: Vec<JournalEvent>) -> JournalEvent {
    let first = &children[0];
    let killer_name = first
        .death_metadata()
        .map(|metadata| metadata.killer_name.clone())
        .unwrap_or_default();
    JournalEvent {
        id: format!("{}{}", first.id, SPREE_ID_SUFFIX),
        owner_id: first.owner_id.clone(),
        timestamp: first.timestamp.clone(),
        kind: Some(EventKind::KillingSpree),
        metadata: Some(EventMetadata::Spree(SpreeMetadata {
            killer_name: killer_name.to_string(),
            kill_count: children.len(),
        })),
        display_text: format!(
            "\u{1F525} {} is on a killing spree ({} kills)",
            killer_name,
            children.len()
        ),
        children,
        source_line: String::new(),
        open: false,
    }
}

#[cfg(test)]
mod tests {
    use super::aggregate_sprees;
    use crate::event::{
        DeathMetadata, EventKind, EventMetadata, ImpactDirection, JournalEvent,
    };

    fn kill(id: &str, timestamp: &str, killer: &str, victim: &str, damage: &str) -> JournalEvent {
        JournalEvent {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            timestamp: timestamp.to_string(),
            kind: Some(EventKind::ActorDeath),
            metadata: Some(EventMetadata::Death(DeathMetadata {
                victim_name: victim.to_string(),
                victim_id: None,
                killer_name: killer.to_string(),
                killer_id: None,
                zone: "Stanton".to_string(),
                weapon: "behr_rifle_889".to_string(),
                weapon_class: "behr_rifle".to_string(),
                damage_type: damage.to_string(),
                direction: ImpactDirection { x: 0.0, y: 0.0, z: 1.0 },
            })),
            display_text: format!("{killer} killed {victim}"),
            children: Vec::new(),
            source_line: String::new(),
            open: false,
        }
    }

    fn kill_with_ids(
        id: &str,
        timestamp: &str,
        killer: &str,
        killer_id: Option<&str>,
        victim: &str,
        victim_id: Option<&str>,
    ) -> JournalEvent {
        let mut event = kill(id, timestamp, killer, victim, "Bullet");
        let Some(EventMetadata::Death(metadata)) = event.metadata.as_mut() else {
            unreachable!("kill builder always attaches death metadata");
        };
        metadata.killer_id = killer_id.map(str::to_string);
        metadata.victim_id = victim_id.map(str::to_string);
        event
    }

    #[test]
    fn folds_kills_inside_window_and_leaves_stragglers_flat() {
        let events = vec![
            kill("k1", "2024-06-07T12:00:00.000Z", "Alice", "Bob", "Bullet"),
            kill("k2", "2024-06-07T12:00:30.000Z", "Alice", "Carol", "Bullet"),
            // 120 s after k2: not strictly under the window, closes the run.
            kill("k3", "2024-06-07T12:02:30.000Z", "Alice", "Dave", "Bullet"),
        ];

        let projected = aggregate_sprees(&events);
        assert_eq!(projected.len(), 2, "one aggregate plus one flat kill");

        let spree = &projected[0];
        assert_eq!(spree.kind, Some(EventKind::KillingSpree));
        assert_eq!(spree.children.len(), 2);
        assert_eq!(spree.id, "k1-spree");
        assert_eq!(spree.timestamp, "2024-06-07T12:00:00.000Z");

        assert_eq!(projected[1].id, "k3");
        assert_eq!(projected[1].kind, Some(EventKind::ActorDeath));
    }

    #[test]
    fn aggregation_is_idempotent_over_its_own_output() {
        let events = vec![
            kill("k1", "2024-06-07T12:00:00.000Z", "Alice", "Bob", "Bullet"),
            kill("k2", "2024-06-07T12:00:30.000Z", "Alice", "Carol", "Bullet"),
        ];

        let once = aggregate_sprees(&events);
        let twice = aggregate_sprees(&once);
        assert_eq!(twice.len(), 1);
        assert_eq!(twice[0].id, "k1-spree");
        assert_eq!(twice[0].children.len(), 2, "children are not re-folded");
    }

    #[test]
    fn kills_by_different_killers_never_share_a_spree() {
        let events = vec![
            kill("k1", "2024-06-07T12:00:00.000Z", "Alice", "Bob", "Bullet"),
            kill("k2", "2024-06-07T12:00:10.000Z", "Eve", "Carol", "Bullet"),
            kill("k3", "2024-06-07T12:00:20.000Z", "Alice", "Dave", "Bullet"),
        ];

        let projected = aggregate_sprees(&events);
        let spree = projected
            .iter()
            .find(|event| event.kind == Some(EventKind::KillingSpree))
            .expect("Alice's two kills fold");
        assert_eq!(spree.children.len(), 2);
        assert!(projected.iter().any(|event| event.id == "k2"));
    }

    #[test]
    fn self_damage_unknown_killer_and_vehicle_destruction_do_not_qualify() {
        let events = vec![
            kill("k1", "2024-06-07T12:00:00.000Z", "Bob", "Bob", "Bullet"),
            kill("k2", "2024-06-07T12:00:10.000Z", "unknown", "Carol", "Bullet"),
            kill(
                "k3",
                "2024-06-07T12:00:20.000Z",
                "Alice",
                "Dave",
                "VehicleDestruction",
            ),
            kill("k4", "2024-06-07T12:00:30.000Z", "Alice", "Erin", "Bullet"),
        ];

        let projected = aggregate_sprees(&events);
        assert_eq!(projected.len(), 4, "nothing qualifies for folding");
        assert!(projected
            .iter()
            .all(|event| event.kind != Some(EventKind::KillingSpree)));
    }

    #[test]
    fn distinct_entities_behind_the_same_placeholder_name_never_share_a_spree() {
        // Two different NPC entities both display as "an NPC"; only their
        // entity ids tell them apart.
        let events = vec![
            kill_with_ids(
                "k1",
                "2024-06-07T12:00:00.000Z",
                "an NPC",
                Some("9001"),
                "Bob",
                Some("101"),
            ),
            kill_with_ids(
                "k2",
                "2024-06-07T12:00:30.000Z",
                "an NPC",
                Some("9002"),
                "Carol",
                Some("102"),
            ),
        ];

        let projected = aggregate_sprees(&events);
        assert_eq!(projected.len(), 2);
        assert!(projected
            .iter()
            .all(|event| event.kind != Some(EventKind::KillingSpree)));
    }

    #[test]
    fn same_entity_id_folds_even_under_a_placeholder_name() {
        let events = vec![
            kill_with_ids(
                "k1",
                "2024-06-07T12:00:00.000Z",
                "an NPC",
                Some("9001"),
                "Bob",
                Some("101"),
            ),
            kill_with_ids(
                "k2",
                "2024-06-07T12:00:30.000Z",
                "an NPC",
                Some("9001"),
                "Carol",
                Some("102"),
            ),
        ];

        let projected = aggregate_sprees(&events);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected[0].kind, Some(EventKind::KillingSpree));
        assert_eq!(projected[0].children.len(), 2);
        assert!(projected[0].display_text.contains("an NPC"));
    }

    #[test]
    fn placeholder_killer_without_an_entity_id_is_trivial() {
        let events = vec![
            kill("k1", "2024-06-07T12:00:00.000Z", "an NPC", "Bob", "Bullet"),
            kill("k2", "2024-06-07T12:00:30.000Z", "an NPC", "Carol", "Bullet"),
        ];

        let projected = aggregate_sprees(&events);
        assert_eq!(projected.len(), 2);
        assert!(projected
            .iter()
            .all(|event| event.kind != Some(EventKind::KillingSpree)));
    }

    #[test]
    fn matching_killer_and_victim_ids_count_as_self_damage() {
        let events = vec![
            kill_with_ids(
                "k1",
                "2024-06-07T12:00:00.000Z",
                "Alice",
                Some("201234"),
                "Alice_Clone",
                Some("201234"),
            ),
            kill_with_ids(
                "k2",
                "2024-06-07T12:00:30.000Z",
                "Alice",
                Some("201234"),
                "Bob",
                Some("101"),
            ),
        ];

        let projected = aggregate_sprees(&events);
        assert_eq!(projected.len(), 2, "the self-damage kill cannot seed a spree");
    }

    #[test]
    fn single_kill_never_becomes_a_spree() {
        let events = vec![kill(
            "k1",
            "2024-06-07T12:00:00.000Z",
            "Alice",
            "Bob",
            "Bullet",
        )];
        let projected = aggregate_sprees(&events);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected[0].id, "k1");
    }
}
