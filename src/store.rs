use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::event::JournalEvent;

/// Ordered, deduplicated collection of journal events. Every ingress path
/// goes through [`EventStore::merge`].
#[derive(Debug)]
pub struct EventStore {
    store_path: PathBuf,
    events: Vec<JournalEvent>,
}

impl EventStore {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            events: Vec::new(),
        }
    }

    /// Load the persisted store. A missing file is an empty store;
    /// malformed content recovers whatever parses. The result is
    /// re-deduplicated and re-sorted.
    pub fn load(store_path: impl Into<PathBuf>) -> Self {
        let store_path = store_path.into();
        let events = match std::fs::read_to_string(&store_path) {
            Ok(content) => deserialize_events(&content),
            Err(error) if error.kind() == ErrorKind::NotFound => Vec::new(),
            Err(error) => {
                tracing::warn!(
                    store_path = %store_path.display(),
                    read_error = %error,
                    "Failed to read persisted event store; starting empty"
                );
                Vec::new()
            }
        };

        let mut store = Self {
            store_path,
            events: Vec::new(),
        };
        store.merge(events);
        store
    }

    /// Union the batch into the store by event id, then stable-sort
    /// ascending by timestamp. The first occurrence of an id wins; later
    /// duplicates are discarded. Returns how many events were accepted.
    pub fn merge(&mut self, batch: Vec<JournalEvent>) -> usize {
        let mut seen_ids: HashSet<String> = self
            .events
            .iter()
            .map(|event| event.id.clone())
            .collect();

        let mut accepted = 0;
        for event in batch {
            if !seen_ids.insert(event.id.clone()) {
                continue;
            }
            self.events.push(event);
            accepted += 1;
        }

        if accepted > 0 {
            self.events
                .sort_by(|left, right| left.timestamp.cmp(&right.timestamp));
        }

        accepted
    }

    /// Rewrite the persisted store in full as a pretty-printed JSON array.
    pub fn persist(&self) -> Result<(), PipelineError> {
        let serialized = serde_json::to_string_pretty(&self.events)?;
        std::fs::write(&self.store_path, serialized)?;
        Ok(())
    }

    /// Truncate to empty and persist immediately.
    pub fn clear(&mut self) -> Result<(), PipelineError> {
        self.events.clear();
        self.persist()
    }

    /// Drop the in-memory timeline without touching the persisted file.
    pub fn reset_in_memory(&mut self) {
        self.events.clear();
    }

    pub fn events(&self) -> &[JournalEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }
}

// Best effort: a cleanly-parsing array is taken as-is; otherwise each
// array element is tried individually and survivors are kept.
fn deserialize_events(content: &str) -> Vec<JournalEvent> {
    match serde_json::from_str::<Vec<JournalEvent>>(content) {
        Ok(events) => events,
        Err(parse_error) => {
            tracing::warn!(
                parse_error = %parse_error,
                "Persisted event store is malformed; recovering element-wise"
            );
            match serde_json::from_str::<Vec<serde_json::Value>>(content) {
                Ok(values) => values
                    .into_iter()
                    .filter_map(|value| serde_json::from_value(value).ok())
                    .collect(),
                Err(_) => Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EventStore;
    use crate::event::JournalEvent;

    fn event(id: &str, timestamp: &str) -> JournalEvent {
        JournalEvent {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            timestamp: timestamp.to_string(),
            kind: None,
            metadata: None,
            display_text: format!("event {id}"),
            children: Vec::new(),
            source_line: String::new(),
            open: false,
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> EventStore {
        EventStore::new(dir.path().join("events.json"))
    }

    #[test]
    fn merge_is_idempotent_by_id() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = store_in(&dir);
        let batch = vec![
            event("a", "2024-06-07T10:00:00.000Z"),
            event("b", "2024-06-07T10:00:01.000Z"),
        ];

        assert_eq!(store.merge(batch.clone()), 2);
        assert_eq!(store.merge(batch), 0, "Re-merging the same batch is a no-op");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn first_occurrence_of_an_id_wins() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = store_in(&dir);
        store.merge(vec![event("a", "2024-06-07T10:00:00.000Z")]);

        let mut late_duplicate = event("a", "2024-06-07T23:59:59.000Z");
        late_duplicate.display_text = "imposter".to_string();
        store.merge(vec![late_duplicate]);

        assert_eq!(store.len(), 1);
        assert_eq!(store.events()[0].display_text, "event a");
        assert_eq!(store.events()[0].timestamp, "2024-06-07T10:00:00.000Z");
    }

    #[test]
    fn merge_keeps_timestamps_non_decreasing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut store = store_in(&dir);
        store.merge(vec![
            event("c", "2024-06-07T10:00:02.000Z"),
            event("a", "2024-06-07T10:00:00.000Z"),
        ]);
        store.merge(vec![event("b", "2024-06-07T10:00:01.000Z")]);

        let timestamps: Vec<&str> = store
            .events()
            .iter()
            .map(|event| event.timestamp.as_str())
            .collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
    }

    #[test]
    fn persist_and_load_round_trip_with_self_heal() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store_path = dir.path().join("events.json");

        let mut store = EventStore::new(&store_path);
        store.merge(vec![
            event("b", "2024-06-07T10:00:01.000Z"),
            event("a", "2024-06-07T10:00:00.000Z"),
        ]);
        store.persist().expect("persists");

        let reloaded = EventStore::load(&store_path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.events()[0].id, "a");
    }

    #[test]
    fn load_recovers_parsable_elements_from_malformed_content() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store_path = dir.path().join("events.json");
        std::fs::write(
            &store_path,
            r#"[
                {"id":"good","ownerId":"owner-1","timestamp":"2024-06-07T10:00:00.000Z","displayText":"ok"},
                {"not":"an event"}
            ]"#,
        )
        .expect("writable");

        let store = EventStore::load(&store_path);
        assert_eq!(store.len(), 1);
        assert_eq!(store.events()[0].id, "good");
    }

    #[test]
    fn load_of_garbage_content_yields_empty_store() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store_path = dir.path().join("events.json");
        std::fs::write(&store_path, "not json at all").expect("writable");

        assert!(EventStore::load(&store_path).is_empty());
    }

    #[test]
    fn clear_truncates_and_persists_immediately() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store_path = dir.path().join("events.json");
        let mut store = EventStore::new(&store_path);
        store.merge(vec![event("a", "2024-06-07T10:00:00.000Z")]);
        store.persist().expect("persists");

        store.clear().expect("clears");
        assert!(store.is_empty());
        assert_eq!(
            std::fs::read_to_string(&store_path).expect("readable").trim(),
            "[]"
        );
    }
}
