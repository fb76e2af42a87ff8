use std::path::PathBuf;

use crate::classifier::{classify_line, ClassifierSession};
use crate::error::PipelineError;
use crate::event::JournalEvent;
use crate::spree::aggregate_sprees;
use crate::store::EventStore;
use crate::sync::{ConnectionState, InboundOutcome, SyncHandler, Transport, WireMessage};
use crate::tail::{read_new_lines, TailCursor, TailRead};

/// Who this journal belongs to, as reported by the host's auth session.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub user_id: String,
    pub authenticated: bool,
}

impl LocalIdentity {
    /// A missing startup credential surfaces as
    /// [`PipelineError::AuthExpired`] and forces the host's sign-out flow.
    pub fn from_credential(user_id: Option<String>) -> Result<Self, PipelineError> {
        match user_id {
            Some(user_id) => Ok(Self {
                user_id,
                authenticated: true,
            }),
            None => Err(PipelineError::AuthExpired),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub journal_path: PathBuf,
    pub store_path: PathBuf,
    pub identity: LocalIdentity,
    /// Reported in identity updates.
    pub timezone: String,
}

/// Owns the whole local pipeline: tail cursor, classifier session, event
/// store and sync handler. All mutations run on the single task that
/// owns this value.
pub struct Pipeline<T: Transport> {
    config: PipelineConfig,
    cursor: TailCursor,
    session: ClassifierSession,
    store: EventStore,
    sync: SyncHandler<T>,
    lines_processed: u64,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(config: PipelineConfig) -> Self {
        let cursor = TailCursor::new(&config.journal_path);
        let store = EventStore::load(&config.store_path);
        let sync = SyncHandler::new(config.identity.user_id.clone());
        Self {
            config,
            cursor,
            session: ClassifierSession::default(),
            store,
            sync,
            lines_processed: 0,
        }
    }

    /// One tail-read pass; invoked from both the file notification
    /// handler and the watchdog tick.
    pub fn poll_journal(&mut self) -> Result<usize, PipelineError> {
        let lines = match read_new_lines(&mut self.cursor)? {
            TailRead::Unchanged => return Ok(0),
            TailRead::Truncated => {
                tracing::info!("Journal truncated; clearing timeline and reprocessing");
                self.store.reset_in_memory();
                match read_new_lines(&mut self.cursor)? {
                    TailRead::NewLines(lines) => lines,
                    _ => return Ok(0),
                }
            }
            TailRead::NewLines(lines) => lines,
        };

        Ok(self.ingest_lines(&lines))
    }

    /// Classify a batch of raw lines, discard events before the active
    /// cutoff, merge survivors into the store. Side-effect failures
    /// (wire push, persist) never drop events from the in-memory
    /// timeline.
    pub fn ingest_lines(&mut self, lines: &[String]) -> usize {
        let mut batch: Vec<JournalEvent> = Vec::new();

        for line in lines {
            self.lines_processed += 1;
            let outcome = classify_line(line, &mut self.session, &self.config.identity.user_id);

            if let Some(update) = outcome.identity_update {
                self.sync.push_identity_update(&update, &self.config.timezone);
            }

            let Some(event) = outcome.event else {
                continue;
            };
            if self.is_before_cutoff(&event.timestamp) {
                continue;
            }

            self.sync.push_local_event(&event);
            batch.push(event);
        }

        let accepted = self.store.merge(batch);
        if accepted > 0 {
            self.persist_if_authenticated();
        }
        accepted
    }

    /// Route one inbound wire message through the sync handler.
    pub fn handle_wire_message(&mut self, message: WireMessage) -> InboundOutcome {
        let outcome = self.sync.apply_inbound(message, &mut self.store);
        if matches!(outcome, InboundOutcome::StoreUpdated { accepted } if accepted > 0) {
            self.persist_if_authenticated();
        }
        outcome
    }

    /// Truncate the store, reset the cursor, and suppress reparsed
    /// history older than this instant.
    pub fn clear_timeline(&mut self) -> Result<(), PipelineError> {
        self.store.clear()?;
        self.cursor.lines_consumed = 0;
        self.cursor.active_cutoff =
            Some(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
        Ok(())
    }

    /// The display projection, recomputed from store state on every
    /// call and never stored.
    pub fn display_events(&self) -> Vec<JournalEvent> {
        aggregate_sprees(self.store.events())
    }

    pub fn connection_status(&self) -> (ConnectionState, Option<&str>) {
        (self.sync.state(), self.sync.last_error())
    }

    pub fn lines_processed(&self) -> u64 {
        self.lines_processed
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn sync_mut(&mut self) -> &mut SyncHandler<T> {
        &mut self.sync
    }

    /// The tail watcher is owned by the host task and dropped there.
    pub fn shutdown(&mut self) {
        self.sync.shutdown();
    }

    fn is_before_cutoff(&self, timestamp: &str) -> bool {
        match self.cursor.active_cutoff.as_deref() {
            // Canonical timestamps compare chronologically as strings.
            Some(cutoff) => timestamp < cutoff,
            None => false,
        }
    }

    fn persist_if_authenticated(&mut self) {
        if !self.config.identity.authenticated {
            return;
        }
        if let Err(error) = self.store.persist() {
            tracing::warn!(
                store_path = %self.store.store_path().display(),
                persist_error = %error,
                "Failed to persist event store; timeline kept in memory"
            );
        }
    }
}
