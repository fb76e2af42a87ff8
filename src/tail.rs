use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::PipelineError;

pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

/// Read position into the growing journal file.
#[derive(Debug, Clone)]
pub struct TailCursor {
    pub file_path: PathBuf,
    pub lines_consumed: usize,
    /// Events stamped before this instant are suppressed after a clear.
    pub active_cutoff: Option<String>,
}

impl TailCursor {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            lines_consumed: 0,
            active_cutoff: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TailRead {
    Unchanged,
    /// Fewer lines than consumed: the cursor was reset to zero and the
    /// caller must clear the in-memory timeline before reading again.
    Truncated,
    /// Newly appended lines. The cursor has already advanced past them,
    /// whether or not they classify.
    NewLines(Vec<String>),
}

/// Read the file's full current content and yield only the lines appended
/// since the last read.
pub fn read_new_lines(cursor: &mut TailCursor) -> Result<TailRead, PipelineError> {
    let content = std::fs::read_to_string(&cursor.file_path)?;
    let lines: Vec<&str> = content.lines().collect();

    if lines.len() < cursor.lines_consumed {
        cursor.lines_consumed = 0;
        return Ok(TailRead::Truncated);
    }

    if lines.len() == cursor.lines_consumed {
        return Ok(TailRead::Unchanged);
    }

    let batch = lines[cursor.lines_consumed..]
        .iter()
        .map(|line| line.to_string())
        .collect();
    cursor.lines_consumed = lines.len();

    Ok(TailRead::NewLines(batch))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailTrigger {
    FileNotification,
    Watchdog,
}

/// Watches the journal file and feeds read triggers into the pipeline's
/// single event loop.
pub struct TailWatcher {
    watcher: Option<notify::RecommendedWatcher>,
    forwarder: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
}

impl TailWatcher {
    pub fn spawn(
        log_path: &Path,
        trigger_sender: mpsc::UnboundedSender<TailTrigger>,
    ) -> Result<Self, PipelineError> {
        let (notify_sender, mut notify_receiver) =
            mpsc::unbounded_channel::<Result<Event, notify::Error>>();

        let mut watcher = notify::recommended_watcher(move |result| {
            if notify_sender.send(result).is_err() {
                tracing::debug!("Journal watcher notification receiver dropped");
            }
        })?;

        let watch_directory = log_path.parent().unwrap_or(Path::new("."));
        watcher.watch(watch_directory, RecursiveMode::NonRecursive)?;

        let log_path = log_path.to_path_buf();
        let notification_sender = trigger_sender.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(notification_result) = notify_receiver.recv().await {
                match notification_result {
                    Ok(event) => {
                        if !is_relevant_notification(&event, &log_path) {
                            continue;
                        }
                        if notification_sender
                            .send(TailTrigger::FileNotification)
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!("Journal watcher error: {error}");
                    }
                }
            }
        });

        let watchdog = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(WATCHDOG_INTERVAL);
            loop {
                ticker.tick().await;
                if trigger_sender.send(TailTrigger::Watchdog).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            watcher: Some(watcher),
            forwarder: Some(forwarder),
            watchdog: Some(watchdog),
        })
    }

    pub fn shutdown(&mut self) {
        self.watcher.take();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
    }
}

impl Drop for TailWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn is_relevant_notification(event: &Event, log_path: &Path) -> bool {
    let relevant_kind = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
    if !relevant_kind {
        return false;
    }

    let Some(log_file_name) = log_path.file_name() else {
        return false;
    };

    event.paths.iter().any(|path| {
        path == log_path
            || path
                .file_name()
                .map(|file_name| file_name == log_file_name)
                .unwrap_or(false)
    })
}
