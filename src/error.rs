/// A line matching no pattern is not an error and never surfaces here;
/// every variant degrades to skip-and-retry on the next trigger.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("journal file unreadable")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize event store")]
    Persist(#[from] serde_json::Error),

    #[error("transport send failed: {0}")]
    Transport(String),

    #[error("no valid credential for this session")]
    AuthExpired,

    #[error("file watcher failed")]
    Watch(#[from] notify::Error),
}
