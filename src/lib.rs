mod classifier;
mod error;
mod event;
mod pipeline;
mod spree;
mod store;
mod sync;
mod tail;
mod timestamp;

pub use classifier::{classify_line, ClassifierSession, IdentityUpdate, LineOutcome};
pub use error::PipelineError;
pub use event::{
    DeathMetadata, DestructionMetadata, EventKind, EventMetadata, ImpactDirection, JournalEvent,
    SpreeMetadata,
};
pub use pipeline::{LocalIdentity, Pipeline, PipelineConfig};
pub use spree::aggregate_sprees;
pub use store::EventStore;
pub use sync::{
    ConnectionState, InboundOutcome, PeerPresence, SyncHandler, Transport, WireMessage,
};
pub use tail::{read_new_lines, TailCursor, TailRead, TailTrigger, TailWatcher};
pub use timestamp::normalize_timestamp;
