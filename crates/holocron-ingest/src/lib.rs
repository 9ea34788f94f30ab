//! Snapshot ingestion: the decode → map → persist pipeline, the polling
//! watcher that drives it, and the artifact emitter that closes the loop
//! back to the game client.

pub mod artifact;
pub mod debounce;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod watcher;

pub use artifact::{ArtifactEmitter, Emitted};
pub use error::{IngestError, Result};
pub use pipeline::{Pipeline, RunReport, SharedBoard};
pub use source::SnapshotSource;
pub use watcher::{WatchConfig, Watcher};
