mod cancel;
mod config;
mod engine;
mod error;
mod indexer;
mod maintenance;
mod queue;
mod schema;
mod status;
mod store;
mod writer;

#[cfg(test)]
mod test_support;

pub use cancel::CancelToken;
pub use config::SyncConfig;
pub use engine::{synchronize, SyncContext, SyncEngine, SyncOutcome};
pub use error::LibraryError;
pub use indexer::Indexer;
pub use maintenance::{CleanupStats, SortTable};
pub use queue::{PathQueue, PathRequest};
pub use status::{StatusBoard, StatusListener, SyncSnapshot, SyncStatus};
pub use store::{FolderRow, IndexStore, PathRow, TrackFile};
pub use writer::thumbnail_path;
