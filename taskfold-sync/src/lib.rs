pub mod cache;
pub mod connectivity;
pub mod engine;
pub mod index;
pub mod queue;

#[cfg(test)]
mod engine_tests;

pub use cache::{CacheError, DiskCacheStore, MaintenanceReport, SyncMetadata};
pub use connectivity::{
    ConnectionType, ConnectivityHandle, ConnectivityStatus, connectivity_channel,
};
pub use engine::{EngineError, MutationOutcome, SyncConfig, SyncEngine};
pub use index::NodeIndex;
pub use queue::{DrainReport, MutationQueue, PendingOperation, QueueError};
