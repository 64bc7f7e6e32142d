//! rewind-core - Core library for rewind.
//!
//! This crate records every change to a hierarchical parameter store as an
//! immutable version, answers "what was key K at time T?", and writes that
//! historical state back on request.
//!
//! # Example
//!
//! ```ignore
//! use rewind_core::{RestoreEngine, RewindConfig, StoreFactory, Target};
//!
//! let config = RewindConfig::from_env();
//! let stores = StoreFactory::open(&config)?;
//! let engine = RestoreEngine::new(config, stores.versioned, stores.live)?;
//!
//! // What did /app/ look like yesterday?
//! let report = engine.resolve(&Target::parse("/app/")?, yesterday, true).await?;
//!
//! // Put it back.
//! let report = engine.apply(&Target::parse("/app/")?, yesterday, true).await?;
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod history;
pub mod restore;
mod retry;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use backends::{SqliteLiveStore, SqliteVersionedStore, StoreFactory, Stores};
pub use config::{RetryPolicy, RewindConfig};
pub use error::{ErrorCode, RewindError, RewindResult};
pub use history::{
    PathWalker, PointInTimeResolver, Resolution, SeedReport, Seeder, VersionHistoryFetcher,
    VersionLogWriter, WriteOutcome,
};
pub use restore::{RestoreEngine, RestoreExecutor};
pub use traits::{LiveParameter, LiveStore, ParameterWrite, VersionedStore};
pub use types::{
    BatchReport, ChangeEvent, KeyFailure, Operation, PreviewRow, ResolvedState, RestoreOutcome,
    RestoreRow, Target, ValueType, VersionMetadata, VersionRecord,
};

pub use tokio_util::sync::CancellationToken;
