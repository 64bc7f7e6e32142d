//! Version history: recording changes, enumerating keys, fetching and
//! resolving a key's versions.

mod fetcher;
mod resolver;
mod seed;
mod walker;
mod writer;

pub use fetcher::VersionHistoryFetcher;
pub use resolver::{PointInTimeResolver, Resolution};
pub use seed::{SeedReport, Seeder};
pub use walker::PathWalker;
pub use writer::{BatchEntry, VersionLogWriter, WriteOutcome};
