//! Concrete store backends.

mod factory;
mod sqlite_live;
mod sqlite_versioned;

pub use factory::{StoreFactory, Stores};
pub use sqlite_live::SqliteLiveStore;
pub use sqlite_versioned::SqliteVersionedStore;
