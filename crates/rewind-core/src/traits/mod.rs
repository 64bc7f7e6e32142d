//! Store traits the engine is written against.

mod live_store;
mod versioned_store;

pub use live_store::*;
pub use versioned_store::*;
