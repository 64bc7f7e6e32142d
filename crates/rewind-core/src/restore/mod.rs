//! Preview and restore of historical state.

mod engine;
mod executor;

pub use engine::RestoreEngine;
pub use executor::RestoreExecutor;
