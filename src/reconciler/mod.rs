//! Reconciler: merges an initial load and change events into one ordered,
//! deduplicated collection.

mod operations;
mod state;

pub use operations::Action;
pub use state::{Phase, ReconcilerState, Snapshot};
