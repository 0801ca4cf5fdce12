//! Engine wiring

pub mod engine;
pub mod state;

pub use engine::{Outcome, SyncEngine};
pub use state::AppState;
