//! Card validation pipeline.
//!
//! Every live event flows through:
//! 1. `EventProcessor::process()` — fetch the card snapshot
//! 2. `classify()` — development vs other, from labels
//! 3. `select_rules()` — which rules the event calls for
//! 4. `execute()` — run them all, collect failures
//! 5. `ViolationTracker::apply()` — create, escalate or clear the record and notify
//!
//! `SweepProcessor` re-runs steps 4 and 5 over every flagged card on a schedule.

pub mod classifier;
pub mod executor;
pub mod message;
pub mod processor;
pub mod rules;
pub mod selector;
pub mod sweep;
pub mod tracker;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use processor::{EventProcessor, ProcessOutcome};
pub use sweep::{SweepProcessor, SweepReport, spawn_sweep_ticker};
pub use tracker::{TrackerAction, TrackerOutcome, ViolationState, ViolationTracker};
