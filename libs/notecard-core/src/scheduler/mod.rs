//! Scheduler collaborator.
//!
//! Compilation and reconciliation only ever call [`Scheduler::new_card`];
//! `answer` is used by the review path.

pub mod sm2;

use crate::types::{Rating, ReviewLogEntry, SchedulingState};
use chrono::{DateTime, Utc};

pub use sm2::Sm2;

/// Spaced repetition state transitions.
pub trait Scheduler: Send + Sync {
    /// Initial state for a freshly created card.
    fn new_card(&self, now: DateTime<Utc>) -> SchedulingState;

    /// Next state after a review, plus the log entry describing the transition.
    fn answer(
        &self,
        state: &SchedulingState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> (SchedulingState, ReviewLogEntry);
}

/// Look a scheduler up by name.
pub fn get_scheduler(name: &str) -> Option<Box<dyn Scheduler>> {
    match name {
        "sm2" => Some(Box::new(Sm2::default())),
        _ => None,
    }
}
