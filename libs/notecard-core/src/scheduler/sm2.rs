//! SM-2 spaced repetition algorithm.
//!
//! Based on SuperMemo 2 with configurable parameters.

use super::Scheduler;
use crate::types::{CardStatus, Rating, ReviewLogEntry, SchedulingState};
use chrono::{DateTime, Duration, Utc};

/// SM-2 algorithm with configurable parameters.
#[derive(Debug, Clone)]
pub struct Sm2 {
    pub initial_ease: f64,
    pub minimum_ease: f64,
    pub easy_bonus: f64,
    pub hard_multiplier: f64,
    pub graduating_interval: f64,
    pub easy_interval: f64,
}

impl Default for Sm2 {
    fn default() -> Self {
        Self {
            initial_ease: 2.5,
            minimum_ease: 1.3,
            easy_bonus: 1.3,
            hard_multiplier: 1.2,
            graduating_interval: 1.0,
            easy_interval: 4.0,
        }
    }
}

impl Scheduler for Sm2 {
    fn new_card(&self, now: DateTime<Utc>) -> SchedulingState {
        SchedulingState {
            status: CardStatus::New,
            ease_factor: self.initial_ease,
            due_date: Some(now),
            ..Default::default()
        }
    }

    fn answer(
        &self,
        state: &SchedulingState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> (SchedulingState, ReviewLogEntry) {
        let rating_value = rating.to_value();

        let (status, interval, ease, lapses) = match state.status {
            CardStatus::New | CardStatus::Learning => self.schedule_learning(state, rating_value),
            CardStatus::Review | CardStatus::Relearning => self.schedule_review(state, rating_value),
        };

        let next = SchedulingState {
            status,
            interval_days: interval,
            ease_factor: ease,
            stability: None,
            difficulty: None,
            lapses,
            reviews_count: state.reviews_count + 1,
            due_date: Some(now + Duration::days(interval.ceil() as i64)),
        };

        let log = ReviewLogEntry {
            rating,
            reviewed_at: now,
            status_before: state.status,
            interval_before: state.interval_days,
            interval_after: next.interval_days,
            ease_before: state.ease_factor,
            ease_after: next.ease_factor,
            time_taken_ms: None,
        };

        (next, log)
    }
}

impl Sm2 {
    fn schedule_learning(&self, state: &SchedulingState, rating: u8) -> (CardStatus, f64, f64, u32) {
        if rating >= 3 {
            let interval = if rating == 4 {
                self.easy_interval
            } else {
                self.graduating_interval
            };
            (CardStatus::Review, interval, state.ease_factor, state.lapses)
        } else {
            (CardStatus::Learning, 0.0, state.ease_factor, state.lapses)
        }
    }

    fn schedule_review(&self, state: &SchedulingState, rating: u8) -> (CardStatus, f64, f64, u32) {
        if rating == 1 {
            // Lapse: back to relearning
            return (
                CardStatus::Relearning,
                1.0,
                (state.ease_factor - 0.2).max(self.minimum_ease),
                state.lapses + 1,
            );
        }

        let ease_adj = match rating {
            2 => -0.15,
            4 => 0.15,
            _ => 0.0,
        };
        let multiplier = match rating {
            2 => self.hard_multiplier,
            4 => state.ease_factor * self.easy_bonus,
            _ => state.ease_factor,
        };
        let interval = (state.interval_days * multiplier).max(1.0);
        let ease = (state.ease_factor + ease_adj).max(self.minimum_ease);
        (CardStatus::Review, interval, ease, state.lapses)
    }
}
