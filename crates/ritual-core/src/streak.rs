//! Consecutive-day streak calculation.
//!
//! A streak is the number of consecutive calendar days with at least one
//! completion, ending at the most recent completion day. The calculator is
//! a pure function of the previous state and the new completion day.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EngineError;
use crate::ritual::StreakState;

/// How a completion day relates to the previous streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakStep {
    /// First completion ever
    Started,
    /// Completion on the day after the last one
    Extended,
    /// Another completion on the last recorded day
    SameDay,
    /// Gap of two or more days
    Reset,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreakError {
    #[error("completion on {completed} precedes last recorded completion on {last}")]
    Backdated { completed: NaiveDate, last: NaiveDate },
}

impl From<StreakError> for EngineError {
    fn from(err: StreakError) -> Self {
        match err {
            StreakError::Backdated { completed, last } => {
                EngineError::BackdatedCompletion { completed, last }
            }
        }
    }
}

/// Classify `completed_date` against the previous state.
pub fn classify(prev: &StreakState, completed_date: NaiveDate) -> Result<StreakStep, StreakError> {
    let Some(last) = prev.last_completion_date else {
        return Ok(StreakStep::Started);
    };

    if completed_date < last {
        return Err(StreakError::Backdated {
            completed: completed_date,
            last,
        });
    }
    if completed_date == last {
        return Ok(StreakStep::SameDay);
    }
    // `None` only when `last` is the final representable date, which the
    // comparison above already rules out.
    match last.checked_add_days(Days::new(1)) {
        Some(next_day) if completed_date == next_day => Ok(StreakStep::Extended),
        _ => Ok(StreakStep::Reset),
    }
}

/// Compute the streak state after a completion on `completed_date`.
///
/// Backdated completions are rejected rather than folded into the streak.
pub fn next_streak(prev: &StreakState, completed_date: NaiveDate) -> Result<StreakState, StreakError> {
    advance(prev, completed_date).map(|(_, next)| next)
}

/// Like [`next_streak`], also returning how the day was classified.
pub fn advance(
    prev: &StreakState,
    completed_date: NaiveDate,
) -> Result<(StreakStep, StreakState), StreakError> {
    let step = classify(prev, completed_date)?;
    let current = match step {
        StreakStep::Started | StreakStep::Reset => 1,
        StreakStep::Extended => prev.current_streak.saturating_add(1),
        StreakStep::SameDay => return Ok((step, prev.clone())),
    };

    Ok((
        step,
        StreakState {
            user_id: prev.user_id.clone(),
            current_streak: current,
            longest_streak: prev.longest_streak.max(current),
            last_completion_date: Some(completed_date),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .checked_add_days(Days::new(n))
            .unwrap()
    }

    #[test]
    fn first_completion_starts_streak() {
        let next = next_streak(&StreakState::empty("u"), day(0)).unwrap();
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.longest_streak, 1);
        assert_eq!(next.last_completion_date, Some(day(0)));
    }

    #[test]
    fn consecutive_days_extend_and_gap_resets() {
        // Days 1, 2, 4 -> current 1, 2, 1 with longest 2
        let mut state = StreakState::empty("u");
        let mut currents = Vec::new();
        for d in [0, 1, 3] {
            state = next_streak(&state, day(d)).unwrap();
            currents.push(state.current_streak);
        }
        assert_eq!(currents, vec![1, 2, 1]);
        assert_eq!(state.longest_streak, 2);
    }

    #[test]
    fn same_day_is_a_no_op() {
        let state = next_streak(&StreakState::empty("u"), day(0)).unwrap();
        let again = next_streak(&state, day(0)).unwrap();
        assert_eq!(again, state);
        assert_eq!(classify(&state, day(0)).unwrap(), StreakStep::SameDay);
    }

    #[test]
    fn advance_reports_step_with_state() {
        let (step, state) = advance(&StreakState::empty("u"), day(0)).unwrap();
        assert_eq!(step, StreakStep::Started);
        let (step, state) = advance(&state, day(1)).unwrap();
        assert_eq!(step, StreakStep::Extended);
        assert_eq!(state.current_streak, 2);
        let (step, same) = advance(&state, day(1)).unwrap();
        assert_eq!(step, StreakStep::SameDay);
        assert_eq!(same, state);
        let (step, reset) = advance(&state, day(5)).unwrap();
        assert_eq!(step, StreakStep::Reset);
        assert_eq!(reset.current_streak, 1);
        assert_eq!(reset.longest_streak, 2);
    }

    #[test]
    fn backdated_completion_is_rejected() {
        let state = StreakState {
            user_id: "u".into(),
            current_streak: 3,
            longest_streak: 5,
            last_completion_date: Some(day(10)),
        };
        assert_eq!(
            next_streak(&state, day(9)),
            Err(StreakError::Backdated {
                completed: day(9),
                last: day(10)
            })
        );
    }

    #[test]
    fn reset_keeps_longest() {
        let state = StreakState {
            user_id: "u".into(),
            current_streak: 12,
            longest_streak: 12,
            last_completion_date: Some(day(20)),
        };
        let next = next_streak(&state, day(30)).unwrap();
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.longest_streak, 12);
    }

    proptest! {
        #[test]
        fn longest_is_monotonic_and_bounds_current(gaps in prop::collection::vec(0u64..5, 1..60)) {
            let mut state = StreakState::empty("u");
            let mut offset = 0u64;
            for gap in gaps {
                offset += gap;
                let next = next_streak(&state, day(offset)).unwrap();
                prop_assert!(next.longest_streak >= state.longest_streak);
                prop_assert!(next.longest_streak >= next.current_streak);
                state = next;
            }
        }

        #[test]
        fn gap_of_two_or_more_always_resets(prior in 1u32..500, gap in 2u64..400) {
            let state = StreakState {
                user_id: "u".into(),
                current_streak: prior,
                longest_streak: prior,
                last_completion_date: Some(day(0)),
            };
            let next = next_streak(&state, day(gap)).unwrap();
            prop_assert_eq!(next.current_streak, 1);
            prop_assert_eq!(next.longest_streak, prior);
        }
    }
}
