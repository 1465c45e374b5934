//! Badge criteria.
//!
//! A criterion is a predicate over the streak state and completion
//! aggregates handed to the evaluator. It never queries history itself.

use serde::{Deserialize, Serialize};

use crate::ritual::{CompletionAggregates, StreakState};

/// Condition under which a badge is earned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BadgeCriterion {
    /// Current streak reaches `days`
    CurrentStreak { days: u32 },
    /// Longest streak ever reaches `days`
    LongestStreak { days: u32 },
    /// Total completions across all rituals
    TotalCompletions { count: u64 },
    /// Number of different rituals completed at least once
    DistinctRituals { count: u64 },
    /// Completions of rituals in one category
    CategoryCompletions { category: String, count: u64 },
}

/// How far a user is towards a criterion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub current: u64,
    pub target: u64,
}

impl Progress {
    /// Fraction in `0.0..=1.0`.
    pub fn ratio(&self) -> f64 {
        if self.target == 0 {
            return 1.0;
        }
        (self.current as f64 / self.target as f64).min(1.0)
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.target
    }
}

impl BadgeCriterion {
    pub fn progress(&self, state: &StreakState, aggregates: &CompletionAggregates) -> Progress {
        let (current, target) = match self {
            BadgeCriterion::CurrentStreak { days } => {
                (u64::from(state.current_streak), u64::from(*days))
            }
            BadgeCriterion::LongestStreak { days } => {
                (u64::from(state.longest_streak), u64::from(*days))
            }
            BadgeCriterion::TotalCompletions { count } => (aggregates.total_completions, *count),
            BadgeCriterion::DistinctRituals { count } => (aggregates.distinct_rituals, *count),
            BadgeCriterion::CategoryCompletions { category, count } => {
                (aggregates.category_count(category), *count)
            }
        };
        Progress { current, target }
    }

    pub fn is_satisfied(&self, state: &StreakState, aggregates: &CompletionAggregates) -> bool {
        self.progress(state, aggregates).is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(current: u32, longest: u32) -> StreakState {
        StreakState {
            user_id: "u".into(),
            current_streak: current,
            longest_streak: longest,
            last_completion_date: None,
        }
    }

    #[test]
    fn streak_criteria_compare_against_state() {
        let aggregates = CompletionAggregates::default();
        let criterion = BadgeCriterion::CurrentStreak { days: 3 };
        assert!(!criterion.is_satisfied(&state(2, 5), &aggregates));
        assert!(criterion.is_satisfied(&state(3, 5), &aggregates));

        let longest = BadgeCriterion::LongestStreak { days: 5 };
        assert!(longest.is_satisfied(&state(1, 5), &aggregates));
    }

    #[test]
    fn category_criterion_reads_aggregates() {
        let mut aggregates = CompletionAggregates::default();
        aggregates.by_category.insert("mindfulness".into(), 4);
        let criterion = BadgeCriterion::CategoryCompletions {
            category: "mindfulness".into(),
            count: 5,
        };
        let progress = criterion.progress(&state(0, 0), &aggregates);
        assert_eq!(progress, Progress { current: 4, target: 5 });
        assert!(!progress.is_complete());
        assert!((progress.ratio() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn ratio_is_capped() {
        assert_eq!(Progress { current: 9, target: 3 }.ratio(), 1.0);
        assert_eq!(Progress { current: 0, target: 0 }.ratio(), 1.0);
    }

    #[test]
    fn criterion_deserializes_from_toml() {
        let toml = r#"
            type = "category_completions"
            category = "fitness"
            count = 10
        "#;
        let criterion: BadgeCriterion = toml::from_str(toml).unwrap();
        assert_eq!(
            criterion,
            BadgeCriterion::CategoryCompletions {
                category: "fitness".into(),
                count: 10
            }
        );
    }
}
