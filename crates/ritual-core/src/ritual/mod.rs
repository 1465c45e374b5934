//! Ritual domain types.
//!
//! Rituals are habit definitions owned outside the engine; completions,
//! streak states and badge awards are the records the engine writes.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::badges::{Badge, Progress};
use crate::error::ValidationError;

/// Longest identifier accepted for users and rituals.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// A habit a user can complete once per calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ritual {
    pub id: String,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

fn default_category() -> String {
    "general".to_string()
}

impl Ritual {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            description: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// A recorded instance of a user finishing a ritual on a calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub id: String,
    pub user_id: String,
    pub ritual_id: String,
    pub completed_date: NaiveDate,
    pub completed_at: DateTime<Utc>,
    /// Streak as it stood right after this completion committed.
    pub streak: StreakSummary,
}

/// Per-user consecutive-day streak, shared across all rituals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub user_id: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_completion_date: Option<NaiveDate>,
}

impl StreakState {
    /// Starting state for a user with no completions.
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            current_streak: 0,
            longest_streak: 0,
            last_completion_date: None,
        }
    }

    pub fn summary(&self) -> StreakSummary {
        StreakSummary {
            current: self.current_streak,
            longest: self.longest_streak,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreakSummary {
    pub current: u32,
    pub longest: u32,
}

/// Permanent record that a user earned a badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeAward {
    pub user_id: String,
    pub badge_id: String,
    pub awarded_date: NaiveDate,
    /// Completion whose transaction granted the award.
    pub completion_id: Option<String>,
}

/// Completion counts a badge predicate may look at.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompletionAggregates {
    pub total_completions: u64,
    pub distinct_rituals: u64,
    pub by_category: BTreeMap<String, u64>,
}

impl CompletionAggregates {
    pub fn category_count(&self, category: &str) -> u64 {
        self.by_category.get(category).copied().unwrap_or(0)
    }
}

/// Outcome of a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResult {
    /// `false` when the request replayed an existing completion.
    pub accepted: bool,
    pub streak: StreakSummary,
    pub awarded_badges: Vec<String>,
}

/// Read-only projection of a user's streak and completion counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_completions: u64,
    pub distinct_rituals: u64,
    pub last_completion_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnearnedBadge {
    pub badge: Badge,
    pub progress: Progress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBadges {
    pub earned: Vec<BadgeAward>,
    pub unearned: Vec<UnearnedBadge>,
}

/// Validate a user or ritual identifier.
///
/// Identifiers are 1 to [`MAX_IDENTIFIER_LEN`] ASCII characters drawn from
/// alphanumerics and `-_.:@`.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_IDENTIFIER_LEN,
        });
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@')))
    {
        return Err(ValidationError::InvalidValue {
            field,
            message: format!("unexpected character {bad:?}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_streak_state_has_no_history() {
        let state = StreakState::empty("u1");
        assert_eq!(state.current_streak, 0);
        assert_eq!(state.longest_streak, 0);
        assert!(state.last_completion_date.is_none());
        assert_eq!(state.summary(), StreakSummary::default());
    }

    #[test]
    fn identifiers_accept_common_forms() {
        assert!(validate_identifier("user_id", "user-42").is_ok());
        assert!(validate_identifier("user_id", "auth0:abc.def@example").is_ok());
        assert!(validate_identifier("ritual_id", "morning_pages").is_ok());
    }

    #[test]
    fn identifiers_reject_malformed_values() {
        assert!(matches!(
            validate_identifier("user_id", ""),
            Err(ValidationError::Empty { field: "user_id" })
        ));
        assert!(matches!(
            validate_identifier("user_id", &"x".repeat(MAX_IDENTIFIER_LEN + 1)),
            Err(ValidationError::TooLong { .. })
        ));
        assert!(matches!(
            validate_identifier("user_id", "bad id"),
            Err(ValidationError::InvalidValue { .. })
        ));
        assert!(validate_identifier("user_id", "ユーザー").is_err());
    }

    #[test]
    fn category_count_defaults_to_zero() {
        let mut aggregates = CompletionAggregates::default();
        aggregates.by_category.insert("health".into(), 3);
        assert_eq!(aggregates.category_count("health"), 3);
        assert_eq!(aggregates.category_count("focus"), 0);
    }
}
