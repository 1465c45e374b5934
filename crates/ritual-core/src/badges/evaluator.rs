//! Badge evaluation.
//!
//! Evaluates badges the user has not yet earned against the post-update
//! streak state and aggregates, and records awards in rank order.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;

use super::{Badge, BadgeRuleTable, Progress};
use crate::error::DatabaseError;
use crate::ritual::{BadgeAward, CompletionAggregates, StreakState};

/// Persistence for badge awards.
pub trait AwardStore {
    /// Ids of badges already awarded to `user_id`.
    fn awarded_badge_ids(&self, user_id: &str) -> Result<HashSet<String>, DatabaseError>;

    /// Insert an award unless one exists for the same user and badge.
    ///
    /// Returns `false` when the row was already present.
    fn insert_award(&self, award: &BadgeAward) -> Result<bool, DatabaseError>;
}

/// Bookkeeping attached to awards granted by one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct AwardContext<'a> {
    pub awarded_date: NaiveDate,
    pub completion_id: Option<&'a str>,
}

/// Evaluates the rule table for a user.
#[derive(Debug, Clone)]
pub struct BadgeEvaluator {
    rules: Arc<BadgeRuleTable>,
}

impl BadgeEvaluator {
    pub fn new(rules: Arc<BadgeRuleTable>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &BadgeRuleTable {
        &self.rules
    }

    /// Award every newly satisfied badge and return them in award order.
    ///
    /// Badges that a concurrent writer awarded first are skipped silently.
    pub fn evaluate<S: AwardStore + ?Sized>(
        &self,
        store: &S,
        state: &StreakState,
        aggregates: &CompletionAggregates,
        context: AwardContext<'_>,
    ) -> Result<Vec<Badge>, DatabaseError> {
        if self.rules.is_empty() {
            return Ok(Vec::new());
        }

        let user_id = state.user_id.as_str();
        let already = store.awarded_badge_ids(user_id)?;
        let mut awarded = Vec::new();

        for badge in self.rules.iter() {
            if already.contains(&badge.id) || !badge.criterion.is_satisfied(state, aggregates) {
                continue;
            }

            let award = BadgeAward {
                user_id: user_id.to_string(),
                badge_id: badge.id.clone(),
                awarded_date: context.awarded_date,
                completion_id: context.completion_id.map(str::to_string),
            };
            if store.insert_award(&award)? {
                tracing::info!(user_id, badge_id = %badge.id, rank = badge.rank, "badge awarded");
                awarded.push(badge.clone());
            } else {
                tracing::debug!(user_id, badge_id = %badge.id, "badge already awarded concurrently");
            }
        }

        Ok(awarded)
    }

    /// Progress towards every badge not in `earned`, in rank order.
    pub fn unearned_progress<'a>(
        &'a self,
        earned: &'a HashSet<String>,
        state: &'a StreakState,
        aggregates: &'a CompletionAggregates,
    ) -> impl Iterator<Item = (&'a Badge, Progress)> + 'a {
        self.rules
            .iter()
            .filter(move |badge| !earned.contains(&badge.id))
            .map(move |badge| (badge, badge.criterion.progress(state, aggregates)))
    }
}
