//! Ritual completion service.
//!
//! Entry point of the engine. A completion request is validated, checked
//! against the idempotency key `(user, ritual, calendar day)`, and then
//! applied in a single write transaction: insert the completion, advance
//! the user's streak, evaluate badges, commit. Replays of a committed key
//! return the original result without touching any state.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::badges::{AwardContext, BadgeEvaluator, BadgeRuleTable};
use crate::clock::{Clock, DayBoundary, SystemClock};
use crate::error::{DatabaseError, EngineError, Result};
use crate::ritual::{
    validate_identifier, CompletionResult, Ritual, StreakState, UnearnedBadge, UserBadges,
    UserStats,
};
use crate::storage::{database, Config, Database};
use crate::streak;

/// Result of the write attempt for a new completion key.
enum WriteOutcome {
    Committed(CompletionResult),
    /// Another writer committed the same key first.
    ConflictRace,
}

/// Orchestrates completion writes, streak updates and badge awards.
pub struct RitualCompletionService {
    db: Database,
    evaluator: BadgeEvaluator,
    clock: Arc<dyn Clock>,
    days: DayBoundary,
}

impl RitualCompletionService {
    /// Service over `db` using the system clock and UTC day boundaries.
    pub fn new(db: Database, rules: Arc<BadgeRuleTable>) -> Self {
        Self {
            db,
            evaluator: BadgeEvaluator::new(rules),
            clock: Arc::new(SystemClock),
            days: DayBoundary::utc(),
        }
    }

    /// Open the configured database and apply the configured day boundary.
    pub fn open(config: &Config, rules: Arc<BadgeRuleTable>) -> Result<Self> {
        let days = config.day_boundary()?;
        let db = Database::open_at(&config.database_path()?, config.busy_timeout())?;
        Ok(Self::new(db, rules).with_day_boundary(days))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_day_boundary(mut self, days: DayBoundary) -> Self {
        self.days = days;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn day_boundary(&self) -> DayBoundary {
        self.days
    }

    /// Record a completion at the injected clock's current instant.
    pub fn complete_ritual_now(&self, user_id: &str, ritual_id: &str) -> Result<CompletionResult> {
        self.complete_ritual(user_id, ritual_id, self.clock.now())
    }

    /// Record that `user_id` completed `ritual_id` at `now`.
    ///
    /// At most one completion is stored per user, ritual and calendar day;
    /// repeated calls return the original result with `accepted == false`.
    ///
    /// # Errors
    /// - [`EngineError::InvalidArgument`] for malformed identifiers
    /// - [`EngineError::NotFound`] when the ritual does not exist
    /// - [`EngineError::BackdatedCompletion`] when the day precedes the
    ///   user's last completion day
    /// - [`EngineError::Storage`] when the transaction fails; nothing is
    ///   written in that case
    pub fn complete_ritual(
        &self,
        user_id: &str,
        ritual_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CompletionResult> {
        validate_identifier("user_id", user_id)?;
        validate_identifier("ritual_id", ritual_id)?;

        let ritual = self
            .db
            .get_ritual(ritual_id)?
            .ok_or_else(|| EngineError::NotFound(ritual_id.to_string()))?;
        let completed_date = self.days.calendar_day(now);

        if let Some(replayed) = self.replay(user_id, ritual_id, completed_date)? {
            tracing::debug!(user_id, ritual_id, %completed_date, "replayed completion");
            return Ok(replayed);
        }

        self.record(&ritual, user_id, completed_date, now)
    }

    /// Write a key that was not committed at replay time, falling back to
    /// the stored result when another writer got there first.
    fn record(
        &self,
        ritual: &Ritual,
        user_id: &str,
        completed_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<CompletionResult> {
        let ritual_id = ritual.id.as_str();
        let outcome = self
            .write_completion(ritual, user_id, completed_date, now)
            .inspect_err(|e| {
                tracing::warn!(user_id, ritual_id, %completed_date, error = %e, "completion rolled back");
            })?;

        match outcome {
            WriteOutcome::Committed(result) => Ok(result),
            WriteOutcome::ConflictRace => {
                // The winner has committed by the time our writer lock was
                // granted, so one re-read is enough.
                tracing::debug!(user_id, ritual_id, %completed_date, "lost completion race, re-reading");
                self.replay(user_id, ritual_id, completed_date)?
                    .ok_or_else(|| {
                        EngineError::Storage(DatabaseError::QueryFailed(format!(
                            "completion for {user_id}/{ritual_id} on {completed_date} vanished after conflict"
                        )))
                    })
            }
        }
    }

    /// Result of an already committed completion, if any.
    fn replay(
        &self,
        user_id: &str,
        ritual_id: &str,
        completed_date: NaiveDate,
    ) -> Result<Option<CompletionResult>> {
        let tx = self.db.begin_read()?;
        let Some(completion) = database::find_completion(&tx, user_id, ritual_id, completed_date)?
        else {
            return Ok(None);
        };
        let awarded_badges = database::completion_badge_ids(&tx, &completion.id)?;
        tx.finish()?;

        Ok(Some(CompletionResult {
            accepted: false,
            streak: completion.streak,
            awarded_badges,
        }))
    }

    fn write_completion(
        &self,
        ritual: &Ritual,
        user_id: &str,
        completed_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        // Dropping `tx` on any early return rolls everything back.
        let tx = self.db.begin_immediate()?;
        let completion_id = Uuid::new_v4().to_string();

        if !database::insert_completion(&tx, &completion_id, user_id, &ritual.id, completed_date, now)? {
            return Ok(WriteOutcome::ConflictRace);
        }

        let prev = database::load_streak_state(&tx, user_id)?
            .unwrap_or_else(|| StreakState::empty(user_id));
        let (step, next) = streak::advance(&prev, completed_date)?;
        database::save_streak_state(&tx, &next, now)?;

        let aggregates = database::completion_aggregates(&tx, user_id)?;
        let awarded = self.evaluator.evaluate(
            &*tx,
            &next,
            &aggregates,
            AwardContext {
                awarded_date: completed_date,
                completion_id: Some(&completion_id),
            },
        )?;

        let summary = next.summary();
        database::set_completion_streak(&tx, &completion_id, summary)?;
        tx.commit()?;

        tracing::info!(
            user_id,
            ritual_id = %ritual.id,
            %completed_date,
            ?step,
            current = summary.current,
            longest = summary.longest,
            badges = awarded.len(),
            "completion recorded"
        );

        Ok(WriteOutcome::Committed(CompletionResult {
            accepted: true,
            streak: summary,
            awarded_badges: awarded.into_iter().map(|badge| badge.id).collect(),
        }))
    }

    /// Streak and completion counts for a user.
    pub fn get_user_stats(&self, user_id: &str) -> Result<UserStats> {
        validate_identifier("user_id", user_id)?;

        let tx = self.db.begin_read()?;
        let state = database::load_streak_state(&tx, user_id)?
            .unwrap_or_else(|| StreakState::empty(user_id));
        let aggregates = database::completion_aggregates(&tx, user_id)?;
        tx.finish()?;

        Ok(UserStats {
            user_id: user_id.to_string(),
            current_streak: state.current_streak,
            longest_streak: state.longest_streak,
            total_completions: aggregates.total_completions,
            distinct_rituals: aggregates.distinct_rituals,
            last_completion_date: state.last_completion_date,
        })
    }

    /// Earned awards in award order and progress towards the rest.
    pub fn get_user_badges(&self, user_id: &str) -> Result<UserBadges> {
        validate_identifier("user_id", user_id)?;

        let tx = self.db.begin_read()?;
        let earned = database::badge_awards(&tx, user_id)?;
        let state = database::load_streak_state(&tx, user_id)?
            .unwrap_or_else(|| StreakState::empty(user_id));
        let aggregates = database::completion_aggregates(&tx, user_id)?;
        tx.finish()?;

        let earned_ids: HashSet<String> = earned.iter().map(|a| a.badge_id.clone()).collect();
        let unearned = self
            .evaluator
            .unearned_progress(&earned_ids, &state, &aggregates)
            .map(|(badge, progress)| UnearnedBadge {
                badge: badge.clone(),
                progress,
            })
            .collect();

        Ok(UserBadges { earned, unearned })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badges::{Badge, BadgeCriterion};
    use crate::clock::FixedClock;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    fn service() -> RitualCompletionService {
        let db = Database::open_memory().unwrap();
        db.create_ritual(&Ritual::new("r1", "Meditate", "mind")).unwrap();
        db.create_ritual(&Ritual::new("r2", "Run", "fitness")).unwrap();
        RitualCompletionService::new(db, Arc::new(BadgeRuleTable::builtin()))
    }

    #[test]
    fn first_completion_then_replay_then_next_day() {
        let svc = service();

        let first = svc.complete_ritual("u1", "r1", at(1, 8)).unwrap();
        assert_eq!(
            first,
            CompletionResult {
                accepted: true,
                streak: crate::ritual::StreakSummary { current: 1, longest: 1 },
                awarded_badges: vec![],
            }
        );

        let replay = svc.complete_ritual("u1", "r1", at(1, 21)).unwrap();
        assert!(!replay.accepted);
        assert_eq!(replay.streak, first.streak);
        assert_eq!(replay.awarded_badges, first.awarded_badges);

        let second = svc.complete_ritual("u1", "r1", at(2, 7)).unwrap();
        assert!(second.accepted);
        assert_eq!(second.streak.current, 2);
        assert_eq!(second.streak.longest, 2);
        assert_eq!(second.awarded_badges, vec!["streak-2".to_string()]);

        let second_replay = svc.complete_ritual("u1", "r1", at(2, 23)).unwrap();
        assert!(!second_replay.accepted);
        assert_eq!(second_replay.awarded_badges, vec!["streak-2".to_string()]);
    }

    #[test]
    fn validation_and_not_found() {
        let svc = service();
        assert!(matches!(
            svc.complete_ritual("", "r1", at(1, 8)),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(matches!(
            svc.complete_ritual("u 1", "r1", at(1, 8)),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(matches!(
            svc.complete_ritual("u1", "missing", at(1, 8)),
            Err(EngineError::NotFound(id)) if id == "missing"
        ));
    }

    #[test]
    fn backdated_completion_rolls_back() {
        let svc = service();
        svc.complete_ritual("u1", "r1", at(5, 8)).unwrap();

        let err = svc.complete_ritual("u1", "r2", at(3, 8)).unwrap_err();
        assert!(matches!(err, EngineError::BackdatedCompletion { .. }));

        assert!(svc
            .database()
            .find_completion("u1", "r2", NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())
            .unwrap()
            .is_none());
        assert_eq!(svc.get_user_stats("u1").unwrap().total_completions, 1);
    }

    #[test]
    fn second_ritual_same_day_keeps_streak() {
        let svc = service();
        svc.complete_ritual("u1", "r1", at(1, 8)).unwrap();
        let other = svc.complete_ritual("u1", "r2", at(1, 9)).unwrap();
        assert!(other.accepted);
        assert_eq!(other.streak.current, 1);

        let stats = svc.get_user_stats("u1").unwrap();
        assert_eq!(stats.total_completions, 2);
        assert_eq!(stats.distinct_rituals, 2);
    }

    #[test]
    fn day_boundary_decides_the_key() {
        let svc = service().with_day_boundary(DayBoundary::parse("+09:00").unwrap());
        // 20:00 UTC on Jan 1 is already Jan 2 at +09:00.
        svc.complete_ritual("u1", "r1", at(1, 20)).unwrap();
        let replay = svc.complete_ritual("u1", "r1", at(2, 10)).unwrap();
        assert!(!replay.accepted);
    }

    #[test]
    fn complete_now_uses_injected_clock() {
        let svc = service().with_clock(Arc::new(FixedClock(at(4, 12))));
        svc.complete_ritual_now("u1", "r1").unwrap();
        let stats = svc.get_user_stats("u1").unwrap();
        assert_eq!(stats.last_completion_date, NaiveDate::from_ymd_opt(2024, 1, 4));
    }

    #[test]
    fn failing_evaluation_leaves_no_partial_state() {
        let db = Database::open_memory().unwrap();
        db.create_ritual(&Ritual::new("r1", "Meditate", "mind")).unwrap();
        // Make every award insert fail so the transaction aborts after the
        // completion and streak rows were written.
        db.conn()
            .execute_batch(
                "CREATE TRIGGER reject_awards BEFORE INSERT ON badge_awards
                 BEGIN SELECT RAISE(ABORT, 'awards disabled'); END;",
            )
            .unwrap();
        let rules = BadgeRuleTable::from_badges(vec![Badge::new(
            "first",
            "First",
            1,
            BadgeCriterion::TotalCompletions { count: 1 },
        )])
        .unwrap();
        let svc = RitualCompletionService::new(db, Arc::new(rules));

        let err = svc.complete_ritual("u1", "r1", at(1, 8)).unwrap_err();
        assert!(matches!(err, EngineError::Storage(_)));

        let db = svc.database();
        assert!(db.streak_state("u1").unwrap().is_none());
        assert!(db.completions("u1").unwrap().is_empty());
        assert!(db.badge_awards("u1").unwrap().is_empty());
    }

    #[test]
    fn lost_race_returns_committed_result() {
        let svc = service();
        svc.complete_ritual("u1", "r1", at(1, 8)).unwrap();
        let winner = svc.complete_ritual("u1", "r1", at(2, 8)).unwrap();

        // Same key committed after this caller's replay check came up empty.
        let ritual = svc.database().get_ritual("r1").unwrap().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(matches!(
            svc.write_completion(&ritual, "u1", day, at(2, 9)).unwrap(),
            WriteOutcome::ConflictRace
        ));

        let loser = svc.record(&ritual, "u1", day, at(2, 9)).unwrap();
        assert!(!loser.accepted);
        assert_eq!(loser.streak, winner.streak);
        assert_eq!(loser.awarded_badges, vec!["streak-2".to_string()]);

        assert_eq!(svc.database().completions("u1").unwrap().len(), 2);
        assert_eq!(svc.database().badge_awards("u1").unwrap().len(), 1);
        assert_eq!(svc.get_user_stats("u1").unwrap().current_streak, 2);
    }

    #[test]
    fn user_badges_split_earned_and_unearned() {
        let svc = service();
        svc.complete_ritual("u1", "r1", at(1, 8)).unwrap();
        svc.complete_ritual("u1", "r1", at(2, 8)).unwrap();
        svc.complete_ritual("u1", "r1", at(3, 8)).unwrap();

        let badges = svc.get_user_badges("u1").unwrap();
        let earned: Vec<&str> = badges.earned.iter().map(|a| a.badge_id.as_str()).collect();
        assert_eq!(earned, vec!["streak-2", "streak-3"]);

        let next = &badges.unearned[0];
        assert_eq!(next.badge.id, "streak-7");
        assert_eq!(next.progress.current, 3);
        assert_eq!(next.progress.target, 7);
        assert!(badges.unearned.iter().all(|u| u.badge.id != "streak-2"));
    }
}
