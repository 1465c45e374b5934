//! # Ritual Core Library
//!
//! This library provides the completion engine behind a daily ritual
//! (habit) tracker. Every operation is available through the library, with
//! the `ritual-cli` binary being a thin layer over it.
//!
//! ## Architecture
//!
//! - **Completion service**: records completions idempotently per user,
//!   ritual and calendar day, updating streaks and badges in one
//!   transaction
//! - **Streaks**: pure consecutive-day calculator
//! - **Badges**: rank-ordered rule table loaded once, and an evaluator that
//!   awards each badge at most once per user
//! - **Storage**: SQLite persistence and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`RitualCompletionService`]: engine entry point
//! - [`BadgeRuleTable`]: read-only badge criteria
//! - [`Database`]: rituals, completions, streaks and awards
//! - [`Config`]: engine configuration management

pub mod badges;
pub mod clock;
pub mod error;
pub mod ritual;
pub mod service;
pub mod storage;
pub mod streak;

pub use badges::{Badge, BadgeCriterion, BadgeEvaluator, BadgeRuleTable, Progress};
pub use clock::{Clock, DayBoundary, FixedClock, SystemClock};
pub use error::{ConfigError, DatabaseError, EngineError, ValidationError};
pub use ritual::{
    BadgeAward, Completion, CompletionAggregates, CompletionResult, Ritual, StreakState,
    StreakSummary, UnearnedBadge, UserBadges, UserStats,
};
pub use service::RitualCompletionService;
pub use storage::{Config, Database};
pub use streak::{next_streak, StreakError, StreakStep};
