//! Badge rules and evaluation.
//!
//! Badges are named achievements unlocked when a criterion over the
//! post-completion streak state and completion aggregates holds. The rule
//! table is loaded once at startup and shared read-only.

pub mod criterion;
pub mod evaluator;
pub mod table;

pub use criterion::{BadgeCriterion, Progress};
pub use evaluator::{AwardContext, AwardStore, BadgeEvaluator};
pub use table::{Badge, BadgeRuleTable};
