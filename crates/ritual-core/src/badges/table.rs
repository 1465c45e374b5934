//! Badge rule table.
//!
//! Loaded once at process start, either from a TOML file of `[[badges]]`
//! entries or from the built-in defaults, then shared behind an `Arc`.
//! Badges are held in evaluation order: ascending rank, ties broken by
//! position in the source table.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::BadgeCriterion;
use crate::error::ConfigError;

/// A named achievement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Badge {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ordering key; lower ranks are evaluated and awarded first.
    pub rank: u32,
    pub criterion: BadgeCriterion,
}

impl Badge {
    pub fn new(id: &str, name: &str, rank: u32, criterion: BadgeCriterion) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            rank,
            criterion,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct BadgesFile {
    #[serde(default)]
    badges: Vec<Badge>,
}

/// Read-only set of badge criteria in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct BadgeRuleTable {
    badges: Vec<Badge>,
}

impl BadgeRuleTable {
    /// Table with no badges; evaluation awards nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table, validating ids and fixing evaluation order.
    pub fn from_badges(mut badges: Vec<Badge>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for badge in &badges {
            if badge.id.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "badges.id".into(),
                    message: format!("badge '{}' has an empty id", badge.name),
                });
            }
            if !seen.insert(badge.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: "badges.id".into(),
                    message: format!("duplicate badge id '{}'", badge.id),
                });
            }
        }
        // Stable sort keeps definition order among equal ranks.
        badges.sort_by_key(|badge| badge.rank);
        Ok(Self { badges })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: BadgesFile =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::from_badges(file.badges)
    }

    /// Load the table from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let table = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), badges = table.len(), "loaded badge rule table");
        Ok(table)
    }

    /// Default badge set used when no rules file is configured.
    pub fn builtin() -> Self {
        use BadgeCriterion::*;

        let badges = vec![
            Badge::new("streak-2", "Two in a Row", 10, CurrentStreak { days: 2 }),
            Badge::new("streak-3", "Three-Day Streak", 20, CurrentStreak { days: 3 }),
            Badge::new("streak-7", "Week Strong", 30, CurrentStreak { days: 7 }),
            Badge::new("streak-14", "Fortnight", 40, CurrentStreak { days: 14 }),
            Badge::new("streak-30", "Monthly Devotion", 50, CurrentStreak { days: 30 }),
            Badge::new("completions-10", "Ten Rituals", 60, TotalCompletions { count: 10 }),
            Badge::new("explorer-3", "Explorer", 65, DistinctRituals { count: 3 }),
            Badge::new("completions-50", "Fifty Rituals", 70, TotalCompletions { count: 50 }),
            Badge::new("completions-100", "Centurion", 80, TotalCompletions { count: 100 }),
        ];
        Self { badges }
    }

    /// Badges in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &Badge> {
        self.badges.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Badge> {
        self.badges.iter().find(|badge| badge.id == id)
    }

    pub fn len(&self) -> usize {
        self.badges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.badges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_rank_then_definition_order() {
        let table = BadgeRuleTable::from_toml_str(
            r#"
            [[badges]]
            id = "late"
            name = "Late"
            rank = 5
            criterion = { type = "total_completions", count = 5 }

            [[badges]]
            id = "tie-a"
            name = "Tie A"
            rank = 1
            criterion = { type = "current_streak", days = 2 }

            [[badges]]
            id = "tie-b"
            name = "Tie B"
            rank = 1
            criterion = { type = "current_streak", days = 2 }
            "#,
        )
        .unwrap();

        let ids: Vec<&str> = table.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["tie-a", "tie-b", "late"]);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let badges = vec![
            Badge::new("dup", "One", 1, BadgeCriterion::CurrentStreak { days: 1 }),
            Badge::new("dup", "Two", 2, BadgeCriterion::CurrentStreak { days: 2 }),
        ];
        assert!(matches!(
            BadgeRuleTable::from_badges(badges),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn empty_file_yields_empty_table() {
        let table = BadgeRuleTable::from_toml_str("").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn builtin_is_sorted_and_unique() {
        let builtin = BadgeRuleTable::builtin();
        let reloaded = BadgeRuleTable::from_badges(builtin.iter().cloned().collect()).unwrap();
        let a: Vec<&str> = builtin.iter().map(|b| b.id.as_str()).collect();
        let b: Vec<&str> = reloaded.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(a, b);
        assert_eq!(builtin.get("streak-2").map(|b| b.rank), Some(10));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("badges.toml");
        std::fs::write(
            &path,
            "[[badges]]\nid = \"streak-2\"\nname = \"Two\"\nrank = 1\ncriterion = { type = \"current_streak\", days = 2 }\n",
        )
        .unwrap();
        let table = BadgeRuleTable::load(&path).unwrap();
        assert_eq!(table.len(), 1);

        let missing = BadgeRuleTable::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::LoadFailed { .. })));
    }
}
