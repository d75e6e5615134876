use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::ScoreBreakdown;
use crate::types::UserId;

/// Mutual connections at or above this strength count as strong
pub const STRONG_CONNECTION_THRESHOLD: u8 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    #[default]
    Traditional,
    AiExplained,
    Alchemy,
}

/// A suggested connection, one row per (user, suggested_user)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSuggestion {
    pub user: UserId,
    pub suggested_user: UserId,
    pub score: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub match_highlights: Vec<String>,
    pub common_interests: Vec<String>,
    pub mutual_connections: u32,
    pub strong_connections: u32,
    pub is_active: bool,
    pub is_rejected: bool,
    pub rejected_at: Option<DateTime<Utc>>,
    pub source: SuggestionSource,
}

impl UserSuggestion {
    pub(crate) fn new(user: UserId, suggested_user: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user,
            suggested_user,
            score: 0,
            created_at: now,
            updated_at: now,
            match_highlights: Vec::new(),
            common_interests: Vec::new(),
            mutual_connections: 0,
            strong_connections: 0,
            is_active: true,
            is_rejected: false,
            rejected_at: None,
            source: SuggestionSource::Traditional,
        }
    }

    /// Fresh enough to serve from cache
    pub fn updated_within(&self, hours: i64, now: DateTime<Utc>) -> bool {
        match chrono::TimeDelta::try_hours(hours) {
            Some(window) => now.signed_duration_since(self.updated_at) <= window,
            None => hours > 0,
        }
    }
}

/// Traditional score of one candidate before it is stored
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: UserId,
    pub breakdown: ScoreBreakdown,
    pub score: u8,
    pub common_interests: Vec<String>,
    pub mutual_connections: u32,
    pub strong_connections: u32,
}

impl ScoredCandidate {
    /// Worth asking the model to explain
    pub fn deserves_explanation(&self) -> bool {
        !self.common_interests.is_empty()
            || self.breakdown.location >= 0.7
            || self.breakdown.education >= 0.7
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_updated_within() {
        let now = Utc::now();
        let mut row = UserSuggestion::new(UserId(1), UserId(2), now - Duration::hours(3));
        assert!(row.updated_within(24, now));
        row.updated_at = now - Duration::hours(25);
        assert!(!row.updated_within(24, now));
    }

    #[test]
    fn test_updated_within_huge_window() {
        let now = Utc::now();
        let row = UserSuggestion::new(UserId(1), UserId(2), now - Duration::days(400));
        assert!(row.updated_within(i64::MAX / 2, now));
        assert!(!row.updated_within(i64::MIN, now));
    }

    #[test]
    fn test_deserves_explanation() {
        let mut scored = ScoredCandidate {
            candidate: UserId(2),
            breakdown: ScoreBreakdown::default(),
            score: 10,
            common_interests: Vec::new(),
            mutual_connections: 0,
            strong_connections: 0,
        };
        assert!(!scored.deserves_explanation());
        scored.breakdown.education = 0.7;
        assert!(scored.deserves_explanation());
    }

    #[test]
    fn test_source_serializes_snake_case() {
        let json = serde_json::to_string(&SuggestionSource::AiExplained).unwrap();
        assert_eq!(json, "\"ai_explained\"");
    }
}
