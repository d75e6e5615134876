//! Star ratings keyed by rater

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::UserId;
use crate::errors::{LinkError, Result};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// One rating per user; re-rating replaces the previous value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ratings(BTreeMap<UserId, u8>);

impl Ratings {
    /// Upsert a rating; `true` when the user had not rated before
    pub fn rate(&mut self, user: UserId, value: u8) -> Result<bool> {
        if !(MIN_RATING..=MAX_RATING).contains(&value) {
            return Err(LinkError::invalid(format!(
                "rating must be between {} and {}",
                MIN_RATING, MAX_RATING
            )));
        }
        Ok(self.0.insert(user, value).is_none())
    }

    pub fn remove(&mut self, user: UserId) -> bool {
        self.0.remove(&user).is_some()
    }

    pub fn get(&self, user: UserId) -> Option<u8> {
        self.0.get(&user).copied()
    }

    pub fn total(&self) -> u32 {
        self.0.len() as u32
    }

    /// Mean rating rounded to two decimals, 0 when unrated
    pub fn average(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.0.values().map(|&v| u32::from(v)).sum();
        let mean = f64::from(sum) / self.0.len() as f64;
        (mean * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_upserts() {
        let mut ratings = Ratings::default();
        assert!(ratings.rate(UserId(1), 4).unwrap());
        assert!(!ratings.rate(UserId(1), 2).unwrap());
        assert!(ratings.rate(UserId(2), 5).unwrap());
        assert_eq!(ratings.total(), 2);
        assert_eq!(ratings.average(), 3.5);
    }

    #[test]
    fn test_rate_bounds() {
        let mut ratings = Ratings::default();
        assert!(ratings.rate(UserId(1), 0).is_err());
        assert!(ratings.rate(UserId(1), 6).is_err());
        assert_eq!(ratings.average(), 0.0);
    }

    #[test]
    fn test_average_rounds() {
        let mut ratings = Ratings::default();
        for (user, value) in [(1, 5), (2, 4), (3, 4)] {
            ratings.rate(UserId(user), value).unwrap();
        }
        assert_eq!(ratings.average(), 4.33);
        assert!(ratings.remove(UserId(1)));
        assert!(!ratings.remove(UserId(1)));
        assert_eq!(ratings.average(), 4.0);
    }
}
