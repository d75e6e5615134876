//! Compatibility scoring between two users
//!
//! Pure functions shared by suggestion generation and connection rescoring.
//! Component scores are in `0.0..=1.0`; combined scores are percentages.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::users::User;

/// Score used when a location or education comparison has nothing to go on
pub const NEUTRAL_SCORE: f64 = 0.3;

pub const INTEREST_WEIGHT: f64 = 0.25;
pub const NETWORK_WEIGHT: f64 = 0.25;
pub const ACTIVITY_WEIGHT: f64 = 0.15;
pub const LOCATION_WEIGHT: f64 = 0.20;
pub const EDUCATION_WEIGHT: f64 = 0.15;

/// Per-component scores behind a final match score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub interest: f64,
    pub network: f64,
    pub activity: f64,
    pub location: f64,
    pub education: f64,
}

impl ScoreBreakdown {
    pub fn final_score(&self) -> u8 {
        final_score(self)
    }
}

/// Inverse document frequency of an interest over a corpus of interest sets
pub fn tfidf(interest: &str, corpus: &[&BTreeSet<String>]) -> f64 {
    let total = corpus.len();
    let with_interest = corpus.iter().filter(|set| set.contains(interest)).count();
    if total == 0 || with_interest == 0 {
        return 0.0;
    }
    (total as f64 / with_interest as f64).ln()
}

/// Jaccard similarity of two neighbour sets
pub fn network_score<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// How recently both users were active, relative to the more recent one
pub fn activity_score(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> f64 {
    let a = a.map(|t| t.timestamp().max(0) as f64).unwrap_or(0.0);
    let b = b.map(|t| t.timestamp().max(0) as f64).unwrap_or(0.0);
    let max = a.max(b);
    if max == 0.0 {
        return 0.0;
    }
    (a / max + b / max) / 2.0
}

pub fn location_score(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();

    if a.is_empty() || b.is_empty() {
        return NEUTRAL_SCORE;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return 0.7;
    }
    NEUTRAL_SCORE
}

/// Some word of either string occurs inside the other
fn words_overlap(a: &str, b: &str) -> bool {
    a.split_whitespace().any(|word| b.contains(word))
        || b.split_whitespace().any(|word| a.contains(word))
}

/// Education fields compared pairwise
#[derive(Debug, Clone, Default)]
pub struct EducationProfile {
    pub field: String,
    pub degree: String,
    pub institution: String,
}

impl From<&User> for EducationProfile {
    fn from(user: &User) -> Self {
        Self {
            field: user.field_of_study(),
            degree: user.degree_level(),
            institution: user.institution(),
        }
    }
}

pub fn education_score(a: &EducationProfile, b: &EducationProfile) -> f64 {
    let mut score = 0.0;
    let mut factors = 0u32;

    let pairs = [
        (&a.field, &b.field, true),
        (&a.degree, &b.degree, false),
        (&a.institution, &b.institution, true),
    ];

    for (left, right, partial) in pairs {
        let left = left.trim().to_lowercase();
        let right = right.trim().to_lowercase();
        if left.is_empty() || right.is_empty() {
            continue;
        }
        factors += 1;
        if left == right {
            score += 1.0;
        } else if partial && words_overlap(&left, &right) {
            score += 0.7;
        }
    }

    if factors == 0 {
        NEUTRAL_SCORE
    } else {
        score / factors as f64
    }
}

/// Weighted percentage of a breakdown
pub fn final_score(breakdown: &ScoreBreakdown) -> u8 {
    let weighted = breakdown.interest * INTEREST_WEIGHT
        + breakdown.network * NETWORK_WEIGHT
        + breakdown.activity * ACTIVITY_WEIGHT
        + breakdown.location * LOCATION_WEIGHT
        + breakdown.education * EDUCATION_WEIGHT;
    (weighted.clamp(0.0, 1.0) * 100.0).round() as u8
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    network_score(a, b)
}

/// Compatibility shown on a connection request
pub fn request_match_score(a: &User, b: &User) -> u8 {
    let mut score = jaccard(&a.interests, &b.interests) * 40.0;

    if !a.work_experience.is_empty() && !b.work_experience.is_empty() {
        score += if a.role() == b.role() { 20.0 } else { 10.0 };
    }

    score += jaccard(&a.personality_tags, &b.personality_tags) * 20.0;

    let (la, lb) = (a.location.trim(), b.location.trim());
    if !la.is_empty() && !lb.is_empty() {
        score += if la.eq_ignore_ascii_case(lb) { 20.0 } else { 10.0 };
    }

    score.round().min(100.0) as u8
}

/// Inputs for connection strength that live outside the two profiles
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphContext {
    pub mutual: usize,
    pub degree_a: usize,
    pub degree_b: usize,
}

fn profile_fill(user: &User) -> f64 {
    let filled = [
        !user.first_name.trim().is_empty(),
        !user.last_name.trim().is_empty(),
        user.avatar.as_deref().is_some_and(|a| !a.is_empty()),
        !user.work_experience.is_empty(),
        !user.location.trim().is_empty(),
    ]
    .iter()
    .filter(|present| **present)
    .count();
    filled as f64 / 5.0
}

/// Social closeness of two users at request time
pub fn connection_strength(a: &User, b: &User, graph: GraphContext) -> u8 {
    let mut score = 0.0;

    let min_degree = graph.degree_a.min(graph.degree_b);
    if min_degree > 0 {
        score += (graph.mutual as f64 / min_degree as f64).min(1.0) * 30.0;
    }

    let min_interests = a.interests.len().min(b.interests.len());
    if min_interests > 0 {
        let common = a.interests.intersection(&b.interests).count();
        score += common as f64 / min_interests as f64 * 30.0;
    }

    if let (Some(at), Some(bt)) = (a.last_active, b.last_active) {
        let gap = (at - bt).abs();
        score += if gap < Duration::days(7) {
            20.0
        } else if gap < Duration::days(30) {
            10.0
        } else {
            5.0
        };
    }

    score += (profile_fill(a) + profile_fill(b)) / 2.0 * 20.0;

    score.round().min(100.0) as u8
}
