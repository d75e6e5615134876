//! Type definitions module
//!
//! Identifier newtypes and small value types shared by every domain module.

pub mod ids;
pub mod rating;

use chrono::{DateTime, TimeDelta, Utc};

use crate::errors::{LinkError, Result};

// Re-export commonly used types
pub use ids::{
    CommentId, CommunityId, ConnectionId, ConversationId, EventId, JoinRequestId, MessageId,
    NotificationId, PostId, ReplyId, RequestId, SkillId, StoryId, ThreadId, UserId,
};
pub use rating::Ratings;

/// Page of results with the total count before pagination
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

/// Slice a list into a 1-based page
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Vec<T> {
    let page = page.max(1);
    let offset = (page - 1).saturating_mul(page_size);
    items
        .iter()
        .skip(offset)
        .take(page_size)
        .cloned()
        .collect()
}

/// Shift a timestamp by whole hours, rejecting offsets chrono cannot represent
pub fn shift_hours(at: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_hours(hours)
        .and_then(|delta| at.checked_add_signed(delta))
        .ok_or_else(|| LinkError::invalid(format!("{} hours is out of range", hours)))
}

pub fn shift_minutes(at: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_minutes(minutes)
        .and_then(|delta| at.checked_add_signed(delta))
        .ok_or_else(|| LinkError::invalid(format!("{} minutes is out of range", minutes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_rejects_unrepresentable_offsets() {
        let now = Utc::now();
        assert_eq!(shift_hours(now, 2).unwrap(), now + TimeDelta::hours(2));
        assert_eq!(shift_minutes(now, -5).unwrap(), now - TimeDelta::minutes(5));
        assert!(matches!(
            shift_hours(now, i64::MAX / 2),
            Err(LinkError::Validation(_))
        ));
        assert!(shift_minutes(now, i64::MIN).is_err());
    }

    #[test]
    fn test_paginate_pages() {
        let items: Vec<u32> = (1..=7).collect();
        assert_eq!(paginate(&items, 1, 3), vec![1, 2, 3]);
        assert_eq!(paginate(&items, 3, 3), vec![7]);
        assert!(paginate(&items, 4, 3).is_empty());
    }

    #[test]
    fn test_paginate_zero_page_is_first() {
        let items = vec!["a", "b"];
        assert_eq!(paginate(&items, 0, 1), vec!["a"]);
    }
}
