//! Assistant memory: bounded context window plus learning counters
//!
//! Keeps the recent conversation with the assistant, the full (capped)
//! history, and simple statistics about when and how the user writes.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::types::UserId;

/// User messages shorter than this count as short
const SHORT_MESSAGE_CHARS: usize = 50;
/// User messages shorter than this (and not short) count as medium
const MEDIUM_MESSAGE_CHARS: usize = 200;

/// One line of the assistant conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub content: String,
    pub is_user_message: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningData {
    /// Messages per hour of day (UTC)
    pub message_frequency: [u32; 24],
    pub user_messages: u32,
    pub assistant_messages: u32,
}

/// Length buckets of the user's own messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalityProfile {
    pub short: u32,
    pub medium: u32,
    pub long: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMemory {
    pub user: UserId,
    context_window: VecDeque<MemoryEntry>,
    message_history: VecDeque<MemoryEntry>,
    pub learning: LearningData,
    pub personality: PersonalityProfile,
    /// Minimum priority for assistant notifications
    pub notification_threshold: i32,
    /// `(start, end)` hours; the range may wrap past midnight
    pub quiet_hours: Option<(u8, u8)>,
    pub last_interaction: Option<DateTime<Utc>>,
}

impl AssistantMemory {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            context_window: VecDeque::new(),
            message_history: VecDeque::new(),
            learning: LearningData::default(),
            personality: PersonalityProfile::default(),
            notification_threshold: 0,
            quiet_hours: None,
            last_interaction: None,
        }
    }

    /// Append a message, evicting the oldest entries beyond the bounds
    pub fn record(
        &mut self,
        content: &str,
        is_user_message: bool,
        now: DateTime<Utc>,
        window: usize,
        history_limit: usize,
    ) {
        let entry = MemoryEntry {
            content: content.to_string(),
            is_user_message,
            timestamp: now,
        };

        self.context_window.push_back(entry.clone());
        while self.context_window.len() > window {
            self.context_window.pop_front();
        }
        self.message_history.push_back(entry);
        while self.message_history.len() > history_limit {
            self.message_history.pop_front();
        }

        self.learning.message_frequency[now.hour() as usize] += 1;
        if is_user_message {
            self.learning.user_messages += 1;
            let length = content.chars().count();
            if length < SHORT_MESSAGE_CHARS {
                self.personality.short += 1;
            } else if length < MEDIUM_MESSAGE_CHARS {
                self.personality.medium += 1;
            } else {
                self.personality.long += 1;
            }
        } else {
            self.learning.assistant_messages += 1;
        }
        self.last_interaction = Some(now);
    }

    /// Last `n` entries of the context window, oldest first
    pub fn recent_context(&self, n: usize) -> Vec<&MemoryEntry> {
        let skip = self.context_window.len().saturating_sub(n);
        self.context_window.iter().skip(skip).collect()
    }

    /// Last `limit` entries of the history, oldest first; `None` for all
    pub fn history(&self, limit: Option<usize>) -> Vec<&MemoryEntry> {
        let limit = limit.unwrap_or(self.message_history.len());
        let skip = self.message_history.len().saturating_sub(limit);
        self.message_history.iter().skip(skip).collect()
    }

    pub fn in_quiet_hours(&self, hour: u8) -> bool {
        match self.quiet_hours {
            None => false,
            Some((start, end)) if start <= end => hour >= start && hour < end,
            Some((start, end)) => hour >= start || hour < end,
        }
    }

    pub fn should_notify(&self, priority: i32, hour: u8) -> bool {
        priority >= self.notification_threshold && !self.in_quiet_hours(hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut memory = AssistantMemory::new(UserId(1));
        for i in 0..5 {
            memory.record(&format!("m{}", i), true, at(9), 3, 4);
        }
        let window: Vec<_> = memory.recent_context(10).iter().map(|e| e.content.clone()).collect();
        assert_eq!(window, vec!["m2", "m3", "m4"]);
        assert_eq!(memory.history(None).len(), 4);
        assert_eq!(memory.history(Some(2))[0].content, "m3");
    }

    #[test]
    fn test_learning_counters() {
        let mut memory = AssistantMemory::new(UserId(1));
        memory.record("hi", true, at(9), 10, 10);
        memory.record(&"x".repeat(120), true, at(9), 10, 10);
        memory.record(&"y".repeat(300), true, at(22), 10, 10);
        memory.record("hello there", false, at(22), 10, 10);

        assert_eq!(memory.learning.message_frequency[9], 2);
        assert_eq!(memory.learning.message_frequency[22], 2);
        assert_eq!(memory.learning.user_messages, 3);
        assert_eq!(memory.learning.assistant_messages, 1);
        assert_eq!(
            memory.personality,
            PersonalityProfile {
                short: 1,
                medium: 1,
                long: 1
            }
        );
        assert_eq!(memory.last_interaction, Some(at(22)));
    }

    #[test]
    fn test_quiet_hours_wrap_midnight() {
        let mut memory = AssistantMemory::new(UserId(1));
        memory.quiet_hours = Some((22, 7));
        assert!(memory.in_quiet_hours(23));
        assert!(memory.in_quiet_hours(3));
        assert!(!memory.in_quiet_hours(12));

        memory.quiet_hours = Some((13, 14));
        assert!(memory.in_quiet_hours(13));
        assert!(!memory.in_quiet_hours(14));
    }

    #[test]
    fn test_should_notify_threshold() {
        let mut memory = AssistantMemory::new(UserId(1));
        memory.notification_threshold = 2;
        assert!(!memory.should_notify(1, 12));
        assert!(memory.should_notify(2, 12));
    }
}
