use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConnectionId, RequestId, UserId};

/// Undirected link between two users; inactive rows are soft-deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub user1: UserId,
    pub user2: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub connection_strength: u8,
    pub match_score: u8,
    pub last_interaction: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub mutual_connections_count: u32,
    pub common_interests: Vec<String>,
}

impl Connection {
    pub fn involves(&self, user: UserId) -> bool {
        self.user1 == user || self.user2 == user
    }

    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.user1 == a && self.user2 == b) || (self.user1 == b && self.user2 == a)
    }

    /// The partner of `user`, if `user` is part of the connection
    pub fn other(&self, user: UserId) -> Option<UserId> {
        if self.user1 == user {
            Some(self.user2)
        } else if self.user2 == user {
            Some(self.user1)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Canceled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub id: RequestId,
    pub sender: UserId,
    pub receiver: UserId,
    pub status: RequestStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub mutual_connections: u32,
    pub match_score: u8,
    pub connection_strength: u8,
    pub common_interests: Vec<String>,
    pub match_highlights: Vec<String>,
}

impl ConnectionRequest {
    pub fn involves(&self, user: UserId) -> bool {
        self.sender == user || self.receiver == user
    }
}

/// Outcome of a bulk rescoring run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreUpdateReport {
    pub updated: usize,
    pub failed: usize,
    pub total: usize,
}
