//! Connection request lifecycle and connection scoring

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::model::{Connection, ConnectionRequest, RequestStatus, ScoreUpdateReport};
use crate::errors::{LinkError, Result};
use crate::notifications::{NewNotification, NotificationType};
use crate::scoring::{self, EducationProfile, GraphContext, ScoreBreakdown};
use crate::store::Store;
use crate::types::{ConnectionId, RequestId, UserId};

/// Scores attached to a request when it is (re)sent
struct RequestScores {
    match_score: u8,
    connection_strength: u8,
    common_interests: Vec<String>,
    mutual: u32,
}

impl Store {
    pub fn connection(&self, id: ConnectionId) -> Result<&Connection> {
        self.connections
            .get(&id)
            .ok_or_else(|| LinkError::not_found("connection", id))
    }

    pub fn request(&self, id: RequestId) -> Result<&ConnectionRequest> {
        self.requests
            .get(&id)
            .ok_or_else(|| LinkError::not_found("connection request", id))
    }

    /// Connection row for the pair, active or not
    pub fn connection_between(&self, a: UserId, b: UserId) -> Option<&Connection> {
        self.connections.values().find(|c| c.is_between(a, b))
    }

    fn connection_between_mut(&mut self, a: UserId, b: UserId) -> Option<&mut Connection> {
        self.connections.values_mut().find(|c| c.is_between(a, b))
    }

    pub fn are_connected(&self, a: UserId, b: UserId) -> bool {
        self.connection_between(a, b)
            .is_some_and(|c| c.is_active)
    }

    /// Active connections of a user
    pub fn connections_of(&self, user: UserId) -> Vec<&Connection> {
        self.connections
            .values()
            .filter(|c| c.is_active && c.involves(user))
            .collect()
    }

    pub fn connected_user_ids(&self, user: UserId) -> Vec<UserId> {
        self.connections_of(user)
            .iter()
            .filter_map(|c| c.other(user))
            .collect()
    }

    pub(crate) fn neighbours(&self, user: UserId) -> BTreeSet<UserId> {
        self.connected_user_ids(user).into_iter().collect()
    }

    /// Users actively connected to both `a` and `b`
    pub fn mutual_connection_count(&self, a: UserId, b: UserId) -> usize {
        self.neighbours(a)
            .intersection(&self.neighbours(b))
            .count()
    }

    /// (incoming, outgoing) pending requests
    pub fn pending_requests(
        &self,
        user: UserId,
    ) -> (Vec<&ConnectionRequest>, Vec<&ConnectionRequest>) {
        self.requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending && r.involves(user))
            .partition(|r| r.receiver == user)
    }

    fn request_scores(&self, sender: UserId, receiver: UserId) -> Result<RequestScores> {
        let a = self.user(sender)?;
        let b = self.user(receiver)?;
        let mutual = self.mutual_connection_count(sender, receiver);
        let graph = GraphContext {
            mutual,
            degree_a: self.connections_of(sender).len(),
            degree_b: self.connections_of(receiver).len(),
        };

        Ok(RequestScores {
            match_score: scoring::request_match_score(a, b),
            connection_strength: scoring::connection_strength(a, b, graph),
            common_interests: a.interests.intersection(&b.interests).cloned().collect(),
            mutual: mutual as u32,
        })
    }

    pub fn send_connection_request(
        &mut self,
        sender: UserId,
        receiver: UserId,
        message: &str,
    ) -> Result<RequestId> {
        if sender == receiver {
            return Err(LinkError::invalid("cannot send a connection request to yourself"));
        }
        self.ensure_user(sender)?;
        self.ensure_user(receiver)?;
        if self.is_blocked_between(sender, receiver) {
            return Err(LinkError::Blocked);
        }
        if self.are_connected(sender, receiver) {
            return Err(LinkError::conflict("users are already connected"));
        }
        if self.requests.values().any(|r| {
            r.sender == receiver && r.receiver == sender && r.status == RequestStatus::Pending
        }) {
            return Err(LinkError::conflict(
                "a pending request from this user exists; accept it instead",
            ));
        }

        let existing = self
            .requests
            .values()
            .find(|r| r.sender == sender && r.receiver == receiver)
            .map(|r| (r.id, r.status));

        let scores = self.request_scores(sender, receiver)?;
        let now = Utc::now();

        let id = match existing {
            Some((id, RequestStatus::Pending)) => {
                debug!(request_id = %id, "pending request already exists");
                return Ok(id);
            }
            Some((_, RequestStatus::Rejected)) => {
                return Err(LinkError::InvalidState {
                    entity: "connection request",
                    from: RequestStatus::Rejected.as_str().to_string(),
                    action: "resend",
                });
            }
            Some((id, _)) => {
                let request = self
                    .requests
                    .get_mut(&id)
                    .ok_or_else(|| LinkError::not_found("connection request", id))?;
                request.status = RequestStatus::Pending;
                request.message = message.trim().to_string();
                request.updated_at = now;
                request.match_score = scores.match_score;
                request.connection_strength = scores.connection_strength;
                request.common_interests = scores.common_interests;
                request.mutual_connections = scores.mutual;
                info!(request_id = %id, "connection request reopened");
                id
            }
            None => {
                let id = self.next_id();
                self.requests.insert(
                    id,
                    ConnectionRequest {
                        id,
                        sender,
                        receiver,
                        status: RequestStatus::Pending,
                        message: message.trim().to_string(),
                        created_at: now,
                        updated_at: now,
                        mutual_connections: scores.mutual,
                        match_score: scores.match_score,
                        connection_strength: scores.connection_strength,
                        common_interests: scores.common_interests,
                        match_highlights: Vec::new(),
                    },
                );
                info!(request_id = %id, sender = %sender, receiver = %receiver, "connection request sent");
                id
            }
        };

        let sender_name = self.user(sender)?.full_name();
        self.notify(
            NewNotification::new(
                receiver,
                NotificationType::ConnectionRequest,
                "New connection request",
                format!("{} wants to connect with you", sender_name),
            )
            .sender(sender)
            .data(json!({ "request_id": id })),
        )?;
        Ok(id)
    }

    fn pending_request_for(
        &self,
        id: RequestId,
        actor: UserId,
        as_receiver: bool,
        action: &'static str,
    ) -> Result<ConnectionRequest> {
        let request = self.request(id)?;
        let allowed = if as_receiver {
            request.receiver == actor
        } else {
            request.sender == actor
        };
        if !allowed {
            return Err(LinkError::denied(format!(
                "only the {} may {} this request",
                if as_receiver { "receiver" } else { "sender" },
                action
            )));
        }
        if request.status != RequestStatus::Pending {
            return Err(LinkError::InvalidState {
                entity: "connection request",
                from: request.status.as_str().to_string(),
                action,
            });
        }
        Ok(request.clone())
    }

    pub fn accept_connection_request(
        &mut self,
        actor: UserId,
        id: RequestId,
    ) -> Result<ConnectionId> {
        let request = self.pending_request_for(id, actor, true, "accept")?;
        if self.is_blocked_between(request.sender, request.receiver) {
            return Err(LinkError::Blocked);
        }
        let now = Utc::now();

        let connection_id = match self.connection_between_mut(request.sender, request.receiver) {
            Some(conn) => {
                conn.is_active = true;
                conn.updated_at = now;
                conn.connection_strength = request.connection_strength;
                conn.match_score = request.match_score;
                conn.common_interests = request.common_interests.clone();
                conn.mutual_connections_count = request.mutual_connections;
                conn.id
            }
            None => {
                let conn_id = self.next_id();
                self.connections.insert(
                    conn_id,
                    Connection {
                        id: conn_id,
                        user1: request.sender,
                        user2: request.receiver,
                        created_at: now,
                        updated_at: now,
                        connection_strength: request.connection_strength,
                        match_score: request.match_score,
                        last_interaction: None,
                        is_active: true,
                        mutual_connections_count: request.mutual_connections,
                        common_interests: request.common_interests.clone(),
                    },
                );
                conn_id
            }
        };

        if let Some(stored) = self.requests.get_mut(&id) {
            stored.status = RequestStatus::Accepted;
            stored.updated_at = now;
        }
        info!(request_id = %id, connection_id = %connection_id, "connection request accepted");

        let receiver_name = self.user(request.receiver)?.full_name();
        let sender_name = self.user(request.sender)?.full_name();
        self.notify(
            NewNotification::new(
                request.sender,
                NotificationType::ConnectionAccepted,
                "Connection accepted",
                format!("{} accepted your connection request", receiver_name),
            )
            .sender(request.receiver)
            .data(json!({ "connection_id": connection_id })),
        )?;
        for (recipient, other, other_name) in [
            (request.sender, request.receiver, &receiver_name),
            (request.receiver, request.sender, &sender_name),
        ] {
            self.notify(
                NewNotification::new(
                    recipient,
                    NotificationType::ConnectionCreated,
                    "New connection",
                    format!("You are now connected with {}", other_name),
                )
                .sender(other)
                .data(json!({ "connection_id": connection_id })),
            )?;
        }

        Ok(connection_id)
    }

    pub fn reject_connection_request(&mut self, actor: UserId, id: RequestId) -> Result<()> {
        let request = self.pending_request_for(id, actor, true, "reject")?;

        if let Some(stored) = self.requests.get_mut(&id) {
            stored.status = RequestStatus::Rejected;
            stored.updated_at = Utc::now();
        }
        self.mark_user_as_rejected(request.receiver, request.sender)?;
        self.mark_user_as_rejected(request.sender, request.receiver)?;
        info!(request_id = %id, "connection request rejected");

        let receiver_name = self.user(request.receiver)?.full_name();
        self.notify(
            NewNotification::new(
                request.sender,
                NotificationType::ConnectionRejected,
                "Connection request declined",
                format!("{} declined your connection request", receiver_name),
            )
            .sender(request.receiver)
            .data(json!({ "request_id": id })),
        )?;
        Ok(())
    }

    /// Withdraw a pending request; the row is removed
    pub fn cancel_connection_request(&mut self, actor: UserId, id: RequestId) -> Result<()> {
        self.pending_request_for(id, actor, false, "cancel")?;
        self.requests.remove(&id);
        info!(request_id = %id, "connection request canceled");
        Ok(())
    }

    /// Soft-delete the active connection between `actor` and `other`
    pub fn remove_connection(&mut self, actor: UserId, other: UserId) -> Result<()> {
        let conn = self
            .connection_between_mut(actor, other)
            .filter(|c| c.is_active)
            .ok_or_else(|| LinkError::not_found("connection", format!("{}-{}", actor, other)))?;
        conn.is_active = false;
        conn.updated_at = Utc::now();
        info!(user = %actor, other = %other, "connection removed");
        Ok(())
    }

    pub fn reactivate_connection(&mut self, actor: UserId, other: UserId) -> Result<()> {
        if self.is_blocked_between(actor, other) {
            return Err(LinkError::Blocked);
        }
        let conn = self
            .connection_between_mut(actor, other)
            .ok_or_else(|| LinkError::not_found("connection", format!("{}-{}", actor, other)))?;
        if conn.is_active {
            return Err(LinkError::conflict("connection is already active"));
        }
        conn.is_active = true;
        conn.updated_at = Utc::now();
        Ok(())
    }

    /// Rescore an existing connection from both profiles and the graph
    pub fn update_connection_match_score(&mut self, id: ConnectionId) -> Result<u8> {
        let (a_id, b_id) = {
            let conn = self.connection(id)?;
            (conn.user1, conn.user2)
        };
        let a = self.user(a_id)?;
        let b = self.user(b_id)?;

        let common: Vec<String> = a.interests.intersection(&b.interests).cloned().collect();
        let largest = a.interests.len().max(b.interests.len());
        let interest = if largest == 0 {
            0.0
        } else {
            common.len() as f64 / largest as f64
        };

        let mutual = self.mutual_connection_count(a_id, b_id);
        let breakdown = ScoreBreakdown {
            interest,
            network: (mutual as f64 / 10.0).min(1.0),
            activity: scoring::activity_score(a.last_active, b.last_active),
            location: scoring::location_score(&a.location, &b.location),
            education: scoring::education_score(
                &EducationProfile::from(a),
                &EducationProfile::from(b),
            ),
        };
        let score = breakdown.final_score();
        debug!(connection_id = %id, ?breakdown, score, "connection rescored");

        let conn = self
            .connections
            .get_mut(&id)
            .ok_or_else(|| LinkError::not_found("connection", id))?;
        conn.match_score = score;
        conn.common_interests = common;
        conn.mutual_connections_count = mutual as u32;
        conn.updated_at = Utc::now();
        Ok(score)
    }

    pub fn update_all_connection_scores(&mut self) -> ScoreUpdateReport {
        let ids: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.is_active)
            .map(|c| c.id)
            .collect();

        let mut report = ScoreUpdateReport {
            total: ids.len(),
            ..ScoreUpdateReport::default()
        };
        for id in ids {
            match self.update_connection_match_score(id) {
                Ok(_) => report.updated += 1,
                Err(e) => {
                    warn!(connection_id = %id, error = %e, "failed to rescore connection");
                    report.failed += 1;
                }
            }
        }
        info!(
            updated = report.updated,
            failed = report.failed,
            total = report.total,
            "connection scores updated"
        );
        report
    }

    /// Stamp the last interaction time of an active connection
    pub fn record_interaction(&mut self, a: UserId, b: UserId, now: DateTime<Utc>) -> bool {
        match self.connection_between_mut(a, b) {
            Some(conn) if conn.is_active => {
                conn.last_interaction = Some(now);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::NewUser;

    fn setup(n: usize) -> (Store, Vec<UserId>) {
        let mut store = Store::default();
        let ids = (0..n)
            .map(|i| {
                store
                    .register_user(NewUser::new(format!("user{}", i), format!("u{}@x.io", i)))
                    .unwrap()
            })
            .collect();
        (store, ids)
    }

    fn connect(store: &mut Store, a: UserId, b: UserId) -> ConnectionId {
        let rid = store.send_connection_request(a, b, "hi").unwrap();
        store.accept_connection_request(b, rid).unwrap()
    }

    #[test]
    fn test_send_and_accept() {
        let (mut store, ids) = setup(2);
        let rid = store.send_connection_request(ids[0], ids[1], " hello ").unwrap();
        assert_eq!(store.request(rid).unwrap().message, "hello");

        let (incoming, outgoing) = store.pending_requests(ids[1]);
        assert_eq!(incoming.len(), 1);
        assert!(outgoing.is_empty());

        assert!(matches!(
            store.accept_connection_request(ids[0], rid),
            Err(LinkError::PermissionDenied(_))
        ));
        store.accept_connection_request(ids[1], rid).unwrap();
        assert!(store.are_connected(ids[1], ids[0]));
        assert_eq!(store.request(rid).unwrap().status, RequestStatus::Accepted);

        assert!(matches!(
            store.accept_connection_request(ids[1], rid),
            Err(LinkError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_block_cancels_pending_request() {
        let (mut store, ids) = setup(2);
        let rid = store.send_connection_request(ids[0], ids[1], "hi").unwrap();
        store.block(ids[0], ids[1], "").unwrap();

        assert_eq!(store.request(rid).unwrap().status, RequestStatus::Canceled);
        assert!(store.accept_connection_request(ids[1], rid).is_err());
        assert!(!store.are_connected(ids[0], ids[1]));
        assert!(store.pending_requests(ids[1]).0.is_empty());
    }

    #[test]
    fn test_accept_refused_between_blocked_users() {
        let (mut store, ids) = setup(2);
        let rid = store.send_connection_request(ids[1], ids[0], "hi").unwrap();
        store.block(ids[0], ids[1], "spam").unwrap();
        // a pending row restored from an older snapshot
        if let Some(request) = store.requests.get_mut(&rid) {
            request.status = RequestStatus::Pending;
        }

        assert!(matches!(
            store.accept_connection_request(ids[0], rid),
            Err(LinkError::Blocked)
        ));
        assert!(!store.are_connected(ids[0], ids[1]));
    }

    #[test]
    fn test_send_is_idempotent_while_pending() {
        let (mut store, ids) = setup(2);
        let first = store.send_connection_request(ids[0], ids[1], "").unwrap();
        let second = store.send_connection_request(ids[0], ids[1], "again").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.requests.len(), 1);
    }

    #[test]
    fn test_send_rejections() {
        let (mut store, ids) = setup(3);
        assert!(store.send_connection_request(ids[0], ids[0], "").is_err());
        assert!(store.send_connection_request(ids[0], UserId(999), "").is_err());

        store.send_connection_request(ids[1], ids[0], "").unwrap();
        assert!(matches!(
            store.send_connection_request(ids[0], ids[1], ""),
            Err(LinkError::Conflict(_))
        ));

        store.block(ids[2], ids[0], "").unwrap();
        assert!(matches!(
            store.send_connection_request(ids[0], ids[2], ""),
            Err(LinkError::Blocked)
        ));
    }

    #[test]
    fn test_resend_after_rejection_fails() {
        let (mut store, ids) = setup(2);
        let rid = store.send_connection_request(ids[0], ids[1], "").unwrap();
        store.reject_connection_request(ids[1], rid).unwrap();

        assert!(matches!(
            store.send_connection_request(ids[0], ids[1], ""),
            Err(LinkError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_reject_marks_suggestions_both_ways() {
        let (mut store, ids) = setup(2);
        let rid = store.send_connection_request(ids[0], ids[1], "").unwrap();
        store.reject_connection_request(ids[1], rid).unwrap();

        let rows: Vec<_> = store
            .suggestions
            .iter()
            .filter(|s| s.is_rejected && !s.is_active)
            .map(|s| (s.user, s.suggested_user))
            .collect();
        assert!(rows.contains(&(ids[0], ids[1])));
        assert!(rows.contains(&(ids[1], ids[0])));
    }

    #[test]
    fn test_cancel_removes_request() {
        let (mut store, ids) = setup(2);
        let rid = store.send_connection_request(ids[0], ids[1], "").unwrap();
        assert!(store.cancel_connection_request(ids[1], rid).is_err());
        store.cancel_connection_request(ids[0], rid).unwrap();
        assert!(store.request(rid).is_err());
    }

    #[test]
    fn test_resend_after_removal_reopens_request() {
        let (mut store, ids) = setup(2);
        let conn = connect(&mut store, ids[0], ids[1]);
        store.remove_connection(ids[1], ids[0]).unwrap();
        assert!(!store.are_connected(ids[0], ids[1]));

        let rid = store.send_connection_request(ids[0], ids[1], "again").unwrap();
        assert_eq!(store.request(rid).unwrap().status, RequestStatus::Pending);

        let reused = store.accept_connection_request(ids[1], rid).unwrap();
        assert_eq!(reused, conn);
        assert!(store.are_connected(ids[0], ids[1]));
    }

    #[test]
    fn test_reactivate_connection() {
        let (mut store, ids) = setup(2);
        connect(&mut store, ids[0], ids[1]);
        assert!(store.reactivate_connection(ids[0], ids[1]).is_err());
        store.remove_connection(ids[0], ids[1]).unwrap();
        store.reactivate_connection(ids[0], ids[1]).unwrap();
        assert!(store.are_connected(ids[0], ids[1]));
    }

    #[test]
    fn test_mutual_connections() {
        let (mut store, ids) = setup(4);
        connect(&mut store, ids[0], ids[2]);
        connect(&mut store, ids[1], ids[2]);
        connect(&mut store, ids[0], ids[3]);
        assert_eq!(store.mutual_connection_count(ids[0], ids[1]), 1);
        assert_eq!(store.connected_user_ids(ids[0]).len(), 2);
    }

    #[test]
    fn test_update_connection_match_score() {
        let (mut store, ids) = setup(2);
        store.add_interest(ids[0], "rust").unwrap();
        store.add_interest(ids[0], "go").unwrap();
        store.add_interest(ids[1], "rust").unwrap();
        let conn = connect(&mut store, ids[0], ids[1]);

        // interest 0.5, network 0, activity 0, location 0.3, education 0.3
        let score = store.update_connection_match_score(conn).unwrap();
        assert_eq!(score, 23);
        let stored = store.connection(conn).unwrap();
        assert_eq!(stored.common_interests, vec!["rust".to_string()]);

        let report = store.update_all_connection_scores();
        assert_eq!(report, ScoreUpdateReport { updated: 1, failed: 0, total: 1 });
    }

    #[test]
    fn test_accept_notifies_both_sides() {
        let (mut store, ids) = setup(2);
        connect(&mut store, ids[0], ids[1]);
        let kinds = |user| {
            store
                .notifications
                .values()
                .filter(|n| n.recipient == user)
                .map(|n| n.notification_type)
                .collect::<Vec<_>>()
        };
        assert!(kinds(ids[1]).contains(&NotificationType::ConnectionRequest));
        assert!(kinds(ids[0]).contains(&NotificationType::ConnectionAccepted));
        assert!(kinds(ids[0]).contains(&NotificationType::ConnectionCreated));
        assert!(kinds(ids[1]).contains(&NotificationType::ConnectionCreated));
    }

    #[test]
    fn test_record_interaction_needs_active_connection() {
        let (mut store, ids) = setup(2);
        let now = Utc::now();
        assert!(!store.record_interaction(ids[0], ids[1], now));
        let conn = connect(&mut store, ids[0], ids[1]);
        assert!(store.record_interaction(ids[1], ids[0], now));
        assert_eq!(store.connection(conn).unwrap().last_interaction, Some(now));
    }
}
