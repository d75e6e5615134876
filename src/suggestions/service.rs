//! Traditional suggestion generation and suggestion bookkeeping

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::model::{ScoredCandidate, SuggestionSource, UserSuggestion, STRONG_CONNECTION_THRESHOLD};
use crate::connections::{RequestStatus, ScoreUpdateReport};
use crate::errors::Result;
use crate::scoring::{self, EducationProfile, ScoreBreakdown};
use crate::store::Store;
use crate::types::{paginate, Page, UserId};

impl Store {
    /// Users that could still be suggested to `user`
    ///
    /// Most recently active first; users who were never active come last.
    pub fn candidate_pool(&self, user: UserId) -> Result<Vec<UserId>> {
        self.ensure_user(user)?;

        let mut excluded: BTreeSet<UserId> = BTreeSet::from([user]);
        excluded.extend(
            self.connections
                .values()
                .filter_map(|c| c.other(user)),
        );
        excluded.extend(
            self.requests
                .values()
                .filter(|r| {
                    r.involves(user)
                        && matches!(r.status, RequestStatus::Pending | RequestStatus::Accepted)
                })
                .map(|r| if r.sender == user { r.receiver } else { r.sender }),
        );
        excluded.extend(
            self.suggestions
                .iter()
                .filter(|s| s.user == user && s.is_rejected)
                .map(|s| s.suggested_user),
        );

        let mut pool: Vec<&crate::users::User> = self
            .users
            .values()
            .filter(|u| !excluded.contains(&u.id) && !self.is_blocked_between(user, u.id))
            .collect();
        pool.sort_by(|a, b| b.last_active.cmp(&a.last_active).then(a.id.cmp(&b.id)));
        Ok(pool.into_iter().map(|u| u.id).collect())
    }

    /// Mutual neighbours joined to both users by strong connections
    fn strong_mutual_count(&self, a: UserId, b: UserId) -> u32 {
        let strong = |x: UserId, y: UserId| {
            self.connection_between(x, y)
                .is_some_and(|c| c.is_active && c.connection_strength >= STRONG_CONNECTION_THRESHOLD)
        };
        self.neighbours(a)
            .intersection(&self.neighbours(b))
            .filter(|m| strong(a, **m) && strong(b, **m))
            .count() as u32
    }

    /// Score candidates against `user`; interest rarity is measured over
    /// the candidates' own interest sets
    pub fn score_candidates(
        &self,
        user: UserId,
        candidates: &[UserId],
    ) -> Result<Vec<ScoredCandidate>> {
        let me = self.user(user)?;
        let my_neighbours = self.neighbours(user);
        let my_education = EducationProfile::from(me);

        let others = candidates
            .iter()
            .map(|id| self.user(*id))
            .collect::<Result<Vec<_>>>()?;
        let corpus: Vec<&BTreeSet<String>> = others.iter().map(|u| &u.interests).collect();

        let mut scored = Vec::with_capacity(others.len());
        for other in others {
            let common: Vec<String> = me.interests.intersection(&other.interests).cloned().collect();
            let their_neighbours = self.neighbours(other.id);

            let breakdown = ScoreBreakdown {
                interest: common.iter().map(|i| scoring::tfidf(i, &corpus)).sum(),
                network: scoring::network_score(&my_neighbours, &their_neighbours),
                activity: scoring::activity_score(me.last_active, other.last_active),
                location: scoring::location_score(&me.location, &other.location),
                education: scoring::education_score(&my_education, &EducationProfile::from(other)),
            };
            let score = breakdown.final_score();
            debug!(user = %user, candidate = %other.id, ?breakdown, score, "candidate scored");

            scored.push(ScoredCandidate {
                candidate: other.id,
                breakdown,
                score,
                common_interests: common,
                mutual_connections: my_neighbours.intersection(&their_neighbours).count() as u32,
                strong_connections: self.strong_mutual_count(user, other.id),
            });
        }
        Ok(scored)
    }

    /// Insert or update the row for (user, suggested), returning a copy
    pub(crate) fn upsert_suggestion(
        &mut self,
        user: UserId,
        suggested: UserId,
        now: DateTime<Utc>,
        apply: impl FnOnce(&mut UserSuggestion),
    ) -> UserSuggestion {
        let index = match self
            .suggestions
            .iter()
            .position(|s| s.user == user && s.suggested_user == suggested)
        {
            Some(index) => index,
            None => {
                self.suggestions.push(UserSuggestion::new(user, suggested, now));
                self.suggestions.len() - 1
            }
        };
        let row = &mut self.suggestions[index];
        apply(row);
        row.updated_at = now;
        row.clone()
    }

    /// Store a traditional score; any previous explanation is cleared
    pub(crate) fn store_scored(
        &mut self,
        user: UserId,
        scored: &ScoredCandidate,
        now: DateTime<Utc>,
    ) -> UserSuggestion {
        self.upsert_suggestion(user, scored.candidate, now, |row| {
            row.score = scored.score;
            row.match_highlights.clear();
            row.common_interests = scored.common_interests.clone();
            row.mutual_connections = scored.mutual_connections;
            row.strong_connections = scored.strong_connections;
            row.is_active = true;
            row.source = SuggestionSource::Traditional;
        })
    }

    /// Fresh rows whose user is still a candidate
    fn cached_traditional(&self, user: UserId, now: DateTime<Utc>) -> Result<Vec<UserSuggestion>> {
        let hours = self.config.suggestions.cache_hours;
        let pool: BTreeSet<UserId> = self.candidate_pool(user)?.into_iter().collect();
        let mut rows: Vec<UserSuggestion> = self
            .suggestions
            .iter()
            .filter(|s| {
                s.user == user
                    && s.is_active
                    && !s.is_rejected
                    && s.match_highlights.is_empty()
                    && s.updated_within(hours, now)
                    && pool.contains(&s.suggested_user)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.score.cmp(&a.score).then(a.suggested_user.cmp(&b.suggested_user)));
        Ok(rows)
    }

    /// Score and store every candidate, returning rows in candidate order
    fn rebuild_traditional(&mut self, user: UserId, now: DateTime<Utc>) -> Result<Vec<UserSuggestion>> {
        let candidates = self.candidate_pool(user)?;
        let scored = self.score_candidates(user, &candidates)?;
        Ok(scored
            .iter()
            .map(|s| self.store_scored(user, s, now))
            .collect())
    }

    /// One page of suggestions, served from cache when the page is full
    pub fn generate_traditional_suggestions(
        &mut self,
        user: UserId,
        page: usize,
        page_size: usize,
        now: DateTime<Utc>,
    ) -> Result<Page<UserSuggestion>> {
        self.ensure_user(user)?;
        let offset = page.max(1).saturating_sub(1).saturating_mul(page_size);

        let cached = self.cached_traditional(user, now)?;
        if cached.len() >= offset + page_size {
            debug!(user = %user, cached = cached.len(), "serving suggestions from cache");
            return Ok(Page {
                items: paginate(&cached, page, page_size),
                total: cached.len(),
            });
        }

        let rows = self.rebuild_traditional(user, now)?;
        info!(user = %user, candidates = rows.len(), "suggestions generated");
        Ok(Page {
            items: paginate(&rows, page, page_size),
            total: rows.len(),
        })
    }

    /// Hide `rejected` from `user`'s suggestions for good
    pub fn mark_user_as_rejected(&mut self, user: UserId, rejected: UserId) -> Result<()> {
        self.ensure_user(user)?;
        self.ensure_user(rejected)?;
        let now = Utc::now();
        self.upsert_suggestion(user, rejected, now, |row| {
            row.is_active = false;
            row.is_rejected = true;
            row.rejected_at = Some(now);
        });
        debug!(user = %user, rejected = %rejected, "suggestion marked rejected");
        Ok(())
    }

    /// Regenerate traditional suggestions for every user, ignoring the cache
    pub fn refresh_all_suggestions(&mut self) -> ScoreUpdateReport {
        let users: Vec<UserId> = self.users.keys().copied().collect();
        let now = Utc::now();
        let mut report = ScoreUpdateReport {
            total: users.len(),
            ..ScoreUpdateReport::default()
        };
        for user in users {
            match self.rebuild_traditional(user, now) {
                Ok(_) => report.updated += 1,
                Err(e) => {
                    warn!(user = %user, error = %e, "failed to refresh suggestions");
                    report.failed += 1;
                }
            }
        }
        info!(updated = report.updated, failed = report.failed, "suggestions refreshed");
        report
    }

    /// Stored suggestions for `user`, best first
    pub fn suggestions_for(&self, user: UserId, include_rejected: bool) -> Vec<&UserSuggestion> {
        let mut rows: Vec<&UserSuggestion> = self
            .suggestions
            .iter()
            .filter(|s| s.user == user && (include_rejected || (s.is_active && !s.is_rejected)))
            .collect();
        rows.sort_by(|a, b| b.score.cmp(&a.score).then(a.suggested_user.cmp(&b.suggested_user)));
        rows
    }
}
