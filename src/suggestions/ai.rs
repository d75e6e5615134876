//! Model-assisted suggestion flows
//!
//! Each flow gathers its inputs under a read lock, releases the store while
//! the model is consulted, and writes results back under a short write lock.
//! Running out of provider credits aborts a flow; any other model failure
//! only skips the affected candidate.

use chrono::Utc;
use std::collections::BTreeSet;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::model::{SuggestionSource, UserSuggestion};
use crate::ai::{all_scores, ask_once, first_score, ChatModel, CompletionOptions};
use crate::errors::{LinkError, Result};
use crate::store::Store;
use crate::types::{Page, UserId};
use crate::users::User;

const CHAT_HISTORY_MESSAGES: usize = 10;
const ASSISTANT_HISTORY_ENTRIES: usize = 5;
const HISTORY_LINE_CHARS: usize = 100;

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Profile fields quoted in prompts
#[derive(Debug, Clone)]
struct PromptProfile {
    id: UserId,
    username: String,
    interests: BTreeSet<String>,
    goals: String,
    location: String,
    field: String,
    institution: String,
}

impl From<&User> for PromptProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            interests: user.interests.clone(),
            goals: user.goals.clone(),
            location: user.location.clone(),
            field: user.field_of_study(),
            institution: user.institution(),
        }
    }
}

impl PromptProfile {
    fn interest_list(&self) -> String {
        self.interests.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

fn explanation_prompt(a: &PromptProfile, b: &PromptProfile, common: &[String], alchemy: bool) -> String {
    let common = common.join(", ");
    let line = |n: u8, p: &PromptProfile| {
        format!(
            "User {}: {}, Interests: {}, Location: {}, Education: {} at {}",
            n, p.username, common, p.location, p.field, p.institution
        )
    };
    let ask = if alchemy {
        "Explain in 1-2 sentences why these users would be a good match, focusing on not only \
their shared interests, location, and background, but also on how their different skills, \
professions, or experiences could help each other on projects or new opportunities. Suggest \
creative or unexpected ways they could collaborate, even if their backgrounds are very different. \
Make sure to mention that they are not currently related but could help each other if they connect."
    } else {
        "Explain in 1-2 sentences why these users would be a good match, focusing on their shared \
interests, location, and background. You may also mention if their different backgrounds could \
lead to creative or mutually beneficial collaborations."
    };
    format!("{}\n{}\n{}", line(1, a), line(2, b), ask)
}

fn minimal_prompt(a: &PromptProfile, b: &PromptProfile) -> String {
    format!("Why would {} and {} be a good match?", a.username, b.username)
}

/// Inputs for scoring one alchemy candidate
#[derive(Debug, Clone)]
struct AlchemyCandidate {
    profile: PromptProfile,
    chat_history: Vec<String>,
    assistant_history: Vec<String>,
}

fn history_block(lines: &[String], heading: String, empty: String) -> String {
    if lines.is_empty() {
        empty
    } else {
        format!("{}\n{}", heading, lines.join("\n"))
    }
}

fn alchemy_score_prompt(
    me: &PromptProfile,
    my_assistant_history: &[String],
    candidate: &AlchemyCandidate,
    purpose: &str,
) -> String {
    let other = &candidate.profile;
    let chat = history_block(
        &candidate.chat_history,
        "Recent chat history between these users (most recent last):".to_string(),
        "No prior chat history between these users.".to_string(),
    );
    let mine = history_block(
        my_assistant_history,
        format!("Recent assistant chat for {}:", me.username),
        format!("No recent assistant chat for {}.", me.username),
    );
    let theirs = history_block(
        &candidate.assistant_history,
        format!("Recent assistant chat for {}:", other.username),
        format!("No recent assistant chat for {}.", other.username),
    );
    format!(
        "User 1: {}, Interests: {}, Goals: {}, Location: {}\n\
User 2: {}, Interests: {}, Goals: {}, Location: {}\n\
User 1 is looking for: {}\n\n{}\n{}\n{}\n\
On a scale of 0 to 100, how strong is the match between these users for this purpose? \
Consider not only similar backgrounds and interests, but also how their different skills, \
professions, or experiences could help each other on projects or new opportunities. \
Respond with only the number.",
        me.username,
        me.interest_list(),
        me.goals,
        me.location,
        other.username,
        other.interest_list(),
        other.goals,
        other.location,
        purpose,
        chat,
        mine,
        theirs
    )
}

fn batch_prompt(me: &PromptProfile, batch: &[PromptProfile], purpose: &str) -> String {
    let mut prompt = format!(
        "Main User:\n- Username: {}\n- Interests: {}\n- Goals: {}\n- Location: {}\n\nCandidates:\n",
        me.username,
        me.interest_list(),
        me.goals,
        me.location
    );
    for (i, candidate) in batch.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} | Interests: {} | Goals: {} | Location: {}\n",
            i + 1,
            candidate.username,
            candidate.interest_list(),
            candidate.goals,
            candidate.location
        ));
    }
    prompt.push_str(&format!(
        "\nFor each candidate, score from 0-100 how strong a match they are for {}'s goals and \
interests for the purpose: '{}'. Respond with a list of {} numbers in order, separated by commas.",
        me.username,
        purpose,
        batch.len()
    ));
    prompt
}

impl Store {
    /// Last direct messages between two users as "username: text" lines
    fn chat_history_lines(&self, a: UserId, b: UserId) -> Vec<String> {
        let Some(conversation) = self.direct_conversation_between(a, b) else {
            return Vec::new();
        };
        self.recent_messages(conversation.id, CHAT_HISTORY_MESSAGES)
            .into_iter()
            .map(|m| {
                let sender = self
                    .user(m.sender)
                    .map(|u| u.username.clone())
                    .unwrap_or_default();
                format!("{}: {}", sender, truncate(&m.content, HISTORY_LINE_CHARS))
            })
            .collect()
    }

    fn assistant_history_lines(&self, user: UserId) -> Vec<String> {
        self.assistant_memory(user)
            .map(|memory| {
                memory
                    .history(Some(ASSISTANT_HISTORY_ENTRIES))
                    .into_iter()
                    .map(|entry| {
                        let who = if entry.is_user_message { "User" } else { "AI" };
                        format!("{}: {}", who, truncate(&entry.content, HISTORY_LINE_CHARS))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Users never linked to `user` by a connection row and not blocked
    fn alchemy_pool(&self, user: UserId) -> Vec<&User> {
        let linked: BTreeSet<UserId> = self
            .connections
            .values()
            .filter_map(|c| c.other(user))
            .collect();
        self.users
            .values()
            .filter(|u| u.id != user && !linked.contains(&u.id) && !self.is_blocked_between(user, u.id))
            .collect()
    }
}

fn purpose_or_default(store: &Store, purpose: Option<&str>) -> String {
    purpose
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| store.config().suggestions.default_purpose.clone())
}

/// Ask for an explanation; `Ok(None)` when the model fails for any reason
/// other than exhausted credits
async fn explain(
    model: &dyn ChatModel,
    prompt: &str,
    options: CompletionOptions,
) -> Result<Option<String>> {
    match ask_once(model, prompt, options).await {
        Ok(text) if !text.is_empty() => Ok(Some(text)),
        Ok(_) => Ok(None),
        Err(LinkError::InsufficientCredits) => Err(LinkError::InsufficientCredits),
        Err(e) => {
            warn!(error = %e, "match explanation failed");
            Ok(None)
        }
    }
}

/// Best purpose-driven match for `user`, stored with an explanation
///
/// Returns `None` when no candidate could be scored, no explanation could
/// be produced, or the provider ran out of credits.
pub async fn interest_alchemy(
    store: &RwLock<Store>,
    model: &dyn ChatModel,
    user: UserId,
    purpose: Option<&str>,
) -> Result<Option<UserSuggestion>> {
    let (me, my_history, candidates, purpose, options) = {
        let store = store.read().await;
        let me = PromptProfile::from(store.user(user)?);
        let candidates: Vec<AlchemyCandidate> = store
            .alchemy_pool(user)
            .into_iter()
            .map(|other| AlchemyCandidate {
                profile: PromptProfile::from(other),
                chat_history: store.chat_history_lines(user, other.id),
                assistant_history: store.assistant_history_lines(other.id),
            })
            .collect();
        (
            me,
            store.assistant_history_lines(user),
            candidates,
            purpose_or_default(&store, purpose),
            CompletionOptions::from(&store.config().ai),
        )
    };

    let mut best: Option<(u32, &AlchemyCandidate)> = None;
    for candidate in &candidates {
        let prompt = alchemy_score_prompt(&me, &my_history, candidate, &purpose);
        match ask_once(model, &prompt, options).await {
            Ok(reply) => {
                if let Some(score) = first_score(&reply) {
                    if best.map_or(true, |(top, _)| score > top) {
                        best = Some((score, candidate));
                    }
                }
            }
            Err(LinkError::InsufficientCredits) => {
                warn!(user = %user, "insufficient credits, skipping interest alchemy");
                return Ok(None);
            }
            Err(e) => {
                warn!(user = %user, candidate = %candidate.profile.id, error = %e, "alchemy scoring failed");
            }
        }
    }

    let Some((score, winner)) = best else {
        debug!(user = %user, "no alchemy candidate could be scored");
        return Ok(None);
    };
    let partner = &winner.profile;
    let common: Vec<String> = me.interests.intersection(&partner.interests).cloned().collect();

    let explanation = match explain(model, &explanation_prompt(&me, partner, &common, true), options).await {
        Ok(Some(text)) => Some(text),
        Ok(None) => match explain(model, &minimal_prompt(&me, partner), options).await {
            Ok(text) => text,
            Err(_) => return Ok(None),
        },
        Err(_) => {
            warn!(user = %user, "insufficient credits, skipping alchemy explanation");
            return Ok(None);
        }
    };
    let Some(explanation) = explanation else {
        return Ok(None);
    };

    let mut store = store.write().await;
    let row = store.upsert_suggestion(user, partner.id, Utc::now(), |row| {
        row.score = score.min(100) as u8;
        row.is_active = true;
        row.match_highlights = vec![explanation];
        row.common_interests = common;
        row.source = SuggestionSource::Alchemy;
    });
    info!(user = %user, partner = %partner.id, score, "interest alchemy match stored");
    Ok(Some(row))
}

/// Top `top_n` purpose-driven matches, scored in batches
pub async fn top_alchemy_suggestions(
    store: &RwLock<Store>,
    model: &dyn ChatModel,
    user: UserId,
    purpose: Option<&str>,
    top_n: usize,
) -> Result<Vec<UserSuggestion>> {
    let now = Utc::now();
    let (me, candidates, purpose, batch_size, options) = {
        let store = store.read().await;
        let me = PromptProfile::from(store.user(user)?);

        let hours = store.config().suggestions.cache_hours;
        let recent: Vec<UserSuggestion> = store
            .suggestions_for(user, false)
            .into_iter()
            .filter(|s| s.updated_within(hours, now))
            .take(top_n)
            .cloned()
            .collect();
        if top_n > 0 && recent.len() == top_n {
            debug!(user = %user, top_n, "serving alchemy suggestions from cache");
            return Ok(recent);
        }

        let candidates: Vec<PromptProfile> = store
            .alchemy_pool(user)
            .into_iter()
            .map(PromptProfile::from)
            .collect();
        (
            me,
            candidates,
            purpose_or_default(&store, purpose),
            store.config().suggestions.alchemy_batch_size.max(1),
            CompletionOptions::from(&store.config().ai),
        )
    };

    let mut scored: Vec<(UserId, u32)> = Vec::new();
    for batch in candidates.chunks(batch_size) {
        let prompt = batch_prompt(&me, batch, &purpose);
        match ask_once(model, &prompt, options).await {
            Ok(reply) => {
                scored.extend(batch.iter().map(|c| c.id).zip(all_scores(&reply)));
            }
            Err(e) => warn!(user = %user, error = %e, "alchemy batch failed"),
        }
    }
    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(top_n);

    let mut store = store.write().await;
    let rows = scored
        .into_iter()
        .map(|(candidate, score)| {
            store.upsert_suggestion(user, candidate, now, |row| {
                row.score = score.min(100) as u8;
                row.is_active = true;
                row.match_highlights.clear();
                row.source = SuggestionSource::Alchemy;
            })
        })
        .collect();
    Ok(rows)
}

/// Traditional page enriched with explanations and the best alchemy match
pub async fn generate_suggestions(
    store: &RwLock<Store>,
    model: &dyn ChatModel,
    user: UserId,
    page: usize,
    page_size: usize,
    purpose: Option<&str>,
) -> Result<Page<UserSuggestion>> {
    let now = Utc::now();
    let (mut items, total, to_explain, options) = {
        let mut guard = store.write().await;
        let candidates = guard.candidate_pool(user)?;
        let scored = guard.score_candidates(user, &candidates)?;
        for s in &scored {
            guard.store_scored(user, s, now);
        }

        let offset = page.max(1).saturating_sub(1).saturating_mul(page_size);
        let on_page: Vec<_> = scored.iter().skip(offset).take(page_size).collect();
        let me = PromptProfile::from(guard.user(user)?);
        let mut to_explain = Vec::new();
        for s in on_page.iter().filter(|s| s.deserves_explanation()) {
            let other = PromptProfile::from(guard.user(s.candidate)?);
            to_explain.push((
                s.candidate,
                explanation_prompt(&me, &other, &s.common_interests, false),
            ));
        }

        let items: Vec<UserSuggestion> = on_page
            .iter()
            .filter_map(|s| {
                guard
                    .suggestions
                    .iter()
                    .find(|row| row.user == user && row.suggested_user == s.candidate)
                    .cloned()
            })
            .collect();
        (items, scored.len(), to_explain, CompletionOptions::from(&guard.config().ai))
    };

    let mut explanations = Vec::new();
    for (candidate, prompt) in to_explain {
        match explain(model, &prompt, options).await {
            Ok(Some(text)) => explanations.push((candidate, text)),
            Ok(None) => {}
            Err(_) => {
                warn!(user = %user, "insufficient credits, remaining explanations skipped");
                break;
            }
        }
    }

    if !explanations.is_empty() {
        let mut guard = store.write().await;
        for (candidate, text) in explanations {
            let row = guard.upsert_suggestion(user, candidate, Utc::now(), |row| {
                row.match_highlights = vec![text];
                row.source = SuggestionSource::AiExplained;
            });
            if let Some(item) = items.iter_mut().find(|i| i.suggested_user == candidate) {
                *item = row;
            }
        }
    }

    match interest_alchemy(store, model, user, purpose).await {
        Ok(Some(alchemy)) => {
            if !items.iter().any(|i| i.suggested_user == alchemy.suggested_user) {
                items.push(alchemy);
            }
        }
        Ok(None) => {}
        Err(e) => warn!(user = %user, error = %e, "interest alchemy failed"),
    }

    Ok(Page { items, total })
}
