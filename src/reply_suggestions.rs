//! Model-generated message suggestions for a chat participant
//!
//! Suggestions are produced on demand and never stored. Context is the
//! recent conversation plus both sides' profiles; the model answers with a
//! JSON object that is parsed leniently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::ai::{extract_json_object, ChatMessage, ChatModel, CompletionOptions};
use crate::chat::ConversationKind;
use crate::errors::{LinkError, Result};
use crate::store::Store;
use crate::types::{ConversationId, UserId};
use crate::users::User;

const PROFILE_POSTS: usize = 2;
const PROMPT_MESSAGES: usize = 15;

const SYSTEM_PROMPT: &str = "You are a multilingual AI assistant that helps users generate \
appropriate message suggestions for chat conversations in any language. You analyze conversation \
context, user profiles, interests, posts and other user data to provide helpful message \
suggestions that the USER can send to their conversation partner. IMPORTANT: You are NOT \
responding to the user's messages; you are generating suggestions for the user to send to others.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionType {
    FollowUpQuestions,
    ConversationStarters,
    Responses,
    InterestBased,
    WorkEducation,
    PersonalityMatched,
    CulturalContext,
}

impl SuggestionType {
    pub const ALL: [SuggestionType; 7] = [
        SuggestionType::FollowUpQuestions,
        SuggestionType::ConversationStarters,
        SuggestionType::Responses,
        SuggestionType::InterestBased,
        SuggestionType::WorkEducation,
        SuggestionType::PersonalityMatched,
        SuggestionType::CulturalContext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionType::FollowUpQuestions => "FOLLOW_UP_QUESTIONS",
            SuggestionType::ConversationStarters => "CONVERSATION_STARTERS",
            SuggestionType::Responses => "RESPONSES",
            SuggestionType::InterestBased => "INTEREST_BASED",
            SuggestionType::WorkEducation => "WORK_EDUCATION",
            SuggestionType::PersonalityMatched => "PERSONALITY_MATCHED",
            SuggestionType::CulturalContext => "CULTURAL_CONTEXT",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            SuggestionType::FollowUpQuestions => {
                "questions the user can ask based on what their partner just said"
            }
            SuggestionType::ConversationStarters => {
                "engaging opening messages or topics the user can introduce"
            }
            SuggestionType::Responses => "natural responses to the partner's messages",
            SuggestionType::InterestBased => "messages built on shared interests or hobbies",
            SuggestionType::WorkEducation => "questions about work, career or education",
            SuggestionType::PersonalityMatched => {
                "messages matching personality traits and communication style"
            }
            SuggestionType::CulturalContext => {
                "culturally appropriate messages for the detected language and region"
            }
        }
    }
}

impl FromStr for SuggestionType {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        SuggestionType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| LinkError::invalid(format!("unknown suggestion type: {}", s)))
    }
}

/// A suggested message; transient
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplySuggestion {
    pub id: String,
    pub conversation: ConversationId,
    pub user: UserId,
    pub suggestion_type: SuggestionType,
    pub content: String,
    pub confidence: f64,
    pub language: String,
    pub reasoning: String,
    pub created_at: DateTime<Utc>,
}

/// One entry recovered from a model reply
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSuggestion {
    pub suggestion_type: SuggestionType,
    pub content: String,
    pub confidence: f64,
    pub language: String,
    pub reasoning: String,
}

fn confidence_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Recover suggestions from free-form model output
///
/// Entries without a type, content or confidence are dropped; an unknown
/// type becomes the first requested one.
pub fn parse_reply_suggestions(text: &str, types: &[SuggestionType]) -> Vec<ParsedSuggestion> {
    let fallback = types.first().copied().unwrap_or(SuggestionType::Responses);

    let Some(object) = extract_json_object(text) else {
        debug!("reply suggestion output has no JSON object");
        return Vec::new();
    };
    let parsed: Value = match serde_json::from_str(object) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "reply suggestion JSON is invalid");
            return Vec::new();
        }
    };
    let Some(entries) = parsed.get("suggestions").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let kind = entry.get("type")?.as_str()?;
            let content = entry.get("content")?.as_str()?.trim();
            let confidence = confidence_of(entry.get("confidence")?)?;
            if content.is_empty() {
                return None;
            }

            let suggestion_type = kind
                .parse::<SuggestionType>()
                .ok()
                .filter(|t| types.is_empty() || types.contains(t))
                .unwrap_or(fallback);
            Some(ParsedSuggestion {
                suggestion_type,
                content: content.to_string(),
                confidence: confidence.clamp(0.0, 1.0),
                language: entry
                    .get("language")
                    .and_then(Value::as_str)
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or("en")
                    .to_string(),
                reasoning: entry
                    .get("reasoning")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
struct ContextMessage {
    sender: String,
    is_current_user: bool,
    content: String,
    created_at: DateTime<Utc>,
}

/// Conversation snapshot handed to the prompt builder
#[derive(Debug, Clone)]
struct ReplyContext {
    kind: &'static str,
    name: String,
    partners: Vec<String>,
    current_username: String,
    /// Oldest first
    messages: Vec<ContextMessage>,
    current_profile: String,
    partner_profile: Option<String>,
}

impl Store {
    fn profile_text(&self, user: &User, label: &str) -> String {
        let mut text = format!(
            "{} Profile:\n- Name: {}\n- Username: {}\n",
            label,
            user.full_name(),
            user.username
        );
        if !user.bio.is_empty() {
            text.push_str(&format!("- Bio: {}\n", user.bio));
        }
        if !user.location.is_empty() {
            text.push_str(&format!("- Location: {}\n", user.location));
        }
        if !user.personality_tags.is_empty() {
            let tags: Vec<&str> = user.personality_tags.iter().map(String::as_str).collect();
            text.push_str(&format!("- Personality: {}\n", tags.join(", ")));
        }
        if !user.interests.is_empty() {
            let interests: Vec<&str> = user.interests.iter().map(String::as_str).collect();
            text.push_str(&format!("- Interests: {}\n", interests.join(", ")));
        }
        if !user.skills.is_empty() {
            let skills: Vec<String> = user
                .skills
                .iter()
                .map(|s| format!("{} (Level {})", s.name, s.level))
                .collect();
            text.push_str(&format!("- Skills: {}\n", skills.join(", ")));
        }
        if !user.work_experience.is_empty() {
            text.push_str(&format!("- Role: {}\n", user.role()));
        }

        let mut posts: Vec<_> = self.posts.values().filter(|p| p.author == user.id).collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if !posts.is_empty() {
            text.push_str("- Recent Posts:\n");
            for post in posts.into_iter().take(PROFILE_POSTS) {
                let preview: String = post.content.chars().take(100).collect();
                text.push_str(&format!(
                    "  * \"{}\" - {}... (Rating: {:.1}, {} comments)\n",
                    post.title, preview, post.rating, post.comment_count
                ));
            }
        }
        text
    }

    fn reply_context(&self, conversation: ConversationId, user: UserId) -> Result<ReplyContext> {
        let conv = self.conversation(conversation)?;
        if !conv.is_member(user) {
            return Err(LinkError::denied("not a member of this conversation"));
        }
        let me = self.user(user)?;

        let partners: Vec<&User> = conv
            .members
            .iter()
            .filter(|m| m.user != user)
            .filter_map(|m| self.user(m.user).ok())
            .collect();
        let (kind, name) = match &conv.kind {
            ConversationKind::Direct { .. } => ("direct", "Direct Message".to_string()),
            ConversationKind::Group { name } => ("group", name.clone()),
        };

        let messages = self
            .recent_messages(conversation, self.config.chat.context_messages)
            .into_iter()
            .map(|m| ContextMessage {
                sender: self
                    .user(m.sender)
                    .map(|u| u.username.clone())
                    .unwrap_or_default(),
                is_current_user: m.sender == user,
                content: m.content.clone(),
                created_at: m.created_at,
            })
            .collect();

        Ok(ReplyContext {
            kind,
            name,
            partners: partners.iter().map(|u| u.username.clone()).collect(),
            current_username: me.username.clone(),
            messages,
            current_profile: self.profile_text(me, "Current User"),
            partner_profile: partners
                .first()
                .map(|p| self.profile_text(p, "Other Participant")),
        })
    }
}

fn conversation_analysis(messages: &[ContextMessage]) -> String {
    let Some(last) = messages.last() else {
        return "- This is a new conversation with no messages yet".to_string();
    };
    let mut lines = Vec::new();

    if messages.len() >= 2 {
        let previous = &messages[messages.len() - 2];
        if previous.sender != last.sender {
            lines.push(format!("- CONVERSATION FLOW: {} just sent a message", last.sender));
            lines.push("- Suggest what the user should say in response".to_string());
        } else {
            lines.push(format!(
                "- CONVERSATION FLOW: {} sent consecutive messages",
                last.sender
            ));
            lines.push("- Suggest follow-up questions or conversation starters".to_string());
        }
    }

    lines.push(
        match messages.len() {
            0..=4 => "- Short conversation - focus on conversation starters and engagement",
            5..=19 => "- Medium conversation - build on existing topics",
            _ => "- Long conversation - focus on deepening engagement or topic transitions",
        }
        .to_string(),
    );

    let (non_ascii, total) = messages
        .iter()
        .rev()
        .take(10)
        .flat_map(|m| m.content.chars())
        .fold((0usize, 0usize), |(n, t), c| (n + usize::from(!c.is_ascii()), t + 1));
    if total > 0 {
        let ratio = non_ascii as f64 / total as f64;
        lines.push(
            if ratio > 0.3 {
                "- LANGUAGE: High probability of non-Latin script"
            } else if ratio > 0.1 {
                "- LANGUAGE: Mixed script detected"
            } else {
                "- LANGUAGE: Primarily Latin script detected"
            }
            .to_string(),
        );
    }
    lines.push("- Use the language of the most recent message".to_string());
    lines.join("\n")
}

fn build_prompt(
    context: &ReplyContext,
    types: &[SuggestionType],
    max: usize,
    custom_prompt: Option<&str>,
) -> String {
    let history = if context.messages.is_empty() {
        "This is a new conversation with no messages yet.\n".to_string()
    } else {
        let skip = context.messages.len().saturating_sub(PROMPT_MESSAGES);
        let mut text = format!("Recent conversation (You = {}):\n", context.current_username);
        for m in context.messages.iter().skip(skip) {
            let who = if m.is_current_user { "You" } else { m.sender.as_str() };
            text.push_str(&format!(
                "[{}] {}: {}\n",
                m.created_at.format("%Y-%m-%dT%H:%M:%S"),
                who,
                m.content
            ));
        }
        text
    };

    let custom = custom_prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            format!(
                "USER REQUEST:\nThe user specifically asked: \"{}\"\nFocus your suggestions on this request while staying relevant to the conversation.\n",
                p
            )
        })
        .unwrap_or_default();

    let type_list: Vec<&str> = types.iter().map(SuggestionType::as_str).collect();
    let type_help: Vec<String> = types
        .iter()
        .map(|t| format!("- {}: {}", t.as_str(), t.describe()))
        .collect();

    format!(
        "You generate SUGGESTIONS for the USER to send to their conversation partner. \
Do not answer the user's own messages.\n\n\
CONVERSATION CONTEXT:\n- Type: {}\n- Name: {}\n- Participants: {}\n- Current User: {}\n\n\
{}\nUSER PROFILES:\n{}\n{}\n\
CONVERSATION ANALYSIS:\n{}\n\n{}\n\
TASK:\nGenerate {} message suggestions the CURRENT USER could send next, in the language \
of the conversation, grounded in the recent messages and the profiles above.\n\n\
Suggestion Types to Generate:\n{}\n{}\n\n\
Format your response as JSON:\n\
{{\"suggestions\": [{{\"type\": \"suggestion_type\", \"content\": \"message\", \
\"confidence\": 0.85, \"language\": \"en\", \"reasoning\": \"why it fits\"}}]}}",
        context.kind,
        context.name,
        context.partners.join(", "),
        context.current_username,
        history,
        context.current_profile,
        context.partner_profile.as_deref().unwrap_or(""),
        conversation_analysis(&context.messages),
        custom,
        max,
        type_list.join(", "),
        type_help.join("\n"),
    )
}

/// Suggest messages `user` could send in `conversation`
///
/// Membership is enforced; model failures yield an empty list.
pub async fn suggest_replies(
    store: &RwLock<Store>,
    model: &dyn ChatModel,
    conversation: ConversationId,
    user: UserId,
    types: &[SuggestionType],
    max: Option<usize>,
    custom_prompt: Option<&str>,
) -> Result<Vec<ReplySuggestion>> {
    let types: Vec<SuggestionType> = if types.is_empty() {
        SuggestionType::ALL.to_vec()
    } else {
        types.to_vec()
    };

    let (context, max, options) = {
        let store = store.read().await;
        let context = store.reply_context(conversation, user)?;
        let max = max.unwrap_or(store.config().chat.max_reply_suggestions);
        (context, max, CompletionOptions::from(&store.config().ai))
    };
    if max == 0 {
        return Ok(Vec::new());
    }

    let messages = [
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(build_prompt(&context, &types, max, custom_prompt)),
    ];
    let reply = match model.complete(&messages, options).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(conversation = %conversation, user = %user, error = %e, "reply suggestions failed");
            return Ok(Vec::new());
        }
    };

    let now = Utc::now();
    let suggestions: Vec<ReplySuggestion> = parse_reply_suggestions(&reply, &types)
        .into_iter()
        .take(max)
        .enumerate()
        .map(|(i, parsed)| ReplySuggestion {
            id: format!("temp_{}_{}", i, now.timestamp()),
            conversation,
            user,
            suggestion_type: parsed.suggestion_type,
            content: parsed.content,
            confidence: parsed.confidence,
            language: parsed.language,
            reasoning: parsed.reasoning,
            created_at: now,
        })
        .collect();
    debug!(conversation = %conversation, count = suggestions.len(), "reply suggestions ready");
    Ok(suggestions)
}
