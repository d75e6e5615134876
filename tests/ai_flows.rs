//! Integration tests for the model-assisted flows
//!
//! A scripted model stands in for the chat-completion provider, answering
//! from the prompt text so no network is needed.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use superlink::ai::{ChatMessage, ChatModel, ChatRole, CompletionOptions};
use superlink::reply_suggestions::SuggestionType;
use superlink::suggestions::SuggestionSource;
use superlink::types::UserId;
use superlink::users::NewUser;
use superlink::{Config, LinkError, Result, SuperLink};

type Responder = dyn Fn(&[ChatMessage]) -> Result<String> + Send + Sync;

struct ScriptedModel {
    responder: Box<Responder>,
    calls: AtomicUsize,
    seen: Mutex<Vec<usize>>,
}

impl ScriptedModel {
    fn new(responder: impl Fn(&[ChatMessage]) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, messages: &[ChatMessage], _options: CompletionOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.len());
        (self.responder)(messages)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn last_prompt(messages: &[ChatMessage]) -> &str {
    messages.last().map(|m| m.content.as_str()).unwrap_or_default()
}

async fn register(platform: &SuperLink, name: &str, interests: &[&str]) -> UserId {
    let interests: Vec<String> = interests.iter().map(|s| s.to_string()).collect();
    let name = name.to_string();
    platform
        .write(move |store| {
            let id = store.register_user(NewUser::new(name.as_str(), format!("{}@x.io", name)))?;
            for interest in &interests {
                store.add_interest(id, interest)?;
            }
            Ok(id)
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_interest_alchemy_picks_highest_score() {
    let model = ScriptedModel::new(|messages| {
        let prompt = last_prompt(messages);
        if prompt.contains("On a scale of 0 to 100") {
            Ok(if prompt.contains("User 2: bob,") { "92" } else { "40" }.to_string())
        } else {
            Ok("They could build a Rust synth together.".to_string())
        }
    });
    let platform = SuperLink::new(Config::default()).with_model(model.clone());
    let ada = register(&platform, "ada", &["rust", "music"]).await;
    let bob = register(&platform, "bob", &["rust"]).await;
    register(&platform, "carl", &["painting"]).await;

    let found = platform
        .interest_alchemy(ada, Some("find a cofounder"))
        .await
        .unwrap()
        .expect("a match");

    assert_eq!(found.suggested_user, bob);
    assert_eq!(found.score, 92);
    assert_eq!(found.source, SuggestionSource::Alchemy);
    assert_eq!(found.common_interests, vec!["rust".to_string()]);
    assert_eq!(found.match_highlights, vec!["They could build a Rust synth together.".to_string()]);
    // two scoring calls plus one explanation
    assert_eq!(model.calls(), 3);

    let stored = platform
        .read(|store| store.suggestions_for(ada, false).len())
        .await;
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn test_interest_alchemy_stops_on_insufficient_credits() {
    let model = ScriptedModel::new(|_| Err(LinkError::InsufficientCredits));
    let platform = SuperLink::new(Config::default()).with_model(model.clone());
    let ada = register(&platform, "ada", &["rust"]).await;
    register(&platform, "bob", &["rust"]).await;
    register(&platform, "carl", &["rust"]).await;

    let found = platform.interest_alchemy(ada, None).await.unwrap();
    assert!(found.is_none());
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_top_alchemy_scores_in_batches() {
    let model = ScriptedModel::new(|messages| {
        let scores: Vec<&str> = last_prompt(messages)
            .lines()
            .filter(|line| line.contains(" | Interests:"))
            .map(|line| {
                if line.contains("dana") {
                    "95"
                } else if line.contains("bob") {
                    "80"
                } else {
                    "30"
                }
            })
            .collect();
        Ok(scores.join(", "))
    });
    let mut config = Config::default();
    config.suggestions.alchemy_batch_size = 2;
    let platform = SuperLink::new(config).with_model(model.clone());
    let ada = register(&platform, "ada", &["chess"]).await;
    let bob = register(&platform, "bob", &["chess"]).await;
    register(&platform, "carl", &["golf"]).await;
    let dana = register(&platform, "dana", &["go"]).await;

    let top = platform
        .top_alchemy_suggestions(ada, Some("study partner"), 2)
        .await
        .unwrap();

    let ranked: Vec<(UserId, u8)> = top.iter().map(|s| (s.suggested_user, s.score)).collect();
    assert_eq!(ranked, vec![(dana, 95), (bob, 80)]);
    // three candidates in batches of two
    assert_eq!(model.calls(), 2);
    assert!(top.iter().all(|s| s.source == SuggestionSource::Alchemy));
}

#[tokio::test]
async fn test_generate_suggestions_adds_explanations() {
    let model = ScriptedModel::new(|messages| {
        let prompt = last_prompt(messages);
        if prompt.contains("Explain in 1-2 sentences") {
            Ok("Both of you write Rust.".to_string())
        } else {
            Ok("no idea".to_string())
        }
    });
    let platform = SuperLink::new(Config::default()).with_model(model);
    let ada = register(&platform, "ada", &["rust", "music"]).await;
    let bob = register(&platform, "bob", &["rust"]).await;
    register(&platform, "carl", &["painting"]).await;

    let page = platform
        .generate_suggestions(ada, 1, 10, None)
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    let explained = page
        .items
        .iter()
        .find(|s| s.suggested_user == bob)
        .expect("bob is suggested");
    assert_eq!(explained.source, SuggestionSource::AiExplained);
    assert_eq!(explained.match_highlights, vec!["Both of you write Rust.".to_string()]);
}

#[tokio::test]
async fn test_reply_suggestions_from_conversation() {
    let model = ScriptedModel::new(|_| {
        Ok(r#"{"suggestions": [
            {"type": "RESPONSES", "content": "Saturday works for me!", "confidence": 0.9},
            {"type": "RESPONSES", "content": "Which parser?", "confidence": 0.7},
            {"type": "RESPONSES", "content": "Maybe next week", "confidence": 0.4}
        ]}"#
        .to_string())
    });
    let platform = SuperLink::new(Config::default()).with_model(model);
    let ada = register(&platform, "ada", &[]).await;
    let bob = register(&platform, "bob", &[]).await;
    let carl = register(&platform, "carl", &[]).await;

    let conversation = platform
        .write(|store| {
            let id = store.create_direct_conversation(ada, bob)?;
            store.send_message(superlink::chat::NewMessage::text(
                id,
                bob,
                "Want to pair on the parser this weekend?",
            ))?;
            Ok(id)
        })
        .await
        .unwrap();

    let replies = platform
        .suggest_replies(conversation, ada, &[SuggestionType::Responses], Some(2), None)
        .await
        .unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].content, "Saturday works for me!");
    assert!(replies
        .iter()
        .all(|r| r.user == ada && r.conversation == conversation));

    let outsider = platform
        .suggest_replies(conversation, carl, &[], None, None)
        .await;
    assert!(outsider.is_err());
}

#[tokio::test]
async fn test_reply_suggestions_swallow_model_errors() {
    let model = ScriptedModel::new(|_| Err(LinkError::Timeout { duration_ms: 10 }));
    let platform = SuperLink::new(Config::default()).with_model(model);
    let ada = register(&platform, "ada", &[]).await;
    let bob = register(&platform, "bob", &[]).await;
    let conversation = platform
        .write(|store| store.create_direct_conversation(ada, bob))
        .await
        .unwrap();

    let replies = platform
        .suggest_replies(conversation, ada, &[], None, None)
        .await
        .unwrap();
    assert!(replies.is_empty());
}

#[tokio::test]
async fn test_assistant_remembers_conversation() {
    let model = ScriptedModel::new(|messages| {
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.contains("User context"));
        Ok(format!("  reply #{}  ", messages.len()))
    });
    let platform = SuperLink::new(Config::default()).with_model(model.clone());
    let ada = register(&platform, "ada", &["rust"]).await;

    let first = platform.ask_assistant(ada, "Who should I meet?").await.unwrap();
    assert_eq!(first, "reply #2");
    let second = platform.ask_assistant(ada, "And after that?").await.unwrap();
    assert_eq!(second, "reply #4");
    assert_eq!(*model.seen.lock().unwrap(), vec![2, 4]);

    let history = platform
        .read(|store| {
            store
                .assistant_memory(ada)
                .map(|m| m.history(None).len())
                .unwrap_or_default()
        })
        .await;
    assert_eq!(history, 4);

    assert!(matches!(
        platform.ask_assistant(ada, "   ").await,
        Err(LinkError::Validation(_))
    ));
}
