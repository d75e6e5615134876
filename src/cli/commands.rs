//! Command handlers for the `superlink` binary
//!
//! Each invocation loads the snapshot, runs one command through the
//! platform facade and saves the snapshot again.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use colored::Colorize;
use futures_util::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ai::{ChatMessage, ChatModel, CompletionOptions, OpenAiCompatClient};
use crate::cli::args::{
    AiCommand, Args, ChatCommand, Commands, CommunityCommand, ConnectCommand, MaintenanceCommand,
    NotifyCommand, PostCommand, StoryCommand, UserCommand,
};
use crate::community::{JoinOutcome, NewCommunity, NewPost};
use crate::config::Config;
use crate::errors::LinkError;
use crate::persistence::SnapshotStore;
use crate::platform::SuperLink;
use crate::seed::seed_sample_data;
use crate::store::Store;
use crate::stories::NewStory;
use crate::suggestions::UserSuggestion;
use crate::types::{shift_hours, ConversationId, PostId, RequestId, StoryId, UserId};
use crate::users::NewUser;

/// Run one parsed command line
pub async fn run(args: Args) -> Result<()> {
    match &args.command {
        Commands::Init { force } => return init_config(args.config.clone(), *force),
        Commands::Config => {
            let config = load_config(args.config.clone())?;
            show_config(&config, &args);
            return Ok(());
        }
        Commands::Ai(cmd) => {
            let config = load_config(args.config.clone())?;
            return ai_command(&config, cmd).await;
        }
        _ => {}
    }

    let config = load_config(args.config.clone())?;
    let snapshots = SnapshotStore::new(config.data_dir())?;
    let mut platform = SuperLink::load(config.clone(), &snapshots)?;
    if let Some(model) = attach_model(&config) {
        platform = platform.with_model(model);
    }

    execute(&platform, args.command).await?;

    let path = platform.save(&snapshots).await?;
    debug!(path = %path.display(), "snapshot written");
    Ok(())
}

/// Load the configuration, writing defaults on first run
fn load_config(path: Option<PathBuf>) -> Result<Config> {
    if path.is_none() {
        if let Some(default_path) = Config::default_path().filter(|p| !p.exists()) {
            let config = Config::default();
            match config.save(&default_path) {
                Ok(()) => info!(path = %default_path.display(), "default configuration written"),
                Err(e) => warn!(error = %e, "could not write default configuration"),
            }
            return Ok(config);
        }
    }
    Ok(Config::load(path)?)
}

fn attach_model(config: &Config) -> Option<Arc<dyn ChatModel>> {
    config.ai_api_key()?;
    match OpenAiCompatClient::from_config(&config.ai) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!(error = %e, "AI client unavailable, continuing without it");
            None
        }
    }
}

async fn ai_command(config: &Config, cmd: &AiCommand) -> Result<()> {
    let client = OpenAiCompatClient::from_config(&config.ai)?;
    match cmd {
        AiCommand::Check => {
            if client.health_check().await? {
                println!("{} {} is reachable", "✓".green(), client.base_url());
            } else {
                println!("{} {} did not answer", "✗".red(), client.base_url());
            }
        }
        AiCommand::Prompt { message, system } => {
            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(ChatMessage::system(system.as_str()));
            }
            messages.push(ChatMessage::user(message.as_str()));

            let mut deltas = client
                .stream(&messages, CompletionOptions::from(&config.ai))
                .await?;
            let mut stdout = std::io::stdout();
            while let Some(delta) = deltas.next().await {
                write!(stdout, "{}", delta?)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path
        .or_else(Config::default_path)
        .context("Cannot determine a config location; pass --config")?;
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save(&path)?;
    println!("{} Wrote {}", "✓".green(), path.display());
    Ok(())
}

fn show_config(config: &Config, args: &Args) {
    println!("{}", "SuperLink Configuration".bold());
    println!();
    println!("AI:");
    println!("  Endpoint:   {}", config.ai.base_url);
    println!("  Model:      {}", config.ai.model);
    let key = if config.ai_api_key().is_some() {
        "set".green()
    } else {
        "missing".yellow()
    };
    println!("  API key:    {} ({})", key, config.ai.api_key_env);
    println!();
    println!("Suggestions:");
    println!("  Page size:  {}", config.suggestions.page_size);
    println!("  Cache:      {}h", config.suggestions.cache_hours);
    println!("  Alchemy:    batches of {}, top {}", config.suggestions.alchemy_batch_size, config.suggestions.alchemy_top_n);
    println!();
    println!("Storage:");
    println!("  Data dir:   {}", config.data_dir().display());
    println!("  Log level:  {}", config.logging.level);
    println!("  Verbosity:  {}", args.verbosity().as_str());
}

fn user_id(store: &Store, username: &str) -> crate::errors::Result<UserId> {
    store
        .find_by_username(username)
        .map(|u| u.id)
        .ok_or_else(|| LinkError::not_found("user", username))
}

fn username(store: &Store, id: UserId) -> String {
    store
        .user(id)
        .map(|u| u.username.clone())
        .unwrap_or_else(|_| format!("#{}", id))
}

async fn resolve(platform: &SuperLink, name: &str) -> Result<UserId> {
    Ok(platform.read(|store| user_id(store, name)).await?)
}

async fn execute(platform: &SuperLink, command: Commands) -> Result<()> {
    match command {
        Commands::Init { .. } | Commands::Config | Commands::Ai(_) => Ok(()),
        Commands::Seed => {
            let report = platform.write(seed_sample_data).await?;
            println!(
                "{} Seeded {} users, {} communities, {} connections",
                "✓".green(),
                report.users,
                report.communities,
                report.connections
            );
            Ok(())
        }
        Commands::User(cmd) => user_command(platform, cmd).await,
        Commands::Connect(cmd) => connect_command(platform, cmd).await,
        Commands::Suggest {
            user,
            page,
            ai,
            purpose,
        } => suggest(platform, &user, page, ai, purpose.as_deref()).await,
        Commands::Alchemy { user, top, purpose } => {
            let id = resolve(platform, &user).await?;
            let top = top.unwrap_or(platform.config().suggestions.alchemy_top_n);
            let matches = platform
                .top_alchemy_suggestions(id, purpose.as_deref(), top)
                .await?;
            print_suggestions(platform, &matches).await;
            Ok(())
        }
        Commands::Chat(cmd) => chat_command(platform, cmd).await,
        Commands::Post(cmd) => post_command(platform, cmd).await,
        Commands::Community(cmd) => community_command(platform, cmd).await,
        Commands::Story(cmd) => story_command(platform, cmd).await,
        Commands::Notify(cmd) => notify_command(platform, cmd).await,
        Commands::Ask { user, message } => {
            let id = resolve(platform, &user).await?;
            let answer = platform.ask_assistant(id, &message).await?;
            println!("{}", answer);
            Ok(())
        }
        Commands::Maintenance(cmd) => maintenance_command(platform, cmd).await,
    }
}

async fn user_command(platform: &SuperLink, cmd: UserCommand) -> Result<()> {
    match cmd {
        UserCommand::Add {
            username,
            email,
            first,
            last,
            location,
        } => {
            let id = platform
                .write(|store| {
                    store.register_user(
                        NewUser::new(username.as_str(), email)
                            .name(first, last)
                            .location(location),
                    )
                })
                .await?;
            println!("{} Registered {} (id {})", "✓".green(), username.bold(), id);
        }
        UserCommand::Show { username } => {
            let summary = platform
                .read(|store| -> crate::errors::Result<String> {
                    let user = store.user(user_id(store, &username)?)?;
                    let interests: Vec<&str> = user.interests.iter().map(String::as_str).collect();
                    Ok(format!(
                        "{} ({})\n  Location:   {}\n  Role:       {}\n  Interests:  {}\n  Followers:  {}\n  Completion: {}%\n  Status:     {}",
                        user.full_name().bold(),
                        user.username,
                        user.location,
                        user.role(),
                        interests.join(", "),
                        user.follower_count,
                        user.profile_completion,
                        user.online_status.as_str(),
                    ))
                })
                .await?;
            println!("{}", summary);
        }
        UserCommand::List => {
            let rows = platform
                .read(|store| {
                    store
                        .users()
                        .map(|u| format!("{:>5}  {:<16} {}", u.id, u.username, u.full_name()))
                        .collect::<Vec<_>>()
                })
                .await;
            if rows.is_empty() {
                println!("No users yet. Try `superlink seed`.");
            }
            for row in rows {
                println!("{}", row);
            }
        }
        UserCommand::Interest {
            username,
            interest,
            remove,
        } => {
            let changed = platform
                .write(|store| {
                    let id = user_id(store, &username)?;
                    if remove {
                        store.remove_interest(id, &interest)
                    } else {
                        store.add_interest(id, &interest)
                    }
                })
                .await?;
            if changed {
                println!("{} Interests updated", "✓".green());
            } else {
                println!("Nothing to change");
            }
        }
        UserCommand::Follow { follower, followee } => {
            platform
                .write(|store| {
                    let a = user_id(store, &follower)?;
                    let b = user_id(store, &followee)?;
                    store.follow(a, b)
                })
                .await?;
            println!("{} {} now follows {}", "✓".green(), follower, followee);
        }
        UserCommand::Block {
            blocker,
            blocked,
            reason,
        } => {
            platform
                .write(|store| {
                    let a = user_id(store, &blocker)?;
                    let b = user_id(store, &blocked)?;
                    store.block(a, b, &reason)
                })
                .await?;
            println!("{} {} blocked {}", "✓".green(), blocker, blocked);
        }
    }
    Ok(())
}

async fn connect_command(platform: &SuperLink, cmd: ConnectCommand) -> Result<()> {
    match cmd {
        ConnectCommand::Request { from, to, message } => {
            let request = platform
                .write(|store| {
                    let a = user_id(store, &from)?;
                    let b = user_id(store, &to)?;
                    store.send_connection_request(a, b, &message)
                })
                .await?;
            println!("{} Request {} sent to {}", "✓".green(), request, to);
        }
        ConnectCommand::Accept { user, request } => {
            let connection = platform
                .write(|store| {
                    let id = user_id(store, &user)?;
                    store.accept_connection_request(id, RequestId(request))
                })
                .await?;
            println!("{} Connected (connection {})", "✓".green(), connection);
        }
        ConnectCommand::Reject { user, request } => {
            platform
                .write(|store| {
                    let id = user_id(store, &user)?;
                    store.reject_connection_request(id, RequestId(request))
                })
                .await?;
            println!("{} Request {} rejected", "✓".green(), request);
        }
        ConnectCommand::Cancel { user, request } => {
            platform
                .write(|store| {
                    let id = user_id(store, &user)?;
                    store.cancel_connection_request(id, RequestId(request))
                })
                .await?;
            println!("{} Request {} cancelled", "✓".green(), request);
        }
        ConnectCommand::List { user } => {
            let lines = platform
                .read(|store| -> crate::errors::Result<Vec<String>> {
                    let id = user_id(store, &user)?;
                    let mut lines = vec!["Connections:".bold().to_string()];
                    for c in store.connections_of(id) {
                        let Some(other) = c.other(id) else { continue };
                        lines.push(format!(
                            "  {:<16} match {:>3}%  strength {:>3}%",
                            username(store, other),
                            c.match_score,
                            c.connection_strength
                        ));
                    }
                    let (incoming, outgoing) = store.pending_requests(id);
                    lines.push("Incoming requests:".bold().to_string());
                    for r in incoming {
                        lines.push(format!(
                            "  [{}] from {} (match {}%)",
                            r.id,
                            username(store, r.sender),
                            r.match_score
                        ));
                    }
                    lines.push("Outgoing requests:".bold().to_string());
                    for r in outgoing {
                        lines.push(format!("  [{}] to {}", r.id, username(store, r.receiver)));
                    }
                    Ok(lines)
                })
                .await?;
            for line in lines {
                println!("{}", line);
            }
        }
        ConnectCommand::Rescore => {
            let report = platform
                .write(|store| Ok(store.update_all_connection_scores()))
                .await?;
            println!(
                "{} Rescored {}/{} connections ({} failed)",
                "✓".green(),
                report.updated,
                report.total,
                report.failed
            );
        }
    }
    Ok(())
}

async fn suggest(
    platform: &SuperLink,
    user: &str,
    page: usize,
    ai: bool,
    purpose: Option<&str>,
) -> Result<()> {
    let id = resolve(platform, user).await?;
    let page_size = platform.config().suggestions.page_size;

    let result = if ai {
        platform
            .generate_suggestions(id, page, page_size, purpose)
            .await?
    } else {
        platform
            .write(|store| store.generate_traditional_suggestions(id, page, page_size, Utc::now()))
            .await?
    };

    println!("Page {} of {} suggestions", page.max(1), result.total);
    print_suggestions(platform, &result.items).await;
    Ok(())
}

async fn print_suggestions(platform: &SuperLink, items: &[UserSuggestion]) {
    if items.is_empty() {
        println!("No suggestions right now.");
        return;
    }
    let lines = platform
        .read(|store| {
            items
                .iter()
                .map(|s| {
                    let mut line = format!(
                        "  {:<16} {:>3}%  {:?}",
                        username(store, s.suggested_user),
                        s.score,
                        s.source
                    );
                    if !s.common_interests.is_empty() {
                        line.push_str(&format!("  [{}]", s.common_interests.join(", ")));
                    }
                    for highlight in &s.match_highlights {
                        line.push_str(&format!("\n      {}", highlight.dimmed()));
                    }
                    line
                })
                .collect::<Vec<_>>()
        })
        .await;
    for line in lines {
        println!("{}", line);
    }
}

async fn chat_command(platform: &SuperLink, cmd: ChatCommand) -> Result<()> {
    match cmd {
        ChatCommand::Dm { user, other } => {
            let conversation = platform
                .write(|store| {
                    let a = user_id(store, &user)?;
                    let b = user_id(store, &other)?;
                    store.create_direct_conversation(a, b)
                })
                .await?;
            println!("Conversation {}", conversation.to_string().bold());
        }
        ChatCommand::Group {
            creator,
            name,
            members,
        } => {
            let conversation = platform
                .write(|store| {
                    let owner = user_id(store, &creator)?;
                    let ids = members
                        .iter()
                        .map(|m| user_id(store, m))
                        .collect::<crate::errors::Result<Vec<_>>>()?;
                    store.create_group_conversation(owner, &name, &ids)
                })
                .await?;
            println!("{} Group {} created", "✓".green(), conversation);
        }
        ChatCommand::Send {
            user,
            conversation,
            message,
        } => {
            let id = platform
                .write(|store| {
                    let sender = user_id(store, &user)?;
                    store.send_message(crate::chat::NewMessage::text(
                        ConversationId(conversation),
                        sender,
                        message,
                    ))
                })
                .await?;
            println!("{} Message {} sent", "✓".green(), id);
        }
        ChatCommand::History {
            user,
            conversation,
            limit,
        } => {
            let lines = platform
                .read(|store| -> crate::errors::Result<Vec<String>> {
                    let viewer = user_id(store, &user)?;
                    let messages = store.messages(ConversationId(conversation), viewer, None, limit)?;
                    Ok(messages
                        .iter()
                        .map(|m| {
                            format!(
                                "{} {}: {}",
                                m.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                                username(store, m.sender).bold(),
                                m.content
                            )
                        })
                        .collect())
                })
                .await?;
            for line in lines {
                println!("{}", line);
            }
        }
        ChatCommand::Read { user, conversation } => {
            let read = platform
                .write(|store| {
                    let id = user_id(store, &user)?;
                    store.mark_conversation_read(id, ConversationId(conversation), Utc::now())
                })
                .await?;
            println!("{} {} messages marked read", "✓".green(), read);
        }
        ChatCommand::Suggest {
            user,
            conversation,
            prompt,
        } => {
            let id = resolve(platform, &user).await?;
            if !platform.has_model() {
                println!("{}", "No AI model configured; set the API key to get suggestions.".yellow());
                return Ok(());
            }
            let suggestions = platform
                .suggest_replies(ConversationId(conversation), id, &[], None, prompt.as_deref())
                .await?;
            if suggestions.is_empty() {
                println!("No suggestions right now.");
            }
            for s in suggestions {
                println!(
                    "  [{}] {} {}",
                    s.suggestion_type.as_str(),
                    s.content,
                    format!("({:.0}%)", s.confidence * 100.0).dimmed()
                );
            }
        }
    }
    Ok(())
}

async fn post_command(platform: &SuperLink, cmd: PostCommand) -> Result<()> {
    match cmd {
        PostCommand::Create {
            user,
            title,
            content,
            community,
            visibility,
            topics,
        } => {
            let post = platform
                .write(|store| {
                    let author = user_id(store, &user)?;
                    let new = match community {
                        Some(slug) => {
                            let community = store.community_by_slug(&slug)?.id;
                            NewPost::in_community(community, title, content)
                        }
                        None => NewPost::personal(title, content, visibility.into()),
                    };
                    store.create_post(author, new.topics(topics))
                })
                .await?;
            println!("{} Post {} published", "✓".green(), post);
        }
        PostCommand::Feed { user, community } => {
            let lines = platform
                .read(|store| -> crate::errors::Result<Vec<String>> {
                    let viewer = user_id(store, &user)?;
                    let community = match community {
                        Some(slug) => Some(store.community_by_slug(&slug)?.id),
                        None => None,
                    };
                    Ok(store
                        .feed(viewer, community)?
                        .iter()
                        .map(|p| {
                            let pin = if p.is_pinned { "📌 " } else { "" };
                            format!(
                                "[{}] {}{} by {}  ★{:.1} ({})  💬{}",
                                p.id,
                                pin,
                                p.title.bold(),
                                username(store, p.author),
                                p.rating,
                                p.total_ratings,
                                p.comment_count
                            )
                        })
                        .collect())
                })
                .await?;
            if lines.is_empty() {
                println!("Nothing in this feed yet.");
            }
            for line in lines {
                println!("{}", line);
            }
        }
        PostCommand::Comment {
            user,
            post,
            content,
        } => {
            let comment = platform
                .write(|store| {
                    let author = user_id(store, &user)?;
                    store.add_comment(author, PostId(post), &content)
                })
                .await?;
            println!("{} Comment {} added", "✓".green(), comment);
        }
        PostCommand::Rate { user, post, rating } => {
            let average = platform
                .write(|store| {
                    let id = user_id(store, &user)?;
                    store.rate_post(id, PostId(post), rating)
                })
                .await?;
            println!("{} Rated; average is now {:.2}", "✓".green(), average);
        }
    }
    Ok(())
}

async fn community_command(platform: &SuperLink, cmd: CommunityCommand) -> Result<()> {
    match cmd {
        CommunityCommand::Create {
            user,
            name,
            description,
            category,
            topics,
            private,
        } => {
            let slug = platform
                .write(|store| {
                    let creator = user_id(store, &user)?;
                    let id = store.create_community(
                        creator,
                        NewCommunity {
                            name,
                            description,
                            category,
                            topics,
                            rules: Vec::new(),
                            is_private: private,
                        },
                    )?;
                    Ok(store.community(id)?.slug.clone())
                })
                .await?;
            println!("{} Community {} created", "✓".green(), slug.bold());
        }
        CommunityCommand::Join {
            user,
            slug,
            message,
        } => {
            let outcome = platform
                .write(|store| {
                    let id = user_id(store, &user)?;
                    let community = store.community_by_slug(&slug)?.id;
                    store.join_community(id, community, &message)
                })
                .await?;
            match outcome {
                JoinOutcome::Joined => println!("{} Joined {}", "✓".green(), slug),
                JoinOutcome::Requested(request) => {
                    println!("Join request {} is waiting for a moderator", request)
                }
            }
        }
        CommunityCommand::List => {
            let lines = platform
                .read(|store| {
                    store
                        .list_communities()
                        .iter()
                        .map(|c| {
                            let lock = if c.is_private { " (private)" } else { "" };
                            format!(
                                "{:<24} {:<10} {:>4} members{}",
                                c.slug,
                                format!("{:?}", c.category),
                                c.members_count,
                                lock
                            )
                        })
                        .collect::<Vec<_>>()
                })
                .await;
            if lines.is_empty() {
                println!("No communities yet.");
            }
            for line in lines {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

async fn story_command(platform: &SuperLink, cmd: StoryCommand) -> Result<()> {
    match cmd {
        StoryCommand::Post {
            user,
            content,
            tags,
            hours,
            private,
        } => {
            let story = platform
                .write(|store| {
                    let author = user_id(store, &user)?;
                    let now = Utc::now();
                    let mut new = NewStory::text(content).tags(tags);
                    new.expires_at = hours.map(|h| shift_hours(now, h)).transpose()?;
                    new.is_public = !private;
                    store.create_story(author, new, now)
                })
                .await?;
            println!("{} Story {} posted", "✓".green(), story);
        }
        StoryCommand::Feed { user } => {
            let lines = platform
                .read(|store| -> crate::errors::Result<Vec<String>> {
                    let viewer = user_id(store, &user)?;
                    Ok(store
                        .story_feed(viewer, Utc::now())
                        .iter()
                        .map(|s| {
                            format!(
                                "{} {}: {}  {}",
                                s.id.to_string().dimmed(),
                                username(store, s.author).bold(),
                                s.content,
                                format!("👁 {}", s.views_count).dimmed()
                            )
                        })
                        .collect())
                })
                .await?;
            if lines.is_empty() {
                println!("No stories right now.");
            }
            for line in lines {
                println!("{}", line);
            }
        }
        StoryCommand::View {
            user,
            story,
            seconds,
            completed,
        } => {
            let story = Uuid::parse_str(&story)
                .map(StoryId)
                .with_context(|| format!("Invalid story id: {}", story))?;
            let views = platform
                .write(|store| {
                    let viewer = user_id(store, &user)?;
                    store.view_story(viewer, story, seconds, completed, Utc::now())
                })
                .await?;
            println!("{} Story has {} views", "✓".green(), views);
        }
        StoryCommand::Expire => expire_stories(platform).await?,
    }
    Ok(())
}

async fn expire_stories(platform: &SuperLink) -> Result<()> {
    let expired = platform
        .write(|store| Ok(store.expire_stories(Utc::now())))
        .await?;
    println!("{} {} stories expired", "✓".green(), expired);
    Ok(())
}

async fn notify_command(platform: &SuperLink, cmd: NotifyCommand) -> Result<()> {
    match cmd {
        NotifyCommand::List {
            user,
            unread,
            limit,
        } => {
            let lines = platform
                .read(|store| -> crate::errors::Result<Vec<String>> {
                    let id = user_id(store, &user)?;
                    Ok(store
                        .notifications_for(id, unread, limit)
                        .iter()
                        .map(|n| {
                            let marker = if n.is_read { " ".normal() } else { "•".blue() };
                            format!(
                                "{} {} {}: {}",
                                marker,
                                n.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                                n.title.bold(),
                                n.message
                            )
                        })
                        .collect())
                })
                .await?;
            if lines.is_empty() {
                println!("No notifications.");
            }
            for line in lines {
                println!("{}", line);
            }
        }
        NotifyCommand::ReadAll { user } => {
            let count = platform
                .write(|store| {
                    let id = user_id(store, &user)?;
                    Ok(store.mark_all_read(id))
                })
                .await?;
            println!("{} {} notifications marked read", "✓".green(), count);
        }
    }
    Ok(())
}

async fn maintenance_command(platform: &SuperLink, cmd: MaintenanceCommand) -> Result<()> {
    match cmd {
        MaintenanceCommand::CleanupOnline { minutes, dry_run } => {
            let minutes = minutes.unwrap_or(platform.config().presence.stale_after_minutes);
            let names = platform
                .write(|store| store.cleanup_online_status(minutes, dry_run, Utc::now()))
                .await?;
            let verb = if dry_run { "would go offline" } else { "set offline" };
            println!("{} users {}", names.len(), verb);
            for name in names {
                println!("  {}", name);
            }
        }
        MaintenanceCommand::RefreshSuggestions => {
            let report = platform
                .write(|store| Ok(store.refresh_all_suggestions()))
                .await?;
            println!(
                "{} Suggestions refreshed for {}/{} users ({} failed)",
                "✓".green(),
                report.updated,
                report.total,
                report.failed
            );
        }
        MaintenanceCommand::ExpireStories => expire_stories(platform).await?,
    }
    Ok(())
}
