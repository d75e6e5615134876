//! Command-line argument parsing for SuperLink
//!
//! Provides clap-based CLI with subcommands and verbosity control. Users are
//! addressed by username; other entities by their numeric id.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::community::{CommunityCategory, PostVisibility};
use crate::config::{MAX_WINDOW_HOURS, MAX_WINDOW_MINUTES};

/// SuperLink - social networking engine with AI-assisted matchmaking
#[derive(Parser, Debug)]
#[command(name = "superlink")]
#[command(version)]
#[command(about = "Manage a SuperLink social graph from the terminal", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display current configuration
    Config,

    /// Load sample users, communities and connections
    Seed,

    /// Accounts and profiles
    #[command(subcommand)]
    User(UserCommand),

    /// Connection requests and connections
    #[command(subcommand)]
    Connect(ConnectCommand),

    /// Show connection suggestions for a user
    Suggest {
        user: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Add AI explanations and an interest alchemy match
        #[arg(long)]
        ai: bool,
        /// What the user is looking for
        #[arg(long)]
        purpose: Option<String>,
    },

    /// Rank candidates with interest alchemy
    Alchemy {
        user: String,
        /// How many matches to keep
        #[arg(long)]
        top: Option<usize>,
        #[arg(long)]
        purpose: Option<String>,
    },

    /// Conversations and messages
    #[command(subcommand)]
    Chat(ChatCommand),

    /// Posts and discussion
    #[command(subcommand)]
    Post(PostCommand),

    /// Communities
    #[command(subcommand)]
    Community(CommunityCommand),

    /// Stories
    #[command(subcommand)]
    Story(StoryCommand),

    /// Notifications
    #[command(subcommand)]
    Notify(NotifyCommand),

    /// Ask the personal assistant
    Ask { user: String, message: String },

    /// Talk to the configured model directly
    #[command(subcommand)]
    Ai(AiCommand),

    /// Periodic upkeep jobs
    #[command(subcommand)]
    Maintenance(MaintenanceCommand),
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Register a user
    Add {
        username: String,
        email: String,
        #[arg(long, default_value = "")]
        first: String,
        #[arg(long, default_value = "")]
        last: String,
        #[arg(long, default_value = "")]
        location: String,
    },
    Show {
        username: String,
    },
    List,
    /// Add (or with --remove, drop) an interest
    Interest {
        username: String,
        interest: String,
        #[arg(long)]
        remove: bool,
    },
    Follow {
        follower: String,
        followee: String,
    },
    Block {
        blocker: String,
        blocked: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConnectCommand {
    Request {
        from: String,
        to: String,
        #[arg(long, default_value = "")]
        message: String,
    },
    Accept {
        user: String,
        request: u64,
    },
    Reject {
        user: String,
        request: u64,
    },
    Cancel {
        user: String,
        request: u64,
    },
    /// Connections and pending requests of a user
    List {
        user: String,
    },
    /// Recompute match scores of every connection
    Rescore,
}

#[derive(Subcommand, Debug)]
pub enum ChatCommand {
    /// Open (or reuse) a direct conversation
    Dm {
        user: String,
        other: String,
    },
    Group {
        creator: String,
        name: String,
        members: Vec<String>,
    },
    Send {
        user: String,
        conversation: u64,
        message: String,
    },
    History {
        user: String,
        conversation: u64,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Read {
        user: String,
        conversation: u64,
    },
    /// Suggest messages the user could send next
    Suggest {
        user: String,
        conversation: u64,
        #[arg(long)]
        prompt: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VisibilityArg {
    Private,
    Connections,
    Public,
}

impl From<VisibilityArg> for PostVisibility {
    fn from(arg: VisibilityArg) -> Self {
        match arg {
            VisibilityArg::Private => PostVisibility::PersonalPrivate,
            VisibilityArg::Connections => PostVisibility::PersonalConnections,
            VisibilityArg::Public => PostVisibility::PersonalPublic,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum PostCommand {
    Create {
        user: String,
        title: String,
        content: String,
        /// Community slug; makes this a community post
        #[arg(long)]
        community: Option<String>,
        /// Audience of a personal post
        #[arg(long, value_enum, default_value_t = VisibilityArg::Public)]
        visibility: VisibilityArg,
        #[arg(long, value_delimiter = ',')]
        topics: Vec<String>,
    },
    Feed {
        user: String,
        #[arg(long)]
        community: Option<String>,
    },
    Comment {
        user: String,
        post: u64,
        content: String,
    },
    Rate {
        user: String,
        post: u64,
        rating: u8,
    },
}

#[derive(Subcommand, Debug)]
pub enum CommunityCommand {
    Create {
        user: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "other", value_parser = parse_category)]
        category: CommunityCategory,
        #[arg(long, value_delimiter = ',')]
        topics: Vec<String>,
        #[arg(long)]
        private: bool,
    },
    Join {
        user: String,
        slug: String,
        #[arg(long, default_value = "")]
        message: String,
    },
    List,
}

fn parse_category(s: &str) -> Result<CommunityCategory, String> {
    s.parse()
}

#[derive(Subcommand, Debug)]
pub enum StoryCommand {
    Post {
        user: String,
        content: String,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Hours until the story expires
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_HOURS))]
        hours: Option<i64>,
        /// Visible to connections only
        #[arg(long)]
        private: bool,
    },
    Feed {
        user: String,
    },
    View {
        user: String,
        story: String,
        #[arg(long, default_value_t = 0)]
        seconds: u32,
        #[arg(long)]
        completed: bool,
    },
    /// Deactivate expired stories
    Expire,
}

#[derive(Subcommand, Debug)]
pub enum NotifyCommand {
    List {
        user: String,
        #[arg(long)]
        unread: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    ReadAll {
        user: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum AiCommand {
    /// Check that the provider answers
    Check,
    /// Stream a one-off completion to stdout
    Prompt {
        message: String,
        #[arg(long)]
        system: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum MaintenanceCommand {
    /// Mark stale online users offline
    CleanupOnline {
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_MINUTES))]
        minutes: Option<i64>,
        #[arg(long)]
        dry_run: bool,
    },
    RefreshSuggestions,
    ExpireStories,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(parse(&["superlink", "-q", "seed"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["superlink", "seed"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["superlink", "-v", "seed"]).verbosity(), Verbosity::Verbose);
        assert_eq!(
            parse(&["superlink", "seed", "-vv"]).verbosity(),
            Verbosity::VeryVerbose
        );
    }

    #[test]
    fn test_ai_prompt_args() {
        let args = parse(&["superlink", "ai", "prompt", "hello there", "--system", "be brief"]);
        assert!(matches!(
            args.command,
            Commands::Ai(AiCommand::Prompt { ref message, system: Some(ref system) })
                if message == "hello there" && system == "be brief"
        ));
        assert!(matches!(parse(&["superlink", "ai", "check"]).command, Commands::Ai(AiCommand::Check)));
    }

    #[test]
    fn test_time_windows_are_bounded() {
        assert!(Args::try_parse_from(["superlink", "maintenance", "cleanup-online", "--minutes", "0"]).is_err());
        assert!(Args::try_parse_from([
            "superlink",
            "maintenance",
            "cleanup-online",
            "--minutes",
            "4611686018427387903",
        ])
        .is_err());
        assert!(Args::try_parse_from(["superlink", "story", "post", "ada", "hi", "--hours", "999999"]).is_err());

        let args = parse(&["superlink", "maintenance", "cleanup-online", "--minutes", "15"]);
        assert!(matches!(
            args.command,
            Commands::Maintenance(MaintenanceCommand::CleanupOnline { minutes: Some(15), .. })
        ));
    }

    #[test]
    fn test_nested_subcommands() {
        let args = parse(&["superlink", "connect", "accept", "bob", "7"]);
        assert!(matches!(
            args.command,
            Commands::Connect(ConnectCommand::Accept { ref user, request: 7 }) if user == "bob"
        ));

        let args = parse(&[
            "superlink",
            "post",
            "create",
            "ada",
            "Hello",
            "World",
            "--visibility",
            "connections",
            "--topics",
            "rust,async",
        ]);
        let Commands::Post(PostCommand::Create {
            visibility, topics, ..
        }) = args.command
        else {
            panic!("expected post create");
        };
        assert_eq!(PostVisibility::from(visibility), PostVisibility::PersonalConnections);
        assert_eq!(topics, vec!["rust", "async"]);
    }

    #[test]
    fn test_community_category_parsing() {
        let args = parse(&["superlink", "community", "create", "ada", "Rust", "--category", "tech"]);
        assert!(matches!(
            args.command,
            Commands::Community(CommunityCommand::Create {
                category: CommunityCategory::Tech,
                ..
            })
        ));
        assert!(Args::try_parse_from([
            "superlink", "community", "create", "ada", "Rust", "--category", "cooking"
        ])
        .is_err());
    }

    #[test]
    fn test_maintenance_flags() {
        let args = parse(&["superlink", "maintenance", "cleanup-online", "--minutes", "5", "--dry-run"]);
        assert!(matches!(
            args.command,
            Commands::Maintenance(MaintenanceCommand::CleanupOnline {
                minutes: Some(5),
                dry_run: true
            })
        ));
    }
}
