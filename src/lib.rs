//! SuperLink - social networking engine
//!
//! A social graph with profiles, connection requests and traditional match
//! scoring, AI-assisted suggestions ("interest alchemy"), chat with reply
//! suggestions, communities, ephemeral stories, notifications and a
//! realtime fan-out hub.
//!
//! # Architecture
//!
//! - **Store**: one in-memory [`Store`]; every domain service is an `impl Store` block
//! - **AI**: async flows over a [`ChatModel`](ai::ChatModel), never holding the lock while waiting
//! - **Runtime**: [`SuperLink`] wraps the store, the realtime hub and the model

pub mod errors;
pub mod types;
pub mod config;
pub mod store;
pub mod realtime;

// Domain services
pub mod users;
pub mod scoring;
pub mod connections;
pub mod suggestions;
pub mod chat;
pub mod reply_suggestions;
pub mod community;
pub mod stories;
pub mod notifications;

// AI layer
pub mod ai;
pub mod assistant;

// Runtime and tooling
pub mod persistence;
pub mod platform;
pub mod seed;
pub mod logging;
pub mod cli;

// Re-export commonly used types
pub use config::Config;
pub use errors::{LinkError, Result};
pub use platform::SuperLink;
pub use store::Store;
