//! Connection suggestions
//!
//! Traditional suggestions are scored from profiles and the graph and cached
//! per user. The `ai` flows add model explanations and purpose-driven
//! "interest alchemy" matches on top.

pub mod ai;
pub mod model;
pub mod service;

pub use ai::{generate_suggestions, interest_alchemy, top_alchemy_suggestions};
pub use model::{ScoredCandidate, SuggestionSource, UserSuggestion, STRONG_CONNECTION_THRESHOLD};
