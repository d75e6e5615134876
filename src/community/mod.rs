//! Communities with posts, threaded discussion and scheduled events
//!
//! Community-scoped activity is pushed to the `community_{slug}` group.

pub mod model;
pub mod service;

pub use model::{
    slugify, Comment, Community, CommunityCategory, CommunityEvent, CommunityMember,
    CommunityRole, CommunityUpdate, EventStatus, EventType, JoinOutcome, JoinRequest,
    JoinRequestStatus, NewCommunity, NewEvent, NewPost, Post, PostVisibility, Reply, SavedPost,
    Topic, DEFAULT_TOPIC_COLOR,
};
