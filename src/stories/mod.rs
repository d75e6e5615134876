//! Ephemeral stories with polls, threads, remixes and view analytics

pub mod model;
pub mod service;

pub use model::{
    Location, NewStory, Poll, ReportReason, Story, StoryAnalytics, StoryReport, StoryShare,
    StoryTheme, StoryType, StoryView,
};
