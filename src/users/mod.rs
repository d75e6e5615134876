//! User accounts, profiles and the follow/block graph

pub mod model;
pub mod service;

pub use model::{
    AccountType, Block, Education, Endorsement, Follow, NewUser, OnlineStatus, ProfileUpdate,
    ProfileVisibility, Skill, User, WorkExperience, DEFAULT_ROLE,
};
