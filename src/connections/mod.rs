//! Connections between users and the requests that create them

pub mod model;
pub mod service;

pub use model::{Connection, ConnectionRequest, RequestStatus, ScoreUpdateReport};
