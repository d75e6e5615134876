//! Realtime delivery
//!
//! Named broadcast groups that chat, notification and community listeners
//! subscribe to. Domain services never talk to the hub directly: they queue
//! [`Dispatch`] records on the store and the platform publishes them once the
//! write has completed.

pub mod events;
pub mod hub;

pub use events::{group, Dispatch, Envelope, HubEvent};
pub use hub::Hub;
