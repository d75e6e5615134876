//! Per-user notifications with channel preferences

pub mod model;
pub mod service;

pub use model::{
    Channel, NewNotification, Notification, NotificationPreferences, NotificationType,
    PREFERENCE_CATEGORIES,
};
