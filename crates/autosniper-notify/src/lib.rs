//! Notification fan-out for AutoSniper.
//!
//! Two independent destinations per matched listing: the owner's live
//! real-time sessions ([`ConnectionRegistry`]) and, when configured, the
//! owner's messaging-bot chat ([`TelegramClient`]). [`Notifier`] exposes one
//! call per destination.

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod realtime;
pub mod telegram;
pub mod templates;

pub use dispatcher::Notifier;
pub use error::{NotifyError, Result};
pub use event::{ListingSummary, NotificationEvent};
pub use realtime::{ConnectionRegistry, SessionHandle};
pub use telegram::{ExternalMessenger, TelegramClient};
