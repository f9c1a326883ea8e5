//! Fan-out of matched listings to an owner's destinations.
//!
//! Real-time delivery and external messaging are separate calls with their
//! own failure handling. Neither retries and neither returns an error to the
//! scan that triggered it.

use crate::error::{NotifyError, Result};
use crate::event::{ListingSummary, NotificationEvent};
use crate::realtime::ConnectionRegistry;
use crate::telegram::{ExternalMessenger, TelegramClient};
use crate::templates;
use autosniper_core::{NotificationConfig, UserId};
use autosniper_db::{channels, Database};
use std::sync::Arc;
use std::time::Duration;

/// Delivers notifications for matched listings and price drops.
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<ConnectionRegistry>,
    messenger: Option<Arc<dyn ExternalMessenger>>,
    db: Database,
}

impl Notifier {
    /// Create a notifier. `messenger` is `None` when no bot credentials exist.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        messenger: Option<Arc<dyn ExternalMessenger>>,
        db: Database,
    ) -> Self {
        Self {
            registry,
            messenger,
            db,
        }
    }

    /// Create a notifier from the `[notifications]` section, enabling the
    /// bot channel only if a token is configured.
    pub fn from_config(
        registry: Arc<ConnectionRegistry>,
        config: &NotificationConfig,
        db: Database,
    ) -> Self {
        let messenger = match config.telegram_bot_token.as_deref() {
            Some(token) => match TelegramClient::new(
                config.telegram_api_base.clone(),
                token,
                Duration::from_secs(config.timeout_secs),
            ) {
                Ok(client) => {
                    tracing::info!("Telegram notifications enabled");
                    Some(Arc::new(client) as Arc<dyn ExternalMessenger>)
                }
                Err(e) => {
                    tracing::warn!("Telegram client unavailable: {}", e);
                    None
                }
            },
            None => {
                tracing::warn!(
                    "TELEGRAM_BOT_TOKEN not configured, Telegram notifications disabled"
                );
                None
            }
        };
        Self::new(registry, messenger, db)
    }

    /// The shared real-time registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Whether bot credentials are configured.
    #[must_use]
    pub fn has_external_channel(&self) -> bool {
        self.messenger.is_some()
    }

    /// Push `event` to every live session of `user_id`; returns sessions reached.
    pub async fn notify_realtime(&self, user_id: &UserId, event: &NotificationEvent) -> usize {
        let delivered = self.registry.send_to_user(user_id, event).await;
        tracing::debug!(user_id = %user_id, delivered, "real-time event dispatched");
        delivered
    }

    /// Send the batch summary for `filter_name` to the owner's bot chat.
    /// Returns whether a message was delivered.
    pub async fn notify_new_listings(
        &self,
        user_id: &UserId,
        filter_name: &str,
        listings: &[ListingSummary],
    ) -> bool {
        if listings.is_empty() {
            return false;
        }
        let text = templates::new_listings_batch(filter_name, listings.len(), listings);
        self.deliver_external(user_id, &text).await
    }

    /// Send a price-drop alert to the owner's bot chat.
    /// Returns whether a message was delivered.
    pub async fn notify_price_drop(
        &self,
        user_id: &UserId,
        title: &str,
        old_price: f64,
        new_price: f64,
        url: &str,
    ) -> bool {
        let text = templates::price_drop(title, old_price, new_price, url);
        self.deliver_external(user_id, &text).await
    }

    /// Send the channel confirmation message, surfacing the failure reason.
    pub async fn send_channel_test(&self, user_id: &UserId) -> Result<()> {
        let messenger = self.messenger.as_ref().ok_or(NotifyError::NotConfigured)?;
        let channel = channels::get_channel(self.db.pool(), user_id).await?;
        let chat_id = channel
            .as_ref()
            .and_then(|c| c.deliverable_chat_id())
            .ok_or(NotifyError::NotConfigured)?;
        messenger.send(chat_id, &templates::channel_test()).await
    }

    async fn deliver_external(&self, user_id: &UserId, text: &str) -> bool {
        let Some(messenger) = self.messenger.as_ref() else {
            return false;
        };

        let channel = match channels::get_channel(self.db.pool(), user_id).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(user_id = %user_id, "channel lookup failed: {}", e);
                return false;
            }
        };
        let Some(chat_id) = channel.as_ref().and_then(|c| c.deliverable_chat_id()) else {
            return false;
        };

        match messenger.send(chat_id, text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(user_id = %user_id, "telegram delivery failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ExternalMessenger for RecordingMessenger {
        async fn send(&self, chat_id: &str, text: &str) -> Result<()> {
            if self.fail {
                return Err(NotifyError::Rejected("chat not found".to_string()));
            }
            self.sent
                .lock()
                .await
                .push((chat_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    async fn setup(messenger: Option<Arc<RecordingMessenger>>) -> (Notifier, Database) {
        let db = Database::new(":memory:").await.expect("create database");
        db.run_migrations().await.expect("run migrations");
        let notifier = Notifier::new(
            Arc::new(ConnectionRegistry::new()),
            messenger.map(|m| m as Arc<dyn ExternalMessenger>),
            db.clone(),
        );
        (notifier, db)
    }

    fn summary() -> ListingSummary {
        ListingSummary {
            id: 1,
            title: "Audi A4".to_string(),
            price: 850_000.0,
            source_url: "https://www.arabam.com/ilan/1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_external_requires_enabled_channel() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (notifier, db) = setup(Some(Arc::clone(&messenger))).await;
        let user = UserId::new("7").expect("valid user id");

        // No channel row
        assert!(!notifier.notify_new_listings(&user, "Audi", &[summary()]).await);

        // Disabled channel
        channels::upsert_channel(db.pool(), &user, Some("555"), false)
            .await
            .expect("upsert");
        assert!(!notifier.notify_new_listings(&user, "Audi", &[summary()]).await);

        channels::upsert_channel(db.pool(), &user, Some("555"), true)
            .await
            .expect("upsert");
        assert!(notifier.notify_new_listings(&user, "Audi", &[summary()]).await);

        let sent = messenger.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "555");
        assert!(sent[0].1.contains("*Audi*"));
    }

    #[tokio::test]
    async fn test_external_without_credentials_is_skipped() {
        let (notifier, db) = setup(None).await;
        let user = UserId::new("7").expect("valid user id");
        channels::upsert_channel(db.pool(), &user, Some("555"), true)
            .await
            .expect("upsert");

        assert!(!notifier.has_external_channel());
        assert!(
            !notifier
                .notify_price_drop(&user, "Audi A4", 900_000.0, 850_000.0, "https://x/ilan/1")
                .await
        );
        assert!(matches!(
            notifier.send_channel_test(&user).await,
            Err(NotifyError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_external_failure_is_contained() {
        let messenger = Arc::new(RecordingMessenger {
            fail: true,
            ..RecordingMessenger::default()
        });
        let (notifier, db) = setup(Some(messenger)).await;
        let user = UserId::new("7").expect("valid user id");
        channels::upsert_channel(db.pool(), &user, Some("555"), true)
            .await
            .expect("upsert");

        assert!(!notifier.notify_new_listings(&user, "Audi", &[summary()]).await);
    }

    #[tokio::test]
    async fn test_unreachable_bot_api_is_contained() {
        let db = Database::new(":memory:").await.expect("create database");
        db.run_migrations().await.expect("run migrations");
        let client = TelegramClient::new("http://127.0.0.1:1", "123:abc", Duration::from_secs(2))
            .expect("build client");
        let notifier = Notifier::new(
            Arc::new(ConnectionRegistry::new()),
            Some(Arc::new(client) as Arc<dyn ExternalMessenger>),
            db.clone(),
        );
        let user = UserId::new("7").expect("valid user id");
        channels::upsert_channel(db.pool(), &user, Some("555"), true)
            .await
            .expect("upsert");

        assert!(
            !notifier
                .notify_price_drop(&user, "Audi A4", 900_000.0, 850_000.0, "https://x/ilan/1")
                .await
        );
        assert!(matches!(
            notifier.send_channel_test(&user).await,
            Err(NotifyError::Http(_))
        ));
    }

    #[tokio::test]
    async fn test_realtime_is_independent_of_external() {
        let (notifier, _db) = setup(None).await;
        let user = UserId::new("7").expect("valid user id");
        let (_handle, mut rx) = notifier.registry().connect(&user).await;

        let event = NotificationEvent::NewListing {
            message: "m".to_string(),
            listing: summary(),
            filter_id: autosniper_core::FilterId::new("f").expect("valid filter id"),
            filter_name: "Audi".to_string(),
        };
        assert_eq!(notifier.notify_realtime(&user, &event).await, 1);
        assert_eq!(rx.try_recv().expect("event received"), event);
    }
}
