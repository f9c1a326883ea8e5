//! Per-owner external messaging channel settings.

use crate::error::Result;
use crate::encode_timestamp;
use autosniper_core::UserId;
use chrono::Utc;
use sqlx::SqlitePool;

/// An owner's messaging-bot channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    /// Owner
    pub user_id: UserId,
    /// Bot chat address, if supplied
    pub telegram_chat_id: Option<String>,
    /// Whether the owner wants external messages
    pub enabled: bool,
}

impl NotificationChannel {
    /// Chat address to deliver to, present only when the owner enabled the
    /// channel and supplied a non-empty address.
    #[must_use]
    pub fn deliverable_chat_id(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.telegram_chat_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Insert or replace an owner's channel settings.
pub async fn upsert_channel(
    pool: &SqlitePool,
    user_id: &UserId,
    telegram_chat_id: Option<&str>,
    enabled: bool,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO notification_channels (user_id, telegram_chat_id, enabled, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            telegram_chat_id = excluded.telegram_chat_id,
            enabled = excluded.enabled,
            updated_at = excluded.updated_at
        ",
    )
    .bind(user_id.as_str())
    .bind(telegram_chat_id)
    .bind(enabled)
    .bind(encode_timestamp(Utc::now()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Get an owner's channel settings.
pub async fn get_channel(
    pool: &SqlitePool,
    user_id: &UserId,
) -> Result<Option<NotificationChannel>> {
    let row: Option<(Option<String>, bool)> = sqlx::query_as(
        r"
        SELECT telegram_chat_id, enabled
        FROM notification_channels
        WHERE user_id = ?
        ",
    )
    .bind(user_id.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(telegram_chat_id, enabled)| NotificationChannel {
        user_id: user_id.clone(),
        telegram_chat_id,
        enabled,
    }))
}
