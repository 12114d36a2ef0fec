//! Resilient messaging utilities for Telegram API operations.
//!
//! Wrappers that retry transient network failures with exponential backoff
//! and honor the platform's explicit rate-limit signal by sleeping exactly
//! the mandated duration.

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Message, MessageId, ParseMode};
use teloxide::RequestError;
use tracing::info;

/// Send a message with automatic retry on transient failures.
///
/// A `RetryAfter` response sleeps the required duration before the same send
/// is attempted again; other errors go through the exponential backoff of
/// [`crate::utils::retry_telegram_operation`].
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Message> {
    let text = text.into();
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        match req.await {
            Ok(msg) => Ok(msg),
            Err(RequestError::RetryAfter(wait)) => {
                info!("send rate limited, waiting {:?}", wait.duration());
                tokio::time::sleep(wait.duration()).await;
                Err(anyhow::anyhow!("rate limited"))
            }
            Err(e) => Err(anyhow::anyhow!("Telegram send error: {e}")),
        }
    })
    .await
}

/// Edit a message with automatic retry on transient failures
pub async fn edit_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Message> {
    let text = text.into();
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot.edit_message_text(chat_id, msg_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        match req.await {
            Ok(msg) => Ok(msg),
            Err(RequestError::RetryAfter(wait)) => {
                info!("edit rate limited, waiting {:?}", wait.duration());
                tokio::time::sleep(wait.duration()).await;
                Err(anyhow::anyhow!("rate limited"))
            }
            Err(e) => Err(anyhow::anyhow!("Telegram edit error: {e}")),
        }
    })
    .await
}
