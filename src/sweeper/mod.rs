//! Bulk message deletion
//!
//! Walks a descending range of message IDs and attempts to delete each one,
//! isolating per-item failures and throttling between attempts. The range is
//! optimistic: IDs that never existed or are no longer deletable are expected
//! outcomes, not errors.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use teloxide::{ApiError, RequestError};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Outcome of a single deletion attempt.
///
/// Already-gone and no-permission responses are benign: they are counted and
/// skipped, never aborting the surrounding sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The message was deleted
    Deleted,
    /// The message does not exist (already deleted or never sent)
    NotFound,
    /// The bot is not allowed to delete this message
    Forbidden,
    /// The platform requires a wait before retrying the same ID
    RateLimited(Duration),
    /// Any other failure, kept for the final report
    Other(String),
}

/// A single sweep over a descending range of message IDs.
///
/// `end_message_id` is exclusive: the loop attempts `start_message_id` down to
/// `end_message_id + 1`, so `attempted == start - end`.
#[derive(Debug, Clone)]
pub struct DeletionJob {
    /// Chat the sweep runs in
    pub chat_id: ChatId,
    /// User who requested the sweep
    pub requester_id: UserId,
    /// Highest message ID to attempt (inclusive)
    pub start_message_id: i32,
    /// Lower bound (exclusive, walking downward)
    pub end_message_id: i32,
    /// Throttle between attempts
    pub pause: Duration,
}

impl DeletionJob {
    /// Sweep everything below `confirmation_id` down to the first message.
    ///
    /// The confirmation message itself is excluded so it can be edited into
    /// the final summary afterwards.
    #[must_use]
    pub fn below(
        chat_id: ChatId,
        requester_id: UserId,
        confirmation_id: MessageId,
        pause: Duration,
    ) -> Self {
        Self {
            chat_id,
            requester_id,
            start_message_id: confirmation_id.0 - 1,
            end_message_id: 0,
            pause,
        }
    }
}

/// Summary of a completed (or cancelled) sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionResult {
    /// Number of IDs attempted
    pub attempted: u32,
    /// Number of confirmed deletions
    pub deleted: u32,
    /// Last unexpected error, if any
    pub last_error: Option<String>,
    /// Whether the sweep was cancelled before covering the whole range
    pub cancelled: bool,
}

/// Seam between the sweep loop and the messaging platform.
///
/// Implemented for [`teloxide::Bot`] in production; tests substitute a mock
/// that scripts per-ID outcomes.
#[async_trait]
pub trait DeleteMessages {
    /// Attempt to delete one message, mapping platform errors to outcomes
    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> DeleteOutcome;
}

#[async_trait]
impl DeleteMessages for Bot {
    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> DeleteOutcome {
        match teloxide::prelude::Requester::delete_message(self, chat_id, message_id).await {
            Ok(_) => DeleteOutcome::Deleted,
            Err(RequestError::RetryAfter(wait)) => DeleteOutcome::RateLimited(wait.duration()),
            Err(RequestError::Api(ApiError::MessageToDeleteNotFound)) => DeleteOutcome::NotFound,
            Err(RequestError::Api(ApiError::MessageCantBeDeleted)) => DeleteOutcome::Forbidden,
            Err(e) => DeleteOutcome::Other(e.to_string()),
        }
    }
}

/// Run one sweep to completion.
///
/// Attempts are strictly sequential and strictly descending; the platform's
/// rate limits apply per chat, so nothing is reordered or parallelized.
/// After every counted attempt the loop sleeps `job.pause`. A rate-limited
/// response sleeps exactly the mandated duration and retries the same ID
/// without counting a second attempt. The cancellation token is observed at
/// the loop boundary, before each new ID.
pub async fn run_sweep(
    api: &impl DeleteMessages,
    job: &DeletionJob,
    cancel: &CancellationToken,
) -> DeletionResult {
    let mut result = DeletionResult::default();
    let mut message_id = job.start_message_id;

    while message_id > job.end_message_id {
        if cancel.is_cancelled() {
            info!(
                chat_id = job.chat_id.0,
                "sweep cancelled at message {}", message_id
            );
            result.cancelled = true;
            break;
        }

        match api.delete_message(job.chat_id, MessageId(message_id)).await {
            DeleteOutcome::Deleted => {
                result.deleted += 1;
            }
            DeleteOutcome::NotFound => {
                error!("Ошибка при удалении сообщения {message_id}: message not found");
            }
            DeleteOutcome::Forbidden => {
                error!("Ошибка при удалении сообщения {message_id}: forbidden");
            }
            DeleteOutcome::RateLimited(wait) => {
                info!(
                    "rate limited while deleting {}, waiting {:?}",
                    message_id, wait
                );
                tokio::time::sleep(wait).await;
                // Retry the same ID; this attempt was not counted.
                continue;
            }
            DeleteOutcome::Other(e) => {
                error!("Ошибка при удалении сообщения {message_id}: {e}");
                result.last_error = Some(e);
            }
        }

        result.attempted += 1;
        tokio::time::sleep(job.pause).await;
        message_id -= 1;
    }

    info!(
        chat_id = job.chat_id.0,
        attempted = result.attempted,
        deleted = result.deleted,
        cancelled = result.cancelled,
        "sweep finished"
    );
    result
}

/// Per-chat sweep coordination.
///
/// Guarantees at most one running sweep per chat and owns the cancellation
/// token of each active sweep.
#[derive(Default)]
pub struct SweepRegistry {
    active: RwLock<HashMap<ChatId, CancellationToken>>,
}

impl SweepRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the chat for a new sweep.
    ///
    /// Returns the cancellation token for the sweep, or `None` if a sweep is
    /// already running in this chat.
    pub async fn begin(&self, chat_id: ChatId) -> Option<CancellationToken> {
        let mut active = self.active.write().await;
        if active.contains_key(&chat_id) {
            return None;
        }
        let token = CancellationToken::new();
        active.insert(chat_id, token.clone());
        Some(token)
    }

    /// Request cancellation of the running sweep, if any.
    ///
    /// Returns `true` if a sweep was active in this chat.
    pub async fn cancel(&self, chat_id: ChatId) -> bool {
        let active = self.active.read().await;
        if let Some(token) = active.get(&chat_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Release the chat slot after the sweep ends
    pub async fn finish(&self, chat_id: ChatId) {
        let mut active = self.active.write().await;
        active.remove(&chat_id);
    }

    /// Whether a sweep is currently running in this chat
    pub async fn is_active(&self, chat_id: ChatId) -> bool {
        let active = self.active.read().await;
        active.contains_key(&chat_id)
    }
}
