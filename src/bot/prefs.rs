//! Per-user sweep source preferences
//!
//! Records which kind of chat each user wants /deleteall to act on. The map
//! replaces the module-level globals of older bot variants: all mutation is
//! funneled through these methods, keeping a single-writer discipline.

use std::collections::HashMap;
use teloxide::types::{Chat, UserId};
use tokio::sync::RwLock;

/// Where the user allows bulk deletion to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceChoice {
    /// Private chat with the bot
    Private,
    /// Group or supergroup
    Group,
}

impl SourceChoice {
    /// Whether the chat matches this choice
    #[must_use]
    pub fn allows(self, chat: &Chat) -> bool {
        match self {
            Self::Private => chat.is_private(),
            Self::Group => chat.is_group() || chat.is_supergroup(),
        }
    }

    /// Human-readable label, matching the source-selection keyboard
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Private => "личный чат",
            Self::Group => "группа",
        }
    }
}

/// In-memory map from user to sweep source choice
#[derive(Default)]
pub struct UserPreferences {
    choices: RwLock<HashMap<UserId, SourceChoice>>,
}

impl UserPreferences {
    /// Create an empty preference map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the user's choice, replacing any previous one
    pub async fn set_source(&self, user: UserId, choice: SourceChoice) {
        self.choices.write().await.insert(user, choice);
    }

    /// The user's recorded choice, if any
    pub async fn source(&self, user: UserId) -> Option<SourceChoice> {
        self.choices.read().await.get(&user).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn choice_is_recorded_and_replaced() {
        let prefs = UserPreferences::new();
        let user = UserId(42);

        assert_eq!(prefs.source(user).await, None);

        prefs.set_source(user, SourceChoice::Private).await;
        assert_eq!(prefs.source(user).await, Some(SourceChoice::Private));

        prefs.set_source(user, SourceChoice::Group).await;
        assert_eq!(prefs.source(user).await, Some(SourceChoice::Group));
    }

    #[tokio::test]
    async fn users_are_independent() {
        let prefs = UserPreferences::new();
        prefs.set_source(UserId(1), SourceChoice::Private).await;
        assert_eq!(prefs.source(UserId(2)).await, None);
    }
}
