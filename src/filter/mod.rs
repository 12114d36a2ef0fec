//! Duplicate and stop-word message filtering
//!
//! Decides whether a message seen in a source chat should be forwarded.
//! Matching is whitespace-insensitive: candidates, stop words, key words and
//! stored entries are all normalized the same way before comparison.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{DUPLICATE_SIMILARITY_THRESHOLD, SEEN_RETENTION};

/// Lower-case a text and strip all whitespace.
///
/// Applied to every compared string, so "ПРО ДАМ" and "продам" collapse to
/// the same token.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Immutable set of normalized tokens built once from configuration
#[derive(Debug, Clone, Default)]
pub struct WordSet {
    words: Vec<String>,
}

impl WordSet {
    /// Build the set, normalizing every token and dropping empty ones
    #[must_use]
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| normalize(w.as_ref()))
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Whether any token is a substring of the normalized candidate
    #[must_use]
    pub fn matches(&self, normalized: &str) -> bool {
        self.words.iter().any(|w| normalized.contains(w))
    }

    /// Whether the set has no tokens
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Time-bounded store of recently seen message texts.
///
/// Keys are normalized texts mapped to their first-seen instant. The store
/// has a single logical owner; mutation happens only through the methods
/// below, behind the [`FilterEngine`] mutex.
pub struct SeenMessageStore {
    entries: HashMap<String, Instant>,
    retention: Duration,
}

impl SeenMessageStore {
    /// Store with the standard 24h retention window
    #[must_use]
    pub fn new() -> Self {
        Self::with_retention(SEEN_RETENTION)
    }

    /// Store with a custom retention window
    #[must_use]
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            retention,
        }
    }

    /// Point-in-time sweep: drop entries older than the retention window
    pub fn sweep(&mut self, now: Instant) {
        let retention = self.retention;
        self.entries
            .retain(|_, seen| now.duration_since(*seen) <= retention);
    }

    /// Whether the candidate scores at or above the duplicate threshold
    /// against any stored entry
    #[must_use]
    pub fn is_duplicate(&self, normalized: &str) -> bool {
        self.entries.keys().any(|stored| {
            strsim::normalized_levenshtein(stored, normalized) >= DUPLICATE_SIMILARITY_THRESHOLD
        })
    }

    /// Record the candidate as seen at `now`
    pub fn insert(&mut self, normalized: String, now: Instant) {
        self.entries.insert(normalized, now);
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SeenMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Full forwarding decision: keyword gate, stop words, near-duplicates
pub struct FilterEngine {
    stop_words: WordSet,
    key_words: WordSet,
    store: Mutex<SeenMessageStore>,
}

impl FilterEngine {
    /// Build the engine from configured word lists
    #[must_use]
    pub fn new(stop_words: WordSet, key_words: WordSet) -> Self {
        Self::with_store(stop_words, key_words, SeenMessageStore::new())
    }

    /// Build the engine around an explicit store (shorter retention in tests)
    #[must_use]
    pub fn with_store(stop_words: WordSet, key_words: WordSet, store: SeenMessageStore) -> Self {
        Self {
            stop_words,
            key_words,
            store: Mutex::new(store),
        }
    }

    /// Decide whether to forward `text`; stores it when the answer is yes.
    ///
    /// A message passes when it contains a key word (if any are configured),
    /// contains no stop word, and is not a near-duplicate of anything seen
    /// within the retention window. Expired entries are purged before the
    /// duplicate check.
    pub async fn should_forward(&self, text: &str) -> bool {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return false;
        }

        if !self.key_words.is_empty() && !self.key_words.matches(&normalized) {
            debug!("filter: no key word match");
            return false;
        }

        if self.stop_words.matches(&normalized) {
            debug!("filter: stop word match");
            return false;
        }

        let now = Instant::now();
        let mut store = self.store.lock().await;
        store.sweep(now);
        if store.is_duplicate(&normalized) {
            debug!("filter: near-duplicate");
            return false;
        }

        store.insert(normalized, now);
        true
    }
}
