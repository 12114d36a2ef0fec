//! Sliding-window log rendering ("marquee")
//!
//! Tails a growing log file into a single chat message, re-rendering a window
//! of consecutive lines on a fixed cadence. The loop is cooperative: stop and
//! reconfiguration requests are observed at cycle boundaries, never mid-sleep.

use async_trait::async_trait;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};
use teloxide::RequestError;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::TELEGRAM_MESSAGE_LIMIT;
use crate::utils::truncate_str;

/// Failure modes of a single render call
#[derive(Debug, Error)]
pub enum RenderError {
    /// The platform requires a wait before retrying the same render
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),
    /// Any other render failure; the loop logs it and continues
    #[error("render failed: {0}")]
    Failed(String),
}

/// Seam between the marquee loop and the chat message it updates.
///
/// Production implementation edits one Telegram message in place.
#[async_trait]
pub trait RenderTarget: Send + Sync {
    /// Replace the target message content
    async fn render(&self, text: &str) -> Result<(), RenderError>;
}

/// Edits a single Telegram message in place
pub struct TelegramRenderTarget {
    bot: Bot,
    chat_id: ChatId,
    message_id: MessageId,
}

impl TelegramRenderTarget {
    /// Target the given message for in-place edits
    #[must_use]
    pub fn new(bot: Bot, chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            bot,
            chat_id,
            message_id,
        }
    }
}

#[async_trait]
impl RenderTarget for TelegramRenderTarget {
    async fn render(&self, text: &str) -> Result<(), RenderError> {
        match self
            .bot
            .edit_message_text(self.chat_id, self.message_id, text)
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => Ok(()),
            Err(RequestError::RetryAfter(wait)) => Err(RenderError::RateLimited(wait.duration())),
            Err(e) => Err(RenderError::Failed(e.to_string())),
        }
    }
}

/// Live state shared between the marquee loop and reconfiguration handlers.
///
/// Window size and delay survive across sessions, so /setdelay and
/// /setmarquee keep their effect after a stop/start cycle.
pub struct MarqueeState {
    active: AtomicBool,
    window: AtomicUsize,
    delay_secs: AtomicU64,
}

impl MarqueeState {
    /// Create state with the configured initial window and delay
    #[must_use]
    pub fn new(window: usize, delay_secs: u64) -> Self {
        Self {
            active: AtomicBool::new(false),
            window: AtomicUsize::new(window.max(1)),
            delay_secs: AtomicU64::new(delay_secs.max(1)),
        }
    }

    /// Whether a marquee loop is currently running
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Current window size in lines
    pub fn window(&self) -> usize {
        self.window.load(Ordering::Acquire)
    }

    /// Current refresh delay
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs.load(Ordering::Acquire))
    }

    /// Change the window size; takes effect on the next cycle
    pub fn set_window(&self, lines: usize) {
        self.window.store(lines.max(1), Ordering::Release);
    }

    /// Change the refresh delay; takes effect on the next cycle
    pub fn set_delay(&self, secs: u64) {
        self.delay_secs.store(secs.max(1), Ordering::Release);
    }
}

/// One-slot registry for the process-wide marquee session.
///
/// A second start while one is active is rejected rather than superseding the
/// running loop, so two loops can never fight over the same render target.
pub struct MarqueeRegistry {
    state: Arc<MarqueeState>,
    log_path: PathBuf,
}

impl MarqueeRegistry {
    /// Create the registry with initial display parameters
    #[must_use]
    pub fn new(log_path: PathBuf, window: usize, delay_secs: u64) -> Self {
        Self {
            state: Arc::new(MarqueeState::new(window, delay_secs)),
            log_path,
        }
    }

    /// Shared display state (window, delay, active flag)
    #[must_use]
    pub fn state(&self) -> Arc<MarqueeState> {
        self.state.clone()
    }

    /// Path of the tailed log file
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Claim the singleton slot and spawn the render loop.
    ///
    /// Returns `false` without side effects if a session is already running.
    pub fn start(&self, target: impl RenderTarget + 'static) -> bool {
        if self.state.active.swap(true, Ordering::AcqRel) {
            return false;
        }
        let state = self.state.clone();
        let path = self.log_path.clone();
        tokio::spawn(async move {
            run_marquee(state, path, target).await;
        });
        true
    }

    /// Request a stop, observed by the loop at its next cycle boundary.
    ///
    /// Returns `true` if a session was running.
    pub fn stop(&self) -> bool {
        self.state.active.swap(false, Ordering::AcqRel)
    }
}

/// Compute the window starting at `cursor` and the cursor for the next cycle.
///
/// Returns `None` when the log is empty. A cursor that ran past the end
/// (the log shrank) wraps to 0 before the window is taken; the final window
/// may be shorter than `size`. The next cursor advances by `size` and wraps
/// to 0 once it reaches `total`, so for `total = 12, size = 5` the cursor
/// sequence is `0, 5, 10, 0, ...`.
#[must_use]
pub fn window_bounds(total: usize, cursor: usize, size: usize) -> Option<(Range<usize>, usize)> {
    if total == 0 || size == 0 {
        return None;
    }
    let cursor = if cursor >= total { 0 } else { cursor };
    let end = (cursor + size).min(total);
    let next = if cursor + size >= total { 0 } else { cursor + size };
    Some((cursor..end, next))
}

/// Last `n` lines of a log text, for the /latest command
#[must_use]
pub fn tail_lines(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].to_vec()
}

/// Render a window of log lines as Telegram-ready HTML.
///
/// The raw lines are truncated before escaping so the `<pre>` wrapper and
/// any entities stay intact regardless of how long the log lines are.
#[must_use]
pub fn render_window_html(lines: &[&str], range: &Range<usize>, total: usize) -> String {
    let header = format!(
        "📜 <b>Журнал</b> │ строки {}–{} из {}",
        range.start + 1,
        range.end,
        total
    );
    let budget = TELEGRAM_MESSAGE_LIMIT
        .saturating_sub(header.chars().count() + "\n<pre></pre>".len());
    let body = truncate_str(lines.join("\n"), budget);
    format!("{header}\n<pre>{}</pre>", html_escape::encode_text(&body))
}

/// Render the tail of a log as Telegram-ready HTML, for the /latest command.
#[must_use]
pub fn render_tail_html(lines: &[&str]) -> String {
    let budget = TELEGRAM_MESSAGE_LIMIT.saturating_sub("<pre></pre>".len());
    let body = truncate_str(lines.join("\n"), budget);
    format!("<pre>{}</pre>", html_escape::encode_text(&body))
}

/// The marquee loop.
///
/// Each cycle: check the active flag (a cleared flag triggers a final
/// "stopped" render and exit), read the whole log file, render the current
/// window, sleep the configured delay, advance the cursor. A rate-limited
/// render sleeps exactly the mandated duration and retries the same window.
/// Other render failures are logged and the loop continues; a log read
/// failure ends the session after reporting it to the chat.
pub async fn run_marquee(state: Arc<MarqueeState>, path: PathBuf, target: impl RenderTarget) {
    let mut cursor: usize = 0;
    info!(path = %path.display(), "marquee started");

    loop {
        if !state.is_active() {
            if let Err(e) = target.render("⏹ Показ логов остановлен.").await {
                warn!("final marquee render failed: {e}");
            }
            info!("marquee stopped");
            return;
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                error!(path = %path.display(), "cannot read log file: {e}");
                if let Err(render_err) = target
                    .render(&format!("❌ Не удалось прочитать лог: {e}"))
                    .await
                {
                    warn!("log-failure report render failed: {render_err}");
                }
                state.active.store(false, Ordering::Release);
                return;
            }
        };

        let lines: Vec<&str> = content.lines().collect();
        if let Some((range, next)) = window_bounds(lines.len(), cursor, state.window()) {
            let html = render_window_html(&lines[range.clone()], &range, lines.len());
            match target.render(&html).await {
                Ok(()) => cursor = next,
                Err(RenderError::RateLimited(wait)) => {
                    info!("marquee rate limited, waiting {:?}", wait);
                    tokio::time::sleep(wait).await;
                    // Same window is retried on the next cycle.
                }
                Err(RenderError::Failed(e)) => {
                    warn!("marquee render failed: {e}");
                    cursor = next;
                }
            }
        } else {
            // Empty log: nothing to render this cycle.
            cursor = 0;
        }

        tokio::time::sleep(state.delay()).await;
    }
}
