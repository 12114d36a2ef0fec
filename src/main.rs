use chatsweep::bot::handlers::{self, Command};
use chatsweep::bot::UserPreferences;
use chatsweep::config::Settings;
use chatsweep::filter::{FilterEngine, WordSet};
use chatsweep::marquee::MarqueeRegistry;
use chatsweep::sweeper::SweepRegistry;
use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting the bot token from log output
struct RedactionPatterns {
    token_in_url: Regex,
    bare_token: Regex,
}

impl RedactionPatterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_in_url: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            bare_token: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let output = self
            .token_in_url
            .replace_all(input, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        self.bare_token
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string()
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length to satisfy the Write contract even when
        // the redacted string differs in size.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: self.patterns.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting chatsweep bot...");

    let settings = init_settings();

    let bot = Bot::new(settings.telegram_token.clone());

    let marquee = Arc::new(MarqueeRegistry::new(
        PathBuf::from(&settings.log_path),
        settings.marquee_window,
        settings.marquee_delay_secs,
    ));
    let sweeps = Arc::new(SweepRegistry::new());
    let prefs = Arc::new(UserPreferences::new());
    let filter = Arc::new(FilterEngine::new(
        WordSet::new(settings.stop_words()),
        WordSet::new(settings.key_words()),
    ));

    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![settings, marquee, sweeps, prefs, filter])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        patterns,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    Update::filter_message()
                        .filter(|msg: Message| msg.text().is_some())
                        .endpoint(handle_text),
                ),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    settings: Arc<Settings>,
    marquee: Arc<MarqueeRegistry>,
    sweeps: Arc<SweepRegistry>,
    prefs: Arc<UserPreferences>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => handlers::start(bot, msg).await,
        Command::Help => handlers::help(bot, msg).await,
        Command::Logs => handlers::logs(bot, msg, marquee).await,
        Command::Stop => handlers::stop(bot, msg, marquee, sweeps).await,
        Command::Latest => handlers::latest(bot, msg, marquee).await,
        Command::SetDelay(secs) => handlers::set_delay(bot, msg, marquee, secs).await,
        Command::SetMarquee(lines) => handlers::set_marquee(bot, msg, marquee, lines).await,
        Command::DeleteAll => handlers::delete_all(bot, msg, settings, prefs, sweeps).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    settings: Arc<Settings>,
    prefs: Arc<UserPreferences>,
    filter: Arc<FilterEngine>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_text(bot, msg, settings, prefs, filter).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    marquee: Arc<MarqueeRegistry>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_callback(bot, q, marquee).await {
        error!("Callback handler error: {}", e);
    }
    respond(())
}

#[cfg(test)]
mod tests {
    use super::RedactionPatterns;

    #[test]
    fn redacts_bot_token_in_urls_and_bare() {
        let patterns = RedactionPatterns::new().expect("valid patterns");
        let token = format!("123456789:{}", "A".repeat(35));

        let url = format!("https://api.telegram.org/bot{token}/sendMessage ");
        let redacted = patterns.redact(&url);
        assert!(!redacted.contains(&token));
        assert!(redacted.contains("[TELEGRAM_TOKEN]"));

        let bare = format!("token is {token} done");
        let redacted = patterns.redact(&bare);
        assert_eq!(redacted, "token is [TELEGRAM_TOKEN] done");
    }
}
