//! Command and message handlers

use anyhow::Result;
use std::sync::Arc;
use teloxide::{
    prelude::*,
    types::{
        CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton,
        KeyboardMarkup, ParseMode, UserId,
    },
    utils::command::BotCommands,
};
use tracing::{info, warn};

use crate::bot::prefs::{SourceChoice, UserPreferences};
use crate::bot::resilient::{edit_message_resilient, send_message_resilient};
use crate::config::{Settings, LATEST_LINES};
use crate::filter::FilterEngine;
use crate::marquee::{render_tail_html, tail_lines, MarqueeRegistry, TelegramRenderTarget};
use crate::sweeper::{run_sweep, DeletionJob, SweepRegistry};

/// Bot commands
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Поддерживаемые команды:")]
pub enum Command {
    #[command(description = "Начать работу.")]
    Start,
    #[command(description = "Показать справку.")]
    Help,
    #[command(description = "Показать логи бегущей строкой.")]
    Logs,
    #[command(description = "Остановить показ логов и удаление.")]
    Stop,
    #[command(description = "Последние строки лога.")]
    Latest,
    #[command(description = "Задержка обновления логов, сек.")]
    SetDelay(u64),
    #[command(description = "Размер окна бегущей строки.")]
    SetMarquee(usize),
    #[command(description = "Удалить все сообщения в чате.")]
    DeleteAll,
}

/// Button labels for the reply keyboards
pub mod buttons {
    /// Start button
    pub const START: &str = "Старт";
    /// Open the source-selection keyboard
    pub const CHOOSE_SOURCE: &str = "Выбрать источник";
    /// Sweep private chats
    pub const SOURCE_PRIVATE: &str = "Удалять из личного чата";
    /// Sweep groups
    pub const SOURCE_GROUP: &str = "Удалять из группы";
    /// Callback payload of the inline marquee stop button
    pub const MARQUEE_STOP: &str = "marquee_stop";
}

pub fn start_keyboard() -> KeyboardMarkup {
    let keyboard = vec![
        vec![KeyboardButton::new(buttons::START)],
        vec![KeyboardButton::new(buttons::CHOOSE_SOURCE)],
    ];
    KeyboardMarkup::new(keyboard).resize_keyboard()
}

pub fn source_keyboard() -> KeyboardMarkup {
    let keyboard = vec![
        vec![KeyboardButton::new(buttons::SOURCE_PRIVATE)],
        vec![KeyboardButton::new(buttons::SOURCE_GROUP)],
    ];
    KeyboardMarkup::new(keyboard).resize_keyboard()
}

fn marquee_stop_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[InlineKeyboardButton::callback(
        "⏹ Остановить",
        buttons::MARQUEE_STOP,
    )]])
}

/// Safely extract the sender's user ID (0 when absent)
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> UserId {
    msg.from.as_ref().map_or(UserId(0), |u| u.id)
}

pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    bot.send_message(
        msg.chat.id,
        "Привет! Нажми 'Старт', чтобы начать, или выбери источник для удаления сообщений.",
    )
    .reply_markup(start_keyboard())
    .await?;
    Ok(())
}

pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

/// Start the log marquee, rejecting a second session while one is running
pub async fn logs(bot: Bot, msg: Message, marquee: Arc<MarqueeRegistry>) -> Result<()> {
    if marquee.state().is_active() {
        bot.send_message(msg.chat.id, "Показ логов уже запущен. /stop — остановить.")
            .await?;
        return Ok(());
    }

    let placeholder = bot
        .send_message(msg.chat.id, "⏳ Загружаю логи...")
        .reply_markup(marquee_stop_keyboard())
        .await?;

    let target = TelegramRenderTarget::new(bot.clone(), msg.chat.id, placeholder.id);
    if !marquee.start(target) {
        // Lost the race to another /logs; the placeholder is now stale.
        bot.edit_message_text(msg.chat.id, placeholder.id, "Показ логов уже запущен.")
            .await?;
    }
    Ok(())
}

/// Stop the marquee and cancel a running sweep in this chat
pub async fn stop(
    bot: Bot,
    msg: Message,
    marquee: Arc<MarqueeRegistry>,
    sweeps: Arc<SweepRegistry>,
) -> Result<()> {
    let marquee_stopped = marquee.stop();
    let sweep_cancelled = sweeps.cancel(msg.chat.id).await;

    let text = match (marquee_stopped, sweep_cancelled) {
        (true, true) => "Останавливаю показ логов и удаление.",
        (true, false) => "Останавливаю показ логов.",
        (false, true) => "Останавливаю удаление.",
        (false, false) => "Сейчас ничего не запущено.",
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Show the last lines of the log file
pub async fn latest(bot: Bot, msg: Message, marquee: Arc<MarqueeRegistry>) -> Result<()> {
    let content = match tokio::fs::read_to_string(marquee.log_path()).await {
        Ok(content) => content,
        Err(e) => {
            bot.send_message(msg.chat.id, format!("❌ Не удалось прочитать лог: {e}"))
                .await?;
            return Ok(());
        }
    };

    let tail = tail_lines(&content, LATEST_LINES);
    if tail.is_empty() {
        bot.send_message(msg.chat.id, "Лог пуст.").await?;
        return Ok(());
    }

    bot.send_message(msg.chat.id, render_tail_html(&tail))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

pub async fn set_delay(bot: Bot, msg: Message, marquee: Arc<MarqueeRegistry>, secs: u64) -> Result<()> {
    marquee.state().set_delay(secs);
    let effective = marquee.state().delay().as_secs();
    bot.send_message(
        msg.chat.id,
        format!("Задержка обновления: {effective} сек."),
    )
    .await?;
    Ok(())
}

pub async fn set_marquee(
    bot: Bot,
    msg: Message,
    marquee: Arc<MarqueeRegistry>,
    lines: usize,
) -> Result<()> {
    marquee.state().set_window(lines);
    let effective = marquee.state().window();
    bot.send_message(
        msg.chat.id,
        format!("Размер окна бегущей строки: {effective} строк."),
    )
    .await?;
    Ok(())
}

/// The /deleteall flow: scope guard, admin check, then the sweep itself.
///
/// The confirmation message is sent before the loop starts and edited into
/// the final summary; a failure to send it aborts the whole operation and is
/// reported separately from per-message failures.
pub async fn delete_all(
    bot: Bot,
    msg: Message,
    settings: Arc<Settings>,
    prefs: Arc<UserPreferences>,
    sweeps: Arc<SweepRegistry>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    let chat_id = msg.chat.id;

    let Some(choice) = prefs.source(user_id).await else {
        bot.send_message(chat_id, "Сначала выбери источник для удаления сообщений.")
            .reply_markup(source_keyboard())
            .await?;
        return Ok(());
    };

    if !choice.allows(&msg.chat) {
        bot.send_message(
            chat_id,
            format!(
                "Команда должна быть вызвана в соответствующем чате (выбран источник: {}).",
                choice.label()
            ),
        )
        .await?;
        return Ok(());
    }

    if !msg.chat.is_private() && !is_chat_admin(&bot, chat_id, user_id).await {
        bot.send_message(chat_id, "⛔️ Удалять сообщения могут только администраторы.")
            .await?;
        return Ok(());
    }

    let Some(cancel) = sweeps.begin(chat_id).await else {
        bot.send_message(chat_id, "Удаление уже выполняется в этом чате.")
            .await?;
        return Ok(());
    };

    // Fatal-to-operation: without the confirmation message there is no sweep.
    let confirmation = match send_message_resilient(
        &bot,
        chat_id,
        "Начинаю удаление сообщений...",
        None,
    )
    .await
    {
        Ok(confirmation) => confirmation,
        Err(e) => {
            sweeps.finish(chat_id).await;
            bot.send_message(chat_id, format!("Произошла ошибка: {e}"))
                .await
                .ok();
            return Err(e);
        }
    };

    let job = DeletionJob::below(
        chat_id,
        user_id,
        confirmation.id,
        std::time::Duration::from_millis(settings.deletion_pause_ms),
    );
    info!(
        chat_id = chat_id.0,
        from = job.start_message_id,
        "starting sweep"
    );

    let result = run_sweep(&bot, &job, &cancel).await;
    sweeps.finish(chat_id).await;

    let mut summary = format!(
        "Готово. Попыток: {}, удалено: {}.",
        result.attempted, result.deleted
    );
    if result.cancelled {
        summary.push_str(" Удаление было прервано.");
    }
    if let Some(e) = &result.last_error {
        summary.push_str(&format!(" Последняя ошибка: {e}"));
    }

    if let Err(e) = edit_message_resilient(&bot, chat_id, confirmation.id, &summary, None).await {
        warn!("failed to edit sweep summary, sending a new message: {e}");
        send_message_resilient(&bot, chat_id, &summary, None).await?;
    }
    Ok(())
}

async fn is_chat_admin(bot: &Bot, chat_id: ChatId, user_id: UserId) -> bool {
    match bot.get_chat_member(chat_id, user_id).await {
        Ok(member) => member.is_privileged(),
        Err(e) => {
            warn!("get_chat_member failed: {e}");
            false
        }
    }
}

/// Free-text handler: keyboard button labels first, then filter-and-forward
/// for messages arriving from a watched source chat.
pub async fn handle_text(
    bot: Bot,
    msg: Message,
    settings: Arc<Settings>,
    prefs: Arc<UserPreferences>,
    filter: Arc<FilterEngine>,
) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let user_id = get_user_id_safe(&msg);

    match text {
        buttons::START => {
            bot.send_message(
                msg.chat.id,
                "Ты нажал на кнопку 'Старт'. Теперь можно выполнить команду /deleteall.",
            )
            .await?;
        }
        buttons::CHOOSE_SOURCE => {
            bot.send_message(msg.chat.id, "Выбери источник для удаления сообщений:")
                .reply_markup(source_keyboard())
                .await?;
        }
        buttons::SOURCE_PRIVATE | buttons::SOURCE_GROUP => {
            let choice = if text == buttons::SOURCE_PRIVATE {
                SourceChoice::Private
            } else {
                SourceChoice::Group
            };
            prefs.set_source(user_id, choice).await;
            bot.send_message(
                msg.chat.id,
                format!(
                    "Источник установлен: {text}. Теперь можно выполнить команду /deleteall."
                ),
            )
            .await?;
        }
        _ => {
            forward_if_eligible(&bot, &msg, text, &settings, &filter).await?;
        }
    }
    Ok(())
}

async fn forward_if_eligible(
    bot: &Bot,
    msg: &Message,
    text: &str,
    settings: &Settings,
    filter: &FilterEngine,
) -> Result<()> {
    let Some(forward_chat_id) = settings.forward_chat_id else {
        return Ok(());
    };
    if !settings.source_chats().contains(&msg.chat.id.0) {
        return Ok(());
    }

    if filter.should_forward(text).await {
        bot.forward_message(ChatId(forward_chat_id), msg.chat.id, msg.id)
            .await?;
        info!(from = msg.chat.id.0, "message forwarded");
    }
    Ok(())
}

/// Inline button presses under the marquee message
pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    marquee: Arc<MarqueeRegistry>,
) -> Result<()> {
    if q.data.as_deref() == Some(buttons::MARQUEE_STOP) {
        let was_running = marquee.stop();
        let note = if was_running {
            "Останавливаю показ логов."
        } else {
            "Показ логов уже остановлен."
        };
        bot.answer_callback_query(q.id).text(note).await?;
    } else {
        bot.answer_callback_query(q.id).await?;
    }
    Ok(())
}
