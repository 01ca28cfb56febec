//! Telegram Bot API boundary.
//!
//! The rest of the crate talks to Telegram through [`EventSource`] and only sees
//! the trimmed-down `Raw*` update shapes defined here, so tests can drive the
//! bot with hand-built updates.
use async_trait::async_trait;
use teloxide::payloads::{AnswerCallbackQuerySetters, GetUpdatesSetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, Message, Update, UpdateKind,
};
use thiserror::Error;
use tracing::instrument;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),
    #[error("event source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUser {
    pub id: u64,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub chat_id: i64,
    pub from: Option<RawUser>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCallbackQuery {
    pub id: String,
    pub from: RawUser,
    /// The message carrying the pressed button; absent for inline-mode messages.
    pub message: Option<RawMessage>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawUpdateKind {
    Message(RawMessage),
    CallbackQuery(RawCallbackQuery),
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUpdate {
    pub id: i64,
    pub kind: RawUpdateKind,
}

/// Inline keyboard attached to an outgoing message: rows of (label, callback data).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<(String, String)>>,
}

impl Keyboard {
    pub fn single(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            rows: vec![vec![(label.into(), data.into())]],
        }
    }

    fn to_markup(&self) -> InlineKeyboardMarkup {
        InlineKeyboardMarkup::new(self.rows.iter().map(|row| {
            row.iter()
                .map(|(label, data)| InlineKeyboardButton::callback(label.clone(), data.clone()))
                .collect::<Vec<_>>()
        }))
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Up to `limit` updates with id >= `offset`.
    async fn updates(&self, offset: i64, limit: u8) -> Result<Vec<RawUpdate>, TransportError>;

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), TransportError>;

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: &str,
        show_alert: Option<bool>,
    ) -> Result<(), TransportError>;
}

/// [`EventSource`] backed by the Bot API through teloxide.
#[derive(Clone)]
pub struct TelegramSource {
    bot: Bot,
    poll_timeout_secs: u32,
}

impl std::fmt::Debug for TelegramSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSource")
            .field("api_url", &self.bot.api_url().as_str())
            .finish_non_exhaustive()
    }
}

impl TelegramSource {
    pub fn new(bot: Bot, poll_timeout_secs: u32) -> Self {
        Self {
            bot,
            poll_timeout_secs,
        }
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let mut bot = Bot::new(cfg.telegram.bot_token.clone());
        if let Some(api_url) = &cfg.telegram.api_url {
            bot = bot.set_api_url(reqwest::Url::parse(api_url)?);
        }
        Ok(Self::new(bot, cfg.telegram.poll_timeout_secs))
    }
}

fn raw_user(user: &teloxide::types::User) -> RawUser {
    RawUser {
        id: user.id.0,
        username: user.username.clone(),
    }
}

fn raw_message(msg: &Message) -> RawMessage {
    RawMessage {
        chat_id: msg.chat.id.0,
        from: msg.from().map(raw_user),
        text: msg.text().map(str::to_owned),
    }
}

fn raw_update(update: &Update) -> RawUpdate {
    let kind = match &update.kind {
        UpdateKind::Message(msg) => RawUpdateKind::Message(raw_message(msg)),
        UpdateKind::CallbackQuery(q) => RawUpdateKind::CallbackQuery(RawCallbackQuery {
            id: q.id.clone(),
            from: raw_user(&q.from),
            message: q.message.as_ref().map(raw_message),
            data: q.data.clone(),
        }),
        _ => RawUpdateKind::Other,
    };
    RawUpdate {
        id: i64::from(update.id),
        kind,
    }
}

#[async_trait]
impl EventSource for TelegramSource {
    #[instrument(skip_all)]
    async fn updates(&self, offset: i64, limit: u8) -> Result<Vec<RawUpdate>, TransportError> {
        let offset = i32::try_from(offset)
            .map_err(|_| TransportError::Unavailable(format!("offset {offset} out of range")))?;
        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .limit(limit)
            .timeout(self.poll_timeout_secs)
            .await?;
        Ok(updates.iter().map(raw_update).collect())
    }

    #[instrument(skip_all)]
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), TransportError> {
        let mut req = self.bot.send_message(ChatId(chat_id), text);
        if let Some(keyboard) = keyboard {
            req = req.reply_markup(keyboard.to_markup());
        }
        req.await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn answer_callback(
        &self,
        callback_id: &str,
        text: &str,
        show_alert: Option<bool>,
    ) -> Result<(), TransportError> {
        let mut req = self.bot.answer_callback_query(callback_id).text(text);
        if let Some(show_alert) = show_alert {
            req = req.show_alert(show_alert);
        }
        req.await?;
        Ok(())
    }
}
