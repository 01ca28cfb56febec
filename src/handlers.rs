use crate::consumer::Processor;
use crate::db::{ItemStore, StorageError};
use crate::model::{ConversationStatus, Event, Item, RoutingMeta};
use crate::state::{StateError, StateStore};
use crate::telegram::{EventSource, Keyboard, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};

pub const RND_CMD: &str = "/rnd";
pub const HELP_CMD: &str = "/help";
pub const START_CMD: &str = "/start";

pub const MSG_HELP: &str = "I can keep a list of pages for you to read later.\n\n\
Send me a link and I'll save it.\n\n\
Send /rnd to get a random page from your list. \
The page is removed from the list once I've sent it.";
pub const MSG_HELLO: &str = "Hi there! 👾\n\n";
pub const MSG_UNKNOWN_COMMAND: &str = "Unknown command 🤔";
pub const MSG_NO_SAVED_PAGES: &str = "You have no saved pages 🙊";
pub const MSG_SAVED: &str = "Saved! 👌";
pub const MSG_ALREADY_EXISTS: &str = "You already have this page in your list 🤗";

const HINT_BUTTON: &str = "How do I save a page?";
const HINT_ANSWER: &str = "Just paste a link into the chat.";

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("unknown event type")]
    UnknownEventType,
    #[error("can't {op}: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: StorageError,
    },
    #[error("can't {op}: {source}")]
    State {
        op: &'static str,
        #[source]
        source: StateError,
    },
    #[error("can't {op}: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: TransportError,
    },
}

/// What a trimmed message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Save(String),
    Random,
    Help,
    Start,
    Unknown,
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if is_url(text) {
            return Command::Save(text.to_string());
        }
        match text {
            RND_CMD => Command::Random,
            HELP_CMD => Command::Help,
            START_CMD => Command::Start,
            _ => Command::Unknown,
        }
    }
}

fn is_url(text: &str) -> bool {
    reqwest::Url::parse(text)
        .map(|u| u.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}

/// Routes each [`Event`] to a command and replies through the event source.
pub struct CommandRouter {
    source: Arc<dyn EventSource>,
    items: Arc<dyn ItemStore>,
    state: Arc<dyn StateStore>,
}

impl CommandRouter {
    pub fn new(
        source: Arc<dyn EventSource>,
        items: Arc<dyn ItemStore>,
        state: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            source,
            items,
            state,
        }
    }

    async fn reply(
        &self,
        op: &'static str,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), ProcessError> {
        self.source
            .send_message(chat_id, text, keyboard)
            .await
            .map_err(|source| ProcessError::Transport { op, source })
    }

    #[instrument(skip_all)]
    async fn handle_message(&self, text: &str, meta: &RoutingMeta) -> Result<(), ProcessError> {
        let command = Command::parse(text);
        info!(?command, user = %meta.username, "got new command");

        match command {
            Command::Save(url) => self.save_page(url, meta).await,
            Command::Random => self.send_random(meta).await,
            Command::Help => self.reply("send help", meta.chat_id, MSG_HELP, None).await,
            Command::Start => {
                let hello = format!("{MSG_HELLO}{MSG_HELP}");
                let keyboard = Keyboard::single(HINT_BUTTON, HINT_ANSWER);
                self.reply("send hello", meta.chat_id, &hello, Some(keyboard))
                    .await
            }
            Command::Unknown => {
                self.reply("send unknown command", meta.chat_id, MSG_UNKNOWN_COMMAND, None)
                    .await
            }
        }
    }

    async fn save_page(&self, url: String, meta: &RoutingMeta) -> Result<(), ProcessError> {
        const OP: &str = "do cmd save page";
        let page = Item::new(url, meta.username.clone());

        let exists = self
            .items
            .exists(&page)
            .await
            .map_err(|source| ProcessError::Storage { op: OP, source })?;
        if exists {
            return self.reply(OP, meta.chat_id, MSG_ALREADY_EXISTS, None).await;
        }

        self.items
            .save(&page)
            .await
            .map_err(|source| ProcessError::Storage { op: OP, source })?;
        self.reply(OP, meta.chat_id, MSG_SAVED, None).await
    }

    async fn send_random(&self, meta: &RoutingMeta) -> Result<(), ProcessError> {
        const OP: &str = "do cmd send random";
        let picked = self
            .items
            .pick_random(&meta.username)
            .await
            .map_err(|source| ProcessError::Storage { op: OP, source })?;

        let Some(page) = picked else {
            return self.reply(OP, meta.chat_id, MSG_NO_SAVED_PAGES, None).await;
        };

        self.reply(OP, meta.chat_id, &page.url, None).await?;
        self.items
            .remove(&page)
            .await
            .map_err(|source| ProcessError::Storage { op: OP, source })
    }

    #[instrument(skip_all)]
    async fn handle_callback(
        &self,
        text: &str,
        meta: &RoutingMeta,
        callback_id: &str,
    ) -> Result<(), ProcessError> {
        self.state
            .set(
                &meta.chat_id.to_string(),
                ConversationStatus::WaitingForInput.as_str(),
            )
            .await
            .map_err(|source| ProcessError::State {
                op: "set state",
                source,
            })?;

        self.source
            .answer_callback(callback_id, text, None)
            .await
            .map_err(|source| ProcessError::Transport {
                op: "answer callback query",
                source,
            })
    }
}

#[async_trait]
impl Processor for CommandRouter {
    type Error = ProcessError;

    async fn process(&self, event: Event) -> Result<(), ProcessError> {
        match &event {
            Event::Message { text, meta } => self.handle_message(text, meta).await,
            Event::CallbackQuery {
                text,
                meta,
                callback_id,
            } => self.handle_callback(text, meta, callback_id).await,
            Event::Unknown { .. } => Err(ProcessError::UnknownEventType),
        }
    }
}
