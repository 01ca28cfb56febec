use crate::model::{Event, RoutingMeta};
use crate::telegram::{EventSource, RawMessage, RawUpdate, RawUpdateKind, RawUser, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// An update that cannot be turned into an [`Event`]. Such updates are dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedEvent {
    #[error("update {update_id}: callback query without data")]
    MissingCallbackData { update_id: i64 },
    #[error("update {update_id}: callback query without originating message")]
    MissingCallbackMessage { update_id: i64 },
    #[error("update {update_id}: message without sender")]
    MissingSender { update_id: i64 },
}

#[async_trait]
pub trait Fetcher: Send {
    async fn fetch(&mut self, limit: u8) -> Result<Vec<Event>, TransportError>;
}

/// Pulls updates from an [`EventSource`] and owns the cursor into its stream.
pub struct UpdateFetcher {
    source: Arc<dyn EventSource>,
    cursor: i64,
}

impl UpdateFetcher {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self { source, cursor: 0 }
    }

    /// Offset of the next update this fetcher will ask for.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }
}

#[async_trait]
impl Fetcher for UpdateFetcher {
    #[instrument(skip_all)]
    async fn fetch(&mut self, limit: u8) -> Result<Vec<Event>, TransportError> {
        let updates = self.source.updates(self.cursor, limit).await?;
        debug!(cursor = self.cursor, count = updates.len(), "fetched updates");

        let Some(max_id) = updates.iter().map(|u| u.id).max() else {
            return Ok(Vec::new());
        };
        self.cursor = self.cursor.max(max_id + 1);

        let mut events = Vec::with_capacity(updates.len());
        for update in updates {
            match normalize(update) {
                Ok(event) => events.push(event),
                Err(err) => warn!(%err, "dropping malformed update"),
            }
        }
        Ok(events)
    }
}

/// Users without a username are keyed by their numeric id.
fn owner(user: &RawUser) -> String {
    match user.username.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("id{}", user.id),
    }
}

fn meta(msg: &RawMessage, from: &RawUser) -> RoutingMeta {
    RoutingMeta {
        chat_id: msg.chat_id,
        username: owner(from),
    }
}

pub fn normalize(update: RawUpdate) -> Result<Event, MalformedEvent> {
    let update_id = update.id;
    match update.kind {
        RawUpdateKind::Message(msg) => {
            let Some(from) = msg.from.as_ref() else {
                return Err(MalformedEvent::MissingSender { update_id });
            };
            Ok(Event::Message {
                meta: meta(&msg, from),
                text: msg.text.unwrap_or_default(),
            })
        }
        RawUpdateKind::CallbackQuery(q) => {
            let msg = q
                .message
                .ok_or(MalformedEvent::MissingCallbackMessage { update_id })?;
            let text = q
                .data
                .ok_or(MalformedEvent::MissingCallbackData { update_id })?;
            Ok(Event::CallbackQuery {
                meta: meta(&msg, &q.from),
                text,
                callback_id: q.id,
            })
        }
        RawUpdateKind::Other => Ok(Event::Unknown { update_id }),
    }
}
