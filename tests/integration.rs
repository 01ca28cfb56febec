use async_trait::async_trait;
use std::sync::Arc;
use tg_readlater::consumer::Processor;
use tg_readlater::db::{self, ItemStore, SqliteStore, StorageError};
use tg_readlater::handlers::{
    CommandRouter, ProcessError, MSG_ALREADY_EXISTS, MSG_HELLO, MSG_HELP, MSG_NO_SAVED_PAGES,
    MSG_SAVED, MSG_UNKNOWN_COMMAND,
};
use tg_readlater::model::{Event, Item, RoutingMeta};
use tg_readlater::state::{MemoryStateStore, StateError, StateStore};
use tg_readlater::telegram::{EventSource, Keyboard, RawUpdate, TransportError};
use tokio::sync::Mutex;

async fn setup_store() -> SqliteStore {
    let pool = db::init_pool("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    SqliteStore::new(pool)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Sent {
    chat_id: i64,
    text: String,
    keyboard: Option<Keyboard>,
}

#[derive(Clone, Default)]
struct RecordingSource {
    sent: Arc<Mutex<Vec<Sent>>>,
    answers: Arc<Mutex<Vec<(String, String)>>>,
    fail_sends: bool,
}

impl RecordingSource {
    fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Default::default()
        }
    }

    async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }

    async fn answers(&self) -> Vec<(String, String)> {
        self.answers.lock().await.clone()
    }
}

#[async_trait]
impl EventSource for RecordingSource {
    async fn updates(&self, _offset: i64, _limit: u8) -> Result<Vec<RawUpdate>, TransportError> {
        Ok(Vec::new())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::Unavailable("send failed".into()));
        }
        self.sent.lock().await.push(Sent {
            chat_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: &str,
        _show_alert: Option<bool>,
    ) -> Result<(), TransportError> {
        self.answers
            .lock()
            .await
            .push((callback_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Wraps a real store and records every call made to it.
#[derive(Clone)]
struct RecordingStore {
    inner: Arc<dyn ItemStore>,
    calls: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingStore {
    fn new(inner: Arc<dyn ItemStore>) -> Self {
        Self {
            inner,
            calls: Arc::default(),
            fail: false,
        }
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: String) -> Result<(), StorageError> {
        self.calls.lock().await.push(call);
        if self.fail {
            return Err(StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire")));
        }
        Ok(())
    }
}

#[async_trait]
impl ItemStore for RecordingStore {
    async fn save(&self, item: &Item) -> Result<(), StorageError> {
        self.record(format!("save {}", item.url)).await?;
        self.inner.save(item).await
    }

    async fn exists(&self, item: &Item) -> Result<bool, StorageError> {
        self.record(format!("exists {}", item.url)).await?;
        self.inner.exists(item).await
    }

    async fn pick_random(&self, owner: &str) -> Result<Option<Item>, StorageError> {
        self.record(format!("pick_random {owner}")).await?;
        self.inner.pick_random(owner).await
    }

    async fn remove(&self, item: &Item) -> Result<(), StorageError> {
        self.record(format!("remove {}", item.url)).await?;
        self.inner.remove(item).await
    }
}

#[derive(Default)]
struct RecordingState {
    sets: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl StateStore for RecordingState {
    async fn get(&self, key: &str) -> Result<String, StateError> {
        Err(StateError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StateError> {
        self.sets
            .lock()
            .await
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), StateError> {
        Ok(())
    }
}

fn message(text: &str, owner: &str) -> Event {
    Event::Message {
        text: text.to_string(),
        meta: RoutingMeta {
            chat_id: 42,
            username: owner.to_string(),
        },
    }
}

fn router(source: &RecordingSource, store: Arc<dyn ItemStore>) -> CommandRouter {
    CommandRouter::new(
        Arc::new(source.clone()),
        store,
        Arc::new(MemoryStateStore::new()),
    )
}

#[tokio::test]
async fn saving_a_url_stores_it_and_replies_saved() {
    let store = Arc::new(setup_store().await);
    let source = RecordingSource::default();
    let router = router(&source, store.clone());

    router
        .process(message("https://example.com/a", "alice"))
        .await
        .unwrap();

    assert!(store
        .exists(&Item::new("https://example.com/a", "alice"))
        .await
        .unwrap());
    assert_eq!(store.count("alice").await.unwrap(), 1);
    let sent = source.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat_id, 42);
    assert_eq!(sent[0].text, MSG_SAVED);
}

#[tokio::test]
async fn saving_the_same_url_twice_keeps_one_item() {
    let store = Arc::new(setup_store().await);
    let source = RecordingSource::default();
    let router = router(&source, store.clone());

    router
        .process(message("https://example.com/a", "alice"))
        .await
        .unwrap();
    router
        .process(message("  https://example.com/a  ", "alice"))
        .await
        .unwrap();

    assert_eq!(store.count("alice").await.unwrap(), 1);
    let texts: Vec<String> = source.sent().await.into_iter().map(|s| s.text).collect();
    assert_eq!(texts, vec![MSG_SAVED.to_string(), MSG_ALREADY_EXISTS.to_string()]);
}

#[tokio::test]
async fn same_url_for_another_owner_is_a_separate_item() {
    let store = Arc::new(setup_store().await);
    let source = RecordingSource::default();
    let router = router(&source, store.clone());

    router
        .process(message("https://example.com/a", "alice"))
        .await
        .unwrap();
    router
        .process(message("https://example.com/a", "bob"))
        .await
        .unwrap();

    assert_eq!(store.count("alice").await.unwrap(), 1);
    assert_eq!(store.count("bob").await.unwrap(), 1);
}

#[tokio::test]
async fn random_on_empty_store_replies_no_saved_pages() {
    let inner: Arc<dyn ItemStore> = Arc::new(setup_store().await);
    let store = RecordingStore::new(inner);
    let source = RecordingSource::default();
    let router = router(&source, Arc::new(store.clone()));

    router.process(message("/rnd", "bob")).await.unwrap();

    let sent = source.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, MSG_NO_SAVED_PAGES);
    assert_eq!(store.calls().await, vec!["pick_random bob".to_string()]);
}

#[tokio::test]
async fn random_sends_then_removes_the_picked_page() {
    let inner = Arc::new(setup_store().await);
    let page = Item::new("https://example.com/a", "alice");
    inner.save(&page).await.unwrap();
    let store = RecordingStore::new(inner.clone());
    let source = RecordingSource::default();
    let router = router(&source, Arc::new(store.clone()));

    router.process(message("/rnd", "alice")).await.unwrap();

    let sent = source.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "https://example.com/a");
    assert_eq!(
        store.calls().await,
        vec![
            "pick_random alice".to_string(),
            "remove https://example.com/a".to_string()
        ]
    );
    assert!(!inner.exists(&page).await.unwrap());
}

#[tokio::test]
async fn random_keeps_the_page_when_the_reply_fails() {
    let inner = Arc::new(setup_store().await);
    let page = Item::new("https://example.com/a", "alice");
    inner.save(&page).await.unwrap();
    let source = RecordingSource::failing();
    let router = router(&source, inner.clone());

    let err = router.process(message("/rnd", "alice")).await.unwrap_err();

    assert!(matches!(err, ProcessError::Transport { .. }));
    assert!(inner.exists(&page).await.unwrap());
}

#[tokio::test]
async fn storage_failure_suppresses_the_reply() {
    let inner: Arc<dyn ItemStore> = Arc::new(setup_store().await);
    let mut store = RecordingStore::new(inner);
    store.fail = true;
    let source = RecordingSource::default();
    let router = router(&source, Arc::new(store));

    let err = router
        .process(message("https://example.com/a", "alice"))
        .await
        .unwrap_err();

    match err {
        ProcessError::Storage { op, .. } => assert_eq!(op, "do cmd save page"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(source.sent().await.is_empty());
}

#[tokio::test]
async fn help_start_and_unknown_commands() {
    let store = Arc::new(setup_store().await);
    let source = RecordingSource::default();
    let router = router(&source, store);

    router.process(message("/help", "alice")).await.unwrap();
    router.process(message("/start", "alice")).await.unwrap();
    router.process(message("hello there", "alice")).await.unwrap();

    let sent = source.sent().await;
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].text, MSG_HELP);
    assert_eq!(sent[0].keyboard, None);
    assert_eq!(sent[1].text, format!("{MSG_HELLO}{MSG_HELP}"));
    assert!(sent[1].keyboard.is_some());
    assert_eq!(sent[2].text, MSG_UNKNOWN_COMMAND);
}

#[tokio::test]
async fn callback_sets_state_and_answers() {
    let store = Arc::new(setup_store().await);
    let source = RecordingSource::default();
    let state = Arc::new(RecordingState::default());
    let router = CommandRouter::new(Arc::new(source.clone()), store, state.clone());

    router
        .process(Event::CallbackQuery {
            text: "ack".into(),
            meta: RoutingMeta {
                chat_id: 42,
                username: "alice".into(),
            },
            callback_id: "cb1".into(),
        })
        .await
        .unwrap();

    assert_eq!(
        *state.sets.lock().await,
        vec![("42".to_string(), "waiting_for_input".to_string())]
    );
    assert_eq!(
        source.answers().await,
        vec![("cb1".to_string(), "ack".to_string())]
    );
    assert!(source.sent().await.is_empty());
}

#[tokio::test]
async fn unknown_event_is_rejected_without_side_effects() {
    let inner: Arc<dyn ItemStore> = Arc::new(setup_store().await);
    let store = RecordingStore::new(inner);
    let source = RecordingSource::default();
    let state = Arc::new(RecordingState::default());
    let router = CommandRouter::new(
        Arc::new(source.clone()),
        Arc::new(store.clone()),
        state.clone(),
    );

    let err = router
        .process(Event::Unknown { update_id: 9 })
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::UnknownEventType));
    assert!(store.calls().await.is_empty());
    assert!(state.sets.lock().await.is_empty());
    assert!(source.sent().await.is_empty());
    assert!(source.answers().await.is_empty());
}
