//! Fetch, fan out, drain, repeat.
//!
//! Each batch returned by the [`Fetcher`] is processed by at most `concurrency`
//! tokio tasks at a time, and the next fetch only starts once every task of the
//! current batch has finished. Handler failures are logged and collected into a
//! [`BatchReport`]; they never stop the loop.
use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::model::Event;
use crate::telegram::TransportError;
use async_trait::async_trait;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

#[async_trait]
pub trait Processor: Send + Sync + 'static {
    type Error: fmt::Display + fmt::Debug + Send + 'static;

    async fn process(&self, event: Event) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("worker pool closed")]
    PoolClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub batch_size: u8,
    pub concurrency: usize,
    pub idle_backoff: Duration,
    pub error_backoff: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            concurrency: 5,
            idle_backoff: Duration::from_secs(1),
            error_backoff: Duration::ZERO,
        }
    }
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            batch_size: cfg.app.batch_size,
            concurrency: cfg.app.concurrency,
            idle_backoff: cfg.app.idle_backoff(),
            error_backoff: cfg.app.error_backoff(),
        }
    }
}

#[derive(Debug)]
pub enum FailureReason<E> {
    Error(E),
    Panicked(String),
}

/// A handler unit that did not complete successfully.
#[derive(Debug)]
pub struct HandlerFailure<E> {
    /// Position of the event in its batch.
    pub index: usize,
    pub reason: FailureReason<E>,
}

#[derive(Debug)]
pub struct BatchReport<E> {
    pub dispatched: usize,
    pub failed: Vec<HandlerFailure<E>>,
}

impl<E> BatchReport<E> {
    pub fn succeeded(&self) -> usize {
        self.dispatched - self.failed.len()
    }
}

/// Outcome of one loop iteration.
#[derive(Debug)]
pub enum Tick<E> {
    FetchFailed(TransportError),
    Idle,
    Drained(BatchReport<E>),
}

pub struct Consumer<F, P> {
    fetcher: F,
    processor: Arc<P>,
    settings: Settings,
    pool: Arc<Semaphore>,
}

impl<F, P> Consumer<F, P>
where
    F: Fetcher,
    P: Processor,
{
    pub fn new(fetcher: F, processor: Arc<P>, settings: Settings) -> Self {
        let pool = Arc::new(Semaphore::new(settings.concurrency));
        Self {
            fetcher,
            processor,
            settings,
            pool,
        }
    }

    /// Runs until the worker pool is closed, which only happens on a bug.
    pub async fn start(mut self) -> Result<Infallible, ConsumerError> {
        info!(
            batch_size = self.settings.batch_size,
            concurrency = self.settings.concurrency,
            "consumer started"
        );
        loop {
            match self.tick().await? {
                Tick::FetchFailed(err) => {
                    error!(?err, "consumer: can't fetch events");
                    if !self.settings.error_backoff.is_zero() {
                        tokio::time::sleep(self.settings.error_backoff).await;
                    }
                }
                Tick::Idle => tokio::time::sleep(self.settings.idle_backoff).await,
                Tick::Drained(report) if report.failed.is_empty() => {
                    debug!(dispatched = report.dispatched, "batch drained");
                }
                Tick::Drained(report) => {
                    warn!(
                        dispatched = report.dispatched,
                        failed = report.failed.len(),
                        "batch drained with failures"
                    );
                }
            }
        }
    }

    /// One fetch and, if it produced events, one fully drained batch.
    pub async fn tick(&mut self) -> Result<Tick<P::Error>, ConsumerError> {
        let events = match self.fetcher.fetch(self.settings.batch_size).await {
            Ok(events) => events,
            Err(err) => return Ok(Tick::FetchFailed(err)),
        };
        if events.is_empty() {
            return Ok(Tick::Idle);
        }
        self.dispatch(events).await.map(Tick::Drained)
    }

    #[instrument(skip_all, fields(batch = events.len()))]
    pub async fn dispatch(&self, events: Vec<Event>) -> Result<BatchReport<P::Error>, ConsumerError> {
        let dispatched = events.len();
        let mut handles = Vec::with_capacity(dispatched);

        for event in events {
            let permit = self
                .pool
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| ConsumerError::PoolClosed)?;
            let processor = self.processor.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                info!(kind = event.kind(), text = event.text(), "got new event");
                let res = processor.process(event).await;
                if let Err(err) = &res {
                    warn!(%err, "can't handle event");
                }
                res
            }));
        }

        let mut failed = Vec::new();
        for (index, handle) in handles.into_iter().enumerate() {
            let reason = match handle.await {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => FailureReason::Error(err),
                Err(join_err) => {
                    error!(?join_err, index, "event handler aborted");
                    FailureReason::Panicked(join_err.to_string())
                }
            };
            failed.push(HandlerFailure { index, reason });
        }

        Ok(BatchReport { dispatched, failed })
    }
}
