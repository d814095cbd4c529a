//! Single-threaded consumer loop.
//!
//! Each pass polls once with a short timeout and handles at most one message:
//!
//! * empty poll: keep polling,
//! * undecodable payload: log and skip, offset not committed,
//! * probe message: commit without calling the handler,
//! * handler success: commit,
//! * retryable handler failure: rewind so the next pass redelivers it,
//! * permanent handler failure: log and skip, offset not committed.
//!
//! Cancellation is observed between messages, never inside the handler.
//! Only fatal transport errors end the loop with an error.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::{CompletionMessage, MessageSource, ReceivedMessage, TransportError};
use crate::error::AppError;
use crate::metrics;

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Applies a decoded completion message. Must be idempotent: the same message
/// can be delivered more than once.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn handle(&self, message: &CompletionMessage) -> Result<(), AppError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberStats {
    /// Messages handled and committed, probes included.
    pub handled: u64,
    /// Malformed messages and permanent handler failures.
    pub skipped: u64,
    /// Retryable handler failures left for redelivery.
    pub failed: u64,
}

enum Outcome {
    Committed,
    Skipped,
    Retry,
}

pub struct Subscriber<S> {
    source: S,
    handler: Arc<dyn CompletionHandler>,
    poll_timeout: Duration,
    retry_backoff: Duration,
    stats: SubscriberStats,
}

impl<S: MessageSource> Subscriber<S> {
    pub fn new(source: S, handler: Arc<dyn CompletionHandler>) -> Self {
        Self {
            source,
            handler,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            stats: SubscriberStats::default(),
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    /// Runs until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SubscriberStats, TransportError> {
        info!("Completion subscriber started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                polled = self.source.poll(self.poll_timeout) => polled,
            };

            let received = match polled {
                Ok(Some(received)) => received,
                Ok(None) => continue,
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Subscriber stopping on fatal transport error");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "Unable to read message from consumer");
                    continue;
                }
            };

            match self.process(&received).await? {
                Outcome::Committed => self.stats.handled += 1,
                Outcome::Skipped => self.stats.skipped += 1,
                Outcome::Retry => {
                    self.stats.failed += 1;
                    tokio::select! {
                        biased;
                        _ = cancelled(&mut shutdown) => break,
                        _ = tokio::time::sleep(self.retry_backoff) => {}
                    }
                }
            }
        }

        info!(
            handled = self.stats.handled,
            skipped = self.stats.skipped,
            failed = self.stats.failed,
            "Completion subscriber stopped"
        );
        Ok(self.stats)
    }

    async fn process(&mut self, received: &ReceivedMessage) -> Result<Outcome, TransportError> {
        let message = match received
            .payload
            .as_deref()
            .map(CompletionMessage::from_payload)
        {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                warn!(
                    partition = received.partition,
                    offset = received.offset,
                    error = %e,
                    "Skipping malformed completion message"
                );
                return Ok(Outcome::Skipped);
            }
            None => {
                warn!(
                    partition = received.partition,
                    offset = received.offset,
                    "Skipping completion message without payload"
                );
                return Ok(Outcome::Skipped);
            }
        };

        if message.is_probe() {
            debug!(offset = received.offset, "Consumed health probe");
            self.commit(received).await?;
            return Ok(Outcome::Committed);
        }

        match self.handler.handle(&message).await {
            Ok(()) => {
                self.commit(received).await?;
                metrics::record_processed();
                info!(transaction_id = %message.id, offset = received.offset, "Transaction completed");
                Ok(Outcome::Committed)
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    transaction_id = %message.id,
                    error = %e,
                    "Unable to handle message, leaving it for redelivery"
                );
                if let Err(rewind) = self.source.rewind(received).await {
                    if rewind.is_fatal() {
                        return Err(rewind);
                    }
                    warn!(error = %rewind, "Unable to rewind consumer");
                }
                Ok(Outcome::Retry)
            }
            Err(e) => {
                warn!(transaction_id = %message.id, error = %e, "Discarding unprocessable message");
                Ok(Outcome::Skipped)
            }
        }
    }

    async fn commit(&mut self, received: &ReceivedMessage) -> Result<(), TransportError> {
        match self.source.commit(received).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(offset = received.offset, error = %e, "Unable to commit message");
                Ok(())
            }
        }
    }
}

impl<S: MessageSource + 'static> Subscriber<S> {
    /// Runs the loop on its own task.
    pub fn spawn(self) -> SubscriberHandle {
        let (shutdown, cancel) = watch::channel(false);
        let (exited_tx, exited) = watch::channel(false);
        let task = tokio::spawn(async move {
            let result = self.run(cancel).await;
            let _ = exited_tx.send(true);
            result
        });
        SubscriberHandle {
            shutdown,
            exited,
            task,
        }
    }
}

/// A spawned subscriber. Stopping it is explicit; an exit on its own, such
/// as a fatal transport error or a panic, is observable through `exited`.
pub struct SubscriberHandle {
    shutdown: watch::Sender<bool>,
    exited: watch::Receiver<bool>,
    task: JoinHandle<Result<SubscriberStats, TransportError>>,
}

impl SubscriberHandle {
    /// Resolves once the loop has returned, whatever the reason.
    pub fn exited(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut exited = self.exited.clone();
        async move {
            // A dropped sender means the task panicked.
            let _ = exited.wait_for(|done| *done).await;
        }
    }

    /// Requests cancellation and waits for the loop to return.
    pub async fn stop(self) -> Result<Result<SubscriberStats, TransportError>, JoinError> {
        let _ = self.shutdown.send(true);
        self.task.await
    }
}

async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also means stop.
    let _ = shutdown.wait_for(|stop| *stop).await;
}
