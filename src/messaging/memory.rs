//! In-process broker: a single-partition log implementing both the publisher
//! and the consumer side of the transport. Used by tests and local runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{CompletionMessage, MessagePublisher, MessageSource, ReceivedMessage, TransportError};

const WAIT_STEP: Duration = Duration::from_millis(5);
const WAIT_LIMIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct BrokerState {
    log: Vec<ReceivedMessage>,
    cursor: usize,
    committed: Vec<i64>,
    poll_failures: VecDeque<TransportError>,
    publish_failures: usize,
    publish_attempts: usize,
    held: bool,
    in_flight: Vec<ReceivedMessage>,
    lifecycle: Vec<LifecycleEvent>,
    closed: bool,
}

/// Shutdown-relevant events in the order they happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    SourceDropped,
    PublisherClosed,
}

#[derive(Clone)]
pub struct InMemoryBroker {
    topic: String,
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            state: Arc::new(Mutex::new(BrokerState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consumer handle reading from the start of the log.
    pub fn source(&self) -> InMemorySource {
        InMemorySource {
            broker: self.clone(),
        }
    }

    pub fn push_raw(&self, key: Option<&[u8]>, payload: &[u8]) {
        let message = self.record(key, payload);
        append(&mut self.state(), message);
    }

    fn record(&self, key: Option<&[u8]>, payload: &[u8]) -> ReceivedMessage {
        ReceivedMessage {
            topic: self.topic.clone(),
            partition: 0,
            offset: 0,
            key: key.map(<[u8]>::to_vec),
            payload: Some(payload.to_vec()),
        }
    }

    pub fn push_message(&self, message: &CompletionMessage) {
        let payload = serde_json::to_vec(message).unwrap_or_default();
        self.push_raw(Some(message.key().as_bytes()), &payload);
    }

    pub fn fail_next_publishes(&self, count: usize) {
        self.state().publish_failures = count;
    }

    pub fn fail_next_poll(&self, error: TransportError) {
        self.state().poll_failures.push_back(error);
    }

    /// Accepted publishes stay in flight until `release_deliveries`.
    pub fn hold_deliveries(&self) {
        self.state().held = true;
    }

    pub fn release_deliveries(&self) {
        let mut state = self.state();
        state.held = false;
        let pending = std::mem::take(&mut state.in_flight);
        for message in pending {
            append(&mut state, message);
        }
    }

    fn has_in_flight(&self) -> bool {
        !self.state().in_flight.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.state().in_flight.len()
    }

    pub fn lifecycle(&self) -> Vec<LifecycleEvent> {
        self.state().lifecycle.clone()
    }

    /// Messages accepted by `publish`, in order.
    pub fn published(&self) -> Vec<CompletionMessage> {
        self.state()
            .log
            .iter()
            .filter_map(|m| m.payload.as_deref())
            .filter_map(|p| CompletionMessage::from_payload(p).ok())
            .collect()
    }

    pub fn publish_attempts(&self) -> usize {
        self.state().publish_attempts
    }

    pub fn committed_offsets(&self) -> Vec<i64> {
        self.state().committed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Resolves once at least `count` commits happened.
    ///
    /// # Panics
    /// If that takes longer than five seconds.
    pub async fn wait_for_commits(&self, count: usize) {
        self.wait_until(|s| s.committed.len() >= count).await
    }

    /// Resolves once every message in the log has been handed to a consumer.
    ///
    /// # Panics
    /// If that takes longer than five seconds.
    pub async fn wait_until_drained(&self) {
        self.wait_until(|s| s.cursor >= s.log.len()).await
    }

    async fn wait_until(&self, done: impl Fn(&BrokerState) -> bool) {
        let waited = tokio::time::timeout(WAIT_LIMIT, async {
            while !done(&self.state()) {
                tokio::time::sleep(WAIT_STEP).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "in-memory broker condition not reached in time");
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBroker {
    async fn publish(&self, message: &CompletionMessage) -> Result<(), TransportError> {
        let payload = message.to_payload()?;
        {
            let mut state = self.state();
            state.publish_attempts += 1;
            if state.publish_failures > 0 {
                state.publish_failures -= 1;
                return Err(TransportError::Transient("broker unavailable".to_string()));
            }
        }
        let record = self.record(Some(message.key().as_bytes()), &payload);
        let mut state = self.state();
        if state.held {
            state.in_flight.push(record);
        } else {
            append(&mut state, record);
        }
        Ok(())
    }

    /// Waits up to `drain_timeout` for in-flight messages to be delivered.
    async fn close(&self, drain_timeout: Duration) -> Result<(), TransportError> {
        let drained = tokio::time::timeout(drain_timeout, async {
            while self.has_in_flight() {
                tokio::time::sleep(WAIT_STEP).await;
            }
        })
        .await;

        let mut state = self.state();
        state.closed = true;
        state.lifecycle.push(LifecycleEvent::PublisherClosed);
        if drained.is_err() {
            let in_flight = state.in_flight.len();
            tracing::warn!(in_flight, "In-memory publisher did not drain before timeout");
            return Err(TransportError::Transient(format!(
                "{} message(s) still in flight after {:?}",
                in_flight, drain_timeout
            )));
        }
        Ok(())
    }
}

fn append(state: &mut BrokerState, mut message: ReceivedMessage) {
    message.offset = state.log.len() as i64;
    state.log.push(message);
}

pub struct InMemorySource {
    broker: InMemoryBroker,
}

impl Drop for InMemorySource {
    fn drop(&mut self) {
        self.broker
            .state()
            .lifecycle
            .push(LifecycleEvent::SourceDropped);
    }
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<ReceivedMessage>, TransportError> {
        {
            let mut state = self.broker.state();
            if let Some(error) = state.poll_failures.pop_front() {
                return Err(error);
            }
            if state.cursor < state.log.len() {
                let message = state.log[state.cursor].clone();
                state.cursor += 1;
                return Ok(Some(message));
            }
        }
        tokio::time::sleep(timeout).await;
        Ok(None)
    }

    async fn commit(&mut self, message: &ReceivedMessage) -> Result<(), TransportError> {
        self.broker.state().committed.push(message.offset);
        Ok(())
    }

    async fn rewind(&mut self, message: &ReceivedMessage) -> Result<(), TransportError> {
        let mut state = self.broker.state();
        state.cursor = state.cursor.min(message.offset.max(0) as usize);
        Ok(())
    }
}
