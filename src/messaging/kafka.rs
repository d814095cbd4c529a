//! Kafka transport for completion messages.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{CompletionMessage, MessagePublisher, MessageSource, ReceivedMessage, TransportError};
use crate::config::KafkaConfig;

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

impl From<KafkaError> for TransportError {
    fn from(err: KafkaError) -> Self {
        match &err {
            KafkaError::ClientCreation(_) | KafkaError::Subscription(_) => {
                TransportError::Fatal(err.to_string())
            }
            _ if err.rdkafka_error_code() == Some(RDKafkaErrorCode::Fatal) => {
                TransportError::Fatal(err.to_string())
            }
            _ => TransportError::Transient(err.to_string()),
        }
    }
}

/// Keyed producer for the completion topic. Cloning shares the underlying
/// client, which is safe for concurrent use.
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
}

fn producer_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &config.brokers)
        .set("client.id", &config.client_id)
        .set("acks", "all")
        .set("enable.idempotence", "true")
        .set("retries", "5")
        .set("retry.backoff.ms", "500")
        .set("linger.ms", "10")
        .set("compression.type", "snappy")
        .set("message.timeout.ms", "30000");
    client
}

fn consumer_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", &config.group_id)
        .set("client.id", &config.client_id)
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false")
        .set("max.poll.interval.ms", "300000")
        .set("session.timeout.ms", "45000");
    client
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self, TransportError> {
        let producer: FutureProducer = producer_config(config).create()?;

        info!(topic = %config.topic, "Kafka producer created");
        Ok(Self {
            producer,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl MessagePublisher for KafkaPublisher {
    async fn publish(&self, message: &CompletionMessage) -> Result<(), TransportError> {
        let payload = message.to_payload()?;
        let key = message.key();
        let record = FutureRecord::to(&self.topic)
            .key(key.as_str())
            .payload(payload.as_slice())
            .headers(OwnedHeaders::new().insert(Header {
                key: "version",
                value: Some("1"),
            }));

        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| TransportError::from(e))?;

        let transaction_id = message.id;
        tokio::spawn(async move {
            match delivery.await {
                Ok(Ok((partition, offset))) => {
                    debug!(%transaction_id, partition, offset, "Completion message delivered");
                }
                Ok(Err((e, _))) => {
                    error!(%transaction_id, error = %e, "Delivery to the queue failed");
                }
                Err(_) => {
                    warn!(%transaction_id, "Delivery report dropped before completion");
                }
            }
        });

        Ok(())
    }

    async fn close(&self, drain_timeout: Duration) -> Result<(), TransportError> {
        let producer = self.producer.clone();
        let flushed = tokio::task::spawn_blocking(move || {
            producer.flush(Timeout::After(drain_timeout))
        })
        .await
        .map_err(|e| TransportError::Transient(e.to_string()))?;

        if let Err(e) = flushed {
            warn!(
                in_flight = self.producer.in_flight_count(),
                error = %e,
                "Producer did not drain before timeout"
            );
            return Err(e.into());
        }
        Ok(())
    }
}

/// Consumer-group member with manual commits, starting from the earliest
/// offset when the group has none.
pub struct KafkaMessageSource {
    consumer: StreamConsumer,
}

impl KafkaMessageSource {
    pub fn new(config: &KafkaConfig) -> Result<Self, TransportError> {
        let consumer: StreamConsumer = consumer_config(config).create()?;

        consumer.subscribe(&[config.topic.as_str()])?;
        info!(topic = %config.topic, group = %config.group_id, "Kafka consumer subscribed");

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<ReceivedMessage>, TransportError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(message)) => Ok(Some(ReceivedMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(<[u8]>::to_vec),
                payload: message.payload().map(<[u8]>::to_vec),
            })),
        }
    }

    async fn commit(&mut self, message: &ReceivedMessage) -> Result<(), TransportError> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )?;
        // Enqueue only; a sync commit would block the runtime worker.
        self.consumer.commit(&offsets, CommitMode::Async)?;
        Ok(())
    }

    async fn rewind(&mut self, message: &ReceivedMessage) -> Result<(), TransportError> {
        self.consumer.seek(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset),
            SEEK_TIMEOUT,
        )?;
        Ok(())
    }
}
