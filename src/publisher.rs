// ABOUTME: Stream Publisher - sends framed messages to Kafka in order
// ABOUTME: Each send is awaited so delivery is acknowledged before the offset may advance

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};

use crate::chunker::StreamMessage;
use crate::config::KafkaConfig;
use crate::error::ReplicateError;

/// Sends a batch of messages to the external stream.
///
/// Sends are in order and block until the configured acknowledgment level.
/// A failure means "unknown delivery state for this batch": some prefix of
/// the messages may have been delivered, so callers must not commit an offset
/// advance for it. Delivery is at-least-once; downstream consumers must
/// deduplicate by `schema_id` + `part_number` or be idempotent.
#[async_trait]
pub trait StreamPublisher: Send + Sync {
    async fn publish(
        &self,
        table: &str,
        messages: Vec<StreamMessage>,
    ) -> Result<(), ReplicateError>;
}

/// Kafka publisher over a single topic, keyed by table name so per-table
/// ordering is preserved by the broker.
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
    delivery_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set("acks", config.acks.as_str())
            .set("compression.type", config.compression.as_str())
            .set("batch.num.messages", config.batch_size.to_string())
            .set("batch.size", config.batch_bytes.to_string())
            .set("message.send.max.retries", config.max_attempts.to_string())
            .set(
                "message.timeout.ms",
                (config.message_timeout_secs * 1000).to_string(),
            )
            .create()
            .context("Failed to create Kafka producer")?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            delivery_timeout: Duration::from_secs(config.message_timeout_secs),
        })
    }
}

#[async_trait]
impl StreamPublisher for KafkaPublisher {
    async fn publish(
        &self,
        table: &str,
        messages: Vec<StreamMessage>,
    ) -> Result<(), ReplicateError> {
        let count = messages.len();
        for message in messages {
            let key = message.key.unwrap_or_else(|| table.to_string());
            let mut record = FutureRecord::to(&self.topic)
                .key(&key)
                .payload(message.payload.as_slice());

            if !message.headers.is_empty() {
                let mut headers = OwnedHeaders::new();
                for (name, value) in &message.headers {
                    headers = headers.insert(Header {
                        key: name,
                        value: Some(value.as_bytes()),
                    });
                }
                record = record.headers(headers);
            }

            self.producer
                .send(record, self.delivery_timeout)
                .await
                .map_err(|(err, _)| {
                    ReplicateError::Publish(format!("{} (topic {}, key {})", err, self.topic, key))
                })?;
        }

        tracing::debug!(
            "Delivered {} messages for table {} to topic {}",
            count,
            table,
            self.topic
        );
        Ok(())
    }
}
