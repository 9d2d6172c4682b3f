use super::source::{MessageSource, PollEvent};
use crate::config::KafkaConfig;
use crate::dispatch::InboundMessage;
use crate::error::ConsumerError;
use async_trait::async_trait;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct KafkaMessageSource {
    consumer: StreamConsumer,
}

impl KafkaMessageSource {
    pub fn new(config: &KafkaConfig) -> Result<Self, ConsumerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "5000")
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("session.timeout.ms", "45000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(ConsumerError::Client)?;

        info!(
            brokers = %config.brokers,
            group_id = %config.group_id,
            "Kafka consumer created"
        );
        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn subscribe(&mut self, topics: &[String]) -> Result<Vec<String>, ConsumerError> {
        let refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer
            .subscribe(&refs)
            .map_err(|source| ConsumerError::Subscription {
                topics: topics.to_vec(),
                source,
            })?;

        match self.consumer.subscription() {
            Ok(list) => Ok(list
                .elements()
                .iter()
                .map(|elem| elem.topic().to_string())
                .collect()),
            Err(e) => {
                warn!(error = %e, "Could not read back subscription");
                Ok(topics.to_vec())
            }
        }
    }

    async fn poll(&mut self, timeout: Duration) -> Option<PollEvent> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => None,
            Ok(Ok(msg)) => Some(PollEvent::Message(InboundMessage {
                topic: msg.topic().to_string(),
                partition: msg.partition(),
                offset: msg.offset(),
                payload: msg.payload().map(<[u8]>::to_vec),
            })),
            Ok(Err(KafkaError::PartitionEOF(partition))) => {
                debug!(partition, "Reached end of partition");
                Some(PollEvent::Ignored)
            }
            Ok(Err(e)) => Some(PollEvent::BrokerError(e.to_string())),
        }
    }

    async fn close(&mut self) {
        self.consumer.unsubscribe();
        info!("Kafka consumer unsubscribed");
    }
}
