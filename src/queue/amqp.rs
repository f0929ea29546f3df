//! AMQP 0-9-1 implementation of the broker traits.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use log::{debug, info};

use super::{
    Acknowledger, BrokerConnector, BrokerSession, Delivery, DeliveryStream, OutgoingMessage,
};
use crate::error_handling::QueueError;

/// Persistent delivery mode.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Connects to an AMQP broker by URI.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    uri: String,
}

impl AmqpConnector {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, QueueError> {
        let properties = ConnectionProperties::default().with_connection_name("sso_landscape".into());
        let connection = Connection::connect(&self.uri, properties)
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        debug!("Opened broker channel {}", channel.id());
        Ok(Box::new(AmqpSession {
            connection,
            channel,
        }))
    }
}

struct AmqpSession {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl BrokerSession for AmqpSession {
    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), QueueError> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish(&self, queue: &str, message: &OutgoingMessage) -> Result<(), QueueError> {
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_reply_to(message.reply_to.as_str().into())
            .with_correlation_id(message.correlation_id.as_str().into());
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &message.payload,
                properties,
            )
            .await?
            .await?;
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), QueueError> {
        self.channel
            .basic_qos(count, BasicQosOptions::default())
            .await?;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, QueueError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!("Consuming from {} as {}", queue, consumer_tag);
        let stream = consumer.map(|delivery| -> Result<Delivery, QueueError> {
            let delivery = delivery?;
            Ok(Delivery {
                reply_to: delivery
                    .properties
                    .reply_to()
                    .as_ref()
                    .map(|s| s.as_str().to_string()),
                correlation_id: delivery
                    .properties
                    .correlation_id()
                    .as_ref()
                    .map(|s| s.as_str().to_string()),
                body: delivery.data,
                acker: Box::new(AmqpAcker(delivery.acker)),
            })
        });
        Ok(Box::pin(stream))
    }

    async fn close(&self) {
        if let Err(e) = self.connection.close(200, "OK").await {
            debug!("Closing broker connection failed: {}", e);
        }
    }
}

struct AmqpAcker(Acker);

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> Result<(), QueueError> {
        self.0.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<(), QueueError> {
        self.0.reject(BasicRejectOptions { requeue }).await?;
        Ok(())
    }
}
