//! Message broker access.
//!
//! This module provides:
//! - Broker traits ([`BrokerConnector`], [`BrokerSession`], [`Acknowledger`])
//! - The AMQP implementation on top of `lapin`
//! - A bounded connection pool with background maintenance
//! - [`QueueClient`], the producer used to publish task requests
//!
//! The consumer and the producer only see the traits, so tests drive both
//! against an in-memory broker.

mod amqp;
mod client;
mod pool;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error_handling::QueueError;

pub use amqp::AmqpConnector;
pub use client::{QueueClient, SendOutcome};
pub use pool::{ConnectionPool, PoolSettings, PooledConnection};

/// A message to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub payload: Vec<u8>,
    pub reply_to: String,
    pub correlation_id: String,
}

/// Acknowledges or rejects one delivery.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), QueueError>;

    async fn reject(&self, requeue: bool) -> Result<(), QueueError>;
}

/// One message received from a queue.
pub struct Delivery {
    pub body: Vec<u8>,
    pub reply_to: Option<String>,
    pub correlation_id: Option<String>,
    pub acker: Box<dyn Acknowledger>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("body_len", &self.body.len())
            .field("reply_to", &self.reply_to)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

/// Deliveries of one consumer; ends when the channel closes.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, QueueError>> + Send>>;

/// An open connection with one channel.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    fn is_open(&self) -> bool;

    /// Declares a durable queue.
    async fn declare_queue(&self, queue: &str) -> Result<(), QueueError>;

    /// Publishes a persistent JSON message to `queue` on the default exchange.
    async fn publish(&self, queue: &str, message: &OutgoingMessage) -> Result<(), QueueError>;

    async fn set_prefetch(&self, count: u16) -> Result<(), QueueError>;

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, QueueError>;

    async fn close(&self);
}

/// Opens broker sessions.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, QueueError>;
}
