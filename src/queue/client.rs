//! Producer side of the broker: publishes task requests through the pool.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use super::pool::ConnectionPool;
use super::OutgoingMessage;
use crate::config::PUBLISH_BASE_DELAY_MS;
use crate::error_handling::{publish_backoff, QueueError};

/// Result of [`QueueClient::send`], serialized as `{success, error, data}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub data: Option<Value>,
}

impl SendOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
        }
    }

    fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            data: None,
        }
    }
}

/// Publishes JSON messages to durable queues.
///
/// Failed publishes are retried on a fresh connection with a 1.5× geometric
/// backoff; the connection that failed is closed rather than returned.
#[derive(Clone)]
pub struct QueueClient {
    pool: Arc<ConnectionPool>,
    base_delay: Duration,
}

impl QueueClient {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            base_delay: Duration::from_millis(PUBLISH_BASE_DELAY_MS),
        }
    }

    /// Overrides the first retry delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Publishes `payload` to `queue`. Never fails; errors land in the outcome.
    pub async fn send(
        &self,
        queue: &str,
        reply_to: &str,
        correlation_id: &str,
        payload: &Value,
    ) -> SendOutcome {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => return SendOutcome::failed(e),
        };
        let message = OutgoingMessage {
            payload: body,
            reply_to: reply_to.to_string(),
            correlation_id: correlation_id.to_string(),
        };

        let message = &message;
        let result = tokio_retry::Retry::start(publish_backoff(self.base_delay), || {
            self.publish_once(queue, message)
        })
        .await;

        match result {
            Ok(()) => {
                debug!("Published {} ({}) to {}", correlation_id, reply_to, queue);
                SendOutcome::ok()
            }
            Err(e) => {
                warn!("Giving up publishing {} to {}: {}", correlation_id, queue, e);
                SendOutcome::failed(e)
            }
        }
    }

    async fn publish_once(&self, queue: &str, message: &OutgoingMessage) -> Result<(), QueueError> {
        let mut conn = self.pool.get_connection().await?;
        let published = match conn.ensure_queue(queue).await {
            Ok(()) => conn.session.publish(queue, message).await,
            Err(e) => Err(e),
        };
        match published {
            Ok(()) => {
                self.pool.return_connection(conn).await;
                Ok(())
            }
            Err(e) => {
                warn!("Publish to {} failed, discarding connection: {}", queue, e);
                self.pool.discard(conn).await;
                Err(e)
            }
        }
    }
}
