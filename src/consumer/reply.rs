//! HTTP replies to the brain.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::error_handling::{
    get_retry_strategy, update_reply_stats, ErrorType, ProcessingStats, ReplyError,
};
use crate::models::TaskRequest;

/// PUTs finished task requests to `{brain_url}{reply_to}` with basic auth.
#[derive(Debug, Clone)]
pub struct Replier {
    client: Arc<reqwest::Client>,
    brain_url: String,
    user: String,
    pass: String,
    retry_schedule: Vec<Duration>,
}

impl Replier {
    pub fn new(
        client: Arc<reqwest::Client>,
        brain_url: impl Into<String>,
        user: impl Into<String>,
        pass: impl Into<String>,
    ) -> Self {
        Self {
            client,
            brain_url: brain_url.into(),
            user: user.into(),
            pass: pass.into(),
            retry_schedule: get_retry_strategy().collect(),
        }
    }

    /// Replaces the delays between reply attempts.
    pub fn with_retry_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.retry_schedule = schedule;
        self
    }

    pub fn reply_url(&self, reply_to: &str) -> String {
        if self.brain_url.ends_with('/') && reply_to.starts_with('/') {
            format!("{}{}", self.brain_url.trim_end_matches('/'), reply_to)
        } else {
            format!("{}{}", self.brain_url, reply_to)
        }
    }

    /// Sends the reply, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last `ReplyError` once every attempt has failed.
    pub async fn reply(
        &self,
        reply_to: &str,
        task: &TaskRequest,
        stats: &ProcessingStats,
    ) -> Result<(), ReplyError> {
        let url = self.reply_url(reply_to);
        let body = serde_json::to_vec(task)?;
        info!("Replying task {} to {}", task.task_label(), url);

        let (url, body) = (url.as_str(), body.as_slice());
        let result = tokio_retry::Retry::start(self.retry_schedule.clone(), || async move {
            let attempt = self.put_once(url, body).await;
            if let Err(e) = &attempt {
                warn!("Reply to {} failed: {}", url, e);
                update_reply_stats(stats, e);
            }
            attempt
        })
        .await;

        match result {
            Ok(()) => {
                info!("Successfully replied task {} to {}", task.task_label(), url);
                Ok(())
            }
            Err(e) => {
                stats.increment_error(ErrorType::ReplyExhausted);
                Err(e)
            }
        }
    }

    async fn put_once(&self, url: &str, body: &[u8]) -> Result<(), ReplyError> {
        let response = self
            .client
            .put(url)
            .basic_auth(&self.user, Some(&self.pass))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(ReplyError::Status(status));
        }
        Ok(())
    }
}
