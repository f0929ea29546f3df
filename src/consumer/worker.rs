//! Per-delivery task processing.
//!
//! A worker owns one delivery body from parse to reply. It never touches the
//! broker: the outcome goes back to the supervisor, which acks or rejects.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use serde_json::Value;

use super::reply::Replier;
use crate::config::PROCESS_TIMEOUT_MESSAGE;
use crate::error_handling::{ErrorType, ProcessingStats, ReplyError};
use crate::executor::TaskExecutor;
use crate::models::{AnalysisKind, AnalysisOutcome, TaskRequest};

/// Runs one analysis; implemented by [`TaskExecutor`].
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, kind: AnalysisKind, domain: &str, config: Value) -> AnalysisOutcome;
}

#[async_trait]
impl TaskRunner for TaskExecutor {
    async fn run(&self, kind: AnalysisKind, domain: &str, config: Value) -> AnalysisOutcome {
        self.execute(kind, domain, config).await
    }
}

/// Shared state of every worker of one consumer.
pub struct WorkerContext {
    pub kind: AnalysisKind,
    pub runner: Arc<dyn TaskRunner>,
    pub replier: Replier,
    pub stats: Arc<ProcessingStats>,
}

/// A delivery handed to a worker.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: u64,
    pub body: Vec<u8>,
    pub reply_to: Option<String>,
}

/// What the supervisor must do with the delivery.
#[derive(Debug)]
pub enum WorkOutcome {
    /// Reply delivered; ack.
    Replied,
    /// No `reply_to` on the message; ack.
    NoReply,
    /// Body is not a task request; reject without requeue.
    InvalidPayload(String),
    /// Reply failed after retries; leave unacked.
    ReplyFailed(ReplyError),
}

#[derive(Debug)]
pub struct WorkReport {
    pub id: u64,
    pub outcome: WorkOutcome,
}

/// Parses, executes, stamps, and replies one task.
pub async fn process_task(ctx: &WorkerContext, item: WorkItem) -> WorkOutcome {
    let mut task = match TaskRequest::from_slice(&item.body) {
        Ok(task) => task,
        Err(e) => {
            warn!("Rejecting delivery {}: invalid task payload: {}", item.id, e);
            ctx.stats.increment_error(ErrorType::InvalidTaskPayload);
            return WorkOutcome::InvalidPayload(e.to_string());
        }
    };

    info!("Executing task {} for {}", task.task_label(), task.domain);
    task.mark_request_received();

    let config = task.analysis_config(ctx.kind);
    let outcome = ctx.runner.run(ctx.kind, &task.domain, config).await;
    if let AnalysisOutcome::Failed(failure) = &outcome {
        if failure.exception == PROCESS_TIMEOUT_MESSAGE {
            ctx.stats.increment_error(ErrorType::TaskTimeout);
        } else {
            ctx.stats.increment_error(ErrorType::TaskException);
        }
    }
    task.set_result(ctx.kind, outcome.into_value());
    task.mark_response_sent();

    match item.reply_to.as_deref().filter(|r| !r.is_empty()) {
        None => {
            info!("Task {} has no reply_to, acknowledging without reply", task.task_label());
            WorkOutcome::NoReply
        }
        Some(reply_to) => match ctx.replier.reply(reply_to, &task, &ctx.stats).await {
            Ok(()) => WorkOutcome::Replied,
            Err(e) => {
                error!("Giving up replying task {} to {}: {}", task.task_label(), reply_to, e);
                WorkOutcome::ReplyFailed(e)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct RecordingRunner {
        outcome: AnalysisOutcome,
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl TaskRunner for RecordingRunner {
        async fn run(&self, _kind: AnalysisKind, domain: &str, config: Value) -> AnalysisOutcome {
            self.calls.lock().unwrap().push((domain.to_string(), config));
            self.outcome.clone()
        }
    }

    fn context(server: &MockServer, outcome: AnalysisOutcome) -> (WorkerContext, Arc<RecordingRunner>) {
        let runner = Arc::new(RecordingRunner {
            outcome,
            calls: Mutex::new(Vec::new()),
        });
        let ctx = WorkerContext {
            kind: AnalysisKind::LandscapeAnalysis,
            runner: runner.clone(),
            replier: Replier::new(Arc::new(reqwest::Client::new()), server.uri(), "u", "p")
                .with_retry_schedule(vec![Duration::from_millis(1)]),
            stats: Arc::new(ProcessingStats::new()),
        };
        (ctx, runner)
    }

    fn item(body: &str, reply_to: Option<&str>) -> WorkItem {
        WorkItem {
            id: 1,
            body: body.as_bytes().to_vec(),
            reply_to: reply_to.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_is_rejected_without_running() {
        let server = MockServer::start().await;
        let (ctx, runner) = context(&server, AnalysisOutcome::Completed(json!({})));
        let outcome = process_task(&ctx, item("{not json", Some("/r"))).await;
        assert!(matches!(outcome, WorkOutcome::InvalidPayload(_)));
        assert!(runner.calls.lock().unwrap().is_empty());
        assert_eq!(ctx.stats.get_error_count(ErrorType::InvalidTaskPayload), 1);
    }

    #[tokio::test]
    async fn test_reply_carries_result_and_stamps() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let (ctx, runner) = context(&server, AnalysisOutcome::Completed(json!({"timings": {}})));
        let body = r#"{"domain":"a.b","task_config":{"task_state":"REQUEST_SENT"},"landscape_analysis_config":{"x":1}}"#;

        let outcome = process_task(&ctx, item(body, Some("/api/reply"))).await;
        assert!(matches!(outcome, WorkOutcome::Replied));
        assert_eq!(runner.calls.lock().unwrap()[0], ("a.b".to_string(), json!({"x": 1})));

        let requests = server.received_requests().await.unwrap();
        let reply: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(reply["landscape_analysis_result"], json!({"timings": {}}));
        assert_eq!(reply["task_config"]["task_state"], "RESPONSE_SENT");
        assert!(reply["task_config"]["task_timestamp_request_received"].is_f64());
    }

    #[tokio::test]
    async fn test_timeout_outcome_is_counted_and_replied() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let (ctx, _) = context(&server, AnalysisOutcome::exception(PROCESS_TIMEOUT_MESSAGE));
        let outcome = process_task(&ctx, item(r#"{"domain":"a.b"}"#, Some("/r"))).await;
        assert!(matches!(outcome, WorkOutcome::Replied));
        assert_eq!(ctx.stats.get_error_count(ErrorType::TaskTimeout), 1);

        let requests = server.received_requests().await.unwrap();
        let reply: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(reply["landscape_analysis_result"], json!({"exception": "Process timeout"}));
    }

    #[tokio::test]
    async fn test_empty_reply_to_skips_reply() {
        let server = MockServer::start().await;
        let (ctx, runner) = context(&server, AnalysisOutcome::Completed(json!({})));
        let outcome = process_task(&ctx, item(r#"{"domain":"a.b"}"#, Some(""))).await;
        assert!(matches!(outcome, WorkOutcome::NoReply));
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_reply_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let (ctx, _) = context(&server, AnalysisOutcome::Completed(json!({})));
        let outcome = process_task(&ctx, item(r#"{"domain":"a.b"}"#, Some("/r"))).await;
        assert!(matches!(outcome, WorkOutcome::ReplyFailed(ReplyError::Status(500))));
    }
}
