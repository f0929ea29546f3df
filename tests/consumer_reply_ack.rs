//! Consumer Test Suite: Reply Before Ack
//!
//! **Purpose:** Verify that a delivery is acknowledged if and only if its reply
//! reached the brain, and that the consumer keeps serving the queue across
//! failures.
//!
//! **What We're Testing:**
//! 1. A successful reply is followed by exactly one ack
//! 2. A failed reply leaves the message unacked and the consumer reconnects
//! 3. Invalid payloads are rejected without requeue
//! 4. Messages without `reply_to` are acked without a reply
//! 5. A hung task times out, is replied as an exception, and the next task runs

mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use helpers::{wait_until, wait_until_for, MemoryBroker, MemoryConnector, Settlement};
use sso_landscape::config::AnalysisEnvironment;
use sso_landscape::consumer::{Consumer, Replier, TaskRunner, WorkerContext};
use sso_landscape::error_handling::{ErrorType, ProcessingStats};
use sso_landscape::executor::TaskExecutor;
use sso_landscape::{AnalysisKind, AnalysisOutcome};

const QUEUE: &str = "landscape_analysis_treq";

struct EchoRunner;

#[async_trait]
impl TaskRunner for EchoRunner {
    async fn run(&self, _kind: AnalysisKind, domain: &str, _config: Value) -> AnalysisOutcome {
        AnalysisOutcome::Completed(json!({"analyzed": domain}))
    }
}

struct Harness {
    broker: Arc<MemoryBroker>,
    stats: Arc<ProcessingStats>,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl Harness {
    async fn start(brain: &MockServer, runner: Arc<dyn TaskRunner>) -> Self {
        let broker = MemoryBroker::new();
        let stats = Arc::new(ProcessingStats::new());
        let ctx = Arc::new(WorkerContext {
            kind: AnalysisKind::LandscapeAnalysis,
            runner,
            replier: Replier::new(Arc::new(reqwest::Client::new()), brain.uri(), "admin", "changeme")
                .with_retry_schedule(vec![Duration::from_millis(5); 2]),
            stats: Arc::clone(&stats),
        });
        let cancel = CancellationToken::new();
        let consumer = Consumer::new(
            Arc::new(MemoryConnector(Arc::clone(&broker))),
            QUEUE,
            ctx,
            Arc::new(tokio::sync::Semaphore::new(2)),
            cancel.clone(),
        );
        let handle = tokio::spawn(async move { consumer.run().await });

        let attached = {
            let broker = Arc::clone(&broker);
            wait_until(move || broker.has_consumer()).await
        };
        assert!(attached, "consumer never attached to the queue");
        Self {
            broker,
            stats,
            cancel,
            handle,
        }
    }

    async fn settled(&self, tag: u64) -> Option<Settlement> {
        let broker = Arc::clone(&self.broker);
        wait_until(move || broker.settlement(tag).is_some()).await;
        self.broker.settlement(tag)
    }

    async fn stop(self) {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("consumer did not stop")
            .expect("consumer panicked");
    }
}

#[tokio::test]
async fn test_successful_reply_then_ack() {
    let brain = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/landscape/1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&brain)
        .await;
    let harness = Harness::start(&brain, Arc::new(EchoRunner)).await;

    let tag = harness
        .broker
        .push(r#"{"domain":"example.com","task_config":{"task_id":"1"}}"#, Some("/api/landscape/1"));
    assert_eq!(harness.settled(tag).await, Some(Settlement::Acked));

    let requests = brain.received_requests().await.unwrap();
    let reply: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(reply["landscape_analysis_result"], json!({"analyzed": "example.com"}));
    assert_eq!(reply["task_config"]["task_state"], "RESPONSE_SENT");
    assert_eq!(harness.broker.declared.lock().unwrap()[0], QUEUE);
    assert_eq!(harness.stats.acked(), 1);
    harness.stop().await;
}

#[tokio::test]
async fn test_failed_reply_leaves_message_unacked_and_reconnects() {
    let brain = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&brain)
        .await;
    let harness = Harness::start(&brain, Arc::new(EchoRunner)).await;
    assert_eq!(harness.broker.connects.load(Ordering::SeqCst), 1);

    let tag = harness.broker.push(r#"{"domain":"example.com"}"#, Some("/api/landscape/2"));

    let broker = Arc::clone(&harness.broker);
    // The first reconnect delay is jittered below two seconds.
    let reconnected = wait_until_for(Duration::from_secs(6), move || {
        broker.connects.load(Ordering::SeqCst) >= 2
    })
    .await;
    assert!(reconnected, "consumer did not reconnect after a failed reply");
    assert_eq!(harness.broker.settlement(tag), None);
    assert_eq!(harness.stats.acked(), 0);
    assert_eq!(harness.stats.get_error_count(ErrorType::ReplyExhausted), 1);
    harness.stop().await;
}

#[tokio::test]
async fn test_invalid_payload_is_rejected_without_requeue() {
    let brain = MockServer::start().await;
    let harness = Harness::start(&brain, Arc::new(EchoRunner)).await;

    let tag = harness.broker.push("this is not json", Some("/api/landscape/3"));
    assert_eq!(
        harness.settled(tag).await,
        Some(Settlement::Rejected { requeue: false })
    );
    assert!(brain.received_requests().await.unwrap().is_empty());
    assert_eq!(harness.stats.get_error_count(ErrorType::InvalidTaskPayload), 1);
    harness.stop().await;
}

#[tokio::test]
async fn test_missing_reply_to_is_acked_without_reply() {
    let brain = MockServer::start().await;
    let harness = Harness::start(&brain, Arc::new(EchoRunner)).await;

    let tag = harness.broker.push(r#"{"domain":"example.com"}"#, None);
    assert_eq!(harness.settled(tag).await, Some(Settlement::Acked));
    assert!(brain.received_requests().await.unwrap().is_empty());
    harness.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_hung_task_times_out_and_processing_continues() {
    let brain = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&brain)
        .await;

    // Reads the job, then hangs unless the domain says otherwise.
    let script = r#"job=$(cat); case "$job" in *fast.example*) echo '{"done":true}';; *) sleep 30;; esac"#;
    let executor = TaskExecutor::with_command(
        "/bin/sh",
        vec!["-c".to_string(), script.to_string()],
        Duration::from_millis(300),
        AnalysisEnvironment::default(),
    );
    let harness = Harness::start(&brain, Arc::new(executor)).await;

    let hung = harness.broker.push(r#"{"domain":"slow.example"}"#, Some("/api/landscape/4"));
    assert_eq!(harness.settled(hung).await, Some(Settlement::Acked));
    let fast = harness.broker.push(r#"{"domain":"fast.example"}"#, Some("/api/landscape/5"));
    assert_eq!(harness.settled(fast).await, Some(Settlement::Acked));

    let replies: Vec<Value> = brain
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(
        replies[0]["landscape_analysis_result"],
        json!({"exception": "Process timeout"})
    );
    assert_eq!(replies[1]["landscape_analysis_result"], json!({"done": true}));
    assert_eq!(harness.stats.get_error_count(ErrorType::TaskTimeout), 1);
    harness.stop().await;
}
