//! Task consumer.
//!
//! This module provides:
//! - [`Consumer`], the reconnecting outer loop around one broker session
//! - The supervisor that owns deliveries and their acknowledgements
//! - Workers that execute a task and reply to the brain before the ack
//! - A memory monitor for the consumer process
//!
//! A message is acknowledged only after its reply succeeded. A failed reply
//! ends the session with the message unacknowledged; the broker redelivers it
//! on the next session.

mod memory;
mod reply;
mod supervisor;
mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{
    ConsumeOptions, CONSUMER_PREFETCH, CONSUMER_TAG, MEMORY_MONITOR_INTERVAL,
    MEMORY_WARN_THRESHOLD_MB, RECONNECT_COOLDOWN,
};
use crate::error_handling::{reconnect_strategy, ErrorType, ProcessingStats, QueueError};
use crate::executor::TaskExecutor;
use crate::initialization::{init_reply_client, init_semaphore};
use crate::models::AnalysisKind;
use crate::queue::{AmqpConnector, BrokerConnector, BrokerSession, DeliveryStream};

pub use memory::spawn_memory_monitor;
pub use reply::Replier;
pub use supervisor::supervise;
pub use worker::{process_task, TaskRunner, WorkItem, WorkOutcome, WorkReport, WorkerContext};

/// Consumes one durable queue, reconnecting forever until cancelled.
pub struct Consumer {
    connector: Arc<dyn BrokerConnector>,
    queue: String,
    ctx: Arc<WorkerContext>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Consumer {
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        queue: impl Into<String>,
        ctx: Arc<WorkerContext>,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connector,
            queue: queue.into(),
            ctx,
            semaphore,
            cancel,
        }
    }

    pub fn stats(&self) -> &Arc<ProcessingStats> {
        &self.ctx.stats
    }

    /// Runs sessions back to back until the cancellation token fires.
    ///
    /// Failed sessions are retried on the reconnect schedule; once it is
    /// exhausted the consumer cools down and starts a fresh schedule. A session
    /// that reached the consuming state resets the schedule.
    pub async fn run(&self) {
        let mut delays = reconnect_strategy();
        while !self.cancel.is_cancelled() {
            let mut consuming = false;
            match self.run_session(&mut consuming).await {
                Ok(()) => break,
                Err(e) => {
                    if consuming {
                        error!("Consumer session on {} ended: {:#}", self.queue, e);
                        delays = reconnect_strategy();
                    } else {
                        self.ctx.stats.increment_error(ErrorType::BrokerConnectError);
                        warn!("Could not start consuming {}: {:#}", self.queue, e);
                    }
                }
            }

            let delay = match delays.next() {
                Some(delay) => delay,
                None => {
                    warn!(
                        "Reconnect attempts exhausted, cooling down for {:?}",
                        RECONNECT_COOLDOWN
                    );
                    delays = reconnect_strategy();
                    RECONNECT_COOLDOWN
                }
            };
            info!("Reconnecting in {:?}", delay);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("Consumer on {} stopped", self.queue);
    }

    async fn run_session(&self, consuming: &mut bool) -> Result<()> {
        let session = self.connector.connect().await.context("Connect failed")?;
        let deliveries = match self.start_consuming(session.as_ref()).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                session.close().await;
                return Err(e).context(format!("Could not consume queue {}", self.queue));
            }
        };
        *consuming = true;
        info!("Consuming queue {}", self.queue);

        let result = supervise(
            deliveries,
            Arc::clone(&self.ctx),
            Arc::clone(&self.semaphore),
            self.cancel.clone(),
        )
        .await;
        session.close().await;
        result
    }

    async fn start_consuming(&self, session: &dyn BrokerSession) -> Result<DeliveryStream, QueueError> {
        session.declare_queue(&self.queue).await?;
        session.set_prefetch(CONSUMER_PREFETCH).await?;
        session.consume(&self.queue, CONSUMER_TAG).await
    }
}

/// Entry point of the `consume` subcommand.
///
/// # Errors
///
/// Returns an error if the queue name does not name a known analysis or a
/// shared resource cannot be created. Broker failures are retried, not
/// returned.
pub async fn run_consumer(opts: ConsumeOptions) -> Result<()> {
    let kind: AnalysisKind = opts
        .analysis_name()
        .parse()
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("Queue {} does not name an analysis", opts.rabbitmq_queue))?;

    let executor = TaskExecutor::new(opts.task_timeout(), opts.analysis.clone())
        .context("Failed to locate the worker executable")?;
    let reply_client = init_reply_client().context("Failed to initialize reply client")?;
    let ctx = Arc::new(WorkerContext {
        kind,
        runner: Arc::new(executor),
        replier: Replier::new(reply_client, &opts.brain_url, &opts.admin_user, &opts.admin_pass),
        stats: Arc::new(ProcessingStats::new()),
    });

    let cancel = CancellationToken::new();
    let monitor = spawn_memory_monitor(
        MEMORY_MONITOR_INTERVAL,
        MEMORY_WARN_THRESHOLD_MB,
        cancel.clone(),
    );
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            signal_cancel.cancel();
        }
    });

    info!(
        "Worker for {} starting (max {} concurrent task(s), timeout {:?})",
        kind,
        opts.max_concurrent_tasks,
        opts.task_timeout()
    );
    let consumer = Consumer::new(
        Arc::new(AmqpConnector::new(opts.broker.uri())),
        opts.rabbitmq_queue.clone(),
        ctx,
        init_semaphore(opts.max_concurrent_tasks),
        cancel.clone(),
    );
    consumer.run().await;

    cancel.cancel();
    let _ = monitor.await;
    consumer.stats().log_summary();
    Ok(())
}
