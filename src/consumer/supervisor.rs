//! The delivery supervisor.
//!
//! One supervisor owns a broker session's delivery stream. It hands each
//! delivery to a semaphore-bounded worker task and keeps the delivery's
//! acknowledger itself, so acks and rejects only ever happen here.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use super::worker::{process_task, WorkItem, WorkOutcome, WorkReport, WorkerContext};
use crate::error_handling::{ErrorType, QueueError};
use crate::queue::{Acknowledger, DeliveryStream};

/// Consumes `deliveries` until cancellation, stream loss, or a failed reply.
///
/// Returns `Ok(())` only when `cancel` fires. A failed reply returns an error
/// with the message left unacked, so the broker redelivers it once the
/// session is replaced.
///
/// # Errors
///
/// Returns an error when the stream ends or fails, an ack fails, or a reply
/// is given up on.
pub async fn supervise(
    mut deliveries: DeliveryStream,
    ctx: Arc<WorkerContext>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) -> Result<()> {
    let (report_tx, mut report_rx) = mpsc::unbounded_channel::<WorkReport>();
    let mut pending: HashMap<u64, Box<dyn Acknowledger>> = HashMap::new();
    let mut next_id: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Consumer cancelled with {} task(s) in flight", pending.len());
                return Ok(());
            }
            Some(report) = report_rx.recv() => {
                let Some(acker) = pending.remove(&report.id) else {
                    warn!("Completion for unknown delivery {}", report.id);
                    continue;
                };
                settle(acker, report, &ctx).await?;
            }
            delivery = deliveries.next() => {
                let delivery = match delivery {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => {
                        ctx.stats.increment_error(ErrorType::BrokerStreamError);
                        return Err(e).context("Delivery stream failed");
                    }
                    None => {
                        ctx.stats.increment_error(ErrorType::BrokerStreamError);
                        return Err(QueueError::StreamClosed.into());
                    }
                };
                next_id += 1;
                ctx.stats.record_received();
                debug!(
                    "Received delivery {} (correlation_id={:?})",
                    next_id, delivery.correlation_id
                );

                let item = WorkItem {
                    id: next_id,
                    body: delivery.body,
                    reply_to: delivery.reply_to,
                };
                pending.insert(next_id, delivery.acker);
                spawn_worker(item, Arc::clone(&ctx), Arc::clone(&semaphore), report_tx.clone());
            }
        }
    }
}

fn spawn_worker(
    item: WorkItem,
    ctx: Arc<WorkerContext>,
    semaphore: Arc<Semaphore>,
    reports: mpsc::UnboundedSender<WorkReport>,
) {
    tokio::spawn(async move {
        // The semaphore is never closed.
        let Ok(_permit) = semaphore.acquire_owned().await else {
            return;
        };
        let id = item.id;
        let outcome = process_task(&ctx, item).await;
        if reports.send(WorkReport { id, outcome }).is_err() {
            debug!("Session ended before delivery {} completed", id);
        }
    });
}

async fn settle(acker: Box<dyn Acknowledger>, report: WorkReport, ctx: &WorkerContext) -> Result<()> {
    match report.outcome {
        WorkOutcome::Replied | WorkOutcome::NoReply => {
            if let Err(e) = acker.ack().await {
                ctx.stats.increment_error(ErrorType::AckError);
                return Err(e).context(format!("Failed to acknowledge delivery {}", report.id));
            }
            ctx.stats.record_acked();
            info!("Acknowledged delivery {}", report.id);
        }
        WorkOutcome::InvalidPayload(reason) => {
            if let Err(e) = acker.reject(false).await {
                ctx.stats.increment_error(ErrorType::AckError);
                return Err(e).context(format!("Failed to reject delivery {}", report.id));
            }
            info!("Rejected delivery {}: {}", report.id, reason);
        }
        WorkOutcome::ReplyFailed(e) => {
            return Err(anyhow!(e)).context(format!(
                "Reply for delivery {} failed, leaving it unacknowledged",
                report.id
            ));
        }
    }
    Ok(())
}
