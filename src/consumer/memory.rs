//! Periodic resident-memory sampling of the worker process.

use std::time::Duration;

use log::{debug, warn};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Resident set size of `pid` in megabytes.
fn sample_rss_mb(system: &mut System, pid: Pid) -> Option<u64> {
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|p| p.memory() / (1024 * 1024))
}

/// Logs the worker's RSS every `interval` and warns above `warn_mb`.
///
/// Analyses run in child processes, so growth here points at the consumer
/// itself.
pub fn spawn_memory_monitor(
    interval: Duration,
    warn_mb: u64,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => pid,
            Err(e) => {
                warn!("Memory monitor disabled: {}", e);
                return;
            }
        };
        let mut system = System::new();
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match sample_rss_mb(&mut system, pid) {
                        Some(mb) if mb >= warn_mb => {
                            warn!("Worker memory usage is {} MB (threshold {} MB)", mb, warn_mb);
                        }
                        Some(mb) => debug!("Worker memory usage is {} MB", mb),
                        None => debug!("Could not sample worker memory usage"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_own_process() {
        let mut system = System::new();
        let pid = sysinfo::get_current_pid().unwrap();
        assert!(sample_rss_mb(&mut system, pid).is_some());
    }

    #[tokio::test]
    async fn test_monitor_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = spawn_memory_monitor(Duration::from_millis(10), u64::MAX, cancel.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
