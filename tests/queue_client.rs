//! Queue Client Test Suite
//!
//! **Purpose:** Exercise the pooled publisher against an in-memory broker.
//!
//! **What We're Testing:**
//! 1. Concurrent sends all reach the queue without opening unbounded connections
//! 2. A queue is declared once per connection
//! 3. A broker refusing connections yields a failed outcome instead of an error

mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use helpers::{MemoryBroker, MemoryConnector};
use sso_landscape::queue::{ConnectionPool, PoolSettings, QueueClient};

fn settings(capacity: usize) -> PoolSettings {
    PoolSettings {
        capacity,
        checkout_timeout: Duration::from_secs(2),
        ..PoolSettings::default()
    }
}

#[tokio::test]
async fn test_concurrent_sends_stay_within_pool_bound() {
    let broker = MemoryBroker::new();
    let pool = ConnectionPool::new(Arc::new(MemoryConnector(Arc::clone(&broker))), settings(2)).await;
    let client = Arc::new(QueueClient::new(Arc::clone(&pool)));

    let mut handles = Vec::new();
    for i in 0..20 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            let payload = json!({"domain": format!("d{}.test", i)});
            client
                .send("sso_landscape_analysis", "/api/reply", &format!("task-{}", i), &payload)
                .await
        }));
    }
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(outcome.success, "send failed: {:?}", outcome.error);
    }

    let published = broker.published.lock().unwrap().clone();
    assert_eq!(published.len(), 20);
    assert!(published.iter().all(|(q, _)| q == "sso_landscape_analysis"));
    assert!(published
        .iter()
        .any(|(_, m)| m.correlation_id == "task-7" && m.reply_to == "/api/reply"));

    let connects = broker.connects.load(Ordering::SeqCst);
    assert!(connects <= 4, "opened {} connections", connects);
    // One declare per connection that published
    assert!(broker.declared.lock().unwrap().len() <= connects);
    assert!(pool.live_count() <= 4);
    assert!(pool.idle_count() <= 2);

    pool.close().await;
}

#[tokio::test]
async fn test_refused_connections_fail_the_outcome() {
    let broker = MemoryBroker::new();
    broker.refuse_connections.store(true, Ordering::SeqCst);
    let pool = ConnectionPool::new(Arc::new(MemoryConnector(Arc::clone(&broker))), settings(1)).await;
    let client = QueueClient::new(Arc::clone(&pool)).with_base_delay(Duration::from_millis(5));

    let outcome = client.send("q", "", "", &json!({"domain": "a.test"})).await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("connection refused"));
    assert!(broker.published.lock().unwrap().is_empty());
    assert_eq!(pool.live_count(), 0);
}
