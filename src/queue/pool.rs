//! Bounded pool of broker connections.
//!
//! The pool keeps up to `capacity` idle connections and allows at most
//! `2 × capacity` live connections in total. State sits behind one
//! `std::sync::Mutex` that is never held across an `.await`; callers waiting
//! for a returned connection park on a `Notify`.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{BrokerConnector, BrokerSession};
use crate::config::{POOL_CHECKOUT_TIMEOUT, POOL_MAINTENANCE_INTERVAL, POOL_MAX_IDLE, POOL_SIZE};
use crate::error_handling::QueueError;

/// A checked-out connection; held by at most one publisher at a time.
pub struct PooledConnection {
    pub session: Box<dyn BrokerSession>,
    pub declared_queues: HashSet<String>,
    pub created_at: Instant,
    pub last_used: Instant,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("declared_queues", &self.declared_queues)
            .field("created_at", &self.created_at)
            .field("last_used", &self.last_used)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    fn new(session: Box<dyn BrokerSession>) -> Self {
        let now = Instant::now();
        Self {
            session,
            declared_queues: HashSet::new(),
            created_at: now,
            last_used: now,
        }
    }

    /// Declares `queue` once per connection.
    pub async fn ensure_queue(&mut self, queue: &str) -> Result<(), QueueError> {
        if self.declared_queues.contains(queue) {
            return Ok(());
        }
        self.session.declare_queue(queue).await?;
        self.declared_queues.insert(queue.to_string());
        Ok(())
    }
}

/// Pool sizing and timing.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub capacity: usize,
    pub max_idle: Duration,
    pub checkout_timeout: Duration,
    pub maintenance_interval: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            capacity: POOL_SIZE,
            max_idle: POOL_MAX_IDLE,
            checkout_timeout: POOL_CHECKOUT_TIMEOUT,
            maintenance_interval: POOL_MAINTENANCE_INTERVAL,
        }
    }
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<PooledConnection>,
    /// Idle plus checked-out plus connections being opened
    live: usize,
    closed: bool,
}

enum Checkout {
    Idle(PooledConnection),
    Open,
    Wait,
}

/// A `live` slot claimed for a connection that is still being opened.
///
/// Dropping it without [`Reservation::fulfil`] frees the slot, so a caller
/// abandoned mid-connect does not shrink the pool.
struct Reservation<'a> {
    pool: &'a ConnectionPool,
    armed: bool,
}

impl<'a> Reservation<'a> {
    /// Wraps a slot the caller already counted in `live`.
    fn claimed(pool: &'a ConnectionPool) -> Self {
        Self { pool, armed: true }
    }

    fn fulfil(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.lock().live -= 1;
            self.pool.returned.notify_one();
        }
    }
}

/// Bounded broker connection pool.
pub struct ConnectionPool {
    connector: Arc<dyn BrokerConnector>,
    settings: PoolSettings,
    state: Mutex<PoolState>,
    returned: Notify,
}

impl ConnectionPool {
    /// Creates the pool and pre-warms `capacity` connections.
    ///
    /// Connections that fail to open are logged; maintenance refills them later.
    pub async fn new(connector: Arc<dyn BrokerConnector>, settings: PoolSettings) -> Arc<Self> {
        let pool = Arc::new(Self {
            connector,
            settings,
            state: Mutex::new(PoolState::default()),
            returned: Notify::new(),
        });
        pool.refill().await;
        info!(
            "Connection pool ready with {} connection(s)",
            pool.lock().idle.len()
        );
        pool
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // A panic while holding the lock cannot leave the state half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn max_live(&self) -> usize {
        self.settings.capacity.max(1) * 2
    }

    pub fn live_count(&self) -> usize {
        self.lock().live
    }

    pub fn idle_count(&self) -> usize {
        self.lock().idle.len()
    }

    /// Takes a connection, opening one if the pool is below its live bound.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::PoolTimeout` if none is returned within the
    /// checkout timeout, `PoolClosed` after shutdown, or the connect error.
    pub async fn get_connection(&self) -> Result<PooledConnection, QueueError> {
        let deadline = tokio::time::Instant::now() + self.settings.checkout_timeout;
        loop {
            let notified = self.returned.notified();
            let mut stale = Vec::new();
            let checkout = {
                let mut state = self.lock();
                if state.closed {
                    return Err(QueueError::PoolClosed);
                }
                let mut found = None;
                while let Some(conn) = state.idle.pop_front() {
                    if conn.session.is_open() {
                        found = Some(conn);
                        break;
                    }
                    state.live -= 1;
                    stale.push(conn);
                }
                match found {
                    Some(conn) => Checkout::Idle(conn),
                    None if state.live < self.max_live() => {
                        state.live += 1;
                        Checkout::Open
                    }
                    None => Checkout::Wait,
                }
            };
            close_all(stale).await;

            match checkout {
                Checkout::Idle(mut conn) => {
                    conn.last_used = Instant::now();
                    return Ok(conn);
                }
                Checkout::Open => {
                    let reservation = Reservation::claimed(self);
                    let session = self.connector.connect().await?;
                    reservation.fulfil();
                    return Ok(PooledConnection::new(session));
                }
                Checkout::Wait => {}
            }

            debug!("Connection pool exhausted, waiting for a returned connection");
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(QueueError::PoolTimeout(self.settings.checkout_timeout));
            }
        }
    }

    /// Gives a connection back; closes it if the pool is full, closed, or the connection died.
    pub async fn return_connection(&self, mut conn: PooledConnection) {
        let rejected = {
            let mut state = self.lock();
            if state.closed || !conn.session.is_open() || state.idle.len() >= self.settings.capacity {
                state.live -= 1;
                Some(conn)
            } else {
                conn.last_used = Instant::now();
                state.idle.push_back(conn);
                None
            }
        };
        if let Some(conn) = rejected {
            conn.session.close().await;
        }
        self.returned.notify_one();
    }

    /// Closes a connection that failed and frees its slot.
    pub async fn discard(&self, conn: PooledConnection) {
        self.lock().live -= 1;
        conn.session.close().await;
        self.returned.notify_one();
    }

    /// Evicts idle or dead connections and refills to capacity.
    pub async fn maintain(&self) {
        let evicted: Vec<PooledConnection> = {
            let mut state = self.lock();
            let max_idle = self.settings.max_idle;
            let (keep, evict): (VecDeque<_>, VecDeque<_>) = state
                .idle
                .drain(..)
                .partition(|c| c.session.is_open() && c.last_used.elapsed() < max_idle);
            state.idle = keep;
            state.live -= evict.len();
            evict.into_iter().collect()
        };
        if !evicted.is_empty() {
            debug!("Evicting {} pooled connection(s)", evicted.len());
        }
        close_all(evicted).await;
        self.refill().await;
    }

    async fn refill(&self) {
        let missing = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            let wanted = self.settings.capacity.saturating_sub(state.idle.len());
            let allowed = self.max_live().saturating_sub(state.live);
            let missing = wanted.min(allowed);
            state.live += missing;
            missing
        };
        let mut reservations: Vec<_> = (0..missing).map(|_| Reservation::claimed(self)).collect();
        while let Some(reservation) = reservations.pop() {
            match self.connector.connect().await {
                Ok(session) => {
                    reservation.fulfil();
                    self.lock().idle.push_back(PooledConnection::new(session));
                    self.returned.notify_one();
                }
                Err(e) => warn!("Failed to open pooled connection: {}", e),
            }
        }
    }

    /// Runs [`maintain`](Self::maintain) on the configured interval until cancelled.
    pub fn spawn_maintenance(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(pool.settings.maintenance_interval);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => pool.maintain().await,
                }
            }
            debug!("Connection pool maintenance stopped");
        })
    }

    /// Closes every idle connection and refuses further checkouts.
    pub async fn close(&self) {
        let idle: Vec<PooledConnection> = {
            let mut state = self.lock();
            state.closed = true;
            state.live -= state.idle.len();
            state.idle.drain(..).collect()
        };
        close_all(idle).await;
        self.returned.notify_waiters();
    }
}

async fn close_all(conns: Vec<PooledConnection>) {
    for conn in conns {
        conn.session.close().await;
    }
}
