//! The default [`ConnectionPool`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

use crate::net::{Connection, ConnectionFactory, ConnectionId};
use crate::observability::metrics;
use crate::origin::Origin;
use crate::pool::{
    BorrowedConnection, ConnectionLender, ConnectionPool, ConnectionPoolFactory, ConnectionPoolSettings, PoolError,
    PoolStats,
};

/// What a queued borrower is handed.
enum Grant {
    /// A returned connection, still counted as busy.
    Connection(Arc<dyn Connection>),
    /// A busy slot freed by a closed connection; the waiter opens its own.
    Slot,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Grant>,
}

#[derive(Default)]
struct PoolState {
    available: VecDeque<Arc<dyn Connection>>,
    borrowed: HashMap<ConnectionId, Arc<dyn Connection>>,
    waiters: VecDeque<Waiter>,
    /// Lent connections plus connections being opened.
    busy: usize,
    next_waiter_id: u64,
}

struct PoolShared {
    origin: Origin,
    settings: ConnectionPoolSettings,
    factory: Arc<dyn ConnectionFactory>,
    state: Mutex<PoolState>,
    closed: AtomicBool,
    connection_attempts: AtomicU64,
    connection_failures: AtomicU64,
    closed_connections: AtomicU64,
    terminated_connections: AtomicU64,
}

/// Pool of HTTP connections to a single origin.
#[derive(Clone)]
pub struct SimpleConnectionPool {
    shared: Arc<PoolShared>,
}

impl SimpleConnectionPool {
    pub fn new(origin: Origin, settings: ConnectionPoolSettings, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                origin,
                settings,
                factory,
                state: Mutex::new(PoolState::default()),
                closed: AtomicBool::new(false),
                connection_attempts: AtomicU64::new(0),
                connection_failures: AtomicU64::new(0),
                closed_connections: AtomicU64::new(0),
                terminated_connections: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &ConnectionPoolSettings {
        &self.shared.settings
    }
}

impl std::fmt::Debug for SimpleConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleConnectionPool")
            .field("origin", &self.shared.origin)
            .field("stats", &self.shared.stats())
            .finish()
    }
}

enum NextStep {
    Lend(Arc<dyn Connection>),
    Open,
    Wait(WaitTicket),
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // A panic while holding the lock leaves plain counters behind; keep serving.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn closed_error(&self) -> PoolError {
        PoolError::Closed {
            origin: self.origin.to_string(),
        }
    }

    fn is_reusable(&self, connection: &Arc<dyn Connection>) -> bool {
        if !connection.is_connected() {
            return false;
        }
        match self.settings.connection_expiration() {
            Some(max_age) => connection.created_at().elapsed() < max_age,
            None => true,
        }
    }

    /// Pop the oldest idle connection that is still usable, closing dead ones.
    fn take_idle(&self, state: &mut PoolState) -> Option<Arc<dyn Connection>> {
        while let Some(connection) = state.available.pop_front() {
            if self.is_reusable(&connection) {
                return Some(connection);
            }
            self.terminated_connections.fetch_add(1, Ordering::Relaxed);
            connection.close();
        }
        None
    }

    fn publish_busy(&self, state: &PoolState) {
        metrics::record_pool_busy(&self.origin, state.busy);
    }

    /// Offer `grant` to queued borrowers in FIFO order. Hands it back when
    /// nobody is left to take it.
    fn offer(state: &mut PoolState, mut grant: Grant) -> Option<Grant> {
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.tx.send(grant) {
                Ok(()) => return None,
                Err(returned) => grant = returned,
            }
        }
        Some(grant)
    }

    /// A busy slot is no longer used; give it to a waiter or drop the count.
    fn free_slot(&self, state: &mut PoolState) {
        if Self::offer(state, Grant::Slot).is_some() {
            state.busy = state.busy.saturating_sub(1);
        }
        self.publish_busy(state);
    }

    fn next_step(self: &Arc<Self>) -> Result<NextStep, PoolError> {
        let mut state = self.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }

        if state.busy < self.settings.max_connections_per_host {
            state.busy += 1;
            let step = match self.take_idle(&mut state) {
                Some(connection) => {
                    state.borrowed.insert(connection.id(), Arc::clone(&connection));
                    NextStep::Lend(connection)
                }
                None => NextStep::Open,
            };
            self.publish_busy(&state);
            return Ok(step);
        }

        let pending = state.waiters.len();
        let max = self.settings.max_pending_connections_per_host;
        if pending >= max {
            return Err(PoolError::MaxPendingExceeded {
                origin: self.origin.to_string(),
                pending,
                max,
            });
        }

        let (tx, rx) = oneshot::channel();
        let id = state.next_waiter_id;
        state.next_waiter_id += 1;
        state.waiters.push_back(Waiter { id, tx });
        Ok(NextStep::Wait(WaitTicket {
            pool: Arc::clone(self),
            id,
            rx: Some(rx),
        }))
    }

    fn lend(self: &Arc<Self>, connection: Arc<dyn Connection>) -> BorrowedConnection {
        BorrowedConnection::new(connection, Arc::clone(self) as Arc<dyn ConnectionLender>)
    }

    /// Open a connection for a slot already counted as busy.
    async fn open(self: Arc<Self>) -> Result<BorrowedConnection, PoolError> {
        let slot = SlotGuard::new(Arc::clone(&self));
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);

        let created = self
            .factory
            .create_connection(&self.origin, self.settings.connection_settings())
            .await;

        let connection = match created {
            Ok(connection) => connection,
            Err(e) => {
                self.connection_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(origin = %self.origin, error = %e, "Failed to open origin connection");
                return Err(e.into());
            }
        };

        let mut state = self.lock();
        if self.closed.load(Ordering::Acquire) {
            drop(state);
            connection.close();
            return Err(self.closed_error());
        }
        state.borrowed.insert(connection.id(), Arc::clone(&connection));
        drop(state);
        slot.disarm();

        tracing::debug!(origin = %self.origin, connection_id = %connection.id(), "Opened origin connection");
        Ok(self.lend(connection))
    }

    async fn borrow(self: Arc<Self>) -> Result<BorrowedConnection, PoolError> {
        match self.next_step()? {
            NextStep::Lend(connection) => Ok(self.lend(connection)),
            NextStep::Open => self.open().await,
            NextStep::Wait(ticket) => match ticket.wait().await? {
                Grant::Connection(connection) => Ok(self.lend(connection)),
                Grant::Slot => {
                    let idle = {
                        let mut state = self.lock();
                        let idle = self.take_idle(&mut state);
                        if let Some(connection) = &idle {
                            state.borrowed.insert(connection.id(), Arc::clone(connection));
                        }
                        idle
                    };
                    match idle {
                        Some(connection) => Ok(self.lend(connection)),
                        None => self.open().await,
                    }
                }
            },
        }
    }

    fn dispose_grant(&self, grant: Grant) {
        match grant {
            Grant::Connection(connection) => self.return_connection(connection),
            Grant::Slot => {
                let mut state = self.lock();
                self.free_slot(&mut state);
            }
        }
    }

    fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            busy: state.busy,
            available: state.available.len(),
            pending: state.waiters.len(),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            closed_connections: self.closed_connections.load(Ordering::Relaxed),
            terminated_connections: self.terminated_connections.load(Ordering::Relaxed),
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let (waiters, available, borrowed) = {
            let mut state = self.lock();
            let waiters: Vec<_> = state.waiters.drain(..).collect();
            let available: Vec<_> = state.available.drain(..).collect();
            let borrowed: Vec<_> = state.borrowed.values().cloned().collect();
            (waiters, available, borrowed)
        };
        // Dropping the senders fails every queued borrower.
        drop(waiters);
        for connection in available.iter().chain(borrowed.iter()) {
            connection.close();
        }
        tracing::info!(origin = %self.origin, "Connection pool closed");
    }
}

impl ConnectionLender for PoolShared {
    fn return_connection(&self, connection: Arc<dyn Connection>) {
        let mut state = self.lock();
        if !state.borrowed.contains_key(&connection.id()) {
            return;
        }

        if self.closed.load(Ordering::Acquire) || !self.is_reusable(&connection) {
            state.borrowed.remove(&connection.id());
            self.terminated_connections.fetch_add(1, Ordering::Relaxed);
            connection.close();
            self.free_slot(&mut state);
            return;
        }

        // Stays borrowed and busy when a waiter takes it over.
        if let Some(Grant::Connection(connection)) = Self::offer(&mut state, Grant::Connection(connection)) {
            state.borrowed.remove(&connection.id());
            state.busy = state.busy.saturating_sub(1);
            state.available.push_back(connection);
            self.publish_busy(&state);
        }
    }

    fn close_connection(&self, connection: Arc<dyn Connection>) {
        let mut state = self.lock();
        if state.borrowed.remove(&connection.id()).is_some() {
            self.closed_connections.fetch_add(1, Ordering::Relaxed);
            connection.close();
            self.free_slot(&mut state);
        }
    }
}

/// A queued borrow. Dropping it leaves the queue and gives back anything
/// that was granted in the meantime.
struct WaitTicket {
    pool: Arc<PoolShared>,
    id: u64,
    rx: Option<oneshot::Receiver<Grant>>,
}

impl WaitTicket {
    async fn wait(mut self) -> Result<Grant, PoolError> {
        let timeout = self.pool.settings.pending_connection_timeout();
        let outcome = match self.rx.as_mut() {
            Some(rx) => tokio::time::timeout(timeout, rx).await,
            None => return Err(self.pool.closed_error()),
        };

        match outcome {
            Ok(Ok(grant)) => {
                self.rx = None;
                Ok(grant)
            }
            Ok(Err(_)) => {
                self.rx = None;
                Err(self.pool.closed_error())
            }
            Err(_) => {
                let still_queued = {
                    let mut state = self.pool.lock();
                    let before = state.waiters.len();
                    state.waiters.retain(|w| w.id != self.id);
                    state.waiters.len() != before
                };
                if !still_queued {
                    // Granted right at the deadline.
                    if let Some(mut rx) = self.rx.take() {
                        if let Ok(grant) = rx.try_recv() {
                            return Ok(grant);
                        }
                    }
                }
                self.rx = None;
                Err(PoolError::PendingTimeout {
                    origin: self.pool.origin.to_string(),
                    timeout_ms: self.pool.settings.pending_connection_timeout_ms,
                })
            }
        }
    }
}

impl Drop for WaitTicket {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        self.pool.lock().waiters.retain(|w| w.id != self.id);
        rx.close();
        if let Ok(grant) = rx.try_recv() {
            self.pool.dispose_grant(grant);
        }
    }
}

/// Frees a busy slot if opening a connection fails or is abandoned.
struct SlotGuard {
    pool: Option<Arc<PoolShared>>,
}

impl SlotGuard {
    fn new(pool: Arc<PoolShared>) -> Self {
        Self { pool: Some(pool) }
    }

    fn disarm(mut self) {
        self.pool = None;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            let mut state = pool.lock();
            pool.free_slot(&mut state);
        }
    }
}

impl ConnectionLender for SimpleConnectionPool {
    fn return_connection(&self, connection: Arc<dyn Connection>) {
        self.shared.return_connection(connection)
    }

    fn close_connection(&self, connection: Arc<dyn Connection>) {
        self.shared.close_connection(connection)
    }
}

impl ConnectionPool for SimpleConnectionPool {
    fn origin(&self) -> &Origin {
        &self.shared.origin
    }

    fn borrow(&self) -> BoxFuture<'static, Result<BorrowedConnection, PoolError>> {
        Box::pin(Arc::clone(&self.shared).borrow())
    }

    fn is_exhausted(&self) -> bool {
        self.shared.lock().waiters.len() >= self.shared.settings.max_pending_connections_per_host
    }

    fn stats(&self) -> PoolStats {
        self.shared.stats()
    }

    fn close(&self) {
        self.shared.close()
    }
}

/// Creates a [`SimpleConnectionPool`] per origin with shared settings.
#[derive(Clone)]
pub struct SimpleConnectionPoolFactory {
    settings: ConnectionPoolSettings,
    connection_factory: Arc<dyn ConnectionFactory>,
}

impl SimpleConnectionPoolFactory {
    pub fn new(settings: ConnectionPoolSettings, connection_factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            settings,
            connection_factory,
        }
    }
}

impl ConnectionPoolFactory for SimpleConnectionPoolFactory {
    fn create_pool(&self, origin: &Origin) -> Arc<dyn ConnectionPool> {
        Arc::new(SimpleConnectionPool::new(
            origin.clone(),
            self.settings.clone(),
            Arc::clone(&self.connection_factory),
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::message::{LiveRequest, LiveResponse};
    use crate::net::{ConnectionSettings, TransportError};
    use crate::stream::ByteStream;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    pub(crate) struct StubConnection {
        id: ConnectionId,
        origin: Origin,
        created_at: Instant,
        connected: AtomicBool,
    }

    impl StubConnection {
        pub(crate) fn new(origin: &Origin) -> Self {
            Self {
                id: ConnectionId::new(),
                origin: origin.clone(),
                created_at: Instant::now(),
                connected: AtomicBool::new(true),
            }
        }
    }

    impl Connection for StubConnection {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn origin(&self) -> &Origin {
            &self.origin
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn created_at(&self) -> Instant {
            self.created_at
        }

        fn write(&self, _request: LiveRequest) -> BoxFuture<'static, Result<LiveResponse, TransportError>> {
            Box::pin(async { Ok(http::Response::new(ByteStream::empty())) })
        }

        fn close(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    pub(crate) struct StubFactory {
        pub(crate) created: AtomicUsize,
        pub(crate) fail: AtomicBool,
    }

    impl ConnectionFactory for StubFactory {
        fn create_connection(
            &self,
            origin: &Origin,
            _settings: ConnectionSettings,
        ) -> BoxFuture<'static, Result<Arc<dyn Connection>, TransportError>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail.load(Ordering::SeqCst);
            let origin = origin.clone();
            Box::pin(async move {
                if fail {
                    return Err(TransportError::Connect {
                        address: origin.host_and_port(),
                        source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
                    });
                }
                Ok(Arc::new(StubConnection::new(&origin)) as Arc<dyn Connection>)
            })
        }
    }

    fn pool_with(settings: ConnectionPoolSettings) -> (SimpleConnectionPool, Arc<StubFactory>) {
        let factory = Arc::new(StubFactory::default());
        let origin = Origin::new("shop", "shop-01", "127.0.0.1", 9000);
        let pool = SimpleConnectionPool::new(origin, settings, factory.clone());
        (pool, factory)
    }

    fn small(max_connections: usize, max_pending: usize) -> ConnectionPoolSettings {
        ConnectionPoolSettings {
            max_connections_per_host: max_connections,
            max_pending_connections_per_host: max_pending,
            pending_connection_timeout_ms: 200,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn returned_connection_is_reused() {
        let (pool, factory) = pool_with(ConnectionPoolSettings::default());

        let first = pool.borrow().await.unwrap();
        let id = first.id();
        assert_eq!(pool.stats().busy, 1);
        first.release();
        assert_eq!(pool.stats().busy, 0);
        assert_eq!(pool.stats().available, 1);

        let second = pool.borrow().await.unwrap();
        assert_eq!(second.id(), id);
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        second.release();
    }

    #[tokio::test]
    async fn closed_connection_is_not_reused() {
        let (pool, factory) = pool_with(ConnectionPoolSettings::default());

        let first = pool.borrow().await.unwrap();
        let id = first.id();
        first.close();
        let stats = pool.stats();
        assert_eq!(stats.busy, 0);
        assert_eq!(stats.available, 0);
        assert_eq!(stats.closed_connections, 1);

        let second = pool.borrow().await.unwrap();
        assert_ne!(second.id(), id);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropped_guard_closes_connection() {
        let (pool, _) = pool_with(ConnectionPoolSettings::default());
        let borrowed = pool.borrow().await.unwrap();
        let connection = Arc::clone(borrowed.connection());
        drop(borrowed);
        assert!(!connection.is_connected());
        assert_eq!(pool.stats().busy, 0);
    }

    #[tokio::test]
    async fn return_hands_connection_to_waiter() {
        let (pool, factory) = pool_with(small(1, 5));

        let first = pool.borrow().await.unwrap();
        let id = first.id();
        let waiter = tokio::spawn(pool.borrow());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.stats().pending, 1);

        first.release();
        let second = waiter.await.unwrap().unwrap();

        assert_eq!(second.id(), id);
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().busy, 1);
        assert_eq!(pool.stats().pending, 0);
    }

    #[tokio::test]
    async fn close_hands_slot_to_waiter() {
        let (pool, factory) = pool_with(small(1, 5));

        let first = pool.borrow().await.unwrap();
        let id = first.id();
        let waiter = tokio::spawn(pool.borrow());
        tokio::time::sleep(Duration::from_millis(20)).await;

        first.close();
        let second = waiter.await.unwrap().unwrap();

        assert_ne!(second.id(), id);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().busy, 1);
    }

    #[tokio::test]
    async fn pending_queue_is_bounded() {
        let (pool, _) = pool_with(small(1, 1));

        let _held = pool.borrow().await.unwrap();
        let _queued = tokio::spawn(pool.borrow());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(pool.is_exhausted());

        let err = pool.borrow().await.unwrap_err();
        assert!(matches!(err, PoolError::MaxPendingExceeded { pending: 1, max: 1, .. }));
    }

    #[tokio::test]
    async fn waiter_times_out() {
        let (pool, _) = pool_with(small(1, 5));

        let _held = pool.borrow().await.unwrap();
        let err = pool.borrow().await.unwrap_err();

        assert!(matches!(err, PoolError::PendingTimeout { timeout_ms: 200, .. }));
        assert_eq!(pool.stats().pending, 0);
    }

    #[tokio::test]
    async fn connect_failure_frees_slot() {
        let (pool, factory) = pool_with(small(1, 5));
        factory.fail.store(true, Ordering::SeqCst);

        let err = pool.borrow().await.unwrap_err();
        assert!(matches!(err, PoolError::Connect(_)));
        assert!(err.is_retryable());

        let stats = pool.stats();
        assert_eq!(stats.busy, 0);
        assert_eq!(stats.connection_attempts, 1);
        assert_eq!(stats.connection_failures, 1);

        factory.fail.store(false, Ordering::SeqCst);
        assert!(pool.borrow().await.is_ok());
    }

    #[tokio::test]
    async fn dead_idle_connections_are_skipped() {
        let (pool, factory) = pool_with(ConnectionPoolSettings::default());

        let borrowed = pool.borrow().await.unwrap();
        let connection = Arc::clone(borrowed.connection());
        borrowed.release();
        connection.close();

        let next = pool.borrow().await.unwrap();
        assert_ne!(next.id(), connection.id());
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().terminated_connections, 1);
    }

    #[tokio::test]
    async fn expired_connections_are_not_lent() {
        let (pool, factory) = pool_with(ConnectionPoolSettings {
            connection_expiration_secs: Some(0),
            ..Default::default()
        });

        let first = pool.borrow().await.unwrap();
        first.release();
        // Zero lifetime: already expired on return.
        assert_eq!(pool.stats().available, 0);

        let _second = pool.borrow().await.unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn close_fails_waiters_and_further_borrows() {
        let (pool, _) = pool_with(small(1, 5));

        let held = pool.borrow().await.unwrap();
        let connection = Arc::clone(held.connection());
        let waiter = tokio::spawn(pool.borrow());
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.close();
        pool.close();

        assert!(matches!(waiter.await.unwrap(), Err(PoolError::Closed { .. })));
        assert!(matches!(pool.borrow().await, Err(PoolError::Closed { .. })));
        assert!(!connection.is_connected());

        held.release();
        assert_eq!(pool.stats().busy, 0);
    }

    #[tokio::test]
    async fn abandoned_waiter_leaves_queue() {
        let (pool, _) = pool_with(small(1, 5));

        let held = pool.borrow().await.unwrap();
        let waiter = tokio::spawn(pool.borrow());
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;

        assert_eq!(pool.stats().pending, 0);
        held.release();
        assert_eq!(pool.stats().available, 1);
        assert_eq!(pool.stats().busy, 0);
    }
}
