use crate::connection::{connect, ConnectionError};
use crate::pool::config::DatabaseConfig;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use may_postgres::Client;
use std::fmt;
use std::ops::Deref;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Back-off between checkout attempts while every slot is busy
const CHECKOUT_BACKOFF: Duration = Duration::from_millis(1);

/// Pool of `may_postgres` clients
pub type DbPool = Pool<Client>;

#[derive(Debug)]
pub enum PoolError {
    /// Every slot stayed busy for the whole checkout timeout
    Exhausted(Duration),
    /// Opening a slot's connection failed
    Connection(ConnectionError),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Exhausted(waited) => write!(
                f,
                "connection pool exhausted after waiting {}ms",
                waited.as_millis()
            ),
            PoolError::Connection(e) => write!(f, "pool connection error: {e}"),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<ConnectionError> for PoolError {
    fn from(err: ConnectionError) -> Self {
        PoolError::Connection(err)
    }
}

/// Opens a replacement for a slot whose connection was discarded
pub type Connect<C> = Box<dyn Fn() -> Result<C, PoolError> + Send + Sync>;

/// Bounded set of reusable connections.
///
/// Each slot holds either a live connection or `None` after the connection
/// was marked broken. An empty slot is reconnected on its next checkout.
pub struct Pool<C> {
    idle_tx: Sender<Option<C>>,
    idle_rx: Receiver<Option<C>>,
    connect: Connect<C>,
    size: usize,
    timeout: Duration,
}

impl<C> Pool<C> {
    /// Builds a pool over already-open connections; `connect` refills
    /// slots whose connection was discarded.
    pub fn from_connections(connections: Vec<C>, timeout: Duration, connect: Connect<C>) -> Self {
        let size = connections.len();
        let (idle_tx, idle_rx) = bounded(size.max(1));
        for conn in connections {
            // capacity == size, never blocks
            let _ = idle_tx.send(Some(conn));
        }
        Self {
            idle_tx,
            idle_rx,
            connect,
            size,
            timeout,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of slots currently idle, live or awaiting reconnect
    pub fn idle(&self) -> usize {
        self.idle_rx.len()
    }

    /// Takes a connection, waiting up to the pool timeout for one to free up.
    ///
    /// Waiting yields to the `may` scheduler so other coroutines on the same
    /// worker thread keep running. A failed reconnect returns the empty slot
    /// to the pool and fails this checkout only.
    pub fn checkout(&self) -> Result<PooledConnection<'_, C>, PoolError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::acquire_connection_span().entered();

        let start = Instant::now();
        loop {
            match self.idle_rx.try_recv() {
                Ok(slot) => {
                    #[cfg(feature = "metrics")]
                    METRICS.record_pool_wait(start.elapsed());
                    let conn = match slot {
                        Some(conn) => conn,
                        None => self.reconnect()?,
                    };
                    return Ok(PooledConnection {
                        conn: Some(conn),
                        broken: false,
                        pool: self,
                    });
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    let waited = start.elapsed();
                    if waited >= self.timeout {
                        log::warn!("pool checkout timed out after {}ms", waited.as_millis());
                        return Err(PoolError::Exhausted(waited));
                    }
                    may::coroutine::sleep(CHECKOUT_BACKOFF);
                }
            }
        }
    }

    fn reconnect(&self) -> Result<C, PoolError> {
        match (self.connect)() {
            Ok(conn) => {
                log::info!("replaced broken pool connection");
                Ok(conn)
            }
            Err(e) => {
                log::warn!("reconnecting pool slot failed: {e}");
                self.release(None);
                Err(e)
            }
        }
    }

    fn release(&self, slot: Option<C>) {
        let _ = self.idle_tx.try_send(slot);
    }
}

impl Pool<Client> {
    /// Opens `max_connections` clients against `config.url`
    pub fn connect(config: &DatabaseConfig) -> Result<Self, PoolError> {
        let mut connections = Vec::with_capacity(config.max_connections);
        for _ in 0..config.max_connections {
            connections.push(connect(&config.url)?);
        }
        log::info!("opened {} database connection(s)", connections.len());
        let url = config.url.clone();
        Ok(Self::from_connections(
            connections,
            Duration::from_secs(config.pool_timeout_seconds),
            Box::new(move || Ok(connect(&url)?)),
        ))
    }
}

/// Exclusive handle on a pooled connection, returned to the pool on drop
pub struct PooledConnection<'a, C> {
    conn: Option<C>,
    broken: bool,
    pool: &'a Pool<C>,
}

impl<C> PooledConnection<'_, C> {
    /// Drops the connection instead of returning it; the slot reconnects on
    /// its next checkout.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl<C> Deref for PooledConnection<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        // only taken in drop
        self.conn.as_ref().expect("pooled connection present until drop")
    }
}

impl<C> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.broken {
                log::warn!("discarding broken pool connection");
                drop(conn);
                self.pool.release(None);
            } else {
                self.pool.release(Some(conn));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    fn no_reconnect() -> Connect<u32> {
        Box::new(|| Err(PoolError::Exhausted(Duration::ZERO)))
    }

    /// Hands out 100, 101, ... while `up` is set
    fn counting(up: Arc<AtomicBool>) -> Connect<u32> {
        let next = AtomicU32::new(100);
        Box::new(move || {
            if up.load(Ordering::SeqCst) {
                Ok(next.fetch_add(1, Ordering::SeqCst))
            } else {
                Err(PoolError::Connection(ConnectionError::InvalidConnectionString(
                    "server down".to_string(),
                )))
            }
        })
    }

    #[test]
    fn test_checkout_and_release() {
        let pool = Pool::from_connections(vec![1u32, 2u32], Duration::from_millis(50), no_reconnect());
        assert_eq!(pool.size(), 2);
        {
            let a = pool.checkout().unwrap();
            let b = pool.checkout().unwrap();
            assert_ne!(*a, *b);
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn test_checkout_times_out_when_exhausted() {
        let pool = Pool::from_connections(vec![7u32], Duration::from_millis(20), no_reconnect());
        let _held = pool.checkout().unwrap();
        match pool.checkout() {
            Err(PoolError::Exhausted(waited)) => assert!(waited >= Duration::from_millis(20)),
            other => panic!("expected exhaustion, got {:?}", other.map(|c| *c)),
        }
    }

    #[test]
    fn test_released_connection_is_reused() {
        let pool = Pool::from_connections(vec![42u32], Duration::from_millis(20), no_reconnect());
        drop(pool.checkout().unwrap());
        assert_eq!(*pool.checkout().unwrap(), 42);
    }

    #[test]
    fn test_broken_connection_is_replaced_on_next_checkout() {
        let up = Arc::new(AtomicBool::new(true));
        let pool = Pool::from_connections(vec![42u32], Duration::from_millis(20), counting(up));
        {
            let mut conn = pool.checkout().unwrap();
            assert_eq!(*conn, 42);
            conn.mark_broken();
        }
        assert_eq!(pool.idle(), 1);
        assert_eq!(*pool.checkout().unwrap(), 100);
        // the replacement is kept like any healthy connection
        assert_eq!(*pool.checkout().unwrap(), 100);
    }

    #[test]
    fn test_failed_reconnect_keeps_the_slot() {
        let up = Arc::new(AtomicBool::new(false));
        let pool = Pool::from_connections(vec![42u32], Duration::from_millis(20), counting(up.clone()));
        pool.checkout().unwrap().mark_broken();

        assert!(matches!(pool.checkout(), Err(PoolError::Connection(_))));
        assert_eq!(pool.idle(), 1);

        up.store(true, Ordering::SeqCst);
        assert_eq!(*pool.checkout().unwrap(), 100);
    }
}
