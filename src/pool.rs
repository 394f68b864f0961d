// Copyright 2025 The fleetrun Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Connection pool with explicit lease/release semantics.
//!
//! Sessions are cached per node id and reused across operations within one
//! run. Each node holds up to `max_sessions_per_node` sessions (default 1,
//! which serializes work against a single node); an acquire beyond the cap
//! waits for a lease to be dropped or released. Before reuse, a cached
//! session is probed for liveness and replaced transparently if it went
//! stale.
//!
//! Health is an explicit flag: `Lease::release(healthy)` returns the
//! session to the node's idle set or discards it. Dropping a lease without
//! releasing it discards the session, so a panicking task can never return
//! a half-used session to the pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{PoolError, SessionError};
use crate::node::NodeDescriptor;
use crate::transport::{ExecOutput, RemoteSession, Transport};

type IdleSessions = Arc<Mutex<Vec<Box<dyn RemoteSession>>>>;

/// Reconnection and capacity policy for the pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connection attempts per acquisition before giving up.
    pub connect_attempts: u32,
    /// Initial backoff delay between attempts; doubles each time.
    pub connect_backoff: Duration,
    /// Sessions allowed per node at once. 1 serializes each node.
    pub max_sessions_per_node: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            connect_backoff: Duration::from_millis(500),
            max_sessions_per_node: 1,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    peak: AtomicUsize,
    connects: AtomicUsize,
}

/// Per-node capacity gate plus the idle sessions waiting for reuse.
#[derive(Clone)]
struct NodeSlot {
    permits: Arc<Semaphore>,
    idle: IdleSessions,
}

impl NodeSlot {
    fn new(capacity: u32) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity.max(1) as usize)),
            idle: Arc::default(),
        }
    }
}

/// Pool of reusable sessions, keyed by node id.
pub struct ConnectionPool {
    transport: Arc<dyn Transport>,
    config: PoolConfig,
    slots: Mutex<HashMap<u32, NodeSlot>>,
    counters: Arc<Counters>,
}

impl ConnectionPool {
    pub fn new(transport: Arc<dyn Transport>, config: PoolConfig) -> Self {
        Self {
            transport,
            config,
            slots: Mutex::new(HashMap::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Lease a session for `node`, establishing or repairing one first if
    /// needed. Waits if the node is already at its session cap.
    pub async fn acquire(&self, node: &NodeDescriptor) -> Result<Lease, PoolError> {
        let slot = self.slot(node.id);
        let permit = match Arc::clone(&slot.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return Err(PoolError::ConnectionUnavailable {
                    node: node.to_string(),
                    attempts: 0,
                    last: SessionError::ConnectionLost("session pool closed".to_string()),
                })
            }
        };

        let mut cached = None;
        // Stale sessions are discarded until a live one (or none) remains.
        while let Some(mut session) = pop_idle(&slot.idle) {
            if session.is_alive().await {
                cached = Some(session);
                break;
            }
            debug!(node = %node, "cached session failed liveness probe, discarding");
        }

        let session = match cached {
            Some(session) => session,
            None => self.connect_with_backoff(node).await?,
        };

        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(active, Ordering::SeqCst);

        Ok(Lease {
            session: Some(session),
            idle: Arc::clone(&slot.idle),
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    fn slot(&self, node_id: u32) -> NodeSlot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(node_id)
            .or_insert_with(|| NodeSlot::new(self.config.max_sessions_per_node))
            .clone()
    }

    async fn connect_with_backoff(
        &self,
        node: &NodeDescriptor,
    ) -> Result<Box<dyn RemoteSession>, PoolError> {
        let attempts = self.config.connect_attempts.max(1);
        let mut delay = self.config.connect_backoff;
        let mut last: Option<SessionError> = None;

        for attempt in 1..=attempts {
            match self.transport.connect(node).await {
                Ok(session) => {
                    self.counters.connects.fetch_add(1, Ordering::SeqCst);
                    debug!(node = %node, attempt, "session established");
                    return Ok(session);
                }
                Err(err) => {
                    warn!(node = %node, attempt, error = %err, "connection attempt failed");
                    let transient = err.is_transient();
                    last = Some(err);
                    // Auth rejections will not heal; stop backing off.
                    if !transient {
                        break;
                    }
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                        delay = delay.saturating_mul(2);
                    }
                }
            }
        }

        Err(PoolError::ConnectionUnavailable {
            node: node.to_string(),
            attempts,
            last: last.unwrap_or_else(|| SessionError::Connect("no attempt made".to_string())),
        })
    }

    /// Sessions currently leased out.
    pub fn active_leases(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// High-water mark of simultaneously leased sessions.
    pub fn peak_leases(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Sessions established since the pool was created.
    pub fn total_connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }
}

fn pop_idle(idle: &IdleSessions) -> Option<Box<dyn RemoteSession>> {
    idle.lock().unwrap_or_else(|e| e.into_inner()).pop()
}

/// Exclusive use of one pooled session.
pub struct Lease {
    session: Option<Box<dyn RemoteSession>>,
    idle: IdleSessions,
    _permit: tokio::sync::OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("has_session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl Lease {
    /// Run a command on the leased session.
    pub async fn exec(&mut self, command: &str) -> Result<ExecOutput, SessionError> {
        match self.session.as_mut() {
            Some(session) => session.exec(command).await,
            None => Err(SessionError::ConnectionLost(
                "session already released".to_string(),
            )),
        }
    }

    /// Return the session to the pool, or discard it if it is broken.
    pub fn release(mut self, healthy: bool) {
        if healthy {
            if let Some(session) = self.session.take() {
                self.idle
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(session);
            }
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        // An unreleased session (task panic, attempt timeout) is dropped
        // with `self.session`, leaving capacity for a fresh connect.
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicU32;

    fn node(id: u32) -> NodeDescriptor {
        NodeDescriptor {
            id,
            name: format!("node-{id}"),
            host: format!("10.0.0.{id}"),
            port: 22,
            user: "root".to_string(),
            key_file: None,
            password: None,
            labels: BTreeMap::new(),
        }
    }

    /// A session that reports liveness from a shared flag.
    struct FakeSession {
        alive: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait]
    impl RemoteSession for FakeSession {
        async fn exec(&mut self, _command: &str) -> Result<ExecOutput, SessionError> {
            Ok(ExecOutput::default())
        }

        async fn is_alive(&mut self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    /// Transport that counts connects and can be told to fail the first N.
    struct FakeTransport {
        connects: AtomicU32,
        fail_first: u32,
        alive: Arc<std::sync::atomic::AtomicBool>,
    }

    impl FakeTransport {
        fn new(fail_first: u32) -> Self {
            Self {
                connects: AtomicU32::new(0),
                fail_first,
                alive: Arc::new(std::sync::atomic::AtomicBool::new(true)),
            }
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(
            &self,
            _node: &NodeDescriptor,
        ) -> Result<Box<dyn RemoteSession>, SessionError> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(SessionError::Connect("connection refused".to_string()));
            }
            Ok(Box::new(FakeSession {
                alive: Arc::clone(&self.alive),
            }))
        }
    }

    fn quick_pool(transport: Arc<dyn Transport>) -> ConnectionPool {
        ConnectionPool::new(
            transport,
            PoolConfig {
                connect_attempts: 3,
                connect_backoff: Duration::from_millis(1),
                max_sessions_per_node: 1,
            },
        )
    }

    #[tokio::test]
    async fn test_healthy_release_reuses_session() {
        let transport = Arc::new(FakeTransport::new(0));
        let pool = quick_pool(transport);

        let lease = pool.acquire(&node(0)).await.unwrap();
        lease.release(true);
        let lease = pool.acquire(&node(0)).await.unwrap();
        lease.release(true);

        assert_eq!(pool.total_connects(), 1);
    }

    #[tokio::test]
    async fn test_unhealthy_release_forces_reconnect() {
        let transport = Arc::new(FakeTransport::new(0));
        let pool = quick_pool(transport);

        let lease = pool.acquire(&node(0)).await.unwrap();
        lease.release(false);
        let lease = pool.acquire(&node(0)).await.unwrap();
        lease.release(true);

        assert_eq!(pool.total_connects(), 2);
    }

    #[tokio::test]
    async fn test_dropped_lease_discards_session() {
        let transport = Arc::new(FakeTransport::new(0));
        let pool = quick_pool(transport);

        let lease = pool.acquire(&node(0)).await.unwrap();
        drop(lease);
        assert_eq!(pool.active_leases(), 0);

        pool.acquire(&node(0)).await.unwrap().release(true);
        assert_eq!(pool.total_connects(), 2);
    }

    #[tokio::test]
    async fn test_stale_cached_session_is_repaired() {
        let transport = Arc::new(FakeTransport::new(0));
        let alive = Arc::clone(&transport.alive);
        let pool = quick_pool(transport);

        pool.acquire(&node(0)).await.unwrap().release(true);

        // Kill the cached session behind the pool's back; the probe on the
        // next acquire must discard it and connect again.
        alive.store(false, Ordering::SeqCst);
        let lease = pool.acquire(&node(0)).await.unwrap();
        lease.release(true);

        assert_eq!(pool.total_connects(), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_with_backoff() {
        let transport = Arc::new(FakeTransport::new(2));
        let pool = quick_pool(transport);

        let lease = pool.acquire(&node(0)).await.unwrap();
        lease.release(true);
        // Two refused attempts plus the one that succeeded.
        assert_eq!(pool.total_connects(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_reconnects_fail_with_connection_unavailable() {
        let transport = Arc::new(FakeTransport::new(10));
        let pool = quick_pool(transport);

        let err = pool.acquire(&node(0)).await.unwrap_err();
        let PoolError::ConnectionUnavailable { attempts, .. } = err;
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_auth_rejection_short_circuits_backoff() {
        struct AuthFail;

        #[async_trait]
        impl Transport for AuthFail {
            async fn connect(
                &self,
                _node: &NodeDescriptor,
            ) -> Result<Box<dyn RemoteSession>, SessionError> {
                Err(SessionError::Auth("permission denied".to_string()))
            }
        }

        let pool = quick_pool(Arc::new(AuthFail));
        let err = pool.acquire(&node(0)).await.unwrap_err();
        assert!(err.to_string().contains("authentication rejected"));
    }

    #[tokio::test]
    async fn test_second_acquire_waits_for_lease() {
        let transport = Arc::new(FakeTransport::new(0));
        let pool = Arc::new(quick_pool(transport));

        let lease = pool.acquire(&node(0)).await.unwrap();

        let contender = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let lease = pool.acquire(&node(0)).await.unwrap();
                lease.release(true);
            })
        };

        // The contender cannot finish while the lease is held.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        lease.release(true);
        contender.await.unwrap();
        assert_eq!(pool.peak_leases(), 1);
    }

    #[tokio::test]
    async fn test_session_cap_allows_concurrent_leases_per_node() {
        let transport = Arc::new(FakeTransport::new(0));
        let pool = ConnectionPool::new(
            transport,
            PoolConfig {
                connect_attempts: 3,
                connect_backoff: Duration::from_millis(1),
                max_sessions_per_node: 2,
            },
        );

        let first = pool.acquire(&node(0)).await.unwrap();
        let second = pool.acquire(&node(0)).await.unwrap();
        assert_eq!(pool.active_leases(), 2);
        assert_eq!(pool.total_connects(), 2);

        first.release(true);
        second.release(true);

        // Both sessions are back in the idle set and get reused.
        pool.acquire(&node(0)).await.unwrap().release(true);
        pool.acquire(&node(0)).await.unwrap().release(true);
        assert_eq!(pool.total_connects(), 2);
    }
}
