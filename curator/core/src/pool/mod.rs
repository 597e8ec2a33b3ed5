//! Agent Pool
//!
//! The pool owns every worker, partitioned by agent type, and is the only
//! entry point for requests. It is an explicit handle: construct one at
//! startup, [`initialize`](AgentPool::initialize) it, clone it into every
//! call site, and [`shutdown`](AgentPool::shutdown) it on exit.
//!
//! # Lifecycle
//!
//! ```text
//!   UNINITIALIZED ──initialize()──► INITIALIZED ──shutdown()──► SHUT_DOWN
//!                   prewarm workers               fail queued requests
//!                   start intake loop             drain in-flight work
//!                                                 close the router client
//! ```
//!
//! Requests are refused (FAILED, `agent_id = "unassigned"`) outside
//! INITIALIZED.
//!
//! # Checkout
//!
//! A worker is moved out of its type's idle list for one request and moved
//! back only when its status is terminal. The idle lists sit behind a
//! `parking_lot::Mutex` that is never held across an `.await`, so a worker
//! can never be handed to two requests.
//!
//! # Sizing
//!
//! [`PoolBound::Unbounded`] creates a worker whenever the idle list is
//! empty. [`PoolBound::Bounded`] caps live workers per type with a
//! semaphore and either waits for a free worker within the request's
//! timeout budget or rejects immediately.

mod health;
mod intake;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use crate::agents::{
    AgentError, AgentRequest, AgentResponse, AgentType, HandlerRegistry, StatusCell,
    Worker, WorkerServices, UNASSIGNED_AGENT_ID,
};

pub use health::{PoolHealth, PoolStatistics};
use intake::{IntakeQueue, QueuedRequest};

// ============================================================================
// Configuration
// ============================================================================

/// What a bounded pool does when every worker of a type is busy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Wait for a worker, up to the request's timeout budget
    #[default]
    Block,
    /// Fail the request immediately
    Reject,
}

impl FromStr for ExhaustionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown exhaustion policy: {other}")),
        }
    }
}

/// Worker growth policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PoolBound {
    /// Create a worker whenever none is idle
    #[default]
    Unbounded,
    /// At most `max_per_type` live workers per agent type
    Bounded {
        /// Worker cap per agent type
        max_per_type: usize,
        /// Behavior when the cap is reached
        on_exhausted: ExhaustionPolicy,
    },
}

/// Pool settings
#[derive(Clone, Debug, PartialEq)]
pub struct PoolConfig {
    /// Workers created per agent type on initialize
    pub prewarm_per_type: usize,
    /// Growth policy
    pub bound: PoolBound,
    /// Intake queue capacity
    pub max_queue_depth: usize,
    /// How long shutdown waits for in-flight requests
    pub drain_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            prewarm_per_type: 2,
            bound: PoolBound::Unbounded,
            max_queue_depth: 1000,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Set the prewarm count
    #[must_use]
    pub fn with_prewarm(mut self, per_type: usize) -> Self {
        self.prewarm_per_type = per_type;
        self
    }

    /// Cap live workers per type
    #[must_use]
    pub fn bounded(mut self, max_per_type: usize, on_exhausted: ExhaustionPolicy) -> Self {
        self.bound = PoolBound::Bounded {
            max_per_type,
            on_exhausted,
        };
        self
    }

    /// Set the intake queue capacity
    #[must_use]
    pub fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    /// Set the shutdown drain timeout
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Check internal consistency
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_queue_depth == 0 {
            return Err(PoolError::InvalidConfig("max_queue_depth must be at least 1".into()));
        }
        if let PoolBound::Bounded { max_per_type, .. } = self.bound {
            if max_per_type == 0 {
                return Err(PoolError::InvalidConfig(
                    "max_workers_per_type must be at least 1".into(),
                ));
            }
            if self.prewarm_per_type > max_per_type {
                return Err(PoolError::InvalidConfig(format!(
                    "prewarm_per_type ({}) exceeds max_workers_per_type ({max_per_type})",
                    self.prewarm_per_type
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Errors and State
// ============================================================================

/// Pool-level failures
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// `initialize` has not run
    #[error("agent pool is not initialized")]
    NotInitialized,

    /// `shutdown` has run
    #[error("agent pool is shut down")]
    ShutDown,

    /// `initialize` called twice
    #[error("agent pool is already initialized")]
    AlreadyInitialized,

    /// Inconsistent configuration
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// Bounded pool with the reject policy had no free worker
    #[error("pool exhausted: no {0} worker available")]
    Exhausted(AgentType),

    /// Bounded pool with the block policy waited out the request's budget
    #[error("timed out waiting for a {0} worker")]
    AcquireTimeout(AgentType),

    /// Intake queue at capacity
    #[error("intake queue is full ({0} pending)")]
    QueueFull(usize),

    /// Worker construction failed
    #[error(transparent)]
    Worker(#[from] AgentError),
}

/// Pool lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    /// Constructed, not yet serving
    Uninitialized,
    /// Serving requests
    Initialized,
    /// Stopped for good
    ShutDown,
}

// ============================================================================
// Pool
// ============================================================================

struct TrackedWorker {
    agent_type: AgentType,
    status: Arc<StatusCell>,
}

struct PoolInner {
    config: PoolConfig,
    services: Arc<WorkerServices>,
    registry: HandlerRegistry,
    state: RwLock<PoolState>,
    idle: Mutex<HashMap<AgentType, VecDeque<Worker>>>,
    workers: DashMap<String, TrackedWorker>,
    limits: HashMap<AgentType, Arc<Semaphore>>,
    queue: Mutex<IntakeQueue>,
    queue_notify: Arc<Notify>,
    shutdown: CancellationToken,
    intake_task: Mutex<Option<JoinHandle<()>>>,
    in_flight: AtomicUsize,
    drained: Notify,
    processed: AtomicU64,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        // Wakes the intake loop so it can notice the pool is gone
        self.shutdown.cancel();
    }
}

impl PoolInner {
    fn release(&self, mut worker: Worker) {
        let accepting = *self.state.read() != PoolState::ShutDown;

        if accepting && worker.status().is_terminal() && worker.reset().is_ok() {
            self.idle
                .lock()
                .entry(worker.agent_type())
                .or_default()
                .push_back(worker);
        } else {
            if accepting {
                tracing::warn!(
                    worker_id = worker.id(),
                    status = %worker.status(),
                    "Worker returned in a non-terminal state, retiring it"
                );
            }
            self.workers.remove(worker.id());
        }
    }
}

/// Capacity reserved for a queued request before it leaves the queue
struct Admission(Option<OwnedSemaphorePermit>);

impl PoolInner {
    /// Pop the most urgent queued request that has a worker slot free
    fn next_admitted(&self) -> Option<(QueuedRequest, Admission)> {
        self.queue
            .lock()
            .pop_admitted(|request| match self.limits.get(&request.agent_type) {
                Some(semaphore) => Arc::clone(semaphore)
                    .try_acquire_owned()
                    .ok()
                    .map(|permit| Admission(Some(permit))),
                None => Some(Admission(None)),
            })
    }
}

/// Exclusive hold on one checked-out worker
struct Lease {
    inner: Arc<PoolInner>,
    worker: Option<Worker>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Lease {
    fn release(mut self) {
        if let Some(worker) = self.worker.take() {
            self.inner.release(worker);
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        // Still holding a worker means the request was cancelled or panicked mid-flight
        if let Some(worker) = self.worker.take() {
            tracing::warn!(
                worker_id = worker.id(),
                status = %worker.status(),
                "Worker abandoned mid-request, retiring it"
            );
            self.inner.workers.remove(worker.id());
        }
        if let Some(permit) = self.permit.take() {
            drop(permit);
            // A slot opened up; the intake loop may have a request waiting for it
            self.inner.queue_notify.notify_one();
        }
    }
}

struct InFlight<'a>(&'a PoolInner);

impl<'a> InFlight<'a> {
    fn enter(inner: &'a PoolInner) -> Self {
        inner.in_flight.fetch_add(1, Ordering::AcqRel);
        Self(inner)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

/// Handle on a pool of agent workers
///
/// Cheap to clone; all clones share the same workers, cache and queue.
#[derive(Clone)]
pub struct AgentPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPool")
            .field("state", &self.state())
            .field("workers", &self.inner.workers.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl AgentPool {
    /// Pool with the built-in handler for every agent type
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if `config` is inconsistent.
    pub fn new(services: WorkerServices, config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_registry(services, config, HandlerRegistry::standard())
    }

    /// Pool dispatching through a custom handler registry
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if `config` is inconsistent.
    pub fn with_registry(
        services: WorkerServices,
        config: PoolConfig,
        registry: HandlerRegistry,
    ) -> Result<Self, PoolError> {
        config.validate()?;

        let limits = match config.bound {
            PoolBound::Unbounded => HashMap::new(),
            PoolBound::Bounded { max_per_type, .. } => registry
                .agent_types()
                .into_iter()
                .map(|t| (t, Arc::new(Semaphore::new(max_per_type))))
                .collect(),
        };

        Ok(Self {
            inner: Arc::new(PoolInner {
                queue: Mutex::new(IntakeQueue::new(config.max_queue_depth)),
                config,
                services: Arc::new(services),
                registry,
                state: RwLock::new(PoolState::Uninitialized),
                idle: Mutex::new(HashMap::new()),
                workers: DashMap::new(),
                limits,
                queue_notify: Arc::new(Notify::new()),
                shutdown: CancellationToken::new(),
                intake_task: Mutex::new(None),
                in_flight: AtomicUsize::new(0),
                drained: Notify::new(),
                processed: AtomicU64::new(0),
            }),
        })
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> PoolState {
        *self.inner.state.read()
    }

    /// Pool settings
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Prewarm workers and start the intake loop
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AlreadyInitialized` or `PoolError::ShutDown` when
    /// called out of order, or a worker construction error.
    pub fn initialize(&self) -> Result<(), PoolError> {
        {
            let mut state = self.inner.state.write();
            match *state {
                PoolState::Uninitialized => {}
                PoolState::Initialized => return Err(PoolError::AlreadyInitialized),
                PoolState::ShutDown => return Err(PoolError::ShutDown),
            }

            for agent_type in self.inner.registry.agent_types() {
                let mut warmed = VecDeque::with_capacity(self.inner.config.prewarm_per_type);
                for _ in 0..self.inner.config.prewarm_per_type {
                    warmed.push_back(self.spawn_worker(agent_type)?);
                }
                self.inner.idle.lock().insert(agent_type, warmed);
            }

            *state = PoolState::Initialized;
        }

        let task = tokio::spawn(intake_loop(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.queue_notify),
            self.inner.shutdown.clone(),
        ));
        *self.inner.intake_task.lock() = Some(task);

        tracing::info!(
            workers = self.inner.workers.len(),
            agent_types = self.inner.registry.agent_types().len(),
            "Agent pool initialized"
        );
        Ok(())
    }

    // ========================================================================
    // Request entry points
    // ========================================================================

    /// Process one request on a worker of its type
    ///
    /// Never fails: pool-level problems come back as FAILED (or TIMEOUT when
    /// a bounded pool could not supply a worker within the budget).
    pub async fn process_request(&self, request: AgentRequest) -> AgentResponse {
        self.run(request, Instant::now(), Admission(None)).await
    }

    async fn run(&self, request: AgentRequest, started: Instant, admission: Admission) -> AgentResponse {
        let agent_type = request.agent_type;

        if let Err(e) = self.ensure_accepting() {
            tracing::debug!(agent_type = %agent_type, error = %e, "Request refused");
            return AgentResponse::failed(UNASSIGNED_AGENT_ID, agent_type, e.to_string(), started.elapsed());
        }

        let _in_flight = InFlight::enter(&self.inner);
        match AssertUnwindSafe(self.dispatch(&request, started, admission))
            .catch_unwind()
            .await
        {
            Ok(response) => response,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(agent_type = %agent_type, panic = %message, "Request processing panicked");
                AgentResponse::failed(
                    UNASSIGNED_AGENT_ID,
                    agent_type,
                    format!("processing panicked: {message}"),
                    started.elapsed(),
                )
            }
        }
    }

    /// Process many requests concurrently
    ///
    /// Returns exactly one response per request, in input order. A failing
    /// member becomes a FAILED response at its index.
    pub async fn process_batch(&self, requests: Vec<AgentRequest>) -> Vec<AgentResponse> {
        self.process_batch_with_cancel(requests, &CancellationToken::new())
            .await
    }

    /// [`process_batch`](Self::process_batch) that stops outstanding members when
    /// `cancel` fires
    ///
    /// Members already finished keep their responses; the rest come back
    /// FAILED with the error `"cancelled"`. Dropping the returned future
    /// aborts every member still running.
    pub async fn process_batch_with_cancel(
        &self,
        requests: Vec<AgentRequest>,
        cancel: &CancellationToken,
    ) -> Vec<AgentResponse> {
        let agent_types: Vec<AgentType> = requests.iter().map(|r| r.agent_type).collect();
        tracing::debug!(size = requests.len(), "Dispatching batch");

        // Dropping the batch aborts whatever is still running
        let handles: Vec<AbortOnDropHandle<AgentResponse>> = requests
            .into_iter()
            .map(|request| {
                let pool = self.clone();
                let cancel = cancel.clone();
                AbortOnDropHandle::new(tokio::spawn(async move {
                    let agent_type = request.agent_type;
                    tokio::select! {
                        biased;
                        response = pool.process_request(request) => response,
                        () = cancel.cancelled() => AgentResponse::failed(
                            UNASSIGNED_AGENT_ID,
                            agent_type,
                            "cancelled",
                            Duration::ZERO,
                        ),
                    }
                }))
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(agent_types)
            .map(|(joined, agent_type)| {
                joined.unwrap_or_else(|e| {
                    tracing::error!(agent_type = %agent_type, error = %e, "Batch member task failed");
                    AgentResponse::failed(UNASSIGNED_AGENT_ID, agent_type, e.to_string(), Duration::ZERO)
                })
            })
            .collect()
    }

    /// Queue a request for the background intake loop
    ///
    /// # Errors
    ///
    /// Returns `PoolError::NotInitialized`/`ShutDown` outside INITIALIZED, or
    /// `PoolError::QueueFull` at capacity.
    pub fn enqueue(&self, request: AgentRequest) -> Result<oneshot::Receiver<AgentResponse>, PoolError> {
        self.ensure_accepting()?;

        let (tx, rx) = oneshot::channel();
        self.inner
            .queue
            .lock()
            .push(QueuedRequest::new(request, tx))?;
        self.inner.queue_notify.notify_one();
        Ok(rx)
    }

    // ========================================================================
    // Health and statistics
    // ========================================================================

    /// Classify pool health from the workers' last outcomes
    #[must_use]
    pub fn health_check(&self) -> PoolHealth {
        let total = self.inner.workers.len();
        let failed = self
            .inner
            .workers
            .iter()
            .filter(|w| w.status.carries_failure())
            .count();
        let health = PoolHealth::from_counts(total, failed);
        tracing::debug!(total, failed, health = %health, "Pool health checked");
        health
    }

    /// Snapshot of pool counters
    #[must_use]
    pub fn get_statistics(&self) -> PoolStatistics {
        let mut agent_types = BTreeMap::new();
        let mut status_counts = BTreeMap::new();
        let mut failure_carrying = 0;

        for entry in &self.inner.workers {
            *agent_types.entry(entry.agent_type).or_insert(0) += 1;
            *status_counts.entry(entry.status.current()).or_insert(0) += 1;
            if entry.status.carries_failure() {
                failure_carrying += 1;
            }
        }

        let idle_workers = self.inner.idle.lock().values().map(VecDeque::len).sum();

        PoolStatistics {
            total_workers: agent_types.values().sum(),
            agent_types,
            status_counts,
            failure_carrying,
            idle_workers,
            queue_size: self.inner.queue.lock().len(),
            in_flight: self.inner.in_flight.load(Ordering::Acquire),
            requests_processed: self.inner.processed.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop accepting work, drain, and release every worker
    ///
    /// Queued requests receive FAILED responses. In-flight requests get up
    /// to the configured drain timeout to finish. Idempotent.
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.write();
            if *state == PoolState::ShutDown {
                return;
            }
            *state = PoolState::ShutDown;
        }

        self.inner.shutdown.cancel();
        let intake = self.inner.intake_task.lock().take();
        if let Some(task) = intake {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Intake loop ended abnormally");
            }
        }

        // Wake bounded-pool waiters so they fail instead of holding up the drain
        for semaphore in self.inner.limits.values() {
            semaphore.close();
        }

        let queued = self.inner.queue.lock().drain();
        let refused = queued.len();
        for item in queued {
            let _ = item.reply.send(AgentResponse::failed(
                UNASSIGNED_AGENT_ID,
                item.request.agent_type,
                PoolError::ShutDown.to_string(),
                Duration::ZERO,
            ));
        }

        if tokio::time::timeout(self.inner.config.drain_timeout, self.wait_drained())
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = self.inner.in_flight.load(Ordering::Acquire),
                "Shutdown drain timed out, abandoning in-flight requests"
            );
        }

        self.inner.services.backend.close().await;

        let released: usize = self
            .inner
            .idle
            .lock()
            .drain()
            .map(|(_, workers)| workers.len())
            .sum();
        self.inner.workers.clear();

        tracing::info!(
            released,
            refused,
            processed = self.inner.processed.load(Ordering::Relaxed),
            "Agent pool shut down"
        );
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_accepting(&self) -> Result<(), PoolError> {
        match *self.inner.state.read() {
            PoolState::Initialized => Ok(()),
            PoolState::Uninitialized => Err(PoolError::NotInitialized),
            PoolState::ShutDown => Err(PoolError::ShutDown),
        }
    }

    async fn dispatch(&self, request: &AgentRequest, started: Instant, admission: Admission) -> AgentResponse {
        let agent_type = request.agent_type;
        let budget = request.timeout.saturating_sub(started.elapsed());

        let mut lease = match self.acquire(agent_type, budget, admission).await {
            Ok(lease) => lease,
            Err(e @ PoolError::AcquireTimeout(_)) => {
                tracing::warn!(agent_type = %agent_type, "No worker freed up within the timeout budget");
                return AgentResponse::timed_out(UNASSIGNED_AGENT_ID, agent_type, e.to_string(), started.elapsed());
            }
            Err(e) => {
                tracing::warn!(agent_type = %agent_type, error = %e, "Could not acquire a worker");
                return AgentResponse::failed(UNASSIGNED_AGENT_ID, agent_type, e.to_string(), started.elapsed());
            }
        };

        let budget = request.timeout.saturating_sub(started.elapsed());
        let response = match lease.worker.as_mut() {
            Some(worker) => worker.process_with_budget(request, budget).await,
            None => AgentResponse::failed(UNASSIGNED_AGENT_ID, agent_type, "lease held no worker", started.elapsed()),
        };
        lease.release();

        self.inner.processed.fetch_add(1, Ordering::Relaxed);
        response
    }

    async fn acquire(&self, agent_type: AgentType, budget: Duration, admission: Admission) -> Result<Lease, PoolError> {
        let reserved = admission.0;
        let permit = match (self.inner.config.bound, self.inner.limits.get(&agent_type)) {
            _ if reserved.is_some() => reserved,
            (PoolBound::Bounded { on_exhausted, .. }, Some(semaphore)) => {
                let semaphore = Arc::clone(semaphore);
                let permit = match on_exhausted {
                    ExhaustionPolicy::Reject => semaphore
                        .try_acquire_owned()
                        .map_err(|_| PoolError::Exhausted(agent_type))?,
                    ExhaustionPolicy::Block => tokio::time::timeout(budget, semaphore.acquire_owned())
                        .await
                        .map_err(|_| PoolError::AcquireTimeout(agent_type))?
                        .map_err(|_| PoolError::ShutDown)?,
                };
                Some(permit)
            }
            _ => None,
        };

        let popped = self
            .inner
            .idle
            .lock()
            .get_mut(&agent_type)
            .and_then(VecDeque::pop_front);

        let worker = match popped {
            Some(worker) => worker,
            None => self.spawn_worker(agent_type)?,
        };

        Ok(Lease {
            inner: Arc::clone(&self.inner),
            worker: Some(worker),
            permit,
        })
    }

    fn spawn_worker(&self, agent_type: AgentType) -> Result<Worker, PoolError> {
        let handler = self
            .inner
            .registry
            .get(agent_type)
            .ok_or(AgentError::NoHandler(agent_type))?;
        let worker = Worker::new(agent_type, handler, Arc::clone(&self.inner.services))?;

        self.inner.workers.insert(
            worker.id().to_string(),
            TrackedWorker {
                agent_type,
                status: worker.status_cell(),
            },
        );
        tracing::debug!(worker_id = worker.id(), agent_type = %agent_type, "Created worker");
        Ok(worker)
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn intake_loop(pool: Weak<PoolInner>, notify: Arc<Notify>, shutdown: CancellationToken) {
    tracing::debug!("Intake loop started");
    while !shutdown.is_cancelled() {
        let next = match pool.upgrade() {
            Some(inner) => inner
                .next_admitted()
                .map(|(queued, admission)| (AgentPool { inner }, queued, admission)),
            None => break,
        };

        match next {
            Some((pool, queued, admission)) => {
                tracing::debug!(
                    agent_type = %queued.request.agent_type,
                    priority = queued.request.priority,
                    waited_ms = queued.queued_at.elapsed().as_millis() as u64,
                    "Dequeued request"
                );
                tokio::spawn(async move {
                    // Time spent queued counts against the request's budget
                    let response = pool.run(queued.request, queued.queued_at, admission).await;
                    // Receiver may have given up; nothing to do then
                    let _ = queued.reply.send(response);
                });
            }
            None => {
                // Woken by a new request or by a released worker slot
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = notify.notified() => {}
                }
            }
        }
    }
    tracing::debug!("Intake loop stopped");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
