//! Worker
//!
//! A stateful executor bound to one agent type. The pool moves a worker out
//! of its idle list for the duration of one request, so a worker is never
//! held by two requests at once. Its status lives in a shared
//! [`StatusCell`] so health and statistics can observe checked-out workers.
//!
//! # Per-request flow
//!
//! ```text
//!   IDLE ─► PROCESSING ─┬─ cache hit ─────────────────────────────┐
//!                       └─ miss ─► handler ─► router ─► parse ─┐   │
//!                                              cache.set ◄─────┘   │
//!                              persist (spawned) ◄──────────────────┤
//!                       COMPLETED | FAILED | TIMEOUT ◄─────────────┘
//! ```
//!
//! The whole lookup/handler/store sequence runs under the request's timeout
//! budget; exceeding it yields TIMEOUT, any error yields FAILED. Nothing
//! escapes `process` as an error.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::confidence::{self, DEFAULT_CONFIDENCE, DEGRADED_CONFIDENCE};
use super::guidelines::{AgentProfiles, BrandGuidelines, PlatformCatalog};
use super::handlers::{HandlerContext, TaskHandler};
use super::types::{AgentRequest, AgentResponse, AgentStatus, AgentType, Payload};
use super::AgentError;
use crate::backend::{RetryConfig, RoutingBackend};
use crate::cache::{CacheKey, MemoryCache, ResultCache, DEFAULT_CACHE_TTL};
use crate::persistence::{ResultSink, StoredResult, TracingSink};

// ============================================================================
// Shared Services
// ============================================================================

/// Collaborators shared by every worker in a pool
pub struct WorkerServices {
    /// Model router
    pub backend: Arc<dyn RoutingBackend>,
    /// Result cache
    pub cache: Arc<dyn ResultCache>,
    /// Result persistence
    pub sink: Arc<dyn ResultSink>,
    /// Time-to-live for cached results
    pub cache_ttl: Duration,
    /// Backoff policy for routing retries
    pub retry: RetryConfig,
    /// Per-agent model settings
    pub profiles: AgentProfiles,
    /// Brand guidelines embedded in prompts
    pub guidelines: BrandGuidelines,
    /// Social platform constraints
    pub platforms: PlatformCatalog,
}

impl std::fmt::Debug for WorkerServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerServices")
            .field("backend", &self.backend.name())
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

impl WorkerServices {
    /// Services with an in-memory cache, a logging sink and default policy
    pub fn new(backend: Arc<dyn RoutingBackend>) -> Self {
        Self {
            backend,
            cache: Arc::new(MemoryCache::default()),
            sink: Arc::new(TracingSink),
            cache_ttl: DEFAULT_CACHE_TTL,
            retry: RetryConfig::default(),
            profiles: AgentProfiles::default(),
            guidelines: BrandGuidelines::default(),
            platforms: PlatformCatalog::default(),
        }
    }

    /// Use a different cache
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Use a different result sink
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Set the cache time-to-live
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the agent profiles
    #[must_use]
    pub fn with_profiles(mut self, profiles: AgentProfiles) -> Self {
        self.profiles = profiles;
        self
    }

    /// Set the brand guidelines
    #[must_use]
    pub fn with_guidelines(mut self, guidelines: BrandGuidelines) -> Self {
        self.guidelines = guidelines;
        self
    }

    /// Set the platform catalog
    #[must_use]
    pub fn with_platforms(mut self, platforms: PlatformCatalog) -> Self {
        self.platforms = platforms;
        self
    }
}

// ============================================================================
// Status Cell
// ============================================================================

const NO_OUTCOME: u8 = u8::MAX;

/// Worker status readable from outside the owning request
#[derive(Debug)]
pub struct StatusCell {
    current: AtomicU8,
    last_outcome: AtomicU8,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self {
            current: AtomicU8::new(AgentStatus::Idle as u8),
            last_outcome: AtomicU8::new(NO_OUTCOME),
        }
    }
}

impl StatusCell {
    /// Current status
    #[must_use]
    pub fn current(&self) -> AgentStatus {
        AgentStatus::from_u8(self.current.load(Ordering::Acquire))
    }

    /// Most recent terminal status, kept after the worker returns to IDLE
    #[must_use]
    pub fn last_outcome(&self) -> Option<AgentStatus> {
        match self.last_outcome.load(Ordering::Acquire) {
            NO_OUTCOME => None,
            value => Some(AgentStatus::from_u8(value)),
        }
    }

    /// Whether the last outcome was FAILED
    #[must_use]
    pub fn carries_failure(&self) -> bool {
        self.last_outcome() == Some(AgentStatus::Failed)
    }

    fn transition(&self, to: AgentStatus) -> Result<AgentStatus, AgentError> {
        let mut current = self.current.load(Ordering::Acquire);
        loop {
            let from = AgentStatus::from_u8(current);
            if !from.can_transition_to(to) {
                return Err(AgentError::InvalidTransition { from, to });
            }
            match self.current.compare_exchange_weak(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if to.is_terminal() {
                        self.last_outcome.store(to as u8, Ordering::Release);
                    }
                    return Ok(from);
                }
                Err(actual) => current = actual,
            }
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

struct Execution {
    payload: Payload,
    confidence: f64,
    cache_hit: bool,
}

/// Reusable executor for one agent type
pub struct Worker {
    id: String,
    agent_type: AgentType,
    status: Arc<StatusCell>,
    handler: Arc<dyn TaskHandler>,
    services: Arc<WorkerServices>,
    requests_served: u64,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("agent_type", &self.agent_type)
            .field("status", &self.status.current())
            .field("requests_served", &self.requests_served)
            .finish()
    }
}

impl Worker {
    /// Create an idle worker running `handler`
    ///
    /// # Errors
    ///
    /// Returns `AgentError::TypeMismatch` if the handler serves another type.
    pub fn new(
        agent_type: AgentType,
        handler: Arc<dyn TaskHandler>,
        services: Arc<WorkerServices>,
    ) -> Result<Self, AgentError> {
        if handler.agent_type() != agent_type {
            return Err(AgentError::TypeMismatch {
                worker: agent_type,
                request: handler.agent_type(),
            });
        }

        let id = format!("{}-{}", agent_type, &uuid::Uuid::new_v4().simple().to_string()[..8]);
        Ok(Self {
            id,
            agent_type,
            status: Arc::new(StatusCell::default()),
            handler,
            services,
            requests_served: 0,
        })
    }

    /// Worker identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Agent type, fixed at creation
    #[must_use]
    pub fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> AgentStatus {
        self.status.current()
    }

    /// Shared handle on the status
    #[must_use]
    pub fn status_cell(&self) -> Arc<StatusCell> {
        Arc::clone(&self.status)
    }

    /// Requests this worker has finished
    #[must_use]
    pub fn requests_served(&self) -> u64 {
        self.requests_served
    }

    /// Return a finished worker to IDLE
    ///
    /// # Errors
    ///
    /// Returns `AgentError::InvalidTransition` unless the status is terminal.
    pub fn reset(&mut self) -> Result<(), AgentError> {
        self.status.transition(AgentStatus::Idle).map(|_| ())
    }

    /// Run one request to a terminal status
    pub async fn process(&mut self, request: &AgentRequest) -> AgentResponse {
        self.process_with_budget(request, request.timeout).await
    }

    /// Run one request with `budget` in place of the request's own timeout
    ///
    /// The pool passes whatever is left after waiting for a free worker.
    pub async fn process_with_budget(&mut self, request: &AgentRequest, budget: Duration) -> AgentResponse {
        let started = Instant::now();

        if let Err(e) = self.status.transition(AgentStatus::Processing) {
            tracing::error!(worker_id = %self.id, error = %e, "Worker dispatched while busy");
            return AgentResponse::failed(&self.id, request.agent_type, e.to_string(), started.elapsed());
        }

        let response = if request.agent_type == self.agent_type {
            match tokio::time::timeout(budget, self.execute(request)).await {
                Ok(Ok(done)) => AgentResponse::completed(
                    &self.id,
                    self.agent_type,
                    done.payload,
                    done.confidence,
                    started.elapsed(),
                )
                .with_cache_hit(done.cache_hit),
                Ok(Err(e)) => {
                    tracing::error!(
                        worker_id = %self.id,
                        agent_type = %self.agent_type,
                        error = %e,
                        "Agent processing failed"
                    );
                    AgentResponse::failed(&self.id, self.agent_type, e.to_string(), started.elapsed())
                }
                Err(_) => {
                    tracing::warn!(
                        worker_id = %self.id,
                        agent_type = %self.agent_type,
                        timeout_ms = budget.as_millis() as u64,
                        "Agent processing timed out"
                    );
                    AgentResponse::timed_out(
                        &self.id,
                        self.agent_type,
                        format!(
                            "processing exceeded timeout of {:.3}s",
                            budget.as_secs_f64()
                        ),
                        started.elapsed(),
                    )
                }
            }
        } else {
            let e = AgentError::TypeMismatch {
                worker: self.agent_type,
                request: request.agent_type,
            };
            AgentResponse::failed(&self.id, request.agent_type, e.to_string(), started.elapsed())
        };

        if !response.cache_hit() {
            self.persist(request, &response);
        }

        if let Err(e) = self.status.transition(response.status) {
            tracing::error!(worker_id = %self.id, error = %e, "Worker status corrupted");
        }
        self.requests_served += 1;

        tracing::debug!(
            worker_id = %self.id,
            status = %response.status,
            cache_hit = response.cache_hit(),
            duration_ms = response.processing_time.as_millis() as u64,
            "Request finished"
        );
        response
    }

    async fn execute(&self, request: &AgentRequest) -> Result<Execution, AgentError> {
        let key = CacheKey::for_request(request);

        match self.services.cache.get(&key).await {
            Ok(Some(payload)) => {
                tracing::debug!(worker_id = %self.id, key = %key, "Cache hit");
                let confidence = self.score(&payload, false);
                return Ok(Execution {
                    payload,
                    confidence,
                    cache_hit: true,
                });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(worker_id = %self.id, error = %e, "Cache read failed, treating as miss");
            }
        }

        let empty = Payload::new();
        let context = request.context.as_ref().unwrap_or(&empty);
        let ctx = HandlerContext::new(
            &self.id,
            self.agent_type,
            &request.input_data,
            context,
            &self.services,
            request.max_retries,
        );
        let output = self.handler.handle(&ctx).await?;

        if output.degraded {
            tracing::debug!(worker_id = %self.id, "Degraded result not cached");
        } else if let Err(e) = self
            .services
            .cache
            .set(&key, output.payload.clone(), self.services.cache_ttl)
            .await
        {
            tracing::warn!(worker_id = %self.id, error = %e, "Cache write failed");
        }

        let confidence = self.score(&output.payload, output.degraded);
        Ok(Execution {
            payload: output.payload,
            confidence,
            cache_hit: false,
        })
    }

    fn score(&self, payload: &Payload, degraded: bool) -> f64 {
        if degraded {
            return DEGRADED_CONFIDENCE;
        }
        confidence::clamp(self.handler.confidence(payload).unwrap_or(DEFAULT_CONFIDENCE))
    }

    fn persist(&self, request: &AgentRequest, response: &AgentResponse) {
        let record = StoredResult {
            agent_type: self.agent_type,
            input: request.input_data.clone(),
            output: response.result.clone().unwrap_or_default(),
            confidence: response.confidence_score,
            duration: response.processing_time,
            success: response.is_success(),
            error: response.error.clone(),
        };
        let sink = Arc::clone(&self.services.sink);
        let worker_id = self.id.clone();

        tokio::spawn(async move {
            if let Err(e) = sink.store_result(record).await {
                tracing::warn!(worker_id = %worker_id, error = %e, "Failed to persist agent result");
            }
        });
    }
}
