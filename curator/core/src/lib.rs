//! Curator Core - Agent Pool Orchestration for Content Curation
//!
//! This crate runs a pool of reusable, type-specialized workers that turn
//! content-curation requests (write a post, check compliance, validate
//! health claims, optimize for a platform, ...) into structured results.
//! Generation is delegated to a multi-model router; results are cached by
//! content fingerprint and every live outcome is handed to a result sink.
//!
//! # Architecture
//!
//! ```text
//!   callers ──process_request / process_batch──┐
//!   curator-intake ──enqueue──► IntakeQueue ───┤
//!                                              ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           AgentPool                              │
//! │   idle lists per AgentType      worker registry (health, stats)  │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐                    │
//! │  │ Worker     │ │ Worker     │ │ Worker     │  ...               │
//! │  │ (creator)  │ │(compliance)│ │(moderator) │                    │
//! │  └─────┬──────┘ └─────┬──────┘ └─────┬──────┘                    │
//! └────────┼──────────────┼──────────────┼───────────────────────────┘
//!          │  TaskHandler │              │
//!          ▼              ▼              ▼
//!   ┌─────────────┐ ┌───────────────┐ ┌──────────────┐
//!   │ ResultCache │ │RoutingBackend │ │  ResultSink  │
//!   │ (in-memory) │ │  (Requesty)   │ │  (tracing)   │
//!   └─────────────┘ └───────────────┘ └──────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`AgentPool`]: owns the workers; the only entry point for requests
//! - [`AgentRequest`] / [`AgentResponse`]: the unit of work and its outcome
//! - [`Worker`]: stateful executor bound to one [`AgentType`]
//! - [`RoutingBackend`]: model router seam, [`RequestyClient`] over HTTP
//! - [`ResultCache`]: fail-open result store, [`MemoryCache`] by default
//!
//! # Quick Start
//!
//! ```ignore
//! use curator_core::{load_config, AgentRequest, AgentType};
//!
//! let pool = load_config()?.build_pool()?;
//! pool.initialize()?;
//!
//! let input = serde_json::json!({ "brief": "Morning routine tips" });
//! let request = AgentRequest::new(AgentType::ContentCreator, input.as_object().cloned().unwrap_or_default());
//! let response = pool.process_request(request).await;
//!
//! pool.shutdown().await;
//! ```
//!
//! # Module Overview
//!
//! - [`agents`]: request/response types, workers and the task handlers
//! - [`backend`]: model router client and retry policy
//! - [`cache`]: cache keys and the result cache
//! - [`config`]: TOML + environment + CLI configuration
//! - [`persistence`]: result sink contract
//! - [`pool`]: the agent pool, health and statistics

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod agents;
pub mod backend;
pub mod cache;
pub mod config;
pub mod persistence;
pub mod pool;

// Re-exports for convenience
pub use agents::{
    AgentError, AgentProfile, AgentProfiles, AgentRequest, AgentResponse, AgentStatus, AgentType,
    BrandGuidelines, HandlerRegistry, Payload, PlatformCatalog, TaskHandler, Worker,
    WorkerServices,
};
pub use backend::{
    RequestyClient, RequestyConfig, RetryConfig, RouteRequest, RouteResponse, RoutingBackend,
    RoutingError,
};
pub use cache::{CacheError, CacheKey, CacheStats, MemoryCache, ResultCache};
pub use persistence::{ResultSink, SinkError, StoredResult, TracingSink};
pub use pool::{
    AgentPool, ExhaustionPolicy, PoolBound, PoolConfig, PoolError, PoolHealth, PoolState,
    PoolStatistics,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, CuratorConfig, CuratorToml,
};
