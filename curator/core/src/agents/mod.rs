//! Agents
//!
//! Workers, the handlers they dispatch to, and the request/response values
//! they exchange with the pool.
//!
//! # Submodules
//!
//! - [`types`]: request, response, agent type and status
//! - [`worker`]: the stateful executor and its per-request algorithm
//! - [`handlers`]: one [`TaskHandler`] per agent type and the dispatch table
//! - [`guidelines`]: brand, platform and model-profile context
//! - [`confidence`]: score helpers

pub mod confidence;
pub mod guidelines;
pub mod handlers;
pub mod types;
pub mod worker;

pub use guidelines::{AgentProfile, AgentProfiles, BrandGuidelines, PlatformCatalog, PlatformConstraints};
pub use handlers::{HandlerContext, HandlerOutput, HandlerRegistry, ParseError, TaskHandler};
pub use types::{
    duration_secs, AgentRequest, AgentResponse, AgentStatus, AgentType, Payload, UnknownAgentType,
    CACHE_HIT_KEY, DEFAULT_REQUEST_TIMEOUT, UNASSIGNED_AGENT_ID,
};
pub use worker::{StatusCell, Worker, WorkerServices};

use crate::backend::RoutingError;

/// Failure inside a worker; surfaced to callers only as a FAILED response
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The router call failed after any permitted retries
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// No handler registered for the agent type
    #[error("no handler registered for {0}")]
    NoHandler(AgentType),

    /// Request routed to a worker of another type
    #[error("worker for {worker} cannot process {request} requests")]
    TypeMismatch {
        /// Worker's agent type
        worker: AgentType,
        /// Request's agent type
        request: AgentType,
    },

    /// Illegal status transition
    #[error("invalid worker transition {from} -> {to}")]
    InvalidTransition {
        /// Status before
        from: AgentStatus,
        /// Requested status
        to: AgentStatus,
    },
}
