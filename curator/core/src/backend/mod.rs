//! Model Router Integration
//!
//! Agents never talk to a model provider directly. Every generation goes
//! through a [`RoutingBackend`], which forwards a provider-agnostic
//! [`RouteRequest`] envelope to a multi-model router. The router picks the
//! model and fails over between models on its side; this crate only sees a
//! [`RouteResponse`] or a [`RoutingError`].
//!
//! # Available Backends
//!
//! - **Requesty**: HTTP router speaking `POST /route` (default)
//!
//! # Usage
//!
//! ```ignore
//! use curator_core::backend::{RequestyClient, RequestyConfig, RouteRequest, RoutingBackend};
//!
//! let client = RequestyClient::new(RequestyConfig::from_env())?;
//! let request = RouteRequest::new("Summarize this", &profile);
//! let response = client.route(&request).await?;
//! ```

mod requesty;
mod retry;
mod traits;

pub use requesty::{RequestyClient, RequestyConfig, DEFAULT_ROUTER_URL};
pub use retry::RetryConfig;
pub use traits::{
    RouteRequest, RouteResponse, RoutingBackend, RoutingError, FALLBACK_STRATEGY,
    ROUTING_STRATEGY,
};
