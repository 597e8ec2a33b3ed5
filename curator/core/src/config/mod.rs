//! TOML Configuration File Support
//!
//! Centralized configuration loading for the curator, from a TOML file at
//! `~/.config/curator/curator.toml`.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [router]
//! base_url = "https://api.requesty.ai"
//! request_timeout_secs = 60
//!
//! [pool]
//! prewarm_per_type = 2
//! max_workers_per_type = 8
//! exhaustion = "block"
//! max_queue_depth = 1000
//!
//! [cache]
//! ttl_secs = 3600
//! max_entries = 10000
//!
//! [retry]
//! initial_backoff_ms = 250
//! retry_status_codes = [429, 503]
//!
//! [platforms.mastodon]
//! character_limit = 500
//! hashtag_limit = 5
//!
//! [agents.compliance_checker]
//! model = "claude-3-opus"
//! temperature = 0.0
//! ```
//!
//! The router API key is read from `REQUESTY_API_KEY` only; it never lives
//! in the file.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agents::{AgentProfile, AgentProfiles, AgentType, BrandGuidelines, PlatformCatalog, PlatformConstraints, WorkerServices};
use crate::backend::{RequestyClient, RequestyConfig, RetryConfig, RoutingError};
use crate::cache::{MemoryCache, DEFAULT_CACHE_TTL, DEFAULT_MAX_ENTRIES};
use crate::pool::{AgentPool, ExhaustionPolicy, PoolBound, PoolConfig, PoolError};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Router client could not be built
    #[error("Failed to build router client: {0}")]
    Router(#[from] RoutingError),

    /// Pool rejected the settings
    #[error(transparent)]
    Pool(#[from] PoolError),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Router section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterToml {
    /// Router base URL
    pub base_url: Option<String>,

    /// Whole-request HTTP timeout in seconds
    pub request_timeout_secs: Option<u64>,

    /// TCP connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
}

/// Pool section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolToml {
    /// Workers created per agent type on startup
    pub prewarm_per_type: Option<usize>,

    /// Cap on live workers per agent type (absent = unbounded)
    pub max_workers_per_type: Option<usize>,

    /// `grow`, `block` or `reject`
    pub exhaustion: Option<String>,

    /// Intake queue capacity
    pub max_queue_depth: Option<usize>,

    /// Shutdown drain timeout in seconds
    pub drain_timeout_secs: Option<u64>,
}

/// Cache section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheToml {
    /// Result time-to-live in seconds
    pub ttl_secs: Option<u64>,

    /// Entry cap for the in-memory cache
    pub max_entries: Option<usize>,
}

/// One `[agents.<agent_type>]` table
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfileToml {
    /// Default model
    pub model: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Output length cap
    pub max_tokens: Option<u32>,

    /// System prompt
    pub system_prompt: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratorToml {
    /// Router section
    pub router: RouterToml,

    /// Pool section
    pub pool: PoolToml,

    /// Cache section
    pub cache: CacheToml,

    /// Retry policy, replacing the defaults wholesale when present
    pub retry: Option<RetryConfig>,

    /// Brand guidelines, replacing the defaults when present
    pub brand: Option<BrandGuidelines>,

    /// Extra or replacement platform constraints
    pub platforms: BTreeMap<String, PlatformConstraints>,

    /// Per-agent profile overrides keyed by agent type name
    pub agents: BTreeMap<String, AgentProfileToml>,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the curator
#[derive(Clone, Debug)]
pub struct CuratorConfig {
    /// Router connection settings
    pub router: RequestyConfig,

    /// Workers created per agent type on startup
    pub prewarm_per_type: usize,

    /// Cap on live workers per agent type; `None` lets the pool grow
    pub max_workers_per_type: Option<usize>,

    /// Behavior of a capped pool when exhausted; defaults to blocking
    pub exhaustion: Option<ExhaustionPolicy>,

    /// Intake queue capacity
    pub max_queue_depth: usize,

    /// How long shutdown waits for in-flight requests
    pub drain_timeout: Duration,

    /// Result cache time-to-live
    pub cache_ttl: Duration,

    /// Entry cap for the in-memory cache
    pub cache_max_entries: usize,

    /// Routing retry policy
    pub retry: RetryConfig,

    /// Brand guidelines
    pub guidelines: BrandGuidelines,

    /// Social platform constraints
    pub platforms: PlatformCatalog,

    /// Per-agent model settings
    pub profiles: AgentProfiles,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            router: RequestyConfig::default(),
            prewarm_per_type: pool.prewarm_per_type,
            max_workers_per_type: None,
            exhaustion: None,
            max_queue_depth: pool.max_queue_depth,
            drain_timeout: pool.drain_timeout,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_max_entries: DEFAULT_MAX_ENTRIES,
            retry: RetryConfig::default(),
            guidelines: BrandGuidelines::default(),
            platforms: PlatformCatalog::default(),
            profiles: AgentProfiles::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl CuratorConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Reject values no component could run with
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::ValidationError("cache ttl must be positive".into()));
        }
        if self.max_workers_per_type.is_none() && self.exhaustion.is_some() {
            return Err(ConfigError::ValidationError(
                "exhaustion = block|reject requires max_workers_per_type".into(),
            ));
        }
        for (agent_type, profile) in self.profiles.overrides() {
            if !(0.0..=2.0).contains(&profile.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "agents.{agent_type}.temperature must be within [0, 2], got {}",
                    profile.temperature
                )));
            }
            if profile.max_tokens == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "agents.{agent_type}.max_tokens must be positive"
                )));
            }
        }
        self.pool_config()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Pool settings
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        let bound = match self.max_workers_per_type {
            None => PoolBound::Unbounded,
            Some(max_per_type) => PoolBound::Bounded {
                max_per_type,
                on_exhausted: self.exhaustion.unwrap_or_default(),
            },
        };
        PoolConfig {
            prewarm_per_type: self.prewarm_per_type,
            bound,
            max_queue_depth: self.max_queue_depth,
            drain_timeout: self.drain_timeout,
        }
    }

    /// Worker services backed by the HTTP router client
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Router` if the HTTP client cannot be built.
    pub fn worker_services(&self) -> Result<WorkerServices, ConfigError> {
        let client = RequestyClient::new(self.router.clone())?;
        Ok(WorkerServices::new(Arc::new(client))
            .with_cache(Arc::new(MemoryCache::new(self.cache_max_entries)))
            .with_cache_ttl(self.cache_ttl)
            .with_retry(self.retry.clone())
            .with_profiles(self.profiles.clone())
            .with_guidelines(self.guidelines.clone())
            .with_platforms(self.platforms.clone()))
    }

    /// Validate, then build an uninitialized pool
    ///
    /// # Errors
    ///
    /// Returns a validation, router or pool error.
    pub fn build_pool(&self) -> Result<AgentPool, ConfigError> {
        self.validate()?;
        Ok(AgentPool::new(self.worker_services()?, self.pool_config())?)
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/curator/curator.toml` or
/// `~/.config/curator/curator.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("curator").join("curator.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<CuratorConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<CuratorConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<CuratorConfig, ConfigError> {
    let mut config = CuratorConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: CuratorToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config)?;
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    Ok(config)
}

/// `grow` maps to `None`; anything else must name an [`ExhaustionPolicy`]
fn parse_exhaustion(value: &str) -> Result<Option<ExhaustionPolicy>, String> {
    if value.trim().eq_ignore_ascii_case("grow") {
        Ok(None)
    } else {
        ExhaustionPolicy::from_str(value).map(Some)
    }
}

fn apply_toml_config(config: &mut CuratorConfig, toml: CuratorToml) -> Result<(), ConfigError> {
    // Router settings
    if let Some(url) = toml.router.base_url {
        config.router.base_url = url;
    }
    if let Some(secs) = toml.router.request_timeout_secs {
        config.router.request_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.router.connect_timeout_secs {
        config.router.connect_timeout = Duration::from_secs(secs);
    }

    // Pool settings
    if let Some(n) = toml.pool.prewarm_per_type {
        config.prewarm_per_type = n;
    }
    if let Some(max) = toml.pool.max_workers_per_type {
        config.max_workers_per_type = Some(max);
    }
    if let Some(ref mode) = toml.pool.exhaustion {
        config.exhaustion = parse_exhaustion(mode).map_err(ConfigError::ValidationError)?;
        if config.exhaustion.is_none() {
            config.max_workers_per_type = None;
        }
    }
    if let Some(depth) = toml.pool.max_queue_depth {
        config.max_queue_depth = depth;
    }
    if let Some(secs) = toml.pool.drain_timeout_secs {
        config.drain_timeout = Duration::from_secs(secs);
    }

    // Cache settings
    if let Some(secs) = toml.cache.ttl_secs {
        config.cache_ttl = Duration::from_secs(secs);
    }
    if let Some(n) = toml.cache.max_entries {
        config.cache_max_entries = n;
    }

    // Policy context
    if let Some(retry) = toml.retry {
        config.retry = retry;
    }
    if let Some(brand) = toml.brand {
        config.guidelines = brand;
    }
    for (name, constraints) in toml.platforms {
        config.platforms.insert(name, constraints);
    }

    // Agent profiles
    for (name, overrides) in toml.agents {
        let agent_type = AgentType::from_str(&name)
            .map_err(|e| ConfigError::ValidationError(format!("[agents.{name}]: {e}")))?;
        let mut profile: AgentProfile = config.profiles.get(agent_type);
        if let Some(model) = overrides.model {
            profile.model = model;
        }
        if let Some(temperature) = overrides.temperature {
            profile.temperature = temperature;
        }
        if let Some(max_tokens) = overrides.max_tokens {
            profile.max_tokens = max_tokens;
        }
        if let Some(prompt) = overrides.system_prompt {
            profile.system_prompt = prompt;
        }
        config.profiles = std::mem::take(&mut config.profiles).with_profile(agent_type, profile);
    }

    Ok(())
}

fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut CuratorConfig, env: impl Fn(&str) -> Option<String>) {
    // Router settings from environment
    if let Some(url) = env("CURATOR_ROUTER_URL").or_else(|| env("REQUESTY_BASE_URL")) {
        config.router.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(key) = env("REQUESTY_API_KEY").filter(|k| !k.is_empty()) {
        config.router.api_key = Some(key);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = parse_env::<u64>(&env, "CURATOR_REQUEST_TIMEOUT") {
        config.router.request_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }

    // Cache settings from environment
    if let Some(secs) = parse_env::<u64>(&env, "CURATOR_CACHE_TTL") {
        config.cache_ttl = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }

    // Pool settings from environment
    if let Some(n) = parse_env::<usize>(&env, "CURATOR_PREWARM") {
        config.prewarm_per_type = n;
        config.source = ConfigSource::Env;
    }
    if let Some(n) = parse_env::<usize>(&env, "CURATOR_MAX_WORKERS_PER_TYPE") {
        config.max_workers_per_type = Some(n);
        config.source = ConfigSource::Env;
    }
    if let Some(mode) = env("CURATOR_POOL_EXHAUSTION") {
        match parse_exhaustion(&mode) {
            Ok(policy) => {
                config.exhaustion = policy;
                if policy.is_none() {
                    config.max_workers_per_type = None;
                }
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring CURATOR_POOL_EXHAUSTION"),
        }
    }
    if let Some(depth) = parse_env::<usize>(&env, "CURATOR_MAX_QUEUE_DEPTH") {
        config.max_queue_depth = depth;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Router URL override
    pub router_url: Option<String>,

    /// Prewarm count override
    pub prewarm_per_type: Option<usize>,

    /// Worker cap override
    pub max_workers_per_type: Option<usize>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set router URL override
    #[must_use]
    pub fn with_router_url(mut self, url: impl Into<String>) -> Self {
        self.router_url = Some(url.into());
        self
    }

    /// Set prewarm override
    #[must_use]
    pub fn with_prewarm(mut self, per_type: usize) -> Self {
        self.prewarm_per_type = Some(per_type);
        self
    }

    /// Set worker cap override
    #[must_use]
    pub fn with_max_workers_per_type(mut self, max: usize) -> Self {
        self.max_workers_per_type = Some(max);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut CuratorConfig) {
        if self.router_url.is_some()
            || self.prewarm_per_type.is_some()
            || self.max_workers_per_type.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.router_url {
            config.router.base_url = url.clone();
        }
        if let Some(n) = self.prewarm_per_type {
            config.prewarm_per_type = n;
        }
        if let Some(max) = self.max_workers_per_type {
            config.max_workers_per_type = Some(max);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
