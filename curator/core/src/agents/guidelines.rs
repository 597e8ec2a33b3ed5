//! Static policy context
//!
//! Brand guidelines, social platform constraints and per-agent model
//! profiles. Handlers embed these into their prompts; the routing call
//! takes temperature, output length and system prompt from the profile.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::types::AgentType;

// ============================================================================
// Brand Guidelines
// ============================================================================

/// Brand voice, themes and mandatory disclaimers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandGuidelines {
    /// Brand name used in prompts
    pub brand_name: String,
    /// Brand voice description
    pub voice: String,
    /// Brand tone description
    pub tone: String,
    /// Language register
    pub language: String,
    /// Preferred content themes
    pub content_themes: Vec<String>,
    /// Disclaimers every health-adjacent piece must carry
    pub required_disclaimers: Vec<String>,
    /// Terms that must never appear
    pub prohibited_terms: Vec<String>,
}

impl Default for BrandGuidelines {
    fn default() -> Self {
        Self {
            brand_name: "EESystem".to_string(),
            voice: "Knowledgeable, warm and grounded".to_string(),
            tone: "Supportive and educational, never sensational".to_string(),
            language: "Plain, accessible English without medical jargon".to_string(),
            content_themes: vec![
                "wellness routines".to_string(),
                "energy and relaxation".to_string(),
                "community stories".to_string(),
                "science education".to_string(),
            ],
            required_disclaimers: vec![
                "These statements have not been evaluated by the Food and Drug Administration."
                    .to_string(),
                "This product is not intended to diagnose, treat, cure, or prevent any disease."
                    .to_string(),
            ],
            prohibited_terms: vec![
                "cure".to_string(),
                "miracle".to_string(),
                "guaranteed results".to_string(),
            ],
        }
    }
}

impl BrandGuidelines {
    /// Voice, tone and language as a JSON object for prompt embedding
    #[must_use]
    pub fn voice_and_tone(&self) -> serde_json::Value {
        serde_json::json!({
            "voice": self.voice,
            "tone": self.tone,
            "language": self.language,
        })
    }
}

// ============================================================================
// Platform Constraints
// ============================================================================

/// Publishing constraints for one social platform
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlatformConstraints {
    /// Maximum post length in characters
    pub character_limit: usize,
    /// Maximum hashtags per post
    pub hashtag_limit: usize,
    /// Platform-specific guidance
    #[serde(default)]
    pub best_practices: Vec<String>,
}

impl PlatformConstraints {
    fn new(character_limit: usize, hashtag_limit: usize, best_practices: &[&str]) -> Self {
        Self {
            character_limit,
            hashtag_limit,
            best_practices: best_practices.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Known platforms keyed by lowercase name
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformCatalog(BTreeMap<String, PlatformConstraints>);

impl Default for PlatformCatalog {
    fn default() -> Self {
        let mut platforms = BTreeMap::new();
        platforms.insert(
            "facebook".to_string(),
            PlatformConstraints::new(63_206, 5, &["Lead with a question", "Native video first"]),
        );
        platforms.insert(
            "instagram".to_string(),
            PlatformConstraints::new(2_200, 30, &["Strong visual hook", "Hashtags at the end"]),
        );
        platforms.insert(
            "twitter".to_string(),
            PlatformConstraints::new(280, 2, &["One idea per post", "Front-load the message"]),
        );
        platforms.insert(
            "linkedin".to_string(),
            PlatformConstraints::new(3_000, 5, &["Professional framing", "Short paragraphs"]),
        );
        Self(platforms)
    }
}

impl PlatformCatalog {
    /// Look up a platform by name (case-insensitive)
    #[must_use]
    pub fn get(&self, platform: &str) -> Option<&PlatformConstraints> {
        self.0.get(&platform.to_ascii_lowercase())
    }

    /// Add or replace a platform
    pub fn insert(&mut self, platform: impl Into<String>, constraints: PlatformConstraints) {
        self.0
            .insert(platform.into().to_ascii_lowercase(), constraints);
    }

    /// Merge another catalog over this one
    pub fn extend(&mut self, other: PlatformCatalog) {
        for (name, constraints) in other.0 {
            self.insert(name, constraints);
        }
    }

    /// Number of known platforms
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no platform is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Agent Profiles
// ============================================================================

/// Model settings for one agent type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    /// Default model when the handler states no preference
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Output length cap
    pub max_tokens: u32,
    /// System prompt sent with every call
    pub system_prompt: String,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            system_prompt: String::new(),
        }
    }
}

impl AgentProfile {
    /// Built-in profile for an agent type
    #[must_use]
    pub fn for_agent(agent_type: AgentType) -> Self {
        let (model, temperature, max_tokens, system_prompt) = match agent_type {
            AgentType::ContentCreator => (
                "gpt-4",
                0.7,
                3000,
                "You are an expert wellness content writer. Respond with JSON only.",
            ),
            AgentType::ComplianceChecker => (
                "gpt-4",
                0.1,
                2000,
                "You are a regulatory compliance analyst for health marketing. Respond with JSON only.",
            ),
            AgentType::BrandVoiceValidator => (
                "claude-3-sonnet",
                0.2,
                1500,
                "You are a brand strategist who audits copy for voice and tone. Respond with JSON only.",
            ),
            AgentType::SocialMediaOptimizer => (
                "gpt-4",
                0.6,
                1500,
                "You are a social media strategist. Respond with JSON only.",
            ),
            AgentType::HealthClaimsValidator => (
                "claude-3-opus",
                0.1,
                2000,
                "You are a medical claims reviewer. Respond with JSON only.",
            ),
            AgentType::ContentModerator => (
                "gpt-3.5-turbo",
                0.1,
                1000,
                "You are a content moderator focused on brand safety. Respond with JSON only.",
            ),
            AgentType::AnalyticsProcessor => ("gpt-3.5-turbo", 0.3, 1500, ""),
            AgentType::SchedulerOptimizer => ("gpt-3.5-turbo", 0.3, 1000, ""),
        };

        Self {
            model: model.to_string(),
            temperature,
            max_tokens,
            system_prompt: system_prompt.to_string(),
        }
    }
}

/// Profiles for every agent type, with overrides
#[derive(Clone, Debug, Default)]
pub struct AgentProfiles {
    overrides: HashMap<AgentType, AgentProfile>,
}

impl AgentProfiles {
    /// Override the profile for one agent type
    #[must_use]
    pub fn with_profile(mut self, agent_type: AgentType, profile: AgentProfile) -> Self {
        self.overrides.insert(agent_type, profile);
        self
    }

    /// Effective profile for an agent type
    #[must_use]
    pub fn get(&self, agent_type: AgentType) -> AgentProfile {
        self.overrides
            .get(&agent_type)
            .cloned()
            .unwrap_or_else(|| AgentProfile::for_agent(agent_type))
    }

    /// Iterate explicit overrides
    pub fn overrides(&self) -> impl Iterator<Item = (&AgentType, &AgentProfile)> {
        self.overrides.iter()
    }
}
