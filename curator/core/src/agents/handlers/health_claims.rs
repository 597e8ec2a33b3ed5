//! Health claim validation handler

use async_trait::async_trait;
use serde_json::json;

use super::{finish_routed, object, HandlerContext, HandlerOutput, TaskHandler};
use crate::agents::{confidence, AgentError, AgentType, Payload};

/// Extracts health claims and rates their evidence
#[derive(Debug, Default, Clone, Copy)]
pub struct HealthClaimsValidator;

#[async_trait]
impl TaskHandler for HealthClaimsValidator {
    fn agent_type(&self) -> AgentType {
        AgentType::HealthClaimsValidator
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerOutput, AgentError> {
        let content = ctx.input_str("content", "");

        let prompt = format!(
            "Analyze the following content for health claims and validate their accuracy \
             and regulatory compliance.\n\n\
             Content to analyze:\n{content}\n\n\
             Check for:\n\
             1. Specific health claims\n\
             2. Scientific backing requirements\n\
             3. FDA compliance\n\
             4. Required disclaimers\n\
             5. Risk assessment\n\n\
             Respond with a JSON object with the keys: health_claims_found (array), \
             claims_validation (array of {{claim, is_valid, confidence (0-1), evidence_level, \
             required_disclaimers}}), overall_compliance, risk_level (low|medium|high), \
             recommendations (array)."
        );

        let response = ctx.route(prompt, &[]).await?;
        let metadata = ctx.provenance("validated");

        Ok(finish_routed(ctx, response, metadata, |_| {
            object(json!({
                "health_claims_found": [],
                "claims_validation": [],
                "overall_compliance": false,
                "risk_level": "unknown",
                "recommendations": ["Manual review required"],
            }))
        }))
    }

    fn confidence(&self, result: &Payload) -> Option<f64> {
        confidence::mean_of(result, "claims_validation", "confidence")
    }
}
