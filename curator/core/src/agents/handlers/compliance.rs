//! Compliance check handler

use async_trait::async_trait;
use serde_json::json;

use super::{finish_routed, object, HandlerContext, HandlerOutput, TaskHandler};
use crate::agents::{confidence, AgentError, AgentType, Payload};

const PREFERRED_MODELS: [&str; 2] = ["gpt-4", "claude-3-opus"];

/// Checks content against health-claim regulation and brand rules
#[derive(Debug, Default, Clone, Copy)]
pub struct ComplianceChecker;

#[async_trait]
impl TaskHandler for ComplianceChecker {
    fn agent_type(&self) -> AgentType {
        AgentType::ComplianceChecker
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerOutput, AgentError> {
        let content = ctx.input_str("content", "");
        let content_type = ctx.input_str("type", "general");
        let guidelines = serde_json::to_string_pretty(ctx.guidelines).unwrap_or_default();

        let prompt = format!(
            "Analyze the following content for compliance with health claims regulations \
             and {brand} brand guidelines.\n\n\
             Content to analyze:\n{content}\n\n\
             Content Type: {content_type}\n\n\
             Brand Guidelines:\n{guidelines}\n\n\
             Check for:\n\
             1. Unsubstantiated health claims\n\
             2. Required disclaimers\n\
             3. Brand guideline adherence\n\
             4. Prohibited content\n\
             5. Regulatory compliance\n\n\
             Respond with a JSON object with the keys: compliance_score (0-1), is_compliant, \
             findings (array of {{type, description, location, recommendation}}), \
             required_disclaimers (array), brand_alignment (0-1), health_claims_valid, \
             overall_assessment.",
            brand = ctx.guidelines.brand_name,
        );

        let response = ctx.route(prompt, &PREFERRED_MODELS).await?;
        let metadata = ctx.provenance("analyzed");
        let disclaimers = ctx.guidelines.required_disclaimers.clone();

        Ok(finish_routed(ctx, response, metadata, |_| {
            object(json!({
                "compliance_score": 0.0,
                "is_compliant": false,
                "findings": [{"type": "error", "description": "Analysis failed"}],
                "required_disclaimers": disclaimers,
                "brand_alignment": 0.0,
                "health_claims_valid": false,
                "overall_assessment": "Analysis failed - manual review required",
            }))
        }))
    }

    fn confidence(&self, result: &Payload) -> Option<f64> {
        confidence::from_field(result, "compliance_score")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::handlers::test_support::{services, ScriptedRouter};

    #[tokio::test]
    async fn test_fallback_requires_manual_review() {
        let router = ScriptedRouter::replying("I could not analyze this.");
        let services = services(router.clone());
        let input = object(json!({"content": "Cures everything!"}));
        let context = Payload::new();
        let ctx = HandlerContext::new("w-2", AgentType::ComplianceChecker, &input, &context, &services, 0);

        let output = ComplianceChecker.handle(&ctx).await.unwrap();

        assert!(output.degraded);
        assert_eq!(output.payload["is_compliant"], false);
        assert_eq!(
            output.payload["overall_assessment"],
            "Analysis failed - manual review required"
        );
        assert!(router.last_prompt().contains("Cures everything!"));
        assert!(router.last_prompt().contains("prohibited_terms"));
    }

    #[test]
    fn test_confidence_reads_compliance_score() {
        let result = object(json!({"compliance_score": 0.62}));
        assert_eq!(ComplianceChecker.confidence(&result), Some(0.62));
        assert_eq!(ComplianceChecker.confidence(&Payload::new()), None);
    }
}
