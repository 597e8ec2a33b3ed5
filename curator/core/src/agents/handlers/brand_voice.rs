//! Brand voice validation handler

use async_trait::async_trait;
use serde_json::json;

use super::{finish_routed, object, HandlerContext, HandlerOutput, TaskHandler};
use crate::agents::{confidence, AgentError, AgentType, Payload};

/// Scores content against the brand voice and tone
#[derive(Debug, Default, Clone, Copy)]
pub struct BrandVoiceValidator;

#[async_trait]
impl TaskHandler for BrandVoiceValidator {
    fn agent_type(&self) -> AgentType {
        AgentType::BrandVoiceValidator
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerOutput, AgentError> {
        let content = ctx.input_str("content", "");
        let voice = serde_json::to_string_pretty(&ctx.guidelines.voice_and_tone()).unwrap_or_default();

        let prompt = format!(
            "Validate the following content against {brand}'s brand voice and tone guidelines.\n\n\
             Content to validate:\n{content}\n\n\
             Brand Voice Guidelines:\n{voice}\n\n\
             Analyze:\n\
             1. Voice consistency\n\
             2. Tone appropriateness\n\
             3. Language alignment\n\
             4. Brand personality reflection\n\n\
             Respond with a JSON object with the keys: voice_score, tone_score, language_score, \
             overall_brand_score (all 0-1), is_brand_compliant, recommendations (array), \
             strengths (array), areas_for_improvement (array).",
            brand = ctx.guidelines.brand_name,
        );

        let response = ctx.route(prompt, &[]).await?;
        let metadata = ctx.provenance("validated");

        Ok(finish_routed(ctx, response, metadata, |_| {
            object(json!({
                "voice_score": 0.0,
                "tone_score": 0.0,
                "language_score": 0.0,
                "overall_brand_score": 0.0,
                "is_brand_compliant": false,
                "recommendations": ["Manual review required"],
                "strengths": [],
                "areas_for_improvement": ["Analysis failed"],
            }))
        }))
    }

    fn confidence(&self, result: &Payload) -> Option<f64> {
        confidence::from_field(result, "overall_brand_score")
    }
}
