//! Content moderation handler

use async_trait::async_trait;
use serde_json::json;

use super::{finish_routed, object, HandlerContext, HandlerOutput, TaskHandler};
use crate::agents::{confidence, AgentError, AgentType, Payload};

/// Flags inappropriate, misleading or brand-unsafe content
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentModerator;

#[async_trait]
impl TaskHandler for ContentModerator {
    fn agent_type(&self) -> AgentType {
        AgentType::ContentModerator
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerOutput, AgentError> {
        let content = ctx.input_str("content", "");
        let prohibited = ctx.guidelines.prohibited_terms.join(", ");

        let prompt = format!(
            "Moderate the following content for inappropriate material, misinformation, \
             and brand safety.\n\n\
             Content to moderate:\n{content}\n\n\
             Prohibited terms: {prohibited}\n\n\
             Check for:\n\
             1. Inappropriate language\n\
             2. Misinformation\n\
             3. Brand safety issues\n\
             4. Sensitive topics\n\
             5. Compliance violations\n\n\
             Respond with a JSON object with the keys: is_appropriate, moderation_score (0-1), \
             flags (array of {{type, description, severity}}), recommendations (array), \
             approval_status (approved|rejected|pending)."
        );

        let response = ctx.route(prompt, &[]).await?;
        let metadata = ctx.provenance("moderated");

        Ok(finish_routed(ctx, response, metadata, |_| {
            object(json!({
                "is_appropriate": false,
                "moderation_score": 0.0,
                "flags": [{"type": "error", "description": "Moderation failed"}],
                "recommendations": ["Manual review required"],
                "approval_status": "pending",
            }))
        }))
    }

    fn confidence(&self, result: &Payload) -> Option<f64> {
        confidence::from_field(result, "moderation_score")
    }
}
