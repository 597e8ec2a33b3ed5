//! Content generation handler

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{finish_routed, object, HandlerContext, HandlerOutput, TaskHandler};
use crate::agents::{AgentError, AgentType};

const PREFERRED_MODELS: [&str; 2] = ["gpt-4", "claude-3-opus"];

/// Writes content from a brief, following the brand guidelines
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentCreator;

#[async_trait]
impl TaskHandler for ContentCreator {
    fn agent_type(&self) -> AgentType {
        AgentType::ContentCreator
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerOutput, AgentError> {
        let brief = ctx.input_str("brief", "");
        let content_type = ctx.input_str("type", "blog_post");
        let platform = ctx.input_str("platform", "web");
        let audience = ctx.input_str("audience", "general");
        let g = ctx.guidelines;

        let themes = serde_json::to_string_pretty(&g.content_themes).unwrap_or_default();
        let prompt = format!(
            "Create {content_type} content for {platform} targeting {audience}.\n\n\
             Brief: {brief}\n\n\
             Brand Guidelines:\n\
             - Voice: {voice}\n\
             - Tone: {tone}\n\
             - Language: {language}\n\n\
             Content Themes:\n{themes}\n\n\
             Requirements:\n\
             1. Follow the {brand} brand voice and tone\n\
             2. Include appropriate health disclaimers\n\
             3. Ensure content is engaging and informative\n\
             4. Optimize for the target platform\n\
             5. Include a call-to-action where appropriate\n\n\
             Respond with a JSON object with the keys: title, content, summary, \
             tags (array), call_to_action, disclaimers (array), seo_keywords (array).",
            voice = g.voice,
            tone = g.tone,
            language = g.language,
            brand = g.brand_name,
        );

        let response = ctx.route(prompt, &PREFERRED_MODELS).await?;

        let mut metadata = ctx.provenance("created");
        metadata.insert("content_type".into(), Value::from(content_type));
        metadata.insert("platform".into(), Value::from(platform));
        metadata.insert("audience".into(), Value::from(audience));

        let disclaimers = g.required_disclaimers.clone();
        Ok(finish_routed(ctx, response, metadata, |raw| {
            object(json!({
                "title": "Generated Content",
                "content": raw,
                "summary": "AI-generated content",
                "tags": [],
                "call_to_action": "",
                "disclaimers": disclaimers,
                "seo_keywords": [],
            }))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::handlers::test_support::{services, ScriptedRouter};
    use crate::agents::Payload;

    #[tokio::test]
    async fn test_structured_content_gets_metadata() {
        let router = ScriptedRouter::replying(
            r#"{"title": "Rest Well", "content": "Body", "summary": "S", "tags": ["sleep"],
                "call_to_action": "Book a session", "disclaimers": [], "seo_keywords": []}"#,
        );
        let services = services(router.clone());
        let input = object(json!({"brief": "Sleep hygiene", "platform": "instagram"}));
        let context = Payload::new();
        let ctx = HandlerContext::new("w-7", AgentType::ContentCreator, &input, &context, &services, 0);

        let output = ContentCreator.handle(&ctx).await.unwrap();

        assert!(!output.degraded);
        assert_eq!(output.payload["title"], "Rest Well");
        let metadata = &output.payload["metadata"];
        assert_eq!(metadata["created_by"], "w-7");
        assert_eq!(metadata["platform"], "instagram");
        assert_eq!(metadata["content_type"], "blog_post");
        assert_eq!(metadata["model_used"], "gpt-4");
        assert_eq!(metadata["tokens_used"], 120);

        let seen = router.seen.lock();
        assert_eq!(seen[0].model_preferences, vec!["gpt-4", "claude-3-opus"]);
        assert!(seen[0].prompt.contains("Brief: Sleep hygiene"));
        assert!(seen[0].prompt.contains(&services.guidelines.voice));
    }

    #[tokio::test]
    async fn test_prose_output_degrades_with_disclaimers() {
        let router = ScriptedRouter::replying("Here is a lovely post about rest.");
        let services = services(router);
        let input = object(json!({"brief": "Rest"}));
        let context = Payload::new();
        let ctx = HandlerContext::new("w-7", AgentType::ContentCreator, &input, &context, &services, 0);

        let output = ContentCreator.handle(&ctx).await.unwrap();

        assert!(output.degraded);
        assert_eq!(output.payload["content"], "Here is a lovely post about rest.");
        assert_eq!(output.payload["raw_output"], "Here is a lovely post about rest.");
        assert_eq!(
            output.payload["disclaimers"].as_array().unwrap().len(),
            services.guidelines.required_disclaimers.len()
        );
        assert_eq!(output.payload["metadata"]["degraded"], true);
    }
}
