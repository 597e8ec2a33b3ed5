//! Analytics processing handler
//!
//! Runs locally; no router call.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{object, HandlerContext, HandlerOutput, TaskHandler};
use crate::agents::{AgentError, AgentType};

/// Summarizes a metrics object into insights
#[derive(Debug, Default, Clone, Copy)]
pub struct AnalyticsProcessor;

#[async_trait]
impl TaskHandler for AnalyticsProcessor {
    fn agent_type(&self) -> AgentType {
        AgentType::AnalyticsProcessor
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerOutput, AgentError> {
        let data = ctx.input_value("data");
        let insights = insights_for(&data);

        let mut payload = object(json!({
            "processed_data": data,
            "insights": insights,
            "recommendations": ["Review the highest and lowest metrics before the next campaign"],
        }));
        payload.insert("metadata".into(), Value::Object(ctx.provenance("processed")));
        Ok(HandlerOutput::structured(payload))
    }
}

/// One line per numeric metric, plus the extremes
fn insights_for(data: &Value) -> Vec<String> {
    let Some(map) = data.as_object() else {
        return vec!["Analytics data was not an object".to_string()];
    };

    let mut metrics: Vec<(&String, f64)> = map
        .iter()
        .filter_map(|(k, v)| v.as_f64().map(|n| (k, n)))
        .collect();
    if metrics.is_empty() {
        return vec!["No numeric metrics supplied".to_string()];
    }
    metrics.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut insights = vec![format!("{} numeric metrics analyzed", metrics.len())];
    if let (Some(top), Some(bottom)) = (metrics.first(), metrics.last()) {
        insights.push(format!("Highest metric: {} ({})", top.0, top.1));
        if metrics.len() > 1 {
            insights.push(format!("Lowest metric: {} ({})", bottom.0, bottom.1));
        }
    }
    insights
}
