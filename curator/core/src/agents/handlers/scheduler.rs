//! Publishing schedule handler
//!
//! Runs locally; no router call.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{object, HandlerContext, HandlerOutput, TaskHandler};
use crate::agents::{AgentError, AgentType};

/// Orders scheduled posts chronologically and flags collisions
#[derive(Debug, Default, Clone, Copy)]
pub struct SchedulerOptimizer;

#[async_trait]
impl TaskHandler for SchedulerOptimizer {
    fn agent_type(&self) -> AgentType {
        AgentType::SchedulerOptimizer
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerOutput, AgentError> {
        let schedule = ctx.input_value("schedule");
        let (optimized, recommendations) = optimize(schedule);

        let mut payload = object(json!({
            "optimized_schedule": optimized,
            "recommendations": recommendations,
        }));
        payload.insert("metadata".into(), Value::Object(ctx.provenance("optimized")));
        Ok(HandlerOutput::structured(payload))
    }
}

/// Sort `posts` by their `time` field and flag duplicate slots
fn optimize(schedule: Value) -> (Value, Vec<String>) {
    let mut map = match schedule {
        Value::Object(map) => map,
        other => return (other, vec!["Schedule was not an object".to_string()]),
    };
    let mut recommendations = Vec::new();
    match map.get_mut("posts") {
        Some(Value::Array(posts)) => {
            posts.sort_by(|a, b| slot(a).cmp(slot(b)));
            for pair in posts.windows(2) {
                let (a, b) = (slot(&pair[0]), slot(&pair[1]));
                if !a.is_empty() && a == b {
                    recommendations.push(format!("Two posts share the {a} slot; spread them out"));
                }
            }
            if recommendations.is_empty() {
                recommendations.push("Schedule has no conflicting slots".to_string());
            }
        }
        _ => recommendations.push("No posts to schedule".to_string()),
    }

    (Value::Object(map), recommendations)
}

fn slot(post: &Value) -> &str {
    post.get("time").and_then(Value::as_str).unwrap_or("")
}
