//! LLM-backed capability invoker.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CapabilityInvoker, InvocationOutput, TierPricing, TokenUsage};
use crate::catalog::{CostTier, ExecutorTemplate};
use crate::context::TaskContext;
use crate::error::CapabilityError;
use crate::llm::{GenerationRequest, LlmProvider, Message};

/// Confidence assumed when a reply does not state one.
const DEFAULT_CONFIDENCE: f64 = 0.5;

const EXECUTOR_SYSTEM_PROMPT: &str = r#"You are the "{role}" executor in a multi-step engineering pipeline.
{description}
Capabilities: {capabilities}

Work only on your capabilities. Context from earlier stages, if any, is given as JSON.
Reply with a single JSON object containing:
- "summary": a short description of your findings or work
- "details": the full result
- "confidence": a number between 0 and 1
- "verdict": "agree" or "disagree" when asked to give an opinion
- "difficulty": "simple", "moderate" or "complex" when asked to classify"#;

/// Model used at each tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierModels {
    pub low: String,
    pub mid: String,
    pub high: String,
}

impl Default for TierModels {
    fn default() -> Self {
        Self {
            low: "gpt-4o-mini".to_string(),
            mid: "gpt-4o".to_string(),
            high: "o1".to_string(),
        }
    }
}

impl TierModels {
    pub fn for_tier(&self, tier: CostTier) -> &str {
        match tier {
            CostTier::Low => &self.low,
            CostTier::Mid => &self.mid,
            CostTier::High => &self.high,
        }
    }
}

/// Runs executor templates as chat completions, one model per tier.
pub struct LlmCapabilityInvoker {
    provider: Arc<dyn LlmProvider>,
    models: TierModels,
    pricing: TierPricing,
    temperature: f64,
}

impl LlmCapabilityInvoker {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            models: TierModels::default(),
            pricing: TierPricing::default(),
            temperature: 0.2,
        }
    }

    pub fn with_models(mut self, models: TierModels) -> Self {
        self.models = models;
        self
    }

    pub fn with_pricing(mut self, pricing: TierPricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_messages(template: &ExecutorTemplate, input: &str, context: &TaskContext) -> Vec<Message> {
        let capabilities = template
            .capabilities
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let system = EXECUTOR_SYSTEM_PROMPT
            .replace("{role}", &template.role)
            .replace("{description}", &template.description)
            .replace("{capabilities}", &capabilities);

        let mut user = format!("Task:\n{}", input);
        if !context.is_empty() {
            user.push_str("\n\nContext:\n");
            user.push_str(&context.to_value().to_string());
        }

        vec![Message::system(system), Message::user(user)]
    }
}

/// Pulls a JSON object out of a reply, tolerating markdown fences and prose.
fn extract_json(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + 7..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim());
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Turns a reply into an output value and its confidence.
fn parse_reply(content: &str) -> (Value, f64) {
    let parsed = extract_json(content).and_then(|json| serde_json::from_str::<Value>(json).ok());
    match parsed {
        Some(value @ Value::Object(_)) => {
            let confidence = value
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_CONFIDENCE);
            (value, confidence)
        }
        _ => (
            serde_json::json!({ "summary": content.trim() }),
            DEFAULT_CONFIDENCE,
        ),
    }
}

#[async_trait]
impl CapabilityInvoker for LlmCapabilityInvoker {
    async fn invoke(
        &self,
        template: &ExecutorTemplate,
        input: &str,
        context: &TaskContext,
        tier: CostTier,
    ) -> Result<InvocationOutput, CapabilityError> {
        let model = self.models.for_tier(tier);
        let request = GenerationRequest::new(model, Self::build_messages(template, input, context))
            .with_temperature(self.temperature)
            .with_max_tokens(template.limits.max_tokens);

        tracing::debug!(executor_id = %template.id, %tier, model, "Invoking LLM executor");
        let response = self.provider.generate(request).await?;

        let content = response
            .first_content()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CapabilityError::Permanent(format!("empty reply from {}", model)))?;

        let (output, confidence) = parse_reply(content);
        let usage = TokenUsage::new(response.usage.prompt_tokens, response.usage.completion_tokens);

        Ok(InvocationOutput::new(output, confidence)
            .with_usage(usage)
            .with_cost(self.pricing.cost(tier, &usage)))
    }
}
