use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::agent::EvaluationResult;
use crate::error::GuardianError;

/// Configuration for the text-completion oracle.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub api_url: String,
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.is_empty() {
            return Err("API key is required".to_string());
        }
        if self.model.is_empty() {
            return Err("model name is required".to_string());
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err("temperature must be between 0 and 1".to_string());
        }
        if self.max_tokens == 0 {
            return Err("max tokens must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, GuardianError> {
        config.validate().map_err(GuardianError::Config)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| GuardianError::Config(format!("llm http client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Send one prompt and return the raw completion text.
    pub async fn query(&self, prompt: &str) -> Result<String, GuardianError> {
        let prompt = format!("{prompt}\n\nRespond with valid JSON only.");
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!("Querying {} via {}", self.config.model, self.config.provider);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("LLM request failed: {status}");
            return Err(GuardianError::RemoteRejected(format!(
                "LLM API error ({status}): {body}"
            )));
        }

        let completion: ChatResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| GuardianError::Parse("LLM response had no choices".to_string()))
    }
}

/// Parse a completion into the expected evaluation shape.
///
/// Missing fields are filled with defaults and an out-of-range confidence is
/// clamped to 0.5. Unparseable text yields the structured fallback at
/// confidence 0.3; the parse error never reaches the swarm.
pub fn parse_evaluation(raw: &str) -> EvaluationResult {
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .or_else(|| extract_json_object(raw));

    let Some(serde_json::Value::Object(mut map)) = value else {
        return EvaluationResult {
            observation: "unstructured response".to_string(),
            reasoning: "response parse failed".to_string(),
            conclusion: "unable to provide structured analysis".to_string(),
            confidence: 0.3,
            extra: serde_json::Map::new(),
        };
    };

    let take_string = |map: &mut serde_json::Map<String, serde_json::Value>, field: &str| {
        map.remove(field)
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| format!("no {field} provided"))
    };

    let observation = take_string(&mut map, "observation");
    let reasoning = take_string(&mut map, "reasoning");
    let conclusion = take_string(&mut map, "conclusion");

    let confidence = map
        .remove("confidence")
        .and_then(|v| v.as_f64())
        .filter(|c| (0.0..=1.0).contains(c))
        .unwrap_or(0.5);

    EvaluationResult {
        observation,
        reasoning,
        conclusion,
        confidence,
        extra: map,
    }
}

/// Pull the first JSON object out of a completion that wrapped it in prose.
fn extract_json_object(raw: &str) -> Option<serde_json::Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LlmConfig {
        LlmConfig {
            provider: "openrouter".to_string(),
            api_key: "test-key".to_string(),
            model: "anthropic/claude-3.5-sonnet".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            api_url: "https://openrouter.ai/api/v1".to_string(),
        }
    }

    #[test]
    fn test_validate_rejects_blank_key() {
        let mut cfg = config();
        cfg.api_key = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut cfg = config();
        cfg.temperature = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_parse_full_response() {
        let result = parse_evaluation(
            r#"{"observation": "SOL is up", "reasoning": "volume supports it",
                "conclusion": "approve", "confidence": 0.85, "risk_level": "low"}"#,
        );
        assert_eq!(result.observation, "SOL is up");
        assert_eq!(result.confidence, 0.85);
        assert_eq!(result.extra.get("risk_level").unwrap(), "low");
    }

    #[test]
    fn test_parse_fills_missing_fields() {
        let result = parse_evaluation(r#"{"confidence": 0.9}"#);
        assert_eq!(result.observation, "no observation provided");
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_parse_clamps_out_of_range_confidence() {
        let result = parse_evaluation(r#"{"confidence": 7.0}"#);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_parse_extracts_wrapped_json() {
        let result =
            parse_evaluation("Here is my analysis:\n{\"confidence\": 0.8}\nHope that helps!");
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn test_parse_failure_falls_back_to_low_confidence() {
        let result = parse_evaluation("I cannot answer that.");
        assert_eq!(result.confidence, 0.3);
        assert_eq!(result.reasoning, "response parse failed");
    }
}
