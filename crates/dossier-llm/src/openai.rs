//! OpenAI-compatible Chat Completions oracle.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use dossier_core::error::{DossierError, OracleError, Result};
use dossier_core::oracle::{Oracle, StructuredOracle};

use crate::transport::{retry_after_secs, status_error, transport_error};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_MODEL: &str = "DOSSIER_MODEL";
pub const ENV_BASE_URL: &str = "DOSSIER_OPENAI_BASE_URL";

// ---------------------------------------------------------------------------
// Chat Completions request/response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<OpenAIResponseFormat>,
}

#[derive(Debug, Serialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<OpenAIJsonSchema>,
}

#[derive(Debug, Serialize)]
pub struct OpenAIJsonSchema {
    pub name: String,
    pub schema: Value,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub strict: bool,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    pub choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIError {
    pub error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIErrorDetail {
    pub message: String,
}

// ---------------------------------------------------------------------------
// OpenAIOracle
// ---------------------------------------------------------------------------

pub struct OpenAIOracle {
    api_key: String,
    model_id: String,
    base_url: String,
    temperature: Option<f64>,
    client: reqwest::Client,
}

impl OpenAIOracle {
    pub fn new(api_key: impl Into<String>, model_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            model_id: model_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: Some(0.0),
            client: build_client(DEFAULT_TIMEOUT)?,
        })
    }

    /// Configure from `OPENAI_API_KEY`, `DOSSIER_MODEL` and
    /// `DOSSIER_OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(ENV_API_KEY)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| DossierError::Config(format!("{ENV_API_KEY} is not set")))?;
        let model = lookup(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let oracle = Self::new(api_key, model)?;
        Ok(match lookup(ENV_BASE_URL) {
            Some(url) => oracle.with_base_url(url),
            None => oracle,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_request(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: Option<&Value>,
    ) -> OpenAIRequest {
        OpenAIRequest {
            model: self.model_id.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".into(),
                    content: system_prompt.to_string(),
                },
                OpenAIMessage {
                    role: "user".into(),
                    content: user_prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            response_format: schema.map(|schema| OpenAIResponseFormat {
                format_type: "json_schema".into(),
                json_schema: Some(OpenAIJsonSchema {
                    name: "response".into(),
                    schema: schema.clone(),
                    strict: true,
                }),
            }),
        }
    }

    async fn complete(&self, request: &OpenAIRequest) -> Result<String> {
        debug!(model = %self.model_id, structured = request.response_format.is_some(), "oracle request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read response body".into());
            let error_msg = serde_json::from_str::<OpenAIError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(status_error(status.as_u16(), error_msg, retry_after).into());
        }

        let api_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| OracleError::InvalidResponse("empty completion".into()).into())
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DossierError::Config(format!("failed to build HTTP client: {e}")))
}

#[async_trait]
impl Oracle for OpenAIOracle {
    fn name(&self) -> &str {
        &self.model_id
    }

    async fn invoke(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = self.build_request(system_prompt, user_prompt, None);
        self.complete(&request).await
    }

    fn as_structured(&self) -> Option<&dyn StructuredOracle> {
        Some(self)
    }
}

#[async_trait]
impl StructuredOracle for OpenAIOracle {
    async fn invoke_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &Value,
    ) -> Result<Value> {
        let request = self.build_request(system_prompt, user_prompt, Some(schema));
        let text = self.complete(&request).await?;
        serde_json::from_str(&text).map_err(|e| {
            OracleError::InvalidResponse(format!("structured output is not JSON: {e}")).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn oracle() -> OpenAIOracle {
        OpenAIOracle::new("test-key", "gpt-4o-mini").unwrap()
    }

    #[test]
    fn build_plain_request() {
        let req = oracle().build_request("be brief", "hello", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "be brief");
        assert_eq!(json["messages"][1]["role"], "user");
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn build_structured_request() {
        let schema = json!({"type": "object", "properties": {"status": {"type": "string"}}});
        let req = oracle().build_request("s", "u", Some(&schema));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(json["response_format"]["json_schema"]["schema"], schema);
        assert_eq!(json["response_format"]["json_schema"]["strict"], true);
    }

    #[test]
    fn parse_response() {
        let body = r#"{"choices":[{"message":{"content":"Apple Inc. makes iPhones."}}]}"#;
        let resp: OpenAIResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            resp.choices[0].message.content.as_deref(),
            Some("Apple Inc. makes iPhones.")
        );
    }

    #[test]
    fn advertises_structured_capability() {
        let o = oracle();
        assert!(o.as_structured().is_some());
        assert_eq!(o.name(), "gpt-4o-mini");
    }

    #[test]
    fn from_lookup_requires_key() {
        let env: HashMap<&str, &str> = HashMap::new();
        let err = OpenAIOracle::from_lookup(|k| env.get(k).map(|v| v.to_string()))
            .err()
            .unwrap();
        assert!(err.to_string().contains(ENV_API_KEY));
    }

    #[test]
    fn from_lookup_reads_model_and_base_url() {
        let env = HashMap::from([
            (ENV_API_KEY, "sk-test"),
            (ENV_MODEL, "local-model"),
            (ENV_BASE_URL, "http://localhost:8080/v1/"),
        ]);
        let o = OpenAIOracle::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(o.name(), "local-model");
        assert_eq!(o.base_url(), "http://localhost:8080/v1");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_retryable_transport_fault() {
        let o = oracle()
            .with_base_url("http://127.0.0.1:9")
            .with_timeout(Duration::from_secs(2))
            .unwrap();
        let err = o.invoke("s", "u").await.unwrap_err();
        assert!(matches!(err, DossierError::Oracle(OracleError::Request { .. })));
        assert!(dossier_core::fault::classify(&err));
    }
}
