// SPDX-License-Identifier: MIT

//! OpenAI Model - chat completions API implementation

use super::{Content, GenerationConfig, Model, Part};
use crate::adk::error::ModelError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat model
pub struct OpenAIModel {
    client: Client,
    api_key: String,
    model_name: String,
    endpoint: Url,
}

impl OpenAIModel {
    /// Create a new OpenAIModel from the environment
    ///
    /// Requires `OPENAI_API_KEY`. Optionally uses `OPENAI_BASE_URL` for
    /// compatible endpoints.
    pub fn new(model_name: impl Into<String>) -> Result<Self, ModelError> {
        let api_key =
            env::var("OPENAI_API_KEY").map_err(|_| ModelError::ApiKeyMissing("OpenAI".into()))?;
        let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        Self::with_endpoint(api_key, &base_url, model_name)
    }

    /// Create a model against an explicit endpoint
    pub fn with_endpoint(
        api_key: impl Into<String>,
        base_url: &str,
        model_name: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model_name: model_name.into(),
            endpoint: completions_url(base_url)?,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn to_openai_message(content: &Content) -> Value {
        let role = match content.role.as_str() {
            "model" => "assistant",
            other => other,
        };
        json!({ "role": role, "content": content.text() })
    }

    fn build_body(&self, history: &[Content], config: Option<&GenerationConfig>) -> Value {
        let messages: Vec<Value> = history.iter().map(Self::to_openai_message).collect();
        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
        }
        body
    }

    fn parse_response(response: &Value) -> Result<Content, ModelError> {
        let message = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .map(|choice| &choice["message"])
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".into()))?;

        let mut parts = Vec::new();
        if let Some(text) = message["content"].as_str() {
            if !text.is_empty() {
                parts.push(Part::Text(text.to_string()));
            }
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

fn completions_url(base_url: &str) -> Result<Url, ModelError> {
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(Url::parse(&base)?.join("chat/completions")?)
}

#[async_trait]
impl Model for OpenAIModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError> {
        let body = self.build_body(history, config);
        log::debug!("OpenAI request to {} ({} messages)", self.endpoint, history.len());

        let resp = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ModelError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let message = resp.text().await?;
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let resp_json: Value = resp.json().await?;
        Self::parse_response(&resp_json)
    }
}
