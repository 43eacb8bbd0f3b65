use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use diary_core::assistant::{GenerateRequest, GenerativeProvider};
use diary_core::error::CollaboratorError;
use diary_core::gemini::{API_BASE, GenerateContentRequest, GenerateContentResponse};

use crate::openweather::{http_client, transport_error};

/// Default per-call timeout; plan requests carry their own.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, model: String) -> Result<Self> {
        Ok(Self {
            client: http_client(DEFAULT_TIMEOUT)?,
            api_key,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{API_BASE}/{}:generateContent", self.model)
    }
}

#[async_trait]
impl GenerativeProvider for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, CollaboratorError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(CollaboratorError::MissingKey("Gemini"))?;
        let body = GenerateContentRequest::from_request(request);
        debug!(
            model = %self.model,
            with_image = request.image.is_some(),
            structured = request.response_schema.is_some(),
            "calling generative model"
        );

        let mut builder = self
            .client
            .post(self.endpoint())
            .query(&[("key", key)])
            .json(&body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let resp = builder.send().await.map_err(transport_error)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport_error)?;
        let parsed: Result<GenerateContentResponse, _> = serde_json::from_str(&text);

        if !status.is_success() {
            let message = parsed
                .ok()
                .and_then(|r| r.error)
                .map_or_else(|| status.to_string(), |e| e.message);
            warn!(status = status.as_u16(), %message, "generative model request failed");
            return Err(CollaboratorError::Http {
                status: status.as_u16(),
                message,
            });
        }

        parsed
            .map_err(|e| CollaboratorError::Decode(e.to_string()))?
            .into_text()
    }
}
