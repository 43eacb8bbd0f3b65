//! Wire types for the Gemini `generateContent` endpoint.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::assistant::GenerateRequest;
use crate::error::CollaboratorError;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    pub response_schema: serde_json::Value,
}

impl GenerateContentRequest {
    #[must_use]
    pub fn from_request(req: &GenerateRequest) -> Self {
        let mut parts = vec![Part::Text {
            text: req.prompt.clone(),
        }];
        if let Some(image) = &req.image {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data: STANDARD.encode(&image.data),
                },
            });
        }
        let generation_config = req.response_schema.as_ref().map(|schema| GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: schema.clone(),
        });
        Self {
            contents: vec![Content { parts }],
            generation_config,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub code: Option<u16>,
    pub message: String,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate.
    pub fn into_text(self) -> Result<String, CollaboratorError> {
        if let Some(err) = self.error {
            return Err(match err.code {
                Some(status) => CollaboratorError::Http {
                    status,
                    message: err.message,
                },
                None => CollaboratorError::Service(err.message),
            });
        }
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(CollaboratorError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::InlineImage;

    #[test]
    fn request_with_image_and_schema() {
        let req = GenerateRequest {
            prompt: "describe".into(),
            image: Some(InlineImage {
                mime_type: "image/png".into(),
                data: vec![1, 2, 3],
            }),
            response_schema: Some(serde_json::json!({"type": "ARRAY"})),
            timeout: None,
        };
        let body = serde_json::to_value(GenerateContentRequest::from_request(&req)).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "describe");
        assert_eq!(
            body["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["data"], "AQID");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "ARRAY");
    }

    #[test]
    fn plain_request_has_no_generation_config() {
        let req = GenerateRequest::text("hello");
        let body = serde_json::to_value(GenerateContentRequest::from_request(&req)).unwrap();
        assert!(body.get("generationConfig").is_none());
        assert_eq!(body["contents"][0]["parts"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn response_text_extraction() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"看起來像美味的拉麵！"}]}}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.into_text().unwrap(), "看起來像美味的拉麵！");
    }

    #[test]
    fn response_error_body() {
        let json = r#"{"error":{"code":400,"message":"API key not valid"}}"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            resp.into_text(),
            Err(CollaboratorError::Http { status: 400, .. })
        ));
    }

    #[test]
    fn response_without_candidates_is_empty() {
        let resp: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(resp.into_text(), Err(CollaboratorError::Empty)));
    }
}
