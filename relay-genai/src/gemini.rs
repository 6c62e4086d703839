use crate::error::{GenAiError, Result};
use crate::traits::ReplyGenerator;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Client for the `generateContent` endpoint. The API key travels as a URL
/// query parameter, which is why error messages carry status and body but
/// never the request URL.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(GenAiError::InvalidInput(
                "generative backend api key is required".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: GEMINI_API_BASE_URL.to_string(),
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.trim().to_string();
        self
    }

    pub fn with_api_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn generate_content_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }
}

#[async_trait::async_trait]
impl ReplyGenerator for GeminiClient {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn generate_reply(&self, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(GenAiError::InvalidInput("prompt is empty".to_string()));
        }

        let request = GenerateContentRequest::from_prompt(prompt);
        let response = self
            .http
            .post(self.generate_content_url())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GenAiError::Http(format!(
                "generateContent status={status} body={body}"
            )));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        first_candidate_text(parsed)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

impl GenerateContentRequest {
    fn from_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

fn first_candidate_text(response: GenerateContentResponse) -> Result<String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GenAiError::ResponseFormat("no candidates".to_string()))?;
    let content = candidate
        .content
        .ok_or_else(|| GenAiError::ResponseFormat("candidate has no content".to_string()))?;
    let part = content
        .parts
        .into_iter()
        .next()
        .ok_or_else(|| GenAiError::ResponseFormat("candidate content has no parts".to_string()))?;
    let text = part
        .text
        .ok_or_else(|| GenAiError::ResponseFormat("first part has no text".to_string()))?;

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(GenAiError::ResponseFormat(
            "candidate text is empty".to_string(),
        ));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::{
        GeminiClient, GenerateContentRequest, GenerateContentResponse, first_candidate_text,
    };
    use crate::error::GenAiError;

    fn parse(raw: &str) -> GenerateContentResponse {
        serde_json::from_str(raw).expect("decode")
    }

    #[test]
    fn request_body_matches_wire_shape() {
        let request = GenerateContentRequest::from_prompt("hi there");
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "contents": [{"parts": [{"text": "hi there"}]}]
            })
        );
    }

    #[test]
    fn extracts_first_candidate_text() {
        let response = parse(
            r#"{
                "candidates": [
                    {"content": {"parts": [{"text": "  answer one "}, {"text": "ignored"}]}},
                    {"content": {"parts": [{"text": "answer two"}]}}
                ]
            }"#,
        );
        assert_eq!(first_candidate_text(response).expect("text"), "answer one");
    }

    #[test]
    fn missing_candidates_is_a_format_error() {
        let response = parse(r#"{"candidates": []}"#);
        assert!(matches!(
            first_candidate_text(response),
            Err(GenAiError::ResponseFormat(_))
        ));

        let response = parse(r#"{}"#);
        assert!(matches!(
            first_candidate_text(response),
            Err(GenAiError::ResponseFormat(_))
        ));
    }

    #[test]
    fn missing_parts_or_text_is_a_format_error() {
        let response = parse(r#"{"candidates": [{"content": {"parts": []}}]}"#);
        assert!(matches!(
            first_candidate_text(response),
            Err(GenAiError::ResponseFormat(_))
        ));

        let response = parse(r#"{"candidates": [{"content": {"parts": [{}]}}]}"#);
        assert!(matches!(
            first_candidate_text(response),
            Err(GenAiError::ResponseFormat(_))
        ));
    }

    #[test]
    fn whitespace_only_text_is_a_format_error() {
        let response = parse(r#"{"candidates": [{"content": {"parts": [{"text": "   "}]}}]}"#);
        assert!(matches!(
            first_candidate_text(response),
            Err(GenAiError::ResponseFormat(_))
        ));
    }

    #[test]
    fn url_embeds_model_and_key() {
        let client = GeminiClient::new("k123")
            .expect("client")
            .with_model("gemini-1.5-flash")
            .with_api_base_url("http://127.0.0.1:8081/");
        assert_eq!(
            client.generate_content_url(),
            "http://127.0.0.1:8081/v1beta/models/gemini-1.5-flash:generateContent?key=k123"
        );
    }
}
