use crate::error::{MessagingError, Result};
use crate::traits::MessagingApi;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const LINE_API_BASE_URL: &str = "https://api.line.me";

/// Cached profile of a platform user, as returned by the bot profile endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub picture_url: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Two-valued outcome of a push delivery. Callers branch on it instead of
/// handling an error; delivery failure is not exceptional for pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    Sent,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub text: String,
    pub notification_disabled: bool,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            message_type: "text".to_string(),
            text: text.into(),
            notification_disabled: false,
        }
    }
}

/// HTTP client for the messaging backend's bot API.
///
/// The three operations deliberately surface failure differently: profile
/// lookup returns `None`, replies return an error, pushes return a status.
/// Callers rely on those conventions.
#[derive(Clone)]
pub struct LineMessagingClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl LineMessagingClient {
    pub fn new(access_token: &str) -> Result<Self> {
        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(MessagingError::InvalidInput(
                "messaging access token is required".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            access_token: access_token.to_string(),
            base_url: LINE_API_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API origin. Used by tests and
    /// self-hosted API proxies.
    pub fn with_api_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait::async_trait]
impl MessagingApi for LineMessagingClient {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(MessagingError::InvalidInput(
                "user id is required for profile lookup".to_string(),
            ));
        }

        let url = self.endpoint(&format!("/v2/bot/profile/{user_id}"));
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, %body, user_id, "profile lookup failed; treating as unknown profile");
            return Ok(None);
        }

        let profile = response.json::<Profile>().await?;
        Ok(Some(profile))
    }

    #[tracing::instrument(level = "debug", skip(self, messages))]
    async fn reply_message(&self, reply_token: &str, messages: &[OutgoingMessage]) -> Result<()> {
        let body = serde_json::json!({
            "replyToken": reply_token,
            "messages": messages,
        });

        let response = self
            .http
            .post(self.endpoint("/v2/bot/message/reply"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MessagingError::Delivery {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self, messages))]
    async fn push_message(
        &self,
        user_id: &str,
        messages: &[OutgoingMessage],
    ) -> Result<PushStatus> {
        let body = serde_json::json!({
            "to": user_id,
            "messages": messages,
        });

        let response = self
            .http
            .post(self.endpoint("/v2/bot/message/push"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, %body, user_id, "push delivery failed");
            return Ok(PushStatus::Error);
        }
        Ok(PushStatus::Sent)
    }
}
