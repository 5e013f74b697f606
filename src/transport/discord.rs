use super::{PostOutcome, Transport, TransportError};
use crate::message::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Fallback when a 429 carries no usable retry hint.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Discord REST channel-message endpoints, authenticated with a fixed token.
pub struct DiscordTransport {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ApiAuthor {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
}

#[derive(Deserialize)]
struct ApiReference {
    #[serde(default)]
    message_id: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    id: String,
    #[serde(default)]
    content: String,
    author: ApiAuthor,
    timestamp: String,
    #[serde(default)]
    message_reference: Option<ApiReference>,
}

#[derive(Deserialize)]
struct ApiUser {
    id: String,
}

#[derive(Deserialize)]
struct ApiCreated {
    id: String,
}

#[derive(Deserialize)]
struct ApiRateLimit {
    retry_after: f64,
}

impl DiscordTransport {
    pub fn new(token: &str, base_url: &str) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(token)
            .map_err(|_| TransportError::InvalidHeader("Authorization".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Id of the account the token belongs to, from `GET /users/@me`.
    pub async fn current_user_id(&self) -> Result<String, TransportError> {
        let response = self
            .http
            .get(format!("{}/users/@me", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                operation: "current user",
                status: status.as_u16(),
                body,
            });
        }

        let user: ApiUser = response.json().await?;
        Ok(user.id)
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}/messages", self.base_url, channel_id)
    }

    fn decode_message(value: serde_json::Value) -> Option<Message> {
        let raw: ApiMessage = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Discord: skipping undecodable message: {}", e);
                return None;
            }
        };
        let timestamp = match DateTime::parse_from_rfc3339(&raw.timestamp) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                warn!(
                    "Discord: skipping message {} with malformed timestamp '{}': {}",
                    raw.id, raw.timestamp, e
                );
                return None;
            }
        };
        Some(Message {
            id: raw.id,
            content: raw.content,
            author_name: raw.author.global_name.unwrap_or(raw.author.username),
            author_id: raw.author.id,
            timestamp,
            replied_to: raw.message_reference.and_then(|r| r.message_id),
        })
    }

    async fn retry_after(response: reqwest::Response) -> Duration {
        let header_hint = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok());

        let body_hint = response
            .json::<ApiRateLimit>()
            .await
            .ok()
            .map(|body| body.retry_after);

        body_hint
            .or(header_hint)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(DEFAULT_RETRY_AFTER)
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn fetch(&self, channel_id: &str, limit: usize) -> Result<Vec<Message>, TransportError> {
        let response = self
            .http
            .get(self.messages_url(channel_id))
            .query(&[("limit", limit.clamp(1, 100))])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                operation: "fetch",
                status: status.as_u16(),
                body,
            });
        }

        let values: Vec<serde_json::Value> = response.json().await?;
        let messages: Vec<Message> = values
            .into_iter()
            .filter_map(Self::decode_message)
            .collect();
        debug!(
            "Discord: fetched {} messages from channel {}",
            messages.len(),
            channel_id
        );
        Ok(messages)
    }

    async fn post(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<PostOutcome, TransportError> {
        let mut payload = serde_json::json!({ "content": content });
        if let Some(message_id) = reply_to {
            payload["message_reference"] = serde_json::json!({
                "message_id": message_id,
                "fail_if_not_exists": false,
            });
        }

        let response = self
            .http
            .post(self.messages_url(channel_id))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(PostOutcome::RateLimited {
                retry_after: Self::retry_after(response).await,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(PostOutcome::Failed {
                status: status.as_u16(),
                body,
            });
        }

        let created: ApiCreated = response.json().await?;
        Ok(PostOutcome::Sent { id: created.id })
    }

    async fn delete(&self, channel_id: &str, message_id: &str) -> Result<(), TransportError> {
        let response = self
            .http
            .delete(format!("{}/{}", self.messages_url(channel_id), message_id))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                operation: "delete",
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
