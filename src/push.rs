use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const EXPO_PUSH_ENDPOINT: &str = "https://exp.host/--/api/v2/push/send";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub sound: String,
    pub title: String,
    pub body: String,
    pub data: Value,
}

impl PushMessage {
    pub fn test(token: impl Into<String>) -> Self {
        Self {
            to: token.into(),
            sound: "default".to_string(),
            title: "Test Notification".to_string(),
            body: "This is a test notification from ExpHive!".to_string(),
            data: serde_json::json!({ "someData": "goes here" }),
        }
    }
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("push service answered {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Posts messages to the Expo push API. No retries.
pub struct PushClient {
    http: reqwest::Client,
    endpoint: String,
}

impl PushClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub async fn send(&self, message: &PushMessage) -> Result<Value, PushError> {
        let response = self
            .http
            .post(&self.endpoint)
            .headers(push_headers())
            .json(message)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected { status, body });
        }
        Ok(response.json().await?)
    }
}

impl Default for PushClient {
    fn default() -> Self {
        Self::new(EXPO_PUSH_ENDPOINT)
    }
}

fn push_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}
