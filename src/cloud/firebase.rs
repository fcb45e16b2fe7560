//! Firebase Realtime Database REST client.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest_eventsource::{Event, EventSource};
use serde_json::Value;

use crate::cloud::auth::{AuthConfig, resolve_token};
use crate::cloud::stream::parse_stream_event;
use crate::cloud::{ChangeStream, StatusStore, normalize_key};
use crate::error::{ArmError, Result};

/// Realtime Database client
pub struct FirebaseClient {
    http: Client,
    database_url: String,
    auth_token: Option<String>,
}

impl FirebaseClient {
    /// Build a client and resolve credentials.
    pub async fn connect(database_url: &str, auth: &AuthConfig, timeout: Duration) -> Result<Self> {
        if database_url.trim().is_empty() {
            return Err(ArmError::Config("cloud.database-url is empty".to_string()));
        }

        let http = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ArmError::Cloud(format!("Failed to create HTTP client: {}", e)))?;

        let auth_token = resolve_token(&http, auth).await?;
        Ok(Self::with_token(http, database_url, auth_token))
    }

    /// Client with an already-resolved token.
    pub fn with_token(http: Client, database_url: &str, auth_token: Option<String>) -> Self {
        Self {
            http,
            database_url: database_url.trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    /// REST URL for a key, e.g. `<db>/robot/status.json`.
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}.json", self.database_url, normalize_key(key))
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        match &self.auth_token {
            Some(token) => vec![("auth", token.clone())],
            None => Vec::new(),
        }
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = format!("{} failed ({}): {}", what, status, body.trim());
        if status == reqwest::StatusCode::UNAUTHORIZED {
            Err(ArmError::Auth(err))
        } else {
            Err(ArmError::Cloud(err))
        }
    }
}

#[async_trait]
impl StatusStore for FirebaseClient {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let response = self
            .http
            .get(self.url_for(key))
            .query(&self.query())
            .send()
            .await?;
        let response = Self::check(response, "GET").await?;

        let value: Value = response.json().await?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let response = self
            .http
            .put(self.url_for(key))
            .query(&self.query())
            .json(&value)
            .send()
            .await?;
        Self::check(response, "PUT").await?;
        log::debug!("Set {} = {}", key, value);
        Ok(())
    }

    async fn subscribe(&self, key: &str) -> Result<ChangeStream> {
        let request = self
            .http
            .get(self.url_for(key))
            .query(&self.query())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"));

        let source = EventSource::new(request)
            .map_err(|e| ArmError::Cloud(format!("Failed to open stream: {}", e)))?;

        log::info!("Subscribed to {}", key);
        let key = key.to_string();

        let changes = source.filter_map(move |item| {
            let key = key.clone();
            async move {
                match item {
                    Ok(Event::Open) => {
                        log::debug!("Stream for {} open", key);
                        None
                    }
                    Ok(Event::Message(message)) => {
                        match parse_stream_event(&message.event, &message.data) {
                            Ok(Some(event)) => event.into_change().transpose(),
                            Ok(None) => None,
                            Err(e) => Some(Err(e)),
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => Some(Err(ArmError::Cloud(
                        format!("stream for {} ended", key),
                    ))),
                    Err(e) => Some(Err(ArmError::Cloud(format!("stream for {}: {}", key, e)))),
                }
            }
        });

        Ok(changes.boxed())
    }
}
