//! Credentials for Realtime Database requests.
//!
//! Three modes:
//! - `none`: open database rules
//! - `token`: a database secret or ID token read from an environment variable
//! - `anonymous`: anonymous sign-up with the project's web API key

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ArmError, Result};

/// Identity Toolkit sign-up endpoint
pub const SIGN_UP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";

/// How to authenticate against the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum AuthConfig {
    None,
    Token {
        #[serde(default = "default_token_env")]
        env: String,
    },
    Anonymous {
        #[serde(rename = "api-key-env", default = "default_api_key_env")]
        api_key_env: String,
    },
}

fn default_token_env() -> String {
    "FIREBASE_AUTH_TOKEN".to_string()
}

fn default_api_key_env() -> String {
    "FIREBASE_API_KEY".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig::Token {
            env: default_token_env(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    #[serde(default)]
    local_id: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Resolve the `auth=` query token for a configuration.
pub async fn resolve_token(http: &Client, config: &AuthConfig) -> Result<Option<String>> {
    match config {
        AuthConfig::None => Ok(None),
        AuthConfig::Token { env } => read_env(env).map(Some),
        AuthConfig::Anonymous { api_key_env } => {
            let api_key = read_env(api_key_env)?;
            sign_up_anonymous(http, SIGN_UP_URL, &api_key).await.map(Some)
        }
    }
}

/// Anonymous sign-up; returns the ID token.
pub async fn sign_up_anonymous(http: &Client, endpoint: &str, api_key: &str) -> Result<String> {
    log::info!("Attempting anonymous sign-up");

    let response = http
        .post(endpoint)
        .query(&[("key", api_key)])
        .json(&json!({ "returnSecureToken": true }))
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(ArmError::Auth(format!("sign-up failed ({}): {}", status, message)));
    }

    parse_sign_up(&body)
}

fn parse_sign_up(body: &str) -> Result<String> {
    let parsed: SignUpResponse = serde_json::from_str(body)
        .map_err(|e| ArmError::Auth(format!("unexpected sign-up response: {}", e)))?;
    log::info!(
        "Signed up anonymously as {} (token expires in {}s)",
        parsed.local_id,
        parsed.expires_in.as_deref().unwrap_or("?")
    );
    Ok(parsed.id_token)
}

fn read_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ArmError::Auth(format!(
            "environment variable {} not set",
            name
        ))),
    }
}
