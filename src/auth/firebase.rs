use std::env;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::{AuthPort, AuthUser};
use crate::error::AppError;

const LOOKUP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:lookup";

#[derive(Clone, Debug)]
pub struct FirebaseAuthConfig {
    pub api_key: String,
}

impl FirebaseAuthConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let api_key = env::var("FIREBASE_API_KEY")
            .map_err(|_| AppError::Config("FIREBASE_API_KEY is not set".to_string()))?;
        Ok(Self { api_key })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

/// Verifies Firebase ID tokens through the identity toolkit lookup endpoint.
pub struct FirebaseAuth {
    client: Client,
    config: FirebaseAuthConfig,
}

impl FirebaseAuth {
    pub fn new(config: FirebaseAuthConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl AuthPort for FirebaseAuth {
    async fn verify(&self, token: &str) -> Result<Option<AuthUser>, AppError> {
        let url = format!("{}?key={}", LOOKUP_URL, self.config.api_key);
        let response = self
            .client
            .post(&url)
            .json(&LookupRequest { id_token: token })
            .send()
            .await
            .map_err(|e| {
                error!("identity lookup failed: {}", e);
                AppError::InternalServerError
            })?;

        // Expired or malformed tokens come back as 400.
        if response.status() == StatusCode::BAD_REQUEST {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("identity lookup error {}: {}", status, body);
            return Err(AppError::InternalServerError);
        }

        let parsed: LookupResponse = response.json().await.map_err(|e| {
            error!("failed to parse identity lookup: {}", e);
            AppError::InternalServerError
        })?;

        Ok(parsed.users.into_iter().next().map(|u| AuthUser {
            id: u.local_id,
            display_name: u.display_name,
            photo_url: u.photo_url,
        }))
    }
}
