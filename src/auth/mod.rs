pub mod firebase;

use std::collections::HashMap;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

pub use firebase::{FirebaseAuth, FirebaseAuthConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Resolves a bearer token to the signed-in user. Sign-in and sign-out stay
/// with the identity provider.
#[async_trait]
pub trait AuthPort: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Option<AuthUser>, AppError>;
}

/// Fixed token table, for local development and tests.
#[derive(Debug, Default)]
pub struct StaticTokenAuth {
    users: HashMap<String, AuthUser>,
}

impl StaticTokenAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: impl Into<String>, user: AuthUser) -> Self {
        self.users.insert(token.into(), user);
        self
    }

    /// Parses `token=uid[:Display Name]` entries separated by commas.
    pub fn parse(entries: &str) -> Result<Self, AppError> {
        let mut auth = Self::new();
        for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, user) = entry
                .split_once('=')
                .ok_or_else(|| AppError::Config(format!("invalid AUTH_TOKENS entry: {}", entry)))?;
            let (id, display_name) = match user.split_once(':') {
                Some((id, name)) => (id.trim(), Some(name.trim().to_string())),
                None => (user.trim(), None),
            };
            if token.trim().is_empty() || id.is_empty() {
                return Err(AppError::Config(format!("invalid AUTH_TOKENS entry: {}", entry)));
            }
            auth = auth.with_user(
                token.trim(),
                AuthUser {
                    id: id.to_string(),
                    display_name,
                    photo_url: None,
                },
            );
        }
        Ok(auth)
    }
}

#[async_trait]
impl AuthPort for StaticTokenAuth {
    async fn verify(&self, token: &str) -> Result<Option<AuthUser>, AppError> {
        Ok(self.users.get(token).cloned())
    }
}

pub fn parse_authorization_bearer(value: &str) -> Option<&str> {
    let (prefix, rest) = value.trim().split_once(' ')?;
    if !prefix.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// Rejects requests without a valid bearer token and attaches the
/// [`AuthUser`] to the request otherwise.
pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_authorization_bearer)
        .map(str::to_string);

    let Some(token) = token else {
        warn!(path = %req.uri().path(), reason = "missing_token", "Unauthorized request");
        return Err(AppError::Unauthorized);
    };

    let Some(user) = state.auth.verify(&token).await? else {
        warn!(path = %req.uri().path(), reason = "unknown_token", "Unauthorized request");
        return Err(AppError::Unauthorized);
    };

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(parse_authorization_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_authorization_bearer("bearer   abc  "), Some("abc"));
        assert_eq!(parse_authorization_bearer("Basic abc"), None);
        assert_eq!(parse_authorization_bearer("Bearer "), None);
    }

    #[tokio::test]
    async fn static_tokens_parse_from_env_format() {
        let auth = StaticTokenAuth::parse("t1=alice:Alice Smith, t2=bob").unwrap();

        let alice = auth.verify("t1").await.unwrap().unwrap();
        assert_eq!(alice.id, "alice");
        assert_eq!(alice.display_name.as_deref(), Some("Alice Smith"));

        let bob = auth.verify("t2").await.unwrap().unwrap();
        assert_eq!(bob.display_name, None);

        assert!(auth.verify("t3").await.unwrap().is_none());
        assert!(StaticTokenAuth::parse("no-separator").is_err());
    }
}
