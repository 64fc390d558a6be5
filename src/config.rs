use std::env;
use std::net::SocketAddr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceBackend {
    Sqlite,
    Firestore,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Static,
    Firebase,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub backend: PersistenceBackend,
    pub database_url: String,
    pub auth_mode: AuthMode,
    /// `token=uid[:Display Name]` list used by the static auth mode.
    pub auth_tokens: String,
    pub usage_reset_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("BIND_ADDR is invalid: {}", e)))?;

        let backend = match lookup("PERSISTENCE_BACKEND").as_deref().unwrap_or("sqlite") {
            "sqlite" => PersistenceBackend::Sqlite,
            "firestore" => PersistenceBackend::Firestore,
            "memory" => PersistenceBackend::Memory,
            other => {
                return Err(AppError::Config(format!("unknown PERSISTENCE_BACKEND: {}", other)));
            }
        };

        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://taskboard.db?mode=rwc".to_string());

        let auth_mode = match lookup("AUTH_MODE").as_deref().unwrap_or("static") {
            "static" => AuthMode::Static,
            "firebase" => AuthMode::Firebase,
            other => return Err(AppError::Config(format!("unknown AUTH_MODE: {}", other))),
        };

        let auth_tokens = lookup("AUTH_TOKENS").unwrap_or_default();
        if auth_mode == AuthMode::Static && auth_tokens.trim().is_empty() {
            return Err(AppError::Config("AUTH_TOKENS is not set".to_string()));
        }

        let usage_reset_secs = match lookup("USAGE_RESET_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| AppError::Config(format!("USAGE_RESET_SECS is invalid: {}", e)))?,
            None => 86_400,
        };
        if usage_reset_secs == 0 {
            return Err(AppError::Config("USAGE_RESET_SECS must be greater than 0".to_string()));
        }

        Ok(Self {
            bind_addr,
            backend,
            database_url,
            auth_mode,
            auth_tokens,
            usage_reset_secs,
        })
    }
}
