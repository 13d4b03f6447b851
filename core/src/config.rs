//! Client configuration.

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh-token";
pub const DEFAULT_LOGIN_PATH: &str = "/auth/login";
pub const DEFAULT_ME_PATH: &str = "/auth/me";

/// Where the backend lives and which endpoints handle authentication.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_me_path")]
    pub me_path: String,
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

fn default_me_path() -> String {
    DEFAULT_ME_PATH.to_string()
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            refresh_path: default_refresh_path(),
            login_path: default_login_path(),
            me_path: default_me_path(),
        }
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn with_me_path(mut self, path: impl Into<String>) -> Self {
        self.me_path = path.into();
        self
    }

    /// Read `API_BASE_URL` plus the optional `API_REFRESH_PATH`,
    /// `API_LOGIN_PATH` and `API_ME_PATH`, loading a `.env` file first when
    /// one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "ignoring unreadable .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("API_BASE_URL").ok_or(ConfigError::MissingVar("API_BASE_URL"))?;
        url::Url::parse(&base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;

        let mut config = Self::new(&base_url);
        if let Some(path) = lookup("API_REFRESH_PATH") {
            config.refresh_path = path;
        }
        if let Some(path) = lookup("API_LOGIN_PATH") {
            config.login_path = path;
        }
        if let Some(path) = lookup("API_ME_PATH") {
            config.me_path = path;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let config = ClientConfig::new("http://localhost:3000/");
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.refresh_path, "/auth/refresh-token");
        assert_eq!(config.login_path, "/auth/login");
        assert_eq!(config.me_path, "/auth/me");
    }

    #[test]
    fn env_overrides_paths() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("API_BASE_URL", "https://dummyjson.com/"),
            ("API_REFRESH_PATH", "/auth/refresh"),
            ("API_ME_PATH", "/session/whoami"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://dummyjson.com");
        assert_eq!(config.refresh_path, "/auth/refresh");
        assert_eq!(config.login_path, DEFAULT_LOGIN_PATH);
        assert_eq!(config.me_path, "/session/whoami");
    }

    #[test]
    fn missing_base_url_is_an_error() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("API_BASE_URL")));
    }

    #[test]
    fn relative_base_url_is_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[("API_BASE_URL", "/api")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url":"http://localhost:3000"}"#).unwrap();
        assert_eq!(config.refresh_path, DEFAULT_REFRESH_PATH);
        assert_eq!(config.me_path, DEFAULT_ME_PATH);
    }
}
