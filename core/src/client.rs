//! Authenticated JSON client for the admin API.
//!
//! # Design
//! `ApiClient` owns no tokens. Before each request it reads the access token
//! from the injected `CredentialStore`, builds a plain-data `HttpRequest`
//! (`build_request`), hands it to the injected `Transport` and interprets the
//! `HttpResponse` (`parse_response`).
//!
//! A 401 triggers at most one refresh per failure wave: the first request to
//! see it refreshes while the others wait on the `RefreshCoordinator`, then
//! each of them replays its original request exactly once. A 401 on a replay
//! is returned as an ordinary `HttpFailure`. A 401 for a token that has
//! already been replaced in the store is replayed with the stored token
//! without another refresh.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::ClientConfig;
use crate::coordinator::{Acquired, RefreshCoordinator, RefreshOutcome};
use crate::error::{ApiError, HttpFailure, StoreError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::request::{build_url, merge_headers, RequestConfig};
use crate::store::{CredentialStore, TokenKind, TokenPair};

/// Client for the admin API. Clones share transport, store and refresh state.
#[derive(Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    coordinator: RefreshCoordinator,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        mut config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            config: Arc::new(config),
            transport,
            store,
            coordinator: RefreshCoordinator::new(),
        }
    }

    #[cfg(feature = "reqwest")]
    pub fn with_reqwest(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self::new(config, Arc::new(crate::transport::ReqwestTransport::new()), store)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, config: &RequestConfig) -> Result<T, ApiError> {
        self.request(HttpMethod::Get, path, config).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, config: &RequestConfig) -> Result<T, ApiError> {
        self.request(HttpMethod::Post, path, config).await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, config: &RequestConfig) -> Result<T, ApiError> {
        self.request(HttpMethod::Put, path, config).await
    }

    pub async fn patch<T: DeserializeOwned>(&self, path: &str, config: &RequestConfig) -> Result<T, ApiError> {
        self.request(HttpMethod::Patch, path, config).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, config: &RequestConfig) -> Result<T, ApiError> {
        self.request(HttpMethod::Delete, path, config).await
    }

    /// Perform one request, refreshing the session once if it was rejected.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        config: &RequestConfig,
    ) -> Result<T, ApiError> {
        let token = self.store.get(TokenKind::Access);
        let request = self.build_request(method, path, config, token.as_deref())?;
        let response = self.send(request).await?;
        if response.status != 401 {
            return parse_response(response);
        }
        let replayed = self.recover(method, path, config, token.as_deref()).await?;
        parse_response(replayed)
    }

    /// Describe the request for `path` without sending it.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        config: &RequestConfig,
        token: Option<&str>,
    ) -> Result<HttpRequest, ApiError> {
        let body = config
            .body()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            method,
            url: build_url(&self.config.base_url, path, config.params()),
            headers: merge_headers(config.headers(), token),
            body,
        })
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        tracing::debug!(method = %request.method, url = %request.url, "sending request");
        let response = self.transport.execute(request).await?;
        tracing::debug!(status = response.status, "received response");
        Ok(response)
    }

    /// Refresh (or wait for the refresh in flight) and replay once.
    ///
    /// `sent` is the access token the rejected request carried. If the store
    /// already holds a different one, a refresh finished after that request
    /// left and the replay uses the stored token without refreshing again.
    async fn recover(
        &self,
        method: HttpMethod,
        path: &str,
        config: &RequestConfig,
        sent: Option<&str>,
    ) -> Result<HttpResponse, ApiError> {
        let token = loop {
            match self.coordinator.acquire_or_wait().await {
                Acquired::Leader(lease) => {
                    let current = self.store.get(TokenKind::Access);
                    if current.is_some() && current.as_deref() != sent {
                        tracing::debug!("access token changed since the request was sent, replaying");
                        lease.release(RefreshOutcome::Refreshed);
                        break current;
                    }
                    match self.refresh().await {
                        Ok(token) => {
                            lease.release(RefreshOutcome::Refreshed);
                            break Some(token);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "token refresh failed, clearing session");
                            if let Err(e) = self.store.clear() {
                                tracing::warn!(error = %e, "could not clear credentials");
                            }
                            lease.release(RefreshOutcome::Failed);
                            return Err(ApiError::SessionExpired);
                        }
                    }
                }
                Acquired::Waited(RefreshOutcome::Refreshed) => break self.store.get(TokenKind::Access),
                Acquired::Waited(RefreshOutcome::Failed) => return Err(ApiError::SessionExpired),
                Acquired::Waited(RefreshOutcome::Abandoned) => {
                    tracing::debug!("refresh leader went away, retrying");
                }
            }
        };
        let replay = self.build_request(method, path, config, token.as_deref())?;
        self.send(replay).await
    }

    /// Exchange the stored refresh token and persist the new pair.
    async fn refresh(&self) -> Result<String, RefreshError> {
        let refresh_token = self
            .store
            .get(TokenKind::Refresh)
            .ok_or(RefreshError::MissingRefreshToken)?;
        tracing::debug!("refreshing access token");

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: build_url(&self.config.base_url, &self.config.refresh_path, &[]),
            headers: merge_headers(&[], None),
            body: Some(serde_json::json!({ "refreshToken": refresh_token }).to_string()),
        };
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(RefreshError::Rejected(response.status));
        }

        let grant: RefreshGrant =
            serde_json::from_str(&response.body).map_err(|e| RefreshError::Malformed(e.to_string()))?;
        let granted = grant.into_tokens().ok_or(RefreshError::Denied)?;
        let tokens = TokenPair {
            access_token: granted.access_token,
            refresh_token: granted.refresh_token.unwrap_or(refresh_token),
        };
        self.store.set(&tokens)?;
        tracing::info!("access token refreshed");
        Ok(tokens.access_token)
    }
}

/// Turn a response into `T`.
///
/// 204 and 205 yield the value `T` deserializes from JSON `null` (`()`,
/// `None`, `Value::Null`). A success body that is not JSON is an
/// `HttpFailure` with an unparsed body; JSON of the wrong shape is a
/// `Deserialization` error.
pub fn parse_response<T: DeserializeOwned>(response: HttpResponse) -> Result<T, ApiError> {
    let value = if response.is_no_content() {
        Value::Null
    } else if !response.is_success() {
        return Err(ApiError::Http(HttpFailure::from_error_body(
            response.status,
            &response.body,
        )));
    } else {
        match serde_json::from_str(&response.body) {
            Ok(value) => value,
            Err(e) => {
                return Err(ApiError::Http(HttpFailure::unparsed(
                    response.status,
                    response.body,
                    &e,
                )))
            }
        }
    };
    serde_json::from_value(value).map_err(|e| ApiError::Deserialization(e.to_string()))
}

#[derive(Debug, Error)]
enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh endpoint unreachable: {0}")]
    Transport(#[from] TransportError),

    #[error("refresh endpoint answered {0}")]
    Rejected(u16),

    #[error("refresh endpoint did not grant a token")]
    Denied,

    #[error("malformed refresh response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Body of a successful refresh call, either enveloped
/// (`{"success": true, "data": {...}}`) or bare (`{"accessToken": ...}`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RefreshGrant {
    Enveloped {
        success: bool,
        #[serde(default)]
        data: Option<GrantedTokens>,
    },
    Bare(GrantedTokens),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantedTokens {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl RefreshGrant {
    fn into_tokens(self) -> Option<GrantedTokens> {
        let tokens = match self {
            RefreshGrant::Enveloped {
                success: true,
                data: Some(tokens),
            } => tokens,
            RefreshGrant::Bare(tokens) => tokens,
            RefreshGrant::Enveloped { .. } => return None,
        };
        (!tokens.access_token.is_empty()).then_some(tokens)
    }
}
