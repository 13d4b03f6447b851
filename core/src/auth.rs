//! Sign-in and sign-out.

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::request::RequestConfig;
use crate::store::{TokenKind, TokenPair};
use crate::types::{AuthUser, LoginCredentials, LoginResponse, User};

/// Session length requested when the caller does not pick one.
pub const DEFAULT_SESSION_MINUTES: u32 = 30;

/// A freshly established session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: AuthUser,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone)]
pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Exchange credentials for a token pair and persist it.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthSession, ApiError> {
        let mut body = credentials.clone();
        body.expires_in_mins.get_or_insert(DEFAULT_SESSION_MINUTES);
        let config = RequestConfig::new().data(&body)?;

        let login: LoginResponse = self.client.post(&self.client.config().login_path, &config).await?;
        let tokens = TokenPair::new(login.access_token.as_str(), login.refresh_token.as_str());
        self.client.store().set(&tokens)?;
        tracing::info!(username = %login.username, "signed in");

        Ok(AuthSession {
            user: AuthUser::from(&login),
            tokens,
        })
    }

    /// The account behind the stored access token.
    pub async fn me(&self) -> Result<User, ApiError> {
        self.client.get(&self.client.config().me_path, &RequestConfig::new()).await
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.store().get(TokenKind::Access).is_some()
    }

    /// Forget the stored credentials.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.client.store().clear()?;
        tracing::info!("signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::config::ClientConfig;
    use crate::error::TransportError;
    use crate::http::{HttpRequest, HttpResponse, Transport};
    use crate::store::{CredentialStore, MemoryCredentialStore};

    /// Answers every request with `body` and remembers the URLs.
    struct Recording {
        body: serde_json::Value,
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Recording {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.urls.lock().push(request.url);
            Ok(HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: self.body.to_string(),
            })
        }
    }

    fn service(config: ClientConfig, body: serde_json::Value) -> (AuthService, Arc<Recording>) {
        let transport = Arc::new(Recording {
            body,
            urls: Mutex::new(Vec::new()),
        });
        let store = Arc::new(MemoryCredentialStore::with_tokens(&TokenPair::new("a", "r")));
        let client = ApiClient::new(config, transport.clone(), store);
        (AuthService::new(client), transport)
    }

    #[tokio::test]
    async fn me_uses_configured_path() {
        let config = ClientConfig::new("http://api.test").with_me_path("/session/whoami");
        let (auth, transport) = service(
            config,
            json!({"id": 1, "firstName": "Ada", "lastName": "Admin", "email": "a@b.c", "username": "admin"}),
        );

        let me = auth.me().await.unwrap();
        assert_eq!(me.username, "admin");
        assert_eq!(*transport.urls.lock(), vec!["http://api.test/session/whoami".to_string()]);
    }

    #[tokio::test]
    async fn login_stores_returned_tokens() {
        let (auth, transport) = service(
            ClientConfig::new("http://api.test"),
            json!({"id": 1, "username": "admin", "firstName": "Ada", "lastName": "Admin",
                   "accessToken": "at-1", "refreshToken": "rt-1"}),
        );
        auth.logout().unwrap();
        assert!(!auth.is_authenticated());

        let session = auth.login(&LoginCredentials::new("admin", "admin")).await.unwrap();
        assert_eq!(session.user.name, "Ada Admin");
        assert_eq!(session.tokens, TokenPair::new("at-1", "rt-1"));
        assert_eq!(auth.client.store().get(TokenKind::Refresh).as_deref(), Some("rt-1"));
        assert_eq!(*transport.urls.lock(), vec!["http://api.test/auth/login".to_string()]);
    }
}
