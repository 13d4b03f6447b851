//! User management endpoints.

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::request::RequestConfig;
use crate::types::{NewUser, User, UserPatch, UsersPage};

#[derive(Debug, Clone)]
pub struct UserService {
    client: ApiClient,
}

impl UserService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, limit: u32, search: Option<&str>) -> Result<UsersPage, ApiError> {
        let (path, config) = match search.map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => (
                "/users/search",
                RequestConfig::new().param("q", query).param("limit", limit),
            ),
            None => ("/users", RequestConfig::new().param("limit", limit)),
        };
        self.client.get(path, &config).await
    }

    pub async fn get(&self, id: u64) -> Result<User, ApiError> {
        self.client.get(&format!("/users/{id}"), &RequestConfig::new()).await
    }

    pub async fn create(&self, input: &NewUser) -> Result<User, ApiError> {
        let config = RequestConfig::new().data(input)?;
        self.client.post("/users/add", &config).await
    }

    pub async fn update(&self, id: u64, patch: &UserPatch) -> Result<User, ApiError> {
        let config = RequestConfig::new().data(patch)?;
        self.client.put(&format!("/users/{id}"), &config).await
    }

    pub async fn delete(&self, id: u64) -> Result<User, ApiError> {
        self.client.delete(&format!("/users/{id}"), &RequestConfig::new()).await
    }
}
