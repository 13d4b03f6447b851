//! Product catalog endpoints.

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::request::RequestConfig;
use crate::types::{NewProduct, Product, ProductPatch, ProductsPage};

#[derive(Debug, Clone)]
pub struct ProductService {
    client: ApiClient,
}

impl ProductService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// One page of products, filtered by `search` when it is not blank.
    pub async fn list(&self, limit: u32, search: Option<&str>) -> Result<ProductsPage, ApiError> {
        let (path, config) = match search.map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => (
                "/products/search",
                RequestConfig::new().param("q", query).param("limit", limit),
            ),
            None => ("/products", RequestConfig::new().param("limit", limit)),
        };
        self.client.get(path, &config).await
    }

    pub async fn get(&self, id: u64) -> Result<Product, ApiError> {
        self.client.get(&format!("/products/{id}"), &RequestConfig::new()).await
    }

    pub async fn create(&self, input: &NewProduct) -> Result<Product, ApiError> {
        let config = RequestConfig::new().data(input)?;
        self.client.post("/products/add", &config).await
    }

    pub async fn update(&self, id: u64, patch: &ProductPatch) -> Result<Product, ApiError> {
        let config = RequestConfig::new().data(patch)?;
        self.client.put(&format!("/products/{id}"), &config).await
    }

    /// Delete a product; the server echoes it back flagged as deleted.
    pub async fn delete(&self, id: u64) -> Result<Product, ApiError> {
        self.client.delete(&format!("/products/{id}"), &RequestConfig::new()).await
    }
}
