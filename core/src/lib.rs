//! Authenticated API client core for the admin dashboard backend.
//!
//! # Overview
//! `ApiClient` sends JSON requests with the stored bearer token and, when the
//! backend answers 401, refreshes the session once and replays the request.
//! Concurrent requests that hit the same expired token share one refresh.
//!
//! # Design
//! - Requests and responses are plain data (`HttpRequest` / `HttpResponse`);
//!   the network round-trip sits behind the `Transport` trait, so the client
//!   runs against reqwest in production and scripted fakes in tests.
//! - Tokens live only in a `CredentialStore`, read before every request.
//! - Refresh coalescing is an explicit `RefreshCoordinator` owned by the
//!   client rather than process-wide state.
//! - `AuthService`, `ProductService` and `UserService` are thin typed
//!   wrappers over `ApiClient`. DTOs are defined independently from the
//!   mock-server crate; integration tests catch schema drift.

pub mod auth;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod products;
pub mod request;
pub mod store;
#[cfg(feature = "reqwest")]
pub mod transport;
pub mod types;
pub mod users;

pub use auth::{AuthService, AuthSession};
pub use client::{parse_response, ApiClient};
pub use config::ClientConfig;
pub use coordinator::{Acquired, RefreshCoordinator, RefreshLease, RefreshOutcome};
pub use error::{ApiError, ConfigError, FailureBody, HttpFailure, StoreError, TransportError};
pub use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use products::ProductService;
pub use request::{ParamValue, RequestConfig};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, TokenKind, TokenPair};
#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
pub use types::{
    AuthUser, LoginCredentials, LoginResponse, NewProduct, NewUser, Product, ProductPatch, ProductsPage, User,
    UserPatch, UsersPage,
};
pub use users::UserService;
