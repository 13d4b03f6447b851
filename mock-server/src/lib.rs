use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

const DEFAULT_LIMIT: usize = 30;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    pub stock: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub price: f64,
    #[serde(default)]
    pub stock: u32,
    pub brand: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<u32>,
    pub brand: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub username: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub username: String,
    pub age: Option<u32>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub age: Option<u32>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub expires_in_mins: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    #[serde(default)]
    pub q: String,
}

#[derive(Default)]
struct Backend {
    products: BTreeMap<u64, Product>,
    users: BTreeMap<u64, User>,
    passwords: HashMap<String, String>,
    next_id: u64,
    access_tokens: HashMap<String, u64>,
    refresh_tokens: HashMap<String, u64>,
    refresh_calls: usize,
}

impl Backend {
    fn seeded() -> Self {
        let mut backend = Backend {
            next_id: 100,
            ..Backend::default()
        };
        let products = [
            (1, "Essence Mascara Lash Princess", "beauty", 9.99, 99, Some("Essence")),
            (2, "iPhone 9", "smartphones", 549.0, 94, Some("Apple")),
            (3, "Samsung Universe 9", "smartphones", 1249.0, 36, Some("Samsung")),
            (4, "Wooden Desk Lamp", "home-decoration", 34.5, 12, None),
        ];
        for (id, title, category, price, stock, brand) in products {
            backend.products.insert(
                id,
                Product {
                    id,
                    title: title.to_string(),
                    description: format!("{title} from the seed catalog"),
                    category: category.to_string(),
                    price,
                    stock,
                    brand: brand.map(str::to_string),
                    is_deleted: None,
                },
            );
        }
        let users = [
            (1, "Ada", "Admin", "admin", "admin", "admin"),
            (2, "Emily", "Johnson", "emilys", "emilyspass", "user"),
            (3, "Michael", "Williams", "michaelw", "michaelwpass", "moderator"),
        ];
        for (id, first, last, username, password, role) in users {
            backend.users.insert(
                id,
                User {
                    id,
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    age: Some(30),
                    gender: None,
                    email: format!("{username}@example.com"),
                    phone: None,
                    username: username.to_string(),
                    role: role.to_string(),
                    is_deleted: None,
                },
            );
            backend.passwords.insert(username.to_string(), password.to_string());
        }
        backend
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Mint a fresh token pair for `user_id`.
    fn issue_tokens(&mut self, user_id: u64) -> (String, String) {
        let access = format!("at-{}", Uuid::new_v4());
        let refresh = format!("rt-{}", Uuid::new_v4());
        self.access_tokens.insert(access.clone(), user_id);
        self.refresh_tokens.insert(refresh.clone(), user_id);
        (access, refresh)
    }
}

/// Shared backend state. Clones share the same data.
#[derive(Clone)]
pub struct MockState {
    db: Arc<RwLock<Backend>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            db: Arc::new(RwLock::new(Backend::seeded())),
        }
    }
}

impl MockState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate every access token; refresh tokens keep working.
    pub async fn expire_access_tokens(&self) {
        self.db.write().await.access_tokens.clear();
    }

    /// Invalidate every refresh token.
    pub async fn revoke_refresh_tokens(&self) {
        self.db.write().await.refresh_tokens.clear();
    }

    /// Number of calls made to the refresh endpoint so far.
    pub async fn refresh_calls(&self) -> usize {
        self.db.read().await.refresh_calls
    }
}

type Failure = (StatusCode, Json<Value>);

fn failure(status: StatusCode, message: impl Into<String>) -> Failure {
    (status, Json(json!({ "message": message.into() })))
}

pub fn app() -> Router {
    app_with_state(MockState::new())
}

pub fn app_with_state(state: MockState) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh-token", post(refresh_token))
        .route("/auth/me", get(me))
        .route("/products", get(list_products))
        .route("/products/search", get(search_products))
        .route("/products/add", post(add_product))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/users", get(list_users))
        .route("/users/search", get(search_users))
        .route("/users/add", post(add_user))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_state(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

/// Resolve the bearer token to a user id.
async fn authorize(state: &MockState, headers: &HeaderMap) -> Result<u64, Failure> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Access Token is required"))?;
    state
        .db
        .read()
        .await
        .access_tokens
        .get(token)
        .copied()
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Token Expired!"))
}

fn page<T>(items: Vec<T>, query: &PageQuery) -> (Vec<T>, usize, usize, usize) {
    let total = items.len();
    let skip = query.skip.unwrap_or(0);
    let limit = match query.limit.unwrap_or(DEFAULT_LIMIT) {
        0 => total,
        n => n,
    };
    let slice = items.into_iter().skip(skip).take(limit).collect::<Vec<_>>();
    let limit = slice.len();
    (slice, total, skip, limit)
}

async fn login(
    State(state): State<MockState>,
    Json(input): Json<LoginRequest>,
) -> Result<Json<Value>, Failure> {
    let mut db = state.db.write().await;
    let known = db.passwords.get(&input.username) == Some(&input.password);
    let user = db
        .users
        .values()
        .find(|user| user.username == input.username)
        .cloned()
        .filter(|_| known)
        .ok_or_else(|| failure(StatusCode::BAD_REQUEST, "Invalid credentials"))?;
    let (access, refresh) = db.issue_tokens(user.id);
    tracing::debug!(username = %user.username, expires_in_mins = ?input.expires_in_mins, "login");
    Ok(Json(json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "firstName": user.first_name,
        "lastName": user.last_name,
        "gender": user.gender,
        "image": Value::Null,
        "accessToken": access,
        "refreshToken": refresh,
    })))
}

async fn refresh_token(
    State(state): State<MockState>,
    Json(input): Json<RefreshRequest>,
) -> Result<Json<Value>, Failure> {
    let mut db = state.db.write().await;
    db.refresh_calls += 1;
    let Some(user_id) = db.refresh_tokens.remove(&input.refresh_token) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "Invalid refresh token" })),
        ));
    };
    let (access, refresh) = db.issue_tokens(user_id);
    tracing::debug!(user_id, "refreshed tokens");
    Ok(Json(json!({
        "success": true,
        "data": { "accessToken": access, "refreshToken": refresh },
    })))
}

async fn me(State(state): State<MockState>, headers: HeaderMap) -> Result<Json<User>, Failure> {
    let user_id = authorize(&state, &headers).await?;
    let db = state.db.read().await;
    db.users
        .get(&user_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "User not found"))
}

fn matches(haystacks: &[&str], needle: &str) -> bool {
    let needle = needle.to_lowercase();
    haystacks.iter().any(|h| h.to_lowercase().contains(&needle))
}

async fn list_products(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers).await?;
    let products = state.db.read().await.products.values().cloned().collect();
    let (products, total, skip, limit) = page(products, &query);
    Ok(Json(json!({ "products": products, "total": total, "skip": skip, "limit": limit })))
}

async fn search_products(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers).await?;
    let products = state
        .db
        .read()
        .await
        .products
        .values()
        .filter(|p| matches(&[p.title.as_str(), p.description.as_str(), p.category.as_str()], &query.q))
        .cloned()
        .collect();
    let (products, total, skip, limit) = page(products, &query);
    Ok(Json(json!({ "products": products, "total": total, "skip": skip, "limit": limit })))
}

async fn get_product(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Product>, Failure> {
    authorize(&state, &headers).await?;
    let db = state.db.read().await;
    db.products
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("Product with id '{id}' not found")))
}

async fn add_product(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(input): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), Failure> {
    authorize(&state, &headers).await?;
    let mut db = state.db.write().await;
    let product = Product {
        id: db.next_id(),
        title: input.title,
        description: input.description,
        category: input.category,
        price: input.price,
        stock: input.stock,
        brand: input.brand,
        is_deleted: None,
    };
    db.products.insert(product.id, product.clone());
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(input): Json<ProductPatch>,
) -> Result<Json<Product>, Failure> {
    authorize(&state, &headers).await?;
    let mut db = state.db.write().await;
    let product = db
        .products
        .get_mut(&id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("Product with id '{id}' not found")))?;
    if let Some(title) = input.title {
        product.title = title;
    }
    if let Some(description) = input.description {
        product.description = description;
    }
    if let Some(category) = input.category {
        product.category = category;
    }
    if let Some(price) = input.price {
        product.price = price;
    }
    if let Some(stock) = input.stock {
        product.stock = stock;
    }
    if input.brand.is_some() {
        product.brand = input.brand;
    }
    Ok(Json(product.clone()))
}

async fn delete_product(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Product>, Failure> {
    authorize(&state, &headers).await?;
    let mut db = state.db.write().await;
    let mut product = db
        .products
        .remove(&id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("Product with id '{id}' not found")))?;
    product.is_deleted = Some(true);
    Ok(Json(product))
}

async fn list_users(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers).await?;
    let users = state.db.read().await.users.values().cloned().collect();
    let (users, total, skip, limit) = page(users, &query);
    Ok(Json(json!({ "users": users, "total": total, "skip": skip, "limit": limit })))
}

async fn search_users(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers).await?;
    let users = state
        .db
        .read()
        .await
        .users
        .values()
        .filter(|u| {
            matches(
                &[u.first_name.as_str(), u.last_name.as_str(), u.email.as_str(), u.username.as_str()],
                &query.q,
            )
        })
        .cloned()
        .collect();
    let (users, total, skip, limit) = page(users, &query);
    Ok(Json(json!({ "users": users, "total": total, "skip": skip, "limit": limit })))
}

async fn get_user(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<User>, Failure> {
    authorize(&state, &headers).await?;
    let db = state.db.read().await;
    db.users
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("User with id '{id}' not found")))
}

async fn add_user(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(input): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), Failure> {
    authorize(&state, &headers).await?;
    let mut db = state.db.write().await;
    let user = User {
        id: db.next_id(),
        first_name: input.first_name,
        last_name: input.last_name,
        age: input.age,
        gender: None,
        email: input.email,
        phone: input.phone,
        username: input.username,
        role: input.role.unwrap_or_else(|| "user".to_string()),
        is_deleted: None,
    };
    db.users.insert(user.id, user.clone());
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(input): Json<UserPatch>,
) -> Result<Json<User>, Failure> {
    authorize(&state, &headers).await?;
    let mut db = state.db.write().await;
    let user = db
        .users
        .get_mut(&id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("User with id '{id}' not found")))?;
    if let Some(first_name) = input.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = input.last_name {
        user.last_name = last_name;
    }
    if let Some(email) = input.email {
        user.email = email;
    }
    if input.age.is_some() {
        user.age = input.age;
    }
    if input.phone.is_some() {
        user.phone = input.phone;
    }
    if let Some(role) = input.role {
        user.role = role;
    }
    Ok(Json(user.clone()))
}

async fn delete_user(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<User>, Failure> {
    authorize(&state, &headers).await?;
    let mut db = state.db.write().await;
    let mut user = db
        .users
        .remove(&id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, format!("User with id '{id}' not found")))?;
    user.is_deleted = Some(true);
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_serializes_camel_case() {
        let product = Product {
            id: 1,
            title: "Lamp".to_string(),
            description: String::new(),
            category: "home".to_string(),
            price: 10.0,
            stock: 2,
            brand: None,
            is_deleted: Some(true),
        };
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["isDeleted"], true);
        assert!(json.get("brand").is_none());
    }

    #[test]
    fn login_request_expiry_is_optional() {
        let input: LoginRequest =
            serde_json::from_str(r#"{"username":"admin","password":"admin"}"#).unwrap();
        assert!(input.expires_in_mins.is_none());
    }

    #[test]
    fn refresh_request_rejects_missing_token() {
        let result: Result<RefreshRequest, _> = serde_json::from_str(r#"{}"#);
        assert!(result.is_err());
    }

    #[test]
    fn new_user_requires_username() {
        let result: Result<NewUser, _> =
            serde_json::from_str(r#"{"firstName":"A","lastName":"B","email":"a@b.c"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn page_limit_zero_returns_everything() {
        let query = PageQuery {
            limit: Some(0),
            skip: None,
            q: String::new(),
        };
        let (items, total, skip, limit) = page(vec![1, 2, 3], &query);
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!((total, skip, limit), (3, 0, 3));
    }

    #[test]
    fn page_applies_skip_and_limit() {
        let query = PageQuery {
            limit: Some(2),
            skip: Some(1),
            q: String::new(),
        };
        let (items, total, _, limit) = page(vec![1, 2, 3, 4], &query);
        assert_eq!(items, vec![2, 3]);
        assert_eq!((total, limit), (4, 2));
    }

    #[test]
    fn search_is_case_insensitive() {
        assert!(matches(&["iPhone 9"], "PHONE"));
        assert!(!matches(&["Lamp"], "phone"));
    }

    #[tokio::test]
    async fn seeded_state_has_admin_account() {
        let state = MockState::new();
        let db = state.db.read().await;
        assert_eq!(db.passwords.get("admin").map(String::as_str), Some("admin"));
        assert_eq!(db.products.len(), 4);
    }
}
