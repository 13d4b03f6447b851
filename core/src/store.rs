//! Credential storage.
//!
//! # Design
//! The store is the single source of truth for tokens. `ApiClient` reads it
//! before every request and never keeps its own copy, so a token written by
//! one request (after a refresh, or by a login) is seen by the next one.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::StoreError;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Which credential to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Fixed storage key for this credential.
    pub fn key(&self) -> &'static str {
        match self {
            TokenKind::Access => ACCESS_TOKEN_KEY,
            TokenKind::Refresh => REFRESH_TOKEN_KEY,
        }
    }
}

/// An access token and the refresh token that renews it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Durable home of the session credentials.
pub trait CredentialStore: Send + Sync {
    fn get(&self, kind: TokenKind) -> Option<String>;

    fn set(&self, tokens: &TokenPair) -> Result<(), StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    tokens: RwLock<BTreeMap<&'static str, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: &TokenPair) -> Self {
        let store = Self::new();
        store.write(tokens);
        store
    }

    /// Store only an access token, as left behind by a login whose refresh
    /// token was lost.
    pub fn with_access_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.tokens.write().insert(ACCESS_TOKEN_KEY, token.into());
        store
    }

    fn write(&self, tokens: &TokenPair) {
        let mut map = self.tokens.write();
        map.insert(ACCESS_TOKEN_KEY, tokens.access_token.clone());
        map.insert(REFRESH_TOKEN_KEY, tokens.refresh_token.clone());
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        self.tokens.read().get(kind.key()).cloned()
    }

    fn set(&self, tokens: &TokenPair) -> Result<(), StoreError> {
        self.write(tokens);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.tokens.write().clear();
        Ok(())
    }
}

/// Keeps the credentials in a JSON file keyed by the well-known token names.
///
/// The file is re-read on every `get`, so several processes sharing one file
/// see each other's refreshes. `set` stages the new pair in a sibling temp
/// file and renames it over the old one.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        match self.load() {
            Ok(mut map) => map.remove(kind.key()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "unreadable credential file");
                None
            }
        }
    }

    fn set(&self, tokens: &TokenPair) -> Result<(), StoreError> {
        let map = BTreeMap::from([
            (ACCESS_TOKEN_KEY, tokens.access_token.as_str()),
            (REFRESH_TOKEN_KEY, tokens.refresh_token.as_str()),
        ]);
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        // Readers only ever see the old file or the complete new one.
        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(&serde_json::to_vec_pretty(&map)?)?;
        staged.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
