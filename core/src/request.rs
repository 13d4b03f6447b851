//! Per-call request options.
//!
//! `RequestConfig` enumerates everything a caller can influence: a JSON body,
//! query parameters and extra headers. Everything else about the outgoing
//! request is decided by `ApiClient`.

use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";

/// A scalar query-parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Int(n) => write!(f, "{n}"),
            ParamValue::UInt(n) => write!(f, "{n}"),
            ParamValue::Float(n) => write!(f, "{n}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

macro_rules! param_from_int {
    ($variant:ident: $($ty:ty),*) => {
        $(impl From<$ty> for ParamValue {
            fn from(value: $ty) -> Self {
                ParamValue::$variant(value.into())
            }
        })*
    };
}

param_from_int!(Int: i8, i16, i32, i64);
param_from_int!(UInt: u8, u16, u32, u64);

/// Options for a single request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestConfig {
    data: Option<Value>,
    params: Vec<(String, ParamValue)>,
    headers: Vec<(String, String)>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a JSON body.
    pub fn data<T: Serialize + ?Sized>(mut self, data: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(data).map_err(|e| ApiError::Serialization(e.to_string()))?;
        self.data = Some(value);
        Ok(self)
    }

    /// Attach an already-built JSON body.
    pub fn json(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Append a query parameter. Parameters keep their insertion order.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add or override a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn params(&self) -> &[(String, ParamValue)] {
        &self.params
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// Join `base` and `path`, then append `params` as a form-urlencoded query.
pub(crate) fn build_url(base: &str, path: &str, params: &[(String, ParamValue)]) -> String {
    let mut url = format!("{base}{path}");
    if params.is_empty() {
        return url;
    }
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        query.append_pair(key, &value.to_string());
    }
    url.push(if path.contains('?') { '&' } else { '?' });
    url.push_str(&query.finish());
    url
}

/// JSON defaults first, then caller headers, then the bearer token.
///
/// Names are lowercased; a later entry replaces an earlier one with the same
/// name and leaves every other header alone.
pub(crate) fn merge_headers(caller: &[(String, String)], token: Option<&str>) -> Vec<(String, String)> {
    let mut headers = vec![
        ("content-type".to_string(), JSON_CONTENT_TYPE.to_string()),
        ("accept".to_string(), JSON_CONTENT_TYPE.to_string()),
    ];
    let mut set = |name: &str, value: &str| {
        let name = name.to_ascii_lowercase();
        match headers.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => headers.push((name, value.to_string())),
        }
    };
    for (name, value) in caller {
        set(name, value);
    }
    if let Some(token) = token {
        set("authorization", &format!("Bearer {token}"));
    }
    headers
}
