//! Verify request building and response parsing against JSON test vectors
//! stored in `test-vectors/`.
//!
//! Request bodies are compared as parsed JSON, not raw strings, so field
//! ordering does not cause false negatives.

use std::sync::Arc;

use admin_client_core::{
    parse_response, ApiClient, ApiError, ClientConfig, FailureBody, HttpMethod, HttpRequest, HttpResponse,
    MemoryCredentialStore, ParamValue, Product, RequestConfig, Transport, TransportError,
};
use async_trait::async_trait;
use serde_json::Value;

/// Vectors only build requests; nothing is sent.
struct Offline;

#[async_trait]
impl Transport for Offline {
    async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        Err(TransportError::new("offline"))
    }
}

fn client(base_url: &str) -> ApiClient {
    ApiClient::new(
        ClientConfig::new(base_url),
        Arc::new(Offline),
        Arc::new(MemoryCredentialStore::new()),
    )
}

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "PATCH" => HttpMethod::Patch,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn param_value(value: &Value) -> ParamValue {
    match value {
        Value::String(s) => ParamValue::from(s.as_str()),
        Value::Bool(b) => ParamValue::from(*b),
        Value::Number(n) if n.is_u64() => ParamValue::from(n.as_u64().unwrap()),
        Value::Number(n) if n.is_i64() => ParamValue::from(n.as_i64().unwrap()),
        Value::Number(n) => ParamValue::from(n.as_f64().unwrap()),
        other => panic!("unsupported param value: {other}"),
    }
}

fn pairs(value: &Value) -> Vec<(String, Value)> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|pair| {
            let pair = pair.as_array().unwrap();
            (pair[0].as_str().unwrap().to_string(), pair[1].clone())
        })
        .collect()
}

fn string_pairs(value: &Value) -> Vec<(String, String)> {
    pairs(value)
        .into_iter()
        .map(|(k, v)| (k, v.as_str().unwrap().to_string()))
        .collect()
}

#[test]
fn request_test_vectors() {
    let raw = include_str!("../../test-vectors/requests.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let c = client(vectors["base_url"].as_str().unwrap());

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();

        let mut config = RequestConfig::new();
        for (key, value) in pairs(&case["params"]) {
            config = config.param(key, param_value(&value));
        }
        for (key, value) in string_pairs(&case["headers"]) {
            config = config.header(key, value);
        }
        if !case["data"].is_null() {
            config = config.json(case["data"].clone());
        }

        let method = parse_method(case["method"].as_str().unwrap());
        let req = c
            .build_request(method, case["path"].as_str().unwrap(), &config, case["token"].as_str())
            .unwrap();

        let expected = &case["expected_request"];
        assert_eq!(req.method, method, "{name}: method");
        assert_eq!(req.url, expected["url"].as_str().unwrap(), "{name}: url");
        assert_eq!(req.headers, string_pairs(&expected["headers"]), "{name}: headers");

        let body = req
            .body
            .as_deref()
            .map(|b| serde_json::from_str::<Value>(b).unwrap())
            .unwrap_or(Value::Null);
        assert_eq!(body, expected["body"], "{name}: body");
    }
}

#[test]
fn response_test_vectors() {
    let raw = include_str!("../../test-vectors/responses.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let response = HttpResponse {
            status: case["status"].as_u64().unwrap() as u16,
            headers: Vec::new(),
            body: case["body"].as_str().unwrap().to_string(),
        };
        let expected = &case["expected"];
        let result = parse_response::<Value>(response);

        if let Some(ok) = expected.get("ok") {
            assert_eq!(&result.unwrap(), ok, "{name}: value");
            continue;
        }

        let want = &expected["error"];
        let failure = match result {
            Err(ApiError::Http(failure)) => failure,
            other => panic!("{name}: expected Http failure, got {other:?}"),
        };
        assert_eq!(u64::from(failure.status), want["status"].as_u64().unwrap(), "{name}: status");
        if let Some(message) = want["message"].as_str() {
            assert_eq!(failure.message, message, "{name}: message");
        }
        if let Some(prefix) = want["message_prefix"].as_str() {
            assert!(failure.message.starts_with(prefix), "{name}: message {:?}", failure.message);
        }
        let body_kind = match failure.body {
            FailureBody::None => "none",
            FailureBody::Json(_) => "json",
            FailureBody::Unparsed(_) => "unparsed",
        };
        assert_eq!(body_kind, want["body"].as_str().unwrap(), "{name}: body kind");
    }
}

#[test]
fn wrong_shape_is_a_deserialization_error() {
    let response = HttpResponse {
        status: 200,
        headers: Vec::new(),
        body: r#"{"id":"not-a-number","title":"x","price":1.0}"#.to_string(),
    };
    let err = parse_response::<Product>(response).unwrap_err();
    assert!(matches!(err, ApiError::Deserialization(_)), "got {err:?}");
}
