//! Request snapshot handed to strategies.

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, Method, Uri, header};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde_json::{Map, Value};

use crate::error::{Result, StrategyError};

const BODY_LIMIT: usize = 30_000;
const BASIC_PREFIX: &str = "Basic ";

/// Parts of an incoming request a strategy may read.
///
/// `body` and `query` are `Value::Null` when absent. Form encoded keys
/// using bracket notation (`user[name]=x`) are nested.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Value,
    pub query: Value,
}

impl AuthRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the parsed body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Set the parsed query string.
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    /// Add a header. Invalid values are ignored.
    pub fn with_header(
        mut self,
        name: header::HeaderName,
        value: &str,
    ) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Read an axum [`Request`] and give it back with its body restored.
    pub async fn from_request(req: Request) -> Result<(Self, Request)> {
        let (parts, body) = req.into_parts();
        let bytes = axum::body::to_bytes(body, BODY_LIMIT)
            .await
            .map_err(|err| StrategyError::ParsingForm(Box::new(err)))?;

        let query = match parts.uri.query() {
            Some(query) => parse_form(query.as_bytes())?,
            None => Value::Null,
        };
        let body = parse_body(&parts.headers, &bytes)?;

        let auth_req = Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            body,
            query,
        };

        Ok((auth_req, Request::from_parts(parts, Body::from(bytes))))
    }

    /// Username and password of a `Basic` authorization header.
    pub fn basic_auth(&self) -> Option<(String, String)> {
        let authorization =
            self.headers.get(header::AUTHORIZATION)?.to_str().ok()?;

        let value = authorization.strip_prefix(BASIC_PREFIX)?;
        let value = BASE64_STANDARD.decode(value.trim()).ok()?;
        let value = String::from_utf8(value).ok()?;

        let (username, password) = value.split_once(':')?;
        Some((username.to_owned(), password.to_owned()))
    }
}

fn parse_body(headers: &HeaderMap, bytes: &Bytes) -> Result<Value> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        parse_form(bytes)
    } else if content_type.starts_with("application/json")
        || content_type.ends_with("+json")
    {
        serde_json::from_slice(bytes)
            .map_err(|err| StrategyError::ParsingForm(Box::new(err)))
    } else {
        Ok(Value::Null)
    }
}

fn parse_form(input: &[u8]) -> Result<Value> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(input)
        .map_err(|err| StrategyError::ParsingForm(Box::new(err)))?;

    let mut root = Map::new();
    for (key, value) in pairs {
        insert_nested(&mut root, &key, value);
    }
    Ok(Value::Object(root))
}

/// Insert `a[b][c]=value` as `{"a": {"b": {"c": value}}}`.
///
/// The first occurrence of a key wins.
fn insert_nested(root: &mut Map<String, Value>, key: &str, value: String) {
    let mut segments = key
        .split('[')
        .map(|segment| segment.trim_end_matches(']'))
        .peekable();

    let mut current = root;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current
                .entry(segment.to_owned())
                .or_insert(Value::String(value));
            return;
        }

        let next = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        match next {
            Value::Object(map) => current = map,
            _ => return,
        }
    }
}
