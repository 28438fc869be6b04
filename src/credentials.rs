//! Credentials extraction.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::options::StrategyOptions;
use crate::request::AuthRequest;

pub const DEFAULT_USERNAME_FIELD: &str = "username";
pub const DEFAULT_PASSWORD_FIELD: &str = "password";

/// Custom credentials lookup function.
pub type LookupFn =
    Arc<dyn Fn(&AuthRequest) -> Option<LookupResult> + Send + Sync>;

/// Username and password of one attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Value returned by a custom lookup.
///
/// Accepts `user`/`pass` as aliases, the shape of basic-auth parsers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LookupResult {
    #[serde(alias = "user")]
    pub username: Option<String>,
    #[serde(alias = "pass")]
    pub password: Option<String>,
}

impl LookupResult {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }
}

/// Where credentials are read from.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsLookup {
    /// Body fields, then query string fields.
    #[default]
    Fields,
    /// `Authorization: Basic` header.
    BasicAuth,
    /// User-supplied function, replaces the default extraction.
    #[serde(skip)]
    Custom(LookupFn),
}

impl CredentialsLookup {
    /// Wrap a lookup function.
    pub fn custom<F>(lookup: F) -> Self
    where
        F: Fn(&AuthRequest) -> Option<LookupResult> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(lookup))
    }
}

impl fmt::Debug for CredentialsLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsLookup::Fields => f.write_str("Fields"),
            CredentialsLookup::BasicAuth => f.write_str("BasicAuth"),
            CredentialsLookup::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Extract credentials from `req`.
///
/// Returns `None` when the username or the password is missing or empty.
pub fn extract(
    options: &StrategyOptions,
    req: &AuthRequest,
) -> Option<Credentials> {
    let (username, password) = match &options.credentials_lookup {
        CredentialsLookup::Fields => (
            field(req, &options.username_field),
            field(req, &options.password_field),
        ),
        CredentialsLookup::BasicAuth => match req.basic_auth() {
            Some((username, password)) => (Some(username), Some(password)),
            None => (None, None),
        },
        CredentialsLookup::Custom(lookup) => {
            let result = lookup(req)?;
            (result.username, result.password)
        },
    };

    let username = username.filter(|u| !u.is_empty())?;
    let password = password.filter(|p| !p.is_empty())?;
    Some(Credentials { username, password })
}

/// Body takes precedence over the query string.
fn field(req: &AuthRequest, name: &str) -> Option<String> {
    lookup(&req.body, name)
        .filter(|value| !value.is_empty())
        .or_else(|| lookup(&req.query, name))
}

/// Read `name` from `value`; `a[b]` reads `value.a.b`.
///
/// The walk stops at the first scalar found along the chain.
pub fn lookup(value: &Value, name: &str) -> Option<String> {
    let chain = name.replace(']', "");
    let mut current = value;

    for key in chain.split('[') {
        let prop = match current {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };

        match prop {
            Value::Null => return None,
            Value::String(s) => return Some(s.clone()),
            Value::Number(n) => return Some(n.to_string()),
            Value::Bool(b) => return Some(b.to_string()),
            Value::Object(_) | Value::Array(_) => current = prop,
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use serde_json::json;

    fn request(body: Value, query: Value) -> AuthRequest {
        AuthRequest::new().with_body(body).with_query(query)
    }

    #[test]
    fn test_lookup_nested_fields() {
        let body = json!({"user": {"name": "valid", "pin": 1234}, "flat": "x"});
        assert_eq!(lookup(&body, "flat"), Some("x".into()));
        assert_eq!(lookup(&body, "user[name]"), Some("valid".into()));
        assert_eq!(lookup(&body, "user[pin]"), Some("1234".into()));
        assert_eq!(lookup(&body, "user"), None);
        assert_eq!(lookup(&body, "missing"), None);
        assert_eq!(lookup(&Value::Null, "flat"), None);
    }

    #[test]
    fn test_body_takes_precedence_over_query() {
        let options = StrategyOptions::default();
        let req = request(
            json!({"username": "body", "password": "body-pass"}),
            json!({"username": "query", "password": "query-pass"}),
        );

        let credentials = extract(&options, &req).unwrap();
        assert_eq!(credentials.username, "body");
        assert_eq!(credentials.password, "body-pass");
    }

    #[test]
    fn test_query_string_fallback() {
        let options = StrategyOptions::default();
        let req = request(
            Value::Null,
            json!({"username": "valid", "password": "valid"}),
        );

        assert_eq!(
            extract(&options, &req),
            Some(Credentials {
                username: "valid".into(),
                password: "valid".into()
            })
        );
    }

    #[test]
    fn test_missing_or_empty_credentials() {
        let options = StrategyOptions::default();
        assert_eq!(extract(&options, &AuthRequest::new()), None);
        let req = request(json!({"username": "valid"}), Value::Null);
        assert_eq!(extract(&options, &req), None);

        let req =
            request(json!({"username": "valid", "password": ""}), Value::Null);
        assert_eq!(extract(&options, &req), None);
    }

    #[test]
    fn test_custom_field_names() {
        let options = StrategyOptions::default().fields("ldapuname", "ldappwd");
        let req = request(
            json!({"ldapuname": "valid", "ldappwd": "valid"}),
            Value::Null,
        );
        assert!(extract(&options, &req).is_some());

        let req = request(
            json!({"username": "valid", "password": "valid"}),
            Value::Null,
        );
        assert!(extract(&options, &req).is_none());
    }

    #[test]
    fn test_basic_auth_lookup() {
        let options = StrategyOptions::default()
            .credentials_lookup(CredentialsLookup::BasicAuth);
        let req = AuthRequest::new()
            .with_header(header::AUTHORIZATION, "Basic dmFsaWQ6dmFsaWQ=")
            .with_body(json!({"username": "ignored", "password": "ignored"}));

        let credentials = extract(&options, &req).unwrap();
        assert_eq!(credentials.username, "valid");
        assert_eq!(credentials.password, "valid");
    }

    #[test]
    fn test_custom_lookup_replaces_default() {
        let options = StrategyOptions::default().credentials_lookup(
            CredentialsLookup::custom(|req| {
                serde_json::from_value(req.body["auth"].clone()).ok()
            }),
        );
        let req = request(
            json!({
                "auth": {"user": "valid", "pass": "valid"},
                "username": "x",
                "password": "y"
            }),
            Value::Null,
        );

        let credentials = extract(&options, &req).unwrap();
        assert_eq!(credentials.username, "valid");

        let req =
            request(json!({"username": "x", "password": "y"}), Value::Null);
        assert!(extract(&options, &req).is_none());
    }

    #[test]
    fn test_debug_hides_password() {
        let credentials = Credentials {
            username: "valid".into(),
            password: "secret".into(),
        };
        assert!(!format!("{credentials:?}").contains("secret"));
    }
}
