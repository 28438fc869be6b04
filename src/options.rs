//! Strategy and directory options.

use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::credentials::{
    CredentialsLookup, DEFAULT_PASSWORD_FIELD, DEFAULT_USERNAME_FIELD,
};
use crate::directory::{DirectoryEntry, DirectoryError, DirectoryUser};

const DEFAULT_SEARCH_FILTER: &str = "(uid={{username}})";
const USERNAME_PLACEHOLDER: &str = "{{username}}";
const DEFAULT_MISSING_CREDENTIALS_STATUS: u16 = 400;

/// Message reported when both callback flags are enabled.
pub const CALLBACK_FLAGS_CONFLICT: &str = concat!(
    "pass_req_to_callback and pass_auth_options_to_callback ",
    "are mutually exclusive"
);

/// Notified with the raw error when errors are handled as failures.
pub type FailureErrorCallback = Arc<dyn Fn(&DirectoryError) + Send + Sync>;

/// Reshapes the directory user before verification.
pub type ProfileMapper =
    Arc<dyn Fn(DirectoryUser) -> DirectoryUser + Send + Sync>;

/// Builds the group search filter from the user entry.
pub type GroupFilterFn = Arc<dyn Fn(&DirectoryEntry) -> String + Send + Sync>;

/// Scope of a directory search.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    Base,
    One,
    #[default]
    Sub,
}

impl From<SearchScope> for ldap3::Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => ldap3::Scope::Base,
            SearchScope::One => ldap3::Scope::OneLevel,
            SearchScope::Sub => ldap3::Scope::Subtree,
        }
    }
}

/// Filter of the group search.
#[derive(Clone, Deserialize)]
#[serde(from = "String")]
pub enum GroupFilter {
    /// Template where `{{dn}}` and `{{username}}` are replaced by the
    /// escaped user DN and username.
    Template(String),
    /// Function of the user entry. Its result is used as is.
    Custom(GroupFilterFn),
}

impl GroupFilter {
    /// Wrap a filter function.
    pub fn custom<F>(build: F) -> Self
    where
        F: Fn(&DirectoryEntry) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(build))
    }
}

impl From<String> for GroupFilter {
    fn from(template: String) -> Self {
        Self::Template(template)
    }
}

impl From<&str> for GroupFilter {
    fn from(template: &str) -> Self {
        Self::Template(template.to_owned())
    }
}

impl fmt::Debug for GroupFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupFilter::Template(template) => {
                f.debug_tuple("Template").field(template).finish()
            },
            GroupFilter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Directory connection options.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// `ldap://`, `ldaps://` or `ldapi://` URL of the server.
    pub url: String,
    /// Service account DN used for the user search.
    pub bind_dn: Option<String>,
    /// Service account password.
    pub bind_credentials: Option<String>,
    /// Base DN of the user search.
    pub search_base: String,
    /// User filter, `{{username}}` is replaced by the escaped username.
    pub search_filter: String,
    pub search_scope: SearchScope,
    /// Attributes to fetch. Empty means every user attribute.
    pub search_attributes: Vec<String>,
    /// Base DN of the group search. Groups are only fetched when both base
    /// and filter are set.
    pub group_search_base: Option<String>,
    /// Group filter, a template or a function of the user entry.
    pub group_search_filter: Option<GroupFilter>,
    pub group_search_scope: SearchScope,
    pub group_search_attributes: Vec<String>,
    /// Upgrade plain connections with STARTTLS.
    pub starttls: bool,
    /// Skip TLS certificate verification.
    pub tls_skip_verify: bool,
    /// Connection timeout, in seconds.
    pub connect_timeout: Option<u64>,
    /// Per operation timeout, in seconds.
    pub timeout: Option<u64>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            bind_dn: None,
            bind_credentials: None,
            search_base: String::new(),
            search_filter: DEFAULT_SEARCH_FILTER.to_owned(),
            search_scope: SearchScope::Sub,
            search_attributes: Vec::new(),
            group_search_base: None,
            group_search_filter: None,
            group_search_scope: SearchScope::Sub,
            group_search_attributes: Vec::new(),
            starttls: false,
            tls_skip_verify: false,
            connect_timeout: None,
            timeout: None,
        }
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_credentials",
                &self.bind_credentials.as_ref().map(|_| "********"),
            )
            .field("search_base", &self.search_base)
            .field("search_filter", &self.search_filter)
            .field("search_scope", &self.search_scope)
            .field("group_search_base", &self.group_search_base)
            .field("group_search_filter", &self.group_search_filter)
            .field("starttls", &self.starttls)
            .finish_non_exhaustive()
    }
}

impl ServerOptions {
    /// Check the options can be used to open a directory client.
    pub fn validate(&self) -> Result<(), DirectoryError> {
        if self.url.is_empty() {
            return Err(DirectoryError::InvalidOptions(
                "url is required".into(),
            ));
        }

        let url = Url::parse(&self.url)
            .map_err(|err| DirectoryError::InvalidOptions(err.to_string()))?;
        if !matches!(url.scheme(), "ldap" | "ldaps" | "ldapi") {
            return Err(DirectoryError::InvalidOptions(
                "url must start with ldap://, ldaps:// or ldapi://".into(),
            ));
        }

        if self.search_base.is_empty() {
            return Err(DirectoryError::InvalidOptions(
                "search_base is required".into(),
            ));
        }

        if !self.search_filter.contains(USERNAME_PLACEHOLDER) {
            return Err(DirectoryError::InvalidOptions(
                "search_filter must contain {{username}}".into(),
            ));
        }

        Ok(())
    }
}

/// Options of an [`crate::LdapStrategy`].
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct StrategyOptions {
    /// Directory connection options.
    pub server: ServerOptions,
    /// Field holding the username. Supports `a[b]` nesting.
    pub username_field: String,
    /// Field holding the password. Supports `a[b]` nesting.
    pub password_field: String,
    /// Hand the request to the verify callback.
    pub pass_req_to_callback: bool,
    /// Hand the authenticate options to the verify callback.
    pub pass_auth_options_to_callback: bool,
    /// Where credentials are read from.
    pub credentials_lookup: CredentialsLookup,
    /// Report directory errors as 500 failures instead of errors.
    pub handle_errors_as_failures: bool,
    /// Status reported when credentials are missing.
    pub missing_credentials_status: u16,
    #[serde(skip)]
    pub failure_error_callback: Option<FailureErrorCallback>,
    #[serde(skip)]
    pub profile_mapper: Option<ProfileMapper>,
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self {
            server: ServerOptions::default(),
            username_field: DEFAULT_USERNAME_FIELD.to_owned(),
            password_field: DEFAULT_PASSWORD_FIELD.to_owned(),
            pass_req_to_callback: false,
            pass_auth_options_to_callback: false,
            credentials_lookup: CredentialsLookup::default(),
            handle_errors_as_failures: false,
            missing_credentials_status: DEFAULT_MISSING_CREDENTIALS_STATUS,
            failure_error_callback: None,
            profile_mapper: None,
        }
    }
}

impl fmt::Debug for StrategyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyOptions")
            .field("server", &self.server)
            .field("username_field", &self.username_field)
            .field("password_field", &self.password_field)
            .field("pass_req_to_callback", &self.pass_req_to_callback)
            .field(
                "pass_auth_options_to_callback",
                &self.pass_auth_options_to_callback,
            )
            .field("credentials_lookup", &self.credentials_lookup)
            .field("handle_errors_as_failures", &self.handle_errors_as_failures)
            .field(
                "missing_credentials_status",
                &self.missing_credentials_status,
            )
            .field(
                "failure_error_callback",
                &self.failure_error_callback.is_some(),
            )
            .field("profile_mapper", &self.profile_mapper.is_some())
            .finish()
    }
}

impl StrategyOptions {
    /// Create options for a directory.
    pub fn new(server: ServerOptions) -> Self {
        Self {
            server,
            ..Default::default()
        }
    }

    /// Fill empty field names with `username` and `password`.
    pub fn with_defaults(mut self) -> Self {
        if self.username_field.is_empty() {
            self.username_field = DEFAULT_USERNAME_FIELD.to_owned();
        }
        if self.password_field.is_empty() {
            self.password_field = DEFAULT_PASSWORD_FIELD.to_owned();
        }
        self
    }

    /// Set username and password field names.
    pub fn fields(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username_field = username.into();
        self.password_field = password.into();
        self
    }

    /// Set the credentials lookup.
    pub fn credentials_lookup(mut self, lookup: CredentialsLookup) -> Self {
        self.credentials_lookup = lookup;
        self
    }

    /// Downgrade directory errors to 500 failures.
    pub fn handle_errors_as_failures(mut self) -> Self {
        self.handle_errors_as_failures = true;
        self
    }

    /// Notify `callback` of errors downgraded to failures.
    pub fn failure_error_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DirectoryError) + Send + Sync + 'static,
    {
        self.failure_error_callback = Some(Arc::new(callback));
        self
    }

    /// Reshape the directory user before verification.
    pub fn profile_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(DirectoryUser) -> DirectoryUser + Send + Sync + 'static,
    {
        self.profile_mapper = Some(Arc::new(mapper));
        self
    }

    /// Status reported when credentials are missing.
    pub fn missing_status(&self) -> StatusCode {
        StatusCode::from_u16(self.missing_credentials_status)
            .unwrap_or(StatusCode::BAD_REQUEST)
    }

    /// Whether the callback flags ask for two different verify signatures.
    pub fn has_callback_conflict(&self) -> bool {
        self.pass_req_to_callback && self.pass_auth_options_to_callback
    }
}

/// Per-call flash message overrides.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticateOptions {
    pub bad_request_message: Option<String>,
    pub invalid_credentials: Option<String>,
    pub user_not_found: Option<String>,
    pub constraint_violation: Option<String>,
    pub invalid_logon_hours: Option<String>,
    pub invalid_workstation: Option<String>,
    pub password_expired: Option<String>,
    pub account_disabled: Option<String>,
    pub account_expired: Option<String>,
    pub password_must_change: Option<String>,
    pub account_locked_out: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> ServerOptions {
        ServerOptions {
            url: "ldap://localhost:1389".into(),
            search_base: "ou=people,dc=example,dc=org".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_server_validation() {
        assert!(server().validate().is_ok());

        let mut options = server();
        options.url = "http://localhost".into();
        assert!(options.validate().is_err());

        let mut options = server();
        options.search_filter = "(uid=static)".into();
        assert!(options.validate().is_err());

        let mut options = server();
        options.search_base.clear();
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_strategy_options_from_yaml() {
        let options: StrategyOptions = serde_yaml::from_str(
            r#"
server:
  url: ldap://localhost:1389
  bind_dn: cn=root
  bind_credentials: secret
  search_base: ou=people,dc=example,dc=org
  group_search_scope: one
username_field: ldapuname
missing_credentials_status: 401
credentials_lookup: basic_auth
"#,
        )
        .unwrap();

        assert_eq!(options.username_field, "ldapuname");
        assert_eq!(options.password_field, DEFAULT_PASSWORD_FIELD);
        assert_eq!(options.server.search_filter, DEFAULT_SEARCH_FILTER);
        assert_eq!(options.server.group_search_scope, SearchScope::One);
        assert_eq!(options.missing_status(), StatusCode::UNAUTHORIZED);
        assert!(matches!(
            options.credentials_lookup,
            CredentialsLookup::BasicAuth
        ));
    }

    #[test]
    fn test_defaults_fill_empty_fields() {
        let options =
            StrategyOptions::new(server()).fields("", "").with_defaults();
        assert_eq!(options.username_field, DEFAULT_USERNAME_FIELD);
        assert_eq!(options.password_field, DEFAULT_PASSWORD_FIELD);
    }

    #[test]
    fn test_group_search_filter_from_yaml() {
        let options: ServerOptions = serde_yaml::from_str(
            r#"
url: ldap://localhost:1389
search_base: ou=people,dc=example,dc=org
group_search_base: ou=groups,dc=example,dc=org
group_search_filter: (member={{dn}})
"#,
        )
        .unwrap();

        assert!(matches!(
            options.group_search_filter,
            Some(GroupFilter::Template(ref f)) if f == "(member={{dn}})"
        ));
    }

    #[test]
    fn test_debug_hides_group_filter_function() {
        let mut options = server();
        options.group_search_filter =
            Some(GroupFilter::custom(|user| format!("(member={})", user.dn)));
        assert!(format!("{options:?}").contains("Custom(..)"));
    }

    #[test]
    fn test_debug_hides_bind_credentials() {
        let mut options = server();
        options.bind_credentials = Some("secret".into());
        assert!(!format!("{options:?}").contains("secret"));
    }

    #[test]
    fn test_invalid_status_falls_back_to_bad_request() {
        let options = StrategyOptions {
            missing_credentials_status: 42,
            ..Default::default()
        };
        assert_eq!(options.missing_status(), StatusCode::BAD_REQUEST);
    }
}
