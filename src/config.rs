//! Configuration manager for the demo server.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;
use crate::options::{AuthenticateOptions, StrategyOptions};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_ADDRESS: &str = "0.0.0.0:8888";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Socket address the server listens on.
    #[serde(skip_serializing)]
    pub address: String,
    favicon: Option<String>,
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Strategy options, directory connection included.
    #[serde(skip_serializing)]
    pub ldap: StrategyOptions,
    /// Flash message overrides of `POST /login`.
    #[serde(skip_serializing)]
    pub authenticate: AuthenticateOptions,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_CRATE_NAME").to_owned(),
            address: DEFAULT_ADDRESS.to_owned(),
            favicon: None,
            version: VERSION.to_owned(),
            path: PathBuf::new(),
            ldap: StrategyOptions::default(),
            authenticate: AuthenticateOptions::default(),
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };

                config.version = VERSION.to_owned();
                config.path = file_path.clone();
                config.ldap = config.ldap.with_defaults();
                config.favicon = config
                    .favicon
                    .map(|f| self.normalize_url(&f))
                    .transpose()?;

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "cannot read configuration file");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::credentials::CredentialsLookup;

    fn write_config(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_config() {
        let path = write_config(
            "ldapauth-test-read.yaml",
            r#"
name: Directory
address: 127.0.0.1:3000
favicon: example.com/favicon.ico
ldap:
  server:
    url: ldap://localhost:1389
    bind_dn: cn=root
    bind_credentials: secret
    search_base: ou=people,dc=example,dc=org
  username_field: ldapuname
  credentials_lookup: basic_auth
authenticate:
  invalid_credentials: Wrong login
"#,
        );

        let config = Configuration::default().path(path).read().unwrap();
        assert_eq!(config.name, "Directory");
        assert_eq!(config.address, "127.0.0.1:3000");
        assert_eq!(
            config.favicon.as_deref(),
            Some("https://example.com/favicon.ico")
        );
        assert_eq!(config.version, VERSION);
        assert_eq!(config.ldap.username_field, "ldapuname");
        assert_eq!(config.ldap.password_field, "password");
        assert!(matches!(
            config.ldap.credentials_lookup,
            CredentialsLookup::BasicAuth
        ));
        assert!(config.ldap.server.validate().is_ok());
        assert_eq!(
            config.authenticate.invalid_credentials.as_deref(),
            Some("Wrong login")
        );
    }

    #[test]
    fn test_invalid_config_falls_back_to_default() {
        let path = write_config("ldapauth-test-invalid.yaml", "ldap: [1, 2");

        let config = Configuration::default().path(path).read().unwrap();
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.version, VERSION);
    }

    #[test]
    fn test_serialized_config_hides_directory() {
        let config = Configuration::default();
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("ldap").is_none());
        assert!(json.get("address").is_none());
        assert_eq!(json["version"], VERSION);
    }
}
