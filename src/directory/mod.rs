//! Directory collaborator contract.
//!
//! The strategy never speaks LDAP itself. It asks a [`DirectoryConnector`]
//! for one [`DirectoryClient`] per authentication attempt, calls
//! [`DirectoryClient::authenticate`] once and always closes the client
//! afterwards.

mod ldap;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::ServerOptions;

pub use ldap::{LdapClient, LdapConnector};

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// LDAP result code `invalidCredentials`.
pub const INVALID_CREDENTIALS: u32 = 49;
/// LDAP result code `noSuchObject`.
pub const NO_SUCH_OBJECT: u32 = 32;
/// LDAP result code `constraintViolation`.
pub const CONSTRAINT_VIOLATION: u32 = 19;

/// Errors raised by a directory client.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("no such object: {0}")]
    NoSuchObject(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("no such user: {0:?}")]
    NoSuchUser(String),

    #[error("unexpected number of matches ({count}) for {username:?}")]
    AmbiguousUser { username: String, count: usize },

    #[error("no password given")]
    MissingPassword,

    #[error("service account bind failed with code {code}: {message}")]
    ServiceBind { code: u32, message: String },

    #[error("directory returned code {code}: {message}")]
    Rejected { code: u32, message: String },

    #[error("invalid server options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Ldap(#[from] ldap3::LdapError),
}

impl DirectoryError {
    /// Map a non-zero LDAP result code to an error.
    pub fn from_result(code: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            INVALID_CREDENTIALS => Self::InvalidCredentials(message),
            NO_SUCH_OBJECT => Self::NoSuchObject(message),
            CONSTRAINT_VIOLATION => Self::ConstraintViolation(message),
            code => Self::Rejected { code, message },
        }
    }
}

/// Attribute values as returned by the directory.
///
/// Single-valued attributes serialize as a string, multi-valued ones as an
/// array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Single(String),
    Multiple(Vec<String>),
}

impl AttributeValue {
    /// First value of the attribute.
    pub fn first(&self) -> Option<&str> {
        match self {
            AttributeValue::Single(value) => Some(value),
            AttributeValue::Multiple(values) => {
                values.first().map(String::as_str)
            },
        }
    }

    /// Every value of the attribute.
    pub fn values(&self) -> &[String] {
        match self {
            AttributeValue::Single(value) => std::slice::from_ref(value),
            AttributeValue::Multiple(values) => values,
        }
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            AttributeValue::Single(values.remove(0))
        } else {
            AttributeValue::Multiple(values)
        }
    }
}

/// A directory entry: its DN and its attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub dn: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl DirectoryEntry {
    /// Create an entry without attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute<V>(
        mut self,
        name: impl Into<String>,
        values: V,
    ) -> Self
    where
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        self.attributes.insert(name.into(), values.into());
        self
    }

    /// First value of an attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttributeValue::first)
    }
}

/// User record returned after a successful directory authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    #[serde(flatten)]
    pub entry: DirectoryEntry,
    /// Groups found by the optional group search.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<DirectoryEntry>,
}

impl DirectoryUser {
    /// Distinguished name of the user.
    pub fn dn(&self) -> &str {
        &self.entry.dn
    }

    /// First value of an attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.entry.attribute(name)
    }
}

impl From<DirectoryEntry> for DirectoryUser {
    fn from(entry: DirectoryEntry) -> Self {
        Self {
            entry,
            groups: Vec::new(),
        }
    }
}

/// One connection to a directory, valid for a single attempt.
#[async_trait]
pub trait DirectoryClient: Send {
    /// Search the user and bind with its DN and `password`.
    ///
    /// `Ok(None)` means the directory accepted the call without returning
    /// a user record.
    async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<Option<DirectoryUser>>;

    /// Release every connection opened by this client.
    async fn close(&mut self) -> Result<()>;
}

/// Factory opening a [`DirectoryClient`] from connection options.
pub trait DirectoryConnector: Send + Sync {
    fn open(&self, options: &ServerOptions) -> Result<Box<dyn DirectoryClient>>;
}
