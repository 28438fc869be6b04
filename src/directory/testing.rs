//! In-memory directory used by tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{
    DirectoryClient, DirectoryConnector, DirectoryEntry, DirectoryError,
    DirectoryUser, Result,
};
use crate::options::ServerOptions;

pub const AD_ACCOUNT_DISABLED: &str = concat!(
    "80090308: LdapErr: DSID-0C09030B, ",
    "comment: AcceptSecurityContext error, data 533, v893"
);

/// Counts opened and closed clients.
#[derive(Debug, Default)]
pub struct Calls {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl Calls {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Directory recognizing `valid`/`valid`, plus a few special accounts:
///
/// - `ms-ad`: Active Directory "account disabled" bind error.
/// - `locked`: constraint violation.
/// - `ghost`: the directory accepts the bind without returning a user.
/// - `broken`: the server answers with an unexpected result code.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    users: HashMap<String, (String, DirectoryUser)>,
    pub calls: Arc<Calls>,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        let mut users = HashMap::new();
        users.insert(
            "valid".to_owned(),
            (
                "valid".to_owned(),
                DirectoryUser::from(
                    DirectoryEntry::new("uid=valid,ou=people,dc=example,dc=org")
                        .with_attribute("uid", ["valid"])
                        .with_attribute("cn", ["Valid User"])
                        .with_attribute("mail", ["valid@example.com"]),
                ),
            ),
        );

        Self {
            users,
            calls: Arc::new(Calls::default()),
        }
    }
}

impl DirectoryConnector for MemoryDirectory {
    fn open(
        &self,
        options: &ServerOptions,
    ) -> Result<Box<dyn DirectoryClient>> {
        options.validate()?;
        self.calls.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryClient {
            directory: self.clone(),
        }))
    }
}

struct MemoryClient {
    directory: MemoryDirectory,
}

#[async_trait]
impl DirectoryClient for MemoryClient {
    async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<Option<DirectoryUser>> {
        match username {
            "ms-ad" => {
                return Err(DirectoryError::InvalidCredentials(
                    AD_ACCOUNT_DISABLED.into(),
                ));
            },
            "locked" => {
                return Err(DirectoryError::ConstraintViolation(
                    "too many attempts".into(),
                ));
            },
            "ghost" => return Ok(None),
            "broken" => {
                return Err(DirectoryError::Rejected {
                    code: 52,
                    message: "server unavailable".into(),
                });
            },
            _ => {},
        }

        match self.directory.users.get(username) {
            Some((expected, user)) if expected == password => {
                Ok(Some(user.clone()))
            },
            Some(_) => Err(DirectoryError::InvalidCredentials(String::new())),
            None => Err(DirectoryError::NoSuchUser(username.to_owned())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.directory.calls.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Server options accepted by [`MemoryDirectory`].
pub fn server_options() -> ServerOptions {
    ServerOptions {
        url: "ldap://localhost:1389".into(),
        bind_dn: Some("cn=root".into()),
        bind_credentials: Some("secret".into()),
        search_base: "ou=people,dc=example,dc=org".into(),
        ..Default::default()
    }
}
