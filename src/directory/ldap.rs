//! LDAP support.

use std::time::Duration;

use async_trait::async_trait;
use ldap3::{
    Ldap, LdapConnAsync, LdapConnSettings, SearchEntry, SearchResult,
    ldap_escape,
};

use super::{
    DirectoryClient, DirectoryConnector, DirectoryEntry, DirectoryError,
    DirectoryUser, Result,
};
use crate::options::{GroupFilter, ServerOptions};

const USERNAME_PLACEHOLDER: &str = "{{username}}";
const DN_PLACEHOLDER: &str = "{{dn}}";

/// Opens [`LdapClient`] instances backed by `ldap3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapConnector;

impl DirectoryConnector for LdapConnector {
    fn open(
        &self,
        options: &ServerOptions,
    ) -> Result<Box<dyn DirectoryClient>> {
        options.validate()?;
        Ok(Box::new(LdapClient::new(options.clone())))
    }
}

/// Search-then-bind client.
///
/// Connections are opened lazily by [`DirectoryClient::authenticate`] and
/// kept until [`DirectoryClient::close`] unbinds them.
pub struct LdapClient {
    options: ServerOptions,
    connections: Vec<Ldap>,
}

impl LdapClient {
    /// Create a new [`LdapClient`].
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options,
            connections: Vec::new(),
        }
    }

    async fn connect(&mut self) -> Result<Ldap> {
        let mut settings = LdapConnSettings::new()
            .set_starttls(self.options.starttls)
            .set_no_tls_verify(self.options.tls_skip_verify);
        if let Some(secs) = self.options.connect_timeout {
            settings = settings.set_conn_timeout(Duration::from_secs(secs));
        }

        tracing::debug!(url = %self.options.url, "connecting to ldap server");

        let (conn, ldap) =
            LdapConnAsync::with_settings(settings, &self.options.url).await?;
        ldap3::drive!(conn);

        self.connections.push(ldap.clone());
        Ok(ldap)
    }

    fn timeout(&self, ldap: &mut Ldap) {
        if let Some(secs) = self.options.timeout {
            ldap.with_timeout(Duration::from_secs(secs));
        }
    }

    /// Bind with the service account, if any.
    async fn bind_service_account(&self, ldap: &mut Ldap) -> Result<()> {
        let Some(dn) = &self.options.bind_dn else {
            return Ok(());
        };
        let password = self.options.bind_credentials.as_deref().unwrap_or("");

        self.timeout(ldap);
        let result = ldap.simple_bind(dn, password).await?;
        if result.rc != 0 {
            return Err(DirectoryError::ServiceBind {
                code: result.rc,
                message: result.text,
            });
        }
        Ok(())
    }

    async fn find_user(
        &self,
        ldap: &mut Ldap,
        username: &str,
    ) -> Result<SearchEntry> {
        let filter = self
            .options
            .search_filter
            .replace(USERNAME_PLACEHOLDER, &ldap_escape(username));

        tracing::debug!(%filter, "searching user");

        self.timeout(ldap);
        let SearchResult(mut entries, result) = ldap
            .search(
                &self.options.search_base,
                self.options.search_scope.into(),
                &filter,
                &self.options.search_attributes,
            )
            .await?;
        if result.rc != 0 {
            return Err(DirectoryError::from_result(result.rc, result.text));
        }

        match entries.len() {
            0 => Err(DirectoryError::NoSuchUser(username.to_owned())),
            1 => Ok(SearchEntry::construct(entries.remove(0))),
            count => Err(DirectoryError::AmbiguousUser {
                username: username.to_owned(),
                count,
            }),
        }
    }

    async fn find_groups(
        &self,
        ldap: &mut Ldap,
        user: &DirectoryEntry,
        username: &str,
    ) -> Result<Vec<DirectoryEntry>> {
        let (Some(base), Some(filter)) = (
            &self.options.group_search_base,
            &self.options.group_search_filter,
        ) else {
            return Ok(Vec::new());
        };

        let filter = group_filter(filter, user, username);

        tracing::debug!(%filter, "searching groups");

        self.timeout(ldap);
        let SearchResult(entries, result) = ldap
            .search(
                base,
                self.options.group_search_scope.into(),
                &filter,
                &self.options.group_search_attributes,
            )
            .await?;
        if result.rc != 0 {
            return Err(DirectoryError::from_result(result.rc, result.text));
        }

        let groups: Vec<DirectoryEntry> = entries
            .into_iter()
            .map(|entry| SearchEntry::construct(entry).into())
            .collect();

        tracing::debug!(count = groups.len(), "found groups for user");
        Ok(groups)
    }
}

/// Group search filter for a bound user.
fn group_filter(
    filter: &GroupFilter,
    user: &DirectoryEntry,
    username: &str,
) -> String {
    match filter {
        GroupFilter::Template(template) => template
            .replace(DN_PLACEHOLDER, &ldap_escape(&user.dn))
            .replace(USERNAME_PLACEHOLDER, &ldap_escape(username)),
        GroupFilter::Custom(build) => build(user),
    }
}

#[async_trait]
impl DirectoryClient for LdapClient {
    async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<Option<DirectoryUser>> {
        // An empty password turns a simple bind into an unauthenticated one.
        if password.is_empty() {
            return Err(DirectoryError::MissingPassword);
        }

        let mut admin = self.connect().await?;
        self.bind_service_account(&mut admin).await?;

        let entry = self.find_user(&mut admin, username).await?;

        let mut user_conn = self.connect().await?;
        self.timeout(&mut user_conn);
        let result = user_conn.simple_bind(&entry.dn, password).await?;
        if result.rc != 0 {
            return Err(DirectoryError::from_result(result.rc, result.text));
        }

        let entry = DirectoryEntry::from(entry);
        let groups = self.find_groups(&mut admin, &entry, username).await?;

        Ok(Some(DirectoryUser { entry, groups }))
    }

    async fn close(&mut self) -> Result<()> {
        let mut outcome = Ok(());
        for mut ldap in self.connections.drain(..) {
            if let Err(err) = ldap.unbind().await {
                outcome = Err(err.into());
            }
        }
        outcome
    }
}

impl From<SearchEntry> for DirectoryEntry {
    fn from(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attributes: entry
                .attrs
                .into_iter()
                .map(|(name, values)| (name, values.into()))
                .collect(),
        }
    }
}
