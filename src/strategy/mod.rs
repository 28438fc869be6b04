//! LDAP authentication strategy.
//!
//! [`LdapStrategy`] resolves its options, extracts credentials, delegates
//! the bind to a directory client and reports one [`Outcome`].
//!
//! ```no_run
//! use ldapauth::{
//!     BoxError, LdapStrategy, ServerOptions, StrategyOptions, Verdict,
//!     verify_fn,
//! };
//!
//! let strategy = LdapStrategy::new(StrategyOptions::new(ServerOptions {
//!     url: "ldap://localhost:389".into(),
//!     bind_dn: Some("cn=root".into()),
//!     bind_credentials: Some("secret".into()),
//!     search_base: "ou=people,dc=example,dc=org".into(),
//!     search_filter: "(uid={{username}})".into(),
//!     ..Default::default()
//! }))
//! .verify(verify_fn(|_ctx, user| async move {
//!     Ok::<_, BoxError>(Verdict::accept(user))
//! }));
//! ```

mod delegate;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::credentials;
use crate::directory::{DirectoryConnector, LdapConnector};
use crate::error::{BoxError, StrategyError};
use crate::options::{
    AuthenticateOptions, CALLBACK_FLAGS_CONFLICT, StrategyOptions,
};
use crate::outcome::{Info, Outcome};
use crate::request::AuthRequest;
use crate::verify::Verify;

/// Name under which the strategy registers.
pub const STRATEGY_NAME: &str = "ldapauth";
const MISSING_CREDENTIALS: &str = "Missing credentials";

/// Contract between a strategy and its host.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    async fn authenticate(
        &self,
        req: &AuthRequest,
        options: &AuthenticateOptions,
    ) -> Outcome;
}

/// Produces options for every attempt.
#[async_trait]
pub trait ResolveOptions: Send + Sync {
    async fn resolve(
        &self,
        req: &AuthRequest,
    ) -> Result<StrategyOptions, BoxError>;
}

/// [`ResolveOptions`] implementation for async closures.
pub struct ResolverFn<F>(F);

#[async_trait]
impl<F, Fut> ResolveOptions for ResolverFn<F>
where
    F: Fn(AuthRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StrategyOptions, BoxError>> + Send + 'static,
{
    async fn resolve(
        &self,
        req: &AuthRequest,
    ) -> Result<StrategyOptions, BoxError> {
        (self.0)(req.clone()).await
    }
}

/// Fixed options, or a resolver run once per attempt.
#[derive(Clone)]
pub enum OptionsSource {
    Fixed(Arc<StrategyOptions>),
    Dynamic(Arc<dyn ResolveOptions>),
}

impl OptionsSource {
    /// Resolve options from the request.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(AuthRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StrategyOptions, BoxError>>
            + Send
            + 'static,
    {
        Self::Dynamic(Arc::new(ResolverFn(f)))
    }

    /// Resolve options without looking at the request.
    pub fn from_fn_without_request<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StrategyOptions, BoxError>>
            + Send
            + 'static,
    {
        Self::from_fn(move |_req: AuthRequest| f())
    }

    async fn resolve(
        &self,
        req: &AuthRequest,
    ) -> Result<Arc<StrategyOptions>, StrategyError> {
        match self {
            OptionsSource::Fixed(options) => Ok(Arc::clone(options)),
            OptionsSource::Dynamic(resolver) => {
                let options = resolver
                    .resolve(req)
                    .await
                    .map_err(StrategyError::Options)?;
                Ok(Arc::new(options.with_defaults()))
            },
        }
    }
}

impl From<StrategyOptions> for OptionsSource {
    fn from(options: StrategyOptions) -> Self {
        Self::Fixed(Arc::new(options.with_defaults()))
    }
}

/// LDAP authentication strategy.
#[derive(Clone)]
pub struct LdapStrategy {
    source: OptionsSource,
    verify: Option<Arc<dyn Verify>>,
    connector: Arc<dyn DirectoryConnector>,
}

impl LdapStrategy {
    /// Create a new [`LdapStrategy`] backed by `ldap3`.
    pub fn new(source: impl Into<OptionsSource>) -> Self {
        let source = source.into();

        if let OptionsSource::Fixed(options) = &source {
            if options.has_callback_conflict() {
                tracing::warn!(
                    "{CALLBACK_FLAGS_CONFLICT}, every attempt will fail"
                );
            }
        }

        Self {
            source,
            verify: None,
            connector: Arc::new(LdapConnector),
        }
    }

    /// Set the verify callback.
    pub fn verify(mut self, verify: impl Verify + 'static) -> Self {
        self.verify = Some(Arc::new(verify));
        self
    }

    /// Replace the directory connector.
    pub fn connector(
        mut self,
        connector: impl DirectoryConnector + 'static,
    ) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    async fn attempt(
        &self,
        req: &AuthRequest,
        auth_options: &AuthenticateOptions,
    ) -> Outcome {
        let options = match self.source.resolve(req).await {
            Ok(options) => options,
            Err(err) => return Outcome::error(err),
        };

        let Some(credentials) = credentials::extract(&options, req) else {
            tracing::debug!("missing credentials");
            let message = auth_options
                .bad_request_message
                .clone()
                .unwrap_or_else(|| MISSING_CREDENTIALS.to_owned());
            return Outcome::fail(
                Info::message(message),
                options.missing_status(),
            );
        };

        delegate::authenticate(
            self.connector.as_ref(),
            self.verify.as_deref(),
            &options,
            &credentials,
            req,
            auth_options,
        )
        .await
    }
}

#[async_trait]
impl Strategy for LdapStrategy {
    fn name(&self) -> &str {
        STRATEGY_NAME
    }

    async fn authenticate(
        &self,
        req: &AuthRequest,
        options: &AuthenticateOptions,
    ) -> Outcome {
        let outcome = self.attempt(req, options).await;

        metrics::counter!(
            "ldapauth_attempts_total",
            "outcome" => outcome.kind()
        )
        .increment(1);

        match &outcome {
            Outcome::Success { user, .. } => {
                tracing::info!(dn = user.dn(), "user authenticated")
            },
            Outcome::Failure { info, status } => tracing::warn!(
                status = status.as_u16(),
                message = info.message.as_deref().unwrap_or_default(),
                "authentication failed"
            ),
            Outcome::Error(err) => {
                tracing::error!(error = %err, "authentication error")
            },
        }

        outcome
    }
}
