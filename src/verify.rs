//! Verify callback run after a successful directory authentication.
//!
//! The directory proves the credentials; the callback may still refuse a
//! valid user or replace the record handed to the application.

use std::future::Future;

use async_trait::async_trait;

use crate::directory::DirectoryUser;
use crate::error::BoxError;
use crate::options::AuthenticateOptions;
use crate::outcome::Info;
use crate::request::AuthRequest;

pub type VerifyResult = Result<Verdict, BoxError>;

/// What the callback may see besides the user.
///
/// `request` is set with `pass_req_to_callback`, `options` with
/// `pass_auth_options_to_callback`.
#[derive(Debug, Clone, Default)]
pub struct VerifyContext {
    pub request: Option<AuthRequest>,
    pub options: Option<AuthenticateOptions>,
}

/// Decision of a verify callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept {
        user: DirectoryUser,
        info: Option<Info>,
    },
    Reject(Option<Info>),
}

impl Verdict {
    pub fn accept(user: DirectoryUser) -> Self {
        Self::Accept { user, info: None }
    }

    pub fn reject(message: impl Into<String>) -> Self {
        Self::Reject(Some(Info::message(message)))
    }
}

#[async_trait]
pub trait Verify: Send + Sync {
    async fn verify(
        &self,
        ctx: VerifyContext,
        user: DirectoryUser,
    ) -> VerifyResult;
}

/// [`Verify`] implementation for async closures.
pub struct VerifyFn<F>(F);

/// Create a [`Verify`] from a closure.
pub fn verify_fn<F, Fut>(f: F) -> VerifyFn<F>
where
    F: Fn(VerifyContext, DirectoryUser) -> Fut + Send + Sync,
    Fut: Future<Output = VerifyResult> + Send + 'static,
{
    VerifyFn(f)
}

#[async_trait]
impl<F, Fut> Verify for VerifyFn<F>
where
    F: Fn(VerifyContext, DirectoryUser) -> Fut + Send + Sync,
    Fut: Future<Output = VerifyResult> + Send + 'static,
{
    async fn verify(
        &self,
        ctx: VerifyContext,
        user: DirectoryUser,
    ) -> VerifyResult {
        (self.0)(ctx, user).await
    }
}
