//! Middlewares for routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::directory::DirectoryUser;
use crate::error::Result;
use crate::error::ResponseError;
use crate::options::AuthenticateOptions;
use crate::outcome::{Info, Outcome};
use crate::request::AuthRequest;
use crate::strategy::Strategy;

/// A strategy with the options used on the routes it protects.
#[derive(Clone)]
pub struct Authenticator {
    strategy: Arc<dyn Strategy>,
    options: Arc<AuthenticateOptions>,
}

impl Authenticator {
    pub fn new(strategy: impl Strategy + 'static) -> Self {
        Self {
            strategy: Arc::new(strategy),
            options: Arc::new(AuthenticateOptions::default()),
        }
    }

    /// Set flash message overrides.
    pub fn options(mut self, options: AuthenticateOptions) -> Self {
        self.options = Arc::new(options);
        self
    }
}

/// Result of a successful authentication, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticated {
    pub strategy: String,
    pub user: DirectoryUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Info>,
}

/// Middleware running the strategy before the route.
///
/// Failures answer with the status chosen by the strategy. Errors go
/// through [`crate::StrategyError`] and answer 500.
pub async fn authenticate(
    State(auth): State<Authenticator>,
    req: Request,
    next: Next,
) -> Result<Response> {
    let (auth_req, mut req) = AuthRequest::from_request(req).await?;

    match auth.strategy.authenticate(&auth_req, &auth.options).await {
        Outcome::Success { user, info } => {
            req.extensions_mut().insert(Authenticated {
                strategy: auth.strategy.name().to_owned(),
                user,
                info,
            });
            Ok(next.run(req).await)
        },
        Outcome::Failure { info, status } => {
            Ok(failure(status, &info, req.uri().path()))
        },
        Outcome::Error(err) => Err(err),
    }
}

fn failure(status: StatusCode, info: &Info, instance: &str) -> Response {
    ResponseError::default()
        .title("Authentication failed.")
        .details(info.message.as_deref().unwrap_or_default())
        .status(status)
        .instance(instance)
        .into_response()
        .unwrap_or_else(|_| status.into_response())
}
