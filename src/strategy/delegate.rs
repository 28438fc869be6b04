//! Directory round trip of one attempt.

use axum::http::StatusCode;

use crate::classify::{self, Classification};
use crate::credentials::Credentials;
use crate::directory::{DirectoryConnector, DirectoryError};
use crate::error::StrategyError;
use crate::options::{
    AuthenticateOptions, CALLBACK_FLAGS_CONFLICT, StrategyOptions,
};
use crate::outcome::{Info, Outcome};
use crate::request::AuthRequest;
use crate::verify::{Verdict, Verify, VerifyContext};

const USER_NOT_FOUND: &str = "Invalid username/password";

/// Authenticate `credentials` against the directory and run `verify`.
pub(super) async fn authenticate(
    connector: &dyn DirectoryConnector,
    verify: Option<&dyn Verify>,
    options: &StrategyOptions,
    credentials: &Credentials,
    req: &AuthRequest,
    auth_options: &AuthenticateOptions,
) -> Outcome {
    if verify.is_some() && options.has_callback_conflict() {
        return Outcome::fail(
            Info::message(CALLBACK_FLAGS_CONFLICT),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
    }

    let mut client = match connector.open(&options.server) {
        Ok(client) => client,
        Err(err) => return directory_error(err, options, auth_options),
    };

    tracing::debug!(username = %credentials.username, "binding user");

    let result = client
        .authenticate(&credentials.username, &credentials.password)
        .await;

    if let Err(err) = client.close().await {
        tracing::debug!(error = %err, "cannot close directory client");
    }

    let user = match result {
        Ok(Some(user)) => user,
        Ok(None) => {
            let message = auth_options
                .user_not_found
                .clone()
                .unwrap_or_else(|| USER_NOT_FOUND.to_owned());
            return Outcome::fail(
                Info::message(message),
                StatusCode::UNAUTHORIZED,
            );
        },
        Err(err) => return directory_error(err, options, auth_options),
    };

    let user = match &options.profile_mapper {
        Some(mapper) => mapper(user),
        None => user,
    };

    let Some(verify) = verify else {
        return Outcome::success(user, None);
    };

    let ctx = VerifyContext {
        request: options.pass_req_to_callback.then(|| req.clone()),
        options: options
            .pass_auth_options_to_callback
            .then(|| auth_options.clone()),
    };

    match verify.verify(ctx, user).await {
        Ok(Verdict::Accept { user, info }) => Outcome::success(user, info),
        Ok(Verdict::Reject(info)) => {
            Outcome::fail(info.unwrap_or_default(), StatusCode::UNAUTHORIZED)
        },
        Err(err) => Outcome::error(StrategyError::Verify(err)),
    }
}

fn directory_error(
    err: DirectoryError,
    options: &StrategyOptions,
    auth_options: &AuthenticateOptions,
) -> Outcome {
    match classify::classify(&err, auth_options) {
        Classification::Failure { message, status } => {
            Outcome::fail(Info::message(message), status)
        },
        Classification::Error if options.handle_errors_as_failures => {
            if let Some(callback) = &options.failure_error_callback {
                callback(&err);
            }
            Outcome::fail(
                Info::message(err.to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        },
        Classification::Error => Outcome::error(err),
    }
}
