//! Terminal signals of an authentication attempt.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::directory::DirectoryUser;
use crate::error::StrategyError;

/// Extra information attached to a success or a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub message: Option<String>,
}

impl Info {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

/// Exactly one outcome is reported per attempt.
#[derive(Debug)]
pub enum Outcome {
    Success {
        user: DirectoryUser,
        info: Option<Info>,
    },
    Failure {
        info: Info,
        status: StatusCode,
    },
    Error(StrategyError),
}

impl Outcome {
    pub fn success(user: DirectoryUser, info: Option<Info>) -> Self {
        Self::Success { user, info }
    }

    pub fn fail(info: Info, status: StatusCode) -> Self {
        Self::Failure { info, status }
    }

    pub fn error(err: impl Into<StrategyError>) -> Self {
        Self::Error(err.into())
    }

    /// Label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::Failure { .. } => "failure",
            Outcome::Error(_) => "error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}
