//! Translate directory errors into authentication failures.

use std::sync::LazyLock;

use axum::http::StatusCode;
use regex_lite::Regex;

use crate::directory::DirectoryError;
use crate::options::AuthenticateOptions;

pub const INVALID_CREDENTIALS: &str = "Invalid username/password";
pub const CONSTRAINT_VIOLATION: &str =
    "Exceeded password retry limit, account locked";

/// Active Directory extended error, e.g. `data 533, v893`.
static SUB_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"data ([0-9a-fA-F]*), v[0-9a-fA-F]*")
        .expect("sub-code pattern is valid")
});

static NO_SUCH_USER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)no such user").expect("no such user pattern is valid")
});

/// Result of classifying a directory error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Authentication failed, report `message` with `status`.
    Failure { message: String, status: StatusCode },
    /// Not an authentication failure.
    Error,
}

/// Active Directory sub-codes carried by bind errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubCode {
    InvalidLogonHours,
    InvalidWorkstation,
    PasswordExpired,
    AccountDisabled,
    AccountExpired,
    PasswordMustChange,
    AccountLockedOut,
}

impl SubCode {
    /// Find the sub-code embedded in a directory message.
    ///
    /// Returns `None` when there is none or when it is unknown.
    pub fn parse(message: &str) -> Option<Self> {
        let code = SUB_CODE.captures(message)?.get(1)?.as_str();
        match code.to_ascii_lowercase().as_str() {
            "530" => Some(SubCode::InvalidLogonHours),
            "531" => Some(SubCode::InvalidWorkstation),
            "532" => Some(SubCode::PasswordExpired),
            "533" => Some(SubCode::AccountDisabled),
            "701" => Some(SubCode::AccountExpired),
            "773" => Some(SubCode::PasswordMustChange),
            "775" => Some(SubCode::AccountLockedOut),
            _ => None,
        }
    }

    /// Message for this sub-code, honoring `options` overrides.
    pub fn message(self, options: &AuthenticateOptions) -> String {
        let (custom, default) = match self {
            SubCode::InvalidLogonHours => (
                &options.invalid_logon_hours,
                "Not Permitted to login at this time",
            ),
            SubCode::InvalidWorkstation => (
                &options.invalid_workstation,
                "Not permited to logon at this workstation",
            ),
            SubCode::PasswordExpired => {
                (&options.password_expired, "Password expired")
            },
            SubCode::AccountDisabled => {
                (&options.account_disabled, "Account disabled")
            },
            SubCode::AccountExpired => {
                (&options.account_expired, "Account expired")
            },
            SubCode::PasswordMustChange => {
                (&options.password_must_change, "User must reset password")
            },
            SubCode::AccountLockedOut => {
                (&options.account_locked_out, "User account locked")
            },
        };

        custom.clone().unwrap_or_else(|| default.to_owned())
    }
}

/// Classify a directory error.
pub fn classify(
    err: &DirectoryError,
    options: &AuthenticateOptions,
) -> Classification {
    match err {
        DirectoryError::InvalidCredentials(message)
        | DirectoryError::NoSuchObject(message) => Classification::Failure {
            message: invalid_credentials(message, options),
            status: StatusCode::UNAUTHORIZED,
        },
        DirectoryError::NoSuchUser(_) => Classification::Failure {
            message: default_message(options),
            status: StatusCode::UNAUTHORIZED,
        },
        DirectoryError::ConstraintViolation(_) => Classification::Failure {
            message: options
                .constraint_violation
                .clone()
                .unwrap_or_else(|| CONSTRAINT_VIOLATION.to_owned()),
            status: StatusCode::UNAUTHORIZED,
        },
        DirectoryError::Rejected { message, .. }
            if NO_SUCH_USER.is_match(message) =>
        {
            Classification::Failure {
                message: default_message(options),
                status: StatusCode::UNAUTHORIZED,
            }
        },
        _ => Classification::Error,
    }
}

/// Sub-codes are only read from bind errors. A missing user message may
/// echo the username.
fn invalid_credentials(message: &str, options: &AuthenticateOptions) -> String {
    match SubCode::parse(message) {
        Some(code) => code.message(options),
        None => default_message(options),
    }
}

fn default_message(options: &AuthenticateOptions) -> String {
    options
        .invalid_credentials
        .clone()
        .unwrap_or_else(|| INVALID_CREDENTIALS.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const AD_DISABLED: &str = concat!(
        "80090308: LdapErr: DSID-0C09030B, ",
        "comment: AcceptSecurityContext error, data 533, v893"
    );

    fn failure(message: &str) -> Classification {
        Classification::Failure {
            message: message.to_owned(),
            status: StatusCode::UNAUTHORIZED,
        }
    }

    #[test]
    fn test_invalid_credentials_family() {
        let options = AuthenticateOptions::default();

        for err in [
            DirectoryError::InvalidCredentials(String::new()),
            DirectoryError::NoSuchObject("ou=missing".into()),
            DirectoryError::NoSuchUser("nonexisting".into()),
            DirectoryError::Rejected {
                code: 1,
                message: "No Such User: nonexisting".into(),
            },
        ] {
            assert_eq!(classify(&err, &options), failure(INVALID_CREDENTIALS));
        }
    }

    #[test]
    fn test_missing_user_ignores_sub_code_in_username() {
        let options = AuthenticateOptions::default();

        for err in [
            DirectoryError::NoSuchUser("x data 533, v0".into()),
            DirectoryError::Rejected {
                code: 1,
                message: "no such user: x data 775, v0".into(),
            },
        ] {
            assert_eq!(classify(&err, &options), failure(INVALID_CREDENTIALS));
        }
    }

    #[test]
    fn test_invalid_credentials_override() {
        let options = AuthenticateOptions {
            invalid_credentials: Some("Wrong login".into()),
            ..Default::default()
        };
        let err = DirectoryError::InvalidCredentials(String::new());
        assert_eq!(classify(&err, &options), failure("Wrong login"));
    }

    #[test]
    fn test_constraint_violation() {
        let err = DirectoryError::ConstraintViolation(String::new());
        assert_eq!(
            classify(&err, &AuthenticateOptions::default()),
            failure(CONSTRAINT_VIOLATION)
        );

        let options = AuthenticateOptions {
            constraint_violation: Some("Locked".into()),
            ..Default::default()
        };
        assert_eq!(classify(&err, &options), failure("Locked"));
    }

    #[test]
    fn test_active_directory_sub_codes() {
        let options = AuthenticateOptions::default();
        let cases = [
            ("530", "Not Permitted to login at this time"),
            ("531", "Not permited to logon at this workstation"),
            ("532", "Password expired"),
            ("533", "Account disabled"),
            ("701", "Account expired"),
            ("773", "User must reset password"),
            ("775", "User account locked"),
        ];

        for (code, message) in cases {
            let err = DirectoryError::InvalidCredentials(format!(
                "AcceptSecurityContext error, data {code}, v893"
            ));
            assert_eq!(classify(&err, &options), failure(message));
        }
    }

    #[test]
    fn test_unknown_sub_code_falls_back() {
        let err = DirectoryError::InvalidCredentials(
            "AcceptSecurityContext error, data 52e, v893".into(),
        );
        assert_eq!(
            classify(&err, &AuthenticateOptions::default()),
            failure(INVALID_CREDENTIALS)
        );
    }

    #[test]
    fn test_sub_code_override() {
        let options = AuthenticateOptions {
            account_disabled: Some("Ask your administrator".into()),
            ..Default::default()
        };
        let err = DirectoryError::InvalidCredentials(AD_DISABLED.into());
        assert_eq!(classify(&err, &options), failure("Ask your administrator"));
    }

    #[test]
    fn test_other_errors_are_errors() {
        let options = AuthenticateOptions::default();
        for err in [
            DirectoryError::MissingPassword,
            DirectoryError::InvalidOptions("url is required".into()),
            DirectoryError::Rejected {
                code: 52,
                message: "unavailable".into(),
            },
            DirectoryError::ServiceBind {
                code: 49,
                message: String::new(),
            },
        ] {
            assert_eq!(classify(&err, &options), Classification::Error);
        }
    }
}
