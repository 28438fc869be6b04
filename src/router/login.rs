//! Login with directory credentials.

use axum::{Extension, Json};

use crate::middleware::Authenticated;

/// Return the user proven by the authentication middleware.
pub async fn handler(
    Extension(auth): Extension<Authenticated>,
) -> Json<Authenticated> {
    tracing::debug!(dn = auth.user.dn(), "login");
    Json(auth)
}
