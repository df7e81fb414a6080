use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::Provider;

pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Everything the authentication flows can fail with. The `Display` text is
/// what clients see, except for the authorization variants, which all
/// collapse into one generic message so responses do not reveal whether a
/// token is absent, malformed, expired or revoked.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Incorrect email or password.")]
    InvalidCredentials,

    #[error(
        "This email is associated with a {} account. Please use the \"Sign in with {}\" button.",
        .0.display_name(),
        .0.display_name()
    )]
    ProviderAccountRequired(Provider),

    #[error("There is no user with this email address.")]
    EmailNotFound,

    #[error("An account with this email address already exists.")]
    AccountConflict,

    #[error("Token is invalid or has expired.")]
    InvalidOrExpiredToken,

    #[error("no access token supplied")]
    MissingToken,

    #[error("invalid access token")]
    InvalidToken,

    #[error("access token expired")]
    ExpiredToken,

    #[error("access token predates a password change")]
    StaleToken,

    #[error("token subject no longer exists")]
    UserNotFound,

    #[error("{} authentication failed. Please try again.", .0.display_name())]
    ProviderAuthFailed(Provider),

    #[error("There was an error sending the email. Please try again later.")]
    DeliveryFailure,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::InvalidOrExpiredToken => {
                StatusCode::BAD_REQUEST
            }
            AuthError::InvalidCredentials
            | AuthError::ProviderAccountRequired(_)
            | AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::StaleToken
            | AuthError::UserNotFound
            | AuthError::ProviderAuthFailed(_) => StatusCode::UNAUTHORIZED,
            AuthError::EmailNotFound => StatusCode::NOT_FOUND,
            AuthError::AccountConflict => StatusCode::CONFLICT,
            AuthError::DeliveryFailure | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::StaleToken
            | AuthError::UserNotFound => {
                "You are not logged in. Please login to get access.".to_string()
            }
            AuthError::Internal(_) => "Something went very wrong!".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(ref err) = self {
            error!(error = %err, "internal error");
        }
        let status = self.status();
        let body = Json(json!({
            "status": if status.is_server_error() { "error" } else { "fail" },
            "message": self.public_message(),
        }));
        (status, body).into_response()
    }
}
