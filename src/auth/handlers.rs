use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::dto::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, OAuthCallback, PublicUser,
    ResetPasswordRequest, SignupRequest, StatusMessage,
};
use crate::auth::engine::Authenticated;
use crate::auth::extractors::CurrentUser;
use crate::error::{AuthError, AuthResult};
use crate::state::AppState;
use crate::store::Provider;

/// Cookie carrying the refresh token. HTTP-only; clients never see it in a
/// response body.
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";
/// Short-lived cookie tying an OAuth callback to the browser that started
/// the flow.
const OAUTH_STATE_COOKIE: &str = "oauthState";
const OAUTH_STATE_TTL: Duration = Duration::minutes(10);

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password/:token", post(reset_password))
        .route("/auth/:provider", get(oauth_start))
        .route("/auth/:provider/callback", get(oauth_callback))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn refresh_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let secure = state.config.cookie_secure;
    Cookie::build((REFRESH_TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        // Cross-site frontends need None, which browsers only accept on
        // secure cookies; plain http development falls back to Lax.
        .same_site(if secure { SameSite::None } else { SameSite::Lax })
        .max_age(state.config.jwt.refresh_ttl())
        .build()
}

fn session_response(
    state: &AppState,
    jar: CookieJar,
    session: Authenticated,
) -> (CookieJar, Json<AuthResponse>) {
    let jar = jar.add(refresh_cookie(state, session.refresh_token));
    (
        jar,
        Json(AuthResponse {
            access_token: session.access_token,
            user: PublicUser::from(session.user),
        }),
    )
}

#[instrument(skip(state, jar, payload))]
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<SignupRequest>,
) -> AuthResult<(StatusCode, CookieJar, Json<AuthResponse>)> {
    let session = state
        .engine
        .signup(&payload.email, &payload.password, &payload.password_confirm)
        .await?;
    let (jar, body) = session_response(&state, jar, session);
    Ok((StatusCode::CREATED, jar, body))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> AuthResult<(CookieJar, Json<AuthResponse>)> {
    let session = state.engine.login(&payload.email, &payload.password).await?;
    Ok(session_response(&state, jar, session))
}

#[instrument(skip(user, jar))]
pub async fn logout(
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> (CookieJar, Json<StatusMessage>) {
    info!(user_id = %user.id, "user logged out");
    let jar = jar.remove(Cookie::build(REFRESH_TOKEN_COOKIE).path("/").build());
    (
        jar,
        Json(StatusMessage {
            status: "success",
            message: "You have been logged out successfully.",
        }),
    )
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AuthResult<Json<StatusMessage>> {
    state.engine.request_password_reset(&payload.email).await?;
    Ok(Json(StatusMessage {
        status: "success",
        message: "Token sent to email",
    }))
}

#[instrument(skip(state, jar, payload, token))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    jar: CookieJar,
    Json(payload): Json<ResetPasswordRequest>,
) -> AuthResult<(CookieJar, Json<AuthResponse>)> {
    let session = state
        .engine
        .complete_password_reset(&token, &payload.password, &payload.password_confirm)
        .await?;
    Ok(session_response(&state, jar, session))
}

#[instrument(skip(state, jar))]
pub async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<Provider>,
    jar: CookieJar,
) -> AuthResult<(CookieJar, Redirect)> {
    let identity_provider = state.providers.get(provider).ok_or_else(|| {
        AuthError::Validation(format!(
            "{} sign-in is not configured.",
            provider.display_name()
        ))
    })?;

    let csrf = Uuid::new_v4().to_string();
    let url = identity_provider.authorize_url(&csrf);
    let cookie = Cookie::build((OAUTH_STATE_COOKIE, csrf))
        .path("/")
        .http_only(true)
        .secure(state.config.cookie_secure)
        // Lax so the cookie still rides the top-level redirect back from the
        // provider.
        .same_site(SameSite::Lax)
        .max_age(OAUTH_STATE_TTL)
        .build();
    info!(provider = %provider, "oauth flow started");
    Ok((jar.add(cookie), Redirect::to(&url)))
}

#[instrument(skip(state, jar, query))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<Provider>,
    Query(query): Query<OAuthCallback>,
    jar: CookieJar,
) -> AuthResult<(CookieJar, Json<AuthResponse>)> {
    let identity_provider = state
        .providers
        .get(provider)
        .ok_or(AuthError::ProviderAuthFailed(provider))?;

    let expected_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(Cookie::build(OAUTH_STATE_COOKIE).path("/").build());
    match (expected_state.as_deref(), query.state.as_deref()) {
        (Some(expected), Some(returned)) if expected == returned => {}
        _ => {
            warn!(provider = %provider, "oauth state mismatch");
            return Err(AuthError::ProviderAuthFailed(provider));
        }
    }

    if let Some(error) = query.error.as_deref() {
        warn!(provider = %provider, error = %error, "provider returned an error");
        return Err(AuthError::ProviderAuthFailed(provider));
    }
    let code = query
        .code
        .as_deref()
        .ok_or(AuthError::ProviderAuthFailed(provider))?;

    let profile = identity_provider.exchange_profile(code).await.map_err(|e| {
        warn!(provider = %provider, error = %e, "profile exchange failed");
        AuthError::ProviderAuthFailed(provider)
    })?;

    let session = state.engine.provider_login(&profile).await?;
    Ok(session_response(&state, jar, session))
}

#[instrument(skip(user))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn auth_response_has_access_token_but_no_refresh_token() {
        let response = AuthResponse {
            access_token: "header.payload.signature".to_string(),
            user: PublicUser {
                id: Uuid::new_v4(),
                email: "test@example.com".to_string(),
                name: None,
                created_at: OffsetDateTime::now_utc(),
            },
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("access_token"));
        assert!(json.contains("test@example.com"));
        assert!(!json.contains("refresh_token"));
    }

    #[test]
    fn refresh_cookie_is_http_only_and_scoped_to_root() {
        let state = AppState::fake();
        let cookie = refresh_cookie(&state, "token-value".into());

        assert_eq!(cookie.name(), REFRESH_TOKEN_COOKIE);
        assert_eq!(cookie.value(), "token-value");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        // The fake state runs without TLS, so Lax rather than None.
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(
            cookie.max_age(),
            Some(Duration::minutes(state.config.jwt.refresh_ttl_minutes))
        );
    }

    #[test]
    fn logout_status_message_serializes_flat() {
        let body = StatusMessage {
            status: "success",
            message: "You have been logged out successfully.",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(
            json,
            r#"{"status":"success","message":"You have been logged out successfully."}"#
        );
    }
}
