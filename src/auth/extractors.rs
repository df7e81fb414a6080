use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;

use crate::error::AuthError;
use crate::state::AppState;
use crate::store::UserRecord;

/// Cookie consulted when no Authorization header is present. Browser-only
/// clients keep their access token here.
pub const ACCESS_TOKEN_COOKIE: &str = "jwt";

/// Extracts the authenticated user for protected routes: the access token is
/// taken from the `Authorization: Bearer` header first, then from the access
/// cookie, and run through full request authorization.
pub struct CurrentUser(pub UserRecord);

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::to_owned);
    bearer.or_else(|| {
        CookieJar::from_headers(headers)
            .get(ACCESS_TOKEN_COOKIE)
            .map(|c| c.value().to_string())
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let token = token_from_headers(&parts.headers);
        let user = state.engine.authorize(token.as_deref()).await?;
        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let map = headers(&[
            ("authorization", "Bearer from-header"),
            ("cookie", "jwt=from-cookie"),
        ]);
        assert_eq!(token_from_headers(&map).as_deref(), Some("from-header"));
    }

    #[test]
    fn cookie_is_used_when_header_is_absent_or_not_bearer() {
        let map = headers(&[("cookie", "session=x; jwt=from-cookie")]);
        assert_eq!(token_from_headers(&map).as_deref(), Some("from-cookie"));

        let map = headers(&[
            ("authorization", "Basic dXNlcjpwYXNz"),
            ("cookie", "jwt=from-cookie"),
        ]);
        assert_eq!(token_from_headers(&map).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn no_token_source_yields_none() {
        assert_eq!(token_from_headers(&HeaderMap::new()), None);
        let map = headers(&[("cookie", "session=x")]);
        assert_eq!(token_from_headers(&map), None);
    }

    #[tokio::test]
    async fn extracted_token_flows_through_authorization() {
        let state = crate::state::AppState::fake();
        let session = state
            .engine
            .signup("a@x.com", "Str0ng!pass", "Str0ng!pass")
            .await
            .expect("signup");

        let cookie = format!("jwt={}", session.access_token);
        let map = headers(&[("cookie", cookie.as_str())]);
        let token = token_from_headers(&map);
        let user = state
            .engine
            .authorize(token.as_deref())
            .await
            .expect("authorize");
        assert_eq!(user.id, session.user.id);
    }
}
