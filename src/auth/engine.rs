use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

use crate::auth::linker::IdentityLinker;
use crate::auth::password;
use crate::auth::reset::ResetTokenManager;
use crate::auth::tokens::TokenIssuer;
use crate::error::AuthError;
use crate::mailer::Mailer;
use crate::providers::ProviderProfile;
use crate::store::{CredentialStore, NewUser, UserRecord};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Outcome of every successful authentication flow: both token artifacts and
/// the record they were issued for.
#[derive(Debug)]
pub struct Authenticated {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserRecord,
}

/// Drives the authentication flows end to end. Owns email normalization, so
/// callers can pass user input through untouched; storage, mail delivery and
/// provider exchange all sit behind their seams.
pub struct AuthEngine {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
    tokens: TokenIssuer,
    linker: IdentityLinker,
    resets: ResetTokenManager,
    frontend_url: String,
}

impl AuthEngine {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        tokens: TokenIssuer,
        frontend_url: String,
    ) -> Self {
        Self {
            linker: IdentityLinker::new(store.clone()),
            resets: ResetTokenManager::new(store.clone()),
            store,
            mailer,
            tokens,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }

    fn issue_session(&self, user: UserRecord) -> Result<Authenticated, AuthError> {
        let access_token = self.tokens.issue_access(user.id)?;
        let refresh_token = self.tokens.issue_refresh(user.id)?;
        Ok(Authenticated {
            access_token,
            refresh_token,
            user,
        })
    }

    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<Authenticated, AuthError> {
        if password != password_confirm {
            return Err(AuthError::Validation("Passwords do not match.".into()));
        }
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            warn!("signup with invalid email");
            return Err(AuthError::Validation(
                "Please provide a valid email address.".into(),
            ));
        }
        if !password::is_strong_password(password) {
            return Err(AuthError::Validation(
                password::STRENGTH_REQUIREMENTS.into(),
            ));
        }
        if self.store.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "signup on taken email");
            return Err(AuthError::AccountConflict);
        }

        let hash = password::hash_password(password)?;
        let user = self.store.create(NewUser::with_password(email, hash)).await?;
        info!(user_id = %user.id, email = %user.email, "user signed up");
        self.issue_session(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Authenticated, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "Please provide email and password.".into(),
            ));
        }
        let email = email.trim().to_lowercase();
        let Some(user) = self.store.find_by_email(&email).await? else {
            warn!(email = %email, "login with unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let Some(hash) = user.password_hash.as_deref() else {
            // Provider-born account without a password of its own.
            return match user.provider() {
                Some(provider) => {
                    warn!(user_id = %user.id, provider = %provider, "password login on provider-only account");
                    Err(AuthError::ProviderAccountRequired(provider))
                }
                None => Err(AuthError::InvalidCredentials),
            };
        };
        if !password::verify_password(password, hash) {
            warn!(user_id = %user.id, "login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user_id = %user.id, email = %user.email, "user logged in");
        self.issue_session(user)
    }

    /// Log in (or sign up) with a profile a provider has already vouched for.
    pub async fn provider_login(
        &self,
        profile: &ProviderProfile,
    ) -> Result<Authenticated, AuthError> {
        let user = self.linker.resolve(profile).await?;
        info!(user_id = %user.id, provider = %profile.provider, "provider login");
        self.issue_session(user)
    }

    /// Decide whether a request carrying this access token may proceed, and
    /// for which user. Tokens issued before the user's last password change
    /// are rejected.
    pub async fn authorize(&self, token: Option<&str>) -> Result<UserRecord, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        let claims = self.tokens.verify_access(token)?;
        let user = self
            .store
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if user.changed_password_after(claims.iat as i64) {
            warn!(user_id = %user.id, "access token predates password change");
            return Err(AuthError::StaleToken);
        }
        Ok(user)
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.store.find_by_email(&email).await? else {
            return Err(AuthError::EmailNotFound);
        };
        if !user.has_password() {
            if let Some(provider) = user.provider() {
                return Err(AuthError::ProviderAccountRequired(provider));
            }
        }

        let secret = self.resets.issue(&user).await?;
        let reset_url = format!("{}/reset-password/{}", self.frontend_url, secret);
        if let Err(e) = self
            .mailer
            .send_password_reset(&user.email, user.name.as_deref(), &reset_url)
            .await
        {
            warn!(user_id = %user.id, error = %e, "reset email delivery failed");
            // Roll the token back; if even that fails, the token still dies
            // with its 10-minute expiry.
            if let Err(e) = self.store.clear_reset_token(user.id).await {
                error!(user_id = %user.id, error = %e, "failed to clear reset token after delivery failure");
            }
            return Err(AuthError::DeliveryFailure);
        }
        info!(user_id = %user.id, "password reset email sent");
        Ok(())
    }

    pub async fn complete_password_reset(
        &self,
        secret: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<Authenticated, AuthError> {
        if password != password_confirm {
            return Err(AuthError::Validation("Passwords do not match.".into()));
        }
        if !password::is_strong_password(password) {
            return Err(AuthError::Validation(
                password::STRENGTH_REQUIREMENTS.into(),
            ));
        }

        let user = self.resets.consume(secret).await?;
        let new_hash = password::hash_password(password)?;
        // Backdated one second so the session issued below never looks older
        // than the change itself.
        let changed_at = OffsetDateTime::now_utc() - Duration::seconds(1);
        let updated = self
            .store
            .complete_password_reset(
                user.id,
                &ResetTokenManager::hash_secret(secret),
                &new_hash,
                changed_at,
            )
            .await?;
        if !updated {
            // Lost the race against another submission of the same token.
            warn!(user_id = %user.id, "reset token consumed concurrently");
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let user = self
            .store
            .find_by_id(user.id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        info!(user_id = %user.id, "password reset completed");
        self.issue_session(user)
    }
}
