use axum::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

/// Third-party identity providers a record can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
        }
    }

    /// Capitalized form used in user-facing messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Google => "Google",
            Provider::Github => "Github",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User record as persisted by the credential store.
///
/// `password_hash` and `reset_token_hash` never leave the process: they are
/// skipped on serialization and responses go through `PublicUser` instead.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub github_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub reset_token_hash: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reset_token_expires_at: Option<OffsetDateTime>,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl UserRecord {
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// The provider this record is linked to, if any. Google is checked
    /// before Github, matching the precedence of the provider hints.
    pub fn provider(&self) -> Option<Provider> {
        if self.google_id.is_some() {
            Some(Provider::Google)
        } else if self.github_id.is_some() {
            Some(Provider::Github)
        } else {
            None
        }
    }

    pub fn provider_identity(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Google => self.google_id.as_deref(),
            Provider::Github => self.github_id.as_deref(),
        }
    }

    /// Whether the password was changed after a token with the given
    /// issued-at timestamp (unix seconds) was signed.
    pub fn changed_password_after(&self, token_iat: i64) -> bool {
        match self.password_changed_at {
            Some(changed_at) => token_iat < changed_at.unix_timestamp(),
            None => false,
        }
    }
}

/// Fields for a record about to be created. Exactly one of the two
/// constructors is used per flow: password signup or first provider login.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub github_id: Option<String>,
}

impl NewUser {
    pub fn with_password(email: String, password_hash: String) -> Self {
        Self {
            email,
            name: None,
            password_hash: Some(password_hash),
            google_id: None,
            github_id: None,
        }
    }

    pub fn with_provider_identity(
        email: String,
        name: Option<String>,
        provider: Provider,
        subject: String,
    ) -> Self {
        let (google_id, github_id) = match provider {
            Provider::Google => (Some(subject), None),
            Provider::Github => (None, Some(subject)),
        };
        Self {
            email,
            name,
            password_hash: None,
            google_id,
            github_id,
        }
    }
}

/// Durable store of user records. Implementations must exclude inactive
/// records from every lookup.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserRecord>>;

    async fn find_by_provider_identity(
        &self,
        provider: Provider,
        subject: &str,
    ) -> anyhow::Result<Option<UserRecord>>;

    /// Look up the record holding this reset-token digest. Expiry is checked
    /// by the caller against its own clock.
    async fn find_by_reset_token(&self, token_hash: &str)
        -> anyhow::Result<Option<UserRecord>>;

    async fn create(&self, new_user: NewUser) -> anyhow::Result<UserRecord>;

    /// Attach a reset-token digest and expiry, replacing any outstanding one.
    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()>;

    async fn clear_reset_token(&self, user_id: Uuid) -> anyhow::Result<()>;

    /// Set the new password and clear the reset fields in one conditional
    /// write, guarded on the stored digest still matching. Returns false when
    /// the guard fails, i.e. the token was already consumed or replaced.
    async fn complete_password_reset(
        &self,
        user_id: Uuid,
        expected_token_hash: &str,
        new_password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> anyhow::Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn record() -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: "a@x.com".into(),
            name: None,
            password_hash: Some("$argon2id$fake".into()),
            google_id: None,
            github_id: None,
            password_changed_at: None,
            reset_token_hash: None,
            reset_token_expires_at: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn changed_password_after_compares_against_iat() {
        let mut user = record();
        let now = OffsetDateTime::now_utc();
        assert!(!user.changed_password_after(now.unix_timestamp()));

        user.password_changed_at = Some(now);
        assert!(user.changed_password_after((now - Duration::seconds(10)).unix_timestamp()));
        assert!(!user.changed_password_after((now + Duration::seconds(10)).unix_timestamp()));
        // A token signed in the same second as the change stays valid.
        assert!(!user.changed_password_after(now.unix_timestamp()));
    }

    #[test]
    fn provider_prefers_google_over_github() {
        let mut user = record();
        assert_eq!(user.provider(), None);

        user.github_id = Some("gh-1".into());
        assert_eq!(user.provider(), Some(Provider::Github));

        user.google_id = Some("g-1".into());
        assert_eq!(user.provider(), Some(Provider::Google));
    }

    #[test]
    fn serialized_record_hides_sensitive_fields() {
        let mut user = record();
        user.reset_token_hash = Some("digest".into());
        let json = serde_json::to_string(&user).expect("serialize");
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("reset_token_hash"));
        assert!(json.contains("a@x.com"));
    }
}
