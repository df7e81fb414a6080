use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AuthError;
use crate::providers::ProviderProfile;
use crate::store::{CredentialStore, NewUser, UserRecord};

/// Resolves a validated provider profile to exactly one local record.
/// Matching is by provider identity only; an email collision with an
/// unlinked account is rejected rather than silently splitting or merging
/// accounts.
pub struct IdentityLinker {
    store: Arc<dyn CredentialStore>,
}

impl IdentityLinker {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, profile: &ProviderProfile) -> Result<UserRecord, AuthError> {
        if let Some(user) = self
            .store
            .find_by_provider_identity(profile.provider, &profile.subject)
            .await?
        {
            return Ok(user);
        }

        let email = profile.email.trim().to_lowercase();
        if self.store.find_by_email(&email).await?.is_some() {
            warn!(provider = %profile.provider, "provider login email collides with an existing account");
            return Err(AuthError::AccountConflict);
        }

        let user = self
            .store
            .create(NewUser::with_provider_identity(
                email,
                profile.name.clone(),
                profile.provider,
                profile.subject.clone(),
            ))
            .await?;
        info!(user_id = %user.id, provider = %profile.provider, "user created from provider profile");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::Provider;

    fn profile(subject: &str, email: &str) -> ProviderProfile {
        ProviderProfile {
            provider: Provider::Google,
            subject: subject.to_string(),
            email: email.to_string(),
            name: Some("Ada".to_string()),
        }
    }

    #[tokio::test]
    async fn first_login_creates_a_linked_user() {
        let store = Arc::new(MemoryStore::default());
        let linker = IdentityLinker::new(store.clone());

        let user = linker.resolve(&profile("g-1", "ada@x.com")).await.expect("resolve");
        assert_eq!(user.email, "ada@x.com");
        assert_eq!(user.google_id.as_deref(), Some("g-1"));
        assert_eq!(user.name.as_deref(), Some("Ada"));
        assert!(!user.has_password());
    }

    #[tokio::test]
    async fn repeat_login_returns_the_same_user() {
        let store = Arc::new(MemoryStore::default());
        let linker = IdentityLinker::new(store);

        let first = linker.resolve(&profile("g-1", "ada@x.com")).await.expect("resolve");
        let second = linker.resolve(&profile("g-1", "ada@x.com")).await.expect("resolve");
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn match_is_by_subject_even_if_provider_email_changed() {
        let store = Arc::new(MemoryStore::default());
        let linker = IdentityLinker::new(store);

        let first = linker.resolve(&profile("g-1", "old@x.com")).await.expect("resolve");
        let second = linker.resolve(&profile("g-1", "new@x.com")).await.expect("resolve");
        assert_eq!(first.id, second.id);
        assert_eq!(second.email, "old@x.com");
    }

    #[tokio::test]
    async fn email_collision_with_unlinked_account_is_rejected() {
        let store = Arc::new(MemoryStore::default());
        store
            .create(NewUser::with_password("ada@x.com".into(), "$argon2id$fake".into()))
            .await
            .expect("create");
        let linker = IdentityLinker::new(store);

        let err = linker.resolve(&profile("g-1", "ada@x.com")).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountConflict));
    }

    #[tokio::test]
    async fn provider_email_is_normalized_before_matching() {
        let store = Arc::new(MemoryStore::default());
        store
            .create(NewUser::with_password("ada@x.com".into(), "$argon2id$fake".into()))
            .await
            .expect("create");
        let linker = IdentityLinker::new(store);

        let err = linker.resolve(&profile("g-1", "  ADA@X.com ")).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountConflict));
    }
}
