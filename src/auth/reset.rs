use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::error::AuthError;
use crate::store::{CredentialStore, UserRecord};

/// How long an issued reset secret stays consumable.
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);

const SECRET_BYTES: usize = 32;

/// Issues and consumes the single-use password-reset secrets. Only a sha256
/// digest of the secret is ever persisted; the plaintext exists in the
/// issuing request and the email, nowhere else.
pub struct ResetTokenManager {
    store: Arc<dyn CredentialStore>,
}

impl ResetTokenManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub fn hash_secret(secret: &str) -> String {
        hex::encode(Sha256::digest(secret.as_bytes()))
    }

    /// Mint a fresh secret for the user and store its digest, replacing any
    /// outstanding one. At most one reset secret is live per user.
    pub async fn issue(&self, user: &UserRecord) -> Result<String, AuthError> {
        let mut raw = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut raw);
        let secret = hex::encode(raw);
        let expires_at = OffsetDateTime::now_utc() + RESET_TOKEN_TTL;
        self.store
            .set_reset_token(user.id, &Self::hash_secret(&secret), expires_at)
            .await?;
        debug!(user_id = %user.id, "password reset token issued");
        Ok(secret)
    }

    /// Resolve a submitted secret to its user. An unknown digest and an
    /// expired token are indistinguishable to the caller. An expiry landing
    /// exactly on now counts as expired.
    pub async fn consume(&self, secret: &str) -> Result<UserRecord, AuthError> {
        let hash = Self::hash_secret(secret);
        let user = self
            .store
            .find_by_reset_token(&hash)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        match user.reset_token_expires_at {
            Some(expires_at) if OffsetDateTime::now_utc() < expires_at => Ok(user),
            _ => Err(AuthError::InvalidOrExpiredToken),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::NewUser;

    async fn store_with_user() -> (Arc<MemoryStore>, UserRecord) {
        let store = Arc::new(MemoryStore::default());
        let user = store
            .create(NewUser::with_password("a@x.com".into(), "$argon2id$fake".into()))
            .await
            .expect("create user");
        (store, user)
    }

    #[test]
    fn hash_secret_is_hex_sha256() {
        let digest = ResetTokenManager::hash_secret("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn issued_secret_is_long_random_hex() {
        let (store, user) = store_with_user().await;
        let manager = ResetTokenManager::new(store.clone());

        let first = manager.issue(&user).await.expect("issue");
        let second = manager.issue(&user).await.expect("issue");

        assert_eq!(first.len(), SECRET_BYTES * 2);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn stored_digest_differs_from_secret() {
        let (store, user) = store_with_user().await;
        let manager = ResetTokenManager::new(store.clone());

        let secret = manager.issue(&user).await.expect("issue");
        let stored = store
            .find_by_id(user.id)
            .await
            .expect("lookup")
            .expect("user exists");

        let digest = stored.reset_token_hash.expect("digest stored");
        assert_ne!(digest, secret);
        assert_eq!(digest, ResetTokenManager::hash_secret(&secret));
    }

    #[tokio::test]
    async fn consume_roundtrip() {
        let (store, user) = store_with_user().await;
        let manager = ResetTokenManager::new(store);

        let secret = manager.issue(&user).await.expect("issue");
        let found = manager.consume(&secret).await.expect("consume");
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn consume_rejects_unknown_secret() {
        let (store, user) = store_with_user().await;
        let manager = ResetTokenManager::new(store);
        manager.issue(&user).await.expect("issue");

        let err = manager.consume("0".repeat(64).as_str()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn consume_rejects_expired_secret() {
        let (store, user) = store_with_user().await;
        let manager = ResetTokenManager::new(store.clone());

        let secret = manager.issue(&user).await.expect("issue");
        // Backdate the expiry to simulate the window having passed.
        store
            .set_reset_token(
                user.id,
                &ResetTokenManager::hash_secret(&secret),
                OffsetDateTime::now_utc() - Duration::seconds(1),
            )
            .await
            .expect("backdate");

        let err = manager.consume(&secret).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn reissue_invalidates_the_previous_secret() {
        let (store, user) = store_with_user().await;
        let manager = ResetTokenManager::new(store);

        let first = manager.issue(&user).await.expect("issue");
        let second = manager.issue(&user).await.expect("issue");

        assert!(matches!(
            manager.consume(&first).await.unwrap_err(),
            AuthError::InvalidOrExpiredToken
        ));
        assert!(manager.consume(&second).await.is_ok());
    }
}
