use anyhow::bail;
use axum::async_trait;
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{CredentialStore, NewUser, Provider, UserRecord};

/// In-memory store with the same observable behavior as [`super::postgres::PgStore`]:
/// unique email and provider identities, inactive records invisible, and the
/// conditional reset write. Backs the fake app state and the flow tests.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<Vec<UserRecord>>,
}

impl MemoryStore {
    fn find_active<F>(&self, pred: F) -> Option<UserRecord>
    where
        F: Fn(&UserRecord) -> bool,
    {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.active && pred(u))
            .cloned()
    }

    #[cfg(test)]
    pub fn deactivate(&self, id: Uuid) {
        if let Some(user) = self.users.lock().unwrap().iter_mut().find(|u| u.id == id) {
            user.active = false;
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserRecord>> {
        Ok(self.find_active(|u| u.email == email))
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserRecord>> {
        Ok(self.find_active(|u| u.id == id))
    }

    async fn find_by_provider_identity(
        &self,
        provider: Provider,
        subject: &str,
    ) -> anyhow::Result<Option<UserRecord>> {
        Ok(self.find_active(|u| u.provider_identity(provider) == Some(subject)))
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
    ) -> anyhow::Result<Option<UserRecord>> {
        Ok(self.find_active(|u| u.reset_token_hash.as_deref() == Some(token_hash)))
    }

    async fn create(&self, new_user: NewUser) -> anyhow::Result<UserRecord> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == new_user.email) {
            bail!("duplicate key value violates unique constraint \"users_email_key\"");
        }
        if let Some(id) = &new_user.google_id {
            if users.iter().any(|u| u.google_id.as_ref() == Some(id)) {
                bail!("duplicate key value violates unique constraint \"users_google_id_key\"");
            }
        }
        if let Some(id) = &new_user.github_id {
            if users.iter().any(|u| u.github_id.as_ref() == Some(id)) {
                bail!("duplicate key value violates unique constraint \"users_github_id_key\"");
            }
        }
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: new_user.email,
            name: new_user.name,
            password_hash: new_user.password_hash,
            google_id: new_user.google_id,
            github_id: new_user.github_id,
            password_changed_at: None,
            reset_token_hash: None,
            reset_token_expires_at: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.id == user_id && u.active) {
            user.reset_token_hash = Some(token_hash.to_string());
            user.reset_token_expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn clear_reset_token(&self, user_id: Uuid) -> anyhow::Result<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
            user.reset_token_hash = None;
            user.reset_token_expires_at = None;
        }
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        user_id: Uuid,
        expected_token_hash: &str,
        new_password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.iter_mut().find(|u| u.id == user_id && u.active) else {
            return Ok(false);
        };
        if user.reset_token_hash.as_deref() != Some(expected_token_hash) {
            return Ok(false);
        }
        user.password_hash = Some(new_password_hash.to_string());
        user.password_changed_at = Some(changed_at);
        user.reset_token_hash = None;
        user.reset_token_expires_at = None;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[tokio::test]
    async fn create_and_find_by_email() {
        let store = MemoryStore::default();
        let created = store
            .create(NewUser::with_password("a@x.com".into(), "hash".into()))
            .await
            .expect("create");

        let found = store
            .find_by_email("a@x.com")
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(found.id, created.id);
        assert!(store.find_by_email("b@x.com").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::default();
        store
            .create(NewUser::with_password("a@x.com".into(), "hash".into()))
            .await
            .expect("create");
        let err = store
            .create(NewUser::with_password("a@x.com".into(), "hash".into()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unique"));
    }

    #[tokio::test]
    async fn inactive_users_are_invisible() {
        let store = MemoryStore::default();
        let user = store
            .create(NewUser::with_password("a@x.com".into(), "hash".into()))
            .await
            .expect("create");
        store.deactivate(user.id);

        assert!(store.find_by_email("a@x.com").await.expect("lookup").is_none());
        assert!(store.find_by_id(user.id).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn conditional_reset_write_requires_matching_digest() {
        let store = MemoryStore::default();
        let user = store
            .create(NewUser::with_password("a@x.com".into(), "old-hash".into()))
            .await
            .expect("create");
        let expires = OffsetDateTime::now_utc() + Duration::minutes(10);
        store
            .set_reset_token(user.id, "digest-a", expires)
            .await
            .expect("set token");

        let changed_at = OffsetDateTime::now_utc();
        assert!(!store
            .complete_password_reset(user.id, "digest-b", "new-hash", changed_at)
            .await
            .expect("attempt"));

        assert!(store
            .complete_password_reset(user.id, "digest-a", "new-hash", changed_at)
            .await
            .expect("attempt"));

        // The digest was consumed, so replaying the same write fails.
        assert!(!store
            .complete_password_reset(user.id, "digest-a", "new-hash", changed_at)
            .await
            .expect("attempt"));

        let user = store.find_by_id(user.id).await.expect("lookup").expect("present");
        assert_eq!(user.password_hash.as_deref(), Some("new-hash"));
        assert!(user.reset_token_hash.is_none());
        assert!(user.reset_token_expires_at.is_none());
        assert_eq!(user.password_changed_at, Some(changed_at));
    }
}
