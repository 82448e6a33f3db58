use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::otp;
use crate::users::repo::{StoreError, UserStore};
use crate::users::repo_types::{NewUser, OtpChallenge, ProfileUpdate, Role, User};

/// In-process store used by unit tests in place of Postgres.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.phone == phone)
            .cloned())
    }

    async fn list(&self, role: Option<Role>) -> anyhow::Result<Vec<User>> {
        let mut rows: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| role.map_or(true, |r| u.role == r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.phone == new.phone) {
            return Err(StoreError::DuplicatePhone);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            phone: new.phone,
            pin_hash: new.pin_hash,
            role: new.role,
            location: new.location,
            preferred_language: new.preferred_language,
            otp_code: None,
            otp_expires_at: None,
            is_verified: false,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        if let Some(phone) = &update.phone {
            if users.values().any(|u| u.id != id && &u.phone == phone) {
                return Err(StoreError::DuplicatePhone);
            }
        }
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(phone) = update.phone {
            user.phone = phone;
        }
        if let Some(location) = update.location {
            user.location = location;
        }
        if let Some(lang) = update.preferred_language {
            user.preferred_language = lang;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }

    async fn set_otp(&self, id: Uuid, challenge: &OtpChallenge) -> anyhow::Result<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        user.otp_code = Some(challenge.code.clone());
        user.otp_expires_at = Some(challenge.expires_at);
        Ok(true)
    }

    async fn reset_pin(
        &self,
        id: Uuid,
        expected_code: &str,
        pin_hash: &str,
    ) -> anyhow::Result<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };
        if !otp::validate(user.otp_code.as_deref(), user.otp_expires_at, expected_code) {
            return Ok(false);
        }
        user.pin_hash = pin_hash.to_string();
        user.otp_code = None;
        user.otp_expires_at = None;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::Language;
    use time::Duration;

    async fn seeded(store: &MemoryUserStore) -> User {
        store
            .create(NewUser {
                name: "Kojo".into(),
                phone: "233201234567".into(),
                pin_hash: "old".into(),
                role: Role::Logistics,
                location: "Tamale".into(),
                preferred_language: Language::En,
            })
            .await
            .unwrap()
    }

    fn challenge(code: &str) -> OtpChallenge {
        OtpChallenge {
            code: code.into(),
            expires_at: OffsetDateTime::now_utc() + Duration::minutes(5),
        }
    }

    #[tokio::test]
    async fn reset_pin_with_stale_code_keeps_newer_challenge() {
        let store = MemoryUserStore::default();
        let user = seeded(&store).await;
        store.set_otp(user.id, &challenge("111111")).await.unwrap();
        store.set_otp(user.id, &challenge("222222")).await.unwrap();

        assert!(!store.reset_pin(user.id, "111111", "new").await.unwrap());
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.pin_hash, "old");
        assert_eq!(stored.otp_code.as_deref(), Some("222222"));

        assert!(store.reset_pin(user.id, "222222", "new").await.unwrap());
        assert!(!store.reset_pin(user.id, "222222", "newer").await.unwrap());
        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.pin_hash, "new");
        assert!(stored.otp().is_none());
    }

    #[tokio::test]
    async fn reset_pin_ignores_expired_challenge() {
        let store = MemoryUserStore::default();
        let user = seeded(&store).await;
        let expired = OtpChallenge {
            code: "333333".into(),
            expires_at: OffsetDateTime::now_utc() - Duration::seconds(1),
        };
        store.set_otp(user.id, &expired).await.unwrap();
        assert!(!store.reset_pin(user.id, "333333", "new").await.unwrap());
    }
}
