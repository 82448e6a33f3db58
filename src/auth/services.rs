//! Auth use cases: registration, login, profile lookup and the OTP-backed PIN reset.
//!
//! A user is `Active` with no challenge, `ResetPending` while an unexpired
//! challenge is stored, and `ResetExpired` once it lapses. An expired challenge
//! is never honoured and is replaced by the next `forgot_pin`.

use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::dto::RegisterRequest;
use crate::auth::notify::Delivery;
use crate::auth::{otp, phone, pin};
use crate::error::AppError;
use crate::state::AppState;
use crate::users::repo_types::{NewUser, OtpChallenge, User};

/// A user together with a freshly signed token.
pub struct Session {
    pub user: User,
    pub token: String,
}

pub struct OtpIssued {
    pub delivery: Delivery,
    pub expires_at: OffsetDateTime,
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Normalizes and checks the storage format.
pub(crate) fn canonical_phone(raw: &str) -> Result<String, AppError> {
    let canonical = phone::normalize(raw);
    if !phone::is_valid_phone(&canonical) {
        return Err(AppError::Validation(format!(
            "{canonical} is not a valid Ghana phone number"
        )));
    }
    Ok(canonical)
}

fn require_pin(value: &str) -> Result<(), AppError> {
    if pin::is_valid_pin(value) {
        Ok(())
    } else {
        Err(AppError::Validation("PIN must be exactly 6 digits".into()))
    }
}

async fn find_by_raw_phone(state: &AppState, raw: &str) -> Result<Option<User>, AppError> {
    let canonical = phone::normalize(raw);
    Ok(state.users.find_by_phone(&canonical).await?)
}

pub async fn register(state: &AppState, req: RegisterRequest) -> Result<Session, AppError> {
    let name = require_non_empty("name", &req.name)?;
    let location = require_non_empty("location", &req.location)?;
    let phone = canonical_phone(&req.phone)?;
    require_pin(&req.pin)?;

    if state.users.find_by_phone(&phone).await?.is_some() {
        warn!(%phone, "phone already registered");
        return Err(AppError::Conflict("User already exists".into()));
    }

    let pin_hash = pin::hash_pin(&req.pin)?;
    let user = state
        .users
        .create(NewUser {
            name,
            phone,
            pin_hash,
            role: req.role,
            location,
            preferred_language: req.preferred_language,
        })
        .await?;

    let token = state.keys.sign(user.id)?;
    info!(user_id = %user.id, phone = %user.phone, role = %user.role, "user registered");
    Ok(Session { user, token })
}

pub async fn login(state: &AppState, raw_phone: &str, candidate: &str) -> Result<Session, AppError> {
    let Some(user) = find_by_raw_phone(state, raw_phone).await? else {
        pin::verify_against_dummy(candidate);
        warn!("login unknown phone");
        return Err(AppError::InvalidCredentials);
    };

    if !pin::verify_pin(candidate, &user.pin_hash)? {
        warn!(user_id = %user.id, "login invalid pin");
        return Err(AppError::InvalidCredentials);
    }

    let token = state.keys.sign(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok(Session { user, token })
}

/// Re-reads the profile; the record may have been removed since the guard ran.
pub async fn me(state: &AppState, user_id: Uuid) -> Result<User, AppError> {
    state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

pub async fn forgot_pin(state: &AppState, raw_phone: &str) -> Result<OtpIssued, AppError> {
    let user = find_by_raw_phone(state, raw_phone)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let challenge = OtpChallenge {
        code: otp::generate(),
        expires_at: otp::expiration_from_now(),
    };
    if !state.users.set_otp(user.id, &challenge).await? {
        return Err(AppError::NotFound("User not found".into()));
    }

    let delivery = state.notifier.deliver(&user.phone, &challenge.code).await?;
    info!(user_id = %user.id, "pin reset challenge issued");
    Ok(OtpIssued {
        delivery,
        expires_at: challenge.expires_at,
    })
}

pub async fn reset_pin(
    state: &AppState,
    raw_phone: &str,
    provided_otp: &str,
    new_pin: &str,
) -> Result<(), AppError> {
    let user = find_by_raw_phone(state, raw_phone)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    require_pin(new_pin)?;

    let challenge = user.otp();
    let valid = otp::validate(
        challenge.as_ref().map(|c| c.code.as_str()),
        challenge.as_ref().map(|c| c.expires_at),
        provided_otp,
    );
    if !valid {
        warn!(user_id = %user.id, "pin reset rejected: invalid or expired otp");
        return Err(AppError::InvalidOrExpiredOtp);
    }

    let pin_hash = pin::hash_pin(new_pin)?;
    // the store re-checks the code, so a challenge consumed or replaced since the read fails here
    if !state.users.reset_pin(user.id, provided_otp, &pin_hash).await? {
        warn!(user_id = %user.id, "pin reset rejected: challenge consumed or replaced");
        return Err(AppError::InvalidOrExpiredOtp);
    }
    info!(user_id = %user.id, "pin reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use time::Duration;

    use crate::users::memory::MemoryUserStore;
    use crate::users::repo::{StoreError, UserStore};
    use crate::users::repo_types::{Language, ProfileUpdate, Role};

    /// Phone lookups return their snapshot only after yielding, like a database round trip.
    #[derive(Default)]
    struct LaggyLookup(MemoryUserStore);

    #[async_trait]
    impl UserStore for LaggyLookup {
        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            self.0.find_by_id(id).await
        }
        async fn find_by_phone(&self, phone: &str) -> anyhow::Result<Option<User>> {
            let found = self.0.find_by_phone(phone).await;
            tokio::task::yield_now().await;
            found
        }
        async fn list(&self, role: Option<Role>) -> anyhow::Result<Vec<User>> {
            self.0.list(role).await
        }
        async fn create(&self, new: NewUser) -> Result<User, StoreError> {
            self.0.create(new).await
        }
        async fn update_profile(
            &self,
            id: Uuid,
            update: ProfileUpdate,
        ) -> Result<Option<User>, StoreError> {
            self.0.update_profile(id, update).await
        }
        async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
            self.0.delete(id).await
        }
        async fn set_otp(&self, id: Uuid, challenge: &OtpChallenge) -> anyhow::Result<bool> {
            self.0.set_otp(id, challenge).await
        }
        async fn reset_pin(
            &self,
            id: Uuid,
            expected_code: &str,
            pin_hash: &str,
        ) -> anyhow::Result<bool> {
            self.0.reset_pin(id, expected_code, pin_hash).await
        }
    }

    fn registration(phone: &str, pin: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Yaa Asantewaa".into(),
            phone: phone.into(),
            role: Role::Farmer,
            location: "Ejisu".into(),
            preferred_language: Language::Tw,
            pin: pin.into(),
        }
    }

    #[tokio::test]
    async fn register_stores_canonical_phone_and_hashed_pin() {
        let state = AppState::fake();
        let s = register(&state, registration("024 123 4567", "123456")).await.unwrap();
        assert_eq!(s.user.phone, "233241234567");
        assert_ne!(s.user.pin_hash, "123456");
        assert_eq!(state.keys.verify(&s.token), Ok(s.user.id));
    }

    #[tokio::test]
    async fn duplicate_phone_in_any_form_conflicts() {
        let state = AppState::fake();
        register(&state, registration("0241234567", "123456")).await.unwrap();
        for form in ["233241234567", "241234567", "+233 24 123 4567"] {
            let err = register(&state, registration(form, "111111")).await.err().unwrap();
            assert!(matches!(err, AppError::Conflict(_)), "{form}");
        }
    }

    #[tokio::test]
    async fn register_validates_fields() {
        let state = AppState::fake();
        let err = register(&state, registration("12345", "123456")).await.err().unwrap();
        assert!(matches!(err, AppError::Validation(_)));

        let err = register(&state, registration("0241234567", "12345")).await.err().unwrap();
        assert!(matches!(err, AppError::Validation(_)));

        let mut req = registration("0241234567", "123456");
        req.name = "   ".into();
        let err = register(&state, req).await.err().unwrap();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let state = AppState::fake();
        register(&state, registration("0241234567", "123456")).await.unwrap();

        let wrong_pin = login(&state, "0241234567", "000000").await.err().unwrap();
        let unknown = login(&state, "0209999999", "123456").await.err().unwrap();
        assert!(matches!(wrong_pin, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert_eq!(wrong_pin.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn login_accepts_any_phone_form() {
        let state = AppState::fake();
        let reg = register(&state, registration("0241234567", "123456")).await.unwrap();
        let s = login(&state, "233241234567", "123456").await.unwrap();
        assert_eq!(s.user.id, reg.user.id);
        assert_eq!(s.user.role, Role::Farmer);
    }

    #[tokio::test]
    async fn me_is_not_found_after_deletion() {
        let state = AppState::fake();
        let reg = register(&state, registration("0241234567", "123456")).await.unwrap();
        assert_eq!(me(&state, reg.user.id).await.unwrap().id, reg.user.id);
        state.users.delete(reg.user.id).await.unwrap();
        assert!(matches!(
            me(&state, reg.user.id).await.err().unwrap(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn forgot_pin_unknown_phone_is_not_found() {
        let state = AppState::fake();
        let err = forgot_pin(&state, "0241234567").await.err().unwrap();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn forgot_pin_overwrites_previous_challenge() {
        let state = AppState::fake();
        register(&state, registration("0241234567", "123456")).await.unwrap();
        let first = forgot_pin(&state, "0241234567").await.unwrap();
        let second = forgot_pin(&state, "0241234567").await.unwrap();

        let (Delivery::Loopback(a), Delivery::Loopback(b)) = (first.delivery, second.delivery)
        else {
            panic!("loopback notifier expected");
        };
        let stored = state.users.find_by_phone("233241234567").await.unwrap().unwrap();
        assert_eq!(stored.otp_code.as_deref(), Some(b.as_str()));
        if a != b {
            let err = reset_pin(&state, "0241234567", &a, "654321").await.err().unwrap();
            assert!(matches!(err, AppError::InvalidOrExpiredOtp));
        }
    }

    #[tokio::test]
    async fn reset_pin_success_clears_challenge_and_swaps_pin() {
        let state = AppState::fake();
        register(&state, registration("0241234567", "123456")).await.unwrap();
        let issued = forgot_pin(&state, "0241234567").await.unwrap();
        let Delivery::Loopback(code) = issued.delivery else {
            panic!("loopback notifier expected");
        };
        let remaining = issued.expires_at - OffsetDateTime::now_utc();
        assert!(remaining > Duration::minutes(4) && remaining <= Duration::minutes(5));

        reset_pin(&state, "233241234567", &code, "654321").await.unwrap();

        let stored = state.users.find_by_phone("233241234567").await.unwrap().unwrap();
        assert!(stored.otp().is_none());
        assert!(login(&state, "0241234567", "123456").await.is_err());
        assert!(login(&state, "0241234567", "654321").await.is_ok());

        // the challenge is single-use
        let err = reset_pin(&state, "0241234567", &code, "111111").await.err().unwrap();
        assert!(matches!(err, AppError::InvalidOrExpiredOtp));
    }

    #[tokio::test]
    async fn reset_pin_rejects_expired_challenge() {
        let state = AppState::fake();
        let reg = register(&state, registration("0241234567", "123456")).await.unwrap();
        state
            .users
            .set_otp(
                reg.user.id,
                &OtpChallenge {
                    code: "482913".into(),
                    expires_at: OffsetDateTime::now_utc() - Duration::seconds(1),
                },
            )
            .await
            .unwrap();
        let err = reset_pin(&state, "0241234567", "482913", "654321").await.err().unwrap();
        assert!(matches!(err, AppError::InvalidOrExpiredOtp));
        assert!(login(&state, "0241234567", "123456").await.is_ok());
    }

    #[tokio::test]
    async fn reset_pin_without_challenge_fails_closed() {
        let state = AppState::fake();
        register(&state, registration("0241234567", "123456")).await.unwrap();
        let err = reset_pin(&state, "0241234567", "", "654321").await.err().unwrap();
        assert!(matches!(err, AppError::InvalidOrExpiredOtp));
    }

    #[tokio::test]
    async fn reset_pin_validates_new_pin_before_consuming_challenge() {
        let state = AppState::fake();
        register(&state, registration("0241234567", "123456")).await.unwrap();
        let Delivery::Loopback(code) = forgot_pin(&state, "0241234567").await.unwrap().delivery
        else {
            panic!("loopback notifier expected");
        };
        let err = reset_pin(&state, "0241234567", &code, "12ab").await.err().unwrap();
        assert!(matches!(err, AppError::Validation(_)));
        reset_pin(&state, "0241234567", &code, "654321").await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_resets_consume_the_challenge_once() {
        let state = AppState::fake_with_users(Arc::new(LaggyLookup::default()));
        register(&state, registration("0241234567", "123456")).await.unwrap();
        let Delivery::Loopback(code) = forgot_pin(&state, "0241234567").await.unwrap().delivery
        else {
            panic!("loopback notifier expected");
        };

        let (first, second) = tokio::join!(
            reset_pin(&state, "0241234567", &code, "111111"),
            reset_pin(&state, "0241234567", &code, "222222"),
        );
        let (winner, loser, rejected) = match (first, second) {
            (Ok(()), Err(e)) => ("111111", "222222", e),
            (Err(e), Ok(())) => ("222222", "111111", e),
            (a, b) => panic!("exactly one reset should win: {:?} {:?}", a.is_ok(), b.is_ok()),
        };
        assert!(matches!(rejected, AppError::InvalidOrExpiredOtp));
        assert!(login(&state, "0241234567", winner).await.is_ok());
        assert!(login(&state, "0241234567", loser).await.is_err());
    }

    #[tokio::test]
    async fn unknown_phone_login_still_runs_a_pin_check() {
        let state = AppState::fake();
        let err = login(&state, "0209999999", "123456").await.err().unwrap();
        assert!(matches!(err, AppError::InvalidCredentials));
    }
}
