use rand::{rngs::OsRng, Rng};
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};

/// How long a PIN-reset code stays valid.
pub const OTP_TTL: Duration = Duration::minutes(5);

/// Six-digit code from the OS CSPRNG.
pub fn generate() -> String {
    OsRng.gen_range(100_000..1_000_000u32).to_string()
}

pub fn expiration_from_now() -> OffsetDateTime {
    OffsetDateTime::now_utc() + OTP_TTL
}

/// Fails closed when no challenge is stored or the expiry has been reached.
pub fn validate(
    stored_code: Option<&str>,
    stored_expiry: Option<OffsetDateTime>,
    provided: &str,
) -> bool {
    validate_at(stored_code, stored_expiry, provided, OffsetDateTime::now_utc())
}

pub fn validate_at(
    stored_code: Option<&str>,
    stored_expiry: Option<OffsetDateTime>,
    provided: &str,
    now: OffsetDateTime,
) -> bool {
    let (Some(code), Some(expires_at)) = (stored_code, stored_expiry) else {
        return false;
    };
    if now >= expires_at {
        return false;
    }
    // ct_eq on slices of different length is already false
    code.as_bytes().ct_eq(provided.as_bytes()).into()
}
