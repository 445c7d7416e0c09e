//! Six-digit email verification codes.
//!
//! A code is single-use and expires a fixed window after issue. The window
//! is clamped to 10..=15 minutes whatever the configuration says.

use std::fmt;

use atelier_schemas::{normalize_email, CodePurpose, VerificationCode};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use uuid::Uuid;

pub const CODE_LEN: usize = 6;
pub const MIN_TTL_MINUTES: i64 = 10;
pub const MAX_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    AlreadyUsed,
    TooManyAttempts,
    Expired,
    Mismatch,
}

impl VerifyError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            VerifyError::AlreadyUsed => "code_already_used",
            VerifyError::TooManyAttempts => "code_attempts_exhausted",
            VerifyError::Expired => "code_expired",
            VerifyError::Mismatch => "code_mismatch",
        }
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VerifyError::AlreadyUsed => "verification code already used",
            VerifyError::TooManyAttempts => "too many attempts; request a new code",
            VerifyError::Expired => "verification code expired",
            VerifyError::Mismatch => "verification code does not match",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for VerifyError {}

/// A uniformly random code, zero padded to six digits.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let n: u32 = rng.random_range(0..1_000_000);
    format!("{n:06}")
}

pub fn clamp_ttl_minutes(minutes: i64) -> i64 {
    minutes.clamp(MIN_TTL_MINUTES, MAX_TTL_MINUTES)
}

/// Builds a fresh code record for `email`.
pub fn issue(email: &str, purpose: CodePurpose, ttl_minutes: i64, now: DateTime<Utc>) -> VerificationCode {
    issue_with(&mut rand::rng(), email, purpose, ttl_minutes, now)
}

pub fn issue_with<R: Rng + ?Sized>(
    rng: &mut R,
    email: &str,
    purpose: CodePurpose,
    ttl_minutes: i64,
    now: DateTime<Utc>,
) -> VerificationCode {
    VerificationCode {
        id: Uuid::new_v4(),
        subject: normalize_email(email),
        purpose,
        code: generate_code(rng),
        expires_at_utc: now + Duration::minutes(clamp_ttl_minutes(ttl_minutes)),
        used: false,
        attempts: 0,
        created_at_utc: now,
    }
}

/// Checks a presented code against the stored record.
///
/// The caller records a failed attempt on [`VerifyError::Mismatch`] and
/// consumes the record on success.
pub fn check(
    record: &VerificationCode,
    presented: &str,
    now: DateTime<Utc>,
    max_attempts: i32,
) -> Result<(), VerifyError> {
    if record.used {
        return Err(VerifyError::AlreadyUsed);
    }
    if record.attempts >= max_attempts {
        return Err(VerifyError::TooManyAttempts);
    }
    if now >= record.expires_at_utc {
        return Err(VerifyError::Expired);
    }
    if !constant_time_eq(record.code.as_bytes(), presented.trim().as_bytes()) {
        return Err(VerifyError::Mismatch);
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn codes_are_six_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let c = generate_code(&mut rng);
            assert_eq!(c.len(), CODE_LEN);
            assert!(c.bytes().all(|b| b.is_ascii_digit()), "{c}");
        }
    }

    #[test]
    fn ttl_is_clamped_into_window() {
        let now = Utc::now();
        let short = issue("a@b.c", CodePurpose::ArtisanEmail, 1, now);
        assert_eq!(short.expires_at_utc - now, Duration::minutes(10));
        let long = issue("a@b.c", CodePurpose::ArtisanEmail, 90, now);
        assert_eq!(long.expires_at_utc - now, Duration::minutes(15));
    }

    #[test]
    fn subject_is_normalised() {
        let rec = issue("  Maker@Example.COM ", CodePurpose::ArtisanEmail, 10, Utc::now());
        assert_eq!(rec.subject, "maker@example.com");
    }

    #[test]
    fn check_order_of_failures() {
        let now = Utc::now();
        let mut rec = issue("a@b.c", CodePurpose::CustomerEmail, 10, now);
        rec.code = "042917".to_string();

        assert_eq!(check(&rec, "042917", now, 5), Ok(()));
        assert_eq!(check(&rec, " 042917 ", now, 5), Ok(()));
        assert_eq!(check(&rec, "42917", now, 5), Err(VerifyError::Mismatch));
        assert_eq!(
            check(&rec, "042917", now + Duration::minutes(10), 5),
            Err(VerifyError::Expired)
        );

        rec.attempts = 5;
        assert_eq!(check(&rec, "042917", now, 5), Err(VerifyError::TooManyAttempts));

        rec.used = true;
        assert_eq!(check(&rec, "042917", now, 5), Err(VerifyError::AlreadyUsed));
    }
}
