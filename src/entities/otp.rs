use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const OTP_TTL_MINUTES: i64 = 10;
pub const OTP_MAX_ATTEMPTS: i64 = 5;
pub const OTP_ALERT_AFTER_FAILURES: i64 = 3;

/// Pickup code handed to the passenger on driver arrival. Only the sha256
/// digest is stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TripOtp {
    pub trip_id: Uuid,
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i64,
    pub verified_at: Option<DateTime<Utc>>,
}

/// What a verification attempt did to the stored state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtpAttempt {
    Verified,
    /// Wrong code; `raise_alert` is set once failures reach the alert bar.
    Mismatch { attempts: i64, raise_alert: bool },
    Expired,
    AttemptsExhausted,
}

pub fn generate_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    code.to_string()
}

pub fn hash_code(code: &str) -> String {
    let digest = Sha256::digest(code.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

impl TripOtp {
    pub fn new(trip_id: Uuid, code: &str) -> Self {
        Self {
            trip_id,
            otp_hash: hash_code(code),
            expires_at: Utc::now() + Duration::minutes(OTP_TTL_MINUTES),
            attempts: 0,
            verified_at: None,
        }
    }

    pub fn verify(&mut self, code: &str, now: DateTime<Utc>) -> OtpAttempt {
        if self.expires_at < now {
            return OtpAttempt::Expired;
        }

        if self.attempts >= OTP_MAX_ATTEMPTS {
            return OtpAttempt::AttemptsExhausted;
        }

        if hash_code(code) != self.otp_hash {
            self.attempts += 1;
            return OtpAttempt::Mismatch {
                attempts: self.attempts,
                raise_alert: self.attempts >= OTP_ALERT_AFTER_FAILURES,
            };
        }

        self.verified_at = Some(now);
        OtpAttempt::Verified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_is_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn correct_code_verifies() {
        let mut otp = TripOtp::new(Uuid::new_v4(), "123456");
        assert_eq!(otp.verify("123456", Utc::now()), OtpAttempt::Verified);
        assert!(otp.verified_at.is_some());
    }

    #[test]
    fn third_mismatch_raises_alert() {
        let mut otp = TripOtp::new(Uuid::new_v4(), "123456");
        let now = Utc::now();

        assert_eq!(
            otp.verify("000000", now),
            OtpAttempt::Mismatch {
                attempts: 1,
                raise_alert: false
            }
        );
        assert_eq!(
            otp.verify("000001", now),
            OtpAttempt::Mismatch {
                attempts: 2,
                raise_alert: false
            }
        );
        assert_eq!(
            otp.verify("000002", now),
            OtpAttempt::Mismatch {
                attempts: 3,
                raise_alert: true
            }
        );
    }

    #[test]
    fn sixth_attempt_rejected_even_when_correct() {
        let mut otp = TripOtp::new(Uuid::new_v4(), "123456");
        let now = Utc::now();

        for _ in 0..5 {
            otp.verify("999999", now);
        }
        assert_eq!(otp.attempts, OTP_MAX_ATTEMPTS);
        assert_eq!(otp.verify("123456", now), OtpAttempt::AttemptsExhausted);
        assert!(otp.verified_at.is_none());
    }

    #[test]
    fn expired_code_is_rejected() {
        let mut otp = TripOtp::new(Uuid::new_v4(), "123456");
        let later = Utc::now() + Duration::minutes(OTP_TTL_MINUTES + 1);
        assert_eq!(otp.verify("123456", later), OtpAttempt::Expired);
    }

    #[test]
    fn hash_is_stable_hex() {
        let h = hash_code("123456");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_code("123456"));
        assert_ne!(h, hash_code("123457"));
    }
}
