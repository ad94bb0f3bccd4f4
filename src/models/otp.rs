use chrono::{DateTime, Duration, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson;
use serde::{Deserialize, Serialize};

/// OTP codes live for 5 minutes from issuance.
pub const OTP_TTL_MINUTES: i64 = 5;
/// A request is dead after 5 failed verification attempts.
pub const MAX_VERIFY_ATTEMPTS: i32 = 5;
/// Minimum gap between two send requests for the same email.
pub const RESEND_COOLDOWN_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpType {
    PasswordReset,
    EmailVerification,
    PhoneVerification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpRequest {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub email: String,
    pub code: String,        // 6-digit OTP
    pub otp_type: OtpType,
    pub attempts: i32,       // Failed attempts
    pub verified: bool,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub expires_at: DateTime<Utc>,
}

/// Rule failures for the OTP flow. Returned to the caller as a
/// structured result, never as a transport error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpError {
    NotFound,
    Expired,
    Mismatch { attempts_left: i32 },
    TooManyAttempts,
    Cooldown { wait_seconds: i64 },
}

impl OtpError {
    pub fn message(&self) -> String {
        match self {
            OtpError::NotFound => "No pending verification code found. Request a new one.".to_string(),
            OtpError::Expired => "This code has expired. Request a new one.".to_string(),
            OtpError::Mismatch { attempts_left } => {
                format!("Incorrect code. {} attempt(s) remaining.", attempts_left)
            }
            OtpError::TooManyAttempts => {
                "Too many failed attempts. Request a new code.".to_string()
            }
            OtpError::Cooldown { wait_seconds } => {
                format!("Please wait {} seconds before requesting another code.", wait_seconds)
            }
        }
    }
}

impl OtpRequest {
    pub fn new(email: &str, code: &str, otp_type: OtpType, now: DateTime<Utc>) -> Self {
        Self {
            _id: None,
            email: email.to_lowercase(),
            code: code.to_string(),
            otp_type,
            attempts: 0,
            verified: false,
            created_at: now,
            expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() > self.expires_at.timestamp_millis()
    }

    /// Expiry and attempt-count gates run before the code comparison, so
    /// a dead request never leaks whether the submitted code was right.
    pub fn check_code(&self, code: &str, now: DateTime<Utc>) -> Result<(), OtpError> {
        if self.verified {
            return Err(OtpError::NotFound);
        }
        if self.is_expired(now) {
            return Err(OtpError::Expired);
        }
        if self.attempts >= MAX_VERIFY_ATTEMPTS {
            return Err(OtpError::TooManyAttempts);
        }
        if self.code != code {
            return Err(OtpError::Mismatch {
                attempts_left: MAX_VERIFY_ATTEMPTS - self.attempts - 1,
            });
        }
        Ok(())
    }

    /// Seconds the caller still has to wait before a resend is allowed,
    /// or None when this request no longer blocks a resend.
    pub fn resend_wait_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.verified || self.is_expired(now) {
            return None;
        }
        let elapsed = (now - self.created_at).num_seconds();
        if elapsed < RESEND_COOLDOWN_SECONDS {
            Some(RESEND_COOLDOWN_SECONDS - elapsed)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(now: DateTime<Utc>) -> OtpRequest {
        OtpRequest::new("shopper@example.com", "493027", OtpType::PasswordReset, now)
    }

    #[test]
    fn fresh_request_accepts_matching_code() {
        let now = Utc::now();
        let req = request(now);
        assert_eq!(req.check_code("493027", now), Ok(()));
    }

    #[test]
    fn wrong_code_reports_mismatch_with_remaining_attempts() {
        let now = Utc::now();
        let req = request(now);
        assert_eq!(
            req.check_code("000000", now),
            Err(OtpError::Mismatch { attempts_left: 4 })
        );
    }

    #[test]
    fn expired_request_rejects_even_matching_code() {
        let now = Utc::now();
        let req = request(now);
        let later = now + Duration::minutes(OTP_TTL_MINUTES) + Duration::seconds(1);
        assert_eq!(req.check_code("493027", later), Err(OtpError::Expired));
    }

    #[test]
    fn sixth_attempt_fails_with_too_many_attempts() {
        let now = Utc::now();
        let mut req = request(now);

        // five wrong submissions, attempts incremented after each
        for i in 0..MAX_VERIFY_ATTEMPTS {
            assert_eq!(
                req.check_code("111111", now),
                Err(OtpError::Mismatch {
                    attempts_left: MAX_VERIFY_ATTEMPTS - i - 1
                })
            );
            req.attempts += 1;
        }

        assert_eq!(req.check_code("111111", now), Err(OtpError::TooManyAttempts));
        // the right code no longer helps either
        assert_eq!(req.check_code("493027", now), Err(OtpError::TooManyAttempts));
    }

    #[test]
    fn verified_request_is_single_use() {
        let now = Utc::now();
        let mut req = request(now);
        assert_eq!(req.check_code("493027", now), Ok(()));
        req.verified = true;
        assert_eq!(req.check_code("493027", now), Err(OtpError::NotFound));
    }

    #[test]
    fn resend_blocked_inside_cooldown_window() {
        let now = Utc::now();
        let req = request(now);
        assert_eq!(
            req.resend_wait_seconds(now + Duration::seconds(15)),
            Some(RESEND_COOLDOWN_SECONDS - 15)
        );
        assert_eq!(
            req.resend_wait_seconds(now + Duration::seconds(RESEND_COOLDOWN_SECONDS)),
            None
        );
    }

    #[test]
    fn expired_request_does_not_block_resend() {
        let now = Utc::now();
        let req = request(now);
        let later = now + Duration::minutes(OTP_TTL_MINUTES + 1);
        assert_eq!(req.resend_wait_seconds(later), None);
    }
}
