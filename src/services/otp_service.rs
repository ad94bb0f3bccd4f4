use chrono::Utc;
use mongodb::{
    bson::doc,
    Collection, Database,
};
use rand::Rng;

use crate::errors::Result;
use crate::models::otp::{OtpError, OtpRequest, OtpType};

pub enum OtpSendResult {
    Sent(OtpRequest),
    Throttled { wait_seconds: i64 },
}

pub enum OtpVerifyResult {
    Verified,
    Failed(OtpError),
}

#[derive(Clone)]
pub struct OtpService {
    db: Database,
}

impl OtpService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn requests(&self) -> Collection<OtpRequest> {
        self.db.collection("otp_requests")
    }

    // Generate 6-digit OTP
    pub fn generate_code() -> String {
        let mut rng = rand::thread_rng();
        format!("{:06}", rng.gen_range(0..1_000_000))
    }

    /// Issues a fresh OTP request unless a live one for the same email is
    /// still inside the resend cooldown. The caller hands the code to the
    /// email collaborator.
    pub async fn send_otp(&self, email: &str, otp_type: OtpType) -> Result<OtpSendResult> {
        let email = email.trim().to_lowercase();
        let now = Utc::now();

        let latest = self
            .requests()
            .find_one(doc! { "email": &email, "verified": false })
            .sort(doc! { "created_at": -1 })
            .await?;

        if let Some(previous) = latest {
            if let Some(wait_seconds) = previous.resend_wait_seconds(now) {
                tracing::info!("OTP resend throttled for {} ({}s left)", email, wait_seconds);
                return Ok(OtpSendResult::Throttled { wait_seconds });
            }
        }

        let request = OtpRequest::new(&email, &Self::generate_code(), otp_type, now);
        self.requests().insert_one(&request).await?;

        tracing::info!("OTP issued for {} (type {:?})", email, otp_type);
        Ok(OtpSendResult::Sent(request))
    }

    /// Validates a submitted code against the most recent unverified
    /// request for the email. Expired and exhausted requests are terminal;
    /// the caller has to ask for a new code.
    pub async fn verify_otp(&self, email: &str, code: &str) -> Result<OtpVerifyResult> {
        let email = email.trim().to_lowercase();
        let now = Utc::now();

        let request = self
            .requests()
            .find_one(doc! { "email": &email, "verified": false })
            .sort(doc! { "created_at": -1 })
            .await?;

        let Some(request) = request else {
            return Ok(OtpVerifyResult::Failed(OtpError::NotFound));
        };
        let Some(request_id) = request._id else {
            return Ok(OtpVerifyResult::Failed(OtpError::NotFound));
        };

        match request.check_code(code, now) {
            Ok(()) => {
                self.requests()
                    .update_one(
                        doc! { "_id": request_id },
                        doc! { "$set": { "verified": true } },
                    )
                    .await?;
                Ok(OtpVerifyResult::Verified)
            }
            Err(OtpError::Mismatch { attempts_left }) => {
                self.requests()
                    .update_one(
                        doc! { "_id": request_id },
                        doc! { "$inc": { "attempts": 1 } },
                    )
                    .await?;
                Ok(OtpVerifyResult::Failed(OtpError::Mismatch { attempts_left }))
            }
            Err(e) => Ok(OtpVerifyResult::Failed(e)),
        }
    }

    /// True when the email holds a verified, unexpired password-reset
    /// request with a matching code. Gates the actual password update;
    /// the request stays in the collection afterwards.
    pub async fn has_verified_reset(&self, email: &str, code: &str) -> Result<bool> {
        let email = email.trim().to_lowercase();
        let now = Utc::now();

        let request = self
            .requests()
            .find_one(doc! {
                "email": &email,
                "otp_type": "password_reset",
                "verified": true,
                "code": code,
            })
            .sort(doc! { "created_at": -1 })
            .await?;

        Ok(match request {
            Some(request) => !request.is_expired(now),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_ascii_digits() {
        for _ in 0..100 {
            let code = OtpService::generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
