use reqwest::Client;
use serde_json::json;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::models::otp::OtpType;

#[derive(Clone)]
pub struct EmailService {
    api_url: String,
    api_key: String,
    from: String,
    enabled: bool,
    client: Client,
}

impl EmailService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            api_url: config.email_api_url.clone(),
            api_key: config.email_api_key.clone(),
            from: config.email_from.clone(),
            enabled: config.email_enabled(),
            client: Client::new(),
        }
    }

    /// Delivers the OTP code. Fire-and-forget from the caller's
    /// perspective; a delivery failure never fails the send flow.
    pub async fn send_otp_email(&self, to: &str, code: &str, otp_type: OtpType) -> Result<()> {
        if !self.enabled {
            tracing::warn!("EMAIL_API_KEY not set, skipping delivery to {}", to);
            return Ok(());
        }

        let subject = match otp_type {
            OtpType::PasswordReset => "Your password reset code",
            OtpType::EmailVerification => "Verify your email address",
            OtpType::PhoneVerification => "Verify your phone number",
        };
        let text = format!("Your verification code is: {}. Valid for 5 minutes.", code);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": { "email": self.from },
                "to": [{ "email": to }],
                "subject": subject,
                "text": text,
            }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Email API error: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::ExternalApi(format!(
                "Email sending failed with status: {}",
                response.status()
            )))
        }
    }
}
