use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use bcrypt::{hash, DEFAULT_COST};
use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::Collection;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::otp::{OtpError, OtpType};
use crate::models::user::User;
use crate::services::otp_service::{OtpSendResult, OtpVerifyResult};
use crate::state::AppState;

// Request DTOs
#[derive(Debug, Deserialize, Validate)]
pub struct SendOtpRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub otp_type: OtpType,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, max = 6, message = "OTP must be 6 digits"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, max = 6, message = "OTP must be 6 digits"))]
    pub code: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

// Response DTOs
#[derive(Debug, Serialize)]
pub struct SendOtpResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OtpFlowResponse {
    pub success: bool,
    pub message: String,
}

fn otp_failure_status(error: &OtpError) -> StatusCode {
    match error {
        OtpError::NotFound => StatusCode::NOT_FOUND,
        OtpError::TooManyAttempts | OtpError::Cooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
        OtpError::Expired | OtpError::Mismatch { .. } => StatusCode::BAD_REQUEST,
    }
}

// 1. Send OTP
pub async fn send_otp(
    State(state): State<AppState>,
    Json(req): Json<SendOtpRequest>,
) -> Result<impl IntoResponse> {
    if let Err(errors) = req.validate() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(SendOtpResponse {
                success: false,
                message: format!("Validation error: {}", errors),
                wait_seconds: None,
            }),
        ));
    }

    // Password reset only makes sense for an existing account
    if req.otp_type == OtpType::PasswordReset {
        let users: Collection<User> = state.db.collection("users");
        let email = req.email.trim().to_lowercase();
        let user = users.find_one(doc! { "email": &email }).await?;
        if user.is_none() {
            return Ok((
                StatusCode::NOT_FOUND,
                Json(SendOtpResponse {
                    success: false,
                    message: "No account found for this email".to_string(),
                    wait_seconds: None,
                }),
            ));
        }
    }

    match state.otp_service.send_otp(&req.email, req.otp_type).await? {
        OtpSendResult::Sent(request) => {
            // Delivery is fire-and-forget; a provider hiccup must not
            // surface as an OTP failure.
            if let Err(e) = state
                .email_service
                .send_otp_email(&request.email, &request.code, request.otp_type)
                .await
            {
                tracing::error!("Failed to send OTP email: {}", e);
            }

            Ok((
                StatusCode::OK,
                Json(SendOtpResponse {
                    success: true,
                    message: "Verification code sent to your email".to_string(),
                    wait_seconds: None,
                }),
            ))
        }
        OtpSendResult::Throttled { wait_seconds } => {
            let error = OtpError::Cooldown { wait_seconds };
            Ok((
                otp_failure_status(&error),
                Json(SendOtpResponse {
                    success: false,
                    message: error.message(),
                    wait_seconds: Some(wait_seconds),
                }),
            ))
        }
    }
}

// 2. Verify OTP
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse> {
    if let Err(errors) = req.validate() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(OtpFlowResponse {
                success: false,
                message: format!("Validation error: {}", errors),
            }),
        ));
    }

    match state.otp_service.verify_otp(&req.email, &req.code).await? {
        OtpVerifyResult::Verified => Ok((
            StatusCode::OK,
            Json(OtpFlowResponse {
                success: true,
                message: "Code verified successfully".to_string(),
            }),
        )),
        OtpVerifyResult::Failed(error) => Ok((
            otp_failure_status(&error),
            Json(OtpFlowResponse {
                success: false,
                message: error.message(),
            }),
        )),
    }
}

// 3. Reset password with a verified OTP
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse> {
    if let Err(errors) = req.validate() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(OtpFlowResponse {
                success: false,
                message: format!("Validation error: {}", errors),
            }),
        ));
    }

    let verified = state
        .otp_service
        .has_verified_reset(&req.email, &req.code)
        .await?;
    if !verified {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(OtpFlowResponse {
                success: false,
                message: "Code has not been verified or has expired".to_string(),
            }),
        ));
    }

    let password_hash = hash(&req.new_password, DEFAULT_COST)
        .map_err(|_| AppError::service("Password hashing failed"))?;

    let users: Collection<User> = state.db.collection("users");
    let email = req.email.trim().to_lowercase();
    let now_bson = BsonDateTime::from_millis(chrono::Utc::now().timestamp_millis());

    let result = users
        .update_one(
            doc! { "email": &email },
            doc! {
                "$set": {
                    "password_hash": password_hash,
                    "updated_at": now_bson,
                }
            },
        )
        .await?;

    if result.matched_count == 0 {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(OtpFlowResponse {
                success: false,
                message: "No account found for this email".to_string(),
            }),
        ));
    }

    Ok((
        StatusCode::OK,
        Json(OtpFlowResponse {
            success: true,
            message: "Password reset successful".to_string(),
        }),
    ))
}
