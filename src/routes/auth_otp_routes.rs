use axum::{
    routing::post,
    Router,
};

use crate::{
    handlers::auth_otp,
    state::AppState,
};

pub fn auth_otp_routes() -> Router<AppState> {
    Router::new()
        // Request an OTP (password reset, email/phone verification)
        .route("/auth/send-otp", post(auth_otp::send_otp))

        // Verify a submitted code
        .route("/auth/verify-otp", post(auth_otp::verify_otp))

        // Reset password with a verified OTP
        .route("/auth/reset-password", post(auth_otp::reset_password))
}
