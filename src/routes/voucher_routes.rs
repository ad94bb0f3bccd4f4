use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers::vouchers, state::AppState};

/// Routes that work without a bearer token.
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/active", get(vouchers::list_active_vouchers))
}

/// Routes mounted behind the auth middleware (see main.rs).
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/apply", post(vouchers::apply_voucher))
        .route("/", post(vouchers::create_voucher))
}
