use axum::{routing::post, Router};

use crate::{handlers::orders, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(orders::create_order).get(orders::get_user_orders))
}
