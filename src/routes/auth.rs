use axum::{routing::post, Router};

use crate::{handlers::auth, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
}
