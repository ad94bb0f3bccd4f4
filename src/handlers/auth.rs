use axum::{extract::State, response::Json};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use mongodb::bson::doc;
use mongodb::Collection;
use serde::Deserialize;
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::user::{AuthResponse, Claims, User, UserResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
    pub username: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub password: String,
}

fn issue_token(user: &User, jwt_secret: &str) -> Result<String> {
    let user_id = user._id.ok_or(AppError::DocumentNotFound)?;

    let claims = Claims {
        sub: user_id.to_hex(),
        email: user.email.clone(),
        exp: (Utc::now().timestamp() + 86400) as usize, // 24 hours
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_ref()),
    )
    .map_err(|_| AppError::AuthError)
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let collection: Collection<User> = state.db.collection("users");

    let email = payload.email.trim().to_lowercase();

    // Check if user exists by email or username
    let filter = doc! {
        "$or": [
            { "email": &email },
            { "username": &payload.username }
        ]
    };
    let existing_user = collection.find_one(filter).await?;
    if existing_user.is_some() {
        return Err(AppError::DuplicateKey);
    }

    let password_hash = hash(&payload.password, DEFAULT_COST)
        .map_err(|_| AppError::service("Password hashing failed"))?;

    let mut user = User {
        _id: None,
        email,
        username: payload.username.clone(),
        password_hash,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let insert_result = collection.insert_one(&user).await?;
    user._id = insert_result.inserted_id.as_object_id();

    let token = issue_token(&user, &state.jwt_secret)?;
    let user_id = user._id.ok_or(AppError::DocumentNotFound)?;

    Ok(Json(AuthResponse {
        user: UserResponse {
            id: user_id.to_hex(),
            email: user.email,
            username: user.username,
        },
        token,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let collection: Collection<User> = state.db.collection("users");

    let email = payload.email.trim().to_lowercase();
    let user = collection
        .find_one(doc! { "email": &email })
        .await?
        .ok_or(AppError::AuthError)?;

    let valid = verify(&payload.password, &user.password_hash)
        .map_err(|_| AppError::AuthError)?;
    if !valid {
        return Err(AppError::AuthError);
    }

    let token = issue_token(&user, &state.jwt_secret)?;
    let user_id = user._id.ok_or(AppError::DocumentNotFound)?;

    Ok(Json(AuthResponse {
        user: UserResponse {
            id: user_id.to_hex(),
            email: user.email,
            username: user.username,
        },
        token,
    }))
}
