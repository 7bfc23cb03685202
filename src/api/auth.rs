use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::extractors::AuthUser;
use crate::db::User;
use crate::error::{conflict_on_unique, AppError, Result};
use crate::services::security::{create_access_token, hash_password, verify_password};
use crate::state::AppState;

/// Create auth routes
pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .with_state(state)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 2, max = 64))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: User,
}

// ============================================================================
// Endpoint Handlers
// ============================================================================

/// Register a new account. The first registered user becomes the admin.
async fn register(
    State(state): State<AppState>,
    Json(data): Json<RegisterRequest>,
) -> Result<Json<LoginResponse>> {
    data.validate()?;

    let (user_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&state.pool)
        .await?;
    let role = if user_count == 0 { "admin" } else { "user" };

    let hashed = hash_password(&data.password)?;

    let user_id = sqlx::query(
        r#"
        INSERT INTO users (email, username, hashed_password, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, datetime('now'), datetime('now'))
        "#,
    )
    .bind(&data.email)
    .bind(&data.username)
    .bind(&hashed)
    .bind(role)
    .execute(&state.pool)
    .await
    .map_err(|e| conflict_on_unique(e, "Email already registered"))?
    .last_insert_rowid();

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;

    let access_token = create_access_token(user.id, &user.email, &user.role, None)?;

    tracing::info!("User {} registered as {}", user.email, user.role);

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        user,
    }))
}

/// Credentials login. Unknown email and wrong password produce the same
/// message so the endpoint does not leak which accounts exist.
async fn login(
    State(state): State<AppState>,
    Json(data): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&data.email)
        .fetch_optional(&state.pool)
        .await?;

    let user = match user {
        Some(u) if verify_password(&data.password, &u.hashed_password) => u,
        _ => {
            return Err(AppError::Unauthorized(
                "Invalid email or password".to_string(),
            ))
        }
    };

    let access_token = create_access_token(user.id, &user.email, &user.role, None)?;

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        user,
    }))
}

/// Current user info
async fn me(AuthUser(user): AuthUser) -> Result<Json<User>> {
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let ok = RegisterRequest {
            email: "user@example.com".to_string(),
            username: "user".to_string(),
            password: "longenough".to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad_email = RegisterRequest {
            email: "not-an-email".to_string(),
            username: "user".to_string(),
            password: "longenough".to_string(),
        };
        assert!(bad_email.validate().is_err());

        let short_password = RegisterRequest {
            email: "user@example.com".to_string(),
            username: "user".to_string(),
            password: "short".to_string(),
        };
        assert!(short_password.validate().is_err());
    }

    #[test]
    fn test_login_request_deserialize() {
        let json = r#"{"email": "user@example.com", "password": "secret123"}"#;
        let req: LoginRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.email, "user@example.com");
        assert_eq!(req.password, "secret123");
    }
}
