use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

use crate::api::extractors::AdminUser;
use crate::db::User;
use crate::error::{conflict_on_unique, AppError, Result};
use crate::services::security::hash_password;
use crate::state::AppState;

/// Create users routes (admin only)
pub fn users_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route(
            "/:user_id",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .with_state(state)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 2, max = 64))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Deserialize)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub username: Option<String>,
    pub role: Option<String>,
}

// ============================================================================
// Endpoint Handlers
// ============================================================================

/// List all users (admin only)
async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    AdminUser(_): AdminUser,
) -> Result<Json<Vec<User>>> {
    let skip = params.skip.unwrap_or(0);
    let limit = params.limit.unwrap_or(100);

    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY id LIMIT ? OFFSET ?")
        .bind(limit)
        .bind(skip)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(users))
}

/// Get user by ID (admin only)
async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    AdminUser(_): AdminUser,
) -> Result<Json<User>> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Create a new user (admin only)
async fn create_user(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Json(data): Json<CreateUser>,
) -> Result<Json<User>> {
    data.validate()?;

    if data.role != "admin" && data.role != "user" {
        return Err(AppError::BadRequest("Invalid role".to_string()));
    }

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
    .bind(&data.role)
    .execute(&state.pool)
    .await
    .map_err(|e| conflict_on_unique(e, "Email already exists"))?
    .last_insert_rowid();

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(user))
}

/// Update user (admin only)
async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    AdminUser(_): AdminUser,
    Json(data): Json<UpdateUser>,
) -> Result<Json<User>> {
    let _: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if let Some(email) = &data.email {
        sqlx::query("UPDATE users SET email = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(email)
            .bind(user_id)
            .execute(&state.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "Email already exists"))?;
    }

    if let Some(username) = &data.username {
        sqlx::query("UPDATE users SET username = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(username)
            .bind(user_id)
            .execute(&state.pool)
            .await?;
    }

    if let Some(role) = &data.role {
        if role != "admin" && role != "user" {
            return Err(AppError::BadRequest("Invalid role".to_string()));
        }
        sqlx::query("UPDATE users SET role = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(role)
            .bind(user_id)
            .execute(&state.pool)
            .await?;
    }

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(user))
}

/// Delete a user (admin only)
async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    AdminUser(admin): AdminUser,
) -> Result<Json<serde_json::Value>> {
    if user_id == admin.id {
        return Err(AppError::BadRequest("Cannot delete yourself".to_string()));
    }

    let _: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({"message": "User deleted"})))
}
