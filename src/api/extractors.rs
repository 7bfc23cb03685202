use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::db::{DbPool, User};
use crate::error::AppError;
use crate::services::security::decode_token;
use crate::state::AppState;

/// Extractor for authenticated users
pub struct AuthUser(pub User);

/// Extractor for admin users
pub struct AdminUser(pub User);

/// Extractor for optional authentication
pub struct OptionalUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = extract_user_from_token(parts, &state.pool).await?;

        match user {
            Some(u) => Ok(AuthUser(u)),
            None => Err(AppError::Unauthorized("Authentication required".to_string())),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = extract_user_from_token(parts, &state.pool).await?;

        match user {
            Some(u) if u.is_admin() => Ok(AdminUser(u)),
            Some(_) => Err(AppError::Forbidden("Admin access required".to_string())),
            None => Err(AppError::Unauthorized("Authentication required".to_string())),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = extract_user_from_token(parts, &state.pool).await?;
        Ok(OptionalUser(user))
    }
}

/// Extract user from Authorization bearer header or access_token cookie
async fn extract_user_from_token(parts: &Parts, pool: &DbPool) -> Result<Option<User>, AppError> {
    let token = if let Some(auth_header) = parts.headers.get(AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::BadRequest("Invalid authorization header".to_string()))?;

        auth_str.strip_prefix("Bearer ").map(|t| t.to_string())
    } else {
        // Try cookie
        parts
            .headers
            .get(axum::http::header::COOKIE)
            .and_then(|c| c.to_str().ok())
            .and_then(|cookies| {
                cookies.split(';').find_map(|cookie| {
                    cookie
                        .trim()
                        .strip_prefix("access_token=")
                        .map(|v| v.to_string())
                })
            })
    };

    let token = match token {
        Some(t) => t,
        None => return Ok(None),
    };

    // An invalid or expired token reads as anonymous; the extractor decides
    // whether that is a rejection
    let claims = match decode_token(&token) {
        Ok(c) => c,
        Err(_) => return Ok(None),
    };

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(claims.sub.parse::<i64>().unwrap_or(0))
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::Internal(format!("Database error: {}", e)))?;

    Ok(user)
}
