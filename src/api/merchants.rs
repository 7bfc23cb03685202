use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

use crate::api::extractors::AdminUser;
use crate::db::Merchant;
use crate::error::{conflict_on_unique, AppError, Result};
use crate::state::AppState;

/// Create merchants routes (admin only)
pub fn merchants_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_merchants).post(create_merchant))
        .route(
            "/:merchant_id",
            get(get_merchant).patch(update_merchant).delete(delete_merchant),
        )
        .with_state(state)
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMerchant {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMerchant {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

// ============================================================================
// Endpoint Handlers
// ============================================================================

async fn list_merchants(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> Result<Json<Vec<Merchant>>> {
    let merchants: Vec<Merchant> = sqlx::query_as("SELECT * FROM merchants ORDER BY name")
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(merchants))
}

async fn get_merchant(
    State(state): State<AppState>,
    Path(merchant_id): Path<i64>,
    AdminUser(_): AdminUser,
) -> Result<Json<Merchant>> {
    let merchant: Merchant = sqlx::query_as("SELECT * FROM merchants WHERE id = ?")
        .bind(merchant_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Merchant not found".to_string()))?;

    Ok(Json(merchant))
}

async fn create_merchant(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Json(data): Json<CreateMerchant>,
) -> Result<Json<Merchant>> {
    data.validate()?;

    let merchant_id = sqlx::query(
        r#"
        INSERT INTO merchants (name, email, phone, address, created_at, updated_at)
        VALUES (?, ?, ?, ?, datetime('now'), datetime('now'))
        "#,
    )
    .bind(&data.name)
    .bind(&data.email)
    .bind(&data.phone)
    .bind(&data.address)
    .execute(&state.pool)
    .await
    .map_err(|e| conflict_on_unique(e, "Merchant email already exists"))?
    .last_insert_rowid();

    let merchant: Merchant = sqlx::query_as("SELECT * FROM merchants WHERE id = ?")
        .bind(merchant_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(merchant))
}

async fn update_merchant(
    State(state): State<AppState>,
    Path(merchant_id): Path<i64>,
    AdminUser(_): AdminUser,
    Json(data): Json<UpdateMerchant>,
) -> Result<Json<Merchant>> {
    let _: Merchant = sqlx::query_as("SELECT * FROM merchants WHERE id = ?")
        .bind(merchant_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Merchant not found".to_string()))?;

    if let Some(name) = &data.name {
        sqlx::query("UPDATE merchants SET name = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(name)
            .bind(merchant_id)
            .execute(&state.pool)
            .await?;
    }

    if let Some(email) = &data.email {
        sqlx::query("UPDATE merchants SET email = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(email)
            .bind(merchant_id)
            .execute(&state.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "Merchant email already exists"))?;
    }

    if let Some(phone) = &data.phone {
        sqlx::query("UPDATE merchants SET phone = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(phone)
            .bind(merchant_id)
            .execute(&state.pool)
            .await?;
    }

    if let Some(address) = &data.address {
        sqlx::query("UPDATE merchants SET address = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(address)
            .bind(merchant_id)
            .execute(&state.pool)
            .await?;
    }

    let merchant: Merchant = sqlx::query_as("SELECT * FROM merchants WHERE id = ?")
        .bind(merchant_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(merchant))
}

async fn delete_merchant(
    State(state): State<AppState>,
    Path(merchant_id): Path<i64>,
    AdminUser(_): AdminUser,
) -> Result<Json<serde_json::Value>> {
    let _: Merchant = sqlx::query_as("SELECT * FROM merchants WHERE id = ?")
        .bind(merchant_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Merchant not found".to_string()))?;

    // Detach products before removing the merchant
    sqlx::query("UPDATE products SET merchant_id = NULL WHERE merchant_id = ?")
        .bind(merchant_id)
        .execute(&state.pool)
        .await?;

    sqlx::query("DELETE FROM merchants WHERE id = ?")
        .bind(merchant_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({"message": "Merchant deleted"})))
}
