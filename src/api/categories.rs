use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::extractors::AdminUser;
use crate::db::Category;
use crate::error::{conflict_on_unique, AppError, Result};
use crate::state::AppState;

/// Create categories routes
pub fn categories_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route(
            "/:category_id",
            get(get_category)
                .patch(update_category)
                .delete(delete_category),
        )
        .with_state(state)
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CategoryPayload {
    pub name: String,
}

// ============================================================================
// Endpoint Handlers
// ============================================================================

/// List all categories (public)
async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    let categories: Vec<Category> = sqlx::query_as("SELECT * FROM categories ORDER BY name")
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(categories))
}

/// Get category by ID (public)
async fn get_category(
    State(state): State<AppState>,
    Path(category_id): Path<i64>,
) -> Result<Json<Category>> {
    let category: Category = sqlx::query_as("SELECT * FROM categories WHERE id = ?")
        .bind(category_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;

    Ok(Json(category))
}

/// Create a category (admin only)
async fn create_category(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Json(data): Json<CategoryPayload>,
) -> Result<Json<Category>> {
    let name = data.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Category name is required".to_string()));
    }

    let category_id = sqlx::query(
        "INSERT INTO categories (name, created_at, updated_at) VALUES (?, datetime('now'), datetime('now'))",
    )
    .bind(name)
    .execute(&state.pool)
    .await
    .map_err(|e| conflict_on_unique(e, "Category name already exists"))?
    .last_insert_rowid();

    let category: Category = sqlx::query_as("SELECT * FROM categories WHERE id = ?")
        .bind(category_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(category))
}

/// Update a category (admin only)
async fn update_category(
    State(state): State<AppState>,
    Path(category_id): Path<i64>,
    AdminUser(_): AdminUser,
    Json(data): Json<CategoryPayload>,
) -> Result<Json<Category>> {
    let name = data.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Category name is required".to_string()));
    }

    let _: Category = sqlx::query_as("SELECT * FROM categories WHERE id = ?")
        .bind(category_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;

    sqlx::query("UPDATE categories SET name = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(name)
        .bind(category_id)
        .execute(&state.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Category name already exists"))?;

    let category: Category = sqlx::query_as("SELECT * FROM categories WHERE id = ?")
        .bind(category_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(category))
}

/// Delete a category (admin only). Categories that still have products
/// attached cannot be removed.
async fn delete_category(
    State(state): State<AppState>,
    Path(category_id): Path<i64>,
    AdminUser(_): AdminUser,
) -> Result<Json<serde_json::Value>> {
    let _: Category = sqlx::query_as("SELECT * FROM categories WHERE id = ?")
        .bind(category_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;

    let (product_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM products WHERE category_id = ?")
            .bind(category_id)
            .fetch_one(&state.pool)
            .await?;

    if product_count > 0 {
        return Err(AppError::Conflict(format!(
            "Category has {} product(s) attached",
            product_count
        )));
    }

    sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(category_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({"message": "Category deleted"})))
}
