use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::api::extractors::AuthUser;
use crate::config::CONFIG;
use crate::db::DbPool;
use crate::error::{AppError, Result};
use crate::services::pricing::{compute_totals, round_cents, Totals};
use crate::state::AppState;

/// Create cart routes (authenticated)
pub fn cart_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route(
            "/items/:product_id",
            delete(remove_item).patch(set_quantity),
        )
        .with_state(state)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AddItem {
    pub product_id: i64,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct SetQuantity {
    pub quantity: i64,
}

#[derive(Debug, FromRow, Serialize)]
pub struct CartLine {
    pub product_id: i64,
    pub slug: String,
    pub title: String,
    pub price: f64,
    pub main_image: String,
    pub quantity: i64,
    // Not selected; filled in after the fetch
    #[sqlx(default)]
    pub line_total: f64,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub items: Vec<CartLine>,
    pub totals: Totals,
}

// ============================================================================
// Helper Functions
// ============================================================================

async fn load_cart(pool: &DbPool, user_id: i64) -> Result<CartResponse> {
    let mut items: Vec<CartLine> = sqlx::query_as(
        r#"
        SELECT p.id AS product_id, p.slug, p.title, p.price, p.main_image, c.quantity
        FROM cart_items c
        INNER JOIN products p ON p.id = c.product_id
        WHERE c.user_id = ?
        ORDER BY c.added_at
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    for item in &mut items {
        item.line_total = round_cents(item.price * item.quantity as f64);
    }

    let lines: Vec<(f64, i64)> = items.iter().map(|i| (i.price, i.quantity)).collect();
    let totals = compute_totals(&lines, CONFIG.tax_rate, CONFIG.shipping_flat);

    Ok(CartResponse { items, totals })
}

// ============================================================================
// Endpoint Handlers
// ============================================================================

/// Current cart contents with computed totals
async fn get_cart(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<CartResponse>> {
    Ok(Json(load_cart(&state.pool, user.id).await?))
}

/// Add a product to the cart; adding an existing line increments its quantity
async fn add_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(data): Json<AddItem>,
) -> Result<Json<CartResponse>> {
    if data.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be positive".to_string(),
        ));
    }

    let product: Option<(i64,)> = sqlx::query_as("SELECT id FROM products WHERE id = ?")
        .bind(data.product_id)
        .fetch_optional(&state.pool)
        .await?;
    if product.is_none() {
        return Err(AppError::NotFound("Product not found".to_string()));
    }

    sqlx::query(
        r#"
        INSERT INTO cart_items (user_id, product_id, quantity, added_at)
        VALUES (?, ?, ?, datetime('now'))
        ON CONFLICT(user_id, product_id)
        DO UPDATE SET quantity = quantity + excluded.quantity
        "#,
    )
    .bind(user.id)
    .bind(data.product_id)
    .bind(data.quantity)
    .execute(&state.pool)
    .await?;

    Ok(Json(load_cart(&state.pool, user.id).await?))
}

/// Set the quantity of a cart line
async fn set_quantity(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    AuthUser(user): AuthUser,
    Json(data): Json<SetQuantity>,
) -> Result<Json<CartResponse>> {
    if data.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be positive".to_string(),
        ));
    }

    let result = sqlx::query(
        "UPDATE cart_items SET quantity = ? WHERE user_id = ? AND product_id = ?",
    )
    .bind(data.quantity)
    .bind(user.id)
    .bind(product_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Cart item not found".to_string()));
    }

    Ok(Json(load_cart(&state.pool, user.id).await?))
}

/// Remove one cart line
async fn remove_item(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    AuthUser(user): AuthUser,
) -> Result<Json<CartResponse>> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = ? AND product_id = ?")
        .bind(user.id)
        .bind(product_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(load_cart(&state.pool, user.id).await?))
}

/// Clear the cart
async fn clear_cart(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<CartResponse>> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = ?")
        .bind(user.id)
        .execute(&state.pool)
        .await?;

    Ok(Json(load_cart(&state.pool, user.id).await?))
}
