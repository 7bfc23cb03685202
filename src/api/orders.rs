use axum::{
    extract::{Path, State},
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::extractors::{AdminUser, AuthUser, OptionalUser};
use crate::config::CONFIG;
use crate::db::{Order, OrderItem};
use crate::error::{AppError, Result};
use crate::services::pricing::compute_totals;
use crate::state::AppState;

pub const ORDER_STATUSES: [&str; 5] =
    ["pending", "processing", "shipped", "delivered", "canceled"];

/// Create orders routes
pub fn orders_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:order_id", get(get_order).delete(delete_order))
        .route("/:order_id/status", patch(update_status))
        .with_state(state)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CheckoutItem {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: String,
    pub city: String,
    pub country: String,
    pub postal_code: Option<String>,
    pub items: Vec<CheckoutItem>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatus {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Allowed status transitions; terminal states cannot be left.
fn transition_allowed(from: &str, to: &str) -> bool {
    match (from, to) {
        ("pending", "processing") | ("pending", "canceled") => true,
        ("processing", "shipped") | ("processing", "canceled") => true,
        ("shipped", "delivered") => true,
        _ => false,
    }
}

async fn fetch_order(state: &AppState, order_id: i64) -> Result<Order> {
    sqlx::query_as("SELECT * FROM orders WHERE id = ?")
        .bind(order_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}

async fn order_with_items(state: &AppState, order: Order) -> Result<OrderResponse> {
    let items: Vec<OrderItem> =
        sqlx::query_as("SELECT * FROM order_items WHERE order_id = ? ORDER BY id")
            .bind(order.id)
            .fetch_all(&state.pool)
            .await?;
    Ok(OrderResponse { order, items })
}

// ============================================================================
// Endpoint Handlers
// ============================================================================

/// Checkout: create an order from a set of product lines. Totals are always
/// computed server-side from current product prices; the unit price is
/// captured on each line so later price edits do not rewrite history.
async fn create_order(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Json(data): Json<CheckoutRequest>,
) -> Result<Json<OrderResponse>> {
    if data.items.is_empty() {
        return Err(AppError::BadRequest("Order has no items".to_string()));
    }
    if data.name.trim().is_empty() || data.email.trim().is_empty() {
        return Err(AppError::BadRequest(
            "name and email are required".to_string(),
        ));
    }
    for item in &data.items {
        if item.quantity <= 0 {
            return Err(AppError::BadRequest(
                "quantity must be positive".to_string(),
            ));
        }
    }

    // Resolve current prices; unknown products fail the whole checkout
    let mut lines: Vec<(i64, f64, i64)> = Vec::with_capacity(data.items.len());
    for item in &data.items {
        let price: Option<(f64,)> = sqlx::query_as("SELECT price FROM products WHERE id = ?")
            .bind(item.product_id)
            .fetch_optional(&state.pool)
            .await?;
        let (price,) = price.ok_or_else(|| {
            AppError::BadRequest(format!("Product {} not found", item.product_id))
        })?;
        lines.push((item.product_id, price, item.quantity));
    }

    let totals = compute_totals(
        &lines.iter().map(|(_, p, q)| (*p, *q)).collect::<Vec<_>>(),
        CONFIG.tax_rate,
        CONFIG.shipping_flat,
    );

    let user_id = user.as_ref().map(|u| u.id);

    let order_id = sqlx::query(
        r#"
        INSERT INTO orders (user_id, name, email, phone, address, city, country, postal_code, status, subtotal, tax, shipping, total, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, datetime('now'), datetime('now'))
        "#,
    )
    .bind(user_id)
    .bind(data.name.trim())
    .bind(data.email.trim())
    .bind(&data.phone)
    .bind(&data.address)
    .bind(&data.city)
    .bind(&data.country)
    .bind(&data.postal_code)
    .bind(totals.subtotal)
    .bind(totals.tax)
    .bind(totals.shipping)
    .bind(totals.total)
    .execute(&state.pool)
    .await?
    .last_insert_rowid();

    for (product_id, price, quantity) in &lines {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, quantity, unit_price) VALUES (?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(product_id)
        .bind(quantity)
        .bind(price)
        .execute(&state.pool)
        .await?;
    }

    // Checkout empties the signed-in buyer's cart
    if let Some(uid) = user_id {
        sqlx::query("DELETE FROM cart_items WHERE user_id = ?")
            .bind(uid)
            .execute(&state.pool)
            .await?;
    }

    tracing::info!("Order {} created ({} lines)", order_id, lines.len());

    let order = fetch_order(&state, order_id).await?;
    Ok(Json(order_with_items(&state, order).await?))
}

/// List orders: admins see everything, users see their own
async fn list_orders(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Order>>> {
    let orders: Vec<Order> = if user.is_admin() {
        sqlx::query_as("SELECT * FROM orders ORDER BY created_at DESC")
            .fetch_all(&state.pool)
            .await?
    } else {
        sqlx::query_as("SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC")
            .bind(user.id)
            .fetch_all(&state.pool)
            .await?
    };

    Ok(Json(orders))
}

/// Get an order with its items (admin or owning user)
async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    AuthUser(user): AuthUser,
) -> Result<Json<OrderResponse>> {
    let order = fetch_order(&state, order_id).await?;

    if !user.is_admin() && order.user_id != Some(user.id) {
        return Err(AppError::Forbidden("Not your order".to_string()));
    }

    Ok(Json(order_with_items(&state, order).await?))
}

/// Update order status (admin only)
async fn update_status(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    AdminUser(_): AdminUser,
    Json(data): Json<UpdateStatus>,
) -> Result<Json<Order>> {
    if !ORDER_STATUSES.contains(&data.status.as_str()) {
        return Err(AppError::BadRequest(format!(
            "Unknown status '{}'",
            data.status
        )));
    }

    let order = fetch_order(&state, order_id).await?;

    if !transition_allowed(&order.status, &data.status) {
        return Err(AppError::Conflict(format!(
            "Cannot move order from '{}' to '{}'",
            order.status, data.status
        )));
    }

    sqlx::query("UPDATE orders SET status = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(&data.status)
        .bind(order_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(fetch_order(&state, order_id).await?))
}

/// Delete an order (admin only); items go with it via cascade
async fn delete_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    AdminUser(_): AdminUser,
) -> Result<Json<serde_json::Value>> {
    let _ = fetch_order(&state, order_id).await?;

    sqlx::query("DELETE FROM order_items WHERE order_id = ?")
        .bind(order_id)
        .execute(&state.pool)
        .await?;
    sqlx::query("DELETE FROM orders WHERE id = ?")
        .bind(order_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({"message": "Order deleted"})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_allowed_happy_path() {
        assert!(transition_allowed("pending", "processing"));
        assert!(transition_allowed("processing", "shipped"));
        assert!(transition_allowed("shipped", "delivered"));
        assert!(transition_allowed("pending", "canceled"));
        assert!(transition_allowed("processing", "canceled"));
    }

    #[test]
    fn test_terminal_states_are_terminal() {
        assert!(!transition_allowed("delivered", "pending"));
        assert!(!transition_allowed("delivered", "canceled"));
        assert!(!transition_allowed("canceled", "pending"));
        assert!(!transition_allowed("canceled", "processing"));
    }

    #[test]
    fn test_no_skipping_states() {
        assert!(!transition_allowed("pending", "shipped"));
        assert!(!transition_allowed("pending", "delivered"));
        assert!(!transition_allowed("shipped", "canceled"));
    }

    #[test]
    fn test_checkout_request_deserialize() {
        let json = r#"{
            "name": "Jane Buyer",
            "email": "jane@example.com",
            "address": "1 Main St",
            "city": "Town",
            "country": "Country",
            "items": [{"product_id": 1, "quantity": 2}]
        }"#;
        let req: CheckoutRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.items.len(), 1);
        assert_eq!(req.items[0].quantity, 2);
        assert!(req.phone.is_none());
    }
}
