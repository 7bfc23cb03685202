use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::extractors::AdminUser;
use crate::db::Product;
use crate::error::{conflict_on_unique, AppError, Result};
use crate::state::AppState;

/// Create products routes
pub fn products_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/slug/:slug", get(get_product_by_slug))
        .route(
            "/:product_id",
            get(get_product).patch(update_product).delete(delete_product),
        )
        .with_state(state)
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub category_id: Option<i64>,
    pub search: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub slug: String,
    pub title: String,
    pub price: f64,
    pub manufacturer: String,
    #[serde(default)]
    pub in_stock: i64,
    pub main_image: Option<String>,
    pub description: String,
    pub category_id: i64,
    pub merchant_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProduct {
    pub title: Option<String>,
    pub price: Option<f64>,
    pub manufacturer: Option<String>,
    pub in_stock: Option<i64>,
    pub main_image: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub merchant_id: Option<i64>,
}

// ============================================================================
// Helper Functions
// ============================================================================

async fn fetch_product(state: &AppState, product_id: i64) -> Result<Product> {
    sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(product_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
}

async fn ensure_category_exists(state: &AppState, category_id: i64) -> Result<()> {
    let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM categories WHERE id = ?")
        .bind(category_id)
        .fetch_optional(&state.pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::BadRequest(format!(
            "Category {} not found",
            category_id
        )));
    }
    Ok(())
}

// ============================================================================
// Endpoint Handlers
// ============================================================================

/// List products (public), filterable by category and title search
async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Product>>> {
    let skip = params.skip.unwrap_or(0);
    let limit = params.limit.unwrap_or(50);
    let search = params
        .search
        .map(|s| format!("%{}%", s))
        .unwrap_or_else(|| "%".to_string());

    let products: Vec<Product> = match params.category_id {
        Some(category_id) => {
            sqlx::query_as(
                r#"
                SELECT * FROM products
                WHERE category_id = ? AND title LIKE ?
                ORDER BY id LIMIT ? OFFSET ?
                "#,
            )
            .bind(category_id)
            .bind(&search)
            .bind(limit)
            .bind(skip)
            .fetch_all(&state.pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT * FROM products WHERE title LIKE ? ORDER BY id LIMIT ? OFFSET ?",
            )
            .bind(&search)
            .bind(limit)
            .bind(skip)
            .fetch_all(&state.pool)
            .await?
        }
    };

    Ok(Json(products))
}

/// Get product by ID (public)
async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> Result<Json<Product>> {
    Ok(Json(fetch_product(&state, product_id).await?))
}

/// Get product by slug (public)
async fn get_product_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Product>> {
    let product: Product = sqlx::query_as("SELECT * FROM products WHERE slug = ?")
        .bind(&slug)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    Ok(Json(product))
}

/// Create a product (admin only)
async fn create_product(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Json(data): Json<CreateProduct>,
) -> Result<Json<Product>> {
    if data.title.trim().is_empty() || data.slug.trim().is_empty() {
        return Err(AppError::BadRequest(
            "title and slug are required".to_string(),
        ));
    }
    if data.price < 0.0 {
        return Err(AppError::BadRequest(
            "price must not be negative".to_string(),
        ));
    }
    ensure_category_exists(&state, data.category_id).await?;

    let main_image = data
        .main_image
        .unwrap_or_else(|| "product_placeholder.jpg".to_string());

    let product_id = sqlx::query(
        r#"
        INSERT INTO products (slug, title, price, manufacturer, in_stock, main_image, description, category_id, merchant_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'), datetime('now'))
        "#,
    )
    .bind(data.slug.trim())
    .bind(data.title.trim())
    .bind(data.price)
    .bind(&data.manufacturer)
    .bind(data.in_stock)
    .bind(&main_image)
    .bind(&data.description)
    .bind(data.category_id)
    .bind(data.merchant_id)
    .execute(&state.pool)
    .await
    .map_err(|e| conflict_on_unique(e, "Product slug already exists"))?
    .last_insert_rowid();

    Ok(Json(fetch_product(&state, product_id).await?))
}

/// Update a product (admin only)
async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    AdminUser(_): AdminUser,
    Json(data): Json<UpdateProduct>,
) -> Result<Json<Product>> {
    let _ = fetch_product(&state, product_id).await?;

    if let Some(title) = &data.title {
        sqlx::query("UPDATE products SET title = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(title)
            .bind(product_id)
            .execute(&state.pool)
            .await?;
    }

    if let Some(price) = data.price {
        if price < 0.0 {
            return Err(AppError::BadRequest(
                "price must not be negative".to_string(),
            ));
        }
        sqlx::query("UPDATE products SET price = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(price)
            .bind(product_id)
            .execute(&state.pool)
            .await?;
    }

    if let Some(manufacturer) = &data.manufacturer {
        sqlx::query(
            "UPDATE products SET manufacturer = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(manufacturer)
        .bind(product_id)
        .execute(&state.pool)
        .await?;
    }

    if let Some(in_stock) = data.in_stock {
        sqlx::query("UPDATE products SET in_stock = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(in_stock)
            .bind(product_id)
            .execute(&state.pool)
            .await?;
    }

    if let Some(main_image) = &data.main_image {
        sqlx::query(
            "UPDATE products SET main_image = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(main_image)
        .bind(product_id)
        .execute(&state.pool)
        .await?;
    }

    if let Some(description) = &data.description {
        sqlx::query(
            "UPDATE products SET description = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(description)
        .bind(product_id)
        .execute(&state.pool)
        .await?;
    }

    if let Some(category_id) = data.category_id {
        ensure_category_exists(&state, category_id).await?;
        sqlx::query(
            "UPDATE products SET category_id = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(category_id)
        .bind(product_id)
        .execute(&state.pool)
        .await?;
    }

    if let Some(merchant_id) = data.merchant_id {
        sqlx::query(
            "UPDATE products SET merchant_id = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(merchant_id)
        .bind(product_id)
        .execute(&state.pool)
        .await?;
    }

    Ok(Json(fetch_product(&state, product_id).await?))
}

/// Delete a product (admin only). Products referenced by order lines cannot
/// be removed.
async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
    AdminUser(_): AdminUser,
) -> Result<Json<serde_json::Value>> {
    let _ = fetch_product(&state, product_id).await?;

    let (order_refs,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM order_items WHERE product_id = ?")
            .bind(product_id)
            .fetch_one(&state.pool)
            .await?;

    if order_refs > 0 {
        return Err(AppError::Conflict(
            "Product is referenced by existing orders".to_string(),
        ));
    }

    sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(product_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({"message": "Product deleted"})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_product_defaults() {
        let json = r#"{
            "slug": "widget",
            "title": "Widget",
            "price": 9.99,
            "manufacturer": "Acme",
            "description": "A widget",
            "category_id": 1
        }"#;

        let data: CreateProduct = serde_json::from_str(json).unwrap();
        assert_eq!(data.in_stock, 0);
        assert!(data.main_image.is_none());
        assert!(data.merchant_id.is_none());
    }

    #[test]
    fn test_update_product_partial() {
        let json = r#"{"price": 19.99}"#;
        let data: UpdateProduct = serde_json::from_str(json).unwrap();
        assert_eq!(data.price, Some(19.99));
        assert!(data.title.is_none());
    }
}
