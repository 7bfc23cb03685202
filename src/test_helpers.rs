//! Test helpers and utilities for unit and integration testing.
//!
//! Provides an in-memory SQLite pool with the full schema applied plus
//! fixture builders for users, products and orders.

use sqlx::sqlite::SqlitePoolOptions;

use crate::db::{DbPool, User, SCHEMA_SQL};
use crate::services::security::hash_password;

/// Create an in-memory SQLite database for testing.
///
/// The pool is pinned to a single connection: every `sqlite::memory:`
/// connection is its own database, so the schema must live on the one
/// connection all queries share.
pub async fn create_test_pool() -> DbPool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    sqlx::raw_sql(SCHEMA_SQL)
        .execute(&pool)
        .await
        .expect("Failed to run test migrations");

    seed_test_categories(&pool).await;

    pool
}

/// Seed a couple of categories so CSV rows and products have something to
/// reference. Ids are 1 and 2.
pub async fn seed_test_categories(pool: &DbPool) {
    for name in ["speakers", "cameras"] {
        sqlx::query(
            "INSERT INTO categories (name, created_at, updated_at) VALUES (?, datetime('now'), datetime('now'))",
        )
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
    }
}

/// Create a test user and return the row
pub async fn create_test_user(pool: &DbPool, email: &str, password: &str, role: &str) -> User {
    let hashed = hash_password(password).unwrap();
    let username = email.split('@').next().unwrap_or(email);

    let id = sqlx::query(
        r#"
        INSERT INTO users (email, username, hashed_password, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, datetime('now'), datetime('now'))
        "#,
    )
    .bind(email)
    .bind(username)
    .bind(&hashed)
    .bind(role)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid();

    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Insert a product directly and return its id
pub async fn create_test_product(pool: &DbPool, slug: &str, price: f64, category_id: i64) -> i64 {
    sqlx::query(
        r#"
        INSERT INTO products (slug, title, price, manufacturer, in_stock, description, category_id, created_at, updated_at)
        VALUES (?, ?, ?, 'TestCo', 10, 'test product', ?, datetime('now'), datetime('now'))
        "#,
    )
    .bind(slug)
    .bind(slug)
    .bind(price)
    .bind(category_id)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

/// Insert a minimal order with a single line referencing the given product,
/// returning the order id.
pub async fn insert_test_order_with_product(pool: &DbPool, product_id: i64) -> i64 {
    let order_id = sqlx::query(
        r#"
        INSERT INTO orders (name, email, address, city, country, status, subtotal, tax, shipping, total, created_at, updated_at)
        VALUES ('Test Buyer', 'buyer@example.com', '1 Main St', 'Town', 'Country', 'pending', 10.0, 2.0, 5.0, 17.0, datetime('now'), datetime('now'))
        "#,
    )
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid();

    sqlx::query(
        "INSERT INTO order_items (order_id, product_id, quantity, unit_price) VALUES (?, ?, 1, 10.0)",
    )
    .bind(order_id)
    .bind(product_id)
    .execute(pool)
    .await
    .unwrap();

    order_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_pool() {
        let pool = create_test_pool().await;
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn test_create_test_user() {
        let pool = create_test_pool().await;
        let user = create_test_user(&pool, "test@example.com", "password123", "admin").await;

        assert_eq!(user.email, "test@example.com");
        assert_eq!(user.username, "test");
        assert!(user.is_admin());
    }

    #[tokio::test]
    async fn test_create_test_product_and_order() {
        let pool = create_test_pool().await;
        let product_id = create_test_product(&pool, "widget", 10.0, 1).await;
        let order_id = insert_test_order_with_product(&pool, product_id).await;

        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM order_items WHERE order_id = ?")
            .bind(order_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(n, 1);
    }
}
