use serde::Serialize;

use crate::db::DbPool;
use crate::error::{AppError, Result};

/// Expected CSV header columns, in template order.
pub const CSV_COLUMNS: [&str; 8] = [
    "title",
    "price",
    "manufacturer",
    "inStock",
    "mainImage",
    "description",
    "slug",
    "categoryId",
];

/// Stored error messages are capped so a pathological file cannot bloat the
/// batch row; counts remain exact.
const MAX_STORED_ERRORS: usize = 50;

const DEFAULT_MAIN_IMAGE: &str = "product_placeholder.jpg";

/// Downloadable CSV template: header plus two example rows.
pub const CSV_TEMPLATE: &str = "\
title,price,manufacturer,inStock,mainImage,description,slug,categoryId
Wireless Speaker X200,79.99,Soundwave,12,speaker-x200.jpg,Portable bluetooth speaker with 12h battery,wireless-speaker-x200,1
Studio Headphones Pro,149.5,AudioLab,5,,Closed-back over-ear studio headphones,studio-headphones-pro,2
";

/// Outcome of one CSV ingestion pass.
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub processed: i64,
    pub successful: i64,
    pub failed: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Outcome of a batch deletion.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub deleted_products: i64,
    /// Slugs of batch-created products left in place because an order
    /// references them.
    pub skipped_products: Vec<String>,
}

/// One parsed-and-validated CSV row, ready for insertion.
struct ProductRow {
    title: String,
    price: f64,
    manufacturer: String,
    in_stock: i64,
    main_image: String,
    description: String,
    slug: String,
    category_id: i64,
}

/// Process an uploaded CSV file: parse rows, validate each independently,
/// insert the valid ones attributed to a new batch, and return the batch id
/// with its summary.
///
/// A malformed row never aborts the batch; it is counted as failed with a
/// message naming the row and the problem. Only an unreadable header or a
/// missing column is fatal, in which case no batch row is recorded.
pub async fn process_csv(
    pool: &DbPool,
    file_name: &str,
    uploaded_by: &str,
    data: &[u8],
) -> Result<(i64, IngestSummary)> {
    let text = std::str::from_utf8(data)
        .map_err(|_| AppError::BadRequest("CSV file is not valid UTF-8".to_string()))?;

    // Strip UTF-8 BOM if present
    let text = text.trim_start_matches('\u{FEFF}');

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AppError::BadRequest(format!("Failed to read CSV headers: {}", e)))?
        .clone();

    let missing: Vec<&str> = CSV_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h.trim() == **col))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(AppError::BadRequest(format!(
            "CSV is missing required column(s): {}",
            missing.join(", ")
        )));
    }

    // Read everything up front so the batch row can carry its total before
    // the insert loop runs. Files are capped at the request layer.
    let records: Vec<_> = reader.records().collect();
    let total = records.len() as i64;

    let batch_id = sqlx::query(
        r#"
        INSERT INTO upload_batches (file_name, total_records, successful_records, failed_records, errors, uploaded_by, uploaded_at)
        VALUES (?, ?, 0, 0, '[]', ?, datetime('now'))
        "#,
    )
    .bind(file_name)
    .bind(total)
    .bind(uploaded_by)
    .execute(pool)
    .await?
    .last_insert_rowid();

    let mut successful = 0i64;
    let mut failed = 0i64;
    let mut errors: Vec<String> = Vec::new();

    for (idx, result) in records.into_iter().enumerate() {
        let row_num = idx + 1;

        let outcome = match result {
            Ok(record) => {
                match validate_row(&headers, &record, row_num) {
                    Ok(row) => insert_row(pool, batch_id, &row, row_num).await,
                    Err(msg) => Err(msg),
                }
            }
            Err(e) => Err(format!("Row {}: malformed CSV record ({})", row_num, e)),
        };

        match outcome {
            Ok(()) => successful += 1,
            Err(msg) => {
                failed += 1;
                if errors.len() < MAX_STORED_ERRORS {
                    errors.push(msg);
                }
            }
        }
    }

    let errors_json = serde_json::to_string(&errors)?;
    sqlx::query(
        "UPDATE upload_batches SET successful_records = ?, failed_records = ?, errors = ? WHERE id = ?",
    )
    .bind(successful)
    .bind(failed)
    .bind(&errors_json)
    .bind(batch_id)
    .execute(pool)
    .await?;

    tracing::info!(
        "Batch {} ({}): {} rows, {} ok, {} failed",
        batch_id,
        file_name,
        total,
        successful,
        failed
    );

    Ok((
        batch_id,
        IngestSummary {
            processed: total,
            successful,
            failed,
            errors,
        },
    ))
}

/// Validate one CSV record against the product schema.
fn validate_row(
    headers: &csv::StringRecord,
    record: &csv::StringRecord,
    row_num: usize,
) -> std::result::Result<ProductRow, String> {
    // Field access by header name; empty cells read as None
    let get_field = |name: &str| -> Option<&str> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let require = |name: &str| -> std::result::Result<String, String> {
        get_field(name)
            .map(str::to_string)
            .ok_or_else(|| format!("Row {}: {} is required", row_num, name))
    };

    let title = require("title")?;
    let manufacturer = require("manufacturer")?;
    let description = require("description")?;
    let slug = require("slug")?;

    let price_raw = require("price")?;
    let price: f64 = price_raw
        .parse()
        .map_err(|_| format!("Row {}: price must be a number", row_num))?;
    if price < 0.0 {
        return Err(format!("Row {}: price must not be negative", row_num));
    }

    let in_stock = match get_field("inStock") {
        Some(v) => {
            let n: i64 = v
                .parse()
                .map_err(|_| format!("Row {}: inStock must be an integer", row_num))?;
            if n < 0 {
                return Err(format!("Row {}: inStock must not be negative", row_num));
            }
            n
        }
        None => 0,
    };

    let main_image = get_field("mainImage")
        .unwrap_or(DEFAULT_MAIN_IMAGE)
        .to_string();

    let category_raw = require("categoryId")?;
    let category_id: i64 = category_raw
        .parse()
        .map_err(|_| format!("Row {}: categoryId must be an integer", row_num))?;

    Ok(ProductRow {
        title,
        price,
        manufacturer,
        in_stock,
        main_image,
        description,
        slug,
        category_id,
    })
}

/// Insert one validated row, mapping referential and uniqueness problems back
/// to row-level failures.
async fn insert_row(
    pool: &DbPool,
    batch_id: i64,
    row: &ProductRow,
    row_num: usize,
) -> std::result::Result<(), String> {
    let category: Option<(i64,)> = sqlx::query_as("SELECT id FROM categories WHERE id = ?")
        .bind(row.category_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| format!("Row {}: database error ({})", row_num, e))?;

    if category.is_none() {
        return Err(format!(
            "Row {}: category {} not found",
            row_num, row.category_id
        ));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO products (slug, title, price, manufacturer, in_stock, main_image, description, category_id, batch_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'), datetime('now'))
        "#,
    )
    .bind(&row.slug)
    .bind(&row.title)
    .bind(row.price)
    .bind(&row.manufacturer)
    .bind(row.in_stock)
    .bind(&row.main_image)
    .bind(&row.description)
    .bind(row.category_id)
    .bind(batch_id)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db)) if db.message().contains("UNIQUE constraint failed") => {
            Err(format!("Row {}: slug '{}' already exists", row_num, row.slug))
        }
        Err(e) => Err(format!("Row {}: database error ({})", row_num, e)),
    }
}

/// Delete a batch record, optionally cascading to the products it created.
///
/// Products referenced by an order line are exempt from the cascade and are
/// reported back by slug rather than silently skipped.
pub async fn delete_batch(
    pool: &DbPool,
    batch_id: i64,
    delete_products: bool,
) -> Result<DeleteOutcome> {
    let batch: Option<(i64,)> = sqlx::query_as("SELECT id FROM upload_batches WHERE id = ?")
        .bind(batch_id)
        .fetch_optional(pool)
        .await?;

    if batch.is_none() {
        return Err(AppError::NotFound("Batch not found".to_string()));
    }

    let mut deleted_products = 0i64;
    let mut skipped_products = Vec::new();

    if delete_products {
        let skipped: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT p.slug FROM products p
            WHERE p.batch_id = ?
              AND EXISTS (SELECT 1 FROM order_items oi WHERE oi.product_id = p.id)
            ORDER BY p.slug
            "#,
        )
        .bind(batch_id)
        .fetch_all(pool)
        .await?;
        skipped_products = skipped.into_iter().map(|(slug,)| slug).collect();

        let result = sqlx::query(
            r#"
            DELETE FROM products
            WHERE batch_id = ?
              AND NOT EXISTS (SELECT 1 FROM order_items oi WHERE oi.product_id = products.id)
            "#,
        )
        .bind(batch_id)
        .execute(pool)
        .await?;
        deleted_products = result.rows_affected() as i64;
    }

    sqlx::query("DELETE FROM upload_batches WHERE id = ?")
        .bind(batch_id)
        .execute(pool)
        .await?;

    tracing::info!(
        "Batch {} deleted ({} products removed, {} skipped)",
        batch_id,
        deleted_products,
        skipped_products.len()
    );

    Ok(DeleteOutcome {
        deleted_products,
        skipped_products,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BatchStatus, UploadBatch};
    use crate::test_helpers::{create_test_pool, insert_test_order_with_product};

    async fn fetch_batch(pool: &DbPool, id: i64) -> UploadBatch {
        sqlx::query_as("SELECT * FROM upload_batches WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn product_count(pool: &DbPool) -> i64 {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
            .fetch_one(pool)
            .await
            .unwrap();
        n
    }

    // ==========================================================================
    // Processing Tests
    // ==========================================================================

    #[tokio::test]
    async fn test_all_valid_rows() {
        let pool = create_test_pool().await;
        let csv = "\
title,price,manufacturer,inStock,mainImage,description,slug,categoryId
Speaker,79.99,Soundwave,12,speaker.jpg,A speaker,speaker,1
Headphones,149.5,AudioLab,5,,Headphones,headphones,1
Camera,300,Optix,2,camera.jpg,A camera,camera,2
";
        let (batch_id, summary) = process_csv(&pool, "products.csv", "admin", csv.as_bytes())
            .await
            .unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.successful, 3);
        assert_eq!(summary.failed, 0);
        assert!(summary.errors.is_empty());
        assert_eq!(product_count(&pool).await, 3);

        let batch = fetch_batch(&pool, batch_id).await;
        assert_eq!(batch.status(), BatchStatus::Completed);
        assert_eq!(batch.uploaded_by, "admin");
        assert_eq!(batch.file_name, "products.csv");
    }

    #[tokio::test]
    async fn test_all_invalid_rows() {
        let pool = create_test_pool().await;
        let csv = "\
title,price,manufacturer,inStock,mainImage,description,slug,categoryId
,79.99,Soundwave,12,,A speaker,speaker,1
Headphones,not-a-price,AudioLab,5,,Headphones,headphones,1
";
        let (batch_id, summary) = process_csv(&pool, "bad.csv", "admin", csv.as_bytes())
            .await
            .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.successful, 0);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.errors.len(), 2);
        assert_eq!(product_count(&pool).await, 0);
        assert_eq!(fetch_batch(&pool, batch_id).await.status(), BatchStatus::Failed);
    }

    #[tokio::test]
    async fn test_mixed_rows_partial_status() {
        let pool = create_test_pool().await;
        let csv = "\
title,price,manufacturer,inStock,mainImage,description,slug,categoryId
Speaker,79.99,Soundwave,12,,A speaker,speaker,1
Headphones,-5,AudioLab,5,,Headphones,headphones,1
Camera,300,Optix,2,,A camera,camera,999
";
        let (batch_id, summary) = process_csv(&pool, "mixed.csv", "admin", csv.as_bytes())
            .await
            .unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 2);
        // Exactly one error entry per failed row
        assert_eq!(summary.errors.len(), 2);
        assert!(summary.errors[0].contains("Row 2"));
        assert!(summary.errors[1].contains("Row 3: category 999 not found"));
        assert_eq!(fetch_batch(&pool, batch_id).await.status(), BatchStatus::Partial);
    }

    #[tokio::test]
    async fn test_two_row_example_from_missing_title() {
        let pool = create_test_pool().await;
        let csv = "\
title,price,manufacturer,inStock,mainImage,description,slug,categoryId
Speaker,79.99,Soundwave,12,,A speaker,speaker,1
,49.99,Soundwave,3,,Small speaker,speaker-mini,1
";
        let (_, summary) = process_csv(&pool, "two.csv", "admin", csv.as_bytes())
            .await
            .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors, vec!["Row 2: title is required"]);
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_row_failure() {
        let pool = create_test_pool().await;
        let csv = "\
title,price,manufacturer,inStock,mainImage,description,slug,categoryId
Speaker,79.99,Soundwave,12,,A speaker,speaker,1
Speaker Again,89.99,Soundwave,4,,Same slug,speaker,1
";
        let (_, summary) = process_csv(&pool, "dup.csv", "admin", csv.as_bytes())
            .await
            .unwrap();

        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors, vec!["Row 2: slug 'speaker' already exists"]);
    }

    #[tokio::test]
    async fn test_defaults_applied_for_optional_fields() {
        let pool = create_test_pool().await;
        let csv = "\
title,price,manufacturer,inStock,mainImage,description,slug,categoryId
Speaker,79.99,Soundwave,,,A speaker,speaker,1
";
        let (_, summary) = process_csv(&pool, "defaults.csv", "admin", csv.as_bytes())
            .await
            .unwrap();
        assert_eq!(summary.successful, 1);

        let (in_stock, main_image): (i64, String) =
            sqlx::query_as("SELECT in_stock, main_image FROM products WHERE slug = 'speaker'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(in_stock, 0);
        assert_eq!(main_image, "product_placeholder.jpg");
    }

    #[tokio::test]
    async fn test_bom_is_tolerated() {
        let pool = create_test_pool().await;
        let csv = "\u{FEFF}title,price,manufacturer,inStock,mainImage,description,slug,categoryId\nSpeaker,79.99,Soundwave,1,,A speaker,speaker,1\n";
        let (_, summary) = process_csv(&pool, "bom.csv", "admin", csv.as_bytes())
            .await
            .unwrap();
        assert_eq!(summary.successful, 1);
    }

    #[tokio::test]
    async fn test_missing_column_is_fatal_and_records_no_batch() {
        let pool = create_test_pool().await;
        let csv = "title,price,manufacturer\nSpeaker,79.99,Soundwave\n";
        let err = process_csv(&pool, "short.csv", "admin", csv.as_bytes())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing required column"));

        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM upload_batches")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_headers_only_file_is_empty_completed_batch() {
        let pool = create_test_pool().await;
        let csv = "title,price,manufacturer,inStock,mainImage,description,slug,categoryId\n";
        let (batch_id, summary) = process_csv(&pool, "empty.csv", "admin", csv.as_bytes())
            .await
            .unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(fetch_batch(&pool, batch_id).await.status(), BatchStatus::Completed);
        assert_eq!(fetch_batch(&pool, batch_id).await.success_rate(), 0);
    }

    #[tokio::test]
    async fn test_error_list_is_capped_but_counts_exact() {
        let pool = create_test_pool().await;
        let mut csv = String::from(
            "title,price,manufacturer,inStock,mainImage,description,slug,categoryId\n",
        );
        for i in 0..60 {
            csv.push_str(&format!(",79.99,Soundwave,1,,desc,slug-{},1\n", i));
        }
        let (_, summary) = process_csv(&pool, "many.csv", "admin", csv.as_bytes())
            .await
            .unwrap();
        assert_eq!(summary.failed, 60);
        assert_eq!(summary.errors.len(), 50);
    }

    // ==========================================================================
    // Deletion Tests
    // ==========================================================================

    async fn ingest_two_products(pool: &DbPool) -> i64 {
        let csv = "\
title,price,manufacturer,inStock,mainImage,description,slug,categoryId
Speaker,79.99,Soundwave,12,,A speaker,speaker,1
Camera,300,Optix,2,,A camera,camera,1
";
        let (batch_id, summary) = process_csv(pool, "products.csv", "admin", csv.as_bytes())
            .await
            .unwrap();
        assert_eq!(summary.successful, 2);
        batch_id
    }

    #[tokio::test]
    async fn test_delete_batch_only_keeps_products() {
        let pool = create_test_pool().await;
        let batch_id = ingest_two_products(&pool).await;

        let outcome = delete_batch(&pool, batch_id, false).await.unwrap();
        assert_eq!(outcome.deleted_products, 0);
        assert!(outcome.skipped_products.is_empty());

        assert_eq!(product_count(&pool).await, 2);
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM upload_batches")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_delete_batch_cascade_removes_products() {
        let pool = create_test_pool().await;
        let batch_id = ingest_two_products(&pool).await;

        let outcome = delete_batch(&pool, batch_id, true).await.unwrap();
        assert_eq!(outcome.deleted_products, 2);
        assert!(outcome.skipped_products.is_empty());
        assert_eq!(product_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_delete_batch_cascade_skips_ordered_products() {
        let pool = create_test_pool().await;
        let batch_id = ingest_two_products(&pool).await;

        // Reference the speaker from an order line
        let (product_id,): (i64,) = sqlx::query_as("SELECT id FROM products WHERE slug = 'speaker'")
            .fetch_one(&pool)
            .await
            .unwrap();
        insert_test_order_with_product(&pool, product_id).await;

        let outcome = delete_batch(&pool, batch_id, true).await.unwrap();
        assert_eq!(outcome.deleted_products, 1);
        assert_eq!(outcome.skipped_products, vec!["speaker"]);
        assert_eq!(product_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_delete_missing_batch_is_not_found() {
        let pool = create_test_pool().await;
        let err = delete_batch(&pool, 999, false).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
