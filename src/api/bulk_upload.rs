use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::extractors::AdminUser;
use crate::config::CONFIG;
use crate::db::{UploadBatch, UploadBatchResponse};
use crate::error::{AppError, Result};
use crate::services::ingest::{self, IngestSummary, CSV_TEMPLATE};
use crate::state::AppState;

/// Create bulk-upload routes (admin only)
pub fn bulk_upload_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_batches).post(upload_csv))
        .route("/template", get(download_template))
        .route("/:batch_id", delete(delete_batch))
        .layer(DefaultBodyLimit::max(CONFIG.max_upload_bytes))
        .with_state(state)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub details: IngestSummary,
}

#[derive(Debug, Serialize)]
pub struct BatchListResponse {
    pub batches: Vec<UploadBatchResponse>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(rename = "deleteProducts", default)]
    pub delete_products: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub deleted_products: i64,
    pub skipped_products: Vec<String>,
}

// ============================================================================
// Endpoint Handlers
// ============================================================================

/// Ingest a CSV product file posted as multipart form data
async fn upload_csv(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    // The CSV travels as the sole file field of the form
    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.file_name().is_some() || field.name() == Some("file") {
            let name = field
                .file_name()
                .unwrap_or("upload.csv")
                .to_string();
            let data = field.bytes().await?;
            file = Some((name, data.to_vec()));
            break;
        }
    }

    let (file_name, data) = file
        .ok_or_else(|| AppError::BadRequest("No file field in upload".to_string()))?;

    tracing::info!(
        "Processing bulk upload '{}' ({} bytes) for {}",
        file_name,
        data.len(),
        admin.username
    );

    let (_, summary) =
        ingest::process_csv(&state.pool, &file_name, &admin.username, &data).await?;

    let message = format!(
        "Processed {} row(s): {} imported, {} failed",
        summary.processed, summary.successful, summary.failed
    );

    Ok(Json(UploadResponse { message, details: summary }))
}

/// Batch history, newest first
async fn list_batches(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> Result<Json<BatchListResponse>> {
    let batches: Vec<UploadBatch> =
        sqlx::query_as("SELECT * FROM upload_batches ORDER BY uploaded_at DESC, id DESC")
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(BatchListResponse {
        batches: batches.into_iter().map(UploadBatchResponse::from).collect(),
    }))
}

/// Static CSV template with the header row and two example rows
async fn download_template(AdminUser(_): AdminUser) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"product-upload-template.csv\"",
            ),
        ],
        CSV_TEMPLATE,
    )
}

/// Delete a batch record, optionally cascading to its products
async fn delete_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<i64>,
    Query(params): Query<DeleteParams>,
    AdminUser(_): AdminUser,
) -> Result<Json<DeleteResponse>> {
    let outcome = ingest::delete_batch(&state.pool, batch_id, params.delete_products).await?;

    let message = if params.delete_products {
        format!(
            "Batch deleted with {} product(s); {} skipped",
            outcome.deleted_products,
            outcome.skipped_products.len()
        )
    } else {
        "Batch deleted".to_string()
    };

    Ok(Json(DeleteResponse {
        message,
        deleted_products: outcome.deleted_products,
        skipped_products: outcome.skipped_products,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_params_default_false() {
        let params: DeleteParams = serde_json::from_str("{}").unwrap();
        assert!(!params.delete_products);
    }

    #[test]
    fn test_delete_params_rename() {
        let params: DeleteParams = serde_json::from_str(r#"{"deleteProducts": true}"#).unwrap();
        assert!(params.delete_products);
    }

    #[test]
    fn test_template_has_header_and_two_rows() {
        let mut lines = CSV_TEMPLATE.lines();
        assert_eq!(
            lines.next().unwrap(),
            "title,price,manufacturer,inStock,mainImage,description,slug,categoryId"
        );
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn test_upload_response_shape() {
        let resp = UploadResponse {
            message: "Processed 2 row(s): 1 imported, 1 failed".to_string(),
            details: IngestSummary {
                processed: 2,
                successful: 1,
                failed: 1,
                errors: vec!["Row 2: title is required".to_string()],
            },
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["details"]["processed"], 2);
        assert_eq!(json["details"]["errors"][0], "Row 2: title is required");
    }

    #[test]
    fn test_summary_omits_empty_errors() {
        let summary = IngestSummary {
            processed: 2,
            successful: 2,
            failed: 0,
            errors: vec![],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("errors").is_none());
    }
}
