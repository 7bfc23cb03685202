use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Row Models
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Product {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub price: f64,
    pub manufacturer: String,
    pub in_stock: i64,
    pub main_image: String,
    pub description: String,
    pub category_id: i64,
    pub merchant_id: Option<i64>,
    pub batch_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Merchant {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub user_id: Option<i64>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: String,
    pub city: String,
    pub country: String,
    pub postal_code: Option<String>,
    pub status: String,
    pub subtotal: f64,
    pub tax: f64,
    pub shipping: f64,
    pub total: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: f64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CartItem {
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UploadBatch {
    pub id: i64,
    pub file_name: String,
    pub total_records: i64,
    pub successful_records: i64,
    pub failed_records: i64,
    /// JSON array of row error messages, capped for display.
    pub errors: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

// ============================================================================
// Batch Status
// ============================================================================

/// Batch outcome, always derived from the stored counts so there is a single
/// source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Pending,
    Completed,
    Failed,
    Partial,
}

impl BatchStatus {
    /// A batch row is written with its total before the row loop runs and its
    /// outcome counts after, so a batch whose counts have not caught up with
    /// its total is still in flight.
    pub fn from_counts(total: i64, successful: i64, failed: i64) -> Self {
        if successful + failed < total {
            BatchStatus::Pending
        } else if failed == 0 {
            BatchStatus::Completed
        } else if successful == 0 && total > 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        }
    }
}

impl UploadBatch {
    pub fn status(&self) -> BatchStatus {
        BatchStatus::from_counts(
            self.total_records,
            self.successful_records,
            self.failed_records,
        )
    }

    /// Display-only success percentage, guarding the zero-row batch.
    pub fn success_rate(&self) -> i64 {
        if self.total_records == 0 {
            return 0;
        }
        (self.successful_records as f64 / self.total_records as f64 * 100.0).round() as i64
    }

    pub fn error_list(&self) -> Vec<String> {
        serde_json::from_str(&self.errors).unwrap_or_default()
    }
}

/// API shape of a batch row: counts plus the derived fields the history
/// viewer renders.
#[derive(Debug, Clone, Serialize)]
pub struct UploadBatchResponse {
    pub id: i64,
    pub file_name: String,
    pub total_records: i64,
    pub successful_records: i64,
    pub failed_records: i64,
    pub status: BatchStatus,
    pub success_rate: i64,
    pub errors: Vec<String>,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<UploadBatch> for UploadBatchResponse {
    fn from(batch: UploadBatch) -> Self {
        let status = batch.status();
        let success_rate = batch.success_rate();
        let errors = batch.error_list();
        Self {
            id: batch.id,
            file_name: batch.file_name,
            total_records: batch.total_records,
            successful_records: batch.successful_records,
            failed_records: batch.failed_records,
            status,
            success_rate,
            errors,
            uploaded_by: batch.uploaded_by,
            uploaded_at: batch.uploaded_at,
        }
    }
}
