use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{
    error::{ApiError, FieldErrors},
    utils::now_local,
};

/// Manual-reconciliation lifecycle: a buyer files a pending purchase with
/// their transfer details, and an admin later marks it paid or canceled.
/// `paid` is the single canonical confirmed value; it is what the access
/// resolver checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Paid,
    Canceled,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub amount: f64,
    pub currency: String,
    pub payment_method: String,
    pub transaction_id: Option<String>,
    pub payer_full_name: Option<String>,
    pub sender_code: Option<String>,
    pub status: PurchaseStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

fn default_currency() -> String {
    "KZT".to_string()
}

fn default_payment_method() -> String {
    "kaspi".to_string()
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewPurchase {
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    pub transaction_id: Option<String>,
    pub payer_full_name: Option<String>,
    pub sender_code: Option<String>,
}

impl NewPurchase {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if self.amount <= 0.0 {
            errors.push("amount", "must be positive");
        }
        if let Some(name) = &self.payer_full_name {
            if name.trim().is_empty() {
                errors.push("payerFullName", "must not be empty");
            }
        }
        if let Some(code) = &self.sender_code {
            if code.len() < 3 || code.len() > 64 {
                errors.push("senderCode", "must be between 3 and 64 characters");
            }
        }
        errors.into_result()
    }
}

/// File a purchase claim for a course; it starts out pending and does not
/// grant access until an admin confirms it.
pub async fn create_purchase(
    db: &SqlitePool,
    user_id: i64,
    course_id: i64,
    new: &NewPurchase,
) -> Result<Purchase, ApiError> {
    let course: Option<i64> = sqlx::query_scalar("SELECT id FROM course WHERE id = ?")
        .bind(course_id)
        .fetch_optional(db)
        .await?;
    if course.is_none() {
        return Err(ApiError::NotFound("Course"));
    }

    let id = sqlx::query(
        "INSERT INTO purchase (user_id, course_id, amount, currency, payment_method,
                               transaction_id, payer_full_name, sender_code, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(new.amount)
    .bind(&new.currency)
    .bind(&new.payment_method)
    .bind(&new.transaction_id)
    .bind(&new.payer_full_name)
    .bind(&new.sender_code)
    .bind(PurchaseStatus::Pending)
    .bind(now_local())
    .execute(db)
    .await?
    .last_insert_rowid();
    get_purchase(db, id).await
}

pub async fn get_purchase(db: &SqlitePool, id: i64) -> Result<Purchase, ApiError> {
    sqlx::query_as::<_, Purchase>(
        "SELECT id, user_id, course_id, amount, currency, payment_method, transaction_id,
                payer_full_name, sender_code, status, created_at
         FROM purchase WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("Purchase"))
}

pub async fn list_purchases(
    db: &SqlitePool,
    status: Option<PurchaseStatus>,
) -> Result<Vec<Purchase>, ApiError> {
    let base = "SELECT id, user_id, course_id, amount, currency, payment_method, transaction_id,
                       payer_full_name, sender_code, status, created_at
                FROM purchase";
    let purchases = match status {
        Some(status) => {
            sqlx::query_as::<_, Purchase>(&format!("{base} WHERE status = ? ORDER BY created_at DESC"))
                .bind(status)
                .fetch_all(db)
                .await?
        }
        None => {
            sqlx::query_as::<_, Purchase>(&format!("{base} ORDER BY created_at DESC"))
                .fetch_all(db)
                .await?
        }
    };
    Ok(purchases)
}

/// The admin confirmation step: pending → paid unlocks the course for the
/// buyer, pending → canceled closes the claim.
pub async fn set_purchase_status(
    db: &SqlitePool,
    id: i64,
    status: PurchaseStatus,
) -> Result<Purchase, ApiError> {
    let updated = sqlx::query("UPDATE purchase SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(db)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("Purchase"));
    }
    get_purchase(db, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        access::user_has_course_access,
        course::get_course,
        utils::{fixtures, test_pool},
    };

    fn claim(amount: f64) -> NewPurchase {
        NewPurchase {
            amount,
            currency: "KZT".to_string(),
            payment_method: "kaspi".to_string(),
            transaction_id: None,
            payer_full_name: Some("Aidos Q.".to_string()),
            sender_code: Some("AQ-001".to_string()),
        }
    }

    #[tokio::test]
    async fn confirmation_unlocks_access_and_cancellation_does_not() {
        let db = test_pool().await;
        let author = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let buyer = fixtures::user(&db, "b@example.com", "USER").await;
        let (course_id, _) = fixtures::course(&db, author, false, 5000.0, &[1]).await;
        let course = get_course(&db, course_id).await.unwrap();

        let purchase = create_purchase(&db, buyer, course_id, &claim(5000.0)).await.unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Pending);
        assert!(!user_has_course_access(&db, Some(buyer), &course).await.unwrap());

        let canceled = set_purchase_status(&db, purchase.id, PurchaseStatus::Canceled)
            .await
            .unwrap();
        assert_eq!(canceled.status, PurchaseStatus::Canceled);
        assert!(!user_has_course_access(&db, Some(buyer), &course).await.unwrap());

        let second = create_purchase(&db, buyer, course_id, &claim(5000.0)).await.unwrap();
        let paid = set_purchase_status(&db, second.id, PurchaseStatus::Paid).await.unwrap();
        assert_eq!(paid.status, PurchaseStatus::Paid);
        assert!(user_has_course_access(&db, Some(buyer), &course).await.unwrap());
    }

    #[tokio::test]
    async fn purchase_for_missing_course_is_not_found() {
        let db = test_pool().await;
        let buyer = fixtures::user(&db, "b@example.com", "USER").await;
        let err = create_purchase(&db, buyer, 404, &claim(100.0)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn amount_must_be_positive() {
        assert!(claim(100.0).validate().is_ok());
        assert!(claim(0.0).validate().is_err());
        assert!(claim(-1.0).validate().is_err());
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let db = test_pool().await;
        let author = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let buyer = fixtures::user(&db, "b@example.com", "USER").await;
        let (course_id, _) = fixtures::course(&db, author, false, 5000.0, &[1]).await;

        let p1 = create_purchase(&db, buyer, course_id, &claim(5000.0)).await.unwrap();
        create_purchase(&db, buyer, course_id, &claim(5000.0)).await.unwrap();
        set_purchase_status(&db, p1.id, PurchaseStatus::Paid).await.unwrap();

        assert_eq!(list_purchases(&db, None).await.unwrap().len(), 2);
        let pending = list_purchases(&db, Some(PurchaseStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        let paid = list_purchases(&db, Some(PurchaseStatus::Paid)).await.unwrap();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].id, p1.id);
    }
}
