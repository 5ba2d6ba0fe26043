use sqlx::SqlitePool;

use crate::{course::Course, error::ApiError, purchase::PurchaseStatus};

/// Resolve whether a caller may see the full body of a course.
///
/// Free courses (flagged free, or priced at zero) are open to everyone,
/// anonymous callers included. Paid courses require either an active
/// enrollment or a confirmed purchase. The result is recomputed on every
/// request; nothing is cached.
pub async fn user_has_course_access(
    db: &SqlitePool,
    user_id: Option<i64>,
    course: &Course,
) -> Result<bool, ApiError> {
    if course.is_free || course.price <= 0.0 {
        return Ok(true);
    }
    let Some(user_id) = user_id else {
        return Ok(false);
    };

    let enrollment: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM enrollment WHERE user_id = ? AND course_id = ? AND status = 'active' LIMIT 1",
    )
    .bind(user_id)
    .bind(course.id)
    .fetch_optional(db)
    .await?;
    if enrollment.is_some() {
        return Ok(true);
    }

    let purchase: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM purchase WHERE user_id = ? AND course_id = ? AND status = ? LIMIT 1",
    )
    .bind(user_id)
    .bind(course.id)
    .bind(PurchaseStatus::Paid)
    .fetch_optional(db)
    .await?;
    Ok(purchase.is_some())
}
