use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{
    error::{ApiError, FieldErrors},
    utils::now_local,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Published,
    Rejected,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub audience: Option<String>,
    pub contact: Option<String>,
    pub date: Option<String>,
    pub image_url: Option<String>,
    pub status: EventStatus,
    pub created_by_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub title: String,
    pub description: Option<String>,
    pub audience: Option<String>,
    pub contact: Option<String>,
    pub date: Option<String>,
    pub image_url: Option<String>,
}

impl EventPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if self.title.trim().is_empty() {
            errors.push("title", "is required");
        }
        if let Some(url) = &self.image_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                errors.push("imageUrl", "must be a valid URL");
            }
        }
        errors.into_result()
    }
}

const EVENT_COLUMNS: &str =
    "id, title, description, audience, contact, date, image_url, status, created_by_id, created_at";

pub async fn list_published(db: &SqlitePool) -> Result<Vec<Event>, ApiError> {
    let events = sqlx::query_as::<_, Event>(&format!(
        "SELECT {EVENT_COLUMNS} FROM event WHERE status = 'published' ORDER BY created_at DESC"
    ))
    .fetch_all(db)
    .await?;
    Ok(events)
}

/// Public detail: events that are not published read as missing.
pub async fn get_published(db: &SqlitePool, id: i64) -> Result<Event, ApiError> {
    let event = sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM event WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    match event {
        Some(event) if event.status == EventStatus::Published => Ok(event),
        _ => Err(ApiError::NotFound("Event")),
    }
}

pub async fn list_mine(db: &SqlitePool, user_id: i64) -> Result<Vec<Event>, ApiError> {
    let events = sqlx::query_as::<_, Event>(&format!(
        "SELECT {EVENT_COLUMNS} FROM event WHERE created_by_id = ? ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(events)
}

pub async fn list_all(db: &SqlitePool) -> Result<Vec<Event>, ApiError> {
    let events = sqlx::query_as::<_, Event>(&format!(
        "SELECT {EVENT_COLUMNS} FROM event ORDER BY created_at DESC"
    ))
    .fetch_all(db)
    .await?;
    Ok(events)
}

/// User-submitted proposals start pending and only appear publicly once an
/// admin publishes them.
pub async fn create_proposal(
    db: &SqlitePool,
    user_id: i64,
    payload: &EventPayload,
) -> Result<Event, ApiError> {
    let id = sqlx::query(
        "INSERT INTO event (title, description, audience, contact, date, image_url, status, created_by_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.audience)
    .bind(&payload.contact)
    .bind(&payload.date)
    .bind(&payload.image_url)
    .bind(EventStatus::Pending)
    .bind(user_id)
    .bind(now_local())
    .execute(db)
    .await?
    .last_insert_rowid();
    get_event(db, id).await
}

async fn get_event(db: &SqlitePool, id: i64) -> Result<Event, ApiError> {
    sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM event WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound("Event"))
}

pub async fn update_event(
    db: &SqlitePool,
    id: i64,
    payload: &EventPayload,
) -> Result<Event, ApiError> {
    let updated = sqlx::query(
        "UPDATE event SET title = ?, description = ?, audience = ?, contact = ?,
                          date = COALESCE(?, date), image_url = ?
         WHERE id = ?",
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.audience)
    .bind(&payload.contact)
    .bind(&payload.date)
    .bind(&payload.image_url)
    .bind(id)
    .execute(db)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("Event"));
    }
    get_event(db, id).await
}

pub async fn set_status(db: &SqlitePool, id: i64, status: EventStatus) -> Result<Event, ApiError> {
    let updated = sqlx::query("UPDATE event SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(db)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("Event"));
    }
    get_event(db, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{fixtures, test_pool};

    fn proposal(title: &str) -> EventPayload {
        EventPayload {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn proposals_stay_hidden_until_published() {
        let db = test_pool().await;
        let user = fixtures::user(&db, "u@example.com", "USER").await;
        let event = create_proposal(&db, user, &proposal("Robo Fair")).await.unwrap();
        assert_eq!(event.status, EventStatus::Pending);

        assert!(list_published(&db).await.unwrap().is_empty());
        assert!(matches!(
            get_published(&db, event.id).await.unwrap_err(),
            ApiError::NotFound(_)
        ));
        assert_eq!(list_mine(&db, user).await.unwrap().len(), 1);

        set_status(&db, event.id, EventStatus::Published).await.unwrap();
        assert_eq!(list_published(&db).await.unwrap().len(), 1);
        assert!(get_published(&db, event.id).await.is_ok());

        set_status(&db, event.id, EventStatus::Rejected).await.unwrap();
        assert!(list_published(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn image_url_must_look_like_a_url() {
        let mut payload = proposal("Fair");
        payload.image_url = Some("https://example.com/banner.png".to_string());
        assert!(payload.validate().is_ok());
        payload.image_url = Some("not a url".to_string());
        assert!(payload.validate().is_err());
    }
}
