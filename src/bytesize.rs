use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{
    error::{ApiError, FieldErrors},
    utils::now_local,
};

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: i64,
    title: String,
    description: Option<String>,
    video_url: String,
    cover_image_url: Option<String>,
    tags: String,
    created_at: time::OffsetDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub video_url: String,
    pub cover_image_url: Option<String>,
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
    pub likes_count: i64,
    pub liked_by_me: bool,
}

/// Short-video feed, newest first. `liked_by_me` is only meaningful for
/// authenticated callers; anonymous ones always see false.
pub async fn feed(
    db: &SqlitePool,
    user_id: Option<i64>,
    tag: Option<&str>,
) -> Result<Vec<FeedItem>, ApiError> {
    let rows = sqlx::query_as::<_, ItemRow>(
        "SELECT id, title, description, video_url, cover_image_url, tags, created_at
         FROM bytesize_item ORDER BY created_at DESC",
    )
    .fetch_all(db)
    .await?;

    let tag = tag
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("all"));

    let mut items = Vec::new();
    for row in rows {
        let tags: Vec<String> = serde_json::from_str(&row.tags).unwrap_or_default();
        if let Some(tag) = tag {
            if !tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                continue;
            }
        }
        let likes_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM bytesize_like WHERE item_id = ?")
                .bind(row.id)
                .fetch_one(db)
                .await?;
        let liked_by_me = match user_id {
            Some(user_id) => {
                let liked: Option<i64> = sqlx::query_scalar(
                    "SELECT id FROM bytesize_like WHERE item_id = ? AND user_id = ?",
                )
                .bind(row.id)
                .bind(user_id)
                .fetch_optional(db)
                .await?;
                liked.is_some()
            }
            None => false,
        };
        items.push(FeedItem {
            id: row.id,
            title: row.title,
            description: row.description,
            video_url: row.video_url,
            cover_image_url: row.cover_image_url,
            tags,
            created_at: row.created_at,
            likes_count,
            liked_by_me,
        });
    }
    Ok(items)
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LikeResult {
    pub liked: bool,
    pub likes_count: i64,
}

pub async fn toggle_like(db: &SqlitePool, user_id: i64, item_id: i64) -> Result<LikeResult, ApiError> {
    let item: Option<i64> = sqlx::query_scalar("SELECT id FROM bytesize_item WHERE id = ?")
        .bind(item_id)
        .fetch_optional(db)
        .await?;
    if item.is_none() {
        return Err(ApiError::NotFound("ByteSize item"));
    }

    let mut tx = db.begin().await?;
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM bytesize_like WHERE item_id = ? AND user_id = ?")
            .bind(item_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
    let liked = match existing {
        Some(like_id) => {
            sqlx::query("DELETE FROM bytesize_like WHERE id = ?")
                .bind(like_id)
                .execute(&mut *tx)
                .await?;
            false
        }
        None => {
            sqlx::query("INSERT INTO bytesize_like (item_id, user_id) VALUES (?, ?)")
                .bind(item_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            true
        }
    };
    let likes_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM bytesize_like WHERE item_id = ?")
            .bind(item_id)
            .fetch_one(&mut *tx)
            .await?;
    tx.commit().await?;
    Ok(LikeResult { liked, likes_count })
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewFeedItem {
    pub title: String,
    pub description: Option<String>,
    pub video_url: String,
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewFeedItem {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if self.title.trim().is_empty() {
            errors.push("title", "is required");
        }
        if self.video_url.trim().is_empty() {
            errors.push("videoUrl", "is required");
        }
        errors.into_result()
    }
}

pub async fn create_item(db: &SqlitePool, new: &NewFeedItem) -> Result<i64, ApiError> {
    let tags = serde_json::to_string(&new.tags)
        .map_err(|e| anyhow::anyhow!("failed to encode tags: {e}"))?;
    let id = sqlx::query(
        "INSERT INTO bytesize_item (title, description, video_url, cover_image_url, tags, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.video_url)
    .bind(&new.cover_image_url)
    .bind(tags)
    .bind(now_local())
    .execute(db)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn delete_item(db: &SqlitePool, id: i64) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM bytesize_item WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{fixtures, test_pool};

    async fn seed_item(db: &SqlitePool, title: &str, tags: &[&str]) -> i64 {
        create_item(
            db,
            &NewFeedItem {
                title: title.to_string(),
                description: None,
                video_url: "https://cdn.example.com/v.mp4".to_string(),
                cover_image_url: None,
                tags: tags.iter().map(|t| t.to_string()).collect(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn like_toggles_and_counts() {
        let db = test_pool().await;
        let user = fixtures::user(&db, "u@example.com", "USER").await;
        let other = fixtures::user(&db, "o@example.com", "USER").await;
        let item = seed_item(&db, "Line follower in 60s", &[]).await;

        let on = toggle_like(&db, user, item).await.unwrap();
        assert!(on.liked);
        assert_eq!(on.likes_count, 1);

        toggle_like(&db, other, item).await.unwrap();
        let off = toggle_like(&db, user, item).await.unwrap();
        assert!(!off.liked);
        assert_eq!(off.likes_count, 1);

        let feed_for_other = feed(&db, Some(other), None).await.unwrap();
        assert!(feed_for_other[0].liked_by_me);
        let anonymous = feed(&db, None, None).await.unwrap();
        assert!(!anonymous[0].liked_by_me);
    }

    #[tokio::test]
    async fn tag_filter_is_case_insensitive() {
        let db = test_pool().await;
        seed_item(&db, "PID tuning", &["Control", "pid"]).await;
        seed_item(&db, "Chassis build", &["mechanics"]).await;

        assert_eq!(feed(&db, None, Some("control")).await.unwrap().len(), 1);
        assert_eq!(feed(&db, None, Some("ALL")).await.unwrap().len(), 2);
        assert_eq!(feed(&db, None, None).await.unwrap().len(), 2);
        assert!(feed(&db, None, Some("nope")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn liking_a_missing_item_is_not_found() {
        let db = test_pool().await;
        let user = fixtures::user(&db, "u@example.com", "USER").await;
        let err = toggle_like(&db, user, 404).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
