use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{
    error::{ApiError, FieldErrors},
    utils::now_local,
};

/// A competition a team takes part in. `status` is free-form text
/// ("upcoming", "finished", ...) and defaults to upcoming.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Competition {
    pub id: i64,
    pub team_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub competition_date: String,
    pub venue: Option<String>,
    pub awards_won: Option<String>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionPayload {
    pub team_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub competition_date: String,
    pub venue: Option<String>,
    pub awards_won: Option<String>,
    pub status: Option<String>,
}

impl CompetitionPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() {
            errors.push("name", "is required");
        }
        if self.competition_date.trim().is_empty() {
            errors.push("competitionDate", "is required");
        }
        errors.into_result()
    }
}

const COMPETITION_COLUMNS: &str =
    "id, team_id, name, description, competition_date, venue, awards_won, status, created_at";

pub async fn list_competitions(db: &SqlitePool) -> Result<Vec<Competition>, ApiError> {
    let list = sqlx::query_as::<_, Competition>(&format!(
        "SELECT {COMPETITION_COLUMNS} FROM competition ORDER BY created_at DESC"
    ))
    .fetch_all(db)
    .await?;
    Ok(list)
}

async fn get_competition(db: &SqlitePool, id: i64) -> Result<Competition, ApiError> {
    sqlx::query_as::<_, Competition>(&format!(
        "SELECT {COMPETITION_COLUMNS} FROM competition WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("Competition"))
}

pub async fn create_competition(
    db: &SqlitePool,
    payload: &CompetitionPayload,
) -> Result<Competition, ApiError> {
    let team: Option<i64> = sqlx::query_scalar("SELECT id FROM team WHERE id = ?")
        .bind(payload.team_id)
        .fetch_optional(db)
        .await?;
    if team.is_none() {
        return Err(ApiError::NotFound("Team"));
    }
    let id = sqlx::query(
        "INSERT INTO competition (team_id, name, description, competition_date, venue, awards_won, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(payload.team_id)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(&payload.competition_date)
    .bind(&payload.venue)
    .bind(&payload.awards_won)
    .bind(payload.status.as_deref().unwrap_or("upcoming"))
    .bind(now_local())
    .execute(db)
    .await?
    .last_insert_rowid();
    get_competition(db, id).await
}

pub async fn update_competition(
    db: &SqlitePool,
    id: i64,
    payload: &CompetitionPayload,
) -> Result<Competition, ApiError> {
    let updated = sqlx::query(
        "UPDATE competition SET team_id = ?, name = ?, description = ?, competition_date = ?,
                                venue = ?, awards_won = ?, status = COALESCE(?, status)
         WHERE id = ?",
    )
    .bind(payload.team_id)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(&payload.competition_date)
    .bind(&payload.venue)
    .bind(&payload.awards_won)
    .bind(&payload.status)
    .bind(id)
    .execute(db)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("Competition"));
    }
    get_competition(db, id).await
}

pub async fn delete_competition(db: &SqlitePool, id: i64) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM competition WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

/// A member-submitted competition result, moderated before it reaches the
/// public showcase.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub project_summary: Option<String>,
    pub venue: Option<String>,
    pub placement: Option<String>,
    pub event_date: Option<String>,
    pub image_url: Option<String>,
    pub status: SubmissionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub title: String,
    pub description: Option<String>,
    pub project_summary: Option<String>,
    pub venue: Option<String>,
    pub placement: Option<String>,
    pub event_date: Option<String>,
    pub image_url: Option<String>,
}

impl SubmissionPayload {
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

const SUBMISSION_COLUMNS: &str = "id, user_id, title, description, project_summary, venue,
                                  placement, event_date, image_url, status, created_at";

async fn get_submission(db: &SqlitePool, id: i64) -> Result<Submission, ApiError> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM competition_submission WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("Submission"))
}

/// Public showcase: approved submissions only.
pub async fn list_approved_submissions(db: &SqlitePool) -> Result<Vec<Submission>, ApiError> {
    let list = sqlx::query_as::<_, Submission>(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM competition_submission
         WHERE status = 'approved' ORDER BY created_at DESC"
    ))
    .fetch_all(db)
    .await?;
    Ok(list)
}

pub async fn list_submissions(
    db: &SqlitePool,
    status: Option<SubmissionStatus>,
) -> Result<Vec<Submission>, ApiError> {
    let list = match status {
        Some(status) => {
            sqlx::query_as::<_, Submission>(&format!(
                "SELECT {SUBMISSION_COLUMNS} FROM competition_submission
                 WHERE status = ? ORDER BY created_at DESC"
            ))
            .bind(status)
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as::<_, Submission>(&format!(
                "SELECT {SUBMISSION_COLUMNS} FROM competition_submission ORDER BY created_at DESC"
            ))
            .fetch_all(db)
            .await?
        }
    };
    Ok(list)
}

/// File a submission; it stays pending until a moderator approves it.
pub async fn create_submission(
    db: &SqlitePool,
    user_id: i64,
    payload: &SubmissionPayload,
) -> Result<Submission, ApiError> {
    let id = sqlx::query(
        "INSERT INTO competition_submission
             (user_id, title, description, project_summary, venue, placement, event_date, image_url, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.project_summary)
    .bind(&payload.venue)
    .bind(&payload.placement)
    .bind(&payload.event_date)
    .bind(&payload.image_url)
    .bind(SubmissionStatus::Pending)
    .bind(now_local())
    .execute(db)
    .await?
    .last_insert_rowid();
    get_submission(db, id).await
}

pub async fn update_submission(
    db: &SqlitePool,
    id: i64,
    payload: &SubmissionPayload,
) -> Result<Submission, ApiError> {
    let updated = sqlx::query(
        "UPDATE competition_submission
         SET title = ?, description = ?, project_summary = ?, venue = ?, placement = ?,
             event_date = COALESCE(?, event_date), image_url = ?
         WHERE id = ?",
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.project_summary)
    .bind(&payload.venue)
    .bind(&payload.placement)
    .bind(&payload.event_date)
    .bind(&payload.image_url)
    .bind(id)
    .execute(db)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("Submission"));
    }
    get_submission(db, id).await
}

pub async fn set_submission_status(
    db: &SqlitePool,
    id: i64,
    status: SubmissionStatus,
) -> Result<Submission, ApiError> {
    let updated = sqlx::query("UPDATE competition_submission SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(db)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("Submission"));
    }
    get_submission(db, id).await
}
