//! Routes that serve anonymous callers. Course and lesson detail still look
//! at the bearer token when one is present, so entitled users get full
//! bodies from the same endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    access::user_has_course_access,
    auth::OptionalUser,
    bytesize::{self, FeedItem},
    competition::{self, Submission},
    course::{self, CatalogFilter, CourseDetail, CourseSummary, LessonView},
    error::ApiError,
    event::{self, Event},
    team::{self, TeamView},
};

#[utoipa::path(get, path = "/health", responses((status = OK, description = "Service is up")))]
pub async fn health(State(db): State<SqlitePool>) -> Result<Json<serde_json::Value>, ApiError> {
    sqlx::query("SELECT 1").execute(&db).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub search: Option<String>,
    pub filter: Option<CatalogFilter>,
}

#[utoipa::path(get, path = "/courses", responses((status = OK, body = Vec<CourseSummary>)))]
pub async fn list_courses(
    State(db): State<SqlitePool>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Vec<CourseSummary>>, ApiError> {
    let courses = course::list_published(&db, query.search.as_deref(), query.filter).await?;
    Ok(Json(courses))
}

#[utoipa::path(get, path = "/courses/{course_id}", responses(
    (status = OK, body = CourseDetail),
    (status = NOT_FOUND, description = "No such course"),
))]
pub async fn course_detail(
    State(db): State<SqlitePool>,
    OptionalUser(user): OptionalUser,
    Path(course_id): Path<i64>,
) -> Result<Json<CourseDetail>, ApiError> {
    let course = course::get_course(&db, course_id).await?;
    let has_access = user_has_course_access(&db, user.map(|u| u.id), &course).await?;
    let detail = course::course_detail(&db, &course, has_access).await?;
    Ok(Json(detail))
}

#[utoipa::path(get, path = "/courses/{course_id}/lessons/{lesson_id}", responses(
    (status = OK, body = LessonView),
    (status = FORBIDDEN, description = "Lesson is locked"),
    (status = NOT_FOUND, description = "Lesson not in this course"),
))]
pub async fn get_lesson(
    State(db): State<SqlitePool>,
    OptionalUser(user): OptionalUser,
    Path((course_id, lesson_id)): Path<(i64, i64)>,
) -> Result<Json<LessonView>, ApiError> {
    let course = course::get_course(&db, course_id).await?;
    let lesson = course::get_lesson_in_course(&db, course_id, lesson_id).await?;
    let has_access = user_has_course_access(&db, user.map(|u| u.id), &course).await?;
    if !has_access && !lesson.is_free_preview {
        return Err(ApiError::Forbidden("Lesson requires purchase"));
    }
    Ok(Json(lesson))
}

#[utoipa::path(get, path = "/events", responses((status = OK, body = Vec<Event>)))]
pub async fn list_events(State(db): State<SqlitePool>) -> Result<Json<Vec<Event>>, ApiError> {
    Ok(Json(event::list_published(&db).await?))
}

#[utoipa::path(get, path = "/events/{event_id}", responses(
    (status = OK, body = Event),
    (status = NOT_FOUND, description = "No published event with this id"),
))]
pub async fn get_event(
    State(db): State<SqlitePool>,
    Path(event_id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(event::get_published(&db, event_id).await?))
}

#[utoipa::path(get, path = "/teams", responses((status = OK, body = Vec<TeamView>)))]
pub async fn list_teams(State(db): State<SqlitePool>) -> Result<Json<Vec<TeamView>>, ApiError> {
    Ok(Json(team::list_teams(&db).await?))
}

#[utoipa::path(get, path = "/submissions", responses((status = OK, body = Vec<Submission>)))]
pub async fn list_submissions(
    State(db): State<SqlitePool>,
) -> Result<Json<Vec<Submission>>, ApiError> {
    Ok(Json(competition::list_approved_submissions(&db).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub tag: Option<String>,
}

#[utoipa::path(get, path = "/bytesize", responses((status = OK, body = Vec<FeedItem>)))]
pub async fn bytesize_feed(
    State(db): State<SqlitePool>,
    OptionalUser(user): OptionalUser,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<FeedItem>>, ApiError> {
    let items = bytesize::feed(&db, user.map(|u| u.id), query.tag.as_deref()).await?;
    Ok(Json(items))
}
