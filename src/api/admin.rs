//! Back-office routes. Every handler extracts [`AdminUser`], so a missing
//! or non-admin token is rejected before any work happens.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{
    auth::{AdminUser, Role},
    bytesize::{self, NewFeedItem},
    competition::{
        self, Competition, CompetitionPayload, Submission, SubmissionPayload, SubmissionStatus,
    },
    course::{self, CourseDetail, CoursePayload},
    error::ApiError,
    event::{self, Event, EventPayload, EventStatus},
    progress::{self, Enrollment},
    purchase::{self, Purchase, PurchaseStatus},
    quiz::{self, NewQuestion, QuestionView},
    team::{self, TeamUpdate, TeamView},
    user::{self, UserAchievement, UserInfo, UserSummary},
};

#[utoipa::path(get, path = "/api/admin/users", responses((status = OK, body = Vec<UserSummary>)))]
pub async fn list_users(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(user::list_users(&db).await?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdate {
    pub role: Role,
}

#[utoipa::path(post, path = "/api/admin/users/{user_id}/role", responses(
    (status = OK, body = UserInfo),
    (status = NOT_FOUND, description = "No such user"),
))]
pub async fn set_user_role(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(user_id): Path<i64>,
    Json(update): Json<RoleUpdate>,
) -> Result<Json<UserInfo>, ApiError> {
    Ok(Json(user::set_role(&db, user_id, update.role).await?))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentGrant {
    pub course_id: i64,
}

#[utoipa::path(post, path = "/api/admin/users/{user_id}/enrollments", responses(
    (status = CREATED, body = Enrollment),
    (status = NOT_FOUND, description = "No such course"),
))]
pub async fn grant_enrollment(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(user_id): Path<i64>,
    Json(grant): Json<EnrollmentGrant>,
) -> Result<(StatusCode, Json<Enrollment>), ApiError> {
    let enrollment = progress::grant_enrollment(&db, user_id, grant.course_id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AchievementGrant {
    pub text: String,
}

#[utoipa::path(post, path = "/api/admin/users/{user_id}/achievements", responses(
    (status = CREATED, body = UserAchievement),
    (status = NOT_FOUND, description = "No such user"),
))]
pub async fn grant_achievement(
    State(db): State<SqlitePool>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<i64>,
    Json(grant): Json<AchievementGrant>,
) -> Result<(StatusCode, Json<UserAchievement>), ApiError> {
    let awarded = user::grant_achievement(&db, user_id, admin.id, &grant.text).await?;
    Ok((StatusCode::CREATED, Json(awarded)))
}

#[utoipa::path(get, path = "/api/admin/courses", responses((status = OK, body = Vec<CourseDetail>)))]
pub async fn list_courses(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
) -> Result<Json<Vec<CourseDetail>>, ApiError> {
    Ok(Json(course::list_all(&db).await?))
}

#[utoipa::path(post, path = "/api/admin/courses", responses((status = CREATED, body = CourseDetail)))]
pub async fn create_course(
    State(db): State<SqlitePool>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<CoursePayload>,
) -> Result<(StatusCode, Json<CourseDetail>), ApiError> {
    payload.validate()?;
    let course_id = course::create_course(&db, admin.id, &payload).await?;
    let course = course::get_course(&db, course_id).await?;
    let detail = course::course_detail(&db, &course, true).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

#[utoipa::path(put, path = "/api/admin/courses/{course_id}", responses(
    (status = OK, body = CourseDetail),
    (status = NOT_FOUND, description = "No such course"),
))]
pub async fn replace_course(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(course_id): Path<i64>,
    Json(payload): Json<CoursePayload>,
) -> Result<Json<CourseDetail>, ApiError> {
    payload.validate()?;
    course::replace_course(&db, course_id, &payload).await?;
    let course = course::get_course(&db, course_id).await?;
    let detail = course::course_detail(&db, &course, true).await?;
    Ok(Json(detail))
}

fn default_published() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PublishBody {
    #[serde(default = "default_published")]
    pub published: bool,
}

#[utoipa::path(post, path = "/api/admin/courses/{course_id}/publish", responses(
    (status = NO_CONTENT),
    (status = NOT_FOUND, description = "No such course"),
))]
pub async fn publish_course(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(course_id): Path<i64>,
    Json(body): Json<PublishBody>,
) -> Result<StatusCode, ApiError> {
    course::set_published(&db, course_id, body.published).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(delete, path = "/api/admin/courses/{course_id}", responses((status = NO_CONTENT)))]
pub async fn delete_course(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(course_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    course::delete_course(&db, course_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(post, path = "/api/admin/courses/{course_id}/questions", responses(
    (status = CREATED, body = QuestionView),
    (status = NOT_FOUND, description = "No such course"),
))]
pub async fn create_question(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(course_id): Path<i64>,
    Json(new): Json<NewQuestion>,
) -> Result<(StatusCode, Json<QuestionView>), ApiError> {
    let question = quiz::create_question(&db, course_id, &new).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

#[derive(Debug, Default, Deserialize)]
pub struct PurchaseQuery {
    pub status: Option<PurchaseStatus>,
}

#[utoipa::path(get, path = "/api/admin/purchases", responses((status = OK, body = Vec<Purchase>)))]
pub async fn list_purchases(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Query(query): Query<PurchaseQuery>,
) -> Result<Json<Vec<Purchase>>, ApiError> {
    Ok(Json(purchase::list_purchases(&db, query.status).await?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PurchaseStatusUpdate {
    pub status: PurchaseStatus,
}

#[utoipa::path(post, path = "/api/admin/purchases/{purchase_id}/status", responses(
    (status = OK, body = Purchase),
    (status = NOT_FOUND, description = "No such purchase"),
))]
pub async fn set_purchase_status(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(purchase_id): Path<i64>,
    Json(update): Json<PurchaseStatusUpdate>,
) -> Result<Json<Purchase>, ApiError> {
    let purchase = purchase::set_purchase_status(&db, purchase_id, update.status).await?;
    Ok(Json(purchase))
}

#[utoipa::path(get, path = "/api/admin/teams", responses((status = OK, body = Vec<TeamView>)))]
pub async fn list_teams(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
) -> Result<Json<Vec<TeamView>>, ApiError> {
    Ok(Json(team::list_teams(&db).await?))
}

#[utoipa::path(post, path = "/api/admin/teams", responses((status = CREATED, body = TeamView)))]
pub async fn create_team(
    State(db): State<SqlitePool>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<TeamUpdate>,
) -> Result<(StatusCode, Json<TeamView>), ApiError> {
    payload.validate()?;
    let team = team::admin_create_team(&db, admin.id, &payload).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

#[utoipa::path(put, path = "/api/admin/teams/{team_id}", responses(
    (status = OK, body = TeamView),
    (status = NOT_FOUND, description = "No such team"),
))]
pub async fn update_team(
    State(db): State<SqlitePool>,
    AdminUser(admin): AdminUser,
    Path(team_id): Path<i64>,
    Json(update): Json<TeamUpdate>,
) -> Result<Json<TeamView>, ApiError> {
    update.validate()?;
    let team = team::update_team(&db, team_id, admin.id, &update).await?;
    Ok(Json(team))
}

#[utoipa::path(delete, path = "/api/admin/teams/{team_id}", responses((status = NO_CONTENT)))]
pub async fn delete_team(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(team_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    team::delete_team(&db, team_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(get, path = "/api/admin/competitions", responses((status = OK, body = Vec<Competition>)))]
pub async fn list_competitions(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
) -> Result<Json<Vec<Competition>>, ApiError> {
    Ok(Json(competition::list_competitions(&db).await?))
}

#[utoipa::path(post, path = "/api/admin/competitions", responses(
    (status = CREATED, body = Competition),
    (status = NOT_FOUND, description = "No such team"),
))]
pub async fn create_competition(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Json(payload): Json<CompetitionPayload>,
) -> Result<(StatusCode, Json<Competition>), ApiError> {
    payload.validate()?;
    let created = competition::create_competition(&db, &payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(put, path = "/api/admin/competitions/{competition_id}", responses(
    (status = OK, body = Competition),
    (status = NOT_FOUND, description = "No such competition"),
))]
pub async fn update_competition(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(competition_id): Path<i64>,
    Json(payload): Json<CompetitionPayload>,
) -> Result<Json<Competition>, ApiError> {
    payload.validate()?;
    Ok(Json(competition::update_competition(&db, competition_id, &payload).await?))
}

#[utoipa::path(delete, path = "/api/admin/competitions/{competition_id}", responses((status = OK)))]
pub async fn delete_competition(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(competition_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    competition::delete_competition(&db, competition_id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmissionQuery {
    pub status: Option<SubmissionStatus>,
}

#[utoipa::path(get, path = "/api/admin/competition-submissions", responses((status = OK, body = Vec<Submission>)))]
pub async fn list_submissions(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Query(query): Query<SubmissionQuery>,
) -> Result<Json<Vec<Submission>>, ApiError> {
    Ok(Json(competition::list_submissions(&db, query.status).await?))
}

#[utoipa::path(put, path = "/api/admin/competition-submissions/{submission_id}", responses(
    (status = OK, body = Submission),
    (status = NOT_FOUND, description = "No such submission"),
))]
pub async fn update_submission(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(submission_id): Path<i64>,
    Json(payload): Json<SubmissionPayload>,
) -> Result<Json<Submission>, ApiError> {
    payload.validate()?;
    Ok(Json(competition::update_submission(&db, submission_id, &payload).await?))
}

#[utoipa::path(post, path = "/api/admin/competition-submissions/{submission_id}/approve", responses(
    (status = OK, body = Submission),
    (status = NOT_FOUND, description = "No such submission"),
))]
pub async fn approve_submission(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(submission_id): Path<i64>,
) -> Result<Json<Submission>, ApiError> {
    let sub =
        competition::set_submission_status(&db, submission_id, SubmissionStatus::Approved).await?;
    Ok(Json(sub))
}

#[utoipa::path(post, path = "/api/admin/competition-submissions/{submission_id}/reject", responses(
    (status = OK, body = Submission),
    (status = NOT_FOUND, description = "No such submission"),
))]
pub async fn reject_submission(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(submission_id): Path<i64>,
) -> Result<Json<Submission>, ApiError> {
    let sub =
        competition::set_submission_status(&db, submission_id, SubmissionStatus::Rejected).await?;
    Ok(Json(sub))
}

#[utoipa::path(get, path = "/api/admin/events", responses((status = OK, body = Vec<Event>)))]
pub async fn list_events(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
) -> Result<Json<Vec<Event>>, ApiError> {
    Ok(Json(event::list_all(&db).await?))
}

#[utoipa::path(put, path = "/api/admin/events/{event_id}", responses(
    (status = OK, body = Event),
    (status = NOT_FOUND, description = "No such event"),
))]
pub async fn update_event(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(event_id): Path<i64>,
    Json(payload): Json<EventPayload>,
) -> Result<Json<Event>, ApiError> {
    payload.validate()?;
    Ok(Json(event::update_event(&db, event_id, &payload).await?))
}

#[utoipa::path(post, path = "/api/admin/events/{event_id}/publish", responses(
    (status = OK, body = Event),
    (status = NOT_FOUND, description = "No such event"),
))]
pub async fn publish_event(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(event_id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(event::set_status(&db, event_id, EventStatus::Published).await?))
}

#[utoipa::path(post, path = "/api/admin/events/{event_id}/reject", responses(
    (status = OK, body = Event),
    (status = NOT_FOUND, description = "No such event"),
))]
pub async fn reject_event(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(event_id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(event::set_status(&db, event_id, EventStatus::Rejected).await?))
}

#[utoipa::path(post, path = "/api/admin/bytesize", responses((status = CREATED)))]
pub async fn create_bytesize_item(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Json(new): Json<NewFeedItem>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    new.validate()?;
    let id = bytesize::create_item(&db, &new).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

#[utoipa::path(delete, path = "/api/admin/bytesize/{item_id}", responses((status = NO_CONTENT)))]
pub async fn delete_bytesize_item(
    State(db): State<SqlitePool>,
    _admin: AdminUser,
    Path(item_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    bytesize::delete_item(&db, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
