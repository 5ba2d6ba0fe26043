//! Routes for signed-in learners, plus the auth endpoints themselves.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{
    access::user_has_course_access,
    auth::{AuthUser, JwtKeys, OptionalUser},
    bytesize::{self, LikeResult},
    competition::{self, Submission, SubmissionPayload},
    course,
    error::{ApiError, FieldErrors},
    event::{self, Event, EventPayload},
    progress::{self, ContinueItem, CourseProgress, LessonProgress, ProgressUpdate},
    purchase::{self, NewPurchase, Purchase},
    quiz::{self, AnswerResult, QuestionView},
    team::{self, JoinResult, NewTeam, TeamView},
    user::{
        self, AuthTokens, NewUser, ProfileUpdate, RefreshedTokens, UserProfile,
    },
};

fn validate_registration(new: &NewUser) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    if !new.email.contains('@') {
        errors.push("email", "must be a valid email address");
    }
    if new.password.len() < 8 {
        errors.push("password", "must be at least 8 characters");
    }
    if new.full_name.trim().len() < 3 {
        errors.push("fullName", "must be at least 3 characters");
    }
    if let Some(age) = new.age {
        if !(10..=100).contains(&age) {
            errors.push("age", "must be between 10 and 100");
        }
    }
    errors.into_result()
}

#[utoipa::path(post, path = "/auth/register", responses(
    (status = CREATED, body = AuthTokens),
    (status = CONFLICT, description = "Email already registered"),
))]
pub async fn register(
    State(db): State<SqlitePool>,
    State(keys): State<JwtKeys>,
    Json(new): Json<NewUser>,
) -> Result<(StatusCode, Json<AuthTokens>), ApiError> {
    validate_registration(&new)?;
    let tokens = user::register(&db, &keys, new).await?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[utoipa::path(post, path = "/auth/login", responses(
    (status = OK, body = AuthTokens),
    (status = UNAUTHORIZED, description = "Invalid credentials"),
))]
pub async fn login(
    State(db): State<SqlitePool>,
    State(keys): State<JwtKeys>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthTokens>, ApiError> {
    let tokens = user::login(&db, &keys, &req.email, &req.password).await?;
    Ok(Json(tokens))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[utoipa::path(post, path = "/auth/refresh", responses(
    (status = OK, body = RefreshedTokens),
    (status = UNAUTHORIZED, description = "Invalid refresh token"),
))]
pub async fn refresh(
    State(db): State<SqlitePool>,
    State(keys): State<JwtKeys>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshedTokens>, ApiError> {
    let tokens = user::refresh(&db, &keys, &req.refresh_token).await?;
    Ok(Json(tokens))
}

#[utoipa::path(post, path = "/auth/logout", responses((status = OK, description = "Session closed")))]
pub async fn logout(
    State(db): State<SqlitePool>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    user::logout(&db, &req.refresh_token).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[utoipa::path(get, path = "/auth/me", responses((status = OK, body = UserProfile)))]
pub async fn me(
    State(db): State<SqlitePool>,
    auth: AuthUser,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(user::get_profile(&db, auth.id).await?))
}

#[utoipa::path(put, path = "/auth/me", responses((status = OK, body = UserProfile)))]
pub async fn update_me(
    State(db): State<SqlitePool>,
    auth: AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(user::update_profile(&db, auth.id, update).await?))
}

#[utoipa::path(get, path = "/courses/continue", responses((status = OK, body = Vec<ContinueItem>)))]
pub async fn continue_courses(
    State(db): State<SqlitePool>,
    auth: AuthUser,
) -> Result<Json<Vec<ContinueItem>>, ApiError> {
    Ok(Json(progress::continue_courses(&db, auth.id).await?))
}

#[utoipa::path(post, path = "/courses/{course_id}/purchase", responses(
    (status = CREATED, body = Purchase),
    (status = NOT_FOUND, description = "No such course"),
))]
pub async fn purchase_course(
    State(db): State<SqlitePool>,
    auth: AuthUser,
    Path(course_id): Path<i64>,
    Json(new): Json<NewPurchase>,
) -> Result<(StatusCode, Json<Purchase>), ApiError> {
    new.validate()?;
    let purchase = purchase::create_purchase(&db, auth.id, course_id, &new).await?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

#[utoipa::path(get, path = "/courses/{course_id}/progress", responses((status = OK, body = CourseProgress)))]
pub async fn course_progress(
    State(db): State<SqlitePool>,
    auth: AuthUser,
    Path(course_id): Path<i64>,
) -> Result<Json<CourseProgress>, ApiError> {
    course::get_course(&db, course_id).await?;
    Ok(Json(progress::get_course_progress(&db, auth.id, course_id).await?))
}

#[utoipa::path(post, path = "/courses/{course_id}/lessons/{lesson_id}/progress", responses(
    (status = OK, body = LessonProgress),
    (status = FORBIDDEN, description = "No access to this course"),
))]
pub async fn record_progress(
    State(db): State<SqlitePool>,
    auth: AuthUser,
    Path((course_id, lesson_id)): Path<(i64, i64)>,
    Json(update): Json<ProgressUpdate>,
) -> Result<Json<LessonProgress>, ApiError> {
    update.validate()?;
    let progress =
        progress::record_lesson_progress(&db, auth.id, course_id, lesson_id, &update).await?;
    Ok(Json(progress))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionQuery {
    pub module_id: Option<i64>,
    pub lesson_id: Option<i64>,
}

#[utoipa::path(get, path = "/courses/{course_id}/questions", responses(
    (status = OK, body = Vec<QuestionView>),
    (status = FORBIDDEN, description = "No access to this course"),
))]
pub async fn list_questions(
    State(db): State<SqlitePool>,
    OptionalUser(user): OptionalUser,
    Path(course_id): Path<i64>,
    Query(query): Query<QuestionQuery>,
) -> Result<Json<Vec<QuestionView>>, ApiError> {
    let course = course::get_course(&db, course_id).await?;
    if !user_has_course_access(&db, user.map(|u| u.id), &course).await? {
        return Err(ApiError::Forbidden("No access"));
    }
    let questions = quiz::list_questions(&db, course_id, query.module_id, query.lesson_id).await?;
    Ok(Json(questions))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub selected_index: i64,
}

#[utoipa::path(post, path = "/courses/questions/{question_id}/answer", responses(
    (status = OK, body = AnswerResult),
    (status = NOT_FOUND, description = "No such question"),
))]
pub async fn answer_question(
    State(db): State<SqlitePool>,
    auth: AuthUser,
    Path(question_id): Path<i64>,
    Json(payload): Json<AnswerPayload>,
) -> Result<Json<AnswerResult>, ApiError> {
    let result =
        quiz::answer_question(&db, auth.id, question_id, payload.selected_index).await?;
    Ok(Json(result))
}

#[utoipa::path(post, path = "/teams", responses((status = CREATED, body = TeamView)))]
pub async fn create_team(
    State(db): State<SqlitePool>,
    auth: AuthUser,
    Json(new): Json<NewTeam>,
) -> Result<(StatusCode, Json<TeamView>), ApiError> {
    new.validate()?;
    let team = team::create_team(&db, auth.id, &new).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

#[utoipa::path(post, path = "/teams/{team_id}/join", responses(
    (status = OK, body = JoinResult),
    (status = NOT_FOUND, description = "No such team"),
))]
pub async fn join_team(
    State(db): State<SqlitePool>,
    auth: AuthUser,
    Path(team_id): Path<i64>,
) -> Result<Json<JoinResult>, ApiError> {
    Ok(Json(team::join_team(&db, auth.id, team_id).await?))
}

#[utoipa::path(post, path = "/submissions", responses((status = CREATED, body = Submission)))]
pub async fn create_submission(
    State(db): State<SqlitePool>,
    auth: AuthUser,
    Json(payload): Json<SubmissionPayload>,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    payload.validate()?;
    let submission = competition::create_submission(&db, auth.id, &payload).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

#[utoipa::path(post, path = "/events", responses((status = CREATED, body = Event)))]
pub async fn create_event(
    State(db): State<SqlitePool>,
    auth: AuthUser,
    Json(payload): Json<EventPayload>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    payload.validate()?;
    let event = event::create_proposal(&db, auth.id, &payload).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[utoipa::path(get, path = "/events/mine/list", responses((status = OK, body = Vec<Event>)))]
pub async fn my_events(
    State(db): State<SqlitePool>,
    auth: AuthUser,
) -> Result<Json<Vec<Event>>, ApiError> {
    Ok(Json(event::list_mine(&db, auth.id).await?))
}

#[utoipa::path(post, path = "/bytesize/{item_id}/like", responses(
    (status = OK, body = LikeResult),
    (status = NOT_FOUND, description = "No such item"),
))]
pub async fn toggle_like(
    State(db): State<SqlitePool>,
    auth: AuthUser,
    Path(item_id): Path<i64>,
) -> Result<Json<LikeResult>, ApiError> {
    Ok(Json(bytesize::toggle_like(&db, auth.id, item_id).await?))
}
