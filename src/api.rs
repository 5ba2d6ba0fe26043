pub mod admin;
pub mod public;
pub mod user;

use axum::{
    Router,
    extract::FromRef,
    routing::{delete, get, post, put},
};
use sqlx::SqlitePool;
use std::time::Duration;

use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::JwtKeys;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db: SqlitePool,
    pub jwt: JwtKeys,
}

#[derive(OpenApi)]
#[openapi(paths(
    public::health,
    public::list_courses,
    public::course_detail,
    public::get_lesson,
    public::list_events,
    public::get_event,
    public::list_teams,
    public::list_submissions,
    public::bytesize_feed,
    user::register,
    user::login,
    user::refresh,
    user::logout,
    user::me,
    user::update_me,
    user::continue_courses,
    user::purchase_course,
    user::course_progress,
    user::record_progress,
    user::list_questions,
    user::answer_question,
    user::create_team,
    user::join_team,
    user::create_submission,
    user::create_event,
    user::my_events,
    user::toggle_like,
    admin::list_users,
    admin::set_user_role,
    admin::grant_enrollment,
    admin::grant_achievement,
    admin::list_courses,
    admin::create_course,
    admin::replace_course,
    admin::publish_course,
    admin::delete_course,
    admin::create_question,
    admin::list_purchases,
    admin::set_purchase_status,
    admin::list_teams,
    admin::create_team,
    admin::update_team,
    admin::delete_team,
    admin::list_competitions,
    admin::create_competition,
    admin::update_competition,
    admin::delete_competition,
    admin::list_submissions,
    admin::update_submission,
    admin::approve_submission,
    admin::reject_submission,
    admin::list_events,
    admin::update_event,
    admin::publish_event,
    admin::reject_event,
    admin::create_bytesize_item,
    admin::delete_bytesize_item,
))]
struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(user::register))
        .route("/login", post(user::login))
        .route("/refresh", post(user::refresh))
        .route("/logout", post(user::logout))
        .route("/me", get(user::me).put(user::update_me));

    let course_routes = Router::new()
        .route("/", get(public::list_courses))
        .route("/continue", get(user::continue_courses))
        .route("/{course_id}", get(public::course_detail))
        .route("/{course_id}/lessons/{lesson_id}", get(public::get_lesson))
        .route("/{course_id}/purchase", post(user::purchase_course))
        .route("/{course_id}/progress", get(user::course_progress))
        .route(
            "/{course_id}/lessons/{lesson_id}/progress",
            post(user::record_progress),
        )
        .route("/{course_id}/questions", get(user::list_questions))
        .route("/questions/{question_id}/answer", post(user::answer_question));

    let team_routes = Router::new()
        .route("/", get(public::list_teams).post(user::create_team))
        .route("/{team_id}/join", post(user::join_team));

    let event_routes = Router::new()
        .route("/", get(public::list_events).post(user::create_event))
        .route("/mine/list", get(user::my_events))
        .route("/{event_id}", get(public::get_event));

    let bytesize_routes = Router::new()
        .route("/", get(public::bytesize_feed))
        .route("/{item_id}/like", post(user::toggle_like));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{user_id}/role", post(admin::set_user_role))
        .route("/users/{user_id}/enrollments", post(admin::grant_enrollment))
        .route("/users/{user_id}/achievements", post(admin::grant_achievement))
        .route("/courses", get(admin::list_courses).post(admin::create_course))
        .route(
            "/courses/{course_id}",
            put(admin::replace_course).delete(admin::delete_course),
        )
        .route("/courses/{course_id}/publish", post(admin::publish_course))
        .route("/courses/{course_id}/questions", post(admin::create_question))
        .route("/purchases", get(admin::list_purchases))
        .route("/purchases/{purchase_id}/status", post(admin::set_purchase_status))
        .route("/teams", get(admin::list_teams).post(admin::create_team))
        .route("/teams/{team_id}", put(admin::update_team).delete(admin::delete_team))
        .route(
            "/competitions",
            get(admin::list_competitions).post(admin::create_competition),
        )
        .route(
            "/competitions/{competition_id}",
            put(admin::update_competition).delete(admin::delete_competition),
        )
        .route("/competition-submissions", get(admin::list_submissions))
        .route(
            "/competition-submissions/{submission_id}",
            put(admin::update_submission),
        )
        .route(
            "/competition-submissions/{submission_id}/approve",
            post(admin::approve_submission),
        )
        .route(
            "/competition-submissions/{submission_id}/reject",
            post(admin::reject_submission),
        )
        .route("/events", get(admin::list_events))
        .route("/events/{event_id}", put(admin::update_event))
        .route("/events/{event_id}/publish", post(admin::publish_event))
        .route("/events/{event_id}/reject", post(admin::reject_event))
        .route("/bytesize", post(admin::create_bytesize_item))
        .route("/bytesize/{item_id}", delete(admin::delete_bytesize_item));

    let submission_routes = Router::new()
        .route("/", get(public::list_submissions).post(user::create_submission));

    Router::new()
        .route("/health", get(public::health))
        .nest("/auth", auth_routes)
        .nest("/courses", course_routes)
        .nest("/teams", team_routes)
        .nest("/events", event_routes)
        .nest("/submissions", submission_routes)
        .nest("/bytesize", bytesize_routes)
        .nest("/api/admin", admin_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;
    use crate::utils::test_pool;

    #[tokio::test]
    async fn router_serves_health_through_the_middleware_stack() {
        let state = AppState {
            db: test_pool().await,
            jwt: crate::auth::JwtKeys::from_secret(b"test-secret"),
        };
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_success());
    }
}
