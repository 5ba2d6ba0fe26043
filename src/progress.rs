use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{
    access::user_has_course_access,
    course::{self, AuthorInfo, ModuleView},
    error::{ApiError, FieldErrors},
    utils::now_local,
};

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub status: String,
    pub progress_percentage: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: time::OffsetDateTime,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub id: i64,
    pub enrollment_id: i64,
    pub lesson_id: i64,
    pub is_completed: bool,
    pub watch_time_seconds: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<time::OffsetDateTime>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub is_completed: Option<bool>,
    pub watch_time_seconds: Option<i64>,
}

impl ProgressUpdate {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if let Some(seconds) = self.watch_time_seconds {
            if seconds < 0 {
                errors.push("watchTimeSeconds", "must be non-negative");
            }
        }
        errors.into_result()
    }
}

async fn find_enrollment(
    db: &SqlitePool,
    user_id: i64,
    course_id: i64,
) -> Result<Option<Enrollment>, ApiError> {
    let enrollment = sqlx::query_as::<_, Enrollment>(
        "SELECT id, user_id, course_id, status, progress_percentage, created_at, updated_at
         FROM enrollment WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(db)
    .await?;
    Ok(enrollment)
}

async fn ensure_enrollment(
    db: &SqlitePool,
    user_id: i64,
    course_id: i64,
) -> Result<Enrollment, ApiError> {
    if let Some(enrollment) = find_enrollment(db, user_id, course_id).await? {
        return Ok(enrollment);
    }
    let now = now_local();
    sqlx::query(
        "INSERT INTO enrollment (user_id, course_id, status, created_at, updated_at)
         VALUES (?, ?, 'active', ?, ?)",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;
    find_enrollment(db, user_id, course_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("enrollment vanished after insert").into())
}

async fn get_lesson_progress(
    db: &SqlitePool,
    enrollment_id: i64,
    lesson_id: i64,
) -> Result<Option<LessonProgress>, ApiError> {
    let progress = sqlx::query_as::<_, LessonProgress>(
        "SELECT id, enrollment_id, lesson_id, is_completed, watch_time_seconds, completed_at
         FROM lesson_progress WHERE enrollment_id = ? AND lesson_id = ?",
    )
    .bind(enrollment_id)
    .bind(lesson_id)
    .fetch_optional(db)
    .await?;
    Ok(progress)
}

/// Recompute an enrollment's completion percentage from its per-lesson
/// flags. When the course currently has no lessons the previous value is
/// left untouched rather than reset.
pub(crate) async fn update_course_progress(
    db: &SqlitePool,
    enrollment_id: i64,
) -> Result<(), ApiError> {
    let course_id: Option<i64> =
        sqlx::query_scalar("SELECT course_id FROM enrollment WHERE id = ?")
            .bind(enrollment_id)
            .fetch_optional(db)
            .await?;
    let Some(course_id) = course_id else {
        return Ok(());
    };
    let total = course::total_lessons(db, course_id).await?;
    if total == 0 {
        return Ok(());
    }
    let completed: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM lesson_progress WHERE enrollment_id = ? AND is_completed = 1",
    )
    .bind(enrollment_id)
    .fetch_one(db)
    .await?;
    let percentage = completed as f64 / total as f64 * 100.0;
    sqlx::query("UPDATE enrollment SET progress_percentage = ?, updated_at = ? WHERE id = ?")
        .bind(percentage)
        .bind(now_local())
        .bind(enrollment_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Record a watch/completion report for one lesson. Creates the enrollment
/// lazily, upserts the per-lesson row overwriting only the supplied fields,
/// then refreshes the aggregate percentage.
///
/// `completed_at` is stamped whenever the payload carries
/// `is_completed=true`, not only on the first transition.
pub async fn record_lesson_progress(
    db: &SqlitePool,
    user_id: i64,
    course_id: i64,
    lesson_id: i64,
    update: &ProgressUpdate,
) -> Result<LessonProgress, ApiError> {
    let course = course::get_course(db, course_id).await?;
    let in_course: Option<i64> = sqlx::query_scalar(
        "SELECT lesson.id FROM lesson
         JOIN course_module ON course_module.id = lesson.module_id
         WHERE lesson.id = ? AND course_module.course_id = ?",
    )
    .bind(lesson_id)
    .bind(course_id)
    .fetch_optional(db)
    .await?;
    if in_course.is_none() {
        return Err(ApiError::NotFound("Lesson"));
    }

    if !user_has_course_access(db, Some(user_id), &course).await? {
        return Err(ApiError::Forbidden("No access"));
    }

    let enrollment = ensure_enrollment(db, user_id, course_id).await?;

    match get_lesson_progress(db, enrollment.id, lesson_id).await? {
        Some(existing) => {
            let is_completed = update.is_completed.unwrap_or(existing.is_completed);
            let watch_time = update.watch_time_seconds.unwrap_or(existing.watch_time_seconds);
            let completed_at = if update.is_completed == Some(true) {
                Some(now_local())
            } else {
                existing.completed_at
            };
            sqlx::query(
                "UPDATE lesson_progress
                 SET is_completed = ?, watch_time_seconds = ?, completed_at = ?
                 WHERE id = ?",
            )
            .bind(is_completed)
            .bind(watch_time)
            .bind(completed_at)
            .bind(existing.id)
            .execute(db)
            .await?;
        }
        None => {
            let is_completed = update.is_completed.unwrap_or(false);
            let completed_at = is_completed.then(now_local);
            sqlx::query(
                "INSERT INTO lesson_progress
                     (enrollment_id, lesson_id, is_completed, watch_time_seconds, completed_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(enrollment.id)
            .bind(lesson_id)
            .bind(is_completed)
            .bind(update.watch_time_seconds.unwrap_or(0))
            .bind(completed_at)
            .execute(db)
            .await?;
        }
    }

    update_course_progress(db, enrollment.id).await?;

    get_lesson_progress(db, enrollment.id, lesson_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("lesson progress vanished after upsert").into())
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    pub completion: f64,
    pub lessons: Vec<LessonProgress>,
}

pub async fn get_course_progress(
    db: &SqlitePool,
    user_id: i64,
    course_id: i64,
) -> Result<CourseProgress, ApiError> {
    let Some(enrollment) = find_enrollment(db, user_id, course_id).await? else {
        return Ok(CourseProgress {
            completion: 0.0,
            lessons: vec![],
        });
    };
    let lessons = sqlx::query_as::<_, LessonProgress>(
        "SELECT id, enrollment_id, lesson_id, is_completed, watch_time_seconds, completed_at
         FROM lesson_progress WHERE enrollment_id = ?",
    )
    .bind(enrollment.id)
    .fetch_all(db)
    .await?;
    Ok(CourseProgress {
        completion: enrollment.progress_percentage,
        lessons,
    })
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContinueItem {
    pub id: i64,
    pub title: String,
    pub difficulty: String,
    pub author: AuthorInfo,
    pub price: f64,
    pub modules: Vec<ModuleView>,
    pub completed_lessons: i64,
    pub total_lessons: i64,
    pub progress: f64,
}

/// Courses the user has actually started: at least one completed lesson,
/// most recently touched first.
pub async fn continue_courses(db: &SqlitePool, user_id: i64) -> Result<Vec<ContinueItem>, ApiError> {
    let enrollments = sqlx::query_as::<_, Enrollment>(
        "SELECT id, user_id, course_id, status, progress_percentage, created_at, updated_at
         FROM enrollment WHERE user_id = ? ORDER BY updated_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let mut items = Vec::new();
    for enrollment in enrollments {
        let completed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lesson_progress WHERE enrollment_id = ? AND is_completed = 1",
        )
        .bind(enrollment.id)
        .fetch_one(db)
        .await?;
        if completed < 1 {
            continue;
        }
        let course = course::get_course(db, enrollment.course_id).await?;
        let total = course::total_lessons(db, course.id).await?;
        items.push(ContinueItem {
            id: course.id,
            title: course.title,
            difficulty: course.difficulty,
            author: course::author_info(db, course.author_id, false).await?,
            price: course.price,
            modules: course::module_views(db, course.id, true).await?,
            completed_lessons: completed,
            total_lessons: total,
            progress: enrollment.progress_percentage,
        });
    }
    Ok(items)
}

/// Admin-side grant: create an active enrollment, or hand back the existing
/// one unchanged.
pub async fn grant_enrollment(
    db: &SqlitePool,
    user_id: i64,
    course_id: i64,
) -> Result<Enrollment, ApiError> {
    course::get_course(db, course_id).await?;
    ensure_enrollment(db, user_id, course_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{fixtures, test_pool};

    fn completed() -> ProgressUpdate {
        ProgressUpdate {
            is_completed: Some(true),
            watch_time_seconds: None,
        }
    }

    #[tokio::test]
    async fn completing_every_lesson_reaches_exactly_100() {
        let db = test_pool().await;
        let author = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let student = fixtures::user(&db, "s@example.com", "USER").await;
        let (course_id, lessons) = fixtures::course(&db, author, true, 0.0, &[2, 1]).await;

        for lesson_id in &lessons {
            record_lesson_progress(&db, student, course_id, *lesson_id, &completed())
                .await
                .unwrap();
        }
        let progress = get_course_progress(&db, student, course_id).await.unwrap();
        assert_eq!(progress.completion, 100.0);
        assert_eq!(progress.lessons.len(), 3);
    }

    #[tokio::test]
    async fn first_write_creates_the_enrollment() {
        let db = test_pool().await;
        let author = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let student = fixtures::user(&db, "s@example.com", "USER").await;
        let (course_id, lessons) = fixtures::course(&db, author, true, 0.0, &[2]).await;

        assert!(find_enrollment(&db, student, course_id).await.unwrap().is_none());
        record_lesson_progress(
            &db,
            student,
            course_id,
            lessons[0],
            &ProgressUpdate {
                is_completed: None,
                watch_time_seconds: Some(30),
            },
        )
        .await
        .unwrap();
        let enrollment = find_enrollment(&db, student, course_id).await.unwrap().unwrap();
        assert_eq!(enrollment.status, "active");
        assert_eq!(enrollment.progress_percentage, 0.0);
    }

    #[tokio::test]
    async fn partial_updates_keep_unsupplied_fields() {
        let db = test_pool().await;
        let author = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let student = fixtures::user(&db, "s@example.com", "USER").await;
        let (course_id, lessons) = fixtures::course(&db, author, true, 0.0, &[1]).await;
        let lesson = lessons[0];

        record_lesson_progress(&db, student, course_id, lesson, &completed())
            .await
            .unwrap();
        let after_watch = record_lesson_progress(
            &db,
            student,
            course_id,
            lesson,
            &ProgressUpdate {
                is_completed: None,
                watch_time_seconds: Some(120),
            },
        )
        .await
        .unwrap();
        assert!(after_watch.is_completed);
        assert_eq!(after_watch.watch_time_seconds, 120);
        assert!(after_watch.completed_at.is_some());

        // Unsetting the flag leaves the old completion stamp in place.
        let unset = record_lesson_progress(
            &db,
            student,
            course_id,
            lesson,
            &ProgressUpdate {
                is_completed: Some(false),
                watch_time_seconds: None,
            },
        )
        .await
        .unwrap();
        assert!(!unset.is_completed);
        assert_eq!(unset.watch_time_seconds, 120);
        assert!(unset.completed_at.is_some());
    }

    #[tokio::test]
    async fn no_access_is_forbidden() {
        let db = test_pool().await;
        let author = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let student = fixtures::user(&db, "s@example.com", "USER").await;
        let (course_id, lessons) = fixtures::course(&db, author, false, 5000.0, &[1]).await;

        let err = record_lesson_progress(&db, student, course_id, lessons[0], &completed())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn lesson_outside_course_is_not_found() {
        let db = test_pool().await;
        let author = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let student = fixtures::user(&db, "s@example.com", "USER").await;
        let (course_a, _) = fixtures::course(&db, author, true, 0.0, &[1]).await;
        let (_, other_lessons) = fixtures::course(&db, author, true, 0.0, &[1]).await;

        let err = record_lesson_progress(&db, student, course_a, other_lessons[0], &completed())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn recompute_with_zero_lessons_leaves_percentage_alone() {
        let db = test_pool().await;
        let author = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let student = fixtures::user(&db, "s@example.com", "USER").await;
        let (course_id, _) = fixtures::course(&db, author, true, 0.0, &[]).await;

        let enrollment = grant_enrollment(&db, student, course_id).await.unwrap();
        sqlx::query("UPDATE enrollment SET progress_percentage = 42 WHERE id = ?")
            .bind(enrollment.id)
            .execute(&db)
            .await
            .unwrap();

        update_course_progress(&db, enrollment.id).await.unwrap();
        let enrollment = find_enrollment(&db, student, course_id).await.unwrap().unwrap();
        assert_eq!(enrollment.progress_percentage, 42.0);
    }

    #[tokio::test]
    async fn grant_enrollment_is_idempotent() {
        let db = test_pool().await;
        let author = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let student = fixtures::user(&db, "s@example.com", "USER").await;
        let (course_id, _) = fixtures::course(&db, author, false, 5000.0, &[1]).await;

        let first = grant_enrollment(&db, student, course_id).await.unwrap();
        let second = grant_enrollment(&db, student, course_id).await.unwrap();
        assert_eq!(first.id, second.id);
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM enrollment WHERE user_id = ? AND course_id = ?")
                .bind(student)
                .bind(course_id)
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn continue_list_requires_a_completed_lesson() {
        let db = test_pool().await;
        let author = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let student = fixtures::user(&db, "s@example.com", "USER").await;
        let (started, started_lessons) = fixtures::course(&db, author, true, 0.0, &[2]).await;
        let (only_watched, watched_lessons) = fixtures::course(&db, author, true, 0.0, &[1]).await;

        record_lesson_progress(&db, student, started, started_lessons[0], &completed())
            .await
            .unwrap();
        record_lesson_progress(
            &db,
            student,
            only_watched,
            watched_lessons[0],
            &ProgressUpdate {
                is_completed: None,
                watch_time_seconds: Some(10),
            },
        )
        .await
        .unwrap();

        let items = continue_courses(&db, student).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, started);
        assert_eq!(items[0].completed_lessons, 1);
        assert_eq!(items[0].total_lessons, 2);
        assert_eq!(items[0].progress, 50.0);
    }
}
