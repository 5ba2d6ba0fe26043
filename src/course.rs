use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{
    error::{ApiError, FieldErrors},
    utils::now_local,
};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub author_id: i64,
    pub price: f64,
    pub is_free: bool,
    pub is_published: bool,
    pub cover_image_url: Option<String>,
    pub estimated_hours: Option<i64>,
    pub total_modules: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorInfo {
    pub id: i64,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ModuleRow {
    id: i64,
    title: String,
    description: Option<String>,
    order_index: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct LessonRow {
    id: i64,
    module_id: i64,
    title: String,
    content: Option<String>,
    duration: Option<String>,
    order_index: i64,
    is_free_preview: bool,
    video_url: Option<String>,
    presentation_url: Option<String>,
    slides: String,
    content_type: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
}

/// A lesson as exposed to a given caller. Fields past the preview set are
/// `None` (and omitted from JSON) when the caller has no course access and
/// the lesson is not a free preview.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LessonView {
    pub id: i64,
    pub title: String,
    pub duration: Option<String>,
    pub is_free_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slides: Option<Vec<Slide>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl LessonView {
    fn from_row(lesson: LessonRow, reveal: bool) -> Self {
        if reveal || lesson.is_free_preview {
            Self {
                id: lesson.id,
                title: lesson.title,
                duration: lesson.duration,
                is_free_preview: lesson.is_free_preview,
                module_id: Some(lesson.module_id),
                order_index: Some(lesson.order_index),
                content: lesson.content,
                video_url: lesson.video_url,
                presentation_url: lesson.presentation_url,
                slides: Some(serde_json::from_str(&lesson.slides).unwrap_or_default()),
                content_type: Some(lesson.content_type),
            }
        } else {
            Self {
                id: lesson.id,
                title: lesson.title,
                duration: lesson.duration,
                is_free_preview: lesson.is_free_preview,
                module_id: None,
                order_index: None,
                content: None,
                video_url: None,
                presentation_url: None,
                slides: None,
                content_type: None,
            }
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleView {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub order_index: i64,
    pub lessons: Vec<LessonView>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetail {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub author: AuthorInfo,
    pub price: f64,
    pub is_free: bool,
    pub is_published: bool,
    pub cover_image_url: Option<String>,
    pub estimated_hours: Option<i64>,
    pub total_modules: i64,
    pub modules: Vec<ModuleView>,
    pub has_access: bool,
}

fn default_true() -> bool {
    true
}

fn default_content_type() -> String {
    "text".to_string()
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LessonPayload {
    pub id: Option<i64>,
    pub title: String,
    pub content: Option<String>,
    pub duration: Option<String>,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default)]
    pub is_free_preview: bool,
    pub video_url: Option<String>,
    pub presentation_url: Option<String>,
    #[serde(default)]
    pub slides: Vec<Slide>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModulePayload {
    pub id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default)]
    pub lessons: Vec<LessonPayload>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoursePayload {
    pub title: String,
    pub description: String,
    pub difficulty: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_true")]
    pub is_free: bool,
    #[serde(default)]
    pub is_published: bool,
    pub cover_image_url: Option<String>,
    pub estimated_hours: Option<i64>,
    #[serde(default)]
    pub modules: Vec<ModulePayload>,
}

impl CoursePayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if self.title.trim().is_empty() {
            errors.push("title", "is required");
        }
        if self.description.trim().is_empty() {
            errors.push("description", "is required");
        }
        if self.difficulty.trim().is_empty() {
            errors.push("difficulty", "is required");
        }
        if self.price < 0.0 {
            errors.push("price", "must be non-negative");
        }
        if let Some(hours) = self.estimated_hours {
            if hours < 0 {
                errors.push("estimatedHours", "must be non-negative");
            }
        }
        for (mi, module) in self.modules.iter().enumerate() {
            if module.title.trim().is_empty() {
                errors.push(&format!("modules.{mi}.title"), "is required");
            }
            for (li, lesson) in module.lessons.iter().enumerate() {
                if lesson.title.trim().is_empty() {
                    errors.push(&format!("modules.{mi}.lessons.{li}.title"), "is required");
                }
            }
        }
        errors.into_result()
    }
}

pub async fn get_course(db: &SqlitePool, course_id: i64) -> Result<Course, ApiError> {
    sqlx::query_as::<_, Course>(
        "SELECT id, title, description, difficulty, author_id, price, is_free, is_published,
                cover_image_url, estimated_hours, total_modules
         FROM course WHERE id = ?",
    )
    .bind(course_id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("Course"))
}

async fn fetch_modules(db: &SqlitePool, course_id: i64) -> Result<Vec<ModuleRow>, ApiError> {
    let modules = sqlx::query_as::<_, ModuleRow>(
        "SELECT id, title, description, order_index FROM course_module
         WHERE course_id = ? ORDER BY order_index ASC",
    )
    .bind(course_id)
    .fetch_all(db)
    .await?;
    Ok(modules)
}

async fn fetch_lessons(db: &SqlitePool, module_id: i64) -> Result<Vec<LessonRow>, ApiError> {
    let lessons = sqlx::query_as::<_, LessonRow>(
        "SELECT id, module_id, title, content, duration, order_index, is_free_preview,
                video_url, presentation_url, slides, content_type
         FROM lesson WHERE module_id = ? ORDER BY order_index ASC",
    )
    .bind(module_id)
    .fetch_all(db)
    .await?;
    Ok(lessons)
}

pub(crate) async fn module_views(
    db: &SqlitePool,
    course_id: i64,
    reveal: bool,
) -> Result<Vec<ModuleView>, ApiError> {
    let mut views = Vec::new();
    for module in fetch_modules(db, course_id).await? {
        let lessons = fetch_lessons(db, module.id)
            .await?
            .into_iter()
            .map(|l| LessonView::from_row(l, reveal))
            .collect();
        views.push(ModuleView {
            id: module.id,
            title: module.title,
            description: module.description,
            order_index: module.order_index,
            lessons,
        });
    }
    Ok(views)
}

pub(crate) async fn author_info(
    db: &SqlitePool,
    author_id: i64,
    with_email: bool,
) -> Result<AuthorInfo, ApiError> {
    let (id, full_name, email): (i64, String, String) =
        sqlx::query_as("SELECT id, full_name, email FROM user WHERE id = ?")
            .bind(author_id)
            .fetch_one(db)
            .await?;
    Ok(AuthorInfo {
        id,
        full_name,
        email: with_email.then_some(email),
    })
}

/// Course detail as served to a caller whose entitlement has already been
/// resolved; locked lessons are redacted to their preview fields.
pub async fn course_detail(
    db: &SqlitePool,
    course: &Course,
    has_access: bool,
) -> Result<CourseDetail, ApiError> {
    let modules = module_views(db, course.id, has_access).await?;
    Ok(CourseDetail {
        id: course.id,
        title: course.title.clone(),
        description: course.description.clone(),
        difficulty: course.difficulty.clone(),
        author: author_info(db, course.author_id, true).await?,
        price: course.price,
        is_free: course.is_free,
        is_published: course.is_published,
        cover_image_url: course.cover_image_url.clone(),
        estimated_hours: course.estimated_hours,
        total_modules: course.total_modules,
        modules,
        has_access,
    })
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub cover_image_url: Option<String>,
    pub price: f64,
    pub is_free: bool,
    pub estimated_hours: Option<i64>,
    pub author: AuthorInfo,
    pub modules: Vec<ModuleView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogFilter {
    Free,
    Paid,
    All,
}

/// Published catalog, newest first. Lesson bodies are always redacted here;
/// entitlement is resolved on the detail route.
pub async fn list_published(
    db: &SqlitePool,
    search: Option<&str>,
    filter: Option<CatalogFilter>,
) -> Result<Vec<CourseSummary>, ApiError> {
    let mut sql = String::from(
        "SELECT id, title, description, difficulty, author_id, price, is_free, is_published,
                cover_image_url, estimated_hours, total_modules
         FROM course WHERE is_published = 1",
    );
    match filter {
        Some(CatalogFilter::Free) => sql.push_str(" AND is_free = 1"),
        Some(CatalogFilter::Paid) => sql.push_str(" AND is_free = 0"),
        _ => {}
    }
    let search = search.map(str::trim).filter(|s| !s.is_empty());
    if search.is_some() {
        sql.push_str(" AND (title LIKE ? COLLATE NOCASE OR description LIKE ? COLLATE NOCASE)");
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut query = sqlx::query_as::<_, Course>(&sql);
    if let Some(term) = search {
        let pattern = format!("%{term}%");
        query = query.bind(pattern.clone()).bind(pattern);
    }
    let courses = query.fetch_all(db).await?;

    let mut out = Vec::with_capacity(courses.len());
    for course in courses {
        let modules = module_views(db, course.id, false).await?;
        out.push(CourseSummary {
            id: course.id,
            title: course.title,
            description: course.description,
            difficulty: course.difficulty,
            cover_image_url: course.cover_image_url,
            price: course.price,
            is_free: course.is_free,
            estimated_hours: course.estimated_hours,
            author: author_info(db, course.author_id, false).await?,
            modules,
        });
    }
    Ok(out)
}

/// Back-office listing: every course, published or not, with full trees.
pub async fn list_all(db: &SqlitePool) -> Result<Vec<CourseDetail>, ApiError> {
    let courses = sqlx::query_as::<_, Course>(
        "SELECT id, title, description, difficulty, author_id, price, is_free, is_published,
                cover_image_url, estimated_hours, total_modules
         FROM course ORDER BY created_at DESC",
    )
    .fetch_all(db)
    .await?;
    let mut out = Vec::with_capacity(courses.len());
    for course in courses {
        out.push(course_detail(db, &course, true).await?);
    }
    Ok(out)
}

/// A lesson fetched for direct viewing, scoped to its course.
pub async fn get_lesson_in_course(
    db: &SqlitePool,
    course_id: i64,
    lesson_id: i64,
) -> Result<LessonView, ApiError> {
    let lesson = sqlx::query_as::<_, LessonRow>(
        "SELECT lesson.id, lesson.module_id, lesson.title, lesson.content, lesson.duration,
                lesson.order_index, lesson.is_free_preview, lesson.video_url,
                lesson.presentation_url, lesson.slides, lesson.content_type
         FROM lesson
         JOIN course_module ON course_module.id = lesson.module_id
         WHERE lesson.id = ? AND course_module.course_id = ?",
    )
    .bind(lesson_id)
    .bind(course_id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("Lesson"))?;
    Ok(LessonView::from_row(lesson, true))
}

async fn insert_tree(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    course_id: i64,
    modules: &[ModulePayload],
) -> Result<(), ApiError> {
    for (mi, module) in modules.iter().enumerate() {
        // A NULL id lets SQLite assign a fresh rowid; echoed ids survive.
        let module_id = sqlx::query(
            "INSERT INTO course_module (id, course_id, title, description, order_index)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(module.id)
        .bind(course_id)
        .bind(&module.title)
        .bind(&module.description)
        .bind(if module.order_index != 0 { module.order_index } else { mi as i64 })
        .execute(&mut **tx)
        .await?
        .last_insert_rowid();

        for (li, lesson) in module.lessons.iter().enumerate() {
            let slides = serde_json::to_string(&lesson.slides)
                .map_err(|e| anyhow::anyhow!("failed to encode slides: {e}"))?;
            sqlx::query(
                "INSERT INTO lesson (id, module_id, title, content, duration, order_index,
                                     is_free_preview, video_url, presentation_url, slides, content_type)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(lesson.id)
            .bind(module_id)
            .bind(&lesson.title)
            .bind(&lesson.content)
            .bind(&lesson.duration)
            .bind(if lesson.order_index != 0 { lesson.order_index } else { li as i64 })
            .bind(lesson.is_free_preview)
            .bind(&lesson.video_url)
            .bind(&lesson.presentation_url)
            .bind(slides)
            .bind(&lesson.content_type)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

pub async fn create_course(
    db: &SqlitePool,
    author_id: i64,
    payload: &CoursePayload,
) -> Result<i64, ApiError> {
    let mut tx = db.begin().await?;
    let course_id = sqlx::query(
        "INSERT INTO course (title, description, difficulty, author_id, price, is_free,
                             is_published, cover_image_url, estimated_hours, total_modules, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.difficulty)
    .bind(author_id)
    .bind(payload.price)
    .bind(payload.is_free)
    .bind(payload.is_published)
    .bind(&payload.cover_image_url)
    .bind(payload.estimated_hours)
    .bind(payload.modules.len() as i64)
    .bind(now_local())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();
    insert_tree(&mut tx, course_id, &payload.modules).await?;
    tx.commit().await?;
    Ok(course_id)
}

/// Replace-on-edit: drop the whole module/lesson tree and rebuild it from
/// the payload, all inside one transaction so a crash can never leave a
/// half-replaced course. Quiz questions pointing at destroyed modules or
/// lessons fall back to course-level via `ON DELETE SET NULL`.
pub async fn replace_course(
    db: &SqlitePool,
    course_id: i64,
    payload: &CoursePayload,
) -> Result<(), ApiError> {
    let mut tx = db.begin().await?;
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM course WHERE id = ?")
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(ApiError::NotFound("Course"));
    }

    sqlx::query(
        "DELETE FROM lesson WHERE module_id IN (SELECT id FROM course_module WHERE course_id = ?)",
    )
    .bind(course_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM course_module WHERE course_id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE course SET title = ?, description = ?, difficulty = ?, price = ?, is_free = ?,
                           is_published = ?, cover_image_url = ?, estimated_hours = ?, total_modules = ?
         WHERE id = ?",
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.difficulty)
    .bind(payload.price)
    .bind(payload.is_free)
    .bind(payload.is_published)
    .bind(&payload.cover_image_url)
    .bind(payload.estimated_hours)
    .bind(payload.modules.len() as i64)
    .bind(course_id)
    .execute(&mut *tx)
    .await?;

    insert_tree(&mut tx, course_id, &payload.modules).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn set_published(
    db: &SqlitePool,
    course_id: i64,
    published: bool,
) -> Result<(), ApiError> {
    let updated = sqlx::query("UPDATE course SET is_published = ? WHERE id = ?")
        .bind(published)
        .bind(course_id)
        .execute(db)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("Course"));
    }
    Ok(())
}

pub async fn delete_course(db: &SqlitePool, course_id: i64) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM course WHERE id = ?")
        .bind(course_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Total lesson count across every module of a course.
pub async fn total_lessons(db: &SqlitePool, course_id: i64) -> Result<i64, ApiError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM lesson
         JOIN course_module ON course_module.id = lesson.module_id
         WHERE course_module.course_id = ?",
    )
    .bind(course_id)
    .fetch_one(db)
    .await?;
    Ok(count)
}
