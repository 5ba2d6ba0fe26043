use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{
    error::{ApiError, FieldErrors},
    utils::now_local,
};

#[derive(Debug, sqlx::FromRow)]
struct QuestionRow {
    id: i64,
    course_id: i64,
    module_id: Option<i64>,
    lesson_id: Option<i64>,
    text: String,
    options: String,
    correct_index: i64,
}

/// A question as shown to learners: the correct index stays server-side
/// until they answer.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: i64,
    pub course_id: i64,
    pub module_id: Option<i64>,
    pub lesson_id: Option<i64>,
    pub text: String,
    pub options: Vec<String>,
}

impl From<QuestionRow> for QuestionView {
    fn from(row: QuestionRow) -> Self {
        Self {
            id: row.id,
            course_id: row.course_id,
            module_id: row.module_id,
            lesson_id: row.lesson_id,
            text: row.text,
            options: serde_json::from_str(&row.options).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: i64,
    pub module_id: Option<i64>,
    pub lesson_id: Option<i64>,
}

impl NewQuestion {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if self.text.trim().is_empty() {
            errors.push("text", "is required");
        }
        if self.options.len() < 2 || self.options.len() > 8 {
            errors.push("options", "must have between 2 and 8 entries");
        }
        if self.options.iter().any(|o| o.trim().is_empty()) {
            errors.push("options", "must not contain empty entries");
        }
        if self.correct_index < 0 || self.correct_index as usize >= self.options.len() {
            errors.push("correctIndex", "must point at one of the options");
        }
        errors.into_result()
    }
}

pub async fn create_question(
    db: &SqlitePool,
    course_id: i64,
    new: &NewQuestion,
) -> Result<QuestionView, ApiError> {
    new.validate()?;
    let course: Option<i64> = sqlx::query_scalar("SELECT id FROM course WHERE id = ?")
        .bind(course_id)
        .fetch_optional(db)
        .await?;
    if course.is_none() {
        return Err(ApiError::NotFound("Course"));
    }

    let mut errors = FieldErrors::new();
    if let Some(module_id) = new.module_id {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM course_module WHERE id = ? AND course_id = ?")
                .bind(module_id)
                .bind(course_id)
                .fetch_optional(db)
                .await?;
        if found.is_none() {
            errors.push("moduleId", "does not belong to this course");
        }
    }
    if let Some(lesson_id) = new.lesson_id {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT lesson.id FROM lesson
             JOIN course_module ON course_module.id = lesson.module_id
             WHERE lesson.id = ? AND course_module.course_id = ?",
        )
        .bind(lesson_id)
        .bind(course_id)
        .fetch_optional(db)
        .await?;
        if found.is_none() {
            errors.push("lessonId", "does not belong to this course");
        }
    }
    errors.into_result()?;

    let options = serde_json::to_string(&new.options)
        .map_err(|e| anyhow::anyhow!("failed to encode options: {e}"))?;
    let id = sqlx::query(
        "INSERT INTO course_question (course_id, module_id, lesson_id, text, options, correct_index, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(course_id)
    .bind(new.module_id)
    .bind(new.lesson_id)
    .bind(&new.text)
    .bind(&options)
    .bind(new.correct_index)
    .bind(now_local())
    .execute(db)
    .await?
    .last_insert_rowid();

    let row = fetch_question(db, id).await?;
    Ok(row.into())
}

async fn fetch_question(db: &SqlitePool, id: i64) -> Result<QuestionRow, ApiError> {
    sqlx::query_as::<_, QuestionRow>(
        "SELECT id, course_id, module_id, lesson_id, text, options, correct_index
         FROM course_question WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("Question"))
}

pub async fn list_questions(
    db: &SqlitePool,
    course_id: i64,
    module_id: Option<i64>,
    lesson_id: Option<i64>,
) -> Result<Vec<QuestionView>, ApiError> {
    let mut sql = String::from(
        "SELECT id, course_id, module_id, lesson_id, text, options, correct_index
         FROM course_question WHERE course_id = ?",
    );
    if module_id.is_some() {
        sql.push_str(" AND module_id = ?");
    }
    if lesson_id.is_some() {
        sql.push_str(" AND lesson_id = ?");
    }
    sql.push_str(" ORDER BY id ASC");

    let mut query = sqlx::query_as::<_, QuestionRow>(&sql).bind(course_id);
    if let Some(module_id) = module_id {
        query = query.bind(module_id);
    }
    if let Some(lesson_id) = lesson_id {
        query = query.bind(lesson_id);
    }
    let rows = query.fetch_all(db).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub is_correct: bool,
    pub correct_index: i64,
}

/// Grade an answer by strict index equality and record the attempt.
/// Attempts are append-only: answering again adds another row, and the
/// correct index is always revealed in the response.
pub async fn answer_question(
    db: &SqlitePool,
    user_id: i64,
    question_id: i64,
    selected_index: i64,
) -> Result<AnswerResult, ApiError> {
    let question = fetch_question(db, question_id).await?;
    let is_correct = selected_index == question.correct_index;
    sqlx::query(
        "INSERT INTO course_answer (question_id, user_id, selected_index, is_correct, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(question_id)
    .bind(user_id)
    .bind(selected_index)
    .bind(is_correct)
    .bind(now_local())
    .execute(db)
    .await?;
    Ok(AnswerResult {
        is_correct,
        correct_index: question.correct_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{fixtures, test_pool};

    fn question(correct_index: i64) -> NewQuestion {
        NewQuestion {
            text: "What does the S in S7 stand for?".to_string(),
            options: vec!["Servo".to_string(), "Steel".to_string(), "Seven".to_string()],
            correct_index,
            module_id: None,
            lesson_id: None,
        }
    }

    #[tokio::test]
    async fn grading_is_strict_index_equality() {
        let db = test_pool().await;
        let author = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let student = fixtures::user(&db, "s@example.com", "USER").await;
        let (course_id, _) = fixtures::course(&db, author, true, 0.0, &[1]).await;
        let q = create_question(&db, course_id, &question(2)).await.unwrap();

        let right = answer_question(&db, student, q.id, 2).await.unwrap();
        assert!(right.is_correct);
        assert_eq!(right.correct_index, 2);

        let wrong = answer_question(&db, student, q.id, 0).await.unwrap();
        assert!(!wrong.is_correct);
        // The right answer is revealed either way.
        assert_eq!(wrong.correct_index, 2);
    }

    #[tokio::test]
    async fn repeated_answers_accumulate() {
        let db = test_pool().await;
        let author = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let student = fixtures::user(&db, "s@example.com", "USER").await;
        let (course_id, _) = fixtures::course(&db, author, true, 0.0, &[1]).await;
        let q = create_question(&db, course_id, &question(0)).await.unwrap();

        answer_question(&db, student, q.id, 0).await.unwrap();
        answer_question(&db, student, q.id, 1).await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM course_answer WHERE question_id = ? AND user_id = ?",
        )
        .bind(q.id)
        .bind(student)
        .fetch_one(&db)
        .await
        .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn missing_question_is_not_found() {
        let db = test_pool().await;
        let student = fixtures::user(&db, "s@example.com", "USER").await;
        let err = answer_question(&db, student, 404, 0).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn validation_rejects_out_of_range_correct_index() {
        assert!(question(0).validate().is_ok());
        assert!(question(3).validate().is_err());
        assert!(question(-1).validate().is_err());
        let mut too_few = question(0);
        too_few.options.truncate(1);
        assert!(too_few.validate().is_err());
    }

    #[tokio::test]
    async fn filters_scope_to_module_and_lesson() {
        let db = test_pool().await;
        let author = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let (course_id, lessons) = fixtures::course(&db, author, true, 0.0, &[1]).await;
        let module_id: i64 =
            sqlx::query_scalar("SELECT id FROM course_module WHERE course_id = ?")
                .bind(course_id)
                .fetch_one(&db)
                .await
                .unwrap();

        create_question(&db, course_id, &question(0)).await.unwrap();
        let mut scoped = question(1);
        scoped.module_id = Some(module_id);
        scoped.lesson_id = Some(lessons[0]);
        create_question(&db, course_id, &scoped).await.unwrap();

        assert_eq!(list_questions(&db, course_id, None, None).await.unwrap().len(), 2);
        assert_eq!(
            list_questions(&db, course_id, Some(module_id), None).await.unwrap().len(),
            1
        );
        assert_eq!(
            list_questions(&db, course_id, None, Some(lessons[0])).await.unwrap().len(),
            1
        );

        let mut foreign = question(0);
        foreign.module_id = Some(module_id + 100);
        let err = create_question(&db, course_id, &foreign).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
