use std::path::PathBuf;

pub fn now_local() -> time::OffsetDateTime {
    time::OffsetDateTime::now_utc().to_offset(time::macros::offset!(+5))
}

/// Initialize the global tracing subscriber. Logs go to stdout, or to a
/// daily-rotated file when a log directory is given.
pub fn init_log(log: Option<PathBuf>) -> tracing_appender::non_blocking::WorkerGuard {
    let subscriber_builder = tracing_subscriber::fmt::Subscriber::builder()
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_names(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        );
    let (non_blocking, guard) = if let Some(log) = log {
        if !log.is_dir() {
            panic!("log path is not a directory");
        }
        let file_appender = tracing_appender::rolling::daily(log, "s7_backend.log");
        tracing_appender::non_blocking(file_appender)
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };
    tracing::subscriber::set_global_default(subscriber_builder.with_writer(non_blocking).finish())
        .expect("init log failed");
    guard
}

#[cfg(test)]
pub mod fixtures {
    use sqlx::SqlitePool;

    use super::now_local;

    pub async fn user(db: &SqlitePool, email: &str, role: &str) -> i64 {
        sqlx::query(
            "INSERT INTO user (email, password_hash, full_name, role, created_at)
             VALUES (?, 'x', 'Fixture User', ?, ?)",
        )
        .bind(email)
        .bind(role)
        .bind(now_local())
        .execute(db)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    /// Insert a published course with one module per entry of
    /// `module_lessons`, holding that many lessons. Returns the course id
    /// and every lesson id in order.
    pub async fn course(
        db: &SqlitePool,
        author_id: i64,
        is_free: bool,
        price: f64,
        module_lessons: &[usize],
    ) -> (i64, Vec<i64>) {
        let course_id = sqlx::query(
            "INSERT INTO course (title, description, difficulty, author_id, price, is_free, is_published, total_modules, created_at)
             VALUES ('Fixture Course', 'desc', 'beginner', ?, ?, ?, 1, ?, ?)",
        )
        .bind(author_id)
        .bind(price)
        .bind(is_free)
        .bind(module_lessons.len() as i64)
        .bind(now_local())
        .execute(db)
        .await
        .unwrap()
        .last_insert_rowid();

        let mut lesson_ids = Vec::new();
        for (mi, lessons) in module_lessons.iter().enumerate() {
            let module_id = sqlx::query(
                "INSERT INTO course_module (course_id, title, order_index) VALUES (?, ?, ?)",
            )
            .bind(course_id)
            .bind(format!("Module {mi}"))
            .bind(mi as i64)
            .execute(db)
            .await
            .unwrap()
            .last_insert_rowid();
            for li in 0..*lessons {
                let lesson_id = sqlx::query(
                    "INSERT INTO lesson (module_id, title, order_index) VALUES (?, ?, ?)",
                )
                .bind(module_id)
                .bind(format!("Lesson {mi}.{li}"))
                .bind(li as i64)
                .execute(db)
                .await
                .unwrap()
                .last_insert_rowid();
                lesson_ids.push(lesson_id);
            }
        }
        (course_id, lesson_ids)
    }
}

#[cfg(test)]
pub async fn test_pool() -> sqlx::SqlitePool {
    // A pooled ":memory:" database is per-connection, so cap the pool at one.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}
