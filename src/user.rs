use argon2::{
    Argon2, PasswordVerifier,
    password_hash::{PasswordHash, PasswordHasher, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{
    auth::{JwtKeys, REFRESH_TOKEN_TTL, Role},
    error::ApiError,
    utils::now_local,
};

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub full_name: String,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub full_name: String,
    pub age: Option<i64>,
    pub educational_institution: Option<String>,
    pub primary_role: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserInfo,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub age: Option<i64>,
    pub educational_institution: Option<String>,
    pub primary_role: Option<String>,
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

async fn issue_tokens(
    db: &SqlitePool,
    keys: &JwtKeys,
    user: UserInfo,
) -> Result<AuthTokens, ApiError> {
    let access_token = keys.sign_access_token(user.id, user.role)?;
    let refresh_token = keys.sign_refresh_token(user.id, user.role)?;
    let expires_at = now_local() + REFRESH_TOKEN_TTL;
    sqlx::query("INSERT INTO session (user_id, refresh_token, expires_at) VALUES (?, ?, ?)")
        .bind(user.id)
        .bind(&refresh_token)
        .bind(expires_at)
        .execute(db)
        .await?;
    Ok(AuthTokens {
        access_token,
        refresh_token,
        user,
    })
}

/// Register a new account. The very first account is bootstrapped to ADMIN
/// so a fresh deployment has someone who can reach the back-office.
pub async fn register(db: &SqlitePool, keys: &JwtKeys, new: NewUser) -> Result<AuthTokens, ApiError> {
    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM user WHERE email = ?")
        .bind(&new.email)
        .fetch_optional(db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict("Email already registered"));
    }

    let any_admin: Option<i64> = sqlx::query_scalar("SELECT id FROM user WHERE role = 'ADMIN' LIMIT 1")
        .fetch_optional(db)
        .await?;
    let role = if any_admin.is_none() { Role::Admin } else { Role::User };

    let password_hash = hash_password(&new.password)?;
    let id = sqlx::query(
        "INSERT INTO user (email, password_hash, full_name, role, age, educational_institution, primary_role, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&new.email)
    .bind(&password_hash)
    .bind(&new.full_name)
    .bind(role)
    .bind(new.age)
    .bind(&new.educational_institution)
    .bind(&new.primary_role)
    .bind(now_local())
    .execute(db)
    .await?
    .last_insert_rowid();

    let user = UserInfo {
        id,
        email: new.email,
        role,
        full_name: new.full_name,
    };
    issue_tokens(db, keys, user).await
}

pub async fn login(
    db: &SqlitePool,
    keys: &JwtKeys,
    email: &str,
    password: &str,
) -> Result<AuthTokens, ApiError> {
    let row: Option<(i64, String, Role, String, String)> = sqlx::query_as(
        "SELECT id, email, role, full_name, password_hash FROM user WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(db)
    .await?;
    let Some((id, email, role, full_name, password_hash)) = row else {
        return Err(ApiError::Unauthorized("Invalid credentials"));
    };
    if !verify_password(password, &password_hash) {
        return Err(ApiError::Unauthorized("Invalid credentials"));
    }
    let user = UserInfo {
        id,
        email,
        role,
        full_name,
    };
    issue_tokens(db, keys, user).await
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Rotate a refresh token: the presented token is replaced in place, so it
/// cannot be replayed after a successful refresh.
pub async fn refresh(
    db: &SqlitePool,
    keys: &JwtKeys,
    refresh_token: &str,
) -> Result<RefreshedTokens, ApiError> {
    let stored: Option<(i64, time::OffsetDateTime)> =
        sqlx::query_as("SELECT id, expires_at FROM session WHERE refresh_token = ?")
            .bind(refresh_token)
            .fetch_optional(db)
            .await?;
    let Some((session_id, expires_at)) = stored else {
        return Err(ApiError::Unauthorized("Invalid refresh token"));
    };
    if expires_at < now_local() {
        return Err(ApiError::Unauthorized("Invalid refresh token"));
    }
    let claims = keys
        .verify(refresh_token)
        .map_err(|_| ApiError::Unauthorized("Invalid refresh token"))?;

    let access_token = keys.sign_access_token(claims.sub, claims.role)?;
    let new_refresh_token = keys.sign_refresh_token(claims.sub, claims.role)?;
    sqlx::query("UPDATE session SET refresh_token = ?, expires_at = ? WHERE id = ?")
        .bind(&new_refresh_token)
        .bind(now_local() + REFRESH_TOKEN_TTL)
        .bind(session_id)
        .execute(db)
        .await?;
    Ok(RefreshedTokens {
        access_token,
        refresh_token: new_refresh_token,
    })
}

pub async fn logout(db: &SqlitePool, refresh_token: &str) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM session WHERE refresh_token = ?")
        .bind(refresh_token)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn get_profile(db: &SqlitePool, id: i64) -> Result<UserProfile, ApiError> {
    sqlx::query_as::<_, UserProfile>(
        "SELECT id, email, role, full_name, age, educational_institution, primary_role
         FROM user WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("User"))
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub age: Option<i64>,
    pub educational_institution: Option<String>,
    pub primary_role: Option<String>,
}

pub async fn update_profile(
    db: &SqlitePool,
    id: i64,
    update: ProfileUpdate,
) -> Result<UserProfile, ApiError> {
    sqlx::query(
        "UPDATE user SET
            full_name = COALESCE(?, full_name),
            age = COALESCE(?, age),
            educational_institution = COALESCE(?, educational_institution),
            primary_role = COALESCE(?, primary_role)
         WHERE id = ?",
    )
    .bind(&update.full_name)
    .bind(update.age)
    .bind(&update.educational_institution)
    .bind(&update.primary_role)
    .bind(id)
    .execute(db)
    .await?;
    get_profile(db, id).await
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub full_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

pub async fn list_users(db: &SqlitePool) -> Result<Vec<UserSummary>, ApiError> {
    let users = sqlx::query_as::<_, UserSummary>(
        "SELECT id, email, role, full_name, created_at FROM user ORDER BY created_at DESC",
    )
    .fetch_all(db)
    .await?;
    Ok(users)
}

pub async fn set_role(db: &SqlitePool, id: i64, role: Role) -> Result<UserInfo, ApiError> {
    let updated = sqlx::query("UPDATE user SET role = ? WHERE id = ?")
        .bind(role)
        .bind(id)
        .execute(db)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("User"));
    }
    sqlx::query_as::<_, UserInfo>("SELECT id, email, role, full_name FROM user WHERE id = ?")
        .bind(id)
        .fetch_one(db)
        .await
        .map_err(Into::into)
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievement {
    pub id: i64,
    pub user_id: i64,
    pub achievement_id: i64,
    pub awarded_by_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

/// Ad-hoc achievement grant: mints a minimal manual-criteria achievement
/// carrying the given text and links it to the user.
pub async fn grant_achievement(
    db: &SqlitePool,
    user_id: i64,
    awarded_by_id: i64,
    text: &str,
) -> Result<UserAchievement, ApiError> {
    let user: Option<i64> = sqlx::query_scalar("SELECT id FROM user WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    if user.is_none() {
        return Err(ApiError::NotFound("User"));
    }

    let now = now_local();
    let mut tx = db.begin().await?;
    let achievement_id = sqlx::query(
        "INSERT INTO achievement (title, description, criteria_type, created_at)
         VALUES ('Достижение', ?, 'manual', ?)",
    )
    .bind(text)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();
    let id = sqlx::query(
        "INSERT INTO user_achievement (user_id, achievement_id, awarded_by_id, created_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(achievement_id)
    .bind(awarded_by_id)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();
    tx.commit().await?;

    sqlx::query_as::<_, UserAchievement>(
        "SELECT id, user_id, achievement_id, awarded_by_id, created_at
         FROM user_achievement WHERE id = ?",
    )
    .bind(id)
    .fetch_one(db)
    .await
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_pool;

    fn keys() -> JwtKeys {
        JwtKeys::from_secret(b"test-secret")
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password: "correct horse".to_string(),
            full_name: "Test User".to_string(),
            age: None,
            educational_institution: None,
            primary_role: None,
        }
    }

    #[tokio::test]
    async fn first_user_becomes_admin() {
        let db = test_pool().await;
        let keys = keys();
        let first = register(&db, &keys, new_user("a@example.com")).await.unwrap();
        assert_eq!(first.user.role, Role::Admin);
        let second = register(&db, &keys, new_user("b@example.com")).await.unwrap();
        assert_eq!(second.user.role, Role::User);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let db = test_pool().await;
        let keys = keys();
        register(&db, &keys, new_user("a@example.com")).await.unwrap();
        let err = register(&db, &keys, new_user("a@example.com")).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_rejects_bad_password() {
        let db = test_pool().await;
        let keys = keys();
        register(&db, &keys, new_user("a@example.com")).await.unwrap();
        let ok = login(&db, &keys, "a@example.com", "correct horse").await;
        assert!(ok.is_ok());
        let err = login(&db, &keys, "a@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
        let err = login(&db, &keys, "nobody@example.com", "x").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn achievement_grant_links_user_and_grantor() {
        let db = test_pool().await;
        let keys = keys();
        let admin = register(&db, &keys, new_user("a@example.com")).await.unwrap();
        let student = register(&db, &keys, new_user("s@example.com")).await.unwrap();

        let granted = grant_achievement(&db, student.user.id, admin.user.id, "Won the regional final")
            .await
            .unwrap();
        assert_eq!(granted.user_id, student.user.id);
        assert_eq!(granted.awarded_by_id, admin.user.id);

        let description: String =
            sqlx::query_scalar("SELECT description FROM achievement WHERE id = ?")
                .bind(granted.achievement_id)
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(description, "Won the regional final");

        let err = grant_achievement(&db, 404, admin.user.id, "x").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn refresh_rotates_the_stored_token() {
        let db = test_pool().await;
        let keys = keys();
        let tokens = register(&db, &keys, new_user("a@example.com")).await.unwrap();
        let rotated = refresh(&db, &keys, &tokens.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, tokens.refresh_token);
        // The old token is gone.
        let err = refresh(&db, &keys, &tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
        // The new one still works.
        refresh(&db, &keys, &rotated.refresh_token).await.unwrap();
    }
}
