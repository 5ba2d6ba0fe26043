use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::{
    course::AuthorInfo,
    error::{ApiError, FieldErrors},
    utils::now_local,
};

#[derive(Debug, sqlx::FromRow)]
struct TeamRow {
    id: i64,
    name: String,
    description: Option<String>,
    captain_id: i64,
    logo_url: Option<String>,
    max_members: i64,
    is_active: bool,
    metadata: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamView {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub captain: AuthorInfo,
    pub members_count: i64,
    pub max_members: i64,
    pub is_active: bool,
    pub logo_url: Option<String>,
    pub metadata: serde_json::Value,
}

async fn team_view(db: &SqlitePool, row: TeamRow) -> Result<TeamView, ApiError> {
    let members_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM team_membership WHERE team_id = ?")
            .bind(row.id)
            .fetch_one(db)
            .await?;
    let (id, full_name): (i64, String) =
        sqlx::query_as("SELECT id, full_name FROM user WHERE id = ?")
            .bind(row.captain_id)
            .fetch_one(db)
            .await?;
    Ok(TeamView {
        id: row.id,
        name: row.name,
        description: row.description,
        captain: AuthorInfo {
            id,
            full_name,
            email: None,
        },
        members_count,
        max_members: row.max_members,
        is_active: row.is_active,
        logo_url: row.logo_url,
        metadata: serde_json::from_str(&row.metadata).unwrap_or_default(),
    })
}

pub async fn list_teams(db: &SqlitePool) -> Result<Vec<TeamView>, ApiError> {
    let rows = sqlx::query_as::<_, TeamRow>(
        "SELECT id, name, description, captain_id, logo_url, max_members, is_active, metadata
         FROM team ORDER BY created_at DESC",
    )
    .fetch_all(db)
    .await?;
    let mut views = Vec::with_capacity(rows.len());
    for row in rows {
        views.push(team_view(db, row).await?);
    }
    Ok(views)
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewTeam {
    pub name: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub educational_institution: Option<String>,
    pub mentor_name: Option<String>,
    #[serde(default)]
    pub positions_wanted: Vec<String>,
    #[serde(default)]
    pub competitions: Vec<String>,
}

impl NewTeam {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() {
            errors.push("name", "is required");
        }
        errors.into_result()
    }

    /// Optional recruiting fields go into the metadata bag, trimmed, with
    /// empty values left out entirely.
    fn metadata(&self) -> serde_json::Value {
        let mut meta = serde_json::Map::new();
        let trimmed = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        if let Some(city) = trimmed(&self.city) {
            meta.insert("city".into(), city.into());
        }
        if let Some(phone) = trimmed(&self.phone) {
            meta.insert("phone".into(), phone.into());
        }
        if let Some(inst) = trimmed(&self.educational_institution) {
            meta.insert("educationalInstitution".into(), inst.into());
        }
        if let Some(mentor) = trimmed(&self.mentor_name) {
            meta.insert("mentorName".into(), mentor.into());
        }
        if !self.positions_wanted.is_empty() {
            meta.insert(
                "positionsWanted".into(),
                self.positions_wanted.clone().into(),
            );
        }
        if !self.competitions.is_empty() {
            meta.insert("competitions".into(), self.competitions.clone().into());
        }
        serde_json::Value::Object(meta)
    }
}

pub async fn create_team(
    db: &SqlitePool,
    captain_id: i64,
    new: &NewTeam,
) -> Result<TeamView, ApiError> {
    let metadata = serde_json::to_string(&new.metadata())
        .map_err(|e| anyhow::anyhow!("failed to encode team metadata: {e}"))?;
    let mut tx = db.begin().await?;
    let id = sqlx::query(
        "INSERT INTO team (name, description, captain_id, metadata, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(new.name.trim())
    .bind(new.description.as_deref().map(str::trim))
    .bind(captain_id)
    .bind(metadata)
    .bind(now_local())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();
    // The captain is a member from the start.
    sqlx::query(
        "INSERT INTO team_membership (team_id, user_id, role, status) VALUES (?, ?, 'captain', 'active')",
    )
    .bind(id)
    .bind(captain_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    get_team(db, id).await
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JoinResult {
    pub status: String,
}

/// Ask to join a team. A new request sits pending until the captain acts on
/// it; asking again just reports the current membership status.
pub async fn join_team(db: &SqlitePool, user_id: i64, team_id: i64) -> Result<JoinResult, ApiError> {
    let team: Option<i64> = sqlx::query_scalar("SELECT id FROM team WHERE id = ?")
        .bind(team_id)
        .fetch_optional(db)
        .await?;
    if team.is_none() {
        return Err(ApiError::NotFound("Team"));
    }
    let existing: Option<String> =
        sqlx::query_scalar("SELECT status FROM team_membership WHERE team_id = ? AND user_id = ?")
            .bind(team_id)
            .bind(user_id)
            .fetch_optional(db)
            .await?;
    if let Some(status) = existing {
        return Ok(JoinResult { status });
    }
    sqlx::query(
        "INSERT INTO team_membership (team_id, user_id, role, status) VALUES (?, ?, 'member', 'pending')",
    )
    .bind(team_id)
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(JoinResult {
        status: "pending".to_string(),
    })
}

/// Back-office team creation. Unlike the self-service path there is no
/// automatic membership row; the captain defaults to the acting admin.
pub async fn admin_create_team(
    db: &SqlitePool,
    fallback_captain: i64,
    payload: &TeamUpdate,
) -> Result<TeamView, ApiError> {
    let metadata = match &payload.metadata {
        Some(value) => serde_json::to_string(value)
            .map_err(|e| anyhow::anyhow!("failed to encode team metadata: {e}"))?,
        None => "{}".to_string(),
    };
    let id = sqlx::query(
        "INSERT INTO team (name, description, captain_id, logo_url, max_members, is_active, metadata, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.captain_id.unwrap_or(fallback_captain))
    .bind(&payload.logo_url)
    .bind(payload.max_members.unwrap_or(6))
    .bind(payload.is_active.unwrap_or(true))
    .bind(metadata)
    .bind(now_local())
    .execute(db)
    .await?
    .last_insert_rowid();
    get_team(db, id).await
}

pub async fn get_team(db: &SqlitePool, id: i64) -> Result<TeamView, ApiError> {
    let row = sqlx::query_as::<_, TeamRow>(
        "SELECT id, name, description, captain_id, logo_url, max_members, is_active, metadata
         FROM team WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("Team"))?;
    team_view(db, row).await
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamUpdate {
    pub name: String,
    pub description: Option<String>,
    pub captain_id: Option<i64>,
    pub logo_url: Option<String>,
    pub max_members: Option<i64>,
    pub is_active: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

impl TeamUpdate {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() {
            errors.push("name", "is required");
        }
        if let Some(max) = self.max_members {
            if max <= 0 {
                errors.push("maxMembers", "must be positive");
            }
        }
        errors.into_result()
    }
}

/// Full-row admin update. A payload without `captainId` reassigns captaincy
/// to `fallback_captain` (the acting admin); clients that want to keep the
/// current captain must echo it back. Long-standing platform behavior, kept.
pub async fn update_team(
    db: &SqlitePool,
    team_id: i64,
    fallback_captain: i64,
    update: &TeamUpdate,
) -> Result<TeamView, ApiError> {
    let metadata = match &update.metadata {
        Some(value) => Some(
            serde_json::to_string(value)
                .map_err(|e| anyhow::anyhow!("failed to encode team metadata: {e}"))?,
        ),
        None => None,
    };
    let updated = sqlx::query(
        "UPDATE team SET name = ?, description = ?, captain_id = ?, logo_url = ?,
                         max_members = ?, is_active = ?, metadata = COALESCE(?, metadata)
         WHERE id = ?",
    )
    .bind(&update.name)
    .bind(&update.description)
    .bind(update.captain_id.unwrap_or(fallback_captain))
    .bind(&update.logo_url)
    .bind(update.max_members.unwrap_or(6))
    .bind(update.is_active.unwrap_or(true))
    .bind(metadata)
    .bind(team_id)
    .execute(db)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("Team"));
    }
    get_team(db, team_id).await
}

pub async fn delete_team(db: &SqlitePool, team_id: i64) -> Result<(), ApiError> {
    sqlx::query("DELETE FROM team WHERE id = ?")
        .bind(team_id)
        .execute(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{fixtures, test_pool};

    #[tokio::test]
    async fn create_builds_metadata_from_optional_fields() {
        let db = test_pool().await;
        let captain = fixtures::user(&db, "c@example.com", "USER").await;
        let team = create_team(
            &db,
            captain,
            &NewTeam {
                name: "  Bolt Builders  ".to_string(),
                city: Some("Almaty".to_string()),
                phone: Some("  ".to_string()),
                positions_wanted: vec!["programmer".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(team.name, "Bolt Builders");
        assert_eq!(team.captain.id, captain);
        // The captain counts as the first member.
        assert_eq!(team.members_count, 1);
        assert_eq!(team.metadata["city"], "Almaty");
        // Blank fields never make it into the bag.
        assert!(team.metadata.get("phone").is_none());
        assert_eq!(team.metadata["positionsWanted"][0], "programmer");
    }

    #[tokio::test]
    async fn members_count_reflects_memberships() {
        let db = test_pool().await;
        let captain = fixtures::user(&db, "c@example.com", "USER").await;
        let member = fixtures::user(&db, "m@example.com", "USER").await;
        let team = create_team(
            &db,
            captain,
            &NewTeam {
                name: "Crew".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        sqlx::query("INSERT INTO team_membership (team_id, user_id) VALUES (?, ?)")
            .bind(team.id)
            .bind(member)
            .execute(&db)
            .await
            .unwrap();

        let listed = list_teams(&db).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].members_count, 2);
    }

    #[tokio::test]
    async fn join_requests_sit_pending_and_repeat_joins_echo_status() {
        let db = test_pool().await;
        let captain = fixtures::user(&db, "c@example.com", "USER").await;
        let joiner = fixtures::user(&db, "j@example.com", "USER").await;
        let team = create_team(
            &db,
            captain,
            &NewTeam {
                name: "Crew".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let first = join_team(&db, joiner, team.id).await.unwrap();
        assert_eq!(first.status, "pending");
        // Asking again does not create a second row.
        let again = join_team(&db, joiner, team.id).await.unwrap();
        assert_eq!(again.status, "pending");
        let rows: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM team_membership WHERE team_id = ? AND user_id = ?")
                .bind(team.id)
                .bind(joiner)
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(rows, 1);

        // The captain already holds an active membership.
        let captain_join = join_team(&db, captain, team.id).await.unwrap();
        assert_eq!(captain_join.status, "active");

        let err = join_team(&db, joiner, 404).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn admin_create_defaults_captain_to_caller_and_skips_membership() {
        let db = test_pool().await;
        let admin = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let team = admin_create_team(
            &db,
            admin,
            &TeamUpdate {
                name: "Office Crew".to_string(),
                description: None,
                captain_id: None,
                logo_url: None,
                max_members: None,
                is_active: None,
                metadata: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(team.captain.id, admin);
        assert_eq!(team.max_members, 6);
        assert!(team.is_active);
        assert_eq!(team.members_count, 0);
    }

    #[tokio::test]
    async fn update_without_captain_id_hands_captaincy_to_the_caller() {
        let db = test_pool().await;
        let captain = fixtures::user(&db, "c@example.com", "USER").await;
        let admin = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let team = create_team(
            &db,
            captain,
            &NewTeam {
                name: "Crew".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let update = TeamUpdate {
            name: "Crew".to_string(),
            description: None,
            captain_id: None,
            logo_url: None,
            max_members: None,
            is_active: None,
            metadata: None,
        };
        let updated = update_team(&db, team.id, admin, &update).await.unwrap();
        assert_eq!(updated.captain.id, admin);

        // Echoing the captain back keeps them in place.
        let update = TeamUpdate {
            captain_id: Some(captain),
            ..update
        };
        let restored = update_team(&db, team.id, admin, &update).await.unwrap();
        assert_eq!(restored.captain.id, captain);
    }

    #[tokio::test]
    async fn update_missing_team_is_not_found() {
        let db = test_pool().await;
        let admin = fixtures::user(&db, "a@example.com", "ADMIN").await;
        let err = update_team(
            &db,
            404,
            admin,
            &TeamUpdate {
                name: "x".to_string(),
                description: None,
                captain_id: None,
                logo_url: None,
                max_members: None,
                is_active: None,
                metadata: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
