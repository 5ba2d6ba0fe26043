use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{error::ApiError, utils::now_local};

pub const ACCESS_TOKEN_TTL: time::Duration = time::Duration::hours(1);
pub const REFRESH_TOKEN_TTL: time::Duration = time::Duration::days(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub role: Role,
    /// Issue time in nanoseconds, so tokens minted in the same second for
    /// the same user still differ (refresh rotation relies on that).
    pub iat: i64,
    pub exp: i64,
}

/// Signing material for bearer tokens, shared through router state.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    fn sign(&self, user_id: i64, role: Role, ttl: time::Duration) -> Result<String, ApiError> {
        let now = now_local();
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.unix_timestamp_nanos() as i64,
            exp: (now + ttl).unix_timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| anyhow::anyhow!("failed to sign token: {e}"))?;
        Ok(token)
    }

    pub fn sign_access_token(&self, user_id: i64, role: Role) -> Result<String, ApiError> {
        self.sign(user_id, role, ACCESS_TOKEN_TTL)
    }

    pub fn sign_refresh_token(&self, user_id: i64, role: Role) -> Result<String, ApiError> {
        self.sign(user_id, role, REFRESH_TOKEN_TTL)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::Unauthorized("Invalid token"))
    }
}

/// The authenticated caller, extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i64,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

impl<S> FromRequestParts<S> for AuthUser
where
    JwtKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized("Unauthorized"))?;
        let claims = JwtKeys::from_ref(state).verify(token)?;
        Ok(AuthUser {
            id: claims.sub,
            role: claims.role,
        })
    }
}

/// Like [`AuthUser`] but never rejects; anonymous callers extract as `None`.
#[derive(Debug, Clone, Copy)]
pub struct OptionalUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for OptionalUser
where
    JwtKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = match bearer_token(parts) {
            Some(token) => JwtKeys::from_ref(state)
                .verify(token)
                .ok()
                .map(|claims| AuthUser {
                    id: claims.sub,
                    role: claims.role,
                }),
            None => None,
        };
        Ok(OptionalUser(user))
    }
}

/// An authenticated caller that must carry the ADMIN role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub AuthUser);

impl<S> FromRequestParts<S> for AdminUser
where
    JwtKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::Forbidden("Admin access required"));
        }
        Ok(AdminUser(user))
    }
}
