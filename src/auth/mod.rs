pub mod jwt;
pub mod password;
pub mod role;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization, Cookie};
use axum_extra::TypedHeader;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, models::User, schema::users, state::AppState};

pub use role::Role;

pub const SESSION_COOKIE_NAME: &str = "sgp_session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl AuthenticatedUser {
    /// Rejects the request with 403 unless the session holds at least `required`.
    pub fn require(&self, required: Role) -> Result<(), AppError> {
        if self.role.at_least(required) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = self.id,
                role = %self.role,
                required = %required,
                "permission denied"
            );
            Err(AppError::forbidden())
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts, state)
            .await
            .ok_or_else(AppError::unauthorized)?;

        let claims = state
            .jwt
            .verify_token(&token)
            .map_err(|_| AppError::unauthorized())?;

        // Disabled accounts and role changes apply to live sessions.
        let mut conn = state.db()?;
        let user: User = users::table
            .find(claims.sub)
            .first::<User>(&mut conn)
            .optional()?
            .filter(|user| user.enabled)
            .ok_or_else(|| {
                tracing::info!(user_id = claims.sub, "session rejected: account missing or disabled");
                AppError::unauthorized()
            })?;
        let role = user.role.parse::<Role>().map_err(AppError::internal)?;

        Ok(AuthenticatedUser {
            id: user.id,
            name: user.name,
            email: user.email,
            role,
        })
    }
}

async fn session_token(parts: &mut Parts, state: &AppState) -> Option<String> {
    if let Ok(TypedHeader(cookies)) =
        TypedHeader::<Cookie>::from_request_parts(parts, state).await
    {
        if let Some(value) = cookies.get(SESSION_COOKIE_NAME) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
        .await
        .ok()
        .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string())
}
