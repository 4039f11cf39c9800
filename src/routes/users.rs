use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use diesel::{prelude::*, result::DatabaseErrorKind, PgConnection};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{password, AuthenticatedUser, Role},
    error::{AppError, AppResult},
    models::{NewUser, User},
    schema::users,
    state::AppState,
    utils::time::to_iso,
};

use super::{ensure_max_len, MessageResponse, MAX_TEXT_LEN};

const DUPLICATE_EMAIL: &str = "Já existe um usuário com este e-mail.";

/// Creator/editor reference embedded in record responses.
#[derive(Debug, Clone, Serialize)]
pub struct UserRef {
    pub id: i32,
    pub name: String,
}

#[derive(Serialize)]
pub struct UserSummary {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: String,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            enabled: user.enabled,
            created_at: to_iso(user.created_at),
            updated_at: to_iso(user.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct UserList {
    pub users: Vec<UserSummary>,
}

#[derive(Serialize)]
pub struct UserEnvelope {
    pub user: UserSummary,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub message: String,
    pub user: UserSummary,
}

#[derive(Deserialize)]
pub struct UserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

struct UserFields {
    name: String,
    email: String,
    role: Role,
}

impl UserRequest {
    fn into_fields(self) -> AppResult<UserFields> {
        let name = self.name.as_deref().map(str::trim).unwrap_or_default();
        let email = normalize_email(self.email.as_deref().unwrap_or_default());
        let role = self.role.as_deref().map(str::trim).unwrap_or_default();

        if name.is_empty() || email.is_empty() || role.is_empty() {
            return Err(AppError::bad_request("Preencha as informações."));
        }
        if !email.contains('@') {
            return Err(AppError::bad_request("E-mail inválido."));
        }
        ensure_max_len(name, MAX_TEXT_LEN, "nome")?;
        ensure_max_len(&email, MAX_TEXT_LEN, "e-mail")?;
        let role = role
            .parse::<Role>()
            .map_err(|_| AppError::bad_request("Nível de usuário inválido."))?;

        Ok(UserFields {
            name: name.to_string(),
            email,
            role,
        })
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct UserChangeset<'a> {
    name: &'a str,
    email: &'a str,
    role: &'a str,
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

pub(crate) fn load_user_refs(
    conn: &mut PgConnection,
    ids: impl IntoIterator<Item = i32>,
) -> AppResult<HashMap<i32, UserRef>> {
    let mut ids: Vec<i32> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(i32, String)> = users::table
        .filter(users::id.eq_any(&ids))
        .select((users::id, users::name))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(id, name)| (id, UserRef { id, name }))
        .collect())
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<UserList>> {
    user.require(Role::Admin)?;
    let mut conn = state.db()?;
    let rows: Vec<User> = users::table.order(users::name.asc()).load(&mut conn)?;
    Ok(Json(UserList {
        users: rows.into_iter().map(UserSummary::from).collect(),
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(user_id), _): WithRejection<Path<i32>, AppError>,
) -> AppResult<Json<UserEnvelope>> {
    user.require(Role::Admin)?;
    let mut conn = state.db()?;
    let found: User = users::table.find(user_id).first(&mut conn)?;
    Ok(Json(UserEnvelope { user: found.into() }))
}

pub async fn register_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Json(payload), _): WithRejection<Json<UserRequest>, AppError>,
) -> AppResult<Json<UserResponse>> {
    user.require(Role::Admin)?;
    let fields = payload.into_fields()?;
    if fields.role == Role::SuperAdmin {
        user.require(Role::SuperAdmin)?;
    }

    let default_password = state.config.default_password.as_deref().ok_or_else(|| {
        AppError::internal("DEFAULT_PASSWORD is not configured; cannot register users")
    })?;
    let password_hash = password::hash_password(default_password)?;

    let new_user = NewUser {
        name: fields.name,
        email: fields.email,
        password_hash,
        role: fields.role.as_str().to_string(),
    };

    let mut conn = state.db()?;
    let created: User = match diesel::insert_into(users::table)
        .values(&new_user)
        .get_result(&mut conn)
    {
        Ok(created) => created,
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::bad_request(DUPLICATE_EMAIL));
        }
        Err(err) => return Err(AppError::from(err)),
    };

    tracing::info!(user_id = created.id, created_by = user.id, role = %created.role, "user registered");

    Ok(Json(UserResponse {
        message: "Usuário registrado com sucesso.".into(),
        user: created.into(),
    }))
}

pub async fn update_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(user_id), _): WithRejection<Path<i32>, AppError>,
    WithRejection(Json(payload), _): WithRejection<Json<UserRequest>, AppError>,
) -> AppResult<Json<UserResponse>> {
    user.require(Role::Admin)?;
    let fields = payload.into_fields()?;

    let mut conn = state.db()?;
    let existing: User = users::table.find(user_id).first(&mut conn)?;
    let existing_role = existing.role.parse::<Role>().map_err(AppError::internal)?;
    if existing_role == Role::SuperAdmin || fields.role == Role::SuperAdmin {
        user.require(Role::SuperAdmin)?;
    }

    let changeset = UserChangeset {
        name: &fields.name,
        email: &fields.email,
        role: fields.role.as_str(),
    };

    let now = Utc::now().naive_utc();
    let updated: User = match diesel::update(users::table.find(user_id))
        .set((&changeset, users::updated_at.eq(now)))
        .get_result(&mut conn)
    {
        Ok(updated) => updated,
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::bad_request(DUPLICATE_EMAIL));
        }
        Err(err) => return Err(AppError::from(err)),
    };

    Ok(Json(UserResponse {
        message: "Usuário modificado com sucesso.".into(),
        user: updated.into(),
    }))
}

pub async fn toggle_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(user_id), _): WithRejection<Path<i32>, AppError>,
) -> AppResult<Json<MessageResponse>> {
    user.require(Role::SuperAdmin)?;
    if user.id == user_id {
        return Err(AppError::bad_request(
            "Não é possível desativar o próprio usuário.",
        ));
    }

    let mut conn = state.db()?;
    let existing: User = users::table.find(user_id).first(&mut conn)?;
    let now = Utc::now().naive_utc();
    diesel::update(users::table.find(user_id))
        .set((users::enabled.eq(!existing.enabled), users::updated_at.eq(now)))
        .execute(&mut conn)?;

    tracing::info!(user_id, enabled = !existing.enabled, changed_by = user.id, "user status toggled");

    Ok(Json(MessageResponse::new("Usuário modificado com sucesso.")))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;

    fn request() -> UserRequest {
        UserRequest {
            name: Some(" Ana Souza ".into()),
            email: Some(" Ana@Mesquita.rj.gov.br".into()),
            role: Some("admin".into()),
        }
    }

    #[test]
    fn normalizes_fields() {
        let fields = request().into_fields().unwrap();
        assert_eq!(fields.name, "Ana Souza");
        assert_eq!(fields.email, "ana@mesquita.rj.gov.br");
        assert_eq!(fields.role, Role::Admin);
    }

    #[test]
    fn rejects_overlong_name() {
        let mut req = request();
        req.name = Some("a".repeat(MAX_TEXT_LEN + 1));
        let err = req.into_fields().err().unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "O campo nome excede 255 caracteres.");
    }

    #[test]
    fn rejects_overlong_email() {
        let mut req = request();
        req.email = Some(format!("{}@mesquita.rj.gov.br", "a".repeat(MAX_TEXT_LEN)));
        let err = req.into_fields().err().unwrap();
        assert_eq!(err.message(), "O campo e-mail excede 255 caracteres.");
    }

    #[test]
    fn rejects_unknown_role() {
        let mut req = request();
        req.role = Some("root".into());
        let err = req.into_fields().err().unwrap();
        assert_eq!(err.message(), "Nível de usuário inválido.");
    }
}
