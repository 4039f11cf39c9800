use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use diesel::{prelude::*, result::DatabaseErrorKind, PgConnection};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{AuthenticatedUser, Role},
    error::{AppError, AppResult},
    models::{Assunto, NewAssunto},
    schema::assuntos,
    state::AppState,
    utils::{text::normalize, time::to_iso},
};

use super::{
    ensure_max_len,
    users::{load_user_refs, UserRef},
    ListQuery, MessageResponse, MAX_TEXT_LEN,
};

const DUPLICATE_NAME: &str = "Um assunto com o mesmo nome já existe.";

#[derive(Serialize)]
pub struct AssuntoSummary {
    pub id: i32,
    pub name: String,
    pub creator: Option<UserRef>,
    pub editor: Option<UserRef>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Serialize)]
pub struct AssuntoList {
    pub assuntos: Vec<AssuntoSummary>,
}

#[derive(Serialize)]
pub struct AssuntoEnvelope {
    pub assunto: AssuntoSummary,
}

#[derive(Serialize)]
pub struct AssuntoResponse {
    pub message: String,
    pub assunto: AssuntoSummary,
}

#[derive(Deserialize)]
pub struct AssuntoRequest {
    pub name: Option<String>,
}

impl AssuntoRequest {
    fn normalized_name(&self) -> AppResult<String> {
        let name = normalize(self.name.as_deref().unwrap_or_default());
        if name.is_empty() {
            return Err(AppError::bad_request("Informe o nome do assunto."));
        }
        ensure_max_len(&name, MAX_TEXT_LEN, "nome")?;
        Ok(name)
    }
}

pub async fn list_assuntos(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Query(query), _): WithRejection<Query<ListQuery>, AppError>,
) -> AppResult<Json<AssuntoList>> {
    if query.archived {
        user.require(Role::Admin)?;
    }

    let mut conn = state.db()?;
    let rows: Vec<Assunto> = if query.archived {
        assuntos::table
            .filter(assuntos::deleted_at.is_not_null())
            .order(assuntos::name.asc())
            .load(&mut conn)?
    } else {
        assuntos::table
            .filter(assuntos::deleted_at.is_null())
            .order(assuntos::name.asc())
            .load(&mut conn)?
    };

    let refs = load_user_refs(
        &mut conn,
        rows.iter()
            .flat_map(|row| std::iter::once(row.creator_id).chain(row.editor_id)),
    )?;

    Ok(Json(AssuntoList {
        assuntos: rows
            .into_iter()
            .map(|row| build_summary(row, &refs))
            .collect(),
    }))
}

pub async fn get_assunto(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    WithRejection(Path(assunto_id), _): WithRejection<Path<i32>, AppError>,
) -> AppResult<Json<AssuntoEnvelope>> {
    let mut conn = state.db()?;
    let assunto: Assunto = assuntos::table
        .filter(assuntos::id.eq(assunto_id))
        .filter(assuntos::deleted_at.is_null())
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "Assunto não encontrado."))?;

    Ok(Json(AssuntoEnvelope {
        assunto: summarize(&mut conn, assunto)?,
    }))
}

pub async fn create_assunto(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Json(payload), _): WithRejection<Json<AssuntoRequest>, AppError>,
) -> AppResult<Json<AssuntoResponse>> {
    let name = payload.normalized_name()?;

    let mut conn = state.db()?;
    ensure_name_available(&mut conn, &name, None)?;

    let new_assunto = NewAssunto {
        name,
        creator_id: user.id,
    };

    let created: Assunto = diesel::insert_into(assuntos::table)
        .values(&new_assunto)
        .get_result(&mut conn)
        .map_err(map_unique_violation)?;

    tracing::info!(assunto_id = created.id, name = %created.name, user_id = user.id, "assunto created");

    Ok(Json(AssuntoResponse {
        message: "Assunto registrado com sucesso.".into(),
        assunto: summarize(&mut conn, created)?,
    }))
}

pub async fn update_assunto(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(assunto_id), _): WithRejection<Path<i32>, AppError>,
    WithRejection(Json(payload), _): WithRejection<Json<AssuntoRequest>, AppError>,
) -> AppResult<Json<AssuntoResponse>> {
    let name = payload.normalized_name()?;

    let mut conn = state.db()?;
    let _existing: Assunto = assuntos::table.find(assunto_id).first(&mut conn)?;
    ensure_name_available(&mut conn, &name, Some(assunto_id))?;

    let updated: Assunto = diesel::update(assuntos::table.find(assunto_id))
        .set((
            assuntos::name.eq(&name),
            assuntos::editor_id.eq(Some(user.id)),
            assuntos::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(&mut conn)
        .map_err(map_unique_violation)?;

    Ok(Json(AssuntoResponse {
        message: "Assunto modificado com sucesso.".into(),
        assunto: summarize(&mut conn, updated)?,
    }))
}

/// Archives an active assunto or restores an archived one.
pub async fn toggle_assunto(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(assunto_id), _): WithRejection<Path<i32>, AppError>,
) -> AppResult<Json<MessageResponse>> {
    user.require(Role::SuperAdmin)?;

    let mut conn = state.db()?;
    let existing: Assunto = assuntos::table.find(assunto_id).first(&mut conn)?;

    let deleted_at = match existing.deleted_at {
        Some(_) => {
            ensure_name_available(&mut conn, &existing.name, Some(assunto_id))?;
            None
        }
        None => Some(Utc::now().naive_utc()),
    };

    diesel::update(assuntos::table.find(assunto_id))
        .set(assuntos::deleted_at.eq(deleted_at))
        .execute(&mut conn)
        .map_err(map_unique_violation)?;

    tracing::info!(assunto_id, archived = deleted_at.is_some(), user_id = user.id, "assunto toggled");

    Ok(Json(MessageResponse::new("Assunto modificado com sucesso.")))
}

fn ensure_name_available(
    conn: &mut PgConnection,
    name: &str,
    exclude_id: Option<i32>,
) -> AppResult<()> {
    let mut query = assuntos::table
        .filter(assuntos::name.eq(name))
        .filter(assuntos::deleted_at.is_null())
        .select(assuntos::id)
        .into_boxed();
    if let Some(id) = exclude_id {
        query = query.filter(assuntos::id.ne(id));
    }

    let duplicate: Option<i32> = query.first(conn).optional()?;
    if duplicate.is_some() {
        return Err(AppError::bad_request(DUPLICATE_NAME));
    }
    Ok(())
}

fn map_unique_violation(err: diesel::result::Error) -> AppError {
    match err {
        diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            AppError::bad_request(DUPLICATE_NAME)
        }
        other => AppError::from(other),
    }
}

fn summarize(conn: &mut PgConnection, assunto: Assunto) -> AppResult<AssuntoSummary> {
    let refs = load_user_refs(
        conn,
        std::iter::once(assunto.creator_id).chain(assunto.editor_id),
    )?;
    Ok(build_summary(assunto, &refs))
}

fn build_summary(assunto: Assunto, refs: &HashMap<i32, UserRef>) -> AssuntoSummary {
    AssuntoSummary {
        id: assunto.id,
        creator: refs.get(&assunto.creator_id).cloned(),
        editor: assunto.editor_id.and_then(|id| refs.get(&id).cloned()),
        name: assunto.name,
        created_at: to_iso(assunto.created_at),
        updated_at: to_iso(assunto.updated_at),
        deleted_at: assunto.deleted_at.map(to_iso),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_trimmed_and_uppercased() {
        let req = AssuntoRequest {
            name: Some("  baixa de débito ".into()),
        };
        assert_eq!(req.normalized_name().unwrap(), "BAIXA DE DÉBITO");
    }

    #[test]
    fn name_fits_its_column() {
        let at_limit = AssuntoRequest {
            name: Some("ç".repeat(MAX_TEXT_LEN)),
        };
        assert!(at_limit.normalized_name().is_ok());

        let over = AssuntoRequest {
            name: Some("a".repeat(MAX_TEXT_LEN + 1)),
        };
        let err = over.normalized_name().unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
