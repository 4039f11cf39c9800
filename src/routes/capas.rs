use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::{NaiveDate, Utc};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{AuthenticatedUser, Role},
    error::{AppError, AppResult},
    models::{Capa, NewCapa},
    schema::capas,
    state::AppState,
    utils::{
        text::{normalize_opt, resolve_subject},
        time::{parse_date, to_iso},
    },
};

use super::{
    ensure_max_len,
    users::{load_user_refs, UserRef},
    ListQuery, MessageResponse, MAX_SHORT_TEXT_LEN, MAX_TEXT_LEN,
};

#[derive(Serialize)]
pub struct CapaSummary {
    pub id: i32,
    pub num_protocolo: String,
    pub distribuicao: NaiveDate,
    pub requerente: String,
    pub assunto: String,
    pub volume: String,
    pub observacao: String,
    pub creator: Option<UserRef>,
    pub editor: Option<UserRef>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Serialize)]
pub struct CapaList {
    pub capas: Vec<CapaSummary>,
}

#[derive(Serialize)]
pub struct CapaEnvelope {
    pub capa: CapaSummary,
}

#[derive(Serialize)]
pub struct CapaResponse {
    pub message: String,
    pub capa: CapaSummary,
}

#[derive(Deserialize)]
pub struct CapaRequest {
    pub num_protocolo: Option<String>,
    pub distribuicao: Option<String>,
    pub requerente: Option<String>,
    pub assunto: Option<String>,
    pub outro_assunto: Option<String>,
    pub volume: Option<String>,
    pub observacao: Option<String>,
}

struct CapaFields {
    num_protocolo: String,
    distribuicao: NaiveDate,
    requerente: String,
    assunto: String,
    volume: String,
    observacao: String,
}

impl CapaRequest {
    fn into_fields(self) -> AppResult<CapaFields> {
        let num_protocolo = normalize_opt(self.num_protocolo.as_deref());
        if num_protocolo.is_empty() {
            return Err(AppError::bad_request("Informe o número do protocolo."));
        }
        ensure_max_len(&num_protocolo, MAX_SHORT_TEXT_LEN, "número do protocolo")?;

        let distribuicao = self
            .distribuicao
            .as_deref()
            .and_then(parse_date)
            .ok_or_else(|| AppError::bad_request("Data de distribuição inválida."))?;

        let requerente = normalize_opt(self.requerente.as_deref());
        if requerente.is_empty() {
            return Err(AppError::bad_request("Informe o requerente."));
        }
        ensure_max_len(&requerente, MAX_TEXT_LEN, "requerente")?;

        let assunto = resolve_subject(self.assunto.as_deref(), self.outro_assunto.as_deref());
        if assunto.is_empty() {
            return Err(AppError::bad_request("É necessário descrever o assunto."));
        }
        ensure_max_len(&assunto, MAX_TEXT_LEN, "assunto")?;

        let volume = normalize_opt(self.volume.as_deref());
        ensure_max_len(&volume, MAX_SHORT_TEXT_LEN, "volume")?;

        Ok(CapaFields {
            num_protocolo,
            distribuicao,
            requerente,
            assunto,
            volume,
            observacao: normalize_opt(self.observacao.as_deref()),
        })
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = capas)]
struct CapaChangeset<'a> {
    num_protocolo: &'a str,
    distribuicao: NaiveDate,
    requerente: &'a str,
    assunto: &'a str,
    volume: &'a str,
    observacao: &'a str,
    editor_id: Option<i32>,
}

pub async fn list_capas(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Query(query), _): WithRejection<Query<ListQuery>, AppError>,
) -> AppResult<Json<CapaList>> {
    if query.archived {
        user.require(Role::Admin)?;
    }

    let mut conn = state.db()?;
    let rows: Vec<Capa> = if query.archived {
        capas::table
            .filter(capas::deleted_at.is_not_null())
            .order(capas::id.desc())
            .load(&mut conn)?
    } else {
        capas::table
            .filter(capas::deleted_at.is_null())
            .order(capas::id.desc())
            .load(&mut conn)?
    };

    let refs = load_user_refs(
        &mut conn,
        rows.iter()
            .flat_map(|row| std::iter::once(row.creator_id).chain(row.editor_id)),
    )?;

    Ok(Json(CapaList {
        capas: rows.into_iter().map(|row| build_summary(row, &refs)).collect(),
    }))
}

pub async fn get_capa(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    WithRejection(Path(capa_id), _): WithRejection<Path<i32>, AppError>,
) -> AppResult<Json<CapaEnvelope>> {
    let mut conn = state.db()?;
    let capa: Capa = capas::table
        .filter(capas::id.eq(capa_id))
        .filter(capas::deleted_at.is_null())
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "Capa não encontrada."))?;

    Ok(Json(CapaEnvelope {
        capa: summarize(&mut conn, capa)?,
    }))
}

pub async fn create_capa(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Json(payload), _): WithRejection<Json<CapaRequest>, AppError>,
) -> AppResult<Json<CapaResponse>> {
    let fields = payload.into_fields()?;
    let new_capa = NewCapa {
        num_protocolo: fields.num_protocolo,
        distribuicao: fields.distribuicao,
        requerente: fields.requerente,
        assunto: fields.assunto,
        volume: fields.volume,
        observacao: fields.observacao,
        creator_id: user.id,
    };

    let mut conn = state.db()?;
    let created: Capa = diesel::insert_into(capas::table)
        .values(&new_capa)
        .get_result(&mut conn)?;

    tracing::info!(capa_id = created.id, num_protocolo = %created.num_protocolo, user_id = user.id, "capa created");

    Ok(Json(CapaResponse {
        message: "Capa registrada com sucesso.".into(),
        capa: summarize(&mut conn, created)?,
    }))
}

pub async fn update_capa(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(capa_id), _): WithRejection<Path<i32>, AppError>,
    WithRejection(Json(payload), _): WithRejection<Json<CapaRequest>, AppError>,
) -> AppResult<Json<CapaResponse>> {
    let fields = payload.into_fields()?;

    let changeset = CapaChangeset {
        num_protocolo: &fields.num_protocolo,
        distribuicao: fields.distribuicao,
        requerente: &fields.requerente,
        assunto: &fields.assunto,
        volume: &fields.volume,
        observacao: &fields.observacao,
        editor_id: Some(user.id),
    };

    let mut conn = state.db()?;
    let updated: Capa = diesel::update(capas::table.find(capa_id))
        .set((&changeset, capas::updated_at.eq(Utc::now().naive_utc())))
        .get_result(&mut conn)?;

    Ok(Json(CapaResponse {
        message: "Capa modificada com sucesso.".into(),
        capa: summarize(&mut conn, updated)?,
    }))
}

/// Archives an active capa or restores an archived one.
pub async fn toggle_capa(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(capa_id), _): WithRejection<Path<i32>, AppError>,
) -> AppResult<Json<MessageResponse>> {
    user.require(Role::SuperAdmin)?;

    let mut conn = state.db()?;
    let existing: Capa = capas::table.find(capa_id).first(&mut conn)?;
    let deleted_at = match existing.deleted_at {
        Some(_) => None,
        None => Some(Utc::now().naive_utc()),
    };

    diesel::update(capas::table.find(capa_id))
        .set(capas::deleted_at.eq(deleted_at))
        .execute(&mut conn)?;

    tracing::info!(capa_id, archived = deleted_at.is_some(), user_id = user.id, "capa toggled");

    Ok(Json(MessageResponse::new("Capa modificada com sucesso.")))
}

fn summarize(conn: &mut PgConnection, capa: Capa) -> AppResult<CapaSummary> {
    let refs = load_user_refs(conn, std::iter::once(capa.creator_id).chain(capa.editor_id))?;
    Ok(build_summary(capa, &refs))
}

fn build_summary(capa: Capa, refs: &HashMap<i32, UserRef>) -> CapaSummary {
    CapaSummary {
        id: capa.id,
        creator: refs.get(&capa.creator_id).cloned(),
        editor: capa.editor_id.and_then(|id| refs.get(&id).cloned()),
        num_protocolo: capa.num_protocolo,
        distribuicao: capa.distribuicao,
        requerente: capa.requerente,
        assunto: capa.assunto,
        volume: capa.volume,
        observacao: capa.observacao,
        created_at: to_iso(capa.created_at),
        updated_at: to_iso(capa.updated_at),
        deleted_at: capa.deleted_at.map(to_iso),
    }
}
