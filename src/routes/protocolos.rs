use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{AuthenticatedUser, Role},
    error::{AppError, AppResult},
    models::{NewProtocolo, Protocolo},
    processo,
    schema::protocolos,
    state::AppState,
    utils::{
        text::{char_len, normalize_opt, resolve_subject},
        time::{self, to_iso},
    },
    whatsapp::WhatsAppMessage,
};

use super::{
    ensure_max_len,
    users::{load_user_refs, UserRef},
    ListQuery, MessageResponse, MAX_SHORT_TEXT_LEN, MAX_TEXT_LEN,
};

const MIN_CPF_LEN: usize = 14;
const MIN_CNPJ_LEN: usize = 18;
/// Country code, area code and at least nine subscriber digits.
const MIN_TELEFONE_LEN: usize = 13;
const MAX_DOCUMENT_LEN: usize = 32;

#[derive(Serialize)]
pub struct ProtocoloSummary {
    pub id: i32,
    pub num_inscricao: String,
    pub num_processo: i32,
    pub processo: String,
    pub assunto: String,
    pub anos_analise: String,
    pub nome: String,
    pub cpf: String,
    pub cnpj: String,
    pub telefone: String,
    pub enviar_whatsapp: bool,
    pub whatsapp_enviado: bool,
    pub creator: Option<UserRef>,
    pub editor: Option<UserRef>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Serialize)]
pub struct ProtocoloList {
    pub protocolos: Vec<ProtocoloSummary>,
}

#[derive(Serialize)]
pub struct ProtocoloEnvelope {
    pub protocolo: ProtocoloSummary,
}

#[derive(Serialize)]
pub struct ProtocoloResponse {
    pub message: String,
    pub protocolo: ProtocoloSummary,
}

#[derive(Deserialize)]
pub struct ProtocoloRequest {
    pub num_inscricao: Option<String>,
    pub assunto: Option<String>,
    pub outro_assunto: Option<String>,
    pub anos_analise: Option<String>,
    pub nome: Option<String>,
    pub cpf: Option<String>,
    pub cnpj: Option<String>,
    pub telefone: Option<String>,
    #[serde(default)]
    pub enviar_whatsapp: bool,
}

#[derive(Deserialize)]
pub struct SendWhatsAppRequest {
    pub id: i32,
}

#[derive(Debug)]
struct ProtocoloFields {
    num_inscricao: String,
    assunto: String,
    anos_analise: String,
    nome: String,
    cpf: String,
    cnpj: String,
    telefone: String,
    enviar_whatsapp: bool,
}

impl ProtocoloRequest {
    fn into_fields(self) -> AppResult<ProtocoloFields> {
        let nome = normalize_opt(self.nome.as_deref());
        if nome.is_empty() {
            return Err(AppError::bad_request("Informe um nome."));
        }
        ensure_max_len(&nome, MAX_TEXT_LEN, "nome")?;

        let assunto = resolve_subject(self.assunto.as_deref(), self.outro_assunto.as_deref());
        if assunto.is_empty() {
            return Err(AppError::bad_request("É necessário descrever o assunto."));
        }
        ensure_max_len(&assunto, MAX_TEXT_LEN, "assunto")?;

        let num_inscricao = normalize_opt(self.num_inscricao.as_deref());
        ensure_max_len(&num_inscricao, MAX_SHORT_TEXT_LEN, "número de inscrição")?;

        let anos_analise = normalize_opt(self.anos_analise.as_deref());
        ensure_max_len(&anos_analise, MAX_SHORT_TEXT_LEN, "anos em análise")?;

        let cpf = normalize_opt(self.cpf.as_deref());
        if !length_ok(&cpf, MIN_CPF_LEN) {
            return Err(AppError::bad_request("CPF inválido."));
        }

        let cnpj = normalize_opt(self.cnpj.as_deref());
        if !length_ok(&cnpj, MIN_CNPJ_LEN) {
            return Err(AppError::bad_request("CNPJ inválido."));
        }

        let telefone = self
            .telefone
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if !length_ok(&telefone, MIN_TELEFONE_LEN) {
            return Err(AppError::bad_request("Telefone inválido."));
        }

        Ok(ProtocoloFields {
            num_inscricao,
            assunto,
            anos_analise,
            nome,
            cpf,
            cnpj,
            enviar_whatsapp: self.enviar_whatsapp && !telefone.is_empty(),
            telefone,
        })
    }
}

/// Empty, or between `min` and the column width.
fn length_ok(value: &str, min: usize) -> bool {
    let len = char_len(value);
    len == 0 || (min..=MAX_DOCUMENT_LEN).contains(&len)
}

#[derive(AsChangeset)]
#[diesel(table_name = protocolos)]
struct ProtocoloChangeset<'a> {
    num_inscricao: &'a str,
    assunto: &'a str,
    anos_analise: &'a str,
    nome: &'a str,
    cpf: &'a str,
    cnpj: &'a str,
    telefone: &'a str,
    enviar_whatsapp: bool,
    editor_id: Option<i32>,
}

pub async fn list_protocolos(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Query(query), _): WithRejection<Query<ListQuery>, AppError>,
) -> AppResult<Json<ProtocoloList>> {
    if query.archived {
        user.require(Role::Admin)?;
    }

    let mut conn = state.db()?;
    let rows: Vec<Protocolo> = if query.archived {
        protocolos::table
            .filter(protocolos::deleted_at.is_not_null())
            .order(protocolos::id.desc())
            .load(&mut conn)?
    } else {
        protocolos::table
            .filter(protocolos::deleted_at.is_null())
            .order(protocolos::id.desc())
            .load(&mut conn)?
    };

    let refs = load_user_refs(
        &mut conn,
        rows.iter()
            .flat_map(|row| std::iter::once(row.creator_id).chain(row.editor_id)),
    )?;

    Ok(Json(ProtocoloList {
        protocolos: rows
            .into_iter()
            .map(|row| build_summary(row, &refs))
            .collect(),
    }))
}

pub async fn get_protocolo(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    WithRejection(Path(protocolo_id), _): WithRejection<Path<i32>, AppError>,
) -> AppResult<Json<ProtocoloEnvelope>> {
    let mut conn = state.db()?;
    let protocolo: Protocolo = protocolos::table
        .filter(protocolos::id.eq(protocolo_id))
        .filter(protocolos::deleted_at.is_null())
        .first(&mut conn)
        .optional()?
        .ok_or_else(protocolo_not_found)?;

    Ok(Json(ProtocoloEnvelope {
        protocolo: summarize(&mut conn, protocolo)?,
    }))
}

pub async fn create_protocolo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Json(payload), _): WithRejection<Json<ProtocoloRequest>, AppError>,
) -> AppResult<Json<ProtocoloResponse>> {
    let fields = payload.into_fields()?;
    let today = time::today();

    let mut conn = state.db()?;
    let created: Protocolo = conn.transaction(|conn| {
        let number = processo::allocate(conn, today)?;
        let new_protocolo = NewProtocolo {
            num_inscricao: fields.num_inscricao,
            num_processo: number.sequence,
            processo: number.processo,
            assunto: fields.assunto,
            anos_analise: fields.anos_analise,
            nome: fields.nome,
            cpf: fields.cpf,
            cnpj: fields.cnpj,
            telefone: fields.telefone,
            enviar_whatsapp: fields.enviar_whatsapp,
            creator_id: user.id,
        };

        diesel::insert_into(protocolos::table)
            .values(&new_protocolo)
            .get_result::<Protocolo>(conn)
    })?;
    drop(conn);

    tracing::info!(
        protocolo_id = created.id,
        processo = %created.processo,
        enviar_whatsapp = created.enviar_whatsapp,
        user_id = user.id,
        "protocolo created"
    );

    let created = if created.enviar_whatsapp {
        deliver_notification(&state, created).await
    } else {
        created
    };

    let mut conn = state.db()?;
    Ok(Json(ProtocoloResponse {
        message: "Protocolo registrado com sucesso.".into(),
        protocolo: summarize(&mut conn, created)?,
    }))
}

pub async fn update_protocolo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(protocolo_id), _): WithRejection<Path<i32>, AppError>,
    WithRejection(Json(payload), _): WithRejection<Json<ProtocoloRequest>, AppError>,
) -> AppResult<Json<ProtocoloResponse>> {
    user.require(Role::SuperAdmin)?;
    let fields = payload.into_fields()?;

    let changeset = ProtocoloChangeset {
        num_inscricao: &fields.num_inscricao,
        assunto: &fields.assunto,
        anos_analise: &fields.anos_analise,
        nome: &fields.nome,
        cpf: &fields.cpf,
        cnpj: &fields.cnpj,
        telefone: &fields.telefone,
        enviar_whatsapp: fields.enviar_whatsapp,
        editor_id: Some(user.id),
    };

    let mut conn = state.db()?;
    let updated: Protocolo = diesel::update(protocolos::table.find(protocolo_id))
        .set((&changeset, protocolos::updated_at.eq(Utc::now().naive_utc())))
        .get_result(&mut conn)?;
    drop(conn);

    let updated = if updated.enviar_whatsapp {
        deliver_notification(&state, updated).await
    } else {
        updated
    };

    let mut conn = state.db()?;
    Ok(Json(ProtocoloResponse {
        message: "Protocolo modificado com sucesso.".into(),
        protocolo: summarize(&mut conn, updated)?,
    }))
}

/// Archives an active protocolo or restores an archived one.
pub async fn toggle_protocolo(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(protocolo_id), _): WithRejection<Path<i32>, AppError>,
) -> AppResult<Json<MessageResponse>> {
    user.require(Role::SuperAdmin)?;

    let mut conn = state.db()?;
    let existing: Protocolo = protocolos::table.find(protocolo_id).first(&mut conn)?;
    let deleted_at = match existing.deleted_at {
        Some(_) => None,
        None => Some(Utc::now().naive_utc()),
    };

    diesel::update(protocolos::table.find(protocolo_id))
        .set(protocolos::deleted_at.eq(deleted_at))
        .execute(&mut conn)?;

    tracing::info!(protocolo_id, archived = deleted_at.is_some(), user_id = user.id, "protocolo toggled");

    Ok(Json(MessageResponse::new("Protocolo modificado com sucesso.")))
}

pub async fn send_whatsapp(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    WithRejection(Json(payload), _): WithRejection<Json<SendWhatsAppRequest>, AppError>,
) -> AppResult<Json<MessageResponse>> {
    let mut conn = state.db()?;
    let protocolo: Protocolo = protocolos::table
        .find(payload.id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(protocolo_not_found)?;
    drop(conn);

    if protocolo.telefone.trim().is_empty() {
        return Err(AppError::bad_request("O registro não contém telefone."));
    }

    deliver_notification(&state, protocolo).await;

    Ok(Json(MessageResponse::new("Notificação enviada com sucesso.")))
}

/// Posts the protocolo to the WhatsApp gateway once.
///
/// On acceptance the sent flag is stored; every failure is logged and the
/// record comes back unchanged.
async fn deliver_notification(state: &AppState, protocolo: Protocolo) -> Protocolo {
    let message = WhatsAppMessage::from_protocolo(&protocolo);

    if let Err(err) = state.notifier.send(&message).await {
        tracing::warn!(
            protocolo_id = protocolo.id,
            processo = %protocolo.processo,
            error = %err,
            "whatsapp notification failed"
        );
        return protocolo;
    }

    let marked = state.db().and_then(|mut conn| {
        diesel::update(protocolos::table.find(protocolo.id))
            .set(protocolos::whatsapp_enviado.eq(true))
            .get_result::<Protocolo>(&mut conn)
            .map_err(AppError::from)
    });

    match marked {
        Ok(updated) => {
            tracing::info!(protocolo_id = updated.id, "whatsapp notification sent");
            updated
        }
        Err(err) => {
            tracing::error!(
                protocolo_id = protocolo.id,
                error = err.message(),
                "failed to record whatsapp delivery"
            );
            protocolo
        }
    }
}

fn protocolo_not_found() -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "Protocolo não encontrado.")
}

fn summarize(conn: &mut PgConnection, protocolo: Protocolo) -> AppResult<ProtocoloSummary> {
    let refs = load_user_refs(
        conn,
        std::iter::once(protocolo.creator_id).chain(protocolo.editor_id),
    )?;
    Ok(build_summary(protocolo, &refs))
}

fn build_summary(protocolo: Protocolo, refs: &HashMap<i32, UserRef>) -> ProtocoloSummary {
    ProtocoloSummary {
        id: protocolo.id,
        creator: refs.get(&protocolo.creator_id).cloned(),
        editor: protocolo.editor_id.and_then(|id| refs.get(&id).cloned()),
        num_inscricao: protocolo.num_inscricao,
        num_processo: protocolo.num_processo,
        processo: protocolo.processo,
        assunto: protocolo.assunto,
        anos_analise: protocolo.anos_analise,
        nome: protocolo.nome,
        cpf: protocolo.cpf,
        cnpj: protocolo.cnpj,
        telefone: protocolo.telefone,
        enviar_whatsapp: protocolo.enviar_whatsapp,
        whatsapp_enviado: protocolo.whatsapp_enviado,
        created_at: to_iso(protocolo.created_at),
        updated_at: to_iso(protocolo.updated_at),
        deleted_at: protocolo.deleted_at.map(to_iso),
    }
}
