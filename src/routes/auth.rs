use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    auth::{password, AuthenticatedUser, Role, SESSION_COOKIE_NAME},
    error::{AppError, AppResult},
    models::User,
    schema::users,
    state::AppState,
};

use super::{users::normalize_email, MessageResponse};

const INVALID_CREDENTIALS: &str = "E-mail ou senha inválidos.";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: AuthenticatedUser,
    pub expires_in: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_new_password: String,
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, AppError>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::new(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS));
    }

    let mut conn = state.db()?;
    let user: User = users::table
        .filter(users::email.eq(&email))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS))?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::new(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS))?;
    if !valid {
        tracing::info!(user_id = user.id, "login rejected: wrong password");
        return Err(AppError::new(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS));
    }

    if !user.enabled {
        tracing::info!(user_id = user.id, "login rejected: account disabled");
        return Err(AppError::new(StatusCode::UNAUTHORIZED, "Usuário desativado."));
    }

    let role = user.role.parse::<Role>().map_err(AppError::internal)?;
    let token = state
        .jwt
        .generate_token(user.id, &user.name, &user.email, role)
        .map_err(AppError::from)?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_session_cookie(&state, &token)?);

    tracing::info!(user_id = user.id, role = %role, "user logged in");

    Ok((
        headers,
        Json(LoginResponse {
            message: "Login realizado com sucesso.".into(),
            user: AuthenticatedUser {
                id: user.id,
                name: user.name,
                email: user.email,
                role,
            },
            expires_in: state.jwt.expiry().num_seconds(),
        }),
    ))
}

pub async fn logout(State(state): State<AppState>) -> AppResult<(HeaderMap, StatusCode)> {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_session_cookie(&state)?);
    Ok((headers, StatusCode::NO_CONTENT))
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Json(payload), _): WithRejection<Json<ChangePasswordRequest>, AppError>,
) -> AppResult<Json<MessageResponse>> {
    if [
        &payload.current_password,
        &payload.new_password,
        &payload.confirm_new_password,
    ]
    .iter()
    .any(|value| value.trim().is_empty())
    {
        return Err(AppError::bad_request("Preencha as informações."));
    }

    if payload.new_password != payload.confirm_new_password {
        return Err(AppError::bad_request("As senhas não coincidem."));
    }

    let mut conn = state.db()?;
    let stored: User = users::table.find(user.id).first(&mut conn)?;
    if !password::verify_password(&payload.current_password, &stored.password_hash)? {
        return Err(AppError::bad_request("Senha atual incorreta."));
    }

    let password_hash = password::hash_password(&payload.new_password)?;
    diesel::update(users::table.find(user.id))
        .set((
            users::password_hash.eq(password_hash),
            users::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    tracing::info!(user_id = user.id, "password changed");

    Ok(Json(MessageResponse::new("Senha alterada com sucesso.")))
}

fn build_session_cookie(state: &AppState, token: &str) -> AppResult<HeaderValue> {
    let max_age = state.jwt.expiry().num_seconds();
    let expires_at = Utc::now() + state.jwt.expiry();

    let mut parts = vec![format!("{}={}", SESSION_COOKIE_NAME, token)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Lax".into());
    parts.push(format!("Max-Age={}", max_age));
    parts.push(format!("Expires={}", expires_at.to_rfc2822()));
    push_cookie_scope(state, &mut parts);

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}

fn build_clear_session_cookie(state: &AppState) -> AppResult<HeaderValue> {
    let mut parts = vec![format!("{}=", SESSION_COOKIE_NAME)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Lax".into());
    parts.push("Max-Age=0".into());
    parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".into());
    push_cookie_scope(state, &mut parts);

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}

fn push_cookie_scope(state: &AppState, parts: &mut Vec<String>) {
    if state.config.session_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &state.config.session_cookie_domain {
        parts.push(format!("Domain={}", domain));
    }
}
