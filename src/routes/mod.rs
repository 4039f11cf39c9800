use axum::http::{HeaderValue, Method};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
    utils::text::char_len,
};

pub mod assuntos;
pub mod auth;
pub mod capas;
pub mod health;
pub mod protocolos;
pub mod users;

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub archived: bool,
}

/// Width of the `VARCHAR(255)` text columns.
pub const MAX_TEXT_LEN: usize = 255;
/// Width of the `VARCHAR(100)` reference columns.
pub const MAX_SHORT_TEXT_LEN: usize = 100;

/// Rejects values longer than their column with a 400.
pub(crate) fn ensure_max_len(value: &str, max: usize, field: &str) -> AppResult<()> {
    if char_len(value) > max {
        return Err(AppError::bad_request(format!(
            "O campo {field} excede {max} caracteres."
        )));
    }
    Ok(())
}

pub async fn method_not_allowed(method: Method) -> AppError {
    AppError::method_not_allowed(&method)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|value| {
                    let trimmed = value.trim();
                    if trimmed.is_empty() {
                        return None;
                    }
                    match trimmed.parse::<HeaderValue>() {
                        Ok(header) => Some(header),
                        Err(err) => {
                            tracing::warn!(origin = %trimmed, error = %err, "ignoring invalid CORS origin");
                            None
                        }
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    let cors = CorsLayer::new()
        .allow_origin(cors)
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
        .allow_credentials(true);

    let auth_routes = Router::new()
        .route("/login", post(auth::login).fallback(method_not_allowed))
        .route("/logout", post(auth::logout).fallback(method_not_allowed))
        .route("/me", get(auth::me).fallback(method_not_allowed));

    let user_routes = Router::new()
        .route("/", get(users::list_users).fallback(method_not_allowed))
        .route(
            "/register",
            post(users::register_user).fallback(method_not_allowed),
        )
        .route("/:id", get(users::get_user).fallback(method_not_allowed))
        .route(
            "/:id/update",
            post(users::update_user).fallback(method_not_allowed),
        )
        .route(
            "/:id/deactivate",
            post(users::toggle_user).fallback(method_not_allowed),
        );

    let assuntos_routes = Router::new()
        .route(
            "/",
            get(assuntos::list_assuntos).fallback(method_not_allowed),
        )
        .route(
            "/new",
            post(assuntos::create_assunto).fallback(method_not_allowed),
        )
        .route(
            "/:id",
            get(assuntos::get_assunto).fallback(method_not_allowed),
        )
        .route(
            "/:id/update",
            post(assuntos::update_assunto).fallback(method_not_allowed),
        )
        .route(
            "/:id/deactivate",
            post(assuntos::toggle_assunto).fallback(method_not_allowed),
        );

    let capas_routes = Router::new()
        .route("/", get(capas::list_capas).fallback(method_not_allowed))
        .route("/new", post(capas::create_capa).fallback(method_not_allowed))
        .route("/:id", get(capas::get_capa).fallback(method_not_allowed))
        .route(
            "/:id/update",
            post(capas::update_capa).fallback(method_not_allowed),
        )
        .route(
            "/:id/deactivate",
            post(capas::toggle_capa).fallback(method_not_allowed),
        );

    let protocolos_routes = Router::new()
        .route(
            "/",
            get(protocolos::list_protocolos).fallback(method_not_allowed),
        )
        .route(
            "/new",
            post(protocolos::create_protocolo).fallback(method_not_allowed),
        )
        .route(
            "/send-whatsapp",
            post(protocolos::send_whatsapp).fallback(method_not_allowed),
        )
        .route(
            "/:id",
            get(protocolos::get_protocolo).fallback(method_not_allowed),
        )
        .route(
            "/:id/update",
            post(protocolos::update_protocolo).fallback(method_not_allowed),
        )
        .route(
            "/:id/deactivate",
            post(protocolos::toggle_protocolo).fallback(method_not_allowed),
        );

    Router::new()
        .nest("/api/auth", auth_routes)
        .route(
            "/api/user/changepassword",
            post(auth::change_password).fallback(method_not_allowed),
        )
        .nest("/api/users", user_routes)
        .nest("/api/assuntos", assuntos_routes)
        .nest("/api/capas", capas_routes)
        .nest("/api/protocolos", protocolos_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024))
}
