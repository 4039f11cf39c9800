use std::env;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use sgp::auth::jwt::JwtService;
use sgp::auth::password::hash_password;
use sgp::config::AppConfig;
use sgp::db::{self, PgPool};
use sgp::models::NewUser;
use sgp::routes;
use sgp::state::AppState;
use sgp::whatsapp;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower::util::ServiceExt;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const TEST_API_KEY: &str = "test-gateway-key";
pub const DEFAULT_PASSWORD: &str = "mesquita-default";

#[allow(dead_code)]
#[derive(Clone, Debug)]
pub struct GatewayRequest {
    pub api_key: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct GatewayState {
    requests: Arc<Mutex<Vec<GatewayRequest>>>,
    status: Arc<AtomicU16>,
}

/// Local stand-in for the WhatsApp gateway that records every POST.
pub struct MockGateway {
    pub url: String,
    state: GatewayState,
}

impl MockGateway {
    pub async fn start() -> Result<Self> {
        let state = GatewayState {
            requests: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(AtomicU16::new(StatusCode::OK.as_u16())),
        };

        let app = Router::new()
            .route("/send", post(receive))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            url: format!("http://{addr}/send"),
            state,
        })
    }

    #[allow(dead_code)]
    pub fn respond_with(&self, status: StatusCode) {
        self.state.status.store(status.as_u16(), Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub async fn requests(&self) -> Vec<GatewayRequest> {
        self.state.requests.lock().await.clone()
    }
}

async fn receive(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let api_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state
        .requests
        .lock()
        .await
        .push(GatewayRequest { api_key, body });

    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({ "queued": status.is_success() })))
}

pub struct TestApp {
    pub state: AppState,
    pub gateway: MockGateway,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;
        let gateway = MockGateway::start().await?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            session_expiry_minutes: 60,
            session_cookie_secure: false,
            session_cookie_domain: None,
            cors_allowed_origin: None,
            whatsapp_api_url: Some(gateway.url.clone()),
            whatsapp_api_key: Some(TEST_API_KEY.to_string()),
            whatsapp_timeout_seconds: 5,
            default_password: Some(DEFAULT_PASSWORD.to_string()),
            seed_admin_email: None,
            seed_admin_name: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let notifier = whatsapp::build_notifier(&config)?;
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool, config, notifier, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            gateway,
            router,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(truncate_all).await
    }

    pub async fn insert_user(&self, name: &str, email: &str, password: &str, role: &str) -> Result<i32> {
        let user = NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            role: role.to_string(),
        };
        self.with_conn(move |conn| {
            let id = diesel::insert_into(sgp::schema::users::table)
                .values(&user)
                .returning(sgp::schema::users::id)
                .get_result(conn)
                .context("failed to insert user")?;
            Ok(id)
        })
        .await
    }

    /// Logs in and returns the `name=value` pair of the session cookie.
    pub async fn login_cookie(&self, email: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json("/api/auth/login", &LoginPayload { email, password }, None)
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("login response carried no session cookie"))?;
        Ok(cookie)
    }

    /// Inserts a user with `role` and returns `(id, session cookie)`.
    pub async fn session_for(&self, role: &str) -> Result<(i32, String)> {
        let email = format!("{}@mesquita.rj.gov.br", role.to_lowercase());
        let id = self
            .insert_user(&format!("Servidor {role}"), &email, "senha-teste", role)
            .await?;
        let cookie = self.login_cookie(&email, "senha-teste").await?;
        Ok((id, cookie))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        session: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.request(Method::POST, path, Body::from(body), session)
            .await
    }

    pub async fn get(&self, path: &str, session: Option<&str>) -> Result<hyper::Response<Body>> {
        self.request(Method::GET, path, Body::empty(), session).await
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Body,
        session: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(cookie) = session {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = builder.body(body)?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }

    #[allow(dead_code)]
    pub async fn count(&self, table: &'static str) -> Result<i64> {
        self.with_conn(move |conn| {
            #[derive(QueryableByName)]
            struct Count {
                #[diesel(sql_type = diesel::sql_types::BigInt)]
                total: i64,
            }
            let row: Count = diesel::sql_query(format!("SELECT COUNT(*) AS total FROM {table}"))
                .get_result(conn)
                .with_context(|| format!("failed to count {table}"))?;
            Ok(row.total)
        })
        .await
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn json_body(response: hyper::Response<Body>) -> Result<Value> {
    let bytes = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&bytes).context("response body was not JSON")
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        db::run_migrations(&mut conn)?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE protocolos, capas, assuntos, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
