mod common;

use anyhow::Result;
use axum::http::{header, Method, StatusCode};
use common::{acquire_db_lock, json_body, TestApp};
use diesel::prelude::*;
use serde_json::json;
use sgp::schema::users;

#[tokio::test]
async fn login_and_me_roundtrip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("Ana Souza", "ana@mesquita.rj.gov.br", "s3cret", "ADMIN")
        .await?;

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "  ANA@mesquita.rj.gov.br ", "password": "s3cret" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(set_cookie.starts_with("sgp_session="));
    assert!(set_cookie.contains("HttpOnly"));

    let body = json_body(response).await?;
    assert_eq!(body["user"]["role"], "ADMIN");

    let cookie = app.login_cookie("ana@mesquita.rj.gov.br", "s3cret").await?;
    let response = app.get("/api/auth/me", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let me = json_body(response).await?;
    assert_eq!(me["name"], "Ana Souza");
    assert_eq!(me["email"], "ana@mesquita.rj.gov.br");
    assert_eq!(me["role"], "ADMIN");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn rejects_bad_credentials_and_disabled_accounts() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let id = app
        .insert_user("Bruno", "bruno@mesquita.rj.gov.br", "correta", "USER")
        .await?;

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "bruno@mesquita.rj.gov.br", "password": "errada" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await?["message"], "E-mail ou senha inválidos.");

    app.with_conn(move |conn| {
        diesel::update(users::table.find(id))
            .set(users::enabled.eq(false))
            .execute(conn)?;
        Ok(())
    })
    .await?;

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "bruno@mesquita.rj.gov.br", "password": "correta" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await?["message"], "Usuário desativado.");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_session() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app.get("/api/auth/me", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await?["message"],
        "Usuário não está autenticado."
    );

    let response = app
        .get("/api/protocolos", Some("sgp_session=not-a-token"))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn wrong_method_is_rejected_before_auth() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app
        .request(
            Method::GET,
            "/api/protocolos/new",
            axum::body::Body::empty(),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json_body(response).await?["message"], "GET method is not allowed.");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn logout_clears_the_cookie() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app
        .post_json("/api/auth/logout", &json!({}), None)
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(cookie.starts_with("sgp_session=;"));
    assert!(cookie.contains("Max-Age=0"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn change_password_flow() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("Carla", "carla@mesquita.rj.gov.br", "antiga", "USER")
        .await?;
    let cookie = app.login_cookie("carla@mesquita.rj.gov.br", "antiga").await?;

    let response = app
        .post_json(
            "/api/user/changepassword",
            &json!({
                "currentPassword": "antiga",
                "newPassword": "nova-senha",
                "confirmNewPassword": "outra"
            }),
            Some(&cookie),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await?["message"], "As senhas não coincidem.");

    let response = app
        .post_json(
            "/api/user/changepassword",
            &json!({
                "currentPassword": "errada",
                "newPassword": "nova-senha",
                "confirmNewPassword": "nova-senha"
            }),
            Some(&cookie),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await?["message"], "Senha atual incorreta.");

    let response = app
        .post_json(
            "/api/user/changepassword",
            &json!({
                "currentPassword": "antiga",
                "newPassword": "nova-senha",
                "confirmNewPassword": "nova-senha"
            }),
            Some(&cookie),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["message"], "Senha alterada com sucesso.");

    assert!(app.login_cookie("carla@mesquita.rj.gov.br", "antiga").await.is_err());
    app.login_cookie("carla@mesquita.rj.gov.br", "nova-senha").await?;

    app.cleanup().await?;
    Ok(())
}
