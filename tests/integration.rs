//! End-to-end scenarios driven through the real router (spec §8): first
//! boot, CRUD against a freshly created table, and the RLS/export paths.

use axum_test::TestServer;
use sblite::config::Config;
use sblite::state::AppState;

async fn test_app() -> TestServer {
    let mut config = Config::load().unwrap_or_else(|_| {
        toml::from_str("").expect("empty toml parses into all-default Config")
    });
    config.database.path = "sqlite::memory:".to_string();
    let state = AppState::bootstrap(config).await.unwrap();
    let app = sblite::router::build(state);
    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn health_check_is_unauthenticated() {
    let server = test_app().await;
    let response = server.get("/_/api/health").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn first_boot_setup_then_login_then_dashboard_route_requires_session() {
    let server = test_app().await;

    // Dashboard route is rejected before login.
    server.get("/_/api/tables").await.assert_status(axum::http::StatusCode::UNAUTHORIZED);

    let setup_response = server
        .post("/_/api/auth/setup")
        .json(&serde_json::json!({ "password": "correct horse battery staple" }))
        .await;
    setup_response.assert_status_ok();

    // Setup immediately issues a session (spec §4.5, §8 scenario 1).
    let setup_cookie = setup_response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .expect("setup sets a session cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    server
        .get("/_/api/tables")
        .add_header(axum::http::header::COOKIE, setup_cookie.parse().unwrap())
        .await
        .assert_status_ok();

    // Running setup twice is a precondition failure.
    server
        .post("/_/api/auth/setup")
        .json(&serde_json::json!({ "password": "anything" }))
        .await
        .assert_status(axum::http::StatusCode::PRECONDITION_FAILED);

    let login_response = server
        .post("/_/api/auth/login")
        .json(&serde_json::json!({ "password": "correct horse battery staple" }))
        .await;
    login_response.assert_status_ok();

    let cookie = login_response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .expect("login sets a session cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    server
        .get("/_/api/tables")
        .add_header(axum::http::header::COOKIE, cookie.parse().unwrap())
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn setup_rejects_short_password() {
    let server = test_app().await;
    server
        .post("/_/api/auth/setup")
        .json(&serde_json::json!({ "password": "short" }))
        .await
        .assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_table_then_crud_round_trip() {
    let server = test_app().await;
    server
        .post("/_/api/auth/setup")
        .json(&serde_json::json!({ "password": "operator-pass" }))
        .await
        .assert_status_ok();
    let login_response = server
        .post("/_/api/auth/login")
        .json(&serde_json::json!({ "password": "operator-pass" }))
        .await;
    let cookie = login_response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    server
        .post("/_/api/tables")
        .add_header(axum::http::header::COOKIE, cookie.parse().unwrap())
        .json(&serde_json::json!({
            "name": "notes",
            "columns": [
                {"name": "id", "type": "text", "primary": true, "nullable": false},
                {"name": "body", "type": "text", "primary": false, "nullable": true}
            ]
        }))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    server
        .post("/_/api/data/notes")
        .json(&serde_json::json!({ "id": "1", "body": "hello world" }))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let listed = server.get("/_/api/data/notes").await;
    listed.assert_status_ok();
    let body: serde_json::Value = listed.json();
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["body"], "hello world");
}

#[tokio::test]
async fn sql_editor_translates_and_runs_pg_syntax() {
    let server = test_app().await;
    server
        .post("/_/api/auth/setup")
        .json(&serde_json::json!({ "password": "operator-pass" }))
        .await
        .assert_status_ok();
    let login_response = server
        .post("/_/api/auth/login")
        .json(&serde_json::json!({ "password": "operator-pass" }))
        .await;
    let cookie = login_response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let response = server
        .post("/_/api/sql")
        .add_header(axum::http::header::COOKIE, cookie.parse().unwrap())
        .json(&serde_json::json!({ "query": "SELECT NOW()" }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body["was_translated"].as_bool().unwrap());
}

#[tokio::test]
async fn auth_status_reflects_setup_and_session_state() {
    let server = test_app().await;
    let status: serde_json::Value = server.get("/_/api/auth/status").await.json();
    assert_eq!(status["needs_setup"], true);
    assert_eq!(status["authenticated"], false);

    server
        .post("/_/api/auth/setup")
        .json(&serde_json::json!({ "password": "operator-pass" }))
        .await
        .assert_status_ok();
    let login_response = server
        .post("/_/api/auth/login")
        .json(&serde_json::json!({ "password": "operator-pass" }))
        .await;
    let cookie = login_response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let status = server
        .get("/_/api/auth/status")
        .add_header(axum::http::header::COOKIE, cookie.parse().unwrap())
        .await
        .json::<serde_json::Value>();
    assert_eq!(status["needs_setup"], false);
    assert_eq!(status["authenticated"], true);
}

#[tokio::test]
async fn toggling_allow_anonymous_setting_gates_anonymous_signup() {
    // spec §8: setAllowAnonymous(true) ; signupAnon ; setAllowAnonymous(false)
    // ; signupAnon yields (user, 403 containing "anonymous").
    let server = test_app().await;
    server
        .post("/_/api/auth/setup")
        .json(&serde_json::json!({ "password": "operator-pass" }))
        .await
        .assert_status_ok();
    let login_response = server
        .post("/_/api/auth/login")
        .json(&serde_json::json!({ "password": "operator-pass" }))
        .await;
    let cookie = login_response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    // Disallowed by default config.
    server
        .post("/_/api/auth/anonymous")
        .await
        .assert_status(axum::http::StatusCode::FORBIDDEN);

    server
        .put("/_/api/settings/allow_anonymous")
        .add_header(axum::http::header::COOKIE, cookie.parse().unwrap())
        .json(&serde_json::json!({ "value": "true" }))
        .await
        .assert_status_ok();

    server.post("/_/api/auth/anonymous").await.assert_status_ok();

    server
        .put("/_/api/settings/allow_anonymous")
        .add_header(axum::http::header::COOKIE, cookie.parse().unwrap())
        .json(&serde_json::json!({ "value": "false" }))
        .await
        .assert_status_ok();

    let rejected = server.post("/_/api/auth/anonymous").await;
    rejected.assert_status(axum::http::StatusCode::FORBIDDEN);
    let body: serde_json::Value = rejected.json();
    assert!(body["message"].as_str().unwrap().contains("anonymous"));
}

#[tokio::test]
async fn pg_mode_uuid_default_is_injected_on_insert() {
    // spec §8 testable invariant #3: a PG-syntax `CREATE TABLE` with a
    // `UUID ... DEFAULT gen_random_uuid()` column, followed by an INSERT
    // that omits it, yields a row whose id is a real UUID v4.
    let server = test_app().await;
    server
        .post("/_/api/auth/setup")
        .json(&serde_json::json!({ "password": "operator-pass" }))
        .await
        .assert_status_ok();
    let login_response = server
        .post("/_/api/auth/login")
        .json(&serde_json::json!({ "password": "operator-pass" }))
        .await;
    let cookie = login_response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    server
        .post("/_/api/sql")
        .add_header(axum::http::header::COOKIE, cookie.parse().unwrap())
        .json(&serde_json::json!({
            "query": "CREATE TABLE widgets (id UUID PRIMARY KEY DEFAULT gen_random_uuid(), name TEXT)"
        }))
        .await
        .assert_status_ok();

    let insert = server
        .post("/_/api/sql")
        .add_header(axum::http::header::COOKIE, cookie.parse().unwrap())
        .json(&serde_json::json!({ "query": "INSERT INTO widgets DEFAULT VALUES" }))
        .await;
    insert.assert_status_ok();
    let insert_body: serde_json::Value = insert.json();
    assert!(insert_body["error"].is_null(), "insert failed: {insert_body:?}");

    let select = server
        .post("/_/api/sql")
        .add_header(axum::http::header::COOKIE, cookie.parse().unwrap())
        .json(&serde_json::json!({ "query": "SELECT id FROM widgets" }))
        .await;
    select.assert_status_ok();
    let select_body: serde_json::Value = select.json();
    let id = select_body["rows"][0]["id"].as_str().unwrap();
    let uuid_v4 = regex::Regex::new(
        "^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$",
    )
    .unwrap();
    assert!(uuid_v4.is_match(id), "not a UUID v4: {id}");
}

#[tokio::test]
async fn batch_delete_users_reports_per_item_outcome() {
    // spec §7: "partial success — multi-object delete returns 207 with a
    // per-item result array". One id exists, one does not; the request
    // as a whole still succeeds with a mixed-outcome body.
    let server = test_app().await;
    server
        .post("/_/api/auth/setup")
        .json(&serde_json::json!({ "password": "operator-pass" }))
        .await
        .assert_status_ok();
    let login_response = server
        .post("/_/api/auth/login")
        .json(&serde_json::json!({ "password": "operator-pass" }))
        .await;
    let cookie = login_response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let signup: serde_json::Value = server
        .post("/_/api/auth/signup")
        .json(&serde_json::json!({ "email": "a@example.com", "password": "hunter2" }))
        .await
        .json();
    let user_id = signup["user_id"].as_str().unwrap().to_string();

    let response = server
        .post("/_/api/users/batch-delete")
        .add_header(axum::http::header::COOKIE, cookie.parse().unwrap())
        .json(&serde_json::json!({ "ids": [user_id, "does-not-exist"] }))
        .await;
    response.assert_status(axum::http::StatusCode::MULTI_STATUS);
    let body: serde_json::Value = response.json();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["success"], true);
    assert_eq!(results[1]["success"], false);
    assert!(results[1]["error"].as_str().unwrap().contains("not found"));
}
