/// Integration tests for the users resource
mod common;

use api_service::infrastructure::config::RuntimeMode;
use axum::http::StatusCode;
use common::TestApp;
use rstest::rstest;
use serde_json::json;

fn app() -> TestApp {
    TestApp::for_mode(RuntimeMode::Test)
}

#[tokio::test]
async fn test_list_returns_seeded_users() {
    let response = app().get("/api/users").await;

    response.assert_status(StatusCode::OK);
    let body = response.json();
    assert_eq!(body["routeCode"], "USR-001-SUC");
    assert_eq!(body["message"], "Users retrieved successfully");
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(body["data"]["users"][0]["name"], "John Doe");
    assert_eq!(body["data"]["users"][1]["email"], "jane@example.com");
}

#[tokio::test]
async fn test_get_existing_user() {
    let response = app().get("/api/users/1").await;

    response.assert_status(StatusCode::OK);
    let body = response.json();
    assert_eq!(body["message"], "User retrieved successfully");
    assert_eq!(body["data"]["user"], json!({"id": 1, "name": "John Doe", "email": "john@example.com"}));
}

#[tokio::test]
async fn test_get_missing_user() {
    let response = app().get("/api/users/99").await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body = response.json();
    assert_eq!(body["errorCode"], "NF-001");
    assert_eq!(body["message"], "User 99 not found");
}

#[tokio::test]
async fn test_non_numeric_id_is_a_bad_request() {
    let response = app().get("/api/users/abc").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["errorCode"], "VAL-001");
}

#[tokio::test]
async fn test_create_then_fetch() {
    let app = app();
    let created = app.post_json("/api/users", &json!({"name": "Ada", "email": "ada@example.com"})).await;

    created.assert_status(StatusCode::CREATED);
    let body = created.json();
    assert_eq!(body["routeCode"], "USR-010-SUC");
    assert_eq!(body["message"], "User created successfully");
    assert_eq!(body["data"]["user"]["id"], 3);

    let fetched = app.get("/api/users/3").await;
    fetched.assert_status(StatusCode::OK);
    assert_eq!(fetched.json()["data"]["user"]["name"], "Ada");

    let listed = app.get("/api/users").await;
    assert_eq!(listed.json()["data"]["count"], 3);
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let response =
        app().post_json("/api/users", &json!({"name": "John", "email": "JOHN@example.com"})).await;

    response.assert_status(StatusCode::CONFLICT);
    let body = response.json();
    assert_eq!(body["routeCode"], "USR-011-ERR");
    assert_eq!(body["errorCode"], "BL-003");
    assert_eq!(body["message"], "A user with this email already exists");
}

#[rstest]
#[case(json!({"email": "ada@example.com"}), "VAL-002", "name is required")]
#[case(json!({"name": "Ada"}), "VAL-002", "email is required")]
#[case(json!({"name": "Ada", "email": "not-an-email"}), "VAL-003", "email must be a valid email address")]
#[tokio::test]
async fn test_invalid_payloads_are_rejected(
    #[case] payload: serde_json::Value,
    #[case] error_code: &str,
    #[case] message: &str,
) {
    let response = app().post_json("/api/users", &payload).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["routeCode"], "USR-012-ERR");
    assert_eq!(body["errorCode"], error_code);
    assert_eq!(body["message"], message);
}

#[tokio::test]
async fn test_markup_in_names_is_stored_escaped() {
    let app = app();
    let created =
        app.post_json("/api/users", &json!({"name": "<b>Ada</b>", "email": "ada@example.com"})).await;

    created.assert_status(StatusCode::CREATED);
    assert_eq!(created.json()["data"]["user"]["name"], "&lt;b&gt;Ada&lt;&#x2F;b&gt;");
}

#[tokio::test]
async fn test_form_encoded_create_is_refused_by_the_handler() {
    let response = app()
        .post_raw("/api/users", "application/x-www-form-urlencoded", "name=Ada&email=ada%40example.com")
        .await;

    // The handler only reads JSON, so the extractor refuses the form
    response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(response.json()["errorCode"], "VAL-001");
}
