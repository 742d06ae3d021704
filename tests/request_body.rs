//! Credential-body extraction: a missing or malformed request body answers
//! 400 with the standard error envelope, not axum's default 422.

use axum::{http::StatusCode, routing::post, Router};
use axum_test::TestServer;

use tavola::middleware::error_handling::AppJson;
use tavola::models::user::LoginRequest;

async fn echo_login(AppJson(request): AppJson<LoginRequest>) -> String {
    request.email
}

fn router() -> Router {
    Router::new().route("/login", post(echo_login))
}

#[tokio::test]
async fn missing_credential_fields_answer_bad_request() {
    let server = TestServer::new(router()).unwrap();
    let response = server.post("/login").json(&serde_json::json!({})).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"]["type"], "bad_request");
}

#[tokio::test]
async fn non_json_body_answers_bad_request() {
    let server = TestServer::new(router()).unwrap();
    let response = server.post("/login").text("email=a@b.com").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn well_formed_body_extracts() {
    let server = TestServer::new(router()).unwrap();
    let response = server
        .post("/login")
        .json(&serde_json::json!({ "email": "a@b.com", "password": "Password1!" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "a@b.com");
}
