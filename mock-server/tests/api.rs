use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, User, BASIC_CREDENTIALS, BINARY_PAYLOAD};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn form_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded;charset=utf-8")
        .body(body.to_string())
        .unwrap()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

// --- list ---

#[tokio::test]
async fn list_users_empty() {
    let resp = app().oneshot(get("/users")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let users: Vec<User> = body_json(resp).await;
    assert!(users.is_empty());
}

// --- create ---

#[tokio::test]
async fn create_user_from_form_returns_201() {
    let resp = app()
        .oneshot(form_request("POST", "/users", "name=Ada+Lovelace"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let user: User = body_json(resp).await;
    assert_eq!(user.id, 1);
    assert_eq!(user.name, "Ada Lovelace");
}

#[tokio::test]
async fn create_user_without_name_is_rejected() {
    let resp = app().oneshot(form_request("POST", "/users", "nick=x")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// --- get ---

#[tokio::test]
async fn get_user_not_found() {
    let resp = app().oneshot(get("/users/7")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_user_bad_id_returns_400() {
    let resp = app().oneshot(get("/users/not-a-number")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- emulated verbs ---

#[tokio::test]
async fn emulated_post_without_verb_is_not_allowed() {
    let resp = app().oneshot(form_request("POST", "/users/1", "name=x")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// --- secure ---

#[tokio::test]
async fn secure_requires_basic_credentials() {
    let resp = app().oneshot(get("/secure")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app()
        .oneshot(
            Request::builder()
                .uri("/secure")
                .header(http::header::AUTHORIZATION, BASIC_CREDENTIALS)
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// --- binary ---

#[tokio::test]
async fn binary_serves_raw_bytes() {
    let resp = app().oneshot(get("/binary")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[http::header::CONTENT_TYPE], "application/octet-stream");
    let body = body_bytes(resp).await;
    assert_eq!(&body[..], &BINARY_PAYLOAD[..]);
}

// --- echo ---

#[tokio::test]
async fn echo_reflects_method_query_and_body() {
    let resp = app()
        .oneshot(form_request("PATCH", "/echo?page=2", "a=1"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echoed: serde_json::Value = body_json(resp).await;
    assert_eq!(echoed["method"], "PATCH");
    assert_eq!(echoed["path"], "/echo");
    assert_eq!(echoed["query"], "page=2");
    assert_eq!(echoed["body"], "a=1");
    assert!(echoed["request_id"].is_string());
}

#[tokio::test]
async fn echo_reads_delete_bodies() {
    let resp = app()
        .oneshot(form_request("DELETE", "/echo", "reason=spam"))
        .await
        .unwrap();

    let echoed: serde_json::Value = body_json(resp).await;
    assert_eq!(echoed["method"], "DELETE");
    assert_eq!(echoed["body"], "reason=spam");
}

// --- full lifecycle ---

#[tokio::test]
async fn user_lifecycle_with_emulated_verbs() {
    use tower::Service;

    let mut app = app().into_service();

    // create
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(form_request("POST", "/users", "name=Ada"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: User = body_json(resp).await;
    let id = created.id;

    // rename through a real PUT
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(form_request("PUT", &format!("/users/{id}"), "name=Grace"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: User = body_json(resp).await;
    assert_eq!(updated.name, "Grace");

    // rename through POST + `_method`
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(form_request("POST", &format!("/users/{id}"), "name=Barbara&_method=put"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: User = body_json(resp).await;
    assert_eq!(updated.name, "Barbara");

    // delete through POST + override header
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(
            Request::builder()
                .method("POST")
                .uri(&format!("/users/{id}"))
                .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header("x-http-method-override", "delete")
                .body("_method=delete".to_string())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let body = body_bytes(resp).await;
    assert!(body.is_empty());

    // get after delete: 404
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get(&format!("/users/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // list after delete: empty
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(get("/users"))
        .await
        .unwrap();
    let users: Vec<User> = body_json(resp).await;
    assert!(users.is_empty());
}
