use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

/// Credentials accepted by `/secure` (`user:pass`).
pub const BASIC_CREDENTIALS: &str = "Basic dXNlcjpwYXNz";

/// Served by `/binary`; not valid UTF-8.
pub const BINARY_PAYLOAD: [u8; 4] = [0xff, 0xfe, 0x00, 0x80];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: u64,
    pub name: String,
}

#[derive(Deserialize)]
pub struct UserForm {
    pub name: String,
}

/// Form body of a POST standing in for another verb.
#[derive(Deserialize)]
pub struct EmulatedForm {
    #[serde(rename = "_method")]
    pub method: Option<String>,
    pub name: Option<String>,
}

#[derive(Default)]
pub struct Db {
    users: RwLock<HashMap<u64, User>>,
    next_id: AtomicU64,
}

pub type SharedDb = Arc<Db>;

pub fn app() -> Router {
    let db = SharedDb::default();
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user)
                .put(update_user)
                .delete(delete_user)
                .post(emulated_user),
        )
        .route("/secure", get(secure))
        .route("/slow", get(slow))
        .route("/binary", get(binary))
        .route("/echo", any(echo))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_users(State(db): State<SharedDb>) -> Json<Vec<User>> {
    let users = db.users.read().await;
    let mut users: Vec<User> = users.values().cloned().collect();
    users.sort_by_key(|user| user.id);
    Json(users)
}

async fn create_user(State(db): State<SharedDb>, Form(input): Form<UserForm>) -> (StatusCode, Json<User>) {
    let user = User {
        id: db.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        name: input.name,
    };
    debug!(id = user.id, "user created");
    db.users.write().await.insert(user.id, user.clone());
    (StatusCode::CREATED, Json(user))
}

async fn get_user(State(db): State<SharedDb>, Path(id): Path<u64>) -> Result<Json<User>, StatusCode> {
    let users = db.users.read().await;
    users.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_user(
    State(db): State<SharedDb>,
    Path(id): Path<u64>,
    Form(input): Form<UserForm>,
) -> Result<Json<User>, StatusCode> {
    rename_user(&db, id, input.name).await.map(Json)
}

async fn delete_user(State(db): State<SharedDb>, Path(id): Path<u64>) -> StatusCode {
    remove_user(&db, id).await
}

/// POST carrying an overridden verb, via header or `_method` field.
async fn emulated_user(
    State(db): State<SharedDb>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Form(input): Form<EmulatedForm>,
) -> Response {
    let verb = headers
        .get("x-http-method-override")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or(input.method)
        .unwrap_or_default()
        .to_lowercase();

    match (verb.as_str(), input.name) {
        ("delete", _) => remove_user(&db, id).await.into_response(),
        ("put" | "patch", Some(name)) => match rename_user(&db, id, name).await {
            Ok(user) => Json(user).into_response(),
            Err(status) => status.into_response(),
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn rename_user(db: &Db, id: u64, name: String) -> Result<User, StatusCode> {
    let mut users = db.users.write().await;
    let user = users.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    user.name = name;
    Ok(user.clone())
}

async fn remove_user(db: &Db, id: u64) -> StatusCode {
    match db.users.write().await.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn secure(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    match headers.get("authorization").and_then(|value| value.to_str().ok()) {
        Some(BASIC_CREDENTIALS) => Ok(Json(json!({ "authenticated": true }))),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "late"
}

async fn binary() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/octet-stream")], BINARY_PAYLOAD.to_vec())
}

/// Reflects the request back as JSON.
async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: String) -> Json<Value> {
    let headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect();
    Json(json!({
        "request_id": Uuid::new_v4(),
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": headers,
        "body": body,
    }))
}
