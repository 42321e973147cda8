// SPDX-License-Identifier: PMPL-1.0-or-later
//! In-process document server for exercising `NetworkedAdapter`.
//!
//! Speaks the `/action/<name>` protocol on an ephemeral port and evaluates
//! filters, updates and sorts with the adapter crate's own engine. Every
//! action name received is recorded so tests can assert which variant
//! (`updateOne` vs `updateMany`) the adapter chose.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use twinstore_adapter::{Document, Filter, FindOptions, StoreError, Update, INTERNAL_ID_FIELD};

type Collections = HashMap<(String, String), Vec<Document>>;

#[derive(Default)]
struct ServerState {
    collections: Mutex<Collections>,
    actions: Mutex<Vec<String>>,
    api_key: Option<String>,
}

/// Handle to a running mock server.
pub struct MockDocumentServer {
    pub addr: SocketAddr,
    state: Arc<ServerState>,
}

impl MockDocumentServer {
    pub async fn start() -> Self {
        Self::start_with_key(None).await
    }

    /// Start a server that rejects requests without a matching `api-key`.
    pub async fn start_with_key(api_key: Option<&str>) -> Self {
        let state = Arc::new(ServerState {
            api_key: api_key.map(str::to_string),
            ..ServerState::default()
        });
        let app = Router::new()
            .route("/health", get(health))
            .route("/action/{name}", post(action))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Action names received so far, in order.
    pub fn actions(&self) -> Vec<String> {
        self.state.actions.lock().unwrap().clone()
    }

    /// Raw stored documents of one collection.
    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.state
            .collections
            .lock()
            .unwrap()
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

fn authorized(state: &ServerState, headers: &HeaderMap) -> bool {
    match &state.api_key {
        None => true,
        Some(expected) => headers
            .get("api-key")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|provided| provided == expected),
    }
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = json!({"error": status.canonical_reason().unwrap_or("error"), "message": message.into()});
    (status, Json(body)).into_response()
}

fn store_error(err: StoreError) -> Response {
    match err {
        StoreError::InvalidArgument(message) => error(StatusCode::BAD_REQUEST, message),
        StoreError::Conflict(message) => error(StatusCode::CONFLICT, message),
        other => error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

async fn health(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return error(StatusCode::UNAUTHORIZED, "missing or invalid api-key");
    }
    Json(json!({"status": "ok"})).into_response()
}

async fn action(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return error(StatusCode::UNAUTHORIZED, "missing or invalid api-key");
    }
    state.actions.lock().unwrap().push(name.clone());

    let (Some(database), Some(collection)) = (
        body.get("database").and_then(Value::as_str),
        body.get("collection").and_then(Value::as_str),
    ) else {
        return error(StatusCode::BAD_REQUEST, "database and collection are required");
    };
    let key = (database.to_string(), collection.to_string());

    let filter = match body.get("filter") {
        Some(value) => match Filter::from_value(value) {
            Ok(filter) => filter,
            Err(err) => return store_error(err),
        },
        None => Filter::new(),
    };

    let mut collections = state.collections.lock().unwrap();
    let docs = collections.entry(key).or_default();

    match name.as_str() {
        "findOne" => {
            let document = docs.iter().find(|doc| filter.matches(doc)).cloned();
            Json(json!({ "document": document })).into_response()
        }
        "find" => {
            let mut options = FindOptions::new();
            if let Some(sort) = body.get("sort") {
                match FindOptions::sort_from_value(sort) {
                    Ok(keys) => options.sort = keys,
                    Err(err) => return store_error(err),
                }
            }
            options.skip = body.get("skip").and_then(Value::as_u64).map(|n| n as usize);
            options.limit = body.get("limit").and_then(Value::as_u64).map(|n| n as usize);
            let matched: Vec<Document> = docs.iter().filter(|doc| filter.matches(doc)).cloned().collect();
            Json(json!({ "documents": options.apply(matched) })).into_response()
        }
        "insertOne" => {
            let Some(mut document) = body.get("document").and_then(Value::as_object).cloned() else {
                return error(StatusCode::BAD_REQUEST, "document is required");
            };
            let internal_id = document
                .entry(INTERNAL_ID_FIELD.to_string())
                .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()))
                .clone();
            if docs.iter().any(|doc| doc.get(INTERNAL_ID_FIELD) == Some(&internal_id)) {
                return error(StatusCode::CONFLICT, "duplicate key error on _id");
            }
            docs.push(document);
            Json(json!({ "insertedId": internal_id })).into_response()
        }
        "updateOne" | "updateMany" => {
            let update = match body.get("update").map(Update::from_wire) {
                Some(Ok(update)) => update,
                Some(Err(err)) => return store_error(err),
                None => return error(StatusCode::BAD_REQUEST, "update is required"),
            };
            let upsert = body.get("upsert").and_then(Value::as_bool).unwrap_or(false);
            let mut matched = 0u64;
            for doc in docs.iter_mut().filter(|doc| filter.matches(doc)) {
                if let Err(err) = update.apply(doc) {
                    return store_error(err);
                }
                matched += 1;
                if name == "updateOne" {
                    break;
                }
            }
            let mut upserted_id = Value::Null;
            if matched == 0 && upsert {
                let mut seed = filter.seed_document();
                if let Err(err) = update.apply(&mut seed) {
                    return store_error(err);
                }
                let internal_id = Value::String(uuid::Uuid::new_v4().to_string());
                seed.insert(INTERNAL_ID_FIELD.to_string(), internal_id.clone());
                docs.push(seed);
                upserted_id = internal_id;
            }
            Json(json!({
                "matchedCount": matched,
                "modifiedCount": matched,
                "upsertedId": upserted_id,
            }))
            .into_response()
        }
        "deleteOne" | "deleteMany" => {
            let mut deleted = 0u64;
            docs.retain(|doc| {
                let remove = filter.matches(doc) && (name == "deleteMany" || deleted == 0);
                if remove {
                    deleted += 1;
                }
                !remove
            });
            Json(json!({ "deletedCount": deleted })).into_response()
        }
        "countDocuments" => {
            let count = docs.iter().filter(|doc| filter.matches(doc)).count();
            Json(json!({ "count": count })).into_response()
        }
        other => error(StatusCode::NOT_FOUND, format!("unknown action `{other}`")),
    }
}
