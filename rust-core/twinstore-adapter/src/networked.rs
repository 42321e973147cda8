// SPDX-License-Identifier: PMPL-1.0-or-later

//! Networked document backend.
//!
//! [`NetworkedAdapter`] talks to a remote document server over JSON/HTTP. A
//! single session (HTTP client, base URL, database name) is created by
//! [`DocumentAdapter::connect`] after a health handshake and shared by every
//! operation until [`DocumentAdapter::close`]. Collections are addressed by
//! name on each request; nothing is cached locally.
//!
//! # Protocol
//!
//! Every operation is `POST <base>/action/<name>` with a JSON body carrying
//! `database`, `collection` and the operation's arguments:
//!
//! | action            | arguments                         | response                                   |
//! |-------------------|-----------------------------------|--------------------------------------------|
//! | `findOne`         | `filter`                          | `{document}`                               |
//! | `find`            | `filter, sort, skip, limit`       | `{documents}`                              |
//! | `insertOne`       | `document`                        | `{insertedId}`                             |
//! | `updateOne/Many`  | `filter, update, upsert`          | `{matchedCount, modifiedCount, upsertedId}`|
//! | `deleteOne/Many`  | `filter`                          | `{deletedCount}`                           |
//! | `countDocuments`  | `filter`                          | `{count}`                                  |
//!
//! Calling any operation before `connect()` fails with
//! [`StoreError::Connection`]; the adapter never connects on its own.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::adapter::DocumentAdapter;
use crate::config::NetworkedConfig;
use crate::document::{Document, Filter, FindOptions, ID_FIELD, INTERNAL_ID_FIELD};
use crate::embedded::validate_collection_name;
use crate::error::{StoreError, StoreResult};
use crate::update::{RemoveOptions, Update, UpdateOptions};

/// Header carrying the optional API key.
pub const API_KEY_HEADER: &str = "api-key";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    database: &'a str,
    collection: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<&'a Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    update: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    upsert: Option<bool>,
}

impl<'a> ActionRequest<'a> {
    fn new(database: &'a str, collection: &'a str) -> Self {
        Self {
            database,
            collection,
            filter: None,
            document: None,
            update: None,
            sort: None,
            skip: None,
            limit: None,
            upsert: None,
        }
    }

    fn filter(mut self, filter: &Filter) -> Self {
        self.filter = Some(filter.to_value());
        self
    }
}

#[derive(Debug, Deserialize)]
struct FindOneResponse {
    #[serde(default)]
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    documents: Vec<Document>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertResponse {
    inserted_id: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    matched_count: u64,
    #[serde(default)]
    modified_count: u64,
    #[serde(default)]
    upserted_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    deleted_count: u64,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

/// Error body returned by the document server on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The shared connection established by `connect()`.
#[derive(Debug, Clone)]
struct Session {
    http: reqwest::Client,
    base_url: Url,
    database: String,
    api_key: Option<String>,
}

impl Session {
    fn url(&self, path: &str) -> StoreResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| StoreError::InvalidArgument(format!("invalid request path `{path}`: {e}")))
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key.as_str()),
            None => builder,
        }
    }

    async fn action<T: DeserializeOwned>(
        &self,
        action: &str,
        body: &ActionRequest<'_>,
    ) -> StoreResult<T> {
        let url = self.url(&format!("action/{action}"))?;
        let response = self.apply_auth(self.http.post(url)).json(body).send().await?;
        handle_response(response).await
    }
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> StoreResult<T> {
    let status = response.status();
    if status.is_success() {
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    } else {
        Err(extract_error(response).await)
    }
}

/// Turn a non-2xx response into the matching [`StoreError`] variant.
async fn extract_error(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let message = match response.json::<ErrorBody>().await {
        Ok(ErrorBody {
            message: Some(message),
            ..
        }) => message,
        Ok(ErrorBody {
            error: Some(error), ..
        }) => error,
        _ => format!("HTTP {status}"),
    };
    status_error(status, message)
}

fn status_error(status: u16, message: String) -> StoreError {
    match status {
        409 => StoreError::Conflict(message),
        400 | 422 => StoreError::InvalidArgument(message),
        _ => StoreError::Remote { status, message },
    }
}

fn base_url(raw: &str) -> StoreResult<Url> {
    // A trailing slash keeps `join` from replacing the last path segment.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized)
        .map_err(|e| StoreError::InvalidArgument(format!("invalid document server URL `{raw}`: {e}")))
}

// ---------------------------------------------------------------------------
// NetworkedAdapter
// ---------------------------------------------------------------------------

/// A document adapter backed by a remote document server.
///
/// # Examples
///
/// ```rust,no_run
/// use twinstore_adapter::{DocumentAdapter, NetworkedAdapter, NetworkedConfig};
///
/// # tokio_test::block_on(async {
/// let adapter = NetworkedAdapter::new(NetworkedConfig::default()).unwrap();
/// adapter.connect().await.unwrap();
/// let total = adapter.count("projects", &Default::default()).await.unwrap();
/// println!("{total} projects");
/// # });
/// ```
pub struct NetworkedAdapter {
    base_url: Url,
    database: String,
    api_key: Option<String>,
    timeout: Duration,
    session: RwLock<Option<Session>>,
}

impl NetworkedAdapter {
    /// Create an unconnected adapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] if the URL cannot be parsed or
    /// the database name is empty.
    pub fn new(config: NetworkedConfig) -> StoreResult<Self> {
        if config.database.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "database name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            base_url: base_url(&config.url)?,
            database: config.database,
            api_key: config.api_key,
            timeout: Duration::from_secs(config.timeout_secs),
            session: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub async fn is_connected(&self) -> bool {
        self.session.read().await.is_some()
    }

    async fn session(&self) -> StoreResult<Session> {
        self.session.read().await.clone().ok_or_else(|| {
            StoreError::Connection(format!(
                "networked adapter for `{}` is not connected; call connect() first",
                self.base_url
            ))
        })
    }
}

impl std::fmt::Debug for NetworkedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkedAdapter")
            .field("base_url", &self.base_url.as_str())
            .field("database", &self.database)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl DocumentAdapter for NetworkedAdapter {
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        validate_collection_name(collection)?;
        let session = self.session().await?;
        let request = ActionRequest::new(&session.database, collection).filter(filter);
        let response: FindOneResponse = session.action("findOne", &request).await?;
        Ok(response.document)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>> {
        validate_collection_name(collection)?;
        let session = self.session().await?;
        let mut request = ActionRequest::new(&session.database, collection).filter(filter);
        request.sort = options.sort_to_value();
        request.skip = options.skip;
        request.limit = options.limit;
        let response: FindResponse = session.action("find", &request).await?;
        debug!(collection, returned = response.documents.len(), "find");
        Ok(response.documents)
    }

    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<Document> {
        validate_collection_name(collection)?;
        let session = self.session().await?;

        let mut request = ActionRequest::new(&session.database, collection);
        request.document = Some(&doc);
        let inserted: InsertResponse = session.action("insertOne", &request).await?;

        let by_internal_id = Filter::new().eq(INTERNAL_ID_FIELD, inserted.inserted_id.clone());
        let request = ActionRequest::new(&session.database, collection).filter(&by_internal_id);
        let fetched: FindOneResponse = session.action("findOne", &request).await?;

        let mut stored = match fetched.document {
            Some(stored) => stored,
            None => {
                warn!(collection, internal_id = %inserted.inserted_id, "Inserted document not readable; returning local copy");
                let mut local = doc.clone();
                local.insert(INTERNAL_ID_FIELD.to_string(), inserted.inserted_id);
                local
            }
        };
        // The logical id always wins over whatever the server returned.
        if let Some(id) = doc.get(ID_FIELD) {
            stored.insert(ID_FIELD.to_string(), id.clone());
        }
        debug!(collection, "insert");
        Ok(stored)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        options: UpdateOptions,
    ) -> StoreResult<u64> {
        validate_collection_name(collection)?;
        update.validate()?;
        let session = self.session().await?;

        let mut request = ActionRequest::new(&session.database, collection).filter(filter);
        request.update = Some(update.to_wire());
        request.upsert = Some(options.upsert);
        let action = if options.multi { "updateMany" } else { "updateOne" };
        let response: UpdateResponse = session.action(action, &request).await?;

        let affected = response.matched_count + u64::from(response.upserted_id.is_some());
        debug!(
            collection,
            action,
            matched = response.matched_count,
            modified = response.modified_count,
            affected,
            "update"
        );
        Ok(affected)
    }

    async fn remove(
        &self,
        collection: &str,
        filter: &Filter,
        options: RemoveOptions,
    ) -> StoreResult<u64> {
        validate_collection_name(collection)?;
        let session = self.session().await?;
        let request = ActionRequest::new(&session.database, collection).filter(filter);
        let action = if options.multi { "deleteMany" } else { "deleteOne" };
        let response: DeleteResponse = session.action(action, &request).await?;
        debug!(collection, action, removed = response.deleted_count, "remove");
        Ok(response.deleted_count)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        validate_collection_name(collection)?;
        let session = self.session().await?;
        let request = ActionRequest::new(&session.database, collection).filter(filter);
        let response: CountResponse = session.action("countDocuments", &request).await?;
        Ok(response.count)
    }

    async fn connect(&self) -> StoreResult<()> {
        let mut slot = self.session.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| StoreError::Connection(format!("failed to build HTTP client: {e}")))?;
        let session = Session {
            http,
            base_url: self.base_url.clone(),
            database: self.database.clone(),
            api_key: self.api_key.clone(),
        };

        let health = session.url("health")?;
        let response = session.apply_auth(session.http.get(health)).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::Connection(format!(
                "document server health check failed with HTTP {}",
                response.status().as_u16()
            )));
        }

        info!(url = %self.base_url, database = %self.database, "Connected to document server");
        *slot = Some(session);
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        if self.session.write().await.take().is_some() {
            info!(url = %self.base_url, "Disconnected from document server");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "networked"
    }
}
