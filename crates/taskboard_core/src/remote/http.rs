//! REST client for `/api/v1/<collection>` style backends.
//!
//! # Responsibility
//! - Map each command to exactly one HTTP request.
//! - Fold transport errors, timeouts and bad responses into `RemoteFailure`.
//!
//! # Invariants
//! - Single attempt per call; reqwest redirects are the only follow-ups.
//! - Bodies wrap fields in the collection's resource key
//!   (`{"task": {...}}`).

use super::wire::{entities_from_body, fields_to_json, normalize_response};
use super::{
    Operation, RemoteErrorKind, RemoteFailure, RemoteOutcome, RemoteRequest, RemoteSyncClient,
};
use crate::config::RemoteConfig;
use crate::model::entity::Entity;
use crate::schema::SchemaRegistry;
use async_trait::async_trait;
use log::{info, warn};
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP implementation of [`RemoteSyncClient`].
pub struct HttpRemote {
    client: Client,
    base_url: String,
    resource_keys: BTreeMap<String, String>,
}

impl HttpRemote {
    /// Builds a client for every collection in `registry`.
    pub fn new(config: &RemoteConfig, registry: &SchemaRegistry) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        let resource_keys = registry
            .collections()
            .filter_map(|name| {
                registry
                    .get(name)
                    .map(|schema| (name.to_string(), schema.resource_key().to_string()))
            })
            .collect();
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            resource_keys,
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    fn resource_key<'a>(&'a self, collection: &'a str) -> &'a str {
        self.resource_keys
            .get(collection)
            .map_or(collection, String::as_str)
    }

    fn route(&self, request: &RemoteRequest) -> Result<(Method, String), RemoteFailure> {
        let base = self.collection_url(&request.collection);
        match (request.op, request.id) {
            (Operation::Create, _) => Ok((Method::POST, base)),
            (Operation::Update, Some(id)) => Ok((Method::PUT, format!("{base}/{id}"))),
            (Operation::Delete, Some(id)) => Ok((Method::DELETE, format!("{base}/{id}"))),
            (op, None) => Err(RemoteFailure::new(
                RemoteErrorKind::Malformed,
                format!("{op} request without target id"),
            )),
        }
    }
}

#[async_trait]
impl RemoteSyncClient for HttpRemote {
    async fn send(&self, request: RemoteRequest) -> RemoteOutcome {
        let started_at = Instant::now();
        let (method, url) = match self.route(&request) {
            Ok(route) => route,
            Err(failure) => return RemoteOutcome::Failed(failure),
        };

        let mut builder = self
            .client
            .request(method.clone(), url.as_str())
            .header(REQUEST_ID_HEADER, request.request_id.to_string());
        if request.op != Operation::Delete {
            let mut body = Map::new();
            body.insert(
                self.resource_key(&request.collection).to_string(),
                fields_to_json(&request.fields),
            );
            builder = builder.json(&Value::Object(body));
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                let failure = transport_failure(&err);
                warn!(
                    "event=remote_call module=remote status=error method={} url={} request_id={} duration_ms={} error_kind={}",
                    method,
                    url,
                    request.request_id,
                    started_at.elapsed().as_millis(),
                    failure.kind
                );
                return RemoteOutcome::Failed(failure);
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return RemoteOutcome::Failed(transport_failure(&err)),
        };
        let outcome = normalize_response(request.op, request.id, status, &body);
        info!(
            "event=remote_call module=remote status={} method={} url={} request_id={} http_status={} duration_ms={}",
            if outcome.is_confirmed() { "ok" } else { "error" },
            method,
            url,
            request.request_id,
            status,
            started_at.elapsed().as_millis()
        );
        outcome
    }

    async fn fetch_all(&self, collection: &str) -> Result<Vec<Entity>, RemoteFailure> {
        let url = self.collection_url(collection);
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|err| transport_failure(&err))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| transport_failure(&err))?;

        if !(200..300).contains(&status) {
            let kind = if status == 404 {
                RemoteErrorKind::NotFound
            } else {
                RemoteErrorKind::Status(status)
            };
            return Err(RemoteFailure::new(kind, format!("GET {url} returned {status}")));
        }
        entities_from_body(&body)
            .map_err(|message| RemoteFailure::new(RemoteErrorKind::Malformed, message))
    }
}

fn transport_failure(err: &reqwest::Error) -> RemoteFailure {
    let kind = if err.is_timeout() {
        RemoteErrorKind::Timeout
    } else if err.is_decode() {
        RemoteErrorKind::Malformed
    } else {
        RemoteErrorKind::Transport
    };
    RemoteFailure::new(kind, err.to_string())
}
