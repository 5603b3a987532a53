//! Request routing onto the cache engine.
//!
//! Lets the SDK's request-execution layer treat the local cache like the
//! remote service: a [`CacheRequest`] with a method, collection, optional
//! entity id, query, and body is dispatched onto the matching
//! [`CacheEngine`] operation and answered with a [`CacheResponse`].
//!
//! | Method        | Entity id  | Operation                         |
//! |---------------|------------|-----------------------------------|
//! | `GET`         | `_count`   | [`CacheEngine::count`]            |
//! | `GET`         | `_group`   | [`CacheEngine::group`] (body = aggregation) |
//! | `GET`         | any other  | [`CacheEngine::find_by_id`]       |
//! | `GET`         | none       | [`CacheEngine::find`]             |
//! | `POST`/`PUT`  | ignored    | [`CacheEngine::save`]             |
//! | `DELETE`      | present    | [`CacheEngine::remove_by_id`]     |
//! | `DELETE`      | none       | [`CacheEngine::remove`]           |

use std::collections::BTreeMap;

use cairn_core::{Aggregation, CairnResult, Query, Record, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::engine::CacheEngine;

/// Entity id that routes `GET` to a count.
pub const COUNT_ENTITY: &str = "_count";

/// Entity id that routes `GET` to an aggregation.
pub const GROUP_ENTITY: &str = "_group";

const CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// A data-service request to answer from the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRequest {
    pub method: RequestMethod,
    pub collection: String,
    #[serde(default)]
    pub entity_id: Option<Value>,
    #[serde(default)]
    pub query: Option<Query>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl CacheRequest {
    pub fn new(method: RequestMethod, collection: impl Into<String>) -> Self {
        Self {
            method,
            collection: collection.into(),
            entity_id: None,
            query: None,
            body: None,
        }
    }

    pub fn get(collection: impl Into<String>) -> Self {
        Self::new(RequestMethod::Get, collection)
    }

    pub fn post(collection: impl Into<String>) -> Self {
        Self::new(RequestMethod::Post, collection)
    }

    pub fn put(collection: impl Into<String>) -> Self {
        Self::new(RequestMethod::Put, collection)
    }

    pub fn delete(collection: impl Into<String>) -> Self {
        Self::new(RequestMethod::Delete, collection)
    }

    pub fn entity_id(mut self, id: impl Into<Value>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    fn entity(&self) -> Option<&str> {
        self.entity_id.as_ref().and_then(Value::as_str)
    }
}

/// The cache's answer to a [`CacheRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub data: Value,
}

impl CacheResponse {
    /// A 200 response carrying `data` as JSON.
    pub fn ok(data: Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), CONTENT_TYPE.to_string());
        Self {
            status_code: 200,
            headers,
            data,
        }
    }
}

/// Dispatch `request` onto `engine`.
pub async fn execute(engine: &CacheEngine, request: CacheRequest) -> CairnResult<CacheResponse> {
    debug!(
        method = ?request.method,
        collection = %request.collection,
        "executing cache request"
    );
    let collection = request.collection.as_str();
    let query = request.query.as_ref();

    let data = match request.method {
        RequestMethod::Get => match request.entity() {
            Some(COUNT_ENTITY) => {
                let counted = engine.count(collection, query).await?;
                json!({ "count": counted.count })
            }
            Some(GROUP_ENTITY) => {
                let body = request.body.clone().ok_or_else(|| invalid_body("aggregation"))?;
                let aggregation = Aggregation::from_value(body)?;
                engine
                    .group(collection, &aggregation)
                    .await?
                    .unwrap_or(Value::Null)
            }
            _ => match request.entity_id.clone() {
                Some(id) => engine
                    .find_by_id(collection, id)
                    .await?
                    .map_or(Value::Null, Value::from),
                None => records_value(engine.find(collection, query).await?),
            },
        },
        RequestMethod::Post | RequestMethod::Put => match request.body.clone() {
            Some(Value::Array(items)) => {
                let records = items
                    .into_iter()
                    .map(Record::from_value)
                    .collect::<CairnResult<Vec<_>>>()?;
                records_value(engine.save(collection, records).await?)
            }
            Some(item) => Value::from(engine.save(collection, Record::from_value(item)?).await?),
            None => return Err(invalid_body("record")),
        },
        RequestMethod::Delete => match request.entity_id.clone() {
            Some(id) => engine
                .remove_by_id(collection, id)
                .await?
                .map_or(Value::Null, Value::from),
            None => records_value(engine.remove(collection, query).await?),
        },
    };

    Ok(CacheResponse::ok(data))
}

fn records_value(records: Vec<Record>) -> Value {
    Value::Array(records.into_iter().map(Value::from).collect())
}

fn invalid_body(expected: &str) -> cairn_core::CairnError {
    ValidationError::InvalidRecord {
        reason: format!("request body must carry the {}", expected),
    }
    .into()
}
