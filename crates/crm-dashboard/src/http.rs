//! REST data-access adapter
//!
//! One instance per resource (`leads`, `tasks`, `account`):
//! - `GET    {base}/{resource}`       list; bare array or `{"data": [...]}` / `{"<resource>": [...]}`,
//!   or a single record (bare or `{"data": {...}}`) for singleton resources
//! - `POST   {base}/{resource}`       create; body is the field map
//! - `PATCH  {base}/{resource}/{id}`  update; response is the entity or empty
//! - `DELETE {base}/{resource}/{id}`  delete
//!
//! A success body that is not JSON (`OK`, `Deleted`) acknowledges a PATCH or
//! DELETE; `list` and `create` need a decodable entity.
//!
//! Failures are typed from the HTTP status here, at the source, so nothing
//! downstream inspects message text.

use crate::config::{ApiConfig, ConfigError};
use async_trait::async_trait;
use crm_sync::{ApiError, ApiErrorKind, DataAccess, Entity, EntityId, FieldChanges};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// HTTP-backed [`DataAccess`]
pub struct HttpDataAccess<E> {
    client: Client,
    collection: Url,
    resource: String,
    token: Option<String>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> std::fmt::Debug for HttpDataAccess<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDataAccess")
            .field("collection", &self.collection.as_str())
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl<E> HttpDataAccess<E> {
    /// Create adapter for `resource` under `config.base_url`
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] for an unusable base URL,
    /// [`ConfigError::Client`] if the HTTP client cannot be built
    pub fn new(config: &ApiConfig, resource: &str) -> Result<Self, ConfigError> {
        let mut collection = Url::parse(&config.base_url)
            .map_err(|e| ConfigError::Invalid(format!("api.base_url: {e}")))?;
        collection
            .path_segments_mut()
            .map_err(|()| ConfigError::Invalid("api.base_url cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(resource);

        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            collection,
            resource: resource.to_string(),
            token: config.token.clone(),
            _entity: PhantomData,
        })
    }

    /// URL of the collection
    #[inline]
    #[must_use]
    pub fn collection_url(&self) -> &Url {
        &self.collection
    }

    fn item_url(&self, id: &EntityId) -> Url {
        let mut url = self.collection.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id.as_str());
        }
        url
    }

    /// Send and classify the success body
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&FieldChanges>,
    ) -> Result<Reply, ApiError> {
        tracing::debug!(%method, %url, "request");
        let mut request = self.client.request(method.clone(), url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            let error = status_error(status, &bytes);
            tracing::debug!(%method, %status, kind = %error.kind, "request failed");
            return Err(error);
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Reply::Empty);
        }
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Reply::Json(value)),
            Err(e) => {
                tracing::debug!(%method, %status, error = %e, "success body is not JSON");
                Ok(Reply::Text(e.to_string()))
            }
        }
    }
}

/// Success body of one request
#[derive(Debug)]
enum Reply {
    Empty,
    Json(Value),
    /// Not JSON; carries the parse error
    Text(String),
}

impl Reply {
    /// Body as JSON, or why an entity cannot be read from it
    fn json(self, what: &str) -> Result<Value, ApiError> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Empty => Err(unexpected(&format!("malformed response: empty {what}"))),
            Self::Text(e) => Err(unexpected(&format!("malformed response: {what}: {e}"))),
        }
    }
}

#[async_trait]
impl<E> DataAccess<E> for HttpDataAccess<E>
where
    E: Entity + DeserializeOwned,
{
    async fn list(&self) -> Result<Vec<E>, ApiError> {
        let body = match self.send(Method::GET, self.collection.clone(), None).await? {
            Reply::Empty => return Ok(Vec::new()),
            reply => reply.json("list")?,
        };
        let items = match body {
            Value::Array(items) => items,
            Value::Object(mut map) => match map
                .remove("data")
                .or_else(|| map.remove(&self.resource))
            {
                Some(Value::Array(items)) => items,
                Some(single @ Value::Object(_)) => vec![single],
                Some(_) => return Err(unexpected("list response has no array")),
                // Singleton resource returned as a bare record
                None => vec![Value::Object(map)],
            },
            _ => return Err(unexpected("list response is not an array")),
        };
        items
            .into_iter()
            .map(|item| decode(item).ok_or_else(|| unexpected("list item does not match the schema")))
            .collect()
    }

    async fn create(&self, fields: FieldChanges) -> Result<E, ApiError> {
        let body = self
            .send(Method::POST, self.collection.clone(), Some(&fields))
            .await?
            .json("create")?;
        decode(body).ok_or_else(|| unexpected("created entity does not match the schema"))
    }

    async fn update(&self, id: &EntityId, changes: &FieldChanges) -> Result<Option<E>, ApiError> {
        // Acknowledgements such as {"success": true} or `OK` carry no entity
        match self.send(Method::PATCH, self.item_url(id), Some(changes)).await? {
            Reply::Json(body) => Ok(decode(body)),
            Reply::Empty | Reply::Text(_) => Ok(None),
        }
    }

    async fn delete(&self, id: &EntityId) -> Result<(), ApiError> {
        self.send(Method::DELETE, self.item_url(id), None).await?;
        Ok(())
    }
}

/// Decode an entity, looking inside a `{"data": ...}` wrapper
fn decode<E: DeserializeOwned>(value: Value) -> Option<E> {
    let value = match value {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(value).ok()
}

fn unexpected(what: &str) -> ApiError {
    ApiError::new(ApiErrorKind::Other, what)
}

fn transport_error(error: reqwest::Error) -> ApiError {
    if error.is_builder() {
        ApiError::new(ApiErrorKind::Other, error.to_string())
    } else {
        ApiError::network(error.to_string())
    }
}

/// Map a non-success status to a typed error
///
/// The message comes from a JSON `error` or `message` field, falling back to
/// the raw body and then the status line.
#[must_use]
pub fn status_error(status: StatusCode, body: &[u8]) -> ApiError {
    let kind = match status.as_u16() {
        401 | 403 => ApiErrorKind::Authentication,
        400 | 409 | 422 => ApiErrorKind::Validation,
        404 => ApiErrorKind::NotFound,
        500..=599 => ApiErrorKind::Server,
        _ => ApiErrorKind::Other,
    };

    let from_json = serde_json::from_slice::<Value>(body).ok().and_then(|v| {
        ["error", "message"]
            .into_iter()
            .find_map(|key| v.get(key).and_then(Value::as_str).map(str::to_string))
    });
    let message = from_json
        .or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            (!text.is_empty()).then_some(text)
        })
        .unwrap_or_else(|| status.to_string());

    ApiError::new(kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_kinds() {
        let cases = [
            (StatusCode::UNAUTHORIZED, ApiErrorKind::Authentication),
            (StatusCode::FORBIDDEN, ApiErrorKind::Authentication),
            (StatusCode::BAD_REQUEST, ApiErrorKind::Validation),
            (StatusCode::CONFLICT, ApiErrorKind::Validation),
            (StatusCode::UNPROCESSABLE_ENTITY, ApiErrorKind::Validation),
            (StatusCode::NOT_FOUND, ApiErrorKind::NotFound),
            (StatusCode::BAD_GATEWAY, ApiErrorKind::Server),
            (StatusCode::TOO_MANY_REQUESTS, ApiErrorKind::Other),
        ];
        for (status, kind) in cases {
            assert_eq!(status_error(status, b"").kind, kind, "{status}");
        }
    }

    #[test]
    fn message_prefers_json_fields() {
        let err = status_error(StatusCode::UNAUTHORIZED, br#"{"error":"Invalid or expired token"}"#);
        assert_eq!(err.message, "Invalid or expired token");

        let err = status_error(StatusCode::BAD_REQUEST, br#"{"message":"name is required"}"#);
        assert_eq!(err.message, "name is required");

        let err = status_error(StatusCode::BAD_GATEWAY, b"upstream down\n");
        assert_eq!(err.message, "upstream down");

        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, b"");
        assert!(err.message.contains("503"));
    }

    #[test]
    fn urls_are_built_under_base() {
        let config = ApiConfig {
            base_url: "https://crm.example.com/api/".to_string(),
            ..ApiConfig::default()
        };
        let api: HttpDataAccess<crate::lead::Lead> = HttpDataAccess::new(&config, "leads").unwrap();
        assert_eq!(api.collection_url().as_str(), "https://crm.example.com/api/leads");
        assert_eq!(
            api.item_url(&EntityId::from("L 1")).as_str(),
            "https://crm.example.com/api/leads/L%201"
        );
    }

    #[test]
    fn data_wrapper_is_unwrapped() {
        let lead: Option<crate::lead::Lead> =
            decode(serde_json::json!({"data": {"id": "L1", "name": "Ada"}}));
        assert_eq!(lead.unwrap().name, "Ada");
    }
}
