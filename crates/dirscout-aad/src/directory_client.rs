//! HTTP access to the directory API: URL construction, response
//! classification and throttling retries.

use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::record::resolve_object_id;
use crate::{AadError, AadResult, AccessToken, CollectorConfig, ReadinessGate};

/// Key of the error envelope in directory responses.
pub const ODATA_ERROR_KEY: &str = "odata.error";
/// Key of the continuation cursor in collection responses.
pub const NEXT_LINK_KEY: &str = "odata.nextLink";

const API_VERSION_PARAM: &str = "api-version";
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// `OData` error envelope: `{"odata.error": {...}}`.
#[derive(Debug, Deserialize)]
pub struct ODataErrorEnvelope {
    #[serde(rename = "odata.error")]
    pub error: ODataError,
}

/// `OData` error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ODataError {
    pub code: String,
    pub message: ODataMessage,
}

/// Error message, either localized (`{"lang", "value"}`) or plain text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ODataMessage {
    Localized {
        #[serde(default)]
        lang: Option<String>,
        value: String,
    },
    Text(String),
}

impl ODataMessage {
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Localized { value, .. } => value,
            Self::Text(text) => text,
        }
    }
}

impl From<ODataError> for AadError {
    fn from(error: ODataError) -> Self {
        AadError::directory(error.code, error.message.text())
    }
}

/// A successfully classified directory response.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryPage {
    /// A `value` array, possibly empty, with an optional continuation cursor.
    Collection {
        items: Vec<Value>,
        next_link: Option<String>,
    },
    /// A document without a `value` array: one object.
    Object(Value),
}

impl DirectoryPage {
    /// Classifies a decoded response body.
    ///
    /// # Errors
    ///
    /// Returns `AadError::DirectoryApi` if the body carries an `odata.error`
    /// or is not a JSON object.
    pub fn from_body(body: Value) -> AadResult<Self> {
        let Value::Object(mut map) = body else {
            return Err(AadError::directory(
                "MalformedResponse",
                "response body is not a JSON object",
            ));
        };

        if let Some(error) = map.remove(ODATA_ERROR_KEY) {
            return Err(match serde_json::from_value::<ODataError>(error.clone()) {
                Ok(parsed) => parsed.into(),
                Err(_) => AadError::directory("UnknownError", error.to_string()),
            });
        }

        if matches!(map.get("value"), Some(Value::Array(_))) {
            let items = match map.remove("value") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            let next_link = map
                .get(NEXT_LINK_KEY)
                .and_then(Value::as_str)
                .filter(|cursor| !cursor.is_empty())
                .map(str::to_string);
            return Ok(Self::Collection { items, next_link });
        }

        Ok(Self::Object(Value::Object(map)))
    }

    /// Classifies a raw HTTP response.
    fn from_response(status: StatusCode, body: &str) -> AadResult<Self> {
        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_str::<ODataErrorEnvelope>(body) {
                return Err(envelope.error.into());
            }
            return Err(AadError::directory(status.as_u16().to_string(), body));
        }

        let value: Value = serde_json::from_str(body)
            .map_err(|e| AadError::directory("MalformedResponse", e.to_string()))?;
        Self::from_body(value)
    }
}

/// Where a request takes its bearer token from.
#[derive(Clone, Copy)]
enum Bearer<'a> {
    Gate(&'a ReadinessGate),
    Fixed(&'a AccessToken),
}

impl Bearer<'_> {
    async fn token(self) -> AadResult<String> {
        match self {
            Self::Gate(gate) => Ok(gate.ready().await?.token.clone()),
            Self::Fixed(token) => Ok(token.token.clone()),
        }
    }
}

/// One network session against the directory API.
///
/// Each crawler owns its own session; sessions are never shared across
/// object types.
#[derive(Debug)]
pub struct DirectorySession {
    http_client: reqwest::Client,
    base_url: String,
    api_version: Option<String>,
    max_retries: u32,
}

impl DirectorySession {
    /// Creates a session for the configured tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &CollectorConfig) -> AadResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AadError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: format!("{}/{}", config.endpoint, config.tenant_id),
            api_version: config.api_version.clone(),
            max_retries: config.max_retries,
        })
    }

    /// `{endpoint}/{tenant}`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{endpoint}/{tenant}/{resource_path}[/{object_id}]`.
    #[must_use]
    pub fn object_url(&self, resource_path: &str, object_id: Option<&str>) -> String {
        let url = match object_id {
            Some(id) => format!("{}/{resource_path}/{id}", self.base_url),
            None => format!("{}/{resource_path}", self.base_url),
        };
        self.with_api_version(url)
    }

    /// `{endpoint}/{tenant}/{resource_path}/{object_id}/{property}`.
    #[must_use]
    pub fn linked_url(&self, resource_path: &str, object_id: &str, property: &str) -> String {
        self.with_api_version(format!(
            "{}/{resource_path}/{object_id}/{property}",
            self.base_url
        ))
    }

    /// Lightweight request used to check directory access.
    #[must_use]
    pub fn probe_url(&self) -> String {
        self.with_api_version(format!("{}/users?$top=1", self.base_url))
    }

    /// Builds the next request target from a continuation cursor.
    ///
    /// Absolute cursors are used as-is; relative cursors are appended to
    /// `{endpoint}/{tenant}/`.
    #[must_use]
    pub fn cursor_url(&self, cursor: &str) -> String {
        let url = match url::Url::parse(cursor) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => cursor.to_string(),
            _ => format!("{}/{}", self.base_url, cursor.trim_start_matches('/')),
        };
        self.with_api_version(url)
    }

    fn with_api_version(&self, url: String) -> String {
        let Some(version) = &self.api_version else {
            return url;
        };
        let has_version = url
            .split_once('?')
            .is_some_and(|(_, query)| {
                query
                    .split('&')
                    .any(|pair| pair.split('=').next() == Some(API_VERSION_PARAM))
            });
        if has_version {
            return url;
        }
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}{API_VERSION_PARAM}={version}")
    }

    /// GET `url`, waiting on `gate` for the bearer token before every attempt.
    ///
    /// # Errors
    ///
    /// Returns `AadError::DirectoryApi` for error payloads, non-success
    /// statuses and malformed bodies; transport and gate errors propagate.
    #[instrument(skip(self, gate))]
    pub async fn get(&self, url: &str, gate: &ReadinessGate) -> AadResult<DirectoryPage> {
        self.request_with_retry(url, Bearer::Gate(gate)).await
    }

    /// GET `url` with a fixed token.
    ///
    /// # Errors
    ///
    /// Same as [`DirectorySession::get`].
    #[instrument(skip(self, token))]
    pub async fn get_with_token(
        &self,
        url: &str,
        token: &AccessToken,
    ) -> AadResult<DirectoryPage> {
        self.request_with_retry(url, Bearer::Fixed(token)).await
    }

    async fn request_with_retry(&self, url: &str, bearer: Bearer<'_>) -> AadResult<DirectoryPage> {
        let mut retries = 0;
        let mut delay = INITIAL_BACKOFF;

        loop {
            let token = bearer.token().await?;

            debug!("Fetching page: {}", url);
            let response = self
                .http_client
                .get(url)
                .bearer_auth(&token)
                .header(ACCEPT, "application/json")
                .send()
                .await?;
            let status = response.status();

            if is_throttled(status) && retries < self.max_retries {
                retries += 1;
                let wait = retry_after(response.headers()).unwrap_or(delay);
                warn!(
                    "Throttled with {}, retry {}/{} after {:?}",
                    status, retries, self.max_retries, wait
                );
                tokio::time::sleep(wait).await;
                delay *= 2;
                continue;
            }

            let body = response.text().await?;
            return DirectoryPage::from_response(status, &body);
        }
    }

    /// Collects the ids of every item linked to an object through
    /// `property`, following continuation cursors.
    ///
    /// A response without a `value` array yields no ids. Items carrying
    /// neither id field are skipped.
    ///
    /// # Errors
    ///
    /// Propagates request errors.
    pub async fn linked_ids(
        &self,
        resource_path: &str,
        object_id: &str,
        property: &str,
        gate: &ReadinessGate,
    ) -> AadResult<Vec<String>> {
        let mut url = self.linked_url(resource_path, object_id, property);
        let mut ids = Vec::new();

        loop {
            match self.get(&url, gate).await? {
                DirectoryPage::Collection { items, next_link } => {
                    ids.extend(items.iter().filter_map(|item| {
                        item.as_object()
                            .and_then(resolve_object_id)
                            .map(str::to_string)
                    }));
                    match next_link {
                        Some(cursor) => url = self.cursor_url(&cursor),
                        None => return Ok(ids),
                    }
                }
                DirectoryPage::Object(_) => return Ok(ids),
            }
        }
    }
}

fn is_throttled(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(api_version: Option<&str>) -> DirectorySession {
        let config = CollectorConfig::builder()
            .tenant_id("contoso")
            .api_version(api_version.map(str::to_string))
            .build()
            .unwrap();
        DirectorySession::new(&config).unwrap()
    }

    #[test]
    fn test_object_urls() {
        let s = session(Some("1.6"));
        assert_eq!(
            s.object_url("users", None),
            "https://graph.windows.net/contoso/users?api-version=1.6"
        );
        assert_eq!(
            s.object_url("groups", Some("g1")),
            "https://graph.windows.net/contoso/groups/g1?api-version=1.6"
        );
        assert_eq!(
            s.linked_url("groups", "g1", "members"),
            "https://graph.windows.net/contoso/groups/g1/members?api-version=1.6"
        );
        assert_eq!(
            s.probe_url(),
            "https://graph.windows.net/contoso/users?$top=1&api-version=1.6"
        );
    }

    #[test]
    fn test_cursor_url_relative_and_absolute() {
        let s = session(None);
        assert_eq!(
            s.cursor_url("directoryObjects/$/Microsoft.DirectoryServices.User?$skiptoken=X'4453'"),
            "https://graph.windows.net/contoso/directoryObjects/$/Microsoft.DirectoryServices.User?$skiptoken=X'4453'"
        );
        assert_eq!(
            s.cursor_url("https://other.example/contoso/users?$skiptoken=abc"),
            "https://other.example/contoso/users?$skiptoken=abc"
        );
    }

    #[test]
    fn test_cursor_url_api_version_appended_once() {
        let s = session(Some("1.6"));
        assert_eq!(
            s.cursor_url("users?$skiptoken=abc"),
            "https://graph.windows.net/contoso/users?$skiptoken=abc&api-version=1.6"
        );
        assert_eq!(
            s.cursor_url("users?api-version=1.6&$skiptoken=abc"),
            "https://graph.windows.net/contoso/users?api-version=1.6&$skiptoken=abc"
        );
    }

    #[test]
    fn test_page_collection_and_cursor() {
        let page = DirectoryPage::from_body(json!({
            "odata.metadata": "https://graph.windows.net/contoso/$metadata#directoryObjects",
            "value": [{"objectId": "1"}, {"objectId": "2"}],
            "odata.nextLink": "directoryObjects/$/Microsoft.DirectoryServices.User?$skiptoken=xyz"
        }))
        .unwrap();

        match page {
            DirectoryPage::Collection { items, next_link } => {
                assert_eq!(items.len(), 2);
                assert_eq!(
                    next_link.as_deref(),
                    Some("directoryObjects/$/Microsoft.DirectoryServices.User?$skiptoken=xyz")
                );
            }
            other => panic!("unexpected page: {other:?}"),
        }
    }

    #[test]
    fn test_page_empty_value_is_not_single_object() {
        let empty = DirectoryPage::from_body(json!({"value": []})).unwrap();
        assert_eq!(
            empty,
            DirectoryPage::Collection {
                items: vec![],
                next_link: None
            }
        );

        let single = DirectoryPage::from_body(json!({"objectId": "u1"})).unwrap();
        assert_eq!(single, DirectoryPage::Object(json!({"objectId": "u1"})));
    }

    #[test]
    fn test_page_odata_error() {
        let err = DirectoryPage::from_body(json!({
            "odata.error": {
                "code": "Authorization_RequestDenied",
                "message": {"lang": "en", "value": "Insufficient privileges to complete the operation."}
            }
        }))
        .unwrap_err();

        match err {
            AadError::DirectoryApi { code, message } => {
                assert_eq!(code, "Authorization_RequestDenied");
                assert_eq!(message, "Insufficient privileges to complete the operation.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_response_status_without_envelope() {
        let err = DirectoryPage::from_response(StatusCode::BAD_GATEWAY, "upstream down").unwrap_err();
        match err {
            AadError::DirectoryApi { code, message } => {
                assert_eq!(code, "502");
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_response_malformed_body() {
        let err = DirectoryPage::from_response(StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, AadError::DirectoryApi { ref code, .. } if code == "MalformedResponse"));

        let err = DirectoryPage::from_response(StatusCode::OK, "[1, 2]").unwrap_err();
        assert!(matches!(err, AadError::DirectoryApi { ref code, .. } if code == "MalformedResponse"));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }
}
