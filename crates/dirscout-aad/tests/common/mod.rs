//! Common test utilities for dirscout-aad integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dirscout_aad::{AadError, AadResult, AccessToken, CollectorConfig, TokenProvider};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TENANT: &str = "contoso";
pub const ACCESS_TOKEN: &str = "mock-access-token";

/// Issues a one-hour token on every call, or always fails.
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    calls: AtomicUsize,
    fail: bool,
}

impl StaticTokenProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, _audience: &str) -> AadResult<AccessToken> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AadError::Auth("AADSTS7000215: Invalid client secret".to_string()));
        }
        Ok(AccessToken::new(ACCESS_TOKEN, Utc::now() + Duration::hours(1)))
    }
}

/// Issues `token-1`, `token-2`, ... with the scripted lifetimes in
/// milliseconds (negative means already expired). One hour once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedTokenProvider {
    lifetimes: Mutex<VecDeque<i64>>,
    calls: AtomicUsize,
}

impl ScriptedTokenProvider {
    pub fn new(lifetimes_ms: impl IntoIterator<Item = i64>) -> Arc<Self> {
        Arc::new(Self {
            lifetimes: Mutex::new(lifetimes_ms.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for ScriptedTokenProvider {
    async fn get_token(&self, _audience: &str) -> AadResult<AccessToken> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let lifetime = self
            .lifetimes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(3_600_000);
        Ok(AccessToken::new(
            format!("token-{n}"),
            Utc::now() + Duration::milliseconds(lifetime),
        ))
    }
}

/// Test data factory for users (legacy id field only).
pub fn create_user(object_id: &str) -> Value {
    json!({
        "odata.type": "Microsoft.DirectoryServices.User",
        "objectType": "User",
        "objectId": object_id,
        "userPrincipalName": format!("{object_id}@contoso.onmicrosoft.com"),
        "displayName": format!("User {object_id}"),
        "accountEnabled": true
    })
}

/// Test data factory for groups.
pub fn create_group(object_id: &str) -> Value {
    json!({
        "odata.type": "Microsoft.DirectoryServices.Group",
        "objectType": "Group",
        "objectId": object_id,
        "displayName": format!("Group {object_id}"),
        "securityEnabled": true
    })
}

/// Test data factory for service principals.
pub fn create_service_principal(object_id: &str, first_party: bool) -> Value {
    json!({
        "odata.type": "Microsoft.DirectoryServices.ServicePrincipal",
        "objectType": "ServicePrincipal",
        "objectId": object_id,
        "appId": format!("app-{object_id}"),
        "displayName": format!("Principal {object_id}"),
        "microsoftFirstParty": first_party
    })
}

/// Test data factory for applications.
pub fn create_application(object_id: &str) -> Value {
    json!({
        "odata.type": "Microsoft.DirectoryServices.Application",
        "objectType": "Application",
        "objectId": object_id,
        "displayName": format!("Application {object_id}")
    })
}

/// Test data factory for directory roles.
pub fn create_role(object_id: &str) -> Value {
    json!({
        "odata.type": "Microsoft.DirectoryServices.DirectoryRole",
        "objectType": "Role",
        "objectId": object_id,
        "displayName": format!("Role {object_id}")
    })
}

/// Wraps items in a directory collection response.
pub fn collection(items: Vec<Value>, next_link: Option<&str>) -> Value {
    let mut response = json!({
        "odata.metadata": format!("https://graph.windows.net/{TENANT}/$metadata#directoryObjects"),
        "value": items
    });
    if let Some(link) = next_link {
        response["odata.nextLink"] = json!(link);
    }
    response
}

/// Creates a directory error response.
pub fn odata_error(code: &str, message: &str) -> Value {
    json!({
        "odata.error": {
            "code": code,
            "message": {"lang": "en", "value": message}
        }
    })
}

/// Mock server wrapper with common setup helpers.
pub struct MockDirectoryServer {
    pub server: MockServer,
}

impl MockDirectoryServer {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Collector configuration pointing at this server.
    pub fn config(&self) -> CollectorConfig {
        CollectorConfig::builder()
            .tenant_id(TENANT)
            .endpoint(self.url())
            .api_version(None)
            .max_retries(2)
            .build()
            .unwrap()
    }

    /// `/{tenant}/{suffix}`.
    pub fn tenant_path(suffix: &str) -> String {
        format!("/{TENANT}/{suffix}")
    }

    /// Sets up the access probe (`users?$top=1`).
    pub async fn mock_probe(&self, status: u16, body: Value) {
        Mock::given(method("GET"))
            .and(path(Self::tenant_path("users")))
            .and(query_param("$top", "1"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_probe_ok(&self) {
        self.mock_probe(200, collection(vec![create_user("probe")], None))
            .await;
    }

    /// Serves `body` for GET `/{tenant}/{suffix}`.
    pub async fn mock_get(&self, suffix: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(Self::tenant_path(suffix)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Like [`Self::mock_get`] but verifies the number of calls on drop.
    pub async fn mock_get_expect(&self, suffix: &str, body: Value, times: u64) {
        Mock::given(method("GET"))
            .and(path(Self::tenant_path(suffix)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Paths (with query) of every request received, in order.
    pub async fn received_targets(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| match r.url.query() {
                Some(q) => format!("{}?{}", r.url.path(), q),
                None => r.url.path().to_string(),
            })
            .collect()
    }
}

/// Generate a sequence of test users.
pub fn generate_users(count: usize) -> Vec<Value> {
    (0..count).map(|i| create_user(&format!("user-{i}"))).collect()
}
