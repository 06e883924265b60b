//! Access tokens and the providers that issue them.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::{AadError, AadResult, CloudEnvironment};

/// A bearer token together with the instant it stops being valid.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// Returns true if the token still has positive lifetime at `now`.
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on > now
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Issues access tokens for an audience.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Requests a fresh token for `audience`.
    ///
    /// # Errors
    ///
    /// Returns `AadError::Auth` when no token can be obtained.
    async fn get_token(&self, audience: &str) -> AadResult<AccessToken>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// OAuth2 client-credentials flow for a service principal.
#[derive(Debug)]
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: SecretString,
    authority: String,
    http_client: reqwest::Client,
}

impl ClientSecretCredential {
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
        cloud: CloudEnvironment,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret,
            authority: cloud.login_endpoint().to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Overrides the login authority (used for sovereign proxies and tests).
    #[must_use]
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TokenProvider for ClientSecretCredential {
    #[instrument(skip(self), fields(tenant_id = %self.tenant_id))]
    async fn get_token(&self, audience: &str) -> AadResult<AccessToken> {
        let token_url = format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id);
        let scope = format!("{}/.default", audience.trim_end_matches('/'));

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http_client
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AadError::Auth(format!("Token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AadError::Auth(format!(
                "Token request failed with status {status}: {body}"
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AadError::Auth(format!("Failed to parse token response: {e}")))?;

        let expires_on = Utc::now() + Duration::seconds(parsed.expires_in);
        debug!(
            "Acquired new token, expires at {}",
            expires_on.format("%Y-%m-%d %H:%M:%S UTC")
        );

        Ok(AccessToken::new(parsed.access_token, expires_on))
    }
}

#[derive(Debug, Deserialize)]
struct CliTokenResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    /// Epoch seconds, present in newer CLI releases.
    expires_on: Option<i64>,
    /// Local wall-clock time, present in every release.
    #[serde(rename = "expiresOn")]
    expires_on_local: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CliAccount {
    #[serde(rename = "tenantId")]
    tenant_id: String,
}

/// Token provider backed by the logged-in Azure CLI session.
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    program: String,
    tenant_id: Option<String>,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self {
            program: "az".to_string(),
            tenant_id: None,
        }
    }
}

impl AzureCliCredential {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests tokens for a specific tenant instead of the CLI's default.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Uses a different executable in place of `az`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Returns the tenant of the CLI's active account.
    ///
    /// # Errors
    ///
    /// Returns `AadError::Auth` if the CLI is missing, not logged in, or
    /// prints something unexpected.
    pub async fn tenant_id(&self) -> AadResult<String> {
        let stdout = self
            .invoke(&["account", "show", "--output", "json"])
            .await?;
        let account: CliAccount = serde_json::from_slice(&stdout)
            .map_err(|e| AadError::Auth(format!("Unexpected `az account show` output: {e}")))?;
        Ok(account.tenant_id)
    }

    async fn invoke(&self, args: &[&str]) -> AadResult<Vec<u8>> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| AadError::Auth(format!("Failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AadError::Auth(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl TokenProvider for AzureCliCredential {
    #[instrument(skip(self))]
    async fn get_token(&self, audience: &str) -> AadResult<AccessToken> {
        let mut args = vec![
            "account",
            "get-access-token",
            "--resource",
            audience,
            "--output",
            "json",
        ];
        if let Some(tenant) = &self.tenant_id {
            args.push("--tenant");
            args.push(tenant);
        }

        let stdout = self.invoke(&args).await?;
        let token = parse_cli_token(&stdout)?;
        debug!("Acquired CLI token, expires at {}", token.expires_on);
        Ok(token)
    }
}

/// Parses the JSON printed by `az account get-access-token`.
pub(crate) fn parse_cli_token(stdout: &[u8]) -> AadResult<AccessToken> {
    let parsed: CliTokenResponse = serde_json::from_slice(stdout)
        .map_err(|e| AadError::Auth(format!("Unexpected Azure CLI token output: {e}")))?;

    let expires_on = if let Some(epoch) = parsed.expires_on {
        DateTime::<Utc>::from_timestamp(epoch, 0)
            .ok_or_else(|| AadError::Auth(format!("Invalid expires_on: {epoch}")))?
    } else if let Some(local) = parsed.expires_on_local.as_deref() {
        parse_local_expiry(local)?
    } else {
        return Err(AadError::Auth(
            "Azure CLI token output has no expiry".to_string(),
        ));
    };

    Ok(AccessToken::new(parsed.access_token, expires_on))
}

fn parse_local_expiry(raw: &str) -> AadResult<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| AadError::Auth(format!("Invalid expiresOn '{raw}': {e}")))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| AadError::Auth(format!("Ambiguous local expiry '{raw}'")))
}
