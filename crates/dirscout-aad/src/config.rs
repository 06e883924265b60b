//! Collector configuration and cloud environment endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{AadError, AadResult};

/// Default `api-version` sent to the directory API.
pub const DEFAULT_API_VERSION: &str = "1.6";

const DEFAULT_MAX_RETRIES: u32 = 5;
const MAX_RETRIES_LIMIT: u32 = 20;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sovereign cloud the tenant lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudEnvironment {
    /// Azure public cloud.
    #[default]
    Public,
    /// Azure US Government.
    UsGovernment,
    /// Azure China (21Vianet).
    China,
    /// Azure Germany.
    Germany,
}

impl CloudEnvironment {
    /// Returns the `OAuth2` login endpoint for this cloud.
    #[must_use]
    pub fn login_endpoint(&self) -> &'static str {
        match self {
            Self::Public => "https://login.microsoftonline.com",
            Self::UsGovernment => "https://login.microsoftonline.us",
            Self::China => "https://login.chinacloudapi.cn",
            Self::Germany => "https://login.microsoftonline.de",
        }
    }

    /// Returns the directory API endpoint, which is also the token audience.
    #[must_use]
    pub fn directory_endpoint(&self) -> &'static str {
        match self {
            Self::Public | Self::UsGovernment => "https://graph.windows.net",
            Self::China => "https://graph.chinacloudapi.cn",
            Self::Germany => "https://graph.cloudapi.de",
        }
    }
}

impl fmt::Display for CloudEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Public => "public",
            Self::UsGovernment => "us_government",
            Self::China => "china",
            Self::Germany => "germany",
        };
        f.write_str(name)
    }
}

impl FromStr for CloudEnvironment {
    type Err = AadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "public" | "azure" | "commercial" => Ok(Self::Public),
            "us_government" | "usgov" | "usgovernment" => Ok(Self::UsGovernment),
            "china" => Ok(Self::China),
            "germany" => Ok(Self::Germany),
            other => Err(AadError::Config(format!("Unknown cloud environment: {other}"))),
        }
    }
}

/// Configuration shared by the orchestrator and every crawler it launches.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Directory tenant id (or verified domain).
    pub tenant_id: String,
    /// Cloud the tenant lives in.
    pub cloud: CloudEnvironment,
    /// Directory API endpoint without trailing slash.
    pub endpoint: String,
    /// Token audience requested from the provider.
    pub audience: String,
    /// `api-version` query parameter, if any.
    pub api_version: Option<String>,
    /// Retries for throttled (429/503/504) responses.
    pub max_retries: u32,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl CollectorConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> CollectorConfigBuilder {
        CollectorConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AadError::Config` if the tenant is empty, the endpoint is not
    /// a valid URL, or the retry budget is out of range.
    pub fn validate(&self) -> AadResult<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(AadError::Config("tenant_id is required".to_string()));
        }
        if self.tenant_id.contains('/') {
            return Err(AadError::Config(format!(
                "tenant_id must not contain '/': {}",
                self.tenant_id
            )));
        }
        let endpoint = url::Url::parse(&self.endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(AadError::Config(format!(
                "Unsupported endpoint scheme: {}",
                endpoint.scheme()
            )));
        }
        if self.audience.trim().is_empty() {
            return Err(AadError::Config("audience must not be empty".to_string()));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(AadError::Config(format!(
                "max_retries must be <= {MAX_RETRIES_LIMIT}"
            )));
        }
        Ok(())
    }
}

/// Builder for [`CollectorConfig`].
#[derive(Debug, Default)]
pub struct CollectorConfigBuilder {
    tenant_id: Option<String>,
    cloud: CloudEnvironment,
    endpoint: Option<String>,
    audience: Option<String>,
    api_version: Option<Option<String>>,
    max_retries: Option<u32>,
    request_timeout: Option<Duration>,
}

impl CollectorConfigBuilder {
    #[must_use]
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    #[must_use]
    pub fn cloud(mut self, cloud: CloudEnvironment) -> Self {
        self.cloud = cloud;
        self
    }

    /// Overrides the directory endpoint (defaults to the cloud's endpoint).
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Overrides the token audience (defaults to the cloud's directory endpoint).
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets the `api-version` query parameter; `None` sends none.
    #[must_use]
    pub fn api_version(mut self, api_version: Option<String>) -> Self {
        self.api_version = Some(api_version);
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `AadError::Config` if a required field is missing or invalid.
    pub fn build(self) -> AadResult<CollectorConfig> {
        let tenant_id = self
            .tenant_id
            .ok_or_else(|| AadError::Config("tenant_id is required".to_string()))?;

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| self.cloud.directory_endpoint().to_string())
            .trim_end_matches('/')
            .to_string();

        let audience = self
            .audience
            .unwrap_or_else(|| self.cloud.directory_endpoint().to_string());

        let config = CollectorConfig {
            tenant_id,
            cloud: self.cloud,
            endpoint,
            audience,
            api_version: self
                .api_version
                .unwrap_or_else(|| Some(DEFAULT_API_VERSION.to_string())),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        };

        config.validate()?;
        Ok(config)
    }
}
