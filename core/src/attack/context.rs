use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use super::CancelSignal;
use crate::error::ScanError;
use crate::http::{HttpOptions, TargetClient};

/// Connection profile of the project under test.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    pub url: String,
    pub anon_key: String,
    #[serde(default)]
    pub service_key: Option<String>,
}

impl TargetConfig {
    /// Parses the base URL, normalizing it to end in `/` so endpoint paths join
    /// below it instead of replacing its last segment.
    pub fn parsed_url(&self) -> Result<Url, ScanError> {
        let mut url = Url::parse(self.url.trim())
            .map_err(|e| ScanError::InvalidConfig(format!("target url '{}': {}", self.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ScanError::InvalidConfig(format!(
                "target url '{}' must be http or https",
                self.url
            )));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

// Keys stay out of debug output.
impl std::fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("service_key", &self.service_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything a probe may read about the target. Built once per scan and
/// shared behind an `Arc`; there is no mutation API.
pub struct AttackContext {
    target: TargetConfig,
    base_url: Url,
    target_resource: Option<String>,
    test_data: Option<serde_json::Value>,
    cancel: CancelSignal,
    client: Arc<TargetClient>,
}

impl AttackContext {
    pub fn new(target: TargetConfig) -> Result<Self, ScanError> {
        Self::with_http_options(target, &HttpOptions::default())
    }

    pub fn with_http_options(target: TargetConfig, options: &HttpOptions) -> Result<Self, ScanError> {
        let client = TargetClient::new(&target, options)?;
        let base_url = client.base_url().clone();
        Ok(Self {
            target,
            base_url,
            target_resource: None,
            test_data: None,
            cancel: CancelSignal::new(),
            client: Arc::new(client),
        })
    }

    /// Narrows resource-specific probes to one table, bucket or function.
    pub fn target_resource(mut self, resource: impl Into<String>) -> Self {
        let resource = resource.into();
        self.target_resource = if resource.trim().is_empty() { None } else { Some(resource) };
        self
    }

    pub fn test_data(mut self, data: serde_json::Value) -> Self {
        self.test_data = Some(data);
        self
    }

    /// Uses a caller-owned signal, so the caller can abort the scan.
    pub fn cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn resource(&self) -> Option<&str> {
        self.target_resource.as_deref()
    }

    pub fn seed_data(&self) -> Option<&serde_json::Value> {
        self.test_data.as_ref()
    }

    pub fn cancel(&self) -> &CancelSignal {
        &self.cancel
    }

    pub fn client(&self) -> &TargetClient {
        &self.client
    }
}
