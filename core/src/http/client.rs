use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, ClientBuilder, Proxy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::{KeyRole, ProbeRequest, ProbeResponse};
use crate::attack::TargetConfig;
use crate::error::ScanError;

const DEFAULT_USER_AGENT: &str = concat!("breachkit/", env!("CARGO_PKG_VERSION"));

/// Response bodies are read up to this many bytes; the rest is dropped.
pub const MAX_BODY_BYTES: usize = 256 * 1024;

/// Transport settings for the target client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpOptions {
    pub timeout_secs: u64,
    pub proxy: Option<String>,
    pub headers: Vec<(String, String)>,
    pub accept_invalid_certs: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            proxy: None,
            headers: Vec::new(),
            accept_invalid_certs: false,
        }
    }
}

/// HTTP client bound to one target project and its two keys.
pub struct TargetClient {
    inner: Client,
    base_url: Url,
    anon_key: String,
    service_key: Option<String>,
    default_headers: HeaderMap,
}

impl TargetClient {
    pub fn new(target: &TargetConfig, options: &HttpOptions) -> Result<Self, ScanError> {
        let base_url = target.parsed_url()?;

        let mut builder = ClientBuilder::new()
            .timeout(Duration::from_secs(options.timeout_secs.max(1)))
            .danger_accept_invalid_certs(options.accept_invalid_certs);

        if let Some(proxy) = options.proxy.as_deref() {
            let p = Proxy::all(proxy)
                .map_err(|e| ScanError::InvalidConfig(format!("bad proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(p);
        }

        let inner = builder
            .build()
            .map_err(|e| ScanError::InvalidConfig(format!("http client: {}", e)))?;

        let mut default_headers = HeaderMap::new();
        for (key, val) in &options.headers {
            let name = HeaderName::from_bytes(key.trim().as_bytes())
                .map_err(|e| ScanError::InvalidConfig(format!("header name '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(val.trim())
                .map_err(|e| ScanError::InvalidConfig(format!("header '{}' value: {}", key, e)))?;
            default_headers.insert(name, value);
        }

        Ok(Self {
            inner,
            base_url,
            anon_key: target.anon_key.clone(),
            service_key: target.service_key.clone(),
            default_headers,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a probe path against the project base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path.trim_start_matches('/'))
    }

    fn key_for(&self, role: KeyRole) -> Option<&str> {
        match role {
            KeyRole::Anon => Some(self.anon_key.as_str()),
            KeyRole::Service => self.service_key.as_deref(),
            KeyRole::None => None,
        }
    }

    pub async fn send(&self, req: &ProbeRequest) -> anyhow::Result<ProbeResponse> {
        let url = self.endpoint(&req.path)?;
        let mut builder = self.inner.request(req.method.clone(), url);

        for (name, value) in self.default_headers.iter() {
            builder = builder.header(name, value);
        }
        if !self.default_headers.contains_key(USER_AGENT) {
            builder = builder.header(USER_AGENT, DEFAULT_USER_AGENT);
        }

        match (req.key, self.key_for(req.key)) {
            (_, Some(key)) if !key.is_empty() => {
                builder = builder
                    .header("apikey", key)
                    .header(AUTHORIZATION, format!("Bearer {}", key));
            }
            (KeyRole::None, _) => {}
            (role, _) => anyhow::bail!("no {:?} key configured for this target", role),
        }

        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let mut response = builder.send().await?;
        let status = response.status().as_u16();
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = MAX_BODY_BYTES - bytes.len();
            if chunk.len() > room {
                bytes.extend_from_slice(&chunk[..room]);
                log::debug!("{} body cut at {} bytes", req.path, MAX_BODY_BYTES);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes).into_owned();
        Ok(ProbeResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(url: &str) -> TargetConfig {
        TargetConfig {
            url: url.to_string(),
            anon_key: "anon".to_string(),
            service_key: None,
        }
    }

    #[test]
    fn test_endpoint_joins_relative_to_base() {
        let client = TargetClient::new(&target("https://abc.example.co"), &HttpOptions::default()).unwrap();
        assert_eq!(
            client.endpoint("/rest/v1/").unwrap().as_str(),
            "https://abc.example.co/rest/v1/"
        );
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let err = TargetClient::new(&target("not a url"), &HttpOptions::default());
        assert!(matches!(err, Err(ScanError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_custom_header_is_config_error() {
        let options = HttpOptions {
            headers: vec![("Bad Header".to_string(), "x".to_string())],
            ..Default::default()
        };
        let err = TargetClient::new(&target("https://abc.example.co"), &options);
        assert!(matches!(err, Err(ScanError::InvalidConfig(msg)) if msg.contains("Bad Header")));

        let options = HttpOptions {
            headers: vec![("X-Trace".to_string(), "line\nbreak".to_string())],
            ..Default::default()
        };
        assert!(TargetClient::new(&target("https://abc.example.co"), &options).is_err());
    }

    #[test]
    fn test_missing_service_key_is_reported() {
        let client = TargetClient::new(&target("https://abc.example.co"), &HttpOptions::default()).unwrap();
        assert!(client.key_for(KeyRole::Service).is_none());
        assert_eq!(client.key_for(KeyRole::Anon), Some("anon"));
    }
}
