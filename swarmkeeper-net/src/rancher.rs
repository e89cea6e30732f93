//! Rancher v2 inventory client
//!
//! Hosts come from `GET {url}/hosts`, following `pagination.next` links.
//! Label updates go back with `PUT {url}/hosts/{id}`.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde::Deserialize;
use swarmkeeper_core::Host;
use tracing::debug;

use crate::traits::Inventory;
use crate::{Error, Result};

/// Default request timeout for the inventory API
pub const INVENTORY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the inventory API
#[derive(Debug, Clone)]
pub struct InventoryConfig {
    /// API base URL, e.g. `http://rancher:8080/v2-beta`
    pub url: String,
    pub access_key: String,
    pub secret_key: String,
    pub timeout: Duration,
}

impl InventoryConfig {
    pub fn new(
        url: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            timeout: INVENTORY_TIMEOUT,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

#[derive(Debug, Deserialize)]
struct HostCollection {
    #[serde(default)]
    data: Vec<Host>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
}

/// Inventory backed by the Rancher API
#[derive(Debug, Clone)]
pub struct RancherInventory {
    config: InventoryConfig,
    http: reqwest::Client,
}

impl RancherInventory {
    pub fn new(config: InventoryConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.config.access_key.is_empty() {
            return request;
        }
        request.basic_auth(&self.config.access_key, Some(&self.config.secret_key))
    }

    async fn checked(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            404 => Error::NotFound(message),
            409 => Error::Conflict(message),
            code => Error::Status {
                status: code,
                message,
            },
        })
    }
}

#[async_trait::async_trait]
impl Inventory for RancherInventory {
    async fn list_hosts(&self) -> Result<Vec<Host>> {
        let mut hosts = Vec::new();
        let mut next = Some(format!("{}/hosts", self.config.base()));

        while let Some(url) = next.take() {
            debug!(%url, "listing hosts");
            let bytes = self.checked(self.http.get(&url)).await?.bytes().await?;
            let page: HostCollection = serde_json::from_slice(&bytes)?;
            hosts.extend(page.data);
            next = page
                .pagination
                .and_then(|p| p.next)
                .filter(|n| !n.is_empty() && *n != url);
        }

        Ok(hosts)
    }

    async fn update_host(&self, host: &Host) -> Result<()> {
        let url = format!("{}/hosts/{}", self.config.base(), host.id);
        self.checked(self.http.put(&url).json(host)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_parses_hosts_and_next_link() {
        let json = r#"{
            "type": "collection",
            "data": [
                {"id": "1h1", "hostname": "a", "state": "active", "agentIpAddress": "10.0.0.1", "labels": {}},
                {"id": "1h2", "hostname": "b", "state": "active", "agentIpAddress": "10.0.0.2", "labels": {"manager": ""}}
            ],
            "pagination": {"next": "http://rancher/v2-beta/hosts?marker=m2", "limit": 2}
        }"#;
        let page: HostCollection = serde_json::from_str(json).unwrap();
        assert_eq!(page.data.len(), 2);
        assert!(page.data[1].is_labeled_manager());
        assert_eq!(
            page.pagination.and_then(|p| p.next).as_deref(),
            Some("http://rancher/v2-beta/hosts?marker=m2")
        );
    }

    #[test]
    fn last_page_has_no_next() {
        let json = r#"{"data": [], "pagination": {"next": null}}"#;
        let page: HostCollection = serde_json::from_str(json).unwrap();
        assert!(page.data.is_empty());
        assert!(page.pagination.and_then(|p| p.next).is_none());
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let config = InventoryConfig::new("http://rancher:8080/v2-beta/", "ak", "sk");
        assert_eq!(config.base(), "http://rancher:8080/v2-beta");
        assert_eq!(config.timeout, INVENTORY_TIMEOUT);
    }
}
