//! Dashboard API client

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::monitor::{EngineEvent, MonitorSink, StatusReport};

/// Pushes status snapshots and events to the monitoring dashboard
pub struct DashboardClient {
    client: Client,
    base_url: String,
}

impl DashboardClient {
    /// Create new dashboard client
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> anyhow::Result<()> {
        let url = self.url(path);
        debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(anyhow::anyhow!("Dashboard {} failed: {} - {}", path, status, text))
        }
    }
}

#[async_trait]
impl MonitorSink for DashboardClient {
    async fn push_status(&self, report: &StatusReport) -> anyhow::Result<()> {
        self.post("status", report).await
    }

    async fn emit(&self, event: &EngineEvent) -> anyhow::Result<()> {
        self.post("events", event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = DashboardClient::new("http://localhost:8080/api/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/api");
        assert_eq!(client.url("/status"), "http://localhost:8080/api/status");
        assert_eq!(client.url("events"), "http://localhost:8080/api/events");
    }
}
