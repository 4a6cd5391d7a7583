//! HTTP manifest fetcher

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::ManifestFetcher;
use crate::error::CollaboratorResult;

/// Fetches manifests with a plain GET
pub struct HttpManifestFetcher {
    client: Client,
}

impl HttpManifestFetcher {
    pub fn new(timeout: Duration) -> CollaboratorResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ManifestFetcher for HttpManifestFetcher {
    async fn fetch(&self, url: &str) -> CollaboratorResult<String> {
        tracing::debug!(url = %url, "Fetching manifest");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}
