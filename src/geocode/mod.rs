//! Address geocoding: the `Geocoder` seam, the Nominatim HTTP client and the
//! geocode-on-type controller built on top of them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use tracing::{debug, warn};

use crate::model::Coordinates;

pub mod controller;
pub mod model;

pub use controller::{
    CoordinateSink, GeocodeController, GeocodeSettings, GeocodeState, GeocodeStatus,
};

use model::SearchHit;

pub const NOMINATIM_BASE: &str = "https://nominatim.openstreetmap.org/";

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Candidate coordinates for a free-text address, best match first.
    async fn lookup(&self, address: &str) -> Result<Vec<Coordinates>>;
}

#[derive(Clone)]
pub struct NominatimClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for NominatimClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NominatimClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl NominatimClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let base_url = Url::parse(NOMINATIM_BASE).context("valid default Nominatim URL")?;
        Self::with_base_url(user_agent, base_url)
    }

    /// Point at a self-hosted instance or a test server.
    pub fn with_base_url(user_agent: &str, base_url: Url) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("failed to build geocoding client")?;
        Ok(Self { http, base_url })
    }

    pub fn build_request(&self, address: &str) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("search")
            .context("invalid Nominatim base URL")?;
        self.http
            .get(endpoint)
            .query(&[("format", "json"), ("limit", "1"), ("q", address)])
            .build()
            .context("failed to build geocoding request")
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn lookup(&self, address: &str) -> Result<Vec<Coordinates>> {
        let request = self.build_request(address)?;
        debug!(url = %request.url(), "geocoding address");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach geocoding service")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "geocoding service error");
            anyhow::bail!("geocoding error {status}: {body}");
        }
        let hits: Vec<SearchHit> = res.json().await.context("invalid geocoding response")?;
        hits.iter().map(SearchHit::coordinates).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_targets_search_with_single_result() {
        let client = NominatimClient::new("restodir-test").unwrap();
        let req = client.build_request("Avenida Paulista 900, São Paulo").unwrap();
        assert_eq!(req.url().path(), "/search");
        let pairs: Vec<(String, String)> = req
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("format".into(), "json".into())));
        assert!(pairs.contains(&("limit".into(), "1".into())));
        assert!(pairs.contains(&("q".into(), "Avenida Paulista 900, São Paulo".into())));
    }

    #[test]
    fn custom_base_url_is_respected() {
        let base = Url::parse("http://localhost:8088/nominatim/").unwrap();
        let client = NominatimClient::with_base_url("restodir-test", base).unwrap();
        let req = client.build_request("Rua Augusta").unwrap();
        assert_eq!(req.url().path(), "/nominatim/search");
    }
}
