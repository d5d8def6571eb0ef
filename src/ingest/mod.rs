/// Upstream data sources.
///
/// The sync engine only sees [`DataSource`]: "given (site, stream, window),
/// parsed records or a failure". [`SolarEdgeClient`] is the production
/// implementation over two families of endpoints:
///
/// - `monitoring_api`: the REST API (API-key query parameter, JSON bodies)
/// - `playback`: the monitoring website (session cookies, repaired payload)
///
/// Each call builds its own HTTP client, so nothing network-related is held
/// across the long sleeps of the sync loops.

pub mod monitoring_api;
pub mod playback;

#[cfg(test)]
pub(crate) mod fixtures;

use crate::installation::SiteDiscovery;
use crate::model::{DataStream, DateInterval, FetchError, MetricRecord, Site};
use chrono::NaiveDate;
use monitoring_api::{SiteSummary, redact_url};
use playback::WebSession;
use reqwest::blocking::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Provider-reported range of days a site has produced data for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SitePeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// A source of telemetry for the sync engine.
pub trait DataSource {
    /// Performs one logical fetch of `stream` for `site` over `window`.
    fn fetch(&self, site: &Site, stream: DataStream, window: &DateInterval) -> Result<Vec<MetricRecord>, FetchError>;

    /// Network calls one `fetch` makes, for quota accounting.
    fn calls_per_fetch(&self, site: &Site, stream: DataStream) -> u32 {
        match stream {
            DataStream::EquipmentData => u32::try_from(site.serials.len()).unwrap_or(u32::MAX),
            _ => 1,
        }
    }

    /// Valid data range of every given site, in a single call. Sites the
    /// provider reports no range for are absent from the map.
    fn data_periods(&self, sites: &[Site]) -> Result<HashMap<String, SitePeriod>, FetchError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct SolarEdgeClient {
    api_base_url: String,
    api_key: String,
    timeout: Duration,
    web: WebSession,
}

impl SolarEdgeClient {
    pub fn new(api_base_url: &str, api_key: &str, timeout: Duration, web: WebSession) -> Self {
        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
            web,
        }
    }

    /// GETs `url` and returns the body of a 2xx response.
    fn get(&self, url: &str) -> Result<String, FetchError> {
        let client = Client::builder().timeout(self.timeout).build()?;
        debug!(url = redact_url(url), "GET");
        let response = client.get(url).header("Accept", "application/json").send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: redact_url(url).to_string(),
            });
        }
        Ok(response.text()?)
    }

    fn fetch_equipment(&self, site: &Site, window: &DateInterval) -> Result<Vec<MetricRecord>, FetchError> {
        let mut records = Vec::new();
        for serial in &site.serials {
            let url = monitoring_api::build_equipment_data_url(&self.api_base_url, &site.id, serial, window, &self.api_key);
            let body = self.get(&url)?;
            records.extend(monitoring_api::parse_equipment_data(&body, site, serial)?);
        }
        Ok(records)
    }
}

impl DataSource for SolarEdgeClient {
    fn fetch(&self, site: &Site, stream: DataStream, window: &DateInterval) -> Result<Vec<MetricRecord>, FetchError> {
        match stream {
            DataStream::Power => {
                let url = monitoring_api::build_power_details_url(&self.api_base_url, &site.id, window, &self.api_key);
                monitoring_api::parse_power_details(&self.get(&url)?, site)
            }
            DataStream::Energy => {
                let url = monitoring_api::build_energy_details_url(&self.api_base_url, &site.id, window, &self.api_key);
                monitoring_api::parse_energy_details(&self.get(&url)?, site)
            }
            DataStream::EquipmentData => self.fetch_equipment(site, window),
            DataStream::PanelPlayback => self.web.fetch(site, window),
        }
    }

    fn data_periods(&self, sites: &[Site]) -> Result<HashMap<String, SitePeriod>, FetchError> {
        let ids: Vec<&str> = sites.iter().map(|s| s.id.as_str()).collect();
        let url = monitoring_api::build_data_period_url(&self.api_base_url, &ids, &self.api_key);
        monitoring_api::parse_data_periods(&self.get(&url)?)
    }
}

impl SiteDiscovery for SolarEdgeClient {
    fn list_sites(&self) -> Result<Vec<SiteSummary>, FetchError> {
        let url = monitoring_api::build_sites_list_url(&self.api_base_url, &self.api_key);
        monitoring_api::parse_sites_list(&self.get(&url)?)
    }

    fn inverter_serials(&self, site_id: &str) -> Result<Vec<String>, FetchError> {
        let url = monitoring_api::build_inventory_url(&self.api_base_url, site_id, &self.api_key);
        monitoring_api::parse_inventory(&self.get(&url)?)
    }
}
