/// Site and equipment discovery, cached on disk.
///
/// The first start lists the account's sites (one call) and fetches the
/// inverter inventory of each (one call per site). The result is stored in
/// `installinfo.json` and reused on every later start, so discovery does
/// not eat into the daily API quota. Delete the file to rediscover after
/// adding equipment.

use crate::ingest::monitoring_api::SiteSummary;
use crate::model::{FetchError, Site};
use crate::persist::{self, StateFileError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const INSTALLATION_FILE: &str = "installinfo.json";

/// Account-level discovery calls.
pub trait SiteDiscovery {
    fn list_sites(&self) -> Result<Vec<SiteSummary>, FetchError>;
    fn inverter_serials(&self, site_id: &str) -> Result<Vec<String>, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct InstallationFile {
    sites: Vec<Site>,
}

#[derive(Debug, thiserror::Error)]
pub enum InstallationError {
    #[error("site discovery failed: {0}")]
    Discovery(#[from] FetchError),
    #[error("the account has no sites")]
    NoSites,
    #[error("installation cache unusable: {0}")]
    State(#[from] StateFileError),
}

/// Queries the provider for every site and its inverters, in listing order.
pub fn discover(api: &dyn SiteDiscovery) -> Result<Vec<Site>, InstallationError> {
    let summaries = api.list_sites()?;
    if summaries.is_empty() {
        return Err(InstallationError::NoSites);
    }

    let mut sites = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let serials = api.inverter_serials(&summary.id)?;
        info!(
            site = %summary.id,
            time_zone = %summary.time_zone,
            inverters = serials.len(),
            optimizers = summary.has_optimizers,
            "discovered site"
        );
        sites.push(Site {
            id: summary.id,
            time_zone: summary.time_zone,
            serials,
            has_optimizers: summary.has_optimizers,
        });
    }
    Ok(sites)
}

/// Returns the cached installation at `path`, discovering and caching it
/// when the file does not exist yet.
pub fn load_or_discover(path: &Path, api: &dyn SiteDiscovery) -> Result<Vec<Site>, InstallationError> {
    if let Some(cached) = persist::read_json::<InstallationFile>(path)? {
        if cached.sites.is_empty() {
            return Err(InstallationError::NoSites);
        }
        info!(path = %path.display(), sites = cached.sites.len(), "using cached installation");
        return Ok(cached.sites);
    }

    let sites = discover(api)?;
    persist::write_json_atomic(path, &InstallationFile { sites: sites.clone() })?;
    info!(path = %path.display(), sites = sites.len(), "installation cached");
    Ok(sites)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
