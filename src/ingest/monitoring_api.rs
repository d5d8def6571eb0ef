/// SolarEdge monitoring API client: URL construction and JSON parsing.
///
/// Every endpoint authenticates with an `api_key` query parameter:
///   https://monitoringapi.solaredge.com/
///
/// See `fixtures.rs` for annotated examples of each response envelope.
/// Parsers take the raw body and the site the request was made for, and
/// return metric records ready for the line-protocol sink.

use super::SitePeriod;
use crate::model::{DataStream, DateInterval, Dimension, FetchError, MetricRecord, Site};
use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_API_BASE_URL: &str = "https://monitoringapi.solaredge.com";

/// Wall-clock format used for query parameters and in response bodies.
const PROVIDER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SitesListResponse {
    sites: SitesWrapper,
}

#[derive(Deserialize)]
struct SitesWrapper {
    site: Vec<SiteEntry>,
}

#[derive(Deserialize)]
struct SiteEntry {
    id: serde_json::Value,
    #[serde(rename = "type", default)]
    site_type: String,
    location: SiteLocation,
}

#[derive(Deserialize)]
struct SiteLocation {
    #[serde(rename = "timeZone")]
    time_zone: String,
}

#[derive(Deserialize)]
struct InventoryResponse {
    #[serde(rename = "Inventory")]
    inventory: Inventory,
}

#[derive(Deserialize)]
struct Inventory {
    #[serde(default)]
    inverters: Vec<InverterEntry>,
}

#[derive(Deserialize)]
struct InverterEntry {
    #[serde(rename = "SN")]
    serial: String,
}

#[derive(Deserialize)]
struct DataPeriodResponse {
    #[serde(rename = "datePeriodList")]
    date_period_list: DatePeriodList,
}

#[derive(Deserialize)]
struct DatePeriodList {
    #[serde(rename = "siteEnergyList")]
    site_energy_list: Vec<SiteEnergyEntry>,
}

#[derive(Deserialize)]
struct SiteEnergyEntry {
    #[serde(rename = "siteId")]
    site_id: serde_json::Value,
    #[serde(rename = "dataPeriod")]
    data_period: DataPeriod,
}

#[derive(Deserialize)]
struct DataPeriod {
    #[serde(rename = "startDate")]
    start_date: Option<String>,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
}

#[derive(Deserialize)]
struct PowerDetailsResponse {
    #[serde(rename = "powerDetails")]
    details: MeterDetails,
}

#[derive(Deserialize)]
struct EnergyDetailsResponse {
    #[serde(rename = "energyDetails")]
    details: MeterDetails,
}

#[derive(Deserialize)]
struct MeterDetails {
    unit: String,
    meters: Vec<Meter>,
}

#[derive(Deserialize)]
struct Meter {
    #[serde(rename = "type")]
    meter_type: String,
    values: Vec<MeterValue>,
}

#[derive(Deserialize)]
struct MeterValue {
    date: String,
    value: Option<f64>,
}

#[derive(Deserialize)]
struct EquipmentDataResponse {
    data: EquipmentData,
}

#[derive(Deserialize)]
struct EquipmentData {
    #[serde(default)]
    telemetries: Vec<Telemetry>,
}

#[derive(Deserialize)]
struct Telemetry {
    date: String,
    #[serde(rename = "dcVoltage")]
    dc_voltage: Option<f64>,
    #[serde(rename = "L1Data")]
    l1: Option<PhaseData>,
    #[serde(rename = "L2Data")]
    l2: Option<PhaseData>,
    #[serde(rename = "L3Data")]
    l3: Option<PhaseData>,
}

#[derive(Deserialize)]
struct PhaseData {
    #[serde(rename = "acVoltage")]
    ac_voltage: Option<f64>,
    #[serde(rename = "acCurrent")]
    ac_current: Option<f64>,
    #[serde(rename = "cosPhi")]
    cos_phi: Option<f64>,
    #[serde(rename = "acFrequency")]
    ac_frequency: Option<f64>,
    #[serde(rename = "reactivePower")]
    reactive_power: Option<f64>,
    #[serde(rename = "apparentPower")]
    apparent_power: Option<f64>,
    #[serde(rename = "activePower")]
    active_power: Option<f64>,
}

/// A site as listed by the account, before its inventory is known.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteSummary {
    pub id: String,
    pub time_zone: Tz,
    pub has_optimizers: bool,
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

fn format_query_time(t: NaiveDateTime) -> String {
    urlencoding::encode(&t.format(PROVIDER_TIME_FORMAT).to_string()).into_owned()
}

fn window_params(window: &DateInterval, api_key: &str) -> String {
    format!(
        "startTime={}&endTime={}&api_key={}",
        format_query_time(window.start),
        format_query_time(window.end),
        urlencoding::encode(api_key)
    )
}

pub fn build_sites_list_url(base: &str, api_key: &str) -> String {
    format!("{}/sites/list.json?api_key={}", base, urlencoding::encode(api_key))
}

pub fn build_inventory_url(base: &str, site_id: &str, api_key: &str) -> String {
    format!(
        "{}/site/{}/inventory?api_key={}",
        base,
        site_id,
        urlencoding::encode(api_key)
    )
}

/// One request covers every site: ids are comma-joined in the path.
pub fn build_data_period_url(base: &str, site_ids: &[&str], api_key: &str) -> String {
    format!(
        "{}/sites/{}/dataPeriod.json?api_key={}",
        base,
        site_ids.join(","),
        urlencoding::encode(api_key)
    )
}

pub fn build_power_details_url(base: &str, site_id: &str, window: &DateInterval, api_key: &str) -> String {
    format!(
        "{}/site/{}/powerDetails.json?{}",
        base,
        site_id,
        window_params(window, api_key)
    )
}

/// Energy is always requested at quarter-hour resolution.
pub fn build_energy_details_url(base: &str, site_id: &str, window: &DateInterval, api_key: &str) -> String {
    format!(
        "{}/site/{}/energyDetails.json?timeUnit=QUARTER_OF_AN_HOUR&{}",
        base,
        site_id,
        window_params(window, api_key)
    )
}

pub fn build_equipment_data_url(
    base: &str,
    site_id: &str,
    serial: &str,
    window: &DateInterval,
    api_key: &str,
) -> String {
    format!(
        "{}/equipment/{}/{}/data?{}",
        base,
        site_id,
        urlencoding::encode(serial),
        window_params(window, api_key)
    )
}

/// Strips the query string (and with it the API key) for logs and errors.
pub fn redact_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

fn from_json<'a, T: Deserialize<'a>>(json: &'a str, what: &str) -> Result<T, FetchError> {
    serde_json::from_str(json).map_err(|e| FetchError::Parse(format!("{}: {}", what, e)))
}

/// Ids arrive as JSON numbers from some endpoints and strings from others.
fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Power-of-ten multiplier for a unit such as `kW`, `MWh` or `W`.
pub fn unit_multiplier(unit: &str) -> f64 {
    match unit.chars().next() {
        Some('G') => 1e9,
        Some('M') => 1e6,
        Some('k') => 1e3,
        _ => 1.0,
    }
}

fn parse_provider_time(s: &str) -> Result<NaiveDateTime, FetchError> {
    NaiveDateTime::parse_from_str(s, PROVIDER_TIME_FORMAT)
        .map_err(|e| FetchError::Parse(format!("bad timestamp '{}': {}", s, e)))
}

/// Resolves a provider wall-clock string in the site's zone. `Ok(None)` for
/// local times skipped by a DST transition.
fn site_timestamp(site: &Site, s: &str) -> Result<Option<i64>, FetchError> {
    let local = parse_provider_time(s)?;
    let ts = site.local_to_unix_nanos(local);
    if ts.is_none() {
        debug!(site = %site.id, date = s, "timestamp falls in a DST gap; skipped");
    }
    Ok(ts)
}

pub fn parse_sites_list(json: &str) -> Result<Vec<SiteSummary>, FetchError> {
    let response: SitesListResponse = from_json(json, "sites list")?;
    response
        .sites
        .site
        .into_iter()
        .map(|entry| {
            let id = id_string(&entry.id);
            let time_zone: Tz = entry.location.time_zone.parse().map_err(|_| {
                FetchError::Parse(format!(
                    "site {} has unknown time zone '{}'",
                    id, entry.location.time_zone
                ))
            })?;
            Ok(SiteSummary {
                id,
                time_zone,
                has_optimizers: entry.site_type.contains("Optimizers"),
            })
        })
        .collect()
}

/// Inverter serial numbers, in inventory order.
pub fn parse_inventory(json: &str) -> Result<Vec<String>, FetchError> {
    let response: InventoryResponse = from_json(json, "inventory")?;
    Ok(response.inventory.inverters.into_iter().map(|i| i.serial).collect())
}

/// Valid production range per site id. Sites reporting a null start or end
/// (never produced) are left out.
pub fn parse_data_periods(json: &str) -> Result<HashMap<String, SitePeriod>, FetchError> {
    let response: DataPeriodResponse = from_json(json, "data period")?;
    let mut periods = HashMap::new();
    for entry in response.date_period_list.site_energy_list {
        let site_id = id_string(&entry.site_id);
        let (Some(start), Some(end)) = (entry.data_period.start_date, entry.data_period.end_date) else {
            debug!(site = %site_id, "no production period reported");
            continue;
        };
        let parse_date = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| FetchError::Parse(format!("bad date '{}' for site {}: {}", s, site_id, e)))
        };
        periods.insert(
            site_id.clone(),
            SitePeriod {
                start: parse_date(&start)?,
                end: parse_date(&end)?,
            },
        );
    }
    Ok(periods)
}

fn meter_records(details: MeterDetails, site: &Site, stream: DataStream, field: &str) -> Result<Vec<MetricRecord>, FetchError> {
    let multiplier = unit_multiplier(&details.unit);
    let mut records = Vec::new();
    for meter in details.meters {
        let meter_type = meter.meter_type.to_lowercase();
        for point in meter.values {
            let Some(value) = point.value else { continue };
            let Some(ts) = site_timestamp(site, &point.date)? else { continue };
            records.push(MetricRecord::single(
                stream.measurement(),
                &site.id,
                Some(Dimension { key: "type", value: meter_type.clone() }),
                field,
                value * multiplier,
                ts,
            ));
        }
    }
    Ok(records)
}

/// `power,site=..,type=<meter> w=<watts>` per meter value.
pub fn parse_power_details(json: &str, site: &Site) -> Result<Vec<MetricRecord>, FetchError> {
    let response: PowerDetailsResponse = from_json(json, "power details")?;
    meter_records(response.details, site, DataStream::Power, "w")
}

/// `energy,site=..,type=<meter> wh=<watt-hours>` per meter value.
pub fn parse_energy_details(json: &str, site: &Site) -> Result<Vec<MetricRecord>, FetchError> {
    let response: EnergyDetailsResponse = from_json(json, "energy details")?;
    meter_records(response.details, site, DataStream::Energy, "wh")
}

fn push_phase(fields: &mut Vec<(String, f64)>, label: &str, phase: &PhaseData) {
    let named = [
        ("AC_Voltage", phase.ac_voltage),
        ("AC_Current", phase.ac_current),
        ("AC_PF", phase.cos_phi),
        ("AC_Freq", phase.ac_frequency),
        ("AC_VAR", phase.reactive_power),
        ("AC_VA", phase.apparent_power),
        ("AC_Power", phase.active_power),
    ];
    for (name, value) in named {
        if let Some(v) = value {
            fields.push((format!("I_{}_{}", label, name), v));
        }
    }
}

/// One multi-field `inverter` record per telemetry sample of one inverter.
pub fn parse_equipment_data(json: &str, site: &Site, serial: &str) -> Result<Vec<MetricRecord>, FetchError> {
    let response: EquipmentDataResponse = from_json(json, "equipment data")?;
    let mut records = Vec::new();
    for sample in response.data.telemetries {
        let mut fields = Vec::new();
        if let Some(v) = sample.dc_voltage {
            fields.push(("I_DC_Voltage".to_string(), v));
        }
        for (label, phase) in [("L1", &sample.l1), ("L2", &sample.l2), ("L3", &sample.l3)] {
            if let Some(phase) = phase {
                push_phase(&mut fields, label, phase);
            }
        }
        if fields.is_empty() {
            continue;
        }
        let Some(ts) = site_timestamp(site, &sample.date)? else { continue };
        records.push(MetricRecord {
            measurement: DataStream::EquipmentData.measurement(),
            site_id: site.id.clone(),
            dimension: Some(Dimension { key: "serial", value: serial.to_string() }),
            fields,
            timestamp_ns: ts,
        });
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
