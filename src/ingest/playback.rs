/// Panel-level playback data from the monitoring website.
///
/// The public API exposes no per-optimizer readings, but the website's
/// playback view does. It is session-cookie authenticated: a form login sets
/// the session and a `CSRF-TOKEN` cookie whose value must be echoed in the
/// `X-CSRF-TOKEN` header. Cookies are cached on disk so a daily run does not
/// log in every time.
///
/// The endpoint answers with a JavaScript object literal rather than JSON:
///
/// ```text
/// {reportersData:{'Sat Jan 01 12:00:00 GMT 2022':{'2091':Array[{key:'100123',value:'210,5'}]}},timeUnit:'4'}
/// ```
///
/// Keys are bare, strings single-quoted, arrays prefixed with `Array`, and
/// readings formatted in the account's locale. Despite the `GMT` label the
/// dates are site-local wall time. Only the last week is ever served.

use crate::model::{DataStream, DateInterval, Dimension, FetchError, MetricRecord, Site};
use crate::persist::{self, StateFileError};
use chrono::NaiveDateTime;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::cookie::{CookieStore, Jar};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const COOKIE_FILE: &str = "solaredge.com.cookies.json";
pub const DEFAULT_WEB_BASE_URL: &str = "https://monitoring.solaredge.com";
const LOGIN_PATH: &str = "/solaredge-apigw/api/login";
const PLAYBACK_PATH: &str = "/solaredge-web/p/playbackData";
const CSRF_COOKIE: &str = "CSRF-TOKEN";

const PLAYBACK_DATE_FORMAT: &str = "%a %b %d %H:%M:%S GMT %Y";

/// Playback resolutions understood by the endpoint.
const TIME_UNIT_DAILY: &str = "4";
const TIME_UNIT_WEEKLY: &str = "5";

/// How far back the endpoint serves samples.
pub const PLAYBACK_HISTORY_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct WebCredentials {
    pub username: String,
    pub password: String,
}

// ---------------------------------------------------------------------------
// Payload repair and parsing
// ---------------------------------------------------------------------------

/// Rewrites the object literal into JSON: single-quoted strings become
/// double-quoted, bare identifiers become quoted keys and `Array` markers
/// are dropped. `true`, `false`, `null` and numbers pass through.
pub fn repair_payload(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + raw.len() / 4);
    let mut chars = raw.chars().peekable();
    let mut prev: Option<char> = None;

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push('"');
                while let Some(s) = chars.next() {
                    match s {
                        '\\' => {
                            out.push('\\');
                            if let Some(escaped) = chars.next() {
                                out.push(escaped);
                            }
                        }
                        s if s == c => break,
                        '"' => out.push_str("\\\""),
                        s => out.push(s),
                    }
                }
                out.push('"');
            }
            // Exponent of a number literal such as 1.5e3.
            c if c.is_ascii_alphabetic() && prev.is_some_and(|p| p.is_ascii_digit() || p == '.') => {
                out.push(c);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        ident.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match ident.as_str() {
                    "Array" => {}
                    "true" | "false" | "null" => out.push_str(&ident),
                    _ => {
                        out.push('"');
                        out.push_str(&ident);
                        out.push('"');
                    }
                }
            }
            c => out.push(c),
        }
        prev = Some(c);
    }
    out
}

/// Parses a reading written with either decimal separator. When both `,`
/// and `.` appear, `.` is taken as the thousands separator (`1.210,25`).
pub fn parse_locale_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let normalized = if s.contains(',') && s.contains('.') {
        s.replace('.', "").replace(',', ".")
    } else {
        s.replace(',', ".")
    };
    normalized.parse().ok()
}

/// Daily resolution for a window of at most one day, weekly otherwise.
pub fn time_unit_for(window: &DateInterval) -> &'static str {
    if window.end - window.start <= chrono::Duration::days(1) {
        TIME_UNIT_DAILY
    } else {
        TIME_UNIT_WEEKLY
    }
}

#[derive(Deserialize)]
struct PlaybackResponse {
    #[serde(rename = "reportersData", default)]
    reporters_data: HashMap<String, HashMap<String, Vec<PanelReading>>>,
}

#[derive(Deserialize)]
struct PanelReading {
    key: serde_json::Value,
    value: serde_json::Value,
}

fn reading_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) if s == "0" => None,
        serde_json::Value::String(s) => parse_locale_number(s),
        serde_json::Value::Number(n) => n.as_f64().filter(|v| *v != 0.0),
        _ => None,
    }
}

/// Turns a raw playback payload into `panel` records, keeping only samples
/// inside `window`. Zero readings mean "no measurement" and are dropped.
pub fn parse_playback(raw: &str, site: &Site, window: &DateInterval) -> Result<Vec<MetricRecord>, FetchError> {
    let response: PlaybackResponse = serde_json::from_str(&repair_payload(raw))
        .map_err(|e| FetchError::Parse(format!("playback data: {}", e)))?;

    let mut records = Vec::new();
    for (date, reporters) in response.reporters_data {
        let local = NaiveDateTime::parse_from_str(&date, PLAYBACK_DATE_FORMAT)
            .map_err(|e| FetchError::Parse(format!("bad playback date '{}': {}", date, e)))?;
        if local < window.start || local >= window.end {
            continue;
        }
        let Some(ts) = site.local_to_unix_nanos(local) else {
            debug!(site = %site.id, date = %date, "playback sample in DST gap; skipped");
            continue;
        };
        // Reporter ids group panels by string; only the panel key matters.
        for reading in reporters.into_values().flatten() {
            let Some(value) = reading_value(&reading.value) else { continue };
            let panel_id = match reading.key {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            records.push(MetricRecord::single(
                DataStream::PanelPlayback.measurement(),
                &site.id,
                Some(Dimension { key: "id", value: panel_id }),
                "w",
                value,
                ts,
            ));
        }
    }
    records.sort_by(|a, b| {
        a.timestamp_ns
            .cmp(&b.timestamp_ns)
            .then_with(|| a.dimension.as_ref().map(|d| &d.value).cmp(&b.dimension.as_ref().map(|d| &d.value)))
    });
    Ok(records)
}

/// Part of `window` the endpoint can no longer serve: everything more than
/// a week before the window end. Windows end at the current cycle, so this
/// is only non-empty after the daily updater missed more than a week.
pub fn playback_gap(window: &DateInterval) -> Option<DateInterval> {
    let served_from = window.end - chrono::Duration::days(PLAYBACK_HISTORY_DAYS);
    let gap = DateInterval::new(window.start, served_from.min(window.end));
    (!gap.is_empty()).then_some(gap)
}

// ---------------------------------------------------------------------------
// Web session
// ---------------------------------------------------------------------------

/// Website access: base URL, optional login and the on-disk cookie cache.
#[derive(Debug, Clone)]
pub struct WebSession {
    pub base_url: String,
    pub credentials: Option<WebCredentials>,
    pub cookie_path: PathBuf,
    pub timeout: Duration,
}

impl WebSession {
    /// Fetches playback data for one site.
    ///
    /// A cached session is tried first; if it is rejected (bad status or a
    /// body that is not playback data, e.g. a login page) the session logs in
    /// once, saves the new cookies and repeats the request.
    pub fn fetch(&self, site: &Site, window: &DateInterval) -> Result<Vec<MetricRecord>, FetchError> {
        if let Some(gap) = playback_gap(window) {
            warn!(
                site = %site.id,
                gap = %gap,
                "playback only serves the last {} days; samples in the gap are lost",
                PLAYBACK_HISTORY_DAYS
            );
        }
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            FetchError::NotConfigured("website credentials (SOLMON_SITE_USERNAME, SOLMON_SITE_PASSWORD)".to_string())
        })?;
        let base = Url::parse(&self.base_url)
            .map_err(|e| FetchError::NotConfigured(format!("web base url '{}': {}", self.base_url, e)))?;
        let playback_url = join(&base, PLAYBACK_PATH)?;
        let login_url = join(&base, LOGIN_PATH)?;

        let jar = Arc::new(Jar::default());
        let restored = self.restore_cookies(&jar, &base);
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(self.timeout)
            .build()?;

        if restored {
            match self
                .post_playback(&client, &jar, &playback_url, site, window)
                .and_then(|body| parse_playback(&body, site, window))
            {
                Ok(records) => return Ok(records),
                Err(e) => debug!(site = %site.id, error = %e, "cached web session rejected; logging in"),
            }
        }

        let response = client
            .post(login_url.clone())
            .form(&[("j_username", credentials.username.as_str()), ("j_password", credentials.password.as_str())])
            .send()?;
        if !response.status().is_success() {
            return Err(FetchError::Http {
                status: response.status().as_u16(),
                url: login_url.to_string(),
            });
        }
        info!("logged in to monitoring website");
        self.save_cookies(&jar, &[&base, &login_url, &playback_url])?;

        let body = self.post_playback(&client, &jar, &playback_url, site, window)?;
        parse_playback(&body, site, window)
    }

    fn post_playback(
        &self,
        client: &Client,
        jar: &Jar,
        url: &Url,
        site: &Site,
        window: &DateInterval,
    ) -> Result<String, FetchError> {
        let mut request = client
            .post(url.clone())
            .form(&[("fieldId", site.id.as_str()), ("timeUnit", time_unit_for(window))]);
        if let Some(token) = cookie_values(jar, url).remove(CSRF_COOKIE) {
            request = request.header("X-CSRF-TOKEN", token);
        }
        let response = request.send()?;
        if !response.status().is_success() {
            return Err(FetchError::Http {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text()?)
    }

    /// Loads the cookie cache into `jar`. A missing or unreadable cache just
    /// means a fresh login.
    fn restore_cookies(&self, jar: &Jar, base: &Url) -> bool {
        match persist::read_json::<BTreeMap<String, String>>(&self.cookie_path) {
            Ok(Some(cookies)) if !cookies.is_empty() => {
                for (name, value) in &cookies {
                    jar.add_cookie_str(&format!("{}={}; Path=/", name, value), base);
                }
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable cookie cache");
                false
            }
        }
    }

    fn save_cookies(&self, jar: &Jar, urls: &[&Url]) -> Result<(), FetchError> {
        let mut cookies = BTreeMap::new();
        for url in urls {
            cookies.extend(cookie_values(jar, url));
        }
        persist::write_json_atomic(&self.cookie_path, &cookies).map_err(state_to_io)
    }
}

fn join(base: &Url, path: &str) -> Result<Url, FetchError> {
    base.join(path)
        .map_err(|e| FetchError::NotConfigured(format!("web url {}{}: {}", base, path, e)))
}

fn state_to_io(e: StateFileError) -> FetchError {
    FetchError::Io(io::Error::other(e.to_string()))
}

/// Cookies the jar would send to `url`, as name → value.
fn cookie_values(jar: &Jar, url: &Url) -> BTreeMap<String, String> {
    let Some(header) = jar.cookies(url) else {
        return BTreeMap::new();
    };
    let Ok(header) = header.to_str() else {
        return BTreeMap::new();
    };
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
