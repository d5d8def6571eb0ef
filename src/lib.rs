/// solmon_service: SolarEdge PV telemetry collector.
///
/// Polls the SolarEdge monitoring API (and the website's panel playback) for
/// every site on an account and writes the readings to stdout as line
/// protocol, for a downstream agent to forward to a time-series database.
///
/// # Module structure
///
/// ```text
/// solmon_service
/// ├── model         - shared data types (Site, DataStream, DateInterval, MetricRecord, FetchError)
/// ├── config        - solmon.toml tunables + secrets from the environment
/// ├── clock         - wall clock and sleeping, swappable in tests
/// ├── intervals     - date-range splitting for per-call span limits
/// ├── quota         - daily API call budget; blocks until midnight when spent
/// ├── retry         - fetch with pacing, retry delay and quota metering
/// ├── persist       - atomic JSON state files
/// ├── installation  - site + inverter discovery, cached in installinfo.json
/// ├── checkpoint    - per-stream, per-site progress (lastupdated.json)
/// ├── line_protocol - record encoding and the stdout sink
/// ├── sync          - one (site, stream) unit: fetch, emit, checkpoint
/// ├── backfill      - quota-aware historical download
/// ├── daemon        - daily update loop at the configured cutoff
/// └── ingest
///     ├── monitoring_api - REST API: URL construction + JSON parsing
///     ├── playback       - website playback: login, cookies, payload repair
///     └── fixtures (test only) - representative API response payloads
/// ```

/// Public modules
pub mod backfill;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod ingest;
pub mod installation;
pub mod intervals;
pub mod line_protocol;
pub mod model;
pub mod persist;
pub mod quota;
pub mod retry;
pub mod sync;
