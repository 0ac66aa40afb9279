//! TOML configuration for the search service.
//!
//! The file is parsed into serde section structs (every field defaulted) and
//! then validated once; configuration errors are fatal at startup.

use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::schema::Stat;

/// Environment variable consulted when no explicit config path is given.
pub const CONFIG_ENV: &str = "SPAWNFILTER_CONFIG";

/// Validated service configuration.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// File the configuration was read from, if any.
    pub path: Option<PathBuf>,
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Local relational store.
    pub store: StoreConfig,
    /// Remote aggregation service; when set it replaces the local store.
    pub remote: Option<RemoteConfig>,
    /// Row caps and phase timeouts.
    pub limits: Limits,
    /// Ranking settings and configured leagues.
    pub pvp: PvpConfig,
    /// Stat defaults that make up the standard filter.
    pub filters: FilterDefaults,
    /// Area polygons and restriction rules.
    pub areas: AreaConfig,
    /// Reference data files.
    pub data: DataConfig,
    /// Per-user backup limits.
    pub backups: BackupLimits,
    /// Developer toggles.
    pub dev: DevConfig,
    /// Map presentation settings.
    pub map: MapConfig,
}

impl Config {
    /// Loads configuration from `explicit`, falling back to the default
    /// per-user location. A missing file yields the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let raw = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        let mut config = Self::from_raw(raw)?;
        if let Some(path) = &path {
            info!(path = %path.display(), "configuration loaded");
        }
        config.path = path;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let remote = convert_remote(raw.remote)?;
        if remote.is_none() && raw.store.path.is_none() {
            return Err(ConfigError::NoBackend);
        }
        validate_pvp(&raw.pvp)?;
        validate_filters(&raw.filters)?;
        Ok(Self {
            path: None,
            server: raw.server,
            store: raw.store,
            remote,
            limits: raw.limits,
            pvp: raw.pvp,
            filters: raw.filters,
            areas: raw.areas,
            data: raw.data,
            backups: raw.backups,
            dev: raw.dev,
            map: raw.map,
        })
    }

    /// Whether scans go to the remote aggregator instead of the local store.
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: IpAddr,
    /// Listening port.
    pub port: u16,
    /// Allowed CORS origins; empty disables the CORS layer.
    pub allow_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
            allow_origins: Vec::new(),
        }
    }
}

/// Local SQLite store and its schema capabilities.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file.
    pub path: Option<PathBuf>,
    /// Use the alternate vendor schema (computed stats, joined display table).
    pub alternate_schema: bool,
    /// The `size` column exists.
    pub has_size: bool,
    /// A dedicated `height` column exists next to `size`.
    pub has_height: bool,
    /// Rankings are stored as a single `pvp` JSON column.
    pub pvp_v2: bool,
}

/// Remote aggregation service endpoint.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    /// Base URL, without trailing slash.
    pub endpoint: String,
    /// Shared secret sent in the auth header.
    pub secret: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Row caps and timeouts applied to each scan.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Limits {
    /// Row cap of the primary query.
    pub pokemon: usize,
    /// Aggregate cap for both phases.
    pub pokemon_pvp: usize,
    /// Result cap of name searches.
    pub search_results: usize,
    /// Timeout applied to each query phase, in milliseconds.
    pub phase_timeout_ms: u64,
}

impl Limits {
    /// Phase timeout as a duration.
    pub fn phase_timeout(&self) -> Duration {
        Duration::from_millis(self.phase_timeout_ms)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            pokemon: 10_000,
            pokemon_pvp: 10_000,
            search_results: 15,
            phase_timeout_ms: 10_000,
        }
    }
}

/// Ranking configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PvpConfig {
    /// Rankings are computed from the ranking table instead of stored rows.
    pub engine_handles_ranking: bool,
    /// Lowest rank of the default window.
    pub min_rank: i64,
    /// Highest rank of the default window.
    pub max_rank: i64,
    /// Leagues in declaration order.
    pub leagues: Vec<League>,
}

impl PvpConfig {
    /// Looks up a configured league.
    pub fn league(&self, name: &str) -> Option<&League> {
        self.leagues.iter().find(|league| league.name == name)
    }

    /// Default rank window of a league.
    pub fn rank_window(&self, league: &League) -> [i64; 2] {
        [
            league.min_rank.unwrap_or(self.min_rank),
            league.max_rank.unwrap_or(self.max_rank),
        ]
    }
}

impl Default for PvpConfig {
    fn default() -> Self {
        Self {
            engine_handles_ranking: false,
            min_rank: 1,
            max_rank: 100,
            leagues: vec![League::new("great", 1400), League::new("ultra", 2350)],
        }
    }
}

/// One competitive league.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct League {
    /// League key used in filters and ranking payloads.
    pub name: String,
    /// Minimum CP a candidate needs unless the backend gates CP itself.
    #[serde(default)]
    pub min_cp: u32,
    /// Lowest rank of this league's default window; falls back to `pvp.min_rank`.
    #[serde(default)]
    pub min_rank: Option<i64>,
    /// Highest rank of this league's default window; falls back to `pvp.max_rank`.
    #[serde(default)]
    pub max_rank: Option<i64>,
}

impl League {
    /// League without its own rank window.
    pub fn new(name: impl Into<String>, min_cp: u32) -> Self {
        Self {
            name: name.into(),
            min_cp,
            min_rank: None,
            max_rank: None,
        }
    }
}

/// Stat defaults of the standard filter.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterDefaults {
    /// IV percentage range.
    pub iv: [i64; 2],
    /// CP range.
    pub cp: [i64; 2],
    /// Level range.
    pub level: [i64; 2],
    /// Attack range.
    pub atk_iv: [i64; 2],
    /// Defense range.
    pub def_iv: [i64; 2],
    /// Stamina range.
    pub sta_iv: [i64; 2],
    /// Gender scalar (0 = any).
    pub gender: i64,
}

impl FilterDefaults {
    /// Default range of a stat.
    pub fn range(&self, stat: Stat) -> [i64; 2] {
        match stat {
            Stat::Iv => self.iv,
            Stat::Cp => self.cp,
            Stat::Level => self.level,
            Stat::AtkIv => self.atk_iv,
            Stat::DefIv => self.def_iv,
            Stat::StaIv => self.sta_iv,
        }
    }
}

impl Default for FilterDefaults {
    fn default() -> Self {
        Self {
            iv: [0, 100],
            cp: [10, 5000],
            level: [1, 50],
            atk_iv: [0, 15],
            def_iv: [0, 15],
            sta_iv: [0, 15],
            gender: 0,
        }
    }
}

/// Area polygon source and restriction rules.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AreaConfig {
    /// GeoJSON feature collection with the scan areas.
    pub geojson: Option<PathBuf>,
    /// Role based restrictions, resolved by the auth layer.
    pub restrictions: Vec<RestrictionRule>,
}

/// Maps roles to the areas they may see.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RestrictionRule {
    /// Roles the rule applies to.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Area keys or names.
    #[serde(default)]
    pub areas: Vec<String>,
}

/// Reference data files.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    /// Master reference JSON (species default forms).
    pub masterfile: Option<PathBuf>,
    /// Precomputed ranking table JSON.
    pub rankings: Option<PathBuf>,
}

/// Per-user backup limits.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupLimits {
    /// Maximum serialized size of one backup in bytes.
    pub size_limit: usize,
    /// Maximum number of backups per user.
    pub count_limit: usize,
}

impl Default for BackupLimits {
    fn default() -> Self {
        Self {
            size_limit: 5_000_000,
            count_limit: 10,
        }
    }
}

/// Developer toggles.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DevConfig {
    /// Log compiled SQL and remote payloads at debug level.
    pub query_debug: bool,
}

/// Map presentation settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MapConfig {
    /// Unit used for search distances.
    pub distance_unit: DistanceUnit,
}

/// Distance unit for search results.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    /// Kilometers.
    #[default]
    #[serde(alias = "kilometers")]
    Km,
    /// Miles.
    Miles,
}

impl DistanceUnit {
    /// Converts meters into this unit.
    pub fn from_meters(self, meters: f64) -> f64 {
        match self {
            DistanceUnit::Km => meters / 1_000.0,
            DistanceUnit::Miles => meters / 1_609.344,
        }
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn convert_remote(raw: RawRemote) -> Result<Option<RemoteConfig>, ConfigError> {
    if !raw.enabled {
        return Ok(None);
    }
    let endpoint = raw
        .endpoint
        .map(|endpoint| endpoint.trim().trim_end_matches('/').to_owned())
        .filter(|endpoint| !endpoint.is_empty())
        .ok_or(ConfigError::MissingEndpoint)?;
    Ok(Some(RemoteConfig {
        endpoint,
        secret: raw.secret.filter(|secret| !secret.is_empty()),
        timeout: Duration::from_millis(raw.timeout_ms),
    }))
}

fn validate_pvp(pvp: &PvpConfig) -> Result<(), ConfigError> {
    if pvp.min_rank > pvp.max_rank {
        return Err(ConfigError::InvalidWindow {
            name: "pvp rank".into(),
            min: pvp.min_rank,
            max: pvp.max_rank,
        });
    }
    let mut seen = HashSet::new();
    for league in &pvp.leagues {
        if league.name.trim().is_empty() {
            return Err(ConfigError::InvalidLeague {
                name: league.name.clone(),
                reason: "name cannot be empty",
            });
        }
        if Stat::ALL.iter().any(|stat| stat.name() == league.name)
            || matches!(league.name.as_str(), "gender" | "xxs" | "xxl")
        {
            return Err(ConfigError::InvalidLeague {
                name: league.name.clone(),
                reason: "name collides with a stat dimension",
            });
        }
        let [min, max] = pvp.rank_window(league);
        if min > max {
            return Err(ConfigError::InvalidWindow {
                name: format!("{} rank", league.name),
                min,
                max,
            });
        }
        if !seen.insert(league.name.as_str()) {
            return Err(ConfigError::InvalidLeague {
                name: league.name.clone(),
                reason: "declared twice",
            });
        }
    }
    Ok(())
}

fn validate_filters(filters: &FilterDefaults) -> Result<(), ConfigError> {
    for stat in Stat::ALL {
        let [min, max] = filters.range(stat);
        if min > max {
            return Err(ConfigError::InvalidWindow {
                name: stat.name().into(),
                min,
                max,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    remote: RawRemote,
    #[serde(default)]
    limits: Limits,
    #[serde(default)]
    pvp: PvpConfig,
    #[serde(default)]
    filters: FilterDefaults,
    #[serde(default)]
    areas: AreaConfig,
    #[serde(default)]
    data: DataConfig,
    #[serde(default)]
    backups: BackupLimits,
    #[serde(default)]
    dev: DevConfig,
    #[serde(default)]
    map: MapConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawRemote {
    enabled: bool,
    endpoint: Option<String>,
    secret: Option<String>,
    timeout_ms: u64,
}

impl Default for RawRemote {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            secret: None,
            timeout_ms: 5_000,
        }
    }
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Config path.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// Remote mode enabled without an endpoint.
    #[error("remote.enabled is set but remote.endpoint is missing")]
    MissingEndpoint,
    /// Neither a local store nor a remote endpoint is configured.
    #[error("no backend configured; set store.path or enable remote")]
    NoBackend,
    /// A `[min, max]` window is inverted.
    #[error("{name} window is inverted ({min} > {max})")]
    InvalidWindow {
        /// Window name.
        name: String,
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },
    /// A league declaration is unusable.
    #[error("league '{name}' is invalid: {reason}")]
    InvalidLeague {
        /// League name as declared.
        name: String,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// Reference data could not be loaded.
    #[error("failed to load {what} from {path}: {reason}")]
    Data {
        /// Which data set.
        what: &'static str,
        /// Source file.
        path: PathBuf,
        /// Failure description.
        reason: String,
    },
    /// Logging could not be initialised.
    #[error("{0}")]
    Logging(String),
}

/// Default per-user config location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("spawnfilter").join("config.toml"))
}
