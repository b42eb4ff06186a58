use std::collections::HashMap;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ulid::Ulid;

use crate::engine::{EngineConfig, StaticTimezones};
use crate::limits::{DEFAULT_LOCK_WAIT_MS, MAX_LOCK_WAIT_MS};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// WAL appends between compactions.
    pub compact_threshold: u64,
    pub lock_wait: Duration,
    pub allow_past: bool,
    pub default_timezone: String,
    pub instructor_timezones: HashMap<Ulid, String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same rules as `from_env`, reading through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("SLOTKEEPER_BIND")
            .unwrap_or_else(|| "0.0.0.0".to_string())
            .parse::<IpAddr>()
            .context("Failed to parse SLOTKEEPER_BIND")?;

        let port = lookup("SLOTKEEPER_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()
            .context("Failed to parse SLOTKEEPER_PORT")?;

        let data_dir = PathBuf::from(lookup("SLOTKEEPER_DATA_DIR").unwrap_or_else(|| "./data".to_string()));

        let metrics_port = match lookup("SLOTKEEPER_METRICS_PORT") {
            Some(val) => Some(val.parse().context("Failed to parse SLOTKEEPER_METRICS_PORT")?),
            None => None,
        };

        let compact_threshold = match lookup("SLOTKEEPER_COMPACT_THRESHOLD") {
            Some(val) => val.parse().context("Failed to parse SLOTKEEPER_COMPACT_THRESHOLD")?,
            None => 1000,
        };

        let lock_wait_ms: u64 = match lookup("SLOTKEEPER_LOCK_WAIT_MS") {
            Some(val) => val.parse().context("Failed to parse SLOTKEEPER_LOCK_WAIT_MS")?,
            None => DEFAULT_LOCK_WAIT_MS,
        };
        if lock_wait_ms == 0 || lock_wait_ms > MAX_LOCK_WAIT_MS {
            bail!("SLOTKEEPER_LOCK_WAIT_MS must be between 1 and {MAX_LOCK_WAIT_MS}");
        }

        let allow_past = match lookup("SLOTKEEPER_ALLOW_PAST") {
            Some(val) => parse_bool(&val).context("Failed to parse SLOTKEEPER_ALLOW_PAST")?,
            None => false,
        };

        let default_timezone = lookup("SLOTKEEPER_DEFAULT_TIMEZONE").unwrap_or_else(|| "UTC".to_string());
        check_zone(&default_timezone).context("Invalid SLOTKEEPER_DEFAULT_TIMEZONE")?;

        let instructor_timezones = match lookup("SLOTKEEPER_INSTRUCTOR_TIMEZONES") {
            Some(val) => parse_timezone_map(&val).context("Failed to parse SLOTKEEPER_INSTRUCTOR_TIMEZONES")?,
            None => HashMap::new(),
        };

        Ok(Config {
            host,
            port,
            data_dir,
            metrics_port,
            compact_threshold,
            lock_wait: Duration::from_millis(lock_wait_ms),
            allow_past,
            default_timezone,
            instructor_timezones,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotkeeper.wal")
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            lock_wait: self.lock_wait,
            allow_past: self.allow_past,
            timezones: Arc::new(StaticTimezones::new(
                self.default_timezone.clone(),
                self.instructor_timezones.clone(),
            )),
        }
    }
}

fn parse_bool(val: &str) -> Result<bool> {
    match val.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}

fn check_zone(name: &str) -> Result<()> {
    name.parse::<chrono_tz::Tz>()
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("unknown timezone {name:?}: {e}"))
}

/// `<ulid>=<zone>` pairs, comma-separated.
fn parse_timezone_map(val: &str) -> Result<HashMap<Ulid, String>> {
    let mut out = HashMap::new();
    for pair in val.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (id, zone) = pair
            .split_once('=')
            .with_context(|| format!("expected <instructor_id>=<zone>, got {pair:?}"))?;
        let id = Ulid::from_string(id.trim()).with_context(|| format!("bad instructor id {id:?}"))?;
        let zone = zone.trim();
        check_zone(zone)?;
        out.insert(id, zone.to_string());
    }
    Ok(out)
}
