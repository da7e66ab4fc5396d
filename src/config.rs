use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::model::{DAY_MS, HOUR_MS, MINUTE_MS, Ms, SECOND_MS};

/// How the scheduler picks among bays that are all free for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaySelection {
    LeastUtilized,
    Random { seed: Option<u64> },
    FirstFit,
}

#[derive(Debug)]
pub struct ConfigError(String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid configuration: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Scheduling rules of the shop.
#[derive(Debug, Clone)]
pub struct ShopConfig {
    pub slot_minutes: u32,
    pub open_hour: u32,
    pub close_hour: u32,
    /// Fixed offset of shop-local time from UTC.
    pub utc_offset_minutes: i32,
    pub max_bookings_per_slot: usize,
    /// The scheduler gives up once a candidate start is this far past "now".
    pub lookahead: Ms,
    /// Added past the earliest conflicting end before retrying the search.
    pub retry_gap: Ms,
    pub sweep_interval: Duration,
    /// In-progress tasks this close to their expected end trigger a reminder.
    pub almost_due_lead: Ms,
    pub bay_selection: BaySelection,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            slot_minutes: 30,
            open_hour: 8,
            close_hour: 17,
            utc_offset_minutes: 0,
            max_bookings_per_slot: 3,
            lookahead: 10 * HOUR_MS,
            retry_gap: 2 * SECOND_MS,
            sweep_interval: Duration::from_secs(60),
            almost_due_lead: 10 * MINUTE_MS,
            bay_selection: BaySelection::LeastUtilized,
        }
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError(format!("{key}={raw:?} is not a valid value"))),
        None => Ok(default),
    }
}

/// A whole number of `unit`s read from `key`, as milliseconds.
fn scaled(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Ms,
    unit: Ms,
) -> Result<Ms, ConfigError> {
    parsed::<Ms>(lookup, key, default)?
        .checked_mul(unit)
        .ok_or_else(|| ConfigError(format!("{key} is out of range")))
}

/// Furthest the scheduler may look ahead.
const MAX_LOOKAHEAD: Ms = 366 * DAY_MS;

impl ShopConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let bay_selection = match lookup("SHOPFLOOR_BAY_SELECTION").as_deref() {
            None | Some("least_utilized") => BaySelection::LeastUtilized,
            Some("first_fit") => BaySelection::FirstFit,
            Some("random") => BaySelection::Random {
                seed: match lookup("SHOPFLOOR_BAY_SEED") {
                    Some(raw) => Some(raw.trim().parse().map_err(|_| {
                        ConfigError(format!("SHOPFLOOR_BAY_SEED={raw:?} is not a valid seed"))
                    })?),
                    None => None,
                },
            },
            Some(other) => {
                return Err(ConfigError(format!("unknown bay selection strategy {other:?}")));
            }
        };

        let config = Self {
            slot_minutes: parsed(&lookup, "SHOPFLOOR_SLOT_MINUTES", defaults.slot_minutes)?,
            open_hour: parsed(&lookup, "SHOPFLOOR_OPEN_HOUR", defaults.open_hour)?,
            close_hour: parsed(&lookup, "SHOPFLOOR_CLOSE_HOUR", defaults.close_hour)?,
            utc_offset_minutes: parsed(
                &lookup,
                "SHOPFLOOR_UTC_OFFSET_MINUTES",
                defaults.utc_offset_minutes,
            )?,
            max_bookings_per_slot: parsed(
                &lookup,
                "SHOPFLOOR_MAX_BOOKINGS_PER_SLOT",
                defaults.max_bookings_per_slot,
            )?,
            lookahead: scaled(&lookup, "SHOPFLOOR_LOOKAHEAD_HOURS", 10, HOUR_MS)?,
            retry_gap: parsed(&lookup, "SHOPFLOOR_RETRY_GAP_MS", defaults.retry_gap)?,
            sweep_interval: Duration::from_secs(parsed(
                &lookup,
                "SHOPFLOOR_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )?),
            almost_due_lead: scaled(&lookup, "SHOPFLOOR_ALMOST_DUE_MINUTES", 10, MINUTE_MS)?,
            bay_selection,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_minutes == 0 || DAY_MS % self.slot_ms() != 0 {
            return Err(ConfigError(format!(
                "slot width of {} minutes must evenly divide a day",
                self.slot_minutes
            )));
        }
        if self.close_hour > 24 || self.open_hour >= self.close_hour {
            return Err(ConfigError(format!(
                "business hours {}..{} are not a valid range",
                self.open_hour, self.close_hour
            )));
        }
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError("utc offset must be under 24 hours".into()));
        }
        if self.max_bookings_per_slot == 0 {
            return Err(ConfigError("max bookings per slot must be at least 1".into()));
        }
        if self.lookahead <= 0 || self.retry_gap < 0 {
            return Err(ConfigError("lookahead must be positive and retry gap non-negative".into()));
        }
        if self.lookahead > MAX_LOOKAHEAD {
            return Err(ConfigError("lookahead must be at most 366 days".into()));
        }
        if !(0..=DAY_MS).contains(&self.almost_due_lead) {
            return Err(ConfigError("almost-due lead must be between 0 and 24 hours".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError("sweep interval must be positive".into()));
        }
        Ok(())
    }

    pub fn slot_ms(&self) -> Ms {
        self.slot_minutes as Ms * MINUTE_MS
    }
}

/// Process wiring: where to listen, where data lives.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub catalog_path: Option<PathBuf>,
    /// Bays provisioned when the store has none.
    pub initial_bays: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind = lookup("SHOPFLOOR_BIND").unwrap_or_else(|| "0.0.0.0".into());
        let port = lookup("SHOPFLOOR_PORT").unwrap_or_else(|| "8080".into());
        let listen_addr = format!("{bind}:{port}")
            .parse()
            .map_err(|_| ConfigError(format!("{bind}:{port} is not a socket address")))?;
        let metrics_port = match lookup("SHOPFLOOR_METRICS_PORT") {
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError(format!("SHOPFLOOR_METRICS_PORT={raw:?} is not a port")))?,
            ),
            None => None,
        };

        Ok(Self {
            listen_addr,
            data_dir: PathBuf::from(lookup("SHOPFLOOR_DATA_DIR").unwrap_or_else(|| "./data".into())),
            metrics_port,
            compact_threshold: parsed(&lookup, "SHOPFLOOR_COMPACT_THRESHOLD", 1000)?,
            catalog_path: lookup("SHOPFLOOR_CATALOG_PATH").map(PathBuf::from),
            initial_bays: parsed(&lookup, "SHOPFLOOR_BAYS", 4)?,
        })
    }
}
