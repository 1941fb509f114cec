use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use placeconnect_core::{expiry::SWEEP_INTERVAL, profile_cache::DEFAULT_CAPACITY};
use placeconnect_types::api::HISTORY_LIMIT;
use tracing::{info, warn};

/// How long a preview keeps its presence probe open.
pub const PROBE_LINGER: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Local SQLite file; in-memory when unset.
    pub store_path: Option<PathBuf>,
    pub sweep_interval: Duration,
    pub probe_linger: Duration,
    pub history_limit: u32,
    pub profile_cache_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            sweep_interval: SWEEP_INTERVAL,
            probe_linger: PROBE_LINGER,
            history_limit: HISTORY_LIMIT,
            profile_cache_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Read `PLACECONNECT_*` variables, loading `.env` first if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Self {
            store_path: var("PLACECONNECT_STORE_PATH").ok().map(PathBuf::from),
            sweep_interval: Duration::from_secs(try_load(
                "PLACECONNECT_SWEEP_SECS",
                defaults.sweep_interval.as_secs(),
            )
            .max(1)),
            probe_linger: Duration::from_millis(try_load(
                "PLACECONNECT_PROBE_MS",
                defaults.probe_linger.as_millis() as u64,
            )),
            history_limit: try_load("PLACECONNECT_HISTORY_LIMIT", defaults.history_limit)
                .min(HISTORY_LIMIT),
            profile_cache_capacity: try_load(
                "PLACECONNECT_PROFILE_CACHE",
                defaults.profile_cache_capacity,
            ),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        info!("{key} not set, using default");
    })
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value '{raw}': {e}, using default: {default}");
            default
        }),
        Err(()) => default,
    }
}
