use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;

use crate::engine::EngineConfig;
use crate::limits::*;

/// Process configuration, read from `SPACEBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub scan_interval: Duration,
    pub payment_window_hours: i64,
    pub max_active_per_tenant: usize,
    pub auto_assign_payment: bool,
    pub compact_threshold: u64,
    /// JSON array of buildings to seed the catalog with.
    pub buildings_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            scan_interval: Duration::from_secs(24 * 60 * 60),
            payment_window_hours: 24,
            max_active_per_tenant: 5,
            auto_assign_payment: true,
            compact_threshold: 1000,
            buildings_file: None,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or unparsable values fall
    /// back to defaults; numeric values are clamped to `limits`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let scan_secs: u64 = parsed(&lookup, "SPACEBOOK_SCAN_INTERVAL_SECS")
            .unwrap_or(defaults.scan_interval.as_secs())
            .max(MIN_SCAN_INTERVAL_SECS);
        let payment_window_hours: i64 = parsed(&lookup, "SPACEBOOK_PAYMENT_WINDOW_HOURS")
            .unwrap_or(defaults.payment_window_hours)
            .clamp(1, MAX_PAYMENT_WINDOW_HOURS);

        Self {
            data_dir: lookup("SPACEBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: parsed(&lookup, "SPACEBOOK_METRICS_PORT"),
            scan_interval: Duration::from_secs(scan_secs),
            payment_window_hours,
            max_active_per_tenant: parsed(&lookup, "SPACEBOOK_MAX_ACTIVE_PER_TENANT")
                .unwrap_or(defaults.max_active_per_tenant),
            auto_assign_payment: parsed(&lookup, "SPACEBOOK_AUTO_ASSIGN_PAYMENT")
                .unwrap_or(defaults.auto_assign_payment),
            compact_threshold: parsed(&lookup, "SPACEBOOK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            buildings_file: lookup("SPACEBOOK_BUILDINGS_FILE").map(PathBuf::from),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            payment_window: TimeDelta::hours(self.payment_window_hours),
            auto_assign_payment: self.auto_assign_payment,
            max_active_per_tenant: self.max_active_per_tenant,
        }
    }
}
