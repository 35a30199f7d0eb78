//! Environment knobs (spec.md §6), parsed the way the teacher's
//! `Config::from_env()` parses broker/strategy settings: `env::var(..)`
//! with a string default, then `.parse()` with `anyhow::Context`.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleResponseFormat {
    Text,
    JsonObject,
    Off,
}

impl std::str::FromStr for OracleResponseFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OracleResponseFormat::Text),
            "json_object" => Ok(OracleResponseFormat::JsonObject),
            "off" => Ok(OracleResponseFormat::Off),
            _ => anyhow::bail!("Invalid ORACLE_RESPONSE_FORMAT: {s}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMode {
    Simulation,
    Realtime,
}

impl std::str::FromStr for SystemMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "simulation" => Ok(SystemMode::Simulation),
            "realtime" => Ok(SystemMode::Realtime),
            _ => anyhow::bail!("Invalid system mode: {s}. Must be 'simulation' or 'realtime'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub oracle_enabled: bool,
    pub oracle_base_url: String,
    pub oracle_model_name: String,
    pub oracle_api_key: String,
    pub oracle_response_format: OracleResponseFormat,

    pub tick_interval: Duration,
    pub lifecycle_interval: Duration,
    pub watchdog_interval: Duration,
    pub price_tick_interval: Duration,

    pub max_total_agents: usize,
    pub max_agents_per_sector: usize,
    pub readiness_threshold: f64,
    pub conflict_threshold: f64,
    pub max_rounds: u32,
    pub archive_delay: Duration,
    pub stall_threshold: Duration,
    pub debounce_window: Duration,

    pub storage_dir: String,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let oracle_enabled = env::var("ORACLE_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let oracle_base_url = env::var("ORACLE_BASE_URL").unwrap_or_default();
        let oracle_model_name = env::var("ORACLE_MODEL_NAME").unwrap_or_default();
        let oracle_api_key = env::var("ORACLE_API_KEY").unwrap_or_default();

        let oracle_response_format_str =
            env::var("ORACLE_RESPONSE_FORMAT").unwrap_or_else(|_| "off".to_string());
        let oracle_response_format: OracleResponseFormat = oracle_response_format_str.parse()?;

        let tick_interval_ms = env::var("TICK_INTERVAL_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse::<u64>()
            .context("Failed to parse TICK_INTERVAL_MS")?;

        let lifecycle_interval_ms = env::var("LIFECYCLE_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse::<u64>()
            .context("Failed to parse LIFECYCLE_INTERVAL_MS")?;

        let watchdog_interval_ms = env::var("WATCHDOG_INTERVAL_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u64>()
            .context("Failed to parse WATCHDOG_INTERVAL_MS")?;

        let price_tick_ms = env::var("PRICE_TICK_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse::<u64>()
            .context("Failed to parse PRICE_TICK_MS")?;

        let max_total_agents = env::var("MAX_TOTAL_AGENTS")
            .unwrap_or_else(|_| "200".to_string())
            .parse::<usize>()
            .context("Failed to parse MAX_TOTAL_AGENTS")?;

        let max_agents_per_sector = env::var("MAX_AGENTS_PER_SECTOR")
            .unwrap_or_else(|_| "12".to_string())
            .parse::<usize>()
            .context("Failed to parse MAX_AGENTS_PER_SECTOR")?;

        let readiness_threshold = env::var("READINESS_THRESHOLD")
            .unwrap_or_else(|_| "65".to_string())
            .parse::<f64>()
            .context("Failed to parse READINESS_THRESHOLD")?;

        let conflict_threshold = env::var("CONFLICT_THRESHOLD")
            .unwrap_or_else(|_| "0.5".to_string())
            .parse::<f64>()
            .context("Failed to parse CONFLICT_THRESHOLD")?;

        let max_rounds = env::var("MAX_ROUNDS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()
            .context("Failed to parse MAX_ROUNDS")?;

        let archive_delay_ms = env::var("ARCHIVE_DELAY_MS")
            .unwrap_or_else(|_| "60000".to_string())
            .parse::<u64>()
            .context("Failed to parse ARCHIVE_DELAY_MS")?;

        let stall_threshold_ms = env::var("STALL_THRESHOLD_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse::<u64>()
            .context("Failed to parse STALL_THRESHOLD_MS")?;

        let debounce_window_ms = env::var("DEBOUNCE_WINDOW_MS")
            .unwrap_or_else(|_| "60000".to_string())
            .parse::<u64>()
            .context("Failed to parse DEBOUNCE_WINDOW_MS")?;

        let storage_dir = env::var("STORAGE_DIR").unwrap_or_else(|_| "storage".to_string());

        Ok(Self {
            oracle_enabled,
            oracle_base_url,
            oracle_model_name,
            oracle_api_key,
            oracle_response_format,
            tick_interval: Duration::from_millis(tick_interval_ms),
            lifecycle_interval: Duration::from_millis(lifecycle_interval_ms),
            watchdog_interval: Duration::from_millis(watchdog_interval_ms),
            price_tick_interval: Duration::from_millis(price_tick_ms),
            max_total_agents,
            max_agents_per_sector,
            readiness_threshold,
            conflict_threshold,
            max_rounds,
            archive_delay: Duration::from_millis(archive_delay_ms),
            stall_threshold: Duration::from_millis(stall_threshold_ms),
            debounce_window: Duration::from_millis(debounce_window_ms),
            storage_dir,
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            oracle_enabled: false,
            oracle_base_url: String::new(),
            oracle_model_name: String::new(),
            oracle_api_key: String::new(),
            oracle_response_format: OracleResponseFormat::Off,
            tick_interval: Duration::from_millis(2000),
            lifecycle_interval: Duration::from_millis(1000),
            watchdog_interval: Duration::from_millis(5000),
            price_tick_interval: Duration::from_millis(10_000),
            max_total_agents: 200,
            max_agents_per_sector: 12,
            readiness_threshold: 65.0,
            conflict_threshold: 0.5,
            max_rounds: 3,
            archive_delay: Duration::from_millis(60_000),
            stall_threshold: Duration::from_millis(30_000),
            debounce_window: Duration::from_millis(60_000),
            storage_dir: "storage".to_string(),
        }
    }
}
