use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_f64(profile: &str, key: &str, default: f64) -> f64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub scheduling: SchedulingConfig,
    pub storage: StorageConfig,
    pub aws: AwsConfig,
    pub forecast: ForecastConfig,
    pub runtime: RuntimeConfig,
    pub energy: EnergyConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `GREENBATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("GREENBATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            scheduling: SchedulingConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            aws: AwsConfig::from_env_profiled(p),
            forecast: ForecastConfig::from_env_profiled(p),
            runtime: RuntimeConfig::from_env_profiled(p),
            energy: EnergyConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        let s = &self.scheduling;
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  scheduling:  max_concurrent={}, deadline={}s, data_gathering={}",
            s.max_concurrent_processors,
            s.default_file_deadline_seconds,
            s.automated_data_gathering
        );
        tracing::info!(
            "  intervals:   schedule={}s, execute={}s, pods={}s",
            s.create_schedule_interval_secs,
            s.execute_task_queues_interval_secs,
            s.update_pod_status_interval_secs
        );
        tracing::info!(
            "  storage:     backend={}, data_dir={}, buckets={}/{}",
            self.storage.backend,
            self.storage.data_dir.display(),
            self.storage.pending_bucket,
            self.storage.processing_bucket
        );
        tracing::info!("  aws:         region={}, bucket={}", self.aws.region, self.aws.s3_bucket.as_deref().unwrap_or("(none)"));
        tracing::info!("  forecast:    source={}", self.forecast.source);
        tracing::info!("  runtime:     provider={}", self.runtime.provider);
        tracing::info!(
            "  energy:      watts={}..{}, vcpu={}",
            self.energy.platform_min_watts,
            self.energy.platform_max_watts,
            self.energy.vcpu_count
        );
    }

    /// Return a redacted view safe for status output (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "scheduling": self.scheduling,
            "storage": self.storage,
            "aws": {
                "region": self.aws.region,
                "s3_bucket": self.aws.s3_bucket,
                "configured": self.aws.is_configured(),
            },
            "forecast": self.forecast,
            "runtime": self.runtime,
            "energy": self.energy,
        })
    }
}

// ── Scheduling ────────────────────────────────────────────────

/// Upper bound for `DEFAULT_FILE_DEADLINE_SECONDS` (ten years).
pub const MAX_FILE_DEADLINE_SECONDS: u64 = 10 * 365 * 86_400;
/// Upper bound for `SLIDING_WINDOW_DAYS`.
pub const MAX_SLIDING_WINDOW_DAYS: u32 = 10 * 365;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Worker threads per queue, and the divisor of the batch duration.
    pub max_concurrent_processors: u32,
    /// Offset from creation time used when a file has no explicit deadline.
    pub default_file_deadline_seconds: u64,
    pub create_schedule_interval_secs: u64,
    pub execute_task_queues_interval_secs: u64,
    pub update_pod_status_interval_secs: u64,
    /// Bytes per second assumed when no completed metric is in the window.
    pub no_data_default_processing_speed: f64,
    /// Multiplier applied to expected durations for the latest feasible start.
    pub deadline_buffer_percentage: f64,
    pub sliding_window_days: u32,
    pub pod_poll_interval_ms: u64,
    /// Extra polls tolerated past the deadline when timeouts are ignored.
    pub timeout_grace_polls: u32,
    pub automated_data_gathering: bool,
}

impl SchedulingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_concurrent_processors: profiled_env_u32(p, "MAX_CONCURRENT_PROCESSORS", 1).max(1),
            default_file_deadline_seconds: profiled_env_u64(p, "DEFAULT_FILE_DEADLINE_SECONDS", 86_400)
                .min(MAX_FILE_DEADLINE_SECONDS),
            create_schedule_interval_secs: profiled_env_u64(p, "CREATE_SCHEDULE_INTERVAL", 900),
            execute_task_queues_interval_secs: profiled_env_u64(p, "EXECUTE_TASK_QUEUES_INTERVAL", 60),
            update_pod_status_interval_secs: profiled_env_u64(p, "UPDATE_POD_STATUS_INTERVAL", 60),
            no_data_default_processing_speed: profiled_env_f64(p, "NO_DATA_DEFAULT_PROCESSING_SPEED", 1_000_000.0),
            deadline_buffer_percentage: profiled_env_f64(p, "DEADLINE_BUFFER_PERCENTAGE", 1.1),
            sliding_window_days: profiled_env_u32(p, "SLIDING_WINDOW_DAYS", 30).min(MAX_SLIDING_WINDOW_DAYS),
            pod_poll_interval_ms: profiled_env_u64(p, "POD_POLL_INTERVAL_MS", 1000),
            timeout_grace_polls: profiled_env_u32(p, "TIMEOUT_GRACE_POLLS", 60),
            automated_data_gathering: profiled_env_bool(p, "AUTOMATED_DATA_GATHERING", false),
        }
    }

    pub fn pod_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pod_poll_interval_ms)
    }

    /// Deadline offset for new files, clamped to [`MAX_FILE_DEADLINE_SECONDS`].
    pub fn default_file_deadline(&self) -> chrono::Duration {
        let secs = self.default_file_deadline_seconds.min(MAX_FILE_DEADLINE_SECONDS);
        chrono::Duration::try_seconds(secs as i64).unwrap_or(chrono::Duration::zero())
    }

    /// Look-back window of the speed estimator, clamped to
    /// [`MAX_SLIDING_WINDOW_DAYS`].
    pub fn sliding_window(&self) -> chrono::Duration {
        let days = self.sliding_window_days.min(MAX_SLIDING_WINDOW_DAYS);
        chrono::Duration::try_days(days as i64).unwrap_or(chrono::Duration::zero())
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_processors: 1,
            default_file_deadline_seconds: 86_400,
            create_schedule_interval_secs: 900,
            execute_task_queues_interval_secs: 60,
            update_pod_status_interval_secs: 60,
            no_data_default_processing_speed: 1_000_000.0,
            deadline_buffer_percentage: 1.1,
            sliding_window_days: 30,
            pod_poll_interval_ms: 1000,
            timeout_grace_polls: 60,
            automated_data_gathering: false,
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory", "local", "s3"
    pub backend: String,
    pub data_dir: PathBuf,
    pub pending_bucket: String,
    pub processing_bucket: String,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            backend: profiled_env_or(p, "STORAGE_BACKEND", "local"),
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
            pending_bucket: profiled_env_or(p, "PENDING_BUCKET", "pending"),
            processing_bucket: profiled_env_or(p, "PROCESSING_BUCKET", "processing"),
        }
    }

    /// Path of the persisted scheduler state snapshot.
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }
}

// ── AWS / S3 ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub s3_bucket: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "eu-central-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            s3_bucket: profiled_env_opt(p, "S3_BUCKET"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.access_key_id.is_some() && self.s3_bucket.is_some()
    }
}

// ── Forecast ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// "static", "squeezed"
    pub source: String,
    /// JSON fixture with load and generation series (static source).
    pub fixture_path: Option<PathBuf>,
    /// JSON table of season medians (squeezed source).
    pub season_averages_path: Option<PathBuf>,
}

impl ForecastConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            source: profiled_env_or(p, "FORECAST_SOURCE", "squeezed"),
            fixture_path: profiled_env_opt(p, "FORECAST_FIXTURE_PATH").map(PathBuf::from),
            season_averages_path: profiled_env_opt(p, "SEASON_AVERAGES_PATH").map(PathBuf::from),
        }
    }

    pub fn is_squeezed(&self) -> bool {
        self.source == "squeezed"
    }
}

// ── Container runtime ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// "simulated"
    pub provider: String,
    /// Throughput of simulated pods in bytes per second (0 = instant).
    pub simulated_processing_speed: f64,
    pub simulated_sample_interval_ms: u64,
    pub simulated_memory_limit: u64,
}

impl RuntimeConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "CONTAINER_RUNTIME", "simulated"),
            simulated_processing_speed: profiled_env_f64(p, "SIMULATED_PROCESSING_SPEED", 0.0),
            simulated_sample_interval_ms: profiled_env_u64(p, "SIMULATED_SAMPLE_INTERVAL_MS", 1000),
            simulated_memory_limit: profiled_env_u64(p, "SIMULATED_MEMORY_LIMIT", 2 * 1024 * 1024 * 1024),
        }
    }
}

// ── Energy model ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyConfig {
    /// Per-vCPU draw at idle.
    pub platform_min_watts: f64,
    /// Per-vCPU draw at full utilisation.
    pub platform_max_watts: f64,
    pub vcpu_count: u32,
    pub memory_watts_per_gb: f64,
}

impl EnergyConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            platform_min_watts: profiled_env_f64(p, "PLATFORM_MIN_WATTS", 0.74),
            platform_max_watts: profiled_env_f64(p, "PLATFORM_MAX_WATTS", 3.84),
            vcpu_count: profiled_env_u32(p, "VCPU_COUNT", 2),
            memory_watts_per_gb: profiled_env_f64(p, "MEMORY_WATTS_PER_GB", 0.392),
        }
    }
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            platform_min_watts: 0.74,
            platform_max_watts: 3.84,
            vcpu_count: 2,
            memory_watts_per_gb: 0.392,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiled_lookup_prefers_prefixed_key() {
        env::set_var("GBTEST_MAX_CONCURRENT_PROCESSORS", "4");
        env::set_var("MAX_CONCURRENT_PROCESSORS_UNUSED", "9");
        let cfg = SchedulingConfig::from_env_profiled("GBTEST");
        assert_eq!(cfg.max_concurrent_processors, 4);
        env::remove_var("GBTEST_MAX_CONCURRENT_PROCESSORS");
        env::remove_var("MAX_CONCURRENT_PROCESSORS_UNUSED");
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        env::set_var("GBBOOL_AUTOMATED_DATA_GATHERING", "True");
        assert!(profiled_env_bool("GBBOOL", "AUTOMATED_DATA_GATHERING", false));
        env::set_var("GBBOOL_AUTOMATED_DATA_GATHERING", "0");
        assert!(!profiled_env_bool("GBBOOL", "AUTOMATED_DATA_GATHERING", true));
        env::remove_var("GBBOOL_AUTOMATED_DATA_GATHERING");
    }

    #[test]
    fn scheduling_defaults() {
        let cfg = SchedulingConfig::default();
        assert_eq!(cfg.max_concurrent_processors, 1);
        assert_eq!(cfg.deadline_buffer_percentage, 1.1);
        assert_eq!(cfg.sliding_window_days, 30);
        assert_eq!(cfg.timeout_grace_polls, 60);
        assert_eq!(cfg.pod_poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.default_file_deadline(), chrono::Duration::days(1));
    }

    #[test]
    fn oversized_windows_are_clamped() {
        env::set_var("GBHUGE_DEFAULT_FILE_DEADLINE_SECONDS", u64::MAX.to_string());
        env::set_var("GBHUGE_SLIDING_WINDOW_DAYS", u32::MAX.to_string());
        let cfg = SchedulingConfig::from_env_profiled("GBHUGE");
        assert_eq!(cfg.default_file_deadline_seconds, MAX_FILE_DEADLINE_SECONDS);
        assert_eq!(cfg.sliding_window_days, MAX_SLIDING_WINDOW_DAYS);
        env::remove_var("GBHUGE_DEFAULT_FILE_DEADLINE_SECONDS");
        env::remove_var("GBHUGE_SLIDING_WINDOW_DAYS");

        let raw = SchedulingConfig {
            default_file_deadline_seconds: u64::MAX,
            sliding_window_days: u32::MAX,
            ..SchedulingConfig::default()
        };
        assert_eq!(
            raw.default_file_deadline(),
            chrono::Duration::seconds(MAX_FILE_DEADLINE_SECONDS as i64)
        );
        assert_eq!(raw.sliding_window(), chrono::Duration::days(MAX_SLIDING_WINDOW_DAYS as i64));
    }

    #[test]
    fn state_path_lives_in_data_dir() {
        let storage = StorageConfig {
            backend: "memory".into(),
            data_dir: PathBuf::from("/tmp/gb"),
            pending_bucket: "pending".into(),
            processing_bucket: "processing".into(),
        };
        assert_eq!(storage.state_path(), PathBuf::from("/tmp/gb/state.json"));
    }
}
