//! Service configuration for claimsight-ae
//!
//! Every tunable resolves through CLI → ENV (`CLAIMSIGHT_*`) → TOML →
//! compiled default, via the shared resolver in claimsight-common.

use crate::engine::EnginePolicy;
use clap::Parser;
use claimsight_common::config::resolve_value;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 5741;
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Command-line arguments. Every option falls back to an environment
/// variable and then the shared config file.
#[derive(Debug, Parser)]
#[command(name = "claimsight-ae", about = "Claimsight analysis engine service")]
pub struct Cli {
    /// HTTP listen port
    #[arg(long)]
    pub port: Option<u16>,

    /// Base URL of the records backend
    #[arg(long)]
    pub backend_url: Option<String>,

    /// Records per analysis sub-batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Sub-batches dispatched concurrently per cycle
    #[arg(long)]
    pub max_concurrent_batches: Option<usize>,

    /// Seconds between cycle attempts
    #[arg(long)]
    pub cycle_interval_secs: Option<u64>,

    /// Per-request timeout towards the backend, in seconds
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Start the engine immediately instead of waiting for an operator
    #[arg(long)]
    pub auto_start: bool,
}

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct AeConfig {
    pub port: u16,
    pub backend_url: String,
    pub request_timeout: Duration,
    pub auto_start: bool,
    pub policy: EnginePolicy,
}

impl AeConfig {
    /// Resolve all settings from the CLI arguments and lower tiers.
    ///
    /// Unparseable values from ENV/TOML are warned about and replaced by
    /// the compiled default; a bad config never prevents startup.
    pub fn resolve(cli: &Cli) -> Self {
        let defaults = EnginePolicy::default();

        let port = resolve_parsed(
            cli.port,
            "CLAIMSIGHT_AE_PORT",
            "ae_port",
            DEFAULT_PORT,
        );
        let backend_url = resolve_value(
            cli.backend_url.as_deref(),
            "CLAIMSIGHT_BACKEND_URL",
            "backend_url",
        )
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let batch_size = resolve_parsed(
            cli.batch_size,
            "CLAIMSIGHT_BATCH_SIZE",
            "batch_size",
            defaults.batch_size,
        );
        let max_concurrent_batches = resolve_parsed(
            cli.max_concurrent_batches,
            "CLAIMSIGHT_MAX_CONCURRENT_BATCHES",
            "max_concurrent_batches",
            defaults.max_concurrent_batches,
        );
        let cycle_interval_secs = resolve_parsed(
            cli.cycle_interval_secs,
            "CLAIMSIGHT_CYCLE_INTERVAL_SECS",
            "cycle_interval_secs",
            defaults.cycle_interval.as_secs(),
        );
        let request_timeout_secs = resolve_parsed(
            cli.request_timeout_secs,
            "CLAIMSIGHT_REQUEST_TIMEOUT_SECS",
            "request_timeout_secs",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        );

        Self {
            port,
            backend_url,
            request_timeout: Duration::from_secs(request_timeout_secs),
            auto_start: cli.auto_start
                || std::env::var("CLAIMSIGHT_AUTO_START")
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
            policy: EnginePolicy {
                batch_size: batch_size.max(1),
                max_concurrent_batches: max_concurrent_batches.max(1),
                cycle_interval: Duration::from_secs(cycle_interval_secs.max(1)),
                ..defaults
            },
        }
    }
}

/// Resolve a typed setting: CLI value if present, otherwise the string
/// chain parsed into `T`, otherwise the compiled default.
fn resolve_parsed<T>(cli: Option<T>, env_var: &str, toml_key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    if let Some(value) = cli {
        return value;
    }
    if let Some(raw) = resolve_value(None, env_var, toml_key) {
        match raw.parse::<T>() {
            Ok(value) => return value,
            Err(_) => {
                warn!("Ignoring unparseable value for {}: {:?}", toml_key, raw);
            }
        }
    }
    default
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_cli() -> Cli {
        Cli::parse_from(["claimsight-ae"])
    }

    #[test]
    fn compiled_defaults_apply_without_overrides() {
        let config = AeConfig::resolve(&empty_cli());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.policy.batch_size, 35);
        assert_eq!(config.policy.max_concurrent_batches, 7);
        assert_eq!(config.policy.cycle_interval, Duration::from_secs(5));
        assert!(!config.auto_start);
    }

    #[test]
    fn cli_values_override_defaults() {
        let cli = Cli::parse_from([
            "claimsight-ae",
            "--port",
            "6000",
            "--batch-size",
            "10",
            "--max-concurrent-batches",
            "2",
            "--auto-start",
        ]);
        let config = AeConfig::resolve(&cli);
        assert_eq!(config.port, 6000);
        assert_eq!(config.policy.batch_size, 10);
        assert_eq!(config.policy.max_concurrent_batches, 2);
        assert!(config.auto_start);
    }

    #[test]
    fn zero_sized_knobs_are_clamped_to_one() {
        let cli = Cli::parse_from(["claimsight-ae", "--batch-size", "0"]);
        let config = AeConfig::resolve(&cli);
        assert_eq!(config.policy.batch_size, 1);
    }
}
