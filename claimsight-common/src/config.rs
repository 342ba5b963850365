//! Configuration loading and value resolution
//!
//! Claimsight services resolve every externally-tunable value through the
//! same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback, owned by the caller)

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Resolve a single string setting through the CLI → ENV → TOML chain.
///
/// Returns `None` when no tier provides the value; the caller supplies the
/// compiled default.
pub fn resolve_value(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config_file_key: &str,
) -> Option<String> {
    // Priority 1: Command-line argument
    if let Some(value) = cli_arg {
        return Some(value.to_string());
    }

    // Priority 2: Environment variable
    if let Ok(value) = std::env::var(env_var_name) {
        if !value.trim().is_empty() {
            return Some(value);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = default_config_file() {
        if let Some(value) = read_config_key(&config_path, config_file_key) {
            return Some(value);
        }
    }

    None
}

/// Read one top-level key from a TOML file, stringified.
///
/// Missing file, parse errors, and absent keys all yield `None`; a broken
/// config file must never prevent service startup.
pub fn read_config_key(path: &Path, key: &str) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let parsed: toml::Value = toml::from_str(&content).ok()?;
    match parsed.get(key)? {
        toml::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Get the platform config file path for Claimsight
///
/// Linux: `~/.config/claimsight/config.toml`, then
/// `/etc/claimsight/config.toml`. macOS/Windows: the `dirs` config dir.
pub fn default_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        let user_config = dirs::config_dir().map(|d| d.join("claimsight").join("config.toml"));
        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc/claimsight/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    }

    let path = dirs::config_dir()
        .map(|d| d.join("claimsight").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cli_argument_wins_over_environment() {
        std::env::set_var("CLAIMSIGHT_TEST_RESOLVE", "from-env");
        let resolved = resolve_value(Some("from-cli"), "CLAIMSIGHT_TEST_RESOLVE", "unused");
        assert_eq!(resolved.as_deref(), Some("from-cli"));
        std::env::remove_var("CLAIMSIGHT_TEST_RESOLVE");
    }

    #[test]
    fn environment_used_when_no_cli_argument() {
        std::env::set_var("CLAIMSIGHT_TEST_RESOLVE_ENV", "from-env");
        let resolved = resolve_value(None, "CLAIMSIGHT_TEST_RESOLVE_ENV", "unused");
        assert_eq!(resolved.as_deref(), Some("from-env"));
        std::env::remove_var("CLAIMSIGHT_TEST_RESOLVE_ENV");
    }

    #[test]
    fn read_config_key_handles_strings_and_numbers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend_url = \"http://localhost:8000\"").unwrap();
        writeln!(file, "batch_size = 35").unwrap();

        assert_eq!(
            read_config_key(file.path(), "backend_url").as_deref(),
            Some("http://localhost:8000")
        );
        assert_eq!(read_config_key(file.path(), "batch_size").as_deref(), Some("35"));
        assert_eq!(read_config_key(file.path(), "missing"), None);
    }

    #[test]
    fn read_config_key_tolerates_missing_file() {
        assert_eq!(
            read_config_key(Path::new("/nonexistent/claimsight.toml"), "backend_url"),
            None
        );
    }
}
