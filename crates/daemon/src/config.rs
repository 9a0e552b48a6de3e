//! Daemon configuration from `CLIPDOCK_*` environment variables
//! (a `.env` file in the working directory is loaded first).

use clipdock_core::application::ingest::{
    DEFAULT_ADMISSION_WAIT, DEFAULT_CONCURRENCY, DEFAULT_MAX_PENDING,
};
use clipdock_core::application::CapacityMode;
use clipdock_core::error::{AppError, Result};
use clipdock_infra_fs::CollisionPolicy;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MEDIA_DIR: &str = "~/.clipdock/media";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 50051;
const DEFAULT_STREAM_IDLE_SECS: u64 = 60;
const DEFAULT_LOG_FORMAT: &str = "pretty";

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub max_pending: usize,
    pub concurrency: usize,
    pub capacity_mode: CapacityMode,
    pub media_dir: PathBuf,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub admission_wait: Duration,
    pub stream_idle_timeout: Duration,
    pub collision_policy: CollisionPolicy,
    pub log_format: String,
}

impl DaemonConfig {
    /// Load `.env` (if any) and read the process environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or empty keys take defaults,
    /// malformed values are configuration errors
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let media_dir = get("CLIPDOCK_MEDIA_DIR").unwrap_or_else(|| DEFAULT_MEDIA_DIR.to_string());

        Ok(Self {
            max_pending: parse_or(&get, "CLIPDOCK_Q_MAX", DEFAULT_MAX_PENDING)?,
            concurrency: parse_or(&get, "CLIPDOCK_CONSUMER_THREADS", DEFAULT_CONCURRENCY)?,
            capacity_mode: parse_or(&get, "CLIPDOCK_CAPACITY_MODE", CapacityMode::default())?,
            media_dir: PathBuf::from(shellexpand::tilde(&media_dir).into_owned()),
            rpc_host: get("CLIPDOCK_RPC_HOST").unwrap_or_else(|| DEFAULT_RPC_HOST.to_string()),
            rpc_port: parse_or(&get, "CLIPDOCK_RPC_PORT", DEFAULT_RPC_PORT)?,
            admission_wait: Duration::from_millis(parse_or(
                &get,
                "CLIPDOCK_ADMISSION_WAIT_MS",
                DEFAULT_ADMISSION_WAIT.as_millis() as u64,
            )?),
            stream_idle_timeout: Duration::from_secs(parse_or(
                &get,
                "CLIPDOCK_STREAM_IDLE_SECS",
                DEFAULT_STREAM_IDLE_SECS,
            )?),
            collision_policy: parse_or(
                &get,
                "CLIPDOCK_COLLISION_POLICY",
                CollisionPolicy::default(),
            )?,
            log_format: get("CLIPDOCK_LOG_FORMAT").unwrap_or_else(|| DEFAULT_LOG_FORMAT.to_string()),
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key}={raw}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<DaemonConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.max_pending, 10);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.capacity_mode, CapacityMode::Pending);
        assert_eq!(config.rpc_port, 50051);
        assert_eq!(config.admission_wait, Duration::from_secs(5));
        assert_eq!(config.collision_policy, CollisionPolicy::Uniquify);
        assert!(config.media_dir.ends_with(".clipdock/media"));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("CLIPDOCK_Q_MAX", "3"),
            ("CLIPDOCK_CONSUMER_THREADS", " 2 "),
            ("CLIPDOCK_CAPACITY_MODE", "in-flight"),
            ("CLIPDOCK_MEDIA_DIR", "/srv/media"),
            ("CLIPDOCK_ADMISSION_WAIT_MS", "250"),
            ("CLIPDOCK_COLLISION_POLICY", "reject"),
            ("CLIPDOCK_LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.max_pending, 3);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.capacity_mode, CapacityMode::InFlight);
        assert_eq!(config.media_dir, PathBuf::from("/srv/media"));
        assert_eq!(config.admission_wait, Duration::from_millis(250));
        assert_eq!(config.collision_policy, CollisionPolicy::Reject);
        assert_eq!(config.log_format, "json");
    }

    #[test]
    fn test_empty_value_uses_default() {
        let config = config(&[("CLIPDOCK_Q_MAX", "")]).unwrap();
        assert_eq!(config.max_pending, 10);
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        let err = config(&[("CLIPDOCK_Q_MAX", "ten")]).unwrap_err();
        assert!(err.to_string().contains("CLIPDOCK_Q_MAX"));
        assert!(config(&[("CLIPDOCK_CAPACITY_MODE", "sometimes")]).is_err());
    }
}
