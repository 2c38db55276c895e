//! Process information reported by the health check

use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Instant;

use crate::infrastructure::config::RuntimeMode;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Keys a caller can never override when merging custom data
const RESERVED_KEYS: [&str; 5] = ["version", "environment", "uptime", "server", "memory"];

#[derive(Debug, Clone, Serialize)]
pub struct ServerMetadata {
    pub version: String,
    pub environment: String,
    /// Seconds since startup
    pub uptime: f64,
    pub server: PlatformInfo,
    /// Absent where the platform does not expose it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryUsage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    pub rust_version: String,
    pub platform: String,
    pub arch: String,
}

/// Resident memory against system memory, in megabytes rounded to two places
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub used: f64,
    pub total: f64,
    pub percentage: u64,
}

impl ServerMetadata {
    pub async fn collect(mode: RuntimeMode, started_at: Instant) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: mode.to_string(),
            uptime: started_at.elapsed().as_secs_f64(),
            server: PlatformInfo {
                rust_version: option_env!("CARGO_PKG_RUST_VERSION")
                    .filter(|version| !version.is_empty())
                    .unwrap_or("unknown")
                    .to_string(),
                platform: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
            },
            memory: memory_usage().await,
        }
    }

    /// Server fields first, then `status`/`service` and any other custom keys.
    /// Custom data can never replace the server fields.
    pub fn merge(&self, custom: Option<Value>) -> Value {
        let mut merged = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        if let Some(Value::Object(custom)) = custom {
            for (key, value) in custom {
                if RESERVED_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let value = match (key.as_str(), value) {
                    ("status" | "service", Value::String(text)) => Value::String(text),
                    ("status" | "service", other) => Value::String(other.to_string()),
                    (_, other) => other,
                };
                merged.insert(key, value);
            }
        }

        Value::Object(merged)
    }
}

fn round_mb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0
}

/// Value of a `Key:   1234 kB` line in a procfs file, in bytes
fn procfs_kb(contents: &str, key: &str) -> Option<u64> {
    contents
        .lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix(':'))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

fn usage_from_procfs(status: &str, meminfo: &str) -> Option<MemoryUsage> {
    let used = procfs_kb(status, "VmRSS")?;
    let total = procfs_kb(meminfo, "MemTotal")?.max(1);

    Some(MemoryUsage {
        used: round_mb(used),
        total: round_mb(total),
        percentage: (used as f64 / total as f64 * 100.0).round() as u64,
    })
}

async fn memory_usage() -> Option<MemoryUsage> {
    let status = tokio::fs::read_to_string("/proc/self/status").await.ok()?;
    let meminfo = tokio::fs::read_to_string("/proc/meminfo").await.ok()?;
    usage_from_procfs(&status, &meminfo)
}
