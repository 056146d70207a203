//! Conversion between Kubernetes quantity strings and canonical units
//!
//! CPU is handled in integer millicores and memory in integer bytes. Parsing
//! never fails: malformed input is logged and treated as zero so that a bad
//! manifest cannot abort admission processing.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::warn;

pub const CPU: &str = "cpu";
pub const MEMORY: &str = "memory";

const BYTES_PER_MB: f64 = 1_000_000.0;

static MEMORY_PATTERN: OnceLock<Regex> = OnceLock::new();

fn memory_pattern() -> &'static Regex {
    MEMORY_PATTERN.get_or_init(|| {
        Regex::new(r"^(\d*\.?\d+)([A-Za-z]*)$").expect("memory quantity pattern is valid")
    })
}

/// Parse a CPU quantity (`"250m"`, `"0.5"`, `"2"`) into millicores
pub fn parse_cpu(value: &str) -> u64 {
    let cleaned = value.trim();
    if cleaned.is_empty() {
        return 0;
    }

    if let Some(millis) = cleaned.strip_suffix('m') {
        // Fractional millicores are truncated
        return match millis.trim().parse::<f64>() {
            Ok(m) if m.is_finite() && m >= 0.0 => m.trunc() as u64,
            _ => {
                warn!(value = %value, "Invalid CPU value, treating as 0");
                0
            }
        };
    }

    match cleaned.parse::<f64>() {
        Ok(cores) if cores.is_finite() && cores >= 0.0 => (cores * 1000.0).round() as u64,
        _ => {
            warn!(value = %value, "Invalid CPU value, treating as 0");
            0
        }
    }
}

/// Format millicores as a CPU quantity string
pub fn format_cpu(millicores: u64) -> String {
    format!("{}m", millicores)
}

/// Parse a memory quantity (`"256Mi"`, `"1G"`, `"2048"`) into bytes
pub fn parse_memory(value: &str) -> u64 {
    let cleaned = value.trim();
    if cleaned.is_empty() {
        return 0;
    }

    if cleaned.bytes().all(|b| b.is_ascii_digit()) {
        return match cleaned.parse::<u64>() {
            Ok(bytes) => bytes,
            Err(_) => {
                warn!(value = %value, "Memory value out of range, treating as 0");
                0
            }
        };
    }

    let Some(captures) = memory_pattern().captures(cleaned) else {
        warn!(value = %value, "Invalid memory value, treating as 0");
        return 0;
    };

    let number: f64 = match captures[1].parse() {
        Ok(n) => n,
        Err(_) => {
            warn!(value = %value, "Invalid memory value, treating as 0");
            return 0;
        }
    };

    let multiplier = match &captures[2] {
        "" => 1.0,
        "K" => 1e3,
        "Ki" => 1024.0,
        "M" => 1e6,
        "Mi" => 1024.0 * 1024.0,
        "G" => 1e9,
        "Gi" => 1024.0 * 1024.0 * 1024.0,
        "T" => 1e12,
        "Ti" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        unit => {
            warn!(value = %value, unit = %unit, "Unknown memory unit, treating as bytes");
            1.0
        }
    };

    (number * multiplier).round() as u64
}

/// Format bytes as decimal megabytes (`"300M"`), whatever the input unit system
pub fn format_memory_mb(bytes: u64) -> String {
    format!("{}M", bytes_to_mb(bytes))
}

/// Bytes rounded to whole decimal megabytes
pub fn bytes_to_mb(bytes: u64) -> u64 {
    (bytes as f64 / BYTES_PER_MB).round() as u64
}

/// Convert a (possibly fractional) megabyte figure to bytes
pub fn mb_to_bytes(mb: f64) -> u64 {
    (mb * BYTES_PER_MB).round().max(0.0) as u64
}

/// CPU entry of a requests/limits map, in millicores
pub fn cpu_of(resources: Option<&BTreeMap<String, Quantity>>) -> u64 {
    resources
        .and_then(|r| r.get(CPU))
        .map(|q| parse_cpu(&q.0))
        .unwrap_or(0)
}

/// Memory entry of a requests/limits map, in bytes
pub fn memory_of(resources: Option<&BTreeMap<String, Quantity>>) -> u64 {
    resources
        .and_then(|r| r.get(MEMORY))
        .map(|q| parse_memory(&q.0))
        .unwrap_or(0)
}
