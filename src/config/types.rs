use serde::{Deserialize, Serialize};

/// Top-level gateway configuration: the two admission-control knobs the
/// reactor enforces, plus nothing else — coalescing, retry, and streaming
/// behavior are all supplied per-call, not configured globally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Ceiling on the number of transfers in the active set at once.
    #[serde(default = "default_max_in_flight_count")]
    pub max_in_flight_count: u64,

    /// Ceiling, in bytes, on `allocated_bytes + output_bytes` combined —
    /// admitted-but-unfinished transfers plus buffers callers still hold.
    #[serde(
        default = "default_max_simultaneous_downloads_size",
        deserialize_with = "deserialize_byte_size",
        serialize_with = "serialize_byte_size"
    )]
    pub max_simultaneous_downloads_size: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_in_flight_count: default_max_in_flight_count(),
            max_simultaneous_downloads_size: default_max_simultaneous_downloads_size(),
        }
    }
}

fn default_max_in_flight_count() -> u64 {
    1024
}

fn default_max_simultaneous_downloads_size() -> u64 {
    8 * 1024 * 1024 * 1024
}

/// Accepts either a plain byte count (`8589934592`) or a human size string
/// (`"8GiB"`, `"512 MB"`) so config files can stay readable.
fn deserialize_byte_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => parse_byte_size(&s).map_err(serde::de::Error::custom),
    }
}

fn serialize_byte_size<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(*value)
}

pub(crate) fn parse_byte_size(text: &str) -> Result<u64, String> {
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<u64>() {
        return Ok(n);
    }
    humanize_bytes::parse(trimmed).ok_or_else(|| format!("invalid byte size: {trimmed}"))
}

/// Minimal binary/decimal byte-unit parser (KiB/MiB/GiB/TiB, KB/MB/GB/TB),
/// used only for the one config field that accepts human-readable sizes.
mod humanize_bytes {
    pub fn parse(s: &str) -> Option<u64> {
        let s = s.trim();
        let split_at = s.find(|c: char| !c.is_ascii_digit() && c != '.')?;
        let (number, unit) = s.split_at(split_at);
        let number: f64 = number.parse().ok()?;
        let unit = unit.trim().to_ascii_lowercase();
        let multiplier: u64 = match unit.as_str() {
            "b" | "" => 1,
            "kb" => 1_000,
            "kib" => 1 << 10,
            "mb" => 1_000_000,
            "mib" => 1 << 20,
            "gb" => 1_000_000_000,
            "gib" => 1 << 30,
            "tb" => 1_000_000_000_000,
            "tib" => 1 << 40,
            _ => return None,
        };
        Some((number * multiplier as f64) as u64)
    }
}
