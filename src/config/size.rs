//! Human-readable byte sizes for configuration fields (e.g. "512MB", "1GB").

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Error parsing a size string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid size '{input}' - expected format like '2GB', '500MB', or '1024KB'")]
pub struct SizeParseError {
    input: String,
}

impl SizeParseError {
    fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// A byte count that parses from and formats to human-readable strings.
///
/// Accepts bare numbers (bytes) and the binary suffixes KB/K, MB/M, GB/G,
/// case-insensitive, whitespace tolerant. TOML values may be either an
/// integer (bytes) or a suffixed string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Size(pub u64);

impl Size {
    pub const fn bytes(self) -> u64 {
        self.0
    }

    pub const fn from_mb(mb: u64) -> Self {
        Self(mb * 1024 * 1024)
    }

    pub const fn from_gb(gb: u64) -> Self {
        Self(gb * 1024 * 1024 * 1024)
    }
}

/// Parse a human-readable size string into bytes.
fn parse_size(s: &str) -> Result<u64, SizeParseError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(SizeParseError::new(s));
    }

    let upper = trimmed.to_uppercase();
    let (digits, multiplier) = if let Some(rest) = strip_suffix(&upper, trimmed, &["GB", "G"]) {
        (rest, 1024u64 * 1024 * 1024)
    } else if let Some(rest) = strip_suffix(&upper, trimmed, &["MB", "M"]) {
        (rest, 1024u64 * 1024)
    } else if let Some(rest) = strip_suffix(&upper, trimmed, &["KB", "K"]) {
        (rest, 1024u64)
    } else {
        (trimmed, 1u64)
    };

    let num: u64 = digits
        .trim()
        .parse()
        .map_err(|_| SizeParseError::new(s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| SizeParseError::new(s))
}

/// Strips the first matching suffix, returning the numeric part of the
/// original (non-uppercased) string.
fn strip_suffix<'a>(upper: &str, original: &'a str, suffixes: &[&str]) -> Option<&'a str> {
    for suffix in suffixes {
        if upper.ends_with(suffix) {
            return Some(&original[..original.len() - suffix.len()]);
        }
    }
    None
}

/// Format a byte count using the largest evenly-dividing suffix.
fn format_size(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;
    const KB: u64 = 1024;

    if bytes >= GB && bytes % GB == 0 {
        format!("{}GB", bytes / GB)
    } else if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{bytes}")
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_size(self.0))
    }
}

impl FromStr for Size {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_size(s).map(Size)
    }
}

impl Serialize for Size {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Size {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SizeVisitor;

        impl de::Visitor<'_> for SizeVisitor {
            type Value = Size;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte count or a string like \"512MB\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Size, E> {
                Ok(Size(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Size, E> {
                u64::try_from(v)
                    .map(Size)
                    .map_err(|_| E::custom("size must be non-negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Size, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(SizeVisitor)
    }
}
