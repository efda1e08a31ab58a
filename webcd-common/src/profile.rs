//! Stream quality/robustness profile
//!
//! The profile is process-wide and read once at the start of every stream. Updates
//! go through [`StreamProfile::apply_update`], which applies each recognized field
//! independently and drops anything it does not accept.

use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Encoder bitrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bitrate {
    #[serde(rename = "32k")]
    K32,
    #[serde(rename = "64k")]
    K64,
    #[serde(rename = "96k")]
    K96,
    #[serde(rename = "128k")]
    K128,
    #[serde(rename = "192k")]
    K192,
    #[serde(rename = "256k")]
    K256,
    #[serde(rename = "320k")]
    K320,
}

impl Bitrate {
    pub const ALL: [Bitrate; 7] = [
        Bitrate::K32,
        Bitrate::K64,
        Bitrate::K96,
        Bitrate::K128,
        Bitrate::K192,
        Bitrate::K256,
        Bitrate::K320,
    ];

    pub fn kbps(self) -> u32 {
        match self {
            Bitrate::K32 => 32,
            Bitrate::K64 => 64,
            Bitrate::K96 => 96,
            Bitrate::K128 => 128,
            Bitrate::K192 => 192,
            Bitrate::K256 => 256,
            Bitrate::K320 => 320,
        }
    }

    /// Encoder argument form, e.g. `"192k"`
    pub fn as_arg(self) -> String {
        format!("{}k", self.kbps())
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k", self.kbps())
    }
}

impl FromStr for Bitrate {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bitrate::ALL
            .into_iter()
            .find(|b| b.as_arg() == s)
            .ok_or(())
    }
}

/// Encoder rate-control buffer size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferSize {
    #[serde(rename = "64k")]
    K64,
    #[serde(rename = "128k")]
    K128,
    #[serde(rename = "256k")]
    K256,
    #[serde(rename = "512k")]
    K512,
    #[serde(rename = "1024k")]
    K1024,
}

impl BufferSize {
    pub const ALL: [BufferSize; 5] = [
        BufferSize::K64,
        BufferSize::K128,
        BufferSize::K256,
        BufferSize::K512,
        BufferSize::K1024,
    ];

    pub fn kilobytes(self) -> u32 {
        match self {
            BufferSize::K64 => 64,
            BufferSize::K128 => 128,
            BufferSize::K256 => 256,
            BufferSize::K512 => 512,
            BufferSize::K1024 => 1024,
        }
    }

    pub fn as_arg(self) -> String {
        format!("{}k", self.kilobytes())
    }
}

impl fmt::Display for BufferSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k", self.kilobytes())
    }
}

impl FromStr for BufferSize {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BufferSize::ALL
            .into_iter()
            .find(|b| b.as_arg() == s)
            .ok_or(())
    }
}

/// Read tolerance profile for audio extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobustnessMode {
    /// Aggressive skip tolerance, no error correction
    Fast,
    /// Moderate skip tolerance
    Normal,
    /// Full error correction
    Paranoid,
}

impl FromStr for RobustnessMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(RobustnessMode::Fast),
            "normal" => Ok(RobustnessMode::Normal),
            "paranoid" => Ok(RobustnessMode::Paranoid),
            _ => Err(()),
        }
    }
}

impl fmt::Display for RobustnessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RobustnessMode::Fast => "fast",
            RobustnessMode::Normal => "normal",
            RobustnessMode::Paranoid => "paranoid",
        };
        f.write_str(name)
    }
}

/// Maximum prebuffer length
pub const MAX_PRELOAD_SECONDS: u8 = 10;

/// Stream quality/robustness settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProfile {
    pub bitrate: Bitrate,
    pub buffer_size: BufferSize,
    pub robustness_mode: RobustnessMode,
    pub preload_seconds: u8,
}

impl Default for StreamProfile {
    fn default() -> Self {
        Self {
            bitrate: Bitrate::K192,
            buffer_size: BufferSize::K256,
            robustness_mode: RobustnessMode::Fast,
            preload_seconds: 1,
        }
    }
}

impl StreamProfile {
    /// Encoded bytes to hold back before the first chunk is released
    pub fn preload_bytes(&self) -> usize {
        self.preload_seconds as usize * self.bitrate.kbps() as usize * 125
    }

    /// Apply a partial update field by field
    ///
    /// Recognized keys: `bitrate`, `buffer_size`, `robustness_mode` (alias
    /// `paranoia_mode`), `preload_seconds`. Each accepted field is written; every
    /// other field is left untouched and reported in the returned list.
    pub fn apply_update(&mut self, update: &Map<String, Value>) -> Vec<Error> {
        let mut rejected = Vec::new();

        for (field, value) in update {
            let accepted = match field.as_str() {
                "bitrate" => value
                    .as_str()
                    .and_then(|s| s.parse::<Bitrate>().ok())
                    .map(|b| self.bitrate = b)
                    .is_some(),
                "buffer_size" => value
                    .as_str()
                    .and_then(|s| s.parse::<BufferSize>().ok())
                    .map(|b| self.buffer_size = b)
                    .is_some(),
                "robustness_mode" | "paranoia_mode" => value
                    .as_str()
                    .and_then(|s| s.parse::<RobustnessMode>().ok())
                    .map(|m| self.robustness_mode = m)
                    .is_some(),
                "preload_seconds" => parse_preload(value)
                    .map(|p| self.preload_seconds = p)
                    .is_some(),
                _ => false,
            };

            if !accepted {
                warn!(field = %field, value = %value, "Ignoring rejected stream setting");
                rejected.push(Error::ConfigValueRejected {
                    field: field.clone(),
                    value: value.to_string(),
                });
            }
        }

        rejected
    }
}

fn parse_preload(value: &Value) -> Option<u8> {
    let seconds = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;

    if (0..=MAX_PRELOAD_SECONDS as i64).contains(&seconds) {
        Some(seconds as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults() {
        let profile = StreamProfile::default();
        assert_eq!(profile.bitrate, Bitrate::K192);
        assert_eq!(profile.buffer_size, BufferSize::K256);
        assert_eq!(profile.robustness_mode, RobustnessMode::Fast);
        assert_eq!(profile.preload_seconds, 1);
    }

    #[test]
    fn test_unsupported_bitrate_keeps_previous() {
        let mut profile = StreamProfile::default();
        profile.apply_update(&update(json!({"bitrate": "320k"})));
        assert_eq!(profile.bitrate, Bitrate::K320);

        let rejected = profile.apply_update(&update(json!({"bitrate": "200k"})));
        assert_eq!(profile.bitrate, Bitrate::K320);
        assert_eq!(rejected.len(), 1);
        assert!(matches!(
            &rejected[0],
            Error::ConfigValueRejected { field, .. } if field == "bitrate"
        ));
    }

    #[test]
    fn test_partial_update_applies_valid_fields() {
        let mut profile = StreamProfile::default();
        let rejected = profile.apply_update(&update(json!({
            "bitrate": "bogus",
            "buffer_size": "1024k",
            "paranoia_mode": "paranoid",
            "preload_seconds": 11,
            "volume": 3
        })));

        assert_eq!(profile.bitrate, Bitrate::K192);
        assert_eq!(profile.buffer_size, BufferSize::K1024);
        assert_eq!(profile.robustness_mode, RobustnessMode::Paranoid);
        assert_eq!(profile.preload_seconds, 1);
        assert_eq!(rejected.len(), 3);
    }

    #[test]
    fn test_preload_forms() {
        assert_eq!(parse_preload(&json!(0)), Some(0));
        assert_eq!(parse_preload(&json!(10)), Some(10));
        assert_eq!(parse_preload(&json!("4")), Some(4));
        assert_eq!(parse_preload(&json!(3.0)), Some(3));
        assert_eq!(parse_preload(&json!(2.5)), None);
        assert_eq!(parse_preload(&json!(-1)), None);
        assert_eq!(parse_preload(&json!("ten")), None);
        assert_eq!(parse_preload(&json!(null)), None);
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(StreamProfile::default()).unwrap();
        assert_eq!(
            value,
            json!({
                "bitrate": "192k",
                "buffer_size": "256k",
                "robustness_mode": "fast",
                "preload_seconds": 1
            })
        );
    }

    #[test]
    fn test_preload_bytes() {
        let profile = StreamProfile {
            preload_seconds: 2,
            bitrate: Bitrate::K128,
            ..Default::default()
        };
        assert_eq!(profile.preload_bytes(), 32_000);
    }
}
