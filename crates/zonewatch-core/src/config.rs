//! Stream configuration and build parameters.
//!
//! Stream configuration is a JSON object keyed by stream index:
//!
//! ```json
//! {
//!   "0": {
//!     "uri": "rtsp://camera-1/stream",
//!     "restricted_zones": [[[[100, 100], [500, 100]], [[500, 100], [500, 400]], [[500, 400], [100, 400]]]],
//!     "confidence": 0.6
//!   }
//! }
//! ```
//!
//! Keys must be exactly `"0"` through `"N-1"`. Configuration is validated
//! once and is read-only afterwards.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::geometry::Zone;

/// Confidence threshold used when a stream does not set one
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Batcher output resolution
pub const MUXER_WIDTH: u32 = 1920;
pub const MUXER_HEIGHT: u32 = 1080;

/// How long the batcher waits to fill a batch (microseconds)
pub const BATCHED_PUSH_TIMEOUT_US: u32 = 40_000;

/// URI schemes that mark a stream as live
pub const LIVE_SCHEMES: &[&str] = &["rtsp", "rtsps", "http", "https"];

/// Default inference configuration file
pub const DEFAULT_MODEL_CONFIG: &str = "configs/model_config.txt";

/// Default composited output size
pub const DEFAULT_TILED_WIDTH: u32 = 1280;
pub const DEFAULT_TILED_HEIGHT: u32 = 720;

/// Time one probe call may take before a warning is logged
pub const DEFAULT_PROBE_BUDGET: Duration = Duration::from_millis(5);

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

/// Stream entry as it appears in the configuration file
#[derive(Debug, Deserialize)]
struct RawStream {
    uri: String,
    #[serde(default)]
    restricted_zones: Vec<Zone>,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

/// Validated configuration of one input stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamConfig {
    pub id: u32,
    pub uri: String,
    pub restricted_zones: Vec<Zone>,
    pub confidence_threshold: f32,
}

impl StreamConfig {
    pub fn new(id: u32, uri: impl Into<String>) -> Self {
        Self {
            id,
            uri: uri.into(),
            restricted_zones: Vec::new(),
            confidence_threshold: DEFAULT_CONFIDENCE,
        }
    }

    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.restricted_zones.push(zone);
        self
    }

    pub fn with_confidence(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Whether the URI points at a network stream
    pub fn is_live(&self) -> bool {
        self.uri
            .split_once("://")
            .is_some_and(|(scheme, _)| {
                LIVE_SCHEMES
                    .iter()
                    .any(|live| scheme.eq_ignore_ascii_case(live))
            })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.uri.trim().is_empty() {
            return Err(ConfigError::EmptyUri(self.id));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::InvalidConfidence {
                stream: self.id,
                value: self.confidence_threshold,
            });
        }
        if let Some(zone) = self
            .restricted_zones
            .iter()
            .position(|z| z.segments().is_empty())
        {
            return Err(ConfigError::EmptyZone {
                stream: self.id,
                zone,
            });
        }
        Ok(())
    }
}

/// All configured streams, ordered by id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    pub streams: Vec<StreamConfig>,
}

impl AppConfig {
    /// Validate a set of streams. Ids must run from 0 without gaps.
    pub fn new(mut streams: Vec<StreamConfig>) -> Result<Self, ConfigError> {
        if streams.is_empty() {
            return Err(ConfigError::NoStreams);
        }
        streams.sort_by_key(|s| s.id);
        for (expected, stream) in (0u32..).zip(&streams) {
            if stream.id != expected {
                return Err(ConfigError::MissingStream(expected));
            }
            stream.validate()?;
        }
        Ok(Self { streams })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: BTreeMap<String, RawStream> = serde_json::from_str(json)?;

        let streams = raw
            .into_iter()
            .map(|(key, stream)| {
                let id = parse_stream_key(&key)?;
                Ok(StreamConfig {
                    id,
                    uri: stream.uri,
                    restricted_zones: stream.restricted_zones,
                    confidence_threshold: stream.confidence,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let config = Self::new(streams)?;
        debug!(streams = config.streams.len(), "configuration loaded");
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// True if any stream is live
    pub fn has_live_source(&self) -> bool {
        self.streams.iter().any(StreamConfig::is_live)
    }
}

/// Keys are canonical decimal indices: "0", "1", ... (no sign, no padding).
fn parse_stream_key(key: &str) -> Result<u32, ConfigError> {
    key.parse::<u32>()
        .ok()
        .filter(|id| id.to_string() == key)
        .ok_or_else(|| ConfigError::InvalidKey(key.to_string()))
}

/// Target hardware family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Platform {
    /// Integrated ARM boards; rendering needs an extra transform stage
    Aarch64,
    Other,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(target_arch = "aarch64") {
            Self::Aarch64
        } else {
            Self::Other
        }
    }

    pub fn needs_egl_transform(self) -> bool {
        self == Self::Aarch64
    }
}

/// Parameters of the graph that do not vary per stream
#[derive(Debug, Clone, PartialEq)]
pub struct BuildParams {
    /// Protocol adapter library loaded by the publisher
    pub proto_lib: String,
    /// Broker connection string
    pub conn_str: String,
    /// Event payload schema selector
    pub payload_type: u32,
    pub topic: Option<String>,
    /// Optional converter configuration file
    pub msgconv_config: Option<String>,
    /// Inference configuration file
    pub model_config_path: String,
    pub tiled_width: u32,
    pub tiled_height: u32,
    pub platform: Platform,
    pub probe_budget: Duration,
}

impl BuildParams {
    pub fn new(proto_lib: impl Into<String>, conn_str: impl Into<String>) -> Self {
        Self {
            proto_lib: proto_lib.into(),
            conn_str: conn_str.into(),
            payload_type: 0,
            topic: None,
            msgconv_config: None,
            model_config_path: DEFAULT_MODEL_CONFIG.to_string(),
            tiled_width: DEFAULT_TILED_WIDTH,
            tiled_height: DEFAULT_TILED_HEIGHT,
            platform: Platform::detect(),
            probe_budget: DEFAULT_PROBE_BUDGET,
        }
    }

    pub fn with_payload_type(mut self, payload_type: u32) -> Self {
        self.payload_type = payload_type;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_msgconv_config(mut self, path: impl Into<String>) -> Self {
        self.msgconv_config = Some(path.into());
        self
    }

    pub fn with_model_config(mut self, path: impl Into<String>) -> Self {
        self.model_config_path = path.into();
        self
    }

    pub fn with_tiled_size(mut self, width: u32, height: u32) -> Self {
        self.tiled_width = width;
        self.tiled_height = height;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_probe_budget(mut self, budget: Duration) -> Self {
        self.probe_budget = budget;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use std::io::Write;

    const TWO_STREAMS: &str = r#"{
        "1": {"uri": "file:///videos/b.mp4"},
        "0": {
            "uri": "rtsp://camera/stream",
            "restricted_zones": [[[[0, 0], [10, 0]], [[10, 0], [10, 10]], [[10, 10], [0, 10]]]],
            "confidence": 0.7
        }
    }"#;

    #[test]
    fn test_from_json_orders_and_defaults() {
        let config = AppConfig::from_json(TWO_STREAMS).unwrap();
        assert_eq!(config.streams.len(), 2);

        let first = &config.streams[0];
        assert_eq!(first.id, 0);
        assert_eq!(first.confidence_threshold, 0.7);
        assert_eq!(first.restricted_zones.len(), 1);
        assert!(first.restricted_zones[0].contains(Point::new(7.0, 2.0)));

        let second = &config.streams[1];
        assert_eq!(second.confidence_threshold, DEFAULT_CONFIDENCE);
        assert!(second.restricted_zones.is_empty());
    }

    #[test]
    fn test_keys_must_be_contiguous() {
        let err = AppConfig::from_json(r#"{"0": {"uri": "a://b"}, "2": {"uri": "a://c"}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingStream(1)));
    }

    #[test]
    fn test_keys_must_be_canonical_indices() {
        for key in ["01", "cam", "-1", "+0"] {
            let json = format!(r#"{{"{key}": {{"uri": "file:///a.mp4"}}}}"#);
            let err = AppConfig::from_json(&json).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidKey(_)), "key {key}");
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            AppConfig::from_json("{}").unwrap_err(),
            ConfigError::NoStreams
        ));
        assert!(matches!(
            AppConfig::from_json(r#"{"0": {"uri": " "}}"#).unwrap_err(),
            ConfigError::EmptyUri(0)
        ));
        assert!(matches!(
            AppConfig::from_json(r#"{"0": {"uri": "file:///a", "confidence": 1.5}}"#).unwrap_err(),
            ConfigError::InvalidConfidence { stream: 0, .. }
        ));
        assert!(matches!(
            AppConfig::from_json(r#"{"0": {"uri": "file:///a", "restricted_zones": [[]]}}"#)
                .unwrap_err(),
            ConfigError::EmptyZone { stream: 0, zone: 0 }
        ));
        assert!(matches!(
            AppConfig::from_json("not json").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn test_live_detection() {
        assert!(StreamConfig::new(0, "rtsp://cam/1").is_live());
        assert!(StreamConfig::new(0, "RTSPS://cam/1").is_live());
        assert!(StreamConfig::new(0, "https://host/live.m3u8").is_live());
        assert!(!StreamConfig::new(0, "file:///videos/rtsp.mp4").is_live());
        assert!(!StreamConfig::new(0, "/videos/a.mp4").is_live());

        let config = AppConfig::from_json(TWO_STREAMS).unwrap();
        assert!(config.has_live_source());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TWO_STREAMS.as_bytes()).unwrap();

        let config = AppConfig::from_path(file.path()).unwrap();
        assert_eq!(config.streams[1].uri, "file:///videos/b.mp4");

        let missing = AppConfig::from_path(file.path().with_extension("missing"));
        assert!(matches!(missing.unwrap_err(), ConfigError::Io(_)));
    }

    #[test]
    fn test_build_params_defaults() {
        let params = BuildParams::new("/opt/lib/libproto.so", "localhost;9092");
        assert_eq!(params.payload_type, 0);
        assert_eq!(params.topic, None);
        assert_eq!(params.model_config_path, DEFAULT_MODEL_CONFIG);
        assert_eq!((params.tiled_width, params.tiled_height), (1280, 720));
        assert_eq!(params.probe_budget, Duration::from_millis(5));
    }
}
