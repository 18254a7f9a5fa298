//! Marker stream metadata and samples

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type advertised by every marker stream
pub const MARKER_CONTENT_TYPE: &str = "Markers";

/// Nominal rate for streams without a fixed sampling rate
pub const IRREGULAR_RATE: f64 = 0.0;

/// Sample value format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelFormat {
    Int64,
}

/// Description of one marker stream, sent to each consumer on connect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub name: String,

    #[serde(rename = "type")]
    pub content_type: String,

    pub channel_count: u32,

    /// Declared samples per second; 0.0 means irregular
    pub nominal_srate: f64,

    pub channel_format: ChannelFormat,

    /// Unique per stream instance, never reused
    pub source_id: String,

    pub hostname: String,

    pub created_at: DateTime<Utc>,
}

impl StreamInfo {
    /// Single-channel integer marker stream with a fresh source id
    pub fn markers(name: impl Into<String>) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            name: name.into(),
            content_type: MARKER_CONTENT_TYPE.to_string(),
            channel_count: 1,
            nominal_srate: IRREGULAR_RATE,
            channel_format: ChannelFormat::Int64,
            source_id: uuid::Uuid::new_v4().to_string(),
            hostname,
            created_at: Utc::now(),
        }
    }
}

/// One marker sample: the frame index and when it was pushed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerSample {
    pub value: i64,

    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl MarkerSample {
    pub fn now(value: i64) -> Self {
        let now = Utc::now();
        Self {
            value,
            timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_info_metadata() {
        let info = StreamInfo::markers("Cam0_Stream");
        assert_eq!(info.name, "Cam0_Stream");
        assert_eq!(info.content_type, "Markers");
        assert_eq!(info.channel_count, 1);
        assert_eq!(info.nominal_srate, IRREGULAR_RATE);
        assert_eq!(info.channel_format, ChannelFormat::Int64);
    }

    #[test]
    fn test_source_ids_are_unique() {
        let a = StreamInfo::markers("Cam0_Stream");
        let b = StreamInfo::markers("Cam0_Stream");
        assert_ne!(a.source_id, b.source_id);
    }

    #[test]
    fn test_header_wire_format() {
        let info = StreamInfo::markers("Cam1_Stream");
        let json: serde_json::Value = serde_json::to_value(&info).unwrap();
        assert_eq!(json["type"], "Markers");
        assert_eq!(json["channelCount"], 1);
        assert_eq!(json["channelFormat"], "int64");
        assert!(json.get("sourceId").is_some());
    }
}
