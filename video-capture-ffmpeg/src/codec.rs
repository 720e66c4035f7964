use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Video encoder settings passed to ffmpeg after `-c:v`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// libx264, `faster` preset, CRF 23.
    #[default]
    H264,
    /// libx265, `faster` preset, CRF 28.
    H265,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown video codec: {0:?}")]
pub struct UnknownCodec(pub String);

impl VideoCodec {
    /// Encoder name and its options, as separate arguments.
    pub fn encoder_args(&self) -> &'static [&'static str] {
        match self {
            Self::H264 => &["libx264", "-preset", "faster", "-crf", "23"],
            Self::H265 => &["libx265", "-preset", "faster", "-crf", "28"],
        }
    }

    /// Parse a user-facing name, falling back to H.264 for anything unknown.
    pub fn from_friendly_name(name: &str) -> Self {
        name.parse().unwrap_or_else(|err| {
            log::warn!("{}; using H.264", err);
            Self::H264
        })
    }
}

impl FromStr for VideoCodec {
    type Err = UnknownCodec;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h.264" | "h264" | "avc" | "libx264" => Ok(Self::H264),
            "h.265" | "h265" | "hevc" | "libx265" => Ok(Self::H265),
            _ => Err(UnknownCodec(s.to_string())),
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "H.264"),
            Self::H265 => write!(f, "H.265"),
        }
    }
}
