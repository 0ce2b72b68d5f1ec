//! Request-key (req_key) configuration and candidate resolution.
//!
//! The upstream API routes every job through a req_key selecting
//! model version x resolution x frame mode. Status queries must use the
//! exact key the task was submitted with, so the resolver produces an
//! ordered candidate list when the original key is uncertain.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 3.0pro keys, one per (resolution, frame mode).
const V30_720_FIRST: &str = "i2v_first_v30_jimeng";
const V30_720_FIRST_TAIL: &str = "i2v_first_tail_v30_jimeng";
const V30_1080_FIRST: &str = "i2v_first_v30_1080_jimeng";
const V30_1080_FIRST_TAIL: &str = "i2v_first_tail_v30_1080_jimeng";

/// 3.5pro supports only 1080p first-frame and shares the 1080p key.
const V35_PRO_FIXED: &str = V30_1080_FIRST;

/// Baseline 3.0pro keys in fixed resolution-major order.
const BASELINE_KEYS: [&str; 4] = [
    V30_720_FIRST,
    V30_720_FIRST_TAIL,
    V30_1080_FIRST,
    V30_1080_FIRST_TAIL,
];

/// Upstream routing key for one generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ReqKey(pub String);

impl ReqKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReqKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ReqKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ReqKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Generation model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum ModelVersion {
    #[serde(rename = "3.0pro")]
    V30Pro,
    #[serde(rename = "3.5pro")]
    #[default]
    V35Pro,
}

impl ModelVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVersion::V30Pro => "3.0pro",
            ModelVersion::V35Pro => "3.5pro",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "3.0pro" => Some(ModelVersion::V30Pro),
            "3.5pro" => Some(ModelVersion::V35Pro),
            _ => None,
        }
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output resolution class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum Resolution {
    #[serde(rename = "720p")]
    #[default]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::P720 => "720p",
            Resolution::P1080 => "1080p",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "720p" => Some(Resolution::P720),
            "1080p" => Some(Resolution::P1080),
            _ => None,
        }
    }

    /// 16:9 pixel dimensions for this class.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::P720 => (1280, 720),
            Resolution::P1080 => (1920, 1080),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Conditioning frame mode of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    /// First frame only (also used for text-only prompts)
    FirstFrame,
    /// First and last frame conditioning
    FirstLastFrame,
}

impl FrameMode {
    /// Derive the mode from the supplied conditioning images.
    pub fn from_frames(has_first: bool, has_last: bool) -> Self {
        if has_first && has_last {
            FrameMode::FirstLastFrame
        } else {
            FrameMode::FirstFrame
        }
    }
}

/// Immutable req_key configuration, injected wherever keys are resolved.
///
/// Holds the globally configured model version; the key tables themselves
/// are fixed upstream contracts.
#[derive(Debug, Clone, Copy)]
pub struct KeyConfig {
    pub version: ModelVersion,
}

impl KeyConfig {
    pub fn new(version: ModelVersion) -> Self {
        Self { version }
    }

    /// Resolve the req_key for a submission.
    ///
    /// 3.5pro only serves 1080p first-frame; every other combination falls
    /// back to the 3.0pro table.
    pub fn req_key(&self, resolution: Resolution, mode: FrameMode) -> ReqKey {
        let key = match (self.version, resolution, mode) {
            (ModelVersion::V35Pro, Resolution::P1080, FrameMode::FirstFrame) => V35_PRO_FIXED,
            (_, Resolution::P720, FrameMode::FirstFrame) => V30_720_FIRST,
            (_, Resolution::P720, FrameMode::FirstLastFrame) => V30_720_FIRST_TAIL,
            (_, Resolution::P1080, FrameMode::FirstFrame) => V30_1080_FIRST,
            (_, Resolution::P1080, FrameMode::FirstLastFrame) => V30_1080_FIRST_TAIL,
        };
        ReqKey::from(key)
    }

    /// Build the ordered, deduplicated candidate list for a status query.
    ///
    /// Order: the key stored on the record (known-correct), then the 3.5pro
    /// fixed key when that version is configured, then every baseline 3.0pro
    /// key in fixed order. Never empty, even without a record.
    pub fn candidates(&self, stored: Option<&ReqKey>) -> Vec<ReqKey> {
        let mut keys: Vec<ReqKey> = Vec::with_capacity(BASELINE_KEYS.len() + 1);

        if let Some(key) = stored {
            keys.push(key.clone());
        }

        if self.version == ModelVersion::V35Pro {
            push_unique(&mut keys, V35_PRO_FIXED);
        }

        for key in BASELINE_KEYS {
            push_unique(&mut keys, key);
        }

        keys
    }
}

fn push_unique(keys: &mut Vec<ReqKey>, key: &str) {
    if !keys.iter().any(|k| k.as_str() == key) {
        keys.push(ReqKey::from(key));
    }
}
