//! Configuration defaults and settings for the sync engine.

use serde::{Deserialize, Serialize};

/// Version of the settings layout below; bumped when fields change meaning.
pub const SETTINGS_SCHEMA_VERSION: u32 = 1;

/// Motion samples per moving entity when neither it nor its owner overrides the count.
pub const DEFAULT_MOTION_SEGMENTS: u32 = 2;

/// Default shutter angle in degrees (half a frame of exposure).
pub const DEFAULT_SHUTTER_ANGLE: f32 = 180.0;

/// Scale applied to the squared host crease weight to get renderer sharpness.
pub const CREASE_SHARPNESS_SCALE: f32 = 10.0;

/// Sub-frame offsets closer than this are treated as the same scene time.
pub const MOTION_OFFSET_EPSILON: f32 = 1e-6;

/// Face count above which face normals are computed with rayon.
pub const PARALLEL_NORMALS_THRESHOLD: usize = 4096;

/// Where the shutter interval sits relative to the nominal frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutterTiming {
    #[default]
    Center,
    Pre,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    pub enabled: bool,
    pub shutter_angle: f32,
    pub shutter_timing: ShutterTiming,
    pub segments: u32,
    /// Sample deforming geometry in addition to transforms.
    pub deformation: bool,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            shutter_angle: DEFAULT_SHUTTER_ANGLE,
            shutter_timing: ShutterTiming::Center,
            segments: DEFAULT_MOTION_SEGMENTS,
            deformation: true,
        }
    }
}

impl MotionSettings {
    pub fn with_timing(mut self, timing: ShutterTiming) -> Self {
        self.shutter_timing = timing;
        self
    }

    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }
}

/// Per-session settings for [`crate::sync::SyncContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub schema_version: u32,
    pub motion: MotionSettings,
    /// Host acceleration mode that reports one data name for distinct
    /// meshes; when set, mesh prototypes are keyed by their owning object.
    pub share_data_workaround: bool,
    /// Force smooth (face-varying) normals for every mesh.
    pub smooth_normals: bool,
    pub export_tangents: bool,
    /// Use rayon for per-face data on large meshes.
    pub parallel: bool,
    /// Log a warning when one pass takes longer than this.
    pub pass_budget_ms: Option<f32>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            schema_version: SETTINGS_SCHEMA_VERSION,
            motion: MotionSettings::default(),
            share_data_workaround: false,
            smooth_normals: false,
            export_tangents: false,
            parallel: cfg!(feature = "parallel"),
            pass_budget_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fill_defaults() {
        let json = r#"{ "motion": { "enabled": true, "shutter_timing": "pre" } }"#;
        let settings: SyncSettings = serde_json::from_str(json).unwrap();
        assert!(settings.motion.enabled);
        assert_eq!(settings.motion.shutter_timing, ShutterTiming::Pre);
        assert_eq!(settings.motion.segments, DEFAULT_MOTION_SEGMENTS);
        assert_eq!(settings.schema_version, SETTINGS_SCHEMA_VERSION);
        assert!(!settings.share_data_workaround);
    }
}
