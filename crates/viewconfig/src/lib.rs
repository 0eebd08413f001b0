use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ViewConfig {
    #[serde(default)]
    pub viewport: ViewportSection,
    #[serde(default)]
    pub camera: CameraSection,
    #[serde(default)]
    pub playback: PlaybackSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ViewportSection {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CameraSection {
    #[serde(default = "default_fov")]
    pub fov_degrees: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    #[serde(default = "default_distance")]
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlaybackSection {
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],
    /// Frames the `check` command drives after activation.
    #[serde(default = "default_frames")]
    pub frames: u32,
    /// Clock step between driven frames.
    #[serde(
        default = "default_frame_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub frame_interval: Duration,
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            fov_degrees: default_fov(),
            near: default_near(),
            far: default_far(),
            distance: default_distance(),
        }
    }
}

impl Default for PlaybackSection {
    fn default() -> Self {
        Self {
            clear_color: default_clear_color(),
            frames: default_frames(),
            frame_interval: default_frame_interval(),
        }
    }
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    600
}

fn default_fov() -> f32 {
    45.0
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    100.0
}

fn default_distance() -> f32 {
    5.0
}

fn default_clear_color() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn default_frames() -> u32 {
    3
}

fn default_frame_interval() -> Duration {
    Duration::from_millis(16)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration must be non-negative"))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl ViewConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ViewConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "viewport must be non-empty; got {}x{}",
                self.viewport.width, self.viewport.height
            )));
        }

        let camera = &self.camera;
        if !(camera.fov_degrees > 0.0 && camera.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "camera.fov_degrees must be between 0 and 180; got {}",
                camera.fov_degrees
            )));
        }

        if !(camera.near > 0.0 && camera.near < camera.far) {
            return Err(ConfigError::Invalid(format!(
                "camera clip planes must satisfy 0 < near < far; got near {} far {}",
                camera.near, camera.far
            )));
        }

        if !camera.far.is_finite() {
            return Err(ConfigError::Invalid("camera.far must be finite".into()));
        }

        if !(camera.distance > 0.0 && camera.distance.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "camera.distance must be greater than zero; got {}",
                camera.distance
            )));
        }

        for (index, component) in self.playback.clear_color.iter().enumerate() {
            if !(0.0..=1.0).contains(component) {
                return Err(ConfigError::Invalid(format!(
                    "playback.clear_color[{index}] must be within [0, 1]; got {component}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[viewport]
width = 1280
height = 720

[camera]
fov_degrees = 60.0
distance = 3.5

[playback]
clear_color = [0.1, 0.1, 0.12, 1.0]
frames = 10
frame_interval = "33ms"
"#;

    #[test]
    fn parses_sample_config() {
        let config = ViewConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.viewport.height, 720);
        assert_eq!(config.camera.fov_degrees, 60.0);
        assert_eq!(config.camera.near, 0.1);
        assert_eq!(config.camera.far, 100.0);
        assert_eq!(config.camera.distance, 3.5);
        assert_eq!(config.playback.frames, 10);
        assert_eq!(config.playback.frame_interval, Duration::from_millis(33));
    }

    #[test]
    fn empty_document_gives_defaults() {
        let config = ViewConfig::from_toml_str("").expect("parse config");
        assert_eq!(config, ViewConfig::default());
        assert_eq!(config.playback.frame_interval, Duration::from_millis(16));
        assert_eq!(config.playback.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn accepts_numeric_interval() {
        let config = ViewConfig::from_toml_str("[playback]\nframe_interval = 0.5\n")
            .expect("parse config");
        assert_eq!(config.playback.frame_interval, Duration::from_millis(500));
    }

    #[test]
    fn rejects_inverted_clip_planes() {
        let err = ViewConfig::from_toml_str("[camera]\nnear = 10.0\nfar = 1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_out_of_range_fov() {
        let err = ViewConfig::from_toml_str("[camera]\nfov_degrees = 180.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_viewport() {
        let err = ViewConfig::from_toml_str("[viewport]\nwidth = 0\n").unwrap_err();
        assert!(err.to_string().contains("viewport"));
    }

    #[test]
    fn rejects_clear_color_out_of_range() {
        let err =
            ViewConfig::from_toml_str("[playback]\nclear_color = [0.0, 2.0, 0.0, 1.0]\n").unwrap_err();
        assert!(err.to_string().contains("clear_color[1]"));
    }

    #[test]
    fn rejects_bad_duration() {
        let err = ViewConfig::from_toml_str("[playback]\nframe_interval = \"soon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn serializes_interval_as_human_readable() {
        let text = toml::to_string(&ViewConfig::default()).expect("serialize");
        assert!(text.contains("frame_interval = \"16ms\""), "{text}");
    }
}
