use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MirrorConfig {
    pub version: u32,
    #[serde(default)]
    pub renderer: RendererSection,
    #[serde(default)]
    pub surface: SurfaceSection,
    #[serde(default)]
    pub source: SourceSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RendererSection {
    #[serde(default = "default_effect")]
    pub effect: String,
    #[serde(default)]
    pub frame_skip: Option<u32>,
    #[serde(default)]
    pub max_fps: Option<f32>,
    /// Cadence at which the driver calls `adjust_performance`; absent means never.
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub adjust_interval: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SurfaceSection {
    #[serde(default = "default_surface_width")]
    pub width: u32,
    #[serde(default = "default_surface_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceSection {
    #[serde(default = "default_source_width")]
    pub width: u32,
    #[serde(default = "default_source_height")]
    pub height: u32,
    #[serde(default = "default_source_fps")]
    pub fps: f32,
    #[serde(default)]
    pub image: Option<PathBuf>,
}

fn default_effect() -> String {
    "normal".to_string()
}

fn default_surface_width() -> u32 {
    720
}

fn default_surface_height() -> u32 {
    1280
}

fn default_source_width() -> u32 {
    640
}

fn default_source_height() -> u32 {
    480
}

fn default_source_fps() -> f32 {
    30.0
}

impl Default for RendererSection {
    fn default() -> Self {
        Self {
            effect: default_effect(),
            frame_skip: None,
            max_fps: None,
            adjust_interval: None,
        }
    }
}

impl Default for SurfaceSection {
    fn default() -> Self {
        Self {
            width: default_surface_width(),
            height: default_surface_height(),
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            width: default_source_width(),
            height: default_source_height(),
            fps: default_source_fps(),
            image: None,
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            version: 1,
            renderer: RendererSection::default(),
            surface: SurfaceSection::default(),
            source: SourceSection::default(),
        }
    }
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl MirrorConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: MirrorConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.renderer.effect.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "renderer.effect may not be empty".into(),
            ));
        }

        if self.renderer.frame_skip == Some(0) {
            return Err(ConfigError::Invalid(
                "renderer.frame_skip must be at least 1".into(),
            ));
        }

        if let Some(fps) = self.renderer.max_fps {
            validate_fps("renderer.max_fps", fps)?;
        }

        if let Some(interval) = self.renderer.adjust_interval {
            if interval.is_zero() {
                return Err(ConfigError::Invalid(
                    "renderer.adjust_interval must be greater than zero".into(),
                ));
            }
        }

        validate_size("surface", self.surface.width, self.surface.height)?;
        validate_size("source", self.source.width, self.source.height)?;
        validate_fps("source.fps", self.source.fps)?;

        if let Some(image) = &self.source.image {
            if image.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "source.image may not be an empty path".into(),
                ));
            }
        }

        Ok(())
    }
}

fn validate_size(section: &str, width: u32, height: u32) -> Result<(), ConfigError> {
    if width == 0 || height == 0 {
        return Err(ConfigError::Invalid(format!(
            "{section} size must be non-zero (got {width}x{height})"
        )));
    }
    Ok(())
}

fn validate_fps(field: &str, fps: f32) -> Result<(), ConfigError> {
    if !fps.is_finite() || fps <= 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{field} must be a positive number (got {fps})"
        )));
    }
    Ok(())
}
