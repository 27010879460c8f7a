use rollcall_core::{EngineConfig, PrimaryFacePolicy};
use serde::Deserialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV: &str = "ROLLCALL_CONFIG";

const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
const RECOGNIZER_MODEL_FILE: &str = "dlib_face_recognition_resnet_model_v1.onnx";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// CLI configuration: defaults, then an optional TOML file, then `ROLLCALL_*` variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Root of the photo archive.
    pub photo_dir: PathBuf,
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = rollcall_core::default_data_dir();
        Self {
            model_dir: rollcall_core::default_model_dir(),
            db_path: data_dir.join("rollcall.db"),
            photo_dir: data_dir.join("photos"),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Load from `explicit` (or `$ROLLCALL_CONFIG`) and the process environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    fn load_with(explicit: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let file = explicit.map(Path::to_path_buf).or_else(|| env(CONFIG_ENV).map(PathBuf::from));

        let mut config = match &file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(&env)?;
        config.validate()?;

        tracing::debug!(file = ?file, db_path = %config.db_path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse a TOML file; keys it leaves out keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(dir) = env("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(path) = env("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(dir) = env("ROLLCALL_PHOTO_DIR") {
            self.photo_dir = PathBuf::from(dir);
        }
        if let Some(threshold) = parse_env::<f32>(env, "ROLLCALL_MATCH_THRESHOLD")? {
            self.engine.match_threshold = threshold;
        }
        if let Some(policy) = parse_env::<PrimaryFacePolicy>(env, "ROLLCALL_PRIMARY_FACE")? {
            self.engine.primary_face = policy;
        }
        if let Some(limit) = parse_env::<usize>(env, "ROLLCALL_MAX_PHOTO_BYTES")? {
            self.engine.max_photo_bytes = limit;
        }
        if let Some(value) = env("ROLLCALL_ARCHIVE_CLASS_PHOTOS") {
            self.engine.archive_class_photos = parse_flag("ROLLCALL_ARCHIVE_CLASS_PHOTOS", &value)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.engine.match_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "match_threshold",
                value: threshold.to_string(),
                reason: "must be a positive distance".into(),
            });
        }
        if self.engine.max_photo_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_photo_bytes",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ResNet signature model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join(RECOGNIZER_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    env(key)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key,
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}
