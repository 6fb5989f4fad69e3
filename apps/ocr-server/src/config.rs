//! Configuration management for the OCR server
//!
//! Everything is resolved once at startup from the environment (a `.env`
//! file is honoured) and is immutable afterwards.

use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ocr::PromptTable;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub storage: StorageConfig,
    pub image: ImageConfig,
    pub limits: LimitsConfig,
    pub prompts: PromptTable,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Hub identifier of the pretrained model
    pub name: String,
    /// Compute device the model is placed on
    pub device: Device,
    /// Base URL of the inference sidecar hosting the model
    pub engine_url: String,
    /// Start a background load as soon as the server boots
    pub preload: bool,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// Image sizing handed to the engine on every call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageConfig {
    pub base_size: u32,
    pub image_size: u32,
    pub crop_mode: bool,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Maximum staged file size in bytes
    pub max_file_size: u64,
    /// Lowercase extensions including the leading dot
    pub allowed_extensions: BTreeSet<String>,
}

impl LimitsConfig {
    /// Configured limit in megabytes, one decimal, as shown to clients
    pub fn max_file_size_mb(&self) -> String {
        format!("{:.1}MB", self.max_file_size as f64 / 1024.0 / 1024.0)
    }

    pub fn is_allowed(&self, extension: &str) -> bool {
        self.allowed_extensions.contains(&extension.to_ascii_lowercase())
    }
}

/// Compute device for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }

    /// Numeric precision used when placing the model on this device
    pub fn precision(&self) -> Precision {
        match self {
            Device::Cuda => Precision::BFloat16,
            Device::Cpu => Precision::Float32,
        }
    }

    /// `cuda` when `CUDA_VISIBLE_DEVICES` is present, `cpu` otherwise
    fn detect() -> Self {
        if env::var_os("CUDA_VISIBLE_DEVICES").is_some() {
            Device::Cuda
        } else {
            Device::Cpu
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    BFloat16,
    Float32,
}

pub const DEFAULT_MODEL_NAME: &str = "deepseek-ai/DeepSeek-OCR";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".pdf", ".webp"];

/// Errors raised while reading the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            model: ModelConfig {
                name: DEFAULT_MODEL_NAME.to_string(),
                device: Device::Cpu,
                engine_url: "http://127.0.0.1:8001".to_string(),
                preload: false,
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("/app/uploads"),
                output_dir: PathBuf::from("/app/outputs"),
            },
            image: ImageConfig {
                base_size: 1024,
                image_size: 640,
                crop_mode: true,
            },
            limits: LimitsConfig {
                max_file_size: DEFAULT_MAX_FILE_SIZE,
                allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            },
            prompts: PromptTable::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            model: ModelConfig {
                name: env::var("MODEL_NAME").unwrap_or(defaults.model.name),
                device: match env::var("DEVICE").ok().as_deref() {
                    Some("cuda") => Device::Cuda,
                    Some("cpu") => Device::Cpu,
                    Some(other) => {
                        return Err(ConfigError::InvalidValue {
                            name: "DEVICE",
                            value: other.to_string(),
                        })
                    }
                    None => Device::detect(),
                },
                engine_url: env::var("ENGINE_URL").unwrap_or(defaults.model.engine_url),
                preload: parse_var("PRELOAD_MODEL", defaults.model.preload)?,
            },
            storage: StorageConfig {
                upload_dir: env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.upload_dir),
                output_dir: env::var("OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.output_dir),
            },
            image: ImageConfig {
                base_size: parse_var("BASE_SIZE", defaults.image.base_size)?,
                image_size: parse_var("IMAGE_SIZE", defaults.image.image_size)?,
                crop_mode: parse_var("CROP_MODE", defaults.image.crop_mode)?,
            },
            limits: LimitsConfig {
                max_file_size: parse_var("MAX_FILE_SIZE", defaults.limits.max_file_size)?,
                allowed_extensions: match env::var("ALLOWED_EXTENSIONS") {
                    Ok(list) => parse_extensions(&list),
                    Err(_) => defaults.limits.allowed_extensions,
                },
            },
            prompts: defaults.prompts,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated extension list, normalising case and the leading dot
fn parse_extensions(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(|ext| ext.trim().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| if ext.starts_with('.') { ext } else { format!(".{}", ext) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_file_size_mb_has_one_decimal() {
        let limits = Config::default().limits;
        assert_eq!(limits.max_file_size_mb(), "10.0MB");
    }

    #[test]
    fn test_extension_check_ignores_case() {
        let limits = Config::default().limits;
        assert!(limits.is_allowed(".JPG"));
        assert!(limits.is_allowed(".webp"));
        assert!(!limits.is_allowed(".txt"));
    }

    #[test]
    fn test_parse_extensions() {
        let parsed = parse_extensions("PNG, .jpg ,,tiff");
        let expected: BTreeSet<String> =
            [".png", ".jpg", ".tiff"].iter().map(|s| s.to_string()).collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_device_precision() {
        assert_eq!(Device::Cuda.precision(), Precision::BFloat16);
        assert_eq!(Device::Cpu.precision(), Precision::Float32);
    }
}
