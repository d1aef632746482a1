//! Application Configuration
//!
//! Scan settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::analysis::ExtractionProfile;
use crate::vision::ocr_space::DEFAULT_ENDPOINT;
use crate::vision::preprocess::{DEFAULT_MAX_BYTES, DEFAULT_MAX_SIDE};
use crate::vision::{EngineId, OutputFormat, PrepareOptions, RecognitionOptions, RetryPolicy};

/// Environment variable that overrides `ocr.api_key`
pub const API_KEY_ENV: &str = "OCR_SPACE_API_KEY";

const CONFIG_FILE: &str = "config.toml";

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Recognition service settings
    pub ocr: OcrConfig,
    /// Retry and engine fallback settings
    pub retry: RetryConfig,
    /// Upload budget settings
    pub preprocess: PreprocessConfig,
    /// Field extraction settings
    pub extraction: ExtractionConfig,
    /// Photo archival settings
    pub storage: StorageConfig,
}

/// Recognition service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Service endpoint
    pub endpoint: String,
    /// API key sent with each upload
    pub api_key: Option<String>,
    /// Recognition language code
    pub language: String,
    /// Preferred engine
    pub engine: u8,
    /// Let the service upscale small photos
    pub scale: bool,
    /// Let the service auto-rotate photos
    pub detect_orientation: bool,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            language: "eng".to_string(),
            engine: 3,
            scale: true,
            detect_orientation: true,
            timeout_secs: 60,
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn recognition_options(&self) -> RecognitionOptions {
        RecognitionOptions {
            language: self.language.clone(),
            engine: EngineId(self.engine),
            scale: self.scale,
            detect_orientation: self.detect_orientation,
        }
    }
}

/// Retry and engine fallback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Tries per engine
    pub attempts_per_engine: u32,
    /// Engines tried after the preferred one
    pub fallback_engines: Vec<u8>,
    /// Backoff unit after network failures and timeouts
    pub backoff_ms: u64,
    /// Backoff unit after HTTP 5xx
    pub server_error_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts_per_engine: 2,
            fallback_engines: vec![2, 1],
            backoff_ms: 600,
            server_error_backoff_ms: 500,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts_per_engine: self.attempts_per_engine,
            fallback_engines: self.fallback_engines.iter().copied().map(EngineId).collect(),
            network_backoff: Duration::from_millis(self.backoff_ms),
            server_error_backoff: Duration::from_millis(self.server_error_backoff_ms),
            timeout_backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

/// Upload budget settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Maximum upload size in bytes
    pub max_bytes: usize,
    /// Maximum longer edge in pixels
    pub max_side: u32,
    pub initial_quality: u8,
    pub min_quality: u8,
    pub shrink_factor: f32,
    /// Try lossless WebP when JPEG stays over budget
    pub allow_alternate_format: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_side: DEFAULT_MAX_SIDE,
            initial_quality: 85,
            min_quality: 32,
            shrink_factor: 0.8,
            allow_alternate_format: true,
        }
    }
}

impl PreprocessConfig {
    pub fn options(&self) -> PrepareOptions {
        PrepareOptions {
            max_bytes: self.max_bytes,
            max_side: self.max_side,
            format: OutputFormat::Jpeg,
            initial_quality: self.initial_quality,
            min_quality: self.min_quality,
            shrink_factor: self.shrink_factor,
            allow_alternate_format: self.allow_alternate_format,
        }
    }
}

/// Field extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Authoritative rules and confidence threshold; false selects the quick pre-check
    pub strict: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { strict: true }
    }
}

impl ExtractionConfig {
    pub fn profile(&self) -> ExtractionProfile {
        ExtractionProfile::from_strict(self.strict)
    }
}

/// Photo archival settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL of the photo service; takes precedence over `photo_dir`
    pub photo_service_url: Option<String>,
    /// Local directory for archived photos
    pub photo_dir: Option<PathBuf>,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let mut config: AppConfig = toml::from_str(&content).context("Failed to parse config")?;
    config.apply_env();
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Default config file location
pub fn default_config_path() -> Result<PathBuf> {
    Ok(crate::storage::get_config_dir()?.join(CONFIG_FILE))
}

/// Load `path`, or the default location, falling back to defaults when the
/// file does not exist
pub fn load_or_default(path: Option<&Path>) -> Result<AppConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if path.exists() {
        info!("Loading config from {:?}", path);
        load_config(&path)
    } else {
        let mut config = AppConfig::default();
        config.apply_env();
        Ok(config)
    }
}

impl AppConfig {
    /// Apply environment overrides
    pub fn apply_env(&mut self) {
        if let Some(key) = std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()) {
            self.ocr.api_key = Some(key);
        }
    }
}
