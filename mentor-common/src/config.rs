//! Bootstrap configuration and root folder resolution
//!
//! Settings sources, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! A missing or unreadable config file never stops startup: a warning is
//! logged and compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "MENTOR_ROOT_FOLDER";

/// Environment variable naming an explicit config file
pub const CONFIG_FILE_ENV: &str = "MENTOR_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "mentor.db";

/// Directory (inside the root folder) holding uploaded recordings
pub const UPLOADS_DIR: &str = "uploads";

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub port: u16,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = dirs::data_local_dir()
            .map(|d| d.join("mentor-eval"))
            .unwrap_or_else(|| PathBuf::from("./mentor_data"));

        Self {
            root_folder,
            log_level: default_log_level(),
            port: default_port(),
        }
    }
}

/// Bootstrap configuration loaded from TOML
///
/// Every section is optional; absent keys take their compiled defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Root folder holding the database and uploads
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub models: ModelConfig,

    #[serde(default)]
    pub services: ServiceEndpoints,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Model identifiers recorded in completion metadata
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default = "default_whisper_model")]
    pub whisper: String,
    #[serde(default = "default_llm_model")]
    pub llm: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            whisper: default_whisper_model(),
            llm: default_llm_model(),
        }
    }
}

/// Endpoints of the external inference services
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceEndpoints {
    /// Whisper-compatible transcription server
    #[serde(default)]
    pub stt_url: Option<String>,
    /// Landmark detection sidecar
    #[serde(default)]
    pub vision_url: Option<String>,
    /// Generative language model base URL
    #[serde(default)]
    pub llm_url: Option<String>,
    #[serde(default)]
    pub llm_api_key: Option<String>,
}

/// Result cache settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl(),
        }
    }
}

/// Pipeline tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Frame sampling rate for visual analysis
    #[serde(default = "default_frame_fps")]
    pub frame_fps: f64,
    /// Upper bound on sampled frames per session
    #[serde(default = "default_max_frames")]
    pub max_frames: usize,
    /// Rubric subject (`math`, `programming`, ...); general rubric when absent
    #[serde(default)]
    pub subject: Option<String>,
    /// Additional LLM attempts when a report response is invalid
    #[serde(default = "default_report_retries")]
    pub report_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_fps: default_frame_fps(),
            max_frames: default_max_frames(),
            subject: None,
            report_retries: default_report_retries(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            root_folder: None,
            logging: LoggingConfig::default(),
            models: ModelConfig::default(),
            services: ServiceEndpoints::default(),
            cache: CacheConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    5740
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_whisper_model() -> String {
    "base".to_string()
}

fn default_llm_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_frame_fps() -> f64 {
    1.0
}

fn default_max_frames() -> usize {
    60
}

fn default_report_retries() -> u32 {
    1
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Load the config file if one can be found, otherwise compiled defaults
    ///
    /// Lookup order: explicit path, `MENTOR_CONFIG`, user config dir.
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        let candidate = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from))
            .or_else(default_config_path);

        let Some(path) = candidate else {
            warn!("No config directory available, using compiled defaults");
            return Self::default();
        };

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using compiled defaults");
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded config file");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load config, using compiled defaults");
                Self::default()
            }
        }
    }
}

/// Default config file location (`<config dir>/mentor-eval/config.toml`)
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mentor-eval").join("config.toml"))
}

/// Resolves the root folder using the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_value: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml_value(mut self, path: Option<PathBuf>) -> Self {
        self.toml_value = path;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, path = %path.display(), "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                info!(module = %self.module_name, path = %path, "Root folder from {}", ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            info!(module = %self.module_name, path = %path.display(), "Root folder from config file");
            return path.clone();
        }

        let defaults = CompiledDefaults::for_current_platform();
        info!(module = %self.module_name, path = %defaults.root_folder.display(), "Root folder from compiled default");
        defaults.root_folder
    }
}

/// Creates the root folder layout on first start
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            info!(path = %self.root_folder.display(), "Creating root folder");
        }
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.uploads_dir())?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root_folder.join(UPLOADS_DIR)
    }
}
