//! src/config.rs
//! ============================================================================
//! # Config: Application Configuration Loader and Saver
//!
//! Manages every user-editable setting that the preview pipeline and the
//! scorer-driven lists read. Settings are stored as TOML at the
//! cross-platform config path from the [`directories`] crate.
//!
//! ## Features
//! - XDG-compliant config discovery and writing (Linux, macOS, Windows)
//! - Defaults for every section, so partial files are valid
//! - Async load/save for smooth integration with Tokio
//! - `validate()` rejects values the pipeline cannot run with
//!
//! ## Example
//! ```rust,ignore
//! let config = Config::load().await?;
//! let preview = PreviewConfig::from_config(&config)?;
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::fs as TokioFs;
use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::logging::LoggerConfig;
use crate::preview::rules::{MimeRules, RuleTarget};

/// Placeholder texts shown in place of a preview.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PreviewTextConfig {
    /// Shown when the preview refused to render for any reason.
    pub error: String,

    /// Shown when the file is not valid UTF-8.
    pub binary: String,

    /// Shown for zero-byte files.
    pub empty: String,

    /// Shown for files above `settings.max_preview_bytes`.
    pub too_large: String,
}

impl Default for PreviewTextConfig {
    fn default() -> Self {
        Self {
            error: "couldn't read this file! (¬_¬ )".to_string(),
            binary: "the file does not use UTF-8, which isn't supported yet".to_string(),
            empty: "bytes be gone (⌐■_■)".to_string(),
            too_large: "this file is too large to preview".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Disable line and width truncation of text previews
    pub preview_full: bool,

    /// Files above this many bytes are never read for a text preview
    pub max_preview_bytes: u64,

    /// Folder previews list at most this many entries
    pub max_folder_entries: usize,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            preview_full: false,
            max_preview_bytes: 1024 * 1024,
            max_folder_entries: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InterfaceConfig {
    pub show_line_numbers: bool,

    pub preview_text: PreviewTextConfig,
}

/// `bat` syntax highlighter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatPlugin {
    pub enabled: bool,

    pub executable: String,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BatPlugin {
    fn default() -> Self {
        Self {
            enabled: false,
            executable: "bat".to_string(),
            timeout: Duration::from_secs(2),
        }
    }
}

/// `file(1)` MIME detection and the MIME → preview table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOnePlugin {
    /// Ask `file --mime-type` before falling back to content sniffing
    pub enabled: bool,

    pub executable: String,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Glob pattern on the MIME string → preview type (or `remime`)
    pub mime_rules: IndexMap<String, RuleTarget>,
}

impl Default for FileOnePlugin {
    fn default() -> Self {
        Self {
            enabled: false,
            executable: "file".to_string(),
            timeout: Duration::from_secs(2),
            mime_rules: MimeRules::default_table(),
        }
    }
}

/// Poppler PDF rasterization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopplerPlugin {
    pub enabled: bool,

    /// Number of concurrent rasterizer processes per document
    pub threads: usize,

    pub use_pdftocairo: bool,

    /// Folder holding the poppler binaries; empty uses `PATH`
    pub poppler_folder: String,

    /// Output resolution in DPI
    pub resolution: u32,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for PopplerPlugin {
    fn default() -> Self {
        Self {
            enabled: true,
            threads: 1,
            use_pdftocairo: false,
            poppler_folder: String::new(),
            resolution: 72,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PluginsConfig {
    pub bat: BatPlugin,

    pub file_one: FileOnePlugin,

    pub poppler: PopplerPlugin,
}

/// Rasterized PDF page cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of documents kept
    pub max_documents: u64,

    /// Time-to-idle (evict if not accessed)
    #[serde(with = "humantime_serde")]
    pub tti: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_documents: 16,
            tti: Duration::from_secs(600),
        }
    }
}

/// Main configuration struct for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub settings: SettingsConfig,

    pub interface: InterfaceConfig,

    pub plugins: PluginsConfig,

    pub cache: CacheConfig,

    pub logging: LoggerConfig,
}

impl Config {
    /// Loads config from TOML file at the XDG-compliant app config dir, or returns defaults.
    ///
    /// The config is expected at `$XDG_CONFIG_HOME/glimpse/config.toml`
    /// (Linux), or equivalent on Windows/macOS.
    pub async fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path).await
        } else {
            info!(
                "No config file found at {}, using default configuration. Creating it now.",
                path.display()
            );

            let default_config = Self::default();
            default_config.save().await?;

            Ok(default_config)
        }
    }

    /// Loads and validates a config file at an explicit path.
    pub async fn load_from(path: &Path) -> anyhow::Result<Self> {
        info!("Loading config from {}", path.display());
        let text = TokioFs::read_to_string(path).await?;
        let cfg = Self::from_toml(&text)?;

        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;

        Ok(cfg)
    }

    /// Saves config to TOML file at the XDG-compliant app config dir.
    pub async fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path()?;

        info!("Saving config to {}", path.display());

        if let Some(parent) = path.parent() {
            TokioFs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        TokioFs::write(&path, toml_str).await?;

        Ok(())
    }

    /// Rejects values that would stall or disable the pipeline.
    pub fn validate(&self) -> CoreResult<()> {
        if self.settings.max_preview_bytes == 0 {
            return Err(CoreError::config(
                "settings.max_preview_bytes",
                "must be greater than 0",
            ));
        }

        if self.plugins.poppler.threads == 0 {
            return Err(CoreError::config(
                "plugins.poppler.threads",
                "must be at least 1",
            ));
        }

        for (field, timeout) in [
            ("plugins.bat.timeout", self.plugins.bat.timeout),
            ("plugins.file_one.timeout", self.plugins.file_one.timeout),
            ("plugins.poppler.timeout", self.plugins.poppler.timeout),
        ] {
            if timeout.is_zero() {
                return Err(CoreError::config(field, "must be greater than 0"));
            }
        }

        MimeRules::compile(&self.plugins.file_one.mime_rules)?;

        Ok(())
    }

    /// Returns the canonical config file path using `directories::ProjectDirs`.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the config directory (without filename).
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "glimpse", "glimpse")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory."))?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }
}

/// Immutable snapshot of everything the preview pipeline reads.
///
/// Built once per pipeline so background work never observes a half-updated
/// configuration.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub texts: PreviewTextConfig,
    pub preview_full: bool,
    pub max_preview_bytes: u64,
    pub max_folder_entries: usize,
    pub show_line_numbers: bool,
    pub rules: MimeRules,
    pub bat: BatPlugin,
    pub file_one: FileOnePlugin,
    pub poppler: PopplerPlugin,
    pub cache: CacheConfig,
}

impl PreviewConfig {
    pub fn from_config(config: &Config) -> CoreResult<Self> {
        config.validate()?;

        Ok(Self {
            texts: config.interface.preview_text.clone(),
            preview_full: config.settings.preview_full,
            max_preview_bytes: config.settings.max_preview_bytes,
            max_folder_entries: config.settings.max_folder_entries,
            show_line_numbers: config.interface.show_line_numbers,
            rules: MimeRules::compile(&config.plugins.file_one.mime_rules)?,
            bat: config.plugins.bat.clone(),
            file_one: config.plugins.file_one.clone(),
            poppler: config.plugins.poppler.clone(),
            cache: config.cache.clone(),
        })
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        let config = Config::default();

        Self {
            texts: config.interface.preview_text,
            preview_full: config.settings.preview_full,
            max_preview_bytes: config.settings.max_preview_bytes,
            max_folder_entries: config.settings.max_folder_entries,
            show_line_numbers: config.interface.show_line_numbers,
            rules: MimeRules::defaults(),
            bat: config.plugins.bat,
            file_one: config.plugins.file_one,
            poppler: config.plugins.poppler,
            cache: config.cache,
        }
    }
}
