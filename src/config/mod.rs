use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "tubegrab";
const LOCAL_CONFIG: &str = "tubegrab.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External programs
    pub tools: ToolsConfig,

    /// Where and how downloads are written
    pub download: DownloadConfig,

    /// Transcoding settings
    pub audio: AudioConfig,

    /// State remembered by the interactive front-end
    pub interactive: InteractiveConfig,

    /// File this configuration was read from
    #[serde(skip)]
    source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// yt-dlp executable
    pub yt_dlp: String,

    /// ffmpeg executable
    pub ffmpeg: String,

    /// ffprobe executable, used when the duration is unknown
    pub ffprobe: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Output directory; relative paths resolve against the working directory
    pub directory: PathBuf,

    /// Open the file manager after a successful download
    pub open_folder: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// LAME VBR quality, 0 (best) to 9
    pub mp3_quality: u8,

    /// AAC bitrate passed to ffmpeg, e.g. `192k`
    pub aac_bitrate: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractiveConfig {
    /// Directory last chosen in the interactive front-end
    pub last_directory: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("downloads"),
            open_folder: true,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            mp3_quality: 2,
            aac_bitrate: "192k".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

            config.validate()?;
            config
        } else {
            let config = Self::default();
            if let Err(e) = config.save_to(&config_path) {
                tracing::warn!("Could not write default config to {}: {:#}", config_path.display(), e);
            }
            config
        };

        tracing::debug!("Using configuration from {}", config_path.display());
        config.source = Some(config_path);
        Ok(config)
    }

    /// Save configuration to the file it was loaded from
    pub async fn save(&self) -> Result<()> {
        let config_path = match &self.source {
            Some(path) => path.clone(),
            None => Self::config_path()?,
        };
        self.save_to(&config_path)
    }

    fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from(LOCAL_CONFIG);
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join(APP_DIR).join("config.yaml"))
    }

    /// Path this configuration was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("tools.yt_dlp", &self.tools.yt_dlp),
            ("tools.ffmpeg", &self.tools.ffmpeg),
            ("tools.ffprobe", &self.tools.ffprobe),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} must not be empty", name);
            }
        }

        if self.audio.mp3_quality > 9 {
            anyhow::bail!("audio.mp3_quality must be between 0 and 9, got {}", self.audio.mp3_quality);
        }

        let bitrate = self.audio.aac_bitrate.trim();
        let digits = bitrate.strip_suffix(['k', 'K']).unwrap_or(bitrate);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            anyhow::bail!("audio.aac_bitrate must look like 192k, got {:?}", self.audio.aac_bitrate);
        }

        Ok(())
    }

    /// Resolve the download directory, preferring an explicit override
    pub fn download_dir(&self, override_dir: Option<&Path>) -> Result<PathBuf> {
        let dir = override_dir.unwrap_or(self.download.directory.as_path());
        if dir.is_absolute() {
            Ok(dir.to_path_buf())
        } else {
            Ok(std::env::current_dir()?.join(dir))
        }
    }

    /// Starting directory for the interactive front-end
    pub fn interactive_dir(&self) -> PathBuf {
        self.interactive
            .last_directory
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| self.download.directory.clone())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        if let Some(source) = &self.source {
            println!("  File: {}", source.display());
        }
        println!("  yt-dlp: {}", self.tools.yt_dlp);
        println!("  ffmpeg: {}", self.tools.ffmpeg);
        println!("  ffprobe: {}", self.tools.ffprobe);
        println!("  Download directory: {}", self.download.directory.display());
        println!("  Open folder after download: {}", self.download.open_folder);
        println!("  MP3 quality: {}", self.audio.mp3_quality);
        println!("  AAC bitrate: {}", self.audio.aac_bitrate);
        if let Some(dir) = &self.interactive.last_directory {
            println!("  Last interactive directory: {}", dir.display());
        }
    }
}
