use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::fall::{FallConfig, DEFAULT_FALL_COOLDOWN, DEFAULT_FALL_THRESHOLD};
use crate::frame::Resolution;
use crate::upload::{DEFAULT_JPEG_QUALITY, DEFAULT_UPLOAD_CAPACITY, DEFAULT_UPLOAD_TIMEOUT};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000/upload";
const DEFAULT_FEED_URL: &str = "stub://camera";
const DEFAULT_FEED_FPS: u32 = 10;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SentinelConfigFile {
    resolution: Option<String>,
    fall: Option<FallConfigFile>,
    upload: Option<UploadConfigFile>,
    feed: Option<FeedConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FallConfigFile {
    threshold: Option<f32>,
    cooldown_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct UploadConfigFile {
    server_url: Option<String>,
    capacity: Option<usize>,
    timeout_secs: Option<u64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FeedConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub resolution: Resolution,
    pub fall: FallConfig,
    pub upload: UploadSettings,
    pub feed: FeedSettings,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub server_url: String,
    pub capacity: usize,
    pub timeout: Duration,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub url: String,
    pub target_fps: u32,
}

impl SentinelConfig {
    /// Load from the file named by `FALL_CONFIG` (if set), then apply env
    /// overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FALL_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => SentinelConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self> {
        let resolution = match file.resolution.as_deref() {
            Some(raw) => raw.parse()?,
            None => Resolution::default(),
        };
        let fall_file = file.fall.unwrap_or_default();
        let cooldown = match fall_file.cooldown_secs {
            Some(secs) => seconds("fall.cooldown_secs", secs)?,
            None => DEFAULT_FALL_COOLDOWN,
        };
        let fall = FallConfig {
            threshold: fall_file.threshold.unwrap_or(DEFAULT_FALL_THRESHOLD),
            cooldown,
            ..FallConfig::default()
        };
        let upload_file = file.upload.unwrap_or_default();
        let upload = UploadSettings {
            server_url: upload_file
                .server_url
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            capacity: upload_file.capacity.unwrap_or(DEFAULT_UPLOAD_CAPACITY),
            timeout: upload_file
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_UPLOAD_TIMEOUT),
            jpeg_quality: upload_file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
        };
        let feed_file = file.feed.unwrap_or_default();
        let feed = FeedSettings {
            url: feed_file
                .url
                .unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
            target_fps: feed_file.target_fps.unwrap_or(DEFAULT_FEED_FPS),
        };
        Ok(Self {
            resolution,
            fall,
            upload,
            feed,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(raw) = env_value("FALL_THRESHOLD") {
            self.fall.threshold = raw
                .parse()
                .map_err(|_| anyhow!("FALL_THRESHOLD must be a number of pixels"))?;
        }
        if let Some(raw) = env_value("FALL_COOLDOWN_SECS") {
            let secs: f64 = raw
                .parse()
                .map_err(|_| anyhow!("FALL_COOLDOWN_SECS must be a number of seconds"))?;
            self.fall.cooldown = seconds("FALL_COOLDOWN_SECS", secs)?;
        }
        if let Some(url) = env_value("FALL_SERVER_URL") {
            self.upload.server_url = url;
        }
        if let Some(raw) = env_value("FALL_UPLOAD_CAPACITY") {
            self.upload.capacity = raw
                .parse()
                .map_err(|_| anyhow!("FALL_UPLOAD_CAPACITY must be a positive integer"))?;
        }
        if let Some(raw) = env_value("FALL_UPLOAD_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                anyhow!("FALL_UPLOAD_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.upload.timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = env_value("FALL_RESOLUTION") {
            self.resolution = raw.parse()?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !self.fall.threshold.is_finite() || self.fall.threshold <= 0.0 {
            return Err(anyhow!("fall threshold must be greater than zero"));
        }
        if self.fall.cooldown.is_zero() {
            return Err(anyhow!("fall cooldown must be greater than zero"));
        }
        if self.upload.capacity == 0 {
            return Err(anyhow!("upload capacity must be greater than zero"));
        }
        if self.upload.timeout.is_zero() {
            return Err(anyhow!("upload timeout must be greater than zero"));
        }
        if !(1..=100).contains(&self.upload.jpeg_quality) {
            return Err(anyhow!("jpeg quality must be between 1 and 100"));
        }
        let url = Url::parse(&self.upload.server_url)
            .map_err(|e| anyhow!("invalid server url '{}': {}", self.upload.server_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "server url must use http or https, got '{}'",
                url.scheme()
            ));
        }
        if self.feed.target_fps == 0 {
            return Err(anyhow!("feed target_fps must be greater than zero"));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn seconds(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("{} must be a non-negative number of seconds", name))
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
