use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WattError};
use crate::model::device::Device;
use crate::registry::Registry;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub vm_url: String,
    pub alertmanager_url: String,
    /// Device query endpoint; `{host}` is replaced by the device host.
    pub device_url_template: String,
    pub request_timeout: Duration,
    pub sync_interval: Duration,
    pub resume_offset: Duration,
    pub watermark_lookback: Duration,
    pub page_limit: u32,
    pub group: String,
    pub silence_matcher: String,
    pub silence_keyword: String,
    pub silence_created_by: String,
    pub registry: Registry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vm_url: "http://127.0.0.1:8428".to_string(),
            alertmanager_url: "http://127.0.0.1:9093/api/v2".to_string(),
            device_url_template: "http://{host}/query".to_string(),
            request_timeout: Duration::from_secs(30),
            sync_interval: Duration::from_secs(5 * 60),
            resume_offset: Duration::from_secs(5),
            watermark_lookback: Duration::from_secs(30 * 24 * 60 * 60),
            page_limit: 5000,
            group: "1m".to_string(),
            silence_matcher: ".*CPU.*|.*cpu.*|.*Cpu.*".to_string(),
            silence_keyword: "cpu".to_string(),
            silence_created_by: "wattsync backup window".to_string(),
            registry: Registry::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Defaults, then the config file (`path`, `$WATTSYNC_CONFIG` or the XDG
    /// location), then `WATTSYNC_*` environment variables.
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(config_file_path);
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        } else if path.is_some() {
            return Err(WattError::Config(format!(
                "config file {} does not exist",
                config_path.display()
            )));
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn device_url(&self, host: &str) -> String {
        self.device_url_template.replace("{host}", host)
    }

    fn validate(&self) -> Result<()> {
        if self.page_limit == 0 {
            return Err(WattError::Config("page_limit must be positive".to_string()));
        }
        if !self.device_url_template.contains("{host}") {
            return Err(WattError::Config(format!(
                "device_url_template must contain {{host}} (value={})",
                self.device_url_template
            )));
        }
        if self.sync_interval.is_zero() {
            return Err(WattError::Config(
                "sync_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    vm_url: Option<String>,
    alertmanager_url: Option<String>,
    device_url_template: Option<String>,
    request_timeout: Option<String>,
    sync_interval: Option<String>,
    resume_offset: Option<String>,
    watermark_lookback: Option<String>,
    page_limit: Option<u32>,
    group: Option<String>,
    silence_matcher: Option<String>,
    silence_keyword: Option<String>,
    silence_created_by: Option<String>,
    devices: Option<Vec<Device>>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("WATTSYNC_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("wattsync/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| WattError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| WattError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    let page_limit = match env::var("WATTSYNC_PAGE_LIMIT") {
        Ok(v) => Some(v.parse::<u32>().map_err(|e| {
            WattError::Config(format!("bad WATTSYNC_PAGE_LIMIT in environment: {e}"))
        })?),
        Err(_) => None,
    };

    Ok(ConfigOverrides {
        vm_url: env::var("WATTSYNC_VM_URL").ok(),
        alertmanager_url: env::var("WATTSYNC_ALERTMANAGER_URL").ok(),
        device_url_template: env::var("WATTSYNC_DEVICE_URL_TEMPLATE").ok(),
        request_timeout: env::var("WATTSYNC_REQUEST_TIMEOUT").ok(),
        sync_interval: env::var("WATTSYNC_SYNC_INTERVAL").ok(),
        resume_offset: env::var("WATTSYNC_RESUME_OFFSET").ok(),
        watermark_lookback: env::var("WATTSYNC_WATERMARK_LOOKBACK").ok(),
        page_limit,
        group: env::var("WATTSYNC_GROUP").ok(),
        silence_matcher: env::var("WATTSYNC_SILENCE_MATCHER").ok(),
        silence_keyword: env::var("WATTSYNC_SILENCE_KEYWORD").ok(),
        silence_created_by: env::var("WATTSYNC_SILENCE_CREATED_BY").ok(),
        devices: None,
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.vm_url {
        cfg.vm_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = overrides.alertmanager_url {
        cfg.alertmanager_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = overrides.device_url_template {
        cfg.device_url_template = v;
    }
    if let Some(v) = overrides.request_timeout {
        cfg.request_timeout = parse_duration_field("request_timeout", &v, source)?;
    }
    if let Some(v) = overrides.sync_interval {
        cfg.sync_interval = parse_duration_field("sync_interval", &v, source)?;
    }
    if let Some(v) = overrides.resume_offset {
        cfg.resume_offset = parse_duration_field("resume_offset", &v, source)?;
    }
    if let Some(v) = overrides.watermark_lookback {
        cfg.watermark_lookback = parse_duration_field("watermark_lookback", &v, source)?;
    }
    if let Some(v) = overrides.page_limit {
        cfg.page_limit = v;
    }
    if let Some(v) = overrides.group {
        cfg.group = v;
    }
    if let Some(v) = overrides.silence_matcher {
        cfg.silence_matcher = v;
    }
    if let Some(v) = overrides.silence_keyword {
        cfg.silence_keyword = v;
    }
    if let Some(v) = overrides.silence_created_by {
        cfg.silence_created_by = v;
    }
    if let Some(devices) = overrides.devices {
        cfg.registry = Registry::new(devices)
            .map_err(|e| WattError::Config(format!("bad devices in {source}: {e}")))?;
    }
    Ok(())
}

fn parse_duration_field(field: &str, value: &str, source: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        WattError::Config(format!("bad {field} in {source}: {e} (value={value})"))
    })
}
