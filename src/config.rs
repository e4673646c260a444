//! Service configuration and profiles.
//!
//! This module provides:
//! - The local LLCP link parameters handed to the lower stack
//! - Timing knobs for connect and shutdown
//! - Profiles with sensible defaults (`Production`, `Testing`)
//! - Layered loading (profile + file + env + overrides)
//!
//! File parsing is minimal and deterministic: `[section]` headers,
//! `key = value` lines and `#` comments.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest MIU an LLCP link may advertise.
pub const MIN_LINK_MIU: u16 = 128;

/// Top-level configuration for the NFC service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Local LLCP link parameters.
    pub link: LlcpLinkConfig,
    /// Timing knobs.
    pub timeouts: TimeoutConfig,
    /// Notification dispatcher settings.
    pub dispatcher: DispatcherConfig,
}

impl ServiceConfig {
    /// Validates the configuration for basic sanity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link.miu < MIN_LINK_MIU {
            return Err(ConfigError::InvalidMiu(u64::from(self.link.miu)));
        }
        if self.link.lto == 0 {
            return Err(ConfigError::InvalidLto(0));
        }
        if self.timeouts.shutdown_timeout.is_zero() {
            return Err(ConfigError::ShutdownTimeoutZero);
        }
        if self.dispatcher.thread_name.trim().is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }
        Ok(())
    }
}

/// Local LLCP link parameters (LTO, MIU, WKS, OPT).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlcpLinkConfig {
    /// Link timeout, in 10 ms units.
    pub lto: u8,
    /// Maximum information unit.
    pub miu: u16,
    /// Well-known service bitmap.
    pub wks: u16,
    /// Link service class option bits.
    pub opt: u8,
}

impl Default for LlcpLinkConfig {
    fn default() -> Self {
        Self {
            lto: 150,
            miu: MIN_LINK_MIU,
            wks: 0x0001,
            opt: 0,
        }
    }
}

/// Settable link property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkProperty {
    /// Link timeout.
    Lto,
    /// Maximum information unit.
    Miu,
    /// Well-known services.
    Wks,
    /// Link service class options.
    Opt,
}

impl LlcpLinkConfig {
    /// Sets one link property, rejecting values outside its wire range.
    pub fn set(&mut self, property: LinkProperty, value: u64) -> Result<(), ConfigError> {
        match property {
            LinkProperty::Lto => {
                self.lto = u8::try_from(value)
                    .ok()
                    .filter(|lto| *lto > 0)
                    .ok_or(ConfigError::InvalidLto(value))?;
            }
            LinkProperty::Miu => {
                self.miu = u16::try_from(value)
                    .ok()
                    .filter(|miu| *miu >= MIN_LINK_MIU)
                    .ok_or(ConfigError::InvalidMiu(value))?;
            }
            LinkProperty::Wks => {
                self.wks = u16::try_from(value).map_err(|_| ConfigError::InvalidWks(value))?;
            }
            LinkProperty::Opt => {
                self.opt = u8::try_from(value).map_err(|_| ConfigError::InvalidOpt(value))?;
            }
        }
        Ok(())
    }
}

/// Timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Pause before every connect request; some controllers drop requests
    /// issued right after link activation.
    pub connect_delay: Duration,
    /// Bound on waiting for the notification thread to exit.
    pub shutdown_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_delay: Duration::from_millis(100),
            shutdown_timeout: Duration::from_millis(2000),
        }
    }
}

/// Notification dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Name given to the dispatcher thread.
    pub thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            thread_name: "nfc-notify".to_string(),
        }
    }
}

/// Predefined configuration profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceProfile {
    /// Real controller timing.
    #[default]
    Production,
    /// No connect delay and a short shutdown bound.
    Testing,
}

impl ServiceProfile {
    /// Builds the configuration for this profile.
    #[must_use]
    pub fn to_config(self) -> ServiceConfig {
        match self {
            Self::Production => ServiceConfig::default(),
            Self::Testing => ServiceConfig {
                timeouts: TimeoutConfig {
                    connect_delay: Duration::ZERO,
                    shutdown_timeout: Duration::from_millis(500),
                },
                dispatcher: DispatcherConfig {
                    thread_name: "nfc-notify-test".to_string(),
                },
                ..ServiceConfig::default()
            },
        }
    }
}

/// Configuration loader with layered sources.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    profile: ServiceProfile,
    file_path: Option<PathBuf>,
    overrides: BTreeMap<String, String>,
}

impl ConfigLoader {
    /// Creates a loader with the production profile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base profile.
    #[must_use]
    pub fn profile(mut self, profile: ServiceProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Sets a file path for config loading.
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Adds a programmatic override (highest precedence). Keys use the
    /// environment spelling, e.g. `NFC_LINK_MIU`.
    #[must_use]
    pub fn override_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Loads configuration with precedence:
    /// 1. Profile defaults (lowest)
    /// 2. File config
    /// 3. Environment variables
    /// 4. Programmatic overrides (highest)
    pub fn load(&self) -> Result<ServiceConfig, ConfigError> {
        let mut config = if let Some(path) = &self.file_path {
            load_from_file(path, self.profile)?
        } else {
            self.profile.to_config()
        };

        apply_env_overrides(&mut config)?;
        apply_overrides(&mut config, &self.overrides)?;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error while reading configuration.
    Io(std::io::Error),
    /// Parse error.
    Parse(String),
    /// LTO zero or out of range.
    InvalidLto(u64),
    /// MIU below the link minimum or out of range.
    InvalidMiu(u64),
    /// WKS out of range.
    InvalidWks(u64),
    /// OPT out of range.
    InvalidOpt(u64),
    /// Shutdown bound of zero.
    ShutdownTimeoutZero,
    /// Dispatcher thread name empty.
    EmptyThreadName,
    /// Unknown override key.
    InvalidOverride(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "config I/O error: {err}"),
            Self::Parse(err) => write!(f, "config parse error: {err}"),
            Self::InvalidLto(value) => write!(f, "lto out of range: {value}"),
            Self::InvalidMiu(value) => {
                write!(f, "miu must be in {MIN_LINK_MIU}..=65535, got {value}")
            }
            Self::InvalidWks(value) => write!(f, "wks out of range: {value}"),
            Self::InvalidOpt(value) => write!(f, "opt out of range: {value}"),
            Self::ShutdownTimeoutZero => write!(f, "shutdown_timeout must be > 0"),
            Self::EmptyThreadName => write!(f, "dispatcher thread_name must not be empty"),
            Self::InvalidOverride(key) => write!(f, "invalid override: {key}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

fn load_from_file(path: &Path, profile: ServiceProfile) -> Result<ServiceConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents, profile.to_config())
}

fn apply_env_overrides(config: &mut ServiceConfig) -> Result<(), ConfigError> {
    let overrides: BTreeMap<String, String> = std::env::vars()
        .filter(|(key, _)| key.starts_with("NFC_"))
        .collect();
    apply_overrides(config, &overrides)
}

fn apply_overrides(
    config: &mut ServiceConfig,
    overrides: &BTreeMap<String, String>,
) -> Result<(), ConfigError> {
    for (key, value) in overrides {
        apply_env_override(config, key, value)?;
    }
    Ok(())
}

fn apply_env_override(
    config: &mut ServiceConfig,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    match key {
        "NFC_LINK_LTO" => config.link.set(LinkProperty::Lto, parse_u64(value, key)?)?,
        "NFC_LINK_MIU" => config.link.set(LinkProperty::Miu, parse_u64(value, key)?)?,
        "NFC_LINK_WKS" => config.link.set(LinkProperty::Wks, parse_u64(value, key)?)?,
        "NFC_LINK_OPT" => config.link.set(LinkProperty::Opt, parse_u64(value, key)?)?,
        "NFC_TIMEOUTS_CONNECT_DELAY_MS" => {
            config.timeouts.connect_delay = parse_duration_ms(value, key)?;
        }
        "NFC_TIMEOUTS_SHUTDOWN_TIMEOUT_MS" => {
            config.timeouts.shutdown_timeout = parse_duration_ms(value, key)?;
        }
        "NFC_DISPATCHER_THREAD_NAME" => config.dispatcher.thread_name = value.to_string(),
        _ => return Err(ConfigError::InvalidOverride(key.to_string())),
    }
    Ok(())
}

fn parse_config(contents: &str, base: ServiceConfig) -> Result<ServiceConfig, ConfigError> {
    let mut config = base;
    let mut section = String::new();

    for (line_idx, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = line[1..line.len() - 1].trim().to_lowercase();
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| ConfigError::Parse(format!("line {}: {}", line_idx + 1, line)))?;
        let key = key.trim();
        let value = value.trim().trim_matches('"');

        apply_section_kv(&mut config, &section, key, value)?;
    }

    Ok(config)
}

fn apply_section_kv(
    config: &mut ServiceConfig,
    section: &str,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    match section {
        "link" => apply_link_kv(&mut config.link, key, value),
        "timeouts" => apply_timeout_kv(&mut config.timeouts, key, value),
        "dispatcher" => match key {
            "thread_name" => {
                config.dispatcher.thread_name = value.to_string();
                Ok(())
            }
            _ => Err(ConfigError::Parse(format!("unknown key: dispatcher.{key}"))),
        },
        "" => Err(ConfigError::Parse(format!("missing section for key: {key}"))),
        _ => Err(ConfigError::Parse(format!("unknown section: {section}"))),
    }
}

fn apply_link_kv(link: &mut LlcpLinkConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    let property = match key {
        "lto" => LinkProperty::Lto,
        "miu" => LinkProperty::Miu,
        "wks" => LinkProperty::Wks,
        "opt" => LinkProperty::Opt,
        _ => return Err(ConfigError::Parse(format!("unknown key: link.{key}"))),
    };
    link.set(property, parse_u64(value, key)?)
}

fn apply_timeout_kv(
    timeouts: &mut TimeoutConfig,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    match key {
        "connect_delay_ms" => timeouts.connect_delay = parse_duration_ms(value, key)?,
        "shutdown_timeout_ms" => timeouts.shutdown_timeout = parse_duration_ms(value, key)?,
        _ => return Err(ConfigError::Parse(format!("unknown key: timeouts.{key}"))),
    }
    Ok(())
}

fn parse_u64(value: &str, key: &str) -> Result<u64, ConfigError> {
    let parsed = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        value.parse::<u64>()
    };
    parsed.map_err(|_| ConfigError::Parse(format!("invalid u64 for {key}: {value}")))
}

fn parse_duration_ms(value: &str, key: &str) -> Result<Duration, ConfigError> {
    let millis = parse_u64(value, key)?;
    Ok(Duration::from_millis(millis))
}
