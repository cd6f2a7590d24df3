use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::{Ini, Properties};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const SYSTEM_SECTION: &str = "System";
pub const APPLICATION_SECTION: &str = "Application";

pub const KEY_PACKAGE_MANAGER: &str = "PManager";
pub const KEY_DU_PACKAGE: &str = "duPackage";
pub const KEY_DU_TIMEOUT: &str = "duTimeout";
pub const KEY_GEN_TIMEOUT: &str = "genTimeout";
pub const KEY_WIN_SIZE: &str = "WinSize";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Syntax(#[from] ini::ParseError),
    #[error("missing section [{0}]")]
    MissingSection(&'static str),
    #[error("missing option '{key}' in section [{section}]")]
    MissingKey {
        section: &'static str,
        key: &'static str,
    },
    #[error("option '{key}' must be a non-negative integer, got '{value}'")]
    InvalidInteger { key: &'static str, value: String },
    #[error("option '{key}' must be a pair of integers 'W,H', got '{value}'")]
    InvalidPair { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub package_manager: String,
    pub du_package: String,
    pub du_timeout: u64,
    pub gen_timeout: u64,
    pub win_size: (u32, u32),
}

impl Configuration {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&data)
    }

    pub fn from_ini_str(data: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(data)?;

        let system = section(&ini, SYSTEM_SECTION)?;
        let application = section(&ini, APPLICATION_SECTION)?;

        let package_manager = option(system, SYSTEM_SECTION, KEY_PACKAGE_MANAGER)?;
        let du_package = option(system, SYSTEM_SECTION, KEY_DU_PACKAGE)?;
        let du_timeout = parse_seconds(
            KEY_DU_TIMEOUT,
            &option(system, SYSTEM_SECTION, KEY_DU_TIMEOUT)?,
        )?;
        let gen_timeout = parse_seconds(
            KEY_GEN_TIMEOUT,
            &option(system, SYSTEM_SECTION, KEY_GEN_TIMEOUT)?,
        )?;
        let win_size = parse_pair(
            KEY_WIN_SIZE,
            &option(application, APPLICATION_SECTION, KEY_WIN_SIZE)?,
        )?;

        Ok(Self {
            package_manager,
            du_package,
            du_timeout,
            gen_timeout,
            win_size,
        })
    }

    pub fn du_timeout(&self) -> Duration {
        Duration::from_secs(self.du_timeout)
    }

    pub fn gen_timeout(&self) -> Duration {
        Duration::from_secs(self.gen_timeout)
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Option<Configuration> {
    let path = path.as_ref();
    match Configuration::load(path) {
        Ok(config) => Some(config),
        Err(err) => {
            debug!("configuration {} unavailable: {}", path.display(), err);
            None
        }
    }
}

fn section<'a>(ini: &'a Ini, name: &'static str) -> Result<&'a Properties, ConfigError> {
    ini.section(Some(name))
        .ok_or(ConfigError::MissingSection(name))
}

fn option(
    properties: &Properties,
    section: &'static str,
    key: &'static str,
) -> Result<String, ConfigError> {
    // Section names are case-sensitive, option names are not.
    properties
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, value)| value.to_lowercase())
        .ok_or(ConfigError::MissingKey { section, key })
}

fn parse_seconds(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidInteger {
            key,
            value: value.to_string(),
        })
}

fn parse_pair(key: &'static str, value: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = || ConfigError::InvalidPair {
        key,
        value: value.to_string(),
    };

    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;

    match parts.as_slice() {
        [width, height] => Ok((*width, *height)),
        _ => Err(invalid()),
    }
}
