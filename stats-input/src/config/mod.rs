//! Assigner configuration.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file. Every variable has a default, so an empty environment yields a
//! single shared port on localhost with an in-memory state cache.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const ENV_HOST: &str = "STATS_INPUT_HOST";
pub const ENV_PORT_MODE: &str = "STATS_INPUT_PORT_MODE";
pub const ENV_PORT: &str = "STATS_INPUT_PORT";
pub const ENV_PORT_RANGE_START: &str = "STATS_INPUT_PORT_RANGE_START";
pub const ENV_PORT_RANGE_END: &str = "STATS_INPUT_PORT_RANGE_END";
pub const ENV_STATE_DIR: &str = "STATS_INPUT_STATE_DIR";
pub const ENV_RUNNER_NAME: &str = "STATS_INPUT_RUNNER_NAME";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8125;
const DEFAULT_PORT_RANGE_START: u16 = 31000;
const DEFAULT_PORT_RANGE_END: u16 = 32000;
const DEFAULT_RUNNER_NAME: &str = "stats-input-runner";

/// How endpoints are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortMode {
    /// Every container shares one port.
    #[default]
    Single,
    /// Each container gets its own port from a range.
    Range,
}

impl fmt::Display for PortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortMode::Single => write!(f, "single"),
            PortMode::Range => write!(f, "range"),
        }
    }
}

impl FromStr for PortMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(PortMode::Single),
            "range" => Ok(PortMode::Range),
            other => Err(Error::config(format!(
                "{ENV_PORT_MODE} must be 'single' or 'range', got '{other}'"
            ))),
        }
    }
}

/// Settings for building an [`InputAssigner`](crate::InputAssigner) and its
/// collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignerConfig {
    /// Host placed in every assigned endpoint.
    pub host: String,
    pub port_mode: PortMode,
    /// Shared port in [`PortMode::Single`].
    pub port: u16,
    /// First port of the pool in [`PortMode::Range`].
    pub port_range_start: u16,
    /// Last port of the pool in [`PortMode::Range`], inclusive.
    pub port_range_end: u16,
    /// Directory for the persisted record; `None` keeps it in memory.
    pub state_dir: Option<PathBuf>,
    /// Name of the runner's worker thread.
    pub runner_name: String,
}

impl Default for AssignerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port_mode: PortMode::default(),
            port: DEFAULT_PORT,
            port_range_start: DEFAULT_PORT_RANGE_START,
            port_range_end: DEFAULT_PORT_RANGE_END,
            state_dir: None,
            runner_name: DEFAULT_RUNNER_NAME.to_string(),
        }
    }
}

impl AssignerConfig {
    /// Load from the environment after applying any `.env` file.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            host: var(ENV_HOST).unwrap_or(defaults.host),
            port_mode: var(ENV_PORT_MODE)
                .map(|v| v.parse::<PortMode>())
                .transpose()?
                .unwrap_or(defaults.port_mode),
            port: parse_port(ENV_PORT, var(ENV_PORT))?.unwrap_or(defaults.port),
            port_range_start: parse_port(ENV_PORT_RANGE_START, var(ENV_PORT_RANGE_START))?
                .unwrap_or(defaults.port_range_start),
            port_range_end: parse_port(ENV_PORT_RANGE_END, var(ENV_PORT_RANGE_END))?
                .unwrap_or(defaults.port_range_end),
            state_dir: var(ENV_STATE_DIR).map(PathBuf::from),
            runner_name: var(ENV_RUNNER_NAME).unwrap_or(defaults.runner_name),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        match self.port_mode {
            PortMode::Single if self.port == 0 => {
                Err(Error::config("port must be non-zero in single mode"))
            }
            PortMode::Range if self.port_range_start == 0 => {
                Err(Error::config("port range must not start at 0"))
            }
            PortMode::Range if self.port_range_start > self.port_range_end => {
                Err(Error::config(format!(
                    "port range start {} is after end {}",
                    self.port_range_start, self.port_range_end
                )))
            }
            _ => Ok(()),
        }
    }
}

fn parse_port(key: &str, value: Option<String>) -> Result<Option<u16>> {
    value
        .map(|v| {
            v.trim()
                .parse::<u16>()
                .map_err(|e| Error::config(format!("{key}='{v}' is not a valid port: {e}")))
        })
        .transpose()
}
