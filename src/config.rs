use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HarnessError, Result};
use crate::intersection::LockOrder;

pub const CONFIG_PATH_ENV: &str = "THREAD_HAZARDS_CONFIG";
pub const HOST_ENV: &str = "THREAD_HAZARDS_HOST";
pub const PORT_ENV: &str = "THREAD_HAZARDS_PORT";
pub const POOL_SIZE_ENV: &str = "THREAD_HAZARDS_POOL_SIZE";
pub const CORPUS_ENV: &str = "THREAD_HAZARDS_CORPUS";

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub pool_size: usize,
    /// `None` means the pool queue is unbounded.
    pub queue_capacity: Option<usize>,
    pub corpus_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            pool_size: 8,
            queue_capacity: None,
            corpus_path: PathBuf::from("resource/throughput/war_and_peace.txt"),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|err| HarnessError::config(format!("server.host '{}' is not an IP address: {err}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CounterConfig {
    pub iterations: usize,
    pub trials: usize,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            iterations: 10_000,
            trials: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntersectionConfig {
    pub order: LockOrder,
    pub rounds: usize,
    pub crossing_ms: u64,
    pub approach_ms: u64,
    pub jitter_ms: u64,
    pub timeout_ms: u64,
}

impl Default for IntersectionConfig {
    fn default() -> Self {
        Self {
            order: LockOrder::Inverted,
            rounds: 1_000,
            crossing_ms: 1,
            approach_ms: 0,
            jitter_ms: 5,
            timeout_ms: 3_000,
        }
    }
}

impl IntersectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct JoinConfig {
    pub timeout_ms: u64,
    pub inputs: Vec<u64>,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1_000,
            inputs: vec![0, 3435, 35435, 2324, 4656, 23, 5556, 10_000_000_000],
        }
    }
}

impl JoinConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct VaultConfig {
    pub max_password: u32,
    pub check_delay_ms: u64,
    pub countdown: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            max_password: 9999,
            check_delay_ms: 5,
            countdown: 10,
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    pub server: ServerConfig,
    pub counter: CounterConfig,
    pub intersection: IntersectionConfig,
    pub join: JoinConfig,
    pub vault: VaultConfig,
}

impl HarnessConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| HarnessError::io(path, err))?;
        Self::from_toml_str(&content)
    }

    /// Reads the file named by `THREAD_HAZARDS_CONFIG` (defaults when unset),
    /// then applies the per-field environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(HOST_ENV) {
            self.server.host = host;
        }
        if let Some(port) = lookup(PORT_ENV) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|err| HarnessError::config(format!("{PORT_ENV}='{port}': {err}")))?;
        }
        if let Some(size) = lookup(POOL_SIZE_ENV) {
            self.server.pool_size = size
                .trim()
                .parse()
                .map_err(|err| HarnessError::config(format!("{POOL_SIZE_ENV}='{size}': {err}")))?;
        }
        if let Some(path) = lookup(CORPUS_ENV) {
            self.server.corpus_path = PathBuf::from(path);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.pool_size == 0 {
            return Err(HarnessError::config("server.pool_size must be greater than zero"));
        }
        if self.server.queue_capacity == Some(0) {
            return Err(HarnessError::config("server.queue_capacity must be greater than zero when set"));
        }
        self.server.socket_addr()?;
        if self.counter.trials == 0 {
            return Err(HarnessError::config("counter.trials must be greater than zero"));
        }
        if self.intersection.timeout_ms == 0 {
            return Err(HarnessError::config("intersection.timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}
