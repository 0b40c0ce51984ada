//! Agent configuration
//!
//! Configuration can be loaded from a TOML file and/or environment
//! variables (`RODENT_*`). The event pipeline is tuned through named
//! profiles; explicit positive per-field overrides win over the profile
//! presets, zero or negative overrides are ignored.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::Level;
use crate::{Error, Result};

/// Main configuration for the rodent agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Controller connectivity
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Filesystem paths
    #[serde(default)]
    pub paths: PathsConfig,

    /// Event pipeline tuning
    #[serde(default)]
    pub events: EventPipelineConfig,
}

/// Controller connectivity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Primary endpoint for request/response traffic
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Dedicated RPC endpoint for the streaming transport
    #[serde(default = "default_rpc_endpoint")]
    pub rpc_endpoint: String,

    /// Bearer token identifying this node
    #[serde(default)]
    pub token: String,

    /// Development mode only: skip TLS on the streaming transport
    #[serde(default)]
    pub insecure: bool,
}

fn default_endpoint() -> String {
    "https://api.stratastor.example".to_string()
}

fn default_rpc_endpoint() -> String {
    "https://rpc.stratastor.example".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            rpc_endpoint: default_rpc_endpoint(),
            token: String::new(),
            insecure: false,
        }
    }
}

/// Filesystem path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the agent's state directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// PID file used for single-instance enforcement
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/rodent")
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/var/run/rodent.pid")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pid_file: default_pid_file(),
        }
    }
}

/// State directory layout
///
/// Ensured-existent at startup. Only `events/` has a mandated on-disk
/// format (spilled batch files).
#[derive(Debug, Clone)]
pub struct DataDirs {
    root: PathBuf,
}

impl DataDirs {
    const SUBDIRS: [&'static str; 6] = ["services", "keys", "ssh", "transfers", "events", "disks"];

    /// Describe the layout under `root` without touching the filesystem
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root and every subdirectory
    pub fn ensure(&self) -> Result<()> {
        for sub in Self::SUBDIRS {
            std::fs::create_dir_all(self.root.join(sub))?;
        }
        Ok(())
    }

    /// Root of the state directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding issued certificate material
    pub fn keys(&self) -> PathBuf {
        self.root.join("keys")
    }

    /// Directory holding spilled event batches
    pub fn events(&self) -> PathBuf {
        self.root.join("events")
    }

    /// Directory holding service definitions
    pub fn services(&self) -> PathBuf {
        self.root.join("services")
    }

    /// Directory holding SSH key material
    pub fn ssh(&self) -> PathBuf {
        self.root.join("ssh")
    }

    /// Directory holding transfer state
    pub fn transfers(&self) -> PathBuf {
        self.root.join("transfers")
    }

    /// Directory holding disk inventory state
    pub fn disks(&self) -> PathBuf {
        self.root.join("disks")
    }
}

/// Named event pipeline tuning profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Balanced defaults
    Default,
    /// Large buffer, big batches, relaxed cadence
    HighThroughput,
    /// Small batches on a tight cadence
    LowLatency,
    /// Small buffer, errors only
    Minimal,
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Default
    }
}

/// Event pipeline configuration
///
/// Numeric fields are overrides on top of the selected profile; values
/// of zero or below leave the profile preset in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPipelineConfig {
    /// Tuning profile to start from
    #[serde(default)]
    pub profile: Profile,

    /// Buffer capacity override
    #[serde(default)]
    pub capacity: i64,

    /// Flush high-water mark override
    #[serde(default)]
    pub high_water: i64,

    /// Batch size override
    #[serde(default)]
    pub batch_size: i64,

    /// Batch timeout override, milliseconds
    #[serde(default)]
    pub batch_timeout_ms: i64,

    /// Emit channel capacity override
    #[serde(default)]
    pub channel_capacity: i64,
}

impl Default for EventPipelineConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Default,
            capacity: 0,
            high_water: 0,
            batch_size: 0,
            batch_timeout_ms: 0,
            channel_capacity: 0,
        }
    }
}

/// Fully-resolved event pipeline tunings
#[derive(Debug, Clone)]
pub struct EventPipelineSettings {
    /// Maximum buffered events
    pub capacity: usize,
    /// Buffer occupancy that triggers a disk flush
    pub high_water: usize,
    /// Events per delivered batch
    pub batch_size: usize,
    /// Cadence of forced batch sends
    pub batch_timeout: Duration,
    /// Capacity of the emit channel
    pub channel_capacity: usize,
    /// Levels that pass the filter
    pub enabled_levels: HashSet<Level>,
}

impl EventPipelineSettings {
    fn preset(profile: Profile) -> Self {
        let all_levels: HashSet<Level> =
            [Level::Info, Level::Warn, Level::Error, Level::Critical].into();

        match profile {
            Profile::Default => Self {
                capacity: 20_000,
                high_water: 18_000,
                batch_size: 256,
                batch_timeout: Duration::from_secs(5),
                channel_capacity: 1_000,
                enabled_levels: all_levels,
            },
            Profile::HighThroughput => Self {
                capacity: 50_000,
                high_water: 45_000,
                batch_size: 1_024,
                batch_timeout: Duration::from_secs(10),
                channel_capacity: 4_000,
                enabled_levels: all_levels,
            },
            Profile::LowLatency => Self {
                capacity: 10_000,
                high_water: 9_000,
                batch_size: 64,
                batch_timeout: Duration::from_secs(1),
                channel_capacity: 1_000,
                enabled_levels: all_levels,
            },
            Profile::Minimal => Self {
                capacity: 5_000,
                high_water: 4_500,
                batch_size: 128,
                batch_timeout: Duration::from_secs(30),
                channel_capacity: 500,
                enabled_levels: [Level::Error, Level::Critical].into(),
            },
        }
    }
}

impl EventPipelineConfig {
    /// Resolve the profile preset with positive overrides applied
    pub fn resolve(&self) -> EventPipelineSettings {
        let mut settings = EventPipelineSettings::preset(self.profile);

        if self.capacity > 0 {
            settings.capacity = self.capacity as usize;
        }
        if self.high_water > 0 {
            settings.high_water = self.high_water as usize;
        }
        if self.batch_size > 0 {
            settings.batch_size = self.batch_size as usize;
        }
        if self.batch_timeout_ms > 0 {
            settings.batch_timeout = Duration::from_millis(self.batch_timeout_ms as u64);
        }
        if self.channel_capacity > 0 {
            settings.channel_capacity = self.channel_capacity as usize;
        }

        // A high-water mark past capacity would let the buffer overfill
        // during a flush; clamp it back under.
        if settings.high_water >= settings.capacity {
            settings.high_water = settings.capacity.saturating_sub(settings.capacity / 10).max(1);
        }

        settings
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            paths: PathsConfig::default(),
            events: EventPipelineConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content)
            .map_err(|e| Error::InvalidInput(format!("config parse error: {}", e)))
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = AgentConfig::default();

        if let Ok(endpoint) = std::env::var("RODENT_CONTROLLER_ENDPOINT") {
            config.controller.endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var("RODENT_RPC_ENDPOINT") {
            config.controller.rpc_endpoint = endpoint;
        }
        if let Ok(token) = std::env::var("RODENT_TOKEN") {
            config.controller.token = token;
        }
        if let Ok(v) = std::env::var("RODENT_INSECURE") {
            config.controller.insecure = v == "1" || v.eq_ignore_ascii_case("true");
        }

        if let Ok(dir) = std::env::var("RODENT_DATA_DIR") {
            config.paths.data_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("RODENT_PID_FILE") {
            config.paths.pid_file = PathBuf::from(path);
        }

        if let Ok(profile) = std::env::var("RODENT_EVENTS_PROFILE") {
            match profile.as_str() {
                "default" => config.events.profile = Profile::Default,
                "high-throughput" => config.events.profile = Profile::HighThroughput,
                "low-latency" => config.events.profile = Profile::LowLatency,
                "minimal" => config.events.profile = Profile::Minimal,
                other => tracing::warn!(profile = other, "unknown events profile, keeping default"),
            }
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                return Self::from_file(p);
            }
        }
        Ok(Self::from_env())
    }
}
