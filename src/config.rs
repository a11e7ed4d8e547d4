use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_VERSION: u64 = 1;

pub const DEFAULT_WORKER_URL: &str = "https://callback-dropbox.ianbicking.workers.dev";

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("clerk")
        .join("config.json")
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("clerk")
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ClerkConfig {
    pub version: u64,
    /// Relay endpoint offered when pairing.
    pub worker_url: String,
    /// Identity stamped on outbound messages; inbound messages carrying it
    /// are echoes.
    pub sender: String,
    pub poll_interval_secs: u64,
    /// Delete consumed inbound messages from the relay.
    pub acknowledge: bool,
    pub state_dir: PathBuf,
    pub debug_logging: bool,
}

impl Default for ClerkConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            worker_url: DEFAULT_WORKER_URL.into(),
            sender: "clerk".into(),
            poll_interval_secs: 60,
            acknowledge: true,
            state_dir: default_state_dir(),
            debug_logging: false,
        }
    }
}

impl ClerkConfig {
    /// Load from the default location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&default_config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(cfg) => cfg,
                Err(e) => {
                    log::warn!("Ignoring invalid config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn store_path(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }

    /// Tab list exported by the browser bridge.
    pub fn tabs_path(&self) -> PathBuf {
        self.state_dir.join("tabs.json")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.join("clerk.sock")
    }
}
