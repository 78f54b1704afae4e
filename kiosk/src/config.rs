use std::env::var_os;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use kiosk_hmi::config::HmiConfig;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// The PIN that grants access.
    pub pin: String,
    /// How long access stays granted.
    pub access_seconds: u32,
    /// How long PIN entry waits for a key before giving up.
    pub idle_timeout_ms: u64,
    pub hmi: HmiConfig,
}

impl Config {
    /// Path of the config file, from `CONFIG_FILE` or `config.json`.
    pub fn path() -> PathBuf {
        let config_str = var_os("CONFIG_FILE");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new("config.json"));
        PathBuf::from(config_str)
    }

    pub fn try_load() -> Option<Self> {
        Self::try_load_from(&Self::path())
    }

    pub fn try_load_from(config_path: &Path) -> Option<Self> {
        if config_path.exists() {
            let file = std::fs::File::open(config_path).ok()?;
            let reader = std::io::BufReader::new(file);
            serde_json::from_reader(reader).ok()
        } else {
            None
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, config_path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(config_path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pin: "1234".to_string(),
            access_seconds: 5,
            idle_timeout_ms: 10_000,
            hmi: HmiConfig::default(),
        }
    }
}
