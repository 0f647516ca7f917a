//! Configuration Vault – reads/writes `~/.occusense/config.toml`.

use occusense_perception::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted configuration stored in `~/.occusense/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Stream identifier attached to every reading, e.g. `"bus-12/front"`.
    #[serde(default = "default_stream_id")]
    pub stream_id: String,

    /// Detection service endpoint for person regions.
    #[serde(default = "default_person_url")]
    pub person_detector_url: String,

    /// Detection service endpoint for face regions.
    #[serde(default = "default_face_url")]
    pub face_detector_url: String,

    /// Per-request timeout for the detection services (milliseconds).
    #[serde(default = "default_detector_timeout_ms")]
    pub detector_timeout_ms: u64,

    /// SQLite reading log. Defaults to `~/.occusense/readings.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,

    /// Keep each encoded frame next to its reading in the reading log.
    #[serde(default)]
    pub store_frames: bool,

    /// Frames allowed to wait for the engine.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_stream_id() -> String {
    "default".to_string()
}
fn default_person_url() -> String {
    "http://localhost:8500/detect/person".to_string()
}
fn default_face_url() -> String {
    "http://localhost:8500/detect/face".to_string()
}
fn default_detector_timeout_ms() -> u64 {
    2_000
}
fn default_queue_depth() -> usize {
    16
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream_id: default_stream_id(),
            person_detector_url: default_person_url(),
            face_detector_url: default_face_url(),
            detector_timeout_ms: default_detector_timeout_ms(),
            database_path: None,
            store_frames: false,
            queue_depth: default_queue_depth(),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Resolved reading log path.
    pub fn database_path(&self) -> PathBuf {
        match &self.database_path {
            Some(p) => PathBuf::from(p),
            None => config_dir().join("readings.db"),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// `~/.occusense`
pub fn config_dir() -> PathBuf {
    PathBuf::from(home_dir()).join(".occusense")
}

/// Return the path to `~/.occusense/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".occusense").join("config.toml")
}

/// Load the config from `path`, falling back to defaults when the file does
/// not exist. Environment overrides are applied and the engine section is
/// validated in both cases.
pub fn load_or_default(path: &Path) -> Result<Config, String> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    cfg.engine.validate().map_err(|e| e.to_string())?;
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `OCCUSENSE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `OCCUSENSE_STREAM_ID` | `stream_id` |
/// | `OCCUSENSE_PERSON_URL` | `person_detector_url` |
/// | `OCCUSENSE_FACE_URL` | `face_detector_url` |
/// | `OCCUSENSE_DB` | `database_path` |
/// | `OCCUSENSE_STORE_FRAMES` | `store_frames` (`true` / `1`) |
/// | `OCCUSENSE_HISTORY_CAPACITY` | `engine.history_capacity` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("OCCUSENSE_STREAM_ID") {
        cfg.stream_id = v;
    }
    if let Ok(v) = std::env::var("OCCUSENSE_PERSON_URL") {
        cfg.person_detector_url = v;
    }
    if let Ok(v) = std::env::var("OCCUSENSE_FACE_URL") {
        cfg.face_detector_url = v;
    }
    if let Ok(v) = std::env::var("OCCUSENSE_DB") {
        cfg.database_path = Some(v);
    }
    if let Ok(v) = std::env::var("OCCUSENSE_STORE_FRAMES") {
        cfg.store_frames = matches!(v.trim(), "1" | "true");
    }
    if let Ok(v) = std::env::var("OCCUSENSE_HISTORY_CAPACITY")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.engine.history_capacity = n;
    }
}

/// Save the config to a specific path, creating the parent directory with
/// owner-only permissions.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
