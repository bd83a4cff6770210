use std::env;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

const CONFIG_SCHEMA_VERSION: u32 = 1;
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_LOCK_WAIT_SECONDS: u64 = 10;
pub const DEFAULT_BASE_URL: &str = "https://my.activecloud.com/ru/staffapi/index.php";
pub const DEFAULT_STAFF_URL: &str = "https://my.activecloud.com/ru/staff/index.php";
pub const DEFAULT_OPEN_STATUS_ID: &str = "4";
pub const DEFAULT_DEPARTMENT_IDS: [&str; 6] = ["6", "11", "70", "71", "100", "108"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketsConfig {
    pub schema_version: u32,
    pub base_url: String,
    pub staff_url: String,
    pub department_ids: Vec<String>,
    pub open_status_id: String,
    pub session_file: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub credentials: Option<Credentials>,
    pub department_ids: Vec<String>,
    pub open_status_id: String,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub request_timeout: Duration,
    pub lock_wait: Duration,
}

impl Default for TicketsConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            base_url: DEFAULT_BASE_URL.to_string(),
            staff_url: DEFAULT_STAFF_URL.to_string(),
            department_ids: DEFAULT_DEPARTMENT_IDS.iter().map(|id| id.to_string()).collect(),
            open_status_id: DEFAULT_OPEN_STATUS_ID.to_string(),
            session_file: None,
            username: None,
            password: None,
        }
    }
}

impl TicketsConfig {
    pub fn load_or_init() -> Result<Self> {
        let cfg_path = config_path();
        let raw = match fs::read_to_string(&cfg_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let cfg = TicketsConfig::default();
                cfg.save()?;
                debug!(path = %cfg_path.display(), "wrote default config");
                return Ok(cfg);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", cfg_path.display()));
            }
        };

        let mut parsed: TicketsConfig = serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON in {}", cfg_path.display()))?;
        if parsed.normalize_and_migrate() {
            parsed.save()?;
        }
        Ok(parsed)
    }

    // Written through a temp file so a concurrent poll never reads half a config.
    pub fn save(&self) -> Result<()> {
        let home = config_home();
        fs::create_dir_all(&home)
            .with_context(|| format!("failed to create config directory {}", home.display()))?;

        let path = config_path();
        let data = serde_json::to_string_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(&home)
            .with_context(|| format!("failed to stage {}", path.display()))?;
        tmp.write_all(data.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        tmp.persist(&path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }

    pub fn session_path(&self) -> PathBuf {
        match &self.session_file {
            Some(path) if path.is_relative() => config_home().join(path),
            Some(path) => path.clone(),
            None => config_home().join("session_id.txt"),
        }
    }

    pub fn effective_credentials(&self) -> Option<Credentials> {
        let username = env_string("KAYAKO_USERNAME").or_else(|| non_blank(&self.username))?;
        let password = env_string("KAYAKO_PASSWORD").or_else(|| non_blank(&self.password))?;
        Some(Credentials { username, password })
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            credentials: self.effective_credentials(),
            department_ids: self.department_ids.clone(),
            open_status_id: self.open_status_id.clone(),
        }
    }

    fn normalize_and_migrate(&mut self) -> bool {
        let mut changed = false;

        if self.schema_version < CONFIG_SCHEMA_VERSION {
            self.schema_version = CONFIG_SCHEMA_VERSION;
            changed = true;
        }

        for (value, fallback) in [
            (&mut self.base_url, DEFAULT_BASE_URL),
            (&mut self.staff_url, DEFAULT_STAFF_URL),
            (&mut self.open_status_id, DEFAULT_OPEN_STATUS_ID),
        ] {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                *value = fallback.to_string();
                changed = true;
            } else if trimmed != *value {
                *value = trimmed;
                changed = true;
            }
        }

        let normalized_ids: Vec<String> = self
            .department_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if normalized_ids.is_empty() {
            self.department_ids = TicketsConfig::default().department_ids;
            changed = true;
        } else if normalized_ids != self.department_ids {
            self.department_ids = normalized_ids;
            changed = true;
        }

        if self
            .session_file
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            self.session_file = None;
            changed = true;
        }
        for item in [&mut self.username, &mut self.password] {
            if item.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *item = None;
                changed = true;
            }
        }

        changed
    }
}

pub fn runtime_settings() -> RuntimeSettings {
    RuntimeSettings {
        request_timeout: Duration::from_secs(env_u64(
            "KAYAKO_TIMEOUT_SECONDS",
            DEFAULT_TIMEOUT_SECONDS,
        )),
        lock_wait: Duration::from_secs(env_u64(
            "KAYAKO_LOCK_WAIT_SECONDS",
            DEFAULT_LOCK_WAIT_SECONDS,
        )),
    }
}

pub fn config_home() -> PathBuf {
    if let Ok(custom) = env::var("KAYAKO_TICKETS_HOME") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kayako-tickets")
}

pub fn config_path() -> PathBuf {
    config_home().join("config.json")
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
