use std::path::PathBuf;
use serde::Deserialize;

/// All configuration for the querydesk application.
///
/// Precedence (lowest to highest): defaults → config file → env var → CLI arg.
/// CLI arg merging is done by the caller after `Config::load()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // Database
    pub db_url: String,
    pub migrate: bool,

    // Server
    pub port: u16,
    /// Idle sessions are dropped after this many seconds.
    pub session_idle_secs: u64,

    // Logging
    pub log_level: String,
    pub utc: bool,
}

/// Config file layout (~/.querydesk/config.toml). All fields optional; they
/// layer on top of compiled-in defaults.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    db_url: Option<String>,
    migrate: Option<bool>,
    port: Option<u16>,
    session_idle_secs: Option<u64>,
    log_level: Option<String>,
    utc: Option<bool>,
}

impl Config {
    /// Config directory: ~/.querydesk/
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".querydesk")
    }

    /// Config file path: ~/.querydesk/config.toml
    pub fn file_path() -> PathBuf {
        Self::dir().join("config.toml")
    }

    /// Load config: defaults → config file → env vars.
    /// CLI args should be merged by the caller afterward.
    pub fn load() -> Self {
        let mut config = Self::defaults();

        // Layer 2: config file
        if let Ok(contents) = std::fs::read_to_string(Self::file_path()) {
            if let Ok(file) = toml::from_str::<FileConfig>(&contents) {
                config.apply_file(file);
            }
        }

        // Layer 3: environment variables
        config.apply_vars(|key| std::env::var(key).ok());

        config
    }

    pub fn defaults() -> Self {
        Self {
            db_url: "sqlite:querydesk.db".to_string(),
            migrate: true,
            port: 3000,
            session_idle_secs: 30 * 60,
            log_level: "info".to_string(),
            utc: false,
        }
    }

    // --- Private helpers ---

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.db_url { self.db_url = v; }
        if let Some(v) = file.migrate { self.migrate = v; }
        if let Some(v) = file.port { self.port = v; }
        if let Some(v) = file.session_idle_secs { self.session_idle_secs = v; }
        if let Some(v) = file.log_level { self.log_level = v; }
        if let Some(v) = file.utc { self.utc = v; }
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("QUERYDESK_DB_URL") { self.db_url = v; }
        if let Some(v) = var("QUERYDESK_MIGRATE") { self.migrate = truthy(&v); }
        if let Some(v) = var("QUERYDESK_PORT") {
            if let Ok(p) = v.parse() { self.port = p; }
        }
        if let Some(v) = var("QUERYDESK_SESSION_IDLE_SECS") {
            if let Ok(secs) = v.parse() { self.session_idle_secs = secs; }
        }
        if let Some(v) = var("QUERYDESK_LOG_LEVEL") { self.log_level = v; }
        if let Some(v) = var("QUERYDESK_UTC") { self.utc = truthy(&v); }
    }
}

fn truthy(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}
