use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::expander::{expand_home, home_dir};

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

/// Directory name used under the config and data directories.
const APP_DIR: &str = "jshell";

// ── Final (merged) config types ──

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    pub prompt: String,
    pub save_history: bool,
    pub max_history: usize,
    pub history_file: String,
    pub rc_file: String,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: "[{cwd}] > ".to_string(),
            save_history: true,
            max_history: 1000,
            history_file: ".jshell_history".to_string(),
            rc_file: ".jshellrc".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "off".to_string(), file: String::new() }
    }
}

// ── User overlay types (all fields optional) ──

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigOverlay {
    prompt: Option<String>,
    save_history: Option<bool>,
    max_history: Option<usize>,
    history_file: Option<String>,
    rc_file: Option<String>,
    #[serde(default)]
    logging: LoggingOverlay,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LoggingOverlay {
    level: Option<String>,
    file: Option<String>,
}

impl Config {
    /// The embedded default configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::warn!("embedded config failed to parse: {e}");
            Self::default()
        })
    }

    /// Embedded defaults, overlaid by `<config dir>/jshell/config.toml` when
    /// present. Scalars in the user file override the defaults.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        if let Some(overlay) = config_path().and_then(|path| load_overlay(&path)) {
            config.apply_overlay(overlay);
        }
        config
    }

    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        if let Some(v) = overlay.prompt {
            self.prompt = v;
        }
        if let Some(v) = overlay.save_history {
            self.save_history = v;
        }
        if let Some(v) = overlay.max_history {
            self.max_history = v;
        }
        if let Some(v) = overlay.history_file {
            self.history_file = v;
        }
        if let Some(v) = overlay.rc_file {
            self.rc_file = v;
        }
        if let Some(v) = overlay.logging.level {
            self.logging.level = v;
        }
        if let Some(v) = overlay.logging.file {
            self.logging.file = v;
        }
    }

    pub fn history_path(&self) -> PathBuf {
        in_home(&self.history_file)
    }

    pub fn rc_path(&self) -> PathBuf {
        in_home(&self.rc_file)
    }

    /// The log file; empty means `<data dir>/jshell/jshell.log`.
    pub fn log_path(&self) -> Option<PathBuf> {
        if self.logging.file.is_empty() {
            data_dir().map(|dir| dir.join("jshell.log"))
        } else {
            Some(in_home(&self.logging.file))
        }
    }

    /// Render the prompt for the given working directory.
    pub fn render_prompt(&self, cwd: &Path) -> String {
        self.prompt.replace("{cwd}", &display_cwd(cwd, &home_dir()))
    }
}

fn load_overlay(path: &Path) -> Option<ConfigOverlay> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(overlay) => Some(overlay),
        Err(e) => {
            eprintln!("jshell: config parse error in {}: {e}", path.display());
            None
        }
    }
}

/// `$HOME/.config/jshell/config.toml`, or the platform config directory
/// when no home variable is set.
pub fn config_path() -> Option<PathBuf> {
    let dir = match home_var() {
        Some(home) => home.join(".config"),
        None => dirs::config_dir()?,
    };
    Some(dir.join(APP_DIR).join("config.toml"))
}

/// `$HOME/.local/share/jshell`, or the platform data directory.
pub fn data_dir() -> Option<PathBuf> {
    let dir = match home_var() {
        Some(home) => home.join(".local").join("share"),
        None => dirs::data_dir()?,
    };
    Some(dir.join(APP_DIR))
}

fn home_var() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

/// Relative paths are taken from the home directory; `~` is expanded.
fn in_home(path: &str) -> PathBuf {
    let expanded = PathBuf::from(expand_home(path));
    if expanded.is_absolute() {
        expanded
    } else {
        PathBuf::from(home_dir()).join(expanded)
    }
}

fn display_cwd(cwd: &Path, home: &str) -> String {
    let cwd = cwd.to_string_lossy().into_owned();
    if home.is_empty() {
        return cwd;
    }
    match cwd.strip_prefix(home) {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => format!("~{rest}"),
        _ => cwd.clone(),
    }
}
