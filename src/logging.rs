//! File logging behind the `log` facade.
//!
//! The shell's own stdout and stderr belong to the commands it runs, so log
//! records only ever go to a file.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::str::FromStr;

use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

use crate::config::Config;

/// Overrides the configured level.
pub const LEVEL_ENV: &str = "JSHELL_LOG";

/// Install the file logger. Best-effort: a bad level or an unwritable file
/// is reported once and the shell runs without logging.
pub fn init(config: &Config) {
    let level = std::env::var(LEVEL_ENV).unwrap_or_else(|_| config.logging.level.clone());
    let filter = match parse_level(&level) {
        Some(filter) => filter,
        None => {
            eprintln!("jshell: unknown log level {level:?}; logging disabled");
            return;
        }
    };
    if filter == LevelFilter::Off {
        return;
    }

    let Some(path) = config.log_path() else {
        return;
    };
    if let Err(e) = install(filter, &path) {
        eprintln!("jshell: cannot log to {}: {e}", path.display());
    }
}

fn install(filter: LevelFilter, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let config = ConfigBuilder::new().set_thread_level(LevelFilter::Error).build();
    WriteLogger::init(filter, config, file)?;
    log::info!("jshell {} started, pid {}", env!("CARGO_PKG_VERSION"), std::process::id());
    Ok(())
}

fn parse_level(level: &str) -> Option<LevelFilter> {
    LevelFilter::from_str(level.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("off"), Some(LevelFilter::Off));
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::Debug));
        assert_eq!(parse_level(" warn "), Some(LevelFilter::Warn));
        assert_eq!(parse_level("loud"), None);
    }
}
