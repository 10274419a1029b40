use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

/// Command history, oldest first, optionally backed by a plain-text file
/// with one entry per line.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<String>,
    max: usize,
    path: Option<PathBuf>,
}

impl History {
    /// In-memory history that never touches the filesystem.
    pub fn new(max: usize) -> Self {
        Self { entries: Vec::new(), max, path: None }
    }

    /// Load the history file at `path`. A missing or unreadable file starts
    /// an empty history that is still saved to `path`.
    pub fn open(path: PathBuf, max: usize) -> Self {
        let mut history = Self::new(max);
        history.entries = load(&path);
        history.truncate();
        debug!("loaded {} history entries from {}", history.entries.len(), path.display());
        history.path = Some(path);
        history
    }

    /// Record a line. Blank lines and immediate repeats are skipped; the
    /// line is appended to the backing file right away.
    pub fn add(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() || self.entries.last().map(String::as_str) == Some(trimmed) {
            return;
        }
        self.entries.push(trimmed.to_string());
        self.truncate();
        if let Some(path) = &self.path {
            if let Err(e) = append(path, trimmed) {
                warn!("cannot append to {}: {e}", path.display());
            }
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// The last `count` entries with their 1-based positions.
    pub fn tail(&self, count: usize) -> impl Iterator<Item = (usize, &str)> {
        let skip = self.entries.len().saturating_sub(count);
        self.entries
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(idx, line)| (idx + 1, line.as_str()))
    }

    /// Rewrite the backing file with the capped history.
    pub fn save(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut contents = self.entries.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        fs::write(path, contents)
    }

    fn truncate(&mut self) {
        if self.entries.len() > self.max {
            let excess = self.entries.len() - self.max;
            self.entries.drain(..excess);
        }
    }
}

fn load(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

fn append(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}
