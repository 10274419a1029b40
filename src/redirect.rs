use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;

use log::debug;

use crate::ast::{Redirect, Stage};
use crate::error::LaunchError;

/// The files a stage's redirections resolved to. Each handle is owned, so it
/// is closed when this value (or the `Stdio` it was moved into) is dropped,
/// whichever way the launch ends.
#[derive(Debug, Default)]
pub struct OpenedRedirects {
    pub input: Option<File>,
    pub output: Option<File>,
    pub error: Option<File>,
}

impl OpenedRedirects {
    /// Open every target the stage names: input first, then output, then
    /// error. Stops at the first failure; anything already opened is closed.
    pub fn open(stage: &Stage) -> Result<Self, LaunchError> {
        let mut opened = Self::default();

        if let Some(redirect) = &stage.input {
            opened.input = Some(open_read(redirect).map_err(|source| LaunchError::Input {
                path: redirect.path.clone(),
                source,
            })?);
        }
        if let Some(redirect) = &stage.output {
            opened.output = Some(open_write(redirect).map_err(|source| LaunchError::Output {
                path: redirect.path.clone(),
                source,
            })?);
        }
        if let Some(redirect) = &stage.error {
            opened.error = Some(open_write(redirect).map_err(|source| LaunchError::Error {
                path: redirect.path.clone(),
                source,
            })?);
        }

        Ok(opened)
    }
}

/// Resolve a target to an absolute path, mapping `/dev/null` to the
/// platform's null device.
pub fn resolve_path(path: &str) -> io::Result<PathBuf> {
    if is_null_device(path) {
        return Ok(PathBuf::from(if cfg!(windows) { "NUL" } else { "/dev/null" }));
    }
    std::path::absolute(path)
}

fn open_read(redirect: &Redirect) -> io::Result<File> {
    let path = resolve_path(&redirect.path)?;
    debug!("redirect stdin from {}", path.display());
    File::open(path)
}

fn open_write(redirect: &Redirect) -> io::Result<File> {
    let path = resolve_path(&redirect.path)?;
    debug!("redirect to {} (append: {})", path.display(), redirect.append);
    let mut options = OpenOptions::new();
    options.create(true);
    if redirect.append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options.open(path)
}

/// Check if a path refers to a null device (cross-platform).
pub fn is_null_device(path: &str) -> bool {
    if cfg!(windows) {
        path.eq_ignore_ascii_case("NUL") || path.eq_ignore_ascii_case("/dev/null")
    } else {
        path == "/dev/null"
    }
}
