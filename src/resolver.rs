use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::debug;

/// Suffixes tried for every candidate, in preference order.
pub const EXECUTABLE_SUFFIXES: &[&str] = &["", ".exe", ".bat", ".cmd", ".com"];

/// Locate a runnable file for `name`.
///
/// A name containing a path separator is checked literally. Otherwise the
/// current directory is searched first, then each `PATH` entry in order.
/// Returns an absolute path; the first match wins.
pub fn resolve(name: &str) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok();
    let search_path = std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect::<Vec<_>>())
        .unwrap_or_default();
    let found = resolve_in(name, cwd.as_deref(), &search_path);
    debug!("resolve {name:?} -> {found:?}");
    found
}

/// Resolution against an explicit working directory and search path.
pub fn resolve_in(name: &str, cwd: Option<&Path>, search_path: &[PathBuf]) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    if name.chars().any(std::path::is_separator) {
        return first_match(Path::new(name)).and_then(|path| std::path::absolute(path).ok());
    }

    cwd.into_iter()
        .map(Path::to_path_buf)
        .chain(search_path.iter().filter(|dir| !dir.as_os_str().is_empty()).cloned())
        .find_map(|dir| first_match(&dir.join(name)))
        .and_then(|path| std::path::absolute(path).ok())
}

fn first_match(base: &Path) -> Option<PathBuf> {
    EXECUTABLE_SUFFIXES
        .iter()
        .map(|suffix| with_suffix(base, suffix))
        .find(|candidate| is_executable(candidate))
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Check if a path points to an executable file.
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }

    // On Unix, check the executable permission bits
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }

    // On Windows, the suffix list already decided what counts as runnable
    #[cfg(not(unix))]
    {
        true
    }
}
