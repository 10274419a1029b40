//! Exit codes the shell reports.

pub const SUCCESS: i32 = 0;
/// File errors, bad arguments, spawn failures.
pub const FAILURE: i32 = 1;
pub const NOT_FOUND: i32 = 127;

/// Convert an OS process status into shell-style exit code semantics.
///
/// On Unix, processes terminated by signal map to `128 + signal`.
pub fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    FAILURE
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn normal_exit_passes_through() {
        assert_eq!(exit_code(std::process::ExitStatus::from_raw(3 << 8)), 3);
    }

    #[test]
    fn signal_maps_to_128_plus_signal() {
        assert_eq!(exit_code(std::process::ExitStatus::from_raw(libc::SIGKILL)), 128 + 9);
    }
}
