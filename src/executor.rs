use std::fs::File;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use log::{debug, info};
use os_pipe::{PipeReader, PipeWriter};

use crate::ast::Stage;
use crate::error::LaunchError;
use crate::jobs::JobTable;
use crate::redirect::OpenedRedirects;
use crate::resolver;
use crate::status::{self, FAILURE, SUCCESS};

/// The three streams a stage is bound to. `None` means the shell's own
/// stream.
#[derive(Debug, Default)]
pub struct StageIo {
    pub stdin: Option<PipeReader>,
    pub stdout: Option<PipeWriter>,
    pub stderr: Option<PipeWriter>,
}

/// Launch one stage and report its exit code.
///
/// `jobs` is only given for standalone invocations: a background stage is
/// then registered as a job instead of being waited on. Failures are
/// reported on stderr and mapped to 1 (I/O) or 127 (not found).
pub fn launch(stage: &Stage, io: StageIo, jobs: Option<&mut JobTable>) -> i32 {
    match try_launch(stage, io, jobs) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("jshell: {err}");
            err.exit_code()
        }
    }
}

fn try_launch(stage: &Stage, io: StageIo, jobs: Option<&mut JobTable>) -> Result<i32, LaunchError> {
    let Some(program) = stage.program() else {
        return Ok(FAILURE);
    };

    // Targets are opened before resolution, so `nosuch > out` still
    // creates `out`.
    let redirects = OpenedRedirects::open(stage)?;
    let executable =
        resolver::resolve(program).ok_or_else(|| LaunchError::NotFound(program.to_string()))?;

    let mut child = spawn(&executable, stage, io, redirects)?;
    debug!("spawned {} as pid {}", executable.display(), child.id());

    match jobs {
        Some(jobs) if stage.background => {
            jobs.register(child, stage.command_line(), &mut io::stdout());
            Ok(SUCCESS)
        }
        _ => {
            let status = child.wait().map_err(|source| LaunchError::Wait {
                program: program.to_string(),
                source,
            })?;
            let code = status::exit_code(status);
            info!("{program} exited with {code}");
            Ok(code)
        }
    }
}

/// Build and spawn the process. The `Command` (and with it every endpoint
/// and file moved into it) is dropped on return, so the parent keeps no copy
/// of a pipe end that would hold back EOF for the next stage.
fn spawn(
    executable: &Path,
    stage: &Stage,
    io: StageIo,
    redirects: OpenedRedirects,
) -> Result<Child, LaunchError> {
    let mut command = Command::new(executable);
    command
        .args(&stage.args[1..])
        .stdin(bind(redirects.input, io.stdin))
        .stdout(bind(redirects.output, io.stdout))
        .stderr(bind(redirects.error, io.stderr));

    command.spawn().map_err(|source| LaunchError::Spawn {
        program: stage.args[0].clone(),
        source,
    })
}

/// A redirection file wins over a channel endpoint; with neither, the
/// child inherits the shell's stream.
fn bind<T: Into<Stdio>>(file: Option<File>, endpoint: Option<T>) -> Stdio {
    match (file, endpoint) {
        (Some(file), _) => file.into(),
        (None, Some(endpoint)) => endpoint.into(),
        (None, None) => Stdio::inherit(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::ast::Redirect;
    use std::io::Read;

    fn stage(args: &[&str]) -> Stage {
        Stage { args: args.iter().map(|s| s.to_string()).collect(), ..Stage::default() }
    }

    #[test]
    fn passes_exit_status_through() {
        assert_eq!(launch(&stage(&["sh", "-c", "exit 3"]), StageIo::default(), None), 3);
        assert_eq!(launch(&stage(&["true"]), StageIo::default(), None), 0);
    }

    #[test]
    fn unknown_command_is_127() {
        let code = launch(&stage(&["definitely-not-a-command-xyz"]), StageIo::default(), None);
        assert_eq!(code, 127);
    }

    #[test]
    fn stdout_goes_to_pipe_endpoint() {
        let (mut reader, writer) = os_pipe::pipe().unwrap();
        let io = StageIo { stdout: Some(writer), ..StageIo::default() };
        assert_eq!(launch(&stage(&["sh", "-c", "echo hello"]), io, None), 0);

        // Every write end is closed once launch returns, so this sees EOF.
        let mut output = String::new();
        reader.read_to_string(&mut output).unwrap();
        assert_eq!(output, "hello\n");
    }

    #[test]
    fn stderr_goes_to_pipe_endpoint() {
        let (mut reader, writer) = os_pipe::pipe().unwrap();
        let io = StageIo { stderr: Some(writer), ..StageIo::default() };
        launch(&stage(&["sh", "-c", "echo oops 1>&2"]), io, None);

        let mut output = String::new();
        reader.read_to_string(&mut output).unwrap();
        assert_eq!(output, "oops\n");
    }

    #[test]
    fn stdin_comes_from_pipe_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("copy.txt");
        let (reader, mut writer) = os_pipe::pipe().unwrap();
        std::io::Write::write_all(&mut writer, b"piped\n").unwrap();
        drop(writer);

        let mut cat = stage(&["cat"]);
        cat.output = Some(Redirect::truncate(target.to_string_lossy()));
        let io = StageIo { stdin: Some(reader), ..StageIo::default() };
        assert_eq!(launch(&cat, io, None), 0);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "piped\n");
    }

    #[test]
    fn arguments_with_spaces_stay_single_arguments() {
        let (mut reader, writer) = os_pipe::pipe().unwrap();
        let io = StageIo { stdout: Some(writer), ..StageIo::default() };
        launch(&stage(&["sh", "-c", "echo $#", "sh", "one arg", "two"]), io, None);

        let mut output = String::new();
        reader.read_to_string(&mut output).unwrap();
        assert_eq!(output.trim(), "2");
    }

    #[test]
    fn redirect_failure_is_1_and_does_not_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let mut touch = stage(&["touch", &marker.to_string_lossy()]);
        touch.input = Some(Redirect::truncate(dir.path().join("missing.txt").to_string_lossy()));

        assert_eq!(launch(&touch, StageIo::default(), None), 1);
        assert!(!marker.exists());
    }

    #[test]
    fn output_target_is_created_even_when_command_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let mut missing = stage(&["definitely-not-a-command-xyz"]);
        missing.output = Some(Redirect::truncate(target.to_string_lossy()));

        assert_eq!(launch(&missing, StageIo::default(), None), 127);
        assert!(target.exists());
    }

    #[test]
    fn background_stage_registers_a_job() {
        let mut jobs = JobTable::new();
        let mut sleeper = stage(&["sleep", "5"]);
        sleeper.background = true;

        assert_eq!(launch(&sleeper, StageIo::default(), Some(&mut jobs)), 0);
        assert_eq!(jobs.ids(), vec![1]);
        jobs.kill(1).unwrap();
    }

    #[test]
    fn background_without_registry_is_waited_on() {
        let mut quick = stage(&["sh", "-c", "exit 4"]);
        quick.background = true;
        assert_eq!(launch(&quick, StageIo::default(), None), 4);
    }
}
