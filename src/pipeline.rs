//! Multi-stage pipeline execution.
//!
//! One OS pipe per adjacent pair of stages and one thread per external
//! stage. Builtin stages run in-process on the caller's thread before the
//! stage threads start, against the shell's real stdout/stderr: their
//! channel ends are closed unused, so the neighbouring stages see EOF or a
//! broken pipe. The only state the stage threads share is the exit-code
//! table.
//!
//! Builtin stages are therefore not concurrent with the rest of the
//! pipeline. They run one after another in stage order, and every external
//! stage waits for them: a blocking builtin such as `fg` or `wait` holds
//! back the whole pipeline until it returns, and a builtin never sees the
//! output of an earlier external stage.

use std::io;
use std::sync::{Mutex, PoisonError};
use std::thread;

use log::{debug, warn};

use crate::ast::{Pipeline, Stage};
use crate::builtins;
use crate::executor::{self, StageIo};
use crate::shell::Shell;
use crate::status::{FAILURE, SUCCESS};

/// Run a pipeline of two or more stages and return the last stage's exit
/// code.
pub fn run(shell: &mut Shell, pipeline: &Pipeline) -> i32 {
    let count = pipeline.len();

    if pipeline.background() {
        warn!("background pipeline of {count} stages run in the foreground");
        eprintln!("jshell: background pipelines are not supported; running in foreground");
    }

    let mut ios = match connect(count) {
        Ok(ios) => ios,
        Err(e) => {
            eprintln!("jshell: cannot create pipe: {e}");
            return FAILURE;
        }
    };

    let exit_codes = Mutex::new(vec![SUCCESS; count]);
    let mut external = Vec::with_capacity(count);

    for (idx, (stage, stage_io)) in pipeline.stages.iter().zip(ios.drain(..)).enumerate() {
        match stage.program().and_then(builtins::lookup) {
            Some(builtin) => {
                drop(stage_io);
                debug!("stage {idx}: builtin {}", builtin.name);
                let code = (builtin.run)(shell, &stage.args, &mut io::stdout(), &mut io::stderr());
                record(&exit_codes, idx, code);
            }
            None => external.push((idx, wire(stage, idx, count), stage_io)),
        }
    }

    thread::scope(|scope| {
        for (idx, stage, stage_io) in external {
            let exit_codes = &exit_codes;
            let spawned = thread::Builder::new()
                .name(format!("stage-{idx}"))
                .spawn_scoped(scope, move || {
                    let code = executor::launch(&stage, stage_io, None);
                    debug!("stage {idx} finished with {code}");
                    record(exit_codes, idx, code);
                });
            if let Err(e) = spawned {
                eprintln!("jshell: cannot start pipeline stage {}: {e}", idx + 1);
                record(exit_codes, idx, FAILURE);
            }
        }
    });

    let codes = exit_codes.into_inner().unwrap_or_else(PoisonError::into_inner);
    debug!("pipeline exit codes: {codes:?}");
    codes.last().copied().unwrap_or(SUCCESS)
}

/// Allocate `count - 1` channels and hand each stage its ends: stage `i`
/// reads channel `i - 1` and writes channel `i`. The first stage reads and
/// the last stage writes the shell's own streams.
fn connect(count: usize) -> io::Result<Vec<StageIo>> {
    let mut ios: Vec<StageIo> = (0..count).map(|_| StageIo::default()).collect();
    for idx in 0..count.saturating_sub(1) {
        let (reader, writer) = os_pipe::pipe()?;
        ios[idx].stdout = Some(writer);
        ios[idx + 1].stdin = Some(reader);
    }
    Ok(ios)
}

/// The stage as it runs inside the pipeline: the channel replaces output
/// redirection on every stage but the last and input redirection on every
/// stage but the first. Error redirection is not honored inside pipelines.
fn wire(stage: &Stage, idx: usize, count: usize) -> Stage {
    let mut wired = stage.clone();
    if idx + 1 < count {
        wired.output = None;
    }
    if idx > 0 {
        wired.input = None;
    }
    if wired.error.take().is_some() {
        debug!("stage {idx}: error redirection ignored inside a pipeline");
    }
    wired.background = false;
    wired
}

fn record(exit_codes: &Mutex<Vec<i32>>, idx: usize, code: i32) {
    exit_codes.lock().unwrap_or_else(PoisonError::into_inner)[idx] = code;
}
