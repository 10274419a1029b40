use std::io;

use thiserror::Error;

/// A line that cannot be turned into a runnable pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A stage with nothing left after redirections were stripped,
    /// e.g. `ls | | wc` or `> out.txt`.
    #[error("syntax error: missing command in stage {stage} of `{line}'")]
    MissingCommand { stage: usize, line: String },
}

/// Failure to start or finish one stage.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("cannot open input file '{path}': {source}")]
    Input { path: String, source: io::Error },
    #[error("cannot open output file '{path}': {source}")]
    Output { path: String, source: io::Error },
    #[error("cannot open error file '{path}': {source}")]
    Error { path: String, source: io::Error },
    #[error("command not found: '{0}'")]
    NotFound(String),
    #[error("failed to execute '{program}': {source}")]
    Spawn { program: String, source: io::Error },
    #[error("error waiting for '{program}': {source}")]
    Wait { program: String, source: io::Error },
}

impl LaunchError {
    /// Exit status reported for this failure: 127 when the command could not
    /// be resolved, 1 for every I/O failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::NotFound(_) => 127,
            _ => 1,
        }
    }
}

/// Job-control failures. All of them are reported and leave the registry
/// unchanged.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("no current job")]
    NoCurrentJob,
    #[error("{0}: no such job")]
    NoSuchJob(usize),
    #[error("invalid job id: {0}")]
    InvalidId(String),
    #[error("job {0} is already running")]
    AlreadyRunning(usize),
    #[error("error waiting for job {id}: {source}")]
    Wait { id: usize, source: io::Error },
    #[error("cannot signal job {id}: {source}")]
    Signal { id: usize, source: io::Error },
}
