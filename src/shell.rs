use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use crossterm::tty::IsTty;
use log::{debug, info, warn};

use crate::ast::{Pipeline, Stage};
use crate::builtins;
use crate::config::Config;
use crate::executor::{self, StageIo};
use crate::expander::{Scope, expand_home, substitute};
use crate::history::History;
use crate::jobs::JobTable;
use crate::parser::{parse_pipeline, tokenize};
use crate::pipeline;
use crate::status::{FAILURE, SUCCESS};

/// Session state shared by every line the shell runs.
///
/// Only the main thread touches this; pipeline stage threads never see it.
#[derive(Debug)]
pub struct Shell {
    pub variables: BTreeMap<String, String>,
    pub aliases: BTreeMap<String, String>,
    pub jobs: JobTable,
    pub history: History,
    pub last_exit_code: i32,
    pub running: bool,
    pub config: Config,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Shell {
    /// A fresh session. History stays in memory until `history` is
    /// replaced with a file-backed one.
    pub fn new(config: Config) -> Self {
        Self {
            variables: BTreeMap::new(),
            aliases: BTreeMap::new(),
            jobs: JobTable::new(),
            history: History::new(config.max_history),
            last_exit_code: SUCCESS,
            running: true,
            config,
        }
    }

    /// Set a shell variable and export it to the process environment so
    /// that launched programs inherit it.
    pub fn set_variable(&mut self, name: &str, value: &str) {
        self.variables.insert(name.to_string(), value.to_string());
        // SAFETY: the environment is only mutated on the main thread, and
        // pipeline stage threads are never running while a builtin executes.
        unsafe { std::env::set_var(name, value) };
    }

    pub fn unset_variable(&mut self, name: &str) -> bool {
        let existed = self.variables.remove(name).is_some();
        // SAFETY: see `set_variable`.
        unsafe { std::env::remove_var(name) };
        existed
    }

    /// Substitute, parse, alias-expand and execute one line. Blank lines
    /// are no-ops and keep the previous exit code.
    pub fn run_line(&mut self, line: &str) -> i32 {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return self.last_exit_code;
        }

        let scope = Scope { variables: &self.variables, last_exit_code: self.last_exit_code };
        let substituted = substitute(line, &scope);
        debug!("line {line:?} -> {substituted:?}");

        let code = match parse_pipeline(&substituted) {
            Ok(Some(mut pipeline)) => {
                self.expand_aliases(&mut pipeline);
                self.execute(&pipeline)
            }
            Ok(None) => return self.last_exit_code,
            Err(e) => {
                eprintln!("jshell: {e}");
                FAILURE
            }
        };
        self.last_exit_code = code;
        code
    }

    /// Run a parsed pipeline. A single stage runs on this thread and may be
    /// backgrounded as a job; longer pipelines go to the orchestrator.
    pub fn execute(&mut self, pipeline: &Pipeline) -> i32 {
        match pipeline.stages.as_slice() {
            [] => SUCCESS,
            [stage] => self.run_stage(stage),
            _ => pipeline::run(self, pipeline),
        }
    }

    fn run_stage(&mut self, stage: &Stage) -> i32 {
        if stage.args.is_empty() {
            return FAILURE;
        }
        match stage.program().and_then(builtins::lookup) {
            Some(builtin) => builtins::run_redirected(self, builtin, stage),
            None => executor::launch(stage, StageIo::default(), Some(&mut self.jobs)),
        }
    }

    /// Replace the first word of each stage with its alias, once. The alias
    /// text is tokenized like a command line and the stage's remaining
    /// arguments follow it.
    fn expand_aliases(&self, pipeline: &mut Pipeline) {
        for stage in &mut pipeline.stages {
            let Some(replacement) = stage.program().and_then(|name| self.aliases.get(name)) else {
                continue;
            };
            let mut args: Vec<String> = tokenize(replacement).iter().map(|t| expand_home(t)).collect();
            debug!("alias {} -> {args:?}", stage.args[0]);
            args.extend(stage.args.drain(1..));
            stage.args = args;
        }
    }

    /// Run every line of a script through `run_line`. Blank lines and lines
    /// starting with `#` are skipped; `exit` stops the script.
    pub fn source(&mut self, path: &Path) -> io::Result<i32> {
        let contents = fs::read_to_string(path)?;
        info!("sourcing {}", path.display());
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            self.run_line(trimmed);
            if !self.running {
                break;
            }
        }
        Ok(self.last_exit_code)
    }

    /// Source the rc file if it exists.
    pub fn source_rc(&mut self) {
        let path = self.config.rc_path();
        if !path.is_file() {
            return;
        }
        if let Err(e) = self.source(&path) {
            warn!("cannot read {}: {e}", path.display());
            eprintln!("jshell: cannot read {}: {e}", path.display());
        }
    }

    /// The read-eval loop. The prompt is only shown when stdin is a
    /// terminal. Returns the last exit code once input ends or `exit` runs.
    pub fn run_interactive(&mut self, input: impl BufRead) -> i32 {
        let interactive = io::stdin().is_tty();
        let mut lines = input.lines();

        while self.running {
            if interactive {
                self.print_prompt();
            }
            let line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    eprintln!("jshell: error reading input: {e}");
                    break;
                }
                None => break,
            };
            if line.trim().is_empty() {
                continue;
            }
            self.history.add(&line);
            self.run_line(&line);
        }

        if interactive && self.running {
            println!();
        }
        self.last_exit_code
    }

    fn print_prompt(&self) {
        let cwd = std::env::current_dir().unwrap_or_default();
        let mut stdout = io::stdout();
        let _ = write!(stdout, "{}", self.config.render_prompt(&cwd));
        let _ = stdout.flush();
    }
}
