use std::io::{self, Write};
use std::path::Path;

use crossterm::{Command, cursor, terminal};
use log::debug;

use crate::ast::Stage;
use crate::jobs::parse_job_id;
use crate::redirect::OpenedRedirects;
use crate::resolver;
use crate::shell::Shell;
use crate::status::{FAILURE, SUCCESS};

/// Builtin handler. `args[0]` is the command name; output goes to the two
/// writers, never directly to the process streams.
pub type Handler = fn(&mut Shell, &[String], &mut dyn Write, &mut dyn Write) -> i32;

pub struct Builtin {
    pub name: &'static str,
    pub run: Handler,
    pub usage: &'static str,
    pub summary: &'static str,
}

const BUILTINS: &[Builtin] = &[
    Builtin { name: "cd", run: builtin_cd, usage: "cd [dir|-]", summary: "Change the working directory" },
    Builtin { name: "pwd", run: builtin_pwd, usage: "pwd", summary: "Print the working directory" },
    Builtin { name: "exit", run: builtin_exit, usage: "exit [code]", summary: "Leave the shell" },
    Builtin { name: "echo", run: builtin_echo, usage: "echo [args...]", summary: "Print the arguments" },
    Builtin { name: "env", run: builtin_env, usage: "env [name...]", summary: "Show environment variables" },
    Builtin { name: "set", run: builtin_set, usage: "set [name value...]", summary: "Set a shell variable and export it" },
    Builtin { name: "unset", run: builtin_unset, usage: "unset name...", summary: "Remove shell variables" },
    Builtin { name: "alias", run: builtin_alias, usage: "alias [name[=value]]", summary: "Define or list aliases" },
    Builtin { name: "unalias", run: builtin_unalias, usage: "unalias name...", summary: "Remove aliases" },
    Builtin { name: "history", run: builtin_history, usage: "history [n]", summary: "Show command history" },
    Builtin { name: "source", run: builtin_source, usage: "source file", summary: "Run commands from a file" },
    Builtin { name: "which", run: builtin_which, usage: "which name...", summary: "Show how a name would be run" },
    Builtin { name: "jobs", run: builtin_jobs, usage: "jobs", summary: "List background jobs" },
    Builtin { name: "fg", run: builtin_fg, usage: "fg [%id]", summary: "Wait for a job in the foreground" },
    Builtin { name: "bg", run: builtin_bg, usage: "bg [%id]", summary: "Resume a stopped job in the background" },
    Builtin { name: "wait", run: builtin_wait, usage: "wait [%id...]", summary: "Wait for background jobs to finish" },
    Builtin { name: "kill", run: builtin_kill, usage: "kill pid|%id...", summary: "Terminate processes or jobs" },
    Builtin { name: "help", run: builtin_help, usage: "help [name]", summary: "Show builtin help" },
    Builtin { name: "version", run: builtin_version, usage: "version", summary: "Show the shell version" },
    Builtin { name: "clear", run: builtin_clear, usage: "clear", summary: "Clear the screen" },
    Builtin { name: "cls", run: builtin_clear, usage: "cls", summary: "Clear the screen" },
];

/// The builtin registered under `name`.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

pub fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
}

/// Run a standalone builtin with the stage's output and error redirection
/// applied. The input target is opened (so a missing file is still an
/// error) but builtins never read it.
pub fn run_redirected(shell: &mut Shell, builtin: &Builtin, stage: &Stage) -> i32 {
    let redirects = match OpenedRedirects::open(stage) {
        Ok(redirects) => redirects,
        Err(e) => {
            eprintln!("jshell: {e}");
            return e.exit_code();
        }
    };
    if stage.background {
        debug!("{} runs in the foreground; builtins cannot be backgrounded", builtin.name);
    }

    let mut stdout: Box<dyn Write> = match redirects.output {
        Some(file) => Box::new(file),
        None => Box::new(io::stdout()),
    };
    let mut stderr: Box<dyn Write> = match redirects.error {
        Some(file) => Box::new(file),
        None => Box::new(io::stderr()),
    };
    let code = (builtin.run)(shell, &stage.args, &mut *stdout, &mut *stderr);
    let _ = stdout.flush();
    let _ = stderr.flush();
    code
}

fn builtin_cd(_shell: &mut Shell, args: &[String], _stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let target = match args.get(1).map(String::as_str) {
        Some("-") => match std::env::var("OLDPWD") {
            Ok(prev) => prev,
            Err(_) => {
                let _ = writeln!(stderr, "cd: OLDPWD not set");
                return FAILURE;
            }
        },
        Some(dir) => dir.to_string(),
        None => crate::expander::home_dir(),
    };

    let previous = std::env::current_dir().ok();
    if let Err(e) = std::env::set_current_dir(&target) {
        let _ = writeln!(stderr, "cd: {target}: {e}");
        return FAILURE;
    }

    // SAFETY: the environment is only mutated on the main thread.
    if let Some(previous) = previous {
        unsafe { std::env::set_var("OLDPWD", previous) };
    }
    if let Ok(cwd) = std::env::current_dir() {
        unsafe { std::env::set_var("PWD", cwd) };
    }
    SUCCESS
}

fn builtin_pwd(_shell: &mut Shell, _args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    match std::env::current_dir() {
        Ok(path) => {
            let _ = writeln!(stdout, "{}", path.display());
            SUCCESS
        }
        Err(e) => {
            let _ = writeln!(stderr, "pwd: {e}");
            FAILURE
        }
    }
}

fn builtin_exit(shell: &mut Shell, args: &[String], _stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    shell.running = false;
    match args.get(1) {
        None => shell.last_exit_code,
        Some(s) => s.parse::<i32>().unwrap_or_else(|_| {
            let _ = writeln!(stderr, "exit: {s}: numeric argument required");
            2
        }),
    }
}

fn builtin_echo(_shell: &mut Shell, args: &[String], stdout: &mut dyn Write, _stderr: &mut dyn Write) -> i32 {
    let _ = writeln!(stdout, "{}", args[1..].join(" "));
    SUCCESS
}

fn builtin_env(_shell: &mut Shell, args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    if args.len() == 1 {
        let mut vars: Vec<(String, String)> = std::env::vars().collect();
        vars.sort();
        for (key, value) in vars {
            let _ = writeln!(stdout, "{key}={value}");
        }
        return SUCCESS;
    }

    let mut code = SUCCESS;
    for name in &args[1..] {
        match std::env::var(name) {
            Ok(value) => {
                let _ = writeln!(stdout, "{name}={value}");
            }
            Err(_) => {
                let _ = writeln!(stderr, "env: {name}: not set");
                code = FAILURE;
            }
        }
    }
    code
}

fn builtin_set(shell: &mut Shell, args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let (name, value) = match args {
        [_] => {
            for (name, value) in &shell.variables {
                let _ = writeln!(stdout, "{name}={value}");
            }
            return SUCCESS;
        }
        [_, assignment] => match assignment.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => {
                let _ = writeln!(stderr, "set: usage: set name value");
                return FAILURE;
            }
        },
        [_, name, value @ ..] => (name.clone(), value.join(" ")),
        [] => return FAILURE,
    };

    if !is_valid_name(&name) {
        let _ = writeln!(stderr, "set: `{name}': not a valid identifier");
        return FAILURE;
    }
    shell.set_variable(&name, &value);
    SUCCESS
}

fn builtin_unset(shell: &mut Shell, args: &[String], _stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    if args.len() < 2 {
        let _ = writeln!(stderr, "unset: usage: unset name...");
        return FAILURE;
    }
    for name in &args[1..] {
        shell.unset_variable(name);
    }
    SUCCESS
}

fn builtin_alias(shell: &mut Shell, args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    if args.len() == 1 {
        for (name, value) in &shell.aliases {
            let _ = writeln!(stdout, "alias {name}='{value}'");
        }
        return SUCCESS;
    }

    // `alias ll=ls -l` arrives as ["ll=ls", "-l"].
    let definition = args[1..].join(" ");
    match definition.split_once('=') {
        Some((name, value)) if is_valid_alias(name) => {
            let value = value.trim();
            let value = strip_matching_quotes(value);
            shell.aliases.insert(name.to_string(), value.to_string());
            SUCCESS
        }
        Some((name, _)) => {
            let _ = writeln!(stderr, "alias: `{name}': invalid alias name");
            FAILURE
        }
        None => {
            let mut code = SUCCESS;
            for name in &args[1..] {
                match shell.aliases.get(name) {
                    Some(value) => {
                        let _ = writeln!(stdout, "alias {name}='{value}'");
                    }
                    None => {
                        let _ = writeln!(stderr, "alias: {name}: not found");
                        code = FAILURE;
                    }
                }
            }
            code
        }
    }
}

fn builtin_unalias(shell: &mut Shell, args: &[String], _stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    if args.len() < 2 {
        let _ = writeln!(stderr, "unalias: usage: unalias name...");
        return FAILURE;
    }
    let mut code = SUCCESS;
    for name in &args[1..] {
        if shell.aliases.remove(name).is_none() {
            let _ = writeln!(stderr, "unalias: {name}: not found");
            code = FAILURE;
        }
    }
    code
}

fn builtin_history(shell: &mut Shell, args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let count = match args.get(1) {
        None => usize::MAX,
        Some(n) => match n.parse::<usize>() {
            Ok(n) => n,
            Err(_) => {
                let _ = writeln!(stderr, "history: {n}: numeric argument required");
                return FAILURE;
            }
        },
    };
    for (number, line) in shell.history.tail(count) {
        let _ = writeln!(stdout, "{number:5}: {line}");
    }
    SUCCESS
}

fn builtin_source(shell: &mut Shell, args: &[String], _stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let Some(file) = args.get(1) else {
        let _ = writeln!(stderr, "source: usage: source file");
        return FAILURE;
    };
    match shell.source(Path::new(file)) {
        Ok(code) => code,
        Err(e) => {
            let _ = writeln!(stderr, "source: cannot read '{file}': {e}");
            FAILURE
        }
    }
}

fn builtin_which(shell: &mut Shell, args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    if args.len() < 2 {
        let _ = writeln!(stderr, "which: usage: which name...");
        return FAILURE;
    }
    let mut code = SUCCESS;
    for name in &args[1..] {
        if let Some(value) = shell.aliases.get(name) {
            let _ = writeln!(stdout, "{name}: aliased to {value}");
        } else if is_builtin(name) {
            let _ = writeln!(stdout, "{name}: shell builtin");
        } else if let Some(path) = resolver::resolve(name) {
            let _ = writeln!(stdout, "{}", path.display());
        } else {
            let _ = writeln!(stderr, "{name} not found");
            code = FAILURE;
        }
    }
    code
}

// ── Job control builtins ──

fn builtin_jobs(shell: &mut Shell, _args: &[String], stdout: &mut dyn Write, _stderr: &mut dyn Write) -> i32 {
    shell.jobs.list(stdout);
    SUCCESS
}

fn builtin_fg(shell: &mut Shell, args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let id = match optional_job_id(args) {
        Ok(id) => id,
        Err(e) => return report(stderr, "fg", e),
    };
    let _ = stdout.flush();
    shell.jobs.foreground(id, stdout).unwrap_or_else(|e| report(stderr, "fg", e))
}

fn builtin_bg(shell: &mut Shell, args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let result = optional_job_id(args).and_then(|id| shell.jobs.background(id, stdout));
    match result {
        Ok(()) => SUCCESS,
        Err(e) => report(stderr, "bg", e),
    }
}

fn builtin_wait(shell: &mut Shell, args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    if args.len() == 1 {
        return shell.jobs.wait_all(stdout).unwrap_or_else(|e| report(stderr, "wait", e));
    }

    let mut code = SUCCESS;
    for arg in &args[1..] {
        code = parse_job_id(arg)
            .and_then(|id| shell.jobs.wait(id, stdout))
            .unwrap_or_else(|e| report(stderr, "wait", e));
    }
    code
}

fn builtin_kill(shell: &mut Shell, args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    if args.len() < 2 {
        let _ = writeln!(stderr, "kill: usage: kill pid|%id...");
        return FAILURE;
    }

    let mut code = SUCCESS;
    for target in &args[1..] {
        let result = if target.starts_with('%') {
            parse_job_id(target).and_then(|id| shell.jobs.kill(id).map(|()| id))
        } else {
            match target.parse::<u32>() {
                Ok(pid) => match shell.jobs.find_by_pid(pid) {
                    Some(id) => shell.jobs.kill(id).map(|()| id),
                    None => {
                        if let Err(e) = kill_process(pid) {
                            let _ = writeln!(stderr, "kill: ({pid}): {e}");
                            code = FAILURE;
                        } else {
                            let _ = writeln!(stdout, "Process {pid} terminated");
                        }
                        continue;
                    }
                },
                Err(_) => {
                    let _ = writeln!(stderr, "kill: {target}: arguments must be process or job ids");
                    code = FAILURE;
                    continue;
                }
            }
        };
        match result {
            Ok(id) => {
                let _ = writeln!(stdout, "[{id}]  Killed");
            }
            Err(e) => code = report(stderr, "kill", e),
        }
    }
    code
}

#[cfg(unix)]
fn kill_process(pid: u32) -> io::Result<()> {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return Err(io::Error::from(io::ErrorKind::InvalidInput));
    };
    if pid <= 0 {
        return Err(io::Error::from(io::ErrorKind::InvalidInput));
    }
    let rc = unsafe { libc::kill(pid, libc::SIGKILL) };
    if rc == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
}

#[cfg(not(unix))]
fn kill_process(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "only jobs started by this shell can be killed here",
    ))
}

// ── Informational builtins ──

fn builtin_help(_shell: &mut Shell, args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    match args.get(1) {
        Some(name) => match lookup(name) {
            Some(builtin) => {
                let _ = writeln!(stdout, "{}\n    {}", builtin.usage, builtin.summary);
                SUCCESS
            }
            None => {
                let _ = writeln!(stderr, "help: no help topics match `{name}'");
                FAILURE
            }
        },
        None => {
            let _ = writeln!(stdout, "jshell builtins:");
            for builtin in BUILTINS {
                let _ = writeln!(stdout, "  {:<22} {}", builtin.usage, builtin.summary);
            }
            let _ = writeln!(stdout, "\nAnything else is run as a program found in the current directory or PATH.");
            SUCCESS
        }
    }
}

fn builtin_version(_shell: &mut Shell, _args: &[String], stdout: &mut dyn Write, _stderr: &mut dyn Write) -> i32 {
    let _ = writeln!(stdout, "jshell {}", env!("CARGO_PKG_VERSION"));
    SUCCESS
}

fn builtin_clear(_shell: &mut Shell, _args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let mut sequence = String::new();
    let encoded = terminal::Clear(terminal::ClearType::All)
        .write_ansi(&mut sequence)
        .and_then(|()| cursor::MoveTo(0, 0).write_ansi(&mut sequence));
    if encoded.is_err() {
        return FAILURE;
    }
    match stdout.write_all(sequence.as_bytes()).and_then(|()| stdout.flush()) {
        Ok(()) => SUCCESS,
        Err(e) => {
            let _ = writeln!(stderr, "clear: {e}");
            FAILURE
        }
    }
}

// ── Helpers ──

fn optional_job_id(args: &[String]) -> Result<Option<usize>, crate::error::JobError> {
    args.get(1).map(|arg| parse_job_id(arg)).transpose()
}

fn report(stderr: &mut dyn Write, builtin: &str, err: crate::error::JobError) -> i32 {
    let _ = writeln!(stderr, "{builtin}: {err}");
    FAILURE
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_valid_alias(name: &str) -> bool {
    !name.is_empty() && !name.contains(|c: char| c.is_whitespace() || "|<>&$'\"".contains(c))
}

fn strip_matching_quotes(value: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = value.strip_prefix(quote).and_then(|v| v.strip_suffix(quote)) {
            return inner;
        }
    }
    value
}
