use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::process::Child;

use log::{debug, info, warn};

use crate::error::JobError;
use crate::status;

/// The lifecycle state of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobState::Running => "Running",
            JobState::Stopped => "Stopped",
        })
    }
}

/// A single tracked background job.
#[derive(Debug)]
pub struct Job {
    pub id: usize,
    pub pid: u32,
    pub command: String,
    pub state: JobState,
    child: Child,
}

/// The shell's job table.
///
/// Ids start at 1 and are never reused within a session. A finished job is
/// only noticed when the table is polled (`list`, `reap`, `wait`).
#[derive(Debug)]
pub struct JobTable {
    jobs: BTreeMap<usize, Job>,
    next_id: usize,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Track a running background process and announce it as
    /// `[id] pid command`. Returns the job id.
    pub fn register(&mut self, child: Child, command: String, out: &mut dyn Write) -> usize {
        let id = self.insert(child, command, JobState::Running);
        if let Some(job) = self.jobs.get(&id) {
            let _ = writeln!(out, "[{}] {} {}", job.id, job.pid, job.command);
        }
        id
    }

    /// Track a process that is already stopped. The shell itself never
    /// suspends processes; this is for callers that did so themselves.
    pub fn register_stopped(&mut self, child: Child, command: String) -> usize {
        self.insert(child, command, JobState::Stopped)
    }

    fn insert(&mut self, child: Child, command: String, state: JobState) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        let pid = child.id();
        info!("job [{id}] pid {pid}: {command}");
        self.jobs.insert(id, Job { id, pid, command, state, child });
        id
    }

    /// Non-blocking poll of all jobs. Prints `[N]+ Done  cmd` for any that
    /// have finished and removes them. Returns `(id, exit code)` pairs.
    pub fn reap(&mut self, out: &mut dyn Write) -> Vec<(usize, i32)> {
        let mut done = Vec::new();

        for (id, job) in self.jobs.iter_mut() {
            match job.child.try_wait() {
                Ok(Some(exit)) => done.push((*id, status::exit_code(exit))),
                Ok(None) => {} // still running
                Err(e) => warn!("error checking job {id}: {e}"),
            }
        }

        for (id, code) in &done {
            if let Some(job) = self.jobs.remove(id) {
                debug!("reaped job [{id}] with {code}");
                let _ = writeln!(out, "[{}]+ Done  {}", job.id, job.command);
            }
        }
        done
    }

    /// Reap finished jobs, then print the rest with id, state, pid and
    /// command text.
    pub fn list(&mut self, out: &mut dyn Write) {
        if self.jobs.is_empty() {
            let _ = writeln!(out, "No active jobs.");
            return;
        }

        self.reap(out);
        for job in self.jobs.values() {
            let _ = writeln!(
                out,
                "[{}]  {:<8} {:>8}  {}",
                job.id, job.state, job.pid, job.command
            );
        }
    }

    /// Remove a job and block until it exits. `None` picks the most recent
    /// job. Returns the job's exit code.
    pub fn foreground(&mut self, id: Option<usize>, out: &mut dyn Write) -> Result<i32, JobError> {
        let id = self.target(id, self.most_recent_id())?;
        let mut job = self.jobs.remove(&id).ok_or(JobError::NoSuchJob(id))?;
        let _ = writeln!(out, "{}", job.command);

        if job.state == JobState::Stopped {
            continue_process(job.pid).map_err(|source| JobError::Signal { id, source })?;
        }

        let exit = job.child.wait().map_err(|source| JobError::Wait { id, source })?;
        Ok(status::exit_code(exit))
    }

    /// Resume a stopped job in the background. `None` picks the most recent
    /// stopped job, falling back to the most recent job.
    pub fn background(&mut self, id: Option<usize>, out: &mut dyn Write) -> Result<(), JobError> {
        let default = self.most_recent_stopped_id().or(self.most_recent_id());
        let id = self.target(id, default)?;
        let job = self.jobs.get_mut(&id).ok_or(JobError::NoSuchJob(id))?;

        if job.state == JobState::Running {
            return Err(JobError::AlreadyRunning(id));
        }

        continue_process(job.pid).map_err(|source| JobError::Signal { id, source })?;
        job.state = JobState::Running;
        let _ = writeln!(out, "[{}]+ {} &", job.id, job.command);
        Ok(())
    }

    /// Block until job `id` exits, remove it and return its exit code.
    pub fn wait(&mut self, id: usize, out: &mut dyn Write) -> Result<i32, JobError> {
        let job = self.jobs.get_mut(&id).ok_or(JobError::NoSuchJob(id))?;
        let exit = job.child.wait().map_err(|source| JobError::Wait { id, source })?;
        if let Some(job) = self.jobs.remove(&id) {
            let _ = writeln!(out, "[{}]+ Done  {}", job.id, job.command);
        }
        Ok(status::exit_code(exit))
    }

    /// Wait for every running job in id order. Returns the last exit code,
    /// or 0 when nothing was running.
    pub fn wait_all(&mut self, out: &mut dyn Write) -> Result<i32, JobError> {
        let running: Vec<usize> = self
            .jobs
            .values()
            .filter(|job| job.state == JobState::Running)
            .map(|job| job.id)
            .collect();

        let mut last = status::SUCCESS;
        for id in running {
            last = self.wait(id, out)?;
        }
        Ok(last)
    }

    /// Terminate a job's process unconditionally and drop it from the table.
    pub fn kill(&mut self, id: usize) -> Result<(), JobError> {
        let mut job = self.jobs.remove(&id).ok_or(JobError::NoSuchJob(id))?;
        if let Err(source) = job.child.kill() {
            // Already exited on its own; nothing left to terminate.
            if job.child.try_wait().ok().flatten().is_none() {
                self.jobs.insert(id, job);
                return Err(JobError::Signal { id, source });
            }
        }
        let _ = job.child.wait();
        info!("killed job [{id}] (pid {})", job.pid);
        Ok(())
    }

    /// Id of the job whose process is `pid`, if any.
    pub fn find_by_pid(&self, pid: u32) -> Option<usize> {
        self.jobs.values().find(|job| job.pid == pid).map(|job| job.id)
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.get(&id)
    }

    /// All job ids in ascending order.
    pub fn ids(&self) -> Vec<usize> {
        self.jobs.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Job ID of the most recently added job, for use as the `fg` / `bg`
    /// default when no argument is given.
    pub fn most_recent_id(&self) -> Option<usize> {
        self.jobs.keys().next_back().copied()
    }

    fn most_recent_stopped_id(&self) -> Option<usize> {
        self.jobs
            .values()
            .rev()
            .find(|job| job.state == JobState::Stopped)
            .map(|job| job.id)
    }

    fn target(&self, id: Option<usize>, default: Option<usize>) -> Result<usize, JobError> {
        match id {
            Some(id) if self.jobs.contains_key(&id) => Ok(id),
            Some(id) => Err(JobError::NoSuchJob(id)),
            None => default.ok_or(JobError::NoCurrentJob),
        }
    }
}

/// Parse a job ID from an argument (accepts `%N` or `N`).
pub fn parse_job_id(arg: &str) -> Result<usize, JobError> {
    arg.trim_start_matches('%')
        .parse::<usize>()
        .map_err(|_| JobError::InvalidId(arg.to_string()))
}

#[cfg(unix)]
fn continue_process(pid: u32) -> std::io::Result<()> {
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGCONT) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn continue_process(_pid: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;

    fn spawn(script: &str) -> Child {
        Command::new("sh").args(["-c", script]).spawn().expect("spawn sh")
    }

    fn text(buf: &[u8]) -> String {
        String::from_utf8_lossy(buf).into_owned()
    }

    #[test]
    fn ids_increase_from_one() {
        let mut table = JobTable::new();
        let mut out = Vec::new();
        let first = table.register(spawn("sleep 5"), "sleep 5".into(), &mut out);
        let second = table.register(spawn("sleep 5"), "sleep 5".into(), &mut out);
        assert_eq!((first, second), (1, 2));

        let pid = table.get(1).unwrap().pid;
        assert!(text(&out).starts_with(&format!("[1] {pid} sleep 5\n")));

        table.kill(1).unwrap();
        table.kill(2).unwrap();
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let mut table = JobTable::new();
        let mut out = Vec::new();
        table.register(spawn("exit 0"), "a".into(), &mut out);
        table.foreground(Some(1), &mut out).unwrap();
        let id = table.register(spawn("exit 0"), "b".into(), &mut out);
        assert_eq!(id, 2);
        table.foreground(None, &mut out).unwrap();
    }

    #[test]
    fn list_reaps_finished_jobs_once() {
        let mut table = JobTable::new();
        let id = table.register(spawn("exit 0"), "quick".into(), &mut Vec::new());
        std::thread::sleep(std::time::Duration::from_millis(500));

        let mut first = Vec::new();
        table.list(&mut first);
        assert!(text(&first).contains(&format!("[{id}]+ Done  quick")), "{}", text(&first));

        let mut second = Vec::new();
        table.list(&mut second);
        assert!(!text(&second).contains("quick"));
        assert_eq!(text(&second), "No active jobs.\n");
    }

    #[test]
    fn list_shows_running_jobs() {
        let mut table = JobTable::new();
        table.register(spawn("sleep 5"), "sleep 5".into(), &mut Vec::new());

        let mut out = Vec::new();
        table.list(&mut out);
        let listing = text(&out);
        assert!(listing.starts_with("[1]  Running"), "{listing}");
        assert!(listing.trim_end().ends_with("sleep 5"), "{listing}");
        table.kill(1).unwrap();
    }

    #[test]
    fn foreground_returns_exit_code_and_removes_job() {
        let mut table = JobTable::new();
        table.register(spawn("exit 7"), "exit 7".into(), &mut Vec::new());

        let mut out = Vec::new();
        assert_eq!(table.foreground(Some(1), &mut out).unwrap(), 7);
        assert_eq!(text(&out), "exit 7\n");
        assert!(table.is_empty());

        // The job is gone: a later reap cannot report it again.
        let mut listing = Vec::new();
        table.list(&mut listing);
        assert_eq!(text(&listing), "No active jobs.\n");
        assert!(matches!(table.foreground(Some(1), &mut out), Err(JobError::NoSuchJob(1))));
    }

    #[test]
    fn foreground_unknown_id_is_no_such_job() {
        let mut table = JobTable::new();
        table.register(spawn("sleep 5"), "sleep 5".into(), &mut Vec::new());
        assert!(matches!(table.foreground(Some(9), &mut Vec::new()), Err(JobError::NoSuchJob(9))));
        assert_eq!(table.ids(), vec![1]);
        table.kill(1).unwrap();
    }

    #[test]
    fn empty_registry_is_reported_not_raised() {
        let mut table = JobTable::new();
        assert!(matches!(table.foreground(None, &mut Vec::new()), Err(JobError::NoCurrentJob)));
        assert!(matches!(table.background(None, &mut Vec::new()), Err(JobError::NoCurrentJob)));
        assert!(matches!(table.foreground(Some(3), &mut Vec::new()), Err(JobError::NoSuchJob(3))));
        assert!(matches!(table.background(Some(3), &mut Vec::new()), Err(JobError::NoSuchJob(3))));
        assert!(matches!(table.kill(1), Err(JobError::NoSuchJob(1))));
    }

    #[test]
    fn background_on_running_job_warns_without_change() {
        let mut table = JobTable::new();
        table.register(spawn("sleep 5"), "sleep 5".into(), &mut Vec::new());

        let mut out = Vec::new();
        assert!(matches!(table.background(Some(1), &mut out), Err(JobError::AlreadyRunning(1))));
        assert!(out.is_empty());
        assert_eq!(table.get(1).unwrap().state, JobState::Running);
        table.kill(1).unwrap();
    }

    #[test]
    fn background_resumes_stopped_job() {
        let mut table = JobTable::new();
        let child = spawn("sleep 5");
        let pid = child.id();
        unsafe { libc::kill(pid as libc::pid_t, libc::SIGSTOP) };
        let id = table.register_stopped(child, "sleep 5".into());

        let mut out = Vec::new();
        table.background(None, &mut out).unwrap();
        assert_eq!(text(&out), format!("[{id}]+ sleep 5 &\n"));
        assert_eq!(table.get(id).unwrap().state, JobState::Running);
        table.kill(id).unwrap();
    }

    #[test]
    fn kill_removes_job_and_process() {
        let mut table = JobTable::new();
        table.register(spawn("sleep 30"), "sleep 30".into(), &mut Vec::new());
        let pid = table.get(1).unwrap().pid;
        assert_eq!(table.find_by_pid(pid), Some(1));

        table.kill(1).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.find_by_pid(pid), None);
    }

    #[test]
    fn wait_all_returns_last_exit_code() {
        let mut table = JobTable::new();
        table.register(spawn("exit 2"), "a".into(), &mut Vec::new());
        table.register(spawn("sleep 0.2; exit 5"), "b".into(), &mut Vec::new());

        let mut out = Vec::new();
        assert_eq!(table.wait_all(&mut out).unwrap(), 5);
        assert!(table.is_empty());
        assert!(text(&out).contains("[2]+ Done  b"));
    }

    #[test]
    fn job_id_parsing() {
        assert_eq!(parse_job_id("%3").unwrap(), 3);
        assert_eq!(parse_job_id("12").unwrap(), 12);
        assert!(matches!(parse_job_id("abc"), Err(JobError::InvalidId(_))));
    }
}
