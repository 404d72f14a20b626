use crate::spawn::{Termination, try_reap};
use log::{info, warn};
use nix::unistd::Pid;

/// A detached child the session has not reaped yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundEntry {
    pub pid: Pid,
    /// The command text, for job reports.
    pub command: String,
}

/// A background child observed to have terminated by [`BackgroundRegistry::sweep`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub pid: Pid,
    pub command: String,
    pub termination: Termination,
}

/// Background children started by the session, in launch order.
///
/// The registry is owned by the session and passed explicitly to whatever
/// launches or reaps processes. Reaping never blocks.
#[derive(Debug, Default)]
pub struct BackgroundRegistry {
    entries: Vec<BackgroundEntry>,
}

impl BackgroundRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a detached child.
    pub fn register(&mut self, pid: Pid, command: impl Into<String>) {
        let command = command.into();
        info!("background pid {pid} started: {command}");
        self.entries.push(BackgroundEntry { pid, command });
    }

    /// Try once, without blocking, to reap every tracked child.
    ///
    /// Children that are still running stay registered. Terminated children
    /// are removed and returned, so each termination is reported exactly once.
    pub fn sweep(&mut self) -> Vec<Completion> {
        let mut completed = Vec::new();
        self.entries.retain(|entry| match try_reap(entry.pid) {
            Ok(None) => true,
            Ok(Some(termination)) => {
                info!("background pid {} finished: {termination:?}", entry.pid);
                completed.push(Completion {
                    pid: entry.pid,
                    command: entry.command.clone(),
                    termination,
                });
                false
            }
            Err(errno) => {
                warn!(
                    "lost track of background pid {} ({}): {errno}",
                    entry.pid, entry.command
                );
                false
            }
        });
        completed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BackgroundEntry] {
        &self.entries
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.entries.iter().map(|entry| entry.pid).collect()
    }
}
