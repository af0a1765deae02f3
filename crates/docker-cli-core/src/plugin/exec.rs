//! Plugin process execution
//!
//! An [`ExecHandle`] is plain data describing how to start a plugin. Running
//! it spawns the child through a [`Spawner`], waits for it, and relays
//! interrupts counted by [`Interrupts`] according to an [`InterruptPolicy`].

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{DockerCliError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Interrupts after which the plugin is killed outright
pub const DEFAULT_FORCE_KILL_AFTER: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    /// Share the parent's stdin, stdout and stderr
    #[default]
    Inherit,
    /// Detach all three streams
    Null,
}

/// What to do with interrupts received while the plugin runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptPolicy {
    /// Send each interrupt on to the child. Off when the terminal already
    /// delivered it to the whole process group.
    pub forward: bool,
    pub force_kill_after: usize,
}

impl Default for InterruptPolicy {
    fn default() -> Self {
        Self {
            forward: true,
            force_kill_after: DEFAULT_FORCE_KILL_AFTER,
        }
    }
}

/// Shared interrupt counter, bumped by the process signal handler
#[derive(Debug, Clone, Default)]
pub struct Interrupts(Arc<AtomicUsize>);

impl Interrupts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a plugin process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(i32),
}

impl ExitOutcome {
    /// Exit code for the wrapping process; signals map to `128 + signal`
    pub fn code(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::Signaled(signal) => 128 + signal,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signaled(signal);
            }
        }
        Self::Exited(status.code().unwrap_or(1))
    }
}

/// A started plugin process
pub trait ChildProcess {
    fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>>;
    /// Deliver an interrupt (SIGINT on Unix)
    fn interrupt(&mut self) -> io::Result<()>;
    fn kill(&mut self) -> io::Result<()>;
}

/// Starts processes from an [`ExecHandle`]
pub trait Spawner {
    fn spawn(&self, handle: &ExecHandle) -> io::Result<Box<dyn ChildProcess>>;
}

/// Spawns real OS processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSpawner;

impl Spawner for SystemSpawner {
    fn spawn(&self, handle: &ExecHandle) -> io::Result<Box<dyn ChildProcess>> {
        let child = handle.to_command().spawn()?;
        Ok(Box::new(child))
    }
}

impl ChildProcess for Child {
    fn try_wait(&mut self) -> io::Result<Option<ExitOutcome>> {
        Ok(Child::try_wait(self)?.map(ExitOutcome::from))
    }

    #[cfg(unix)]
    fn interrupt(&mut self) -> io::Result<()> {
        let pid = libc::pid_t::try_from(self.id())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: kill(2) has no memory-safety preconditions
        if unsafe { libc::kill(pid, libc::SIGINT) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn interrupt(&mut self) -> io::Result<()> {
        // Console control events already reach every attached process
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        Child::kill(self)
    }
}

/// Everything needed to start a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecHandle {
    program: PathBuf,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
    stdio: StdioMode,
    interrupts: InterruptPolicy,
}

impl ExecHandle {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            stdio: StdioMode::Inherit,
            interrupts: InterruptPolicy::default(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set a variable, replacing any earlier value for the same key
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        let key = key.into();
        self.env.retain(|(k, _)| *k != key);
        self.env.push((key, value.into()));
        self
    }

    pub fn envs<I, K, V>(self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        vars.into_iter().fold(self, |handle, (k, v)| handle.env(k, v))
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdio(mut self, stdio: StdioMode) -> Self {
        self.stdio = stdio;
        self
    }

    pub fn interrupt_policy(mut self, policy: InterruptPolicy) -> Self {
        self.interrupts = policy;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_env(&self, key: &str) -> Option<&OsStr> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn get_stdio(&self) -> StdioMode {
        self.stdio
    }

    pub fn get_interrupt_policy(&self) -> InterruptPolicy {
        self.interrupts
    }

    /// Equivalent `std::process::Command`. The child sees exactly `env`.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.env_clear();
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        if self.stdio == StdioMode::Null {
            cmd.stdin(Stdio::null());
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        }
        cmd
    }

    /// Run the plugin to completion as a real process
    pub fn run(&self, interrupts: &Interrupts) -> Result<ExitOutcome> {
        self.run_with(&SystemSpawner, interrupts)
    }

    /// Run the plugin through `spawner`, relaying interrupts until it exits
    pub fn run_with(&self, spawner: &dyn Spawner, interrupts: &Interrupts) -> Result<ExitOutcome> {
        let exec_err = |source: io::Error| DockerCliError::Exec {
            path: self.program.clone(),
            source,
        };

        debug!(program = %self.program.display(), args = ?self.args, "starting plugin");
        let mut child = spawner.spawn(self).map_err(exec_err)?;

        let mut seen = interrupts.count();
        let mut killed = false;

        loop {
            if let Some(outcome) = child.try_wait().map_err(exec_err)? {
                debug!(?outcome, "plugin exited");
                return Ok(outcome);
            }

            let received = interrupts.count();
            if received > seen {
                seen = received;
                if received >= self.interrupts.force_kill_after {
                    if !killed {
                        warn!(
                            "got {} interrupts, forcefully terminating plugin",
                            received
                        );
                        if let Err(e) = child.kill() {
                            warn!(error = %e, "failed to kill plugin");
                        }
                        killed = true;
                    }
                } else if self.interrupts.forward {
                    if let Err(e) = child.interrupt() {
                        warn!(error = %e, "failed to forward interrupt to plugin");
                    }
                }
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}
