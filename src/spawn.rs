//! The single fork + descriptor binding + exec primitive.
//!
//! Both the standalone launcher and the pipeline orchestrator go through
//! [`spawn`]. Everything the child needs is prepared up front in a
//! [`ProcessImage`], so that between `fork` and `execve` the child only makes
//! async-signal-safe calls: `dup2`, `fcntl`, `close`, `sigaction`, `write` and `_exit`.

use crate::command::{COMMAND_NOT_FOUND, ExitCode, SIGNAL_BASE};
use crate::env::Environment;
use log::debug;
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, FdFlag, OFlag, fcntl};
use nix::libc;
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, close, dup2, execve, fork, pipe2, write};
use std::ffi::CString;
use std::fmt;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

const STDIN_FILENO: RawFd = 0;
const STDOUT_FILENO: RawFd = 1;
const STDERR_FILENO: RawFd = 2;

/// Status a forked child exits with when binding descriptors or `execve` fails.
pub const CHILD_SETUP_FAILED: ExitCode = COMMAND_NOT_FOUND;

/// Errors raised while starting processes. Every variant is recoverable: the
/// engine reports it and carries on with the next line.
#[derive(Debug)]
pub enum LaunchError {
    /// No executable with this name was found.
    NotFound(String),
    /// An argument or environment entry contains a NUL byte.
    InvalidArgument(String),
    /// A redirection target could not be opened.
    Redirect { path: String, source: io::Error },
    /// Creating a pipe failed.
    Pipe(Errno),
    /// `fork` failed.
    Fork(Errno),
    /// Waiting for a child failed.
    Wait(Errno),
}

impl LaunchError {
    /// The exit status reported for this error.
    pub fn status(&self) -> ExitCode {
        match self {
            LaunchError::NotFound(_) => COMMAND_NOT_FOUND,
            _ => crate::command::GENERAL_FAILURE,
        }
    }
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::NotFound(name) => write!(f, "command not found: {name}"),
            LaunchError::InvalidArgument(arg) => {
                write!(f, "argument contains a NUL byte: {arg:?}")
            }
            LaunchError::Redirect { path, source } => write!(f, "{path}: {source}"),
            LaunchError::Pipe(errno) => write!(f, "failed to create pipe: {errno}"),
            LaunchError::Fork(errno) => write!(f, "failed to fork process: {errno}"),
            LaunchError::Wait(errno) => write!(f, "failed to wait for child: {errno}"),
        }
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaunchError::Redirect { source, .. } => Some(source),
            LaunchError::Pipe(e) | LaunchError::Fork(e) | LaunchError::Wait(e) => Some(e),
            _ => None,
        }
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(Signal),
}

impl Termination {
    /// Shell-style exit status: the exit code, or 128 + signal number.
    pub fn code(&self) -> ExitCode {
        match *self {
            Termination::Exited(code) => code,
            Termination::Signaled(signal) => SIGNAL_BASE + signal as i32,
        }
    }

    /// Terminal wait statuses only; stops and continues are not terminations.
    pub fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(Termination::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(Termination::Signaled(signal)),
            _ => None,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(0) => f.write_str("Done"),
            Termination::Exited(code) => write!(f, "Exit {code}"),
            Termination::Signaled(signal) => write!(f, "Killed by {signal}"),
        }
    }
}

/// Everything `execve` needs, converted to C strings before forking.
#[derive(Debug)]
pub struct ProcessImage {
    path: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    failure_prefix: Vec<u8>,
}

impl ProcessImage {
    /// Prepare the image for `path` with `arguments` (including `argv[0]`) and
    /// the session's variables as the child's environment.
    pub fn prepare(
        path: &Path,
        arguments: &[String],
        env: &Environment,
    ) -> Result<Self, LaunchError> {
        let path_c = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| LaunchError::InvalidArgument(path.display().to_string()))?;
        let argv = arguments
            .iter()
            .map(|arg| {
                CString::new(arg.as_str()).map_err(|_| LaunchError::InvalidArgument(arg.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let envp = env
            .to_envp()
            .map_err(|_| LaunchError::InvalidArgument("environment".to_string()))?;
        let name = arguments.first().map(String::as_str).unwrap_or_default();
        Ok(Self {
            path: path_c,
            argv,
            envp,
            failure_prefix: format!("minishell: {name}: ").into_bytes(),
        })
    }
}

/// Descriptor bindings for one child.
///
/// `stdin`/`stdout` are duplicated onto descriptors 0 and 1; `None` leaves
/// the inherited descriptor alone. Every descriptor in `close` is closed in
/// the child after binding and before `execve`.
#[derive(Debug, Default)]
pub struct Bindings<'a> {
    pub stdin: Option<BorrowedFd<'a>>,
    pub stdout: Option<BorrowedFd<'a>>,
    pub close: Vec<RawFd>,
}

/// Fork a child, bind its descriptors and replace it with `image`.
///
/// Returns the child's pid in the parent. The child never returns from this
/// function: it either becomes the new program or `_exit`s with
/// [`CHILD_SETUP_FAILED`].
pub fn spawn(image: &ProcessImage, bindings: &Bindings<'_>) -> Result<Pid, LaunchError> {
    let stdin = bindings.stdin.map(|fd| fd.as_raw_fd());
    let stdout = bindings.stdout.map(|fd| fd.as_raw_fd());

    // SAFETY: the child only performs async-signal-safe operations on data
    // prepared before the fork, then execs or exits.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => exec_child(image, stdin, stdout, &bindings.close),
        Ok(ForkResult::Parent { child }) => {
            debug!(
                "forked pid {child} for {:?} (stdin={stdin:?}, stdout={stdout:?})",
                image.path
            );
            Ok(child)
        }
        Err(errno) => Err(LaunchError::Fork(errno)),
    }
}

fn exec_child(
    image: &ProcessImage,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    close_fds: &[RawFd],
) -> ! {
    if let Err(errno) = bind_descriptors(stdin, stdout, close_fds) {
        child_fail(&image.failure_prefix, errno);
    }
    reset_signal_dispositions();

    let errno = match execve(&image.path, &image.argv, &image.envp) {
        Ok(never) => match never {},
        Err(errno) => errno,
    };
    child_fail(&image.failure_prefix, errno)
}

fn bind_descriptors(
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    close_fds: &[RawFd],
) -> Result<(), Errno> {
    if let Some(fd) = stdin {
        bind_onto(fd, STDIN_FILENO)?;
    }
    if let Some(fd) = stdout {
        bind_onto(fd, STDOUT_FILENO)?;
    }
    for &fd in close_fds {
        if fd > STDERR_FILENO {
            let _ = close(fd);
        }
    }
    Ok(())
}

/// Make `fd` available as `target` after `execve`.
///
/// `dup2` onto itself is a no-op that leaves `FD_CLOEXEC` set, so an fd that
/// already sits at `target` has the flag cleared instead.
fn bind_onto(fd: RawFd, target: RawFd) -> Result<(), Errno> {
    if fd == target {
        clear_cloexec(fd)
    } else {
        dup2(fd, target).map(drop)
    }
}

fn clear_cloexec(fd: RawFd) -> Result<(), Errno> {
    fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty())).map(drop)
}

/// The engine ignores SIGINT/SIGQUIT and the Rust runtime ignores SIGPIPE;
/// ignored dispositions survive `execve`, so put them back for the program.
fn reset_signal_dispositions() {
    for sig in [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGPIPE] {
        // SAFETY: installing SIG_DFL does not run any handler code.
        let _ = unsafe { signal(sig, SigHandler::SigDfl) };
    }
}

fn child_fail(prefix: &[u8], errno: Errno) -> ! {
    let stderr = io::stderr();
    let fd = stderr.as_fd();
    let _ = write(fd, prefix);
    let _ = write(fd, errno.desc().as_bytes());
    let _ = write(fd, b"\n");
    // SAFETY: `_exit` skips atexit handlers and stdio flushing, which belong
    // to the parent.
    unsafe { libc::_exit(CHILD_SETUP_FAILED) }
}

/// Create a pipe whose ends are closed on `execve`, returning `(read, write)`.
///
/// Children that need an end get it through [`Bindings`], so the flag only
/// keeps the pipe out of unrelated programs.
pub fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd), LaunchError> {
    let (reader, writer) = pipe2(OFlag::O_CLOEXEC).map_err(LaunchError::Pipe)?;
    debug!(
        "created pipe read={} write={}",
        reader.as_raw_fd(),
        writer.as_raw_fd()
    );
    Ok((reader, writer))
}

/// Block until `pid` terminates.
pub fn wait_for(pid: Pid) -> Result<Termination, LaunchError> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                if let Some(termination) = Termination::from_wait_status(status) {
                    debug!("pid {pid} finished: {termination:?}");
                    return Ok(termination);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(LaunchError::Wait(errno)),
        }
    }
}

/// Collect `pid` if it has terminated, without blocking.
pub fn try_reap(pid: Pid) -> Result<Option<Termination>, Errno> {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(status) => Ok(Termination::from_wait_status(status)),
        Err(Errno::EINTR) => Ok(None),
        Err(errno) => Err(errno),
    }
}
