use crate::background::BackgroundRegistry;
use crate::command::{Command, ExitCode, SUCCESS};
use crate::env::Environment;
use crate::spawn::{Bindings, LaunchError, ProcessImage, Termination, spawn, wait_for};
use log::debug;
use nix::unistd::Pid;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Result of launching a single command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launched {
    /// The command ran in the foreground and has terminated.
    Finished(Termination),
    /// The command was started in the background and registered.
    Detached(Pid),
}

impl Launched {
    /// Shell-style status: the child's status, or success for a detached launch.
    pub fn status(&self) -> ExitCode {
        match self {
            Launched::Finished(termination) => termination.code(),
            Launched::Detached(_) => SUCCESS,
        }
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Empty path: returns `None`.
/// - Any path containing a `/` (absolute, `./foo`, `bin/sh`): returned as-is
///   if it names an executable file.
/// - Single path component: search each non-empty directory in `search_paths`
///   (PATH) in order and return the first executable match.
///
/// A candidate counts as executable when it is a regular file with any of the
/// owner, group or other execute bits set.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    let name = path.as_os_str();
    if name.is_empty() {
        return None;
    }
    if name.as_bytes().contains(&b'/') {
        return find_by_path(path).map(Cow::Borrowed);
    }
    find_in_path(search_paths, name).map(Cow::Owned)
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let path = dir.join(cmd);
        if is_executable(&path) {
            return Some(path);
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if is_executable(path) { Some(path) } else { None }
}

fn is_executable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Resolve `name` against the session's `PATH`.
pub fn resolve(name: &str, env: &Environment) -> Result<PathBuf, LaunchError> {
    let search_paths = env.get_var("PATH").unwrap_or_default();
    find_command_path(OsStr::new(&search_paths), Path::new(name))
        .map(Cow::into_owned)
        .ok_or_else(|| LaunchError::NotFound(name.to_string()))
}

/// Open a `<` target read-only.
pub fn open_input(path: &str) -> Result<File, LaunchError> {
    File::open(path).map_err(|source| LaunchError::Redirect {
        path: path.to_string(),
        source,
    })
}

/// Open a `>`/`>>` target write-only, creating it with mode 0644.
pub fn open_output(path: &str, append: bool) -> Result<File, LaunchError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).mode(0o644);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    options.open(path).map_err(|source| LaunchError::Redirect {
        path: path.to_string(),
        source,
    })
}

/// Launch one command as an external program.
///
/// Redirection files are opened here, before forking, so that a missing input
/// file is reported by the engine and nothing is spawned. A foreground command
/// is waited for; a background command is registered with `registry` and the
/// function returns immediately.
pub fn launch(
    command: &Command,
    env: &Environment,
    registry: &mut BackgroundRegistry,
) -> Result<Launched, LaunchError> {
    let Some(name) = command.name() else {
        return Ok(Launched::Finished(Termination::Exited(SUCCESS)));
    };

    let path = resolve(name, env)?;
    let image = ProcessImage::prepare(&path, &command.arguments, env)?;

    let input = command.input_file.as_deref().map(open_input).transpose()?;
    let output = command
        .output_redirect()
        .map(|(path, append)| open_output(path, append))
        .transpose()?;

    let bindings = Bindings {
        stdin: input.as_ref().map(AsFd::as_fd),
        stdout: output.as_ref().map(AsFd::as_fd),
        close: input
            .iter()
            .chain(output.iter())
            .map(AsRawFd::as_raw_fd)
            .collect(),
    };

    // Anything still buffered would otherwise show up after the child's output.
    let _ = io::stdout().flush();
    let pid = spawn(&image, &bindings)?;
    debug!("launched {} as pid {pid}", path.display());

    if command.background {
        registry.register(pid, command.display());
        return Ok(Launched::Detached(pid));
    }
    Ok(Launched::Finished(wait_for(pid)?))
}
