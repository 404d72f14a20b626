use crate::background::BackgroundRegistry;
use crate::command::Command;
use crate::env::Environment;
use crate::external::{Launched, launch, open_input, open_output, resolve};
use crate::spawn::{Bindings, LaunchError, ProcessImage, cloexec_pipe, spawn, wait_for};
use log::{debug, warn};
use std::io::{self, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};

/// Run `commands` as one pipeline, stdout of each stage feeding stdin of the next.
///
/// Every stage is resolved before anything is forked, so a missing program
/// aborts the whole pipeline without side effects. Only the first stage's
/// input redirection and the last stage's output redirection apply. A
/// foreground pipeline reports the status of its last stage; a background
/// pipeline registers every stage and returns at once.
pub fn run_pipeline(
    commands: &[Command],
    env: &Environment,
    registry: &mut BackgroundRegistry,
) -> Result<Launched, LaunchError> {
    let (first, last) = match commands {
        [] => return launch(&Command::default(), env, registry),
        [single] => return launch(single, env, registry),
        [first, .., last] => (first, last),
    };

    let images = commands
        .iter()
        .map(|stage| {
            let name = stage.name().unwrap_or_default();
            let path = resolve(name, env)?;
            ProcessImage::prepare(&path, &stage.arguments, env)
        })
        .collect::<Result<Vec<_>, _>>()?;
    warn_ignored_redirects(commands);

    let input = first.input_file.as_deref().map(open_input).transpose()?;
    let output = last
        .output_redirect()
        .map(|(path, append)| open_output(path, append))
        .transpose()?;

    let pipes = (1..commands.len())
        .map(|_| cloexec_pipe())
        .collect::<Result<Vec<(OwnedFd, OwnedFd)>, _>>()?;

    let mut inherited: Vec<RawFd> = Vec::with_capacity(pipes.len() * 2 + 2);
    for (reader, writer) in &pipes {
        inherited.push(reader.as_raw_fd());
        inherited.push(writer.as_raw_fd());
    }
    inherited.extend(input.iter().chain(output.iter()).map(AsRawFd::as_raw_fd));

    let _ = io::stdout().flush();
    let last_index = commands.len() - 1;
    let mut pids = Vec::with_capacity(commands.len());
    for (index, image) in images.iter().enumerate() {
        let stdin = if index == 0 {
            input.as_ref().map(AsFd::as_fd)
        } else {
            Some(pipes[index - 1].0.as_fd())
        };
        let stdout = if index == last_index {
            output.as_ref().map(AsFd::as_fd)
        } else {
            Some(pipes[index].1.as_fd())
        };
        let bindings = Bindings {
            stdin,
            stdout,
            close: inherited.clone(),
        };

        let spawned = spawn(image, &bindings);
        drop(bindings);
        match spawned {
            Ok(pid) => pids.push(pid),
            Err(err) => {
                // Closing our ends lets the started stages see EOF and exit.
                drop(pipes);
                drop(input);
                drop(output);
                for pid in pids {
                    let _ = wait_for(pid);
                }
                return Err(err);
            }
        }
    }

    drop(pipes);
    drop(input);
    drop(output);
    debug!("pipeline of {} stages started: {pids:?}", pids.len());

    let last_pid = pids[last_index];
    if last.background {
        for (pid, stage) in pids.iter().zip(commands) {
            registry.register(*pid, stage.display());
        }
        return Ok(Launched::Detached(last_pid));
    }

    for pid in &pids[..last_index] {
        if let Err(err) = wait_for(*pid) {
            warn!("could not wait for pipeline stage {pid}: {err}");
        }
    }
    Ok(Launched::Finished(wait_for(last_pid)?))
}

fn warn_ignored_redirects(commands: &[Command]) {
    let last_index = commands.len() - 1;
    for (index, stage) in commands.iter().enumerate() {
        if index > 0 {
            if let Some(path) = &stage.input_file {
                warn!("ignoring input redirection from {path} in pipeline stage {index}");
            }
        }
        if index < last_index {
            if let Some(path) = &stage.output_file {
                warn!("ignoring output redirection to {path} in pipeline stage {index}");
            }
        }
    }
}
