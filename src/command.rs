use crate::env::Environment;
use anyhow::Result;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Successful completion.
pub const SUCCESS: ExitCode = 0;
/// Usage, parse, redirection or fork errors.
pub const GENERAL_FAILURE: ExitCode = 1;
/// The program could not be found, or a forked child failed to exec it.
pub const COMMAND_NOT_FOUND: ExitCode = 127;
/// Added to the signal number when a child is killed by a signal.
pub const SIGNAL_BASE: ExitCode = 128;

/// What the session should do after a line has been executed.
///
/// Ending the session is a distinct variant rather than a reserved status
/// value, so it can never be confused with a program's exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep reading lines; the payload is the status of the line just run.
    Continue(ExitCode),
    /// End the session with the given exit code.
    Terminate(ExitCode),
}

impl Outcome {
    pub fn success() -> Self {
        Outcome::Continue(SUCCESS)
    }

    /// The status carried by either variant.
    pub fn status(&self) -> ExitCode {
        match *self {
            Outcome::Continue(code) | Outcome::Terminate(code) => code,
        }
    }
}

/// One process specification, produced per pipeline segment by the parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// Program name followed by its arguments. Empty means no-op.
    pub arguments: Vec<String>,
    /// File to read standard input from (`<`).
    pub input_file: Option<String>,
    /// File to write standard output to (`>` or `>>`).
    pub output_file: Option<String>,
    /// Append instead of truncating; only meaningful with `output_file`.
    pub append_output: bool,
    /// Launch without waiting for completion (`&`).
    pub background: bool,
    /// Parsed as one stage of a multi-stage pipeline.
    pub pipeline_member: bool,
}

impl Command {
    pub fn new<I, S>(arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            arguments: arguments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    /// The program name, i.e. the first argument.
    pub fn name(&self) -> Option<&str> {
        self.arguments.first().map(String::as_str)
    }

    /// Output redirection target together with its append flag.
    pub fn output_redirect(&self) -> Option<(&str, bool)> {
        self.output_file
            .as_deref()
            .map(|path| (path, self.append_output))
    }

    /// Human-readable rendering used in job reports and logs.
    pub fn display(&self) -> String {
        self.arguments.join(" ")
    }
}

/// The commands parsed from one input line, in stage order. Never empty.
pub type Pipeline = Vec<Command>;

/// Object-safe trait for any internal operation that can be executed by the shell.
///
/// Builtins run inside the engine process. They write to `stdout`, which is
/// either the terminal or a redirection target, and may mutate the session
/// environment.
pub trait ExecutableCommand {
    /// Executes the command.
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment) -> Result<Outcome>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`; the session
/// then falls back to launching an external program.
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;
}
