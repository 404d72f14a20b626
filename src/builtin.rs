use crate::command::{CommandFactory, ExecutableCommand, GENERAL_FAILURE, Outcome, SUCCESS};
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::{Context, Result, anyhow, bail};
use argh::{EarlyExit, FromArgs};
use regex::Regex;
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process. They may change the session
/// environment and the engine's working directory.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command, writing any output to `stdout`.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<Outcome>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment) -> Result<Outcome> {
        match T::execute(*self, stdout, env) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                eprintln!("{}: {e:#}", T::name());
                Ok(Outcome::Continue(GENERAL_FAILURE))
            }
        }
    }
}

/// Usage or `--help` text produced by argh instead of a parsed command.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(self: Box<Self>, stdout: &mut dyn Write, _env: &mut Environment) -> Result<Outcome> {
        if self.is_error {
            eprintln!("{}", self.output.trim_end());
            Ok(Outcome::Continue(GENERAL_FAILURE))
        } else {
            writeln!(stdout, "{}", self.output.trim_end())?;
            Ok(Outcome::success())
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

/// Factories for every builtin, in dispatch order.
pub(crate) fn builtin_factories() -> Vec<Box<dyn CommandFactory>> {
    vec![
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Pwd>::default()),
        Box::new(Factory::<Export>::default()),
        Box::new(Factory::<Echo>::default()),
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<Help>::default()),
        Box::new(Factory::<History>::default()),
    ]
}

fn usage_of<T: BuiltinCommand>() -> String {
    match T::from_args(&[T::name()], &["--help"]) {
        Err(EarlyExit { output, .. }) => output,
        Ok(_) => String::new(),
    }
}

/// Full help text for the builtin called `name`.
pub(crate) fn builtin_usage(name: &str) -> Option<String> {
    let usage = match name {
        "cd" => usage_of::<Cd>(),
        "pwd" => usage_of::<Pwd>(),
        "export" => usage_of::<Export>(),
        "echo" => ECHO_USAGE.to_string(),
        "exit" => usage_of::<Exit>(),
        "help" => usage_of::<Help>(),
        "history" => usage_of::<History>(),
        _ => return None,
    };
    Some(usage)
}

const BUILTIN_NAMES: [&str; 7] = ["cd", "pwd", "export", "echo", "exit", "help", "history"];

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<Outcome> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(Outcome::success())
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute, relative to the current directory, or starting with ~. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl Cd {
    fn home(env: &Environment) -> Result<PathBuf> {
        env.get_var("HOME")
            .filter(|home| !home.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("HOME not set"))
    }

    fn resolve_target(&self, env: &Environment) -> Result<PathBuf> {
        let target = match self.target.as_deref() {
            None | Some("") | Some("~") => return Self::home(env),
            Some(t) => t,
        };
        let target = match target.strip_prefix("~/") {
            Some(rest) => Self::home(env)?.join(rest),
            None => PathBuf::from(target),
        };
        Ok(if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        })
    }
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<Outcome> {
        let new_dir = self.resolve_target(env)?;

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("can't chdir to {}", canonical.display()))?;
        env.set_var("PWD", canonical.to_string_lossy());
        env.current_dir = canonical;
        Ok(Outcome::success())
    }
}

#[derive(FromArgs)]
/// Set session variables, visible to $NAME expansion and to launched programs.
pub struct Export {
    #[argh(positional, greedy)]
    /// assignments of the form NAME=value.
    pub assignments: Vec<String>,
}

impl BuiltinCommand for Export {
    fn name() -> &'static str {
        "export"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<Outcome> {
        if self.assignments.is_empty() {
            bail!("usage: export NAME=value...");
        }
        let valid_name = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")?;

        let mut status = SUCCESS;
        for assignment in &self.assignments {
            match assignment.split_once('=') {
                Some((name, value)) if valid_name.is_match(name) => env.set_var(name, value),
                Some((name, _)) => {
                    eprintln!("export: `{name}': not a valid identifier");
                    status = GENERAL_FAILURE;
                }
                None => {
                    eprintln!("export: `{assignment}': expected NAME=value");
                    status = GENERAL_FAILURE;
                }
            }
        }
        Ok(Outcome::Continue(status))
    }
}

#[derive(FromArgs)]
/// End the shell session.
pub struct Exit {
    #[argh(positional)]
    /// exit status of the session; 0 when omitted.
    pub status: Option<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, _env: &mut Environment) -> Result<Outcome> {
        let status = match self.status {
            None => SUCCESS,
            Some(s) => s
                .trim()
                .parse()
                .map_err(|_| anyhow!("{s}: numeric argument required"))?,
        };
        Ok(Outcome::Terminate(status))
    }
}

/// Write the arguments to standard output, separated by spaces.
///
/// Only leading `-n` words are options; everything after them, including
/// `--help`, `--` and other dash words, is printed as given.
pub struct Echo {
    /// Do not output the trailing newline.
    pub no_newline: bool,
    /// Values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

const ECHO_USAGE: &str = "Usage: echo [-n] [<args...>]

Write the arguments to standard output, separated by spaces.

Options:
  -n                do not output the trailing newline.

Any other argument, including ones starting with `-`, is printed as given.
";

impl FromArgs for Echo {
    fn from_args(_command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        let flags = args.iter().take_while(|arg| **arg == "-n").count();
        Ok(Echo {
            no_newline: flags > 0,
            args: args[flags..].iter().map(|arg| arg.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<Outcome> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(Outcome::success())
    }
}

#[derive(FromArgs)]
/// Describe the shell and its builtin commands.
pub struct Help {
    #[argh(positional)]
    /// builtin to describe in full.
    pub command: Option<String>,
}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<Outcome> {
        if let Some(name) = self.command {
            let usage = builtin_usage(&name).ok_or_else(|| anyhow!("no help topic for `{name}'"))?;
            writeln!(stdout, "{}", usage.trim_end())?;
            return Ok(Outcome::success());
        }

        writeln!(stdout, "minishell builtins:")?;
        for name in BUILTIN_NAMES {
            let usage = builtin_usage(name).unwrap_or_default();
            let mut lines = usage.lines().filter(|line| !line.trim().is_empty());
            let synopsis = lines.next().unwrap_or(name).trim_start_matches("Usage: ");
            let description = lines.next().unwrap_or("").trim();
            writeln!(stdout, "  {synopsis:<28} {description}")?;
        }
        writeln!(stdout)?;
        writeln!(
            stdout,
            "Lines may contain 'quotes', \"quotes\", \\escapes, $NAME and ${{NAME}} expansion,"
        )?;
        writeln!(
            stdout,
            "redirections (< file, > file, >> file), pipelines (a | b) and a trailing & to run in the background."
        )?;
        writeln!(stdout, "Any other command is looked up in $PATH.")?;
        Ok(Outcome::success())
    }
}

#[derive(FromArgs)]
/// Show the lines entered in this session.
pub struct History {}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<Outcome> {
        for (index, line) in env.history.iter().enumerate() {
            writeln!(stdout, "{:>5}  {}", index + 1, line)?;
        }
        Ok(Outcome::success())
    }
}
