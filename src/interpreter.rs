use crate::background::BackgroundRegistry;
use crate::builtin::builtin_factories;
use crate::command::{
    Command, CommandFactory, ExecutableCommand, ExitCode, GENERAL_FAILURE, Outcome, SUCCESS,
};
use crate::config::Config;
use crate::env::Environment;
use crate::external::{Launched, open_output};
use crate::parser;
use crate::pipeline::run_pipeline;
use crate::prompt::Prompt;
use log::{debug, info, warn};
use nix::sys::signal::{SigHandler, Signal, signal};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, Write};

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate, see [`crate::builtin`].
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// A minimal shell session: reads lines, runs builtins in-process and
/// everything else as child processes.
///
/// The interpreter owns the [`Environment`], the builtin factories and the
/// registry of background jobs.
///
/// Example
/// ```
/// use minishell::{Interpreter, command::Outcome};
/// let mut sh = Interpreter::default();
/// assert_eq!(sh.execute_line("true"), Outcome::Continue(0));
/// assert_eq!(sh.execute_line("exit 4"), Outcome::Terminate(4));
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
    background: BackgroundRegistry,
    config: Config,
    last_status: ExitCode,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of builtin factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            commands,
            background: BackgroundRegistry::new(),
            config: Config::default(),
            last_status: SUCCESS,
        }
    }

    /// An interpreter with every builtin and the given settings.
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn background(&self) -> &BackgroundRegistry {
        &self.background
    }

    /// Status of the most recently executed line.
    pub fn last_status(&self) -> ExitCode {
        self.last_status
    }

    /// Parse and run one input line.
    ///
    /// Errors are reported on stderr and turned into a non-zero status; only
    /// `exit` ends the session.
    pub fn execute_line(&mut self, line: &str) -> Outcome {
        if line.trim().is_empty() {
            return Outcome::success();
        }
        self.env.history.push(line.to_string());

        let outcome = match parser::parse_line(line, &self.env) {
            Ok(pipeline) => self.execute_pipeline(&pipeline),
            Err(err) => {
                eprintln!("minishell: parse error: {err}");
                Outcome::Continue(GENERAL_FAILURE)
            }
        };
        self.last_status = outcome.status();
        outcome
    }

    fn execute_pipeline(&mut self, pipeline: &[Command]) -> Outcome {
        if let [command] = pipeline {
            if let Some(builtin) = self.create_builtin(command) {
                return self.run_builtin(builtin, command);
            }
        }

        match run_pipeline(pipeline, &self.env, &mut self.background) {
            Ok(Launched::Finished(termination)) => Outcome::Continue(termination.code()),
            Ok(Launched::Detached(pid)) => {
                eprintln!("[{pid}]");
                Outcome::success()
            }
            Err(err) => {
                eprintln!("minishell: {err}");
                Outcome::Continue(err.status())
            }
        }
    }

    fn create_builtin(&self, command: &Command) -> Option<Box<dyn ExecutableCommand>> {
        let (name, args) = command.arguments.split_first()?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.commands
            .iter()
            .find_map(|factory| factory.try_create(&self.env, name, &args))
    }

    fn run_builtin(&mut self, builtin: Box<dyn ExecutableCommand>, command: &Command) -> Outcome {
        if command.input_file.is_some() || command.background {
            debug!("builtin {} ignores `<` and `&`", command.display());
        }

        let result = match command.output_redirect() {
            Some((path, append)) => match open_output(path, append) {
                Ok(mut file) => builtin.execute(&mut file, &mut self.env),
                Err(err) => {
                    eprintln!("minishell: {err}");
                    return Outcome::Continue(err.status());
                }
            },
            None => {
                let mut stdout = io::stdout().lock();
                builtin
                    .execute(&mut stdout, &mut self.env)
                    .and_then(|outcome| stdout.flush().map(|_| outcome).map_err(Into::into))
            }
        };

        result.unwrap_or_else(|err| {
            eprintln!("minishell: {}: {err:#}", command.name().unwrap_or_default());
            Outcome::Continue(GENERAL_FAILURE)
        })
    }

    /// Reap finished background jobs and report them on stderr.
    pub fn report_completions(&mut self) {
        for done in self.background.sweep() {
            eprintln!("[{}] {} {}", done.pid, done.termination, done.command);
        }
    }

    /// Final sweep before the session ends. Jobs still running are left alone.
    pub fn shutdown(&mut self) {
        self.report_completions();
        for job in self.background.entries() {
            warn!("background pid {} still running at exit: {}", job.pid, job.command);
        }
        info!("session ended with status {}", self.last_status);
    }

    /// Interactive Read-Eval-Print Loop. Returns the session's exit code.
    pub fn repl(&mut self) -> anyhow::Result<ExitCode> {
        let prompt = Prompt::new(self.config.prompt.clone())?;
        ignore_interactive_signals();

        let mut rl = DefaultEditor::new()?;
        info!("session started with prompt {:?}", prompt.template());
        if self.config.banner {
            println!("minishell: `help` lists builtins, `exit` or Ctrl-D leaves");
        }

        let mut lines = 0usize;
        let status = loop {
            match rl.readline(&prompt.render(&self.env)) {
                Ok(line) => {
                    lines += 1;
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    let outcome = self.execute_line(&line);
                    if self.config.sweep_due(lines) {
                        self.report_completions();
                    }
                    if let Outcome::Terminate(code) = outcome {
                        break code;
                    }
                }
                // Ctrl-C drops the line being edited.
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break self.last_status,
                Err(err) => {
                    self.shutdown();
                    return Err(err.into());
                }
            }
        };

        self.shutdown();
        Ok(status)
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default set of builtins:
    /// `cd`, `pwd`, `export`, `echo`, `exit`, `help` and `history`.
    fn default() -> Self {
        Self::new(builtin_factories())
    }
}

/// Keep the engine alive on Ctrl-C and Ctrl-\ while a foreground child runs.
/// Children put the default dispositions back before exec.
fn ignore_interactive_signals() {
    for sig in [Signal::SIGINT, Signal::SIGQUIT] {
        // SAFETY: SIG_IGN installs no handler code.
        if let Err(errno) = unsafe { signal(sig, SigHandler::SigIgn) } {
            warn!("could not ignore {sig}: {errno}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock_current_dir;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

    fn make_unique_temp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "interpreter_tests_{}_{}_{}",
            tag,
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn test_blank_line_is_not_recorded() {
        let mut sh = Interpreter::default();
        assert_eq!(sh.execute_line("   "), Outcome::success());
        assert!(sh.env().history.is_empty());
    }

    #[test]
    fn test_every_line_is_recorded_in_order() {
        let mut sh = Interpreter::default();
        sh.execute_line("true");
        sh.execute_line("echo 'unterminated");
        sh.execute_line("false");
        assert_eq!(
            sh.env().history,
            vec!["true", "echo 'unterminated", "false"]
        );
    }

    #[test]
    fn test_parse_error_continues_with_status_one() {
        let mut sh = Interpreter::default();
        assert_eq!(sh.execute_line("ls |"), Outcome::Continue(1));
        assert_eq!(sh.execute_line("a & | b"), Outcome::Continue(1));
        assert_eq!(sh.last_status(), 1);
    }

    #[test]
    fn test_builtin_output_redirection() {
        let base = make_unique_temp_dir("builtin_redirect");
        let out = base.join("out.txt");
        let mut sh = Interpreter::default();

        let line = format!("echo hi > {}", out.display());
        assert_eq!(sh.execute_line(&line), Outcome::success());
        let line = format!("echo there >> {}", out.display());
        assert_eq!(sh.execute_line(&line), Outcome::success());
        assert_eq!(fs::read_to_string(&out).unwrap(), "hi\nthere\n");

        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn test_builtin_redirect_failure_is_status_one() {
        let mut sh = Interpreter::default();
        let line = "echo hi > /nonexistent-dir-for-minishell/out.txt";
        assert_eq!(sh.execute_line(line), Outcome::Continue(1));
    }

    #[test]
    fn test_export_is_visible_to_expansion_and_children() {
        let base = make_unique_temp_dir("export");
        let out = base.join("out.txt");
        let mut sh = Interpreter::default();

        assert_eq!(sh.execute_line("export GREETING=hello"), Outcome::success());
        let line = format!("sh -c 'printf %s-$0 \"$GREETING\"' $GREETING > {}", out.display());
        assert_eq!(sh.execute_line(&line), Outcome::success());
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello-hello");

        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn test_cd_changes_where_children_run() {
        let _lock = lock_current_dir();
        let orig = std::env::current_dir().unwrap();
        let base = fs::canonicalize(make_unique_temp_dir("cd")).unwrap();
        let mut sh = Interpreter::default();

        let line = format!("cd {}", base.display());
        assert_eq!(sh.execute_line(&line), Outcome::success());
        assert_eq!(sh.execute_line("touch created-here"), Outcome::success());
        assert!(base.join("created-here").exists());
        assert_eq!(sh.env().current_dir, base);

        std::env::set_current_dir(orig).unwrap();
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn test_background_job_is_reported_once() {
        let mut sh = Interpreter::default();
        assert_eq!(sh.execute_line("sh -c 'exit 2' &"), Outcome::success());
        assert_eq!(sh.background().len(), 1);

        let deadline = Instant::now() + Duration::from_secs(10);
        while !sh.background().is_empty() && Instant::now() < deadline {
            sh.report_completions();
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(sh.background().is_empty());
    }

    #[test]
    fn test_exit_terminates_and_bad_exit_continues() {
        let mut sh = Interpreter::default();
        assert_eq!(sh.execute_line("exit nope"), Outcome::Continue(1));
        assert_eq!(sh.execute_line("exit 3"), Outcome::Terminate(3));
        assert_eq!(sh.last_status(), 3);
    }

    #[test]
    fn test_with_config_keeps_builtins() {
        let config = Config {
            banner: false,
            ..Config::default()
        };
        let mut sh = Interpreter::with_config(config.clone());
        assert_eq!(sh.config(), &config);
        assert_eq!(sh.execute_line("exit"), Outcome::Terminate(0));
    }
}
