use anyhow::Result;
use argh::FromArgs;
use log::info;
use minishell::Interpreter;
use minishell::command::Outcome;
use minishell::config::Config;
use minishell::logging;
use minishell::prompt::DEFAULT_PROMPT;

#[derive(FromArgs)]
/// A small interactive shell with pipelines, redirections and background jobs.
struct Args {
    #[argh(option, short = 'c')]
    /// run a single command line and exit with its status.
    command: Option<String>,

    #[argh(option, default = "DEFAULT_PROMPT.to_string()")]
    /// prompt template; supports \u, \h, \w, \W, \$ and \\.
    prompt: String,

    #[argh(option, default = "String::from(\"warn\")")]
    /// diagnostic log level: off, error, warn, info, debug or trace.
    log_level: String,

    #[argh(option, default = "1")]
    /// reap finished background jobs every N lines.
    sweep_interval: usize,

    #[argh(switch, short = 'q')]
    /// do not print the greeting on start.
    quiet: bool,
}

fn run(args: Args) -> Result<i32> {
    let config = Config {
        prompt: args.prompt,
        sweep_interval: args.sweep_interval,
        banner: !args.quiet,
        log_level: logging::parse_level(&args.log_level)?,
    };
    logging::init(config.log_level)?;

    let mut sh = Interpreter::with_config(config);
    match args.command {
        Some(line) => {
            info!("running one line: {line}");
            let status = match sh.execute_line(&line) {
                Outcome::Continue(code) | Outcome::Terminate(code) => code,
            };
            sh.shutdown();
            Ok(status)
        }
        None => sh.repl(),
    }
}

fn main() {
    let args: Args = argh::from_env();
    let code = match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("minishell: {err:#}");
            1
        }
    };
    std::process::exit(code);
}
