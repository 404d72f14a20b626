use crate::logging::DEFAULT_LEVEL;
use crate::prompt::DEFAULT_PROMPT;
use simplelog::LevelFilter;

/// Session settings, filled from command-line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Prompt template; see [`crate::prompt::Prompt`].
    pub prompt: String,
    /// Reap finished background jobs after this many lines. Zero means after every line.
    pub sweep_interval: usize,
    /// Print a greeting when an interactive session starts.
    pub banner: bool,
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            sweep_interval: 1,
            banner: true,
            log_level: DEFAULT_LEVEL,
        }
    }
}

impl Config {
    /// Whether the registry should be swept after `lines` lines have been read.
    pub fn sweep_due(&self, lines: usize) -> bool {
        self.sweep_interval <= 1 || lines % self.sweep_interval == 0
    }
}
