//! Prompt templates with bash-like backslash escapes.

use crate::env::Environment;
use anyhow::{Context, Result};
use nix::unistd::{User, geteuid, gethostname};
use regex::{Captures, Regex};

/// Template used when none is configured: `user@host:dir$ `.
pub const DEFAULT_PROMPT: &str = r"\u@\h:\w\$ ";

/// A compiled prompt template.
///
/// Recognised escapes are `\u` (user name), `\h` (host name), `\w` (last
/// component of the working directory), `\W` (full working directory), `\$`
/// (`#` when running as root, `$` otherwise) and `\\`. Any other escaped
/// character stands for itself.
#[derive(Debug, Clone)]
pub struct Prompt {
    template: String,
    escape: Regex,
}

impl Prompt {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let escape = Regex::new(r"\\(.)").context("compiling prompt escape pattern")?;
        Ok(Self {
            template: template.into(),
            escape,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Expand the template against the current session state.
    pub fn render(&self, env: &Environment) -> String {
        self.escape
            .replace_all(&self.template, |caps: &Captures| match &caps[1] {
                "u" => user_name(env),
                "h" => host_name(),
                "w" => env
                    .current_dir
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| env.current_dir.to_string_lossy().into_owned()),
                "W" => env.current_dir.to_string_lossy().into_owned(),
                "$" => String::from(if geteuid().is_root() { "#" } else { "$" }),
                other => other.to_string(),
            })
            .into_owned()
    }
}

fn user_name(env: &Environment) -> String {
    match User::from_uid(geteuid()) {
        Ok(Some(user)) => user.name,
        _ => env.get_var("USER").unwrap_or_else(|| "?".to_string()),
    }
}

fn host_name() -> String {
    gethostname()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn env_in(dir: &str) -> Environment {
        let mut env = Environment::with_vars([("USER", "tester")]);
        env.current_dir = PathBuf::from(dir);
        env
    }

    #[test]
    fn test_directory_escapes() {
        let env = env_in("/home/tester/projects");
        assert_eq!(Prompt::new(r"\w").unwrap().render(&env), "projects");
        assert_eq!(Prompt::new(r"\W").unwrap().render(&env), "/home/tester/projects");
        assert_eq!(Prompt::new(r"[\w]").unwrap().render(&env), "[projects]");
    }

    #[test]
    fn test_root_directory_basename() {
        let env = env_in("/");
        assert_eq!(Prompt::new(r"\w>").unwrap().render(&env), "/>");
    }

    #[test]
    fn test_literal_and_unknown_escapes() {
        let env = env_in("/tmp");
        assert_eq!(Prompt::new(r"a\\b").unwrap().render(&env), r"a\b");
        assert_eq!(Prompt::new(r"\q> ").unwrap().render(&env), "q> ");
        assert_eq!(Prompt::new("plain> ").unwrap().render(&env), "plain> ");
    }

    #[test]
    fn test_dollar_reflects_effective_uid() {
        let env = env_in("/tmp");
        let expected = if geteuid().is_root() { "#" } else { "$" };
        assert_eq!(Prompt::new(r"\$").unwrap().render(&env), expected);
    }

    #[test]
    fn test_default_prompt_shape() {
        let env = env_in("/var/log");
        let rendered = Prompt::new(DEFAULT_PROMPT).unwrap().render(&env);
        assert!(rendered.contains('@'));
        assert!(rendered.contains(":log"));
        assert!(rendered.ends_with("$ ") || rendered.ends_with("# "));
        assert_eq!(rendered.matches('\\').count(), 0);
    }
}
