use log::warn;
use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::{CString, NulError, OsString};
use std::path::PathBuf;

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: a map of environment variables used for `$NAME` expansion and
///   handed to every launched program.
/// - `current_dir`: the working directory, kept in sync with the process cwd by `cd`.
/// - `history`: the lines entered during this session, oldest first.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// Lines entered in this session, as shown by `history`.
    pub history: Vec<String>,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars_os()` and initializes `current_dir`
    /// from `std::env::current_dir()`. Variables whose name or value is not
    /// valid UTF-8 are skipped with a warning.
    pub fn new() -> Self {
        let vars = utf8_vars(stdenv::vars_os());
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            history: Vec::new(),
        }
    }

    /// An environment holding only the given variables, rooted at the process cwd.
    pub fn with_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            current_dir: stdenv::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            history: Vec::new(),
        }
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    /// A non-UTF-8 process value counts as unset.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Render `self.vars` as `KEY=VALUE` C strings for `execve`.
    pub fn to_envp(&self) -> Result<Vec<CString>, NulError> {
        self.vars
            .iter()
            .map(|(k, v)| CString::new(format!("{k}={v}")))
            .collect()
    }
}

fn utf8_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> HashMap<String, String> {
    let mut utf8 = HashMap::new();
    for (key, value) in vars {
        match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => {
                utf8.insert(key, value);
            }
            (Ok(key), Err(_)) => warn!("skipping environment variable {key}: value is not UTF-8"),
            (Err(key), _) => warn!(
                "skipping environment variable {}: name is not UTF-8",
                key.to_string_lossy()
            ),
        }
    }
    utf8
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::Environment;
    use std::collections::HashMap;
    use std::env as stdenv;

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment {
            vars: HashMap::new(),
            current_dir: stdenv::current_dir().unwrap(),
            history: Vec::new(),
        };

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn test_session_value_shadows_process_env() {
        let mut env = Environment::with_vars([("PATH", "/only/here")]);
        assert_eq!(env.get_var("PATH").as_deref(), Some("/only/here"));
        env.set_var("PATH", "/elsewhere");
        assert_eq!(env.get_var("PATH").as_deref(), Some("/elsewhere"));
        assert!(env.history.is_empty());
    }

    #[test]
    fn test_envp_contains_key_value_pairs() {
        let env = Environment::with_vars([("A", "1"), ("B", "two words")]);
        let mut envp: Vec<String> = env
            .to_envp()
            .unwrap()
            .into_iter()
            .map(|c| c.into_string().unwrap())
            .collect();
        envp.sort();
        assert_eq!(envp, vec!["A=1".to_string(), "B=two words".to_string()]);
    }

    #[test]
    fn test_non_utf8_variables_are_skipped() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let vars = super::utf8_vars([
            (OsString::from("GOOD"), OsString::from("fine")),
            (OsString::from("BAD_VALUE"), OsString::from_vec(vec![0xff, 0xfe])),
            (OsString::from_vec(vec![b'K', 0xff]), OsString::from("v")),
        ]);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("GOOD").map(String::as_str), Some("fine"));
    }

    #[test]
    fn test_envp_rejects_interior_nul() {
        let env = Environment::with_vars([("BAD", "a\0b")]);
        assert!(env.to_envp().is_err());
    }
}
