//! A small interactive command shell.
//!
//! Input lines are tokenized ([`lexer`]), split into pipeline segments and
//! expanded ([`parser`], [`expand`]), then either handled in-process by a
//! builtin or started as child processes ([`external`], [`pipeline`]).
//! Children started with a trailing `&` are tracked by the
//! [`background`] registry and reaped without blocking.
//!
//! The main entry point is [`Interpreter`], which owns the session state and
//! runs one line at a time with [`Interpreter::execute_line`] or interactively
//! with [`Interpreter::repl`].

pub mod background;
mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod expand;
pub mod external;
mod interpreter;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod spawn;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;

/// Serializes tests that change the process working directory.
#[cfg(test)]
pub(crate) fn lock_current_dir() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
