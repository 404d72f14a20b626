//! Expansion of `$NAME` and `${NAME}` references inside words.

use crate::env::Environment;
use crate::lexer::WordPart;

/// Expand variable references in a single token, scanning left to right.
///
/// - `${NAME}` takes everything up to the next `}`; a missing `}` closes at
///   the end of the token.
/// - `$NAME` takes the longest run of ASCII alphanumerics and `_`. A `$` not
///   followed by such a character is kept as-is.
/// - Unset names expand to the empty string. Substituted values are not
///   expanded again.
pub fn expand<F>(token: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(token.len());
    let mut chars = token.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        let name: String = if chars.next_if_eq(&'{').is_some() {
            chars.by_ref().take_while(|&c| c != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(c) = chars.next_if(|c| c.is_ascii_alphanumeric() || *c == '_') {
                name.push(c);
            }
            if name.is_empty() {
                result.push('$');
                continue;
            }
            name
        };

        if let Some(value) = lookup(&name) {
            result.push_str(&value);
        }
    }

    result
}

/// Join the parts of a lexed word, expanding only the unquoted/double-quoted ones.
pub fn expand_word(parts: &[WordPart], env: &Environment) -> String {
    let mut result = String::new();
    for part in parts {
        match part {
            WordPart::Bare(text) => result.push_str(&expand(text, |name| env.get_var(name))),
            WordPart::Quoted(text) => result.push_str(text),
        }
    }
    result
}
