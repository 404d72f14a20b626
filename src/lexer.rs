//! A module implementing lexical analysis (tokenization) for the command line.
//!
//! This is the only place where quoting and escaping rules live. The parser
//! consumes the resulting token stream twice: once to split pipeline stages
//! and once per stage to pick out redirections and the background marker.

use std::fmt;

/// A part of a word, distinguished by whether `$` references in it are expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordPart {
    /// Unquoted or double-quoted text; `$NAME` and `${NAME}` are expanded later.
    Bare(String),
    /// Single-quoted or backslash-escaped text, used verbatim.
    Quoted(String),
}

impl WordPart {
    pub fn text(&self) -> &str {
        match self {
            WordPart::Bare(s) | WordPart::Quoted(s) => s,
        }
    }
}

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word token, which may be composed of multiple parts (`WordPart`).
    Word(Vec<WordPart>),
    /// The pipe operator, `|`.
    PipeOp,
    /// Input redirection symbol, `<`.
    RedirectLeft,
    /// Output redirection symbol, `>`.
    RedirectRight,
    /// Appending output redirection symbol, `>>`.
    RedirectAppend,
    /// Background marker, `&`.
    Background,
}

impl Token {
    /// A word made of unquoted text.
    pub fn bare(text: impl Into<String>) -> Self {
        Token::Word(vec![WordPart::Bare(text.into())])
    }

    /// A word whose text is taken verbatim.
    pub fn literal(text: impl Into<String>) -> Self {
        Token::Word(vec![WordPart::Quoted(text.into())])
    }

    pub fn is_word(&self) -> bool {
        matches!(self, Token::Word(_))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(parts) => {
                for part in parts {
                    f.write_str(part.text())?;
                }
                Ok(())
            }
            Token::PipeOp => f.write_str("|"),
            Token::RedirectLeft => f.write_str("<"),
            Token::RedirectRight => f.write_str(">"),
            Token::RedirectAppend => f.write_str(">>"),
            Token::Background => f.write_str("&"),
        }
    }
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexingError {
    /// The line ended inside a single-quoted string.
    UnfinishedSingleQuote,
    /// The line ended inside a double-quoted string.
    UnfinishedDoubleQuote,
    /// The line ended right after a backslash.
    DanglingEscape,
}

impl fmt::Display for LexingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexingError::UnfinishedSingleQuote => f.write_str("unterminated single quote"),
            LexingError::UnfinishedDoubleQuote => f.write_str("unterminated double quote"),
            LexingError::DanglingEscape => f.write_str("backslash at end of line"),
        }
    }
}

impl std::error::Error for LexingError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
    Escaped { in_double_quote: bool },
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    current_word: Vec<WordPart>,
    buffer: String,
    buffer_quoted: bool,
}

impl LexingFSM {
    /// Creates a new instance of the lexical analysis Finite State Machine.
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            current_word: Vec::new(),
            buffer: String::new(),
            buffer_quoted: false,
        }
    }

    /// Performs lexical analysis on the input string and returns a vector of tokens.
    ///
    /// # Returns
    /// A `Result<Vec<Token>, LexingError>`: a vector of tokens on success, or a `LexingError`
    /// if the line ends inside a quote or right after a backslash.
    fn make_tokens(&mut self) -> Result<Vec<Token>, LexingError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start | LexingState::ReadingWord => self.handle_normal(ch, &mut out),
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch),
                LexingState::Escaped { in_double_quote } => self.handle_escaped(ch, in_double_quote),
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote => return Err(LexingError::UnfinishedSingleQuote),
            LexingState::ReadingDoubleQuote => return Err(LexingError::UnfinishedDoubleQuote),
            LexingState::Escaped { .. } => return Err(LexingError::DanglingEscape),
            _ => {}
        }

        self.finish_word(&mut out);
        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    /// Consumes the next character if it equals `expected`.
    fn next_is(&mut self, expected: char) -> bool {
        if self.input.get(self.pos) == Some(&expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn handle_normal(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            c if c.is_whitespace() => self.finish_word(out),
            '|' | '<' | '>' | '&' => {
                self.finish_word(out);
                let token = self.read_operator(ch);
                out.push(token);
            }
            '\'' => self.state = LexingState::ReadingSingleQuote,
            '"' => {
                // A `$NAME` never runs across a double-quote boundary.
                self.finalize_current_word_part();
                self.state = LexingState::ReadingDoubleQuote;
            }
            '\\' => {
                self.state = LexingState::Escaped {
                    in_double_quote: false,
                }
            }
            c => {
                self.push_char(c, false);
                self.state = LexingState::ReadingWord;
            }
        }
    }

    /// Sequencing operators are not part of the grammar: `&&` and `||` come
    /// out as plain words so they reach the program as argument text.
    fn read_operator(&mut self, ch: char) -> Token {
        match ch {
            '|' if self.next_is('|') => Token::literal("||"),
            '|' => Token::PipeOp,
            '&' if self.next_is('&') => Token::literal("&&"),
            '&' => Token::Background,
            '>' if self.next_is('>') => Token::RedirectAppend,
            '>' => Token::RedirectRight,
            _ => Token::RedirectLeft,
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.push_char(c, true),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => {
                self.finalize_current_word_part();
                self.state = LexingState::ReadingWord;
            }
            '\\' => {
                self.state = LexingState::Escaped {
                    in_double_quote: true,
                }
            }
            c => self.push_char(c, false),
        }
    }

    fn handle_escaped(&mut self, ch: char, in_double_quote: bool) {
        self.push_char(ch, true);
        self.state = if in_double_quote {
            LexingState::ReadingDoubleQuote
        } else {
            LexingState::ReadingWord
        };
    }

    /// Appends a character to the pending part, starting a new part whenever
    /// the quoting kind changes.
    fn push_char(&mut self, ch: char, quoted: bool) {
        if self.buffer_quoted != quoted {
            self.finalize_current_word_part();
            self.buffer_quoted = quoted;
        }
        self.buffer.push(ch);
    }

    fn finalize_current_word_part(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.buffer);
        self.current_word.push(if self.buffer_quoted {
            WordPart::Quoted(text)
        } else {
            WordPart::Bare(text)
        });
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        if self.state == LexingState::ReadingWord {
            self.finalize_current_word_part();
            let mut parts = std::mem::take(&mut self.current_word);
            if parts.is_empty() {
                // `''` or `""` on its own is still an (empty) argument.
                parts.push(WordPart::Quoted(String::new()));
            }
            out.push(Token::Word(parts));
        }
        self.state = LexingState::Start;
    }
}

/// The main entry point function to perform lexical analysis.
///
/// Creates and runs the finite state machine to tokenize the input line.
///
/// # Arguments
/// * `line` - The string to be tokenized.
///
/// # Returns
/// `Result<Vec<Token>, LexingError>`: A vector of tokens on success, or a `LexingError`
/// if quoting was left open.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, LexingError> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_tokens()
}
