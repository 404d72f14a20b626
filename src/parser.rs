//! Pipeline splitting and per-stage command construction.
//!
//! The lexer's token stream is first cut into segments at top-level `|`
//! operators, then each segment is turned into a [`Command`]: redirections and
//! the background marker are pulled out, the remaining words become the
//! argument list and every word is run through variable expansion.
use crate::command::{Command, Pipeline};
use crate::env::Environment;
use crate::expand::expand_word;
use crate::lexer::{self, LexingError, Token};
use std::fmt;

/// Errors that can occur while building commands from tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    /// The line could not be tokenized (e.g. an unterminated quote).
    Lexing(LexingError),
    /// A pipeline stage has nothing in it, as in `| cmd`, `cmd |` or `a || b` written as `a | | b`.
    EmptyPipelineSegment,
    /// A redirection operator is not followed by a word. Holds the operator.
    MissingRedirectTarget(Token),
    /// `&` appears somewhere other than the very end of the line.
    MisplacedBackground,
    /// Encountered a token that was not expected at the current position.
    UnexpectedToken(Token),
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsingError::Lexing(e) => write!(f, "{e}"),
            ParsingError::EmptyPipelineSegment => f.write_str("empty command in pipeline"),
            ParsingError::MissingRedirectTarget(op) => {
                write!(f, "missing file name after `{op}`")
            }
            ParsingError::MisplacedBackground => {
                f.write_str("`&` is only allowed at the end of the line")
            }
            ParsingError::UnexpectedToken(token) => write!(f, "unexpected `{token}`"),
        }
    }
}

impl std::error::Error for ParsingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParsingError::Lexing(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LexingError> for ParsingError {
    fn from(e: LexingError) -> Self {
        ParsingError::Lexing(e)
    }
}

/// Split a token stream into pipeline segments at every `|` operator.
///
/// An empty token stream yields a single empty segment. A leading, trailing
/// or doubled `|` is an error.
pub fn split_pipeline(tokens: Vec<Token>) -> Result<Vec<Vec<Token>>, ParsingError> {
    if tokens.is_empty() {
        return Ok(vec![Vec::new()]);
    }

    let mut segments = Vec::new();
    let mut current = Vec::new();
    for token in tokens {
        if token == Token::PipeOp {
            if current.is_empty() {
                return Err(ParsingError::EmptyPipelineSegment);
            }
            segments.push(std::mem::take(&mut current));
        } else {
            current.push(token);
        }
    }

    if current.is_empty() {
        return Err(ParsingError::EmptyPipelineSegment);
    }
    segments.push(current);
    Ok(segments)
}

struct SegmentBuilder<'a> {
    tokens: Vec<Token>,
    pos: usize,
    env: &'a Environment,
}

impl<'a> SegmentBuilder<'a> {
    fn new(tokens: Vec<Token>, env: &'a Environment) -> Self {
        SegmentBuilder {
            tokens,
            pos: 0,
            env,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn build(mut self) -> Result<Command, ParsingError> {
        let mut command = Command::default();
        let mut words = Vec::new();

        while let Some(token) = self.consume() {
            match token {
                Token::Word(parts) => words.push(parts),
                // Repeated redirections of the same kind: the last one wins.
                Token::RedirectLeft => {
                    command.input_file = Some(self.parse_target(token)?);
                }
                Token::RedirectRight => {
                    command.output_file = Some(self.parse_target(token)?);
                    command.append_output = false;
                }
                Token::RedirectAppend => {
                    command.output_file = Some(self.parse_target(token)?);
                    command.append_output = true;
                }
                Token::Background => {
                    // Nothing may follow `&`, not even a redirection.
                    if self.peek().is_some() {
                        return Err(ParsingError::MisplacedBackground);
                    }
                    command.background = true;
                }
                Token::PipeOp => return Err(ParsingError::UnexpectedToken(token)),
            }
        }

        command.arguments = words
            .iter()
            .map(|parts| expand_word(parts, self.env))
            .collect();
        Ok(command)
    }

    /// Parse the file operand of a redirection operator.
    fn parse_target(&mut self, op: Token) -> Result<String, ParsingError> {
        match self.peek() {
            Some(Token::Word(parts)) => {
                let target = expand_word(parts, self.env);
                self.pos += 1;
                Ok(target)
            }
            _ => Err(ParsingError::MissingRedirectTarget(op)),
        }
    }
}

/// Build a single [`Command`] from the tokens of one pipeline segment.
pub fn build_segment(tokens: Vec<Token>, env: &Environment) -> Result<Command, ParsingError> {
    SegmentBuilder::new(tokens, env).build()
}

/// Constructs the [`Pipeline`] for a whole line from its tokens.
///
/// With more than one stage every command is marked as a pipeline member,
/// every stage must name a program, and only the last stage may carry `&`
/// (which then applies to the pipeline as a whole).
pub fn construct_pipeline(tokens: Vec<Token>, env: &Environment) -> Result<Pipeline, ParsingError> {
    let segments = split_pipeline(tokens)?;
    let stages = segments.len();

    let mut pipeline = Vec::with_capacity(stages);
    for (index, segment) in segments.into_iter().enumerate() {
        let mut command = build_segment(segment, env)?;
        if stages > 1 {
            if command.is_empty() {
                return Err(ParsingError::EmptyPipelineSegment);
            }
            if command.background && index + 1 < stages {
                return Err(ParsingError::MisplacedBackground);
            }
            command.pipeline_member = true;
        }
        pipeline.push(command);
    }
    Ok(pipeline)
}

/// Tokenize and parse one input line.
pub fn parse_line(line: &str, env: &Environment) -> Result<Pipeline, ParsingError> {
    let tokens = lexer::split_into_tokens(line)?;
    construct_pipeline(tokens, env)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::with_vars([("GREETING", "hello"), ("DIR", "/tmp/out")])
    }

    fn parse(line: &str) -> Result<Pipeline, ParsingError> {
        parse_line(line, &env())
    }

    fn single(line: &str) -> Command {
        let mut pipeline = parse(line).unwrap();
        assert_eq!(pipeline.len(), 1, "expected a single command for {line:?}");
        pipeline.remove(0)
    }

    #[test]
    fn test_quoted_arguments() {
        let cmd = single(r#"echo "a b" 'c d' e"#);
        assert_eq!(cmd.arguments, vec!["echo", "a b", "c d", "e"]);
        assert!(!cmd.background);
        assert!(!cmd.pipeline_member);
    }

    #[test]
    fn test_input_and_output_redirection() {
        let cmd = single("sort < in.txt > out.txt");
        assert_eq!(cmd.arguments, vec!["sort"]);
        assert_eq!(cmd.input_file.as_deref(), Some("in.txt"));
        assert_eq!(cmd.output_file.as_deref(), Some("out.txt"));
        assert!(!cmd.append_output);
    }

    #[test]
    fn test_append_redirection() {
        let cmd = single("echo hi >> log.txt");
        assert_eq!(cmd.arguments, vec!["echo", "hi"]);
        assert_eq!(cmd.output_file.as_deref(), Some("log.txt"));
        assert!(cmd.append_output);
    }

    #[test]
    fn test_last_redirection_wins() {
        let cmd = single("cat < a < b > c >> d");
        assert_eq!(cmd.input_file.as_deref(), Some("b"));
        assert_eq!(cmd.output_file.as_deref(), Some("d"));
        assert!(cmd.append_output);

        let cmd = single("cat >> c > d");
        assert_eq!(cmd.output_file.as_deref(), Some("d"));
        assert!(!cmd.append_output);
    }

    #[test]
    fn test_redirection_between_arguments() {
        let cmd = single("grep > out.txt -n foo");
        assert_eq!(cmd.arguments, vec!["grep", "-n", "foo"]);
        assert_eq!(cmd.output_file.as_deref(), Some("out.txt"));
    }

    #[test]
    fn test_background_marker() {
        let cmd = single("sleep 5 &");
        assert_eq!(cmd.arguments, vec!["sleep", "5"]);
        assert!(cmd.background);

        let cmd = single("sleep 5 > log &");
        assert!(cmd.background);
        assert_eq!(cmd.output_file.as_deref(), Some("log"));
    }

    #[test]
    fn test_misplaced_background_is_rejected() {
        assert_eq!(parse("sleep & 5"), Err(ParsingError::MisplacedBackground));
        assert_eq!(parse("cmd & > out"), Err(ParsingError::MisplacedBackground));
        assert_eq!(parse("a & | b"), Err(ParsingError::MisplacedBackground));
        assert_eq!(parse("sleep 1 & &"), Err(ParsingError::MisplacedBackground));
    }

    #[test]
    fn test_missing_redirect_target() {
        assert_eq!(
            parse("echo hi >"),
            Err(ParsingError::MissingRedirectTarget(Token::RedirectRight))
        );
        assert_eq!(
            parse("cat < | wc"),
            Err(ParsingError::MissingRedirectTarget(Token::RedirectLeft))
        );
        assert_eq!(
            parse("echo >> &"),
            Err(ParsingError::MissingRedirectTarget(Token::RedirectAppend))
        );
    }

    #[test]
    fn test_three_stage_pipeline() {
        let pipeline = parse("ls | grep foo | wc -l").unwrap();
        assert_eq!(pipeline.len(), 3);
        assert_eq!(pipeline[0].arguments, vec!["ls"]);
        assert_eq!(pipeline[1].arguments, vec!["grep", "foo"]);
        assert_eq!(pipeline[2].arguments, vec!["wc", "-l"]);
        assert!(pipeline.iter().all(|c| c.pipeline_member));
    }

    #[test]
    fn test_background_pipeline() {
        let pipeline = parse("yes | head -n 1 &").unwrap();
        assert_eq!(pipeline.len(), 2);
        assert!(!pipeline[0].background);
        assert!(pipeline[1].background);
    }

    #[test]
    fn test_empty_segments_are_rejected() {
        for line in ["| wc", "ls |", "ls | | wc", "|", "ls | > out | wc"] {
            assert_eq!(
                parse(line),
                Err(ParsingError::EmptyPipelineSegment),
                "line {line:?}"
            );
        }
    }

    #[test]
    fn test_quoted_pipe_does_not_split() {
        let pipeline = parse("echo 'a|b' \"c|d\"").unwrap();
        assert_eq!(pipeline.len(), 1);
        assert_eq!(pipeline[0].arguments, vec!["echo", "a|b", "c|d"]);
    }

    #[test]
    fn test_unterminated_quote_is_a_parse_failure() {
        assert_eq!(
            parse("echo \"unterminated"),
            Err(ParsingError::Lexing(LexingError::UnfinishedDoubleQuote))
        );
    }

    #[test]
    fn test_variables_are_expanded_in_arguments_and_targets() {
        let cmd = single("echo $GREETING '$GREETING' \"${GREETING}!\" > $DIR/log");
        assert_eq!(cmd.arguments, vec!["echo", "hello", "$GREETING", "hello!"]);
        assert_eq!(cmd.output_file.as_deref(), Some("/tmp/out/log"));
    }

    #[test]
    fn test_sequencing_syntax_passes_through() {
        let cmd = single("echo a ; b && c || d");
        assert_eq!(cmd.arguments, vec!["echo", "a", ";", "b", "&&", "c", "||", "d"]);
    }

    #[test]
    fn test_empty_line_is_single_empty_command() {
        let pipeline = parse("").unwrap();
        assert_eq!(pipeline.len(), 1);
        assert!(pipeline[0].is_empty());

        let cmd = single("> only_redirect");
        assert!(cmd.is_empty());
        assert_eq!(cmd.output_file.as_deref(), Some("only_redirect"));
    }

    #[test]
    fn test_split_pipeline_keeps_operators() {
        let tokens = lexer::split_into_tokens("cat < in | sort > out &").unwrap();
        let segments = split_pipeline(tokens).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(
            segments[0],
            vec![Token::bare("cat"), Token::RedirectLeft, Token::bare("in")]
        );
        assert_eq!(
            segments[1],
            vec![
                Token::bare("sort"),
                Token::RedirectRight,
                Token::bare("out"),
                Token::Background
            ]
        );
    }
}
