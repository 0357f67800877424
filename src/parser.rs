//! Line parser turning one line of input into a command name and its parameters.
//!
//! The accepted syntax is deliberately small:
//!
//! ```text
//! command key=value key="quoted value" flag
//! ```
//!
//! Command names and keys are identifiers made of `[A-Za-z0-9_.:-]`. A key without
//! `=` gets the value `"true"`. Double quotes keep spaces inside a value; there is
//! no escape processing.

use crate::command::Params;
use std::fmt;
use thiserror::Error;

/// Reasons a line can fail to parse. Positions are zero-based character offsets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line is empty or does not start with an identifier character.
    #[error("expected a command name")]
    MissingCommand,
    /// A token was followed by something other than a space, a tab or the end of the line.
    #[error("expected a space or tab at position {position}")]
    ExpectedSeparator { position: usize },
    /// A parameter key was expected but the character found can't start one.
    #[error("invalid parameter key at position {position}: unexpected {found:?}")]
    InvalidKey { position: usize, found: char },
    /// A quoted value was opened at `position` and never closed.
    #[error("unterminated quote starting at position {position}")]
    UnterminatedQuote { position: usize },
}

/// Result of parsing one input line.
///
/// An invalid command still exposes whatever was parsed before the error, but
/// callers must not dispatch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    command: Option<String>,
    params: Params,
    error: Option<ParseError>,
}

impl ParsedCommand {
    /// Parse a single line. Never fails; check [`ParsedCommand::is_valid`].
    pub fn parse(line: &str) -> Self {
        LineParser::new(line).parse()
    }

    /// The command name, absent when no identifier could be read at the start of the line.
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// True if no parse error occurred anywhere in the line.
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    /// Split into command name and parameters.
    pub fn into_parts(self) -> (Option<String>, Params) {
        (self.command, self.params)
    }
}

impl fmt::Display for ParsedCommand {
    /// Debug-style rendering, e.g. `Command: echo {text: hi}`. Not meant to be parsed back.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command: {} {{", self.command.as_deref().unwrap_or("<none>"))?;
        for (i, (key, value)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        f.write_str("}")
    }
}

/// Returns true for characters allowed in command names and parameter keys.
fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.' | ':')
}

fn is_separator(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}

/// Single-pass parser with one character of lookahead.
struct LineParser {
    input: Vec<char>,
    pos: usize,
}

impl LineParser {
    fn new(line: &str) -> Self {
        LineParser {
            input: line.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> ParsedCommand {
        let mut params = Params::new();

        let Some(command) = self.parse_identifier() else {
            return ParsedCommand {
                command: None,
                params,
                error: Some(ParseError::MissingCommand),
            };
        };

        let error = self.parse_params(&mut params).err();
        ParsedCommand {
            command: Some(command),
            params,
            error,
        }
    }

    /// Parses everything after the command. Pairs read before an error stay in `params`.
    fn parse_params(&mut self, params: &mut Params) -> Result<(), ParseError> {
        self.expect_separator_or_end()?;

        while !self.finished() {
            let key = self.parse_key()?;
            let value = if self.peek_char() == Some('=') {
                self.read_char();
                self.parse_value()?
            } else {
                String::from("true")
            };
            self.expect_separator_or_end()?;

            // Last occurrence wins.
            params.insert(key, value);
        }
        Ok(())
    }

    fn parse_key(&mut self) -> Result<String, ParseError> {
        let position = self.pos;
        match self.parse_identifier() {
            Some(key) => Ok(key),
            None => Err(ParseError::InvalidKey {
                position,
                // parse_key is only called with input remaining
                found: self.peek_char().unwrap_or_default(),
            }),
        }
    }

    fn parse_value(&mut self) -> Result<String, ParseError> {
        if self.peek_char() == Some('"') {
            let position = self.pos;
            self.read_char();
            let mut value = String::new();
            while let Some(ch) = self.read_char() {
                if ch == '"' {
                    return Ok(value);
                }
                value.push(ch);
            }
            return Err(ParseError::UnterminatedQuote { position });
        }

        let mut value = String::new();
        while let Some(ch) = self.peek_char() {
            if is_separator(ch) {
                break;
            }
            value.push(ch);
            self.read_char();
        }
        Ok(value)
    }

    /// Reads the longest run of identifier characters. `None` if the run is empty.
    fn parse_identifier(&mut self) -> Option<String> {
        let mut ident = String::new();
        while let Some(ch) = self.peek_char() {
            if !is_identifier_char(ch) {
                break;
            }
            ident.push(ch);
            self.read_char();
        }
        (!ident.is_empty()).then_some(ident)
    }

    /// Consumes one or more spaces/tabs, or accepts the end of input.
    fn expect_separator_or_end(&mut self) -> Result<(), ParseError> {
        if self.finished() || self.skip_separators() {
            Ok(())
        } else {
            Err(ParseError::ExpectedSeparator { position: self.pos })
        }
    }

    /// Returns true if at least one separator was consumed.
    fn skip_separators(&mut self) -> bool {
        let start = self.pos;
        while self.peek_char().is_some_and(is_separator) {
            self.read_char();
        }
        self.pos > start
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn finished(&self) -> bool {
        self.pos >= self.input.len()
    }
}
