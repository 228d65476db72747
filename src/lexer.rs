//! Splitting a user-supplied argument string into an argv vector.
//!
//! Two quoting styles are supported. [`QuotingStyle::Posix`] follows the usual
//! shell rules: quotes group words, adjacent quoted and unquoted parts join
//! into one argument, and a backslash escapes the next character. On hosts
//! whose path separator is a backslash that would mangle paths such as
//! `C:\temp\run.py`, so [`QuotingStyle::Windows`] only recognises quotes that
//! open a token and strips them; every other character is taken literally.

use thiserror::Error;

/// Errors produced while tokenizing an argument string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    /// A closing quote (single or double) was not found.
    #[error("no closing quotation for {quote}")]
    UnfinishedQuote { quote: char },
    /// The input ended right after an escape character.
    #[error("no escaped character after trailing backslash")]
    DanglingEscape,
}

/// Quoting convention applied by [`split_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotingStyle {
    /// Shell-style quoting with backslash escapes.
    Posix,
    /// Quote stripping only; backslashes are literal.
    Windows,
}

impl QuotingStyle {
    /// The style matching the host's path conventions.
    pub fn host() -> Self {
        if cfg!(windows) {
            QuotingStyle::Windows
        } else {
            QuotingStyle::Posix
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
    // Quoted token in Windows style; holds the opening quote.
    ReadingWholeQuote(char),
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    style: QuotingStyle,
    state: LexingState,
    buffer: String,
    // Set once the current token contains a quoted section, so `""` yields an
    // empty argument instead of nothing.
    quoted: bool,
}

impl LexingFSM {
    fn new(line: &str, style: QuotingStyle) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            style,
            state: LexingState::Start,
            buffer: String::new(),
            quoted: false,
        }
    }

    /// Runs the machine over the whole input and returns the collected tokens.
    fn make_tokens(&mut self) -> Result<Vec<String>, TokenizeError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out)?,
                LexingState::ReadingWord => self.handle_word(ch, &mut out)?,
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
                LexingState::ReadingWholeQuote(quote) => {
                    self.handle_whole_quote(ch, quote, &mut out)
                }
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote => {
                return Err(TokenizeError::UnfinishedQuote { quote: '\'' });
            }
            LexingState::ReadingDoubleQuote => {
                return Err(TokenizeError::UnfinishedQuote { quote: '"' });
            }
            LexingState::ReadingWholeQuote(quote) => {
                return Err(TokenizeError::UnfinishedQuote { quote });
            }
            _ => {}
        }

        self.finish_token(&mut out);
        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<String>) -> Result<(), TokenizeError> {
        match ch {
            c if c.is_whitespace() => {}
            '\'' | '"' if self.style == QuotingStyle::Windows => {
                self.state = LexingState::ReadingWholeQuote(ch);
            }
            c => {
                self.state = LexingState::ReadingWord;
                self.handle_word(c, out)?;
            }
        }
        Ok(())
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<String>) -> Result<(), TokenizeError> {
        match (self.style, ch) {
            (_, c) if c.is_whitespace() => {
                self.finish_token(out);
                self.state = LexingState::Start;
            }
            (QuotingStyle::Posix, '\'') => {
                self.quoted = true;
                self.state = LexingState::ReadingSingleQuote;
            }
            (QuotingStyle::Posix, '"') => {
                self.quoted = true;
                self.state = LexingState::ReadingDoubleQuote;
            }
            (QuotingStyle::Posix, '\\') => {
                let escaped = self.read_char().ok_or(TokenizeError::DanglingEscape)?;
                self.buffer.push(escaped);
            }
            (_, c) => self.buffer.push(c),
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<(), TokenizeError> {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '\\' => {
                let next = self
                    .read_char()
                    .ok_or(TokenizeError::UnfinishedQuote { quote: '"' })?;
                // Inside double quotes only `"` and `\` are escapable.
                if next != '"' && next != '\\' {
                    self.buffer.push('\\');
                }
                self.buffer.push(next);
            }
            c => self.buffer.push(c),
        }
        Ok(())
    }

    fn handle_whole_quote(&mut self, ch: char, quote: char, out: &mut Vec<String>) {
        if ch == quote {
            self.quoted = true;
            self.finish_token(out);
            self.state = LexingState::Start;
        } else {
            self.buffer.push(ch);
        }
    }

    fn finish_token(&mut self, out: &mut Vec<String>) {
        if !self.buffer.is_empty() || self.quoted {
            out.push(std::mem::take(&mut self.buffer));
        }
        self.quoted = false;
    }
}

/// Splits `line` using the quoting style of the current host.
///
/// Empty or whitespace-only input yields an empty vector.
pub fn split_arguments(line: &str) -> Result<Vec<String>, TokenizeError> {
    split_with(line, QuotingStyle::host())
}

/// Splits `line` using an explicit quoting style.
pub fn split_with(line: &str, style: QuotingStyle) -> Result<Vec<String>, TokenizeError> {
    let mut lexer = LexingFSM::new(line, style);
    lexer.make_tokens()
}

/// Joins arguments back into a single string that [`split_with`] parses into
/// the same vector, quoting only where necessary.
pub fn join_arguments<S: AsRef<str>>(args: &[S], style: QuotingStyle) -> String {
    args.iter()
        .map(|arg| quote_argument(arg.as_ref(), style))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_argument(arg: &str, style: QuotingStyle) -> String {
    let is_safe = |c: char| c.is_alphanumeric() || "@%+=:,./-_\\".contains(c);
    match style {
        QuotingStyle::Posix => {
            if !arg.is_empty() && arg.chars().all(|c| is_safe(c) && c != '\\') {
                arg.to_string()
            } else {
                format!("'{}'", arg.replace('\'', r#"'"'"'"#))
            }
        }
        QuotingStyle::Windows => {
            let needs_quotes = arg.is_empty()
                || arg.chars().any(char::is_whitespace)
                || arg.starts_with(['"', '\'']);
            if !needs_quotes {
                arg.to_string()
            } else if arg.contains('"') {
                format!("'{arg}'")
            } else {
                format!("\"{arg}\"")
            }
        }
    }
}
