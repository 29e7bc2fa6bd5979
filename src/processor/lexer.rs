//! Small hand-written lexer: the token source the parser pulls from.
//!
//! The lexer only classifies runs of characters; it knows nothing about the
//! grammar. Errors are yielded in-line as `Err(LexError)` and lexing resumes
//! right after the offending character, so a consumer can report every
//! lexical error in one pass.
//
//  Lexical items:
//
//      Keyword     ::= decl | ret | print | if | while | for | and | or
//      Identifier  ::= [A-Za-z][A-Za-z0-9]*
//      UnsignedInt ::= [0-9]+
//      Real        ::= [0-9]+ '.' [0-9]+
//      Delimiter   ::= ';' | '(' | ')' | '+' | '-' | '*' | '/' | '<' | '>' | ',' | '=' | '.'
//      Arrow       ::= '->'
//
//  Identifiers and numbers must be followed by a delimiter, whitespace or
//  the end of input.

use serde::Serialize;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

pub const KEYWORDS: [&str; 8] = ["decl", "ret", "print", "if", "while", "for", "and", "or"];

const DELIMITERS: &str = ";()+-*/<>,=.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Keyword,
    Identifier,
    UnsignedInt,
    Real,
    Delimiter,
    Arrow,
    EndOfInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

impl<'a> Token<'a> {
    pub fn is(&self, lexeme: &str) -> bool {
        self.text == lexeme && self.kind != TokenKind::EndOfInput
    }

    pub fn is_number(&self) -> bool {
        matches!(self.kind, TokenKind::UnsignedInt | TokenKind::Real)
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::EndOfInput => f.write_str("end of input"),
            _ => write!(f, "'{}'", self.text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LexErrorKind {
    #[error("expected a delimiter")]
    ExpectedDelimiter,
    #[error("expected a digit")]
    ExpectedDigit,
    #[error("unexpected character")]
    UnexpectedChar,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}, got {}", describe_found(.found))]
pub struct LexError {
    pub kind: LexErrorKind,
    /// `None` when the error was hit at the end of input.
    pub found: Option<char>,
    pub line: u32,
    pub column: u32,
}

fn describe_found(found: &Option<char>) -> String {
    match found {
        Some(c) => format!("'{c}'"),
        None => "end of input".to_string(),
    }
}

pub fn is_delimiter(c: char) -> bool {
    DELIMITERS.contains(c)
}

#[derive(Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: u32,
    column: u32,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
            line: 1,
            column: 1,
            finished: false,
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn offset(&mut self) -> usize {
        let len = self.src.len();
        self.chars.peek().map_or(len, |&(i, _)| i)
    }

    fn next_char(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn consume_while<F: Fn(char) -> bool>(&mut self, pred: F) {
        while let Some(c) = self.peek_char() {
            if !pred(c) {
                break;
            }
            self.next_char();
        }
    }

    /// Builds an error for the current character and skips past it.
    fn fail(&mut self, kind: LexErrorKind) -> LexError {
        let (line, column) = (self.line, self.column);
        let found = self.next_char();
        LexError {
            kind,
            found,
            line,
            column,
        }
    }

    /// A run is only valid when followed by a delimiter, whitespace or EOF.
    fn end_run(&mut self) -> Result<(), LexError> {
        match self.peek_char() {
            Some(c) if !is_delimiter(c) && !c.is_whitespace() => {
                Err(self.fail(LexErrorKind::ExpectedDelimiter))
            }
            _ => Ok(()),
        }
    }

    fn read_word(&mut self) -> Result<TokenKind, LexError> {
        self.consume_while(|c| c.is_ascii_alphanumeric());
        self.end_run()?;
        Ok(TokenKind::Identifier)
    }

    fn read_number(&mut self) -> Result<TokenKind, LexError> {
        self.consume_while(|c| c.is_ascii_digit());
        let mut kind = TokenKind::UnsignedInt;
        if self.peek_char() == Some('.') {
            self.next_char();
            kind = TokenKind::Real;
            match self.peek_char() {
                Some(c) if c.is_ascii_digit() => self.consume_while(|c| c.is_ascii_digit()),
                _ => return Err(self.fail(LexErrorKind::ExpectedDigit)),
            }
        }
        self.end_run()?;
        Ok(kind)
    }

    fn read_delimiter(&mut self, first: char) -> TokenKind {
        if first == '-' && self.peek_char() == Some('>') {
            self.next_char();
            return TokenKind::Arrow;
        }
        TokenKind::Delimiter
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        self.consume_while(char::is_whitespace);

        let start = self.offset();
        let (line, column) = (self.line, self.column);

        let ch = match self.peek_char() {
            Some(c) => c,
            None => {
                self.finished = true;
                return Some(Ok(Token {
                    text: "",
                    kind: TokenKind::EndOfInput,
                    line,
                    column,
                }));
            }
        };

        let kind_res = if ch.is_ascii_digit() {
            self.read_number()
        } else if ch.is_ascii_alphabetic() {
            self.read_word()
        } else if is_delimiter(ch) {
            self.next_char();
            Ok(self.read_delimiter(ch))
        } else {
            Err(self.fail(LexErrorKind::UnexpectedChar))
        };

        let kind = match kind_res {
            Ok(kind) => kind,
            Err(e) => return Some(Err(e)),
        };

        let src: &'a str = self.src;
        let text = &src[start..self.offset()];
        let kind = if kind == TokenKind::Identifier && KEYWORDS.contains(&text) {
            TokenKind::Keyword
        } else {
            kind
        };

        Some(Ok(Token {
            text,
            kind,
            line,
            column,
        }))
    }
}
