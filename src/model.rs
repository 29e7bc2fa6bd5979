// numeric constants and plain data shared by every stage

use serde::Serialize;
use std::fmt;

/// Every value the language manipulates is a number.
pub type Value = f64;

/// Entry function looked up when `--entry` is not given.
pub const DEFAULT_ENTRY: &str = "main";
/// Upper bound on live call frames (root frame included).
pub const DEFAULT_MAX_FRAMES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Lexical,
    Syntax,
    Semantic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Lexical => "lexical",
            ErrorKind::Syntax => "syntax",
            ErrorKind::Semantic => "semantic",
        };
        f.write_str(s)
    }
}

/// One recorded compile-time error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    /// Source text the error points at (empty at end of input).
    pub fragment: String,
    pub line: u32,
    pub column: u32,
}

impl Diagnostic {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        fragment: impl Into<String>,
        line: u32,
        column: u32,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            fragment: fragment.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error at {}:{}", self.kind, self.line, self.column)?;
        if self.fragment.is_empty() {
            write!(f, " (end of input)")?;
        } else {
            write!(f, " ('{}')", self.fragment)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// How a compile-then-run session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    CompileError,
    RuntimeError,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::CompileError => 1,
            Outcome::RuntimeError => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let test_cases = vec![
            (
                Diagnostic::new(ErrorKind::Syntax, "expected ';'", ")", 1, 12),
                "syntax error at 1:12 (')'): expected ';'",
            ),
            (
                Diagnostic::new(ErrorKind::Lexical, "expected a digit", "", 3, 2),
                "lexical error at 3:2 (end of input): expected a digit",
            ),
        ];

        for (diagnostic, expected) in test_cases {
            assert_eq!(diagnostic.to_string(), expected);
        }
    }
}
