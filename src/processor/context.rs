//! Error bookkeeping shared by every step of a single compilation.
//!
//! Two tiers: `panic` is transient and cleared at each synchronisation point,
//! while `syntax_error` and `had_error` are sticky for the rest of the pass.

use crate::model::{Diagnostic, ErrorKind};

#[derive(Debug, Default)]
pub struct CompileContext {
    panic: bool,
    syntax_error: bool,
    had_error: bool,
    diagnostics: Vec<Diagnostic>,
}

impl CompileContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic and updates the flags for its kind.
    ///
    /// Syntax errors raised while already panicking are dropped.
    pub fn record_error(&mut self, diagnostic: Diagnostic) {
        match diagnostic.kind {
            ErrorKind::Syntax => {
                if self.panic {
                    return;
                }
                self.panic = true;
                self.syntax_error = true;
            }
            ErrorKind::Lexical => self.syntax_error = true,
            ErrorKind::Semantic => {}
        }
        self.had_error = true;
        log::debug!("recorded {diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    /// Code generation is disabled once this is true.
    pub fn has_error(&self) -> bool {
        self.had_error
    }

    /// Name resolution and scope updates are disabled once this is true.
    pub fn has_syntax_error(&self) -> bool {
        self.syntax_error
    }

    pub fn is_panicking(&self) -> bool {
        self.panic
    }

    pub fn clear_panic(&mut self) {
        self.panic = false;
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
