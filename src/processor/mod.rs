//! The functional core: source text in, bytecode out, bytecode executed.
pub mod bytecode;
pub mod context;
pub mod lexer;
pub mod scope;
pub mod script_parser;
pub mod vm;

pub use bytecode::{FunctionInfo, Instruction, LinkError, Program};
pub use vm::{RuntimeError, RuntimeErrorKind, Vm, VmConfig, VmError};

use crate::model::Diagnostic;

/// Everything a single compile pass produced, errors included.
///
/// A `Program` can only be obtained from a compilation that recorded no
/// diagnostics, so the VM never sees partially generated code.
#[derive(Debug, Clone, PartialEq)]
pub struct Compilation {
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) label_count: usize,
    pub(crate) functions: Vec<FunctionInfo>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("compilation failed with {} error(s)", .0.len())]
    Diagnostics(Vec<Diagnostic>),
    #[error(transparent)]
    Link(#[from] LinkError),
}

impl Compilation {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// Instructions emitted before the first error (all of them on success).
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn label_count(&self) -> usize {
        self.label_count
    }

    pub fn into_program(self) -> Result<Program, CompileError> {
        if self.has_errors() {
            return Err(CompileError::Diagnostics(self.diagnostics));
        }
        Ok(Program::link(
            self.instructions,
            self.label_count,
            self.functions,
        )?)
    }
}

/// Compiles one source text in a single pass.
pub fn compile(source: &str) -> Compilation {
    script_parser::Parser::new(source).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refuses_erroneous_compilation() {
        let compilation = compile("(f -> ret x;)");
        assert!(compilation.has_errors());
        match compilation.into_program() {
            Err(CompileError::Diagnostics(diagnostics)) => assert_eq!(diagnostics.len(), 1),
            other => panic!("expected diagnostics, got {other:?}"),
        }
    }

    #[test]
    fn test_clean_compilation_links() {
        let program = compile("(f a -> if (a > 0 -> f(a-1);) ret a;)")
            .into_program()
            .expect("links");
        assert_eq!(program.label_count(), 2);
        assert_eq!(program.label_position(0), Some(0));
        assert_eq!(program.function("f").map(|f| f.arity), Some(1));
    }

    #[test]
    fn test_empty_source() {
        let program = compile("").into_program().expect("links");
        assert!(program.is_empty());
        assert!(program.functions().is_empty());
    }
}
