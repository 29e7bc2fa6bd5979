//! Plain listing: one instruction per line, prefixed with its index.
//!
//! Function entry labels get a `; name/arity` header line above them.

use std::io::{self, Write};

use crate::model::Diagnostic;
use crate::processor::{Instruction, Program};

pub fn emit(program: &Program, out: &mut impl Write) -> io::Result<()> {
    for (idx, ins) in program.instructions().iter().enumerate() {
        if let Instruction::Label(label) = *ins {
            for function in program.functions().iter().filter(|f| f.label == label) {
                writeln!(out, "; {}/{}", function.name, function.arity)?;
            }
        }
        writeln!(out, "{idx:04} {ins}")?;
    }
    Ok(())
}

pub fn emit_diagnostics(diagnostics: &[Diagnostic], out: &mut impl Write) -> io::Result<()> {
    for diagnostic in diagnostics {
        writeln!(out, "{diagnostic}")?;
    }
    Ok(())
}
