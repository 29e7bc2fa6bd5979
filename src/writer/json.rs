//! JSON dumps through `serde_json`.

use std::io::Write;

use crate::model::Diagnostic;
use crate::processor::Program;

pub fn emit(program: &Program, out: &mut impl Write) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(&mut *out, program)?;
    writeln!(out).map_err(serde_json::Error::io)
}

pub fn emit_diagnostics(
    diagnostics: &[Diagnostic],
    out: &mut impl Write,
) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(&mut *out, diagnostics)?;
    writeln!(out).map_err(serde_json::Error::io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::compile;
    use serde_json::{Value, json};

    #[test]
    fn test_program_shape() {
        let program = compile("(f -> ret 2;)").into_program().unwrap();
        let mut out = Vec::new();
        emit(&program, &mut out).unwrap();

        let dumped: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(
            dumped["instructions"],
            json!([
                { "op": "label", "args": 0 },
                { "op": "push_value", "args": 2.0 },
                { "op": "ret_val" },
                { "op": "ret_none" },
            ])
        );
        assert_eq!(dumped["labels"], json!([0]));
        assert_eq!(dumped["functions"], json!([{ "name": "f", "label": 0, "arity": 0 }]));
    }

    #[test]
    fn test_call_and_diagnostics() {
        let program = compile("(g -> g();)").into_program().unwrap();
        let mut out = Vec::new();
        emit(&program, &mut out).unwrap();
        let dumped: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(
            dumped["instructions"][1],
            json!({ "op": "call", "args": { "label": 0, "argc": 0 } })
        );

        let diagnostics = compile("(g -> ret y;)").diagnostics().to_vec();
        let mut out = Vec::new();
        emit_diagnostics(&diagnostics, &mut out).unwrap();
        let dumped: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(dumped[0]["kind"], json!("semantic"));
        assert_eq!(dumped[0]["fragment"], json!("y"));
    }
}
