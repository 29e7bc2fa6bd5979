pub mod cli;
pub mod model;
pub mod processor;
pub mod writer;

use anyhow::Context;
use clap::Parser;
use std::io::{self, Write};

use cli::{Cli, DumpFormat};
use model::{DEFAULT_ENTRY, Outcome};
use processor::{Program, Vm};

pub fn run() -> anyhow::Result<Outcome> {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => {
            e.print()?;
            return Ok(Outcome::Success);
        }
        Err(e) => return Err(e.into()),
    };

    let stdout = io::stdout();
    let stderr = io::stderr();
    execute(&args, &mut stdout.lock(), &mut stderr.lock())
}

/// Runs one compile-then-execute session.
///
/// `out` receives `print` output, dumps and the entry's return value;
/// `err` receives diagnostics, runtime errors and the trace.
pub fn execute(args: &Cli, out: &mut impl Write, err: &mut impl Write) -> anyhow::Result<Outcome> {
    // 1. ── Read ───────────────────────────────────────────────────────
    let source = match (&args.eval, &args.input) {
        (Some(source), _) => source.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Reading {}", path.display()))?,
        (None, None) => anyhow::bail!("no source given: pass INPUT or --eval"),
    };

    // 2. ── Compile ────────────────────────────────────────────────────
    let compilation = processor::compile(&source);
    log::debug!(
        "compiled {} instruction(s), {} label(s), {} diagnostic(s)",
        compilation.instructions().len(),
        compilation.label_count(),
        compilation.diagnostics().len()
    );

    if compilation.has_errors() {
        writer::text::emit_diagnostics(compilation.diagnostics(), err)
            .with_context(|| "Writing diagnostics")?;
        if args.dump_bytecode && args.dump_format == DumpFormat::Json {
            writer::json::emit_diagnostics(compilation.diagnostics(), out)
                .with_context(|| "Writing JSON diagnostics")?;
        }
        return Ok(Outcome::CompileError);
    }

    let program = compilation
        .into_program()
        .with_context(|| "Linking bytecode")?;

    // 3. ── Dump ───────────────────────────────────────────────────────
    if args.dump_bytecode {
        match args.dump_format {
            DumpFormat::Text => {
                writer::text::emit(&program, out).with_context(|| "Writing bytecode listing")?
            }
            DumpFormat::Json => {
                writer::json::emit(&program, out).with_context(|| "Writing JSON bytecode")?
            }
        }
    }
    if args.compile_only {
        return Ok(Outcome::Success);
    }

    // 4. ── Execute ────────────────────────────────────────────────────
    let Some(entry) = entry_point(&program, args.entry.as_deref()) else {
        log::debug!("no function to run");
        return Ok(Outcome::Success);
    };
    log::debug!("entry function '{entry}' with {:?}", args.args);

    let result = {
        let mut vm = Vm::new(&program, args.vm_config(), &mut *out);
        if args.trace {
            vm = vm.with_trace(&mut *err);
        }
        vm.call(entry, &args.args)
    };

    match result {
        Ok(value) => {
            if let Some(value) = value {
                writeln!(out, "=> {value}").with_context(|| "Writing result")?;
            }
            Ok(Outcome::Success)
        }
        Err(e) => {
            log::debug!("execution failed: {e:?}");
            writeln!(err, "{e}").with_context(|| "Writing runtime error")?;
            Ok(Outcome::RuntimeError)
        }
    }
}

/// An explicit name wins; otherwise `main`, then the last declared function.
fn entry_point<'p>(program: &'p Program, requested: Option<&'p str>) -> Option<&'p str> {
    if let Some(name) = requested {
        return Some(name);
    }
    program
        .function(DEFAULT_ENTRY)
        .or_else(|| program.functions().last())
        .map(|f| f.name.as_str())
}
