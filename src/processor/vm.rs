//! Stack machine that executes a linked [`Program`].
//!
//! Every activation gets its own [`Frame`] with private locals and its own
//! evaluation stack. Binary operators pop `top` then `second` and push
//! `top OP second`.

use std::fmt;
use std::io::{self, Write};

use super::bytecode::{Instruction, Program};
use crate::model::{DEFAULT_MAX_FRAMES, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum number of live frames, root frame included.
    pub max_frames: usize,
    /// Abort after this many executed instructions.
    pub max_steps: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
            max_steps: None,
        }
    }
}

/// One function activation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub locals: Vec<Value>,
    pub stack: Vec<Value>,
    /// Last value delivered to this frame by a returning callee.
    pub return_slot: Option<Value>,
    /// Values marked by `param`, waiting for the next `call`.
    params: Vec<Value>,
    return_pc: usize,
}

impl Frame {
    fn pop(&mut self) -> Result<Value, RuntimeErrorKind> {
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn local(&self, slot: usize) -> Result<Value, RuntimeErrorKind> {
        self.locals
            .get(slot)
            .copied()
            .ok_or(RuntimeErrorKind::LocalOutOfRange {
                slot: slot as Value,
                len: self.locals.len(),
            })
    }

    fn store(&mut self, address: Value, value: Value) -> Result<(), RuntimeErrorKind> {
        let len = self.locals.len();
        let out_of_range = RuntimeErrorKind::LocalOutOfRange { slot: address, len };
        if address < 0.0 || address.fract() != 0.0 {
            return Err(out_of_range);
        }
        let cell = self
            .locals
            .get_mut(address as usize)
            .ok_or(out_of_range)?;
        *cell = value;
        Ok(())
    }

    fn declare(&mut self, slot: usize) {
        if self.locals.len() <= slot {
            self.locals.resize(slot + 1, 0.0);
        }
        self.locals[slot] = 0.0;
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "locals=(")?;
        for (i, v) in self.locals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ") top=")?;
        match self.stack.last() {
            Some(v) => write!(f, "{v}")?,
            None => write!(f, "-")?,
        }
        write!(f, " ret=")?;
        match self.return_slot {
            Some(v) => write!(f, "{v}"),
            None => write!(f, "-"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeErrorKind {
    #[error("evaluation stack underflow")]
    StackUnderflow,
    #[error("call stack underflow: return with no caller")]
    CallStackUnderflow,
    #[error("local slot {slot} out of range ({len} locals)")]
    LocalOutOfRange { slot: Value, len: usize },
    #[error("call expects {expected} pending argument(s), found {pending}")]
    MissingArguments { expected: usize, pending: usize },
    #[error("call stack limit of {0} frames exceeded")]
    TooManyFrames(usize),
    #[error("step limit of {0} instructions exceeded")]
    StepLimit(u64),
    #[error("output failed: {0}")]
    Output(#[from] io::Error),
}

/// A fatal execution failure with the state it happened in.
#[derive(Debug, thiserror::Error)]
#[error("runtime error at instruction {pc} ({instruction}): {kind} [{frame}]")]
pub struct RuntimeError {
    pub pc: usize,
    pub instruction: Instruction,
    pub kind: RuntimeErrorKind,
    /// Snapshot of the active frame when the failure happened.
    pub frame: Frame,
}

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("no function named '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' takes {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub struct Vm<'p, 'io> {
    program: &'p Program,
    config: VmConfig,
    frames: Vec<Frame>,
    pc: usize,
    steps: u64,
    output: &'io mut dyn Write,
    trace: Option<&'io mut dyn Write>,
}

impl<'p, 'io> Vm<'p, 'io> {
    /// `print` writes one value per line to `output`.
    pub fn new(program: &'p Program, config: VmConfig, output: &'io mut dyn Write) -> Self {
        Self {
            program,
            config,
            frames: Vec::new(),
            pc: 0,
            steps: 0,
            output,
            trace: None,
        }
    }

    /// Writes the post-state of every executed instruction to `trace`.
    pub fn with_trace(mut self, trace: &'io mut dyn Write) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Calls an exported function and runs until it returns.
    ///
    /// Yields the returned value, or `None` for `ret_none`.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>, VmError> {
        let function = self
            .program
            .function(name)
            .ok_or_else(|| VmError::UnknownFunction(name.to_string()))?;
        if function.arity != args.len() {
            return Err(VmError::ArityMismatch {
                name: name.to_string(),
                expected: function.arity,
                got: args.len(),
            });
        }
        let start = self
            .program
            .label_position(function.label)
            .ok_or_else(|| VmError::UnknownFunction(name.to_string()))?;

        log::debug!("calling '{name}' at instruction {start} with {args:?}");
        self.frames = vec![
            Frame::default(),
            Frame {
                locals: args.to_vec(),
                return_pc: self.program.len(),
                ..Frame::default()
            },
        ];
        self.pc = start;
        self.steps = 0;
        self.run_until(1)?;

        Ok(self.frames.first().and_then(|root| root.return_slot))
    }

    /// Runs from the first instruction in a single frame until the end of
    /// the program and yields whatever is left on top of the stack.
    pub fn execute(&mut self) -> Result<Option<Value>, RuntimeError> {
        self.frames = vec![Frame::default()];
        self.pc = 0;
        self.steps = 0;
        self.run_until(0)?;
        Ok(self.frames.first().and_then(|f| f.stack.last().copied()))
    }

    fn run_until(&mut self, depth: usize) -> Result<(), RuntimeError> {
        while self.frames.len() > depth && self.pc < self.program.len() {
            let pc = self.pc;
            if let Some(limit) = self.config.max_steps {
                if self.steps >= limit {
                    return Err(self.fault(pc, RuntimeErrorKind::StepLimit(limit)));
                }
            }
            self.steps += 1;

            if let Err(kind) = self.step() {
                return Err(self.fault(pc, kind));
            }
            if let Err(e) = self.trace_step(pc) {
                return Err(self.fault(pc, e.into()));
            }
        }
        Ok(())
    }

    fn fault(&self, pc: usize, kind: RuntimeErrorKind) -> RuntimeError {
        let instruction = self.program.instructions()[pc];
        let frame = self.frames.last().cloned().unwrap_or_default();
        RuntimeError {
            pc,
            instruction,
            kind,
            frame,
        }
    }

    fn trace_step(&mut self, pc: usize) -> io::Result<()> {
        let Some(out) = self.trace.as_deref_mut() else {
            return Ok(());
        };
        let instruction = self.program.instructions()[pc];
        match self.frames.last() {
            Some(frame) => writeln!(out, "{pc:04} {:<16} {frame}", instruction.to_string()),
            None => writeln!(out, "{pc:04} {instruction}"),
        }
    }

    fn frame(&mut self) -> Result<&mut Frame, RuntimeErrorKind> {
        self.frames
            .last_mut()
            .ok_or(RuntimeErrorKind::CallStackUnderflow)
    }

    fn jump_target(&self, label: usize) -> usize {
        self.program.target_position(label)
    }

    /// Pops `top` then `second` and pushes `op(top, second)`.
    fn binary(&mut self, op: fn(Value, Value) -> Value) -> Result<(), RuntimeErrorKind> {
        let frame = self.frame()?;
        let top = frame.pop()?;
        let second = frame.pop()?;
        frame.stack.push(op(top, second));
        Ok(())
    }

    /// Pops the current frame and hands control back to its caller.
    fn leave(&mut self, value: Option<Value>) -> Result<usize, RuntimeErrorKind> {
        if self.frames.len() < 2 {
            return Err(RuntimeErrorKind::CallStackUnderflow);
        }
        let callee = self.frames.pop().ok_or(RuntimeErrorKind::CallStackUnderflow)?;
        let caller = self.frame()?;
        if let Some(v) = value {
            caller.stack.push(v);
        }
        caller.return_slot = value;
        Ok(callee.return_pc)
    }

    fn step(&mut self) -> Result<(), RuntimeErrorKind> {
        let instruction = self.program.instructions()[self.pc];
        log::trace!("{:04} {instruction}", self.pc);
        let mut next = self.pc + 1;

        match instruction {
            Instruction::Label(_) => {}
            Instruction::Decl(slot) => self.frame()?.declare(slot),
            Instruction::PushAddr(slot) => self.frame()?.stack.push(slot as Value),
            Instruction::PushLocal(slot) => {
                let frame = self.frame()?;
                let v = frame.local(slot)?;
                frame.stack.push(v);
            }
            Instruction::PushValue(v) => self.frame()?.stack.push(v),
            Instruction::SetEqual => {
                let frame = self.frame()?;
                let address = frame.pop()?;
                let value = frame.pop()?;
                frame.store(address, value)?;
            }
            Instruction::LessThan => self.binary(|top, second| truth(top < second))?,
            Instruction::MoreThan => self.binary(|top, second| truth(top > second))?,
            Instruction::Plus => self.binary(|top, second| top + second)?,
            Instruction::Minus => self.binary(|top, second| top - second)?,
            Instruction::Multiply => self.binary(|top, second| top * second)?,
            Instruction::Divide => self.binary(|top, second| top / second)?,
            Instruction::And => self.binary(|top, second| truth(top != 0.0 && second != 0.0))?,
            Instruction::Or => self.binary(|top, second| truth(top != 0.0 || second != 0.0))?,
            Instruction::Jmpf(label) => {
                let condition = self.frame()?.pop()?;
                if condition == 0.0 {
                    next = self.jump_target(label);
                }
            }
            Instruction::Jmp(label) => next = self.jump_target(label),
            Instruction::Param => {
                let frame = self.frame()?;
                let v = frame.pop()?;
                frame.params.push(v);
            }
            Instruction::Call { label, argc } => {
                if self.frames.len() >= self.config.max_frames {
                    return Err(RuntimeErrorKind::TooManyFrames(self.config.max_frames));
                }
                let target = self.jump_target(label);
                let caller = self.frame()?;
                let pending = caller.params.len();
                if pending < argc {
                    return Err(RuntimeErrorKind::MissingArguments {
                        expected: argc,
                        pending,
                    });
                }
                let locals = caller.params.split_off(pending - argc);
                self.frames.push(Frame {
                    locals,
                    return_pc: next,
                    ..Frame::default()
                });
                next = target;
            }
            Instruction::RetVal => {
                let v = self.frame()?.pop()?;
                next = self.leave(Some(v))?;
            }
            Instruction::RetNone => next = self.leave(None)?,
            Instruction::Print => {
                let v = self.frame()?.pop()?;
                writeln!(self.output, "{v}")?;
            }
        }

        self.pc = next;
        Ok(())
    }
}

fn truth(b: bool) -> Value {
    if b { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Instruction::*;
    use crate::processor::bytecode::FunctionInfo;

    fn execute(code: Vec<Instruction>) -> Result<Option<Value>, RuntimeError> {
        let program = Program::from_instructions(code).expect("links");
        let mut out = Vec::new();
        let mut vm = Vm::new(&program, VmConfig::default(), &mut out);
        vm.execute()
    }

    #[test]
    fn test_operand_order() {
        let test_cases = vec![
            (vec![PushValue(5.0), PushValue(2.0), Minus], -3.0),
            (vec![PushValue(8.0), PushValue(2.0), Divide], 0.25),
            (vec![PushValue(5.0), PushValue(2.0), Plus], 7.0),
            (vec![PushValue(5.0), PushValue(2.0), Multiply], 10.0),
            (vec![PushValue(5.0), PushValue(2.0), LessThan], 1.0),
            (vec![PushValue(5.0), PushValue(2.0), MoreThan], 0.0),
            (vec![PushValue(0.0), PushValue(2.0), And], 0.0),
            (vec![PushValue(3.0), PushValue(-2.0), And], 1.0),
            (vec![PushValue(0.0), PushValue(0.5), Or], 1.0),
            (vec![PushValue(0.0), PushValue(0.0), Or], 0.0),
        ];

        for (code, expected) in test_cases {
            let listing = format!("{code:?}");
            assert_eq!(execute(code).unwrap(), Some(expected), "{listing}");
        }
    }

    #[test]
    fn test_locals_and_jumps() {
        // x = 4; while (x) { x = x + -1 }   leaves the final x on the stack
        let code = vec![
            Decl(0),
            PushValue(4.0),
            PushAddr(0),
            SetEqual,
            Label(0),
            PushLocal(0),
            Jmpf(1),
            PushLocal(0),
            PushValue(-1.0),
            Plus,
            PushAddr(0),
            SetEqual,
            Jmp(0),
            Label(1),
            PushLocal(0),
        ];
        assert_eq!(execute(code).unwrap(), Some(0.0));
    }

    #[test]
    fn test_runtime_errors() {
        let test_cases = vec![
            (vec![PushValue(1.0), Plus], "evaluation stack underflow", 1),
            (vec![RetNone], "call stack underflow: return with no caller", 0),
            (
                vec![PushValue(1.0), RetVal],
                "call stack underflow: return with no caller",
                1,
            ),
            (
                vec![Decl(0), PushLocal(1)],
                "local slot 1 out of range (1 locals)",
                1,
            ),
            (
                vec![PushValue(1.0), PushAddr(2), SetEqual],
                "local slot 2 out of range (0 locals)",
                2,
            ),
            (
                vec![Label(0), Call { label: 0, argc: 1 }],
                "call expects 1 pending argument(s), found 0",
                1,
            ),
        ];

        for (code, expected, pc) in test_cases {
            let listing = format!("{code:?}");
            let err = execute(code).unwrap_err();
            assert_eq!(err.kind.to_string(), expected, "{listing}");
            assert_eq!(err.pc, pc, "{listing}");
        }
    }

    #[test]
    fn test_error_reports_frame_state() {
        let err = execute(vec![Decl(0), PushValue(9.0), Divide]).unwrap_err();
        assert_eq!(err.instruction, Divide);
        assert_eq!(err.frame.locals, vec![0.0]);
        assert_eq!(
            err.to_string(),
            "runtime error at instruction 2 (divide): evaluation stack underflow [locals=(0) top=- ret=-]"
        );
    }

    #[test]
    fn test_call_and_return() {
        // fn 0: ret locals[0] + locals[1]; entry at 4 calls it with (3, 4)
        let code = vec![
            Jmp(1),
            Label(0),
            PushLocal(0),
            PushLocal(1),
            Plus,
            RetVal,
            Label(1),
            PushValue(3.0),
            Param,
            PushValue(4.0),
            Param,
            Call { label: 0, argc: 2 },
        ];
        assert_eq!(execute(code).unwrap(), Some(7.0));
    }

    #[test]
    fn test_nested_call_in_argument() {
        // f(1, id(2)) where id(x) = x and f(a, b) pushes a, b then subtracts: b - a
        let code = vec![
            Jmp(2),
            Label(0),
            PushLocal(0),
            RetVal,
            Label(1),
            PushLocal(0),
            PushLocal(1),
            Minus,
            RetVal,
            Label(2),
            PushValue(1.0),
            Param,
            PushValue(2.0),
            Param,
            Call { label: 0, argc: 1 },
            Param,
            Call { label: 1, argc: 2 },
        ];
        assert_eq!(execute(code).unwrap(), Some(1.0));
    }

    #[test]
    fn test_limits() {
        let looping = Program::from_instructions(vec![Label(0), Jmp(0)]).unwrap();
        let mut out = Vec::new();
        let config = VmConfig {
            max_steps: Some(10),
            ..VmConfig::default()
        };
        let err = Vm::new(&looping, config, &mut out).execute().unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::StepLimit(10)));

        let recursing =
            Program::from_instructions(vec![Label(0), Call { label: 0, argc: 0 }]).unwrap();
        let config = VmConfig {
            max_frames: 8,
            ..VmConfig::default()
        };
        let err = Vm::new(&recursing, config, &mut out).execute().unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::TooManyFrames(8)));
    }

    #[test]
    fn test_step_limit_applies_per_call() {
        let program = Program::link(
            vec![Label(0), PushValue(1.0), RetVal],
            1,
            vec![FunctionInfo {
                name: "one".into(),
                label: 0,
                arity: 0,
            }],
        )
        .unwrap();
        let mut out = Vec::new();
        let config = VmConfig {
            max_steps: Some(4),
            ..VmConfig::default()
        };
        let mut vm = Vm::new(&program, config, &mut out);
        for _ in 0..3 {
            assert_eq!(vm.call("one", &[]).unwrap(), Some(1.0));
            assert_eq!(vm.steps(), 3);
        }
    }

    #[test]
    fn test_print_and_trace() {
        let program = Program::from_instructions(vec![PushValue(2.5), Print]).unwrap();
        let mut out = Vec::new();
        let mut trace = Vec::new();
        let result = Vm::new(&program, VmConfig::default(), &mut out)
            .with_trace(&mut trace)
            .execute()
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(String::from_utf8(out).unwrap(), "2.5\n");
        let trace = String::from_utf8(trace).unwrap();
        let lines: Vec<_> = trace.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000 push_value 2.5"));
        assert!(lines[0].ends_with("locals=() top=2.5 ret=-"));
        assert!(lines[1].ends_with("locals=() top=- ret=-"));
    }
}
