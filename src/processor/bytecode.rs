//! Instruction set and the linked program handed to the VM.

use serde::Serialize;
use std::fmt;

use crate::model::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum Instruction {
    /// Marker defining a label; no-op at run time.
    Label(usize),
    /// Makes sure the local slot exists and zeroes it.
    Decl(usize),
    PushAddr(usize),
    PushLocal(usize),
    PushValue(Value),
    SetEqual,
    LessThan,
    MoreThan,
    Plus,
    Minus,
    Multiply,
    Divide,
    And,
    Or,
    Jmpf(usize),
    Jmp(usize),
    Param,
    Call { label: usize, argc: usize },
    RetVal,
    RetNone,
    Print,
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Label(_) => "label",
            Instruction::Decl(_) => "decl",
            Instruction::PushAddr(_) => "push_addr",
            Instruction::PushLocal(_) => "push_local",
            Instruction::PushValue(_) => "push_value",
            Instruction::SetEqual => "set_equal",
            Instruction::LessThan => "less_than",
            Instruction::MoreThan => "more_than",
            Instruction::Plus => "plus",
            Instruction::Minus => "minus",
            Instruction::Multiply => "multiply",
            Instruction::Divide => "divide",
            Instruction::And => "and",
            Instruction::Or => "or",
            Instruction::Jmpf(_) => "jmpf",
            Instruction::Jmp(_) => "jmp",
            Instruction::Param => "param",
            Instruction::Call { .. } => "call",
            Instruction::RetVal => "ret_val",
            Instruction::RetNone => "ret_none",
            Instruction::Print => "print",
        }
    }

    /// Label this instruction transfers control to, if any.
    pub fn target(&self) -> Option<usize> {
        match *self {
            Instruction::Jmpf(l) | Instruction::Jmp(l) => Some(l),
            Instruction::Call { label, .. } => Some(label),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match *self {
            Instruction::Label(n)
            | Instruction::Decl(n)
            | Instruction::PushAddr(n)
            | Instruction::PushLocal(n)
            | Instruction::Jmpf(n)
            | Instruction::Jmp(n) => write!(f, " {n}"),
            Instruction::PushValue(v) => write!(f, " {v}"),
            Instruction::Call { label, argc } => write!(f, " {label}, {argc}"),
            _ => Ok(()),
        }
    }
}

/// Exported function: where it starts and how many arguments it takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    pub label: usize,
    pub arity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("label {label} defined twice (instructions {first} and {second})")]
    DuplicateLabel {
        label: usize,
        first: usize,
        second: usize,
    },
    #[error("instruction {at} refers to undefined label {label}")]
    UndefinedLabel { label: usize, at: usize },
}

/// A flat instruction list plus its resolved label map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    instructions: Vec<Instruction>,
    label_count: usize,
    /// `labels[id]` is the index of the `label id` instruction.
    labels: Vec<Option<usize>>,
    functions: Vec<FunctionInfo>,
}

impl Program {
    /// Resolves every label with a single scan and checks every jump/call target.
    pub fn link(
        instructions: Vec<Instruction>,
        label_count: usize,
        functions: Vec<FunctionInfo>,
    ) -> Result<Self, LinkError> {
        let mut labels: Vec<Option<usize>> = vec![None; label_count];

        for (idx, ins) in instructions.iter().enumerate() {
            if let Instruction::Label(id) = *ins {
                if id >= labels.len() {
                    labels.resize(id + 1, None);
                }
                if let Some(first) = labels[id] {
                    return Err(LinkError::DuplicateLabel {
                        label: id,
                        first,
                        second: idx,
                    });
                }
                labels[id] = Some(idx);
            }
        }

        for (at, ins) in instructions.iter().enumerate() {
            if let Some(label) = ins.target() {
                if labels.get(label).copied().flatten().is_none() {
                    return Err(LinkError::UndefinedLabel { label, at });
                }
            }
        }

        let label_count = labels.len();
        Ok(Self {
            instructions,
            label_count,
            labels,
            functions,
        })
    }

    /// Links a hand-assembled instruction list with no exported functions.
    pub fn from_instructions(instructions: Vec<Instruction>) -> Result<Self, LinkError> {
        Self::link(instructions, 0, Vec::new())
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn label_count(&self) -> usize {
        self.label_count
    }

    /// Instruction index of the `label` marker with this id.
    pub fn label_position(&self, label: usize) -> Option<usize> {
        self.labels.get(label).copied().flatten()
    }

    /// Where a jump or call to `label` lands.
    ///
    /// `link` rejects undefined targets, so the end of the program is only
    /// returned for labels no instruction refers to.
    pub(crate) fn target_position(&self, label: usize) -> usize {
        self.label_position(label).unwrap_or(self.instructions.len())
    }

    pub fn functions(&self) -> &[FunctionInfo] {
        &self.functions
    }

    /// Most recently declared function with this name.
    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.iter().rev().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Instruction::*;

    #[test]
    fn test_label_map() {
        let program = Program::from_instructions(vec![
            Label(1),
            PushValue(1.0),
            Jmpf(0),
            Jmp(1),
            Label(0),
            RetNone,
        ])
        .expect("links");

        assert_eq!(program.label_count(), 2);
        assert_eq!(program.label_position(0), Some(4));
        assert_eq!(program.label_position(1), Some(0));
        assert_eq!(program.label_position(2), None);
    }

    #[test]
    fn test_link_errors() {
        let test_cases = vec![
            (
                vec![Label(0), Plus, Label(0)],
                LinkError::DuplicateLabel {
                    label: 0,
                    first: 0,
                    second: 2,
                },
            ),
            (
                vec![Label(0), Jmp(3)],
                LinkError::UndefinedLabel { label: 3, at: 1 },
            ),
            (
                vec![Call { label: 0, argc: 0 }],
                LinkError::UndefinedLabel { label: 0, at: 0 },
            ),
        ];

        for (code, expected) in test_cases {
            assert_eq!(Program::from_instructions(code), Err(expected));
        }
    }

    #[test]
    fn test_display() {
        let test_cases = vec![
            (PushValue(2.5), "push_value 2.5"),
            (PushLocal(3), "push_local 3"),
            (Call { label: 1, argc: 2 }, "call 1, 2"),
            (SetEqual, "set_equal"),
            (RetNone, "ret_none"),
        ];
        for (ins, expected) in test_cases {
            assert_eq!(ins.to_string(), expected);
        }
    }

    #[test]
    fn test_function_lookup_prefers_latest() {
        let program = Program::link(
            vec![Label(0), RetNone, Label(1), RetNone],
            2,
            vec![
                FunctionInfo {
                    name: "f".into(),
                    label: 0,
                    arity: 0,
                },
                FunctionInfo {
                    name: "f".into(),
                    label: 1,
                    arity: 1,
                },
            ],
        )
        .unwrap();
        assert_eq!(program.function("f").map(|f| f.label), Some(1));
        assert!(program.function("g").is_none());
    }
}
