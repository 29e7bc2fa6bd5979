//! Bytecode dumps. Neither writer affects compilation or execution.
pub mod json;
pub mod text;
