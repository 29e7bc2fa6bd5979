use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::model::DEFAULT_MAX_FRAMES;
use crate::processor::VmConfig;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Source file to compile and run
    #[arg(required_unless_present = "eval", conflicts_with = "eval")]
    pub input: Option<PathBuf>,
    /// Inline source text, used instead of INPUT
    #[arg(short, long, value_name = "SOURCE")]
    pub eval: Option<String>,
    /// Write the generated bytecode to stdout
    #[arg(long)]
    pub dump_bytecode: bool,
    #[arg(long, value_enum, default_value_t = DumpFormat::Text)]
    pub dump_format: DumpFormat,
    /// Write the frame state after every instruction to stderr
    #[arg(long)]
    pub trace: bool,
    /// Function to run (defaults to `main`, else the last declared function)
    #[arg(long, value_name = "NAME")]
    pub entry: Option<String>,
    /// Argument passed to the entry function; repeat for each parameter
    #[arg(long = "arg", value_name = "VALUE", allow_negative_numbers = true)]
    pub args: Vec<f64>,
    /// Stop after compilation
    #[arg(long)]
    pub compile_only: bool,
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_FRAMES)]
    pub max_frames: usize,
    /// Abort after this many executed instructions
    #[arg(long, value_name = "N")]
    pub max_steps: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DumpFormat {
    Text,
    Json,
}

impl Cli {
    pub fn vm_config(&self) -> VmConfig {
        VmConfig {
            max_frames: self.max_frames,
            max_steps: self.max_steps,
        }
    }
}
