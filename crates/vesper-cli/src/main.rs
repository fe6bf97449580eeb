//! Vesper command-line driver
//!
//! `vesper <file>` compiles a source file and reports diagnostics;
//! `vesper` alone starts a compile-and-disassemble REPL.

mod repl;

use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use vesper_compiler::{compile, disassemble, CompileOptions, Function, Value};

#[derive(Parser)]
#[command(name = "vesper", version, about = "Vesper language compiler")]
struct Cli {
    /// Source file to compile; omit to start a REPL
    file: Option<PathBuf>,

    /// Print the disassembled bytecode after compiling
    #[arg(long)]
    disasm: bool,

    /// Print diagnostics as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.file {
        Some(file) => compile_file(&file, cli.disasm, cli.json),
        None => repl::run(),
    }
}

fn compile_file(file: &PathBuf, disasm: bool, json: bool) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file: {}", file.display()))?;

    match compile(&source, CompileOptions::default()) {
        Ok(function) => {
            if disasm {
                print!("{}", disassemble_unit(&function));
            } else {
                println!("Compiled {}", file.display());
            }
            Ok(())
        }
        Err(error) => {
            // The compiler already reported each diagnostic on stderr.
            if json {
                for diagnostic in &error.diagnostics {
                    println!("{}", diagnostic.to_json_string()?);
                }
            }
            bail!("{}", error);
        }
    }
}

/// Disassemble a compiled unit and every function nested in its
/// constant pools.
fn disassemble_unit(function: &Rc<Function>) -> String {
    let name = function.name.as_deref().unwrap_or("<script>");
    let mut output = disassemble(&function.chunk, name);

    for constant in &function.chunk.constants {
        if let Value::Function(nested) = constant {
            output.push('\n');
            output.push_str(&disassemble_unit(nested));
        }
    }

    output
}
