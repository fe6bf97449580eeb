//! Interactive compile loop
//!
//! Each line compiles on its own with the REPL flag set, so expression
//! statements emit `PopRepl` and the VM would echo their value. Without
//! an attached VM the REPL prints the disassembly of what each line
//! compiled to.

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use vesper_compiler::{compile, CompileOptions, VERSION};

pub fn run() -> Result<()> {
    println!("Vesper {} (compiler REPL, Ctrl-D to exit)", VERSION);

    let mut editor = DefaultEditor::new()?;
    let options = CompileOptions { repl: true };

    loop {
        match editor.readline(">>> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);

                // Errors were already reported on stderr; keep the loop
                // alive either way.
                if let Ok(function) = compile(&line, options) {
                    print!("{}", super::disassemble_unit(&function));
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(error) => return Err(error.into()),
        }
    }

    Ok(())
}
