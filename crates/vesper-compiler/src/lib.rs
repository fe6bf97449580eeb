//! Vesper compiler - single-pass bytecode compiler for the Vesper language
//!
//! This library turns Vesper source text into an executable unit: a
//! top-level [`Function`] holding a [`Chunk`] of bytecode, a constant
//! pool, and per-instruction line information. Parsing and code
//! generation happen in one pass; there is no AST. The companion
//! virtual machine executes the result.

/// Vesper compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod bytecode;
pub mod compiler;
pub mod diagnostic;
pub mod lexer;
pub mod token;
pub mod value;

// Re-export commonly used types
pub use bytecode::{disassemble, Chunk, Opcode};
pub use compiler::{compile, CompileOptions};
pub use diagnostic::{CompileError, Diagnostic};
pub use lexer::Lexer;
pub use token::{Token, TokenKind};
pub use value::{Function, Value};
