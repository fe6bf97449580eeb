//! Compile-time diagnostics
//!
//! All compiler errors flow through [`Diagnostic`], whose `Display`
//! output is the wire format written to standard error:
//!
//! ```text
//! [line 3] Error at 'x': Expect ';' after expression.
//! ```
//!
//! Errors never abort parsing; they accumulate in report order and the
//! entry point returns them all in a [`CompileError`].

use serde::Serialize;
use std::fmt;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use thiserror::Error;

/// A single compile error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Source line (1-based)
    pub line: u32,
    /// Offending lexeme, if the error location carries source text.
    /// `None` both for lexer error tokens (the message already describes
    /// the problem) and for end-of-file.
    pub lexeme: Option<String>,
    /// Whether the error was reported at end of input
    pub at_end: bool,
    /// Main diagnostic message
    pub message: String,
}

impl Diagnostic {
    /// Serialize to a single-line JSON object
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Write the diagnostic with the error tag colored
    ///
    /// The text is byte-for-byte the `Display` output when the stream has
    /// colors disabled.
    pub fn render(&self, stream: &mut impl WriteColor) -> std::io::Result<()> {
        stream.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        write!(stream, "[line {}] Error", self.line)?;
        stream.reset()?;

        if self.at_end {
            write!(stream, " at end")?;
        } else if let Some(lexeme) = &self.lexeme {
            write!(stream, " at '{}'", lexeme)?;
        }

        writeln!(stream, ": {}", self.message)
    }

    /// Report the diagnostic on standard error
    pub fn report(&self) {
        let mut stderr = StandardStream::stderr(ColorChoice::Auto);
        let _ = self.render(&mut stderr);
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error", self.line)?;

        if self.at_end {
            write!(f, " at end")?;
        } else if let Some(lexeme) = &self.lexeme {
            write!(f, " at '{}'", lexeme)?;
        }

        write!(f, ": {}", self.message)
    }
}

/// Compilation failed; the artifact was discarded
///
/// Carries every diagnostic reported during the run, in report order.
#[derive(Debug, Error)]
#[error("compilation failed with {} error(s)", .diagnostics.len())]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostic(lexeme: Option<&str>, at_end: bool) -> Diagnostic {
        Diagnostic {
            line: 7,
            lexeme: lexeme.map(str::to_string),
            at_end,
            message: "Expect expression.".to_string(),
        }
    }

    #[test]
    fn display_with_lexeme() {
        assert_eq!(
            diagnostic(Some("+"), false).to_string(),
            "[line 7] Error at '+': Expect expression."
        );
    }

    #[test]
    fn display_at_end() {
        assert_eq!(
            diagnostic(None, true).to_string(),
            "[line 7] Error at end: Expect expression."
        );
    }

    #[test]
    fn display_without_location() {
        assert_eq!(
            diagnostic(None, false).to_string(),
            "[line 7] Error: Expect expression."
        );
    }

    #[test]
    fn compile_error_counts_diagnostics() {
        let error = CompileError {
            diagnostics: vec![diagnostic(None, false), diagnostic(Some("x"), false)],
        };
        assert_eq!(error.to_string(), "compilation failed with 2 error(s)");
    }

    #[test]
    fn json_round_trips_fields() {
        let json = diagnostic(Some("x"), false).to_json_string().unwrap();
        assert!(json.contains("\"line\":7"));
        assert!(json.contains("\"message\":\"Expect expression.\""));
    }
}
