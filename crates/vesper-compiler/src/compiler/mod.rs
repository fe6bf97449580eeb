//! Single-pass bytecode compiler
//!
//! Parsing and code generation are fused: the recursive-descent statement
//! parser and the Pratt expression parser emit bytecode as they consume
//! tokens, with no AST in between. Forward jumps are emitted with
//! placeholder operands and patched once their target offset is known;
//! `break` placeholders are rewritten when the enclosing loop ends.
//!
//! One [`Frame`] exists per function body being compiled (the top-level
//! script, named functions, methods, initializers, static methods),
//! innermost last. Class and loop context live on their own LIFO stacks,
//! shared across nested frames the way lexical nesting demands.

mod expr;
mod stmt;

use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::Opcode;
use crate::diagnostic::{CompileError, Diagnostic};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};
use crate::value::{Function, Value};

/// Hard limit on locals and upvalues per frame; constant-pool indices and
/// stack slots are single-byte operands.
const MAX_SLOTS: usize = 256;

/// Options for a compilation run
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// REPL mode: expression statements echo their value (`PopRepl`
    /// instead of `Pop`)
    pub repl: bool,
}

/// Compile Vesper source text into a top-level function
///
/// Returns `Err` iff at least one diagnostic was reported; every
/// diagnostic is also written to standard error at report time. Parsing
/// continues past errors so independent mistakes surface in one run, but
/// the artifact is discarded.
pub fn compile(source: &str, options: CompileOptions) -> Result<Rc<Function>, CompileError> {
    let mut compiler = Compiler::new(source, options);

    compiler.advance();
    if !compiler.match_token(TokenKind::Eof) {
        loop {
            compiler.declaration();
            if compiler.match_token(TokenKind::Eof) {
                break;
            }
        }
    }

    let function = compiler.end_frame();
    if compiler.parser.had_error {
        Err(CompileError {
            diagnostics: compiler.parser.diagnostics,
        })
    } else {
        Ok(function)
    }
}

/// What kind of function body a frame is compiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionKind {
    TopLevel,
    Function,
    Method,
    /// A method named `init`: returns `this`, may not return a value
    Initializer,
    Static,
}

/// A local variable slot
#[derive(Debug, Clone, Copy)]
pub(crate) struct Local<'src> {
    /// Name token; synthetic for `this`, `super`, `file` and the
    /// unnameable slot 0 of plain functions
    name: Token<'src>,
    /// Scope depth, or -1 between declaration and definition so a
    /// self-referential initializer can be rejected
    depth: i32,
    /// Set when a nested closure captures this slot; scope exit then
    /// emits `CloseUpvalue` instead of `Pop`
    is_upvalue: bool,
}

/// A captured variable in the frame's closure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Upvalue {
    /// Slot in the enclosing frame's locals (`is_local`) or index into
    /// the enclosing frame's own upvalues
    index: u8,
    is_local: bool,
}

/// Per-function compilation state
pub(crate) struct Frame<'src> {
    /// The function object under construction
    function: Function,
    kind: FunctionKind,
    locals: Vec<Local<'src>>,
    upvalues: Vec<Upvalue>,
    scope_depth: i32,
    /// Identifier constants already in this chunk's pool, so repeated
    /// names share one entry
    identifier_constants: HashMap<Rc<str>, u8>,
}

/// Innermost-class context, stacked per `class`/`trait` declaration
pub(crate) struct ClassFrame<'src> {
    #[allow(dead_code)] // kept for parity with the VM-side class object
    name: Token<'src>,
    has_superclass: bool,
    /// Set while compiling a static method; `this` is rejected then.
    /// A single flag suffices: methods cannot nest.
    static_method: bool,
}

/// Innermost-loop context, stacked per `while`/`for`
#[derive(Debug, Clone, Copy)]
pub(crate) struct Loop {
    /// Backward-jump target; inside a `for` with an increment clause
    /// this is rewritten to the increment label
    start: usize,
    /// Offset of the condition's exit-jump placeholder, if the loop has
    /// a condition-based exit
    exit: Option<usize>,
    /// Offset where the body begins; `break` placeholders are rewritten
    /// from here when the loop ends
    body: usize,
    /// Scope depth at loop entry, so `break`/`continue` pop intermediate
    /// locals
    scope_depth: i32,
}

/// Token-level parser state shared by every frame
pub(crate) struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    had_error: bool,
    /// Suppresses cascading reports until the next synchronisation point
    panic_mode: bool,
    repl: bool,
    diagnostics: Vec<Diagnostic>,
}

/// The compiler: parser state plus the frame, class and loop stacks
pub(crate) struct Compiler<'src> {
    parser: Parser<'src>,
    frames: Vec<Frame<'src>>,
    classes: Vec<ClassFrame<'src>>,
    loops: Vec<Loop>,
}

impl<'src> Compiler<'src> {
    fn new(source: &'src str, options: CompileOptions) -> Self {
        let placeholder = Token {
            kind: TokenKind::Eof,
            lexeme: "",
            line: 1,
        };

        let mut compiler = Self {
            parser: Parser {
                lexer: Lexer::new(source),
                current: placeholder,
                previous: placeholder,
                had_error: false,
                panic_mode: false,
                repl: options.repl,
                diagnostics: Vec::new(),
            },
            frames: Vec::new(),
            classes: Vec::new(),
            loops: Vec::new(),
        };
        compiler.begin_frame(FunctionKind::TopLevel);
        compiler
    }

    // ---- Frame lifecycle -------------------------------------------------

    /// Open a frame for a function body about to be compiled. Outside the
    /// top level, the previous token is the function's name.
    fn begin_frame(&mut self, kind: FunctionKind) {
        let name = match kind {
            FunctionKind::TopLevel => None,
            _ => Some(Rc::from(self.parser.previous.lexeme)),
        };

        let mut frame = Frame {
            function: Function::new(name, kind == FunctionKind::Static),
            kind,
            locals: Vec::new(),
            upvalues: Vec::new(),
            scope_depth: 0,
            identifier_constants: HashMap::new(),
        };

        // Slot 0 is always occupied. In methods and initializers it holds
        // the receiver as `this`; in plain and static functions it holds
        // the function itself and cannot be named.
        let slot_zero = match kind {
            FunctionKind::Function | FunctionKind::Static => Token::synthetic(""),
            _ => Token::synthetic("this"),
        };
        frame.locals.push(Local {
            name: slot_zero,
            depth: 0,
            is_upvalue: false,
        });

        self.frames.push(frame);
    }

    /// Finish the innermost frame: emit the synthesized return, and (for
    /// nested frames) emit the `Closure` sequence into the enclosing
    /// frame, one `(is_local, index)` byte pair per upvalue.
    fn end_frame(&mut self) -> Rc<Function> {
        self.emit_return();

        let frame = self.frames.pop().expect("frame stack underflow");
        let function = Rc::new(frame.function);

        if !self.frames.is_empty() {
            let constant = self.make_constant(Value::Function(Rc::clone(&function)));
            self.emit_op_byte(Opcode::Closure, constant);
            for upvalue in &frame.upvalues {
                self.emit_byte(u8::from(upvalue.is_local));
                self.emit_byte(upvalue.index);
            }
        }

        function
    }

    fn frame(&self) -> &Frame<'src> {
        self.frames.last().expect("no active frame")
    }

    fn frame_mut(&mut self) -> &mut Frame<'src> {
        self.frames.last_mut().expect("no active frame")
    }

    pub(crate) fn frame_kind(&self) -> FunctionKind {
        self.frame().kind
    }

    // ---- Token plumbing --------------------------------------------------

    fn advance(&mut self) {
        self.parser.previous = self.parser.current;

        loop {
            self.parser.current = self.parser.lexer.scan_token();
            if self.parser.current.kind != TokenKind::Error {
                break;
            }
            // The lexeme of an error token is its message.
            let token = self.parser.current;
            self.error_at(token, token.lexeme);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.parser.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.parser.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // ---- Error reporting -------------------------------------------------

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.parser.panic_mode {
            return;
        }
        self.parser.panic_mode = true;

        let diagnostic = Diagnostic {
            line: token.line,
            lexeme: match token.kind {
                TokenKind::Eof | TokenKind::Error => None,
                _ => Some(token.lexeme.to_string()),
            },
            at_end: token.kind == TokenKind::Eof,
            message: message.to_string(),
        };
        diagnostic.report();
        self.parser.diagnostics.push(diagnostic);
        self.parser.had_error = true;
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.parser.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.parser.current, message);
    }

    /// Skip tokens until a statement boundary so one mistake does not
    /// cascade into a wall of reports.
    fn synchronize(&mut self) {
        self.parser.panic_mode = false;

        while self.parser.current.kind != TokenKind::Eof {
            if self.parser.previous.kind == TokenKind::Semicolon {
                return;
            }

            match self.parser.current.kind {
                TokenKind::Class
                | TokenKind::Trait
                | TokenKind::Def
                | TokenKind::Static
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Break
                | TokenKind::Return
                | TokenKind::Import
                | TokenKind::With => return,
                _ => {}
            }

            self.advance();
        }
    }

    // ---- Emission --------------------------------------------------------

    fn emit_byte(&mut self, byte: u8) {
        let line = self.parser.previous.line;
        self.frame_mut().function.chunk.write(byte, line);
    }

    fn emit_op(&mut self, op: Opcode) {
        self.emit_byte(op as u8);
    }

    fn emit_op_byte(&mut self, op: Opcode, operand: u8) {
        self.emit_byte(op as u8);
        self.emit_byte(operand);
    }

    fn current_offset(&self) -> usize {
        self.frame().function.chunk.len()
    }

    /// Emit `op` followed by a two-byte placeholder; returns the offset
    /// of the placeholder for [`patch_jump`](Self::patch_jump).
    fn emit_jump(&mut self, op: Opcode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_offset() - 2
    }

    /// Point the placeholder at `offset` to the current end of code.
    fn patch_jump(&mut self, offset: usize) {
        // -2 adjusts for the operand bytes themselves.
        let jump = self.current_offset() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }

        let code = &mut self.frame_mut().function.chunk.code;
        code[offset] = ((jump >> 8) & 0xff) as u8;
        code[offset + 1] = (jump & 0xff) as u8;
    }

    /// Emit a backward jump to `start`.
    fn emit_loop(&mut self, start: usize) {
        self.emit_op(Opcode::Loop);

        let offset = self.current_offset() - start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }

        self.emit_byte(((offset >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    fn emit_return(&mut self) {
        // An initializer implicitly returns `this`.
        if self.frame().kind == FunctionKind::Initializer {
            self.emit_op_byte(Opcode::GetLocal, 0);
        } else {
            self.emit_op(Opcode::Nil);
        }
        self.emit_op(Opcode::Return);
    }

    // ---- Constants -------------------------------------------------------

    fn make_constant(&mut self, value: Value) -> u8 {
        let index = self.frame_mut().function.chunk.add_constant(value);
        if index > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    fn emit_constant(&mut self, value: Value) {
        let constant = self.make_constant(value);
        self.emit_op_byte(Opcode::Constant, constant);
    }

    /// Constant-pool index for an identifier, reusing the entry if this
    /// frame has already seen the name.
    fn identifier_constant(&mut self, name: Token<'src>) -> u8 {
        if let Some(&index) = self.frame().identifier_constants.get(name.lexeme) {
            return index;
        }

        let text: Rc<str> = Rc::from(name.lexeme);
        let index = self.make_constant(Value::Str(Rc::clone(&text)));
        self.frame_mut().identifier_constants.insert(text, index);
        index
    }

    // ---- Scopes and variables --------------------------------------------

    fn begin_scope(&mut self) {
        self.frame_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.frame_mut().scope_depth -= 1;

        loop {
            let frame = self.frame();
            let is_upvalue = match frame.locals.last() {
                Some(local) if local.depth > frame.scope_depth => local.is_upvalue,
                _ => break,
            };

            if is_upvalue {
                self.emit_op(Opcode::CloseUpvalue);
            } else {
                self.emit_op(Opcode::Pop);
            }
            self.frame_mut().locals.pop();
        }
    }

    /// Find `name` among the locals of `frames[frame_index]`, most
    /// recently declared first so shadowing works. `in_function` is set
    /// when the lookup comes from a nested frame, where reading a
    /// declared-but-undefined local is legal (it is a capture, not a
    /// self-reference).
    fn resolve_local(
        &mut self,
        frame_index: usize,
        name: Token<'src>,
        in_function: bool,
    ) -> Option<u8> {
        for i in (0..self.frames[frame_index].locals.len()).rev() {
            let local = self.frames[frame_index].locals[i];
            if local.name.lexeme == name.lexeme {
                if !in_function && local.depth == -1 {
                    self.error("Cannot read local variable in its own initializer.");
                }
                return Some(i as u8);
            }
        }
        None
    }

    /// Register an upvalue on `frames[frame_index]`, reusing an existing
    /// entry for the same capture.
    fn add_upvalue(&mut self, frame_index: usize, index: u8, is_local: bool) -> u8 {
        let upvalue = Upvalue { index, is_local };

        let frame = &mut self.frames[frame_index];
        if let Some(existing) = frame.upvalues.iter().position(|u| *u == upvalue) {
            return existing as u8;
        }

        if frame.upvalues.len() == MAX_SLOTS {
            self.error("Too many closure variables in function.");
            return 0;
        }

        let frame = &mut self.frames[frame_index];
        frame.upvalues.push(upvalue);
        frame.function.upvalue_count = frame.upvalues.len();
        (frame.upvalues.len() - 1) as u8
    }

    /// Look for `name` in the frames enclosing `frames[frame_index]`.
    /// A hit in a non-immediate ancestor flattens the capture chain:
    /// every intermediate frame gets an upvalue entry of its own, added
    /// post-order so each index refers to an already-populated parent.
    fn resolve_upvalue(&mut self, frame_index: usize, name: Token<'src>) -> Option<u8> {
        if frame_index == 0 {
            return None;
        }
        let enclosing = frame_index - 1;

        if let Some(local) = self.resolve_local(enclosing, name, true) {
            // Mark it so the owning scope closes it instead of popping.
            self.frames[enclosing].locals[local as usize].is_upvalue = true;
            return Some(self.add_upvalue(frame_index, local, true));
        }

        if let Some(upvalue) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(frame_index, upvalue, false));
        }

        None
    }

    fn add_local(&mut self, name: Token<'src>) {
        if self.frame().locals.len() == MAX_SLOTS {
            self.error("Too many local variables in function.");
            return;
        }

        // Declared but not yet defined.
        self.frame_mut().locals.push(Local {
            name,
            depth: -1,
            is_upvalue: false,
        });
    }

    /// Reserve a slot for the value about to land on the stack, if we
    /// are in a local scope. Globals are implicitly declared.
    fn declare_variable(&mut self) {
        let scope_depth = self.frame().scope_depth;
        if scope_depth == 0 {
            return;
        }

        let name = self.parser.previous;
        let mut duplicate = false;
        for local in self.frame().locals.iter().rev() {
            if local.depth != -1 && local.depth < scope_depth {
                break;
            }
            if local.name.lexeme == name.lexeme {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Variable with this name already declared in this scope.");
        }

        self.add_local(name);
    }

    /// Consume an identifier; at global scope return its constant index,
    /// otherwise declare it as a local and return 0.
    fn parse_variable(&mut self, error_message: &str) -> u8 {
        self.consume(TokenKind::Identifier, error_message);

        if self.frame().scope_depth == 0 {
            let name = self.parser.previous;
            return self.identifier_constant(name);
        }

        self.declare_variable();
        0
    }

    fn define_variable(&mut self, global: u8) {
        let scope_depth = self.frame().scope_depth;
        if scope_depth == 0 {
            self.emit_op_byte(Opcode::DefineGlobal, global);
        } else if let Some(local) = self.frame_mut().locals.last_mut() {
            // Mark the local as defined now.
            local.depth = scope_depth;
        }
    }

    // ---- Loop bookkeeping ------------------------------------------------

    /// Close the innermost loop: patch the condition's exit jump, then
    /// rewrite every `Break` placeholder in the body into a `Jump` to the
    /// current offset. The scan walks raw bytes and relies on `Break`
    /// appearing only where `break` emitted it.
    fn end_loop(&mut self) {
        let finished = *self.loops.last().expect("no active loop");

        if let Some(exit) = finished.exit {
            self.patch_jump(exit);
            self.emit_op(Opcode::Pop); // Condition.
        }

        let mut i = finished.body;
        while i < self.current_offset() {
            if self.frame().function.chunk.code[i] == Opcode::Break as u8 {
                self.frame_mut().function.chunk.code[i] = Opcode::Jump as u8;
                self.patch_jump(i + 1);
                i += 3;
            } else {
                i += 1;
            }
        }

        self.loops.pop();
    }

    /// Emit a `Pop` for every local deeper than the innermost loop's
    /// entry depth, without discarding the compiler's own bookkeeping;
    /// the locals stay live for the rest of the body.
    fn pop_locals_to_loop_depth(&mut self) {
        let scope_depth = match self.loops.last() {
            Some(active) => active.scope_depth,
            None => return,
        };

        let pops = self
            .frame()
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth > scope_depth)
            .count();
        for _ in 0..pops {
            self.emit_op(Opcode::Pop);
        }
    }
}
