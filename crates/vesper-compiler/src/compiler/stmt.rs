//! Declarations and statements
//!
//! Recursive descent dispatching on the leading keyword. Function and
//! method bodies open a fresh compilation frame; loops and classes push
//! their context stacks.

use std::rc::Rc;

use super::{ClassFrame, Compiler, FunctionKind, Local, Loop};
use crate::bytecode::Opcode;
use crate::token::{Token, TokenKind};
use crate::value::Value;

impl<'src> Compiler<'src> {
    pub(crate) fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Trait) {
            self.trait_declaration();
        } else if self.match_token(TokenKind::Def) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.parser.panic_mode {
            self.synchronize();
        }
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::With) {
            self.with_statement();
        } else if self.match_token(TokenKind::Import) {
            self.import_statement();
        } else if self.match_token(TokenKind::Break) {
            self.break_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.check(TokenKind::LeftBrace) {
            self.brace_statement();
        } else if self.match_token(TokenKind::Continue) {
            self.continue_statement();
        } else {
            self.expression_statement();
        }
    }

    // ---- Simple statements -----------------------------------------------

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        if self.parser.repl {
            self.emit_op(Opcode::PopRepl);
        } else {
            self.emit_op(Opcode::Pop);
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }

        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    /// A leading `{` in statement position is a block unless it actually
    /// starts a dict literal: `{` `}` `;` is an empty-dict expression
    /// statement, and a `:` after the first key token means a populated
    /// one. Peek two tokens ahead on a throwaway copy of the lexer, then
    /// rewind and compile for real.
    fn brace_statement(&mut self) {
        let lexer = self.parser.lexer;
        let current = self.parser.current;
        let previous = self.parser.previous;

        self.advance(); // past the '{'
        self.advance();
        let empty_dict =
            self.parser.previous.kind == TokenKind::RightBrace && self.check(TokenKind::Semicolon);
        let dict_literal = self.check(TokenKind::Colon);

        self.parser.lexer = lexer;
        self.parser.current = current;
        self.parser.previous = previous;

        if empty_dict || dict_literal {
            self.expression_statement();
        } else {
            self.advance(); // past the '{' again
            self.begin_scope();
            self.block();
            self.end_scope();
        }
    }

    fn return_statement(&mut self) {
        if self.frame_kind() == FunctionKind::TopLevel {
            self.error("Cannot return from top-level code.");
        }

        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.frame_kind() == FunctionKind::Initializer {
                self.error("Cannot return a value from an initializer.");
            }

            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(Opcode::Return);
        }
    }

    fn import_statement(&mut self) {
        self.consume(TokenKind::String, "Expect string after import.");

        // Import paths are taken verbatim, escapes and all.
        if self.parser.previous.kind == TokenKind::String {
            let lexeme = self.parser.previous.lexeme;
            let path = &lexeme[1..lexeme.len() - 1];
            self.emit_constant(Value::Str(Rc::from(path)));
        }

        self.consume(TokenKind::Semicolon, "Expect ';' after import.");

        self.emit_op(Opcode::Import);
        self.emit_op(Opcode::Pop);
    }

    fn with_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'with'.");
        self.expression();
        self.consume(TokenKind::Comma, "Expect comma");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after 'with'.");

        self.begin_scope();

        // The opened file lives in a fixed local named `file`.
        let depth = self.frame().scope_depth;
        self.frame_mut().locals.push(Local {
            name: Token::synthetic("file"),
            depth,
            is_upvalue: false,
        });

        self.emit_op(Opcode::OpenFile);
        self.statement();
        self.emit_op(Opcode::CloseFile);
        self.end_scope();
    }

    // ---- Variable and function declarations ------------------------------

    fn var_declaration(&mut self) {
        loop {
            let global = self.parse_variable("Expect variable name.");

            if self.match_token(TokenKind::Equal) {
                self.expression();
            } else {
                // Default to nil.
                self.emit_op(Opcode::Nil);
            }

            self.define_variable(global);

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.function(FunctionKind::Function);
        self.define_variable(global);
    }

    /// Compile a parameter list and body in a fresh frame. The caller has
    /// just consumed the name (it is `parser.previous`).
    fn function(&mut self, kind: FunctionKind) {
        self.begin_frame(kind);
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");

        if !self.check(TokenKind::RightParen) {
            let mut optional = false;
            loop {
                let param = self.parse_variable("Expect parameter name.");
                self.define_variable(param);

                if self.match_token(TokenKind::Equal) {
                    // Optional parameter; its default is compiled inline.
                    self.frame_mut().function.arity_optional += 1;
                    optional = true;
                    self.expression();
                } else {
                    self.frame_mut().function.arity += 1;

                    if optional {
                        self.error("Cannot have non-optional parameter after optional.");
                    }
                }

                let total = {
                    let function = &self.frame().function;
                    function.arity + function.arity_optional
                };
                if total > 255 {
                    self.error("Cannot have more than 255 parameters.");
                }

                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }

            if self.frame().function.arity_optional > 0 {
                self.emit_op(Opcode::DefineOptional);
            }
        }

        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");

        self.block();

        // No end_scope: end_frame discards the whole frame, and the VM
        // tears the slots down when the call returns.
        self.end_frame();
    }

    // ---- Classes and traits ----------------------------------------------

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let name_constant = self.identifier_constant(self.parser.previous);
        self.declare_variable();

        self.classes.push(ClassFrame {
            name: self.parser.previous,
            has_superclass: false,
            static_method: false,
        });

        if self.match_token(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            if let Some(class) = self.classes.last_mut() {
                class.has_superclass = true;
            }

            self.begin_scope();

            // Store the superclass in a local variable named "super".
            let superclass = self.parser.previous;
            self.named_variable(superclass, false);
            self.add_local(Token::synthetic("super"));

            self.emit_op_byte(Opcode::Subclass, name_constant);
        } else {
            self.emit_op_byte(Opcode::Class, name_constant);
        }

        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");

        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            if self.match_token(TokenKind::Use) {
                self.use_statement();
            } else {
                self.method(false);
            }
        }

        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");

        if self.classes.last().is_some_and(|class| class.has_superclass) {
            self.end_scope();
        }

        self.define_variable(name_constant);
        self.classes.pop();
    }

    fn trait_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect trait name.");
        let name_constant = self.identifier_constant(self.parser.previous);
        self.declare_variable();

        self.classes.push(ClassFrame {
            name: self.parser.previous,
            has_superclass: false,
            static_method: false,
        });

        self.emit_op_byte(Opcode::Trait, name_constant);

        self.consume(TokenKind::LeftBrace, "Expect '{' before trait body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method(true);
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after trait body.");

        self.define_variable(name_constant);
        self.classes.pop();
    }

    fn method(&mut self, trait_method: bool) {
        let mut kind = if self.check(TokenKind::Static) {
            self.consume(TokenKind::Static, "Expect static.");
            if let Some(class) = self.classes.last_mut() {
                class.static_method = true;
            }
            FunctionKind::Static
        } else {
            if let Some(class) = self.classes.last_mut() {
                class.static_method = false;
            }
            FunctionKind::Method
        };

        self.consume(TokenKind::Identifier, "Expect method name.");
        let constant = self.identifier_constant(self.parser.previous);

        // A method named "init" is the initializer.
        if self.parser.previous.lexeme == "init" {
            kind = FunctionKind::Initializer;
        }

        self.function(kind);

        if trait_method {
            self.emit_op_byte(Opcode::TraitMethod, constant);
        } else {
            self.emit_op_byte(Opcode::Method, constant);
        }
    }

    fn use_statement(&mut self) {
        if self.classes.is_empty() {
            self.error("Cannot utilise 'use' outside of a class.");
        }

        loop {
            self.consume(TokenKind::Identifier, "Expect trait name after use statement.");
            let name = self.parser.previous;
            self.named_variable(name, false);
            self.emit_op(Opcode::Use);

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        self.consume(TokenKind::Semicolon, "Expect ';' after use statement.");
    }

    // ---- Control flow ----------------------------------------------------

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        // Jump to the else branch if the condition is false.
        let else_jump = self.emit_jump(Opcode::JumpIfFalse);

        self.emit_op(Opcode::Pop); // Condition.
        self.statement();

        // The then branch jumps over the else branch.
        let end_jump = self.emit_jump(Opcode::Jump);

        self.patch_jump(else_jump);
        self.emit_op(Opcode::Pop); // Condition.

        if self.match_token(TokenKind::Else) {
            self.statement();
        }

        self.patch_jump(end_jump);
    }

    fn while_statement(&mut self) {
        let start = self.current_offset();
        let scope_depth = self.frame().scope_depth;
        self.loops.push(Loop {
            start,
            exit: None,
            body: 0,
            scope_depth,
        });

        // `while {` means no condition: loop until broken out of.
        if self.check(TokenKind::LeftBrace) {
            self.emit_op(Opcode::True);
        } else {
            self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
            self.expression();
            self.consume(TokenKind::RightParen, "Expect ')' after condition.");
        }

        let exit = self.emit_jump(Opcode::JumpIfFalse);
        if let Some(active) = self.loops.last_mut() {
            active.exit = Some(exit);
        }

        self.emit_op(Opcode::Pop); // Condition.

        let body = self.current_offset();
        if let Some(active) = self.loops.last_mut() {
            active.body = body;
        }
        self.statement();

        self.emit_loop(start);
        self.end_loop();
    }

    fn for_statement(&mut self) {
        // The loop variable gets its own scope.
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else if self.match_token(TokenKind::Semicolon) {
            // No initializer.
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_offset();
        let scope_depth = self.frame().scope_depth;
        self.loops.push(Loop {
            start: loop_start,
            exit: None,
            body: 0,
            scope_depth,
        });

        // The exit condition.
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");

            let exit = self.emit_jump(Opcode::JumpIfFalse);
            if let Some(active) = self.loops.last_mut() {
                active.exit = Some(exit);
            }
            self.emit_op(Opcode::Pop); // Condition.
        }

        // The increment runs after the body, so the body jumps over it
        // on the way in and the backward jump targets it from then on.
        if !self.match_token(TokenKind::RightParen) {
            let body_jump = self.emit_jump(Opcode::Jump);

            let increment_start = self.current_offset();
            self.expression();
            self.emit_op(Opcode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            if let Some(active) = self.loops.last_mut() {
                active.start = increment_start;
            }

            self.patch_jump(body_jump);
        }

        let body = self.current_offset();
        if let Some(active) = self.loops.last_mut() {
            active.body = body;
        }
        self.statement();

        self.emit_loop(loop_start);
        self.end_loop();
        self.end_scope(); // Loop variable.
    }

    fn break_statement(&mut self) {
        if self.loops.is_empty() {
            self.error("Cannot utilise 'break' outside of a loop.");
            return;
        }

        self.consume(TokenKind::Semicolon, "Expected semicolon after break");

        // Discard any locals created inside the loop, then leave a
        // placeholder for end_loop to patch.
        self.pop_locals_to_loop_depth();
        self.emit_jump(Opcode::Break);
    }

    fn continue_statement(&mut self) {
        if self.loops.is_empty() {
            self.error("Cannot utilise 'continue' outside of a loop.");
            return;
        }

        self.consume(TokenKind::Semicolon, "Expect ';' after 'continue'.");

        // Discard any locals created inside the loop.
        self.pop_locals_to_loop_depth();

        // Jump to the top of the innermost loop; inside a `for` with an
        // increment clause that is the increment label.
        let start = self.loops.last().map_or(0, |active| active.start);
        self.emit_loop(start);
    }
}
