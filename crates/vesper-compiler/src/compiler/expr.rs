//! Expression parsing
//!
//! A table-driven Pratt parser: every token kind maps to an optional
//! prefix rule, an optional infix rule, and a precedence. Rules emit
//! bytecode directly as they parse.

use std::rc::Rc;

use super::Compiler;
use crate::bytecode::Opcode;
use crate::token::{Token, TokenKind};
use crate::value::Value;

/// Binding power, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Precedence {
    None,
    /// `=` and the compound assignments
    Assignment,
    Or,
    And,
    /// `==` `!=`
    Equality,
    /// `<` `>` `<=` `>=`
    Comparison,
    BitwiseOr,
    BitwiseXor,
    BitwiseAnd,
    /// `+` `-`
    Term,
    /// `*` `/` `%`
    Factor,
    /// `**`
    Indices,
    /// `!` unary `-`
    Unary,
    /// `.` `()` `[]`
    Call,
    Primary,
}

impl Precedence {
    /// One level tighter. Binary operators recurse at this level, which
    /// is what makes them (including `**`) left-associative.
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::BitwiseOr,
            Precedence::BitwiseOr => Precedence::BitwiseXor,
            Precedence::BitwiseXor => Precedence::BitwiseAnd,
            Precedence::BitwiseAnd => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Indices,
            Precedence::Indices => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn<'src> = fn(&mut Compiler<'src>, bool);

/// One row of the Pratt table
struct ParseRule<'src> {
    prefix: Option<ParseFn<'src>>,
    infix: Option<ParseFn<'src>>,
    precedence: Precedence,
}

fn rule<'src>(
    prefix: Option<ParseFn<'src>>,
    infix: Option<ParseFn<'src>>,
    precedence: Precedence,
) -> ParseRule<'src> {
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}

fn get_rule<'src>(kind: TokenKind) -> ParseRule<'src> {
    match kind {
        TokenKind::LeftParen => rule(Some(Compiler::grouping), Some(Compiler::call), Precedence::Call),
        TokenKind::LeftBrace => rule(Some(Compiler::dict), None, Precedence::None),
        TokenKind::LeftBracket => {
            rule(Some(Compiler::list), Some(Compiler::subscript), Precedence::Call)
        }
        TokenKind::Dot => rule(None, Some(Compiler::dot), Precedence::Call),
        TokenKind::Minus => rule(Some(Compiler::unary), Some(Compiler::binary), Precedence::Term),
        TokenKind::Plus => rule(None, Some(Compiler::binary), Precedence::Term),
        TokenKind::PlusPlus | TokenKind::MinusMinus => {
            rule(Some(Compiler::prefix), None, Precedence::None)
        }
        TokenKind::Slash | TokenKind::Star | TokenKind::Percent => {
            rule(None, Some(Compiler::binary), Precedence::Factor)
        }
        TokenKind::StarStar => rule(None, Some(Compiler::binary), Precedence::Indices),
        TokenKind::Ampersand => rule(None, Some(Compiler::binary), Precedence::BitwiseAnd),
        TokenKind::Caret => rule(None, Some(Compiler::binary), Precedence::BitwiseXor),
        TokenKind::Pipe => rule(None, Some(Compiler::binary), Precedence::BitwiseOr),
        TokenKind::Bang => rule(Some(Compiler::unary), None, Precedence::None),
        TokenKind::BangEqual | TokenKind::EqualEqual => {
            rule(None, Some(Compiler::binary), Precedence::Equality)
        }
        TokenKind::Greater
        | TokenKind::GreaterEqual
        | TokenKind::Less
        | TokenKind::LessEqual => rule(None, Some(Compiler::binary), Precedence::Comparison),
        TokenKind::Identifier => rule(Some(Compiler::variable), None, Precedence::None),
        TokenKind::String => rule(Some(Compiler::string), None, Precedence::None),
        TokenKind::Number => rule(Some(Compiler::number), None, Precedence::None),
        TokenKind::Static => rule(Some(Compiler::static_), None, Precedence::None),
        TokenKind::This => rule(Some(Compiler::this_), None, Precedence::None),
        TokenKind::Super => rule(Some(Compiler::super_), None, Precedence::None),
        TokenKind::And => rule(None, Some(Compiler::and_), Precedence::And),
        TokenKind::Or => rule(None, Some(Compiler::or_), Precedence::Or),
        TokenKind::True | TokenKind::False | TokenKind::Nil => {
            rule(Some(Compiler::literal), None, Precedence::None)
        }
        _ => rule(None, None, Precedence::None),
    }
}

/// Bytecode sequence a compound assignment applies between the read and
/// the write. Subtraction has no opcode of its own: negate the right
/// operand, then add.
fn compound_ops(kind: TokenKind) -> Option<&'static [Opcode]> {
    match kind {
        TokenKind::PlusEqual => Some(&[Opcode::Add]),
        TokenKind::MinusEqual => Some(&[Opcode::Negate, Opcode::Add]),
        TokenKind::StarEqual => Some(&[Opcode::Multiply]),
        TokenKind::SlashEqual => Some(&[Opcode::Divide]),
        TokenKind::AmpersandEqual => Some(&[Opcode::BitwiseAnd]),
        TokenKind::CaretEqual => Some(&[Opcode::BitwiseXor]),
        TokenKind::PipeEqual => Some(&[Opcode::BitwiseOr]),
        _ => None,
    }
}

impl<'src> Compiler<'src> {
    pub(crate) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// Right-hand side of a plain `=`. Parsed one level above assignment
    /// so a chained `=` is left dangling for the caller's epilogue to
    /// reject as an invalid assignment target.
    fn assignment_value(&mut self) {
        self.parse_precedence(Precedence::Or);
    }

    pub(crate) fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();

        let Some(prefix_rule) = get_rule(self.parser.previous.kind).prefix else {
            self.error("Expect expression.");
            return;
        };

        // Only the loosest levels may treat a trailing `=` as assignment;
        // this flag is what stops `a + b = c`.
        let can_assign = precedence <= Precedence::Assignment;
        prefix_rule(self, can_assign);

        while precedence <= get_rule(self.parser.current.kind).precedence {
            self.advance();
            if let Some(infix_rule) = get_rule(self.parser.previous.kind).infix {
                infix_rule(self, can_assign);
            }
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            // The `=` was reachable but nothing consumed it, so the
            // left-hand side is not a valid lvalue.
            self.error("Invalid assignment target.");
        }
    }

    pub(crate) fn argument_list(&mut self) -> u8 {
        let mut count: usize = 0;

        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                count += 1;
                if count > 255 {
                    self.error("Cannot have more than 255 arguments.");
                }
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count as u8
    }

    // ---- Prefix rules ----------------------------------------------------

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self, _can_assign: bool) {
        match self.parser.previous.lexeme.parse::<f64>() {
            Ok(value) => self.emit_constant(Value::Number(value)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    fn string(&mut self, _can_assign: bool) {
        let lexeme = self.parser.previous.lexeme;
        let contents = process_escapes(&lexeme[1..lexeme.len() - 1]);
        self.emit_constant(Value::Str(Rc::from(contents)));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.parser.previous.kind {
            TokenKind::False => self.emit_op(Opcode::False),
            TokenKind::Nil => self.emit_op(Opcode::Nil),
            TokenKind::True => self.emit_op(Opcode::True),
            _ => {}
        }
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.parser.previous.kind;

        self.parse_precedence(Precedence::Unary);

        match operator {
            TokenKind::Bang => self.emit_op(Opcode::Not),
            TokenKind::Minus => self.emit_op(Opcode::Negate),
            _ => {}
        }
    }

    fn list(&mut self, _can_assign: bool) {
        self.emit_op(Opcode::NewList);

        loop {
            if self.check(TokenKind::RightBracket) {
                break;
            }
            self.expression();
            self.emit_op(Opcode::AddList);

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        self.consume(TokenKind::RightBracket, "Expected closing ']'");
    }

    fn dict(&mut self, _can_assign: bool) {
        self.emit_op(Opcode::NewDict);

        loop {
            if self.check(TokenKind::RightBrace) {
                break;
            }
            self.expression();
            self.consume(TokenKind::Colon, "Expected ':'");
            self.expression();
            self.emit_op(Opcode::AddDict);

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        self.consume(TokenKind::RightBrace, "Expected closing '}'");
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.parser.previous;
        self.named_variable(name, can_assign);
    }

    /// Prefix `++`/`--`: read the target (variable, optionally narrowed
    /// to a property), bump it, and store it back.
    fn prefix(&mut self, _can_assign: bool) {
        let operator = self.parser.previous.kind;
        let target = self.parser.current;
        self.consume(TokenKind::Identifier, "Expected variable");

        let variable = self.parser.previous;
        self.named_variable(variable, true);

        let mut property = None;
        if self.match_token(TokenKind::Dot) {
            self.consume(TokenKind::Identifier, "Expect property name after '.'.");
            let name = self.identifier_constant(self.parser.previous);
            self.emit_op_byte(Opcode::GetPropertyNoPop, name);
            property = Some(name);
        }

        match operator {
            TokenKind::PlusPlus => self.emit_op(Opcode::Increment),
            TokenKind::MinusMinus => self.emit_op(Opcode::Decrement),
            _ => return,
        }

        if let Some(name) = property {
            self.emit_op_byte(Opcode::SetProperty, name);
        } else {
            let frame_index = self.frames.len() - 1;
            let (set_op, arg) = if let Some(arg) = self.resolve_local(frame_index, target, false) {
                (Opcode::SetLocal, arg)
            } else if let Some(arg) = self.resolve_upvalue(frame_index, target) {
                (Opcode::SetUpvalue, arg)
            } else {
                (Opcode::SetGlobal, self.identifier_constant(target))
            };
            self.emit_op_byte(set_op, arg);
        }
    }

    fn this_(&mut self, _can_assign: bool) {
        match self.classes.last() {
            None => self.error("Cannot utilise 'this' outside of a class."),
            Some(class) if class.static_method => {
                self.error("Cannot utilise 'this' inside a static method.")
            }
            _ => {
                let token = self.parser.previous;
                self.named_variable(token, false);
            }
        }
    }

    fn super_(&mut self, _can_assign: bool) {
        match self.classes.last() {
            None => self.error("Cannot utilise 'super' outside of a class."),
            Some(class) if !class.has_superclass => {
                self.error("Cannot utilise 'super' in a class with no superclass.")
            }
            _ => {}
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let name = self.identifier_constant(self.parser.previous);

        // Push the receiver.
        self.named_variable(Token::synthetic("this"), false);

        if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.push_superclass();
            self.emit_op_byte(Opcode::Super, arg_count);
            self.emit_byte(name);
        } else {
            self.push_superclass();
            self.emit_op_byte(Opcode::GetSuper, name);
        }
    }

    fn push_superclass(&mut self) {
        if self.classes.is_empty() {
            return;
        }
        self.named_variable(Token::synthetic("super"), false);
    }

    fn static_(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Cannot utilise 'static' outside of a class.");
        }
    }

    // ---- Infix rules -----------------------------------------------------

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.parser.previous.kind;

        let precedence = get_rule(operator).precedence;
        self.parse_precedence(precedence.next());

        match operator {
            TokenKind::BangEqual => {
                self.emit_op(Opcode::Equal);
                self.emit_op(Opcode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(Opcode::Equal),
            TokenKind::Greater => self.emit_op(Opcode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(Opcode::Less);
                self.emit_op(Opcode::Not);
            }
            TokenKind::Less => self.emit_op(Opcode::Less),
            TokenKind::LessEqual => {
                self.emit_op(Opcode::Greater);
                self.emit_op(Opcode::Not);
            }
            TokenKind::Plus => self.emit_op(Opcode::Add),
            TokenKind::Minus => {
                // No subtract opcode: negate the right operand, then add.
                self.emit_op(Opcode::Negate);
                self.emit_op(Opcode::Add);
            }
            TokenKind::Star => self.emit_op(Opcode::Multiply),
            TokenKind::StarStar => self.emit_op(Opcode::Pow),
            TokenKind::Slash => self.emit_op(Opcode::Divide),
            TokenKind::Percent => self.emit_op(Opcode::Mod),
            TokenKind::Ampersand => self.emit_op(Opcode::BitwiseAnd),
            TokenKind::Caret => self.emit_op(Opcode::BitwiseXor),
            TokenKind::Pipe => self.emit_op(Opcode::BitwiseOr),
            _ => {}
        }
    }

    fn and_(&mut self, _can_assign: bool) {
        // Short circuit: if the left operand is false, skip the right.
        let end_jump = self.emit_jump(Opcode::JumpIfFalse);

        self.emit_op(Opcode::Pop); // Left operand.
        self.parse_precedence(Precedence::And);

        self.patch_jump(end_jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        // A false left operand falls through to the right; a truthy one
        // jumps over it and is kept.
        let else_jump = self.emit_jump(Opcode::JumpIfFalse);
        let end_jump = self.emit_jump(Opcode::Jump);

        self.patch_jump(else_jump);
        self.emit_op(Opcode::Pop); // Left operand.

        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit_op_byte(Opcode::Call, arg_count);
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name = self.identifier_constant(self.parser.previous);

        let compound = compound_ops(self.parser.current.kind).filter(|_| can_assign);

        if can_assign && self.match_token(TokenKind::Equal) {
            self.assignment_value();
            self.emit_op_byte(Opcode::SetProperty, name);
        } else if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.emit_op_byte(Opcode::Invoke, arg_count);
            self.emit_byte(name);
        } else if let Some(ops) = compound {
            self.advance();

            // Read without losing the receiver, apply, write back.
            self.emit_op_byte(Opcode::GetPropertyNoPop, name);
            self.expression();
            for op in ops {
                self.emit_op(*op);
            }
            self.emit_op_byte(Opcode::SetProperty, name);
        } else {
            self.emit_op_byte(Opcode::GetProperty, name);
        }
    }

    fn subscript(&mut self, can_assign: bool) {
        // Slice with no start index: container[:end]
        if self.match_token(TokenKind::Colon) {
            self.emit_op(Opcode::Empty);
            self.expression();
            self.emit_op(Opcode::Slice);
            self.consume(TokenKind::RightBracket, "Expected closing ']'");
            return;
        }

        self.expression();

        if self.match_token(TokenKind::Colon) {
            // No end index means "to the end of the container".
            if self.check(TokenKind::RightBracket) {
                self.emit_op(Opcode::Empty);
            } else {
                self.expression();
            }
            self.emit_op(Opcode::Slice);
            self.consume(TokenKind::RightBracket, "Expected closing ']'");
            return;
        }

        self.consume(TokenKind::RightBracket, "Expected closing ']'");

        let compound = compound_ops(self.parser.current.kind).filter(|_| can_assign);

        if can_assign && self.match_token(TokenKind::Equal) {
            self.assignment_value();
            self.emit_op(Opcode::SubscriptAssign);
        } else if let Some(ops) = compound {
            self.advance();

            self.expression();
            // The subscript operands stay on the stack; restore them
            // before applying the operator.
            self.emit_op(Opcode::Push);
            for op in ops {
                self.emit_op(*op);
            }
            self.emit_op(Opcode::SubscriptAssign);
        } else {
            self.emit_op(Opcode::Subscript);
        }
    }

    // ---- Variable access -------------------------------------------------

    /// Resolve `name` as local, upvalue, or global (in that order) and
    /// emit a read, a write, or a compound read-modify-write depending on
    /// what follows.
    pub(crate) fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let frame_index = self.frames.len() - 1;

        let (get_op, set_op, arg) = if let Some(arg) = self.resolve_local(frame_index, name, false)
        {
            (Opcode::GetLocal, Opcode::SetLocal, arg)
        } else if let Some(arg) = self.resolve_upvalue(frame_index, name) {
            (Opcode::GetUpvalue, Opcode::SetUpvalue, arg)
        } else {
            let constant = self.identifier_constant(name);
            (Opcode::GetGlobal, Opcode::SetGlobal, constant)
        };

        let compound = compound_ops(self.parser.current.kind).filter(|_| can_assign);

        if can_assign && self.match_token(TokenKind::Equal) {
            self.assignment_value();
            self.emit_op_byte(set_op, arg);
        } else if let Some(ops) = compound {
            self.advance();

            self.named_variable(name, false);
            self.expression();
            for op in ops {
                self.emit_op(*op);
            }
            self.emit_op_byte(set_op, arg);
        } else {
            self.emit_op_byte(get_op, arg);
        }
    }
}

/// Process string-literal escapes in place of the scanner: `\n` `\t` `\r`
/// `\v` become control characters, `\'` and `\"` collapse to the quote,
/// and any other backslash sequence is kept verbatim — including the
/// backslash, with the following character re-examined on the next step.
fn process_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some('n') => {
                chars.next();
                out.push('\n');
            }
            Some('t') => {
                chars.next();
                out.push('\t');
            }
            Some('r') => {
                chars.next();
                out.push('\r');
            }
            Some('v') => {
                chars.next();
                out.push('\x0b');
            }
            Some(q @ ('\'' | '"')) => {
                chars.next();
                out.push(q);
            }
            _ => out.push('\\'),
        }
    }

    out
}
