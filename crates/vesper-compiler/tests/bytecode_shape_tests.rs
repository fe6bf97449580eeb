//! Exact instruction sequences for representative constructs.
//!
//! These pin the emitted byte stream, operand by operand, so codegen
//! regressions show up as a one-line diff.

use pretty_assertions::assert_eq;
use std::rc::Rc;
use vesper_compiler::{compile, CompileOptions, Function, Opcode, Value};

fn compile_ok(source: &str) -> Rc<Function> {
    compile(source, CompileOptions::default()).expect("source should compile")
}

fn op(opcode: Opcode) -> u8 {
    opcode as u8
}

fn constant_str(function: &Function, index: usize) -> &str {
    match &function.chunk.constants[index] {
        Value::Str(s) => s,
        other => panic!("constant {} is not a string: {}", index, other),
    }
}

fn constant_number(function: &Function, index: usize) -> f64 {
    match &function.chunk.constants[index] {
        Value::Number(n) => *n,
        other => panic!("constant {} is not a number: {}", index, other),
    }
}

#[test]
fn global_redefinition_shares_one_name_constant() {
    let script = compile_ok("var x = 1; var x = 2;");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::Constant),
            1,
            op(Opcode::DefineGlobal),
            0,
            op(Opcode::Constant),
            2,
            op(Opcode::DefineGlobal),
            0,
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
    assert_eq!(constant_str(&script, 0), "x");
    assert_eq!(constant_number(&script, 1), 1.0);
    assert_eq!(constant_number(&script, 2), 2.0);
}

#[test]
fn multi_declaration_defines_each_variable() {
    let script = compile_ok("var x = 1, y = 2;");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::Constant),
            1,
            op(Opcode::DefineGlobal),
            0,
            op(Opcode::Constant),
            3,
            op(Opcode::DefineGlobal),
            2,
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
    assert_eq!(constant_str(&script, 0), "x");
    assert_eq!(constant_str(&script, 2), "y");
}

#[test]
fn var_without_initializer_defaults_to_nil() {
    let script = compile_ok("var x;");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::Nil),
            op(Opcode::DefineGlobal),
            0,
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn subtraction_negates_right_operand() {
    // There is no subtract opcode: `1 - 2` negates the right operand on
    // top of the stack and adds.
    let script = compile_ok("1 - 2;");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::Constant),
            0,
            op(Opcode::Constant),
            1,
            op(Opcode::Negate),
            op(Opcode::Add),
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn comparisons_lower_to_two_opcodes() {
    let le = compile_ok("1 <= 2;");
    assert_eq!(
        le.chunk.code[4..6],
        [op(Opcode::Greater), op(Opcode::Not)]
    );

    let ge = compile_ok("1 >= 2;");
    assert_eq!(ge.chunk.code[4..6], [op(Opcode::Less), op(Opcode::Not)]);

    let ne = compile_ok("1 != 2;");
    assert_eq!(ne.chunk.code[4..6], [op(Opcode::Equal), op(Opcode::Not)]);
}

#[test]
fn power_is_left_associative() {
    let script = compile_ok("2 ** 3 ** 4;");

    // ((2 ** 3) ** 4): the first Pow lands before the third operand.
    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::Constant),
            0,
            op(Opcode::Constant),
            1,
            op(Opcode::Pow),
            op(Opcode::Constant),
            2,
            op(Opcode::Pow),
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn and_short_circuits_over_the_right_operand() {
    let script = compile_ok("true and false;");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::True),
            op(Opcode::JumpIfFalse),
            0,
            2,
            op(Opcode::Pop),
            op(Opcode::False),
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn or_keeps_a_truthy_left_operand() {
    let script = compile_ok("true or false;");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::True),
            op(Opcode::JumpIfFalse),
            0,
            3,
            op(Opcode::Jump),
            0,
            2,
            op(Opcode::Pop),
            op(Opcode::False),
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn if_else_patches_both_jumps() {
    let script = compile_ok("if (true) 1; else 2;");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::True),
            op(Opcode::JumpIfFalse),
            0,
            7,
            op(Opcode::Pop),
            op(Opcode::Constant),
            0,
            op(Opcode::Pop),
            op(Opcode::Jump),
            0,
            4,
            op(Opcode::Pop),
            op(Opcode::Constant),
            1,
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn while_break_rewrites_the_placeholder() {
    let script = compile_ok("while (true) { break; }");

    // The break placeholder has become a forward jump past the loop.
    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::True),
            op(Opcode::JumpIfFalse),
            0,
            7,
            op(Opcode::Pop),
            op(Opcode::Jump),
            0,
            4,
            op(Opcode::Loop),
            0,
            11,
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn conditionless_while_loops_over_an_implicit_true() {
    let script = compile_ok("while { break; }");

    assert_eq!(script.chunk.code[0], op(Opcode::True));
    assert!(!script.chunk.code.contains(&op(Opcode::Break)));
}

#[test]
fn for_loop_jumps_back_to_the_increment() {
    let script = compile_ok("for (var i = 0; i < 5; i = i + 1) { continue; }");

    let code = &script.chunk.code;
    // Increment clause starts after the body-jump placeholder.
    assert_eq!(code[11], op(Opcode::Jump));
    let increment_start = 14;
    assert_eq!(code[increment_start], op(Opcode::GetLocal));

    // The continue at the body start loops back to the increment.
    let body_start = 25;
    assert_eq!(code[body_start], op(Opcode::Loop));
    let delta = ((code[body_start + 1] as usize) << 8) | code[body_start + 2] as usize;
    assert_eq!(body_start + 3 - delta, increment_start);

    // No unpatched placeholder survives.
    assert!(!code.contains(&op(Opcode::Break)));
}

#[test]
fn repl_mode_echoes_expression_statements() {
    let script =
        compile("1 + 2;", CompileOptions { repl: true }).expect("source should compile");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::Constant),
            0,
            op(Opcode::Constant),
            1,
            op(Opcode::Add),
            op(Opcode::PopRepl),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn compound_assignment_reads_then_writes_a_global() {
    let script = compile_ok("var a = 1; a += 2;");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::Constant),
            1,
            op(Opcode::DefineGlobal),
            0,
            op(Opcode::GetGlobal),
            0,
            op(Opcode::Constant),
            2,
            op(Opcode::Add),
            op(Opcode::SetGlobal),
            0,
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn subtract_assign_uses_negate_add() {
    let script = compile_ok("var a = 1; a -= 2;");

    assert_eq!(
        script.chunk.code[4..12],
        [
            op(Opcode::GetGlobal),
            0,
            op(Opcode::Constant),
            2,
            op(Opcode::Negate),
            op(Opcode::Add),
            op(Opcode::SetGlobal),
            0,
        ]
    );
}

#[test]
fn property_compound_assignment_keeps_the_receiver() {
    let script = compile_ok("p.x -= 1;");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::GetGlobal),
            0,
            op(Opcode::GetPropertyNoPop),
            1,
            op(Opcode::Constant),
            2,
            op(Opcode::Negate),
            op(Opcode::Add),
            op(Opcode::SetProperty),
            1,
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
    assert_eq!(constant_str(&script, 1), "x");
}

#[test]
fn subscript_forms() {
    let plain = compile_ok("l[0];");
    assert_eq!(
        plain.chunk.code[..5],
        [
            op(Opcode::GetGlobal),
            0,
            op(Opcode::Constant),
            1,
            op(Opcode::Subscript),
        ]
    );

    let open_start = compile_ok("l[:1];");
    assert_eq!(
        open_start.chunk.code[..6],
        [
            op(Opcode::GetGlobal),
            0,
            op(Opcode::Empty),
            op(Opcode::Constant),
            1,
            op(Opcode::Slice),
        ]
    );

    let open_end = compile_ok("l[1:];");
    assert_eq!(
        open_end.chunk.code[..6],
        [
            op(Opcode::GetGlobal),
            0,
            op(Opcode::Constant),
            1,
            op(Opcode::Empty),
            op(Opcode::Slice),
        ]
    );

    let both = compile_ok("l[0:1];");
    assert_eq!(
        both.chunk.code[..7],
        [
            op(Opcode::GetGlobal),
            0,
            op(Opcode::Constant),
            1,
            op(Opcode::Constant),
            2,
            op(Opcode::Slice),
        ]
    );
}

#[test]
fn subscript_compound_assignment_restores_operands() {
    let script = compile_ok("l[0] += 1;");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::GetGlobal),
            0,
            op(Opcode::Constant),
            1,
            op(Opcode::Constant),
            2,
            op(Opcode::Push),
            op(Opcode::Add),
            op(Opcode::SubscriptAssign),
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn list_literal_appends_each_element() {
    let script = compile_ok("[1, 2];");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::NewList),
            op(Opcode::Constant),
            0,
            op(Opcode::AddList),
            op(Opcode::Constant),
            1,
            op(Opcode::AddList),
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn leading_brace_dict_literal_is_an_expression_statement() {
    let script = compile_ok("{ 'a': 1 };");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::NewDict),
            op(Opcode::Constant),
            0,
            op(Opcode::Constant),
            1,
            op(Opcode::AddDict),
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
    assert_eq!(constant_str(&script, 0), "a");
}

#[test]
fn leading_empty_braces_before_semicolon_are_an_empty_dict() {
    let script = compile_ok("{};");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::NewDict),
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn leading_brace_otherwise_opens_a_block() {
    let script = compile_ok("{ 1; }");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::Constant),
            0,
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn block_scoped_local_is_read_by_slot() {
    let script = compile_ok("{ var a = 1; a; }");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::Constant),
            0,
            op(Opcode::GetLocal),
            1,
            op(Opcode::Pop),
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn import_takes_the_path_verbatim() {
    let script = compile_ok(r#"import "lib\n";"#);

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::Constant),
            0,
            op(Opcode::Import),
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
    // Import paths skip escape processing.
    assert_eq!(constant_str(&script, 0), "lib\\n");
}

#[test]
fn with_brackets_the_body_in_open_and_close() {
    let script = compile_ok("with ('log.txt', 'w') { }");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::Constant),
            0,
            op(Opcode::Constant),
            1,
            op(Opcode::OpenFile),
            op(Opcode::CloseFile),
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn with_binds_the_file_local() {
    let script = compile_ok("with ('log.txt', 'w') { file; }");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::Constant),
            0,
            op(Opcode::Constant),
            1,
            op(Opcode::OpenFile),
            op(Opcode::GetLocal),
            1,
            op(Opcode::Pop),
            op(Opcode::CloseFile),
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn calls_and_invokes() {
    let call = compile_ok("f(1);");
    assert_eq!(
        call.chunk.code[..6],
        [
            op(Opcode::GetGlobal),
            0,
            op(Opcode::Constant),
            1,
            op(Opcode::Call),
            1,
        ]
    );

    let invoke = compile_ok("p.m(1, 2);");
    assert_eq!(
        invoke.chunk.code,
        vec![
            op(Opcode::GetGlobal),
            0,
            op(Opcode::Constant),
            2,
            op(Opcode::Constant),
            3,
            op(Opcode::Invoke),
            2,
            1,
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
    assert_eq!(constant_str(&invoke, 1), "m");
}

#[test]
fn prefix_increment_on_a_variable() {
    let script = compile_ok("++i;");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::GetGlobal),
            0,
            op(Opcode::Increment),
            op(Opcode::SetGlobal),
            0,
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn prefix_decrement_on_a_property() {
    let script = compile_ok("--p.x;");

    assert_eq!(
        script.chunk.code,
        vec![
            op(Opcode::GetGlobal),
            0,
            op(Opcode::GetPropertyNoPop),
            1,
            op(Opcode::Decrement),
            op(Opcode::SetProperty),
            1,
            op(Opcode::Pop),
            op(Opcode::Nil),
            op(Opcode::Return),
        ]
    );
}

#[test]
fn string_escapes_are_processed_into_the_constant() {
    let script = compile_ok(r#""a\nb";"#);

    assert_eq!(constant_str(&script, 0), "a\nb");
    assert_eq!(constant_str(&script, 0).len(), 3);
}

#[test]
fn unknown_escapes_survive_untouched() {
    let script = compile_ok(r#""a\qb";"#);

    assert_eq!(constant_str(&script, 0), "a\\qb");
}
