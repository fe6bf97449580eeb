//! Diagnostic coverage: structural, declaration, assignment, and
//! capacity errors, plus panic-mode recovery behavior.

use rstest::rstest;
use vesper_compiler::{compile, CompileOptions, Diagnostic};

fn compile_errors(source: &str) -> Vec<Diagnostic> {
    compile(source, CompileOptions::default())
        .expect_err("source should not compile")
        .diagnostics
}

fn messages(source: &str) -> Vec<String> {
    compile_errors(source)
        .into_iter()
        .map(|diagnostic| diagnostic.message)
        .collect()
}

#[rstest]
// Structural
#[case::break_outside_loop("break;", "Cannot utilise 'break' outside of a loop.")]
#[case::continue_outside_loop("continue;", "Cannot utilise 'continue' outside of a loop.")]
#[case::this_outside_class("this;", "Cannot utilise 'this' outside of a class.")]
#[case::this_in_static_method(
    "class A { static s() { return this; } }",
    "Cannot utilise 'this' inside a static method."
)]
#[case::super_outside_class("super.x;", "Cannot utilise 'super' outside of a class.")]
#[case::super_without_superclass(
    "class A { m() { return super.x; } }",
    "Cannot utilise 'super' in a class with no superclass."
)]
#[case::static_outside_class("static;", "Cannot utilise 'static' outside of a class.")]
#[case::return_at_top_level("return;", "Cannot return from top-level code.")]
#[case::return_value_from_initializer(
    "class A { init() { return 1; } }",
    "Cannot return a value from an initializer."
)]
// Declaration
#[case::duplicate_local(
    "{ var x = 1; var x = 2; }",
    "Variable with this name already declared in this scope."
)]
#[case::self_referential_initializer(
    "{ var a = a; }",
    "Cannot read local variable in its own initializer."
)]
#[case::non_optional_after_optional(
    "def f(a = 1, b) { }",
    "Cannot have non-optional parameter after optional."
)]
// Assignment
#[case::chained_assignment("var a; a = a = 1;", "Invalid assignment target.")]
#[case::arithmetic_lvalue("a + b = c;", "Invalid assignment target.")]
// Syntax
#[case::missing_expression("var a = ;", "Expect expression.")]
#[case::unclosed_paren("(1;", "Expect ')' after expression.")]
#[case::unexpected_character("@;", "Unexpected character.")]
#[case::unterminated_string("\"abc", "Unterminated string.")]
fn reports(#[case] source: &str, #[case] expected: &str) {
    let messages = messages(source);
    assert!(
        messages.iter().any(|message| message == expected),
        "expected {:?} in {:?}",
        expected,
        messages
    );
}

#[test]
fn missing_semicolon_reports_at_end() {
    let errors = compile_errors("1");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].at_end);
    assert_eq!(errors[0].to_string(), "[line 1] Error at end: Expect ';' after expression.");
}

#[test]
fn diagnostics_carry_the_offending_lexeme() {
    let errors = compile_errors("var = 1;");
    assert_eq!(errors[0].lexeme.as_deref(), Some("="));
    assert_eq!(
        errors[0].to_string(),
        "[line 1] Error at '=': Expect variable name."
    );
}

#[test]
fn diagnostics_carry_the_line_number() {
    let errors = compile_errors("var a = 1;\nvar b = 2;\nbreak;\n");
    assert_eq!(errors[0].line, 3);
}

#[test]
fn parsing_recovers_at_statement_boundaries() {
    // Both independent mistakes are reported in one run.
    let messages = messages("break; continue;");
    assert_eq!(
        messages,
        vec![
            "Cannot utilise 'break' outside of a loop.".to_string(),
            "Cannot utilise 'continue' outside of a loop.".to_string(),
        ]
    );
}

#[test]
fn panic_mode_swallows_cascading_errors() {
    // One malformed statement produces one report, not a wall of them.
    let messages = messages("var = = = 1;");
    assert_eq!(messages.len(), 1);
}

#[test]
fn too_many_constants_in_one_chunk() {
    let mut source = String::new();
    for i in 0..300 {
        source.push_str(&format!("{};\n", i));
    }

    let messages = messages(&source);
    assert!(messages
        .iter()
        .any(|message| message == "Too many constants in one chunk."));
}

#[test]
fn too_many_locals_in_one_function() {
    let mut source = String::from("{\n");
    for i in 0..256 {
        source.push_str(&format!("var l{} = 1;\n", i));
    }
    source.push('}');

    let messages = messages(&source);
    assert!(messages
        .iter()
        .any(|message| message == "Too many local variables in function."));
}

#[test]
fn duplicate_parameter_names_are_rejected() {
    let messages = messages("def f(a, a) { }");
    assert!(messages
        .iter()
        .any(|message| message == "Variable with this name already declared in this scope."));
}

#[test]
fn too_many_arguments() {
    // The same identifier every time: arguments must not exhaust the
    // constant pool before the arity check fires.
    let args = vec!["x"; 256];
    let source = format!("f({});", args.join(", "));

    let messages = messages(&source);
    assert!(messages
        .iter()
        .any(|message| message == "Cannot have more than 255 arguments."));
}

#[test]
fn oversized_loop_body_overflows_the_backward_jump() {
    // ~22k breaks at three bytes apiece push the loop span past 65535.
    let mut source = String::from("while {\n");
    for _ in 0..22_000 {
        source.push_str("break;\n");
    }
    source.push('}');

    let messages = messages(&source);
    assert_eq!(messages, vec!["Loop body too large.".to_string()]);
}

#[test]
fn oversized_then_branch_overflows_the_forward_jump() {
    // Reading a global is three bytes and interns its name constant
    // once, so the branch grows without hitting the constant limit.
    let mut source = String::from("if (true) {\n");
    for _ in 0..22_000 {
        source.push_str("x;\n");
    }
    source.push('}');

    let messages = messages(&source);
    assert_eq!(messages, vec!["Too much code to jump over.".to_string()]);
}

#[test]
fn error_artifacts_are_discarded() {
    assert!(compile("var 1;", CompileOptions::default()).is_err());
}
