//! Parse/print helpers for the unit tests.

use swc_common::{sync::Lrc, SourceMap, DUMMY_SP};
use swc_ecma_ast::*;
use ua_ast::TransformOptions;

use crate::transform_module;

pub(crate) fn parse_stmts(source: &str) -> Vec<Stmt> {
    let parsed = ua_parser::parse_source(source, "test.js").expect("test source parses");
    parsed
        .module
        .body
        .into_iter()
        .map(|item| match item {
            ModuleItem::Stmt(stmt) => stmt,
            ModuleItem::ModuleDecl(decl) => panic!("unexpected module declaration: {decl:?}"),
        })
        .collect()
}

/// Parse `source` as the body of an async function, so it may `return` and
/// `await` at its top level.
pub(crate) fn parse_body(source: &str) -> Vec<Stmt> {
    let wrapped = format!("async function wrapper() {{ {source} }}");
    match parse_stmts(&wrapped).pop() {
        Some(Stmt::Decl(Decl::Fn(decl))) => decl.function.body.map(|b| b.stmts).unwrap_or_default(),
        other => panic!("expected a function declaration, got {other:?}"),
    }
}

pub(crate) fn print_stmts(stmts: Vec<Stmt>) -> String {
    let module = Module {
        span: DUMMY_SP,
        body: stmts.into_iter().map(ModuleItem::Stmt).collect(),
        shebang: None,
    };
    let cm: Lrc<SourceMap> = Default::default();
    ua_parser::emit_module(&module, cm).expect("module prints")
}

pub(crate) fn transform_with(source: &str, opts: &TransformOptions) -> String {
    let parsed = ua_parser::parse_source(source, "test.js").expect("test source parses");
    let module = transform_module(parsed.module, opts).expect("transform succeeds");
    ua_parser::emit_module(&module, parsed.source_map).expect("module prints")
}

pub(crate) fn transform(source: &str) -> String {
    transform_with(source, &TransformOptions::default())
}

/// Strip all whitespace so comparisons ignore printer layout.
pub(crate) fn compact(code: &str) -> String {
    code.chars().filter(|c| !c.is_whitespace()).collect()
}

#[track_caller]
pub(crate) fn assert_transforms_to(source: &str, expected: &str) {
    let actual = transform(source);
    assert_eq!(
        compact(&actual),
        compact(expected),
        "\n--- actual ---\n{actual}\n--- expected ---\n{expected}"
    );
}

#[track_caller]
pub(crate) fn assert_output_contains(source: &str, needle: &str) {
    let actual = transform(source);
    assert!(
        compact(&actual).contains(&compact(needle)),
        "\n`{needle}` not found in\n{actual}"
    );
}
