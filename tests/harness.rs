//! Golden-file test harness for unawait.
//!
//! Discovers `.input.js` files under `tests/fixtures/golden/`, runs the
//! pipeline (parse → transform → codegen), and compares output against the
//! corresponding `.expected.js` file. The comparison ignores whitespace so
//! expected files can be formatted by hand.
//!
//! Files under `tests/fixtures/roundtrip/` have no expected output; their
//! output must parse again and be free of `async` and `await`.
//!
//! Files under `tests/fixtures/exec/` are run: each defines `async function
//! main()`, and its rewritten form must leave the same trace and settle the
//! same way as the original under several option sets.
//!
//! Set `UA_UPDATE_FIXTURES=1` to overwrite expected files with actual output.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use boa_engine::{Context, Source};
use swc_ecma_ast::{ArrowExpr, AwaitExpr, Function, Module};
use swc_ecma_visit::{Visit, VisitWith};
use ua_ast::TransformOptions;
use ua_parser::{emit_module, parse_source};
use ua_transform::transform_module;

fn fixtures_dir() -> PathBuf {
    // CARGO_MANIFEST_DIR is crates/ua_test/, so go up two levels to workspace root.
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("tests")
        .join("fixtures")
}

fn collect_input_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir(dir)
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".input.js"))
        })
        .collect();
    files.sort();
    files
}

fn walkdir(dir: &Path) -> Vec<PathBuf> {
    let mut result = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                result.extend(walkdir(&path));
            } else {
                result.push(path);
            }
        }
    }
    result
}

fn run_pipeline(source: &str, filename: &str) -> Result<String> {
    run_pipeline_with(source, filename, &TransformOptions::default())
}

fn run_pipeline_with(source: &str, filename: &str, opts: &TransformOptions) -> Result<String> {
    let parsed = parse_source(source, filename)?;
    let module = transform_module(parsed.module, opts)?;
    emit_module(&module, parsed.source_map)
}

fn compact(code: &str) -> String {
    code.chars().filter(|c| !c.is_whitespace()).collect()
}

#[derive(Default)]
struct AsyncFinder {
    found: Vec<&'static str>,
}

impl Visit for AsyncFinder {
    fn visit_await_expr(&mut self, node: &AwaitExpr) {
        self.found.push("await");
        node.visit_children_with(self);
    }

    fn visit_function(&mut self, node: &Function) {
        if node.is_async {
            self.found.push("async function");
        }
        node.visit_children_with(self);
    }

    fn visit_arrow_expr(&mut self, node: &ArrowExpr) {
        if node.is_async {
            self.found.push("async arrow");
        }
        node.visit_children_with(self);
    }
}

fn remaining_async(module: &Module) -> Vec<&'static str> {
    let mut finder = AsyncFinder::default();
    module.visit_with(&mut finder);
    finder.found
}

#[test]
fn golden_file_tests() {
    let fixtures = fixtures_dir().join("golden");
    let input_files = collect_input_files(&fixtures);

    assert!(
        !input_files.is_empty(),
        "No test fixtures found in {}",
        fixtures.display()
    );

    let update_mode = std::env::var("UA_UPDATE_FIXTURES").is_ok();
    let mut failures = Vec::new();

    for input_path in &input_files {
        let expected_path = input_path
            .to_str()
            .unwrap()
            .replace(".input.js", ".expected.js");
        let expected_path = PathBuf::from(&expected_path);

        let test_name = input_path
            .strip_prefix(&fixtures)
            .unwrap()
            .display()
            .to_string();

        let source = match std::fs::read_to_string(input_path) {
            Ok(s) => s,
            Err(e) => {
                failures.push(format!("{test_name}: failed to read input: {e}"));
                continue;
            }
        };

        let filename = input_path.display().to_string();
        let actual = match run_pipeline(&source, &filename) {
            Ok(s) => s,
            Err(e) => {
                failures.push(format!("{test_name}: pipeline failed: {e}"));
                continue;
            }
        };

        if update_mode {
            if let Err(e) = std::fs::write(&expected_path, &actual) {
                failures.push(format!("{test_name}: failed to write expected: {e}"));
            }
            continue;
        }

        let expected = match std::fs::read_to_string(&expected_path) {
            Ok(s) => s,
            Err(e) => {
                failures.push(format!(
                    "{test_name}: failed to read expected {}: {e}",
                    expected_path.display()
                ));
                continue;
            }
        };
        if compact(&actual) != compact(&expected) {
            failures.push(format!(
                "{test_name}: output mismatch\n--- expected ---\n{}\n--- actual ---\n{}",
                expected.trim(),
                actual.trim()
            ));
        }
    }

    if !failures.is_empty() {
        panic!(
            "\n{} golden test(s) failed:\n\n{}",
            failures.len(),
            failures.join("\n\n")
        );
    }
}

#[test]
fn roundtrip_tests() {
    let fixtures = fixtures_dir().join("roundtrip");
    let input_files = collect_input_files(&fixtures);

    assert!(
        !input_files.is_empty(),
        "No roundtrip fixtures found in {}",
        fixtures.display()
    );

    let mut failures = Vec::new();

    for input_path in &input_files {
        let test_name = input_path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let source = match std::fs::read_to_string(input_path) {
            Ok(s) => s,
            Err(e) => {
                failures.push(format!("{test_name}: failed to read: {e}"));
                continue;
            }
        };

        let filename = input_path.display().to_string();
        let output = match run_pipeline(&source, &filename) {
            Ok(s) => s,
            Err(e) => {
                failures.push(format!("{test_name}: pipeline failed: {e}"));
                continue;
            }
        };

        match parse_source(&output, &format!("{test_name}.output.js")) {
            Ok(reparsed) => {
                let left = remaining_async(&reparsed.module);
                if !left.is_empty() {
                    failures.push(format!(
                        "{test_name}: output still contains {}\n--- output ---\n{}",
                        left.join(", "),
                        output.trim()
                    ));
                }
            }
            Err(e) => failures.push(format!(
                "{test_name}: output does not parse: {e}\n--- output ---\n{}",
                output.trim()
            )),
        }
    }

    if !failures.is_empty() {
        panic!(
            "\n{} roundtrip test(s) failed:\n\n{}",
            failures.len(),
            failures.join("\n\n")
        );
    }
}

/// Helpers every execution fixture can call.
const EXEC_PRELUDE: &str = r#"
var trace = [];
function log(value) {
    trace.push(String(value));
    return value;
}
function later(value) {
    return new Promise(function (resolve) {
        resolve(value);
    });
}
function failLater(message) {
    return later().then(function () {
        throw new Error(message);
    });
}
"#;

const EXEC_SETTLE: &str = r#"
main().then(
    function (value) {
        trace.push("resolved: " + JSON.stringify(value));
    },
    function (err) {
        trace.push("rejected: " + (err instanceof Error ? err.message : String(err)));
    }
);
"#;

/// Run `program` with the fixture helpers and return its trace.
fn execute(program: &str) -> Result<String> {
    let mut context = Context::default();
    let script = format!("{EXEC_PRELUDE}\n{program}\n{EXEC_SETTLE}");
    context
        .eval(Source::from_bytes(script.as_str()))
        .map_err(|err| anyhow!("script failed: {err:?}"))?;
    context.run_jobs();
    let trace = context
        .eval(Source::from_bytes("trace.join('\\n')"))
        .map_err(|err| anyhow!("reading the trace failed: {err:?}"))?;
    let trace = trace
        .to_string(&mut context)
        .map_err(|err| anyhow!("trace is not a string: {err:?}"))?;
    Ok(trace.to_std_string_escaped())
}

/// Option sets every execution fixture runs under. Fixtures whose first
/// line is `// order-sensitive` skip the set that leaves evaluation order
/// alone.
fn exec_variants() -> Vec<(&'static str, TransformOptions, bool)> {
    vec![
        ("default", TransformOptions::default(), false),
        (
            "no-inline",
            TransformOptions {
                inline: false,
                ..Default::default()
            },
            false,
        ),
        (
            "no-exec-order",
            TransformOptions {
                hoist_exec_order: false,
                ..Default::default()
            },
            true,
        ),
    ]
}

#[test]
fn execution_tests() {
    let fixtures = fixtures_dir().join("exec");
    let input_files = collect_input_files(&fixtures);

    assert!(
        !input_files.is_empty(),
        "No execution fixtures found in {}",
        fixtures.display()
    );

    let mut failures = Vec::new();

    for input_path in &input_files {
        let test_name = input_path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let source = match std::fs::read_to_string(input_path) {
            Ok(s) => s,
            Err(e) => {
                failures.push(format!("{test_name}: failed to read: {e}"));
                continue;
            }
        };
        let order_sensitive = source.starts_with("// order-sensitive");

        let expected = match execute(&source) {
            Ok(trace) => trace,
            Err(e) => {
                failures.push(format!("{test_name}: original does not run: {e}"));
                continue;
            }
        };
        if !expected.contains("resolved: ") && !expected.contains("rejected: ") {
            failures.push(format!("{test_name}: original never settled\n{expected}"));
            continue;
        }

        let filename = input_path.display().to_string();
        for (variant, opts, reorders) in exec_variants() {
            if reorders && order_sensitive {
                continue;
            }
            let output = match run_pipeline_with(&source, &filename, &opts) {
                Ok(s) => s,
                Err(e) => {
                    failures.push(format!("{test_name} [{variant}]: pipeline failed: {e}"));
                    continue;
                }
            };
            match execute(&output) {
                Ok(actual) if actual == expected => {}
                Ok(actual) => failures.push(format!(
                    "{test_name} [{variant}]: trace mismatch\n--- expected ---\n{expected}\n--- actual ---\n{actual}\n--- output ---\n{}",
                    output.trim()
                )),
                Err(e) => failures.push(format!(
                    "{test_name} [{variant}]: output does not run: {e}\n--- output ---\n{}",
                    output.trim()
                )),
            }
        }
    }

    if !failures.is_empty() {
        panic!(
            "\n{} execution test(s) failed:\n\n{}",
            failures.len(),
            failures.join("\n\n")
        );
    }
}
