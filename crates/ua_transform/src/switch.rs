//! Desugar `switch` statements that suspend or return into guarded ifs.
//!
//! ```text
//! _discriminant = d; _match = false; _brokenOut = false;
//! if (!_brokenOut && (_match || 1 === _discriminant)) { A; _match = true; }
//! if (!_brokenOut && (_match || 2 === _discriminant)) { B; _match = true; }
//! if (!_brokenOut && !_match) { DEFAULT; ... }
//! ```
//! A `break` of the switch becomes `_brokenOut = true`; whatever follows a
//! statement that may break runs under `if (!_brokenOut)`.

use swc_ecma_ast::*;
use tracing::trace;

use crate::{
    build::*,
    error::Result,
    transform::FnCx,
    walk::{block_stmts, suspends_or_exits},
};

/// Desugar every switch in `stmts` that contains an `await` or a `return`.
pub(crate) fn desugar_switches(stmts: Vec<Stmt>, cx: &mut FnCx<'_>) -> Result<Vec<Stmt>> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        out.extend(desugar_stmt(stmt, cx)?);
    }
    Ok(out)
}

fn desugar_block(stmt: Box<Stmt>, cx: &mut FnCx<'_>) -> Result<Box<Stmt>> {
    let stmts = desugar_switches(block_stmts(*stmt), cx)?;
    Ok(Box::new(Stmt::Block(make_block(stmts))))
}

fn desugar_stmt(stmt: Stmt, cx: &mut FnCx<'_>) -> Result<Vec<Stmt>> {
    match stmt {
        Stmt::Switch(s) if suspends_or_exits(&s) => {
            desugar(s, None, cx)
        }
        Stmt::Labeled(l) if matches!(*l.body, Stmt::Switch(_)) && suspends_or_exits(&l.body) => {
            let label = l.label.sym.to_string();
            match *l.body {
                Stmt::Switch(s) => desugar(s, Some(label), cx),
                body => Ok(vec![body]),
            }
        }
        Stmt::Labeled(l) => {
            let body = desugar_stmt(*l.body, cx)?;
            Ok(vec![relabel(l.span, l.label, body)])
        }
        Stmt::Block(b) => Ok(vec![Stmt::Block(BlockStmt {
            stmts: desugar_switches(b.stmts, cx)?,
            ..b
        })]),
        Stmt::If(s) => {
            let cons = desugar_block(s.cons, cx)?;
            let alt = s.alt.map(|alt| desugar_block(alt, cx)).transpose()?;
            Ok(vec![Stmt::If(IfStmt { cons, alt, ..s })])
        }
        Stmt::Try(mut t) => {
            t.block.stmts = desugar_switches(std::mem::take(&mut t.block.stmts), cx)?;
            if let Some(handler) = &mut t.handler {
                handler.body.stmts = desugar_switches(std::mem::take(&mut handler.body.stmts), cx)?;
            }
            if let Some(finalizer) = &mut t.finalizer {
                finalizer.stmts = desugar_switches(std::mem::take(&mut finalizer.stmts), cx)?;
            }
            Ok(vec![Stmt::Try(t)])
        }
        stmt => Ok(vec![stmt]),
    }
}

fn desugar(s: SwitchStmt, label: Option<String>, cx: &mut FnCx<'_>) -> Result<Vec<Stmt>> {
    let discriminant = cx.scope.generate_uid("discriminant");
    let matched = cx.scope.generate_uid("match");
    let broken = cx.scope.generate_uid("brokenOut");
    for id in [&discriminant, &matched, &broken] {
        cx.scope.declare(id);
    }
    trace!(cases = s.cases.len(), "desugaring switch");

    let breaks = BreakRewriter {
        label: label.as_deref(),
        broken: &broken,
    };

    let mut tests = Vec::with_capacity(s.cases.len());
    let mut bodies = Vec::with_capacity(s.cases.len());
    for case in s.cases {
        tests.push(case.test);
        let cons = desugar_switches(case.cons, cx)?;
        bodies.push(breaks.rewrite(cons).0);
    }

    let not_broken = || make_not(ident_expr(&broken));
    let mut out = vec![
        make_assign_stmt(&discriminant, *s.discriminant),
        make_assign_stmt(&matched, make_bool(false)),
        make_assign_stmt(&broken, make_bool(false)),
    ];

    let last = tests.len().saturating_sub(1);
    let mut default = None;
    for (i, (test, body)) in tests.into_iter().zip(bodies.iter()).enumerate() {
        match test {
            Some(test) => {
                let matches = make_or(
                    ident_expr(&matched),
                    make_bin(BinaryOp::EqEqEq, *test, ident_expr(&discriminant)),
                );
                let mut body = body.clone();
                body.push(make_assign_stmt(&matched, make_bool(true)));
                out.push(make_if(make_and(not_broken(), matches), body, None));
            }
            // A default in last position runs on fallthrough and on no match
            // alike.
            None if i == last => out.push(make_if(not_broken(), body.clone(), None)),
            None => {
                out.push(make_if(
                    make_and(not_broken(), ident_expr(&matched)),
                    body.clone(),
                    None,
                ));
                default = Some(i);
            }
        }
    }

    // No case matched: enter at the default and fall through the cases after
    // it.
    if let Some(i) = default {
        let mut block = bodies[i].clone();
        for body in &bodies[i + 1..] {
            block.push(make_if(not_broken(), body.clone(), None));
        }
        out.push(make_if(
            make_and(not_broken(), make_not(ident_expr(&matched))),
            block,
            None,
        ));
    }

    Ok(out)
}

struct BreakRewriter<'a> {
    label: Option<&'a str>,
    broken: &'a Ident,
}

impl BreakRewriter<'_> {
    fn is_own(&self, label: Option<&Ident>) -> bool {
        match label {
            None => true,
            Some(label) => self.label == Some(&*label.sym),
        }
    }

    /// Rewrite the breaks of one statement list. The flag reports whether
    /// the list may have broken out by the time it ends.
    fn rewrite(&self, stmts: Vec<Stmt>) -> (Vec<Stmt>, bool) {
        let mut out = Vec::with_capacity(stmts.len());
        let mut iter = stmts.into_iter();
        while let Some(stmt) = iter.next() {
            match stmt {
                Stmt::Break(b) if self.is_own(b.label.as_ref()) => {
                    out.push(make_assign_stmt(self.broken, make_bool(true)));
                    return (out, true);
                }
                stmt => {
                    let (stmt, may_break) = self.rewrite_nested(stmt);
                    out.push(stmt);
                    if may_break {
                        let rest: Vec<Stmt> = iter.collect();
                        if !rest.is_empty() {
                            let (rest, _) = self.rewrite(rest);
                            out.push(make_if(make_not(ident_expr(self.broken)), rest, None));
                        }
                        return (out, true);
                    }
                }
            }
        }
        (out, false)
    }

    fn rewrite_list(&self, stmts: Vec<Stmt>, may_break: &mut bool) -> Vec<Stmt> {
        let (stmts, breaks) = self.rewrite(stmts);
        *may_break |= breaks;
        stmts
    }

    fn rewrite_nested(&self, stmt: Stmt) -> (Stmt, bool) {
        let mut may_break = false;
        let stmt = match stmt {
            Stmt::Block(b) => Stmt::Block(BlockStmt {
                stmts: self.rewrite_list(b.stmts, &mut may_break),
                ..b
            }),
            Stmt::If(s) => {
                let cons = self.rewrite_list(block_stmts(*s.cons), &mut may_break);
                let alt = s
                    .alt
                    .map(|alt| self.rewrite_list(block_stmts(*alt), &mut may_break));
                Stmt::If(IfStmt {
                    cons: Box::new(Stmt::Block(make_block(cons))),
                    alt: alt.map(|alt| Box::new(Stmt::Block(make_block(alt)))),
                    ..s
                })
            }
            Stmt::Labeled(l) => {
                let (body, breaks) = self.rewrite_nested(*l.body);
                may_break |= breaks;
                Stmt::Labeled(LabeledStmt {
                    body: Box::new(body),
                    ..l
                })
            }
            Stmt::Try(mut t) => {
                t.block.stmts = self.rewrite_list(std::mem::take(&mut t.block.stmts), &mut may_break);
                if let Some(handler) = &mut t.handler {
                    handler.body.stmts =
                        self.rewrite_list(std::mem::take(&mut handler.body.stmts), &mut may_break);
                }
                if let Some(finalizer) = &mut t.finalizer {
                    finalizer.stmts =
                        self.rewrite_list(std::mem::take(&mut finalizer.stmts), &mut may_break);
                }
                Stmt::Try(t)
            }
            // Loops and nested switches own their unlabeled breaks.
            stmt => stmt,
        };
        (stmt, may_break)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{assert_output_contains, assert_transforms_to, compact, transform};

    #[test]
    fn simple_switch_with_breaks() {
        assert_transforms_to(
            "async function test(x) {
                switch (x) {
                    case 1:
                        await a();
                        break;
                    default:
                        b();
                }
            }",
            "function test(x) {
                var _discriminant, _match, _brokenOut;
                return Promise.resolve().then(function () {
                    _discriminant = x;
                    _match = false;
                    _brokenOut = false;
                    if (!_brokenOut && (_match || 1 === _discriminant)) {
                        return Promise.resolve().then(function () {
                            return a();
                        }).then(function () {
                            _brokenOut = true;
                            _match = true;
                        });
                    }
                }).then(function () {
                    if (!_brokenOut) {
                        b();
                    }
                });
            }",
        );
    }

    #[test]
    fn statements_after_break_do_not_run() {
        assert_output_contains(
            "async function test(x) { switch (x) { case 1: if (c) { break; } await a(); } }",
            "if (c) { _brokenOut = true; } if (!_brokenOut) {",
        );
    }

    #[test]
    fn default_in_the_middle_falls_through() {
        let out = compact(&transform(
            "async function test(x) {
                switch (x) {
                    case 2: await a(); break;
                    case 3:
                    case 4: b();
                    default: c();
                    case 5: d();
                }
            }",
        ));
        assert!(out.contains("if(!_brokenOut&&_match){c();}"), "{out}");
        assert!(
            out.contains("if(!_brokenOut&&(_match||5===_discriminant)){d();_match=true;}"),
            "{out}"
        );
        assert!(
            out.contains("if(!_brokenOut&&!_match){c();if(!_brokenOut){d();}}"),
            "{out}"
        );
    }

    #[test]
    fn switch_without_await_or_return_is_kept() {
        let out = compact(&transform(
            "async function test(x) { await a(); switch (x) { case 1: b(); break; } }",
        ));
        assert!(out.contains("switch(x){case1:b();break;}"), "{out}");
    }

    #[test]
    fn labeled_break_of_the_switch_is_rewritten() {
        assert_output_contains(
            "async function test(x) { s: switch (x) { case 1: await a(); break s; } }",
            "_brokenOut = true;",
        );
    }

    #[test]
    fn labeled_switch_is_desugared_in_place() {
        let out = compact(&transform(
            "async function test(x) { s: switch (x) { case 1: await a(); break s; case 2: b(); } c(); }",
        ));
        assert!(!out.contains("switch"), "{out}");
        assert!(!out.contains("s:{"), "{out}");
        assert!(out.contains("if(!_brokenOut&&(_match||2===_discriminant)){b();_match=true;}"), "{out}");
    }

    #[test]
    fn labeled_loop_inside_a_switch_keeps_its_label() {
        let out = compact(&transform(
            "async function test(x) {
                switch (x) {
                    case 1:
                        await a();
                        l: for (;;) { for (;;) { continue l; } }
                }
            }",
        ));
        assert!(out.contains("l:for(;;){for(;;){continuel;}}"), "{out}");
    }

    #[test]
    fn breaks_inside_nested_loops_are_kept() {
        let out = compact(&transform(
            "async function test(x) { switch (x) { case 1: await a(); for (;;) { break; } } }",
        ));
        assert!(out.contains("for(;;){break;}"), "{out}");
    }
}
