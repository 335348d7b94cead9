//! Bring statement lists into single-exit form.
//!
//! The chain builder turns a list into consecutive callbacks. A `return`
//! only leaves the callback it sits in, so after it runs nothing else of the
//! list may be left to run. Two rewrites guarantee that:
//!
//! * flattening pulls ifs that return out of the consequent of an enclosing
//!   if, behind a `_test` guard evaluated once:
//!   ```text
//!   if (a()) { x(); if (b()) { return c(); } }    _test = a(); if (_test) { x(); }
//!   return d();                               =>  if (_test && b()) { return c(); }
//!                                                 return d();
//!   ```
//! * single-exit moves everything after an if whose consequent returns into
//!   its alternate, so every position either exits or continues down exactly
//!   one path:
//!   ```text
//!   if (_test && b()) { return c(); } else { return d(); }
//!   ```

use swc_ecma_ast::*;
use tracing::trace;

use crate::{
    build::*,
    scope::Scope,
    walk::{block_stmts, contains_return, squash_blocks, stmts_contain_return},
};

/// Flatten returning ifs and move trailing statements into alternates.
pub(crate) fn normalize_exits(stmts: Vec<Stmt>, scope: &mut Scope) -> Vec<Stmt> {
    let stmts = flatten_ifs(squash_blocks(stmts), scope);
    single_exit(stmts, scope)
}

fn flatten_ifs(stmts: Vec<Stmt>, scope: &mut Scope) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt {
            Stmt::If(s) => out.extend(flatten_if(s, scope)),
            stmt => out.push(stmt),
        }
    }
    out
}

fn flatten_if(s: IfStmt, scope: &mut Scope) -> Vec<Stmt> {
    let mut test = *s.test;
    let mut cons = flatten_ifs(squash_blocks(block_stmts(*s.cons)), scope);
    let mut alt = s
        .alt
        .map(|alt| flatten_ifs(squash_blocks(block_stmts(*alt)), scope))
        .unwrap_or_default();

    // Keep the exit in the consequent.
    if !stmts_contain_return(&cons) && stmts_contain_return(&alt) {
        test = negate_test(test);
        std::mem::swap(&mut cons, &mut alt);
    }

    let returning_if = |stmt: &Stmt| matches!(stmt, Stmt::If(inner) if contains_return(inner));
    if !cons.iter().any(returning_if) {
        return vec![if_else(test, cons, alt)];
    }

    let guard = scope.generate_uid("test");
    scope.declare(&guard);
    trace!(guard = %guard.sym, "flattening nested if");

    let mut out = vec![make_assign_stmt(&guard, test)];
    let mut pending = vec![];
    for stmt in cons {
        match stmt {
            Stmt::If(inner) if contains_return(&inner) => {
                if !pending.is_empty() {
                    out.push(make_if(ident_expr(&guard), std::mem::take(&mut pending), None));
                }
                let inner_alt = inner
                    .alt
                    .map(|alt| vec![make_if(ident_expr(&guard), block_stmts(*alt), None)]);
                out.push(make_if(
                    make_and(ident_expr(&guard), *inner.test),
                    block_stmts(*inner.cons),
                    inner_alt,
                ));
            }
            stmt => pending.push(stmt),
        }
    }
    if !pending.is_empty() {
        out.push(make_if(ident_expr(&guard), pending, None));
    }
    if !alt.is_empty() {
        out.push(make_if(make_not(ident_expr(&guard)), alt, None));
    }
    out
}

fn single_exit(stmts: Vec<Stmt>, scope: &mut Scope) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    let mut iter = stmts.into_iter();
    while let Some(stmt) = iter.next() {
        match stmt {
            Stmt::Return(_) | Stmt::Throw(_) => {
                // Anything after is unreachable.
                out.push(stmt);
                break;
            }
            Stmt::If(s) => {
                let test = *s.test;
                let mut cons = single_exit(block_stmts(*s.cons), scope);
                let alt = s
                    .alt
                    .map(|alt| single_exit(block_stmts(*alt), scope))
                    .unwrap_or_default();

                if !matches!(cons.last(), Some(Stmt::Return(_))) {
                    out.push(if_else(test, cons, alt));
                    continue;
                }

                if matches!(cons.last(), Some(Stmt::Return(ReturnStmt { arg: None, .. }))) {
                    cons.pop();
                }
                let mut alt = alt;
                alt.extend(iter.by_ref());
                let alt = normalize_exits(alt, scope);
                out.push(if_else(test, cons, alt));
                break;
            }
            Stmt::Try(mut t) => {
                t.block.stmts = normalize_exits(std::mem::take(&mut t.block.stmts), scope);
                if let Some(handler) = &mut t.handler {
                    handler.body.stmts =
                        normalize_exits(std::mem::take(&mut handler.body.stmts), scope);
                }
                if let Some(finalizer) = &mut t.finalizer {
                    finalizer.stmts = normalize_exits(std::mem::take(&mut finalizer.stmts), scope);
                }
                out.push(Stmt::Try(t));
            }
            stmt => out.push(stmt),
        }
    }
    out
}

/// `if (test) { cons } else { alt }`, dropping empty branches.
fn if_else(test: Expr, cons: Vec<Stmt>, alt: Vec<Stmt>) -> Stmt {
    match (cons.is_empty(), alt.is_empty()) {
        (true, true) => make_expr_stmt(test),
        (true, false) => make_if(negate_test(test), alt, None),
        (false, true) => make_if(test, cons, None),
        (false, false) => make_if(test, cons, Some(alt)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{compact, parse_body, print_stmts};

    fn normalized(source: &str) -> String {
        let mut scope = Scope::default();
        let stmts = normalize_exits(parse_body(source), &mut scope);
        compact(&print_stmts(stmts))
    }

    #[test]
    fn rest_moves_into_the_alternate() {
        assert_eq!(
            normalized("if (a) { return 1; } b(); return 2;"),
            compact("if (a) { return 1; } else { b(); return 2; }")
        );
    }

    #[test]
    fn unreachable_statements_are_dropped() {
        assert_eq!(normalized("a(); return 1; b();"), compact("a(); return 1;"));
        assert_eq!(normalized("throw e; b();"), compact("throw e;"));
    }

    #[test]
    fn valueless_return_inverts_the_test() {
        assert_eq!(normalized("if (a) { return; } b();"), compact("if (!a) { b(); }"));
        assert_eq!(
            normalized("if (a) { c(); return; } b();"),
            compact("if (a) { c(); } else { b(); }")
        );
    }

    #[test]
    fn existing_alternate_runs_before_moved_statements() {
        assert_eq!(
            normalized("if (a) { return 1; } else { b(); } c();"),
            compact("if (a) { return 1; } else { b(); c(); }")
        );
    }

    #[test]
    fn returning_alternate_is_swapped_into_the_consequent() {
        assert_eq!(
            normalized("if (a) { b(); } else { return 1; } c();"),
            compact("if (!a) { return 1; } else { b(); c(); }")
        );
    }

    #[test]
    fn nested_returning_if_is_flattened_behind_a_guard() {
        assert_eq!(
            normalized("if (a()) { if (b()) { return c(); } d(); } return e();"),
            compact(
                "_test = a();
                if (_test && b()) {
                    return c();
                } else {
                    if (_test) { d(); }
                    return e();
                }"
            )
        );
    }

    #[test]
    fn outer_alternate_runs_only_when_the_guard_failed() {
        assert_eq!(
            normalized("if (a) { x(); if (b) { return 1; } } else { y(); }"),
            compact(
                "_test = a;
                if (_test) { x(); }
                if (_test && b) { return 1; } else { if (!_test) { y(); } }"
            )
        );
    }

    #[test]
    fn lists_inside_try_are_normalized() {
        assert_eq!(
            normalized("try { if (a) { return; } b(); } catch (e) {}"),
            compact("try { if (!a) { b(); } } catch (e) {}")
        );
    }
}
