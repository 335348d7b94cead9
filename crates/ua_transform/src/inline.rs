//! Final cleanup of rewritten functions.
//!
//! Inner chains of a single step come out of the chain builder as IIFEs.
//! Three local rewrites, applied bottom-up, remove most of them again:
//!
//! * `(function () { return x; })()` becomes `x`;
//! * `return (function () { body })();` in tail position becomes `body`;
//! * bare blocks that declare nothing are spliced into their parent.
//!
//! An IIFE is only touched when it is anonymous, takes no arguments and has
//! no parameters, is neither async nor a generator, and does not refer to
//! its own `this` or `arguments`. Its body is only spliced when it declares
//! nothing.

use swc_common::DUMMY_SP;
use swc_ecma_ast::*;
use swc_ecma_visit::{VisitMut, VisitMutWith};

use crate::{
    build::{paren, precedence, starts_ambiguously, PREC_MEMBER},
    walk::{squash_blocks, stmts_declare, uses_context},
};

/// Run the inliner over a rewritten function or arrow.
pub(crate) fn inline<N: VisitMutWith<Inliner>>(node: &mut N) {
    node.visit_mut_with(&mut Inliner);
}

pub(crate) struct Inliner;

impl VisitMut for Inliner {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);
        if let Some(value) = take_returned_value(expr) {
            *expr = if precedence(&value) >= PREC_MEMBER {
                value
            } else {
                paren(value)
            };
        }
    }

    fn visit_mut_return_stmt(&mut self, stmt: &mut ReturnStmt) {
        if let Some(arg) = &mut stmt.arg {
            (**arg).visit_mut_children_with(self);
            if let Some(value) = take_returned_value(arg) {
                **arg = value;
            }
        }
    }

    fn visit_mut_expr_stmt(&mut self, stmt: &mut ExprStmt) {
        stmt.visit_mut_children_with(self);
        if starts_ambiguously(&stmt.expr) {
            let expr = std::mem::replace(&mut *stmt.expr, Expr::Invalid(Invalid { span: DUMMY_SP }));
            *stmt.expr = paren(expr);
        }
    }

    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        stmts.visit_mut_children_with(self);
        *stmts = squash_blocks(std::mem::take(stmts));
    }

    fn visit_mut_function(&mut self, function: &mut Function) {
        function.visit_mut_children_with(self);
        if let Some(body) = &mut function.body {
            splice_tail(&mut body.stmts);
        }
    }

    fn visit_mut_arrow_expr(&mut self, arrow: &mut ArrowExpr) {
        arrow.visit_mut_children_with(self);
        if let BlockStmtOrExpr::BlockStmt(body) = &mut *arrow.body {
            splice_tail(&mut body.stmts);
        }
    }
}

/// Splice `return IIFE;` at the end of `stmts`, and at the end of the
/// branches of a trailing `if`, where falling off the end is the same as
/// returning.
fn splice_tail(stmts: &mut Vec<Stmt>) {
    loop {
        match stmts.last_mut() {
            Some(Stmt::Return(ReturnStmt { arg: Some(arg), .. })) => match take_body(arg) {
                Some(body) => {
                    stmts.pop();
                    stmts.extend(body);
                }
                None => return,
            },
            Some(Stmt::If(s)) => {
                splice_branch(&mut s.cons);
                if let Some(alt) = &mut s.alt {
                    splice_branch(alt);
                }
                return;
            }
            _ => return,
        }
    }
}

fn splice_branch(branch: &mut Stmt) {
    if let Stmt::Block(block) = branch {
        splice_tail(&mut block.stmts);
    }
}

fn unparen_mut(expr: &mut Expr) -> &mut Expr {
    match expr {
        Expr::Paren(p) => unparen_mut(&mut p.expr),
        expr => expr,
    }
}

/// The function of an inlinable IIFE.
fn iife_function(expr: &mut Expr) -> Option<&mut Function> {
    let Expr::Call(call) = unparen_mut(expr) else {
        return None;
    };
    if !call.args.is_empty() {
        return None;
    }
    let Callee::Expr(callee) = &mut call.callee else {
        return None;
    };
    let Expr::Fn(FnExpr { ident: None, function }) = unparen_mut(callee) else {
        return None;
    };
    let plain = !function.is_async
        && !function.is_generator
        && function.params.is_empty()
        && function.body.as_ref().is_some_and(|b| !uses_context(&b.stmts));
    plain.then_some(&mut **function)
}

/// `x` out of `(function () { return x; })()`.
fn take_returned_value(expr: &mut Expr) -> Option<Expr> {
    let body = iife_function(expr)?.body.as_mut()?;
    let [Stmt::Return(ReturnStmt { arg: Some(arg), .. })] = &mut body.stmts[..] else {
        return None;
    };
    Some(std::mem::replace(&mut **arg, Expr::Invalid(Invalid { span: DUMMY_SP })))
}

/// The statements of an IIFE whose body may run in its caller's place.
fn take_body(expr: &mut Expr) -> Option<Vec<Stmt>> {
    let body = iife_function(expr)?.body.as_mut()?;
    if stmts_declare(&body.stmts) {
        return None;
    }
    Some(std::mem::take(&mut body.stmts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{compact, parse_stmts, print_stmts};

    fn inlined(source: &str) -> String {
        let mut stmts = parse_stmts(source);
        for stmt in &mut stmts {
            inline(stmt);
        }
        compact(&print_stmts(stmts))
    }

    #[test]
    fn single_return_iife_becomes_its_value() {
        assert_eq!(
            inlined("x = (function () { return a + b; })() * 2;"),
            compact("x = (a + b) * 2;")
        );
        assert_eq!(
            inlined("function f() { return g((function () { return a(); })()); }"),
            compact("function f() { return g(a()); }")
        );
    }

    #[test]
    fn tail_return_of_iife_is_spliced() {
        assert_eq!(
            inlined("function f() { return (function () { a(); return b; })(); }"),
            compact("function f() { a(); return b; }")
        );
    }

    #[test]
    fn tail_inside_trailing_if_is_spliced() {
        assert_eq!(
            inlined("function f() { if (a) { return (function () { b(); })(); } }"),
            compact("function f() { if (a) { b(); } }")
        );
    }

    #[test]
    fn iife_with_declarations_is_kept() {
        let source = "function f() { return (function () { var x = g(); h(x); })(); }";
        assert_eq!(inlined(source), compact(source));
    }

    #[test]
    fn iife_using_its_own_this_is_kept() {
        let source = "function f() { return (function () { return this; })(); }";
        assert_eq!(inlined(source), compact(source));
    }

    #[test]
    fn iife_with_arguments_is_kept() {
        let source = "function f() { return (function () { return 1; })(x); }";
        assert_eq!(inlined(source), compact(source));
    }

    #[test]
    fn bare_blocks_are_spliced() {
        assert_eq!(
            inlined("function f() { { a(); { b(); } } }"),
            compact("function f() { a(); b(); }")
        );
    }
}
