//! Move `try` statements that `return` into awaited IIFEs.
//!
//! A `return` inside a protected block cannot be expressed by the chain a
//! `try` turns into: the `.catch` / `.then` pair after it would still run.
//! The statement is wrapped so its returns only record the result:
//! ```text
//! _returned = false;
//! await (function () { try { ...; _result = x; _returned = true; return; ... } })();
//! if (_returned) { return _result; }
//! ```

use swc_ecma_ast::*;
use swc_ecma_visit::{VisitMut, VisitMutWith};
use tracing::trace;

use crate::{
    build::*,
    error::Result,
    transform::{rewrite_generated, FnCx},
    walk::{block_stmts, contains_return, skip_nested_functions_mut},
};

/// Wrap every `try` in `stmts` that contains a `return`.
pub(crate) fn capture_try_returns(stmts: Vec<Stmt>, cx: &mut FnCx<'_>) -> Result<Vec<Stmt>> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt {
            Stmt::Try(t) if contains_return(&t) => {
                out.extend(capture(*t, cx)?);
            }
            Stmt::If(s) => {
                let cons = capture_try_returns(block_stmts(*s.cons), cx)?;
                let alt = s
                    .alt
                    .map(|alt| capture_try_returns(block_stmts(*alt), cx))
                    .transpose()?;
                out.push(Stmt::If(IfStmt {
                    cons: Box::new(Stmt::Block(make_block(cons))),
                    alt: alt.map(|alt| Box::new(Stmt::Block(make_block(alt)))),
                    ..s
                }));
            }
            Stmt::Block(b) => out.push(Stmt::Block(BlockStmt {
                stmts: capture_try_returns(b.stmts, cx)?,
                ..b
            })),
            Stmt::Labeled(l) => {
                let body = capture_try_returns(vec![*l.body], cx)?;
                out.push(relabel(l.span, l.label, body));
            }
            stmt => out.push(stmt),
        }
    }
    Ok(out)
}

fn capture(mut t: TryStmt, cx: &mut FnCx<'_>) -> Result<Vec<Stmt>> {
    let returned = cx.scope.generate_uid("returned");
    let result = cx.scope.generate_uid("result");
    cx.scope.declare(&returned);
    cx.scope.declare(&result);
    trace!(flag = %returned.sym, "capturing returns of try statement");

    // Inner `try` statements go first. Afterwards every `return` left in `t`
    // leaves the wrapper as a whole.
    t.block.stmts = capture_try_returns(std::mem::take(&mut t.block.stmts), cx)?;
    if let Some(handler) = &mut t.handler {
        handler.body.stmts = capture_try_returns(std::mem::take(&mut handler.body.stmts), cx)?;
    }
    if let Some(finalizer) = &mut t.finalizer {
        finalizer.stmts = capture_try_returns(std::mem::take(&mut finalizer.stmts), cx)?;
    }

    let mut stmt = Stmt::Try(Box::new(t));
    stmt.visit_mut_with(&mut ReturnCapture {
        returned: &returned,
        result: &result,
    });

    let function = rewrite_generated(vec![stmt], cx.opts, "try", true)?;
    let call = make_call(
        Expr::Fn(FnExpr {
            ident: None,
            function,
        }),
        vec![],
    );

    Ok(vec![
        make_assign_stmt(&returned, make_bool(false)),
        make_expr_stmt(make_await(call)),
        make_if(
            ident_expr(&returned),
            vec![make_return(Some(ident_expr(&result)))],
            None,
        ),
    ])
}

struct ReturnCapture<'a> {
    returned: &'a Ident,
    result: &'a Ident,
}

impl ReturnCapture<'_> {
    fn capture(&self, arg: Option<Box<Expr>>) -> Vec<Stmt> {
        let value = arg.map(|arg| *arg).unwrap_or_else(make_undefined);
        vec![
            make_assign_stmt(self.result, value),
            make_assign_stmt(self.returned, make_bool(true)),
            make_return(None),
        ]
    }
}

impl VisitMut for ReturnCapture<'_> {
    skip_nested_functions_mut!();

    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        let old = std::mem::take(stmts);
        for mut stmt in old {
            match stmt {
                Stmt::Return(ret) => stmts.extend(self.capture(ret.arg)),
                _ => {
                    stmt.visit_mut_with(self);
                    stmts.push(stmt);
                }
            }
        }
    }

    fn visit_mut_stmt(&mut self, stmt: &mut Stmt) {
        if let Stmt::Return(ret) = stmt {
            let captured = self.capture(ret.arg.take());
            *stmt = Stmt::Block(make_block(captured));
        } else {
            stmt.visit_mut_children_with(self);
        }
    }
}
