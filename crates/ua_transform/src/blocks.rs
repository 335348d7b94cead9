//! Brace every control body of an async function.
//!
//! Later passes splice statements in and out of branch and loop bodies;
//! giving every one of them a block up front means they only ever deal with
//! statement lists. `else if` becomes `else { if ... }`.

use swc_common::DUMMY_SP;
use swc_ecma_ast::*;
use swc_ecma_visit::{VisitMut, VisitMutWith};

use crate::walk::{ensure_block, skip_nested_functions_mut};

struct BlockNormalizer;

impl VisitMut for BlockNormalizer {
    skip_nested_functions_mut!();

    fn visit_mut_stmt(&mut self, stmt: &mut Stmt) {
        stmt.visit_mut_children_with(self);

        match stmt {
            Stmt::If(s) => {
                ensure_block(&mut s.cons);
                if let Some(alt) = &mut s.alt {
                    ensure_block(alt);
                }
            }
            Stmt::While(s) => ensure_block(&mut s.body),
            Stmt::DoWhile(s) => ensure_block(&mut s.body),
            Stmt::For(s) => ensure_block(&mut s.body),
            Stmt::ForIn(s) => ensure_block(&mut s.body),
            Stmt::ForOf(s) => ensure_block(&mut s.body),
            _ => {}
        }
    }
}

/// Brace every branch and loop body in `stmts`, not entering nested
/// functions.
pub(crate) fn normalize_blocks(stmts: &mut [Stmt]) {
    for stmt in stmts {
        stmt.visit_mut_with(&mut BlockNormalizer);
    }
}

/// Turn an expression-bodied arrow into `{ return expr; }`.
pub(crate) fn arrow_body_to_block(body: &mut Box<BlockStmtOrExpr>) {
    if let BlockStmtOrExpr::Expr(expr) = &mut **body {
        let expr = std::mem::replace(&mut **expr, Expr::Invalid(Invalid { span: DUMMY_SP }));
        **body = BlockStmtOrExpr::BlockStmt(crate::build::make_block(vec![
            crate::build::make_return(Some(expr)),
        ]));
    }
}
