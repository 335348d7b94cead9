//! Preserve evaluation order across `await`.
//!
//! The chain builder evaluates every `await` operand in an earlier callback
//! than the expression around it. Operands that run before the awaiting one
//! in source order are therefore saved up front:
//! ```text
//! f(a(), b(), await c())   =>   _temp = [a(), b()]; f(_temp[0], _temp[1], await c());
//! ```
//! Only the operands left of the rightmost awaiting operand move. Literals
//! never do, and neither does a plain identifier callee.
//!
//! Operands that might not run at all (the right side of `&&`, `||` and
//! `??`, the branches of `?:`, the tail of a sequence) cannot be hoisted.
//! When one of them awaits, it becomes a sub-chain of its own and the whole
//! expression is awaited instead:
//! ```text
//! a && await b   =>   await (a && function () { return b; }())
//! ```

use swc_common::DUMMY_SP;
use swc_ecma_ast::*;
use swc_ecma_visit::{VisitMut, VisitMutWith};
use tracing::trace;

use crate::{
    build::*,
    chain::{build_chain, ChainMode},
    error::{Result, TransformError},
    transform::FnCx,
    walk::{block_stmts, contains_await, skip_nested_functions_mut},
};

/// Rewrite the expressions of `stmts` so no operand is evaluated out of
/// order once the awaits are split off.
pub(crate) fn hoist_exec_order(stmts: Vec<Stmt>, cx: &mut FnCx<'_>) -> Result<Vec<Stmt>> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        if !contains_await(&stmt) {
            out.push(stmt);
            continue;
        }
        match stmt {
            Stmt::Expr(mut s) => {
                order_expr(&mut s.expr, &mut out, cx)?;
                out.push(Stmt::Expr(s));
            }
            Stmt::Return(mut s) => {
                if let Some(arg) = &mut s.arg {
                    order_expr(arg, &mut out, cx)?;
                }
                out.push(Stmt::Return(s));
            }
            Stmt::Throw(mut s) => {
                order_expr(&mut s.arg, &mut out, cx)?;
                out.push(Stmt::Throw(s));
            }
            Stmt::If(mut s) => {
                order_expr(&mut s.test, &mut out, cx)?;
                let cons = hoist_exec_order(block_stmts(*s.cons), cx)?;
                let alt = s
                    .alt
                    .map(|alt| hoist_exec_order(block_stmts(*alt), cx))
                    .transpose()?;
                s.cons = Box::new(Stmt::Block(make_block(cons)));
                s.alt = alt.map(|alt| Box::new(Stmt::Block(make_block(alt))));
                out.push(Stmt::If(s));
            }
            Stmt::Try(mut t) => {
                t.block.stmts = hoist_exec_order(std::mem::take(&mut t.block.stmts), cx)?;
                if let Some(handler) = &mut t.handler {
                    handler.body.stmts =
                        hoist_exec_order(std::mem::take(&mut handler.body.stmts), cx)?;
                }
                if let Some(finalizer) = &mut t.finalizer {
                    finalizer.stmts = hoist_exec_order(std::mem::take(&mut finalizer.stmts), cx)?;
                }
                out.push(Stmt::Try(t));
            }
            Stmt::Block(b) => out.extend(hoist_exec_order(b.stmts, cx)?),
            stmt => out.push(stmt),
        }
    }
    Ok(out)
}

fn order_expr(expr: &mut Expr, prelude: &mut Vec<Stmt>, cx: &mut FnCx<'_>) -> Result<()> {
    let mut lazy = LazyOperands { cx, error: None };
    expr.visit_mut_with(&mut lazy);
    if let Some(err) = lazy.error {
        return Err(err);
    }
    OperandHoister { cx }.expr(expr, prelude);
    Ok(())
}

/// Turns awaiting lazy operands into sub-chains, innermost first.
struct LazyOperands<'a, 'o> {
    cx: &'a mut FnCx<'o>,
    error: Option<TransformError>,
}

impl LazyOperands<'_, '_> {
    fn sub_chain(&mut self, stmts: Vec<Stmt>) -> Result<Expr> {
        let stmts = hoist_exec_order(stmts, self.cx)?;
        build_chain(stmts, self.cx, ChainMode::INNER)
    }

    fn wrap(&mut self, expr: &mut Expr) -> Result<bool> {
        match expr {
            Expr::Bin(bin) if is_lazy(bin.op) && contains_await(&*bin.right) => {
                let right = take_expr(&mut bin.right);
                *bin.right = operand_of(bin.op, self.sub_chain(vec![make_return(Some(right))])?);
            }
            Expr::Cond(cond) if contains_await(&*cond.cons) || contains_await(&*cond.alt) => {
                for branch in [&mut cond.cons, &mut cond.alt] {
                    if contains_await(&**branch) {
                        let value = take_expr(branch);
                        let chain = self.sub_chain(vec![make_return(Some(value))])?;
                        **branch = *operand(chain, PREC_ASSIGN);
                    }
                }
            }
            Expr::Seq(seq) if seq.exprs.iter().any(|e| contains_await(&**e)) => {
                let mut exprs = std::mem::take(&mut seq.exprs);
                let last = exprs.pop().map(|e| unparen_owned(*e));
                let mut stmts: Vec<Stmt> = exprs
                    .into_iter()
                    .map(|e| make_expr_stmt(unparen_owned(*e)))
                    .collect();
                stmts.push(make_return(last));
                *expr = self.sub_chain(stmts)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl VisitMut for LazyOperands<'_, '_> {
    skip_nested_functions_mut!();

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        if self.error.is_some() || !contains_await(&*expr) {
            return;
        }
        expr.visit_mut_children_with(self);
        match self.wrap(expr) {
            Ok(true) => {
                trace!("awaiting lazily evaluated operand");
                let inner = take(expr);
                *expr = make_await(inner);
            }
            Ok(false) => {}
            Err(err) => self.error = Some(err),
        }
    }
}

fn is_lazy(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::LogicalAnd | BinaryOp::LogicalOr | BinaryOp::NullishCoalescing
    )
}

/// Right operand of `op`, parenthesized when it binds looser.
fn operand_of(op: BinaryOp, expr: Expr) -> Expr {
    let Expr::Bin(bin) = make_bin(op, make_null(), expr) else {
        return make_null();
    };
    *bin.right
}

fn take(expr: &mut Expr) -> Expr {
    std::mem::replace(expr, Expr::Invalid(Invalid { span: DUMMY_SP }))
}

fn take_expr(expr: &mut Box<Expr>) -> Expr {
    unparen_owned(take(expr))
}

/// One eagerly evaluated child expression.
struct Operand<'a> {
    expr: &'a mut Expr,
    /// A callee that is not a member expression: replacing it by
    /// `_temp[i]` would call it with `_temp` as `this`.
    bare_callee: bool,
}

impl<'a> Operand<'a> {
    fn new(expr: &'a mut Expr) -> Self {
        Self {
            expr,
            bare_callee: false,
        }
    }

    fn callee(expr: &'a mut Expr) -> Self {
        Self {
            expr,
            bare_callee: true,
        }
    }

    fn hoistable(&self) -> bool {
        !matches!(unparen(self.expr), Expr::Lit(_))
    }
}

/// Children of `expr` that are always evaluated, in evaluation order.
fn operands(expr: &mut Expr) -> Vec<Operand<'_>> {
    let mut out = vec![];
    match expr {
        Expr::Bin(bin) => {
            out.push(Operand::new(&mut bin.left));
            if !is_lazy(bin.op) {
                out.push(Operand::new(&mut bin.right));
            }
        }
        Expr::Array(array) => {
            for elem in array.elems.iter_mut().flatten() {
                out.push(Operand::new(&mut elem.expr));
            }
        }
        Expr::Call(call) => {
            if let Callee::Expr(callee) = &mut call.callee {
                match &mut **callee {
                    Expr::Member(member) => member_operands(member, &mut out),
                    Expr::Ident(_) => {}
                    callee => out.push(Operand::callee(callee)),
                }
            }
            for arg in &mut call.args {
                out.push(Operand::new(&mut arg.expr));
            }
        }
        Expr::New(new) => {
            if !matches!(*new.callee, Expr::Ident(_)) {
                out.push(Operand::new(&mut new.callee));
            }
            for arg in new.args.iter_mut().flatten() {
                out.push(Operand::new(&mut arg.expr));
            }
        }
        Expr::Object(object) => {
            for prop in &mut object.props {
                if let PropOrSpread::Prop(prop) = prop {
                    if let Prop::Shorthand(ident) = &**prop {
                        let key = PropName::Ident(IdentName::new(ident.sym.clone(), ident.span));
                        let value = Box::new(Expr::Ident(ident.clone()));
                        **prop = Prop::KeyValue(KeyValueProp { key, value });
                    }
                }
                match prop {
                    PropOrSpread::Spread(spread) => out.push(Operand::new(&mut spread.expr)),
                    PropOrSpread::Prop(prop) => {
                        if let Prop::KeyValue(kv) = &mut **prop {
                            if let PropName::Computed(key) = &mut kv.key {
                                out.push(Operand::new(&mut key.expr));
                            }
                            out.push(Operand::new(&mut kv.value));
                        }
                    }
                }
            }
        }
        Expr::Tpl(tpl) => {
            for e in &mut tpl.exprs {
                out.push(Operand::new(e));
            }
        }
        Expr::TaggedTpl(tagged) => {
            match &mut *tagged.tag {
                Expr::Member(member) => member_operands(member, &mut out),
                Expr::Ident(_) => {}
                tag => out.push(Operand::callee(tag)),
            }
            for e in &mut tagged.tpl.exprs {
                out.push(Operand::new(e));
            }
        }
        Expr::Member(member) => member_operands(member, &mut out),
        Expr::Assign(assign) => {
            if let AssignTarget::Simple(SimpleAssignTarget::Member(member)) = &mut assign.left {
                member_operands(member, &mut out);
            }
            out.push(Operand::new(&mut assign.right));
        }
        Expr::Cond(cond) => out.push(Operand::new(&mut cond.test)),
        Expr::Seq(seq) => {
            for e in &mut seq.exprs {
                out.push(Operand::new(e));
            }
        }
        Expr::Unary(unary) => out.push(Operand::new(&mut unary.arg)),
        Expr::Await(await_expr) => out.push(Operand::new(&mut await_expr.arg)),
        Expr::Paren(paren) => out.push(Operand::new(&mut paren.expr)),
        Expr::TsAs(e) => out.push(Operand::new(&mut e.expr)),
        Expr::TsNonNull(e) => out.push(Operand::new(&mut e.expr)),
        Expr::TsTypeAssertion(e) => out.push(Operand::new(&mut e.expr)),
        Expr::TsSatisfies(e) => out.push(Operand::new(&mut e.expr)),
        _ => {}
    }
    out
}

fn member_operands<'a>(member: &'a mut MemberExpr, out: &mut Vec<Operand<'a>>) {
    out.push(Operand::new(&mut member.obj));
    if let MemberProp::Computed(prop) = &mut member.prop {
        out.push(Operand::new(&mut prop.expr));
    }
}

/// `x op= value` with an awaiting value reads `x` first; spell the read out
/// so it can be saved like any other operand.
fn expand_op_assign(expr: &mut Expr) {
    let Expr::Assign(assign) = expr else { return };
    let Some(op) = assign.op.to_update() else { return };
    if is_lazy(op) || !contains_await(&*assign.right) {
        return;
    }
    let AssignTarget::Simple(SimpleAssignTarget::Ident(target)) = &assign.left else {
        return;
    };
    let target = target.id.clone();
    let value = take_expr(&mut assign.right);
    *expr = make_assign(&target, make_bin(op, ident_expr(&target), value));
}

struct OperandHoister<'a, 'o> {
    cx: &'a mut FnCx<'o>,
}

impl OperandHoister<'_, '_> {
    fn expr(&mut self, expr: &mut Expr, prelude: &mut Vec<Stmt>) {
        if !contains_await(&*expr) {
            return;
        }
        expand_op_assign(expr);
        let mut operands = operands(expr);
        let last = operands.iter().rposition(|op| contains_await(&*op.expr));

        let mut hoisted = vec![];
        if let Some(last) = last {
            let mut pending: Vec<usize> = vec![];
            for i in 0..last {
                if !operands[i].hoistable() {
                    continue;
                }
                let mark = prelude.len();
                self.expr(operands[i].expr, prelude);
                // Saves made while processing this operand run before it; the
                // operands queued so far must be evaluated ahead of them.
                if prelude.len() > mark && !pending.is_empty() {
                    let save = self.save(&pending, &mut operands);
                    prelude.insert(mark, save);
                    pending.clear();
                }
                pending.push(i);
                hoisted.push(i);
            }
            if !pending.is_empty() {
                let save = self.save(&pending, &mut operands);
                prelude.push(save);
            }
        }

        for (i, op) in operands.into_iter().enumerate() {
            if !hoisted.contains(&i) {
                self.expr(op.expr, prelude);
            }
        }
    }

    /// Move the operands at `indices` into a fresh `_temp` and return the
    /// assignment that fills it.
    fn save(&mut self, indices: &[usize], operands: &mut [Operand<'_>]) -> Stmt {
        let temp = self.cx.scope.generate_uid("temp");
        self.cx.scope.declare(&temp);
        trace!(temp = %temp.sym, operands = indices.len(), "saving operands");

        if let [i] = indices {
            let value = unparen_owned(take(operands[*i].expr));
            *operands[*i].expr = ident_expr(&temp);
            return make_assign_stmt(&temp, value);
        }

        let mut values = Vec::with_capacity(indices.len());
        for (j, &i) in indices.iter().enumerate() {
            let op = &mut operands[i];
            values.push(unparen_owned(take(op.expr)));
            *op.expr = if op.bare_callee {
                paren(Expr::Seq(SeqExpr {
                    span: DUMMY_SP,
                    exprs: vec![Box::new(make_num(0.0)), Box::new(make_index(&temp, j))],
                }))
            } else {
                make_index(&temp, j)
            };
        }
        make_assign_stmt(&temp, make_array(values))
    }
}
