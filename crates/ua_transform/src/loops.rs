//! Turn loops that suspend or return into self-calling functions.
//!
//! ```text
//! while (test) { body }
//! ```
//! becomes a hoisted
//! ```text
//! function _recursive() { if (test) { body; return await _recursive(); } }
//! ```
//! and `await _recursive();` where the loop was. `break` returns out of the
//! loop function, `continue` returns the next iteration.
//!
//! When the body can leave the enclosing function (a `return`, or a labeled
//! jump to an enclosing loop) the loop function runs in sentinel mode: it
//! returns its own identity when it finishes normally, and the call site
//! forwards any other value as the enclosing function's result:
//! ```text
//! _result = await _recursive();
//! if (_result !== _recursive) { return _result; }
//! ```
//! Loops are wrapped innermost first; by the time an outer loop is wrapped
//! its inner loops are already calls plus result checks, so their exits show
//! up as ordinary `return`s. Names are drawn outermost first: the outer loop
//! is `_recursive`, the loop inside it `_recursive2`. An inner loop function
//! is declared inside the outer one so it sees the outer body's bindings.

use swc_common::DUMMY_SP;
use swc_ecma_ast::*;
use swc_ecma_visit::{VisitMut, VisitMutWith};
use tracing::trace;

use crate::{
    build::*,
    error::Result,
    hoist::assign_pat,
    transform::{rewrite_generated, FnCx},
    walk::{block_stmts, skip_nested_functions_mut, suspends_or_exits, stmts_contain_return},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopKind {
    While,
    DoWhile,
    For,
    ForIn,
    ForOf,
}

/// An awaiting loop being rewritten, visible to the loops nested in it.
#[derive(Debug, Clone)]
struct LoopFrame {
    func: Ident,
    label: Option<String>,
    kind: LoopKind,
    update: Option<Box<Expr>>,
    test: Option<Box<Expr>>,
    sentinel: bool,
}

impl LoopFrame {
    fn call(&self) -> Expr {
        make_await(make_call(ident_expr(&self.func), vec![]))
    }

    /// Statements that start the next iteration from inside the body.
    ///
    /// `exit` is returned when a `do-while` test fails.
    fn next_iteration(&self, exit: Option<Expr>) -> Vec<Stmt> {
        match self.kind {
            LoopKind::For => {
                let mut stmts = vec![];
                if let Some(update) = &self.update {
                    stmts.push(make_expr_stmt((**update).clone()));
                }
                stmts.push(make_return(Some(self.call())));
                stmts
            }
            LoopKind::DoWhile => {
                let test = self.test.as_deref().cloned().unwrap_or_else(|| make_bool(true));
                vec![
                    make_if(test, vec![make_return(Some(self.call()))], None),
                    make_return(exit),
                ]
            }
            LoopKind::While | LoopKind::ForIn | LoopKind::ForOf => {
                vec![make_return(Some(self.call()))]
            }
        }
    }

    /// What the loop function returns when it leaves through its own exit.
    fn exit_value(&self) -> Option<Expr> {
        self.sentinel.then(|| ident_expr(&self.func))
    }
}

/// Rewrite every loop in `stmts` that contains an `await` or a `return`.
pub(crate) fn recursify_loops(stmts: Vec<Stmt>, cx: &mut FnCx<'_>) -> Result<Vec<Stmt>> {
    LoopRecursifier { cx, frames: vec![] }.stmts(stmts)
}

struct LoopRecursifier<'a, 'o> {
    cx: &'a mut FnCx<'o>,
    frames: Vec<LoopFrame>,
}

fn is_loop(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::While(_) | Stmt::DoWhile(_) | Stmt::For(_) | Stmt::ForIn(_) | Stmt::ForOf(_)
    )
}

impl LoopRecursifier<'_, '_> {
    fn stmts(&mut self, stmts: Vec<Stmt>) -> Result<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            out.extend(self.stmt(stmt)?);
        }
        Ok(out)
    }

    fn block(&mut self, stmt: Box<Stmt>) -> Result<Box<Stmt>> {
        let stmts = self.stmts(block_stmts(*stmt))?;
        Ok(Box::new(Stmt::Block(make_block(stmts))))
    }

    fn stmt(&mut self, stmt: Stmt) -> Result<Vec<Stmt>> {
        match stmt {
            Stmt::Labeled(labeled) if is_loop(&labeled.body) => {
                if !suspends_or_exits(&labeled.body) {
                    return Ok(vec![Stmt::Labeled(labeled)]);
                }
                self.recursify(Some(labeled.label.sym.to_string()), *labeled.body)
            }
            stmt if is_loop(&stmt) => {
                if !suspends_or_exits(&stmt) {
                    return Ok(vec![stmt]);
                }
                self.recursify(None, stmt)
            }
            Stmt::Labeled(labeled) => {
                let body = self.stmt(*labeled.body)?;
                Ok(vec![relabel(labeled.span, labeled.label, body)])
            }
            Stmt::Block(block) => Ok(vec![Stmt::Block(BlockStmt {
                stmts: self.stmts(block.stmts)?,
                ..block
            })]),
            Stmt::If(s) => {
                let cons = self.block(s.cons)?;
                let alt = s.alt.map(|alt| self.block(alt)).transpose()?;
                Ok(vec![Stmt::If(IfStmt { cons, alt, ..s })])
            }
            Stmt::Switch(mut s) => {
                for case in &mut s.cases {
                    case.cons = self.stmts(std::mem::take(&mut case.cons))?;
                }
                Ok(vec![Stmt::Switch(s)])
            }
            Stmt::Try(mut t) => {
                t.block.stmts = self.stmts(std::mem::take(&mut t.block.stmts))?;
                if let Some(handler) = &mut t.handler {
                    handler.body.stmts = self.stmts(std::mem::take(&mut handler.body.stmts))?;
                }
                if let Some(finalizer) = &mut t.finalizer {
                    finalizer.stmts = self.stmts(std::mem::take(&mut finalizer.stmts))?;
                }
                Ok(vec![Stmt::Try(t)])
            }
            stmt => Ok(vec![stmt]),
        }
    }

    fn recursify(&mut self, label: Option<String>, stmt: Stmt) -> Result<Vec<Stmt>> {
        if let Stmt::ForOf(ForOfStmt { is_await: true, .. }) = &stmt {
            self.cx.unsupported("`for await` loop")?;
            return Ok(vec![stmt]);
        }

        let func = self.cx.scope.generate_uid("recursive");
        trace!(func = %func.sym, label = ?label, "recursifying loop");

        let mut prelude = vec![];
        let (kind, test, update, body) = match stmt {
            Stmt::While(w) => (LoopKind::While, Some(w.test), None, block_stmts(*w.body)),
            Stmt::DoWhile(d) => (LoopKind::DoWhile, Some(d.test), None, block_stmts(*d.body)),
            Stmt::For(f) => {
                match f.init {
                    Some(VarDeclOrExpr::Expr(init)) => prelude.push(make_expr_stmt(*init)),
                    Some(VarDeclOrExpr::VarDecl(decl)) => prelude.push(Stmt::Decl(Decl::Var(decl))),
                    None => {}
                }
                (LoopKind::For, f.test, f.update, block_stmts(*f.body))
            }
            Stmt::ForIn(f) => {
                let (test, body) = self.enumerate_keys(f, &mut prelude)?;
                (LoopKind::ForIn, Some(Box::new(test)), None, body)
            }
            Stmt::ForOf(f) => {
                let (test, body) = self.iterate_values(f, &mut prelude)?;
                (LoopKind::ForOf, Some(Box::new(test)), None, body)
            }
            stmt => {
                return Err(crate::error::TransformError::malformed(format!(
                    "not a loop: {stmt:?}"
                )))
            }
        };

        self.frames.push(LoopFrame {
            func: func.clone(),
            label,
            kind,
            update: update.clone(),
            test: if kind == LoopKind::DoWhile { test.clone() } else { None },
            sentinel: false,
        });
        let body = self.stmts(body);
        let mut frame = self
            .frames
            .pop()
            .ok_or_else(|| crate::error::TransformError::malformed("loop frame stack underflow"))?;
        let mut body = body?;

        let outward = {
            let mut finder = JumpRewriter::new(&self.frames, &frame, true);
            for stmt in &mut body {
                stmt.visit_mut_with(&mut finder);
            }
            finder.outward
        };
        frame.sentinel = outward || stmts_contain_return(&body);

        let mut rewriter = JumpRewriter::new(&self.frames, &frame, false);
        rewriter.visit_mut_stmts(&mut body);
        for label in rewriter.unknown {
            self.cx
                .unsupported(&format!("jump to label `{label}` out of an awaiting loop"))?;
        }

        let mut fn_body = match kind {
            LoopKind::DoWhile => {
                let mut stmts = body;
                if let Some(test) = test {
                    stmts.push(make_if(*test, vec![make_return(Some(frame.call()))], None));
                }
                stmts
            }
            _ => {
                let mut inner = body;
                if let Some(update) = update {
                    inner.push(make_expr_stmt(*update));
                }
                inner.push(make_return(Some(frame.call())));
                match test {
                    Some(test) => vec![make_if(*test, inner, None)],
                    None => inner,
                }
            }
        };
        if frame.sentinel {
            fn_body.push(make_return(frame.exit_value()));
        }

        let function = rewrite_generated(fn_body, self.cx.opts, &func.sym, false)?;
        let decl = make_fn_decl(&func, function);

        let mut out = vec![];
        // A loop nested in another awaiting loop is declared inside that
        // loop's function, where the outer body's bindings live.
        if self.frames.is_empty() {
            self.cx.scope.declare_fn(decl);
        } else {
            out.push(decl);
        }
        out.extend(prelude);
        if frame.sentinel {
            let result = self.cx.scope.generate_uid("result");
            self.cx.scope.declare(&result);
            out.push(make_assign_stmt(&result, frame.call()));
            out.push(make_if(
                make_bin(BinaryOp::NotEqEq, ident_expr(&result), ident_expr(&func)),
                vec![make_return(Some(ident_expr(&result)))],
                None,
            ));
        } else {
            out.push(make_expr_stmt(frame.call()));
        }
        Ok(out)
    }

    /// `for (left in right)` walks a snapshot of the keys, skipping keys
    /// deleted while the loop runs:
    /// ```text
    /// _obj = right; _keys = [];
    /// for (_key in _obj) { _keys.push(_key); }
    /// _keys.reverse();
    /// while (_keys.length) { _key = _keys.pop(); if (_key in _obj) { left = _key; body } }
    /// ```
    fn enumerate_keys(&mut self, f: ForInStmt, prelude: &mut Vec<Stmt>) -> Result<(Expr, Vec<Stmt>)> {
        let obj = self.cx.scope.generate_uid("obj");
        let keys = self.cx.scope.generate_uid("keys");
        let key = self.cx.scope.generate_uid("key");
        for id in [&obj, &keys, &key] {
            self.cx.scope.declare(id);
        }

        prelude.push(make_assign_stmt(&obj, *f.right));
        prelude.push(make_assign_stmt(&keys, make_array(vec![])));
        prelude.push(Stmt::ForIn(ForInStmt {
            span: DUMMY_SP,
            left: ForHead::Pat(Box::new(binding(&key))),
            right: Box::new(ident_expr(&obj)),
            body: Box::new(Stmt::Block(make_block(vec![make_expr_stmt(make_method_call(
                ident_expr(&keys),
                "push",
                vec![ident_expr(&key)],
            ))]))),
        }));
        prelude.push(make_expr_stmt(make_method_call(ident_expr(&keys), "reverse", vec![])));

        let mut guarded = self.bind_head(f.left, ident_expr(&key))?;
        guarded.extend(block_stmts(*f.body));
        let body = vec![
            make_assign_stmt(&key, make_method_call(ident_expr(&keys), "pop", vec![])),
            make_if(
                make_bin(BinaryOp::In, ident_expr(&key), ident_expr(&obj)),
                guarded,
                None,
            ),
        ];
        Ok((make_member(ident_expr(&keys), "length"), body))
    }

    /// `for (left of right)` drives the iterator protocol by hand:
    /// ```text
    /// _iterator = right[Symbol.iterator]();
    /// while (!(_step = _iterator.next()).done) { left = _step.value; body }
    /// ```
    fn iterate_values(&mut self, f: ForOfStmt, prelude: &mut Vec<Stmt>) -> Result<(Expr, Vec<Stmt>)> {
        let iterator = self.cx.scope.generate_uid("iterator");
        let step = self.cx.scope.generate_uid("step");
        self.cx.scope.declare(&iterator);
        self.cx.scope.declare(&step);

        let symbol_iterator = make_member(ident_expr(&make_ident("Symbol")), "iterator");
        prelude.push(make_assign_stmt(
            &iterator,
            make_call(make_computed(*f.right, symbol_iterator), vec![]),
        ));

        let next = make_assign(&step, make_method_call(ident_expr(&iterator), "next", vec![]));
        let test = make_not(make_member(next, "done"));

        let mut body = self.bind_head(f.left, make_member(ident_expr(&step), "value"))?;
        body.extend(block_stmts(*f.body));
        Ok((test, body))
    }

    /// Bind the loop variable at the start of the body. A `let` or `const`
    /// head stays a declaration, which the loop function turns into a fresh
    /// local per iteration.
    fn bind_head(&mut self, head: ForHead, value: Expr) -> Result<Vec<Stmt>> {
        let pat = match head {
            ForHead::Pat(pat) => *pat,
            ForHead::VarDecl(mut decl) if decl.decls.len() == 1 && decl.kind != VarDeclKind::Var => {
                decl.decls[0].init = Some(Box::new(value));
                return Ok(vec![Stmt::Decl(Decl::Var(decl))]);
            }
            ForHead::VarDecl(mut decl) if decl.decls.len() == 1 => decl.decls.remove(0).name,
            _ => {
                self.cx.unsupported("loop head declaration")?;
                return Ok(vec![]);
            }
        };
        match assign_pat(pat, value) {
            Some(assign) => Ok(vec![make_expr_stmt(assign)]),
            None => {
                self.cx.unsupported("loop head pattern")?;
                Ok(vec![])
            }
        }
    }
}

/// Rewrites `break` / `continue` of one loop body into returns.
///
/// With `dry_run` nothing is rewritten; the visitor only records whether a
/// labeled jump targets an enclosing loop.
struct JumpRewriter<'f> {
    enclosing: &'f [LoopFrame],
    own: &'f LoopFrame,
    dry_run: bool,
    loop_depth: usize,
    switch_depth: usize,
    inner_labels: Vec<String>,
    outward: bool,
    unknown: Vec<String>,
}

enum Jump<'f> {
    OwnBreak,
    OwnContinue,
    OuterBreak(&'f LoopFrame),
    OuterContinue(&'f LoopFrame),
}

impl<'f> JumpRewriter<'f> {
    fn new(enclosing: &'f [LoopFrame], own: &'f LoopFrame, dry_run: bool) -> Self {
        Self {
            enclosing,
            own,
            dry_run,
            loop_depth: 0,
            switch_depth: 0,
            inner_labels: vec![],
            outward: false,
            unknown: vec![],
        }
    }

    fn classify(&mut self, stmt: &Stmt) -> Option<Jump<'f>> {
        let (label, is_break) = match stmt {
            Stmt::Break(b) => (b.label.as_ref(), true),
            Stmt::Continue(c) => (c.label.as_ref(), false),
            _ => return None,
        };
        let Some(label) = label else {
            return match is_break {
                true if self.loop_depth == 0 && self.switch_depth == 0 => Some(Jump::OwnBreak),
                false if self.loop_depth == 0 => Some(Jump::OwnContinue),
                _ => None,
            };
        };

        let label = label.sym.to_string();
        if self.inner_labels.contains(&label) {
            return None;
        }
        if self.own.label.as_ref() == Some(&label) {
            return Some(if is_break { Jump::OwnBreak } else { Jump::OwnContinue });
        }
        let own: &'f [LoopFrame] = self.enclosing;
        match own.iter().rev().find(|f| f.label.as_ref() == Some(&label)) {
            Some(frame) => {
                self.outward = true;
                Some(if is_break {
                    Jump::OuterBreak(frame)
                } else {
                    Jump::OuterContinue(frame)
                })
            }
            None => {
                if !self.unknown.contains(&label) {
                    self.unknown.push(label);
                }
                None
            }
        }
    }

    fn replacement(&mut self, stmt: &Stmt) -> Option<Vec<Stmt>> {
        let jump = self.classify(stmt)?;
        if self.dry_run {
            return None;
        }
        Some(match jump {
            Jump::OwnBreak => vec![make_return(self.own.exit_value())],
            Jump::OwnContinue => self.own.next_iteration(self.own.exit_value()),
            Jump::OuterBreak(frame) => vec![make_return(Some(ident_expr(&frame.func)))],
            Jump::OuterContinue(frame) => {
                frame.next_iteration(Some(ident_expr(&frame.func)))
            }
        })
    }

    fn nested<N: VisitMutWith<Self>>(&mut self, node: &mut N, is_loop: bool) {
        if is_loop {
            self.loop_depth += 1;
        } else {
            self.switch_depth += 1;
        }
        node.visit_mut_children_with(self);
        if is_loop {
            self.loop_depth -= 1;
        } else {
            self.switch_depth -= 1;
        }
    }
}

impl VisitMut for JumpRewriter<'_> {
    skip_nested_functions_mut!();

    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        let old = std::mem::take(stmts);
        for mut stmt in old {
            match self.replacement(&stmt) {
                Some(replacement) => stmts.extend(replacement),
                None => {
                    stmt.visit_mut_with(self);
                    stmts.push(stmt);
                }
            }
        }
    }

    fn visit_mut_stmt(&mut self, stmt: &mut Stmt) {
        match self.replacement(stmt) {
            Some(mut replacement) if replacement.len() == 1 => {
                if let Some(single) = replacement.pop() {
                    *stmt = single;
                }
            }
            Some(replacement) => *stmt = Stmt::Block(make_block(replacement)),
            None => stmt.visit_mut_children_with(self),
        }
    }

    fn visit_mut_labeled_stmt(&mut self, node: &mut LabeledStmt) {
        self.inner_labels.push(node.label.sym.to_string());
        node.visit_mut_children_with(self);
        self.inner_labels.pop();
    }

    fn visit_mut_while_stmt(&mut self, node: &mut WhileStmt) {
        self.nested(node, true);
    }

    fn visit_mut_do_while_stmt(&mut self, node: &mut DoWhileStmt) {
        self.nested(node, true);
    }

    fn visit_mut_for_stmt(&mut self, node: &mut ForStmt) {
        self.nested(node, true);
    }

    fn visit_mut_for_in_stmt(&mut self, node: &mut ForInStmt) {
        self.nested(node, true);
    }

    fn visit_mut_for_of_stmt(&mut self, node: &mut ForOfStmt) {
        self.nested(node, true);
    }

    fn visit_mut_switch_stmt(&mut self, node: &mut SwitchStmt) {
        self.nested(node, false);
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{assert_output_contains, assert_transforms_to, compact, transform};

    #[test]
    fn while_loop_becomes_recursive_function() {
        assert_transforms_to(
            "async function test() { while (a) { await b(); } c(); }",
            "function test() {
                function _recursive() {
                    if (a) {
                        return Promise.resolve().then(function () {
                            return b();
                        }).then(function () {
                            return _recursive();
                        });
                    }
                }
                return Promise.resolve().then(function () {
                    return _recursive();
                }).then(function () {
                    c();
                });
            }",
        );
    }

    #[test]
    fn for_loop_runs_update_before_repeating() {
        assert_output_contains(
            "async function test() { for (var i = 0; i < 3; i++) { await b(i); } }",
            "return b(i); }).then(function () { i++; return _recursive(); });",
        );
        assert_output_contains(
            "async function test() { for (var i = 0; i < 3; i++) { await b(i); } }",
            "var i; return Promise.resolve().then(function () { i = 0; return _recursive(); }).then(function () {});",
        );
    }

    #[test]
    fn do_while_runs_body_before_test() {
        assert_output_contains(
            "async function test() { do { await b(); } while (a); }",
            "function _recursive() { return Promise.resolve().then(function () { return b(); }).then(function () { if (a) { return _recursive(); } }); }",
        );
    }

    #[test]
    fn continue_in_for_loop_runs_update() {
        assert_output_contains(
            "async function test() { for (i = 0; i < 3; i++) { if (await f(i)) { continue; } g(i); } }",
            "if (_resp) { i++; return _recursive(); }",
        );
    }

    #[test]
    fn return_inside_loop_uses_sentinel() {
        let out = compact(&transform(
            "async function test() { while (a) { if (await b()) { return 1; } } return 2; }",
        ));
        assert!(out.contains("_result=_resp"), "{out}");
        assert!(out.contains("if(_result!==_recursive){return_result;}"), "{out}");
        assert!(out.contains("return_recursive;"), "{out}");
    }

    #[test]
    fn labeled_break_returns_outer_identity() {
        let out = compact(&transform(
            "async function test() {
                outer: while (a) {
                    while (b) {
                        await c();
                        break outer;
                    }
                }
            }",
        ));
        // The outer loop draws its name first; the inner loop's result is
        // checked against the inner function, the outer one's against the
        // outer function.
        assert!(out.contains("return_recursive;"), "{out}");
        assert!(out.contains("if(_result!==_recursive2){return_result;}"), "{out}");
        assert!(out.contains("if(_result2!==_recursive){return_result2;}"), "{out}");
    }

    #[test]
    fn inner_loop_function_lives_in_the_outer_one() {
        let out = compact(&transform(
            "async function test() {
                while (a) {
                    let x = f();
                    while (b) { await g(x); }
                }
            }",
        ));
        assert!(out.contains("function_recursive(){function_recursive2(){"), "{out}");
        assert!(out.contains("varx;"), "{out}");
    }

    #[test]
    fn labeled_loop_without_await_keeps_its_label() {
        let out = compact(&transform(
            "async function test() {
                await a();
                outer: while (x) { while (y) { x = g(); continue outer; } }
            }",
        ));
        assert!(out.contains("outer:while(x){while(y){x=g();continueouter;}}"), "{out}");
        assert!(!out.contains("outer:{"), "{out}");
    }

    #[test]
    fn labeled_awaiting_loop_continues_by_label() {
        let out = compact(&transform(
            "async function test() {
                outer: while (a) {
                    for (const x of xs) { if (await p(x)) { continue outer; } }
                }
            }",
        ));
        assert!(!out.contains("outer"), "{out}");
        assert!(out.contains("return_recursive();"), "{out}");
    }

    #[test]
    fn let_head_of_for_of_is_fresh_per_iteration() {
        assert_output_contains(
            "async function test(xs) { for (let x of xs) { fns.push(function () { return x; }); await f(x); } }",
            "function _recursive() { var x;",
        );
    }

    #[test]
    fn for_in_snapshots_keys() {
        assert_output_contains(
            "async function test(o) { for (var k in o) { await f(k); } }",
            "_obj = o; _keys = []; for (_key in _obj) { _keys.push(_key); } _keys.reverse();",
        );
        assert_output_contains(
            "async function test(o) { for (var k in o) { await f(k); } }",
            "_key = _keys.pop(); if (_key in _obj) { k = _key; return f(k); } }).then(function () { return _recursive(); })",
        );
    }

    #[test]
    fn for_of_drives_the_iterator() {
        assert_output_contains(
            "async function test(xs) { for (const x of xs) { await f(x); } }",
            "_iterator = xs[Symbol.iterator]();",
        );
        assert_output_contains(
            "async function test(xs) { for (const x of xs) { await f(x); } }",
            "if (!(_step = _iterator.next()).done) { return Promise.resolve().then(function () { x = _step.value; return f(x); })",
        );
    }

    #[test]
    fn loops_without_await_are_untouched() {
        let out = compact(&transform(
            "async function test() { await a; while (b) { c(); if (d) break; } }",
        ));
        assert!(out.contains("while(b){c();if(d){break;}}"), "{out}");
        assert!(!out.contains("_recursive"), "{out}");
    }

    #[test]
    fn break_inside_nested_plain_loop_is_kept() {
        let out = compact(&transform(
            "async function test() { while (a) { await b(); for (;;) { break; } } }",
        ));
        assert!(out.contains("for(;;){break;}"), "{out}");
    }
}
