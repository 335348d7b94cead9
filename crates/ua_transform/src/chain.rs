//! Build the promise chain for a normalized statement list.
//!
//! Statements are collected into the open step of a [`PromiseChain`]. An
//! `await` ends the step with `return <operand>` and opens the next one,
//! which receives the settled value as `_resp`:
//! ```text
//! a(); x = await b(); c(x);
//! ```
//! becomes
//! ```text
//! Promise.resolve().then(function () {
//!     a();
//!     return b();
//! }).then(function (_resp) {
//!     x = _resp;
//!     c(x);
//! })
//! ```
//! Ifs whose branches await get one sub-chain per branch; `try` statements
//! that await become a sub-chain with `.catch` and a two-sided `.then` for
//! `finally`.

use swc_ecma_ast::*;
use swc_ecma_visit::{Visit, VisitMut, VisitMutWith, VisitWith};
use tracing::trace;

use crate::{
    build::*,
    error::Result,
    transform::FnCx,
    walk::{
        block_stmts, contains_await, skip_nested_functions, skip_nested_functions_mut,
        stmts_contain_await, stmts_contain_return,
    },
};

/// How a chain's result is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChainMode {
    /// The chain already runs inside a callback, so a single step may run as
    /// a plain IIFE instead of a `.then` callback.
    pub inner: bool,
    /// The chain's value is the function's result: a chain ending in a
    /// discarded value gets an empty `.then` so it resolves to `undefined`.
    pub strict: bool,
}

impl ChainMode {
    /// The body of a rewritten async function.
    pub(crate) const TOP: Self = Self {
        inner: false,
        strict: true,
    };
    /// Generated functions, lazy operands and handler bodies.
    pub(crate) const INNER: Self = Self {
        inner: true,
        strict: false,
    };
    /// The protected block of a `try`; its handlers attach to it.
    pub(crate) const PROTECTED: Self = Self {
        inner: false,
        strict: false,
    };

    fn branch(self, keeps_value: bool) -> Self {
        Self {
            inner: true,
            strict: self.strict && keeps_value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepKind {
    Then,
    Catch,
}

impl StepKind {
    fn method(self) -> &'static str {
        match self {
            StepKind::Then => "then",
            StepKind::Catch => "catch",
        }
    }
}

/// Second callback of a `.then`.
#[derive(Debug, Clone)]
pub(crate) struct Handler {
    pub param: Pat,
    pub body: Vec<Stmt>,
}

/// One callback attached to the chain.
#[derive(Debug, Clone)]
pub(crate) struct Step {
    pub kind: StepKind,
    pub param: Option<Pat>,
    pub body: Vec<Stmt>,
    /// Attach even when the body is empty.
    pub dirty: bool,
    pub on_rejected: Option<Handler>,
}

impl Step {
    fn then(param: Option<Pat>) -> Self {
        Self {
            kind: StepKind::Then,
            param,
            body: vec![],
            dirty: false,
            on_rejected: None,
        }
    }

    fn catch(param: Option<Pat>, body: Vec<Stmt>) -> Self {
        Self {
            kind: StepKind::Catch,
            param,
            body,
            dirty: true,
            on_rejected: None,
        }
    }

    fn is_trivial(&self) -> bool {
        self.kind == StepKind::Then
            && self.body.is_empty()
            && !self.dirty
            && self.on_rejected.is_none()
    }

    fn into_args(self) -> Vec<Expr> {
        let mut args = vec![make_fn_expr(self.param.into_iter().collect(), self.body)];
        if let Some(handler) = self.on_rejected {
            args.push(make_fn_expr(vec![handler.param], handler.body));
        }
        args
    }
}

/// `Promise.resolve()` followed by the attached steps and one open step.
#[derive(Debug)]
pub(crate) struct PromiseChain {
    base: Expr,
    steps: Vec<Step>,
    open: Step,
    mode: ChainMode,
    /// The last split left a value nobody asked for in the chain.
    discardable: bool,
}

impl PromiseChain {
    pub(crate) fn new(promise: &str, mode: ChainMode) -> Self {
        Self {
            base: make_method_call(ident_expr(&make_ident(promise)), "resolve", vec![]),
            steps: vec![],
            open: Step::then(None),
            mode,
            discardable: false,
        }
    }

    pub(crate) fn push(&mut self, stmt: Stmt) {
        self.open.body.push(stmt);
    }

    /// Close the open step. The next step receives its value as `param`.
    pub(crate) fn split(&mut self, param: Option<Pat>, discardable: bool) {
        let step = std::mem::replace(&mut self.open, Step::then(param));
        self.attach(step);
        self.discardable = discardable;
    }

    pub(crate) fn attach(&mut self, step: Step) {
        if !step.is_trivial() {
            self.steps.push(step);
        }
    }

    /// Attach the open step if it has statements and leave a fresh,
    /// parameterless one open.
    fn close(&mut self) {
        let step = std::mem::replace(&mut self.open, Step::then(None));
        if !step.body.is_empty() {
            self.steps.push(step);
        }
    }

    pub(crate) fn finish(mut self) -> Expr {
        let open = std::mem::replace(&mut self.open, Step::then(None));
        if !open.body.is_empty() {
            self.steps.push(open);
        } else if self.mode.strict && self.discardable {
            self.steps.push(Step {
                dirty: true,
                ..Step::then(None)
            });
        }

        let lone_step = matches!(
            &self.steps[..],
            [step] if step.kind == StepKind::Then && step.param.is_none() && step.on_rejected.is_none()
        );
        if self.mode.inner && lone_step {
            if let Some(step) = self.steps.pop() {
                return make_iife(step.body);
            }
        }

        let mut chain = self.base;
        for step in self.steps {
            let method = step.kind.method();
            chain = make_method_call(chain, method, step.into_args());
        }
        chain
    }
}

/// Turn `stmts` into a single chain expression.
pub(crate) fn build_chain(stmts: Vec<Stmt>, cx: &mut FnCx<'_>, mode: ChainMode) -> Result<Expr> {
    Ok(fill(stmts, cx, mode)?.finish())
}

fn fill(stmts: Vec<Stmt>, cx: &mut FnCx<'_>, mode: ChainMode) -> Result<PromiseChain> {
    let chain = PromiseChain::new(&cx.opts.promise_ident, mode);
    let mut builder = ChainBuilder { cx, chain };
    builder.stmts(stmts, true)?;
    Ok(builder.chain)
}

struct ChainBuilder<'a, 'o> {
    cx: &'a mut FnCx<'o>,
    chain: PromiseChain,
}

impl ChainBuilder<'_, '_> {
    fn stmts(&mut self, stmts: Vec<Stmt>, at_end: bool) -> Result<()> {
        let last = stmts.len().saturating_sub(1);
        for (i, stmt) in stmts.into_iter().enumerate() {
            self.stmt(stmt, at_end && i == last)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: Stmt, is_last: bool) -> Result<()> {
        if !contains_await(&stmt) {
            self.chain.push(stmt);
            return Ok(());
        }
        match stmt {
            Stmt::Return(ReturnStmt {
                span,
                arg: Some(arg),
            }) => {
                let arg = match unparen_owned(*arg) {
                    Expr::Await(await_expr) => unparen_owned(*await_expr.arg),
                    arg => arg,
                };
                let arg = self.extract(arg);
                self.chain.push(Stmt::Return(ReturnStmt {
                    span,
                    arg: Some(Box::new(arg)),
                }));
            }
            Stmt::Expr(s) if matches!(unparen(&s.expr), Expr::Await(_)) => {
                if let Expr::Await(await_expr) = unparen_owned(*s.expr) {
                    let value = self.extract(unparen_owned(*await_expr.arg));
                    self.chain.push(make_return(Some(value)));
                    self.chain.split(None, true);
                }
            }
            Stmt::Expr(mut s) => {
                self.extract_in(&mut s.expr);
                self.chain.push(Stmt::Expr(s));
            }
            Stmt::Throw(mut s) => {
                self.extract_in(&mut s.arg);
                self.chain.push(Stmt::Throw(s));
            }
            Stmt::If(s) => self.if_stmt(s, is_last)?,
            Stmt::Try(t) => self.try_stmt(*t)?,
            Stmt::Block(b) => self.stmts(b.stmts, is_last)?,
            stmt => {
                self.cx
                    .unsupported(&format!("`await` inside {}", describe(&stmt)))?;
                self.chain.push(stmt);
            }
        }
        Ok(())
    }

    fn extract(&mut self, mut expr: Expr) -> Expr {
        self.extract_in(&mut expr);
        expr
    }

    /// Split the chain at every `await` in `expr`, innermost first, leaving
    /// `_resp` in place of each.
    ///
    /// A value the very next step does not consume is copied into an
    /// `_awaited` variable first; that only happens when the evaluation order
    /// pass is off and sibling awaits are left in one expression.
    fn extract_in(&mut self, expr: &mut Expr) {
        let mut nesting = AwaitNesting::default();
        expr.visit_with(&mut nesting);
        let count = nesting.encloses_previous.len();

        let placeholders: Vec<Ident> = (0..count)
            .map(|i| {
                if i + 1 == count || nesting.encloses_previous[i + 1] {
                    self.cx.resp.clone()
                } else {
                    let saved = self.cx.scope.generate_uid("awaited");
                    self.cx.scope.declare(&saved);
                    saved
                }
            })
            .collect();

        let operands = {
            let mut extractor = AwaitExtractor {
                placeholders: &placeholders,
                operands: vec![],
            };
            expr.visit_mut_with(&mut extractor);
            extractor.operands
        };
        for (operand, placeholder) in operands.into_iter().zip(&placeholders) {
            self.chain.push(make_return(Some(operand)));
            self.chain.split(Some(binding(&self.cx.resp)), false);
            if placeholder.sym != self.cx.resp.sym {
                self.chain
                    .push(make_assign_stmt(placeholder, ident_expr(&self.cx.resp)));
            }
        }
    }

    fn branch(&mut self, stmts: Vec<Stmt>, mode: ChainMode) -> Result<Vec<Stmt>> {
        if !stmts_contain_await(&stmts) {
            return Ok(stmts);
        }
        Ok(vec![make_return(Some(build_chain(stmts, self.cx, mode)?))])
    }

    fn if_stmt(&mut self, s: IfStmt, is_last: bool) -> Result<()> {
        let IfStmt {
            span,
            test,
            cons,
            alt,
        } = s;
        let test = self.extract(*test);
        let cons = block_stmts(*cons);
        let alt = alt.map(|alt| block_stmts(*alt));

        let returns =
            stmts_contain_return(&cons) || alt.as_deref().is_some_and(stmts_contain_return);
        let suspends =
            stmts_contain_await(&cons) || alt.as_deref().is_some_and(stmts_contain_await);
        let mode = self.chain.mode.branch(is_last && returns);

        let cons = self.branch(cons, mode)?;
        let alt = alt.map(|alt| self.branch(alt, mode)).transpose()?;
        self.chain.push(Stmt::If(IfStmt {
            span,
            test: Box::new(test),
            cons: Box::new(Stmt::Block(make_block(cons))),
            alt: alt.map(|alt| Box::new(Stmt::Block(make_block(alt)))),
        }));
        if suspends {
            self.chain.split(None, !returns);
        }
        Ok(())
    }

    fn try_stmt(&mut self, t: TryStmt) -> Result<()> {
        let TryStmt {
            block,
            handler,
            finalizer,
            ..
        } = t;
        trace!(
            catch = handler.is_some(),
            finally = finalizer.is_some(),
            "chaining try statement"
        );

        let mut protected = fill(block.stmts, self.cx, ChainMode::PROTECTED)?;
        protected.close();

        if let Some(handler) = handler {
            let body = self.branch(handler.body.stmts, ChainMode::INNER)?;
            protected.attach(Step::catch(handler.param, body));
        }

        if let Some(finalizer) = finalizer {
            let value = self.cx.scope.generate_uid("value");
            let err = self.cx.scope.generate_uid("err");

            let mut resolved = finalizer.stmts.clone();
            resolved.push(make_return(Some(ident_expr(&value))));
            let mut rejected = finalizer.stmts;
            rejected.push(make_throw(ident_expr(&err)));

            let on_rejected = Handler {
                param: binding(&err),
                body: self.branch(rejected, ChainMode::INNER)?,
            };
            protected.attach(Step {
                body: self.branch(resolved, ChainMode::INNER)?,
                dirty: true,
                on_rejected: Some(on_rejected),
                ..Step::then(Some(binding(&value)))
            });
        }

        self.chain.push(make_return(Some(protected.finish())));
        self.chain.split(None, true);
        Ok(())
    }
}

/// Records, for each `await` in evaluation order, whether it encloses the
/// one evaluated just before it.
#[derive(Default)]
struct AwaitNesting {
    encloses_previous: Vec<bool>,
}

impl Visit for AwaitNesting {
    skip_nested_functions!();

    fn visit_await_expr(&mut self, node: &AwaitExpr) {
        let before = self.encloses_previous.len();
        node.visit_children_with(self);
        let encloses = self.encloses_previous.len() > before;
        self.encloses_previous.push(encloses);
    }
}

struct AwaitExtractor<'a> {
    /// What each `await` is replaced by, in evaluation order.
    placeholders: &'a [Ident],
    operands: Vec<Expr>,
}

impl VisitMut for AwaitExtractor<'_> {
    skip_nested_functions_mut!();

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);
        if let Expr::Await(await_expr) = expr {
            let Some(placeholder) = self.placeholders.get(self.operands.len()) else {
                return;
            };
            let operand = std::mem::replace(&mut *await_expr.arg, ident_expr(placeholder));
            self.operands.push(unparen_owned(operand));
            *expr = ident_expr(placeholder);
        }
    }
}

fn describe(stmt: &Stmt) -> &'static str {
    match stmt {
        Stmt::Labeled(_) => "a labeled statement",
        Stmt::With(_) => "a `with` statement",
        Stmt::Switch(_) => "a `switch` statement",
        Stmt::ForOf(_) => "a `for await` loop",
        Stmt::While(_) | Stmt::DoWhile(_) | Stmt::For(_) | Stmt::ForIn(_) => "a loop",
        Stmt::Decl(_) => "a declaration",
        _ => "a statement",
    }
}
