//! The rewrite driver.
//!
//! [`AsyncRewriter`] walks a module and hands every async function to
//! [`rewrite_async`], which runs the passes in order:
//!
//! 1. block normalization and `this` / `arguments` capture,
//! 2. declaration hoisting,
//! 3. [`rewrite_body`]: loops, switches, returns inside `try`, single exit,
//!    evaluation order and finally the chain itself.
//!
//! Functions the passes generate (loop bodies, captured `try` statements) go
//! through [`rewrite_body`] again with a fresh [`Scope`] of their own.

use swc_ecma_ast::*;
use swc_ecma_visit::{VisitMut, VisitMutWith};
use tracing::{debug, trace, warn};
use ua_ast::{AsyncKind, TransformOptions};

use crate::{
    blocks::{arrow_body_to_block, normalize_blocks},
    build::{make_function, make_return},
    capture::capture_try_returns,
    chain::{build_chain, ChainMode},
    context::capture_context,
    error::{Result, TransformError},
    exits::normalize_exits,
    hoist::hoist_declarations,
    inline::inline,
    loops::recursify_loops,
    order::hoist_exec_order,
    scope::Scope,
    switch::desugar_switches,
};

/// State shared by the passes while one function body is rewritten.
pub(crate) struct FnCx<'o> {
    pub(crate) scope: Scope,
    pub(crate) opts: &'o TransformOptions,
    /// Parameter name of the callbacks that receive an awaited value.
    pub(crate) resp: Ident,
    pub(crate) name: String,
    /// The returns of the body already only record the result.
    pub(crate) returns_captured: bool,
}

impl<'o> FnCx<'o> {
    fn new(name: &str, mut scope: Scope, opts: &'o TransformOptions) -> Self {
        let resp = scope.generate_uid("resp");
        Self {
            scope,
            opts,
            resp,
            name: name.to_string(),
            returns_captured: false,
        }
    }

    /// Report a construct the rewrite leaves alone. Fails in strict mode.
    pub(crate) fn unsupported(&self, construct: &str) -> Result<()> {
        if self.opts.strict {
            return Err(TransformError::unsupported(&self.name, construct));
        }
        warn!(function = %self.name, construct, "leaving unsupported construct untouched");
        Ok(())
    }
}

/// Rewrite every async function in `module` into a promise chain.
///
/// Non-async code is returned unchanged.
pub fn transform_module(mut module: Module, opts: &TransformOptions) -> Result<Module> {
    let mut rewriter = AsyncRewriter::new(opts);
    module.visit_mut_with(&mut rewriter);
    let rewritten = rewriter.finish()?;
    debug!(rewritten, "module transformed");
    Ok(module)
}

/// Rewrite `function` in place if it is async, along with every async
/// function nested in it.
pub fn transform_function(function: &mut Function, opts: &TransformOptions) -> Result<()> {
    let mut rewriter = AsyncRewriter::new(opts);
    function.visit_mut_with(&mut rewriter);
    rewriter.finish().map(drop)
}

/// Run the passes after hoisting and turn `stmts` into
/// `var ...; return CHAIN;`.
pub(crate) fn rewrite_body(stmts: Vec<Stmt>, cx: &mut FnCx<'_>, mode: ChainMode) -> Result<Vec<Stmt>> {
    let stmts = recursify_loops(stmts, cx)?;
    let stmts = desugar_switches(stmts, cx)?;
    let stmts = if cx.returns_captured {
        stmts
    } else {
        capture_try_returns(stmts, cx)?
    };
    let stmts = normalize_exits(stmts, &mut cx.scope);
    trace!(function = %cx.name, "control flow normalized");

    let stmts = if cx.opts.hoist_exec_order {
        hoist_exec_order(stmts, cx)?
    } else {
        stmts
    };
    let chain = build_chain(stmts, cx, mode)?;

    let mut body = cx.scope.take_declarations();
    body.push(make_return(Some(chain)));
    Ok(body)
}

/// Rewrite a function body produced by one of the passes. The result takes
/// no parameters and returns the chain.
///
/// Bindings still declared in `stmts` become locals of the new function, so
/// a loop body gets fresh ones on every iteration. `returns_captured` is set
/// for the bodies of captured `try` statements, whose remaining `return;`s
/// only end the protected block.
pub(crate) fn rewrite_generated(
    stmts: Vec<Stmt>,
    opts: &TransformOptions,
    name: &str,
    returns_captured: bool,
) -> Result<Box<Function>> {
    let mut scope = Scope::for_function(&[], &stmts);
    let (stmts, _) = hoist_declarations(stmts, &mut scope);
    let mut cx = FnCx::new(name, scope, opts);
    cx.returns_captured = returns_captured;
    let body = rewrite_body(stmts, &mut cx, ChainMode::INNER)?;
    Ok(make_function(vec![], body))
}

fn rewrite_async(
    name: &str,
    kind: AsyncKind,
    params: &[Pat],
    mut body: Vec<Stmt>,
    opts: &TransformOptions,
) -> Result<Vec<Stmt>> {
    debug!(function = name, %kind, "rewriting");
    let mut scope = Scope::for_function(params, &body);
    normalize_blocks(&mut body);
    capture_context(params, &mut body, &mut scope);
    let (body, hoisted) = hoist_declarations(body, &mut scope);
    trace!(function = name, hoisted = hoisted.len(), "declarations hoisted");

    let mut cx = FnCx::new(name, scope, opts);
    rewrite_body(body, &mut cx, ChainMode::TOP)
}

struct AsyncRewriter<'o> {
    opts: &'o TransformOptions,
    /// Name of the function about to be visited, for diagnostics.
    name: Option<String>,
    /// Number of rewritten functions enclosing the current node.
    depth: usize,
    rewritten: usize,
    error: Option<TransformError>,
}

impl<'o> AsyncRewriter<'o> {
    fn new(opts: &'o TransformOptions) -> Self {
        Self {
            opts,
            name: None,
            depth: 0,
            rewritten: 0,
            error: None,
        }
    }

    fn finish(self) -> Result<usize> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.rewritten),
        }
    }

    fn skip(&mut self, name: &str, construct: &str) {
        if self.opts.strict {
            self.error = Some(TransformError::unsupported(name, construct));
        } else {
            warn!(function = name, construct, "leaving function untouched");
        }
    }

    /// Rewrite `stmts` in place. Returns whether the function was rewritten.
    fn rewrite(&mut self, name: &str, kind: AsyncKind, params: &[Pat], stmts: &mut Vec<Stmt>) -> bool {
        match rewrite_async(name, kind, params, std::mem::take(stmts), self.opts) {
            Ok(body) => {
                *stmts = body;
                self.rewritten += 1;
                true
            }
            Err(err) => {
                self.error = Some(err);
                false
            }
        }
    }

    /// Visit the children of a function, then inline it when it is the
    /// outermost rewritten one.
    fn descend<N>(&mut self, node: &mut N, rewritten: bool)
    where
        N: VisitMutWith<Self> + VisitMutWith<crate::inline::Inliner>,
    {
        if rewritten {
            self.depth += 1;
        }
        node.visit_mut_children_with(self);
        if rewritten {
            self.depth -= 1;
            if self.depth == 0 && self.opts.inline && self.error.is_none() {
                inline(node);
            }
        }
    }
}

fn prop_name(key: &PropName) -> Option<String> {
    match key {
        PropName::Ident(id) => Some(id.sym.to_string()),
        _ => None,
    }
}

impl VisitMut for AsyncRewriter<'_> {
    fn visit_mut_fn_decl(&mut self, node: &mut FnDecl) {
        self.name = Some(node.ident.sym.to_string());
        node.visit_mut_children_with(self);
    }

    fn visit_mut_fn_expr(&mut self, node: &mut FnExpr) {
        self.name = node.ident.as_ref().map(|id| id.sym.to_string());
        node.visit_mut_children_with(self);
    }

    fn visit_mut_method_prop(&mut self, node: &mut MethodProp) {
        node.key.visit_mut_with(self);
        self.name = prop_name(&node.key);
        node.function.visit_mut_with(self);
    }

    fn visit_mut_class_method(&mut self, node: &mut ClassMethod) {
        node.key.visit_mut_with(self);
        self.name = prop_name(&node.key);
        node.function.visit_mut_with(self);
    }

    fn visit_mut_function(&mut self, function: &mut Function) {
        let name = self
            .name
            .take()
            .unwrap_or_else(|| "<anonymous>".to_string());
        if self.error.is_some() {
            return;
        }

        let mut rewritten = false;
        if function.is_async && function.is_generator {
            self.skip(&name, "async generator");
        } else if function.is_async {
            if let Some(body) = &mut function.body {
                let params: Vec<Pat> = function.params.iter().map(|p| p.pat.clone()).collect();
                rewritten = self.rewrite(&name, AsyncKind::Function, &params, &mut body.stmts);
                function.is_async = !rewritten;
            }
        }
        self.descend(function, rewritten);
    }

    fn visit_mut_arrow_expr(&mut self, arrow: &mut ArrowExpr) {
        self.name = None;
        if self.error.is_some() {
            return;
        }

        let mut rewritten = false;
        if arrow.is_async {
            arrow_body_to_block(&mut arrow.body);
            if let BlockStmtOrExpr::BlockStmt(body) = &mut *arrow.body {
                let params = arrow.params.clone();
                rewritten = self.rewrite("<arrow>", AsyncKind::Arrow, &params, &mut body.stmts);
                arrow.is_async = !rewritten;
            }
        }
        self.descend(arrow, rewritten);
    }
}
