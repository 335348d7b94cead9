//! Traversal helpers shared by the passes.
//!
//! Every pass works on one function body at a time; nested functions are
//! rewritten later by the driver, so the finders here never descend into
//! them. Arrow functions are skipped too: an `await` inside an arrow belongs
//! to that arrow.

use swc_common::DUMMY_SP;
use swc_ecma_ast::*;
use swc_ecma_visit::{Visit, VisitWith};

use crate::build::make_block;

/// Expands to `Visit` methods that stop the traversal at nested function
/// boundaries.
macro_rules! skip_nested_functions {
    () => {
        fn visit_function(&mut self, _: &swc_ecma_ast::Function) {}
        fn visit_arrow_expr(&mut self, _: &swc_ecma_ast::ArrowExpr) {}
        fn visit_constructor(&mut self, _: &swc_ecma_ast::Constructor) {}
        fn visit_getter_prop(&mut self, _: &swc_ecma_ast::GetterProp) {}
        fn visit_setter_prop(&mut self, _: &swc_ecma_ast::SetterProp) {}
        fn visit_class_members(&mut self, _: &[swc_ecma_ast::ClassMember]) {}
    };
}

/// `VisitMut` counterpart of [`skip_nested_functions!`].
macro_rules! skip_nested_functions_mut {
    () => {
        fn visit_mut_function(&mut self, _: &mut swc_ecma_ast::Function) {}
        fn visit_mut_arrow_expr(&mut self, _: &mut swc_ecma_ast::ArrowExpr) {}
        fn visit_mut_constructor(&mut self, _: &mut swc_ecma_ast::Constructor) {}
        fn visit_mut_getter_prop(&mut self, _: &mut swc_ecma_ast::GetterProp) {}
        fn visit_mut_setter_prop(&mut self, _: &mut swc_ecma_ast::SetterProp) {}
        fn visit_mut_class_members(&mut self, _: &mut Vec<swc_ecma_ast::ClassMember>) {}
    };
}

pub(crate) use skip_nested_functions;
pub(crate) use skip_nested_functions_mut;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Await,
    Return,
    AwaitOrReturn,
    This,
}

pub(crate) struct Finder {
    target: Target,
    found: bool,
}

impl Visit for Finder {
    fn visit_function(&mut self, _: &Function) {}
    fn visit_constructor(&mut self, _: &Constructor) {}
    fn visit_getter_prop(&mut self, _: &GetterProp) {}
    fn visit_setter_prop(&mut self, _: &SetterProp) {}
    fn visit_class_members(&mut self, _: &[ClassMember]) {}

    // Arrows own their awaits and returns but share `this` / `arguments`.
    fn visit_arrow_expr(&mut self, node: &ArrowExpr) {
        if self.target == Target::This {
            node.visit_children_with(self);
        }
    }

    fn visit_await_expr(&mut self, node: &AwaitExpr) {
        if matches!(self.target, Target::Await | Target::AwaitOrReturn) {
            self.found = true;
        } else {
            node.visit_children_with(self);
        }
    }

    fn visit_for_of_stmt(&mut self, node: &ForOfStmt) {
        if node.is_await && matches!(self.target, Target::Await | Target::AwaitOrReturn) {
            self.found = true;
        } else {
            node.visit_children_with(self);
        }
    }

    fn visit_return_stmt(&mut self, node: &ReturnStmt) {
        if matches!(self.target, Target::Return | Target::AwaitOrReturn) {
            self.found = true;
        } else {
            node.visit_children_with(self);
        }
    }

    fn visit_this_expr(&mut self, _: &ThisExpr) {
        if self.target == Target::This {
            self.found = true;
        }
    }

    fn visit_ident(&mut self, node: &Ident) {
        if self.target == Target::This && &*node.sym == "arguments" {
            self.found = true;
        }
    }
}

fn find<N: VisitWith<Finder>>(node: &N, target: Target) -> bool {
    let mut finder = Finder {
        target,
        found: false,
    };
    node.visit_with(&mut finder);
    finder.found
}

pub(crate) fn contains_await<N: VisitWith<Finder>>(node: &N) -> bool {
    find(node, Target::Await)
}

pub(crate) fn stmts_contain_await(stmts: &[Stmt]) -> bool {
    stmts.iter().any(contains_await)
}

pub(crate) fn contains_return<N: VisitWith<Finder>>(node: &N) -> bool {
    find(node, Target::Return)
}

pub(crate) fn stmts_contain_return(stmts: &[Stmt]) -> bool {
    stmts.iter().any(contains_return)
}

/// Whether the statement holds an `await` or a `return`, the two things that
/// force a loop or switch out of its native form.
pub(crate) fn suspends_or_exits<N: VisitWith<Finder>>(node: &N) -> bool {
    find(node, Target::AwaitOrReturn)
}

/// Whether `this` or `arguments` is referenced outside nested ordinary
/// functions.
pub(crate) fn uses_context<N: VisitWith<Finder>>(node: &N) -> bool {
    find(node, Target::This)
}

/// Whether any declaration (`var`, `let`, `const`, function, class) sits in
/// the statement outside nested functions.
pub(crate) fn stmts_declare(stmts: &[Stmt]) -> bool {
    struct Decls(bool);
    impl Visit for Decls {
        skip_nested_functions!();

        fn visit_decl(&mut self, _: &Decl) {
            self.0 = true;
        }

        fn visit_var_decl(&mut self, _: &VarDecl) {
            self.0 = true;
        }
    }
    let mut v = Decls(false);
    for stmt in stmts {
        stmt.visit_with(&mut v);
    }
    v.0
}

/// Statements of a braced body, or the single statement itself.
pub(crate) fn block_stmts(stmt: Stmt) -> Vec<Stmt> {
    match stmt {
        Stmt::Block(block) => block.stmts,
        Stmt::Empty(_) => vec![],
        stmt => vec![stmt],
    }
}

/// Splice bare nested blocks that declare nothing into the list and drop
/// empty statements.
pub(crate) fn squash_blocks(stmts: Vec<Stmt>) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt {
            Stmt::Empty(_) => {}
            Stmt::Block(block) if !stmts_declare(&block.stmts) => {
                out.extend(squash_blocks(block.stmts));
            }
            stmt => out.push(stmt),
        }
    }
    out
}

/// Wrap a boxed statement in a block unless it already is one.
pub(crate) fn ensure_block(stmt: &mut Box<Stmt>) {
    if matches!(**stmt, Stmt::Block(_)) {
        return;
    }
    let inner = std::mem::replace(&mut **stmt, Stmt::Empty(EmptyStmt { span: DUMMY_SP }));
    **stmt = Stmt::Block(make_block(vec![inner]));
}

/// Collect every identifier bound by a pattern.
pub(crate) fn pat_idents(pat: &Pat, out: &mut Vec<Ident>) {
    match pat {
        Pat::Ident(b) => out.push(b.id.clone()),
        Pat::Array(a) => {
            for elem in a.elems.iter().flatten() {
                pat_idents(elem, out);
            }
        }
        Pat::Object(o) => {
            for prop in &o.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => pat_idents(&kv.value, out),
                    ObjectPatProp::Assign(a) => out.push(a.key.id.clone()),
                    ObjectPatProp::Rest(r) => pat_idents(&r.arg, out),
                }
            }
        }
        Pat::Rest(r) => pat_idents(&r.arg, out),
        Pat::Assign(a) => pat_idents(&a.left, out),
        Pat::Expr(_) | Pat::Invalid(_) => {}
    }
}
