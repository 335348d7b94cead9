//! Hoist declarations out of the pieces an async function is cut into.
//!
//! The chain builder cuts a body into separate callbacks, so a binding
//! declared in one piece must stay visible in the others. Declarations in
//! the statement lists that get cut become names in the function's single
//! `var` list (initializers turn into assignments in place), class
//! declarations become assignments of class expressions, and function
//! declarations move to the top of the body.
//!
//! Statements that neither await nor return are emitted whole, so their
//! `let`, `const` and function declarations keep their block scope and only
//! their `var`s move. The body of an awaiting loop is hoisted later into the
//! loop function, which gives it fresh bindings on every iteration.
//!
//! A block-scoped name hoisted out of a nested list is renamed when the
//! function mentions it anywhere else:
//! ```text
//! let x = 1; if (c) { let x = 2; await g(x); } return x;
//! ```
//! becomes
//! ```text
//! var x, _x; x = 1; if (c) { _x = 2; await g(_x); } return x;
//! ```

use rustc_hash::FxHashMap;
use swc_common::DUMMY_SP;
use swc_ecma_ast::*;
use swc_ecma_visit::{Visit, VisitMut, VisitMutWith, VisitWith};
use tracing::trace;

use crate::{
    build::{make_assign, make_block, make_expr_stmt, make_undefined, relabel},
    scope::Scope,
    walk::{block_stmts, pat_idents, skip_nested_functions_mut, suspends_or_exits},
};

/// Hoist the declarations of `stmts` into `scope`, returning the rewritten
/// statements and the identifiers that were declared.
pub(crate) fn hoist_declarations(stmts: Vec<Stmt>, scope: &mut Scope) -> (Vec<Stmt>, Vec<Ident>) {
    let mut occurrences = NameCounter::default();
    for stmt in &stmts {
        stmt.visit_with(&mut occurrences);
    }
    let mut hoister = Hoister {
        scope,
        occurrences: occurrences.0,
        declared: vec![],
    };
    let stmts = hoister.stmts(stmts);
    (stmts, hoister.declared)
}

struct Hoister<'a> {
    scope: &'a mut Scope,
    /// How often each name appears in the function body.
    occurrences: FxHashMap<String, usize>,
    declared: Vec<Ident>,
}

impl Hoister<'_> {
    fn stmts(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            out.extend(self.stmt(stmt));
        }
        out
    }

    /// A nested list that gets cut. Its block-scoped names leave with it.
    fn nested(&mut self, mut stmts: Vec<Stmt>) -> Vec<Stmt> {
        let names = block_scoped(&stmts);
        self.rename_shadowing(names, &mut stmts);
        self.stmts(stmts)
    }

    fn nested_block(&mut self, stmt: Box<Stmt>) -> Box<Stmt> {
        Box::new(Stmt::Block(make_block(self.nested(block_stmts(*stmt)))))
    }

    /// Give `names` fresh identifiers inside `region` when the function
    /// mentions them outside of it.
    fn rename_shadowing<N>(&mut self, names: Vec<Ident>, region: &mut [N])
    where
        N: VisitWith<NameCounter> + VisitMutWith<Renamer>,
    {
        if names.is_empty() {
            return;
        }
        let mut inside = NameCounter::default();
        for node in region.iter() {
            node.visit_with(&mut inside);
        }

        let mut renamer = Renamer::default();
        for id in names {
            let name = id.sym.to_string();
            let total = self.occurrences.get(&name).copied().unwrap_or(0);
            let own = inside.0.get(&name).copied().unwrap_or(0);
            if total > own && !renamer.0.contains_key(&name) {
                let fresh = self.scope.generate_uid(&name);
                trace!(from = %name, to = %fresh.sym, "renaming block-scoped declaration");
                renamer.0.insert(name, fresh);
            }
        }
        if !renamer.0.is_empty() {
            for node in region.iter_mut() {
                node.visit_mut_with(&mut renamer);
            }
        }
    }

    fn declare_pat(&mut self, pat: &Pat) {
        let mut ids = vec![];
        pat_idents(pat, &mut ids);
        for id in ids {
            self.scope.declare(&id);
            self.declared.push(id);
        }
    }

    /// Turn a declaration into the assignments it performs.
    fn var_decl(&mut self, decl: VarDecl) -> Vec<Expr> {
        let resets = decl.kind != VarDeclKind::Var;
        let mut assigns = vec![];
        for declarator in decl.decls {
            self.declare_pat(&declarator.name);
            match declarator.init {
                Some(init) => {
                    if let Some(assign) = assign_pat(declarator.name, *init) {
                        assigns.push(assign);
                    }
                }
                // `let x;` in a list that runs again starts over at `undefined`.
                None if resets => {
                    if let Some(assign) = assign_pat(declarator.name, make_undefined()) {
                        assigns.push(assign);
                    }
                }
                None => {}
            }
        }
        assigns
    }

    fn for_init(&mut self, decl: VarDecl) -> Option<VarDeclOrExpr> {
        let mut assigns = self.var_decl(decl);
        match assigns.len() {
            0 => None,
            1 => assigns.pop().map(|e| VarDeclOrExpr::Expr(Box::new(e))),
            _ => Some(VarDeclOrExpr::Expr(Box::new(Expr::Seq(SeqExpr {
                span: DUMMY_SP,
                exprs: assigns.into_iter().map(Box::new).collect(),
            })))),
        }
    }

    /// `for (var x in/of ...)` loses its keyword.
    fn var_head(&mut self, head: &mut ForHead) {
        let ForHead::VarDecl(decl) = head else { return };
        if decl.kind != VarDeclKind::Var || decl.decls.len() != 1 {
            return;
        }
        let declarator = decl.decls.remove(0);
        self.declare_pat(&declarator.name);
        *head = ForHead::Pat(Box::new(strip_type_ann(declarator.name)));
    }

    fn stmt(&mut self, stmt: Stmt) -> Vec<Stmt> {
        match stmt {
            Stmt::Decl(Decl::Var(decl)) => self
                .var_decl(*decl)
                .into_iter()
                .map(make_expr_stmt)
                .collect(),
            Stmt::Decl(Decl::Fn(f)) => {
                self.scope.declare_fn(Stmt::Decl(Decl::Fn(f)));
                vec![]
            }
            Stmt::Decl(Decl::Class(c)) => {
                self.scope.declare(&c.ident);
                self.declared.push(c.ident.clone());
                let ident = c.ident.clone();
                let class = Expr::Class(ClassExpr {
                    ident: Some(c.ident),
                    class: c.class,
                });
                vec![make_expr_stmt(make_assign(&ident, class))]
            }
            Stmt::Labeled(l) => {
                let body = self.stmt(*l.body);
                vec![relabel(l.span, l.label, body)]
            }
            stmt if !suspends_or_exits(&stmt) => vec![self.vars_only(stmt)],
            Stmt::Block(block) => vec![Stmt::Block(BlockStmt {
                stmts: self.nested(block.stmts),
                ..block
            })],
            Stmt::If(s) => vec![Stmt::If(IfStmt {
                cons: self.nested_block(s.cons),
                alt: s.alt.map(|alt| self.nested_block(alt)),
                ..s
            })],
            Stmt::Switch(mut s) => {
                // The cases share one scope.
                let names = s.cases.iter().flat_map(|case| block_scoped(&case.cons)).collect();
                self.rename_shadowing(names, &mut s.cases);
                for case in &mut s.cases {
                    case.cons = self.stmts(std::mem::take(&mut case.cons));
                }
                vec![Stmt::Switch(s)]
            }
            Stmt::Try(t) => {
                let TryStmt {
                    span,
                    block,
                    handler,
                    finalizer,
                } = *t;
                let block = BlockStmt {
                    stmts: self.nested(block.stmts),
                    ..block
                };
                let handler = handler.map(|h| CatchClause {
                    body: BlockStmt {
                        stmts: self.nested(h.body.stmts),
                        ..h.body
                    },
                    ..h
                });
                let finalizer = finalizer.map(|f| BlockStmt {
                    stmts: self.nested(f.stmts),
                    ..f
                });
                vec![Stmt::Try(Box::new(TryStmt {
                    span,
                    block,
                    handler,
                    finalizer,
                }))]
            }
            stmt @ (Stmt::While(_) | Stmt::DoWhile(_) | Stmt::For(_) | Stmt::ForIn(_) | Stmt::ForOf(_)) => {
                vec![self.awaiting_loop(stmt)]
            }
            stmt => vec![stmt],
        }
    }

    /// An awaiting loop leaves its body to the loop function. Only its
    /// `var`s move, along with a `for (let ...;;)` head: the loop function
    /// reads that one from the enclosing scope.
    fn awaiting_loop(&mut self, mut stmt: Stmt) -> Stmt {
        if let Stmt::For(ForStmt {
            init: Some(VarDeclOrExpr::VarDecl(decl)),
            ..
        }) = &stmt
        {
            if decl.kind != VarDeclKind::Var {
                let mut names = vec![];
                for declarator in &decl.decls {
                    pat_idents(&declarator.name, &mut names);
                }
                self.rename_shadowing(names, std::slice::from_mut(&mut stmt));
            }
        }
        if let Stmt::For(s) = &mut stmt {
            s.init = match s.init.take() {
                Some(VarDeclOrExpr::VarDecl(decl)) => self.for_init(*decl),
                init => init,
            };
        }
        self.vars_only(stmt)
    }

    fn vars_only(&mut self, mut stmt: Stmt) -> Stmt {
        stmt.visit_mut_with(&mut VarHoister { hoister: self });
        stmt
    }
}

/// Names a statement list declares for its own block.
fn block_scoped(stmts: &[Stmt]) -> Vec<Ident> {
    let mut names = vec![];
    for stmt in stmts {
        match stmt {
            Stmt::Decl(Decl::Var(decl)) if decl.kind != VarDeclKind::Var => {
                for declarator in &decl.decls {
                    pat_idents(&declarator.name, &mut names);
                }
            }
            Stmt::Decl(Decl::Class(c)) => names.push(c.ident.clone()),
            Stmt::Decl(Decl::Fn(f)) => names.push(f.ident.clone()),
            _ => {}
        }
    }
    names
}

fn is_var(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Decl(Decl::Var(decl)) if decl.kind == VarDeclKind::Var)
}

/// Hoists the `var`s of a statement that is emitted whole.
struct VarHoister<'h, 'a> {
    hoister: &'h mut Hoister<'a>,
}

impl VisitMut for VarHoister<'_, '_> {
    skip_nested_functions_mut!();

    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        let old = std::mem::take(stmts);
        for mut stmt in old {
            if is_var(&stmt) {
                stmts.extend(self.hoister.stmt(stmt));
            } else {
                stmt.visit_mut_with(self);
                stmts.push(stmt);
            }
        }
    }

    fn visit_mut_stmt(&mut self, stmt: &mut Stmt) {
        if is_var(stmt) {
            let decl = std::mem::replace(stmt, Stmt::Empty(EmptyStmt { span: DUMMY_SP }));
            *stmt = Stmt::Block(make_block(self.hoister.stmt(decl)));
        } else {
            stmt.visit_mut_children_with(self);
        }
    }

    fn visit_mut_for_stmt(&mut self, node: &mut ForStmt) {
        node.init = match node.init.take() {
            Some(VarDeclOrExpr::VarDecl(decl)) if decl.kind == VarDeclKind::Var => {
                self.hoister.for_init(*decl)
            }
            init => init,
        };
        node.visit_mut_children_with(self);
    }

    fn visit_mut_for_in_stmt(&mut self, node: &mut ForInStmt) {
        self.hoister.var_head(&mut node.left);
        node.visit_mut_children_with(self);
    }

    fn visit_mut_for_of_stmt(&mut self, node: &mut ForOfStmt) {
        self.hoister.var_head(&mut node.left);
        node.visit_mut_children_with(self);
    }
}

#[derive(Default)]
struct NameCounter(FxHashMap<String, usize>);

impl Visit for NameCounter {
    fn visit_ident(&mut self, id: &Ident) {
        *self.0.entry(id.sym.to_string()).or_insert(0) += 1;
    }
}

#[derive(Default)]
struct Renamer(FxHashMap<String, Ident>);

impl VisitMut for Renamer {
    fn visit_mut_ident(&mut self, id: &mut Ident) {
        if let Some(to) = self.0.get(&*id.sym) {
            id.sym = to.sym.clone();
        }
    }

    // `{ x }` reads property `x`; the key has to survive the rename.
    fn visit_mut_prop(&mut self, prop: &mut Prop) {
        let renamed = match &*prop {
            Prop::Shorthand(id) => self.0.get(&*id.sym).map(|to| (id.clone(), to.sym.clone())),
            _ => None,
        };
        match renamed {
            Some((id, sym)) => {
                *prop = Prop::KeyValue(KeyValueProp {
                    key: PropName::Ident(IdentName::new(id.sym.clone(), id.span)),
                    value: Box::new(Expr::Ident(Ident { sym, ..id })),
                });
            }
            None => prop.visit_mut_children_with(self),
        }
    }

    fn visit_mut_object_pat_prop(&mut self, prop: &mut ObjectPatProp) {
        let old = match &*prop {
            ObjectPatProp::Assign(assign) if self.0.contains_key(&*assign.key.id.sym) => {
                Some(assign.key.id.sym.clone())
            }
            _ => None,
        };
        prop.visit_mut_children_with(self);
        let Some(old) = old else { return };
        if let ObjectPatProp::Assign(assign) = &mut *prop {
            let binding = Pat::Ident(assign.key.clone());
            let value = match assign.value.take() {
                Some(default) => Pat::Assign(AssignPat {
                    span: assign.span,
                    left: Box::new(binding),
                    right: default,
                }),
                None => binding,
            };
            let key = PropName::Ident(IdentName::new(old, assign.key.id.span));
            *prop = ObjectPatProp::KeyValue(KeyValuePatProp {
                key,
                value: Box::new(value),
            });
        }
    }
}

fn strip_type_ann(pat: Pat) -> Pat {
    match pat {
        Pat::Ident(b) => Pat::Ident(BindingIdent {
            type_ann: None,
            ..b
        }),
        Pat::Array(a) => Pat::Array(ArrayPat { type_ann: None, ..a }),
        Pat::Object(o) => Pat::Object(ObjectPat { type_ann: None, ..o }),
        pat => pat,
    }
}

/// `pat = value` as an expression, when `pat` is a valid assignment target.
pub(crate) fn assign_pat(pat: Pat, value: Expr) -> Option<Expr> {
    let left = match strip_type_ann(pat) {
        Pat::Ident(b) => AssignTarget::Simple(SimpleAssignTarget::Ident(b)),
        Pat::Array(a) => AssignTarget::Pat(AssignTargetPat::Array(a)),
        Pat::Object(o) => AssignTarget::Pat(AssignTargetPat::Object(o)),
        Pat::Expr(e) => match *e {
            Expr::Member(m) => AssignTarget::Simple(SimpleAssignTarget::Member(m)),
            _ => return None,
        },
        _ => return None,
    };
    Some(Expr::Assign(AssignExpr {
        span: DUMMY_SP,
        op: AssignOp::Assign,
        left,
        right: crate::build::operand(value, crate::build::PREC_ASSIGN),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{compact, parse_body, print_stmts};

    fn hoisted(source: &str) -> (String, Vec<String>) {
        let body = parse_body(source);
        let mut scope = Scope::for_function(&[], &body);
        let (mut stmts, ids) = hoist_declarations(body, &mut scope);
        let mut all = scope.take_declarations();
        all.append(&mut stmts);
        (
            compact(&print_stmts(all)),
            ids.iter().map(|id| id.sym.to_string()).collect(),
        )
    }

    #[test]
    fn declarations_become_assignments() {
        let (code, ids) = hoisted("var a = 1, b; let c = a + 1; const { d, e } = obj;");
        assert_eq!(ids, ["a", "b", "c", "d", "e"]);
        assert_eq!(
            code,
            compact("var a, b, c, d, e; a = 1; c = a + 1; ({ d, e } = obj);")
        );
    }

    #[test]
    fn function_declarations_move_to_the_top() {
        let (code, _) = hoisted("a(); function g() { return 1; } var x = g();");
        assert_eq!(code, compact("function g() { return 1; } var x; a(); x = g();"));
    }

    #[test]
    fn awaiting_loop_heads_lose_their_keyword() {
        let (code, ids) = hoisted(
            "for (let i = 0; i < 3; i++) { await a(i); }
            for (var k in o) { await b(k); }",
        );
        assert_eq!(ids, ["i", "k"]);
        assert_eq!(
            code,
            compact(
                "var i, k;
                for (i = 0; i < 3; i++) { await a(i); }
                for (k in o) { await b(k); }"
            )
        );
    }

    #[test]
    fn awaiting_loop_body_keeps_block_scoped_bindings() {
        let (code, ids) = hoisted(
            "while (a) { var v = 1; let w = 2; await g(v, w); }
            for (const x of xs) { await h(x); }",
        );
        assert_eq!(ids, ["v"]);
        assert_eq!(
            code,
            compact(
                "var v;
                while (a) { v = 1; let w = 2; await g(v, w); }
                for (const x of xs) { await h(x); }"
            )
        );
    }

    #[test]
    fn statements_that_do_not_await_keep_their_scopes() {
        let source = "for (let i = 0; i < 3; i++) { fns.push(function () { return i; }); }
            if (c) { const y = 1; g(y); }
            await 0;";
        let (code, ids) = hoisted(source);
        assert!(ids.is_empty(), "{ids:?}");
        assert_eq!(code, compact(source));
    }

    #[test]
    fn var_inside_a_kept_statement_still_moves() {
        let (code, ids) = hoisted("if (c) { var y = 1; } await 0; return y;");
        assert_eq!(ids, ["y"]);
        assert_eq!(code, compact("var y; if (c) { y = 1; } await 0; return y;"));
    }

    #[test]
    fn shadowing_block_binding_is_renamed() {
        let (code, ids) = hoisted("let x = 1; if (c) { let x = 2; await g(x); } return x;");
        assert_eq!(ids, ["x", "_x"]);
        assert_eq!(
            code,
            compact("var x, _x; x = 1; if (c) { _x = 2; await g(_x); } return x;")
        );
    }

    #[test]
    fn renamed_shorthand_keeps_its_key() {
        let (code, _) = hoisted(
            "if (c) { const { k } = o; await g({ k }); } else { k(); }",
        );
        assert_eq!(
            code,
            compact("var _k; if (c) { ({ k: _k } = o); await g({ k: _k }); } else { k(); }")
        );
    }

    #[test]
    fn block_binding_without_conflict_keeps_its_name() {
        let (code, _) = hoisted("if (c) { let z = 2; await g(z); }");
        assert_eq!(code, compact("var z; if (c) { z = 2; await g(z); }"));
    }

    #[test]
    fn block_scoped_declaration_without_initializer_resets() {
        let (code, _) = hoisted("if (a) { let x; await f(x); }");
        assert_eq!(code, compact("var x; if (a) { x = void 0; await f(x); }"));
    }

    #[test]
    fn nested_functions_keep_their_declarations() {
        let (code, ids) = hoisted("var f = function () { var inner = 1; };");
        assert_eq!(ids, ["f"]);
        assert!(code.contains("varinner=1"), "{code}");
    }
}
