//! Per-function symbol table.
//!
//! A [`Scope`] lives for the rewrite of one function body. It knows every
//! name referenced in that body (including nested functions, whose free
//! variables may refer to ours) so synthetic names never shadow or capture a
//! user binding. It also collects the declarations the passes hoist to the
//! top of the rewritten function.

use rustc_hash::{FxHashMap, FxHashSet};
use swc_ecma_ast::*;
use swc_ecma_visit::{Visit, VisitWith};

use crate::build::{make_declarator, make_ident, make_var_decl};

#[derive(Debug, Default)]
pub struct Scope {
    used: FxHashSet<String>,
    counters: FxHashMap<String, u32>,
    declared: FxHashSet<String>,
    vars: Vec<VarDeclarator>,
    functions: Vec<Stmt>,
}

struct NameCollector<'a>(&'a mut FxHashSet<String>);

impl Visit for NameCollector<'_> {
    fn visit_ident(&mut self, node: &Ident) {
        self.0.insert(node.sym.to_string());
    }
}

impl Scope {
    /// Build a scope for a function with the given parameters and body.
    pub fn for_function(params: &[Pat], body: &[Stmt]) -> Self {
        let mut used = FxHashSet::default();
        let mut collector = NameCollector(&mut used);
        for param in params {
            param.visit_with(&mut collector);
        }
        for stmt in body {
            stmt.visit_with(&mut collector);
        }
        Self {
            used,
            ..Default::default()
        }
    }

    /// Produce a fresh `_hint`, `_hint2`, `_hint3`, ... identifier that no
    /// name in the function uses yet.
    pub fn generate_uid(&mut self, hint: &str) -> Ident {
        let base = format!("_{}", hint.trim_start_matches('_'));
        let counter = self.counters.entry(base.clone()).or_insert(0);
        loop {
            *counter += 1;
            let name = if *counter == 1 {
                base.clone()
            } else {
                format!("{base}{counter}")
            };
            if self.used.insert(name.clone()) {
                return make_ident(&name);
            }
        }
    }

    /// Add `id` to the hoisted `var` list (once).
    pub fn declare(&mut self, id: &Ident) {
        if self.declared.insert(id.sym.to_string()) {
            self.vars.push(make_declarator(id, None));
        }
    }

    /// Add `id = init` to the hoisted `var` list.
    pub fn declare_init(&mut self, id: &Ident, init: Expr) {
        if self.declared.insert(id.sym.to_string()) {
            self.vars.push(make_declarator(id, Some(init)));
        }
    }

    /// Hoist a function declaration to the top of the rewritten body.
    pub fn declare_fn(&mut self, decl: Stmt) {
        self.functions.push(decl);
    }

    /// Hoisted function declarations followed by a single `var` statement.
    pub fn take_declarations(&mut self) -> Vec<Stmt> {
        let mut out = std::mem::take(&mut self.functions);
        if !self.vars.is_empty() {
            out.push(make_var_decl(std::mem::take(&mut self.vars)));
        }
        self.declared.clear();
        out
    }
}
