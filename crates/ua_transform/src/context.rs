//! Capture `this` and `arguments` of an async function.
//!
//! The generated callbacks are ordinary functions with their own `this` and
//! `arguments`, so references to the async function's context are replaced
//! by `_this` / `_arguments`, initialized once at the top of the rewritten
//! body. Arrow functions see the same context and are entered; ordinary
//! functions and class bodies are not.

use swc_ecma_ast::*;
use swc_ecma_visit::{VisitMut, VisitMutWith};

use crate::{
    build::{make_ident, make_this},
    scope::Scope,
};

struct ContextCapture<'a> {
    scope: &'a mut Scope,
    this: Option<Ident>,
    arguments: Option<Ident>,
    capture_arguments: bool,
}

impl VisitMut for ContextCapture<'_> {
    fn visit_mut_function(&mut self, _: &mut Function) {}
    fn visit_mut_constructor(&mut self, _: &mut Constructor) {}
    fn visit_mut_getter_prop(&mut self, _: &mut GetterProp) {}
    fn visit_mut_setter_prop(&mut self, _: &mut SetterProp) {}
    fn visit_mut_class_members(&mut self, _: &mut Vec<ClassMember>) {}

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::This(_) => {
                let id = self
                    .this
                    .get_or_insert_with(|| self.scope.generate_uid("this"))
                    .clone();
                *expr = Expr::Ident(id);
            }
            Expr::Ident(ident) if self.capture_arguments && &*ident.sym == "arguments" => {
                let id = self
                    .arguments
                    .get_or_insert_with(|| self.scope.generate_uid("arguments"))
                    .clone();
                *expr = Expr::Ident(id);
            }
            _ => expr.visit_mut_children_with(self),
        }
    }
}

/// Replace `this` / `arguments` in `body` and declare the capturing
/// variables in `scope`.
///
/// Async arrows get the same treatment: `var _this = this` inside an arrow
/// body still reads the lexical context.
pub(crate) fn capture_context(params: &[Pat], body: &mut [Stmt], scope: &mut Scope) {
    let shadows_arguments = params.iter().any(|p| {
        let mut ids = vec![];
        crate::walk::pat_idents(p, &mut ids);
        ids.iter().any(|id| &*id.sym == "arguments")
    });

    let mut capture = ContextCapture {
        scope,
        this: None,
        arguments: None,
        capture_arguments: !shadows_arguments,
    };
    for stmt in body.iter_mut() {
        stmt.visit_mut_with(&mut capture);
    }

    let ContextCapture {
        scope,
        this,
        arguments,
        ..
    } = capture;
    if let Some(this) = this {
        scope.declare_init(&this, make_this());
    }
    if let Some(arguments) = arguments {
        scope.declare_init(&arguments, Expr::Ident(make_ident("arguments")));
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{assert_output_contains, compact, transform};

    #[test]
    fn this_is_captured_before_the_chain() {
        assert_output_contains(
            "async function f() { await a; return this.x; }",
            "var _this = this; return Promise.resolve().then(function () { return a; }).then(function () { return _this.x; });",
        );
    }

    #[test]
    fn arguments_are_captured() {
        assert_output_contains(
            "async function f() { await a; return arguments[0]; }",
            "var _arguments = arguments;",
        );
    }

    #[test]
    fn nested_function_context_is_untouched() {
        let out = compact(&transform(
            "async function f() { await a; return function () { return this; }; }",
        ));
        assert!(!out.contains("_this"), "{out}");
    }

    #[test]
    fn arrows_share_the_captured_context() {
        assert_output_contains(
            "async function f() { await a; return () => this; }",
            "return () => _this;",
        );
    }
}
