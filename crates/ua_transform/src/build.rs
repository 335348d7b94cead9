//! Builders for the synthetic nodes the passes emit.
//!
//! Every builder produces nodes with `DUMMY_SP` spans and an empty syntax
//! context. SWC's code generator prints the tree as-is, so the builders add
//! the parentheses operator precedence requires.

use swc_common::{Span, SyntaxContext, DUMMY_SP};
use swc_ecma_ast::*;

pub(crate) fn make_ident(name: &str) -> Ident {
    Ident::new_no_ctxt(name.into(), DUMMY_SP)
}

pub(crate) fn ident_expr(id: &Ident) -> Expr {
    Expr::Ident(id.clone())
}

pub(crate) fn binding(id: &Ident) -> Pat {
    Pat::Ident(BindingIdent {
        id: id.clone(),
        type_ann: None,
    })
}

pub(crate) fn make_num(value: f64) -> Expr {
    Expr::Lit(Lit::Num(Number {
        span: DUMMY_SP,
        value,
        raw: None,
    }))
}

pub(crate) fn make_bool(value: bool) -> Expr {
    Expr::Lit(Lit::Bool(Bool {
        span: DUMMY_SP,
        value,
    }))
}

pub(crate) fn make_null() -> Expr {
    Expr::Lit(Lit::Null(Null { span: DUMMY_SP }))
}

/// `void 0`
pub(crate) fn make_undefined() -> Expr {
    Expr::Unary(UnaryExpr {
        span: DUMMY_SP,
        op: UnaryOp::Void,
        arg: Box::new(make_num(0.0)),
    })
}

pub(crate) fn make_this() -> Expr {
    Expr::This(ThisExpr { span: DUMMY_SP })
}

pub(crate) fn make_array(elems: Vec<Expr>) -> Expr {
    Expr::Array(ArrayLit {
        span: DUMMY_SP,
        elems: elems.into_iter().map(|e| Some(make_arg(e))).collect(),
    })
}

/// `obj.prop`
pub(crate) fn make_member(obj: Expr, prop: &str) -> Expr {
    Expr::Member(MemberExpr {
        span: DUMMY_SP,
        obj: operand(obj, PREC_MEMBER),
        prop: MemberProp::Ident(IdentName::new(prop.into(), DUMMY_SP)),
    })
}

/// `obj[prop]`
pub(crate) fn make_computed(obj: Expr, prop: Expr) -> Expr {
    Expr::Member(MemberExpr {
        span: DUMMY_SP,
        obj: operand(obj, PREC_MEMBER),
        prop: MemberProp::Computed(ComputedPropName {
            span: DUMMY_SP,
            expr: Box::new(prop),
        }),
    })
}

/// `obj[index]`
pub(crate) fn make_index(obj: &Ident, index: usize) -> Expr {
    make_computed(ident_expr(obj), make_num(index as f64))
}

pub(crate) fn make_arg(expr: Expr) -> ExprOrSpread {
    ExprOrSpread {
        spread: None,
        expr: operand(expr, PREC_ASSIGN),
    }
}

pub(crate) fn make_call(callee: Expr, args: Vec<Expr>) -> Expr {
    let callee = match callee {
        callee @ (Expr::Fn(_) | Expr::Arrow(_)) => paren(callee),
        callee => callee,
    };
    Expr::Call(CallExpr {
        span: DUMMY_SP,
        callee: Callee::Expr(operand(callee, PREC_MEMBER)),
        args: args.into_iter().map(make_arg).collect(),
        type_args: None,
        ..Default::default()
    })
}

/// `obj.method(args...)`
pub(crate) fn make_method_call(obj: Expr, method: &str, args: Vec<Expr>) -> Expr {
    make_call(make_member(obj, method), args)
}

pub(crate) fn make_function(params: Vec<Pat>, body: Vec<Stmt>) -> Box<Function> {
    Box::new(Function {
        params: params
            .into_iter()
            .map(|pat| Param {
                span: DUMMY_SP,
                decorators: vec![],
                pat,
            })
            .collect(),
        decorators: vec![],
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        body: Some(make_block(body)),
        is_generator: false,
        is_async: false,
        type_params: None,
        return_type: None,
    })
}

/// Anonymous `function (params) { body }`.
pub(crate) fn make_fn_expr(params: Vec<Pat>, body: Vec<Stmt>) -> Expr {
    Expr::Fn(FnExpr {
        ident: None,
        function: make_function(params, body),
    })
}

pub(crate) fn make_fn_decl(ident: &Ident, function: Box<Function>) -> Stmt {
    Stmt::Decl(Decl::Fn(FnDecl {
        ident: ident.clone(),
        declare: false,
        function,
    }))
}

/// `(function () { body })()`
pub(crate) fn make_iife(body: Vec<Stmt>) -> Expr {
    make_call(make_fn_expr(vec![], body), vec![])
}

pub(crate) fn make_await(arg: Expr) -> Expr {
    Expr::Await(AwaitExpr {
        span: DUMMY_SP,
        arg: operand(arg, PREC_UNARY),
    })
}

/// `target = value`
pub(crate) fn make_assign(target: &Ident, value: Expr) -> Expr {
    Expr::Assign(AssignExpr {
        span: DUMMY_SP,
        op: AssignOp::Assign,
        left: AssignTarget::Simple(SimpleAssignTarget::Ident(BindingIdent {
            id: target.clone(),
            type_ann: None,
        })),
        right: operand(value, PREC_ASSIGN),
    })
}

pub(crate) fn make_assign_stmt(target: &Ident, value: Expr) -> Stmt {
    make_expr_stmt(make_assign(target, value))
}

/// Wrap an expression as a statement, parenthesizing it when it would
/// otherwise start with `{`, `function` or `class`.
pub(crate) fn make_expr_stmt(expr: Expr) -> Stmt {
    let expr = if starts_ambiguously(&expr) {
        paren(expr)
    } else {
        expr
    };
    Stmt::Expr(ExprStmt {
        span: DUMMY_SP,
        expr: Box::new(expr),
    })
}

pub(crate) fn make_return(arg: Option<Expr>) -> Stmt {
    Stmt::Return(ReturnStmt {
        span: DUMMY_SP,
        arg: arg.map(Box::new),
    })
}

pub(crate) fn make_throw(arg: Expr) -> Stmt {
    Stmt::Throw(ThrowStmt {
        span: DUMMY_SP,
        arg: Box::new(arg),
    })
}

pub(crate) fn make_block(stmts: Vec<Stmt>) -> BlockStmt {
    BlockStmt {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        stmts,
    }
}

pub(crate) fn make_if(test: Expr, cons: Vec<Stmt>, alt: Option<Vec<Stmt>>) -> Stmt {
    Stmt::If(IfStmt {
        span: DUMMY_SP,
        test: Box::new(test),
        cons: Box::new(Stmt::Block(make_block(cons))),
        alt: alt.map(|alt| Box::new(Stmt::Block(make_block(alt)))),
    })
}

/// Put `label` back on a rewritten statement. The body stays a block only
/// when the rewrite produced more than one statement.
pub(crate) fn relabel(span: Span, label: Ident, mut body: Vec<Stmt>) -> Stmt {
    let body = match body.len() {
        1 => body.remove(0),
        _ => Stmt::Block(make_block(body)),
    };
    Stmt::Labeled(LabeledStmt {
        span,
        label,
        body: Box::new(body),
    })
}

pub(crate) fn make_var_decl(decls: Vec<VarDeclarator>) -> Stmt {
    Stmt::Decl(Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        kind: VarDeclKind::Var,
        declare: false,
        decls,
    })))
}

pub(crate) fn make_declarator(id: &Ident, init: Option<Expr>) -> VarDeclarator {
    VarDeclarator {
        span: DUMMY_SP,
        name: binding(id),
        init: init.map(Box::new),
        definite: false,
    }
}

pub(crate) fn make_bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let prec = bin_precedence(op);
    let left = if mixes_nullish(op, &left) {
        Box::new(paren(left))
    } else {
        operand(left, prec)
    };
    let right = if mixes_nullish(op, &right) {
        Box::new(paren(right))
    } else {
        operand(right, prec + 1)
    };
    Expr::Bin(BinExpr {
        span: DUMMY_SP,
        op,
        left,
        right,
    })
}

pub(crate) fn make_and(left: Expr, right: Expr) -> Expr {
    make_bin(BinaryOp::LogicalAnd, left, right)
}

pub(crate) fn make_or(left: Expr, right: Expr) -> Expr {
    make_bin(BinaryOp::LogicalOr, left, right)
}

pub(crate) fn make_not(arg: Expr) -> Expr {
    Expr::Unary(UnaryExpr {
        span: DUMMY_SP,
        op: UnaryOp::Bang,
        arg: operand(arg, PREC_UNARY),
    })
}

/// Negate an expression used only for its truthiness, so `!!x` can fold
/// back to `x`.
pub(crate) fn negate_test(test: Expr) -> Expr {
    match test {
        Expr::Unary(UnaryExpr {
            op: UnaryOp::Bang,
            arg,
            ..
        }) => unparen_owned(*arg),
        test => make_not(test),
    }
}

pub(crate) fn paren(expr: Expr) -> Expr {
    Expr::Paren(ParenExpr {
        span: DUMMY_SP,
        expr: Box::new(expr),
    })
}

pub(crate) fn unparen(mut expr: &Expr) -> &Expr {
    while let Expr::Paren(p) = expr {
        expr = &p.expr;
    }
    expr
}

pub(crate) fn unparen_owned(mut expr: Expr) -> Expr {
    while let Expr::Paren(p) = expr {
        expr = *p.expr;
    }
    expr
}

/// Wrap `expr` in parentheses when it binds looser than `min`.
pub(crate) fn operand(expr: Expr, min: u8) -> Box<Expr> {
    if precedence(&expr) < min {
        Box::new(paren(expr))
    } else {
        Box::new(expr)
    }
}

pub(crate) const PREC_ASSIGN: u8 = 2;
pub(crate) const PREC_COND: u8 = 3;
pub(crate) const PREC_UNARY: u8 = 15;
pub(crate) const PREC_MEMBER: u8 = 18;

fn bin_precedence(op: BinaryOp) -> u8 {
    use BinaryOp::*;
    match op {
        NullishCoalescing | LogicalOr => 4,
        LogicalAnd => 5,
        BitOr => 6,
        BitXor => 7,
        BitAnd => 8,
        EqEq | NotEq | EqEqEq | NotEqEq => 9,
        Lt | LtEq | Gt | GtEq | In | InstanceOf => 10,
        LShift | RShift | ZeroFillRShift => 11,
        Add | Sub => 12,
        Mul | Div | Mod => 13,
        Exp => 14,
    }
}

pub(crate) fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Seq(_) => 1,
        Expr::Assign(_) | Expr::Arrow(_) | Expr::Yield(_) => PREC_ASSIGN,
        Expr::Cond(_) => PREC_COND,
        Expr::Bin(bin) => bin_precedence(bin.op),
        Expr::Unary(_) | Expr::Await(_) => PREC_UNARY,
        Expr::Update(_) => 16,
        Expr::New(NewExpr { args: None, .. }) => 17,
        Expr::Call(_)
        | Expr::New(_)
        | Expr::Member(_)
        | Expr::SuperProp(_)
        | Expr::OptChain(_)
        | Expr::TaggedTpl(_)
        | Expr::MetaProp(_) => PREC_MEMBER,
        _ => 19,
    }
}

fn mixes_nullish(op: BinaryOp, child: &Expr) -> bool {
    let Expr::Bin(child) = child else {
        return false;
    };
    let logical = |op: BinaryOp| matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr);
    (op == BinaryOp::NullishCoalescing && logical(child.op))
        || (logical(op) && child.op == BinaryOp::NullishCoalescing)
}

pub(crate) fn starts_ambiguously(expr: &Expr) -> bool {
    match expr {
        Expr::Object(_) | Expr::Fn(_) | Expr::Class(_) => true,
        Expr::Assign(AssignExpr {
            left: AssignTarget::Pat(AssignTargetPat::Object(_)),
            ..
        }) => true,
        Expr::Assign(AssignExpr {
            left: AssignTarget::Simple(SimpleAssignTarget::Member(m)),
            ..
        }) => starts_ambiguously(&m.obj),
        Expr::Member(m) => starts_ambiguously(&m.obj),
        Expr::Call(CallExpr {
            callee: Callee::Expr(callee),
            ..
        }) => starts_ambiguously(callee),
        Expr::Bin(bin) => starts_ambiguously(&bin.left),
        Expr::Cond(cond) => starts_ambiguously(&cond.test),
        Expr::Seq(seq) => seq.exprs.first().is_some_and(|e| starts_ambiguously(e)),
        _ => false,
    }
}
