#![allow(dead_code)]

//! Helpers for building annotated trees by hand, standing in for the front
//! end that normally produces them.

use joltc::ast::*;
use joltc::types::{TypeId, TypeTable};

pub fn gen_ir(types: TypeTable, defs: Vec<TopDef>) -> String {
    joltc::compile(&Program { defs }, types).expect("code generation failed")
}

pub fn param(ty: TypeId, name: &str) -> Param {
    Param {
        ty,
        name: name.to_string(),
    }
}

pub fn fn_def(ret: TypeId, name: &str, params: Vec<Param>, stmts: Vec<Stmt>) -> FnDef {
    FnDef {
        ret,
        name: name.to_string(),
        params,
        body: Block { stmts },
    }
}

pub fn class_def(
    name: &str,
    superclass: Option<&str>,
    fields: Vec<Param>,
    methods: Vec<FnDef>,
) -> ClassDef {
    ClassDef {
        name: name.to_string(),
        superclass: superclass.map(str::to_string),
        fields,
        methods,
    }
}

pub fn int_lit(ty: TypeId, value: i32) -> Expr {
    Expr::new(ty, ExprKind::Int(value))
}

pub fn bool_lit(ty: TypeId, value: bool) -> Expr {
    Expr::new(ty, ExprKind::Bool(value))
}

pub fn str_lit(ty: TypeId, value: &str) -> Expr {
    Expr::new(ty, ExprKind::Str(value.to_string()))
}

pub fn var(ty: TypeId, name: &str) -> Expr {
    Expr::new(ty, ExprKind::Var(name.to_string()))
}

pub fn call(ret: TypeId, name: &str, args: Vec<Expr>) -> Expr {
    Expr::new(
        ret,
        ExprKind::Call {
            name: name.to_string(),
            args,
        },
    )
}

pub fn method_call(ret: TypeId, recv: Expr, name: &str, args: Vec<Expr>) -> Expr {
    Expr::new(
        ret,
        ExprKind::MethodCall {
            recv: Box::new(recv),
            name: name.to_string(),
            args,
        },
    )
}

pub fn decl(ty: TypeId, name: &str, init: Option<Expr>) -> Stmt {
    Stmt::Decl {
        ty,
        items: vec![DeclItem {
            name: name.to_string(),
            init,
        }],
    }
}

/// Index of the first line satisfying `pred`; panics with the full IR when
/// nothing matches, which makes failures readable.
pub fn line_index(ir: &str, pred: impl Fn(&str) -> bool) -> usize {
    ir.lines()
        .position(|l| pred(l.trim()))
        .unwrap_or_else(|| panic!("no matching line in generated IR:\n{}", ir))
}
