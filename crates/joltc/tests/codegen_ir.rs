//! Structural properties of the generated instruction stream.

mod common;

use common::*;
use joltc::ast::*;
use joltc::types::{Primitive, TypeTable};

#[test]
fn string_literal_emitted_once_per_unit() {
    let types = TypeTable::new();
    let void = types.primitive(Primitive::Void);
    let string = types.primitive(Primitive::Str);

    let main = fn_def(
        void,
        "main",
        Vec::new(),
        vec![
            Stmt::Expr(call(void, "printString", vec![str_lit(string, "hello")])),
            Stmt::Expr(call(void, "printString", vec![str_lit(string, "hello")])),
        ],
    );
    let ir = gen_ir(types, vec![TopDef::Fn(main)]);

    assert_eq!(ir.matches("c\"hello\\00\"").count(), 1);
    assert!(ir.lines().any(|l| l.starts_with("@.string$")));
    // Both uses decay the same global.
    assert_eq!(ir.matches("getelementptr inbounds [6 x i8]").count(), 2);
}

#[test]
fn conjunction_right_operand_is_branch_guarded() {
    let types = TypeTable::new();
    let void = types.primitive(Primitive::Void);
    let boolean = types.primitive(Primitive::Bool);

    let side_effect = fn_def(
        boolean,
        "sideEffect",
        Vec::new(),
        vec![Stmt::Ret(Some(bool_lit(boolean, true)))],
    );
    let main = fn_def(
        void,
        "main",
        Vec::new(),
        vec![Stmt::Expr(Expr::new(
            boolean,
            ExprKind::And {
                lhs: Box::new(bool_lit(boolean, false)),
                rhs: Box::new(call(boolean, "sideEffect", Vec::new())),
            },
        ))],
    );
    let ir = gen_ir(types, vec![TopDef::Fn(side_effect), TopDef::Fn(main)]);

    let true_label = line_index(&ir, |l| l.starts_with(".label$and_true") && l.ends_with(':'));
    let false_label = line_index(&ir, |l| {
        l.starts_with(".label$and_false") && l.ends_with(':')
    });
    let callsite = line_index(&ir, |l| l.contains("call i1 @sideEffect"));

    // The call is reachable only through the "left is true" branch.
    assert!(true_label < callsite);
    assert!(callsite < false_label);
    assert!(ir.contains("br i1 false"));
}

#[test]
fn recursive_method_call_is_mangled_with_receiver() {
    let types = TypeTable::new();
    let void = types.primitive(Primitive::Void);

    let m = fn_def(
        void,
        "m",
        Vec::new(),
        vec![Stmt::Expr(call(void, "m", Vec::new()))],
    );
    let b = class_def("B", None, Vec::new(), vec![m]);
    let ir = gen_ir(types, vec![TopDef::Class(b)]);

    assert!(ir.contains("define void @B.m(%B* %self) {"));
    assert!(ir.contains("call void @B.m(%B* %self)"));
    // The synthesized constructor is emitted alongside the methods.
    assert!(ir.contains("define void @B.$init(%B* %self) {"));
}

#[test]
fn multidimensional_construction_emits_counted_loop() {
    let mut types = TypeTable::new();
    let void = types.primitive(Primitive::Void);
    let int = types.primitive(Primitive::Int);
    let int2 = types.for_array(int, 2);

    let main = fn_def(
        void,
        "main",
        Vec::new(),
        vec![decl(
            int2,
            "a",
            Some(Expr::new(
                int2,
                ExprKind::NewArray {
                    dims: vec![int_lit(int, 3), int_lit(int, 4)],
                },
            )),
        )],
    );
    let ir = gen_ir(types, vec![TopDef::Fn(main)]);

    // Both array types are defined ahead of use.
    assert!(ir.contains("%Array_int_1D = type { i32, i32* }"));
    assert!(ir.contains("%Array_int_2D = type { i32, %Array_int_1D** }"));

    // One generated loop, bounded by the outer length.
    let checks = ir
        .lines()
        .filter(|l| l.starts_with(".label$array_init_check") && l.ends_with(':'))
        .count();
    assert_eq!(checks, 1);
    assert!(ir.lines().any(|l| l.contains("icmp slt") && l.ends_with(", 3")));

    // The inner array (length 4) is built inside the loop body.
    let body = line_index(&ir, |l| {
        l.starts_with(".label$array_init_body") && l.ends_with(':')
    });
    let end = line_index(&ir, |l| {
        l.starts_with(".label$array_init_end") && l.ends_with(':')
    });
    let inner_len = line_index(&ir, |l| l.starts_with("store i32 4, i32*"));
    assert!(body < inner_len);
    assert!(inner_len < end);
}

#[test]
fn prologue_precedes_function_bodies() {
    let types = TypeTable::new();
    let void = types.primitive(Primitive::Void);
    let int = types.primitive(Primitive::Int);

    let b = class_def("B", None, vec![param(int, "x")], Vec::new());
    let main = fn_def(void, "main", Vec::new(), vec![Stmt::Empty]);
    let ir = gen_ir(types, vec![TopDef::Class(b), TopDef::Fn(main)]);

    let first_define = line_index(&ir, |l| l.starts_with("define "));
    let print_decl = line_index(&ir, |l| l == "declare void @printInt(i32)");
    let type_def = line_index(&ir, |l| l == "%B = type [4 x i8]");
    assert!(print_decl < first_define);
    assert!(type_def < first_define);
}

#[test]
fn inherited_dispatch_casts_receiver_to_defining_class() {
    let mut types = TypeTable::new();
    let void = types.primitive(Primitive::Void);
    let int = types.primitive(Primitive::Int);
    let b_ty = types.for_class("B");

    let m = fn_def(void, "m", Vec::new(), Vec::new());
    let a = class_def("A", None, vec![param(int, "x")], vec![m]);
    let b = class_def("B", Some("A"), Vec::new(), Vec::new());
    let main = fn_def(
        void,
        "main",
        Vec::new(),
        vec![
            decl(b_ty, "b", Some(Expr::new(b_ty, ExprKind::NewObject))),
            Stmt::Expr(method_call(void, var(b_ty, "b"), "m", Vec::new())),
        ],
    );
    let ir = gen_ir(
        types,
        vec![TopDef::Class(a), TopDef::Class(b), TopDef::Fn(main)],
    );

    // B inherits A's fields, so its allocation carries A's size.
    assert!(ir.contains("call i8* @calloc(i32 1, i32 4)"));
    // The receiver is upcast to the class that defines the method.
    assert!(ir
        .lines()
        .any(|l| l.contains("bitcast %B*") && l.contains(" to %A*")));
    assert!(ir.contains("call void @A.m(%A* %.temp$cast"));
}

#[test]
fn sibling_scopes_do_not_collide_on_names() {
    let types = TypeTable::new();
    let void = types.primitive(Primitive::Void);
    let int = types.primitive(Primitive::Int);

    let main = fn_def(
        void,
        "main",
        Vec::new(),
        vec![
            Stmt::Block(Block {
                stmts: vec![decl(int, "x", None)],
            }),
            Stmt::Block(Block {
                stmts: vec![decl(int, "x", None)],
            }),
        ],
    );
    let ir = gen_ir(types, vec![TopDef::Fn(main)]);

    let allocas: Vec<&str> = ir
        .lines()
        .map(str::trim)
        .filter(|l| l.contains("= alloca i32") && l.starts_with("%x$"))
        .collect();
    assert_eq!(allocas.len(), 2);
    assert_ne!(allocas[0], allocas[1]);
}

#[test]
fn literal_negation_folds_without_instruction() {
    let types = TypeTable::new();
    let int = types.primitive(Primitive::Int);

    let f = fn_def(
        int,
        "f",
        Vec::new(),
        vec![Stmt::Ret(Some(Expr::new(
            int,
            ExprKind::Neg(Box::new(int_lit(int, 5))),
        )))],
    );
    let ir = gen_ir(types, vec![TopDef::Fn(f)]);

    assert!(ir.contains("ret i32 -5"));
    assert!(!ir.contains("sub i32 0,"));
}

#[test]
fn reference_declarations_default_to_null() {
    let mut types = TypeTable::new();
    let void = types.primitive(Primitive::Void);
    let a_ty = types.for_class("A");

    let a = class_def("A", None, Vec::new(), Vec::new());
    let main = fn_def(void, "main", Vec::new(), vec![decl(a_ty, "a", None)]);
    let ir = gen_ir(types, vec![TopDef::Class(a), TopDef::Fn(main)]);

    assert!(ir.contains("store %A* null, %A**"));
}

#[test]
fn array_length_reads_header_field_zero() {
    let mut types = TypeTable::new();
    let int = types.primitive(Primitive::Int);
    let int1 = types.for_array(int, 1);

    let f = fn_def(
        int,
        "f",
        vec![param(int1, "a")],
        vec![Stmt::Ret(Some(Expr::new(
            int,
            ExprKind::Length(Box::new(var(int1, "a"))),
        )))],
    );
    let ir = gen_ir(types, vec![TopDef::Fn(f)]);

    assert!(ir
        .lines()
        .any(|l| l.contains("getelementptr %Array_int_1D") && l.ends_with("i32 0, i32 0")));
    assert!(ir.contains("ret i32 %.temp$length$"));
}

#[test]
fn element_assignment_stores_through_element_address() {
    let mut types = TypeTable::new();
    let void = types.primitive(Primitive::Void);
    let int = types.primitive(Primitive::Int);
    let int1 = types.for_array(int, 1);

    let main = fn_def(
        void,
        "main",
        Vec::new(),
        vec![
            decl(
                int1,
                "a",
                Some(Expr::new(
                    int1,
                    ExprKind::NewArray {
                        dims: vec![int_lit(int, 3)],
                    },
                )),
            ),
            Stmt::Assign {
                target: Target::Index {
                    array: var(int1, "a"),
                    index: int_lit(int, 0),
                },
                value: int_lit(int, 2),
            },
        ],
    );
    let ir = gen_ir(types, vec![TopDef::Fn(main)]);

    assert!(ir
        .lines()
        .any(|l| l.trim().starts_with("store i32 2, i32* %.temp$element_ptr")));
}

#[test]
fn while_loop_jumps_back_to_check() {
    let types = TypeTable::new();
    let void = types.primitive(Primitive::Void);
    let int = types.primitive(Primitive::Int);
    let boolean = types.primitive(Primitive::Bool);

    let main = fn_def(
        void,
        "main",
        Vec::new(),
        vec![
            decl(int, "i", Some(int_lit(int, 0))),
            Stmt::While {
                cond: Expr::new(
                    boolean,
                    ExprKind::Bin {
                        op: BinOp::Lt,
                        lhs: Box::new(var(int, "i")),
                        rhs: Box::new(int_lit(int, 3)),
                    },
                ),
                body: Box::new(Stmt::Incr("i".to_string())),
            },
        ],
    );
    let ir = gen_ir(types, vec![TopDef::Fn(main)]);

    let check_jumps = ir
        .lines()
        .filter(|l| l.trim().starts_with("br label %.label$while_check"))
        .count();
    // Entry jump plus the back edge.
    assert_eq!(check_jumps, 2);
    assert!(ir
        .lines()
        .any(|l| l.starts_with(".label$while_body") && l.ends_with(':')));
    assert!(ir
        .lines()
        .any(|l| l.starts_with(".label$while_end") && l.ends_with(':')));
}

#[test]
fn redefinition_is_a_declaration_error() {
    let types = TypeTable::new();
    let void = types.primitive(Primitive::Void);

    let f1 = fn_def(void, "f", Vec::new(), Vec::new());
    let f2 = fn_def(void, "f", Vec::new(), Vec::new());
    let result = joltc::compile(
        &Program {
            defs: vec![TopDef::Fn(f1), TopDef::Fn(f2)],
        },
        types,
    );
    assert!(result.is_err());

    // Builtins occupy the global table too.
    let types = TypeTable::new();
    let void = types.primitive(Primitive::Void);
    let clash = fn_def(void, "printInt", Vec::new(), Vec::new());
    assert!(joltc::compile(
        &Program {
            defs: vec![TopDef::Fn(clash)],
        },
        types,
    )
    .is_err());
}
