//! Expression lowering.
//!
//! One rule per expression kind, driven by a strict depth-first,
//! left-to-right traversal: operand evaluation order is observable language
//! semantics and must survive lowering. Every rule either produces a
//! [`Value`] directly or recurses into sub-expressions first and emits the
//! instructions that combine them.
//!
//! Lookups that cannot miss after a correct type-checking phase go through
//! [`ice`] on `None`; nothing here reports user-facing errors.

use crate::ast::{BinOp, Expr, ExprKind};
use crate::diagnostics::ice;
use crate::env::{FunType, CONSTRUCTOR_NAME};
use crate::types::{Lit, Primitive, TypeId, POINTER_SIZE};

use super::{natural_level, CodeGen, Value};

/// Opcode selection for a binary operator: `(purpose tag, opcode)`.
fn opcode_for(op: BinOp, double: bool) -> (&'static str, &'static str) {
    match (op, double) {
        (BinOp::Add, false) => ("add", "add"),
        (BinOp::Add, true) => ("add", "fadd"),
        (BinOp::Sub, false) => ("sub", "sub"),
        (BinOp::Sub, true) => ("sub", "fsub"),
        (BinOp::Mul, false) => ("mul", "mul"),
        (BinOp::Mul, true) => ("mul", "fmul"),
        (BinOp::Div, false) => ("div", "sdiv"),
        (BinOp::Div, true) => ("div", "fdiv"),
        (BinOp::Mod, false) => ("mod", "srem"),
        (BinOp::Mod, true) => ("mod", "frem"),
        (BinOp::Lt, false) => ("cmp", "icmp slt"),
        (BinOp::Lt, true) => ("cmp", "fcmp olt"),
        (BinOp::Le, false) => ("cmp", "icmp sle"),
        (BinOp::Le, true) => ("cmp", "fcmp ole"),
        (BinOp::Gt, false) => ("cmp", "icmp sgt"),
        (BinOp::Gt, true) => ("cmp", "fcmp ogt"),
        (BinOp::Ge, false) => ("cmp", "icmp sge"),
        (BinOp::Ge, true) => ("cmp", "fcmp oge"),
        (BinOp::Eq, false) => ("cmp", "icmp eq"),
        (BinOp::Eq, true) => ("cmp", "fcmp oeq"),
        (BinOp::Ne, false) => ("cmp", "icmp ne"),
        (BinOp::Ne, true) => ("cmp", "fcmp one"),
    }
}

impl CodeGen {
    /// Lowers an expression; `None` only for calls to void functions.
    pub fn lower_expr(&mut self, e: &Expr) -> Option<Value> {
        match &e.kind {
            ExprKind::Var(name) => Some(self.lower_var_access(name)),
            ExprKind::SelfRef => Some(self.lower_var_access("self")),
            ExprKind::Int(i) => Some(Value::lit(e.ty, Lit::Int(*i))),
            ExprKind::Double(d) => Some(Value::lit(e.ty, Lit::Double(*d))),
            ExprKind::Bool(b) => Some(Value::lit(e.ty, Lit::Bool(*b))),
            ExprKind::Null => Some(Value::null(e.ty)),

            ExprKind::Str(content) => {
                let global = self.intern_string_literal(content);
                let tmp = self.create_temp(e.ty, "string_literal");
                let load = self.builder.load_string_literal(&tmp, &global);
                self.emit(load);
                Some(Value::Var(tmp))
            }

            ExprKind::Call { name, args } => {
                let mut vals = Vec::with_capacity(args.len() + 1);
                for arg in args {
                    vals.push(self.lower_nonvoid(arg));
                }
                let fun = match self.env.lookup_fun(name) {
                    Some(f) => f.clone(),
                    None => ice(&format!("function `{}` is not defined", name)),
                };
                if fun.owner.is_some() {
                    // Unqualified call resolved through the class-method
                    // overlay: inject the receiver.
                    let recv = self.lower_var_access("self");
                    vals.insert(0, recv);
                }
                self.emit_call(&fun, vals)
            }

            ExprKind::MethodCall { recv, name, args } => {
                let recv_val = self.lower_nonvoid(recv);
                let class_name = self.types.real_name(recv_val.ty()).to_string();
                let fun = match self.env.resolve_method(&class_name, name) {
                    Some((_, f)) => f.clone(),
                    None => ice(&format!(
                        "method `{}` not found on `{}` or any superclass",
                        name, class_name
                    )),
                };
                let mut vals = Vec::with_capacity(args.len() + 1);
                vals.push(recv_val);
                for arg in args {
                    vals.push(self.lower_nonvoid(arg));
                }
                self.emit_call(&fun, vals)
            }

            ExprKind::Length(recv) => {
                let recv_val = self.lower_nonvoid(recv);
                let int_ty = self.types.primitive(Primitive::Int);
                let ptr = self.create_temp_at(int_ty, "length_ptr", 1);
                let gep = self.builder.field_ptr(&self.types, &ptr, &recv_val, 0);
                self.emit(gep);
                let out = self.create_temp(int_ty, "length");
                let load = self.builder.load(&self.types, &out, &ptr);
                self.emit(load);
                Some(Value::Var(out))
            }

            ExprKind::Index { array, index } => Some(self.lower_index(array, index, false)),

            ExprKind::NewObject => Some(self.lower_new_object(e.ty)),

            ExprKind::NewArray { dims } => {
                let mut lens = Vec::with_capacity(dims.len());
                for d in dims {
                    lens.push(self.lower_nonvoid(d));
                }
                Some(self.construct_array(e.ty, &lens))
            }

            ExprKind::Neg(inner) => {
                let v = self.lower_nonvoid(inner);
                // A literal operand folds immediately instead of emitting an
                // instruction; everything else is the pre-pass's job.
                if let Value::Lit(lit) = &v {
                    return match lit.value {
                        Some(Lit::Int(i)) => Some(Value::lit(lit.ty, Lit::Int(-i))),
                        Some(Lit::Double(d)) => Some(Value::lit(lit.ty, Lit::Double(-d))),
                        _ => ice("negation of a non-numeric literal"),
                    };
                }
                let out = self.create_temp(v.ty(), "neg");
                let neg = self.builder.neg(&self.types, &out, &v);
                self.emit(neg);
                Some(Value::Var(out))
            }

            ExprKind::Not(inner) => {
                let v = self.lower_nonvoid(inner);
                let out = self.create_temp(v.ty(), "not");
                let not = self.builder.not(&out, &v);
                self.emit(not);
                Some(Value::Var(out))
            }

            ExprKind::Bin { op, lhs, rhs } => {
                let l = self.lower_nonvoid(lhs);
                let r = self.lower_nonvoid(rhs);
                let double = l.ty() == self.types.primitive(Primitive::Double);
                let (tag, opcode) = opcode_for(*op, double);
                let out_ty = if op.is_relational() {
                    self.types.primitive(Primitive::Bool)
                } else {
                    l.ty()
                };
                let out = self.create_temp(out_ty, tag);
                let bin = self.builder.binary(&self.types, &out, opcode, &l, &r);
                self.emit(bin);
                Some(Value::Var(out))
            }

            ExprKind::And { lhs, rhs } => Some(self.lower_and(lhs, rhs)),
            ExprKind::Or { lhs, rhs } => Some(self.lower_or(lhs, rhs)),
        }
    }

    /// Lowers an expression that must produce a value.
    pub(crate) fn lower_nonvoid(&mut self, e: &Expr) -> Value {
        match self.lower_expr(e) {
            Some(v) => v,
            None => ice("void expression used where a value is required"),
        }
    }

    /// Reads a bound variable. A binding above the natural level of its type
    /// needs a load into a fresh temporary one indirection lower; an
    /// already-materialized value is used as-is.
    fn lower_var_access(&mut self, name: &str) -> Value {
        let var = match self.env.lookup_var(name) {
            Some(v) => v.clone(),
            None => ice(&format!("variable `{}` is not bound", name)),
        };
        let floor = natural_level(&self.types, var.ty);
        if var.pointer_level > floor {
            let tmp =
                self.create_temp_at(var.ty, &format!("var_{}", name), var.pointer_level - 1);
            let load = self.builder.load(&self.types, &tmp, &var);
            self.emit(load);
            Value::Var(tmp)
        } else {
            Value::Var(var)
        }
    }

    /// Explicit coercion of `value` to `dst_ty` (upcasts and the like),
    /// preserving the indirection level.
    pub(crate) fn cast_to(&mut self, dst_ty: TypeId, value: Value) -> Value {
        let tmp = self.create_temp_at(dst_ty, "cast", value.pointer_level());
        let cast = self.builder.cast(&self.types, &tmp, &value);
        self.emit(cast);
        Value::Var(tmp)
    }

    /// Emits a call to `fun` with fully evaluated actuals (receiver already
    /// prepended for methods). Argument count must line up exactly; any
    /// actual whose type differs from its formal is coerced first.
    pub(crate) fn emit_call(&mut self, fun: &FunType, args: Vec<Value>) -> Option<Value> {
        if args.len() != fun.args.len() {
            ice(&format!(
                "call to `{}` passes {} arguments, expected {}",
                fun.name,
                args.len(),
                fun.args.len()
            ));
        }
        let mut coerced = Vec::with_capacity(args.len());
        for (arg, formal) in args.into_iter().zip(&fun.args) {
            if arg.ty() != formal.ty {
                let cast = self.cast_to(formal.ty, arg);
                coerced.push(cast);
            } else {
                coerced.push(arg);
            }
        }

        let void = self.types.primitive(Primitive::Void);
        if fun.ret == void {
            let call = self
                .builder
                .call(&self.types, None, void, &fun.asm_name, &coerced);
            self.emit(call);
            None
        } else {
            let level = natural_level(&self.types, fun.ret);
            let out = self.create_temp_at(fun.ret, "function_call", level);
            let call = self
                .builder
                .call(&self.types, Some(&out), fun.ret, &fun.asm_name, &coerced);
            self.emit(call);
            Some(Value::Var(out))
        }
    }

    /// `new C`: allocate the class's byte size, bind a typed reference and
    /// run the reserved constructor on it.
    fn lower_new_object(&mut self, class_ty: TypeId) -> Value {
        let class = match self.env.lookup_class(self.types.real_name(class_ty)) {
            Some(c) => c.clone(),
            None => ice(&format!(
                "no class registered for type `{}`",
                self.types.real_name(class_ty)
            )),
        };
        let raw_ty = self.types.primitive(Primitive::RawPointer);
        let int_ty = self.types.primitive(Primitive::Int);

        let raw = self.create_temp(raw_ty, "object_raw");
        let alloc = self.builder.call(
            &self.types,
            Some(&raw),
            raw_ty,
            "calloc",
            &[
                Value::lit(int_ty, Lit::Int(1)),
                Value::lit(int_ty, Lit::Int(class.size as i32)),
            ],
        );
        self.emit(alloc);

        let obj = self.create_temp_at(class_ty, "object", 1);
        let cast = self.builder.cast(&self.types, &obj, &Value::Var(raw));
        self.emit(cast);

        let ctor = match class.own_method(CONSTRUCTOR_NAME) {
            Some(f) => f.clone(),
            None => ice(&format!("class `{}` has no constructor", class.name)),
        };
        let _ = self.emit_call(&ctor, vec![Value::Var(obj.clone())]);
        Value::Var(obj)
    }

    /// Array element access shared between value and assignment-target
    /// contexts. Produces the element's address when `want_address` is set,
    /// otherwise loads once more to yield the element's value.
    pub(crate) fn lower_index(&mut self, array: &Expr, index: &Expr, want_address: bool) -> Value {
        let arr = self.lower_nonvoid(array);
        let idx = self.lower_nonvoid(index);
        let arr_ty = arr.ty();
        if !self.types.is_array(arr_ty) {
            ice("indexing applied to a non-array value");
        }
        // Consuming one index takes the type one dimension down.
        let elem_ty = self.types.base_type(arr_ty);
        let elem_nat = natural_level(&self.types, elem_ty);

        let field = self.create_temp_at(elem_ty, "content_ptr", elem_nat + 2);
        let gep = self.builder.field_ptr(&self.types, &field, &arr, 1);
        self.emit(gep);
        let content = self.create_temp_at(elem_ty, "content", elem_nat + 1);
        let load = self.builder.load(&self.types, &content, &field);
        self.emit(load);
        let slot = self.create_temp_at(elem_ty, "element_ptr", elem_nat + 1);
        let gep = self
            .builder
            .element_ptr(&self.types, &slot, elem_ty, &Value::Var(content), &idx);
        self.emit(gep);

        if want_address {
            Value::Var(slot)
        } else {
            let out = self.create_temp_at(elem_ty, "element", elem_nat);
            let load = self.builder.load(&self.types, &out, &slot);
            self.emit(load);
            Value::Var(out)
        }
    }

    /// Allocates an array of `lens[0]` elements; with more lengths left, an
    /// emitted counted loop constructs one inner array per slot. The loop is
    /// generated, not unrolled, so the lengths may be run-time values.
    fn construct_array(&mut self, arr_ty: TypeId, lens: &[Value]) -> Value {
        let int_ty = self.types.primitive(Primitive::Int);
        let bool_ty = self.types.primitive(Primitive::Bool);
        let raw_ty = self.types.primitive(Primitive::RawPointer);
        let len = match lens.first() {
            Some(l) => l.clone(),
            None => ice("array construction without a length"),
        };
        let elem_ty = self.types.base_type(arr_ty);
        let elem_nat = natural_level(&self.types, elem_ty);

        // Two-field header: length, content pointer.
        let raw = self.create_temp(raw_ty, "array_raw");
        let alloc = self.builder.call(
            &self.types,
            Some(&raw),
            raw_ty,
            "calloc",
            &[
                Value::lit(int_ty, Lit::Int(1)),
                Value::lit(int_ty, Lit::Int(self.types.size(arr_ty) as i32)),
            ],
        );
        self.emit(alloc);
        let arr = self.create_temp_at(arr_ty, "array", 1);
        let cast = self.builder.cast(&self.types, &arr, &Value::Var(raw));
        self.emit(cast);

        let len_field = self.create_temp_at(int_ty, "length_ptr", 1);
        let gep = self
            .builder
            .field_ptr(&self.types, &len_field, &Value::Var(arr.clone()), 0);
        self.emit(gep);
        let store = self.builder.store(&self.types, &len_field, &len);
        self.emit(store);

        // Content buffer, one slot per element; reference elements are
        // stored as pointers.
        let elem_size = if elem_nat > 0 {
            POINTER_SIZE
        } else {
            self.types.size(elem_ty)
        };
        let craw = self.create_temp(raw_ty, "content_raw");
        let alloc = self.builder.call(
            &self.types,
            Some(&craw),
            raw_ty,
            "calloc",
            &[len.clone(), Value::lit(int_ty, Lit::Int(elem_size as i32))],
        );
        self.emit(alloc);
        let content = self.create_temp_at(elem_ty, "content", elem_nat + 1);
        let cast = self.builder.cast(&self.types, &content, &Value::Var(craw));
        self.emit(cast);
        let content_field = self.create_temp_at(elem_ty, "content_ptr", elem_nat + 2);
        let gep = self
            .builder
            .field_ptr(&self.types, &content_field, &Value::Var(arr.clone()), 1);
        self.emit(gep);
        let store = self
            .builder
            .store(&self.types, &content_field, &Value::Var(content.clone()));
        self.emit(store);

        if lens.len() > 1 {
            self.emit(self.builder.comment("array init"));
            self.indent();

            let idx_ptr = self.create_temp_at(int_ty, "array_index_ptr", 1);
            let decl = self.builder.declare(&self.types, &idx_ptr);
            self.emit(decl);
            let store = self
                .builder
                .store(&self.types, &idx_ptr, &Value::lit(int_ty, Lit::Int(0)));
            self.emit(store);

            let check = self.new_label("array_init_check");
            let body = self.new_label("array_init_body");
            let end = self.new_label("array_init_end");

            self.emit(self.builder.jump(&check));
            self.emit(self.builder.label(&check));
            let i_val = self.create_temp(int_ty, "array_index");
            let load = self.builder.load(&self.types, &i_val, &idx_ptr);
            self.emit(load);
            let cond = self.create_temp(bool_ty, "array_init_cond");
            let cmp = self.builder.binary(
                &self.types,
                &cond,
                "icmp slt",
                &Value::Var(i_val.clone()),
                &len,
            );
            self.emit(cmp);
            let br = self
                .builder
                .conditional_jump(&Value::Var(cond), &body, &end);
            self.emit(br);

            self.emit(self.builder.label(&body));
            self.scoped(|cg| {
                let inner = cg.construct_array(elem_ty, &lens[1..]);
                let slot = cg.create_temp_at(elem_ty, "element_ptr", elem_nat + 1);
                let gep = cg.builder.element_ptr(
                    &cg.types,
                    &slot,
                    elem_ty,
                    &Value::Var(content.clone()),
                    &Value::Var(i_val.clone()),
                );
                cg.emit(gep);
                let store = cg.builder.store(&cg.types, &slot, &inner);
                cg.emit(store);

                let next = cg.create_temp(int_ty, "array_index_next");
                let add = cg.builder.binary(
                    &cg.types,
                    &next,
                    "add",
                    &Value::Var(i_val.clone()),
                    &Value::lit(int_ty, Lit::Int(1)),
                );
                cg.emit(add);
                let store = cg.builder.store(&cg.types, &idx_ptr, &Value::Var(next));
                cg.emit(store);
            });
            self.emit(self.builder.jump(&check));
            self.emit(self.builder.label(&end));
            self.unindent();
        }

        Value::Var(arr)
    }

    /// Short-circuit conjunction: the right operand is only evaluated on the
    /// "left is true" branch, inside its own scope so its temporaries do not
    /// leak into the continuation.
    fn lower_and(&mut self, lhs: &Expr, rhs: &Expr) -> Value {
        let bool_ty = self.types.primitive(Primitive::Bool);
        let slot = self.create_temp_at(bool_ty, "and_ptr", 1);
        let decl = self.builder.declare(&self.types, &slot);
        self.emit(decl);

        let true_label = self.new_label("and_true");
        let false_label = self.new_label("and_false");
        let end_label = self.new_label("and_end");

        self.emit(self.builder.comment("and"));
        self.indent();
        self.emit(self.builder.comment("and left"));

        let left = self.lower_nonvoid(lhs);
        let br = self
            .builder
            .conditional_jump(&left, &true_label, &false_label);
        self.emit(br);

        self.emit(self.builder.label(&true_label));
        self.scoped(|cg| {
            cg.emit(cg.builder.comment("and true"));
            let right = cg.lower_nonvoid(rhs);
            let store = cg.builder.store(&cg.types, &slot, &right);
            cg.emit(store);
            cg.emit(cg.builder.jump(&end_label));
        });

        self.emit(self.builder.label(&false_label));
        self.emit(self.builder.comment("and false"));
        let store = self
            .builder
            .store(&self.types, &slot, &Value::lit(bool_ty, Lit::Bool(false)));
        self.emit(store);
        self.emit(self.builder.jump(&end_label));

        self.unindent();
        self.emit(self.builder.label(&end_label));
        self.emit(self.builder.comment("endand"));
        self.emit(self.builder.newline());

        let tmp = self.create_temp(bool_ty, "and");
        let load = self.builder.load(&self.types, &tmp, &slot);
        self.emit(load);
        Value::Var(tmp)
    }

    /// Short-circuit disjunction: the right operand is only evaluated on the
    /// "left is false" branch.
    fn lower_or(&mut self, lhs: &Expr, rhs: &Expr) -> Value {
        let bool_ty = self.types.primitive(Primitive::Bool);
        let slot = self.create_temp_at(bool_ty, "or_ptr", 1);
        let decl = self.builder.declare(&self.types, &slot);
        self.emit(decl);

        let true_label = self.new_label("or_true");
        let false_label = self.new_label("or_false");
        let end_label = self.new_label("or_end");

        self.emit(self.builder.comment("or"));
        self.indent();
        self.emit(self.builder.comment("or left"));

        let left = self.lower_nonvoid(lhs);
        let br = self
            .builder
            .conditional_jump(&left, &true_label, &false_label);
        self.emit(br);

        self.emit(self.builder.label(&true_label));
        self.emit(self.builder.comment("or true"));
        let store = self
            .builder
            .store(&self.types, &slot, &Value::lit(bool_ty, Lit::Bool(true)));
        self.emit(store);
        self.emit(self.builder.jump(&end_label));

        self.emit(self.builder.label(&false_label));
        self.scoped(|cg| {
            cg.emit(cg.builder.comment("or false"));
            let right = cg.lower_nonvoid(rhs);
            let store = cg.builder.store(&cg.types, &slot, &right);
            cg.emit(store);
            cg.emit(cg.builder.jump(&end_label));
        });

        self.unindent();
        self.emit(self.builder.label(&end_label));
        self.emit(self.builder.comment("endor"));
        self.emit(self.builder.newline());

        let tmp = self.create_temp(bool_ty, "or");
        let load = self.builder.load(&self.types, &tmp, &slot);
        self.emit(load);
        Value::Var(tmp)
    }
}
