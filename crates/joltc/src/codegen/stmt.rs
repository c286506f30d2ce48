//! Statement lowering.
//!
//! Returns from each rule report whether control flow terminated (hit a
//! `ret` on every path), so callers know when a fall-through branch still
//! needs its jump and when a merge point is unreachable.

use crate::ast::{Block, DeclItem, Stmt, Target};
use crate::diagnostics::ice;
use crate::types::{Lit, Primitive, TypeId};

use super::{natural_level, CodeGen, Value};

impl CodeGen {
    /// Lowers the statements of a block in the current scope. Stops at the
    /// first terminating statement; anything after it is unreachable and the
    /// pre-passes are free to have dropped it already.
    pub(crate) fn lower_block(&mut self, block: &Block) -> bool {
        for stmt in &block.stmts {
            if self.lower_stmt(stmt) {
                return true;
            }
        }
        false
    }

    pub(crate) fn lower_stmt(&mut self, stmt: &Stmt) -> bool {
        match stmt {
            Stmt::Empty => false,

            Stmt::Block(block) => self.scoped(|cg| cg.lower_block(block)),

            Stmt::Decl { ty, items } => {
                for item in items {
                    self.lower_decl_item(*ty, item);
                }
                false
            }

            Stmt::Assign { target, value } => {
                self.lower_assign(target, value);
                false
            }

            Stmt::Incr(name) => {
                self.lower_step(name, 1);
                false
            }
            Stmt::Decr(name) => {
                self.lower_step(name, -1);
                false
            }

            Stmt::Ret(Some(e)) => {
                let ret_ty = match self.current_ret {
                    Some(ty) => ty,
                    None => ice("return statement outside of a function"),
                };
                let mut v = self.lower_nonvoid(e);
                if v.ty() != ret_ty {
                    v = self.cast_to(ret_ty, v);
                }
                let ret = self.builder.ret(&self.types, Some(&v));
                self.emit(ret);
                true
            }

            Stmt::Ret(None) => {
                let ret = self.builder.ret(&self.types, None);
                self.emit(ret);
                true
            }

            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(cond, then_branch, else_branch.as_deref()),

            Stmt::While { cond, body } => {
                self.lower_while(cond, body);
                false
            }

            Stmt::Expr(e) => {
                let _ = self.lower_expr(e);
                false
            }
        }
    }

    /// Declares one variable: stack slot, initializer or default, binding.
    fn lower_decl_item(&mut self, ty: TypeId, item: &DeclItem) {
        let level = natural_level(&self.types, ty) + 1;
        let var = self.create_var(ty, &item.name, level);
        let decl = self.builder.declare(&self.types, &var);
        self.emit(decl);

        let init = match &item.init {
            Some(e) => {
                let v = self.lower_nonvoid(e);
                if v.ty() != ty {
                    self.cast_to(ty, v)
                } else {
                    v
                }
            }
            // Primitives get their default value, references start null.
            None => match self.types.default_value(ty) {
                Some(lit) => Value::lit(ty, lit),
                None => Value::null(ty),
            },
        };
        let store = self.builder.store(&self.types, &var, &init);
        self.emit(store);

        if self.env.insert_var(&item.name, var).is_err() {
            ice(&format!(
                "variable `{}` is already declared in this scope",
                item.name
            ));
        }
    }

    fn lower_assign(&mut self, target: &Target, value: &crate::ast::Expr) {
        match target {
            Target::Var(name) => {
                let var = match self.env.lookup_var(name) {
                    Some(v) => v.clone(),
                    None => ice(&format!("assignment to unbound variable `{}`", name)),
                };
                let mut v = self.lower_nonvoid(value);
                if v.ty() != var.ty {
                    v = self.cast_to(var.ty, v);
                }
                let store = self.builder.store(&self.types, &var, &v);
                self.emit(store);
            }
            Target::Index { array, index } => {
                let slot = self.lower_index(array, index, true);
                let slot_var = match slot {
                    Value::Var(v) => v,
                    Value::Lit(_) => ice("element address lowered to a literal"),
                };
                let elem_ty = slot_var.ty;
                let mut v = self.lower_nonvoid(value);
                if v.ty() != elem_ty {
                    v = self.cast_to(elem_ty, v);
                }
                let store = self.builder.store(&self.types, &slot_var, &v);
                self.emit(store);
            }
        }
    }

    /// `x++` / `x--` on an int variable.
    fn lower_step(&mut self, name: &str, delta: i32) {
        let var = match self.env.lookup_var(name) {
            Some(v) => v.clone(),
            None => ice(&format!("step on unbound variable `{}`", name)),
        };
        let int_ty = self.types.primitive(Primitive::Int);
        let tag = if delta > 0 { "incr" } else { "decr" };
        let cur = self.create_temp(int_ty, tag);
        let load = self.builder.load(&self.types, &cur, &var);
        self.emit(load);
        let next = self.create_temp(int_ty, tag);
        let add = self.builder.binary(
            &self.types,
            &next,
            "add",
            &Value::Var(cur),
            &Value::lit(int_ty, Lit::Int(delta)),
        );
        self.emit(add);
        let store = self.builder.store(&self.types, &var, &Value::Var(next));
        self.emit(store);
    }

    fn lower_if(
        &mut self,
        cond: &crate::ast::Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
    ) -> bool {
        let true_label = self.new_label("if_true");
        let false_label = else_branch.map(|_| self.new_label("if_false"));
        let end_label = self.new_label("if_end");

        self.emit(self.builder.comment("if"));
        self.indent();

        let c = self.lower_nonvoid(cond);
        let else_target = false_label.as_deref().unwrap_or(&end_label);
        let br = self
            .builder
            .conditional_jump(&c, &true_label, else_target);
        self.emit(br);

        self.emit(self.builder.label(&true_label));
        let then_terminated = self.scoped(|cg| cg.lower_stmt(then_branch));
        if !then_terminated {
            self.emit(self.builder.jump(&end_label));
        }

        let else_terminated = match (else_branch, &false_label) {
            (Some(els), Some(label)) => {
                self.emit(self.builder.label(label));
                let terminated = self.scoped(|cg| cg.lower_stmt(els));
                if !terminated {
                    self.emit(self.builder.jump(&end_label));
                }
                terminated
            }
            _ => false,
        };

        self.unindent();
        self.emit(self.builder.label(&end_label));
        let terminated = then_terminated && else_terminated;
        if terminated {
            // Both branches returned, the merge point can't be reached.
            let unreachable = self.builder.unreachable();
            self.emit(unreachable);
        }
        self.emit(self.builder.comment("endif"));
        terminated
    }

    fn lower_while(&mut self, cond: &crate::ast::Expr, body: &Stmt) {
        let check_label = self.new_label("while_check");
        let body_label = self.new_label("while_body");
        let end_label = self.new_label("while_end");

        self.emit(self.builder.comment("while"));
        self.indent();

        self.emit(self.builder.jump(&check_label));
        self.emit(self.builder.label(&check_label));
        let c = self.lower_nonvoid(cond);
        let br = self
            .builder
            .conditional_jump(&c, &body_label, &end_label);
        self.emit(br);

        self.emit(self.builder.label(&body_label));
        let terminated = self.scoped(|cg| cg.lower_stmt(body));
        if !terminated {
            self.emit(self.builder.jump(&check_label));
        }

        self.unindent();
        self.emit(self.builder.label(&end_label));
        self.emit(self.builder.comment("endwhile"));
    }
}
