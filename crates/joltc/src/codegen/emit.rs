//! Top-level lowering: the declaration pass, function and class emission,
//! and the output prologue.
//!
//! The declaration pass runs first and registers every function and class in
//! the flat global tables, reporting redefinitions as ordinary errors. Code
//! generation then assumes the tables are complete; from that point on a
//! failed lookup is an internal invariant violation.

use std::collections::HashMap;

use crate::ast::{ClassDef, FnDef, Program, TopDef};
use crate::diagnostics::ice;
use crate::env::{ClassType, Env, EnvError, FunArg, FunType, CONSTRUCTOR_NAME};
use crate::types::{Primitive, TypeId, TypeTable, POINTER_SIZE};

use super::{natural_level, CodeGen, Value, Variable};

/// Built-in runtime functions callable from source programs.
fn builtin_signatures(types: &TypeTable) -> Vec<FunType> {
    let int = types.primitive(Primitive::Int);
    let double = types.primitive(Primitive::Double);
    let string = types.primitive(Primitive::Str);
    let void = types.primitive(Primitive::Void);
    vec![
        FunType::new(
            "printInt",
            void,
            vec![FunArg {
                ty: int,
                name: "n".to_string(),
            }],
        ),
        FunType::new(
            "printDouble",
            void,
            vec![FunArg {
                ty: double,
                name: "x".to_string(),
            }],
        ),
        FunType::new(
            "printString",
            void,
            vec![FunArg {
                ty: string,
                name: "s".to_string(),
            }],
        ),
        FunType::new("readInt", int, Vec::new()),
        FunType::new("readDouble", double, Vec::new()),
    ]
}

/// Bytes one field of this type occupies inside an object: primitives are
/// stored inline, arrays as their two-field header, objects as a reference.
fn field_size(types: &TypeTable, ty: TypeId) -> usize {
    if types.is_object(ty) {
        POINTER_SIZE
    } else {
        types.size(ty)
    }
}

/// Registers every function and class of `prog` into `env`.
///
/// Classes get their type interned, their own method table built (with the
/// implicit receiver as first formal and the synthesized constructor under
/// the reserved name) and their allocation size computed over the superclass
/// chain. Duplicate names at any level surface as [`EnvError`].
pub fn declare_program<V>(
    env: &mut Env<V>,
    types: &mut TypeTable,
    prog: &Program,
) -> Result<(), EnvError> {
    for f in builtin_signatures(types) {
        env.insert_fun(f)?;
    }

    for def in &prog.defs {
        match def {
            TopDef::Class(c) => {
                let ty = types.for_class(&c.name);
                let mut class = ClassType::new(c.name.clone(), c.superclass.clone(), ty);
                for m in &c.methods {
                    let mut args = vec![FunArg {
                        ty,
                        name: "self".to_string(),
                    }];
                    args.extend(m.params.iter().map(|p| FunArg {
                        ty: p.ty,
                        name: p.name.clone(),
                    }));
                    class.add_method(FunType::method(&c.name, m.name.clone(), m.ret, args))?;
                }
                class.add_method(FunType::method(
                    &c.name,
                    CONSTRUCTOR_NAME,
                    types.primitive(Primitive::Void),
                    vec![FunArg {
                        ty,
                        name: "self".to_string(),
                    }],
                ))?;
                env.insert_class(class)?;
            }
            TopDef::Fn(f) => {
                let args = f
                    .params
                    .iter()
                    .map(|p| FunArg {
                        ty: p.ty,
                        name: p.name.clone(),
                    })
                    .collect();
                env.insert_fun(FunType::new(f.name.clone(), f.ret, args))?;
            }
        }
    }

    // Allocation sizes need every superclass registered, so they come last.
    let mut own_sizes: HashMap<String, usize> = HashMap::new();
    for def in &prog.defs {
        if let TopDef::Class(c) = def {
            let own = c.fields.iter().map(|f| field_size(types, f.ty)).sum();
            own_sizes.insert(c.name.clone(), own);
        }
    }
    for def in &prog.defs {
        if let TopDef::Class(c) = def {
            let mut total = 0;
            let mut cur = Some(c.name.clone());
            while let Some(name) = cur {
                total += own_sizes.get(&name).copied().unwrap_or(0);
                cur = env
                    .lookup_class(&name)
                    .and_then(|cl| cl.superclass.clone());
            }
            if let Some(class) = env.class_mut(&c.name) {
                class.size = total;
            }
        }
    }

    Ok(())
}

impl CodeGen {
    /// Lowers a whole program into the instruction stream.
    ///
    /// Extern declarations go out first; the `%type` definitions for every
    /// complex type interned during the run are hoisted to the front once
    /// all bodies are generated, so everything precedes its first use.
    pub fn emit_program(&mut self, prog: &Program) {
        self.emit_runtime_declarations();
        for def in &prog.defs {
            match def {
                TopDef::Fn(f) => self.emit_function(f, None),
                TopDef::Class(c) => self.emit_class(c),
            }
        }
        self.hoist_type_definitions();
    }

    fn emit_runtime_declarations(&mut self) {
        self.emit(self.builder.comment("runtime"));
        for f in builtin_signatures(&self.types) {
            let decl = self.builder.declare_external(&self.types, &f);
            self.emit(decl);
        }
        let int = self.types.primitive(Primitive::Int);
        let calloc = FunType::new(
            "calloc",
            self.types.primitive(Primitive::RawPointer),
            vec![
                FunArg {
                    ty: int,
                    name: "count".to_string(),
                },
                FunArg {
                    ty: int,
                    name: "size".to_string(),
                },
            ],
        );
        let decl = self.builder.declare_external(&self.types, &calloc);
        self.emit(decl);
        self.emit(self.builder.newline());
    }

    fn hoist_type_definitions(&mut self) {
        let ids: Vec<TypeId> = self.types.complex_types().collect();
        // Inserted at the head one by one; reversed so the stream keeps
        // interning order.
        for ty in ids.into_iter().rev() {
            let inst = if self.types.is_array(ty) {
                self.builder.array_type_definition(&self.types, ty)
            } else {
                let size = match self.env.lookup_class(self.types.real_name(ty)) {
                    Some(class) => class.size,
                    None => ice(&format!(
                        "type `{}` was interned but never declared",
                        self.types.real_name(ty)
                    )),
                };
                self.builder
                    .class_type_definition(self.types.asm_name(ty), size)
            };
            self.emit_at_beginning(inst);
        }
    }

    /// Emits one function body. For methods, `owner` names the class whose
    /// table carries the signature; the receiver arrives as the implicit
    /// first parameter and is bound directly (it is never reassigned), while
    /// every other parameter is materialized into a stack slot so assignment
    /// works on it like on any local.
    pub(crate) fn emit_function(&mut self, f: &FnDef, owner: Option<&str>) {
        let fun = match owner {
            Some(class) => match self
                .env
                .lookup_class(class)
                .and_then(|c| c.own_method(&f.name))
            {
                Some(m) => m.clone(),
                None => ice(&format!("method `{}` missing from class `{}`", f.name, class)),
            },
            None => match self.env.lookup_fun(&f.name) {
                Some(m) => m.clone(),
                None => ice(&format!("function `{}` was never registered", f.name)),
            },
        };
        self.current_ret = Some(fun.ret);
        self.enter_scope();

        let ssa_params: Vec<Variable> = fun
            .args
            .iter()
            .map(|a| Variable::new(a.ty, a.name.clone(), natural_level(&self.types, a.ty)))
            .collect();
        let begin = self
            .builder
            .function_begin(&self.types, fun.ret, &fun.asm_name, &ssa_params);
        self.emit(begin);
        self.emit(self.builder.label("entry"));
        self.indent();

        for (formal, ssa) in fun.args.iter().zip(&ssa_params) {
            if fun.owner.is_some() && formal.name == "self" {
                if self.env.insert_var("self", ssa.clone()).is_err() {
                    ice("receiver binding collides with a parameter");
                }
                continue;
            }
            let level = natural_level(&self.types, formal.ty) + 1;
            let var = self.create_var(formal.ty, &formal.name, level);
            let decl = self.builder.declare(&self.types, &var);
            self.emit(decl);
            let store = self
                .builder
                .store(&self.types, &var, &Value::Var(ssa.clone()));
            self.emit(store);
            if self.env.insert_var(&formal.name, var).is_err() {
                ice(&format!("duplicate parameter `{}`", formal.name));
            }
        }

        let terminated = self.scoped(|cg| cg.lower_block(&f.body));
        if !terminated {
            if fun.ret == self.types.primitive(Primitive::Void) {
                let ret = self.builder.ret(&self.types, None);
                self.emit(ret);
            } else {
                // The checker guarantees a return on every path.
                let unreachable = self.builder.unreachable();
                self.emit(unreachable);
            }
        }

        self.unindent();
        self.emit(self.builder.function_end());
        self.emit(self.builder.newline());
        self.leave_scope();
        self.current_ret = None;
    }

    /// Emits a class body: methods under the class's overlay, then the
    /// synthesized constructor.
    pub(crate) fn emit_class(&mut self, c: &ClassDef) {
        let class = match self.env.lookup_class(&c.name) {
            Some(cl) => cl.clone(),
            None => ice(&format!("class `{}` was never registered", c.name)),
        };
        self.env.set_current_class(Some(c.name.clone()));
        self.env.set_class_methods(class.methods().clone());

        self.emit(self.builder.comment(&format!("class {}", c.name)));
        self.emit(self.builder.newline());
        for m in &c.methods {
            self.emit_function(m, Some(&c.name));
        }
        self.emit_constructor(&class);

        self.env.set_class_methods(HashMap::new());
        self.env.set_current_class(None);
    }

    fn emit_constructor(&mut self, class: &ClassType) {
        let ctor = match class.own_method(CONSTRUCTOR_NAME) {
            Some(f) => f.clone(),
            None => ice(&format!("class `{}` has no constructor", class.name)),
        };
        let ssa_params: Vec<Variable> = ctor
            .args
            .iter()
            .map(|a| Variable::new(a.ty, a.name.clone(), natural_level(&self.types, a.ty)))
            .collect();
        let begin = self
            .builder
            .function_begin(&self.types, ctor.ret, &ctor.asm_name, &ssa_params);
        self.emit(begin);
        self.emit(self.builder.label("entry"));
        self.indent();
        // The allocation arrives zeroed; nothing else to set up.
        let ret = self.builder.ret(&self.types, None);
        self.emit(ret);
        self.unindent();
        self.emit(self.builder.function_end());
        self.emit(self.builder.newline());
    }
}
