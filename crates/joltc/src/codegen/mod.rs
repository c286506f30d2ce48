//! Code generation.
//!
//! [`CodeGen`] is the single mutable state threaded through the whole
//! lowering pass: the scoped symbol environment specialized to generated
//! [`Variable`] bindings, the append-only instruction stream, indentation,
//! and the unique-name machinery. The lowering rules live in the submodules:
//!
//! - `expr` : expression lowering
//! - `stmt` : statement lowering
//! - `emit` : top-level lowering (declaration pass, functions, classes)
//! - `instr`: the stateless text builder for individual instructions
//!
//! # Unique naming
//!
//! Generated names must never collide, including across repeated entries
//! into the same lexical scope during one generation pass. Every scope depth
//! carries a re-entry counter bumped each time that depth is entered, and
//! every name root within a frame carries its own ordinal. A generated name
//! composes all three: `stack_<depth>_<re-entry>$scope_<ordinal>`. Two
//! temporaries for the same purpose in one scope differ in the ordinal; the
//! same purpose after leaving and re-entering the scope differs in the
//! re-entry counter.
//!
//! String-literal globals are the exception: they are named by a SHA-256
//! hash of their content and interned for the whole unit, so every
//! occurrence of the same literal resolves to one global constant.

pub mod emit;
pub mod expr;
pub mod instr;
pub mod stmt;

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::env::Env;
use crate::types::{Lit, Primitive, TypeId, TypeTable};

use instr::{Instruction, InstructionBuilder};

/// Indentation unit for instruction lines.
pub const INDENT: &str = "\t";
/// Separator between a declared name and its uniqueness suffix.
pub const SEP: char = '$';

/// Indirection level at which values of a type are actually worked with:
/// primitives as plain registers, objects and arrays through one reference
/// (they are always heap-allocated, never inlined).
pub(crate) fn natural_level(types: &TypeTable, ty: TypeId) -> usize {
    if types.is_primitive(ty) {
        0
    } else {
        1
    }
}

/// A named storage location produced during lowering.
///
/// `pointer_level` counts the loads separating the name from the value it
/// denotes: level 0 is the value itself, each level above adds one load.
#[derive(Debug, Clone)]
pub struct Variable {
    pub ty: TypeId,
    pub name: String,
    pub pointer_level: usize,
    pub global: bool,
    /// Byte size for variable-length globals (string contents).
    pub size: Option<usize>,
}

impl Variable {
    pub fn new(ty: TypeId, name: impl Into<String>, pointer_level: usize) -> Self {
        Variable {
            ty,
            name: name.into(),
            pointer_level,
            global: false,
            size: None,
        }
    }
}

/// A literal constant operand; `value: None` is a null reference.
#[derive(Debug, Clone)]
pub struct LiteralValue {
    pub ty: TypeId,
    pub value: Option<Lit>,
}

/// Result of lowering an expression: a constant or a storage location.
#[derive(Debug, Clone)]
pub enum Value {
    Lit(LiteralValue),
    Var(Variable),
}

impl Value {
    pub fn lit(ty: TypeId, value: Lit) -> Self {
        Value::Lit(LiteralValue {
            ty,
            value: Some(value),
        })
    }

    pub fn null(ty: TypeId) -> Self {
        Value::Lit(LiteralValue { ty, value: None })
    }

    pub fn ty(&self) -> TypeId {
        match self {
            Value::Lit(l) => l.ty,
            Value::Var(v) => v.ty,
        }
    }

    pub fn pointer_level(&self) -> usize {
        match self {
            Value::Lit(_) => 0,
            Value::Var(v) => v.pointer_level,
        }
    }
}

/// The code-generation environment.
pub struct CodeGen {
    pub env: Env<Variable>,
    pub types: TypeTable,
    pub builder: InstructionBuilder,
    output: Vec<String>,
    indent_level: usize,
    /// Per-frame ordinal per variable name root.
    var_count: Vec<HashMap<String, u32>>,
    /// Per-frame ordinal per label name root.
    label_count: Vec<HashMap<String, u32>>,
    /// Re-entry counter per scope depth.
    depth_access: HashMap<usize, u32>,
    /// Unit-wide intern map from literal content to its global.
    string_literals: HashMap<String, Variable>,
    /// Return type of the function currently being generated.
    pub(crate) current_ret: Option<TypeId>,
}

impl CodeGen {
    pub fn new(types: TypeTable, env: Env<Variable>) -> Self {
        let mut depth_access = HashMap::new();
        depth_access.insert(env.scope_depth(), 0);
        CodeGen {
            env,
            types,
            builder: InstructionBuilder::new(),
            output: Vec::new(),
            indent_level: 0,
            var_count: vec![HashMap::new()],
            label_count: vec![HashMap::new()],
            depth_access,
            string_literals: HashMap::new(),
            current_ret: None,
        }
    }

    /// Serializes the instruction stream, one newline-terminated line each.
    pub fn to_assembly(&self) -> String {
        let mut out = String::new();
        for line in &self.output {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn unindent(&mut self) {
        self.indent_level -= 1;
    }

    /// Appends an instruction to the stream.
    pub fn emit(&mut self, inst: Instruction) {
        for line in inst.lines() {
            if line.is_empty() {
                self.output.push(String::new());
            } else if inst.indentable {
                self.output
                    .push(format!("{}{}", INDENT.repeat(self.indent_level), line));
            } else {
                self.output.push(line.clone());
            }
        }
    }

    /// Splices an instruction to the very front of the stream, ahead of
    /// everything emitted so far. Used for hoisted global declarations.
    pub fn emit_at_beginning(&mut self, inst: Instruction) {
        for (i, line) in inst.lines().iter().enumerate() {
            self.output.insert(i, line.clone());
        }
    }

    pub fn enter_scope(&mut self) {
        self.env.enter_scope();
        self.var_count.push(HashMap::new());
        self.label_count.push(HashMap::new());
        let depth = self.env.scope_depth();
        let next = self.depth_access.get(&depth).map_or(0, |c| c + 1);
        self.depth_access.insert(depth, next);
    }

    pub fn leave_scope(&mut self) {
        self.env.leave_scope();
        self.var_count.pop();
        self.label_count.pop();
    }

    pub fn reset_scope(&mut self) {
        self.env.reset_scope();
        self.var_count.clear();
        self.var_count.push(HashMap::new());
        self.label_count.clear();
        self.label_count.push(HashMap::new());
    }

    /// Runs `f` inside a fresh scope; the scope is left on every exit path.
    pub fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.enter_scope();
        let result = f(self);
        self.leave_scope();
        result
    }

    /// Uniqueness suffix for `root` in the current frame:
    /// `stack_<depth>_<re-entry>$scope_<ordinal>`.
    fn variable_uid(&mut self, root: &str) -> String {
        let frame = self
            .var_count
            .last_mut()
            .expect("naming stack is never empty");
        let count = frame.entry(root.to_string()).or_insert(0);
        let ordinal = *count;
        *count += 1;
        let depth = self.env.scope_depth();
        format!(
            "stack_{}_{}{}scope_{}",
            depth, self.depth_access[&depth], SEP, ordinal
        )
    }

    /// Fresh temporary at indirection level 0, tagged with its purpose for
    /// debuggability.
    pub fn create_temp(&mut self, ty: TypeId, ctx: &str) -> Variable {
        self.create_temp_at(ty, ctx, 0)
    }

    /// Fresh temporary at an explicit indirection level.
    pub fn create_temp_at(&mut self, ty: TypeId, ctx: &str, pointer_level: usize) -> Variable {
        let uid = self.variable_uid(ctx);
        Variable::new(
            ty,
            format!(".temp{}{}{}{}", SEP, ctx, SEP, uid),
            pointer_level,
        )
    }

    /// Unique generated name for a user-declared variable.
    pub fn create_var(&mut self, ty: TypeId, name: &str, pointer_level: usize) -> Variable {
        let uid = self.variable_uid(name);
        Variable::new(ty, format!("{}{}{}", name, SEP, uid), pointer_level)
    }

    /// Fresh label for `ctx`, unique under the same composite scheme as
    /// variables but counted separately.
    pub fn new_label(&mut self, ctx: &str) -> String {
        let frame = self
            .label_count
            .last_mut()
            .expect("naming stack is never empty");
        let count = frame.entry(ctx.to_string()).or_insert(0);
        let ordinal = *count;
        *count += 1;
        let depth = self.env.scope_depth();
        format!(
            ".label{}{}{}stack_{}_{}{}scope_{}",
            SEP, ctx, SEP, depth, self.depth_access[&depth], SEP, ordinal
        )
    }

    /// Returns the global holding `content`, creating and hoisting its
    /// declaration on first use. Idempotent: identical contents share one
    /// global for the whole unit, keyed by a SHA-256 content hash.
    pub fn intern_string_literal(&mut self, content: &str) -> Variable {
        if let Some(var) = self.string_literals.get(content) {
            return var.clone();
        }

        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let digest = hasher.finalize();
        let hash: String = digest.iter().map(|b| format!("{:02X}", b)).collect();

        let mut var = Variable::new(
            self.types.primitive(Primitive::Str),
            format!(".string{}{}", SEP, hash),
            0,
        );
        var.global = true;
        var.size = Some(content.len() + 1);

        let decl = self.builder.global_string_literal(&var, content);
        self.emit_at_beginning(decl);
        self.string_literals.insert(content.to_string(), var.clone());
        var
    }
}
