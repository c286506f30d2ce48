//! Instruction builder: abstract operations to concrete assembly text.
//!
//! [`InstructionBuilder`] is a pure factory. It holds no state, knows
//! nothing about scopes or unique naming, and receives every name fully
//! resolved; its only job is the textual syntax of the target assembly.
//! Keeping it behind this seam lets the output dialect evolve without
//! touching the naming and scoping machinery.

use crate::env::FunType;
use crate::types::{Lit, Primitive, TypeId, TypeTable};

use super::{natural_level, Value, Variable};

/// One emitted operation: one or more output lines, plus whether the lines
/// participate in indentation. Labels, global declarations and `define`
/// headers are never indented.
#[derive(Debug, Clone)]
pub struct Instruction {
    lines: Vec<String>,
    pub indentable: bool,
}

impl Instruction {
    fn new(line: String) -> Self {
        Instruction {
            lines: vec![line],
            indentable: true,
        }
    }

    fn raw(line: String) -> Self {
        Instruction {
            lines: vec![line],
            indentable: false,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Renders a type at the given indirection level: one `*` per level on top
/// of the type's assembly name.
fn type_at(types: &TypeTable, ty: TypeId, level: usize) -> String {
    format!("{}{}", types.asm_name(ty), "*".repeat(level))
}

fn lit_repr(lit: Option<Lit>) -> String {
    match lit {
        Some(Lit::Int(i)) => i.to_string(),
        Some(Lit::Double(d)) => format!("{:?}", d),
        Some(Lit::Bool(b)) => b.to_string(),
        None => "null".to_string(),
    }
}

/// Operand text of a value: literal constant or `%`/`@`-prefixed name.
fn value_repr(value: &Value) -> String {
    match value {
        Value::Lit(lit) => lit_repr(lit.value),
        Value::Var(var) => var_repr(var),
    }
}

fn var_repr(var: &Variable) -> String {
    let prefix = if var.global { "@" } else { "%" };
    format!("{}{}", prefix, var.name)
}

/// Type text of a value. Literals sit at the natural level of their type
/// (so a null object reference renders as a pointer), variables at their
/// own indirection level.
fn value_type(types: &TypeTable, value: &Value) -> String {
    match value {
        Value::Lit(lit) => type_at(types, lit.ty, natural_level(types, lit.ty)),
        Value::Var(var) => type_at(types, var.ty, var.pointer_level),
    }
}

/// Escapes string content for an LLVM `c"..."` constant.
fn escape_string(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for &b in content.as_bytes() {
        match b {
            b'"' | b'\\' => out.push_str(&format!("\\{:02X}", b)),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:02X}", b)),
        }
    }
    out
}

/// Stateless factory for output lines.
#[derive(Debug, Default)]
pub struct InstructionBuilder;

impl InstructionBuilder {
    pub fn new() -> Self {
        InstructionBuilder
    }

    pub fn newline(&self) -> Instruction {
        Instruction::raw(String::new())
    }

    pub fn comment(&self, text: &str) -> Instruction {
        Instruction::new(format!("; {}", text))
    }

    pub fn label(&self, name: &str) -> Instruction {
        Instruction::raw(format!("{}:", name))
    }

    pub fn jump(&self, label: &str) -> Instruction {
        Instruction::new(format!("br label %{}", label))
    }

    pub fn conditional_jump(&self, cond: &Value, if_true: &str, if_false: &str) -> Instruction {
        Instruction::new(format!(
            "br i1 {}, label %{}, label %{}",
            value_repr(cond),
            if_true,
            if_false
        ))
    }

    /// Stack slot for `var`; the slot holds values one indirection below the
    /// variable's own level.
    pub fn declare(&self, types: &TypeTable, var: &Variable) -> Instruction {
        Instruction::new(format!(
            "{} = alloca {}",
            var_repr(var),
            type_at(types, var.ty, var.pointer_level - 1)
        ))
    }

    pub fn load(&self, types: &TypeTable, dst: &Variable, src: &Variable) -> Instruction {
        Instruction::new(format!(
            "{} = load {}, {} {}",
            var_repr(dst),
            type_at(types, dst.ty, dst.pointer_level),
            type_at(types, src.ty, src.pointer_level),
            var_repr(src)
        ))
    }

    pub fn store(&self, types: &TypeTable, dst: &Variable, value: &Value) -> Instruction {
        let ty = value_type(types, value);
        Instruction::new(format!(
            "store {} {}, {}* {}",
            ty,
            value_repr(value),
            ty,
            var_repr(dst)
        ))
    }

    pub fn neg(&self, types: &TypeTable, dst: &Variable, src: &Value) -> Instruction {
        if src.ty() == types.primitive(Primitive::Double) {
            Instruction::new(format!("{} = fneg double {}", var_repr(dst), value_repr(src)))
        } else {
            Instruction::new(format!("{} = sub i32 0, {}", var_repr(dst), value_repr(src)))
        }
    }

    pub fn not(&self, dst: &Variable, src: &Value) -> Instruction {
        Instruction::new(format!("{} = xor i1 {}, true", var_repr(dst), value_repr(src)))
    }

    /// Binary operation with an already-selected opcode (`add`, `fmul`,
    /// `icmp slt`, ...); the operand type comes from the left value.
    pub fn binary(
        &self,
        types: &TypeTable,
        dst: &Variable,
        opcode: &str,
        lhs: &Value,
        rhs: &Value,
    ) -> Instruction {
        Instruction::new(format!(
            "{} = {} {} {}, {}",
            var_repr(dst),
            opcode,
            value_type(types, lhs),
            value_repr(lhs),
            value_repr(rhs)
        ))
    }

    pub fn call(
        &self,
        types: &TypeTable,
        dst: Option<&Variable>,
        ret: TypeId,
        name: &str,
        args: &[Value],
    ) -> Instruction {
        let rendered: Vec<String> = args
            .iter()
            .map(|a| format!("{} {}", value_type(types, a), value_repr(a)))
            .collect();
        let call = format!(
            "call {} @{}({})",
            type_at(types, ret, natural_level(types, ret)),
            name,
            rendered.join(", ")
        );
        match dst {
            Some(dst) => Instruction::new(format!("{} = {}", var_repr(dst), call)),
            None => Instruction::new(call),
        }
    }

    pub fn ret(&self, types: &TypeTable, value: Option<&Value>) -> Instruction {
        match value {
            Some(v) => Instruction::new(format!(
                "ret {} {}",
                value_type(types, v),
                value_repr(v)
            )),
            None => Instruction::new("ret void".to_string()),
        }
    }

    pub fn unreachable(&self) -> Instruction {
        Instruction::new("unreachable".to_string())
    }

    pub fn cast(&self, types: &TypeTable, dst: &Variable, src: &Value) -> Instruction {
        Instruction::new(format!(
            "{} = bitcast {} {} to {}",
            var_repr(dst),
            value_type(types, src),
            value_repr(src),
            type_at(types, dst.ty, dst.pointer_level)
        ))
    }

    /// Global constant holding the bytes of a string literal plus its NUL
    /// terminator.
    pub fn global_string_literal(&self, var: &Variable, content: &str) -> Instruction {
        let size = var.size.unwrap_or(content.len() + 1);
        Instruction::raw(format!(
            "{} = internal constant [{} x i8] c\"{}\\00\"",
            var_repr(var),
            size,
            escape_string(content)
        ))
    }

    /// Decays a string-literal global to the `i8*` of its first byte.
    pub fn load_string_literal(&self, dst: &Variable, global: &Variable) -> Instruction {
        let size = global.size.unwrap_or(1);
        Instruction::new(format!(
            "{} = getelementptr inbounds [{} x i8], [{} x i8]* {}, i32 0, i32 0",
            var_repr(dst),
            size,
            size,
            var_repr(global)
        ))
    }

    /// Address of a header field of an object or array value.
    pub fn field_ptr(
        &self,
        types: &TypeTable,
        dst: &Variable,
        object: &Value,
        field_index: usize,
    ) -> Instruction {
        let struct_name = types.asm_name(object.ty());
        Instruction::new(format!(
            "{} = getelementptr {}, {}* {}, i32 0, i32 {}",
            var_repr(dst),
            struct_name,
            struct_name,
            value_repr(object),
            field_index
        ))
    }

    /// Address of one element in a content buffer.
    pub fn element_ptr(
        &self,
        types: &TypeTable,
        dst: &Variable,
        elem_ty: TypeId,
        base: &Value,
        index: &Value,
    ) -> Instruction {
        let elem = type_at(types, elem_ty, natural_level(types, elem_ty));
        Instruction::new(format!(
            "{} = getelementptr {}, {}* {}, i32 {}",
            var_repr(dst),
            elem,
            elem,
            value_repr(base),
            value_repr(index)
        ))
    }

    /// `define` header; the body follows until [`function_end`].
    ///
    /// [`function_end`]: Self::function_end
    pub fn function_begin(
        &self,
        types: &TypeTable,
        ret: TypeId,
        name: &str,
        params: &[Variable],
    ) -> Instruction {
        let rendered: Vec<String> = params
            .iter()
            .map(|p| format!("{} {}", type_at(types, p.ty, p.pointer_level), var_repr(p)))
            .collect();
        Instruction::raw(format!(
            "define {} @{}({}) {{",
            type_at(types, ret, natural_level(types, ret)),
            name,
            rendered.join(", ")
        ))
    }

    pub fn function_end(&self) -> Instruction {
        Instruction::raw("}".to_string())
    }

    /// `declare` line for an external function.
    pub fn declare_external(&self, types: &TypeTable, f: &FunType) -> Instruction {
        let args: Vec<String> = f
            .args
            .iter()
            .map(|a| type_at(types, a.ty, natural_level(types, a.ty)))
            .collect();
        Instruction::raw(format!(
            "declare {} @{}({})",
            type_at(types, f.ret, natural_level(types, f.ret)),
            f.asm_name,
            args.join(", ")
        ))
    }

    /// Type definition for a class: an opaque byte blob of its allocation
    /// size. Generated code only ever touches instances through bitcasts
    /// and method calls.
    pub fn class_type_definition(&self, asm_name: &str, size: usize) -> Instruction {
        Instruction::raw(format!("{} = type [{} x i8]", asm_name, size))
    }

    /// Type definition for an array: a length field plus a pointer to the
    /// out-of-line content buffer.
    pub fn array_type_definition(&self, types: &TypeTable, ty: TypeId) -> Instruction {
        let elem = types.base_type(ty);
        let elem_text = type_at(types, elem, natural_level(types, elem));
        Instruction::raw(format!(
            "{} = type {{ i32, {}* }}",
            types.asm_name(ty),
            elem_text
        ))
    }
}
