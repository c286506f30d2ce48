//! Representation of Jolt types used by the backend.
//!
//! Types are interned in a [`TypeTable`]: every distinct type is stored once
//! and handed out as a small [`TypeId`] handle. Comparing two types is
//! comparing their handles, which sidesteps structural comparison entirely
//! (`Dog == Dog`, `Dog[] == Dog[]` and so on always compare the same record).
//! The table lives for one compilation and is discarded with it; the front
//! end builds it while annotating the tree and hands it over to code
//! generation together with the tree.

use std::collections::HashMap;

/// Size in bytes of a pointer on the target.
pub const POINTER_SIZE: usize = 8;

/// Handle to an interned type record.
///
/// Two handles are equal exactly when they designate the same record in the
/// same [`TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

/// The fixed set of primitive types, created once per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Int,
    Double,
    Bool,
    Void,
    Str,
    RawPointer,
}

/// Compile-time constant value, used both for literal operands and for the
/// default value a declaration without initializer receives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lit {
    Int(i32),
    Double(f64),
    Bool(bool),
}

#[derive(Debug, Clone)]
struct TypeRecord {
    /// Name as written in source code (`int`, `Dog`, `int[][]`).
    real_name: String,
    /// Human-readable form used when composing assembly-level names.
    readable_name: String,
    /// Low-level encoded form (`i32`, `%Dog`, `%Array_int_2D`).
    asm_name: String,
    /// Byte size for non-array types; the dimension for arrays. Callers go
    /// through `size()` / `dimension()`, which resolve the overload.
    size: usize,
    default_value: Option<Lit>,
    is_primitive: bool,
    /// Element type for arrays, one dimension lower.
    base: Option<TypeId>,
}

/// Interning table over type records.
pub struct TypeTable {
    records: Vec<TypeRecord>,
    by_name: HashMap<String, TypeId>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    /// Creates a table with the primitive types pre-registered.
    pub fn new() -> Self {
        let mut table = TypeTable {
            records: Vec::new(),
            by_name: HashMap::new(),
        };
        // Registration order must match the `Primitive` discriminants,
        // `primitive()` indexes by it.
        table.register_primitive("int", "i32", Some(Lit::Int(0)), 4);
        table.register_primitive("double", "double", Some(Lit::Double(0.0)), 8);
        table.register_primitive("boolean", "i1", Some(Lit::Bool(false)), 1);
        table.register_primitive("void", "void", None, 0);
        table.register_primitive("string", "i8*", None, 0);
        table.register_primitive("raw_pointer", "i8*", None, 0);
        table
    }

    fn register_primitive(
        &mut self,
        name: &str,
        asm_name: &str,
        default_value: Option<Lit>,
        size: usize,
    ) {
        self.intern(TypeRecord {
            real_name: name.to_string(),
            readable_name: name.to_string(),
            asm_name: asm_name.to_string(),
            size,
            default_value,
            is_primitive: true,
            base: None,
        });
    }

    fn intern(&mut self, record: TypeRecord) -> TypeId {
        let id = TypeId(self.records.len() as u32);
        self.by_name.insert(record.real_name.clone(), id);
        self.records.push(record);
        id
    }

    fn record(&self, id: TypeId) -> &TypeRecord {
        &self.records[id.0 as usize]
    }

    /// Returns the singleton handle for a primitive type.
    pub fn primitive(&self, p: Primitive) -> TypeId {
        TypeId(p as u32)
    }

    /// Returns the interned handle for a class type, creating the record on
    /// first use.
    pub fn for_class(&mut self, name: &str) -> TypeId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        self.intern(TypeRecord {
            real_name: name.to_string(),
            readable_name: name.to_string(),
            asm_name: format!("%{}", name),
            size: 0,
            default_value: None,
            is_primitive: false,
            base: None,
        })
    }

    /// Returns the interned handle for an N-dimensional array of `base`.
    ///
    /// A dimension of zero degenerates to `base` itself, so indexing code can
    /// subtract consumed dimensions without special-casing the last one. The
    /// stored element type is the array one dimension lower, interned
    /// recursively.
    pub fn for_array(&mut self, base: TypeId, dimension: usize) -> TypeId {
        let total = self.dimension(base) + dimension;
        let scalar = self.scalar_base(base);
        if total == 0 {
            return scalar;
        }

        let real_name = format!("{}{}", self.real_name(scalar), "[]".repeat(total));
        if let Some(&id) = self.by_name.get(&real_name) {
            return id;
        }

        let element = self.for_array(scalar, total - 1);
        let readable_name = format!("{}_{}D", self.readable_name(scalar), total);
        let asm_name = format!("%Array_{}_{}D", self.real_name(scalar), total);
        self.intern(TypeRecord {
            real_name,
            readable_name,
            asm_name,
            size: total,
            default_value: None,
            is_primitive: false,
            base: Some(element),
        })
    }

    /// Follows the element chain down to the non-array root.
    fn scalar_base(&self, id: TypeId) -> TypeId {
        let mut cur = id;
        while let Some(base) = self.record(cur).base {
            cur = base;
        }
        cur
    }

    pub fn real_name(&self, id: TypeId) -> &str {
        &self.record(id).real_name
    }

    pub fn readable_name(&self, id: TypeId) -> &str {
        &self.record(id).readable_name
    }

    pub fn asm_name(&self, id: TypeId) -> &str {
        &self.record(id).asm_name
    }

    /// Byte size of a value of this type.
    ///
    /// Arrays are never inlined: whatever the element type or dimension, an
    /// array value is a two-field header (length plus content pointer), so
    /// its size is `int + pointer`.
    pub fn size(&self, id: TypeId) -> usize {
        if self.is_array(id) {
            self.size(self.primitive(Primitive::Int)) + POINTER_SIZE
        } else {
            self.record(id).size
        }
    }

    /// Array dimension; zero for anything that is not an array.
    pub fn dimension(&self, id: TypeId) -> usize {
        if self.is_array(id) {
            self.record(id).size
        } else {
            0
        }
    }

    pub fn default_value(&self, id: TypeId) -> Option<Lit> {
        self.record(id).default_value
    }

    pub fn is_primitive(&self, id: TypeId) -> bool {
        self.record(id).is_primitive
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        self.record(id).base.is_some()
    }

    pub fn is_object(&self, id: TypeId) -> bool {
        let r = self.record(id);
        r.base.is_none() && !r.is_primitive
    }

    /// Element type of an array, one dimension lower; identity for
    /// non-arrays.
    pub fn base_type(&self, id: TypeId) -> TypeId {
        self.record(id).base.unwrap_or(id)
    }

    /// All non-primitive types, in interning order.
    pub fn complex_types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_primitive)
            .map(|(i, _)| TypeId(i as u32))
    }
}
