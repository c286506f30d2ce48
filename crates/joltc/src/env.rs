//! Scoped symbol environment.
//!
//! [`Env`] tracks three kinds of symbols with different lifetimes:
//!
//! - variables, in a stack of lexical scope frames (innermost first);
//! - functions and classes, in flat global tables that are immutable once
//!   the declaration pass has run;
//! - a class-method overlay, swapped in while generating a class body and
//!   consulted *before* the global function table, so an unqualified call
//!   inside a method resolves to a sibling method first.
//!
//! The environment is generic over the variable binding type so successive
//! phases can reuse the global tables with their own notion of a binding:
//! [`Env::derive`] carries the function and class tables over and starts a
//! fresh, empty scope stack.

use std::collections::HashMap;
use thiserror::Error;

use crate::types::TypeId;

/// Reserved method name under which every class registers its constructor.
/// The `$` keeps it out of the source identifier space.
pub const CONSTRUCTOR_NAME: &str = "$init";

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("symbol `{0}` is already defined")]
    AlreadyDefined(String),
    #[error("symbol `{0}` is not defined")]
    NotFound(String),
}

#[derive(Debug, Clone)]
pub struct FunArg {
    pub ty: TypeId,
    pub name: String,
}

/// Signature of a function or method.
#[derive(Debug, Clone)]
pub struct FunType {
    /// Name as written in source code.
    pub name: String,
    /// Name in the emitted assembly; class-qualified for methods.
    pub asm_name: String,
    pub ret: TypeId,
    pub args: Vec<FunArg>,
    /// Declaring class for methods, `None` for free functions.
    pub owner: Option<String>,
}

impl FunType {
    pub fn new(name: impl Into<String>, ret: TypeId, args: Vec<FunArg>) -> Self {
        let name = name.into();
        FunType {
            asm_name: name.clone(),
            name,
            ret,
            args,
            owner: None,
        }
    }

    /// A method of `class`; the assembly name is class-qualified to keep
    /// same-named methods on unrelated classes apart.
    pub fn method(class: &str, name: impl Into<String>, ret: TypeId, args: Vec<FunArg>) -> Self {
        let name = name.into();
        FunType {
            asm_name: format!("{}.{}", class, name),
            name,
            ret,
            args,
            owner: Some(class.to_string()),
        }
    }
}

/// A class as seen by the backend: its own methods, its superclass link and
/// the byte size of one instance.
///
/// Inherited methods are not copied in; lookup walks the superclass chain at
/// call time, which is also what pins the class-qualified name a dispatch
/// mangles to.
#[derive(Debug, Clone)]
pub struct ClassType {
    pub name: String,
    pub superclass: Option<String>,
    pub ty: TypeId,
    /// Allocation size of an instance, including inherited fields. Filled in
    /// by the declaration pass once every superclass is known.
    pub size: usize,
    methods: HashMap<String, FunType>,
}

impl ClassType {
    pub fn new(name: impl Into<String>, superclass: Option<String>, ty: TypeId) -> Self {
        ClassType {
            name: name.into(),
            superclass,
            ty,
            size: 0,
            methods: HashMap::new(),
        }
    }

    pub fn add_method(&mut self, f: FunType) -> Result<(), EnvError> {
        if self.methods.contains_key(&f.name) {
            return Err(EnvError::AlreadyDefined(f.name));
        }
        self.methods.insert(f.name.clone(), f);
        Ok(())
    }

    /// Method declared directly on this class, not on a superclass.
    pub fn own_method(&self, name: &str) -> Option<&FunType> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> &HashMap<String, FunType> {
        &self.methods
    }
}

/// Nested symbol environment, generic over the variable binding type.
#[derive(Debug)]
pub struct Env<V> {
    funcs: HashMap<String, FunType>,
    classes: HashMap<String, ClassType>,
    class_methods: HashMap<String, FunType>,
    current_class: Option<String>,
    scopes: Vec<HashMap<String, V>>,
}

impl<V> Default for Env<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Env<V> {
    pub fn new() -> Self {
        Env {
            funcs: HashMap::new(),
            classes: HashMap::new(),
            class_methods: HashMap::new(),
            current_class: None,
            scopes: vec![HashMap::new()],
        }
    }

    /// Builds an environment for the next phase: the function and class
    /// tables carry over, the variable scope stack starts fresh.
    pub fn derive<U>(self) -> Env<U> {
        Env {
            funcs: self.funcs,
            classes: self.classes,
            class_methods: HashMap::new(),
            current_class: None,
            scopes: vec![HashMap::new()],
        }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn leave_scope(&mut self) {
        self.scopes.pop();
    }

    /// Collapses the scope stack to a single empty frame.
    pub fn reset_scope(&mut self) {
        self.scopes.clear();
        self.scopes.push(HashMap::new());
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Binds `name` in the current frame. Shadowing an outer frame is always
    /// permitted; a duplicate in the same frame is an error.
    pub fn insert_var(&mut self, name: &str, value: V) -> Result<(), EnvError> {
        let frame = self.scopes.last_mut().expect("scope stack is never empty");
        if frame.contains_key(name) {
            return Err(EnvError::AlreadyDefined(name.to_string()));
        }
        frame.insert(name.to_string(), value);
        Ok(())
    }

    /// Scans frames innermost to outermost and returns the first match.
    pub fn lookup_var(&self, name: &str) -> Option<&V> {
        self.scopes.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Replaces the binding in the frame that owns `name`; does nothing if
    /// the name is not bound anywhere.
    pub fn update_var(&mut self, name: &str, value: V) {
        for frame in self.scopes.iter_mut().rev() {
            if let Some(slot) = frame.get_mut(name) {
                *slot = value;
                return;
            }
        }
    }

    pub fn insert_fun(&mut self, f: FunType) -> Result<(), EnvError> {
        if self.lookup_fun(&f.name).is_some() {
            return Err(EnvError::AlreadyDefined(f.name));
        }
        self.funcs.insert(f.name.clone(), f);
        Ok(())
    }

    /// Resolves a call name: the class-method overlay first, then the global
    /// function table.
    pub fn lookup_fun(&self, name: &str) -> Option<&FunType> {
        self.class_methods.get(name).or_else(|| self.funcs.get(name))
    }

    pub fn remove_fun(&mut self, name: &str) -> Result<(), EnvError> {
        if self.funcs.remove(name).is_none() {
            return Err(EnvError::NotFound(name.to_string()));
        }
        Ok(())
    }

    pub fn insert_class(&mut self, c: ClassType) -> Result<(), EnvError> {
        if self.classes.contains_key(&c.name) {
            return Err(EnvError::AlreadyDefined(c.name));
        }
        self.classes.insert(c.name.clone(), c);
        Ok(())
    }

    pub fn lookup_class(&self, name: &str) -> Option<&ClassType> {
        self.classes.get(name)
    }

    pub fn class_mut(&mut self, name: &str) -> Option<&mut ClassType> {
        self.classes.get_mut(name)
    }

    pub fn remove_class(&mut self, name: &str) -> Result<(), EnvError> {
        if self.classes.remove(name).is_none() {
            return Err(EnvError::NotFound(name.to_string()));
        }
        Ok(())
    }

    /// Walks the superclass chain of `class` until a class defining `name`
    /// is found.
    pub fn resolve_method(&self, class: &str, name: &str) -> Option<(&ClassType, &FunType)> {
        let mut cur = self.lookup_class(class);
        while let Some(c) = cur {
            if let Some(m) = c.own_method(name) {
                return Some((c, m));
            }
            cur = c.superclass.as_deref().and_then(|s| self.lookup_class(s));
        }
        None
    }

    pub fn set_current_class(&mut self, class: Option<String>) {
        self.current_class = class;
    }

    pub fn current_class(&self) -> Option<&str> {
        self.current_class.as_deref()
    }

    /// Swaps in the method table of the class whose body is being generated.
    /// Pass an empty map when leaving the class body.
    pub fn set_class_methods(&mut self, methods: HashMap<String, FunType>) {
        self.class_methods = methods;
    }
}
