//! Code generation backend for the Jolt language.
//!
//! The front end parses and type-checks Jolt source and hands this crate a
//! fully annotated syntax tree ([`ast::Program`]) together with the type
//! table it interned while checking ([`types::TypeTable`]). The backend
//! lowers the tree in a single pass into textual, register-based assembly:
//!
//! 1. the declaration pass registers functions and classes into the scoped
//!    environment and rejects redefinitions;
//! 2. the lowering pass walks the tree and emits the instruction stream.
//!
//! Either the whole stream is produced or the run aborts; no truncated
//! output is ever handed back.

pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod env;
pub mod types;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use codegen::emit::declare_program;
use codegen::CodeGen;

/// Compilation options for the Jolt backend.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Destination for the assembly text; standard output if unset.
    pub output: Option<PathBuf>,
}

impl CompileOptions {
    pub fn new() -> Self {
        CompileOptions { output: None }
    }

    pub fn with_output(path: impl Into<PathBuf>) -> Self {
        CompileOptions {
            output: Some(path.into()),
        }
    }
}

/// Compiles an annotated program to assembly text.
///
/// `types` is the interning table the front end built while annotating the
/// tree; it is consumed here and lives exactly as long as this compilation.
pub fn compile(prog: &ast::Program, types: types::TypeTable) -> Result<String> {
    let mut types = types;
    let mut decl_env: env::Env<()> = env::Env::new();
    if let Err(e) = declare_program(&mut decl_env, &mut types, prog) {
        diagnostics::report_error(&e.to_string(), Some("declaration pass aborted"));
        return Err(anyhow::Error::new(e).context("declaration pass failed"));
    }

    let mut codegen = CodeGen::new(types, decl_env.derive());
    codegen.emit_program(prog);
    Ok(codegen.to_assembly())
}

/// Compiles and writes the result to the configured destination.
pub fn compile_to(
    prog: &ast::Program,
    types: types::TypeTable,
    options: &CompileOptions,
) -> Result<()> {
    let asm = compile(prog, types)?;
    write_output(&asm, options.output.as_deref())
}

fn write_output(asm: &str, dest: Option<&Path>) -> Result<()> {
    match dest {
        Some(path) => std::fs::write(path, asm)
            .with_context(|| format!("failed to write `{}`", path.display())),
        None => {
            print!("{}", asm);
            Ok(())
        }
    }
}
