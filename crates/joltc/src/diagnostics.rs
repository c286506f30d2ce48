//! Diagnostic reporting for the Jolt backend.
//!
//! Two failure classes exist here and they are kept strictly apart:
//!
//! - *declaration errors* (redefinitions and the like) are ordinary values,
//!   reported through [`report_error`] and propagated as `Result`;
//! - *internal invariant violations* go through [`ice`]. The type checker is
//!   contractually required to reject any program that could trigger one, so
//!   hitting this path means a compiler bug. It aborts generation at once
//!   rather than emitting partial output.

/// Prints a compact, rustc-style error message to stderr.
pub fn report_error(message: &str, note: Option<&str>) {
    let red = "\x1b[31m";
    let reset = "\x1b[0m";
    eprintln!("{}error{}: {}", red, reset, message);

    if let Some(note) = note {
        let blue = "\x1b[34m";
        eprintln!("{}note{}: {}", blue, reset, note);
    }
}

/// Reports an internal compiler error and aborts code generation.
///
/// Never returns; the panic unwinds out of the generator so no truncated
/// instruction stream ever reaches the caller.
pub fn ice(message: &str) -> ! {
    report_error(
        &format!("internal compiler error: {}", message),
        Some("this is a bug in the compiler, not in the compiled program"),
    );
    panic!("internal compiler error: {}", message);
}
