//! The bespoke cooperative command language
//!
//! A line-oriented stepper: one statement per simulation tick, entirely on
//! the session thread, so many cooperative scripts interleave within a tick
//! without dedicated threads. Verbs and queries are registered in explicit
//! tables; aliases resolve to live serials at every use, `$name` reads a
//! shared variable, and any other bare word is a literal.

mod lexer;
mod program;
mod registry;

pub use program::{CommandProgram, StepOutcome, Value};
pub use registry::{CommandCtx, CoopRegistry};
