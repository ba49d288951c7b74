//! `lox-core` is a tree-walking interpreter for Lox, a small dynamically
//! typed, class-based scripting language in the tradition of *Crafting
//! Interpreters*.
//!
//! # Pipeline
//!
//! A program moves through five stages, each a module in this crate:
//!
//! 1. [`token`] splits source text into an interned stream of
//!    identifier/operator/string/number tokens, plus a line table for
//!    recovering source positions on demand.
//! 2. [`parser`] walks that stream with a hand-written recursive-descent
//!    parser and produces a flat pre-order tree ([`parse_tree`]):
//!    `ParseTreeSpan` is a zero-copy view over it, addressed by rule name
//!    ([`ward`]) rather than by a tagged enum variant.
//! 3. [`value`] defines the dynamic value union (`none`, booleans, doubles,
//!    strings, functions, classes, instances) and its operators; every
//!    value lives in the [`pool`], a slab allocator with free-list reuse
//!    and per-slot reference counting.
//! 4. [`scope`] is the lexical environment: a "cactus stack" of hashmap
//!    frames with parent pointers, shared (not copied) by every closure
//!    that captures the same frame.
//! 5. [`eval`] and [`exec`] walk the parse tree — the former evaluates
//!    expressions to object references, the latter executes statements and
//!    declarations, propagating `return` as a small `Normal`/`Returning`
//!    state machine.
//!
//! [`builtins`] registers `clock`/`getc`/`chr`/`exit`/`print_error` into a
//! session's root scope before user code runs. [`interpreter::Session`]
//! ties all of the above into the single entry point a host program calls.
//!
//! # Example
//!
//! ```
//! use lox_core::Session;
//!
//! let session = Session::new();
//! session.run_str("<inline>", "print 1 + 2;").unwrap();
//! ```
//!
//! # Scope
//!
//! This crate is the interpreter's core only: no CLI, no filesystem
//! loading, no bytecode compiler. A host program supplies source text (and,
//! for embedding, its own stdin/stdout/stderr sinks via
//! [`Session::with_sinks`](interpreter::Session::with_sinks)) and gets back
//! either a completed run or a [`error::LoxError`].

mod builtins;
mod debug_tree;
pub mod error;
pub mod eval;
pub mod exec;
pub mod interpreter;
pub mod parse_tree;
pub mod parser;
pub mod pool;
pub mod scope;
pub mod token;
pub mod util;
pub mod value;
pub mod ward;

pub use error::{LoxError, LoxResult, Severity};
pub use interpreter::Session;
pub use util::{Position, SourceText, Trace};
