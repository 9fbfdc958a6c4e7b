//! Embeddable runtime for Molang, the expression language used by
//! data-driven game content. Provides lexing, parsing, a tree-walking
//! interpreter, a constant analyzer and a specializer that folds a script
//! against a fixed scope.

pub mod ast;
pub mod compiler;
pub mod constant;
pub mod diagnostics;
pub mod engine;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod scope;
pub mod stdlib;
pub mod value;

pub use compiler::{CompiledArtifact, CompiledFunction, Output, ReturnShape, Signature};
pub use constant::ConstantAnalyzer;
pub use diagnostics::{Diagnostic, DiagnosticKind, MolangError, Result, SourceSpan};
pub use engine::{Engine, EngineBuilder, EngineConfig, ParseFailurePolicy, PreparedScript};
pub use repl::Repl;
pub use runtime::{ControlFlag, ExecutionContext};
pub use scope::Scope;
pub use value::{Arguments, Entity, Function, ObjectBuilder, ObjectValue, Property, Value};
