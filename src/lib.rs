//! Execution core of the Tombo scripting language: lexer, parser, AST,
//! lexical environments and a tree-walking evaluator. Hosts extend the
//! language by registering native functions in a [`Registry`].

use std::sync::Once;

pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod environment;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod repl;
pub mod runtime;
mod stack;
pub mod stdlib;
pub mod value;

pub use config::{Config, LexerOptions};
pub use diagnostics::{
    Diagnostic, DiagnosticKind, HostError, LexError, ParseError, Position, RuntimeError,
    RuntimeErrorKind, TomboError,
};
pub use environment::{Environment, EnvironmentRef};
pub use lexer::tokenize;
pub use parser::{parse, parse_source};
pub use registry::Registry;
pub use repl::Repl;
pub use runtime::{evaluate, run, Flow, Interpreter};
pub use value::{Arity, MapKey, Value, ValueKind};

static TRACING_INIT: Once = Once::new();

/// Installs a stderr subscriber filtered by `RUST_LOG`. Does nothing when the
/// variable is unset; safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_level(true),
                )
                .with(filter)
                .init();
        }
    });
}
