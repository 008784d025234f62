//! Interpreter
//!
//! Everything between the AST and the byte buffers a host receives: state,
//! expansion, arithmetic, conditionals, redirections, builtins and the
//! execution engine.

pub mod arith;
pub mod builtins;
pub mod cond;
pub mod engine;
pub mod errors;
pub mod expand;
pub mod redirect;
pub mod state;

pub use engine::{Captured, Executor};
pub use errors::{ControlFlow, LimitKind, Output};
pub use state::{ExecResult, ExecutionLimits, ShellState};
