//! Builtin Commands
//!
//! Commands that need interpreter state. Dispatch happens after function
//! lookup and before the command registry; POSIX special builtins are
//! classified so the engine can apply assignment persistence and the
//! posix-mode fatality rule.

pub mod alias_cmd;
pub mod cd_cmd;
pub mod eval_source;
pub mod flowctl;
pub mod getopts_cmd;
pub mod misc;
pub mod read_cmd;
pub mod set_cmd;
pub mod test_cmd;
pub mod trap_cmd;
pub mod vars;

use lazy_static::lazy_static;
use std::collections::HashSet;

use crate::interpreter::engine::Executor;
use crate::interpreter::errors::ControlFlow;
use crate::interpreter::state::{ExecResult, ShellState};

/// Everything a builtin may touch.
pub struct BuiltinCtx<'a, 'b> {
    pub exec: &'a Executor<'a>,
    pub state: &'b mut ShellState,
    pub stdin: &'a [u8],
}

lazy_static! {
    /// POSIX special builtins (XCU 2.14).
    static ref SPECIAL_BUILTINS: HashSet<&'static str> = [
        "break", ":", "continue", ".", "eval", "exec", "exit", "export", "readonly", "return",
        "set", "shift", "source", "trap", "unset",
    ]
    .into_iter()
    .collect();

    static ref BUILTIN_NAMES: HashSet<&'static str> = [
        "cd", "pwd", "export", "readonly", "unset", "local", "declare", "typeset", "set", "shopt",
        "shift", "exit", "return", "break", "continue", "trap", "eval", "source", ".", "read",
        "getopts", "alias", "unalias", "history", ":", "true", "false", "type", "test", "[",
        "let", "exec", "command",
    ]
    .into_iter()
    .collect();
}

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(name)
}

pub fn is_special_builtin(name: &str) -> bool {
    SPECIAL_BUILTINS.contains(name)
}

/// Run a builtin; None means "not a builtin, keep resolving".
/// `exec` and `command` are resolved in the engine because they re-enter
/// command dispatch.
pub fn dispatch(
    ctx: &mut BuiltinCtx<'_, '_>,
    name: &str,
    argv: &[Vec<u8>],
) -> Option<Result<ExecResult, ControlFlow>> {
    Some(match name {
        ":" | "true" => Ok(ExecResult::ok()),
        "false" => Ok(ExecResult::from_code(1)),
        "cd" => cd_cmd::cd(ctx, argv),
        "pwd" => cd_cmd::pwd(ctx, argv),
        "break" => flowctl::break_cmd(ctx, argv),
        "continue" => flowctl::continue_cmd(ctx, argv),
        "return" => flowctl::return_cmd(ctx, argv),
        "exit" => flowctl::exit_cmd(ctx, argv),
        "export" => vars::export(ctx, argv),
        "readonly" => vars::readonly(ctx, argv),
        "local" => vars::local(ctx, argv),
        "declare" | "typeset" => vars::declare(ctx, argv),
        "unset" => vars::unset(ctx, argv),
        "shift" => vars::shift(ctx, argv),
        "set" => set_cmd::set(ctx, argv),
        "shopt" => set_cmd::shopt(ctx, argv),
        "trap" => trap_cmd::trap(ctx, argv),
        "eval" => eval_source::eval(ctx, argv),
        "source" | "." => eval_source::source(ctx, argv),
        "read" => read_cmd::read(ctx, argv),
        "getopts" => getopts_cmd::getopts(ctx, argv),
        "alias" => alias_cmd::alias(ctx, argv),
        "unalias" => alias_cmd::unalias(ctx, argv),
        "history" => misc::history(ctx, argv),
        "type" => misc::type_cmd(ctx, argv),
        "let" => misc::let_cmd(ctx, argv),
        "test" => test_cmd::test(ctx, argv, false),
        "[" => test_cmd::test(ctx, argv, true),
        _ => return None,
    })
}

/// Shared helper: the byte text of an argument.
pub(crate) fn arg_text(argv: &[Vec<u8>], i: usize) -> Option<String> {
    argv.get(i).map(|b| String::from_utf8_lossy(b).into_owned())
}

/// Parse `[n]` for break/continue/shift/exit/return.
pub(crate) fn numeric_arg(argv: &[Vec<u8>], default: i64) -> Result<i64, String> {
    match argv.first() {
        None => Ok(default),
        Some(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            text.trim()
                .parse::<i64>()
                .map_err(|_| format!("{}: numeric argument required", text))
        }
    }
}
