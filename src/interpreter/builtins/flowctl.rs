//! break / continue / return / exit
//!
//! Each raises its control-flow value; the matching frame catches it. The
//! engine silently absorbs a stray break/continue at top level.

use super::{numeric_arg, BuiltinCtx};
use crate::interpreter::errors::{ControlFlow, Output};
use crate::interpreter::state::ExecResult;

pub fn break_cmd(
    ctx: &mut BuiltinCtx<'_, '_>,
    argv: &[Vec<u8>],
) -> Result<ExecResult, ControlFlow> {
    let n = match numeric_arg(argv, 1) {
        Ok(n) => n,
        Err(msg) => return Ok(ExecResult::failure(format!("bash: break: {}\n", msg))),
    };
    if n < 1 {
        return Ok(ExecResult::failure("bash: break: loop count out of range\n"));
    }
    if ctx.state.loop_depth == 0 {
        // Not inside a loop: no-op, as the reference shell behaves.
        return Ok(ExecResult::ok());
    }
    Err(ControlFlow::brk(n as u32))
}

pub fn continue_cmd(
    ctx: &mut BuiltinCtx<'_, '_>,
    argv: &[Vec<u8>],
) -> Result<ExecResult, ControlFlow> {
    let n = match numeric_arg(argv, 1) {
        Ok(n) => n,
        Err(msg) => return Ok(ExecResult::failure(format!("bash: continue: {}\n", msg))),
    };
    if n < 1 {
        return Ok(ExecResult::failure("bash: continue: loop count out of range\n"));
    }
    if ctx.state.loop_depth == 0 {
        return Ok(ExecResult::ok());
    }
    Err(ControlFlow::cont(n as u32))
}

pub fn return_cmd(
    ctx: &mut BuiltinCtx<'_, '_>,
    argv: &[Vec<u8>],
) -> Result<ExecResult, ControlFlow> {
    if ctx.state.call_depth == 0 && ctx.state.source_depth == 0 {
        return Ok(ExecResult::failure(
            "bash: return: can only `return' from a function or sourced script\n",
        ));
    }
    let code = match numeric_arg(argv, ctx.state.last_exit_code as i64) {
        Ok(n) => n,
        Err(msg) => {
            return Err(ControlFlow::Return {
                code: 2,
                output: Output::stderr_text(format!("bash: return: {}\n", msg)),
            })
        }
    };
    Err(ControlFlow::ret(wrap_status(code)))
}

pub fn exit_cmd(
    ctx: &mut BuiltinCtx<'_, '_>,
    argv: &[Vec<u8>],
) -> Result<ExecResult, ControlFlow> {
    let code = match numeric_arg(argv, ctx.state.last_exit_code as i64) {
        Ok(n) => wrap_status(n),
        Err(msg) => {
            return Err(ControlFlow::Exit {
                code: 2,
                output: Output::stderr_text(format!("bash: exit: {}\n", msg)),
            })
        }
    };
    Err(ControlFlow::exit(code))
}

/// Exit statuses live in 0..=255.
pub(crate) fn wrap_status(code: i64) -> i32 {
    (code.rem_euclid(256)) as i32
}
