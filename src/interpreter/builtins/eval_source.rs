//! eval / source (.)
//!
//! Both re-enter the interpreter in the current state. `source` pushes a
//! fresh positional frame when extra arguments are given and catches
//! `return`.

use super::BuiltinCtx;
use crate::bytes::lossy;
use crate::interpreter::errors::{ControlFlow, LimitKind};
use crate::interpreter::state::ExecResult;

pub fn eval(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    if argv.is_empty() {
        return Ok(ExecResult::ok());
    }
    let mut source = Vec::new();
    for (i, arg) in argv.iter().enumerate() {
        if i > 0 {
            source.push(b' ');
        }
        source.extend_from_slice(arg);
    }
    let text = lossy(&source).into_owned();

    if ctx.state.source_depth >= ctx.exec.limits.max_recursion_depth {
        return Err(ControlFlow::limit(LimitKind::Recursion, "eval: maximum recursion depth exceeded"));
    }
    ctx.state.source_depth += 1;
    let result = ctx.exec.run_source(ctx.state, &text, ctx.stdin);
    ctx.state.source_depth -= 1;
    result
}

pub fn source(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    let Some(file_arg) = argv.first() else {
        return Ok(ExecResult::failure_with_code(
            "bash: source: filename argument required\n",
            2,
        ));
    };
    let name = lossy(file_arg).into_owned();
    let path = resolve_source_path(ctx, &name);
    let content = match path.and_then(|p| ctx.exec.fs.read_file(&p).ok()) {
        Some(bytes) => bytes,
        None => {
            return Ok(ExecResult::failure(format!(
                "bash: {}: No such file or directory\n",
                name
            )))
        }
    };
    let text = lossy(&content).into_owned();

    if ctx.state.source_depth >= ctx.exec.limits.max_recursion_depth {
        return Err(ControlFlow::limit(LimitKind::Recursion, "source: maximum recursion depth exceeded"));
    }

    let pushed_params = if argv.len() > 1 {
        ctx.state.positional_stack.push(argv[1..].to_vec());
        true
    } else {
        false
    };
    ctx.state.source_depth += 1;

    let result = ctx.exec.run_source(ctx.state, &text, ctx.stdin);

    ctx.state.source_depth -= 1;
    if pushed_params {
        ctx.state.positional_stack.pop();
    }

    match result {
        // `return` inside a sourced file stops the file, not the caller.
        Err(ControlFlow::Return { code, output }) => {
            Ok(ExecResult::new(output.stdout, output.stderr, code))
        }
        other => other,
    }
}

fn resolve_source_path(ctx: &BuiltinCtx<'_, '_>, name: &str) -> Option<String> {
    if name.contains('/') {
        let path = ctx.exec.fs.resolve_path(&ctx.state.cwd, name);
        return ctx.exec.fs.is_file(&path).then_some(path);
    }
    // PATH search first, falling back to the working directory.
    if let Some(path_var) = ctx.state.get_scalar_string("PATH") {
        for dir in path_var.split(':').filter(|d| !d.is_empty()) {
            let candidate = ctx.exec.fs.resolve_path(dir, name);
            if ctx.exec.fs.is_file(&candidate) {
                return Some(candidate);
            }
        }
    }
    let path = ctx.exec.fs.resolve_path(&ctx.state.cwd, name);
    ctx.exec.fs.is_file(&path).then_some(path)
}
