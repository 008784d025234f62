//! history / type / let

use super::BuiltinCtx;
use crate::bytes::lossy;
use crate::interpreter::errors::ControlFlow;
use crate::interpreter::state::ExecResult;

pub fn history(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    if argv.first().map(|a| a.as_slice()) == Some(b"-c") {
        ctx.state.history.clear();
        return Ok(ExecResult::ok());
    }
    let limit: Option<usize> = argv
        .first()
        .and_then(|a| lossy(a).trim().parse().ok());
    let entries = &ctx.state.history;
    let start = match limit {
        Some(n) if n < entries.len() => entries.len() - n,
        _ => 0,
    };
    let mut out = String::new();
    for (i, line) in entries.iter().enumerate().skip(start) {
        out.push_str(&format!("{:5}  {}\n", i + 1, line));
    }
    Ok(ExecResult::new(out.into_bytes(), Vec::new(), 0))
}

pub fn type_cmd(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    let mut short = false;
    let mut names = Vec::new();
    for arg in argv {
        match arg.as_slice() {
            b"-t" => short = true,
            b"-a" | b"-p" | b"-P" => {}
            _ => names.push(lossy(arg).into_owned()),
        }
    }

    let mut out = String::new();
    let mut stderr = Vec::new();
    let mut code = 0;
    for name in names {
        if let Some(value) = ctx.state.aliases.get(&name) {
            if short {
                out.push_str("alias\n");
            } else {
                out.push_str(&format!("{} is aliased to `{}'\n", name, value));
            }
        } else if ctx.state.functions.contains_key(&name) {
            if short {
                out.push_str("function\n");
            } else {
                out.push_str(&format!("{} is a function\n", name));
            }
        } else if super::is_builtin(&name) {
            if short {
                out.push_str("builtin\n");
            } else {
                out.push_str(&format!("{} is a shell builtin\n", name));
            }
        } else if ctx.exec.registry.contains(&name) {
            if short {
                out.push_str("file\n");
            } else {
                out.push_str(&format!("{} is /usr/bin/{}\n", name, name));
            }
        } else {
            stderr.extend_from_slice(format!("bash: type: {}: not found\n", name).as_bytes());
            code = 1;
        }
    }
    Ok(ExecResult::new(out.into_bytes(), stderr, code))
}

pub fn let_cmd(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    if argv.is_empty() {
        return Ok(ExecResult::failure_with_code("bash: let: expression expected\n", 2));
    }
    let mut last = 0;
    for arg in argv {
        let text = lossy(arg).into_owned();
        let expr = crate::parser::arith::parse_arith(&text);
        match crate::interpreter::arith::eval(ctx.state, ctx.exec.limits, &expr) {
            Ok(v) => last = v,
            Err(cf) => {
                let output = cf.output().clone();
                return Ok(ExecResult::new(output.stdout, output.stderr, 1));
            }
        }
    }
    Ok(ExecResult::from_code(i32::from(last == 0)))
}
