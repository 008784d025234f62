//! alias / unalias

use super::BuiltinCtx;
use crate::bytes::lossy;
use crate::interpreter::errors::ControlFlow;
use crate::interpreter::state::ExecResult;

fn render(name: &str, value: &str) -> String {
    format!("alias {}='{}'\n", name, value.replace('\'', "'\\''"))
}

pub fn alias(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    let args: Vec<String> = argv
        .iter()
        .map(|a| lossy(a).into_owned())
        .filter(|a| a != "-p")
        .collect();

    if args.is_empty() {
        let mut out = String::new();
        for (name, value) in &ctx.state.aliases {
            out.push_str(&render(name, value));
        }
        return Ok(ExecResult::new(out.into_bytes(), Vec::new(), 0));
    }

    let mut out = String::new();
    let mut stderr = Vec::new();
    let mut code = 0;
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => {
                ctx.state.aliases.insert(name.to_string(), value.to_string());
            }
            None => match ctx.state.aliases.get(&arg) {
                Some(value) => out.push_str(&render(&arg, value)),
                None => {
                    stderr.extend_from_slice(
                        format!("bash: alias: {}: not found\n", arg).as_bytes(),
                    );
                    code = 1;
                }
            },
        }
    }
    Ok(ExecResult::new(out.into_bytes(), stderr, code))
}

pub fn unalias(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    if argv.first().map(|a| a.as_slice()) == Some(b"-a") {
        ctx.state.aliases.clear();
        return Ok(ExecResult::ok());
    }
    let mut stderr = Vec::new();
    let mut code = 0;
    for arg in argv {
        let name = lossy(arg).into_owned();
        if ctx.state.aliases.shift_remove(&name).is_none() {
            stderr.extend_from_slice(format!("bash: unalias: {}: not found\n", name).as_bytes());
            code = 1;
        }
    }
    Ok(ExecResult::new(Vec::new(), stderr, code))
}
