//! Variable attribute builtins: export, readonly, local, declare, unset,
//! shift.
//!
//! Arguments arrive fully expanded; `name=value` forms are re-split here.

use indexmap::IndexMap;

use super::BuiltinCtx;
use crate::bytes::lossy;
use crate::interpreter::errors::ControlFlow;
use crate::interpreter::state::{ExecResult, Value, Variable};
use crate::parser::parser::is_identifier;

/// Split an expanded `name=value` / `name+=value` argument.
fn split_assign(arg: &[u8]) -> Option<(String, bool, Vec<u8>)> {
    let eq = arg.iter().position(|b| *b == b'=')?;
    let (name_part, value) = arg.split_at(eq);
    let (name_part, append) = match name_part.strip_suffix(b"+") {
        Some(n) => (n, true),
        None => (name_part, false),
    };
    let name = String::from_utf8_lossy(name_part).into_owned();
    if !is_identifier(&name) {
        return None;
    }
    Some((name, append, value[1..].to_vec()))
}

fn quoted_value(bytes: &[u8]) -> String {
    let text = lossy(bytes).into_owned();
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn export(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    let mut unexport = false;
    let mut names = argv;
    if let Some(first) = argv.first() {
        match first.as_slice() {
            b"-n" => {
                unexport = true;
                names = &argv[1..];
            }
            b"-p" => names = &argv[1..],
            _ => {}
        }
    }

    if names.is_empty() {
        let mut out = String::new();
        for name in ctx.state.visible_names() {
            if let Some(var) = ctx.state.find_var(&name) {
                if var.exported {
                    match var.value.as_scalar() {
                        Some(v) => {
                            out.push_str(&format!("declare -x {}={}\n", name, quoted_value(v)))
                        }
                        None => out.push_str(&format!("declare -x {}\n", name)),
                    }
                }
            }
        }
        return Ok(ExecResult::new(out.into_bytes(), Vec::new(), 0));
    }

    let mut code = 0;
    let mut stderr = Vec::new();
    for arg in names {
        if let Some((name, append, value)) = split_assign(arg) {
            let result = if append {
                ctx.state.append_scalar(&name, &value)
            } else {
                ctx.state.set_scalar(&name, value)
            };
            if let Err(e) = result {
                stderr.extend_from_slice(format!("bash: export: {}\n", e).as_bytes());
                code = 1;
                continue;
            }
            if !unexport {
                ctx.state.mark_exported(&name);
            }
        } else {
            let name = lossy(arg).into_owned();
            if !is_identifier(&name) {
                stderr.extend_from_slice(
                    format!("bash: export: `{}': not a valid identifier\n", name).as_bytes(),
                );
                code = 1;
                continue;
            }
            if unexport {
                if let Some(var) = ctx.state.find_var_mut(&name) {
                    var.exported = false;
                }
            } else {
                ctx.state.mark_exported(&name);
            }
        }
    }
    Ok(ExecResult::new(Vec::new(), stderr, code))
}

pub fn readonly(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    let names: &[Vec<u8>] = match argv.first().map(|a| a.as_slice()) {
        Some(b"-p") => &argv[1..],
        _ => argv,
    };
    if names.is_empty() {
        let mut out = String::new();
        for name in ctx.state.visible_names() {
            if let Some(var) = ctx.state.find_var(&name) {
                if var.readonly {
                    match var.value.as_scalar() {
                        Some(v) => {
                            out.push_str(&format!("declare -r {}={}\n", name, quoted_value(v)))
                        }
                        None => out.push_str(&format!("declare -r {}\n", name)),
                    }
                }
            }
        }
        return Ok(ExecResult::new(out.into_bytes(), Vec::new(), 0));
    }

    let mut code = 0;
    let mut stderr = Vec::new();
    for arg in names {
        if let Some((name, _, value)) = split_assign(arg) {
            if let Err(e) = ctx.state.set_scalar(&name, value) {
                stderr.extend_from_slice(format!("bash: readonly: {}\n", e).as_bytes());
                code = 1;
                continue;
            }
            ctx.state.mark_readonly(&name);
        } else {
            let name = lossy(arg).into_owned();
            if !is_identifier(&name) {
                stderr.extend_from_slice(
                    format!("bash: readonly: `{}': not a valid identifier\n", name).as_bytes(),
                );
                code = 1;
                continue;
            }
            ctx.state.mark_readonly(&name);
        }
    }
    Ok(ExecResult::new(Vec::new(), stderr, code))
}

pub fn local(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    if ctx.state.call_depth == 0 {
        return Ok(ExecResult::failure("bash: local: can only be used in a function\n"));
    }
    let mut code = 0;
    let mut stderr = Vec::new();
    for arg in argv {
        if arg.first() == Some(&b'-') {
            continue; // attribute flags accepted and ignored
        }
        let outcome = if let Some((name, _, value)) = split_assign(arg) {
            ctx.state.declare_local(&name, Some(Value::Scalar(value)))
        } else {
            let name = lossy(arg).into_owned();
            if !is_identifier(&name) {
                stderr.extend_from_slice(
                    format!("bash: local: `{}': not a valid identifier\n", name).as_bytes(),
                );
                code = 1;
                continue;
            }
            ctx.state.declare_local(&name, None)
        };
        if let Err(e) = outcome {
            stderr.extend_from_slice(format!("bash: local: {}\n", e).as_bytes());
            code = 1;
        }
    }
    Ok(ExecResult::new(Vec::new(), stderr, code))
}

pub fn declare(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    let mut indexed = false;
    let mut assoc = false;
    let mut mark_ro = false;
    let mut mark_x = false;
    let mut print = false;
    let mut rest_start = 0;
    for (i, arg) in argv.iter().enumerate() {
        let text = lossy(arg);
        if !text.starts_with('-') && !text.starts_with('+') {
            rest_start = i;
            break;
        }
        rest_start = i + 1;
        match text.as_ref() {
            "-a" => indexed = true,
            "-A" => assoc = true,
            "-r" => mark_ro = true,
            "-x" => mark_x = true,
            "-p" => print = true,
            "-i" | "-l" | "-u" | "--" | "+x" | "+r" => {}
            other => {
                return Ok(ExecResult::failure_with_code(
                    format!("bash: declare: {}: invalid option\n", other),
                    2,
                ))
            }
        }
    }
    let names = &argv[rest_start..];

    if print || names.is_empty() {
        let mut out = String::new();
        for name in ctx.state.visible_names() {
            if !names.is_empty()
                && !names.iter().any(|n| lossy(n) == name.as_str())
            {
                continue;
            }
            if let Some(var) = ctx.state.find_var(&name) {
                out.push_str(&render_declare(&name, var));
            }
        }
        return Ok(ExecResult::new(out.into_bytes(), Vec::new(), 0));
    }

    let in_function = ctx.state.call_depth > 0;
    let mut code = 0;
    let mut stderr = Vec::new();
    for arg in names {
        let (name, value) = match split_assign(arg) {
            Some((name, _, value)) => (name, Some(value)),
            None => (lossy(arg).into_owned(), None),
        };
        if !is_identifier(&name) {
            stderr.extend_from_slice(
                format!("bash: declare: `{}': not a valid identifier\n", lossy(arg)).as_bytes(),
            );
            code = 1;
            continue;
        }
        let new_value = if assoc {
            Some(Value::Assoc(IndexMap::new()))
        } else if indexed {
            Some(Value::Indexed(IndexMap::new()))
        } else {
            value.clone().map(Value::Scalar)
        };
        // Inside a function `declare` creates locals, as in the reference
        // shell; at top level it targets the global scope.
        let result = if in_function {
            ctx.state.declare_local(&name, new_value)
        } else {
            match new_value {
                Some(v) => ctx
                    .state
                    .var_for_update(&name)
                    .map(|var| var.value = v),
                None => ctx.state.var_for_update(&name).map(|_| ()),
            }
        };
        if let Err(e) = result {
            stderr.extend_from_slice(format!("bash: declare: {}\n", e).as_bytes());
            code = 1;
            continue;
        }
        if (indexed || assoc) && value.is_some() {
            // `declare -a x=(…)` arrives pre-joined; ignore the text form.
        }
        if mark_x {
            ctx.state.mark_exported(&name);
        }
        if mark_ro {
            ctx.state.mark_readonly(&name);
        }
    }
    Ok(ExecResult::new(Vec::new(), stderr, code))
}

fn render_declare(name: &str, var: &Variable) -> String {
    let mut flags = String::new();
    match &var.value {
        Value::Indexed(_) => flags.push('a'),
        Value::Assoc(_) => flags.push('A'),
        Value::Scalar(_) => {}
    }
    if var.exported {
        flags.push('x');
    }
    if var.readonly {
        flags.push('r');
    }
    let flags = if flags.is_empty() { "--".to_string() } else { format!("-{}", flags) };
    match &var.value {
        Value::Scalar(v) => format!("declare {} {}={}\n", flags, name, quoted_value(v)),
        Value::Indexed(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| **k);
            let body: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("[{}]={}", k, quoted_value(v)))
                .collect();
            format!("declare {} {}=({})\n", flags, name, body.join(" "))
        }
        Value::Assoc(map) => {
            let body: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("[{}]={}", lossy(k), quoted_value(v)))
                .collect();
            format!("declare {} {}=({})\n", flags, name, body.join(" "))
        }
    }
}

pub fn unset(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    let mut functions = false;
    let mut names = argv;
    match argv.first().map(|a| a.as_slice()) {
        Some(b"-f") => {
            functions = true;
            names = &argv[1..];
        }
        Some(b"-v") => names = &argv[1..],
        _ => {}
    }

    let mut code = 0;
    let mut stderr = Vec::new();
    for arg in names {
        let name = lossy(arg).into_owned();
        if functions {
            ctx.state.functions.shift_remove(&name);
        } else if let Err(e) = ctx.state.unset_var(&name) {
            stderr.extend_from_slice(format!("bash: unset: {}\n", e).as_bytes());
            code = 1;
        }
    }
    Ok(ExecResult::new(Vec::new(), stderr, code))
}

pub fn shift(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    let n = match super::numeric_arg(argv, 1) {
        Ok(n) => n,
        Err(msg) => {
            return Ok(ExecResult::failure(format!("bash: shift: {}\n", msg)));
        }
    };
    if n < 0 {
        return Ok(ExecResult::failure(format!("bash: shift: {}: shift count out of range\n", n)));
    }
    let params = ctx.state.params_mut();
    if n as usize > params.len() {
        return Ok(ExecResult::from_code(1));
    }
    params.drain(..n as usize);
    Ok(ExecResult::ok())
}
