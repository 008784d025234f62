//! set / shopt

use super::BuiltinCtx;
use crate::bytes::lossy;
use crate::interpreter::errors::ControlFlow;
use crate::interpreter::state::{ExecResult, Value};

pub fn set(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    if argv.is_empty() {
        return Ok(ExecResult::new(list_variables(ctx), Vec::new(), 0));
    }

    let mut stderr = Vec::new();
    let mut i = 0;
    while i < argv.len() {
        let arg = lossy(&argv[i]).into_owned();
        match arg.as_str() {
            "--" => {
                let rest: Vec<Vec<u8>> = argv[i + 1..].to_vec();
                *ctx.state.params_mut() = rest;
                return Ok(ExecResult::ok());
            }
            "-o" | "+o" => {
                let enable = arg.starts_with('-');
                match argv.get(i + 1) {
                    None => {
                        return Ok(ExecResult::new(list_options(ctx), Vec::new(), 0));
                    }
                    Some(name_bytes) => {
                        let name = lossy(name_bytes).into_owned();
                        if !apply_option(ctx, &name, enable) {
                            stderr.extend_from_slice(
                                format!("bash: set: {}: invalid option name\n", name).as_bytes(),
                            );
                            return Ok(ExecResult::new(Vec::new(), stderr, 2));
                        }
                        i += 2;
                        continue;
                    }
                }
            }
            _ if arg.starts_with('-') || arg.starts_with('+') => {
                let enable = arg.starts_with('-');
                let mut consumed_next = false;
                for c in arg.chars().skip(1) {
                    // `-euo pipefail`: a bundled `o` takes the next argument.
                    if c == 'o' {
                        match argv.get(i + 1) {
                            None => {
                                return Ok(ExecResult::new(list_options(ctx), Vec::new(), 0));
                            }
                            Some(name_bytes) => {
                                let name = lossy(name_bytes).into_owned();
                                if !apply_option(ctx, &name, enable) {
                                    stderr.extend_from_slice(
                                        format!("bash: set: {}: invalid option name\n", name)
                                            .as_bytes(),
                                    );
                                    return Ok(ExecResult::new(Vec::new(), stderr, 2));
                                }
                                consumed_next = true;
                            }
                        }
                        continue;
                    }
                    let ok = match c {
                        'e' => {
                            ctx.state.flags.errexit = enable;
                            true
                        }
                        'u' => {
                            ctx.state.flags.nounset = enable;
                            true
                        }
                        'x' => {
                            ctx.state.flags.xtrace = enable;
                            true
                        }
                        'v' => {
                            ctx.state.flags.verbose = enable;
                            true
                        }
                        'f' => {
                            ctx.state.flags.noglob = enable;
                            true
                        }
                        'C' => {
                            ctx.state.flags.noclobber = enable;
                            true
                        }
                        'n' => {
                            ctx.state.flags.noexec = enable;
                            true
                        }
                        'a' => {
                            ctx.state.flags.allexport = enable;
                            true
                        }
                        _ => false,
                    };
                    if !ok {
                        stderr.extend_from_slice(
                            format!("bash: set: {}{}: invalid option\n", if enable { '-' } else { '+' }, c)
                                .as_bytes(),
                        );
                        return Ok(ExecResult::new(Vec::new(), stderr, 2));
                    }
                }
                i += 1 + usize::from(consumed_next);
            }
            _ => {
                // First non-option: the rest become positional parameters.
                let rest: Vec<Vec<u8>> = argv[i..].to_vec();
                *ctx.state.params_mut() = rest;
                return Ok(ExecResult::ok());
            }
        }
    }
    Ok(ExecResult::ok())
}

fn apply_option(ctx: &mut BuiltinCtx<'_, '_>, name: &str, enable: bool) -> bool {
    let flags = &mut ctx.state.flags;
    match name {
        "errexit" => flags.errexit = enable,
        "nounset" => flags.nounset = enable,
        "pipefail" => flags.pipefail = enable,
        "xtrace" => flags.xtrace = enable,
        "verbose" => flags.verbose = enable,
        "noglob" => flags.noglob = enable,
        "noclobber" => flags.noclobber = enable,
        "noexec" => flags.noexec = enable,
        "allexport" => flags.allexport = enable,
        "posix" => flags.posix = enable,
        _ => return false,
    }
    true
}

fn list_options(ctx: &BuiltinCtx<'_, '_>) -> Vec<u8> {
    let flags = &ctx.state.flags;
    let rows = [
        ("allexport", flags.allexport),
        ("errexit", flags.errexit),
        ("noclobber", flags.noclobber),
        ("noexec", flags.noexec),
        ("noglob", flags.noglob),
        ("nounset", flags.nounset),
        ("pipefail", flags.pipefail),
        ("posix", flags.posix),
        ("verbose", flags.verbose),
        ("xtrace", flags.xtrace),
    ];
    let mut out = String::new();
    for (name, on) in rows {
        out.push_str(&format!("{}\t{}\n", name, if on { "on" } else { "off" }));
    }
    out.into_bytes()
}

fn list_variables(ctx: &BuiltinCtx<'_, '_>) -> Vec<u8> {
    let mut out = Vec::new();
    for name in ctx.state.visible_names() {
        if let Some(var) = ctx.state.find_var(&name) {
            if let Value::Scalar(v) = &var.value {
                out.extend_from_slice(name.as_bytes());
                out.push(b'=');
                let text = lossy(v).into_owned();
                if text.contains(' ') || text.contains('\t') {
                    out.extend_from_slice(format!("'{}'", text).as_bytes());
                } else {
                    out.extend_from_slice(text.as_bytes());
                }
                out.push(b'\n');
            }
        }
    }
    out
}

pub fn shopt(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    let mut mode: Option<bool> = None; // Some(true)=set, Some(false)=unset
    let mut quiet = false;
    let mut names = Vec::new();
    for arg in argv {
        match arg.as_slice() {
            b"-s" => mode = Some(true),
            b"-u" => mode = Some(false),
            b"-q" => quiet = true,
            b"-p" | b"-o" => {}
            _ => names.push(lossy(arg).into_owned()),
        }
    }

    if names.is_empty() {
        let shopt = &ctx.state.shopt;
        let rows = [
            ("dotglob", shopt.dotglob),
            ("expand_aliases", shopt.expand_aliases),
            ("extglob", shopt.extglob),
            ("failglob", shopt.failglob),
            ("globstar", shopt.globstar),
            ("nocaseglob", shopt.nocaseglob),
            ("nocasematch", shopt.nocasematch),
            ("nullglob", shopt.nullglob),
            ("xpg_echo", shopt.xpg_echo),
        ];
        let mut out = String::new();
        for (name, on) in rows {
            if let Some(wanted) = mode {
                if wanted != on {
                    continue;
                }
            }
            out.push_str(&format!("{}\t{}\n", name, if on { "on" } else { "off" }));
        }
        return Ok(ExecResult::new(out.into_bytes(), Vec::new(), 0));
    }

    let mut code = 0;
    let mut out = String::new();
    let mut stderr = Vec::new();
    for name in names {
        let slot: Option<&mut bool> = {
            let shopt = &mut ctx.state.shopt;
            match name.as_str() {
                "extglob" => Some(&mut shopt.extglob),
                "dotglob" => Some(&mut shopt.dotglob),
                "nullglob" => Some(&mut shopt.nullglob),
                "failglob" => Some(&mut shopt.failglob),
                "globstar" => Some(&mut shopt.globstar),
                "nocaseglob" => Some(&mut shopt.nocaseglob),
                "nocasematch" => Some(&mut shopt.nocasematch),
                "expand_aliases" => Some(&mut shopt.expand_aliases),
                "xpg_echo" => Some(&mut shopt.xpg_echo),
                _ => None,
            }
        };
        match slot {
            None => {
                stderr.extend_from_slice(
                    format!("bash: shopt: {}: invalid shell option name\n", name).as_bytes(),
                );
                code = 1;
            }
            Some(slot) => match mode {
                Some(enable) => *slot = enable,
                None => {
                    let on = *slot;
                    if quiet {
                        if !on {
                            code = 1;
                        }
                    } else {
                        out.push_str(&format!("{}\t{}\n", name, if on { "on" } else { "off" }));
                        if !on {
                            code = 1;
                        }
                    }
                }
            },
        }
    }
    Ok(ExecResult::new(out.into_bytes(), stderr, code))
}
