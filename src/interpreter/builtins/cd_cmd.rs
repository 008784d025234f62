//! cd / pwd

use super::BuiltinCtx;
use crate::bytes::lossy;
use crate::interpreter::errors::ControlFlow;
use crate::interpreter::state::ExecResult;

pub fn cd(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    let mut physical = false;
    let mut target: Option<String> = None;
    for arg in argv {
        match arg.as_slice() {
            b"-L" => physical = false,
            b"-P" => physical = true,
            b"--" => {}
            _ => {
                target = Some(lossy(arg).into_owned());
                break;
            }
        }
    }

    let mut print_target = false;
    let dest = match target.as_deref() {
        None => match ctx.state.get_scalar_string("HOME") {
            Some(home) => home,
            None => return Ok(ExecResult::failure("bash: cd: HOME not set\n")),
        },
        Some("-") => {
            print_target = true;
            match ctx.state.get_scalar_string("OLDPWD") {
                Some(old) => old,
                None => ctx.state.previous_dir.clone(),
            }
        }
        Some(path) => path.to_string(),
    };

    let mut resolved = ctx.exec.fs.resolve_path(&ctx.state.cwd, &dest);
    if physical {
        match ctx.exec.fs.realpath(&resolved) {
            Ok(real) => resolved = real,
            Err(_) => {
                return Ok(ExecResult::failure(format!(
                    "bash: cd: {}: No such file or directory\n",
                    dest
                )))
            }
        }
    }
    if !ctx.exec.fs.is_dir(&resolved) {
        let reason = if ctx.exec.fs.exists(&resolved) {
            "Not a directory"
        } else {
            "No such file or directory"
        };
        return Ok(ExecResult::failure(format!("bash: cd: {}: {}\n", dest, reason)));
    }

    let old = ctx.state.cwd.clone();
    ctx.state.previous_dir = old.clone();
    ctx.state.cwd = resolved.clone();
    let _ = ctx.state.set_scalar("OLDPWD", old.into_bytes());
    let _ = ctx.state.set_scalar("PWD", resolved.clone().into_bytes());
    ctx.state.mark_exported("OLDPWD");
    ctx.state.mark_exported("PWD");

    if print_target {
        return Ok(ExecResult::new(format!("{}\n", resolved).into_bytes(), Vec::new(), 0));
    }
    Ok(ExecResult::ok())
}

pub fn pwd(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    let physical = argv.iter().any(|a| a.as_slice() == b"-P");
    let cwd = if physical {
        ctx.exec
            .fs
            .realpath(&ctx.state.cwd)
            .unwrap_or_else(|_| ctx.state.cwd.clone())
    } else {
        ctx.state.cwd.clone()
    };
    Ok(ExecResult::new(format!("{}\n", cwd).into_bytes(), Vec::new(), 0))
}
