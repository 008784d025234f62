//! read
//!
//! Consumes one delimiter-terminated record from the active stdin buffer
//! (the enclosing compound's redirected stdin when present, the command's
//! own stdin otherwise), splits it on IFS and assigns. Without `-r`,
//! backslash escapes are processed and backslash-newline continues the
//! record. A record terminated by EOF rather than the delimiter is still
//! assigned, but the exit status is nonzero.

use super::BuiltinCtx;
use crate::bytes::lossy;
use crate::interpreter::errors::ControlFlow;
use crate::interpreter::state::{ExecResult, Value};
use crate::parser::parser::is_identifier;
use indexmap::IndexMap;

pub fn read(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    let mut raw = false;
    let mut prompt: Option<String> = None;
    let mut delim = b'\n';
    let mut array_name: Option<String> = None;
    let mut timed = false;
    let mut names: Vec<String> = Vec::new();

    let mut i = 0;
    while i < argv.len() {
        let text = lossy(&argv[i]).into_owned();
        match text.as_str() {
            "-r" => raw = true,
            "-s" => {}
            "-p" => {
                i += 1;
                prompt = super::arg_text(argv, i);
            }
            "-d" => {
                i += 1;
                delim = argv.get(i).and_then(|d| d.first().copied()).unwrap_or(0);
            }
            "-t" => {
                i += 1;
                timed = true;
            }
            "-a" => {
                i += 1;
                array_name = super::arg_text(argv, i);
            }
            "-n" | "-N" | "-u" => {
                i += 1;
            }
            "--" => {}
            _ => names.push(text),
        }
        i += 1;
    }

    for name in &names {
        if !is_identifier(name) {
            return Ok(ExecResult::failure_with_code(
                format!("bash: read: `{}': not a valid identifier\n", name),
                2,
            ));
        }
    }

    let mut stderr = Vec::new();
    if let Some(p) = prompt {
        stderr.extend_from_slice(p.as_bytes());
    }

    // A pipeline stage or `read < f` invocation owns its stdin outright:
    // install it as the consumable buffer for the duration of this call.
    let installed = if ctx.state.group_stdin.is_none() {
        ctx.state.group_stdin = Some(ctx.stdin.to_vec());
        true
    } else {
        false
    };

    // Pull the record out of the consumable buffer.
    let (line, eof) = take_record(ctx, delim, raw);

    if installed {
        ctx.state.group_stdin = None;
    }

    if eof && line.is_empty() {
        // Nothing to read: assign empties and fail (timeouts surface as
        // >128 per the signal-range convention).
        assign_empty(ctx, &names, array_name.as_deref());
        let code = if timed { 142 } else { 1 };
        return Ok(ExecResult::new(Vec::new(), stderr, code));
    }

    let line = if raw { line } else { process_escapes(&line) };

    if let Some(arr) = array_name {
        let fields = split_ifs(&line, &ctx.state.ifs());
        let mut map = IndexMap::new();
        for (idx, field) in fields.into_iter().enumerate() {
            map.insert(idx as i64, field);
        }
        if let Err(e) = ctx
            .state
            .var_for_update(&arr)
            .map(|var| var.value = Value::Indexed(map))
        {
            return Ok(ExecResult::failure(format!("bash: read: {}\n", e)));
        }
        return Ok(ExecResult::new(Vec::new(), stderr, i32::from(eof)));
    }

    if names.is_empty() {
        let _ = ctx.state.set_scalar("REPLY", line);
        return Ok(ExecResult::new(Vec::new(), stderr, i32::from(eof)));
    }

    // First n-1 names take one field each; the last takes the remainder.
    let ifs = ctx.state.ifs();
    let mut rest = trim_ifs_ws(&line, &ifs);
    for (idx, name) in names.iter().enumerate() {
        let last = idx == names.len() - 1;
        let value = if last {
            trim_ifs_ws(&rest, &ifs)
        } else {
            match split_first(&rest, &ifs) {
                Some((field, remainder)) => {
                    rest = remainder;
                    field
                }
                None => {
                    let field = std::mem::take(&mut rest);
                    field
                }
            }
        };
        if let Err(e) = ctx.state.set_scalar(name, value) {
            stderr.extend_from_slice(format!("bash: read: {}\n", e).as_bytes());
            return Ok(ExecResult::new(Vec::new(), stderr, 1));
        }
    }
    Ok(ExecResult::new(Vec::new(), stderr, i32::from(eof)))
}

/// Take bytes up to the delimiter from the live buffer. The flag reports
/// whether EOF arrived before the delimiter: the partial content is still
/// assigned, but `read` exits nonzero — this is what stops a
/// `while read line` loop at a final line with no trailing newline.
fn take_record(ctx: &mut BuiltinCtx<'_, '_>, delim: u8, raw: bool) -> (Vec<u8>, bool) {
    let mut record = Vec::new();
    loop {
        match take_until(ctx, delim) {
            None => return (record, true),
            Some((bytes, delimited)) => {
                if !delimited {
                    record.extend_from_slice(&bytes);
                    return (record, true);
                }
                // Backslash-newline continuation without -r.
                if !raw && delim == b'\n' && ends_with_odd_backslashes(&bytes) {
                    record.extend_from_slice(&bytes[..bytes.len() - 1]);
                    continue;
                }
                record.extend_from_slice(&bytes);
                return (record, false);
            }
        }
    }
}

/// One chunk from the consumable group-stdin buffer (the engine installs
/// it; `read` is the only consumer): the bytes up to the delimiter, plus
/// whether the delimiter was actually found (it is consumed when present).
/// None once the buffer is exhausted.
fn take_until(ctx: &mut BuiltinCtx<'_, '_>, delim: u8) -> Option<(Vec<u8>, bool)> {
    let buffer = ctx.state.group_stdin_mut()?;
    if buffer.is_empty() {
        return None;
    }
    match buffer.iter().position(|b| *b == delim) {
        Some(pos) => {
            let chunk: Vec<u8> = buffer.drain(..=pos).collect();
            Some((chunk[..chunk.len() - 1].to_vec(), true))
        }
        None => Some((std::mem::take(buffer), false)),
    }
}

fn ends_with_odd_backslashes(bytes: &[u8]) -> bool {
    let trailing = bytes.iter().rev().take_while(|b| **b == b'\\').count();
    trailing % 2 == 1
}

fn process_escapes(line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());
    let mut i = 0;
    while i < line.len() {
        if line[i] == b'\\' && i + 1 < line.len() {
            out.push(line[i + 1]);
            i += 2;
        } else if line[i] == b'\\' {
            i += 1;
        } else {
            out.push(line[i]);
            i += 1;
        }
    }
    out
}

fn assign_empty(ctx: &mut BuiltinCtx<'_, '_>, names: &[String], array: Option<&str>) {
    if let Some(arr) = array {
        if let Ok(var) = ctx.state.var_for_update(arr) {
            var.value = Value::Indexed(IndexMap::new());
        }
        return;
    }
    if names.is_empty() {
        let _ = ctx.state.set_scalar("REPLY", Vec::new());
    }
    for name in names {
        let _ = ctx.state.set_scalar(name, Vec::new());
    }
}

fn is_ifs_ws(b: u8, ifs: &[u8]) -> bool {
    matches!(b, b' ' | b'\t' | b'\n') && ifs.contains(&b)
}

fn trim_ifs_ws(bytes: &[u8], ifs: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| !is_ifs_ws(*b, ifs)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !is_ifs_ws(*b, ifs)).map_or(start, |e| e + 1);
    bytes[start..end].to_vec()
}

/// Split off the first IFS-delimited field.
fn split_first(bytes: &[u8], ifs: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let trimmed = trim_ifs_ws(bytes, ifs);
    let pos = trimmed.iter().position(|b| ifs.contains(b))?;
    let field = trimmed[..pos].to_vec();
    let mut rest_start = pos;
    // Consume the separator (whitespace run or one hard separator).
    if is_ifs_ws(trimmed[rest_start], ifs) {
        while rest_start < trimmed.len() && is_ifs_ws(trimmed[rest_start], ifs) {
            rest_start += 1;
        }
        if rest_start < trimmed.len() && ifs.contains(&trimmed[rest_start]) && !is_ifs_ws(trimmed[rest_start], ifs) {
            rest_start += 1;
        }
    } else {
        rest_start += 1;
    }
    Some((field, trimmed[rest_start..].to_vec()))
}

fn split_ifs(bytes: &[u8], ifs: &[u8]) -> Vec<Vec<u8>> {
    let mut fields = Vec::new();
    let mut rest = trim_ifs_ws(bytes, ifs);
    while !rest.is_empty() {
        match split_first(&rest, ifs) {
            Some((field, remainder)) => {
                fields.push(field);
                rest = remainder;
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }
    fields
}
