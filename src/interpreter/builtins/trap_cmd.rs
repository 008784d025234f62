//! trap
//!
//! Registers handler source for events. The engine fires EXIT while
//! unwinding to return, ERR after failing commands, DEBUG before simple
//! commands and RETURN when functions or sourced scripts finish. Other
//! signal names are bookkeeping only (nothing here raises real signals).

use super::BuiltinCtx;
use crate::bytes::lossy;
use crate::interpreter::errors::ControlFlow;
use crate::interpreter::state::ExecResult;

const SIGNALS: &[(&str, i32)] = &[
    ("EXIT", 0),
    ("HUP", 1),
    ("INT", 2),
    ("QUIT", 3),
    ("ABRT", 6),
    ("KILL", 9),
    ("ALRM", 14),
    ("PIPE", 13),
    ("TERM", 15),
    ("USR1", 10),
    ("USR2", 12),
    ("CHLD", 17),
    ("CONT", 18),
    ("STOP", 19),
    ("TSTP", 20),
    ("ERR", -1),
    ("DEBUG", -2),
    ("RETURN", -3),
];

fn normalize_signal(name: &str) -> Option<String> {
    let upper = name.to_ascii_uppercase();
    let stripped = upper.strip_prefix("SIG").unwrap_or(&upper);
    if SIGNALS.iter().any(|(n, _)| *n == stripped) {
        return Some(stripped.to_string());
    }
    if let Ok(num) = name.parse::<i32>() {
        return SIGNALS.iter().find(|(_, v)| *v == num).map(|(n, _)| n.to_string());
    }
    None
}

pub fn trap(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    if argv.is_empty() || argv[0].as_slice() == b"-p" {
        let mut names: Vec<&String> = ctx.state.traps.keys().collect();
        names.sort();
        let mut out = String::new();
        for name in names {
            let action = lossy(&ctx.state.traps[name]).into_owned();
            out.push_str(&format!("trap -- '{}' {}\n", action.replace('\'', "'\\''"), name));
        }
        return Ok(ExecResult::new(out.into_bytes(), Vec::new(), 0));
    }

    if argv[0].as_slice() == b"-l" {
        let mut out = String::new();
        for (i, (name, num)) in SIGNALS.iter().enumerate() {
            if *num >= 0 {
                out.push_str(&format!("{:2}) SIG{}\t", num, name));
                if i % 4 == 3 {
                    out.push('\n');
                }
            }
        }
        out.push('\n');
        return Ok(ExecResult::new(out.into_bytes(), Vec::new(), 0));
    }

    let mut args = argv;
    if args[0].as_slice() == b"--" {
        args = &args[1..];
    }
    if args.is_empty() {
        return Ok(ExecResult::ok());
    }

    // A single numeric/known-signal argument resets that trap.
    let first = lossy(&args[0]).into_owned();
    let (action, signals) = if args.len() == 1 && normalize_signal(&first).is_some() {
        (None, &args[..])
    } else if first == "-" {
        (None, &args[1..])
    } else {
        (Some(args[0].clone()), &args[1..])
    };

    if signals.is_empty() {
        return Ok(ExecResult::failure_with_code("bash: trap: usage: trap [-lp] [arg signal_spec ...]\n", 2));
    }

    let mut stderr = Vec::new();
    let mut code = 0;
    for sig in signals {
        let text = lossy(sig).into_owned();
        match normalize_signal(&text) {
            None => {
                stderr.extend_from_slice(
                    format!("bash: trap: {}: invalid signal specification\n", text).as_bytes(),
                );
                code = 1;
            }
            Some(name) => match &action {
                None => {
                    ctx.state.traps.remove(&name);
                }
                Some(src) => {
                    ctx.state.traps.insert(name, src.clone());
                }
            },
        }
    }
    Ok(ExecResult::new(Vec::new(), stderr, code))
}
