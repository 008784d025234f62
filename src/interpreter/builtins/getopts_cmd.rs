//! getopts
//!
//! POSIX option parsing over the positional parameters (or explicit
//! arguments), maintaining OPTIND/OPTARG plus an internal character cursor
//! for bundled options (`-ab` yields `a` then `b`). A leading `:` in the
//! optstring selects silent error reporting.

use super::BuiltinCtx;
use crate::bytes::lossy;
use crate::interpreter::errors::ControlFlow;
use crate::interpreter::state::ExecResult;
use crate::parser::parser::is_identifier;

pub fn getopts(ctx: &mut BuiltinCtx<'_, '_>, argv: &[Vec<u8>]) -> Result<ExecResult, ControlFlow> {
    if argv.len() < 2 {
        return Ok(ExecResult::failure_with_code(
            "bash: getopts: usage: getopts optstring name [arg ...]\n",
            2,
        ));
    }
    let optstring = lossy(&argv[0]).into_owned();
    let var_name = lossy(&argv[1]).into_owned();
    if !is_identifier(&var_name) {
        return Ok(ExecResult::failure_with_code(
            format!("bash: getopts: `{}': not a valid identifier\n", var_name),
            2,
        ));
    }

    let silent = optstring.starts_with(':');
    let opts: Vec<char> = optstring.trim_start_matches(':').chars().collect();

    let words: Vec<Vec<u8>> = if argv.len() > 2 {
        argv[2..].to_vec()
    } else {
        ctx.state.params().to_vec()
    };

    let mut optind: i64 = ctx
        .state
        .get_scalar_string("OPTIND")
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(1)
        .max(1);

    // Assigning OPTIND resets the bundling cursor.
    if optind != ctx.state.getopts.last_optind {
        ctx.state.getopts.char_index = 0;
    }
    let mut char_index = ctx.state.getopts.char_index;

    let _ = ctx.state.set_scalar("OPTARG", Vec::new());

    let finish = |ctx: &mut BuiltinCtx<'_, '_>, optind: i64, char_index: usize, code: i32| {
        let _ = ctx.state.set_scalar("OPTIND", optind.to_string().into_bytes());
        ctx.state.getopts.last_optind = optind;
        ctx.state.getopts.char_index = char_index;
        Ok(ExecResult::from_code(code))
    };

    let end_of_options = |ctx: &mut BuiltinCtx<'_, '_>, optind: i64| {
        let _ = ctx.state.set_scalar(&var_name, b"?".to_vec());
        finish(ctx, optind, 0, 1)
    };

    loop {
        if optind as usize > words.len() {
            return end_of_options(ctx, optind);
        }
        let current = lossy(&words[(optind - 1) as usize]).into_owned();
        let chars: Vec<char> = current.chars().collect();

        if char_index == 0 {
            if current == "--" {
                return end_of_options(ctx, optind + 1);
            }
            if !current.starts_with('-') || current == "-" {
                return end_of_options(ctx, optind);
            }
            char_index = 1;
        }

        let Some(&opt) = chars.get(char_index) else {
            // Ran off the end of a bundle; move to the next word.
            optind += 1;
            char_index = 0;
            continue;
        };
        char_index += 1;
        let bundle_done = char_index >= chars.len();

        let takes_arg = {
            let mut takes = false;
            for (i, c) in opts.iter().enumerate() {
                if *c == opt {
                    takes = opts.get(i + 1) == Some(&':');
                    break;
                }
            }
            takes
        };
        let known = opts.iter().any(|c| *c == opt) && opt != ':';

        if !known {
            let _ = ctx.state.set_scalar(&var_name, b"?".to_vec());
            let (next_ind, next_char) = if bundle_done { (optind + 1, 0) } else { (optind, char_index) };
            if silent {
                let _ = ctx.state.set_scalar("OPTARG", opt.to_string().into_bytes());
                return finish(ctx, next_ind, next_char, 0);
            }
            let mut result = finish(ctx, next_ind, next_char, 0)?;
            result.stderr = format!("bash: getopts: illegal option -- {}\n", opt).into_bytes();
            return Ok(result);
        }

        if takes_arg {
            if !bundle_done {
                // Argument glued to the option: -ovalue.
                let value: String = chars[char_index..].iter().collect();
                let _ = ctx.state.set_scalar("OPTARG", value.into_bytes());
                let _ = ctx.state.set_scalar(&var_name, opt.to_string().into_bytes());
                return finish(ctx, optind + 1, 0, 0);
            }
            if optind as usize >= words.len() {
                // Missing argument.
                if silent {
                    let _ = ctx.state.set_scalar(&var_name, b":".to_vec());
                    let _ = ctx.state.set_scalar("OPTARG", opt.to_string().into_bytes());
                    return finish(ctx, optind + 1, 0, 0);
                }
                let _ = ctx.state.set_scalar(&var_name, b"?".to_vec());
                let mut result = finish(ctx, optind + 1, 0, 0)?;
                result.stderr =
                    format!("bash: getopts: option requires an argument -- {}\n", opt).into_bytes();
                return Ok(result);
            }
            let value = words[optind as usize].clone();
            let _ = ctx.state.set_scalar("OPTARG", value);
            let _ = ctx.state.set_scalar(&var_name, opt.to_string().into_bytes());
            return finish(ctx, optind + 2, 0, 0);
        }

        let _ = ctx.state.set_scalar(&var_name, opt.to_string().into_bytes());
        let (next_ind, next_char) = if bundle_done { (optind + 1, 0) } else { (optind, char_index) };
        return finish(ctx, next_ind, next_char, 0);
    }
}
