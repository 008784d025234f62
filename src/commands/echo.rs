//! echo

use super::{Command, CommandContext, CommandResult};
use crate::bytes::decode_ansi_c;

pub struct Echo;

impl Command for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn execute(&self, argv: &[Vec<u8>], ctx: &mut CommandContext<'_>) -> CommandResult {
        let mut newline = true;
        let mut escapes = ctx.xpg_echo;
        let mut start = 0;

        for arg in argv {
            match arg.as_slice() {
                b"-n" => newline = false,
                b"-e" => escapes = true,
                b"-E" => escapes = false,
                _ => break,
            }
            start += 1;
        }

        let mut out: Vec<u8> = Vec::new();
        for (i, arg) in argv[start..].iter().enumerate() {
            if i > 0 {
                out.push(b' ');
            }
            if escapes {
                let text = String::from_utf8_lossy(arg);
                let decoded = decode_ansi_c(&text);
                // \c truncates the output, newline included.
                if let Some(pos) = find_truncation(&text) {
                    let truncated = decode_ansi_c(&text[..pos]);
                    out.extend_from_slice(&truncated);
                    return CommandResult::success(out);
                }
                out.extend_from_slice(&decoded);
            } else {
                out.extend_from_slice(arg);
            }
        }
        if newline {
            out.push(b'\n');
        }
        CommandResult::success(out)
    }
}

fn find_truncation(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'\\' {
            if bytes[i + 1] == b'c' {
                return Some(i);
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandContext;
    use crate::fs::{InMemoryFs, SyncFsAdapter};
    use crate::interpreter::state::ExecutionLimits;
    use std::sync::Arc;

    fn run(argv: &[&str], xpg: bool) -> Vec<u8> {
        let rt = tokio::runtime::Builder::new_multi_thread().build().unwrap();
        let _guard = rt.enter();
        let fs = SyncFsAdapter::new(Arc::new(InMemoryFs::new()), rt.handle().clone());
        let mut ctx = CommandContext {
            fs: &fs,
            cwd: "/".to_string(),
            env: Default::default(),
            stdin: Vec::new(),
            xpg_echo: xpg,
            limits: ExecutionLimits::default(),
            exec: None,
        };
        let argv: Vec<Vec<u8>> = argv.iter().map(|a| a.as_bytes().to_vec()).collect();
        Echo.execute(&argv, &mut ctx).stdout
    }

    #[test]
    fn test_echo_basic() {
        assert_eq!(run(&["hello", "world"], false), b"hello world\n");
        assert_eq!(run(&[], false), b"\n");
    }

    #[test]
    fn test_echo_n() {
        assert_eq!(run(&["-n", "x"], false), b"x");
    }

    #[test]
    fn test_echo_e() {
        assert_eq!(run(&["-e", "a\\tb"], false), b"a\tb\n");
        // Without -e the backslash is literal.
        assert_eq!(run(&["a\\tb"], false), b"a\\tb\n");
    }

    #[test]
    fn test_xpg_echo_default() {
        assert_eq!(run(&["a\\tb"], true), b"a\tb\n");
    }

    #[test]
    fn test_echo_c_truncates() {
        assert_eq!(run(&["-e", "ab\\ccd", "tail"], false), b"ab");
    }
}
