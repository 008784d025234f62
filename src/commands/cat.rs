//! cat

use super::{Command, CommandContext, CommandResult};

pub struct Cat;

impl Command for Cat {
    fn name(&self) -> &'static str {
        "cat"
    }

    fn execute(&self, argv: &[Vec<u8>], ctx: &mut CommandContext<'_>) -> CommandResult {
        let mut number_lines = false;
        let mut files: Vec<String> = Vec::new();
        for arg in argv {
            match arg.as_slice() {
                b"-n" => number_lines = true,
                b"--" => {}
                _ => files.push(String::from_utf8_lossy(arg).into_owned()),
            }
        }

        let mut out: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();
        let mut code = 0;

        let mut emit = |bytes: &[u8], out: &mut Vec<u8>| {
            if number_lines {
                for (i, line) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
                    out.extend_from_slice(format!("{:6}\t", i + 1).as_bytes());
                    out.extend_from_slice(line);
                }
            } else {
                out.extend_from_slice(bytes);
            }
        };

        if files.is_empty() {
            let stdin = std::mem::take(&mut ctx.stdin);
            emit(&stdin, &mut out);
            return CommandResult::with_code(out, stderr, code);
        }

        for file in files {
            if file == "-" {
                let stdin = std::mem::take(&mut ctx.stdin);
                emit(&stdin, &mut out);
                continue;
            }
            let path = ctx.resolve(&file);
            match ctx.fs.read_file(&path) {
                Ok(bytes) => emit(&bytes, &mut out),
                Err(e) => {
                    stderr.extend_from_slice(format!("cat: {}\n", e).as_bytes());
                    code = 1;
                }
            }
        }
        CommandResult::with_code(out, stderr, code)
    }
}
