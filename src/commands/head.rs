//! head

use super::{Command, CommandContext, CommandResult};

pub struct Head;

impl Command for Head {
    fn name(&self) -> &'static str {
        "head"
    }

    fn execute(&self, argv: &[Vec<u8>], ctx: &mut CommandContext<'_>) -> CommandResult {
        let (count, bytes_mode, files) = match parse_args(argv) {
            Ok(parsed) => parsed,
            Err(e) => return CommandResult::error(e),
        };

        let mut out: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();
        let mut code = 0;
        let inputs = collect_inputs(ctx, &files, &mut stderr, &mut code);
        for (label, bytes) in inputs {
            if files.len() > 1 {
                out.extend_from_slice(format!("==> {} <==\n", label).as_bytes());
            }
            if bytes_mode {
                out.extend_from_slice(&bytes[..count.min(bytes.len())]);
            } else {
                for line in bytes.split_inclusive(|b| *b == b'\n').take(count) {
                    out.extend_from_slice(line);
                }
            }
        }
        CommandResult::with_code(out, stderr, code)
    }
}

type ParsedArgs = (usize, bool, Vec<String>);

fn parse_args(argv: &[Vec<u8>]) -> Result<ParsedArgs, String> {
    let mut count = 10usize;
    let mut bytes_mode = false;
    let mut files = Vec::new();
    let mut i = 0;
    while i < argv.len() {
        let text = String::from_utf8_lossy(&argv[i]).into_owned();
        match text.as_str() {
            "-n" | "-c" => {
                bytes_mode = text == "-c";
                i += 1;
                let value = argv
                    .get(i)
                    .map(|v| String::from_utf8_lossy(v).into_owned())
                    .unwrap_or_default();
                count = value
                    .trim()
                    .parse()
                    .map_err(|_| format!("head: invalid number of lines: '{}'\n", value))?;
            }
            "--" => {}
            other if other.starts_with('-') && other.len() > 1 && other[1..].chars().all(|c| c.is_ascii_digit()) => {
                count = other[1..].parse().unwrap_or(10);
            }
            other => files.push(other.to_string()),
        }
        i += 1;
    }
    Ok((count, bytes_mode, files))
}

pub(crate) fn collect_inputs(
    ctx: &mut CommandContext<'_>,
    files: &[String],
    stderr: &mut Vec<u8>,
    code: &mut i32,
) -> Vec<(String, Vec<u8>)> {
    if files.is_empty() {
        return vec![("standard input".to_string(), std::mem::take(&mut ctx.stdin))];
    }
    let mut inputs = Vec::new();
    for file in files {
        if file == "-" {
            inputs.push(("standard input".to_string(), ctx.stdin.clone()));
            continue;
        }
        match ctx.fs.read_file(&ctx.resolve(file)) {
            Ok(bytes) => inputs.push((file.clone(), bytes)),
            Err(e) => {
                stderr.extend_from_slice(format!("head: {}\n", e).as_bytes());
                *code = 1;
            }
        }
    }
    inputs
}
