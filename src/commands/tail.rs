//! tail

use super::head::collect_inputs;
use super::{Command, CommandContext, CommandResult};

pub struct Tail;

impl Command for Tail {
    fn name(&self) -> &'static str {
        "tail"
    }

    fn execute(&self, argv: &[Vec<u8>], ctx: &mut CommandContext<'_>) -> CommandResult {
        let mut count = 10usize;
        let mut bytes_mode = false;
        let mut from_start = false;
        let mut files: Vec<String> = Vec::new();

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
                    let trimmed = value.trim();
                    if let Some(rest) = trimmed.strip_prefix('+') {
                        from_start = true;
                        count = rest.parse().unwrap_or(1);
                    } else {
                        match trimmed.parse() {
                            Ok(n) => count = n,
                            Err(_) => {
                                return CommandResult::error(format!(
                                    "tail: invalid number of lines: '{}'\n",
                                    value
                                ))
                            }
                        }
                    }
                }
                "-f" | "--" => {}
                other if other.starts_with('-')
                    && other.len() > 1
                    && other[1..].chars().all(|c| c.is_ascii_digit()) =>
                {
                    count = other[1..].parse().unwrap_or(10);
                }
                other => files.push(other.to_string()),
            }
            i += 1;
        }

        let mut out: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();
        let mut code = 0;
        let inputs = collect_inputs(ctx, &files, &mut stderr, &mut code);
        for (label, bytes) in inputs {
            if files.len() > 1 {
                out.extend_from_slice(format!("==> {} <==\n", label).as_bytes());
            }
            if bytes_mode {
                let start = if from_start {
                    count.saturating_sub(1).min(bytes.len())
                } else {
                    bytes.len().saturating_sub(count)
                };
                out.extend_from_slice(&bytes[start..]);
            } else {
                let lines: Vec<&[u8]> = bytes.split_inclusive(|b| *b == b'\n').collect();
                let start = if from_start {
                    count.saturating_sub(1).min(lines.len())
                } else {
                    lines.len().saturating_sub(count)
                };
                for line in &lines[start..] {
                    out.extend_from_slice(line);
                }
            }
        }
        CommandResult::with_code(out, stderr, code)
    }
}
