//! wc

use super::{Command, CommandContext, CommandResult};

pub struct Wc;

struct Counts {
    lines: usize,
    words: usize,
    bytes: usize,
}

fn count(bytes: &[u8]) -> Counts {
    let lines = bytes.iter().filter(|b| **b == b'\n').count();
    let words = bytes
        .split(|b| b.is_ascii_whitespace())
        .filter(|w| !w.is_empty())
        .count();
    Counts { lines, words, bytes: bytes.len() }
}

impl Command for Wc {
    fn name(&self) -> &'static str {
        "wc"
    }

    fn execute(&self, argv: &[Vec<u8>], ctx: &mut CommandContext<'_>) -> CommandResult {
        let mut show_lines = false;
        let mut show_words = false;
        let mut show_bytes = false;
        let mut files: Vec<String> = Vec::new();

        for arg in argv {
            match arg.as_slice() {
                b"-l" => show_lines = true,
                b"-w" => show_words = true,
                b"-c" | b"-m" => show_bytes = true,
                b"--" => {}
                _ => files.push(String::from_utf8_lossy(arg).into_owned()),
            }
        }
        if !show_lines && !show_words && !show_bytes {
            show_lines = true;
            show_words = true;
            show_bytes = true;
        }
        let single_field =
            [show_lines, show_words, show_bytes].iter().filter(|f| **f).count() == 1;

        let render = |c: &Counts, label: Option<&str>| -> String {
            let mut fields: Vec<String> = Vec::new();
            if show_lines {
                fields.push(c.lines.to_string());
            }
            if show_words {
                fields.push(c.words.to_string());
            }
            if show_bytes {
                fields.push(c.bytes.to_string());
            }
            let body = if single_field && label.is_none() {
                fields.join(" ")
            } else {
                fields
                    .iter()
                    .map(|f| format!("{:>7}", f))
                    .collect::<Vec<_>>()
                    .join("")
            };
            match label {
                Some(name) => format!("{} {}\n", body, name),
                None => format!("{}\n", body),
            }
        };

        let mut out = String::new();
        let mut stderr = Vec::new();
        let mut code = 0;

        if files.is_empty() {
            let c = count(&ctx.stdin);
            out.push_str(&render(&c, None));
            return CommandResult::with_code(out.into_bytes(), stderr, code);
        }

        let mut totals = Counts { lines: 0, words: 0, bytes: 0 };
        let many = files.len() > 1;
        for file in &files {
            let content = if file == "-" {
                Ok(ctx.stdin.clone())
            } else {
                ctx.fs.read_file(&ctx.resolve(file))
            };
            match content {
                Ok(bytes) => {
                    let c = count(&bytes);
                    totals.lines += c.lines;
                    totals.words += c.words;
                    totals.bytes += c.bytes;
                    out.push_str(&render(&c, Some(file)));
                }
                Err(e) => {
                    stderr.extend_from_slice(format!("wc: {}\n", e).as_bytes());
                    code = 1;
                }
            }
        }
        if many {
            out.push_str(&render(&totals, Some("total")));
        }
        CommandResult::with_code(out.into_bytes(), stderr, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count() {
        let c = count(b"one two\nthree\n");
        assert_eq!(c.lines, 2);
        assert_eq!(c.words, 3);
        assert_eq!(c.bytes, 14);
    }

    #[test]
    fn test_count_raw_bytes() {
        // A raw 0xff plus newline is two bytes.
        let c = count(&[0xff, b'\n']);
        assert_eq!(c.bytes, 2);
        assert_eq!(c.lines, 1);
    }
}
