//! seq

use super::{Command, CommandContext, CommandResult};

pub struct Seq;

impl Command for Seq {
    fn name(&self) -> &'static str {
        "seq"
    }

    fn execute(&self, argv: &[Vec<u8>], _ctx: &mut CommandContext<'_>) -> CommandResult {
        let mut separator = "\n".to_string();
        let mut numbers: Vec<i64> = Vec::new();
        let mut i = 0;
        while i < argv.len() {
            match argv[i].as_slice() {
                b"-s" => {
                    i += 1;
                    separator = argv
                        .get(i)
                        .map(|s| String::from_utf8_lossy(s).into_owned())
                        .unwrap_or_else(|| "\n".to_string());
                }
                other => {
                    let text = String::from_utf8_lossy(other);
                    match text.trim().parse::<i64>() {
                        Ok(n) => numbers.push(n),
                        Err(_) => {
                            return CommandResult::error(format!(
                                "seq: invalid floating point argument: {}\n",
                                text
                            ))
                        }
                    }
                }
            }
            i += 1;
        }

        let (first, step, last) = match numbers.as_slice() {
            [last] => (1, 1, *last),
            [first, last] => (*first, 1, *last),
            [first, step, last] => (*first, *step, *last),
            _ => return CommandResult::error("seq: missing operand\n"),
        };
        if step == 0 {
            return CommandResult::error("seq: invalid Zero increment value: '0'\n");
        }

        let mut out = String::new();
        let mut value = first;
        let mut emitted = false;
        while (step > 0 && value <= last) || (step < 0 && value >= last) {
            if emitted {
                out.push_str(&separator);
            }
            out.push_str(&value.to_string());
            emitted = true;
            value += step;
        }
        if emitted {
            out.push('\n');
        }
        CommandResult::success(out.into_bytes())
    }
}
