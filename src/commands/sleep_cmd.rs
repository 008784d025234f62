//! sleep
//!
//! Time does not pass in the sandbox: the argument is validated and the
//! command completes immediately.

use super::{Command, CommandContext, CommandResult};

pub struct Sleep;

impl Command for Sleep {
    fn name(&self) -> &'static str {
        "sleep"
    }

    fn execute(&self, argv: &[Vec<u8>], _ctx: &mut CommandContext<'_>) -> CommandResult {
        let Some(arg) = argv.first() else {
            return CommandResult::error("sleep: missing operand\n");
        };
        let text = String::from_utf8_lossy(arg).into_owned();
        let trimmed = text.trim().trim_end_matches(['s', 'm', 'h', 'd']);
        if trimmed.parse::<f64>().is_err() {
            return CommandResult::error(format!("sleep: invalid time interval '{}'\n", text));
        }
        CommandResult::success(Vec::new())
    }
}
