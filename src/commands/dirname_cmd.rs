//! dirname

use super::{Command, CommandContext, CommandResult};

pub struct Dirname;

impl Command for Dirname {
    fn name(&self) -> &'static str {
        "dirname"
    }

    fn execute(&self, argv: &[Vec<u8>], _ctx: &mut CommandContext<'_>) -> CommandResult {
        let Some(path) = argv.first() else {
            return CommandResult::error("dirname: missing operand\n");
        };
        let text = String::from_utf8_lossy(path).into_owned();
        let trimmed = text.trim_end_matches('/');
        let dir = match trimmed.rfind('/') {
            None => ".".to_string(),
            Some(0) => "/".to_string(),
            Some(pos) => trimmed[..pos].to_string(),
        };
        CommandResult::success(format!("{}\n", dir).into_bytes())
    }
}
