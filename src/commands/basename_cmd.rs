//! basename

use super::{Command, CommandContext, CommandResult};
use crate::fs::types::basename;

pub struct Basename;

impl Command for Basename {
    fn name(&self) -> &'static str {
        "basename"
    }

    fn execute(&self, argv: &[Vec<u8>], _ctx: &mut CommandContext<'_>) -> CommandResult {
        let Some(path) = argv.first() else {
            return CommandResult::error("basename: missing operand\n");
        };
        let path = String::from_utf8_lossy(path).into_owned();
        let mut name = basename(&path);
        if let Some(suffix) = argv.get(1) {
            let suffix = String::from_utf8_lossy(suffix).into_owned();
            if name != suffix {
                if let Some(stripped) = name.strip_suffix(&suffix) {
                    name = stripped.to_string();
                }
            }
        }
        CommandResult::success(format!("{}\n", name).into_bytes())
    }
}
