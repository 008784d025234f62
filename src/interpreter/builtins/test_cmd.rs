//! test / [
//!
//! Classic POSIX test over already-expanded arguments: string operators
//! compare literally (no pattern matching, unlike `[[ ]]`), `-a`/`-o`
//! combine, `!` negates, parentheses group. Usage errors exit 2.

use super::BuiltinCtx;
use crate::bytes::lossy;
use crate::interpreter::cond::unary_test;
use crate::interpreter::errors::ControlFlow;
use crate::interpreter::state::ExecResult;

pub fn test(
    ctx: &mut BuiltinCtx<'_, '_>,
    argv: &[Vec<u8>],
    bracket: bool,
) -> Result<ExecResult, ControlFlow> {
    let mut args: Vec<Vec<u8>> = argv.to_vec();
    if bracket {
        match args.pop() {
            Some(last) if last == b"]" => {}
            _ => return Ok(ExecResult::failure_with_code("bash: [: missing `]'\n", 2)),
        }
    }

    let mut parser = TestParser { ctx, args: &args, pos: 0 };
    match parser.parse_or() {
        Err(message) => Ok(ExecResult::failure_with_code(format!("bash: test: {}\n", message), 2)),
        Ok(value) => {
            if parser.pos != args.len() {
                return Ok(ExecResult::failure_with_code(
                    "bash: test: too many arguments\n",
                    2,
                ));
            }
            Ok(ExecResult::from_code(i32::from(!value)))
        }
    }
}

struct TestParser<'p, 'a, 'b> {
    ctx: &'p BuiltinCtx<'a, 'b>,
    args: &'p [Vec<u8>],
    pos: usize,
}

impl TestParser<'_, '_, '_> {
    fn peek(&self) -> Option<&[u8]> {
        self.args.get(self.pos).map(|a| a.as_slice())
    }

    fn next(&mut self) -> Option<&[u8]> {
        let arg = self.args.get(self.pos)?;
        self.pos += 1;
        Some(arg.as_slice())
    }

    fn parse_or(&mut self) -> Result<bool, String> {
        let mut value = self.parse_and()?;
        while self.peek() == Some(b"-o") {
            self.pos += 1;
            let rhs = self.parse_and()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn parse_and(&mut self) -> Result<bool, String> {
        let mut value = self.parse_term()?;
        while self.peek() == Some(b"-a") {
            self.pos += 1;
            let rhs = self.parse_term()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<bool, String> {
        match self.peek() {
            None => Ok(false),
            Some(b"!") => {
                self.pos += 1;
                Ok(!self.parse_term()?)
            }
            Some(b"(") => {
                self.pos += 1;
                let inner = self.parse_or()?;
                if self.next() != Some(b")") {
                    return Err("`)' expected".to_string());
                }
                Ok(inner)
            }
            Some(_) => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<bool, String> {
        let first = self.next().map(|a| a.to_vec()).ok_or("argument expected")?;

        // Binary form?
        if let Some(op) = self.peek() {
            if is_binary_op(op) {
                let op = self.next().map(|a| a.to_vec()).ok_or("operator expected")?;
                let rhs = self
                    .next()
                    .map(|a| a.to_vec())
                    .ok_or_else(|| format!("{}: argument expected", lossy(&op)))?;
                return binary(self.ctx, &first, &op, &rhs);
            }
        }

        // Unary form: `-f path` style.
        if first.len() == 2 && first[0] == b'-' {
            if let Some(operand) = self.next().map(|a| a.to_vec()) {
                let op = lossy(&first).into_owned();
                return Ok(unary_test(self.ctx.exec, self.ctx.state, &op, &operand));
            }
            // `test -n` with no operand tests the literal string.
            return Ok(true);
        }

        // Bare string: true if non-empty.
        Ok(!first.is_empty())
    }
}

fn is_binary_op(op: &[u8]) -> bool {
    matches!(
        op,
        b"=" | b"==" | b"!=" | b"<" | b">" | b"-eq" | b"-ne" | b"-lt" | b"-le" | b"-gt" | b"-ge"
            | b"-nt" | b"-ot" | b"-ef"
    )
}

fn binary(
    ctx: &BuiltinCtx<'_, '_>,
    lhs: &[u8],
    op: &[u8],
    rhs: &[u8],
) -> Result<bool, String> {
    match op {
        b"=" | b"==" => Ok(lhs == rhs),
        b"!=" => Ok(lhs != rhs),
        b"<" => Ok(lhs < rhs),
        b">" => Ok(lhs > rhs),
        b"-eq" | b"-ne" | b"-lt" | b"-le" | b"-gt" | b"-ge" => {
            let l = int_operand(lhs)?;
            let r = int_operand(rhs)?;
            Ok(match op {
                b"-eq" => l == r,
                b"-ne" => l != r,
                b"-lt" => l < r,
                b"-le" => l <= r,
                b"-gt" => l > r,
                _ => l >= r,
            })
        }
        b"-nt" | b"-ot" => {
            let lp = ctx.exec.fs.resolve_path(&ctx.state.cwd, &lossy(lhs));
            let rp = ctx.exec.fs.resolve_path(&ctx.state.cwd, &lossy(rhs));
            let lt = ctx.exec.fs.stat(&lp).ok().map(|s| s.mtime);
            let rt = ctx.exec.fs.stat(&rp).ok().map(|s| s.mtime);
            Ok(match (lt, rt, op) {
                (Some(a), Some(b), b"-nt") => a > b,
                (Some(a), Some(b), _) => a < b,
                (Some(_), None, b"-nt") => true,
                (None, Some(_), b"-ot") => true,
                _ => false,
            })
        }
        b"-ef" => {
            let lp = ctx.exec.fs.resolve_path(&ctx.state.cwd, &lossy(lhs));
            let rp = ctx.exec.fs.resolve_path(&ctx.state.cwd, &lossy(rhs));
            Ok(ctx.exec.fs.realpath(&lp).ok() == ctx.exec.fs.realpath(&rp).ok()
                && ctx.exec.fs.exists(&lp))
        }
        other => Err(format!("{}: binary operator expected", lossy(other))),
    }
}

fn int_operand(bytes: &[u8]) -> Result<i64, String> {
    let text = lossy(bytes).into_owned();
    text.trim()
        .parse()
        .map_err(|_| format!("{}: integer expression expected", text))
}
