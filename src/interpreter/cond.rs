//! Conditional Expressions
//!
//! Evaluation for `[[ … ]]` and the byte-level test primitives shared with
//! the `test`/`[` builtin. No word splitting happens inside `[[ ]]`; an
//! unquoted right side of `==`/`!=` is a pattern, `=~` is a regex whose
//! quoted spans match literally. Capture groups land in `BASH_REMATCH`.

use indexmap::IndexMap;

use crate::ast::types::{CondBinaryOp, CondExpr};
use crate::bytes::lossy;
use crate::interpreter::engine::Executor;
use crate::interpreter::errors::ControlFlow;
use crate::interpreter::expand::{Expander, Field};
use crate::interpreter::state::{ShellState, Value, Variable};
use crate::pattern::{fnmatch, MatchOptions};

/// Evaluate a `[[ ]]` expression; stderr from inner substitutions is
/// appended to `stderr`.
pub fn eval_cond(
    exec: &Executor<'_>,
    state: &mut ShellState,
    expr: &CondExpr,
    stderr: &mut Vec<u8>,
) -> Result<bool, ControlFlow> {
    match expr {
        CondExpr::Not(inner) => Ok(!eval_cond(exec, state, inner, stderr)?),
        CondExpr::And(a, b) => {
            Ok(eval_cond(exec, state, a, stderr)? && eval_cond(exec, state, b, stderr)?)
        }
        CondExpr::Or(a, b) => {
            Ok(eval_cond(exec, state, a, stderr)? || eval_cond(exec, state, b, stderr)?)
        }
        CondExpr::Word(word) => {
            let bytes = expand_single(exec, state, word, stderr)?;
            Ok(!bytes.is_empty())
        }
        CondExpr::UnaryTest { op, operand } => {
            let bytes = expand_single(exec, state, operand, stderr)?;
            Ok(unary_test(exec, state, op, &bytes))
        }
        CondExpr::BinaryTest { op, lhs, rhs } => match op {
            CondBinaryOp::StrEq | CondBinaryOp::StrNe => {
                let left = expand_single(exec, state, lhs, stderr)?;
                let pattern = {
                    let mut xp = Expander::new(exec, state);
                    let p = xp.expand_pattern(rhs)?;
                    stderr.extend_from_slice(&xp.stderr);
                    p
                };
                let opts = MatchOptions { extglob: true, nocase: state.shopt.nocasematch };
                let matched = fnmatch(&pattern, &left, &opts);
                Ok(if *op == CondBinaryOp::StrEq { matched } else { !matched })
            }
            CondBinaryOp::Match => {
                let left = expand_single(exec, state, lhs, stderr)?;
                let field = {
                    let mut xp = Expander::new(exec, state);
                    let f = xp.expand_word_single_field(rhs)?;
                    stderr.extend_from_slice(&xp.stderr);
                    f
                };
                regex_match(state, &left, &field)
            }
            CondBinaryOp::StrLt | CondBinaryOp::StrGt => {
                let left = expand_single(exec, state, lhs, stderr)?;
                let right = expand_single(exec, state, rhs, stderr)?;
                Ok(if *op == CondBinaryOp::StrLt { left < right } else { left > right })
            }
            CondBinaryOp::NumEq
            | CondBinaryOp::NumNe
            | CondBinaryOp::NumLt
            | CondBinaryOp::NumLe
            | CondBinaryOp::NumGt
            | CondBinaryOp::NumGe => {
                let left = expand_single(exec, state, lhs, stderr)?;
                let right = expand_single(exec, state, rhs, stderr)?;
                let l = numeric_operand(exec, state, &left)?;
                let r = numeric_operand(exec, state, &right)?;
                Ok(match op {
                    CondBinaryOp::NumEq => l == r,
                    CondBinaryOp::NumNe => l != r,
                    CondBinaryOp::NumLt => l < r,
                    CondBinaryOp::NumLe => l <= r,
                    CondBinaryOp::NumGt => l > r,
                    _ => l >= r,
                })
            }
            CondBinaryOp::NewerThan | CondBinaryOp::OlderThan => {
                let left = expand_single(exec, state, lhs, stderr)?;
                let right = expand_single(exec, state, rhs, stderr)?;
                let lt = mtime(exec, state, &left);
                let rt = mtime(exec, state, &right);
                Ok(match (lt, rt) {
                    (Some(a), Some(b)) => {
                        if *op == CondBinaryOp::NewerThan {
                            a > b
                        } else {
                            a < b
                        }
                    }
                    (Some(_), None) => *op == CondBinaryOp::NewerThan,
                    (None, Some(_)) => *op == CondBinaryOp::OlderThan,
                    (None, None) => false,
                })
            }
            CondBinaryOp::SameFile => {
                let left = expand_single(exec, state, lhs, stderr)?;
                let right = expand_single(exec, state, rhs, stderr)?;
                let lp = exec.fs.resolve_path(&state.cwd, &lossy(&left));
                let rp = exec.fs.resolve_path(&state.cwd, &lossy(&right));
                Ok(exec.fs.realpath(&lp).ok().zip(exec.fs.realpath(&rp).ok()).map_or(false, |(a, b)| a == b))
            }
        },
    }
}

fn expand_single(
    exec: &Executor<'_>,
    state: &mut ShellState,
    word: &crate::ast::types::Word,
    stderr: &mut Vec<u8>,
) -> Result<Vec<u8>, ControlFlow> {
    let mut xp = Expander::new(exec, state);
    let bytes = xp.expand_word_single(word)?;
    stderr.extend_from_slice(&xp.stderr);
    Ok(bytes)
}

/// `[[ x -eq y ]]` operands are arithmetic expressions.
fn numeric_operand(
    exec: &Executor<'_>,
    state: &mut ShellState,
    bytes: &[u8],
) -> Result<i64, ControlFlow> {
    let text = lossy(bytes).into_owned();
    crate::interpreter::arith::eval(state, exec.limits, &crate::parser::arith::parse_arith(&text))
}

fn regex_match(state: &mut ShellState, text: &[u8], pattern: &Field) -> Result<bool, ControlFlow> {
    // Quoted spans lose regex significance.
    let mut source = String::new();
    for (i, b) in pattern.bytes.iter().enumerate() {
        let c = *b as char;
        if pattern.quoted.get(i).copied().unwrap_or(false)
            && matches!(c, '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\')
        {
            source.push('\\');
        }
        source.push(c);
    }
    let re = match regex_lite::Regex::new(&source) {
        Ok(re) => re,
        Err(_) => {
            return Err(ControlFlow::arithmetic(format!(
                "invalid regular expression: {}",
                source
            )))
        }
    };
    let haystack = lossy(text).into_owned();
    match re.captures(&haystack) {
        None => Ok(false),
        Some(caps) => {
            let mut rematch: IndexMap<i64, Vec<u8>> = IndexMap::new();
            for i in 0..caps.len() {
                if let Some(m) = caps.get(i) {
                    rematch.insert(i as i64, m.as_str().as_bytes().to_vec());
                }
            }
            state.scopes[0].vars.insert(
                "BASH_REMATCH".to_string(),
                Variable { value: Value::Indexed(rematch), exported: false, readonly: false },
            );
            Ok(true)
        }
    }
}

// =============================================================================
// Test primitives (shared with the `test` builtin)
// =============================================================================

pub fn unary_test(exec: &Executor<'_>, state: &ShellState, op: &str, operand: &[u8]) -> bool {
    let path = || exec.fs.resolve_path(&state.cwd, &lossy(operand));
    match op {
        "-n" => !operand.is_empty(),
        "-z" => operand.is_empty(),
        "-e" | "-a" => exec.fs.exists(&path()),
        "-f" => exec.fs.is_file(&path()),
        "-d" => exec.fs.is_dir(&path()),
        "-s" => exec.fs.stat(&path()).map(|s| s.size > 0).unwrap_or(false),
        "-r" => exec.fs.stat(&path()).map(|s| s.mode & 0o444 != 0).unwrap_or(false),
        "-w" => exec.fs.stat(&path()).map(|s| s.mode & 0o222 != 0).unwrap_or(false),
        "-x" => exec.fs.stat(&path()).map(|s| s.mode & 0o111 != 0).unwrap_or(false),
        "-L" | "-h" => exec.fs.lstat(&path()).map(|s| s.is_symlink).unwrap_or(false),
        "-p" | "-S" | "-b" | "-c" | "-g" | "-k" | "-u" | "-t" | "-N" => false,
        "-G" | "-O" => exec.fs.exists(&path()),
        "-v" => state.is_set(&lossy(operand)),
        "-o" => shell_option_set(state, &lossy(operand)),
        _ => false,
    }
}

fn shell_option_set(state: &ShellState, name: &str) -> bool {
    match name {
        "errexit" => state.flags.errexit,
        "nounset" => state.flags.nounset,
        "pipefail" => state.flags.pipefail,
        "xtrace" => state.flags.xtrace,
        "verbose" => state.flags.verbose,
        "noglob" => state.flags.noglob,
        "noclobber" => state.flags.noclobber,
        "noexec" => state.flags.noexec,
        "allexport" => state.flags.allexport,
        "posix" => state.flags.posix,
        _ => false,
    }
}

fn mtime(exec: &Executor<'_>, state: &ShellState, operand: &[u8]) -> Option<std::time::SystemTime> {
    let path = exec.fs.resolve_path(&state.cwd, &lossy(operand));
    exec.fs.stat(&path).ok().map(|s| s.mtime)
}
