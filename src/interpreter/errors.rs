//! Control Flow
//!
//! Non-local exits are values, not panics: every executor function returns
//! `Result<ExecResult, ControlFlow>`, and every `ControlFlow` variant carries
//! the output accumulated below the raise point. Each unwinding frame
//! prepends its own buffered output before re-raising, so nothing emitted
//! before a `break`, `exit` or limit breach is ever lost.

use thiserror::Error;

/// Output carried through an unwind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Output {
    pub fn stderr_text(message: impl Into<String>) -> Self {
        Output { stdout: Vec::new(), stderr: message.into().into_bytes() }
    }

    /// Prepend a frame's buffered output (called while unwinding).
    pub fn prepend(&mut self, stdout: &[u8], stderr: &[u8]) {
        if !stdout.is_empty() {
            let mut merged = stdout.to_vec();
            merged.extend_from_slice(&self.stdout);
            self.stdout = merged;
        }
        if !stderr.is_empty() {
            let mut merged = stderr.to_vec();
            merged.extend_from_slice(&self.stderr);
            self.stderr = merged;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Recursion,
    Commands,
    Iterations,
    Expansion,
    GlobOps,
    Substitution,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::Recursion => write!(f, "recursion"),
            LimitKind::Commands => write!(f, "commands"),
            LimitKind::Iterations => write!(f, "iterations"),
            LimitKind::Expansion => write!(f, "expansion"),
            LimitKind::GlobOps => write!(f, "glob operations"),
            LimitKind::Substitution => write!(f, "substitution"),
        }
    }
}

/// The typed non-local exits of the interpreter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ControlFlow {
    #[error("break")]
    Break { levels: u32, output: Output },

    #[error("continue")]
    Continue { levels: u32, output: Output },

    #[error("return")]
    Return { code: i32, output: Output },

    #[error("exit")]
    Exit { code: i32, output: Output },

    #[error("errexit: command exited with status {code}")]
    Errexit { code: i32, output: Output },

    #[error("{name}: unbound variable")]
    Nounset { name: String, output: Output },

    #[error("{message}")]
    Arithmetic { message: String, output: Output },

    #[error("{text}: bad substitution")]
    BadSubstitution { text: String, output: Output },

    #[error("no match: {pattern}")]
    NoGlobMatch { pattern: String, output: Output },

    #[error("{message}")]
    BraceExpansion { message: String, output: Output },

    #[error("{message}")]
    Limit { kind: LimitKind, message: String, output: Output },

    /// `break`/`continue` reaching a subshell boundary: the subshell exits
    /// cleanly, the parent resumes.
    #[error("subshell exit")]
    SubshellExit { code: i32, output: Output },

    /// Special-builtin failure under `set -o posix` (POSIX 2.8.1).
    #[error("posix fatal error")]
    PosixFatal { code: i32, output: Output },
}

impl ControlFlow {
    /// Exit status when a limit breach terminates execution.
    pub const LIMIT_EXIT_CODE: i32 = 126;

    pub fn brk(levels: u32) -> Self {
        ControlFlow::Break { levels, output: Output::default() }
    }

    pub fn cont(levels: u32) -> Self {
        ControlFlow::Continue { levels, output: Output::default() }
    }

    pub fn ret(code: i32) -> Self {
        ControlFlow::Return { code, output: Output::default() }
    }

    pub fn exit(code: i32) -> Self {
        ControlFlow::Exit { code, output: Output::default() }
    }

    pub fn nounset(name: &str) -> Self {
        ControlFlow::Nounset {
            name: name.to_string(),
            output: Output::stderr_text(format!("bash: {}: unbound variable\n", name)),
        }
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        let message = message.into();
        ControlFlow::Arithmetic {
            output: Output::stderr_text(format!("bash: {}\n", message)),
            message,
        }
    }

    pub fn bad_substitution(text: impl Into<String>) -> Self {
        let text = text.into();
        ControlFlow::BadSubstitution {
            output: Output::stderr_text(format!("bash: {}: bad substitution\n", text)),
            text,
        }
    }

    pub fn no_glob_match(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        ControlFlow::NoGlobMatch {
            output: Output::stderr_text(format!("bash: no match: {}\n", pattern)),
            pattern,
        }
    }

    pub fn brace_expansion(message: impl Into<String>) -> Self {
        let message = message.into();
        ControlFlow::BraceExpansion {
            output: Output::stderr_text(format!("bash: {}\n", message)),
            message,
        }
    }

    pub fn limit(kind: LimitKind, message: impl Into<String>) -> Self {
        let message = message.into();
        ControlFlow::Limit {
            kind,
            output: Output::stderr_text(format!("bash: {}\n", message)),
            message,
        }
    }

    pub fn output(&self) -> &Output {
        match self {
            ControlFlow::Break { output, .. }
            | ControlFlow::Continue { output, .. }
            | ControlFlow::Return { output, .. }
            | ControlFlow::Exit { output, .. }
            | ControlFlow::Errexit { output, .. }
            | ControlFlow::Nounset { output, .. }
            | ControlFlow::Arithmetic { output, .. }
            | ControlFlow::BadSubstitution { output, .. }
            | ControlFlow::NoGlobMatch { output, .. }
            | ControlFlow::BraceExpansion { output, .. }
            | ControlFlow::Limit { output, .. }
            | ControlFlow::SubshellExit { output, .. }
            | ControlFlow::PosixFatal { output, .. } => output,
        }
    }

    pub fn output_mut(&mut self) -> &mut Output {
        match self {
            ControlFlow::Break { output, .. }
            | ControlFlow::Continue { output, .. }
            | ControlFlow::Return { output, .. }
            | ControlFlow::Exit { output, .. }
            | ControlFlow::Errexit { output, .. }
            | ControlFlow::Nounset { output, .. }
            | ControlFlow::Arithmetic { output, .. }
            | ControlFlow::BadSubstitution { output, .. }
            | ControlFlow::NoGlobMatch { output, .. }
            | ControlFlow::BraceExpansion { output, .. }
            | ControlFlow::Limit { output, .. }
            | ControlFlow::SubshellExit { output, .. }
            | ControlFlow::PosixFatal { output, .. } => output,
        }
    }

    /// Prepend the current frame's buffered output and re-raise.
    pub fn prepended(mut self, stdout: &[u8], stderr: &[u8]) -> Self {
        self.output_mut().prepend(stdout, stderr);
        self
    }

    /// The exit status this unwind terminates with, if it terminates.
    pub fn exit_code(&self) -> i32 {
        match self {
            ControlFlow::Break { .. } | ControlFlow::Continue { .. } => 0,
            ControlFlow::Return { code, .. }
            | ControlFlow::Exit { code, .. }
            | ControlFlow::Errexit { code, .. }
            | ControlFlow::SubshellExit { code, .. }
            | ControlFlow::PosixFatal { code, .. } => *code,
            ControlFlow::Nounset { .. }
            | ControlFlow::Arithmetic { .. }
            | ControlFlow::BadSubstitution { .. }
            | ControlFlow::NoGlobMatch { .. }
            | ControlFlow::BraceExpansion { .. } => 1,
            ControlFlow::Limit { .. } => Self::LIMIT_EXIT_CODE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_preserves_order() {
        let mut cf = ControlFlow::exit(3);
        cf.output_mut().stdout = b"late".to_vec();
        let cf = cf.prepended(b"early ", b"err1 ");
        assert_eq!(cf.output().stdout, b"early late");
        assert_eq!(cf.output().stderr, b"err1 ");
    }

    #[test]
    fn test_nounset_message() {
        let cf = ControlFlow::nounset("FOO");
        assert_eq!(cf.output().stderr, b"bash: FOO: unbound variable\n");
        assert_eq!(cf.exit_code(), 1);
    }

    #[test]
    fn test_limit_code() {
        let cf = ControlFlow::limit(LimitKind::Commands, "maximum command count exceeded");
        assert_eq!(cf.exit_code(), 126);
    }
}
