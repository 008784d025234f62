//! Redirections
//!
//! Binds a command's redirect list into an fd→sink map plus a stdin buffer
//! before the command runs, then routes the produced output afterwards.
//! Files are created/truncated at bind time (so `> f` with no output still
//! creates `f`), written at route time. `n>&m` copies the current sink of
//! `m`; `/dev/null`, `/dev/stdout` and `/dev/stderr` are routed virtually.
//!
//! Policy note: assignments are applied before redirect targets are
//! expanded, so `FOO=x cmd >$FOO` writes to `x`.

use std::collections::HashMap;

use crate::ast::types::{Redirect, RedirectOp, RedirectTarget};
use crate::bytes::lossy;
use crate::interpreter::engine::Executor;
use crate::interpreter::errors::ControlFlow;
use crate::interpreter::expand::Expander;
use crate::interpreter::state::{ExecResult, ShellState};

#[derive(Debug, Clone, PartialEq)]
pub enum Sink {
    CaptureStdout,
    CaptureStderr,
    File { path: String },
    Null,
}

/// Bound redirections for one command.
#[derive(Debug, Clone, Default)]
pub struct Redirs {
    /// Stdin override; None inherits the surrounding stream.
    pub stdin: Option<Vec<u8>>,
    sinks: HashMap<i32, Sink>,
}

impl Redirs {
    pub fn sink(&self, fd: i32) -> Sink {
        match self.sinks.get(&fd) {
            Some(s) => s.clone(),
            None if fd == 2 => Sink::CaptureStderr,
            None => Sink::CaptureStdout,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stdin.is_none() && self.sinks.is_empty()
    }
}

/// Binding failure: the command must not run; exit status 1.
pub enum Bound {
    Ok(Redirs),
    Failed(ExecResult),
}

pub fn bind_redirects(
    exec: &Executor<'_>,
    state: &mut ShellState,
    redirects: &[Redirect],
    stderr: &mut Vec<u8>,
) -> Result<Bound, ControlFlow> {
    let mut redirs = Redirs::default();

    for redirect in redirects {
        let outcome = bind_one(exec, state, redirect, &mut redirs, stderr)?;
        if let Some(failure) = outcome {
            return Ok(Bound::Failed(failure));
        }
    }
    Ok(Bound::Ok(redirs))
}

fn bind_one(
    exec: &Executor<'_>,
    state: &mut ShellState,
    redirect: &Redirect,
    redirs: &mut Redirs,
    stderr: &mut Vec<u8>,
) -> Result<Option<ExecResult>, ControlFlow> {
    let mut expand_target = |state: &mut ShellState, stderr: &mut Vec<u8>| -> Result<Vec<u8>, ControlFlow> {
        match &redirect.target {
            RedirectTarget::Word(w) => {
                let mut xp = Expander::new(exec, state);
                let bytes = xp.expand_word_single(w)?;
                stderr.extend_from_slice(&xp.stderr);
                Ok(bytes)
            }
            RedirectTarget::HereDoc(_) => Ok(Vec::new()),
        }
    };

    match redirect.op {
        RedirectOp::Read | RedirectOp::ReadWrite => {
            let target = expand_target(state, stderr)?;
            let fd = redirect.fd.unwrap_or(0);
            let path = exec.fs.resolve_path(&state.cwd, &lossy(&target));
            let content = match path.as_str() {
                "/dev/null" => Ok(Vec::new()),
                _ => exec.fs.read_file(&path),
            };
            match content {
                Ok(bytes) => {
                    if fd == 0 {
                        redirs.stdin = Some(bytes);
                    }
                }
                Err(_) if redirect.op == RedirectOp::ReadWrite => {
                    let _ = exec.fs.write_file(&path, b"");
                    if fd == 0 {
                        redirs.stdin = Some(Vec::new());
                    }
                }
                Err(_) => {
                    return Ok(Some(ExecResult::failure(format!(
                        "bash: {}: No such file or directory\n",
                        lossy(&target)
                    ))));
                }
            }
        }

        RedirectOp::HereDoc { .. } => {
            if let RedirectTarget::HereDoc(body) = &redirect.target {
                let mut xp = Expander::new(exec, state);
                let bytes = xp.expand_heredoc(body)?;
                stderr.extend_from_slice(&xp.stderr);
                if redirect.fd.unwrap_or(0) == 0 {
                    redirs.stdin = Some(bytes);
                }
            }
        }

        RedirectOp::HereString => {
            let mut target = expand_target(state, stderr)?;
            target.push(b'\n');
            if redirect.fd.unwrap_or(0) == 0 {
                redirs.stdin = Some(target);
            }
        }

        RedirectOp::Write | RedirectOp::Clobber | RedirectOp::Append => {
            let target = expand_target(state, stderr)?;
            let fd = redirect.fd.unwrap_or(1);
            match open_sink(exec, state, &target, redirect.op != RedirectOp::Append)? {
                Ok(sink) => {
                    redirs.sinks.insert(fd, sink);
                }
                Err(failure) => return Ok(Some(failure)),
            }
        }

        RedirectOp::AndWrite | RedirectOp::AndAppend => {
            let target = expand_target(state, stderr)?;
            match open_sink(exec, state, &target, redirect.op == RedirectOp::AndWrite)? {
                Ok(sink) => {
                    redirs.sinks.insert(1, sink.clone());
                    redirs.sinks.insert(2, sink);
                }
                Err(failure) => return Ok(Some(failure)),
            }
        }

        RedirectOp::DupOut => {
            let target = expand_target(state, stderr)?;
            let text = lossy(&target).into_owned();
            let fd = redirect.fd.unwrap_or(1);
            if text == "-" {
                redirs.sinks.insert(fd, Sink::Null);
            } else if text.chars().all(|c| c.is_ascii_digit()) && !text.is_empty() {
                let source: i32 = text.parse().unwrap_or(1);
                let sink = redirs.sink(source);
                redirs.sinks.insert(fd, sink);
            } else if redirect.fd.is_none() {
                // Legacy `>&file`: stdout and stderr both.
                match open_sink(exec, state, &target, true)? {
                    Ok(sink) => {
                        redirs.sinks.insert(1, sink.clone());
                        redirs.sinks.insert(2, sink);
                    }
                    Err(failure) => return Ok(Some(failure)),
                }
            } else {
                return Ok(Some(ExecResult::failure(format!(
                    "bash: {}: ambiguous redirect\n",
                    text
                ))));
            }
        }

        RedirectOp::DupIn => {
            let target = expand_target(state, stderr)?;
            let text = lossy(&target).into_owned();
            if text == "-" && redirect.fd.unwrap_or(0) == 0 {
                redirs.stdin = Some(Vec::new());
            }
            // `<&0` and other numeric dups inherit; nothing to bind.
        }
    }
    Ok(None)
}

/// Resolve a write target into a sink, creating/truncating the file.
fn open_sink(
    exec: &Executor<'_>,
    state: &ShellState,
    target: &[u8],
    truncate: bool,
) -> Result<Result<Sink, ExecResult>, ControlFlow> {
    let path = exec.fs.resolve_path(&state.cwd, &lossy(target));
    match path.as_str() {
        "/dev/null" => return Ok(Ok(Sink::Null)),
        "/dev/stdout" => return Ok(Ok(Sink::CaptureStdout)),
        "/dev/stderr" => return Ok(Ok(Sink::CaptureStderr)),
        _ => {}
    }
    let exists = exec.fs.exists(&path);
    if truncate && state.flags.noclobber && exists && exec.fs.is_file(&path) {
        return Ok(Err(ExecResult::failure(format!(
            "bash: {}: cannot overwrite existing file\n",
            lossy(target)
        ))));
    }
    let prepare = if truncate || !exists {
        exec.fs.write_file(&path, b"")
    } else {
        Ok(())
    };
    if let Err(e) = prepare {
        return Ok(Err(ExecResult::failure(format!("bash: {}\n", e))));
    }
    Ok(Ok(Sink::File { path }))
}

/// Deliver a command's output through the bound sinks.
pub fn route_output(exec: &Executor<'_>, redirs: &Redirs, result: ExecResult) -> ExecResult {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    for (bytes, fd) in [(&result.stdout, 1), (&result.stderr, 2)] {
        if bytes.is_empty() {
            continue;
        }
        match redirs.sink(fd) {
            Sink::CaptureStdout => stdout.extend_from_slice(bytes),
            Sink::CaptureStderr => stderr.extend_from_slice(bytes),
            Sink::Null => {}
            Sink::File { path } => {
                if let Err(e) = exec.fs.append_file(&path, bytes) {
                    stderr.extend_from_slice(format!("bash: {}\n", e).as_bytes());
                }
            }
        }
    }
    ExecResult { stdout, stderr, exit_code: result.exit_code, env: result.env }
}

/// Output carried by an unwind crosses redirect boundaries too.
pub fn route_control_flow(exec: &Executor<'_>, redirs: &Redirs, mut cf: ControlFlow) -> ControlFlow {
    if redirs.is_empty() {
        return cf;
    }
    let output = cf.output_mut();
    let routed = route_output(
        exec,
        redirs,
        ExecResult::new(std::mem::take(&mut output.stdout), std::mem::take(&mut output.stderr), 0),
    );
    output.stdout = routed.stdout;
    output.stderr = routed.stderr;
    cf
}
