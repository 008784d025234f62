//! Execution Engine
//!
//! Statement executor and command dispatcher: and/or lists, pipelines wired
//! as byte streams, compound commands, function calls, subshell snapshots,
//! trap dispatch and the errexit/nounset policy. Control flow unwinds as
//! `ControlFlow` values; every frame prepends its buffered output before
//! re-raising, so partial output always survives.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ast::types::*;
use crate::bytes::lossy;
use crate::commands::{CommandContext, CommandRegistry, CommandResult};
use crate::fs::sync::SyncFs;
use crate::interpreter::builtins::{self, BuiltinCtx};
use crate::interpreter::cond::eval_cond;
use crate::interpreter::errors::{ControlFlow, LimitKind, Output};
use crate::interpreter::expand::Expander;
use crate::interpreter::redirect::{bind_redirects, route_control_flow, route_output, Bound};
use crate::interpreter::state::{ExecResult, ExecutionLimits, Scope, ShellState, Value, Variable};
use crate::parser::parse;
use crate::pattern::{fnmatch, MatchOptions};

/// Accumulate a sub-result, re-raising control flow with the local output
/// prepended.
macro_rules! try_acc {
    ($expr:expr, $out:ident, $err:ident) => {
        match $expr {
            Ok(r) => {
                $out.extend_from_slice(&r.stdout);
                $err.extend_from_slice(&r.stderr);
                r.exit_code
            }
            Err(cf) => return Err(cf.prepended(&$out, &$err)),
        }
    };
}

/// Captured output of a subshell run.
pub struct Captured {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

pub struct Executor<'a> {
    pub limits: &'a ExecutionLimits,
    pub fs: &'a dyn SyncFs,
    pub registry: &'a CommandRegistry,
    pub cancel: Option<Arc<AtomicBool>>,
    pub cancel_exit_code: i32,
}

impl<'a> Executor<'a> {
    pub fn new(
        limits: &'a ExecutionLimits,
        fs: &'a dyn SyncFs,
        registry: &'a CommandRegistry,
    ) -> Self {
        Self { limits, fs, registry, cancel: None, cancel_exit_code: 130 }
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    pub fn run_script(
        &self,
        state: &mut ShellState,
        script: &Script,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        self.run_statements(state, &script.statements, stdin)
    }

    /// Parse and run source text in the current state (eval, source, traps,
    /// the `exec` re-entry callback). Syntax errors become exit status 2.
    pub fn run_source(
        &self,
        state: &mut ShellState,
        source: &str,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        match parse(source) {
            Err(e) => Ok(ExecResult::failure_with_code(format!("bash: {}\n", e), 2)),
            Ok(script) => self.run_script(state, &script, stdin),
        }
    }

    /// Run a script in a state snapshot, discarding mutations (command
    /// substitution, process substitution). Metering counters flow back so
    /// limits cannot be evaded in subshells; limit breaches propagate.
    pub fn capture_subshell(
        &self,
        state: &mut ShellState,
        script: &Script,
        stdin: &[u8],
    ) -> Result<Captured, ControlFlow> {
        let mut sub = state.clone();
        sub.group_stdin = None;
        let result = self.run_statements(&mut sub, &script.statements, stdin);
        state.counters = sub.counters.clone();
        match result {
            Ok(r) => Ok(Captured { stdout: r.stdout, stderr: r.stderr, exit_code: r.exit_code }),
            Err(cf @ ControlFlow::Limit { .. }) => Err(cf),
            Err(cf) => {
                let code = cf.exit_code();
                let output = cf.output().clone();
                Ok(Captured { stdout: output.stdout, stderr: output.stderr, exit_code: code })
            }
        }
    }

    fn run_statements(
        &self,
        state: &mut ShellState,
        statements: &[Statement],
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        let mut out: Vec<u8> = Vec::new();
        let mut err: Vec<u8> = Vec::new();
        let mut code = 0;
        for statement in statements {
            if let Err(cf) = self.check_cancel() {
                return Err(cf.prepended(&out, &err));
            }
            code = try_acc!(self.run_statement(state, statement, stdin), out, err);
        }
        Ok(ExecResult::new(out, err, code))
    }

    // =========================================================================
    // Statements & pipelines
    // =========================================================================

    fn run_statement(
        &self,
        state: &mut ShellState,
        stmt: &Statement,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        if state.flags.noexec {
            return Ok(ExecResult::ok());
        }
        state.current_line = stmt.line;

        let mut out: Vec<u8> = Vec::new();
        let mut err: Vec<u8> = Vec::new();
        let mut code = 0;
        let mut last_ran = 0usize;

        for (i, pipeline) in stmt.pipelines.iter().enumerate() {
            if i > 0 {
                match stmt.operators[i - 1] {
                    AndOr::And if code != 0 => continue,
                    AndOr::Or if code == 0 => continue,
                    _ => {}
                }
            }
            code = try_acc!(self.run_pipeline(state, pipeline, stdin), out, err);
            state.last_exit_code = code;
            last_ran = i;
        }

        if stmt.background {
            state.last_background_pid = state.fresh_pid();
            code = 0;
            state.last_exit_code = 0;
        }

        let negated = stmt.pipelines.get(last_ran).map(|p| p.negated).unwrap_or(false);
        if code != 0 && !state.in_condition && !negated && !stmt.background {
            if state.traps.contains_key("ERR") {
                let (t_out, t_err) = self.fire_trap(state, "ERR");
                out.extend_from_slice(&t_out);
                err.extend_from_slice(&t_err);
            }
            // Errexit: only when the failing pipeline was the statement's
            // final one (a failing left operand of && / || never triggers).
            if state.flags.errexit && last_ran == stmt.pipelines.len() - 1 {
                return Err(ControlFlow::Errexit {
                    code,
                    output: Output { stdout: out, stderr: err },
                });
            }
        }

        Ok(ExecResult::new(out, err, code))
    }

    fn run_pipeline(
        &self,
        state: &mut ShellState,
        pipeline: &Pipeline,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        let started = std::time::Instant::now();

        let mut result = if pipeline.elements.len() == 1 {
            let r = self.run_command(state, &pipeline.elements[0].command, stdin)?;
            state.pipestatus = vec![r.exit_code];
            r
        } else {
            let mut codes: Vec<i32> = Vec::new();
            let mut out: Vec<u8> = Vec::new();
            let mut err: Vec<u8> = Vec::new();
            let mut current_stdin = stdin.to_vec();

            for (i, element) in pipeline.elements.iter().enumerate() {
                let last = i == pipeline.elements.len() - 1;
                // Each stage runs against a state snapshot: stage-local
                // mutations are never visible to the parent.
                let mut sub = state.clone();
                sub.group_stdin = None;
                let stage = match self.run_command(&mut sub, &element.command, &current_stdin) {
                    Ok(r) => r,
                    Err(cf) => self.stage_result(cf)?,
                };
                state.counters = sub.counters.clone();
                codes.push(stage.exit_code);
                if last {
                    out.extend_from_slice(&stage.stdout);
                    err.extend_from_slice(&stage.stderr);
                } else {
                    current_stdin = stage.stdout;
                    if element.stderr_piped {
                        current_stdin.extend_from_slice(&stage.stderr);
                    } else {
                        err.extend_from_slice(&stage.stderr);
                    }
                }
            }

            let mut code = codes.last().copied().unwrap_or(0);
            if state.flags.pipefail {
                // Rightmost nonzero stage status wins.
                code = codes.iter().fold(0, |acc, c| if *c != 0 { *c } else { acc });
            }
            state.pipestatus = codes;
            ExecResult::new(out, err, code)
        };

        if pipeline.negated {
            result.exit_code = i32::from(result.exit_code == 0);
        }
        if pipeline.timed {
            let real = started.elapsed();
            result.stderr.extend_from_slice(
                format!(
                    "\nreal\t{}m{}.{:03}s\nuser\t0m0.000s\nsys\t0m0.000s\n",
                    real.as_secs() / 60,
                    real.as_secs() % 60,
                    real.subsec_millis()
                )
                .as_bytes(),
            );
        }
        Ok(result)
    }

    /// A pipeline stage is a subshell: most unwinds terminate the stage
    /// only. Limit breaches keep unwinding.
    fn stage_result(&self, cf: ControlFlow) -> Result<ExecResult, ControlFlow> {
        match cf {
            cf @ ControlFlow::Limit { .. } => Err(cf),
            cf => {
                let code = cf.exit_code();
                let output = cf.output().clone();
                Ok(ExecResult::new(output.stdout, output.stderr, code))
            }
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn run_command(
        &self,
        state: &mut ShellState,
        command: &CommandNode,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        state.counters.commands += 1;
        if state.counters.commands > self.limits.max_command_count {
            return Err(ControlFlow::limit(
                LimitKind::Commands,
                format!(
                    "maximum command count ({}) exceeded (possible infinite loop)",
                    self.limits.max_command_count
                ),
            ));
        }

        match command {
            CommandNode::Simple(simple) => self.run_simple(state, simple, stdin),
            CommandNode::Compound(compound) => self.run_compound(state, compound, stdin),
            CommandNode::FunctionDef(def) => {
                state.functions.insert(def.name.clone(), Arc::new(def.clone()));
                Ok(ExecResult::ok())
            }
        }
    }

    // =========================================================================
    // Compound commands
    // =========================================================================

    fn run_compound(
        &self,
        state: &mut ShellState,
        compound: &CompoundCommand,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        let mut bind_err: Vec<u8> = Vec::new();
        let redirs = match bind_redirects(self, state, compound.redirects(), &mut bind_err) {
            Err(cf) => return self.arith_failure(cf, Vec::new(), bind_err),
            Ok(Bound::Ok(r)) => r,
            Ok(Bound::Failed(mut failure)) => {
                let mut stderr = bind_err;
                stderr.extend_from_slice(&failure.stderr);
                failure.stderr = stderr;
                return Ok(failure);
            }
        };

        // A redirected or piped-in compound owns a consumable stdin buffer
        // for its body (`while read line; do …; done < file`). A nested
        // compound without its own redirect keeps draining the enclosing
        // buffer instead of resetting it.
        let own_stdin: Option<Vec<u8>> = redirs.stdin.clone().or_else(|| {
            (state.group_stdin.is_none() && !stdin.is_empty()).then(|| stdin.to_vec())
        });
        let saved_group = match &own_stdin {
            Some(bytes) => {
                let prev = state.group_stdin.take();
                state.group_stdin = Some(bytes.clone());
                Some(prev)
            }
            None => None,
        };
        let body_stdin: &[u8] = own_stdin.as_deref().unwrap_or(stdin);

        let inner = self.run_compound_inner(state, compound, body_stdin);

        if let Some(prev) = saved_group {
            state.group_stdin = prev;
        }

        match inner {
            Ok(mut result) => {
                let mut stderr = bind_err;
                stderr.extend_from_slice(&result.stderr);
                result.stderr = stderr;
                Ok(route_output(self, &redirs, result))
            }
            Err(cf) => Err(route_control_flow(self, &redirs, cf).prepended(b"", &bind_err)),
        }
    }

    fn run_compound_inner(
        &self,
        state: &mut ShellState,
        compound: &CompoundCommand,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        match compound {
            CompoundCommand::If(node) => self.run_if(state, node, stdin),
            CompoundCommand::While(node) => self.run_while(state, node, stdin),
            CompoundCommand::For(node) => self.run_for(state, node, stdin),
            CompoundCommand::CStyleFor(node) => self.run_cstyle_for(state, node, stdin),
            CompoundCommand::Case(node) => self.run_case(state, node, stdin),
            CompoundCommand::Select(node) => self.run_select(state, node, stdin),
            CompoundCommand::Group(node) => self.run_statements(state, &node.body, stdin),
            CompoundCommand::Subshell(node) => self.run_subshell(state, node, stdin),
            CompoundCommand::Arithmetic(node) => {
                match crate::interpreter::arith::eval(state, self.limits, &node.expr) {
                    Ok(value) => Ok(ExecResult::from_code(i32::from(value == 0))),
                    Err(ControlFlow::Arithmetic { output, .. }) => {
                        Ok(ExecResult::new(Vec::new(), output.stderr, 1))
                    }
                    Err(cf) => Err(cf),
                }
            }
            CompoundCommand::Conditional(node) => {
                let mut err = Vec::new();
                match eval_cond(self, state, &node.expr, &mut err) {
                    Ok(truth) => Ok(ExecResult::new(Vec::new(), err, i32::from(!truth))),
                    Err(ControlFlow::Arithmetic { output, .. }) => {
                        err.extend_from_slice(&output.stderr);
                        Ok(ExecResult::new(Vec::new(), err, 2))
                    }
                    Err(cf) => Err(cf.prepended(b"", &err)),
                }
            }
        }
    }

    fn run_condition(
        &self,
        state: &mut ShellState,
        statements: &[Statement],
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        let saved = state.in_condition;
        state.in_condition = true;
        let result = self.run_statements(state, statements, stdin);
        state.in_condition = saved;
        result
    }

    fn run_if(
        &self,
        state: &mut ShellState,
        node: &IfCommand,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        let mut out: Vec<u8> = Vec::new();
        let mut err: Vec<u8> = Vec::new();
        for clause in &node.clauses {
            let cond_code = try_acc!(self.run_condition(state, &clause.condition, stdin), out, err);
            if cond_code == 0 {
                let code = try_acc!(self.run_statements(state, &clause.body, stdin), out, err);
                return Ok(ExecResult::new(out, err, code));
            }
        }
        if let Some(else_body) = &node.else_body {
            let code = try_acc!(self.run_statements(state, else_body, stdin), out, err);
            return Ok(ExecResult::new(out, err, code));
        }
        Ok(ExecResult::new(out, err, 0))
    }

    fn run_while(
        &self,
        state: &mut ShellState,
        node: &WhileCommand,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        let mut out: Vec<u8> = Vec::new();
        let mut err: Vec<u8> = Vec::new();
        let mut code = 0;
        let mut iterations: u64 = 0;

        loop {
            if let Err(cf) = self.check_cancel() {
                return Err(cf.prepended(&out, &err));
            }
            iterations += 1;
            if iterations > self.limits.max_loop_iterations {
                return Err(self.iteration_limit().prepended(&out, &err));
            }

            let cond_code = try_acc!(self.run_condition(state, &node.condition, stdin), out, err);
            let proceed = if node.until { cond_code != 0 } else { cond_code == 0 };
            if !proceed {
                break;
            }

            match self.run_loop_body(state, &node.body, stdin) {
                LoopTick::Normal(r) => {
                    out.extend_from_slice(&r.stdout);
                    err.extend_from_slice(&r.stderr);
                    code = r.exit_code;
                }
                LoopTick::Break(cf) => {
                    return self.finish_break(cf, out, err, code);
                }
                LoopTick::Continue(output) => {
                    out.extend_from_slice(&output.stdout);
                    err.extend_from_slice(&output.stderr);
                }
                LoopTick::Unwind(cf) => return Err(cf.prepended(&out, &err)),
            }
        }
        Ok(ExecResult::new(out, err, code))
    }

    fn run_for(
        &self,
        state: &mut ShellState,
        node: &ForCommand,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        let mut out: Vec<u8> = Vec::new();
        let mut err: Vec<u8> = Vec::new();

        let items: Vec<Vec<u8>> = match &node.words {
            None => state.params().to_vec(),
            Some(words) => {
                let mut xp = Expander::new(self, state);
                let result = xp.expand_word_list(words);
                let xp_err = std::mem::take(&mut xp.stderr);
                err.extend_from_slice(&xp_err);
                match result {
                    Ok(items) => items,
                    Err(cf) => return self.arith_failure(cf, out, err),
                }
            }
        };

        let mut code = 0;
        let mut iterations: u64 = 0;
        for item in items {
            if let Err(cf) = self.check_cancel() {
                return Err(cf.prepended(&out, &err));
            }
            iterations += 1;
            if iterations > self.limits.max_loop_iterations {
                return Err(self.iteration_limit().prepended(&out, &err));
            }
            if let Err(e) = state.set_scalar(&node.var, item) {
                err.extend_from_slice(format!("bash: {}\n", e).as_bytes());
                return Ok(ExecResult::new(out, err, 1));
            }

            match self.run_loop_body(state, &node.body, stdin) {
                LoopTick::Normal(r) => {
                    out.extend_from_slice(&r.stdout);
                    err.extend_from_slice(&r.stderr);
                    code = r.exit_code;
                }
                LoopTick::Break(cf) => return self.finish_break(cf, out, err, code),
                LoopTick::Continue(output) => {
                    out.extend_from_slice(&output.stdout);
                    err.extend_from_slice(&output.stderr);
                }
                LoopTick::Unwind(cf) => return Err(cf.prepended(&out, &err)),
            }
        }
        Ok(ExecResult::new(out, err, code))
    }

    fn run_cstyle_for(
        &self,
        state: &mut ShellState,
        node: &CStyleForCommand,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        let mut out: Vec<u8> = Vec::new();
        let mut err: Vec<u8> = Vec::new();
        let mut code = 0;
        let mut iterations: u64 = 0;

        let eval_part = |state: &mut ShellState, expr: &Option<ArithExpr>, default: i64| {
            match expr {
                None => Ok(default),
                Some(e) => crate::interpreter::arith::eval(state, self.limits, e),
            }
        };

        if let Err(cf) = eval_part(state, &node.init, 0) {
            return self.arith_failure(cf, out, err);
        }
        loop {
            if let Err(cf) = self.check_cancel() {
                return Err(cf.prepended(&out, &err));
            }
            iterations += 1;
            if iterations > self.limits.max_loop_iterations {
                return Err(self.iteration_limit().prepended(&out, &err));
            }

            match eval_part(state, &node.condition, 1) {
                Ok(0) => break,
                Ok(_) => {}
                Err(cf) => return self.arith_failure(cf, out, err),
            }

            match self.run_loop_body(state, &node.body, stdin) {
                LoopTick::Normal(r) => {
                    out.extend_from_slice(&r.stdout);
                    err.extend_from_slice(&r.stderr);
                    code = r.exit_code;
                }
                LoopTick::Break(cf) => return self.finish_break(cf, out, err, code),
                LoopTick::Continue(output) => {
                    out.extend_from_slice(&output.stdout);
                    err.extend_from_slice(&output.stderr);
                }
                LoopTick::Unwind(cf) => return Err(cf.prepended(&out, &err)),
            }

            if let Err(cf) = eval_part(state, &node.step, 0) {
                return self.arith_failure(cf, out, err);
            }
        }
        Ok(ExecResult::new(out, err, code))
    }

    /// Expansion-boundary handler: an arithmetic error fails the current
    /// command with status 1 and the script continues (errexit permitting);
    /// every other unwind keeps travelling with the local output prepended.
    fn arith_failure(
        &self,
        cf: ControlFlow,
        out: Vec<u8>,
        mut err: Vec<u8>,
    ) -> Result<ExecResult, ControlFlow> {
        match cf {
            ControlFlow::Arithmetic { output, .. } => {
                err.extend_from_slice(&output.stderr);
                Ok(ExecResult::new(out, err, 1))
            }
            cf => Err(cf.prepended(&out, &err)),
        }
    }

    fn run_case(
        &self,
        state: &mut ShellState,
        node: &CaseCommand,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        let mut out: Vec<u8> = Vec::new();
        let mut err: Vec<u8> = Vec::new();

        let scrutinee = {
            let mut xp = Expander::new(self, state);
            let result = xp.expand_word_single(&node.word);
            let xp_err = std::mem::take(&mut xp.stderr);
            err.extend_from_slice(&xp_err);
            match result {
                Ok(s) => s,
                Err(cf) => return self.arith_failure(cf, out, err),
            }
        };

        let opts = MatchOptions { extglob: true, nocase: state.shopt.nocasematch };
        let mut code = 0;
        let mut fall_through = false;
        let mut index = 0;
        while index < node.arms.len() {
            let arm = &node.arms[index];
            let mut matched = fall_through;
            if !matched {
                for pattern_word in &arm.patterns {
                    let pattern = {
                        let mut xp = Expander::new(self, state);
                        let result = xp.expand_pattern(pattern_word);
                        let xp_err = std::mem::take(&mut xp.stderr);
                        err.extend_from_slice(&xp_err);
                        match result {
                            Ok(p) => p,
                            Err(cf) => return self.arith_failure(cf, out, err),
                        }
                    };
                    if fnmatch(&pattern, &scrutinee, &opts) {
                        matched = true;
                        break;
                    }
                }
            }

            if matched {
                code = try_acc!(self.run_statements(state, &arm.body, stdin), out, err);
                match arm.terminator {
                    CaseTerminator::Break => break,
                    CaseTerminator::FallThrough => {
                        fall_through = true;
                        index += 1;
                    }
                    CaseTerminator::Continue => {
                        fall_through = false;
                        index += 1;
                    }
                }
            } else {
                index += 1;
            }
        }
        Ok(ExecResult::new(out, err, code))
    }

    fn run_select(
        &self,
        state: &mut ShellState,
        node: &SelectCommand,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        let mut out: Vec<u8> = Vec::new();
        let mut err: Vec<u8> = Vec::new();

        let items: Vec<Vec<u8>> = match &node.words {
            None => state.params().to_vec(),
            Some(words) => {
                let mut xp = Expander::new(self, state);
                let result = xp.expand_word_list(words);
                let xp_err = std::mem::take(&mut xp.stderr);
                err.extend_from_slice(&xp_err);
                match result {
                    Ok(items) => items,
                    Err(cf) => return self.arith_failure(cf, out, err),
                }
            }
        };

        let mut menu = String::new();
        for (i, item) in items.iter().enumerate() {
            menu.push_str(&format!("{}) {}\n", i + 1, lossy(item)));
        }
        let ps3 = state.get_scalar_string("PS3").unwrap_or_else(|| "#? ".to_string());

        let mut code = 0;
        let mut iterations: u64 = 0;
        loop {
            if let Err(cf) = self.check_cancel() {
                return Err(cf.prepended(&out, &err));
            }
            iterations += 1;
            if iterations > self.limits.max_loop_iterations {
                return Err(self.iteration_limit().prepended(&out, &err));
            }

            err.extend_from_slice(menu.as_bytes());
            err.extend_from_slice(ps3.as_bytes());

            // One line from the consumable buffer; EOF ends the loop.
            let line = match take_line(state) {
                None => break,
                Some(line) => line,
            };
            let _ = state.set_scalar("REPLY", line.clone());
            let choice = lossy(&line)
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| items.get(n.wrapping_sub(1)))
                .cloned()
                .unwrap_or_default();
            if let Err(e) = state.set_scalar(&node.var, choice) {
                err.extend_from_slice(format!("bash: {}\n", e).as_bytes());
                return Ok(ExecResult::new(out, err, 1));
            }

            match self.run_loop_body(state, &node.body, stdin) {
                LoopTick::Normal(r) => {
                    out.extend_from_slice(&r.stdout);
                    err.extend_from_slice(&r.stderr);
                    code = r.exit_code;
                }
                LoopTick::Break(cf) => return self.finish_break(cf, out, err, code),
                LoopTick::Continue(output) => {
                    out.extend_from_slice(&output.stdout);
                    err.extend_from_slice(&output.stderr);
                }
                LoopTick::Unwind(cf) => return Err(cf.prepended(&out, &err)),
            }
        }
        Ok(ExecResult::new(out, err, code))
    }

    fn run_subshell(
        &self,
        state: &mut ShellState,
        node: &Subshell,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        let mut sub = state.clone();
        let result = self.run_statements(&mut sub, &node.body, stdin);
        state.counters = sub.counters.clone();
        let result = match result {
            Ok(r) => r,
            Err(cf @ ControlFlow::Limit { .. }) => return Err(cf),
            Err(cf) => {
                // break/continue (and everything else) end the subshell
                // cleanly; the parent resumes.
                let code = match &cf {
                    ControlFlow::Break { .. } | ControlFlow::Continue { .. } => 0,
                    other => other.exit_code(),
                };
                let output = cf.output().clone();
                ExecResult::new(output.stdout, output.stderr, code)
            }
        };
        state.last_exit_code = result.exit_code;
        Ok(result)
    }

    // =========================================================================
    // Loop body plumbing
    // =========================================================================

    fn run_loop_body(
        &self,
        state: &mut ShellState,
        body: &[Statement],
        stdin: &[u8],
    ) -> LoopTick {
        state.loop_depth += 1;
        let result = self.run_statements(state, body, stdin);
        state.loop_depth -= 1;
        match result {
            Ok(r) => LoopTick::Normal(r),
            Err(ControlFlow::Break { levels, output }) => {
                LoopTick::Break(ControlFlow::Break { levels, output })
            }
            Err(ControlFlow::Continue { levels, output }) => {
                if levels > 1 {
                    LoopTick::Break(ControlFlow::Continue { levels, output })
                } else {
                    LoopTick::Continue(output)
                }
            }
            Err(cf) => LoopTick::Unwind(cf),
        }
    }

    /// Close out a loop that ended through break/continue: consume one
    /// level here, re-raise with the remainder.
    fn finish_break(
        &self,
        cf: ControlFlow,
        mut out: Vec<u8>,
        mut err: Vec<u8>,
        code: i32,
    ) -> Result<ExecResult, ControlFlow> {
        match cf {
            ControlFlow::Break { levels, output } => {
                out.extend_from_slice(&output.stdout);
                err.extend_from_slice(&output.stderr);
                if levels > 1 {
                    Err(ControlFlow::Break { levels: levels - 1, output: Output { stdout: out, stderr: err } })
                } else {
                    Ok(ExecResult::new(out, err, code))
                }
            }
            ControlFlow::Continue { levels, output } => {
                out.extend_from_slice(&output.stdout);
                err.extend_from_slice(&output.stderr);
                // levels > 1 guaranteed: a single-level continue is handled
                // inside the loop.
                Err(ControlFlow::Continue { levels: levels - 1, output: Output { stdout: out, stderr: err } })
            }
            other => Err(other.prepended(&out, &err)),
        }
    }

    // =========================================================================
    // Simple commands
    // =========================================================================

    fn run_simple(
        &self,
        state: &mut ShellState,
        cmd: &SimpleCommand,
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        state.current_line = cmd.line;
        let mut out: Vec<u8> = Vec::new();
        let mut err: Vec<u8> = Vec::new();

        // Assignment-only: mutations are permanent.
        if cmd.words.is_empty() {
            let mut had_subst = false;
            let err_before = err.len();
            if let Err(cf) = self.apply_assignments(state, &cmd.assignments, &mut err, &mut had_subst) {
                return self.arith_failure(cf, out, err);
            }
            // POSIX 2.8.1: assignment errors abort a non-interactive shell.
            if state.flags.posix && state.last_exit_code != 0 && err.len() > err_before {
                return Err(ControlFlow::PosixFatal {
                    code: state.last_exit_code,
                    output: Output { stdout: out, stderr: err },
                });
            }
            let redirs = match bind_redirects(self, state, &cmd.redirects, &mut err) {
                Err(cf) => return self.arith_failure(cf, out, err),
                Ok(Bound::Ok(r)) => r,
                Ok(Bound::Failed(mut f)) => {
                    let mut stderr = err;
                    stderr.extend_from_slice(&f.stderr);
                    f.stderr = stderr;
                    return Ok(f);
                }
            };
            let code = if had_subst { state.last_exit_code } else { 0 };
            let routed = route_output(self, &redirs, ExecResult::new(out, Vec::new(), code));
            return Ok(ExecResult::new(routed.stdout, [err, routed.stderr].concat(), code));
        }

        // Expand command words first: prefix assignments are not visible to
        // the expansion of the command's own words.
        let mut argv = {
            let mut xp = Expander::new(self, state);
            let result = xp.expand_words(&cmd.words);
            let xp_err = std::mem::take(&mut xp.stderr);
            err.extend_from_slice(&xp_err);
            match result {
                Ok(argv) => argv,
                // Arithmetic problems inside a word fail this command only.
                Err(cf) => return self.arith_failure(cf, out, err),
            }
        };

        if argv.is_empty() {
            // Expansions produced no command: assignments become permanent,
            // the status is that of the last substitution.
            let mut had_subst = false;
            if let Err(cf) = self.apply_assignments(state, &cmd.assignments, &mut err, &mut had_subst) {
                return self.arith_failure(cf, out, err);
            }
            let redirs = match bind_redirects(self, state, &cmd.redirects, &mut err) {
                Err(cf) => return self.arith_failure(cf, out, err),
                Ok(Bound::Ok(r)) => r,
                Ok(Bound::Failed(mut f)) => {
                    let mut stderr = err;
                    stderr.extend_from_slice(&f.stderr);
                    f.stderr = stderr;
                    return Ok(f);
                }
            };
            let code = state.last_exit_code;
            let routed = route_output(self, &redirs, ExecResult::new(out, Vec::new(), code));
            return Ok(ExecResult::new(routed.stdout, [err, routed.stderr].concat(), code));
        }

        // Ephemeral prefix assignments live in an overlay frame for the
        // duration of this command.
        let has_overlay = !cmd.assignments.is_empty();
        if has_overlay {
            state.scopes.push(Scope::default());
            let overlay_result = self.fill_overlay(state, &cmd.assignments, &mut err);
            if let Err(cf) = overlay_result {
                state.scopes.pop();
                return self.arith_failure(cf, out, err);
            }
        }

        let finish_err = |state: &mut ShellState| {
            if has_overlay {
                state.scopes.pop();
            }
        };

        // Aliases apply to the resolved command word, one pass per chain
        // member with loop prevention.
        if let Err(cf) = self.expand_aliases(state, &mut argv, &mut err) {
            finish_err(state);
            return self.arith_failure(cf, out, err);
        }
        if argv.is_empty() {
            finish_err(state);
            return Ok(ExecResult::new(out, err, 0));
        }

        if state.flags.xtrace {
            let ps4 = state.get_scalar_string("PS4").unwrap_or_else(|| "+ ".to_string());
            err.extend_from_slice(ps4.as_bytes());
            let rendered: Vec<String> = argv.iter().map(|a| lossy(a).into_owned()).collect();
            err.extend_from_slice(rendered.join(" ").as_bytes());
            err.push(b'\n');
        }

        if state.traps.contains_key("DEBUG") {
            let (t_out, t_err) = self.fire_trap(state, "DEBUG");
            out.extend_from_slice(&t_out);
            err.extend_from_slice(&t_err);
        }

        // Redirections bind after assignments (documented policy).
        let redirs = match bind_redirects(self, state, &cmd.redirects, &mut err) {
            Ok(Bound::Ok(r)) => r,
            Ok(Bound::Failed(mut f)) => {
                finish_err(state);
                let mut stderr = err;
                stderr.extend_from_slice(&f.stderr);
                f.stderr = stderr;
                f.stdout = [out, f.stdout].concat();
                return Ok(f);
            }
            Err(cf) => {
                finish_err(state);
                return self.arith_failure(cf, out, err);
            }
        };
        let effective_stdin: Vec<u8> = redirs
            .stdin
            .clone()
            .or_else(|| (!stdin.is_empty()).then(|| stdin.to_vec()))
            .or_else(|| state.group_stdin.clone())
            .unwrap_or_default();

        // Dispatch: functions → builtins → registered commands → 127.
        let dispatched = self.dispatch(state, argv, &effective_stdin);

        let (name, argv, exec_replace, result) = match dispatched {
            Ok(parts) => parts,
            Err(cf) => {
                finish_err(state);
                return Err(route_control_flow(self, &redirs, cf).prepended(&out, &err));
            }
        };

        // Special-builtin semantics: prefix assignments persist, and in
        // posix mode a failure is fatal to the whole script.
        let special = builtins::is_special_builtin(&name);
        if has_overlay {
            let overlay = state.scopes.pop().unwrap_or_default();
            if special {
                for (var_name, var) in overlay.vars {
                    if let Some(bytes) = var.value.as_scalar() {
                        let _ = state.set_scalar(&var_name, bytes.to_vec());
                    }
                }
            }
        }

        state.last_arg = argv.last().cloned().unwrap_or_default();

        let routed = route_output(self, &redirs, result);
        let final_result = ExecResult::new(
            [out, routed.stdout].concat(),
            [err, routed.stderr].concat(),
            routed.exit_code,
        );

        if special && state.flags.posix && final_result.exit_code != 0 {
            return Err(ControlFlow::PosixFatal {
                code: final_result.exit_code,
                output: Output { stdout: final_result.stdout, stderr: final_result.stderr },
            });
        }

        if exec_replace {
            // `exec cmd` replaces the shell: emulated by exiting with the
            // command's status after it runs.
            return Err(ControlFlow::Exit {
                code: final_result.exit_code,
                output: Output { stdout: final_result.stdout, stderr: final_result.stderr },
            });
        }

        Ok(final_result)
    }

    /// Resolve and run; returns (resolved name, final argv, exec-replace
    /// flag, result).
    #[allow(clippy::type_complexity)]
    fn dispatch(
        &self,
        state: &mut ShellState,
        mut argv: Vec<Vec<u8>>,
        stdin: &[u8],
    ) -> Result<(String, Vec<Vec<u8>>, bool, ExecResult), ControlFlow> {
        let mut skip_functions = false;
        let mut exec_replace = false;

        loop {
            let name = lossy(&argv[0]).into_owned();

            if name == "command" {
                match self.command_builtin(state, &argv[1..])? {
                    CommandDirective::Result(r) => return Ok((name, argv, exec_replace, r)),
                    CommandDirective::Run(rest) => {
                        skip_functions = true;
                        argv = rest;
                        continue;
                    }
                }
            }

            if name == "exec" {
                if argv.len() == 1 {
                    return Ok((name, argv, false, ExecResult::ok()));
                }
                exec_replace = true;
                argv = argv[1..].to_vec();
                continue;
            }

            if !skip_functions {
                if let Some(def) = state.functions.get(&name).cloned() {
                    let result = self.call_function(state, &name, def, &argv[1..], stdin)?;
                    return Ok((name, argv, exec_replace, result));
                }
            }

            {
                let mut ctx = BuiltinCtx { exec: self, state: &mut *state, stdin };
                if let Some(result) = builtins::dispatch(&mut ctx, &name, &argv[1..]) {
                    let result = result?;
                    return Ok((name, argv, exec_replace, result));
                }
            }

            if let Some(command) = self.registry.get(&name) {
                let result = self.run_registered(state, command.as_ref(), &argv, stdin);
                return Ok((name, argv, exec_replace, result));
            }

            let result = ExecResult::failure_with_code(
                format!("bash: {}: command not found\n", name),
                127,
            );
            return Ok((name, argv, exec_replace, result));
        }
    }

    fn command_builtin(
        &self,
        state: &mut ShellState,
        args: &[Vec<u8>],
    ) -> Result<CommandDirective, ControlFlow> {
        let mut verbose = false;
        let mut very_verbose = false;
        let mut rest = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            match arg.as_slice() {
                b"-v" => verbose = true,
                b"-V" => very_verbose = true,
                b"-p" | b"--" => {}
                _ => {
                    rest = args[i..].to_vec();
                    break;
                }
            }
        }
        if verbose || very_verbose {
            let mut output = String::new();
            let mut code = 0;
            for arg in &rest {
                let name = lossy(arg).into_owned();
                if state.functions.contains_key(&name) {
                    if very_verbose {
                        output.push_str(&format!("{} is a function\n", name));
                    } else {
                        output.push_str(&format!("{}\n", name));
                    }
                } else if builtins::is_builtin(&name) {
                    if very_verbose {
                        output.push_str(&format!("{} is a shell builtin\n", name));
                    } else {
                        output.push_str(&format!("{}\n", name));
                    }
                } else if self.registry.contains(&name) {
                    if very_verbose {
                        output.push_str(&format!("{} is /usr/bin/{}\n", name, name));
                    } else {
                        output.push_str(&format!("/usr/bin/{}\n", name));
                    }
                } else {
                    code = 1;
                }
            }
            return Ok(CommandDirective::Result(ExecResult::new(
                output.into_bytes(),
                Vec::new(),
                code,
            )));
        }
        if rest.is_empty() {
            return Ok(CommandDirective::Result(ExecResult::ok()));
        }
        Ok(CommandDirective::Run(rest))
    }

    fn call_function(
        &self,
        state: &mut ShellState,
        name: &str,
        def: Arc<FunctionDef>,
        args: &[Vec<u8>],
        stdin: &[u8],
    ) -> Result<ExecResult, ControlFlow> {
        if state.call_depth >= self.limits.max_recursion_depth {
            return Err(ControlFlow::limit(
                LimitKind::Recursion,
                format!("{}: maximum function nesting level exceeded", name),
            ));
        }

        let mut bind_err: Vec<u8> = Vec::new();
        let redirs = match bind_redirects(self, state, &def.redirects, &mut bind_err) {
            Err(cf) => return self.arith_failure(cf, Vec::new(), bind_err),
            Ok(Bound::Ok(r)) => r,
            Ok(Bound::Failed(mut f)) => {
                let mut stderr = bind_err;
                stderr.extend_from_slice(&f.stderr);
                f.stderr = stderr;
                return Ok(f);
            }
        };

        state.scopes.push(Scope::default());
        state.positional_stack.push(args.to_vec());
        state.func_stack.push(name.to_string());
        state.call_depth += 1;
        let saved_loop_depth = std::mem::take(&mut state.loop_depth);

        let body_result = self.run_compound(state, &def.body, stdin);

        state.loop_depth = saved_loop_depth;
        state.call_depth -= 1;
        state.func_stack.pop();
        state.positional_stack.pop();
        state.scopes.pop();

        let mut result = match body_result {
            Ok(r) => r,
            Err(ControlFlow::Return { code, output }) => {
                ExecResult::new(output.stdout, output.stderr, code)
            }
            Err(cf) => return Err(route_control_flow(self, &redirs, cf).prepended(b"", &bind_err)),
        };

        if state.traps.contains_key("RETURN") {
            let (t_out, t_err) = self.fire_trap(state, "RETURN");
            result.stdout.extend_from_slice(&t_out);
            result.stderr.extend_from_slice(&t_err);
        }

        let routed = route_output(self, &redirs, result);
        Ok(ExecResult::new(
            routed.stdout,
            [bind_err, routed.stderr].concat(),
            routed.exit_code,
        ))
    }

    fn run_registered(
        &self,
        state: &mut ShellState,
        command: &dyn crate::commands::Command,
        argv: &[Vec<u8>],
        stdin: &[u8],
    ) -> ExecResult {
        let env = state.exported_env();
        let snapshot = env.clone();
        let cwd = state.cwd.clone();
        let xpg_echo = state.shopt.xpg_echo;
        let limits = self.limits.clone();

        let (result, final_env) = {
            let state_cell = std::cell::RefCell::new(&mut *state);
            let mut ctx = CommandContext {
                fs: self.fs,
                cwd,
                env,
                stdin: stdin.to_vec(),
                xpg_echo,
                limits,
                exec: Some(Box::new(|line: &str, input: &[u8]| {
                    let mut guard = state_cell.borrow_mut();
                    match self.run_source(&mut **guard, line, input) {
                        Ok(r) => CommandResult::with_code(r.stdout, r.stderr, r.exit_code),
                        Err(cf) => {
                            let code = cf.exit_code();
                            let output = cf.output().clone();
                            CommandResult::with_code(output.stdout, output.stderr, code)
                        }
                    }
                })),
            };
            let r = command.execute(&argv[1..], &mut ctx);
            ctx.exec = None;
            (r, ctx.env)
        };

        // Env is a live view: merge mutations back.
        for (key, value) in &final_env {
            if snapshot.get(key) != Some(value) {
                let _ = state.set_scalar(key, value.clone());
                state.mark_exported(key);
            }
        }
        for key in snapshot.keys() {
            if !final_env.contains_key(key) {
                let _ = state.unset_var(key);
            }
        }

        ExecResult::new(result.stdout, result.stderr, result.exit_code)
    }

    // =========================================================================
    // Assignments
    // =========================================================================

    /// Apply assignments permanently (assignment-only statements).
    fn apply_assignments(
        &self,
        state: &mut ShellState,
        assignments: &[Assignment],
        err: &mut Vec<u8>,
        had_subst: &mut bool,
    ) -> Result<(), ControlFlow> {
        for assignment in assignments {
            let value = self.expanded_assignment_value(state, assignment, err, had_subst)?;
            if let Err(e) = self.store_assignment(state, assignment, value) {
                err.extend_from_slice(format!("bash: {}\n", e).as_bytes());
                state.last_exit_code = 1;
                *had_subst = true;
            }
        }
        Ok(())
    }

    /// Expand one assignment's value (scalar or array literal).
    fn expanded_assignment_value(
        &self,
        state: &mut ShellState,
        assignment: &Assignment,
        err: &mut Vec<u8>,
        had_subst: &mut bool,
    ) -> Result<AssignedValue, ControlFlow> {
        if let Some(words) = &assignment.array {
            let mut xp = Expander::new(self, state);
            let result = xp.expand_word_list(words);
            let xp_err = std::mem::take(&mut xp.stderr);
            if !xp_err.is_empty() {
                *had_subst = true;
            }
            err.extend_from_slice(&xp_err);
            return Ok(AssignedValue::Array(result?));
        }
        match &assignment.value {
            None => Ok(AssignedValue::Scalar(Vec::new())),
            Some(word) => {
                let before = state.last_exit_code;
                let mut xp = Expander::new(self, state);
                let result = xp.expand_word_single_field(word);
                let xp_err = std::mem::take(&mut xp.stderr);
                err.extend_from_slice(&xp_err);
                let field = result?;
                if state.last_exit_code != before || !xp_err.is_empty() {
                    *had_subst = true;
                }
                let bytes = crate::interpreter::expand::tilde::expand_in_assignment(
                    self.fs,
                    state,
                    &field.bytes,
                    &field.quoted,
                );
                Ok(AssignedValue::Scalar(bytes))
            }
        }
    }

    fn store_assignment(
        &self,
        state: &mut ShellState,
        assignment: &Assignment,
        value: AssignedValue,
    ) -> Result<(), String> {
        // Assigning RANDOM reseeds the generator.
        if assignment.name == "RANDOM" {
            if let AssignedValue::Scalar(bytes) = &value {
                let seed = crate::bytes::parse_i64(bytes).unwrap_or(0) as u64;
                state.reseed_random(seed);
                return Ok(());
            }
        }

        match (value, &assignment.subscript) {
            (AssignedValue::Array(items), None) => {
                let var = state.var_for_update(&assignment.name)?;
                let assoc_literal = items
                    .iter()
                    .all(|i| i.starts_with(b"[") && i.contains(&b'='));
                if matches!(var.value, Value::Assoc(_)) && assoc_literal {
                    let map = match (&mut var.value, assignment.append) {
                        (Value::Assoc(map), true) => map,
                        (Value::Assoc(map), false) => {
                            map.clear();
                            map
                        }
                        _ => unreachable!("checked assoc above"),
                    };
                    for item in items {
                        if let Some(end) = item.iter().position(|b| *b == b']') {
                            let key = item[1..end].to_vec();
                            let val = item.get(end + 2..).unwrap_or_default().to_vec();
                            map.insert(key, val);
                        }
                    }
                    return Ok(());
                }
                let mut map = indexmap::IndexMap::new();
                let offset = if assignment.append {
                    match &var.value {
                        Value::Indexed(existing) => {
                            map = existing.clone();
                            existing.keys().copied().max().map_or(0, |m| m + 1)
                        }
                        _ => 0,
                    }
                } else {
                    0
                };
                // `[k]=v` literals pin indices; plain items take the next slot.
                let mut next = offset;
                for item in items {
                    if item.starts_with(b"[") {
                        if let Some(end) = item.iter().position(|b| *b == b']') {
                            if item.get(end + 1) == Some(&b'=') {
                                let key_text = String::from_utf8_lossy(&item[1..end]).into_owned();
                                if let Ok(idx) = crate::parser::arith::parse_integer_literal(key_text.trim()) {
                                    map.insert(idx, item[end + 2..].to_vec());
                                    next = idx + 1;
                                    continue;
                                }
                            }
                        }
                    }
                    map.insert(next, item);
                    next += 1;
                }
                var.value = Value::Indexed(map);
                Ok(())
            }
            (AssignedValue::Scalar(bytes), None) => {
                if assignment.append {
                    state.append_scalar(&assignment.name, &bytes)
                } else {
                    state.set_scalar(&assignment.name, bytes)
                }
            }
            (AssignedValue::Scalar(bytes), Some(subscript)) => {
                let subscript = subscript.clone();
                let is_assoc = matches!(
                    state.find_var(&assignment.name).map(|v| &v.value),
                    Some(Value::Assoc(_))
                );
                if is_assoc {
                    let var = state.var_for_update(&assignment.name)?;
                    if let Value::Assoc(map) = &mut var.value {
                        let key = subscript.into_bytes();
                        if assignment.append {
                            map.entry(key).or_default().extend_from_slice(&bytes);
                        } else {
                            map.insert(key, bytes);
                        }
                    }
                    return Ok(());
                }
                let idx = crate::interpreter::arith::eval(
                    state,
                    self.limits,
                    &crate::parser::arith::parse_arith(&subscript),
                )
                .map_err(|cf| cf.to_string())?;
                let var = state.var_for_update(&assignment.name)?;
                match &mut var.value {
                    Value::Indexed(map) => {
                        if assignment.append {
                            map.entry(idx).or_default().extend_from_slice(&bytes);
                        } else {
                            map.insert(idx, bytes);
                        }
                    }
                    Value::Scalar(old) => {
                        let mut map = indexmap::IndexMap::new();
                        if !old.is_empty() {
                            map.insert(0i64, old.clone());
                        }
                        map.insert(idx, bytes);
                        var.value = Value::Indexed(map);
                    }
                    Value::Assoc(_) => unreachable!("assoc handled above"),
                }
                Ok(())
            }
            (AssignedValue::Array(_), Some(_)) => Err(format!(
                "{}: cannot assign list to array member",
                assignment.name
            )),
        }
    }

    /// Prefix assignments into the overlay frame, marked exported for the
    /// command's environment.
    fn fill_overlay(
        &self,
        state: &mut ShellState,
        assignments: &[Assignment],
        err: &mut Vec<u8>,
    ) -> Result<(), ControlFlow> {
        for assignment in assignments {
            let mut had_subst = false;
            let value = self.expanded_assignment_value(state, assignment, err, &mut had_subst)?;
            let value = match value {
                AssignedValue::Scalar(bytes) => Value::Scalar(bytes),
                AssignedValue::Array(items) => {
                    let mut map = indexmap::IndexMap::new();
                    for (i, item) in items.into_iter().enumerate() {
                        map.insert(i as i64, item);
                    }
                    Value::Indexed(map)
                }
            };
            if let Some(scope) = state.scopes.last_mut() {
                scope.vars.insert(
                    assignment.name.clone(),
                    Variable { value, exported: true, readonly: false },
                );
            }
        }
        Ok(())
    }

    // =========================================================================
    // Aliases
    // =========================================================================

    /// One-pass alias expansion with chain loop prevention; the alias body
    /// is re-lexed into words and expanded in place of the command word.
    fn expand_aliases(
        &self,
        state: &mut ShellState,
        argv: &mut Vec<Vec<u8>>,
        err: &mut Vec<u8>,
    ) -> Result<(), ControlFlow> {
        if !state.shopt.expand_aliases {
            return Ok(());
        }
        let mut chain: HashSet<String> = HashSet::new();
        loop {
            let Some(first) = argv.first() else { return Ok(()) };
            let name = lossy(first).into_owned();
            if chain.contains(&name) {
                return Ok(());
            }
            let Some(text) = state.aliases.get(&name).cloned() else { return Ok(()) };
            chain.insert(name);

            let mut lexer = crate::parser::lexer::Lexer::new(&text);
            let mut words = Vec::new();
            loop {
                match lexer.next_token() {
                    Ok(crate::parser::lexer::Token::Word(w)) => words.push(w),
                    _ => break,
                }
            }
            let expanded = {
                let mut xp = Expander::new(self, state);
                let result = xp.expand_words(&words);
                let xp_err = std::mem::take(&mut xp.stderr);
                err.extend_from_slice(&xp_err);
                result?
            };
            argv.splice(0..1, expanded);
            if argv.is_empty() {
                return Ok(());
            }
        }
    }

    // =========================================================================
    // Traps & cancellation
    // =========================================================================

    /// Execute a trap handler; output is surfaced, failures are not fatal.
    pub fn fire_trap(&self, state: &mut ShellState, event: &str) -> (Vec<u8>, Vec<u8>) {
        if state.in_trap {
            return (Vec::new(), Vec::new());
        }
        let Some(source) = state.traps.get(event).cloned() else {
            return (Vec::new(), Vec::new());
        };
        let text = lossy(&source).into_owned();
        state.in_trap = true;
        let result = self.run_source(state, &text, b"");
        state.in_trap = false;
        match result {
            Ok(r) => (r.stdout, r.stderr),
            Err(cf) => {
                let output = cf.output().clone();
                (output.stdout, output.stderr)
            }
        }
    }

    fn check_cancel(&self) -> Result<(), ControlFlow> {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(ControlFlow::exit(self.cancel_exit_code));
            }
        }
        Ok(())
    }

    fn iteration_limit(&self) -> ControlFlow {
        ControlFlow::limit(
            LimitKind::Iterations,
            format!(
                "maximum loop iterations ({}) exceeded",
                self.limits.max_loop_iterations
            ),
        )
    }
}

enum CommandDirective {
    Result(ExecResult),
    Run(Vec<Vec<u8>>),
}

enum AssignedValue {
    Scalar(Vec<u8>),
    Array(Vec<Vec<u8>>),
}

enum LoopTick {
    Normal(ExecResult),
    Break(ControlFlow),
    Continue(Output),
    Unwind(ControlFlow),
}

/// One newline-terminated line from the consumable buffer (select).
fn take_line(state: &mut ShellState) -> Option<Vec<u8>> {
    let buf = state.group_stdin.as_mut()?;
    if buf.is_empty() {
        return None;
    }
    match buf.iter().position(|b| *b == b'\n') {
        Some(pos) => {
            let line: Vec<u8> = buf.drain(..=pos).collect();
            Some(line[..line.len() - 1].to_vec())
        }
        None => Some(std::mem::take(buf)),
    }
}
