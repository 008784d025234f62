//! Interpreter State
//!
//! The per-instance shell state: an explicit scope stack (global frame plus
//! one frame per active function call), positional parameters, option
//! flags, function/alias/trap tables and the metering counters. Subshells
//! clone the whole state and throw the clone away; only `$?` flows back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ast::types::FunctionDef;
use crate::bytes::lossy;

// =============================================================================
// Results & limits
// =============================================================================

/// Execution result: byte buffers plus the final status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    /// Exported environment snapshot, populated on the outermost result.
    pub env: Option<HashMap<String, String>>,
}

impl ExecResult {
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>, exit_code: i32) -> Self {
        Self { stdout, stderr, exit_code, env: None }
    }

    pub fn ok() -> Self {
        Self::default()
    }

    pub fn from_code(exit_code: i32) -> Self {
        Self { exit_code, ..Default::default() }
    }

    pub fn failure(stderr: impl Into<String>) -> Self {
        Self::failure_with_code(stderr, 1)
    }

    pub fn failure_with_code(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into().into_bytes(),
            exit_code,
            env: None,
        }
    }
}

/// Host-configured execution caps; every breach raises `ControlFlow::Limit`
/// before the runtime would diverge.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    pub max_recursion_depth: u32,
    pub max_command_count: u64,
    pub max_loop_iterations: u64,
    pub max_expansion_length: usize,
    pub max_glob_ops: u64,
    pub max_subst_depth: u32,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_recursion_depth: 1000,
            max_command_count: 100_000,
            max_loop_iterations: 1_000_000,
            max_expansion_length: 32 * 1024 * 1024,
            max_glob_ops: 100_000,
            max_subst_depth: 64,
        }
    }
}

// =============================================================================
// Variables & scopes
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Vec<u8>),
    Indexed(IndexMap<i64, Vec<u8>>),
    Assoc(IndexMap<Vec<u8>, Vec<u8>>),
}

impl Value {
    pub fn scalar(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Scalar(bytes.into())
    }

    /// The value seen when the variable is used as a plain string:
    /// element 0 for arrays, the value itself for scalars.
    pub fn as_scalar(&self) -> Option<&[u8]> {
        match self {
            Value::Scalar(b) => Some(b),
            Value::Indexed(map) => map.get(&0).map(|v| v.as_slice()),
            Value::Assoc(map) => map.get(b"0".as_slice()).map(|v| v.as_slice()),
        }
    }

    pub fn element_count(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Indexed(map) => map.len(),
            Value::Assoc(map) => map.len(),
        }
    }

    /// Elements in definition order (indexed arrays sort by index).
    pub fn elements(&self) -> Vec<Vec<u8>> {
        match self {
            Value::Scalar(b) => vec![b.clone()],
            Value::Indexed(map) => {
                let mut pairs: Vec<_> = map.iter().collect();
                pairs.sort_by_key(|(k, _)| **k);
                pairs.into_iter().map(|(_, v)| v.clone()).collect()
            }
            Value::Assoc(map) => map.values().cloned().collect(),
        }
    }

    pub fn keys(&self) -> Vec<Vec<u8>> {
        match self {
            Value::Scalar(_) => vec![b"0".to_vec()],
            Value::Indexed(map) => {
                let mut keys: Vec<i64> = map.keys().copied().collect();
                keys.sort_unstable();
                keys.into_iter().map(|k| k.to_string().into_bytes()).collect()
            }
            Value::Assoc(map) => map.keys().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: Value,
    pub exported: bool,
    pub readonly: bool,
}

impl Variable {
    pub fn scalar(bytes: impl Into<Vec<u8>>) -> Self {
        Variable { value: Value::scalar(bytes), exported: false, readonly: false }
    }

    pub fn exported_scalar(bytes: impl Into<Vec<u8>>) -> Self {
        Variable { value: Value::scalar(bytes), exported: true, readonly: false }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub vars: IndexMap<String, Variable>,
}

// =============================================================================
// Option flags
// =============================================================================

/// `set -e` and friends.
#[derive(Debug, Clone, Default)]
pub struct ShellFlags {
    pub errexit: bool,
    pub nounset: bool,
    pub pipefail: bool,
    pub xtrace: bool,
    pub verbose: bool,
    pub noglob: bool,
    pub noclobber: bool,
    pub noexec: bool,
    pub allexport: bool,
    pub posix: bool,
}

impl ShellFlags {
    /// The `$-` string.
    pub fn short_flags(&self) -> String {
        let mut s = String::from("h");
        if self.allexport {
            s.push('a');
        }
        if self.noclobber {
            s.push('C');
        }
        if self.errexit {
            s.push('e');
        }
        if self.noglob {
            s.push('f');
        }
        if self.noexec {
            s.push('n');
        }
        if self.nounset {
            s.push('u');
        }
        if self.verbose {
            s.push('v');
        }
        if self.xtrace {
            s.push('x');
        }
        s.push('B');
        s
    }
}

/// `shopt` toggles.
#[derive(Debug, Clone)]
pub struct ShoptFlags {
    pub extglob: bool,
    pub dotglob: bool,
    pub nullglob: bool,
    pub failglob: bool,
    pub globstar: bool,
    pub nocaseglob: bool,
    pub nocasematch: bool,
    pub expand_aliases: bool,
    pub xpg_echo: bool,
}

impl Default for ShoptFlags {
    fn default() -> Self {
        Self {
            extglob: false,
            dotglob: false,
            nullglob: false,
            failglob: false,
            globstar: false,
            nocaseglob: false,
            nocasematch: false,
            // Aliases work out of the box in this embedding.
            expand_aliases: true,
            xpg_echo: false,
        }
    }
}

// =============================================================================
// Counters & helpers
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub commands: u64,
    pub glob_ops: u64,
    pub subst_depth: u32,
}

/// Cursor for `getopts` bundling (`-ab` consumed one option at a time).
#[derive(Debug, Clone, Default)]
pub struct GetoptsCursor {
    pub char_index: usize,
    pub last_optind: i64,
}

// =============================================================================
// Shell state
// =============================================================================

#[derive(Clone)]
pub struct ShellState {
    pub scopes: Vec<Scope>,
    /// Stack of positional-parameter frames; the top is `$1…`.
    pub positional_stack: Vec<Vec<Vec<u8>>>,
    /// `$0`.
    pub script_name: String,

    pub cwd: String,
    pub previous_dir: String,

    pub last_exit_code: i32,
    /// `$_`.
    pub last_arg: Vec<u8>,
    /// `$LINENO`.
    pub current_line: u32,

    pub flags: ShellFlags,
    pub shopt: ShoptFlags,

    pub functions: IndexMap<String, Arc<FunctionDef>>,
    pub aliases: IndexMap<String, String>,
    /// Event name (EXIT, ERR, DEBUG, RETURN, signal names) → handler source.
    pub traps: HashMap<String, Vec<u8>>,

    pub pipestatus: Vec<i32>,
    pub func_stack: Vec<String>,

    pub shell_pid: u32,
    pub last_background_pid: u32,
    next_virtual_pid: u32,
    next_subst_fd: u32,

    rng: StdRng,
    pub started: Instant,

    pub in_condition: bool,
    pub in_trap: bool,
    pub loop_depth: u32,
    pub call_depth: u32,
    pub source_depth: u32,

    pub counters: Counters,
    pub getopts: GetoptsCursor,
    pub history: Vec<String>,

    /// Consumable stdin of the enclosing compound (`while read …; done < f`).
    /// `read` drains it progressively; external commands take it whole.
    pub group_stdin: Option<Vec<u8>>,
}

impl Default for ShellState {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellState {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            positional_stack: vec![Vec::new()],
            script_name: "bash".to_string(),
            cwd: "/".to_string(),
            previous_dir: "/".to_string(),
            last_exit_code: 0,
            last_arg: Vec::new(),
            current_line: 1,
            flags: ShellFlags::default(),
            shopt: ShoptFlags::default(),
            functions: IndexMap::new(),
            aliases: IndexMap::new(),
            traps: HashMap::new(),
            pipestatus: Vec::new(),
            func_stack: Vec::new(),
            shell_pid: std::process::id(),
            last_background_pid: 0,
            next_virtual_pid: 1000,
            next_subst_fd: 63,
            rng: StdRng::from_entropy(),
            started: Instant::now(),
            in_condition: false,
            in_trap: false,
            loop_depth: 0,
            call_depth: 0,
            source_depth: 0,
            counters: Counters::default(),
            getopts: GetoptsCursor::default(),
            history: Vec::new(),
            group_stdin: None,
        }
    }

    pub fn group_stdin_mut(&mut self) -> Option<&mut Vec<u8>> {
        self.group_stdin.as_mut()
    }

    // ---- positional parameters ----

    pub fn params(&self) -> &[Vec<u8>] {
        self.positional_stack.last().map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn params_mut(&mut self) -> &mut Vec<Vec<u8>> {
        if self.positional_stack.is_empty() {
            self.positional_stack.push(Vec::new());
        }
        self.positional_stack.last_mut().expect("positional stack non-empty")
    }

    // ---- variable lookup ----

    pub fn find_var(&self, name: &str) -> Option<&Variable> {
        self.scopes.iter().rev().find_map(|scope| scope.vars.get(name))
    }

    pub fn find_var_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.scopes.iter_mut().rev().find_map(|scope| scope.vars.get_mut(name))
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.find_var(name).is_some()
    }

    /// Scalar view of a variable (element 0 for arrays).
    pub fn get_scalar(&self, name: &str) -> Option<Vec<u8>> {
        self.find_var(name).and_then(|v| v.value.as_scalar().map(|b| b.to_vec()))
    }

    pub fn get_scalar_string(&self, name: &str) -> Option<String> {
        self.get_scalar(name).map(|b| lossy(&b).into_owned())
    }

    /// Field separator, defaulting to space/tab/newline.
    pub fn ifs(&self) -> Vec<u8> {
        self.get_scalar("IFS").unwrap_or_else(|| b" \t\n".to_vec())
    }

    // ---- assignment ----

    /// Write a scalar: mutate the innermost existing binding, else create a
    /// global one. Readonly violations report the variable name.
    pub fn set_scalar(&mut self, name: &str, value: Vec<u8>) -> Result<(), String> {
        let allexport = self.flags.allexport;
        if let Some(var) = self.find_var_mut(name) {
            if var.readonly {
                return Err(format!("{}: readonly variable", name));
            }
            var.value = Value::Scalar(value);
            if allexport {
                var.exported = true;
            }
            return Ok(());
        }
        self.scopes[0].vars.insert(
            name.to_string(),
            Variable { value: Value::Scalar(value), exported: allexport, readonly: false },
        );
        Ok(())
    }

    /// Append to a scalar (`name+=value`).
    pub fn append_scalar(&mut self, name: &str, suffix: &[u8]) -> Result<(), String> {
        let mut value = self.get_scalar(name).unwrap_or_default();
        value.extend_from_slice(suffix);
        self.set_scalar(name, value)
    }

    /// Mutable binding for array writes, created (global, scalar-empty
    /// promoted) when missing. Readonly is rejected.
    pub fn var_for_update(&mut self, name: &str) -> Result<&mut Variable, String> {
        let exists = self
            .scopes
            .iter()
            .rev()
            .any(|scope| scope.vars.contains_key(name));
        if !exists {
            self.scopes[0].vars.insert(name.to_string(), Variable::scalar(Vec::new()));
        }
        let var = self
            .find_var_mut(name)
            .expect("binding just ensured");
        if var.readonly {
            return Err(format!("{}: readonly variable", name));
        }
        Ok(var)
    }

    /// Declare in the innermost frame (the `local` builtin).
    pub fn declare_local(&mut self, name: &str, value: Option<Value>) -> Result<(), String> {
        let scope = self.scopes.last_mut().expect("scope stack non-empty");
        if let Some(existing) = scope.vars.get(name) {
            if existing.readonly {
                return Err(format!("{}: readonly variable", name));
            }
        }
        let entry = scope.vars.entry(name.to_string()).or_insert_with(|| Variable::scalar(Vec::new()));
        if let Some(v) = value {
            entry.value = v;
        }
        Ok(())
    }

    /// Remove the innermost binding.
    pub fn unset_var(&mut self, name: &str) -> Result<(), String> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(var) = scope.vars.get(name) {
                if var.readonly {
                    return Err(format!("{}: cannot unset: readonly variable", name));
                }
                scope.vars.shift_remove(name);
                return Ok(());
            }
        }
        Ok(())
    }

    pub fn mark_exported(&mut self, name: &str) {
        if let Some(var) = self.find_var_mut(name) {
            var.exported = true;
        } else {
            self.scopes[0]
                .vars
                .insert(name.to_string(), Variable { value: Value::scalar(Vec::new()), exported: true, readonly: false });
        }
    }

    pub fn mark_readonly(&mut self, name: &str) {
        if let Some(var) = self.find_var_mut(name) {
            var.readonly = true;
        } else {
            self.scopes[0]
                .vars
                .insert(name.to_string(), Variable { value: Value::scalar(Vec::new()), exported: false, readonly: true });
        }
    }

    // ---- environment views ----

    /// Exported name → bytes, innermost binding winning.
    pub fn exported_env(&self) -> HashMap<String, Vec<u8>> {
        let mut env = HashMap::new();
        for scope in &self.scopes {
            for (name, var) in &scope.vars {
                if var.exported {
                    if let Some(b) = var.value.as_scalar() {
                        env.insert(name.clone(), b.to_vec());
                    }
                } else {
                    env.remove(name);
                }
            }
        }
        env
    }

    /// Exported env as lossy strings (the host-facing result field).
    pub fn exported_env_strings(&self) -> HashMap<String, String> {
        self.exported_env()
            .into_iter()
            .map(|(k, v)| (k, lossy(&v).into_owned()))
            .collect()
    }

    /// Every visible variable name, for `${!prefix*}` and `set`.
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for scope in &self.scopes {
            for name in scope.vars.keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names.sort();
        names
    }

    // ---- process bookkeeping ----

    pub fn fresh_pid(&mut self) -> u32 {
        self.next_virtual_pid += 1;
        self.next_virtual_pid
    }

    /// Path counter for process-substitution stand-ins.
    pub fn fresh_subst_fd(&mut self) -> u32 {
        let fd = self.next_subst_fd;
        self.next_subst_fd += 1;
        fd
    }

    /// `$RANDOM`: 0..32768, reseedable by assigning to RANDOM.
    pub fn random(&mut self) -> u16 {
        self.rng.gen_range(0..32768)
    }

    pub fn reseed_random(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// `$SECONDS`.
    pub fn seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_shadowing() {
        let mut state = ShellState::new();
        state.set_scalar("x", b"outer".to_vec()).unwrap();
        state.scopes.push(Scope::default());
        state.declare_local("x", Some(Value::scalar("inner"))).unwrap();
        assert_eq!(state.get_scalar("x").unwrap(), b"inner");
        state.scopes.pop();
        assert_eq!(state.get_scalar("x").unwrap(), b"outer");
    }

    #[test]
    fn test_assignment_writes_innermost_binding() {
        let mut state = ShellState::new();
        state.set_scalar("x", b"outer".to_vec()).unwrap();
        state.scopes.push(Scope::default());
        state.declare_local("x", None).unwrap();
        state.set_scalar("x", b"changed".to_vec()).unwrap();
        state.scopes.pop();
        // The local absorbed the write; the outer value is intact.
        assert_eq!(state.get_scalar("x").unwrap(), b"outer");
    }

    #[test]
    fn test_readonly_rejected() {
        let mut state = ShellState::new();
        state.set_scalar("RO", b"v".to_vec()).unwrap();
        state.mark_readonly("RO");
        assert!(state.set_scalar("RO", b"w".to_vec()).is_err());
        assert!(state.unset_var("RO").is_err());
    }

    #[test]
    fn test_exported_env_shadowing() {
        let mut state = ShellState::new();
        state.set_scalar("A", b"1".to_vec()).unwrap();
        state.mark_exported("A");
        state.scopes.push(Scope::default());
        state.declare_local("A", Some(Value::scalar("2"))).unwrap();
        // Local is not exported: it hides the exported outer binding.
        let env = state.exported_env();
        assert!(!env.contains_key("A"));
    }

    #[test]
    fn test_indexed_array_scalar_view() {
        let mut state = ShellState::new();
        let mut map = IndexMap::new();
        map.insert(0i64, b"zero".to_vec());
        map.insert(2i64, b"two".to_vec());
        state.scopes[0].vars.insert(
            "arr".to_string(),
            Variable { value: Value::Indexed(map), exported: false, readonly: false },
        );
        assert_eq!(state.get_scalar("arr").unwrap(), b"zero");
        let var = state.find_var("arr").unwrap();
        assert_eq!(var.value.element_count(), 2);
        assert_eq!(var.value.keys(), vec![b"0".to_vec(), b"2".to_vec()]);
    }

    #[test]
    fn test_positional_stack() {
        let mut state = ShellState::new();
        state.params_mut().push(b"one".to_vec());
        state.positional_stack.push(vec![b"inner".to_vec()]);
        assert_eq!(state.params(), &[b"inner".to_vec()]);
        state.positional_stack.pop();
        assert_eq!(state.params(), &[b"one".to_vec()]);
    }

    #[test]
    fn test_random_range() {
        let mut state = ShellState::new();
        for _ in 0..100 {
            assert!(state.random() < 32768);
        }
    }
}
