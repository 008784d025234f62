//! Command Interface & Registry
//!
//! External utilities plug in through the [`Command`] trait: argv bytes in,
//! byte buffers out. The registry supports eager registration and lazy
//! loaders resolved (and cached) on first dispatch; a registered command may
//! shadow a builtin of the same name.

pub mod basename_cmd;
pub mod cat;
pub mod dirname_cmd;
pub mod echo;
pub mod head;
pub mod printf_cmd;
pub mod seq;
pub mod sleep_cmd;
pub mod tail;
pub mod tr;
pub mod wc;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::fs::sync::SyncFs;
use crate::interpreter::state::ExecutionLimits;

/// Result of one command execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(stdout: Vec<u8>) -> Self {
        Self { stdout, stderr: Vec::new(), exit_code: 0 }
    }

    pub fn error(stderr: impl Into<String>) -> Self {
        Self { stdout: Vec::new(), stderr: stderr.into().into_bytes(), exit_code: 1 }
    }

    pub fn with_code(stdout: Vec<u8>, stderr: Vec<u8>, exit_code: i32) -> Self {
        Self { stdout, stderr, exit_code }
    }
}

/// Callback re-entering the interpreter (`xargs`, `env`, `watch`, …):
/// a shell source line plus stdin, a result back.
pub type ExecLine<'a> = Box<dyn FnMut(&str, &[u8]) -> CommandResult + 'a>;

/// Everything a command sees. `env` is merged back into shell state after
/// the command returns, so mutations behave like a live view.
pub struct CommandContext<'a> {
    pub fs: &'a dyn SyncFs,
    pub cwd: String,
    pub env: HashMap<String, Vec<u8>>,
    pub stdin: Vec<u8>,
    pub xpg_echo: bool,
    pub limits: ExecutionLimits,
    pub exec: Option<ExecLine<'a>>,
}

impl CommandContext<'_> {
    /// Resolve a command-line path against the working directory.
    pub fn resolve(&self, path: &str) -> String {
        self.fs.resolve_path(&self.cwd, path)
    }
}

pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(&self, argv: &[Vec<u8>], ctx: &mut CommandContext<'_>) -> CommandResult;
}

type Loader = Box<dyn Fn() -> Box<dyn Command> + Send + Sync>;

#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Arc<dyn Command>>>,
    lazy: Mutex<HashMap<String, Loader>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the core utility set.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Box::new(basename_cmd::Basename));
        registry.register(Box::new(cat::Cat));
        registry.register(Box::new(dirname_cmd::Dirname));
        registry.register(Box::new(echo::Echo));
        registry.register(Box::new(head::Head));
        registry.register(Box::new(printf_cmd::Printf));
        registry.register(Box::new(seq::Seq));
        registry.register(Box::new(sleep_cmd::Sleep));
        registry.register(Box::new(tail::Tail));
        registry.register(Box::new(tr::Tr));
        registry.register(Box::new(wc::Wc));
        registry
    }

    pub fn register(&self, command: Box<dyn Command>) {
        let name = command.name().to_string();
        if let Ok(mut map) = self.commands.write() {
            map.insert(name, Arc::from(command));
        }
    }

    /// Lazy form: loaded and cached on first dispatch.
    pub fn register_lazy(
        &self,
        name: impl Into<String>,
        load: impl Fn() -> Box<dyn Command> + Send + Sync + 'static,
    ) {
        if let Ok(mut map) = self.lazy.lock() {
            map.insert(name.into(), Box::new(load));
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        if let Ok(map) = self.commands.read() {
            if let Some(cmd) = map.get(name) {
                return Some(cmd.clone());
            }
        }
        let loader = match self.lazy.lock() {
            Ok(mut lazy) => lazy.remove(name)?,
            Err(_) => return None,
        };
        let command: Arc<dyn Command> = Arc::from(loader());
        if let Ok(mut map) = self.commands.write() {
            map.insert(name.to_string(), command.clone());
        }
        Some(command)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands
            .read()
            .map(|m| m.contains_key(name))
            .unwrap_or(false)
            || self.lazy.lock().map(|m| m.contains_key(name)).unwrap_or(false)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        if let Ok(lazy) = self.lazy.lock() {
            names.extend(lazy.keys().cloned());
        }
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;
    impl Command for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }
        fn execute(&self, _argv: &[Vec<u8>], _ctx: &mut CommandContext<'_>) -> CommandResult {
            CommandResult::success(b"probed\n".to_vec())
        }
    }

    #[test]
    fn test_eager_registration() {
        let registry = CommandRegistry::new();
        registry.register(Box::new(Probe));
        assert!(registry.contains("probe"));
        assert!(registry.get("probe").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_lazy_loaded_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static LOADS: AtomicUsize = AtomicUsize::new(0);

        let registry = CommandRegistry::new();
        registry.register_lazy("probe", || {
            LOADS.fetch_add(1, Ordering::SeqCst);
            Box::new(Probe)
        });
        assert!(registry.contains("probe"));
        assert!(registry.get("probe").is_some());
        assert!(registry.get("probe").is_some());
        assert_eq!(LOADS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_defaults_present() {
        let registry = CommandRegistry::with_defaults();
        for name in ["cat", "echo", "printf", "tr", "wc", "seq", "head", "tail"] {
            assert!(registry.contains(name), "{} missing", name);
        }
    }
}
