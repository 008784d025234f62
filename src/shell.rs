//! Shell Environment
//!
//! The host entry point: seeds the default environment and filesystem
//! layout, owns the per-instance interpreter state and command registry,
//! and runs scripts. The public surface is async; execution bridges into
//! the synchronous engine through the fs adapter.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::commands::{Command, CommandRegistry};
use crate::fs::sync::SyncFsAdapter;
use crate::fs::types::{FileSystem, InitialFiles, MkdirOptions};
use crate::fs::InMemoryFs;
use crate::interpreter::engine::Executor;
use crate::interpreter::state::{ExecResult, ExecutionLimits, ShellState};

/// Options for creating a shell environment.
#[derive(Default)]
pub struct ShellOptions {
    /// Initial environment variables (exported).
    pub env: Option<HashMap<String, String>>,
    /// Working directory inside the sandbox.
    pub cwd: Option<String>,
    /// Filesystem backend (defaults to a fresh in-memory fs).
    pub fs: Option<Arc<dyn FileSystem>>,
    /// Files seeded before the first command runs.
    pub files: Option<InitialFiles>,
    /// Execution caps.
    pub limits: Option<ExecutionLimits>,
    /// Custom commands; these may shadow builtins.
    pub commands: Vec<Box<dyn Command>>,
    /// `echo` interprets backslash escapes by default.
    pub xpg_echo: bool,
    /// Strict POSIX behavior for special builtins.
    pub posix: bool,
    /// Cooperative cancellation flag, polled between statements.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Exit status reported on cancellation (default 130).
    pub cancel_exit_code: Option<i32>,
}

/// Per-execution options.
#[derive(Default)]
pub struct ExecOptions {
    /// Bytes presented to the script as standard input.
    pub stdin: Option<Vec<u8>>,
}

/// A sandboxed shell: parser, interpreter and virtual filesystem behind one
/// entry point. State persists across `exec` calls.
pub struct Shell {
    pub fs: Arc<dyn FileSystem>,
    limits: ExecutionLimits,
    registry: CommandRegistry,
    state: ShellState,
    cancel: Option<Arc<AtomicBool>>,
    cancel_exit_code: i32,
}

impl Shell {
    pub async fn new(options: ShellOptions) -> Self {
        let default_layout = options.cwd.is_none();
        let cwd = options.cwd.unwrap_or_else(|| "/home/user".to_string());

        let fs: Arc<dyn FileSystem> = match (options.fs, &options.files) {
            (Some(fs), files) => {
                // Seed the file set into the host-provided backend.
                if let Some(files) = files {
                    let recursive = MkdirOptions { recursive: true };
                    for (path, init) in files {
                        let parent = crate::fs::types::dirname(path);
                        let _ = fs.mkdir(&parent, &recursive).await;
                        let _ = fs.write_file(path, &init.content.clone().into_bytes()).await;
                    }
                }
                fs
            }
            (None, Some(files)) => Arc::new(InMemoryFs::with_files(files)),
            (None, None) => Arc::new(InMemoryFs::new()),
        };

        init_filesystem(&*fs, &cwd, default_layout).await;

        let registry = CommandRegistry::with_defaults();
        for command in options.commands {
            registry.register(command);
        }

        let mut state = ShellState::new();
        state.cwd = cwd.clone();
        state.previous_dir = cwd.clone();
        state.flags.posix = options.posix;
        state.shopt.xpg_echo = options.xpg_echo;

        let home = if default_layout { "/home/user" } else { "/" };
        let defaults: &[(&str, String)] = &[
            ("HOME", home.to_string()),
            ("PATH", "/usr/bin:/bin".to_string()),
            ("IFS", " \t\n".to_string()),
            ("PWD", cwd.clone()),
            ("OLDPWD", cwd.clone()),
            ("OPTIND", "1".to_string()),
            ("PS1", "$ ".to_string()),
            ("PS2", "> ".to_string()),
            ("PS4", "+ ".to_string()),
        ];
        for (name, value) in defaults {
            let _ = state.set_scalar(name, value.clone().into_bytes());
        }
        for name in ["HOME", "PATH", "PWD", "OLDPWD"] {
            state.mark_exported(name);
        }
        if let Some(env) = options.env {
            for (name, value) in env {
                let _ = state.set_scalar(&name, value.into_bytes());
                state.mark_exported(&name);
            }
        }

        Self {
            fs,
            limits: options.limits.unwrap_or_default(),
            registry,
            state,
            cancel: options.cancel,
            cancel_exit_code: options.cancel_exit_code.unwrap_or(130),
        }
    }

    /// Parse, expand and execute a script; returns the accumulated output
    /// byte buffers, the final status and the exported environment.
    pub async fn exec(&mut self, source: &str, options: Option<ExecOptions>) -> ExecResult {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            let mut result = ExecResult::ok();
            result.env = Some(self.state.exported_env_strings());
            return result;
        }
        for line in source.lines() {
            let line = line.trim();
            if !line.is_empty() {
                self.state.history.push(line.to_string());
            }
        }

        let stdin = options.and_then(|o| o.stdin).unwrap_or_default();

        let script = match crate::parser::parse(source) {
            Ok(script) => script,
            Err(e) => {
                let mut result =
                    ExecResult::failure_with_code(format!("bash: {}\n", e), 2);
                result.env = Some(self.state.exported_env_strings());
                self.state.last_exit_code = 2;
                return result;
            }
        };

        let mut verbose_echo = Vec::new();
        if self.state.flags.verbose {
            verbose_echo.extend_from_slice(source.as_bytes());
            if !source.ends_with('\n') {
                verbose_echo.push(b'\n');
            }
        }

        let fs = self.fs.clone();
        let limits = self.limits.clone();
        let cancel = self.cancel.clone();
        let cancel_exit_code = self.cancel_exit_code;
        let state = &mut self.state;
        let registry = &self.registry;

        let mut result = tokio::task::block_in_place(|| {
            let sync_fs = SyncFsAdapter::new(fs, tokio::runtime::Handle::current());
            let mut executor = Executor::new(&limits, &sync_fs, registry);
            executor.cancel = cancel;
            executor.cancel_exit_code = cancel_exit_code;

            let mut result = match executor.run_script(state, &script, &stdin) {
                Ok(result) => result,
                Err(cf) => {
                    let code = cf.exit_code();
                    let output = cf.output().clone();
                    ExecResult::new(output.stdout, output.stderr, code)
                }
            };

            // The EXIT trap runs while unwinding to return to the host,
            // and fires once.
            if state.traps.contains_key("EXIT") {
                let (t_out, t_err) = executor.fire_trap(state, "EXIT");
                state.traps.remove("EXIT");
                result.stdout.extend_from_slice(&t_out);
                result.stderr.extend_from_slice(&t_err);
            }
            result
        });

        if !verbose_echo.is_empty() {
            let mut stderr = verbose_echo;
            stderr.extend_from_slice(&result.stderr);
            result.stderr = stderr;
        }

        self.state.last_exit_code = result.exit_code;
        result.env = Some(self.state.exported_env_strings());
        result
    }

    pub fn cwd(&self) -> &str {
        &self.state.cwd
    }

    pub fn state(&self) -> &ShellState {
        &self.state
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Read a file relative to the working directory.
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, crate::fs::FsError> {
        let resolved = self.fs.resolve_path(&self.state.cwd, path);
        self.fs.read_file_buffer(&resolved).await
    }

    /// Write a file relative to the working directory.
    pub async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), crate::fs::FsError> {
        let resolved = self.fs.resolve_path(&self.state.cwd, path);
        self.fs.write_file(&resolved, content).await
    }
}

/// Standard directories and device files.
async fn init_filesystem(fs: &dyn FileSystem, cwd: &str, default_layout: bool) {
    let recursive = MkdirOptions { recursive: true };
    let _ = fs.mkdir("/bin", &recursive).await;
    let _ = fs.mkdir("/usr/bin", &recursive).await;
    let _ = fs.mkdir("/dev/fd", &recursive).await;
    let _ = fs.write_file("/dev/null", b"").await;
    let _ = fs.write_file("/dev/stdin", b"").await;
    let _ = fs.write_file("/dev/stdout", b"").await;
    let _ = fs.write_file("/dev/stderr", b"").await;
    if default_layout {
        let _ = fs.mkdir("/home/user", &recursive).await;
        let _ = fs.mkdir("/tmp", &recursive).await;
    }
    let _ = fs.mkdir(cwd, &recursive).await;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn shell() -> Shell {
        Shell::new(ShellOptions::default()).await
    }

    async fn run(sh: &mut Shell, src: &str) -> ExecResult {
        sh.exec(src, None).await
    }

    fn text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_defaults() {
        let sh = shell().await;
        assert_eq!(sh.cwd(), "/home/user");
        assert!(sh.fs.exists("/dev/null").await);
        assert!(sh.fs.exists("/tmp").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_script() {
        let mut sh = shell().await;
        let r = run(&mut sh, "").await;
        assert_eq!(r.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_syntax_error_is_2() {
        let mut sh = shell().await;
        let r = run(&mut sh, "if then").await;
        assert_eq!(r.exit_code, 2);
        assert!(text(&r.stderr).contains("syntax error"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_if_true() {
        let mut sh = shell().await;
        let r = run(&mut sh, "if true; then echo yes; fi").await;
        assert_eq!(text(&r.stdout), "yes\n");
        assert_eq!(r.stderr, b"");
        assert_eq!(r.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_arithmetic() {
        let mut sh = shell().await;
        let r = run(&mut sh, "a=1; b=2; echo $((a+b))").await;
        assert_eq!(text(&r.stdout), "3\n");
        assert_eq!(r.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_pipeline_tr() {
        let mut sh = shell().await;
        let r = run(&mut sh, "for i in 1 2 3; do echo $i; done | tr '\\n' ','").await;
        assert_eq!(text(&r.stdout), "1,2,3,");
        assert_eq!(r.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_function_local() {
        let mut sh = shell().await;
        let r = run(&mut sh, "f(){ local x=inner; echo $x; }; x=outer; f; echo $x").await;
        assert_eq!(text(&r.stdout), "inner\nouter\n");
        assert_eq!(r.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_errexit() {
        let mut sh = shell().await;
        let r = run(&mut sh, "set -e; false; echo nope").await;
        assert_eq!(r.stdout, b"");
        assert_eq!(r.exit_code, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_raw_byte_wc() {
        let mut sh = shell().await;
        let r = run(&mut sh, "echo $'\\xff' | wc -c").await;
        assert_eq!(text(&r.stdout), "2\n");
        assert_eq!(r.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scenario_getopts() {
        let mut sh = shell().await;
        let script = r#"
parse() {
  local opt
  while getopts ab: opt "$@"; do
    case $opt in
      a) echo "flag a";;
      b) echo "b=$OPTARG";;
    esac
  done
  echo "optind=$OPTIND"
}
parse -a -b val
"#;
        let r = run(&mut sh, script).await;
        assert_eq!(text(&r.stdout), "flag a\nb=val\noptind=4\n");
        assert_eq!(r.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_getopts_bundled() {
        let mut sh = shell().await;
        let script = r#"
set -- -ab val
while getopts ab: opt "$@"; do echo "$opt:$OPTARG"; done
"#;
        let r = run(&mut sh, script).await;
        assert_eq!(text(&r.stdout), "a:\nb:val\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exit_code_persistence() {
        let mut sh = shell().await;
        run(&mut sh, "false").await;
        let r = run(&mut sh, "echo $?").await;
        assert_eq!(text(&r.stdout), "1\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_state_persists_across_exec() {
        let mut sh = shell().await;
        run(&mut sh, "x=42; cd /tmp").await;
        let r = run(&mut sh, "echo $x $PWD").await;
        assert_eq!(text(&r.stdout), "42 /tmp\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_result_env_exported() {
        let mut sh = shell().await;
        let r = run(&mut sh, "export FOO=bar").await;
        let env = r.env.unwrap();
        assert_eq!(env.get("FOO").map(String::as_str), Some("bar"));
        assert!(env.contains_key("PATH"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exit_runs_exit_trap() {
        let mut sh = shell().await;
        let r = run(&mut sh, "trap 'echo bye' EXIT; echo hi; exit 3").await;
        assert_eq!(text(&r.stdout), "hi\nbye\n");
        assert_eq!(r.exit_code, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pipestatus() {
        let mut sh = shell().await;
        let r = run(&mut sh, "true | false | true; echo ${PIPESTATUS[@]}").await;
        assert_eq!(text(&r.stdout), "0 1 0\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pipefail() {
        let mut sh = shell().await;
        let r = run(&mut sh, "set -o pipefail; true | false | true; echo $?").await;
        assert_eq!(text(&r.stdout), "1\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_subshell_isolation() {
        let mut sh = shell().await;
        let r = run(&mut sh, "x=outer; (x=inner; echo $x); echo $x").await;
        assert_eq!(text(&r.stdout), "inner\nouter\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_command_substitution() {
        let mut sh = shell().await;
        let r = run(&mut sh, "echo \"got: $(echo nested)\"").await;
        assert_eq!(text(&r.stdout), "got: nested\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_heredoc() {
        let mut sh = shell().await;
        let r = run(&mut sh, "x=world\ncat <<EOF\nhello $x\nEOF\n").await;
        assert_eq!(text(&r.stdout), "hello world\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_heredoc_quoted_no_expansion() {
        let mut sh = shell().await;
        let r = run(&mut sh, "x=world\ncat <<'EOF'\nhello $x\nEOF\n").await;
        assert_eq!(text(&r.stdout), "hello $x\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_redirect_and_read_back() {
        let mut sh = shell().await;
        let r = run(&mut sh, "echo data > f.txt; cat f.txt; cat < f.txt").await;
        assert_eq!(text(&r.stdout), "data\ndata\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stderr_redirect() {
        let mut sh = shell().await;
        let r = run(&mut sh, "missing_cmd 2>/dev/null; echo $?").await;
        assert_eq!(text(&r.stdout), "127\n");
        assert_eq!(r.stderr, b"");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_break_n_unwinds_n_loops() {
        let mut sh = shell().await;
        let script = r#"
for i in 1 2; do
  for j in a b; do
    echo "$i$j"
    break 2
  done
done
echo after
"#;
        let r = run(&mut sh, script).await;
        assert_eq!(text(&r.stdout), "1a\nafter\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_while_read_from_file() {
        let mut sh = shell().await;
        let script = "printf 'a\\nb\\nc\\n' > lines; while read line; do echo \"[$line]\"; done < lines";
        let r = run(&mut sh, script).await;
        assert_eq!(text(&r.stdout), "[a]\n[b]\n[c]\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_while_read_skips_unterminated_final_line() {
        let mut sh = shell().await;
        let script = "printf 'a\\nb' > f; while read x; do echo \"got $x\"; done < f";
        let r = run(&mut sh, script).await;
        assert_eq!(text(&r.stdout), "got a\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_read_unterminated_input_assigns_but_fails() {
        let mut sh = shell().await;
        let r = run(&mut sh, "printf abc | { read x; echo \"$? $x\"; }").await;
        assert_eq!(text(&r.stdout), "1 abc\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_custom_command_registration() {
        use crate::commands::{Command, CommandContext, CommandResult};
        struct Greet;
        impl Command for Greet {
            fn name(&self) -> &'static str {
                "greet"
            }
            fn execute(&self, argv: &[Vec<u8>], _ctx: &mut CommandContext<'_>) -> CommandResult {
                let who = argv
                    .first()
                    .map(|a| String::from_utf8_lossy(a).into_owned())
                    .unwrap_or_else(|| "world".into());
                CommandResult::success(format!("hi {}\n", who).into_bytes())
            }
        }

        let mut sh = Shell::new(ShellOptions {
            commands: vec![Box::new(Greet)],
            ..Default::default()
        })
        .await;
        let r = run(&mut sh, "greet rust").await;
        assert_eq!(text(&r.stdout), "hi rust\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancellation() {
        use std::sync::atomic::Ordering;
        let flag = Arc::new(AtomicBool::new(true));
        let mut sh = Shell::new(ShellOptions {
            cancel: Some(flag.clone()),
            ..Default::default()
        })
        .await;
        let r = run(&mut sh, "echo never").await;
        assert_eq!(r.exit_code, 130);
        assert_eq!(r.stdout, b"");
        flag.store(false, Ordering::Relaxed);
        let r = run(&mut sh, "echo now").await;
        assert_eq!(text(&r.stdout), "now\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_command_count_limit() {
        let mut sh = Shell::new(ShellOptions {
            limits: Some(ExecutionLimits { max_command_count: 5, ..Default::default() }),
            ..Default::default()
        })
        .await;
        let r = run(&mut sh, "while true; do echo x; done").await;
        assert_eq!(r.exit_code, 126);
        assert!(text(&r.stderr).contains("maximum command count"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_limit_preserves_partial_output() {
        let mut sh = Shell::new(ShellOptions {
            limits: Some(ExecutionLimits { max_command_count: 4, ..Default::default() }),
            ..Default::default()
        })
        .await;
        let r = run(&mut sh, "echo one; while true; do :; done").await;
        assert_eq!(r.exit_code, 126);
        assert_eq!(text(&r.stdout), "one\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_posix_special_builtin_fatal() {
        let mut sh = Shell::new(ShellOptions { posix: true, ..Default::default() }).await;
        let r = run(&mut sh, "readonly RO=1; RO=2; echo reached").await;
        assert_ne!(r.exit_code, 0);
        assert!(!text(&r.stdout).contains("reached"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_arith_error_is_command_level() {
        let mut sh = shell().await;
        let r = run(&mut sh, "echo $((1/0)); echo after").await;
        assert_eq!(text(&r.stdout), "after\n");
        assert!(text(&r.stderr).contains("division by 0"));
        assert_eq!(r.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_arith_error_in_assignment_continues() {
        let mut sh = shell().await;
        let r = run(&mut sh, "x=$((1+)); echo status=$?").await;
        assert_eq!(text(&r.stdout), "status=1\n");
        assert_eq!(r.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_arith_error_with_errexit_aborts() {
        let mut sh = shell().await;
        let r = run(&mut sh, "set -e; echo $((1/0)); echo nope").await;
        assert_eq!(r.stdout, b"");
        assert_eq!(r.exit_code, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_printf_q_eval_roundtrip() {
        let mut sh = shell().await;
        let r = run(&mut sh, r#"v=$(printf '%q' 'a b$c'); eval "echo $v""#).await;
        assert_eq!(text(&r.stdout), "a b$c\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ifs_star_roundtrip() {
        let mut sh = shell().await;
        let script = r#"IFS=,; var="x,y,z"; set -- $var; var2="$*"; echo "$var2""#;
        let r = run(&mut sh, script).await;
        assert_eq!(text(&r.stdout), "x,y,z\n");
    }
}
