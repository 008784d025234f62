use clap::Parser;
use std::io::Read;

use bashbox::shell::{Shell, ShellOptions};

#[derive(Parser)]
#[command(name = "bashbox")]
#[command(about = "A sandboxed bash interpreter over a virtual filesystem")]
#[command(version)]
struct Cli {
    /// Execute the script given on the command line
    #[arg(short = 'c')]
    script: Option<String>,

    /// Exit immediately if a command exits with non-zero status
    #[arg(short = 'e', long = "errexit")]
    errexit: bool,

    /// Working directory within the sandbox
    #[arg(long = "cwd")]
    cwd: Option<String>,

    /// Output the result as JSON (stdout, stderr, exitCode)
    #[arg(long = "json")]
    json: bool,

    /// Script file to execute
    #[arg()]
    script_file: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let script = if let Some(s) = cli.script {
        s
    } else if let Some(ref file) = cli.script_file {
        match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("bashbox: cannot read script file {}: {}", file, e);
                std::process::exit(1);
            }
        }
    } else {
        use std::io::IsTerminal;
        if std::io::stdin().is_terminal() {
            eprintln!("bashbox: no script; use -c 'script', a script file, or pipe via stdin");
            std::process::exit(2);
        }
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).unwrap_or_default();
        buf
    };

    let mut shell = Shell::new(ShellOptions { cwd: cli.cwd, ..Default::default() }).await;

    let source = if cli.errexit { format!("set -e\n{}", script) } else { script };
    let result = shell.exec(&source, None).await;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "stdout": String::from_utf8_lossy(&result.stdout),
                "stderr": String::from_utf8_lossy(&result.stderr),
                "exitCode": result.exit_code,
            })
        );
    } else {
        use std::io::Write;
        let _ = std::io::stdout().write_all(&result.stdout);
        let _ = std::io::stderr().write_all(&result.stderr);
    }

    std::process::exit(result.exit_code);
}
