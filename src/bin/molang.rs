use std::{fs, path::PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use molang::{Engine, MolangError, Repl};

#[derive(Parser)]
#[command(author, version, about = "Molang expression runtime")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a Molang script file and print its result
    Run { script: PathBuf },
    /// Start an interactive REPL session
    Repl,
    /// Evaluate a Molang snippet and print its result
    Eval { source: String },
}

fn main() -> Result<(), MolangError> {
    init_tracing();
    let args = Args::parse();
    match args.command.unwrap_or(Command::Repl) {
        Command::Run { script } => run_script(script),
        Command::Repl => {
            let mut repl = Repl::new();
            repl.run()
        }
        Command::Eval { source } => {
            let value = Engine::standard().eval_source(&source)?;
            println!("{value}");
            Ok(())
        }
    }
}

fn run_script(path: PathBuf) -> Result<(), MolangError> {
    let source = fs::read_to_string(&path)?;
    let value = Engine::standard().eval_source(&source)?;
    println!("{value}");
    Ok(())
}

/// Logs go to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
