use std::{fs, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};

use tombo::{init_tracing, Config, Interpreter, Registry, Repl, TomboError};

#[derive(Parser)]
#[command(author, version, about = "Tombo language interpreter")]
struct Args {
    /// Maximum depth of nested function calls
    #[arg(long, global = true)]
    max_call_depth: Option<usize>,
    /// Start with an empty root scope instead of the core prelude
    #[arg(long, global = true)]
    no_prelude: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Tombo script file
    Run { script: PathBuf },
    /// Start an interactive REPL session
    Repl,
    /// Evaluate a snippet of Tombo code
    Eval { source: String },
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    let interpreter = build_interpreter(&args);
    let outcome = match args.command.unwrap_or(Command::Repl) {
        Command::Run { script } => run_script(interpreter, script),
        Command::Repl => Repl::new(interpreter).run().map_err(|err| err.to_string()),
        Command::Eval { source } => evaluate(interpreter, &source),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("{report}");
            ExitCode::FAILURE
        }
    }
}

fn build_interpreter(args: &Args) -> Interpreter {
    let mut config = Config::default();
    if let Some(depth) = args.max_call_depth {
        config = config.with_max_call_depth(depth);
    }
    let registry = if args.no_prelude {
        Registry::new()
    } else {
        Registry::with_prelude()
    };
    Interpreter::with_registry(registry, config)
}

fn run_script(interpreter: Interpreter, path: PathBuf) -> Result<(), String> {
    let source = fs::read_to_string(&path).map_err(|err| {
        TomboError::from(err)
            .diagnostic()
            .with_note(format!("while reading {}", path.display()))
            .to_string()
    })?;
    evaluate(interpreter, &source)
}

fn evaluate(mut interpreter: Interpreter, source: &str) -> Result<(), String> {
    match interpreter.eval_source(source) {
        Ok(_) => Ok(()),
        Err(err) => Err(err.diagnostic().render(source)),
    }
}
