mod list;
mod run;

use std::process::ExitCode;

use clap::{ArgAction, Parser};

use chore::load_collection;

#[derive(Parser, Debug)]
#[command(name = "chore", version, about = "Run named, parameterized tasks")]
struct Cli {
    /// Path to task file (auto-detected if not specified)
    #[arg(short, long)]
    config: Option<String>,

    /// Log file path (logs go to stderr otherwise)
    #[arg(long)]
    log_file: Option<String>,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// List available tasks
    #[arg(short, long)]
    list: bool,

    /// With --list, print the task tree as JSON
    #[arg(long, requires = "list")]
    json: bool,

    /// Run repeated tasks every time they're requested
    #[arg(long)]
    no_dedupe: bool,

    /// Show usage for a task
    #[arg(long, value_name = "TASK")]
    help_for: Option<String>,

    /// Tasks to run, each followed by its own flags and positional values
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    tasks: Vec<String>,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_file = cli
        .log_file
        .as_ref()
        .map(std::fs::File::create)
        .transpose()?;
    chore::logger::init(cli.verbose, log_file)?;

    let (collection, _cwd, _path) = load_collection(cli.config.as_deref())?;

    if cli.list {
        return list::run(&collection, cli.json);
    }
    if let Some(ref task) = cli.help_for {
        return list::usage(&collection, task);
    }
    run::run(&collection, &cli.tasks, cli.no_dedupe)
}
