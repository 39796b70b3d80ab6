use std::process::ExitCode;

use log::warn;
use serde_json::json;

use chore::collection::Collection;
use chore::config::{Config, ConfigMap, PrefixedEnv};
use chore::executor::Executor;
use chore::parser::Parser;

/// Parse the trailing task tokens and run them.
///
/// # Errors
///
/// Returns an error if parsing fails or a task can't be resolved or fails.
pub fn run(
    collection: &Collection,
    tokens: &[String],
    no_dedupe: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let parser = Parser::new(collection.to_contexts()?)?;
    let parsed = parser.parse_argv(tokens.iter().cloned())?;
    if !parsed.remainder.is_empty() {
        warn!("Ignoring arguments after `--`: {}", parsed.remainder.join(" "));
    }

    for context in parsed.contexts() {
        let missing: Vec<&str> = context
            .missing_positional_args()
            .into_iter()
            .map(|arg| arg.names()[0].as_str())
            .collect();
        if !missing.is_empty() {
            eprintln!(
                "'{}' did not receive required positional arguments: {}",
                context.name(),
                missing.join(", ")
            );
            return Ok(ExitCode::FAILURE);
        }
    }

    if parsed.is_empty() && collection.default_task_name().is_none() {
        print!("{}", chore::help::list(collection));
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::new();
    if no_dedupe {
        let mut overrides = ConfigMap::new();
        overrides.insert("tasks".to_string(), json!({ "dedupe": false }));
        config.update_global(&overrides);
    }
    let mut executor = Executor::new(collection)
        .with_config(config)
        .with_env(PrefixedEnv::new("CHORE"));
    executor.execute(parsed.into_contexts())?;
    Ok(ExitCode::SUCCESS)
}
