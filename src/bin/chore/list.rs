use std::process::ExitCode;

use chore::collection::{Collection, CollectionError};

/// Print every task, or the whole tree as JSON.
///
/// # Errors
///
/// Returns an error if the tree can't be serialized.
pub fn run(collection: &Collection, json: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(&collection.serialized())?);
    } else {
        print!("{}", chore::help::list(collection));
    }
    Ok(ExitCode::SUCCESS)
}

/// Print usage for one task, looked up by name or alias.
///
/// # Errors
///
/// Returns an error if no task answers to `name`.
pub fn usage(collection: &Collection, name: &str) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let contexts = collection.to_contexts()?;
    let context = contexts
        .iter()
        .find(|c| c.name() == name || c.aliases().iter().any(|a| a == name))
        .ok_or_else(|| CollectionError::UnknownTask(name.to_string()))?;
    let task = collection.task(context.name())?;
    print!("{}", chore::help::usage("chore", context, task.doc()));
    Ok(ExitCode::SUCCESS)
}
