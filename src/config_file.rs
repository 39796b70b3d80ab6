//! Task file handling for chore
//!
//! A task file (`.chore.yaml`, `.chore.yml` or `.chore.json`) declares a tree of collections
//! whose tasks run shell commands.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, Stdio};
use std::sync::Arc;

use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::collection::{Collection, CollectionError};
use crate::config::ConfigMap;
use crate::context::Context;
use crate::tasks::{BodyError, Param, Params, Task, TaskBuilder, TaskError};

/// Errors that can occur while loading a task file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No task file found in current directory or its parents: {0}")]
    ConfigNotFound(PathBuf),
    #[error("Unknown working directory: {0}")]
    UnknownWorkingDirectory(String),
    #[error("Unable to parse YAML task file {path}: {source}")]
    Yaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("Unable to parse JSON task file {path}: {source}")]
    Json {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("Invalid regex pattern `{pattern}`: {source}")]
    Regex {
        source: regex::Error,
        pattern: String,
    },
    #[error("Invalid task file: {0}")]
    Validation(String),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Collection(#[from] CollectionError),
}

/// Errors raised by shell task bodies
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Unable to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {}", .code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    Failed { command: String, code: Option<i32> },
}

// Keeps an explicit `default: null` apart from a missing default.
fn explicit<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// A task parameter, either a bare name or a name with a default
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ConfigParam {
    Name(String),
    Full {
        name: String,
        #[serde(default, deserialize_with = "explicit")]
        default: Option<Value>,
    },
}

impl From<ConfigParam> for Param {
    fn from(config: ConfigParam) -> Self {
        match config {
            ConfigParam::Name(name) => Param::new(name),
            ConfigParam::Full { name, default } => Param { name, default },
        }
    }
}

impl ConfigParam {
    fn name(&self) -> &str {
        match self {
            ConfigParam::Name(name) | ConfigParam::Full { name, .. } => name,
        }
    }
}

/// Configuration for a single task
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ConfigTask {
    pub name: String,
    pub help: Option<String>,
    pub cmd: String,
    pub params: Option<Vec<ConfigParam>>,
    pub aliases: Option<Vec<String>>,
    pub default: Option<bool>,
    pub positional: Option<Vec<String>>,
    pub optional: Option<Vec<String>>,
    pub iterable: Option<Vec<String>>,
    pub incrementing: Option<Vec<String>>,
    pub auto_short_flags: Option<bool>,
    pub arg_help: Option<BTreeMap<String, String>>,
    pub pre: Option<Vec<String>>,
    pub post: Option<Vec<String>>,
    pub auto_print: Option<bool>,
    pub capture: Option<bool>,
}

/// Configuration for a collection of tasks
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ConfigCollection {
    pub name: Option<String>,
    pub help: Option<String>,
    pub default: Option<String>,
    pub auto_dash_names: Option<bool>,
    pub config: Option<ConfigMap>,
    pub tasks: Option<Vec<ConfigTask>>,
    pub collections: Option<Vec<ConfigCollection>>,
}

/// Root structure of a task file
#[derive(Debug, Deserialize, Serialize)]
pub struct TaskFile {
    pub chore_version: String,
    #[serde(flatten)]
    pub root: ConfigCollection,
}

/// List of supported task file names
const FILENAMES: [&str; 3] = [".chore.json", ".chore.yaml", ".chore.yml"];

/// Matches `{name}` placeholders in commands
const PLACEHOLDER: &str = r"\{([A-Za-z_][A-Za-z0-9_]*)\}";

impl TaskFile {
    /// Loads and parses a task file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if the file cannot be read, or
    /// `ConfigError::Yaml`/`ConfigError::Json` if parsing fails.
    pub fn from_file(file: &Path) -> Result<TaskFile, ConfigError> {
        let contents = std::fs::read_to_string(file)
            .map_err(|_| ConfigError::ConfigNotFound(file.to_path_buf()))?;
        let task_file: TaskFile = if file.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|e| ConfigError::Json {
                source: e,
                path: file.to_path_buf(),
            })?
        } else {
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml {
                source: e,
                path: file.to_path_buf(),
            })?
        };
        Ok(task_file)
    }

    /// Searches for a task file in the current directory and its parents.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownWorkingDirectory` if the cwd cannot be determined,
    /// or `ConfigError::ConfigNotFound` if no task file is found.
    pub fn find_config() -> Result<PathBuf, ConfigError> {
        let cwd = std::env::current_dir()
            .map_err(|e| ConfigError::UnknownWorkingDirectory(e.to_string()))?;
        Self::find_config_from(&cwd)
    }

    /// Searches for a task file in `start` and its parents.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if no task file is found.
    pub fn find_config_from(start: &Path) -> Result<PathBuf, ConfigError> {
        let mut path = start.to_path_buf();
        debug!("Searching for task file in {}", start.display());
        loop {
            for file in &FILENAMES {
                let candidate = path.join(file);
                if candidate.exists() {
                    info!("Found task file: {}", candidate.display());
                    return Ok(candidate);
                }
            }
            if !path.pop() {
                return Err(ConfigError::ConfigNotFound(start.to_path_buf()));
            }
        }
    }

    /// Turn the file into a collection whose tasks run their commands in `cwd`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` for empty names or commands, unknown `pre`/`post`
    /// references and circular `pre`/`post` chains, and wraps task and collection errors.
    pub fn build(self, cwd: &Path) -> Result<Collection, ConfigError> {
        let placeholder = Regex::new(PLACEHOLDER).map_err(|e| ConfigError::Regex {
            source: e,
            pattern: PLACEHOLDER.to_string(),
        })?;
        let builder = ShellBuilder {
            cwd: cwd.to_path_buf(),
            placeholder,
        };
        builder.collection(self.root, true)
    }
}

struct ShellBuilder {
    cwd: PathBuf,
    placeholder: Regex,
}

impl ShellBuilder {
    fn collection(&self, config: ConfigCollection, is_root: bool) -> Result<Collection, ConfigError> {
        let mut collection = match config.name {
            Some(name) if name.trim().is_empty() => {
                return Err(ConfigError::Validation("Collection has an empty name".to_string()));
            }
            Some(name) => Collection::named(name),
            None if is_root => Collection::new(),
            None => return Err(CollectionError::UnnamedCollection.into()),
        };
        if let Some(help) = config.help {
            collection = collection.with_help(help);
        }
        if let Some(dash) = config.auto_dash_names {
            collection = collection.with_auto_dash_names(dash);
        }
        if let Some(data) = &config.config {
            collection.configure(data);
        }

        let tasks = config.tasks.unwrap_or_default();
        validate_tasks(&tasks)?;
        if let Some(default) = &config.default
            && !tasks.iter().any(|t| t.name == *default)
        {
            return Err(ConfigError::Validation(format!(
                "Default task '{default}' does not exist"
            )));
        }
        let by_name: HashMap<&str, &ConfigTask> = tasks.iter().map(|t| (t.name.as_str(), t)).collect();
        let mut built: HashMap<String, Arc<Task>> = HashMap::new();
        for task in &tasks {
            let task = self.task(task, &by_name, &mut built, config.default.as_deref())?;
            collection.add_task(task)?;
        }

        for child in config.collections.unwrap_or_default() {
            let child = self.collection(child, false)?;
            collection.add_collection(child, None)?;
        }
        Ok(collection)
    }

    // Builds `config` after its pre and post tasks, which validation has proven acyclic.
    fn task(
        &self,
        config: &ConfigTask,
        by_name: &HashMap<&str, &ConfigTask>,
        built: &mut HashMap<String, Arc<Task>>,
        default: Option<&str>,
    ) -> Result<Arc<Task>, ConfigError> {
        if let Some(task) = built.get(&config.name) {
            return Ok(Arc::clone(task));
        }
        let mut pre = Vec::new();
        for name in config.pre.iter().flatten() {
            pre.push(self.dependency(config, name, by_name, built, default)?);
        }
        let mut post = Vec::new();
        for name in config.post.iter().flatten() {
            post.push(self.dependency(config, name, by_name, built, default)?);
        }

        let body = self.body(config);
        let mut builder = TaskBuilder::from_body(body)
            .name(config.name.clone())
            .default(config.default.unwrap_or(false) || default == Some(config.name.as_str()))
            .auto_short_flags(config.auto_short_flags.unwrap_or(true))
            .auto_print(config.auto_print.unwrap_or(false));
        if let Some(help) = &config.help {
            builder = builder.doc(help.clone());
        }
        for param in config.params.iter().flatten() {
            builder = builder.param(Param::from(param.clone()));
        }
        for alias in config.aliases.iter().flatten() {
            builder = builder.alias(alias.clone());
        }
        if let Some(positional) = &config.positional {
            builder = builder.positional(positional.clone());
        }
        builder = builder
            .optional(config.optional.clone().unwrap_or_default())
            .iterable(config.iterable.clone().unwrap_or_default())
            .incrementing(config.incrementing.clone().unwrap_or_default());
        for (param, text) in config.arg_help.iter().flatten() {
            builder = builder.help(param.clone(), text.clone());
        }
        for task in pre {
            builder = builder.pre(task);
        }
        for task in post {
            builder = builder.post(task);
        }
        let task = Arc::new(builder.build()?);
        built.insert(config.name.clone(), Arc::clone(&task));
        Ok(task)
    }

    fn dependency(
        &self,
        from: &ConfigTask,
        name: &str,
        by_name: &HashMap<&str, &ConfigTask>,
        built: &mut HashMap<String, Arc<Task>>,
        default: Option<&str>,
    ) -> Result<Arc<Task>, ConfigError> {
        let config = by_name
            .get(name)
            .ok_or_else(|| unknown_reference(&from.name, name))?;
        self.task(config, by_name, built, default)
    }

    fn body(&self, config: &ConfigTask) -> crate::tasks::Body {
        let template = config.cmd.clone();
        let cwd = self.cwd.clone();
        let capture = config.capture.unwrap_or(false);
        let placeholder = self.placeholder.clone();
        Arc::new(move |context: &Context<'_>, params: &Params| -> Result<Value, BodyError> {
            let command = render(&placeholder, &template, params);
            run_shell(context, &command, &cwd, capture).map_err(Into::into)
        })
    }
}

fn unknown_reference(task: &str, name: &str) -> ConfigError {
    ConfigError::Validation(format!("Task '{task}' references '{name}' which does not exist"))
}

/// Validate names, commands and `pre`/`post` references of sibling tasks
fn validate_tasks(tasks: &[ConfigTask]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for task in tasks {
        if task.name.trim().is_empty() {
            return Err(ConfigError::Validation("Task has an empty name".to_string()));
        }
        if task.cmd.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Task '{}' has an empty cmd string",
                task.name
            )));
        }
        if !seen.insert(task.name.as_str()) {
            return Err(ConfigError::Validation(format!("Duplicate task name '{}'", task.name)));
        }
        for param in task.params.iter().flatten() {
            if param.name().trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Task '{}' has a parameter with an empty name",
                    task.name
                )));
            }
        }
    }
    for task in tasks {
        for name in task.pre.iter().chain(task.post.iter()).flatten() {
            if !seen.contains(name.as_str()) {
                return Err(unknown_reference(&task.name, name));
            }
        }
    }

    // Cycle detection via DFS
    let mut visited = HashSet::new();
    let mut stack = HashSet::new();
    for task in tasks {
        if !visited.contains(task.name.as_str()) {
            detect_cycle(task.name.as_str(), tasks, &mut visited, &mut stack)?;
        }
    }
    Ok(())
}

fn detect_cycle<'a>(
    name: &'a str,
    tasks: &'a [ConfigTask],
    visited: &mut HashSet<&'a str>,
    stack: &mut HashSet<&'a str>,
) -> Result<(), ConfigError> {
    visited.insert(name);
    stack.insert(name);

    if let Some(task) = tasks.iter().find(|t| t.name == name) {
        for next in task.pre.iter().chain(task.post.iter()).flatten() {
            let next: &str = next.as_str();
            if !visited.contains(next) {
                detect_cycle(next, tasks, visited, stack)?;
            } else if stack.contains(next) {
                return Err(ConfigError::Validation(format!(
                    "Circular pre/post chain detected involving '{next}'"
                )));
            }
        }
    }

    stack.remove(name);
    Ok(())
}

/// Substitute `{param}` placeholders with bound values; unknown names are left alone.
fn render(placeholder: &Regex, template: &str, params: &Params) -> String {
    placeholder
        .replace_all(template, |caps: &regex::Captures| match params.get(&caps[1]) {
            Some(value) => shell_word(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn shell_word(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(shell_word).collect::<Vec<_>>().join(" "),
        other => other.to_string(),
    }
}

fn run_shell(context: &Context<'_>, command: &str, cwd: &Path, capture: bool) -> Result<Value, ShellError> {
    if context.config().flag("run.echo", false) {
        eprintln!("{command}");
    }
    let env: Vec<(String, String)> = context
        .get("run.env")
        .and_then(Value::as_object)
        .map(|env| env.iter().map(|(k, v)| (k.clone(), shell_word(v))).collect())
        .unwrap_or_default();
    debug!("Running `{command}` in {}", cwd.display());

    let mut process = ProcessCommand::new("sh");
    process.arg("-c").arg(command).current_dir(cwd).envs(env);
    let spawn = |source| ShellError::Spawn {
        command: command.to_string(),
        source,
    };
    let (status, stdout) = if capture {
        let output = process.stderr(Stdio::inherit()).output().map_err(spawn)?;
        (output.status, Some(output.stdout))
    } else {
        (process.status().map_err(spawn)?, None)
    };
    if !status.success() {
        return Err(ShellError::Failed {
            command: command.to_string(),
            code: status.code(),
        });
    }
    Ok(match stdout {
        Some(bytes) => {
            let mut text = String::from_utf8_lossy(&bytes).into_owned();
            text.truncate(text.trim_end().len());
            Value::String(text)
        }
        None => Value::Null,
    })
}
