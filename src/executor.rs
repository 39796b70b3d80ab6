use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;

use log::debug;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::collection::{Collection, CollectionError};
use crate::config::{Config, EnvSource};
use crate::context::Context;
use crate::parser::ParserContext;
use crate::tasks::{Call, Task, TaskError};

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error(transparent)]
    Collection(#[from] CollectionError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("Failed to write task output: {0}")]
    Output(#[from] io::Error),
}

/// One thing asked of the executor
#[derive(Debug, Clone)]
pub enum Request {
    /// A task name with no arguments
    Name(String),
    /// A task name with keyword values
    WithKwargs(String, Map<String, Value>),
    /// A context bound by the parser
    Parsed(ParserContext),
}

impl From<&str> for Request {
    fn from(name: &str) -> Self {
        Request::Name(name.to_string())
    }
}

impl From<String> for Request {
    fn from(name: String) -> Self {
        Request::Name(name)
    }
}

impl From<(&str, Map<String, Value>)> for Request {
    fn from((name, kwargs): (&str, Map<String, Value>)) -> Self {
        Request::WithKwargs(name.to_string(), kwargs)
    }
}

impl From<ParserContext> for Request {
    fn from(context: ParserContext) -> Self {
        Request::Parsed(context)
    }
}

/// Latest return value of every task that ran; a task run twice keeps only its last result
pub type Results = HashMap<Arc<Task>, Value>;

/// Runs requested tasks, with their pre and post tasks, against one collection.
pub struct Executor<'c> {
    collection: &'c Collection,
    config: Config,
    env: Option<Box<dyn EnvSource + 'c>>,
    out: Box<dyn Write + 'c>,
}

impl<'c> Executor<'c> {
    #[must_use]
    pub fn new(collection: &'c Collection) -> Self {
        Executor {
            collection,
            config: Config::new(),
            env: None,
            out: Box::new(io::stdout()),
        }
    }

    /// Use `config` as the base; its global layer stays in place for every call.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Recompute an environment overlay from `source` before each call.
    #[must_use]
    pub fn with_env(mut self, source: impl EnvSource + 'c) -> Self {
        self.env = Some(Box::new(source));
        self
    }

    /// Where auto-printed results go (stdout by default).
    #[must_use]
    pub fn with_output(mut self, out: impl Write + 'c) -> Self {
        self.out = Box::new(out);
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `requests` in order, each surrounded by its expanded pre and post tasks.
    ///
    /// With no requests, the collection's default task runs if it has one.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` for unknown task names, task failures and output errors. The
    /// first error aborts the remaining calls.
    pub fn execute<I, R>(&mut self, requests: I) -> Result<Results, ExecutorError>
    where
        I: IntoIterator<Item = R>,
        R: Into<Request>,
    {
        let direct = self.normalize(requests.into_iter().map(Into::into))?;
        let expanded = expand(&direct);
        debug!("Expanded {} requested calls into {}", direct.len(), expanded.len());
        self.relevel(None)?;
        let calls = if self.config.flag("tasks.dedupe", true) {
            dedupe(expanded)
        } else {
            expanded
        };
        let mut results = Results::new();
        for call in calls {
            self.relevel(call.called_as.as_deref())?;
            debug!("Executing {call}");
            let context = Context::new(&self.config);
            let result = call.task.call(&context, &call.args, &call.kwargs)?;
            if call.task.auto_print() && direct.contains(&call) {
                match &result {
                    Value::String(text) => writeln!(self.out, "{text}")?,
                    other => writeln!(self.out, "{other}")?,
                }
            }
            results.insert(Arc::clone(&call.task), result);
        }
        self.out.flush()?;
        Ok(results)
    }

    /// Resolve requests into calls, falling back to the default task when there are none.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Collection` for names that don't resolve.
    pub fn normalize<I>(&self, requests: I) -> Result<Vec<Call>, ExecutorError>
    where
        I: IntoIterator<Item = Request>,
    {
        let mut calls = Vec::new();
        for request in requests {
            let (name, kwargs) = match request {
                Request::Name(name) => (name, Map::new()),
                Request::WithKwargs(name, kwargs) => (name, kwargs),
                Request::Parsed(context) => {
                    let kwargs = context.as_kwargs();
                    (context.name().to_string(), kwargs)
                }
            };
            let task = self.collection.task(&name)?;
            calls.push(Call::new(task).with_kwargs(kwargs).called_as(name));
        }
        if calls.is_empty() && self.collection.default_task_name().is_some() {
            debug!("No tasks requested, using the default task");
            calls.push(Call::new(self.collection.task("")?));
        }
        Ok(calls)
    }

    // Swap in the collection layer for `path` and refresh the environment overlay.
    fn relevel(&mut self, path: Option<&str>) -> Result<(), ExecutorError> {
        let layer = self.collection.configuration(path)?;
        self.config.load_collection(layer);
        if let Some(env) = &self.env {
            self.config.load_env(env.as_ref());
        }
        Ok(())
    }
}

/// Surround every call with its pre and post calls, depth first.
#[must_use]
pub fn expand(calls: &[Call]) -> Vec<Call> {
    let mut out = Vec::new();
    for call in calls {
        out.extend(expand(call.task.pre()));
        out.push(call.clone());
        out.extend(expand(call.task.post()));
    }
    out
}

/// Keep the first occurrence of every distinct call.
#[must_use]
pub fn dedupe(calls: Vec<Call>) -> Vec<Call> {
    let mut kept: Vec<Call> = Vec::with_capacity(calls.len());
    for call in calls {
        if kept.contains(&call) {
            debug!("Skipping duplicate {call}");
        } else {
            kept.push(call);
        }
    }
    kept
}
