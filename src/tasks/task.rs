use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::context::Context;
use crate::parser::{Argument, Kind, translate_underscores};
use crate::tasks::call::Call;

/// Error type returned by task bodies
pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

/// The unit of work a task runs, shared between every task wrapping it
pub type Body = Arc<dyn Fn(&Context<'_>, &Params) -> Result<Value, BodyError> + Send + Sync>;

/// Errors raised while declaring or invoking tasks
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Cannot give both dependency tasks and an explicit pre list to '{0}'")]
    AmbiguousPre(String),
    #[error("Task '{task}' has no parameter named '{param}' (referenced by {option})")]
    UnknownParameter {
        task: String,
        param: String,
        option: &'static str,
    },
    #[error("Task '{task}' declares parameter '{param}' more than once")]
    DuplicateParameter { task: String, param: String },
    #[error("Task '{task}' called with mismatched arguments: {reason}")]
    Signature { task: String, reason: String },
    #[error("Task '{task}' failed: {source}")]
    Failed {
        task: String,
        #[source]
        source: BodyError,
    },
}

/// A declared task parameter: its name and, optionally, a default value.
///
/// `None` means no default (the parameter is required and, unless positionals are given
/// explicitly, positional); `Some(Value::Null)` is an explicit null default.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            default: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

impl From<&str> for Param {
    fn from(name: &str) -> Self {
        Param::new(name)
    }
}

/// Values bound to a task's parameters for one invocation, keyed by parameter name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Map<String, Value>,
}

impl Params {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// String value of a parameter; `None` if unset or not a string.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn list(&self, name: &str) -> Option<&Vec<Value>> {
        self.get(name).and_then(Value::as_array)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// A named, parameterized unit of work plus the metadata that shapes its command-line surface.
///
/// Two tasks are equal when they share a name and the same underlying [`Body`], so a task
/// rebuilt around an existing body still deduplicates against the original.
pub struct Task {
    name: Option<String>,
    body_name: Option<String>,
    body: Body,
    doc: Option<String>,
    params: Vec<Param>,
    aliases: Vec<String>,
    is_default: bool,
    positional: Option<Vec<String>>,
    optional: BTreeSet<String>,
    iterable: BTreeSet<String>,
    incrementing: BTreeSet<String>,
    auto_short_flags: bool,
    help: BTreeMap<String, String>,
    pre: Vec<Call>,
    post: Vec<Call>,
    auto_print: bool,
    times_called: AtomicUsize,
}

impl Task {
    /// Start declaring a task around `body`.
    pub fn builder<F>(body: F) -> TaskBuilder
    where
        F: Fn(&Context<'_>, &Params) -> Result<Value, BodyError> + Send + Sync + 'static,
    {
        TaskBuilder::from_body(Arc::new(body))
    }

    /// The task's own name, falling back to the body's name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().or(self.body_name.as_deref())
    }

    fn display_name(&self) -> String {
        self.name().unwrap_or("<anonymous>").to_string()
    }

    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    #[must_use]
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// First non-blank line of the doc text.
    #[must_use]
    pub fn help_line(&self) -> Option<String> {
        help_line(self.doc.as_deref())
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    #[must_use]
    pub fn pre(&self) -> &[Call] {
        &self.pre
    }

    #[must_use]
    pub fn post(&self) -> &[Call] {
        &self.post
    }

    #[must_use]
    pub fn auto_print(&self) -> bool {
        self.auto_print
    }

    /// How many times the body has completed successfully
    #[must_use]
    pub fn times_called(&self) -> usize {
        self.times_called.load(Ordering::Relaxed)
    }

    /// Names of positional parameters: the explicit list if one was given, else every
    /// parameter without a default, in declaration order.
    #[must_use]
    pub fn positional_names(&self) -> Vec<String> {
        match &self.positional {
            Some(explicit) => explicit.clone(),
            None => self
                .params
                .iter()
                .filter(|p| p.default.is_none())
                .map(|p| p.name.clone())
                .collect(),
        }
    }

    /// Derive the command-line arguments for this task's parameters.
    #[must_use]
    pub fn arguments(&self) -> Vec<Argument> {
        let positional = self.positional_names();
        let mut taken: HashSet<String> = self.params.iter().map(|p| p.name.clone()).collect();
        let mut args: Vec<Argument> = Vec::with_capacity(self.params.len());
        for param in &self.params {
            let arg = self.argument_for(param, &positional, &taken);
            taken.extend(arg.names().iter().cloned());
            args.push(arg);
        }
        for name in positional.iter().rev() {
            if let Some(index) = args.iter().position(|a| a.name() == name) {
                let arg = args.remove(index);
                args.insert(0, arg);
            }
        }
        args
    }

    fn argument_for(&self, param: &Param, positional: &[String], taken: &HashSet<String>) -> Argument {
        let flag_name = translate_underscores(&param.name);
        let mut names = vec![flag_name.clone()];
        if self.auto_short_flags {
            let short = flag_name
                .chars()
                .filter(|c| c.is_alphanumeric())
                .map(String::from)
                .find(|c| *c != flag_name && !taken.contains(c));
            names.extend(short);
        }
        let optional = self.optional.contains(&param.name);
        let mut arg = Argument::with_names(names)
            .unwrap_or_else(|_| Argument::new(flag_name.clone()))
            .with_positional(positional.contains(&param.name))
            .with_optional(optional);
        if flag_name != param.name {
            arg = arg.with_attr_name(param.name.clone());
        }
        let kind = if self.incrementing.contains(&param.name) {
            Kind::Incrementing
        } else if self.iterable.contains(&param.name) {
            Kind::List
        } else {
            // An optional boolean would never consume its value, so it stays a string slot.
            param
                .default
                .as_ref()
                .and_then(Kind::of)
                .filter(|kind| !(optional && *kind == Kind::Boolean))
                .unwrap_or_default()
        };
        arg = arg.with_kind(kind);
        if let Some(default) = param.default.clone() {
            arg = arg.with_default(default);
        }
        if let Some(help) = self.help.get(&param.name).or_else(|| self.help.get(&flag_name)) {
            arg = arg.with_help(help.clone());
        }
        arg
    }

    /// Bind positional and keyword values onto the declared parameters, filling defaults.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::Signature` for surplus positional values, unknown or doubly-bound
    /// keywords, and required parameters left without a value.
    pub fn bind(&self, args: &[Value], kwargs: &Map<String, Value>) -> Result<Params, TaskError> {
        let mismatch = |reason: String| TaskError::Signature {
            task: self.display_name(),
            reason,
        };
        if args.len() > self.params.len() {
            return Err(mismatch(format!(
                "takes {} positional values but {} were given",
                self.params.len(),
                args.len()
            )));
        }
        let mut values = Map::new();
        for (param, value) in self.params.iter().zip(args) {
            values.insert(param.name.clone(), value.clone());
        }
        for (key, value) in kwargs {
            if !self.params.iter().any(|p| &p.name == key) {
                return Err(mismatch(format!("unexpected keyword '{key}'")));
            }
            if values.insert(key.clone(), value.clone()).is_some() {
                return Err(mismatch(format!("multiple values for '{key}'")));
            }
        }
        for param in &self.params {
            if values.contains_key(&param.name) {
                continue;
            }
            match &param.default {
                Some(default) => {
                    values.insert(param.name.clone(), default.clone());
                }
                None => return Err(mismatch(format!("missing value for '{}'", param.name))),
            }
        }
        Ok(Params { values })
    }

    /// Run the body with an execution context and bound values.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::Signature` if the values don't fit the parameters, and
    /// `TaskError::Failed` if the body returns an error.
    pub fn call(
        &self,
        context: &Context<'_>,
        args: &[Value],
        kwargs: &Map<String, Value>,
    ) -> Result<Value, TaskError> {
        let params = self.bind(args, kwargs)?;
        let result = (self.body)(context, &params).map_err(|source| TaskError::Failed {
            task: self.display_name(),
            source,
        })?;
        self.times_called.fetch_add(1, Ordering::Relaxed);
        Ok(result)
    }

    fn body_id(&self) -> *const () {
        Arc::as_ptr(&self.body).cast::<()>()
    }
}

pub(crate) fn help_line(doc: Option<&str>) -> Option<String> {
    doc?.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(ToString::to_string)
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name() && std::ptr::eq(self.body_id(), other.body_id())
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
        self.body_id().hash(state);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name())
            .field("params", &self.params)
            .field("aliases", &self.aliases)
            .field("is_default", &self.is_default)
            .field("pre", &self.pre)
            .field("post", &self.post)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Task {:?}>", self.display_name())
    }
}

/// Declares a [`Task`]; bare usage (`Task::builder(body).build()`) takes every default.
pub struct TaskBuilder {
    name: Option<String>,
    body_name: Option<String>,
    body: Body,
    doc: Option<String>,
    params: Vec<Param>,
    aliases: Vec<String>,
    is_default: bool,
    positional: Option<Vec<String>>,
    optional: BTreeSet<String>,
    iterable: BTreeSet<String>,
    incrementing: BTreeSet<String>,
    auto_short_flags: bool,
    help: BTreeMap<String, String>,
    depends: Vec<Call>,
    pre: Option<Vec<Call>>,
    post: Vec<Call>,
    auto_print: bool,
}

impl TaskBuilder {
    /// Start from an existing body, e.g. to re-wrap another task's work.
    #[must_use]
    pub fn from_body(body: Body) -> Self {
        TaskBuilder {
            name: None,
            body_name: None,
            body,
            doc: None,
            params: Vec::new(),
            aliases: Vec::new(),
            is_default: false,
            positional: None,
            optional: BTreeSet::new(),
            iterable: BTreeSet::new(),
            incrementing: BTreeSet::new(),
            auto_short_flags: true,
            help: BTreeMap::new(),
            depends: Vec::new(),
            pre: None,
            post: Vec::new(),
            auto_print: false,
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name of the underlying function, used when no explicit name is given.
    #[must_use]
    pub fn body_name(mut self, name: impl Into<String>) -> Self {
        self.body_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    #[must_use]
    pub fn param(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub fn default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    /// Explicit positional parameter names; an empty list makes every parameter a flag.
    #[must_use]
    pub fn positional<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.positional = Some(names.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn optional<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn iterable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.iterable.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn incrementing<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.incrementing.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn auto_short_flags(mut self, enabled: bool) -> Self {
        self.auto_short_flags = enabled;
        self
    }

    #[must_use]
    pub fn help(mut self, param: impl Into<String>, text: impl Into<String>) -> Self {
        self.help.insert(param.into(), text.into());
        self
    }

    /// Leading dependency tasks, run before this one (shorthand for `pre`).
    #[must_use]
    pub fn depends(mut self, call: impl Into<Call>) -> Self {
        self.depends.push(call.into());
        self
    }

    #[must_use]
    pub fn pre(mut self, call: impl Into<Call>) -> Self {
        self.pre.get_or_insert_with(Vec::new).push(call.into());
        self
    }

    #[must_use]
    pub fn post(mut self, call: impl Into<Call>) -> Self {
        self.post.push(call.into());
        self
    }

    #[must_use]
    pub fn auto_print(mut self, enabled: bool) -> Self {
        self.auto_print = enabled;
        self
    }

    /// Validate the declaration and produce the task.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::AmbiguousPre` when both `depends` and `pre` were used,
    /// `TaskError::DuplicateParameter` for repeated parameter names, and
    /// `TaskError::UnknownParameter` when an option names a parameter that doesn't exist.
    pub fn build(self) -> Result<Task, TaskError> {
        let label = self
            .name
            .clone()
            .or_else(|| self.body_name.clone())
            .unwrap_or_else(|| "<anonymous>".to_string());
        if !self.depends.is_empty() && self.pre.is_some() {
            return Err(TaskError::AmbiguousPre(label));
        }
        let mut seen = HashSet::new();
        for param in &self.params {
            if !seen.insert(param.name.as_str()) {
                return Err(TaskError::DuplicateParameter {
                    task: label,
                    param: param.name.clone(),
                });
            }
        }
        let referenced = [
            ("positional", self.positional.iter().flatten().collect::<Vec<_>>()),
            ("optional", self.optional.iter().collect()),
            ("iterable", self.iterable.iter().collect()),
            ("incrementing", self.incrementing.iter().collect()),
            ("help", self.help.keys().collect()),
        ];
        for (option, names) in referenced {
            for name in names {
                let known = seen.contains(name.as_str())
                    || (option == "help" && self.params.iter().any(|p| translate_underscores(&p.name) == *name));
                if !known {
                    return Err(TaskError::UnknownParameter {
                        task: label,
                        param: name.clone(),
                        option,
                    });
                }
            }
        }
        let pre = match self.pre {
            Some(pre) => pre,
            None => self.depends,
        };
        Ok(Task {
            name: self.name,
            body_name: self.body_name,
            body: self.body,
            doc: self.doc,
            params: self.params,
            aliases: self.aliases,
            is_default: self.is_default,
            positional: self.positional,
            optional: self.optional,
            iterable: self.iterable,
            incrementing: self.incrementing,
            auto_short_flags: self.auto_short_flags,
            help: self.help,
            pre,
            post: self.post,
            auto_print: self.auto_print,
            times_called: AtomicUsize::new(0),
        })
    }
}
