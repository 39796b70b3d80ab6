use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::tasks::Task;

/// A task bound to concrete positional and keyword values, plus the name it was invoked under.
///
/// Equality ignores `called_as`, so an aliased invocation and a direct one with the same
/// values are interchangeable when deduplicating.
#[derive(Clone)]
pub struct Call {
    pub task: Arc<Task>,
    pub called_as: Option<String>,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl Call {
    #[must_use]
    pub fn new(task: Arc<Task>) -> Self {
        Call {
            task,
            called_as: None,
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    #[must_use]
    pub fn called_as(mut self, name: impl Into<String>) -> Self {
        self.called_as = Some(name.into());
        self
    }

    /// Copy this call, swapping in another task while keeping the bound values.
    #[must_use]
    pub fn clone_with(&self, task: Arc<Task>) -> Self {
        Call {
            task,
            ..self.clone()
        }
    }

    /// The name this call is known by: the invoked name, falling back to the task's own.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.called_as.as_deref().or_else(|| self.task.name())
    }
}

/// Bind `task` to positional and keyword values.
#[must_use]
pub fn call(task: &Arc<Task>, args: Vec<Value>, kwargs: Map<String, Value>) -> Call {
    Call::new(Arc::clone(task)).with_args(args).with_kwargs(kwargs)
}

impl From<Arc<Task>> for Call {
    fn from(task: Arc<Task>) -> Self {
        Call::new(task)
    }
}

impl From<&Arc<Task>> for Call {
    fn from(task: &Arc<Task>) -> Self {
        Call::new(Arc::clone(task))
    }
}

impl PartialEq for Call {
    fn eq(&self, other: &Self) -> bool {
        self.task == other.task && self.args == other.args && self.kwargs == other.kwargs
    }
}

impl Eq for Call {}

impl Hash for Call {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.task.hash(state);
        self.args.len().hash(state);
        self.kwargs.len().hash(state);
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("task", &self.task.name())
            .field("called_as", &self.called_as)
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .finish()
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.task.name().unwrap_or("<anonymous>");
        match &self.called_as {
            Some(alias) if alias != name => write!(f, "<Call {name:?} (called as {alias:?})")?,
            _ => write!(f, "<Call {name:?}")?,
        }
        write!(f, ", args: {:?}, kwargs: {:?}>", self.args, self.kwargs)
    }
}
