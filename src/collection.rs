//! Namespaces of tasks.
//!
//! A [`Collection`] owns named tasks and nested collections, each node carrying its own
//! configuration, aliases and default task. Dotted names (`deploy.web`) address tasks inside
//! nested collections.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::config::{ConfigMap, merge_maps};
use crate::parser::{ContextError, ParserContext, translate_underscores};
use crate::tasks::{Task, help_line};

#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("Task has no name and none was given")]
    UnnamedTask,
    #[error("Collection has no name and none was given")]
    UnnamedCollection,
    #[error("Name '{name}' is already used by a {existing} in {collection}")]
    NameConflict {
        collection: String,
        name: String,
        existing: &'static str,
    },
    #[error("{collection} already has a default task ('{existing}'), can't make '{name}' the default")]
    DefaultConflict {
        collection: String,
        existing: String,
        name: String,
    },
    #[error("No task named '{0}'")]
    UnknownTask(String),
    #[error("No collection named '{0}'")]
    UnknownCollection(String),
    #[error("{0} has no default task")]
    NoDefault(String),
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Options for [`Collection::add_task_with`]; unset fields fall back to the task's own settings.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub name: Option<String>,
    pub default: Option<bool>,
    pub aliases: Vec<String>,
}

/// A module-like bundle of tasks, turned into a collection by [`Collection::from_module`]
#[derive(Debug, Default)]
pub struct Module {
    /// Dotted module path; only the last component names the collection
    pub name: String,
    pub doc: Option<String>,
    pub tasks: Vec<Arc<Task>>,
    /// An explicitly embedded root collection, used in place of `tasks`
    pub namespace: Option<Collection>,
}

/// Anything that can be added to a collection
#[derive(Debug)]
pub enum Member {
    Task(Arc<Task>),
    Collection(Collection),
    Module(Module),
}

impl From<Arc<Task>> for Member {
    fn from(task: Arc<Task>) -> Self {
        Member::Task(task)
    }
}

impl From<Collection> for Member {
    fn from(collection: Collection) -> Self {
        Member::Collection(collection)
    }
}

impl From<Module> for Member {
    fn from(module: Module) -> Self {
        Member::Module(module)
    }
}

/// Serialized view of a collection, ordered for stable output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub name: Option<String>,
    pub help: Option<String>,
    pub default: Option<String>,
    pub tasks: Vec<TaskInfo>,
    pub collections: Vec<CollectionInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskInfo {
    pub name: String,
    pub help: Option<String>,
    pub aliases: Vec<String>,
}

/// One reachable task with its display name and alternate names
struct Entry {
    name: String,
    aliases: Vec<String>,
    task: Arc<Task>,
}

#[derive(Debug, Clone, Default)]
pub struct Collection {
    name: Option<String>,
    help: Option<String>,
    tasks: BTreeMap<String, Arc<Task>>,
    collections: BTreeMap<String, Collection>,
    default: Option<String>,
    aliases: BTreeMap<String, String>,
    config: ConfigMap,
    auto_dash_names: Option<bool>,
    loaded_from: Option<PathBuf>,
}

impl Collection {
    /// An anonymous collection, usable as a root.
    #[must_use]
    pub fn new() -> Self {
        Collection::default()
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Collection {
            name: Some(name.into()),
            ..Collection::default()
        }
    }

    /// Build a collection from unnamed members plus members bound to explicit names.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError` when a member can't be named or collides with a sibling.
    pub fn from_members<I, N>(name: Option<&str>, members: I, named: N) -> Result<Self, CollectionError>
    where
        I: IntoIterator<Item = Member>,
        N: IntoIterator<Item = (String, Member)>,
    {
        let mut collection = match name {
            Some(name) => Collection::named(name),
            None => Collection::new(),
        };
        for member in members {
            collection.add_member(member, None)?;
        }
        for (name, member) in named {
            collection.add_member(member, Some(name))?;
        }
        Ok(collection)
    }

    fn add_member(&mut self, member: Member, name: Option<String>) -> Result<(), CollectionError> {
        match member {
            Member::Task(task) => self.add_task_with(
                task,
                TaskOptions {
                    name,
                    ..TaskOptions::default()
                },
            ),
            Member::Collection(collection) => self.add_collection(collection, name.as_deref()),
            Member::Module(module) => {
                let collection = Collection::from_module(module, None, None)?;
                self.add_collection(collection, name.as_deref())
            }
        }
    }

    /// Build a collection from a module's tasks.
    ///
    /// The name is the last dotted component of the module name unless `name` is given. A
    /// module that embeds its own root collection is used as-is, with its name, help and
    /// config taking precedence; an explicit `config` is merged over the embedded one.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError` when the module's tasks can't be added.
    pub fn from_module(
        module: Module,
        name: Option<&str>,
        config: Option<&ConfigMap>,
    ) -> Result<Self, CollectionError> {
        let module_name = module.name.rsplit('.').next().unwrap_or_default().to_string();
        if let Some(mut namespace) = module.namespace {
            let derived = name
                .map(ToString::to_string)
                .or_else(|| namespace.name.clone())
                .unwrap_or(module_name);
            namespace.name = Some(derived);
            if namespace.help.is_none() {
                namespace.help = module.doc;
            }
            if let Some(config) = config {
                namespace.configure(config);
            }
            return Ok(namespace);
        }
        let mut collection = Collection::named(name.map_or(module_name, ToString::to_string));
        collection.help = module.doc;
        for task in module.tasks {
            collection.add_task(task)?;
        }
        if let Some(config) = config {
            collection.configure(config);
        }
        Ok(collection)
    }

    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Whether underscores in names are shown as dashes; unset inherits from the parent.
    #[must_use]
    pub fn with_auto_dash_names(mut self, enabled: bool) -> Self {
        self.auto_dash_names = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_loaded_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.loaded_from = Some(path.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    #[must_use]
    pub fn default_task_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    #[must_use]
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }

    #[must_use]
    pub fn local_config(&self) -> &ConfigMap {
        &self.config
    }

    pub fn tasks(&self) -> impl Iterator<Item = (&String, &Arc<Task>)> {
        self.tasks.iter()
    }

    pub fn collections(&self) -> impl Iterator<Item = (&String, &Collection)> {
        self.collections.iter()
    }

    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("collection '{name}'"),
            None => "the root collection".to_string(),
        }
    }

    /// Add a task under its own name, aliases and default flag.
    ///
    /// # Errors
    ///
    /// See [`Collection::add_task_with`].
    pub fn add_task(&mut self, task: Arc<Task>) -> Result<(), CollectionError> {
        self.add_task_with(task, TaskOptions::default())
    }

    /// Add a task, overriding its name or default flag and adding extra aliases.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::UnnamedTask` if no name can be derived,
    /// `CollectionError::NameConflict` if the name or an alias is taken by a sibling collection
    /// (or an alias by another task), and `CollectionError::DefaultConflict` if another task is
    /// already this node's default.
    pub fn add_task_with(&mut self, task: Arc<Task>, options: TaskOptions) -> Result<(), CollectionError> {
        let name = options
            .name
            .or_else(|| task.name().map(ToString::to_string))
            .ok_or(CollectionError::UnnamedTask)?;
        if self.collections.contains_key(&name) {
            return Err(self.conflict(&name, "collection"));
        }
        if self.aliases.get(&name).is_some_and(|target| *target != name) {
            return Err(self.conflict(&name, "alias"));
        }
        let is_default = options.default.unwrap_or_else(|| task.is_default());
        if is_default
            && let Some(existing) = self.default.as_ref().filter(|d| **d != name)
        {
            return Err(CollectionError::DefaultConflict {
                collection: self.label(),
                existing: existing.clone(),
                name,
            });
        }
        let mut aliases = options.aliases;
        aliases.extend(task.aliases().iter().cloned());
        for alias in &aliases {
            if self.collections.contains_key(alias) {
                return Err(self.conflict(alias, "collection"));
            }
            if *alias != name && self.tasks.contains_key(alias) {
                return Err(self.conflict(alias, "task"));
            }
            if self.aliases.get(alias).is_some_and(|target| *target != name) {
                return Err(self.conflict(alias, "alias"));
            }
        }
        debug!("Adding task '{name}' to {}", self.label());
        // A replaced task takes its aliases and default status with it
        self.aliases.retain(|_, target| *target != name);
        for alias in aliases {
            self.aliases.insert(alias, name.clone());
        }
        if is_default {
            self.default = Some(name.clone());
        } else if self.default.as_ref() == Some(&name) {
            self.default = None;
        }
        self.tasks.insert(name, task);
        Ok(())
    }

    /// Add a nested collection under `name`, or under its own name.
    ///
    /// The child keeps its own name for serialization even when bound under another one.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::UnnamedCollection` if neither name is available and
    /// `CollectionError::NameConflict` if a sibling task or alias already uses the name.
    pub fn add_collection(&mut self, collection: Collection, name: Option<&str>) -> Result<(), CollectionError> {
        let name = name
            .map(ToString::to_string)
            .or_else(|| collection.name.clone())
            .ok_or(CollectionError::UnnamedCollection)?;
        if self.tasks.contains_key(&name) {
            return Err(self.conflict(&name, "task"));
        }
        if self.aliases.contains_key(&name) {
            return Err(self.conflict(&name, "alias"));
        }
        debug!("Adding collection '{name}' to {}", self.label());
        self.collections.insert(name, collection);
        Ok(())
    }

    fn conflict(&self, name: &str, existing: &'static str) -> CollectionError {
        CollectionError::NameConflict {
            collection: self.label(),
            name: name.to_string(),
            existing,
        }
    }

    /// Merge `data` into this node's configuration; nested maps merge, leaves overwrite.
    pub fn configure(&mut self, data: &ConfigMap) {
        merge_maps(&mut self.config, data);
    }

    /// Configuration for a task path, merging every node along the way with ancestors winning.
    ///
    /// `None` returns this node's own configuration.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError` if `path` doesn't resolve to a task.
    pub fn configuration(&self, path: Option<&str>) -> Result<ConfigMap, CollectionError> {
        match path {
            None => Ok(self.config.clone()),
            Some(path) => Ok(self.task_with_config(path)?.1),
        }
    }

    /// Resolve a task by dotted path, alias, or the empty string for the default.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::UnknownTask` for unresolvable paths and
    /// `CollectionError::NoDefault` when a default is asked of a node without one.
    pub fn task(&self, path: &str) -> Result<Arc<Task>, CollectionError> {
        Ok(self.task_with_config(path)?.0)
    }

    /// Like [`Collection::task`], also returning the merged configuration along the path.
    ///
    /// # Errors
    ///
    /// See [`Collection::task`].
    pub fn task_with_config(&self, path: &str) -> Result<(Arc<Task>, ConfigMap), CollectionError> {
        let (task, mut config) = self.resolve(path, path)?;
        // Walking back up, each ancestor's values land on top.
        merge_maps(&mut config, &self.config);
        Ok((task, config))
    }

    fn resolve(&self, path: &str, full: &str) -> Result<(Arc<Task>, ConfigMap), CollectionError> {
        if path.is_empty() {
            let Some(default) = &self.default else {
                return Err(CollectionError::NoDefault(self.label()));
            };
            let task = self
                .tasks
                .get(default)
                .ok_or_else(|| CollectionError::UnknownTask(full.to_string()))?;
            return Ok((Arc::clone(task), ConfigMap::new()));
        }
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        if let Some((_, child)) = lookup(&self.collections, head) {
            let (task, mut config) = child.resolve(rest.unwrap_or_default(), full)?;
            merge_maps(&mut config, &child.config);
            return Ok((task, config));
        }
        if rest.is_some() {
            return Err(CollectionError::UnknownTask(full.to_string()));
        }
        let name = match lookup(&self.tasks, head) {
            Some((name, _)) => name.clone(),
            None => lookup(&self.aliases, head)
                .map(|(_, target)| target.clone())
                .ok_or_else(|| CollectionError::UnknownTask(full.to_string()))?,
        };
        let task = self
            .tasks
            .get(&name)
            .ok_or_else(|| CollectionError::UnknownTask(full.to_string()))?;
        Ok((Arc::clone(task), ConfigMap::new()))
    }

    /// Whether `path` resolves to a task.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.task(path).is_ok()
    }

    /// The nested collection at a dotted path.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::UnknownCollection` if any segment is missing.
    pub fn subcollection(&self, path: &str) -> Result<&Collection, CollectionError> {
        let mut current = self;
        for segment in path.split('.') {
            current = lookup(&current.collections, segment)
                .map(|(_, child)| child)
                .ok_or_else(|| CollectionError::UnknownCollection(path.to_string()))?;
        }
        Ok(current)
    }

    fn dashes(&self, inherited: bool) -> bool {
        self.auto_dash_names.unwrap_or(inherited)
    }

    fn entries(&self, inherited: bool) -> Vec<Entry> {
        let dash = self.dashes(inherited);
        let show = |name: &str| transform(name, dash);
        let mut entries = Vec::new();
        for (name, task) in &self.tasks {
            let aliases = self
                .aliases
                .iter()
                .filter(|(_, target)| *target == name)
                .map(|(alias, _)| show(alias))
                .collect();
            entries.push(Entry {
                name: show(name),
                aliases,
                task: Arc::clone(task),
            });
        }
        for (coll_name, child) in &self.collections {
            let prefix = show(coll_name);
            let child_default = child.default.as_ref().map(|d| transform(d, child.dashes(dash)));
            for entry in child.entries(dash) {
                let mut aliases: Vec<String> = entry
                    .aliases
                    .iter()
                    .map(|alias| format!("{prefix}.{alias}"))
                    .collect();
                if child_default.as_deref() == Some(entry.name.as_str()) {
                    aliases.push(prefix.clone());
                }
                entries.push(Entry {
                    name: format!("{prefix}.{}", entry.name),
                    aliases,
                    task: entry.task,
                });
            }
        }
        entries
    }

    /// Every reachable dotted task name mapped to its alternate names.
    ///
    /// A default task of a nested collection also answers to the collection's own name.
    #[must_use]
    pub fn task_names(&self) -> BTreeMap<String, Vec<String>> {
        self.entries(true)
            .into_iter()
            .map(|entry| (entry.name, entry.aliases))
            .collect()
    }

    /// One parser context per reachable task, named the way they're typed on the command line.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::Context` if a task's arguments clash.
    pub fn to_contexts(&self) -> Result<Vec<ParserContext>, CollectionError> {
        let mut entries = self.entries(true);
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
            .into_iter()
            .map(|entry| Ok(ParserContext::with_args(entry.name, entry.aliases, entry.task.arguments())?))
            .collect()
    }

    /// A plain descriptor tree, children ordered by name with unnamed ones first.
    #[must_use]
    pub fn serialized(&self) -> CollectionInfo {
        self.serialized_with(true)
    }

    fn serialized_with(&self, inherited: bool) -> CollectionInfo {
        let dash = self.dashes(inherited);
        let mut tasks: Vec<TaskInfo> = self
            .tasks
            .iter()
            .map(|(name, task)| TaskInfo {
                name: transform(name, dash),
                help: task.help_line(),
                aliases: self
                    .aliases
                    .iter()
                    .filter(|(_, target)| *target == name)
                    .map(|(alias, _)| transform(alias, dash))
                    .collect(),
            })
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        let mut collections: Vec<CollectionInfo> = self
            .collections
            .values()
            .map(|child| child.serialized_with(dash))
            .collect();
        collections.sort_by(|a, b| a.name.cmp(&b.name));
        CollectionInfo {
            name: self.name.clone(),
            help: help_line(self.help.as_deref()),
            default: self.default.as_ref().map(|d| transform(d, dash)),
            tasks,
            collections,
        }
    }
}

/// Render a (possibly dotted) name for the command line.
fn transform(name: &str, dash: bool) -> String {
    if !dash {
        return name.to_string();
    }
    name.split('.').map(translate_underscores).collect::<Vec<_>>().join(".")
}

/// Find `key` in `map`, falling back to its underscored spelling.
fn lookup<'a, T>(map: &'a BTreeMap<String, T>, key: &str) -> Option<(&'a String, &'a T)> {
    map.get_key_value(key)
        .or_else(|| map.get_key_value(&key.replace('-', "_")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::tasks::{BodyError, Param, Params, TaskBuilder};
    use crate::parser::Parser;
    use serde_json::{Value, json};

    fn noop(_: &Context<'_>, _: &Params) -> Result<Value, BodyError> {
        Ok(Value::Null)
    }

    fn make_builder(name: &str) -> TaskBuilder {
        Task::builder(noop).name(name)
    }

    fn make_task(name: &str) -> Arc<Task> {
        Arc::new(make_builder(name).build().unwrap())
    }

    fn map(value: Value) -> ConfigMap {
        match value {
            Value::Object(map) => map,
            other => panic!("Expected object, got: {other:?}"),
        }
    }

    fn make_tree() -> Collection {
        let mut inner = Collection::named("deploy");
        inner.add_task(Arc::new(make_builder("web").default(true).alias("w").build().unwrap())).unwrap();
        inner.add_task(make_task("db_migrate")).unwrap();
        let mut root = Collection::new();
        root.add_task(make_task("build")).unwrap();
        root.add_collection(inner, None).unwrap();
        root
    }

    #[test]
    fn test_add_task_requires_name() {
        let mut root = Collection::new();
        let anonymous = Arc::new(Task::builder(noop).build().unwrap());
        assert!(matches!(
            root.add_task(anonymous.clone()),
            Err(CollectionError::UnnamedTask)
        ));
        root.add_task_with(
            anonymous,
            TaskOptions {
                name: Some("given".to_string()),
                ..TaskOptions::default()
            },
        )
        .unwrap();
        assert!(root.contains("given"));
    }

    #[test]
    fn test_add_collection_requires_name() {
        let mut root = Collection::new();
        assert!(matches!(
            root.add_collection(Collection::new(), None),
            Err(CollectionError::UnnamedCollection)
        ));
        root.add_collection(Collection::new(), Some("ns")).unwrap();
        assert!(root.subcollection("ns").is_ok());
    }

    #[test]
    fn test_name_conflicts() {
        let mut root = Collection::new();
        root.add_task(make_task("build")).unwrap();
        assert!(matches!(
            root.add_collection(Collection::named("build"), None),
            Err(CollectionError::NameConflict { existing: "task", .. })
        ));
        root.add_collection(Collection::named("deploy"), None).unwrap();
        assert!(matches!(
            root.add_task(make_task("deploy")),
            Err(CollectionError::NameConflict { existing: "collection", .. })
        ));
        let aliased = Arc::new(make_builder("other").alias("build").build().unwrap());
        assert!(matches!(
            root.add_task(aliased),
            Err(CollectionError::NameConflict { existing: "task", .. })
        ));
        root.add_task(Arc::new(make_builder("lint").alias("l").build().unwrap()))
            .unwrap();
        assert!(matches!(
            root.add_task(make_task("l")),
            Err(CollectionError::NameConflict { existing: "alias", .. })
        ));
        assert!(Parser::new(root.to_contexts().unwrap()).is_ok());
    }

    #[test]
    fn test_replacing_a_task_drops_its_aliases_and_default() {
        let mut root = Collection::new();
        root.add_task(Arc::new(
            make_builder("build").alias("b").default(true).build().unwrap(),
        ))
        .unwrap();
        root.add_task(make_task("build")).unwrap();
        assert_eq!(root.default_task_name(), None);
        assert!(matches!(
            root.task("b"),
            Err(CollectionError::UnknownTask(_))
        ));
        root.add_task(make_task("b")).unwrap();
        assert!(root.contains("b"));
    }

    #[test]
    fn test_second_default_is_rejected() {
        let mut root = Collection::new();
        root.add_task(Arc::new(make_builder("a").default(true).build().unwrap())).unwrap();
        let result = root.add_task_with(
            make_task("b"),
            TaskOptions {
                default: Some(true),
                ..TaskOptions::default()
            },
        );
        match result {
            Err(CollectionError::DefaultConflict { existing, name, .. }) => {
                assert_eq!(existing, "a");
                assert_eq!(name, "b");
            }
            other => panic!("Expected DefaultConflict, got: {other:?}"),
        }
    }

    #[test]
    fn test_lookup() {
        let root = make_tree();
        assert_eq!(root.task("build").unwrap().name(), Some("build"));
        assert_eq!(root.task("deploy.web").unwrap().name(), Some("web"));
        assert_eq!(root.task("deploy.w").unwrap().name(), Some("web"));
        assert_eq!(root.task("deploy").unwrap().name(), Some("web"));
        assert_eq!(root.task("deploy.db-migrate").unwrap().name(), Some("db_migrate"));
        assert_eq!(root.task("deploy.db_migrate").unwrap().name(), Some("db_migrate"));
        assert!(matches!(root.task("nope"), Err(CollectionError::UnknownTask(_))));
        assert!(matches!(root.task("build.nope"), Err(CollectionError::UnknownTask(_))));
        assert!(matches!(root.task(""), Err(CollectionError::NoDefault(_))));
    }

    #[test]
    fn test_task_names() {
        let names = make_tree().task_names();
        let expected: BTreeMap<String, Vec<String>> = [
            ("build".to_string(), vec![]),
            ("deploy.db-migrate".to_string(), vec![]),
            (
                "deploy.web".to_string(),
                vec!["deploy.w".to_string(), "deploy".to_string()],
            ),
        ]
        .into_iter()
        .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_auto_dash_names_is_inherited_unless_overridden() {
        let mut inner = Collection::named("raw_ns").with_auto_dash_names(false);
        inner.add_task(make_task("keep_me")).unwrap();
        let mut root = Collection::new();
        root.add_task(make_task("dash_me")).unwrap();
        root.add_collection(inner, None).unwrap();
        let names: Vec<String> = root.task_names().into_keys().collect();
        assert_eq!(names, vec!["dash-me".to_string(), "raw-ns.keep_me".to_string()]);

        let contexts = root.to_contexts().unwrap();
        let context_names: Vec<&str> = contexts.iter().map(ParserContext::name).collect();
        assert_eq!(context_names, vec!["dash-me", "raw-ns.keep_me"]);
    }

    #[test]
    fn test_to_contexts_carry_arguments_and_aliases() {
        let mut root = Collection::new();
        let task = make_builder("build")
            .param("target")
            .param(Param::new("release").with_default(false))
            .alias("b")
            .build()
            .unwrap();
        root.add_task(Arc::new(task)).unwrap();
        let contexts = root.to_contexts().unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].aliases(), ["b".to_string()]);
        assert!(contexts[0].flag("--release").is_some());
        assert_eq!(contexts[0].positional_args().count(), 1);
    }

    #[test]
    fn test_configuration_ancestors_win_and_merge_deeply() {
        let mut inner = Collection::named("ns");
        inner.add_task(make_task("t")).unwrap();
        inner.configure(&map(json!({"run": {"echo": false, "env": {"INNER": "1"}}, "only": "inner"})));
        let mut root = Collection::new();
        root.add_collection(inner, None).unwrap();
        root.configure(&map(json!({"run": {"echo": true}})));

        let config = root.configuration(Some("ns.t")).unwrap();
        assert_eq!(
            Value::Object(config.clone()),
            json!({"run": {"echo": true, "env": {"INNER": "1"}}, "only": "inner"})
        );
        assert_eq!(root.configuration(Some("ns.t")).unwrap(), config);
        assert_eq!(Value::Object(root.configuration(None).unwrap()), json!({"run": {"echo": true}}));
    }

    #[test]
    fn test_configure_is_cumulative() {
        let mut root = Collection::new();
        root.configure(&map(json!({"a": {"x": 1}})));
        root.configure(&map(json!({"a": {"y": 2}})));
        assert_eq!(Value::Object(root.local_config().clone()), json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn test_serialized_orders_unnamed_children_first() {
        let mut root = Collection::new();
        root.add_collection(Collection::named("hola"), None).unwrap();
        root.add_collection(Collection::new(), Some("anon")).unwrap();
        let info = root.serialized();
        let names: Vec<Option<&str>> = info.collections.iter().map(|c| c.name.as_deref()).collect();
        assert_eq!(names, vec![None, Some("hola")]);
    }

    #[test]
    fn test_serialized_shape() {
        let mut root = make_tree().with_help("Project tasks.\nMore detail.");
        root.add_task(Arc::new(make_builder("lint").doc("Run linters").build().unwrap())).unwrap();
        let value = serde_json::to_value(root.serialized()).unwrap();
        assert_eq!(
            value,
            json!({
                "name": null,
                "help": "Project tasks.",
                "default": null,
                "tasks": [
                    {"name": "build", "help": null, "aliases": []},
                    {"name": "lint", "help": "Run linters", "aliases": []},
                ],
                "collections": [{
                    "name": "deploy",
                    "help": null,
                    "default": "web",
                    "tasks": [
                        {"name": "db-migrate", "help": null, "aliases": []},
                        {"name": "web", "help": null, "aliases": ["w"]},
                    ],
                    "collections": [],
                }],
            })
        );
    }

    #[test]
    fn test_from_module() {
        let module = Module {
            name: "project.tasks.release".to_string(),
            doc: Some("Release tasks".to_string()),
            tasks: vec![make_task("tag"), make_task("publish")],
            namespace: None,
        };
        let collection = Collection::from_module(module, None, Some(&map(json!({"k": 1})))).unwrap();
        assert_eq!(collection.name(), Some("release"));
        assert_eq!(collection.help(), Some("Release tasks"));
        assert!(collection.contains("tag"));
        assert_eq!(collection.local_config().get("k"), Some(&json!(1)));
    }

    #[test]
    fn test_from_module_prefers_embedded_namespace() {
        let mut namespace = Collection::named("custom");
        namespace.add_task(make_task("only")).unwrap();
        namespace.configure(&map(json!({"a": {"x": 1}})));
        let module = Module {
            name: "tasks".to_string(),
            doc: Some("Module doc".to_string()),
            tasks: vec![make_task("ignored")],
            namespace: Some(namespace),
        };
        let collection = Collection::from_module(module, None, Some(&map(json!({"a": {"y": 2}})))).unwrap();
        assert_eq!(collection.name(), Some("custom"));
        assert!(collection.contains("only"));
        assert!(!collection.contains("ignored"));
        assert_eq!(Value::Object(collection.local_config().clone()), json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn test_from_members() {
        let module = Module {
            name: "docs".to_string(),
            tasks: vec![make_task("html")],
            ..Module::default()
        };
        let root = Collection::from_members(
            Some("root"),
            vec![Member::from(make_task("build")), Member::from(module)],
            vec![("sub".to_string(), Member::from(Collection::new()))],
        )
        .unwrap();
        assert_eq!(root.name(), Some("root"));
        assert!(root.contains("build"));
        assert!(root.contains("docs.html"));
        assert!(root.subcollection("sub").is_ok());
    }
}
