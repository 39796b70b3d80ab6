//! Layered configuration.
//!
//! A [`Config`] is the merge of four layers, lowest to highest: built-in defaults, the
//! collection layer (reloaded for each call), the global layer handed in by the host, and an
//! environment overlay computed by an [`EnvSource`].

use std::collections::HashMap;
use std::env;

use log::{debug, warn};
use serde_json::{Map, Value, json};

/// A configuration tree
pub type ConfigMap = Map<String, Value>;

/// Merge `updates` into `base`: nested objects merge key by key, anything else overwrites.
pub fn merge_maps(base: &mut ConfigMap, updates: &ConfigMap) {
    for (key, value) in updates {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge_maps(existing, incoming),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Look up a dotted path such as `run.echo` in a tree.
#[must_use]
pub fn lookup<'a>(map: &'a ConfigMap, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = map.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Anything that can turn the currently merged configuration into an override layer
pub trait EnvSource {
    /// Build the overlay for `merged`; keys absent from the result are left untouched.
    fn overlay(&self, merged: &ConfigMap) -> ConfigMap;
}

/// Overrides existing leaf keys from `PREFIX_KEY_SUBKEY` environment variables.
///
/// Values are cast to the type of the value they replace. Lists and maps can't be overridden.
#[derive(Debug, Clone)]
pub struct PrefixedEnv {
    prefix: String,
    vars: Option<HashMap<String, String>>,
}

impl PrefixedEnv {
    /// Read from the process environment.
    pub fn new(prefix: impl Into<String>) -> Self {
        PrefixedEnv {
            prefix: prefix.into(),
            vars: None,
        }
    }

    /// Read from a fixed set of variables instead of the process environment.
    pub fn with_vars<I, K, V>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        PrefixedEnv {
            prefix: prefix.into(),
            vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        match &self.vars {
            Some(vars) => vars.get(name).cloned(),
            None => env::var(name).ok(),
        }
    }

    fn walk(&self, map: &ConfigMap, path: &mut Vec<String>, out: &mut ConfigMap) {
        for (key, value) in map {
            path.push(key.replace('-', "_").to_uppercase());
            if let Value::Object(children) = value {
                let mut nested = ConfigMap::new();
                self.walk(children, path, &mut nested);
                if !nested.is_empty() {
                    out.insert(key.clone(), Value::Object(nested));
                }
            } else {
                let name = format!("{}_{}", self.prefix, path.join("_"));
                if let Some(raw) = self.var(&name) {
                    match cast_like(value, &raw) {
                        Some(cast) => {
                            debug!("Config override {name}={raw}");
                            out.insert(key.clone(), cast);
                        }
                        None => warn!("Ignoring {name}={raw}: doesn't fit the existing value {value}"),
                    }
                }
            }
            path.pop();
        }
    }
}

impl EnvSource for PrefixedEnv {
    fn overlay(&self, merged: &ConfigMap) -> ConfigMap {
        let mut out = ConfigMap::new();
        self.walk(merged, &mut Vec::new(), &mut out);
        out
    }
}

fn cast_like(existing: &Value, raw: &str) -> Option<Value> {
    match existing {
        Value::Bool(_) => Some(Value::Bool(!matches!(raw, "" | "0" | "false"))),
        Value::Number(n) if n.is_f64() => raw.parse::<f64>().ok().map(Value::from),
        Value::Number(_) => raw.parse::<i64>().ok().map(Value::from),
        Value::String(_) | Value::Null => Some(Value::String(raw.to_string())),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn defaults() -> ConfigMap {
    let mut map = ConfigMap::new();
    map.insert("tasks".to_string(), json!({ "dedupe": true }));
    map.insert("run".to_string(), json!({ "echo": false }));
    map
}

/// The layered configuration carried by an executor across every call it runs
#[derive(Debug, Clone)]
pub struct Config {
    defaults: ConfigMap,
    collection: ConfigMap,
    global: ConfigMap,
    env: ConfigMap,
    merged: ConfigMap,
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        let mut config = Config {
            defaults: defaults(),
            collection: ConfigMap::new(),
            global: ConfigMap::new(),
            env: ConfigMap::new(),
            merged: ConfigMap::new(),
        };
        config.remerge();
        config
    }

    /// A config whose global layer is `global`.
    #[must_use]
    pub fn with_global(global: ConfigMap) -> Self {
        let mut config = Config::new();
        config.set_global(global);
        config
    }

    pub fn set_global(&mut self, global: ConfigMap) {
        self.global = global;
        self.remerge();
    }

    /// Merge `updates` into the global layer.
    pub fn update_global(&mut self, updates: &ConfigMap) {
        merge_maps(&mut self.global, updates);
        self.remerge();
    }

    /// Replace the collection layer, as done before each call.
    pub fn load_collection(&mut self, collection: ConfigMap) {
        self.collection = collection;
        self.remerge();
    }

    /// Recompute the environment overlay against the layers beneath it.
    pub fn load_env(&mut self, source: &dyn EnvSource) {
        self.env.clear();
        self.remerge();
        self.env = source.overlay(&self.merged);
        self.remerge();
    }

    fn remerge(&mut self) {
        let mut merged = self.defaults.clone();
        for layer in [&self.collection, &self.global, &self.env] {
            merge_maps(&mut merged, layer);
        }
        self.merged = merged;
    }

    /// Value at a dotted path in the merged tree.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.merged, path)
    }

    /// Boolean at `path`, or `default` when missing or not a boolean.
    #[must_use]
    pub fn flag(&self, path: &str, default: bool) -> bool {
        self.get(path).and_then(Value::as_bool).unwrap_or(default)
    }

    #[must_use]
    pub fn merged(&self) -> &ConfigMap {
        &self.merged
    }
}
