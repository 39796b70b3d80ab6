use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::parser::ContextError;
use crate::parser::argument::{Argument, Kind, to_flag};

/// The parser-facing view of one task: its name, aliases and argument surface.
///
/// Every alternate name of an argument (nicknames, the underscored attribute name) resolves to
/// the same underlying slot, so a value bound through one name is visible through all of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParserContext {
    name: String,
    aliases: Vec<String>,
    args: Vec<Argument>,
    by_name: BTreeMap<String, usize>,
    flags: BTreeMap<String, usize>,
    inverse_flags: BTreeMap<String, String>,
    positional: Vec<usize>,
}

impl ParserContext {
    pub fn new(name: impl Into<String>) -> Self {
        ParserContext {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Build a context from a name, its aliases and an argument list.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::Redefinition` if two arguments share a name.
    pub fn with_args<I>(
        name: impl Into<String>,
        aliases: Vec<String>,
        args: I,
    ) -> Result<Self, ContextError>
    where
        I: IntoIterator<Item = Argument>,
    {
        let mut context = ParserContext::new(name);
        context.aliases = aliases;
        for arg in args {
            context.add_arg(arg)?;
        }
        Ok(context)
    }

    /// Register an argument under all of its names and flag spellings.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::Redefinition` if any of the argument's names is already taken.
    pub fn add_arg(&mut self, arg: Argument) -> Result<(), ContextError> {
        for name in arg.names() {
            if self.by_name.contains_key(name) {
                return Err(ContextError::Redefinition {
                    context: self.name.clone(),
                    name: name.clone(),
                });
            }
        }
        let index = self.args.len();
        let main = arg.names()[0].clone();
        for name in arg.names() {
            self.by_name.insert(name.clone(), index);
            self.flags.insert(to_flag(name), index);
        }
        if let Some(attr) = arg.attr_name() {
            self.by_name.insert(attr.to_string(), index);
        }
        if arg.is_positional() {
            self.positional.push(index);
        }
        if arg.kind() == Kind::Boolean && arg.default() == Some(&Value::Bool(true)) {
            self.inverse_flags
                .insert(to_flag(&format!("no-{main}")), to_flag(&main));
        }
        self.args.push(arg);
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Arguments in the order they were added
    pub fn args(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter()
    }

    /// Look up an argument by any of its names or its attribute name.
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&Argument> {
        self.by_name.get(name).map(|&i| &self.args[i])
    }

    /// Look up an argument by flag spelling (`--name` or `-n`).
    #[must_use]
    pub fn flag(&self, flag: &str) -> Option<&Argument> {
        self.flags.get(flag).map(|&i| &self.args[i])
    }

    pub(crate) fn flag_index(&self, flag: &str) -> Option<usize> {
        self.flags.get(flag).copied()
    }

    pub(crate) fn inverse_flag_index(&self, flag: &str) -> Option<usize> {
        self.inverse_flags
            .get(flag)
            .and_then(|target| self.flag_index(target))
    }

    pub(crate) fn arg_at(&self, index: usize) -> &Argument {
        &self.args[index]
    }

    pub(crate) fn arg_at_mut(&mut self, index: usize) -> &mut Argument {
        &mut self.args[index]
    }

    /// Positional arguments in declaration order
    pub fn positional_args(&self) -> impl Iterator<Item = &Argument> {
        self.positional.iter().map(|&i| &self.args[i])
    }

    /// Positional arguments that are still without a value.
    #[must_use]
    pub fn missing_positional_args(&self) -> Vec<&Argument> {
        self.positional_args().filter(|a| a.is_missing()).collect()
    }

    pub(crate) fn next_unbound_positional(&self) -> Option<usize> {
        self.positional
            .iter()
            .copied()
            .find(|&i| !self.args[i].is_bound())
    }

    /// Every argument's effective value keyed by its binding name; unset values are null.
    #[must_use]
    pub fn as_kwargs(&self) -> Map<String, Value> {
        self.args
            .iter()
            .map(|a| (a.name().to_string(), a.value().cloned().unwrap_or(Value::Null)))
            .collect()
    }

    /// All flag spellings that resolve to the same argument as `flag`
    fn names_for(&self, flag: &str) -> Vec<&str> {
        let Some(&index) = self.flags.get(flag) else {
            return Vec::new();
        };
        self.flags
            .iter()
            .filter(|&(_, &i)| i == index)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Usage fragment and help text for a flag, e.g. `("-m STRING, --myarg=STRING", "...")`.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::UnknownFlag` if `flag` isn't valid for this context.
    pub fn help_for(&self, flag: &str) -> Result<(String, String), ContextError> {
        let arg = self.flag(flag).ok_or_else(|| ContextError::UnknownFlag {
            context: self.name.clone(),
            flag: flag.to_string(),
        })?;
        let placeholder = arg.kind().placeholder();
        let mut full_names: Vec<String> = self
            .names_for(flag)
            .into_iter()
            .map(|name| {
                let short = name.trim_start_matches('-').chars().count() == 1;
                match (placeholder, short) {
                    (Some(value), true) if arg.has_optional_value() => {
                        format!("{name} [{value}]")
                    }
                    (Some(value), true) => format!("{name} {value}"),
                    (Some(value), false) if arg.has_optional_value() => {
                        format!("{name}[={value}]")
                    }
                    (Some(value), false) => format!("{name}={value}"),
                    (None, _) if self.inverse_flags.values().any(|v| v == name) => {
                        format!("--[no-]{}", &name[2..])
                    }
                    (None, _) => name.to_string(),
                }
            })
            .collect();
        full_names.sort_by_key(String::len);
        Ok((
            full_names.join(", "),
            arg.help().unwrap_or_default().to_string(),
        ))
    }

    /// Help pairs for every argument: long-named arguments first, then single-character ones,
    /// each group alphabetical (case-insensitive, lowercase before uppercase on ties).
    #[must_use]
    pub fn help_tuples(&self) -> Vec<(String, String)> {
        self.sorted_args()
            .into_iter()
            .filter_map(|arg| self.help_for(&to_flag(&arg.names()[0])).ok())
            .collect()
    }

    /// Every flag spelling, in help order, followed by the inverse (`--no-*`) spellings.
    #[must_use]
    pub fn flag_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sorted_args()
            .into_iter()
            .flat_map(|arg| {
                let mut spellings: Vec<String> = arg.names().iter().map(|n| to_flag(n)).collect();
                spellings.sort_by_key(String::len);
                spellings
            })
            .collect();
        names.extend(self.inverse_flags.keys().cloned());
        names
    }

    fn sorted_args(&self) -> Vec<&Argument> {
        let mut args: Vec<&Argument> = self.args.iter().collect();
        args.sort_by_key(|arg| flag_key(arg.short_flag().unwrap_or(&arg.names()[0])));
        args
    }
}

/// Sort key for flags: multi-character names first, then case-insensitive text, then
/// case-inverted text so lowercase sorts ahead of uppercase.
fn flag_key(name: &str) -> (bool, String, String) {
    let inverted = name
        .chars()
        .map(|c| {
            if c.is_uppercase() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                c.to_uppercase().next().unwrap_or(c)
            }
        })
        .collect();
    (name.chars().count() == 1, name.to_lowercase(), inverted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Kind;
    use serde_json::json;

    fn make_context(args: Vec<Argument>) -> ParserContext {
        ParserContext::with_args("mytask", vec![], args).unwrap()
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut context = make_context(vec![Argument::new("foo")]);
        let result = context.add_arg(Argument::with_names(["bar", "foo"]).unwrap());
        match result {
            Err(ContextError::Redefinition { name, .. }) => assert_eq!(name, "foo"),
            other => panic!("Expected Redefinition, got: {other:?}"),
        }
    }

    #[test]
    fn test_alternate_names_share_one_slot() {
        let context = make_context(vec![
            Argument::with_names(["dry-run", "d"])
                .unwrap()
                .with_attr_name("dry_run")
                .with_default(json!("x")),
        ]);
        let by_attr = context.arg("dry_run").unwrap();
        let by_short = context.arg("d").unwrap();
        assert!(std::ptr::eq(by_attr, by_short));
        assert!(context.flag("--dry-run").is_some());
        assert!(context.flag("--dry_run").is_none());
    }

    #[test]
    fn test_inverse_flag_only_for_true_booleans() {
        let context = make_context(vec![
            Argument::new("color")
                .with_kind(Kind::Boolean)
                .with_default(true),
            Argument::new("force")
                .with_kind(Kind::Boolean)
                .with_default(false),
        ]);
        assert!(context.inverse_flag_index("--no-color").is_some());
        assert!(context.inverse_flag_index("--no-force").is_none());
    }

    #[test]
    fn test_help_for_short_and_long() {
        let context = make_context(vec![
            Argument::with_names(["myarg", "m"])
                .unwrap()
                .with_help("my help"),
            Argument::new("longarg"),
            Argument::with_names(["val", "p"])
                .unwrap()
                .with_optional(true),
            Argument::new("color")
                .with_kind(Kind::Boolean)
                .with_default(true),
            Argument::new("count").with_kind(Kind::Integer),
        ]);
        assert_eq!(
            context.help_for("--myarg").unwrap(),
            ("-m STRING, --myarg=STRING".to_string(), "my help".to_string())
        );
        assert_eq!(
            context.help_for("-m").unwrap().0,
            "-m STRING, --myarg=STRING"
        );
        assert_eq!(context.help_for("--longarg").unwrap().0, "--longarg=STRING");
        assert_eq!(
            context.help_for("--val").unwrap().0,
            "-p [STRING], --val[=STRING]"
        );
        assert_eq!(context.help_for("--color").unwrap().0, "--[no-]color");
        assert_eq!(context.help_for("--count").unwrap().0, "--count=INT");
        assert!(matches!(
            context.help_for("--nope"),
            Err(ContextError::UnknownFlag { .. })
        ));
    }

    #[test]
    fn test_help_tuples_order() {
        let context = make_context(vec![
            Argument::new("b").with_kind(Kind::Boolean),
            Argument::new("B").with_kind(Kind::Boolean),
            Argument::new("zeta").with_kind(Kind::Boolean),
            Argument::new("a").with_kind(Kind::Boolean),
            Argument::new("Alpha").with_kind(Kind::Boolean),
        ]);
        let rendered: Vec<String> = context.help_tuples().into_iter().map(|(n, _)| n).collect();
        insta::assert_snapshot!(rendered.join("\n"), @r"
        --Alpha
        --zeta
        -a
        -b
        -B
        ");
    }

    #[test]
    fn test_help_tuples_group_short_flagged_args_after_long_only() {
        let context = make_context(vec![
            Argument::new("c").with_kind(Kind::Boolean),
            Argument::with_names(["aardvark", "a"]).unwrap().with_kind(Kind::Boolean),
            Argument::with_names(["bah", "b"]).unwrap().with_kind(Kind::Boolean),
            Argument::new("beta").with_kind(Kind::Boolean),
            Argument::new("alpha").with_kind(Kind::Boolean),
        ]);
        let rendered: Vec<String> = context.help_tuples().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            rendered,
            vec!["--alpha", "--beta", "-a, --aardvark", "-b, --bah", "-c"]
        );
    }

    #[test]
    fn test_as_kwargs_uses_binding_names() {
        let mut context = make_context(vec![
            Argument::new("dry-run")
                .with_attr_name("dry_run")
                .with_kind(Kind::Boolean)
                .with_default(false),
            Argument::new("target").with_positional(true),
        ]);
        let index = context.flag_index("--dry-run").unwrap();
        context.arg_at_mut(index).set_flag(true);
        let kwargs = context.as_kwargs();
        assert_eq!(kwargs.get("dry_run"), Some(&json!(true)));
        assert_eq!(kwargs.get("target"), Some(&Value::Null));
        assert_eq!(context.missing_positional_args().len(), 1);
    }

    #[test]
    fn test_flag_names_include_inverse() {
        let context = make_context(vec![
            Argument::with_names(["color", "c"])
                .unwrap()
                .with_kind(Kind::Boolean)
                .with_default(true),
        ]);
        assert_eq!(context.flag_names(), vec!["-c", "--color", "--no-color"]);
    }
}
