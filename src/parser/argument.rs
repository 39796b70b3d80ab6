use serde_json::Value;

use crate::parser::ParseError;

/// The type an [`Argument`] casts its raw tokens into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Kind {
    #[default]
    String,
    Integer,
    Boolean,
    List,
    Incrementing,
}

impl Kind {
    /// Infer a kind from the runtime type of a default value.
    ///
    /// Returns `None` for values that don't map onto a command-line type (null, floats, maps).
    #[must_use]
    pub fn of(value: &Value) -> Option<Kind> {
        match value {
            Value::String(_) => Some(Kind::String),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Kind::Integer),
            Value::Bool(_) => Some(Kind::Boolean),
            Value::Array(_) => Some(Kind::List),
            _ => None,
        }
    }

    /// Placeholder shown in help output for kinds that take a value
    pub(crate) fn placeholder(self) -> Option<&'static str> {
        match self {
            Kind::String | Kind::List => Some("STRING"),
            Kind::Integer => Some("INT"),
            Kind::Boolean | Kind::Incrementing => None,
        }
    }
}

/// A single named value slot, addressable as a flag and/or a positional token
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    names: Vec<String>,
    attr_name: Option<String>,
    kind: Kind,
    default: Option<Value>,
    help: Option<String>,
    positional: bool,
    optional: bool,
    value: Option<Value>,
    raw_value: Option<String>,
}

impl Argument {
    /// Create a string-kind argument with a single name and no default.
    pub fn new(name: impl Into<String>) -> Self {
        Argument {
            names: vec![name.into()],
            attr_name: None,
            kind: Kind::String,
            default: None,
            help: None,
            positional: false,
            optional: false,
            value: None,
            raw_value: None,
        }
    }

    /// Create an argument answering to several names; the first is canonical.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::NoNames` if `names` is empty.
    pub fn with_names<I, S>(names: I) -> Result<Self, crate::parser::ContextError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let Some(first) = names.first() else {
            return Err(crate::parser::ContextError::NoNames);
        };
        let mut arg = Argument::new(first.clone());
        arg.names = names;
        Ok(arg)
    }

    #[must_use]
    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self.fill_default();
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self.fill_default();
        self
    }

    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    #[must_use]
    pub fn with_positional(mut self, positional: bool) -> Self {
        self.positional = positional;
        self
    }

    #[must_use]
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    #[must_use]
    pub fn with_attr_name(mut self, attr_name: impl Into<String>) -> Self {
        self.attr_name = Some(attr_name.into());
        self
    }

    // List and incrementing arguments always carry a usable default.
    fn fill_default(&mut self) {
        match self.kind {
            Kind::List if matches!(self.default, None | Some(Value::Null)) => {
                self.default = Some(Value::Array(Vec::new()));
            }
            Kind::Incrementing if matches!(self.default, None | Some(Value::Null)) => {
                self.default = Some(Value::from(0));
            }
            _ => {}
        }
    }

    /// Name used for programmatic binding: the underscored attribute name if any, else the first name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.attr_name.as_deref().unwrap_or(&self.names[0])
    }

    /// Every command-line name, canonical first
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn nicknames(&self) -> &[String] {
        &self.names[1..]
    }

    #[must_use]
    pub fn attr_name(&self) -> Option<&str> {
        self.attr_name.as_deref()
    }

    /// The single-character name, if this argument has one.
    #[must_use]
    pub fn short_flag(&self) -> Option<&str> {
        self.names
            .iter()
            .find(|n| n.chars().count() == 1)
            .map(String::as_str)
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    #[must_use]
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    #[must_use]
    pub fn is_positional(&self) -> bool {
        self.positional
    }

    #[must_use]
    pub fn has_optional_value(&self) -> bool {
        self.optional
    }

    /// Whether a flag occurrence consumes a value token
    #[must_use]
    pub fn takes_value(&self) -> bool {
        !matches!(self.kind, Kind::Boolean | Kind::Incrementing)
    }

    /// The bound value, falling back to the default.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref().or(self.default.as_ref())
    }

    /// The last raw token given for this argument, if any
    #[must_use]
    pub fn raw_value(&self) -> Option<&str> {
        self.raw_value.as_deref()
    }

    /// Whether the parser bound anything to this argument.
    #[must_use]
    pub fn got_value(&self) -> bool {
        match (&self.kind, &self.value) {
            (Kind::List, Some(Value::Array(items))) => !items.is_empty(),
            (_, value) => value.is_some(),
        }
    }

    /// Whether this slot still lacks a usable value
    pub(crate) fn is_missing(&self) -> bool {
        matches!(self.value(), None | Some(Value::Null))
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.value.is_some()
    }

    /// Bind a raw token, casting it to this argument's kind.
    ///
    /// List arguments append; incrementing arguments count up by one.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::InvalidInteger` for an integer argument given a non-numeric token,
    /// and `ParseError::NoValueExpected` for boolean arguments.
    pub fn set_value(&mut self, raw: &str) -> Result<(), ParseError> {
        let value = match self.kind {
            Kind::String => Value::String(raw.to_string()),
            Kind::Integer => {
                let parsed: i64 = raw.parse().map_err(|_| ParseError::InvalidInteger {
                    flag: self.name().to_string(),
                    value: raw.to_string(),
                })?;
                Value::from(parsed)
            }
            Kind::List => {
                let mut items = self.current_items();
                items.push(Value::String(raw.to_string()));
                Value::Array(items)
            }
            Kind::Incrementing => self.incremented(),
            Kind::Boolean => {
                return Err(ParseError::NoValueExpected {
                    flag: self.name().to_string(),
                    value: raw.to_string(),
                });
            }
        };
        self.raw_value = Some(raw.to_string());
        self.value = Some(value);
        Ok(())
    }

    /// Record a bare flag occurrence.
    ///
    /// Booleans take `on`, incrementing arguments count up, and anything else (an optional-value
    /// flag seen without a value) is stored as an uncast `true`.
    pub fn set_flag(&mut self, on: bool) {
        let value = match self.kind {
            Kind::Incrementing => self.incremented(),
            Kind::Boolean => Value::Bool(on),
            _ => Value::Bool(true),
        };
        self.raw_value = Some(value.to_string());
        self.value = Some(value);
    }

    fn current_items(&self) -> Vec<Value> {
        match self.value() {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    fn incremented(&self) -> Value {
        let current = match self.value() {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(Value::Bool(true)) => 1,
            _ => 0,
        };
        Value::from(current + 1)
    }
}

/// Render an argument name as a flag: `-x` for single characters, `--name` otherwise.
#[must_use]
pub fn to_flag(name: &str) -> String {
    if name.chars().count() == 1 {
        format!("-{name}")
    } else {
        format!("--{name}")
    }
}

/// Replace interior underscores with dashes, keeping leading and trailing ones.
#[must_use]
pub fn translate_underscores(name: &str) -> String {
    let trimmed_start = name.len() - name.trim_start_matches('_').len();
    let trimmed_end = name.trim_end_matches('_').len();
    if trimmed_start >= trimmed_end {
        return name.to_string();
    }
    format!(
        "{}{}{}",
        &name[..trimmed_start],
        name[trimmed_start..trimmed_end].replace('_', "-"),
        &name[trimmed_end..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_and_incrementing_defaults_are_filled() {
        let list = Argument::new("items").with_kind(Kind::List);
        assert_eq!(list.default(), Some(&json!([])));
        let counter = Argument::new("verbose").with_kind(Kind::Incrementing);
        assert_eq!(counter.default(), Some(&json!(0)));
        let explicit = Argument::new("items").with_default(json!(["a"])).with_kind(Kind::List);
        assert_eq!(explicit.default(), Some(&json!(["a"])));
    }

    #[test]
    fn test_name_prefers_attr_name() {
        let arg = Argument::with_names(["dry-run", "d"])
            .unwrap()
            .with_attr_name("dry_run");
        assert_eq!(arg.name(), "dry_run");
        assert_eq!(arg.nicknames(), ["d".to_string()]);
        assert_eq!(arg.short_flag(), Some("d"));
    }

    #[test]
    fn test_with_names_requires_a_name() {
        let names: Vec<String> = Vec::new();
        assert!(Argument::with_names(names).is_err());
    }

    #[test]
    fn test_set_value_casts_by_kind() {
        let mut count = Argument::new("count").with_kind(Kind::Integer);
        count.set_value("42").unwrap();
        assert_eq!(count.value(), Some(&json!(42)));
        assert!(matches!(
            count.set_value("many"),
            Err(ParseError::InvalidInteger { .. })
        ));

        let mut items = Argument::new("items").with_kind(Kind::List);
        items.set_value("a").unwrap();
        items.set_value("b").unwrap();
        assert_eq!(items.value(), Some(&json!(["a", "b"])));
        assert!(items.got_value());
    }

    #[test]
    fn test_incrementing_counts_each_occurrence() {
        let mut verbose = Argument::new("verbose").with_kind(Kind::Incrementing);
        assert_eq!(verbose.value(), Some(&json!(0)));
        verbose.set_flag(true);
        verbose.set_flag(true);
        assert_eq!(verbose.value(), Some(&json!(2)));
    }

    #[test]
    fn test_boolean_rejects_values() {
        let mut flag = Argument::new("force").with_kind(Kind::Boolean);
        assert!(matches!(
            flag.set_value("yes"),
            Err(ParseError::NoValueExpected { .. })
        ));
        flag.set_flag(true);
        assert_eq!(flag.value(), Some(&json!(true)));
    }

    #[test]
    fn test_translate_underscores() {
        assert_eq!(translate_underscores("dry_run_mode"), "dry-run-mode");
        assert_eq!(translate_underscores("_private_thing_"), "_private-thing_");
        assert_eq!(translate_underscores("___"), "___");
        assert_eq!(translate_underscores("plain"), "plain");
    }

    #[test]
    fn test_to_flag() {
        assert_eq!(to_flag("v"), "-v");
        assert_eq!(to_flag("verbose"), "--verbose");
    }
}
