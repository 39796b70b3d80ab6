//! Command-line parsing against task argument specifications
//!
//! A [`Parser`] knows a set of [`ParserContext`]s, one per invocable task. It walks a flat token
//! list once, switching context whenever a task name appears and binding flags and positional
//! tokens to the current context's [`Argument`]s. The output is one bound context per task
//! invocation, in command-line order.

use std::collections::{BTreeMap, VecDeque};

use log::debug;
use thiserror::Error;

pub mod argument;
pub mod context;

pub use argument::{Argument, Kind, to_flag, translate_underscores};
pub use context::ParserContext;

/// Errors raised while defining contexts and arguments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("An argument must have at least one name")]
    NoNames,
    #[error("Tried to add an argument named '{name}' to '{context}' but one already exists")]
    Redefinition { context: String, name: String },
    #[error("'{flag}' is not a valid flag for '{context}'")]
    UnknownFlag { context: String, flag: String },
    #[error("A context named or aliased '{0}' is already in this parser")]
    DuplicateContext(String),
    #[error("Parser contexts must have names")]
    UnnamedContext,
}

/// Errors raised while binding command-line tokens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Flag '{0}' needed a value and was not given one")]
    MissingValue(String),
    #[error("Flag '{flag}' doesn't take a value (got '{value}')")]
    NoValueExpected { flag: String, value: String },
    #[error("Value '{value}' for '{flag}' is not an integer")]
    InvalidInteger { flag: String, value: String },
    #[error("Unknown flag '{flag}'{}", context_suffix(.context.as_deref()))]
    UnknownFlag {
        flag: String,
        context: Option<String>,
    },
    #[error("No idea what '{token}' is{}", context_suffix(.context.as_deref()))]
    UnexpectedToken {
        token: String,
        context: Option<String>,
    },
}

fn context_suffix(context: Option<&str>) -> String {
    context.map_or_else(String::new, |name| format!(" (in task '{name}')"))
}

/// Bound contexts in command-line order, plus any tokens the parser set aside.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    contexts: Vec<ParserContext>,
    /// Tokens from the first unrecognized one onward, when parsing with `ignore_unknown`
    pub unparsed: Vec<String>,
    /// Tokens following a bare `--`
    pub remainder: Vec<String>,
}

impl ParseResult {
    #[must_use]
    pub fn contexts(&self) -> &[ParserContext] {
        &self.contexts
    }

    #[must_use]
    pub fn into_contexts(self) -> Vec<ParserContext> {
        self.contexts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ParserContext> {
        self.contexts.get(index)
    }
}

impl IntoIterator for ParseResult {
    type Item = ParserContext;
    type IntoIter = std::vec::IntoIter<ParserContext>;

    fn into_iter(self) -> Self::IntoIter {
        self.contexts.into_iter()
    }
}

/// Tokenizes a flat argument list into per-task bound contexts
#[derive(Debug, Clone, Default)]
pub struct Parser {
    contexts: Vec<ParserContext>,
    names: BTreeMap<String, usize>,
    ignore_unknown: bool,
}

impl Parser {
    /// Create a parser over the given contexts.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::DuplicateContext` if two contexts share a name or alias, and
    /// `ContextError::UnnamedContext` for a context with an empty name.
    pub fn new<I>(contexts: I) -> Result<Self, ContextError>
    where
        I: IntoIterator<Item = ParserContext>,
    {
        let mut parser = Parser::default();
        for context in contexts {
            if context.name().is_empty() {
                return Err(ContextError::UnnamedContext);
            }
            let index = parser.contexts.len();
            for name in std::iter::once(context.name()).chain(context.aliases().iter().map(String::as_str)) {
                if parser.names.insert(name.to_string(), index).is_some() {
                    return Err(ContextError::DuplicateContext(name.to_string()));
                }
            }
            parser.contexts.push(context);
        }
        Ok(parser)
    }

    /// Store unknown tokens (and everything after them) instead of failing.
    #[must_use]
    pub fn ignore_unknown(mut self, ignore: bool) -> Self {
        self.ignore_unknown = ignore;
        self
    }

    #[must_use]
    pub fn contexts(&self) -> &[ParserContext] {
        &self.contexts
    }

    /// Find a context by name or alias
    #[must_use]
    pub fn context(&self, name: &str) -> Option<&ParserContext> {
        self.names.get(name).map(|&i| &self.contexts[i])
    }

    /// Bind `argv` against the known contexts.
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` for unknown flags, flags missing their value, values given to
    /// boolean flags, invalid integers, and tokens that have no positional slot to fill.
    pub fn parse_argv<I, S>(&self, argv: I) -> Result<ParseResult, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tokens: VecDeque<String> = argv.into_iter().map(Into::into).collect();
        let mut machine = ParseMachine::new(self);
        while let Some(token) = tokens.pop_front() {
            debug!("Handling arg: {token:?}");
            if machine.unknown {
                machine.result.unparsed.push(token);
                continue;
            }
            if token == "--" && !machine.waiting_for_flag_value() {
                machine.result.remainder = tokens.drain(..).collect();
                break;
            }
            if machine.waiting_for_flag_value() {
                debug!("Waiting for a flag value; handling {token:?} unsplit");
                machine.handle(token)?;
                continue;
            }
            let (arg, mutations) = machine.split_token(&token)?;
            for mutation in mutations.into_iter().rev() {
                tokens.push_front(mutation);
            }
            machine.handle(arg)?;
        }
        machine.finish()?;
        Ok(machine.result)
    }
}

fn is_flag(token: &str) -> bool {
    token.starts_with('-') && token.len() > 1
}

fn is_long_flag(token: &str) -> bool {
    token.starts_with("--")
}

/// Per-parse state: the context being filled and the flag awaiting a value
struct ParseMachine<'p> {
    parser: &'p Parser,
    context: Option<ParserContext>,
    flag: Option<usize>,
    unknown: bool,
    result: ParseResult,
}

impl<'p> ParseMachine<'p> {
    fn new(parser: &'p Parser) -> Self {
        ParseMachine {
            parser,
            context: None,
            flag: None,
            unknown: false,
            result: ParseResult::default(),
        }
    }

    fn current_flag(&self) -> Option<&Argument> {
        let index = self.flag?;
        self.context.as_ref().map(|c| c.arg_at(index))
    }

    /// A value-taking flag was seen and hasn't received its value yet
    fn waiting_for_flag_value(&self) -> bool {
        self.flag.is_some()
    }

    /// Split `--flag=value`, `-fvalue` and `-abc` forms into a head token and follow-ups.
    fn split_token(&self, token: &str) -> Result<(String, Vec<String>), ParseError> {
        if !is_flag(token) {
            return Ok((token.to_string(), Vec::new()));
        }
        let known = |flag: &str| self.context.as_ref().and_then(|c| c.flag(flag));
        if let Some((flag, value)) = token.split_once('=') {
            debug!("Splitting x=y expr {token:?} into {flag:?} and {value:?}");
            if known(flag).is_some_and(|arg| !arg.takes_value()) {
                return Err(ParseError::NoValueExpected {
                    flag: flag.to_string(),
                    value: value.to_string(),
                });
            }
            return Ok((flag.to_string(), vec![value.to_string()]));
        }
        if is_long_flag(token) {
            return Ok((token.to_string(), Vec::new()));
        }
        let Some((split, _)) = token.char_indices().nth(2) else {
            return Ok((token.to_string(), Vec::new()));
        };
        let (head, rest) = token.split_at(split);
        if known(head).is_some_and(Argument::takes_value) {
            debug!("{head:?} takes a value, giving it {rest:?}");
            Ok((head.to_string(), vec![rest.to_string()]))
        } else {
            let rest: Vec<String> = rest.chars().map(|c| format!("-{c}")).collect();
            debug!("Splitting multi-flag glob {token:?} into {head:?} and {rest:?}");
            Ok((head.to_string(), rest))
        }
    }

    fn handle(&mut self, token: String) -> Result<(), ParseError> {
        let flag_index = self.context.as_ref().and_then(|c| c.flag_index(&token));
        let inverse_index = self
            .context
            .as_ref()
            .and_then(|c| c.inverse_flag_index(&token));

        if let Some(index) = flag_index {
            debug!("Saw flag {token:?}");
            self.switch_to_flag(index, false)
        } else if let Some(index) = inverse_index {
            debug!("Saw inverse flag {token:?}");
            self.switch_to_flag(index, true)
        } else if self.waiting_for_flag_value() {
            let optional = self.current_flag().is_some_and(Argument::has_optional_value);
            if optional && self.parser.context(&token).is_some() {
                debug!("{token:?} names a task; closing optional-value flag as a switch");
                self.see_context(&token)
            } else {
                debug!("We're waiting for a flag value so {token:?} must be it");
                self.see_value(&token)
            }
        } else if is_flag(&token) {
            self.see_unknown(token, true)
        } else if self.parser.context(&token).is_some() {
            self.see_context(&token)
        } else if let Some(index) = self.context.as_ref().and_then(ParserContext::next_unbound_positional) {
            debug!("Binding {token:?} as a positional argument");
            self.see_positional(index, &token)
        } else {
            self.see_unknown(token, false)
        }
    }

    fn see_unknown(&mut self, token: String, flag: bool) -> Result<(), ParseError> {
        if self.parser.ignore_unknown {
            debug!("Storing unknown token {token:?}");
            self.unknown = true;
            self.result.unparsed.push(token);
            return Ok(());
        }
        let context = self.context.as_ref().map(|c| c.name().to_string());
        if flag {
            Err(ParseError::UnknownFlag {
                flag: token,
                context,
            })
        } else {
            Err(ParseError::UnexpectedToken { token, context })
        }
    }

    fn switch_to_flag(&mut self, index: usize, inverse: bool) -> Result<(), ParseError> {
        self.complete_flag()?;
        let Some(context) = self.context.as_mut() else {
            return Ok(());
        };
        let arg = context.arg_at_mut(index);
        debug!("Moving to flag {:?}", arg.name());
        if !arg.takes_value() {
            debug!("Marking seen flag {:?} as {}", arg.name(), !inverse);
            arg.set_flag(!inverse);
            return Ok(());
        }
        self.flag = Some(index);
        Ok(())
    }

    fn see_value(&mut self, value: &str) -> Result<(), ParseError> {
        let (Some(index), Some(context)) = (self.flag, self.context.as_mut()) else {
            return Ok(());
        };
        let arg = context.arg_at_mut(index);
        debug!("Setting flag {:?} to value {value:?}", arg.name());
        arg.set_value(value)?;
        self.flag = None;
        Ok(())
    }

    fn see_positional(&mut self, index: usize, value: &str) -> Result<(), ParseError> {
        match self.context.as_mut() {
            Some(context) => context.arg_at_mut(index).set_value(value),
            None => Ok(()),
        }
    }

    fn see_context(&mut self, name: &str) -> Result<(), ParseError> {
        self.complete_flag()?;
        self.complete_context();
        self.context = self.parser.context(name).cloned();
        debug!("Moving to context {name:?}");
        Ok(())
    }

    /// Tie off the open flag: error if it needed a value, or mark an optional-value flag as seen.
    fn complete_flag(&mut self) -> Result<(), ParseError> {
        let (Some(index), Some(context)) = (self.flag.take(), self.context.as_mut()) else {
            return Ok(());
        };
        let arg = context.arg_at_mut(index);
        if arg.has_optional_value() {
            debug!("Saw optional flag {:?} go by w/ no value; setting to true", arg.name());
            arg.set_flag(true);
            Ok(())
        } else {
            Err(ParseError::MissingValue(to_flag(&arg.names()[0])))
        }
    }

    fn complete_context(&mut self) {
        if let Some(context) = self.context.take() {
            debug!("Wrapping up context {:?}", context.name());
            self.result.contexts.push(context);
        }
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        self.complete_flag()?;
        self.complete_context();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn make_context(name: &str, args: Vec<Argument>) -> ParserContext {
        ParserContext::with_args(name, vec![], args).unwrap()
    }

    fn value_of(result: &ParseResult, index: usize, name: &str) -> Option<Value> {
        result.get(index)?.arg(name)?.value().cloned()
    }

    #[test]
    fn test_task_names_switch_contexts() {
        let parser = Parser::new([
            make_context("build", vec![Argument::new("target").with_positional(true)]),
            make_context("test", vec![]),
        ])
        .unwrap();
        let result = parser.parse_argv(["build", "app", "test"]).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.get(0).unwrap().name(), "build");
        assert_eq!(value_of(&result, 0, "target"), Some(json!("app")));
        assert_eq!(result.get(1).unwrap().name(), "test");
    }

    #[test]
    fn test_aliases_resolve_to_context() {
        let parser = Parser::new([ParserContext::with_args(
            "build",
            vec!["b".to_string()],
            vec![],
        )
        .unwrap()])
        .unwrap();
        let result = parser.parse_argv(["b"]).unwrap();
        assert_eq!(result.get(0).unwrap().name(), "build");
    }

    #[test]
    fn test_duplicate_context_names_rejected() {
        let result = Parser::new([make_context("a", vec![]), make_context("a", vec![])]);
        assert_eq!(
            result.unwrap_err(),
            ContextError::DuplicateContext("a".to_string())
        );
    }

    #[test]
    fn test_flag_value_forms() {
        let make_parser = || {
            Parser::new([make_context(
                "run",
                vec![Argument::with_names(["name", "n"]).unwrap()],
            )])
            .unwrap()
        };
        for argv in [
            vec!["run", "--name=val"],
            vec!["run", "--name", "val"],
            vec!["run", "-n=val"],
            vec!["run", "-nval"],
            vec!["run", "-n", "val"],
        ] {
            let result = make_parser().parse_argv(argv.clone()).unwrap();
            assert_eq!(value_of(&result, 0, "name"), Some(json!("val")), "{argv:?}");
        }
    }

    #[test]
    fn test_clustered_short_booleans() {
        let parser = Parser::new([make_context(
            "run",
            vec![
                Argument::new("a").with_kind(Kind::Boolean).with_default(false),
                Argument::new("b").with_kind(Kind::Boolean).with_default(false),
                Argument::new("c").with_kind(Kind::Boolean).with_default(false),
            ],
        )])
        .unwrap();
        let result = parser.parse_argv(["run", "-abc"]).unwrap();
        for name in ["a", "b", "c"] {
            assert_eq!(value_of(&result, 0, name), Some(json!(true)));
        }
    }

    #[test]
    fn test_inverse_boolean_flags() {
        let make_parser = || {
            Parser::new([make_context(
                "run",
                vec![Argument::new("color").with_kind(Kind::Boolean).with_default(true)],
            )])
            .unwrap()
        };
        let result = make_parser().parse_argv(["run", "--no-color"]).unwrap();
        assert_eq!(value_of(&result, 0, "color"), Some(json!(false)));
        let result = make_parser().parse_argv(["run", "--color"]).unwrap();
        assert_eq!(value_of(&result, 0, "color"), Some(json!(true)));
    }

    #[test]
    fn test_open_flag_swallows_task_name() {
        let parser = Parser::new([
            make_context("run", vec![Argument::new("s")]),
            make_context("value", vec![]),
        ])
        .unwrap();
        let result = parser.parse_argv(["run", "-s", "value"]).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(value_of(&result, 0, "s"), Some(json!("value")));

        let result = parser.parse_argv(["run", "-s", "value", "value"]).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(value_of(&result, 0, "s"), Some(json!("value")));
        assert_eq!(result.get(1).unwrap().name(), "value");
    }

    #[test]
    fn test_optional_value_flag() {
        let make_parser = || {
            Parser::new([
                make_context(
                    "run",
                    vec![Argument::new("log").with_optional(true), Argument::new("force").with_kind(Kind::Boolean)],
                ),
                make_context("other", vec![]),
            ])
            .unwrap()
        };
        let result = make_parser().parse_argv(["run", "--log", "out.txt"]).unwrap();
        assert_eq!(value_of(&result, 0, "log"), Some(json!("out.txt")));

        let result = make_parser().parse_argv(["run", "--log"]).unwrap();
        assert_eq!(value_of(&result, 0, "log"), Some(json!(true)));

        let result = make_parser().parse_argv(["run", "--log", "--force"]).unwrap();
        assert_eq!(value_of(&result, 0, "log"), Some(json!(true)));
        assert_eq!(value_of(&result, 0, "force"), Some(json!(true)));

        let result = make_parser().parse_argv(["run", "--log", "other"]).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(value_of(&result, 0, "log"), Some(json!(true)));
    }

    #[test]
    fn test_list_flags_accumulate() {
        let parser = Parser::new([make_context(
            "run",
            vec![Argument::new("items").with_kind(Kind::List)],
        )])
        .unwrap();
        let result = parser
            .parse_argv(["run", "--items", "a", "--items", "b"])
            .unwrap();
        assert_eq!(value_of(&result, 0, "items"), Some(json!(["a", "b"])));
    }

    #[test]
    fn test_incrementing_flags_count() {
        let make_parser = || {
            Parser::new([make_context(
                "run",
                vec![Argument::with_names(["verbose", "v"]).unwrap().with_kind(Kind::Incrementing)],
            )])
            .unwrap()
        };
        let cases: [(&[&str], i64); 5] = [
            (&["run"], 0),
            (&["run", "--verbose"], 1),
            (&["run", "--verbose", "--verbose", "--verbose"], 3),
            (&["run", "-vvv"], 3),
            (&["run", "-v", "-v"], 2),
        ];
        for (argv, expected) in cases {
            let result = make_parser().parse_argv(argv.iter().copied()).unwrap();
            assert_eq!(value_of(&result, 0, "verbose"), Some(json!(expected)), "{argv:?}");
        }
    }

    #[test]
    fn test_dashed_flag_binds_underscored_name() {
        let parser = Parser::new([make_context(
            "deploy",
            vec![Argument::new("dry-run").with_attr_name("dry_run")],
        )])
        .unwrap();
        let result = parser.parse_argv(["deploy", "--dry-run", "yes"]).unwrap();
        let kwargs = result.get(0).unwrap().as_kwargs();
        assert_eq!(kwargs.get("dry_run"), Some(&json!("yes")));
    }

    #[test]
    fn test_missing_positionals_are_reported_not_raised() {
        let parser = Parser::new([make_context(
            "build",
            vec![
                Argument::new("target").with_positional(true),
                Argument::new("profile").with_positional(true),
            ],
        )])
        .unwrap();
        let result = parser.parse_argv(["build", "app"]).unwrap();
        let missing: Vec<&str> = result
            .get(0)
            .unwrap()
            .missing_positional_args()
            .into_iter()
            .map(Argument::name)
            .collect();
        assert_eq!(missing, vec!["profile"]);
    }

    #[test]
    fn test_errors() {
        let parser = Parser::new([make_context(
            "run",
            vec![
                Argument::new("name"),
                Argument::new("count").with_kind(Kind::Integer),
                Argument::new("force").with_kind(Kind::Boolean),
            ],
        )])
        .unwrap();
        assert_eq!(
            parser.parse_argv(["run", "--name"]).unwrap_err(),
            ParseError::MissingValue("--name".to_string())
        );
        assert!(matches!(
            parser.parse_argv(["run", "--bogus"]),
            Err(ParseError::UnknownFlag { .. })
        ));
        assert!(matches!(
            parser.parse_argv(["run", "stray"]),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parser.parse_argv(["run", "--count", "x"]),
            Err(ParseError::InvalidInteger { .. })
        ));
        assert!(matches!(
            parser.parse_argv(["run", "--force=yes"]),
            Err(ParseError::NoValueExpected { .. })
        ));
    }

    #[test]
    fn test_ignore_unknown_and_remainder() {
        let parser = Parser::new([make_context("run", vec![])])
            .unwrap()
            .ignore_unknown(true);
        let result = parser.parse_argv(["run", "what", "run"]).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.unparsed, vec!["what", "run"]);

        let parser = Parser::new([make_context("run", vec![])]).unwrap();
        let result = parser.parse_argv(["run", "--", "-x", "y"]).unwrap();
        assert_eq!(result.remainder, vec!["-x", "y"]);
    }

    #[test]
    fn test_repeated_task_yields_fresh_contexts() {
        let parser = Parser::new([make_context(
            "echo",
            vec![Argument::new("word").with_positional(true)],
        )])
        .unwrap();
        let result = parser.parse_argv(["echo", "a", "echo", "b"]).unwrap();
        assert_eq!(value_of(&result, 0, "word"), Some(json!("a")));
        assert_eq!(value_of(&result, 1, "word"), Some(json!("b")));
    }
}
