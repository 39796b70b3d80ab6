//! Plain-text listings for the command line.

use crate::collection::Collection;
use crate::parser::ParserContext;

/// One line per reachable task: its dotted name, alternate names and first help line.
#[must_use]
pub fn list(collection: &Collection) -> String {
    let mut out = String::new();
    for (name, aliases) in collection.task_names() {
        let help = collection
            .task(&name)
            .ok()
            .and_then(|task| task.help_line())
            .unwrap_or_default();
        let label = if aliases.is_empty() {
            name
        } else {
            format!("{name} ({})", aliases.join(", "))
        };
        push_line(&mut out, &format!("{label:<30} {help}"));
    }
    out
}

/// Usage text for one task: the invocation shape, its doc text and every flag.
#[must_use]
pub fn usage(program: &str, context: &ParserContext, doc: Option<&str>) -> String {
    let mut out = String::new();
    let mut invocation = format!("Usage: {program} [--core-opts] {} [--options]", context.name());
    for arg in context.positional_args() {
        invocation.push_str(&format!(" <{}>", arg.names()[0]));
    }
    invocation.push_str(" [other tasks here ...]");
    push_line(&mut out, &invocation);
    out.push('\n');

    push_line(&mut out, "Docstring:");
    match doc.map(str::trim).filter(|d| !d.is_empty()) {
        Some(doc) => {
            for line in doc.lines() {
                push_line(&mut out, &format!("  {}", line.trim()));
            }
        }
        None => push_line(&mut out, "  none"),
    }
    out.push('\n');

    push_line(&mut out, "Options:");
    let tuples = context.help_tuples();
    if tuples.is_empty() {
        push_line(&mut out, "  none");
    }
    let width = tuples.iter().map(|(flags, _)| flags.len()).max().unwrap_or(0);
    for (flags, help) in tuples {
        push_line(&mut out, &format!("  {flags:<width$}  {help}"));
    }
    out
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line.trim_end());
    out.push('\n');
}
