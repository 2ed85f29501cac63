//! Human-readable reports for parse errors and escaped signals.
//!
//! ```text
//! error[UnboundName]: unbound name `x`
//!   --> main.am:2:6
//!   |
//! 2 |   (+ x 1))
//!   |      ^
//!   = note: propagated through main.am:2:3
//!   = note: propagated through main.am:1:1
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::location::{Location, Span, offset_to_line_col};
use crate::signal::Signal;
use crate::{Error, ParseError};

/// Source texts by label, so reports can quote the offending line
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    sources: HashMap<Rc<str>, Rc<str>>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap::default()
    }

    /// Register `text` under `label`, replacing any previous text
    pub fn add(&mut self, label: &str, text: &str) {
        self.sources.insert(Rc::from(label), Rc::from(text));
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.sources.get(label).map(|text| &**text)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// `label:line:col` when the source is known, the location's own display otherwise.
    /// A label that itself contains `:` is bracketed, as in `<repl:3>:1:6`.
    pub fn describe(&self, loc: &Location) -> String {
        match (loc.span, self.get(&loc.source)) {
            (Some(span), Some(text)) => {
                let (line, col) = offset_to_line_col(text, span.start.min(text.len()));
                if loc.source.contains(':') {
                    format!("<{}>:{line}:{col}", loc.source)
                } else {
                    format!("{}:{line}:{col}", loc.source)
                }
            }
            _ => loc.to_string(),
        }
    }
}

/// Quote the line containing `span` with a caret underline
fn write_snippet(out: &mut String, text: &str, span: Span) {
    let start = span.start.min(text.len());
    let (line_no, col) = offset_to_line_col(text, start);
    let line = text.lines().nth(line_no - 1).unwrap_or("");

    let remaining = line.chars().count().saturating_sub(col - 1);
    let width = text
        .get(start..span.end.min(text.len()))
        .map_or(1, |covered| covered.chars().take_while(|c| *c != '\n').count())
        .min(remaining)
        .max(1);

    let gutter = " ".repeat(line_no.to_string().len());
    let _ = writeln!(out, "{gutter} |");
    let _ = writeln!(out, "{line_no} | {line}");
    let _ = writeln!(out, "{gutter} | {}{}", " ".repeat(col - 1), "^".repeat(width));
}

struct Report<'a> {
    code: &'static str,
    message: String,
    primary: &'a Location,
    notes: Vec<String>,
    help: Option<&'static str>,
}

impl Report<'_> {
    fn render(&self, sources: &SourceMap) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "error[{}]: {}", self.code, self.message);
        let _ = writeln!(out, "  --> {}", sources.describe(self.primary));

        if let (Some(span), Some(text)) = (self.primary.span, sources.get(&self.primary.source)) {
            write_snippet(&mut out, text, span);
        }
        for note in &self.notes {
            let _ = writeln!(out, "  = note: {note}");
        }
        if let Some(help) = self.help {
            let _ = writeln!(out, "  = help: {help}");
        }
        out
    }
}

/// Render a signal that reached the top level.
///
/// `break` and `return` signals are reported as the errors they become when they
/// escape every enclosing construct.
pub fn render_signal(signal: &Signal, sources: &SourceMap) -> String {
    let signal = signal.clone().escaped();
    let trace: Vec<String> = signal
        .trace
        .iter()
        .map(|loc| format!("propagated through {}", sources.describe(loc)))
        .collect();

    match Error::from(signal.clone()) {
        Error::Parse(parse_error) => render_parse_error(&parse_error, sources),
        error => Report {
            code: error.code(),
            message: error.to_string(),
            primary: &signal.origin,
            notes: trace,
            help: None,
        }
        .render(sources),
    }
}

pub fn render_parse_error(error: &ParseError, sources: &SourceMap) -> String {
    let mut notes = Vec::new();
    if sources.get(&error.location.source).is_none()
        && let Some(context) = &error.context
    {
        notes.push(format!("near: {context}"));
    }

    Report {
        code: Error::Parse(error.clone()).code(),
        message: error.message.clone(),
        primary: &error.location,
        notes,
        help: error
            .needs_more_input()
            .then_some("the input ended before this form was closed"),
    }
    .render(sources)
}
