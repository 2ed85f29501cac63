//! Reader from source text to located nodes.
//!
//! Grammar, informally:
//!
//! ```text
//! form    := number | string | atom | symbol | '(' form* ')' | '[' form* ']' | '\'' form
//! number  := -?digits(.digits)?([eE][+-]?digits)?
//! string  := '"' (char | '\n' | '\t' | '\r' | '\\' | '\"')* '"'
//! atom    := ':' symbol-char+
//! comment := ';' to end of line
//! ```
//!
//! Tokens must be followed by whitespace, a bracket, a string quote, a comment or the
//! end of input. Every node carries the byte span it was read from.

use std::iter::FusedIterator;
use std::rc::Rc;

use nom::{
    IResult, Parser,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{opt, recognize, value},
    multi::many0_count,
    sequence::{pair, preceded},
    branch::alt,
};

use crate::ast::{Node, Number, Value, is_symbol_char, is_valid_symbol};
use crate::location::{Location, Span};
use crate::{MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Parser options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseConfig {
    /// Treat `;` as the start of a line comment
    pub handle_comments: bool,
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
            max_depth: MAX_PARSE_DEPTH,
        }
    }
}

fn whitespace(input: &str) -> IResult<&str, ()> {
    value((), take_while1(char::is_whitespace)).parse(input)
}

fn comment(input: &str) -> IResult<&str, ()> {
    value((), pair(char(';'), take_while(|c: char| c != '\n'))).parse(input)
}

fn number_literal(input: &str) -> IResult<&str, &str> {
    recognize((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input)
}

fn atom_literal(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(is_symbol_char)).parse(input)
}

fn symbol_literal(input: &str) -> IResult<&str, &str> {
    take_while1(is_symbol_char).parse(input)
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '"' | ';')
}

fn ends_token(rest: &str) -> bool {
    rest.chars().next().is_none_or(is_delimiter)
}

fn parse_number(text: &str) -> Option<Number> {
    if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Number::Float)
    } else {
        text.parse::<i64>().ok().map(Number::Int)
    }
}

/// Internal failure carrying a byte offset; converted to [`ParseError`] at the API boundary
struct Fault {
    kind: ParseErrorKind,
    offset: usize,
    message: String,
    found: Option<String>,
}

impl Fault {
    fn new(kind: ParseErrorKind, offset: usize, message: impl Into<String>) -> Self {
        Fault {
            kind,
            offset,
            message: message.into(),
            found: None,
        }
    }

    fn found(mut self, found: impl Into<String>) -> Self {
        self.found = Some(found.into());
        self
    }
}

type Step<'a> = Result<(&'a str, Node), Fault>;

struct Reader<'a> {
    source: &'a str,
    label: Rc<str>,
    config: ParseConfig,
}

impl<'a> Reader<'a> {
    fn offset(&self, rest: &'a str) -> usize {
        self.source.len() - rest.len()
    }

    fn loc(&self, start: usize, rest: &'a str) -> Location {
        Location::new(self.label.clone(), Span::new(start, self.offset(rest)))
    }

    fn skip_trivia(&self, input: &'a str) -> &'a str {
        let result = if self.config.handle_comments {
            many0_count(alt((whitespace, comment))).parse(input)
        } else {
            many0_count(whitespace).parse(input)
        };
        match result {
            Ok((rest, _)) => rest,
            Err(_) => input,
        }
    }

    fn form(&self, input: &'a str, depth: usize) -> Step<'a> {
        let input = self.skip_trivia(input);
        let start = self.offset(input);

        if depth >= self.config.max_depth {
            return Err(Fault::new(
                ParseErrorKind::TooDeeplyNested,
                start,
                format!(
                    "expression too deeply nested (max depth: {})",
                    self.config.max_depth
                ),
            ));
        }

        let Some(first) = input.chars().next() else {
            return Err(Fault::new(
                ParseErrorKind::ExpectedExpression,
                start,
                "expected an expression, found end of input",
            ));
        };

        match first {
            '(' => self.sequence(input, ')', depth),
            '[' => self.sequence(input, ']', depth),
            ')' | ']' => Err(Fault::new(
                ParseErrorKind::MissingOpening,
                start,
                format!("unexpected `{first}` without a matching opening bracket"),
            )
            .found(first)),
            '\'' => {
                let (rest, inner) = self.form(&input[1..], depth + 1)?;
                Ok((
                    rest,
                    Node::new(Value::Quoted(Box::new(inner)), self.loc(start, rest)),
                ))
            }
            '"' => self.string(input),
            _ => self.token(input),
        }
    }

    /// Parse `( ... )` or `[ ... ]`; `input` starts at the opening bracket
    fn sequence(&self, input: &'a str, close: char, depth: usize) -> Step<'a> {
        let start = self.offset(input);
        let open = &input[..1];
        let mut rest = &input[1..];
        let mut items = Vec::new();

        loop {
            rest = self.skip_trivia(rest);
            match rest.chars().next() {
                None => {
                    return Err(Fault::new(
                        ParseErrorKind::MissingClosing,
                        start,
                        format!("missing closing `{close}` for this `{open}`"),
                    ));
                }
                Some(c) if c == close => {
                    rest = &rest[1..];
                    break;
                }
                Some(c @ (')' | ']')) => {
                    return Err(Fault::new(
                        ParseErrorKind::MissingOpening,
                        self.offset(rest),
                        format!("unexpected `{c}` where `{close}` was expected to close `{open}`"),
                    )
                    .found(c));
                }
                Some(_) => {
                    let (next, node) = self.form(rest, depth + 1)?;
                    items.push(node);
                    rest = next;
                }
            }
        }

        let value = if close == ')' {
            Value::SExpression(items)
        } else {
            Value::Vector(items)
        };
        Ok((rest, Node::new(value, self.loc(start, rest))))
    }

    /// Parse a string literal; `input` starts at the opening quote
    fn string(&self, input: &'a str) -> Step<'a> {
        let start = self.offset(input);
        let unterminated = || {
            Fault::new(
                ParseErrorKind::MissingClosing,
                start,
                "unterminated string literal",
            )
        };
        let mut remaining = &input[1..];
        let mut text = String::new();

        loop {
            let mut char_iter = remaining.chars();
            match char_iter.next() {
                Some('"') => {
                    let rest = char_iter.as_str();
                    return Ok((rest, Node::new(Value::String(text), self.loc(start, rest))));
                }
                Some('\\') => {
                    match char_iter.next() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('r') => text.push('\r'),
                        Some('\\') => text.push('\\'),
                        Some('"') => text.push('"'),
                        Some(other) => {
                            return Err(Fault::new(
                                ParseErrorKind::ExpectedExpression,
                                self.offset(remaining),
                                format!("unknown escape sequence `\\{other}`"),
                            )
                            .found(format!("\\{other}")));
                        }
                        None => return Err(unterminated()),
                    }
                    remaining = char_iter.as_str();
                }
                Some(c) => {
                    text.push(c);
                    remaining = char_iter.as_str();
                }
                None => return Err(unterminated()),
            }
        }
    }

    /// Parse a number, atom or symbol
    fn token(&self, input: &'a str) -> Step<'a> {
        let start = self.offset(input);

        if let Ok((rest, text)) = number_literal(input)
            && ends_token(rest)
        {
            let number = parse_number(text).ok_or_else(|| {
                Fault::new(
                    ParseErrorKind::ExpectedExpression,
                    start,
                    format!("numeric literal `{text}` is out of range"),
                )
                .found(text)
            })?;
            return Ok((rest, Node::new(Value::Numeric(number), self.loc(start, rest))));
        }

        if let Ok((rest, name)) = atom_literal(input)
            && ends_token(rest)
        {
            return Ok((
                rest,
                Node::new(Value::Atom(name.to_owned()), self.loc(start, rest)),
            ));
        }

        if let Ok((rest, name)) = symbol_literal(input)
            && ends_token(rest)
            && is_valid_symbol(name)
        {
            return Ok((
                rest,
                Node::new(Value::Symbol(name.to_owned()), self.loc(start, rest)),
            ));
        }

        let bad: String = input.chars().take_while(|c| !is_delimiter(*c)).collect();
        Err(Fault::new(
            ParseErrorKind::ExpectedExpression,
            start,
            format!("invalid token `{bad}`"),
        )
        .found(bad))
    }

    fn into_error(&self, fault: Fault) -> ParseError {
        let width = fault
            .found
            .as_ref()
            .map_or(1, |found| found.len().max(1));
        let end = (fault.offset + width).min(self.source.len());
        let location = Location::new(self.label.clone(), Span::new(fault.offset, end));

        let error = ParseError::new(fault.kind, fault.message, location)
            .with_context(self.source, fault.offset);
        match fault.found {
            Some(found) => error.with_found(found),
            None => error,
        }
    }
}

/// Lazy sequence of the top-level forms in a text. It stops after the first error.
pub struct Forms<'a> {
    reader: Reader<'a>,
    rest: &'a str,
    done: bool,
}

impl Iterator for Forms<'_> {
    type Item = Result<Node, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.rest = self.reader.skip_trivia(self.rest);
        if self.rest.is_empty() {
            self.done = true;
            return None;
        }
        match self.reader.form(self.rest, 0) {
            Ok((rest, node)) => {
                self.rest = rest;
                Some(Ok(node))
            }
            Err(fault) => {
                self.done = true;
                Some(Err(self.reader.into_error(fault)))
            }
        }
    }
}

impl FusedIterator for Forms<'_> {}

/// Parse every top-level form in `text`, lazily
pub fn parse<'a>(text: &'a str, label: &str) -> Forms<'a> {
    parse_with_config(text, label, ParseConfig::default())
}

pub fn parse_with_config<'a>(text: &'a str, label: &str, config: ParseConfig) -> Forms<'a> {
    Forms {
        reader: Reader {
            source: text,
            label: Rc::from(label),
            config,
        },
        rest: text,
        done: false,
    }
}

/// Parse every top-level form in `text`, failing on the first error
pub fn parse_all(text: &str, label: &str) -> Result<Vec<Node>, ParseError> {
    parse(text, label).collect()
}

/// Parse exactly one form; trailing input is an `ExpectedEof` error
pub fn parse_one(text: &str, label: &str) -> Result<Node, ParseError> {
    parse_one_with_config(text, label, ParseConfig::default())
}

pub fn parse_one_with_config(
    text: &str,
    label: &str,
    config: ParseConfig,
) -> Result<Node, ParseError> {
    let reader = Reader {
        source: text,
        label: Rc::from(label),
        config,
    };
    let (rest, node) = reader
        .form(text, 0)
        .map_err(|fault| reader.into_error(fault))?;

    let rest = reader.skip_trivia(rest);
    if rest.is_empty() {
        return Ok(node);
    }

    let trailing: String = rest.chars().take_while(|c| !c.is_whitespace()).collect();
    let fault = Fault::new(
        ParseErrorKind::ExpectedEof,
        reader.offset(rest),
        format!("unexpected input after expression: `{trailing}`"),
    )
    .found(trailing);
    Err(reader.into_error(fault))
}

/// Outcome of feeding a line to an [`IncrementalParser`]
#[derive(Debug, Clone, PartialEq)]
pub enum Feed {
    /// The buffered input ends inside an unfinished form
    Incomplete,
    /// The buffered input parsed completely; the buffer has been cleared
    Complete {
        label: Rc<str>,
        text: String,
        nodes: Vec<Node>,
    },
}

/// Accumulates lines of interactive input until they form complete expressions.
///
/// Each completed entry is labelled `<base>:<n>` so that locations from different
/// entries stay distinguishable.
#[derive(Debug, Clone)]
pub struct IncrementalParser {
    base_label: String,
    entry: usize,
    buffer: String,
    config: ParseConfig,
}

impl IncrementalParser {
    pub fn new(base_label: &str) -> Self {
        IncrementalParser::with_config(base_label, ParseConfig::default())
    }

    pub fn with_config(base_label: &str, config: ParseConfig) -> Self {
        IncrementalParser {
            base_label: base_label.to_owned(),
            entry: 1,
            buffer: String::new(),
            config,
        }
    }

    /// Label the entry currently being read will carry
    pub fn current_label(&self) -> String {
        format!("{}:{}", self.base_label, self.entry)
    }

    /// Append a line and try to parse everything buffered so far
    pub fn feed(&mut self, line: &str) -> Result<Feed, ParseError> {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(line);

        let label = self.current_label();
        let parsed: Result<Vec<Node>, ParseError> =
            parse_with_config(&self.buffer, &label, self.config).collect();

        match parsed {
            Err(err) if err.needs_more_input() => Ok(Feed::Incomplete),
            Err(err) => {
                self.finish_entry();
                Err(err)
            }
            Ok(nodes) => {
                let text = self.finish_entry();
                Ok(Feed::Complete {
                    label: Rc::from(label),
                    text,
                    nodes,
                })
            }
        }
    }

    fn finish_entry(&mut self) -> String {
        self.entry += 1;
        std::mem::take(&mut self.buffer)
    }

    /// True while a partial form is buffered
    pub fn is_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Discard any partial input
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{atom, quoted, sexpr, sym, val};
    use pretty_assertions::assert_eq;

    /// Test result variants for comprehensive parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Node),             // Parsing should succeed with this value
        Kind(ParseErrorKind),      // Parsing should fail with this kind of error
        Error,                     // Parsing should fail (any error)
    }
    use ParseTestResult::*;

    fn success<T: Into<Value>>(value: T) -> ParseTestResult {
        Success(val(value))
    }

    fn node(node: Node) -> ParseTestResult {
        Success(node)
    }

    /// Run parse tests through `parse_one`, checking that display output re-parses
    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} `{input}`", i + 1);
            let result = parse_one(input, "test");

            match (result, expected) {
                (Ok(actual), Success(expected_node)) => {
                    assert_eq!(actual, *expected_node, "{test_id}: value mismatch");

                    let displayed = format!("{actual}");
                    let reparsed = parse_one(&displayed, "test").unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip parse failed for '{displayed}': {e:?}")
                    });
                    assert_eq!(reparsed, actual, "{test_id}: round-trip mismatch");
                }
                (Err(err), Kind(kind)) => {
                    assert_eq!(err.kind, *kind, "{test_id}: wrong error kind ({err})");
                }
                (Err(_), Error) => {}
                (Ok(actual), Kind(kind)) => {
                    panic!("{test_id}: expected {kind:?}, got {actual:?}")
                }
                (Ok(actual), Error) => panic!("{test_id}: expected error, got {actual:?}"),
                (Err(err), Success(_)) => {
                    panic!("{test_id}: expected success, got error {err:?}")
                }
            }
        }
    }

    #[test]
    fn test_parser_comprehensive() {
        use ParseErrorKind::*;

        let test_cases = vec![
            // ===== NUMBERS =====
            ("42", success(42)),
            ("-5", success(-5)),
            ("-0", success(0)),
            ("3.14", success(3.14)),
            ("-0.5", success(-0.5)),
            ("1e3", success(1000.0)),
            ("2.5E-1", success(0.25)),
            ("9223372036854775807", success(i64::MAX)),
            ("-9223372036854775808", success(i64::MIN)),
            ("99999999999999999999", Kind(ExpectedExpression)),
            ("123abc", Kind(ExpectedExpression)),
            ("1.", Error),
            (".5", Error),
            ("1.5.3", Error),
            // ===== SYMBOLS =====
            ("foo", node(sym("foo"))),
            ("+", node(sym("+"))),
            ("/=", node(sym("/="))),
            ("-", node(sym("-"))),
            ("-abc", node(sym("-abc"))),
            ("map-up", node(sym("map-up"))),
            ("&", node(sym("&"))),
            ("~engine~", node(sym("~engine~"))),
            ("123var", Error),
            ("-42name", Error),
            ("test@home", Kind(ExpectedExpression)),
            ("test space", Kind(ExpectedEof)),
            // ===== ATOMS =====
            (":TRUE", node(atom("TRUE"))),
            (":key-name", node(atom("key-name"))),
            (":", Kind(ExpectedExpression)),
            (":a:b", Error),
            // ===== STRINGS =====
            ("\"hello world\"", success("hello world")),
            ("\"\"", success("")),
            (r#""hello\nworld""#, success("hello\nworld")),
            (r#""tab\there""#, success("tab\there")),
            (r#""quote\"test""#, success("quote\"test")),
            (r#""backslash\\test""#, success("backslash\\test")),
            (r#""other\xchar""#, Kind(ExpectedExpression)),
            (r#""unterminated"#, Kind(MissingClosing)),
            (r#""unterminated\"#, Kind(MissingClosing)),
            // ===== S-EXPRESSIONS AND VECTORS =====
            ("()", node(sexpr(vec![]))),
            ("[]", success(Vec::<i64>::new())),
            ("(+ 1 2)", node(sexpr(vec![sym("+"), val(1), val(2)]))),
            ("[1 [2 3]]", success(vec![val(1), val([2, 3])])),
            (
                "(f [x] 'y)",
                node(sexpr(vec![sym("f"), val(vec![sym("x")]), quoted(sym("y"))])),
            ),
            ("(f(g))", node(sexpr(vec![sym("f"), sexpr(vec![sym("g")])]))),
            ("( a\n\t b )", node(sexpr(vec![sym("a"), sym("b")]))),
            // ===== QUOTING =====
            ("'x", node(quoted(sym("x")))),
            ("''x", node(quoted(quoted(sym("x"))))),
            ("'(1 2)", node(quoted(sexpr(vec![val(1), val(2)])))),
            ("'", Kind(ExpectedExpression)),
            // ===== COMMENTS =====
            ("; leading comment\n42", success(42)),
            ("(1 ; inner\n 2)", node(sexpr(vec![val(1), val(2)]))),
            ("42 ; trailing", success(42)),
            // ===== STRUCTURAL ERRORS =====
            ("(+ 1 2", Kind(MissingClosing)),
            ("(1 (2", Kind(MissingClosing)),
            ("[1 2", Kind(MissingClosing)),
            (")", Kind(MissingOpening)),
            ("]", Kind(MissingOpening)),
            ("(1 2]", Kind(MissingOpening)),
            ("[1 2)", Kind(MissingOpening)),
            ("", Kind(ExpectedExpression)),
            ("   ", Kind(ExpectedExpression)),
            ("; only a comment", Kind(ExpectedExpression)),
            ("(+ 1 2) extra", Kind(ExpectedEof)),
            ("(1 2))", Kind(ExpectedEof)),
            ("1 2", Kind(ExpectedEof)),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_parser_depth_limits() {
        let parens_under_limit = format!(
            "{}x{}",
            "(".repeat(MAX_PARSE_DEPTH - 1),
            ")".repeat(MAX_PARSE_DEPTH - 1)
        );
        let quotes_under_limit = format!("{}x", "'".repeat(MAX_PARSE_DEPTH - 1));
        let parens_at_limit = format!(
            "{}1{}",
            "(".repeat(MAX_PARSE_DEPTH),
            ")".repeat(MAX_PARSE_DEPTH)
        );
        let quotes_at_limit = format!("{}a", "'".repeat(MAX_PARSE_DEPTH));

        run_parse_tests(vec![
            (
                parens_at_limit.as_str(),
                Kind(ParseErrorKind::TooDeeplyNested),
            ),
            (
                quotes_at_limit.as_str(),
                Kind(ParseErrorKind::TooDeeplyNested),
            ),
        ]);

        assert!(parse_one(&parens_under_limit, "test").is_ok());
        assert!(parse_one(&quotes_under_limit, "test").is_ok());

        let shallow = ParseConfig {
            max_depth: 2,
            ..ParseConfig::default()
        };
        assert!(parse_one_with_config("((x))", "test", shallow).is_err());
        assert!(parse_one_with_config("(x)", "test", shallow).is_ok());
    }

    #[test]
    fn test_comments_can_be_disabled() {
        let config = ParseConfig {
            handle_comments: false,
            ..ParseConfig::default()
        };
        assert!(parse_one_with_config("; c\n1", "test", config).is_err());
        assert_eq!(parse_one_with_config("1", "test", config).unwrap(), val(1));
    }

    #[test]
    fn test_unicode_whitespace_separates_tokens() {
        assert_eq!(parse_all("1\u{0c}2", "test").unwrap(), vec![val(1), val(2)]);
        assert_eq!(
            parse_one("(+ 1\u{a0}2)", "test").unwrap(),
            sexpr(vec![sym("+"), val(1), val(2)])
        );
        assert_eq!(parse_all("\u{2003}x\u{2003}", "test").unwrap(), vec![sym("x")]);
    }

    #[test]
    fn test_nodes_are_located() {
        let nodes = parse_all("(a b)\n['c]", "file.am").unwrap();
        assert_eq!(nodes.len(), 2);

        let first = &nodes[0];
        assert_eq!(first.loc.source.as_ref(), "file.am");
        assert_eq!(first.loc.span, Some(Span::new(0, 5)));
        let Value::SExpression(children) = &first.value else {
            panic!("expected s-expression, got {first:?}");
        };
        assert_eq!(children[1].loc.span, Some(Span::new(3, 4)));

        let second = &nodes[1];
        assert_eq!(second.loc.span, Some(Span::new(6, 10)));
        let Value::Vector(items) = &second.value else {
            panic!("expected vector, got {second:?}");
        };
        // the quoted node spans the quote character as well
        assert_eq!(items[0].loc.span, Some(Span::new(7, 9)));
        assert_eq!(items[0].loc.line_col("(a b)\n['c]"), Some((2, 2)));
    }

    #[test]
    fn test_error_locations() {
        let err = parse_one("(+ 1 2", "test").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingClosing);
        assert_eq!(err.location.span.map(|s| s.start), Some(0));
        assert!(err.needs_more_input());

        let err = parse_one("(a]", "test").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingOpening);
        assert_eq!(err.location.span, Some(Span::new(2, 3)));
        assert_eq!(err.found.as_deref(), Some("]"));
        assert!(!err.needs_more_input());

        let err = parse_one("(ok) (bad", "test").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedEof);
        assert_eq!(err.location.span.map(|s| s.start), Some(5));
        assert!(err.context.unwrap().contains("(bad"));
    }

    #[test]
    fn test_forms_are_lazy_and_stop_at_first_error() {
        let mut forms = parse("1 2 ) 3", "test");
        assert_eq!(forms.next().unwrap().unwrap(), val(1));
        assert_eq!(forms.next().unwrap().unwrap(), val(2));
        assert_eq!(
            forms.next().unwrap().unwrap_err().kind,
            ParseErrorKind::MissingOpening
        );
        assert!(forms.next().is_none());
        assert!(forms.next().is_none());

        assert_eq!(parse("  ; nothing\n", "test").count(), 0);
        assert_eq!(parse_all("", "test").unwrap(), vec![]);
    }

    #[test]
    fn test_incremental_parsing() {
        let mut reader = IncrementalParser::new("repl");

        assert_eq!(reader.feed("(+ 1").unwrap(), Feed::Incomplete);
        assert!(reader.is_pending());
        let Feed::Complete { label, text, nodes } = reader.feed("2 3)").unwrap() else {
            panic!("expected complete input");
        };
        assert_eq!(label.as_ref(), "repl:1");
        assert_eq!(text, "(+ 1\n2 3)");
        assert_eq!(
            nodes,
            vec![sexpr(vec![sym("+"), val(1), val(2), val(3)])]
        );
        assert!(!reader.is_pending());

        assert_eq!(reader.feed("[4 3").unwrap(), Feed::Incomplete);
        let Feed::Complete { label, nodes, .. } = reader.feed("2 1]").unwrap() else {
            panic!("expected complete input");
        };
        assert_eq!(label.as_ref(), "repl:2");
        assert_eq!(nodes, vec![val([4, 3, 2, 1])]);

        // unterminated strings continue across lines
        assert_eq!(reader.feed("\"abc").unwrap(), Feed::Incomplete);
        let Feed::Complete { nodes, .. } = reader.feed("def\"").unwrap() else {
            panic!("expected complete input");
        };
        assert_eq!(nodes, vec![val("abc\ndef")]);

        // terminal errors clear the buffer
        assert_eq!(reader.feed("(1").unwrap(), Feed::Incomplete);
        let err = reader.feed("2))").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingOpening);
        assert!(!reader.is_pending());

        assert_eq!(reader.feed("(").unwrap(), Feed::Incomplete);
        reader.reset();
        assert_eq!(reader.pending(), "");
    }
}
