//! Source locations attached to every node.

use std::fmt;
use std::rc::Rc;

/// Label used for nodes produced at runtime rather than read from source text
pub const RUNTIME_SOURCE: &str = "<runtime>";

/// A half-open byte range into a source text
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span {
            start,
            end: end.max(start),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Where a node came from: a source label and, for parsed nodes, a byte span
#[derive(Clone, PartialEq, Eq)]
pub struct Location {
    pub source: Rc<str>,
    pub span: Option<Span>,
}

impl Location {
    pub fn new(source: Rc<str>, span: Span) -> Self {
        Location {
            source,
            span: Some(span),
        }
    }

    /// Location of values created during evaluation
    pub fn runtime() -> Self {
        Location {
            source: Rc::from(RUNTIME_SOURCE),
            span: None,
        }
    }

    pub fn is_runtime(&self) -> bool {
        self.span.is_none()
    }

    /// 1-based `(line, column)` of the span start within `code`, counting columns in chars
    pub fn line_col(&self, code: &str) -> Option<(usize, usize)> {
        self.span.map(|span| offset_to_line_col(code, span.start))
    }
}

impl Default for Location {
    fn default() -> Self {
        Location::runtime()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{}@{}..{}", self.source, span.start, span.end),
            None => write!(f, "{}", self.source),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{}@{}", self.source, span.start),
            None => write!(f, "{}", self.source),
        }
    }
}

/// Convert a byte offset into a 1-based line and a 1-based char column
pub fn offset_to_line_col(code: &str, offset: usize) -> (usize, usize) {
    let mut pos = offset.min(code.len());
    for (i, line) in code.split('\n').enumerate() {
        if pos < line.len() + 1 {
            let column = line
                .char_indices()
                .take_while(|(idx, _)| *idx < pos)
                .count();
            return (i + 1, column + 1);
        }
        pos -= line.len() + 1;
    }
    (code.split('\n').count(), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_to_line_col() {
        let code = "(a b)\n  (c\n d)";
        assert_eq!(offset_to_line_col(code, 0), (1, 1));
        assert_eq!(offset_to_line_col(code, 3), (1, 4));
        assert_eq!(offset_to_line_col(code, 6), (2, 1));
        assert_eq!(offset_to_line_col(code, 8), (2, 3));
        assert_eq!(offset_to_line_col(code, 12), (3, 2));
        // offsets past the end clamp to the last position
        assert_eq!(offset_to_line_col(code, 500), (3, 4));
    }

    #[test]
    fn test_columns_count_chars() {
        let code = "\"é\" x";
        // `x` starts at byte 5 but is the 5th char
        assert_eq!(offset_to_line_col(code, 5), (1, 5));
    }

    #[test]
    fn test_runtime_location_has_no_position() {
        let loc = Location::runtime();
        assert!(loc.is_runtime());
        assert_eq!(loc.line_col("anything"), None);

        let parsed = Location::new(Rc::from("test"), Span::new(2, 4));
        assert_eq!(parsed.line_col("ab\ncd"), Some((1, 3)));
        assert_eq!(format!("{parsed:?}"), "test@2..4");
    }
}
