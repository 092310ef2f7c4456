//! Byte spans and line/column lookup.

use serde::{Deserialize, Serialize};

/// Half-open byte range into one source text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    /// Start offset (inclusive)
    pub start: u32,
    /// End offset (exclusive)
    pub end: u32,
}

impl Span {
    /// Create a span
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Span covering both
    #[must_use]
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Length in bytes
    #[must_use]
    pub const fn len(self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span is empty
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.end <= self.start
    }
}

/// Line start table for one source text
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    /// Build the index
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self { line_starts }
    }

    /// Number of lines
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// 1-based line and column for a byte offset; columns count characters
    #[must_use]
    pub fn position(&self, text: &str, offset: u32) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line] as usize;
        let end = (offset as usize).min(text.len());
        let column = text
            .get(start..end)
            .map_or(end.saturating_sub(start), |s| s.chars().count());
        (line as u32 + 1, column as u32 + 1)
    }

    /// Text of a 1-based line without its terminator
    #[must_use]
    pub fn line_text<'t>(&self, text: &'t str, line: u32) -> &'t str {
        let idx = (line as usize).saturating_sub(1);
        let Some(&start) = self.line_starts.get(idx) else {
            return "";
        };
        let end = self
            .line_starts
            .get(idx + 1)
            .map_or(text.len(), |&next| next as usize - 1);
        text.get(start as usize..end)
            .unwrap_or("")
            .trim_end_matches('\r')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_to() {
        let a = Span::new(2, 4);
        let b = Span::new(6, 9);
        assert_eq!(a.to(b), Span::new(2, 9));
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_position_first_line() {
        let text = "let a = 1;\nlet b = 2;";
        let index = LineIndex::new(text);
        assert_eq!(index.position(text, 0), (1, 1));
        assert_eq!(index.position(text, 4), (1, 5));
    }

    #[test]
    fn test_position_second_line() {
        let text = "let a = 1;\nlet b = 2;";
        let index = LineIndex::new(text);
        assert_eq!(index.position(text, 11), (2, 1));
        assert_eq!(index.line_text(text, 2), "let b = 2;");
        assert_eq!(index.line_text(text, 1), "let a = 1;");
    }

    #[test]
    fn test_position_counts_chars() {
        let text = "const é = x;";
        let index = LineIndex::new(text);
        let offset = text.find('=').unwrap() as u32;
        assert_eq!(index.position(text, offset), (1, 9));
    }

    #[test]
    fn test_line_text_out_of_range() {
        let index = LineIndex::new("a");
        assert_eq!(index.line_text("a", 5), "");
        assert_eq!(index.line_count(), 1);
    }
}
