use serde::Serialize;

/// Byte-offset span into a source document. Start is inclusive, end exclusive.
///
/// Every node in the stream and every error raised by the writer carries one
/// of these. Line/column pairs are computed on demand through [`LineIndex`]
/// when a diagnostic is actually rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Create a span from byte offsets.
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span start ({start}) must be <= end ({end})");
        Self { start, end }
    }

    /// A zero-length span at the given offset.
    ///
    /// Used for synthetic nodes (replayed buffers, programmatic streams)
    /// that have no real source text behind them.
    pub fn point(offset: u32) -> Self {
        Self { start: offset, end: offset }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Whether the span is empty (zero-length).
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Merge two spans into one covering both.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Pre-computed line-start table for byte-offset to (line, column) lookup.
///
/// Built once per source document by scanning for newlines; lookups are a
/// binary search over the start offsets.
#[derive(Debug)]
pub struct LineIndex {
    /// Byte offset of the start of each line. The first entry is always 0.
    line_starts: Vec<u32>,
}

impl LineIndex {
    /// Scan the source text and record every line start.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self { line_starts }
    }

    /// Convert a byte offset to a 1-based (line, column) pair.
    ///
    /// Column is measured in bytes from the start of the line.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        // First line_start strictly greater than the offset, minus one,
        // is the line containing it.
        let line_idx = self.line_starts.partition_point(|&start| start <= offset);
        let line_idx = line_idx.saturating_sub(1);
        let line = (line_idx as u32) + 1;
        let col = offset - self.line_starts[line_idx] + 1;
        (line, col)
    }

    /// Number of lines in the source.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let span = Span::new(3, 9);
        assert_eq!(span.len(), 6);
        assert!(!span.is_empty());
        assert!(Span::point(4).is_empty());
    }

    #[test]
    fn span_merge_covers_both() {
        let merged = Span::new(2, 5).merge(Span::new(4, 11));
        assert_eq!(merged, Span::new(2, 11));
    }

    #[test]
    fn line_col_lookup() {
        let idx = LineIndex::new("start Border\nmember Child\nend\n");
        assert_eq!(idx.line_col(0), (1, 1));
        // 'm' of "member" starts line 2.
        assert_eq!(idx.line_col(13), (2, 1));
        // 'd' of "end".
        assert_eq!(idx.line_col(28), (3, 3));
        assert_eq!(idx.line_count(), 4);
    }
}
