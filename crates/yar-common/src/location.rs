use std::fmt;

use serde::Serialize;

/// A 1-based (line, column) position in a source file.
///
/// All tokens and errors in the yar toolkit carry a `Location`. Columns are
/// measured in characters from the start of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    /// Create a new location.
    pub fn new(line: u32, column: u32) -> Self {
        debug_assert!(line >= 1, "lines are 1-based");
        Self { line, column }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self { line: 1, column: 1 }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.line, self.column)
    }
}

/// Pre-computed index of line start offsets for byte-offset conversions.
///
/// Constructed once per source text; used by the diagnostics renderer to map
/// a `Location` back to the byte range ariadne wants.
#[derive(Debug)]
pub struct LineIndex {
    /// Byte offset of the start of each line. The first entry is always 0.
    line_starts: Vec<u32>,
}

impl LineIndex {
    /// Build a line index by scanning the source text for newline characters.
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
    pub fn location(&self, offset: u32) -> Location {
        let line_idx = self.line_starts.partition_point(|&start| start <= offset);
        let line_idx = line_idx.saturating_sub(1);
        Location::new(
            (line_idx as u32) + 1,
            offset - self.line_starts[line_idx] + 1,
        )
    }

    /// Convert a 1-based (line, column) pair to a byte offset.
    ///
    /// Saturates at the start of the last line if the line is out of range.
    pub fn offset(&self, location: Location) -> u32 {
        let line_idx = (location.line as usize)
            .saturating_sub(1)
            .min(self.line_starts.len() - 1);
        self.line_starts[line_idx] + location.column.saturating_sub(1)
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
    fn location_display() {
        assert_eq!(Location::new(3, 14).to_string(), "3.14");
    }

    #[test]
    fn line_index_round_trips() {
        let src = "rule a\n{\n}\n";
        let idx = LineIndex::new(src);
        assert_eq!(idx.location(0), Location::new(1, 1));
        assert_eq!(idx.location(7), Location::new(2, 1));
        assert_eq!(idx.location(9), Location::new(3, 1));
        assert_eq!(idx.offset(Location::new(2, 1)), 7);
        assert_eq!(idx.offset(idx.location(5)), 5);
    }

    #[test]
    fn line_index_counts_lines() {
        assert_eq!(LineIndex::new("a\nb\nc").line_count(), 3);
    }

    #[test]
    fn offset_saturates_past_last_line() {
        let idx = LineIndex::new("only");
        assert_eq!(idx.offset(Location::new(9, 1)), 0);
    }
}
