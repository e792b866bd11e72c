use serde::Deserialize;
use serde::Serialize;

/// A single point in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
	/// 1-indexed line number.
	pub line: usize,
	/// 1-indexed column number, counted in bytes.
	pub column: usize,
	/// 0-indexed byte offset from the start of the file.
	pub offset: usize,
}

impl Point {
	pub const fn new(line: usize, column: usize, offset: usize) -> Self {
		Self {
			line,
			column,
			offset,
		}
	}
}

impl Default for Point {
	fn default() -> Self {
		Self::new(1, 1, 0)
	}
}

/// The span of a token, expression, or statement in a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
	pub start: Point,
	pub end: Point,
}

impl Position {
	pub const fn new(
		start_line: usize,
		start_column: usize,
		start_offset: usize,
		end_line: usize,
		end_column: usize,
		end_offset: usize,
	) -> Self {
		Self {
			start: Point::new(start_line, start_column, start_offset),
			end: Point::new(end_line, end_column, end_offset),
		}
	}

	/// Create a position stretching from the start of `self` to the end of
	/// `other`.
	#[must_use]
	pub fn to(self, other: Position) -> Self {
		Self {
			start: self.start,
			end: other.end,
		}
	}

	/// Byte range covered by this position.
	pub fn range(&self) -> std::ops::Range<usize> {
		self.start.offset..self.end.offset
	}
}

/// Pre-computed table of line-start byte offsets for efficient offset-to-point
/// conversion. Built once per file (O(n)), then each lookup is a binary search
/// (O(log n)).
pub(crate) struct LineTable {
	/// Byte offsets of the start of each line. `line_starts[0]` is always 0.
	line_starts: Vec<usize>,
}

impl LineTable {
	pub(crate) fn new(content: &str) -> Self {
		let mut line_starts = vec![0];
		for (i, byte) in content.bytes().enumerate() {
			if byte == b'\n' {
				line_starts.push(i + 1);
			}
		}
		Self { line_starts }
	}

	/// Convert a byte offset to a 1-indexed line/column [`Point`].
	pub(crate) fn point(&self, offset: usize) -> Point {
		let line_idx = match self.line_starts.binary_search(&offset) {
			Ok(exact) => exact,
			Err(insert) => insert.saturating_sub(1),
		};

		Point {
			line: line_idx + 1,
			column: offset - self.line_starts[line_idx] + 1,
			offset,
		}
	}

	pub(crate) fn position(&self, range: std::ops::Range<usize>) -> Position {
		Position {
			start: self.point(range.start),
			end: self.point(range.end),
		}
	}
}
