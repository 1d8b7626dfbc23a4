//! Types related to source files.

use std::fmt;
use std::ops::Range;

/// Byte offsets into source files.
pub type BytePos = u32;

/// Byte ranges in source files.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ByteRange {
    start: BytePos,
    end: BytePos,
}

impl fmt::Debug for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteRange({}..{})", self.start, self.end)
    }
}

impl ByteRange {
    pub const fn new(start: BytePos, end: BytePos) -> Self {
        Self { start, end }
    }

    /// An empty range sitting at `pos`.
    pub const fn empty(pos: BytePos) -> Self {
        Self::new(pos, pos)
    }
}

impl From<ByteRange> for Range<usize> {
    fn from(range: ByteRange) -> Self {
        (range.start as usize)..(range.end as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// `ByteRange` is stored on every token. Ensure it doesn't grow accidentally.
    fn byte_range_size() {
        assert_eq!(std::mem::size_of::<ByteRange>(), 8);
    }

    #[test]
    fn converts_to_a_slice_range() {
        let source = "int x;";
        let range = ByteRange::new(4, 5);
        assert_eq!(&source[Range::<usize>::from(range)], "x");
        assert_eq!(Range::<usize>::from(ByteRange::empty(6)), 6..6);
    }
}
