//! `@@ -a,b +c,d @@` headers.

use std::fmt;

/// Declared line ranges of one hunk. Starts are 1-based as written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
}

impl HunkHeader {
    /// Parse a header line. Omitted counts default to 1; anything after the
    /// closing `@@` (a section heading) is ignored.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix("@@ -")?;
        let (ranges, _) = rest.split_once(" @@")?;
        let (old, new) = ranges.split_once(" +")?;
        let (old_start, old_count) = parse_range(old)?;
        let (new_start, new_count) = parse_range(new)?;
        Some(Self {
            old_start,
            old_count,
            new_start,
            new_count,
        })
    }

    /// 0-based index of the first base line this hunk touches.
    ///
    /// A zero-length old range names the line *after which* the hunk
    /// inserts, so its index is the start itself.
    pub fn old_index(&self) -> Option<usize> {
        if self.old_count == 0 {
            Some(self.old_start)
        } else {
            self.old_start.checked_sub(1)
        }
    }
}

impl fmt::Display for HunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )
    }
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, count)) => Some((parse_number(start)?, parse_number(count)?)),
        None => Some((parse_number(range)?, 1)),
    }
}

fn parse_number(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
