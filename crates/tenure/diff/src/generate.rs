//! Unified diff generation.
//!
//! Lines are split on `\n` only and compared with Myers; hunks are grouped
//! with three lines of context. Output is a pure function of the inputs.

use crate::hunk::HunkHeader;
use similar::{capture_diff_slices, group_diff_ops, Algorithm, DiffOp, DiffTag};

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Diff generator with a configurable context radius and file labels.
#[derive(Clone, Debug)]
pub struct DiffEngine {
    context_radius: usize,
    old_label: String,
    new_label: String,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self {
            context_radius: 3,
            old_label: "a/code".to_string(),
            new_label: "b/code".to_string(),
        }
    }
}

impl DiffEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context_radius(mut self, radius: usize) -> Self {
        self.context_radius = radius;
        self
    }

    /// Label both sides after `filename` (`a/<filename>`, `b/<filename>`).
    pub fn with_filename(mut self, filename: &str) -> Self {
        self.old_label = format!("a/{filename}");
        self.new_label = format!("b/{filename}");
        self
    }

    /// Produce a unified diff from `old` to `new`; empty when they are equal.
    pub fn generate(&self, old: &str, new: &str) -> String {
        let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
        let new_lines: Vec<&str> = new.split_inclusive('\n').collect();

        let ops = capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines);
        if ops.iter().all(|op| matches!(op, DiffOp::Equal { .. })) {
            return String::new();
        }

        let mut out = String::with_capacity(old.len() + new.len() + 64);
        out.push_str("--- ");
        out.push_str(&self.old_label);
        out.push('\n');
        out.push_str("+++ ");
        out.push_str(&self.new_label);
        out.push('\n');

        // Net lines added by earlier hunks. Lines between hunks are equal on
        // both sides, so a hunk's new start is its old start shifted by this.
        let mut offset: isize = 0;
        for group in group_diff_ops(ops, self.context_radius) {
            if group.iter().all(|op| matches!(op, DiffOp::Equal { .. })) {
                continue;
            }
            let Some(first) = group.first() else {
                continue;
            };
            // Myers may tag a leading delete with a `new_index` past the
            // hunk start, so counts come from the ops, never range endpoints.
            let old_start = first.old_range().start;
            let old_len: usize = group.iter().map(|op| op.old_range().len()).sum();
            let new_len: usize = group.iter().map(|op| op.new_range().len()).sum();
            let new_start = old_start.saturating_add_signed(offset);
            offset += new_len as isize - old_len as isize;

            let header = HunkHeader {
                old_start: range_start(old_start, old_len),
                old_count: old_len,
                new_start: range_start(new_start, new_len),
                new_count: new_len,
            };
            out.push_str(&header.to_string());
            out.push('\n');

            for op in &group {
                let (tag, old_range, new_range) = op.as_tag_tuple();
                match tag {
                    DiffTag::Equal => {
                        for line in &old_lines[old_range] {
                            push_line(&mut out, ' ', line);
                        }
                    }
                    DiffTag::Delete => {
                        for line in &old_lines[old_range] {
                            push_line(&mut out, '-', line);
                        }
                    }
                    DiffTag::Insert => {
                        for line in &new_lines[new_range] {
                            push_line(&mut out, '+', line);
                        }
                    }
                    DiffTag::Replace => {
                        for line in &old_lines[old_range] {
                            push_line(&mut out, '-', line);
                        }
                        for line in &new_lines[new_range] {
                            push_line(&mut out, '+', line);
                        }
                    }
                }
            }
        }
        out
    }
}

/// Produce a unified diff with the default engine.
pub fn generate(old: &str, new: &str) -> String {
    DiffEngine::default().generate(old, new)
}

/// Header start for a 0-based range: 1-based when non-empty, otherwise the
/// line after which the empty range sits.
fn range_start(start: usize, len: usize) -> usize {
    if len == 0 {
        start
    } else {
        start + 1
    }
}

fn push_line(out: &mut String, prefix: char, line: &str) {
    out.push(prefix);
    match line.strip_suffix('\n') {
        Some(body) => {
            out.push_str(body);
            out.push('\n');
        }
        None => {
            out.push_str(line);
            out.push('\n');
            out.push_str(NO_NEWLINE_MARKER);
            out.push('\n');
        }
    }
}
