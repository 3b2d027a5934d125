//! Strict unified diff application.

use crate::error::{ErrorKind, PatchError, PatchResult};
use crate::hunk::HunkHeader;
use std::borrow::Cow;

/// Apply `diff_text` to `old_text`.
///
/// An empty or whitespace-only diff is a no-op. Otherwise optional `---` and
/// `+++` headers are followed by hunks; every context and removal line must
/// match the base exactly, hunks must be ordered, and each hunk's line counts
/// must equal its header. Base text between and after hunks is copied
/// through unchanged.
pub fn apply(old_text: &str, diff_text: &str) -> PatchResult {
    if diff_text.trim().is_empty() {
        return Ok(old_text.to_string());
    }

    let old_lines: Vec<&str> = old_text.split_inclusive('\n').collect();
    let lines = diff_lines(diff_text);

    let mut idx = 0;
    if lines.get(idx).is_some_and(|l| l.starts_with("--- ")) {
        idx += 1;
    }
    if lines.get(idx).is_some_and(|l| l.starts_with("+++ ")) {
        idx += 1;
    }

    let mut out = String::with_capacity(old_text.len() + diff_text.len());
    let mut cursor = 0usize;

    while idx < lines.len() {
        let header_line = idx + 1;
        let header = HunkHeader::parse(lines[idx]).ok_or_else(|| {
            PatchError::new(
                ErrorKind::InvalidHunkHeader,
                header_line,
                format!("expected hunk header, found {:?}", lines[idx]),
            )
        })?;
        let target = header.old_index().ok_or_else(|| {
            PatchError::new(
                ErrorKind::InvalidHunkHeader,
                header_line,
                "non-empty old range cannot start at line 0",
            )
        })?;
        idx += 1;

        if target < cursor {
            return Err(PatchError::new(
                ErrorKind::InvalidHunkOrder,
                header_line,
                format!("hunk targets base line {} but line {} is already consumed", target + 1, cursor),
            ));
        }
        if target > old_lines.len() {
            return Err(PatchError::new(
                ErrorKind::HunkOutOfRange,
                header_line,
                format!("hunk targets base line {} of {}", target + 1, old_lines.len()),
            ));
        }
        for line in &old_lines[cursor..target] {
            out.push_str(line);
        }
        cursor = target;

        let mut consumed = 0usize;
        let mut produced = 0usize;

        while idx < lines.len() && !lines[idx].starts_with("@@") {
            let line = lines[idx];
            let line_no = idx + 1;
            idx += 1;

            // Consumed by the lookahead below.
            if line.starts_with('\\') {
                continue;
            }
            let missing_newline = lines.get(idx).is_some_and(|next| next.starts_with('\\'));

            let mut chars = line.chars();
            let Some(prefix) = chars.next() else {
                return Err(PatchError::new(
                    ErrorKind::MalformedLine,
                    line_no,
                    "empty line inside hunk",
                ));
            };
            let body = chars.as_str();
            let content: Cow<'_, str> = if missing_newline {
                Cow::Borrowed(body)
            } else {
                Cow::Owned(format!("{body}\n"))
            };

            match prefix {
                ' ' | '-' => {
                    let kind = if prefix == ' ' {
                        ErrorKind::ContextMismatch
                    } else {
                        ErrorKind::RemovalMismatch
                    };
                    match old_lines.get(cursor) {
                        Some(base) if *base == content.as_ref() => {}
                        Some(base) => {
                            return Err(PatchError::new(
                                kind,
                                line_no,
                                format!("base line {} is {:?}, diff expects {:?}", cursor + 1, base, content),
                            ));
                        }
                        None => {
                            return Err(PatchError::new(
                                kind,
                                line_no,
                                format!("base ended before line {}", cursor + 1),
                            ));
                        }
                    }
                    if prefix == ' ' {
                        out.push_str(&content);
                        produced += 1;
                    }
                    cursor += 1;
                    consumed += 1;
                }
                '+' => {
                    out.push_str(&content);
                    produced += 1;
                }
                other => {
                    return Err(PatchError::new(
                        ErrorKind::MalformedLine,
                        line_no,
                        format!("unknown line prefix {other:?}"),
                    ));
                }
            }
        }

        if consumed != header.old_count || produced != header.new_count {
            return Err(PatchError::new(
                ErrorKind::HunkCountMismatch,
                header_line,
                format!(
                    "header declares -{} +{}, body has -{} +{}",
                    header.old_count, header.new_count, consumed, produced
                ),
            ));
        }
    }

    for line in &old_lines[cursor..] {
        out.push_str(line);
    }
    Ok(out)
}

/// Split on `\n`, dropping the empty piece after a final newline.
fn diff_lines(diff_text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = diff_text.split('\n').collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::generate;
    use proptest::prelude::*;

    const OLD: &str = "def f():\n    return 1\n";
    const NEW: &str = "def f(x):\n    return x\n";

    #[test]
    fn applies_generated_diff() {
        let diff = generate(OLD, NEW);
        assert_eq!(apply(OLD, &diff).unwrap(), NEW);
    }

    #[test]
    fn empty_diff_is_noop() {
        assert_eq!(apply(OLD, "").unwrap(), OLD);
        assert_eq!(apply(OLD, "  \n\t\n").unwrap(), OLD);
    }

    #[test]
    fn diverged_base_is_rejected() {
        let diff = generate(OLD, NEW);
        let err = apply("def f():\n    return 2\n", &diff).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RemovalMismatch);
        assert_eq!(err.diff_line, 5);
    }

    #[test]
    fn context_mismatch_is_rejected() {
        let old = "a\nb\nc\n";
        let diff = generate(old, "a\nB\nc\n");
        let err = apply("z\nb\nc\n", &diff).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ContextMismatch);
    }

    #[test]
    fn truncated_base_is_rejected() {
        let old = "a\nb\nc\n";
        let diff = generate(old, "a\nb\nC\n");
        let err = apply("a\nb\n", &diff).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RemovalMismatch);
    }

    #[test]
    fn tampered_header_counts_are_rejected() {
        let diff = generate(OLD, NEW).replace("@@ -1,2 +1,2 @@", "@@ -1,2 +1,3 @@");
        let err = apply(OLD, &diff).unwrap_err();
        assert_eq!(err.kind, ErrorKind::HunkCountMismatch);
    }

    #[test]
    fn bad_header_is_rejected() {
        let err = apply(OLD, "--- a/x\n+++ b/x\n@@ nonsense @@\n+y\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidHunkHeader);
        assert_eq!(err.diff_line, 3);
    }

    #[test]
    fn empty_body_line_is_malformed() {
        let err = apply("a\n\nb\n", "@@ -1,3 +1,3 @@\n a\n\n-b\n+c\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedLine);
    }

    #[test]
    fn unknown_prefix_is_malformed() {
        let err = apply("a\n", "@@ -1 +1 @@\n*a\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedLine);
    }

    #[test]
    fn out_of_order_hunks_are_rejected() {
        let diff = "@@ -3 +3 @@\n-c\n+C\n@@ -1 +1 @@\n-a\n+A\n";
        let err = apply("a\nb\nc\n", diff).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidHunkOrder);
    }

    #[test]
    fn hunk_past_end_is_rejected() {
        let err = apply("a\n", "@@ -5,0 +6 @@\n+x\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::HunkOutOfRange);
    }

    #[test]
    fn zero_count_hunk_inserts_after_line() {
        assert_eq!(apply("a\nb\n", "@@ -1,0 +2 @@\n+x\n").unwrap(), "a\nx\nb\n");
        assert_eq!(apply("a\nb\n", "@@ -0,0 +1 @@\n+x\n").unwrap(), "x\na\nb\n");
    }

    #[test]
    fn no_newline_marker_strips_newline() {
        let diff = generate("a\nb", "a\nc");
        assert_eq!(apply("a\nb", &diff).unwrap(), "a\nc");
        // The base has a newline the diff says is absent.
        let err = apply("a\nb\n", &diff).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RemovalMismatch);
    }

    #[test]
    fn headers_are_optional() {
        assert_eq!(apply("a\n", "@@ -1 +1 @@\n-a\n+b\n").unwrap(), "b\n");
    }

    #[test]
    fn appended_base_lines_pass_through() {
        // Hunks only pin the lines they cover. Rejecting a base that grew is
        // the write token's job, via the bound base hash.
        let base = format!("{OLD}x\n");
        assert_eq!(apply(&base, &generate(OLD, NEW)).unwrap(), format!("{NEW}x\n"));
    }

    #[test]
    fn leading_delete_round_trips() {
        let (old, new) = ("\n \n\n\n", " \n \na\n\n");
        assert_eq!(apply(old, &generate(old, new)).unwrap(), new);
    }

    fn text() -> impl Strategy<Value = String> {
        (prop::collection::vec("[a-c ]{0,3}", 0..12), any::<bool>()).prop_map(|(lines, trailing)| {
            let mut joined = lines.join("\n");
            if trailing && !joined.is_empty() {
                joined.push('\n');
            }
            joined
        })
    }

    proptest! {
        #[test]
        fn generated_diff_always_applies(old in text(), new in text()) {
            let diff = generate(&old, &new);
            prop_assert_eq!(apply(&old, &diff).unwrap(), new);
        }
    }
}
