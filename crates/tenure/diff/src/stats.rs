use serde::{Deserialize, Serialize};

/// Added and removed line counts of a unified diff.
///
/// Only hunk bodies are counted, so the `---`/`+++` file headers never
/// register as changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
    pub total_changes: usize,
}

impl DiffStats {
    pub fn from_diff(diff_text: &str) -> Self {
        let mut stats = Self::default();
        let mut in_hunk = false;
        for line in diff_text.split('\n') {
            if line.starts_with("@@") {
                in_hunk = true;
                continue;
            }
            if !in_hunk {
                continue;
            }
            match line.as_bytes().first() {
                Some(b'+') => stats.additions += 1,
                Some(b'-') => stats.deletions += 1,
                _ => {}
            }
        }
        stats.total_changes = stats.additions + stats.deletions;
        stats
    }
}
