//! Tenure Diff - deterministic unified diffs with strict, non-heuristic application.
//!
//! The write-token protocol binds a patch to an exact base text, so "this diff
//! applies cleanly to exactly this base" has to be a checkable fact:
//!
//! - every context and removal line must match the base byte-for-byte
//! - hunks must be ordered and must not overlap
//! - each hunk's consumed/produced line counts must equal its header
//! - application is all-or-nothing: either the full new text or an error
//!
//! ```text
//! --- a/code.py
//! +++ b/code.py
//! @@ -1,2 +1,2 @@
//! -def f():
//! -    return 1
//! +def f(x):
//! +    return x
//! ```

#![deny(unsafe_code)]

mod apply;
mod error;
mod generate;
mod hunk;
mod stats;

pub use apply::apply;
pub use error::{ErrorKind, PatchError, PatchResult};
pub use generate::{generate, DiffEngine};
pub use hunk::HunkHeader;
pub use stats::DiffStats;
