//! Process exit codes. Part of the public contract: scripts branch on them.

/// Run completed, whatever the scores.
pub const SUCCESS: i32 = 0;
/// Run was cancelled before every pair was scheduled; outputs are partial.
pub const CANCELLED: i32 = 1;
/// Configuration, corpus, or output error. Nothing was scored.
pub const CONFIG_ERROR: i32 = 2;
