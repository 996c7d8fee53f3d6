//! Engine-wide constants.

/// Logical engine version. Not currently load-bearing for any on-disk
/// format, kept as a single place to bump if the checkpoint schema ever
/// changes in an incompatible way.
pub const ENGINE_VERSION: &str = "1.0";

/// Default cap on the number of residual records enumerated in detail in
/// `execution-resume.json`. Above this, the summary points at the raw
/// `records` namespace instead of listing every row.
pub const DEFAULT_RESUME_DETAIL_LIMIT: usize = 10_000;

/// File name `drive()` writes its [`crate::summary::RunSummary`] to inside
/// a backend's run directory, when it has one (spec §4.6).
pub const RESUME_FILE_NAME: &str = "execution-resume.json";
