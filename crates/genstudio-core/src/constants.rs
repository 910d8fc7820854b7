//! Limits shared by the API and the generation runner.

/// Longest prompt accepted for any generation kind.
pub const MAX_PROMPT_LENGTH: u64 = 4000;

/// Vendor log lines kept per job; older lines are dropped first.
pub const MAX_JOB_LOG_LINES: usize = 500;

/// Default and maximum page sizes for list endpoints.
pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 200;

/// Minimum password length at sign-up.
pub const MIN_PASSWORD_LENGTH: u64 = 8;
