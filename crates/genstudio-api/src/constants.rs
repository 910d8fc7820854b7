//! API constants

/// Current API version segment.
pub const API_VERSION: &str = "v1";

/// Prefix for every versioned route, e.g. `/api/v1`.
pub const API_PREFIX: &str = "/api/v1";

/// Lifetime of presigned URLs handed to vendors for private inputs.
pub const PRESIGNED_URL_TTL_SECS: u64 = 3600;
