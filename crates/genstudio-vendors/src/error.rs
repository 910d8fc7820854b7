use genstudio_core::AppError;
use std::time::Duration;

pub type VendorResult<T> = Result<T, VendorError>;

/// Failures of a single vendor call or polling loop.
#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("vendor returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("generation failed: {0}")]
    Failed(String),

    #[error("gave up after {}s", waited.as_secs())]
    Timeout { waited: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error("vendor reported success without a result")]
    NoResult,
}

impl VendorError {
    /// Map to the shared error type, attributing the failure to `vendor`.
    pub fn into_app_error(self, vendor: &str) -> AppError {
        let vendor = vendor.to_string();
        match self {
            VendorError::MissingCredentials(message) => {
                AppError::VendorNotConfigured { vendor, message }
            }
            VendorError::InvalidRequest(message) => AppError::InvalidInput(message),
            VendorError::Timeout { waited } => AppError::VendorTimeout {
                vendor,
                waited_secs: waited.as_secs(),
            },
            VendorError::Cancelled => {
                AppError::Cancelled(format!("{} generation cancelled", vendor))
            }
            other => AppError::Vendor {
                vendor,
                message: other.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for VendorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            VendorError::Decode(err.to_string())
        } else {
            VendorError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for VendorError {
    fn from(err: serde_json::Error) -> Self {
        VendorError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genstudio_core::ErrorMetadata;

    #[test]
    fn test_timeout_maps_to_gateway_timeout() {
        let err = VendorError::Timeout {
            waited: Duration::from_secs(90),
        }
        .into_app_error("fal");
        assert_eq!(err.http_status_code(), 504);
        assert!(matches!(
            err,
            AppError::VendorTimeout { waited_secs: 90, .. }
        ));
    }

    #[test]
    fn test_missing_credentials_maps_to_not_configured() {
        let err = VendorError::MissingCredentials("no key".into()).into_app_error("replicate");
        assert!(matches!(err, AppError::VendorNotConfigured { .. }));
    }

    #[test]
    fn test_http_failure_is_vendor_error() {
        let err = VendorError::Http {
            status: 500,
            body: "boom".into(),
        }
        .into_app_error("elevenlabs");
        assert_eq!(err.http_status_code(), 502);
    }
}
