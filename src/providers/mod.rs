//! HTTP-backed provider implementations.
//!
//! Status mapping shared by every client:
//! - 404 is a normal "not found" answer
//! - 429 is `RateLimited` (transient)
//! - 5xx is `Api` (transient), other non-success codes are `Api` (permanent)

pub mod lrclib;
pub mod spotify;

pub use lrclib::LrclibClient;
pub use spotify::SpotifyClient;

use reqwest::blocking::Response;
use reqwest::StatusCode;
use std::time::Duration;

use crate::error::ProviderError;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const USER_AGENT: &str = concat!("chart-enrich/", env!("CARGO_PKG_VERSION"));

/// Error for a non-success, non-404 status.
pub(crate) fn status_error(status: StatusCode, message: String) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited
    } else {
        ProviderError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Pass a successful response through, map 404 to `None` and everything
/// else to a `ProviderError`.
pub(crate) fn check_status(response: Response) -> Result<Option<Response>, ProviderError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        let message = response.text().unwrap_or_default();
        return Err(status_error(status, message));
    }
    Ok(Some(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ProviderError::RateLimited
        ));

        let server = status_error(StatusCode::BAD_GATEWAY, "upstream".into());
        assert!(server.is_transient());

        let client = status_error(StatusCode::BAD_REQUEST, "bad".into());
        assert!(!client.is_transient());
        assert!(matches!(client, ProviderError::Api { status: 400, .. }));
    }
}
