//! Shared plumbing for the HTTP-backed `LLMClient` adapters: building a
//! blocking `reqwest::Client` with a request timeout, and classifying
//! transport/status failures into the §4.3 `ProviderError` taxonomy so each
//! adapter doesn't re-derive the same `match` on status codes.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use wayfarer_engine_ports::ProviderError;

/// Default per-request timeout layered beneath the coordinator's turn
/// deadline (§5: "Provider calls have an independent per-request timeout").
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Checked before every request is sent. A blocking `reqwest` call can't be
/// aborted mid-flight once issued (Design Note §9: the core interface is a
/// single blocking `complete`, not a cancellable future), so honouring
/// `cancel` here means not starting a request that's already been called
/// off, rather than tearing one down in progress.
pub fn bail_if_cancelled(cancel: &CancellationToken) -> Result<(), ProviderError> {
    if cancel.is_cancelled() {
        Err(ProviderError::Cancelled)
    } else {
        Ok(())
    }
}

pub fn map_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Transient(format!("request timed out: {err}"))
    } else if err.is_connect() {
        ProviderError::Transient(format!("connection failed: {err}"))
    } else {
        ProviderError::Transient(err.to_string())
    }
}

/// Classify a non-2xx HTTP response per §4.3's taxonomy, consuming the body
/// for the error message.
pub fn classify_error_response(response: Response) -> ProviderError {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::AuthError(format!("{status}: {body}"))
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::InvalidRequest(format!("{status}: {body}"))
        }
        s if s.is_server_error() => ProviderError::Transient(format!("{status}: {body}")),
        s => ProviderError::InvalidRequest(format!("{s}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_checked_before_sending() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            bail_if_cancelled(&token),
            Err(ProviderError::Cancelled)
        ));
    }
}
