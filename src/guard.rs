//! HTTP fetches guarded by a circuit breaker.
//!
//! A thin helper over `reqwest`'s blocking client: the request runs
//! through the named breaker, and the breaker's failure signal is "the
//! dependency is unhealthy" — transport errors and 5xx responses. A 4xx
//! (or anything below) is the remote service correctly responding, so it
//! counts as a breaker success and the response goes back to the caller
//! untouched.

use reqwest::blocking::{Client, RequestBuilder, Response};

use crate::breaker::{BreakerRegistry, CircuitBreaker, ExecuteError};

/// Errors a guarded fetch can record against the breaker.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a 5xx status.
    #[error("server error {status} from {url}")]
    Server { status: u16, url: String },
}

/// Sends a GET for `url` through the named circuit, constructing the
/// breaker on first use.
pub fn protected_fetch(
    breakers: &BreakerRegistry,
    circuit: &str,
    client: &Client,
    url: &str,
) -> Result<Response, ExecuteError<FetchError>> {
    protected_send(&breakers.get(circuit), client.get(url))
}

/// Sends an arbitrary prepared request through the breaker. While the
/// breaker is open the request is never sent.
pub fn protected_send(
    breaker: &CircuitBreaker,
    request: RequestBuilder,
) -> Result<Response, ExecuteError<FetchError>> {
    breaker.execute(|| {
        let response = request.send().map_err(FetchError::Transport)?;
        if response.status().is_server_error() {
            return Err(FetchError::Server {
                status: response.status().as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response)
    })
}
