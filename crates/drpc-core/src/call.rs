//! Caller-side helpers: building calls, validating responses and retrying
//! on application-level statuses.

use crate::cancel::CancellationToken;
use crate::client::DomainSocketClient;
use crate::config::DrpcConfig;
use crate::error::{DrpcError, Result};
use crate::message::{Call, Response};
use crate::module::Method;
use crate::status::{DaosStatus, Status, StatusResponse};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

/// Retry policy attached to a request payload.
///
/// A retry only happens when the transport status is `SUCCESS` and the
/// application status carried in the response body is one of
/// `retryable_statuses`. Transport failures are never retried.
#[derive(Debug, Clone)]
pub struct RetryableRequest<T> {
    pub payload: T,
    /// Delay between attempts. `None` or zero selects the default.
    pub retry_after: Option<Duration>,
    pub retryable_statuses: Vec<DaosStatus>,
}

impl<T> RetryableRequest<T> {
    pub fn new(payload: T, retryable_statuses: impl IntoIterator<Item = DaosStatus>) -> Self {
        Self {
            payload,
            retry_after: None,
            retryable_statuses: retryable_statuses.into_iter().collect(),
        }
    }

    /// Set the delay between attempts.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn retry_delay(&self) -> Duration {
        match self.retry_after {
            Some(delay) if !delay.is_zero() => delay,
            _ => DrpcConfig::DEFAULT_RETRY_AFTER,
        }
    }

    pub fn is_retryable(&self, status: DaosStatus) -> bool {
        self.retryable_statuses.contains(&status)
    }
}

/// Payload of a call made through [`make_call`].
#[derive(Debug, Clone)]
pub enum Request<T> {
    /// No payload; the call body is empty.
    Empty,
    /// Attempted exactly once.
    Plain(T),
    Retryable(RetryableRequest<T>),
}

impl<T> Request<T> {
    pub fn payload(&self) -> Option<&T> {
        match self {
            Request::Empty => None,
            Request::Plain(payload) => Some(payload),
            Request::Retryable(req) => Some(&req.payload),
        }
    }

    pub fn retry_policy(&self) -> Option<&RetryableRequest<T>> {
        match self {
            Request::Retryable(req) => Some(req),
            _ => None,
        }
    }
}

impl<T> From<RetryableRequest<T>> for Request<T> {
    fn from(req: RetryableRequest<T>) -> Self {
        Request::Retryable(req)
    }
}

/// Build a call for `method` with a JSON-serialized payload.
///
/// The body is empty when there is no payload.
pub fn new_call<T: Serialize + ?Sized>(method: Method, payload: Option<&T>) -> Result<Call> {
    let body = match payload {
        Some(payload) => serde_json::to_vec(payload).map_err(DrpcError::marshal)?,
        None => Vec::new(),
    };
    Ok(Call::new(method, body))
}

/// Fail unless the transport status of `resp` is `SUCCESS`.
pub fn check_response(resp: &Response) -> Result<()> {
    if resp.status != Status::Success {
        return Err(DrpcError::BadResponseStatus(resp.status));
    }
    Ok(())
}

/// Issue a call over `client` and validate the response.
///
/// Every attempt holds the client lock for connect, send and close, and
/// closes the connection before returning. A permanent dial failure is
/// reported as [`DrpcError::DataPlaneNotStarted`].
///
/// For a [`Request::Retryable`] whose response body reports one of the
/// retryable statuses, the call is repeated after the retry delay until a
/// different status comes back or `cancel` fires, in which case
/// [`DrpcError::Cancelled`] is returned. The status is read through
/// [`StatusResponse`], so handlers of retryable methods must reply with an
/// object carrying a top-level integer `status`. A body without that field is
/// returned as-is.
pub async fn make_call<T: Serialize + Sync>(
    cancel: &CancellationToken,
    client: &DomainSocketClient,
    method: Method,
    request: &Request<T>,
) -> Result<Response> {
    let mut call = new_call(method, request.payload())?;

    loop {
        let response = call_once(client, &mut call).await?;

        let Some(policy) = request.retry_policy() else {
            return Ok(response);
        };
        let Some(status) = StatusResponse::from_body(&response.body) else {
            debug!("{}: response body has no status, not retrying", method);
            return Ok(response);
        };
        if !policy.is_retryable(status) {
            return Ok(response);
        }

        let delay = policy.retry_delay();
        info!("{}: retryable {}; retrying after {:?}", method, status, delay);

        tokio::select! {
            _ = cancel.cancelled() => {
                error!("{}: cancelled while waiting to retry", method);
                return Err(DrpcError::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn call_once(client: &DomainSocketClient, call: &mut Call) -> Result<Response> {
    let mut conn = client.lock().await;

    if let Err(e) = conn.connect().await {
        if e.is_temporary() {
            return Err(e);
        }
        debug!("{}", e);
        return Err(DrpcError::DataPlaneNotStarted {
            path: client.socket_path().to_path_buf(),
        });
    }

    let result = conn.send_msg(call).await;
    if let Err(e) = conn.close() {
        debug!("{}", e);
    }

    let response = result?;
    check_response(&response)?;
    Ok(response)
}
